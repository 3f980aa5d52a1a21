use thiserror::Error;

/// Failures raised while turning a raw ROM image into a [`crate::cartridge::Cartridge`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CartridgeError {
    #[error("ROM image is {0} bytes, too small to contain a cartridge header")]
    TooSmall(usize),
    #[error("unsupported cartridge type {0:#04X}")]
    UnsupportedType(u8),
    #[error("invalid ROM size code {0:#04X}")]
    InvalidRomSize(u8),
    #[error("invalid RAM size code {0:#04X}")]
    InvalidRamSize(u8),
    #[error("header declares {declared} bytes of ROM but the image is {actual} bytes")]
    SizeMismatch { declared: usize, actual: usize },
    #[error("a cartridge needs at least one ROM bank")]
    NoRomBanks,
}

/// Terminal CPU faults. Once raised the CPU stays in its panic state until reset.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CpuError {
    #[error("illegal opcode {opcode:#04X} at {pc:#06X}")]
    IllegalOpcode { opcode: u8, pc: u16 },
}

/// Rejected audio configurations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApuError {
    #[error("sample rate {0} Hz is outside 1..=4194304")]
    InvalidSampleRate(u32),
    #[error("audio buffer size must be non-zero")]
    EmptyBuffer,
}
