//! Cycle-accurate Game Boy (DMG) emulation core.
//!
//! The CPU, bus, timer, audio unit and cartridge mappers share one clock and
//! are driven in lockstep through the [`gameboy`] facade. Video is not
//! emulated; the LCD registers are plain memory.

#[cfg(feature = "cpu-trace")]
macro_rules! cpu_trace {
    ($($arg:tt)*) => {
        log::trace!(target: "dmg_core::cpu", $($arg)*);
    };
}
#[cfg(not(feature = "cpu-trace"))]
macro_rules! cpu_trace {
    ($($arg:tt)*) => {};
}

/// Audio Processing Unit (APU) emulation.
pub mod apu;

/// Cartridge header and type table.
pub mod cartridge;

/// LR35902 CPU core.
pub mod cpu;

pub mod error;

/// High-level facade that wires the CPU and MMU into a single machine.
pub mod gameboy;

/// Joypad input register.
pub mod input;

pub mod interrupts;

/// Memory bank controllers (MBC1/2/3/5) and the MBC3 clock.
pub mod mbc;

pub mod memory_bank;

/// Memory map and hardware plumbing.
pub mod mmu;

/// Divider/timer unit.
pub mod timer;

pub use apu::{Apu, AudioConfig, StereoSample};
pub use cartridge::Cartridge;
pub use cpu::{Cpu, CpuState};
pub use error::{ApuError, CartridgeError, CpuError};
pub use gameboy::GameBoy;
pub use mmu::Mmu;
