use std::fmt;

use crate::{
    error::CartridgeError,
    mbc::{Mbc, MbcKind},
    memory_bank::{MemoryBank, ROM_BANK_SIZE},
};

const HEADER_END: usize = 0x0150;
const TITLE_START: usize = 0x0134;
const TITLE_END: usize = 0x0143;
const TYPE_OFFSET: usize = 0x0147;
const ROM_SIZE_OFFSET: usize = 0x0148;
const RAM_SIZE_OFFSET: usize = 0x0149;
const HEADER_CHECKSUM_OFFSET: usize = 0x014D;
const GLOBAL_CHECKSUM_OFFSET: usize = 0x014E;

/// Cartridge type byte stored at 0x0147.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CartridgeType {
    RomOnly = 0x00,
    Mbc1 = 0x01,
    Mbc1Ram = 0x02,
    Mbc1RamBattery = 0x03,
    Mbc2 = 0x05,
    Mbc2Battery = 0x06,
    RomRam = 0x08,
    RomRamBattery = 0x09,
    Mmm01 = 0x0B,
    Mmm01Ram = 0x0C,
    Mmm01RamBattery = 0x0D,
    Mbc3TimerBattery = 0x0F,
    Mbc3TimerRamBattery = 0x10,
    Mbc3 = 0x11,
    Mbc3Ram = 0x12,
    Mbc3RamBattery = 0x13,
    Mbc5 = 0x19,
    Mbc5Ram = 0x1A,
    Mbc5RamBattery = 0x1B,
    Mbc5Rumble = 0x1C,
    Mbc5RumbleRam = 0x1D,
    Mbc5RumbleRamBattery = 0x1E,
    Mbc6 = 0x20,
    Mbc7SensorRumbleRamBattery = 0x22,
    PocketCamera = 0xFC,
    BandaiTama5 = 0xFD,
    HuC3 = 0xFE,
    HuC1RamBattery = 0xFF,
}

impl CartridgeType {
    pub fn from_byte(byte: u8) -> Option<Self> {
        use CartridgeType::*;
        Some(match byte {
            0x00 => RomOnly,
            0x01 => Mbc1,
            0x02 => Mbc1Ram,
            0x03 => Mbc1RamBattery,
            0x05 => Mbc2,
            0x06 => Mbc2Battery,
            0x08 => RomRam,
            0x09 => RomRamBattery,
            0x0B => Mmm01,
            0x0C => Mmm01Ram,
            0x0D => Mmm01RamBattery,
            0x0F => Mbc3TimerBattery,
            0x10 => Mbc3TimerRamBattery,
            0x11 => Mbc3,
            0x12 => Mbc3Ram,
            0x13 => Mbc3RamBattery,
            0x19 => Mbc5,
            0x1A => Mbc5Ram,
            0x1B => Mbc5RamBattery,
            0x1C => Mbc5Rumble,
            0x1D => Mbc5RumbleRam,
            0x1E => Mbc5RumbleRamBattery,
            0x20 => Mbc6,
            0x22 => Mbc7SensorRumbleRamBattery,
            0xFC => PocketCamera,
            0xFD => BandaiTama5,
            0xFE => HuC3,
            0xFF => HuC1RamBattery,
            _ => return None,
        })
    }

    /// Controller family emulated for this type, if any.
    pub fn mbc_kind(self) -> Option<MbcKind> {
        use CartridgeType::*;
        match self {
            RomOnly | RomRam | RomRamBattery => Some(MbcKind::RomOnly),
            Mbc1 | Mbc1Ram | Mbc1RamBattery => Some(MbcKind::Mbc1),
            Mbc2 | Mbc2Battery => Some(MbcKind::Mbc2),
            Mbc3TimerBattery | Mbc3TimerRamBattery | Mbc3 | Mbc3Ram | Mbc3RamBattery => {
                Some(MbcKind::Mbc3)
            }
            Mbc5 | Mbc5Ram | Mbc5RamBattery | Mbc5Rumble | Mbc5RumbleRam
            | Mbc5RumbleRamBattery => Some(MbcKind::Mbc5),
            _ => None,
        }
    }

    pub fn has_ram(self) -> bool {
        use CartridgeType::*;
        matches!(
            self,
            Mbc1Ram
                | Mbc1RamBattery
                | Mbc2
                | Mbc2Battery
                | RomRam
                | RomRamBattery
                | Mmm01Ram
                | Mmm01RamBattery
                | Mbc3TimerRamBattery
                | Mbc3Ram
                | Mbc3RamBattery
                | Mbc5Ram
                | Mbc5RamBattery
                | Mbc5RumbleRam
                | Mbc5RumbleRamBattery
                | Mbc7SensorRumbleRamBattery
                | HuC1RamBattery
        )
    }

    pub fn has_battery(self) -> bool {
        use CartridgeType::*;
        matches!(
            self,
            Mbc1RamBattery
                | Mbc2Battery
                | RomRamBattery
                | Mmm01RamBattery
                | Mbc3TimerBattery
                | Mbc3TimerRamBattery
                | Mbc3RamBattery
                | Mbc5RamBattery
                | Mbc5RumbleRamBattery
                | Mbc7SensorRumbleRamBattery
                | HuC1RamBattery
        )
    }

    pub fn has_timer(self) -> bool {
        matches!(
            self,
            CartridgeType::Mbc3TimerBattery | CartridgeType::Mbc3TimerRamBattery
        )
    }

    pub fn has_rumble(self) -> bool {
        use CartridgeType::*;
        matches!(
            self,
            Mbc5Rumble | Mbc5RumbleRam | Mbc5RumbleRamBattery | Mbc7SensorRumbleRamBattery
        )
    }
}

/// The handful of header fields the core cares about. Checksums are kept as
/// read and never verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartridgeHeader {
    pub title: String,
    pub cartridge_type: CartridgeType,
    pub rom_bank_count: usize,
    pub ram_bank_count: usize,
    pub header_checksum: u8,
    pub global_checksum: u16,
}

impl CartridgeHeader {
    pub fn parse(data: &[u8]) -> Result<Self, CartridgeError> {
        if data.len() < HEADER_END {
            return Err(CartridgeError::TooSmall(data.len()));
        }
        let type_byte = data[TYPE_OFFSET];
        let cartridge_type =
            CartridgeType::from_byte(type_byte).ok_or(CartridgeError::UnsupportedType(type_byte))?;
        let rom_code = data[ROM_SIZE_OFFSET];
        if rom_code > 0x08 {
            return Err(CartridgeError::InvalidRomSize(rom_code));
        }
        let ram_code = data[RAM_SIZE_OFFSET];
        let ram_bank_count = match ram_code {
            0x00 => 0,
            // 2KiB parts still occupy one bank window.
            0x01 | 0x02 => 1,
            0x03 => 4,
            0x04 => 16,
            0x05 => 8,
            other => return Err(CartridgeError::InvalidRamSize(other)),
        };

        let mut title = &data[TITLE_START..TITLE_END];
        if let Some(pos) = title.iter().position(|&b| b == 0) {
            title = &title[..pos];
        }

        Ok(Self {
            title: String::from_utf8_lossy(title).trim().to_string(),
            cartridge_type,
            rom_bank_count: 2usize << rom_code,
            ram_bank_count,
            header_checksum: data[HEADER_CHECKSUM_OFFSET],
            global_checksum: u16::from_be_bytes([
                data[GLOBAL_CHECKSUM_OFFSET],
                data[GLOBAL_CHECKSUM_OFFSET + 1],
            ]),
        })
    }
}

impl fmt::Display for CartridgeHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "\"{}\" {:?}, {} ROM banks, {} RAM banks",
            self.title, self.cartridge_type, self.rom_bank_count, self.ram_bank_count
        )
    }
}

#[derive(Debug, Clone)]
pub struct Cartridge {
    header: CartridgeHeader,
    mbc: Mbc,
}

impl Cartridge {
    /// Load a raw ROM image, splitting it into 16KiB banks.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self, CartridgeError> {
        let header = CartridgeHeader::parse(&data)?;
        let declared = header.rom_bank_count * ROM_BANK_SIZE;
        if declared != data.len() {
            return Err(CartridgeError::SizeMismatch {
                declared,
                actual: data.len(),
            });
        }
        let banks = data
            .chunks(ROM_BANK_SIZE)
            .map(|chunk| MemoryBank::from_bytes(chunk, ROM_BANK_SIZE))
            .collect();
        let cart = Self::with_header(header, banks)?;
        log::info!("Loaded cartridge {}", cart.header);
        Ok(cart)
    }

    /// Build a cartridge from already-parsed inputs.
    pub fn new(
        cartridge_type: CartridgeType,
        rom_banks: Vec<MemoryBank>,
        ram_bank_count: usize,
    ) -> Result<Self, CartridgeError> {
        let header = CartridgeHeader {
            title: String::new(),
            cartridge_type,
            rom_bank_count: rom_banks.len(),
            ram_bank_count,
            header_checksum: 0,
            global_checksum: 0,
        };
        Self::with_header(header, rom_banks)
    }

    fn with_header(header: CartridgeHeader, rom_banks: Vec<MemoryBank>) -> Result<Self, CartridgeError> {
        if rom_banks.is_empty() {
            return Err(CartridgeError::NoRomBanks);
        }
        let cartridge_type = header.cartridge_type;
        let kind = cartridge_type
            .mbc_kind()
            .ok_or(CartridgeError::UnsupportedType(cartridge_type as u8))?;
        let ram_banks = if cartridge_type.has_ram() {
            header.ram_bank_count
        } else {
            0
        };
        let mbc = Mbc::new(kind, rom_banks, ram_banks, cartridge_type.has_timer());
        Ok(Self { header, mbc })
    }

    pub fn header(&self) -> &CartridgeHeader {
        &self.header
    }

    pub fn cartridge_type(&self) -> CartridgeType {
        self.header.cartridge_type
    }

    pub fn mbc(&self) -> &Mbc {
        &self.mbc
    }

    pub fn read(&self, address: u16) -> u8 {
        self.mbc.read(address)
    }

    pub fn write(&mut self, address: u16, value: u8) {
        self.mbc.write(address, value);
    }

    pub fn tick(&mut self, cycles: u32) {
        self.mbc.tick(cycles);
    }
}

impl fmt::Display for Cartridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.header.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(type_byte: u8, rom_code: u8, ram_code: u8) -> Vec<u8> {
        let mut data = vec![0u8; (2usize << rom_code) * ROM_BANK_SIZE];
        data[TITLE_START..TITLE_START + 4].copy_from_slice(b"TEST");
        data[TYPE_OFFSET] = type_byte;
        data[ROM_SIZE_OFFSET] = rom_code;
        data[RAM_SIZE_OFFSET] = ram_code;
        data
    }

    #[test]
    fn header_fields() {
        let header = CartridgeHeader::parse(&image(0x1B, 0x02, 0x03)).unwrap();
        assert_eq!(header.title, "TEST");
        assert_eq!(header.cartridge_type, CartridgeType::Mbc5RamBattery);
        assert_eq!(header.rom_bank_count, 8);
        assert_eq!(header.ram_bank_count, 4);
    }

    #[test]
    fn display_describes_header() {
        let cart = Cartridge::from_bytes(image(0x13, 0x01, 0x03)).unwrap();
        assert_eq!(
            cart.to_string(),
            "\"TEST\" Mbc3RamBattery, 4 ROM banks, 4 RAM banks"
        );
    }

    #[test]
    fn type_predicates() {
        assert!(CartridgeType::Mbc3TimerRamBattery.has_timer());
        assert!(CartridgeType::Mbc3TimerRamBattery.has_ram());
        assert!(!CartridgeType::Mbc3.has_battery());
        assert!(CartridgeType::Mbc5Rumble.has_rumble());
        assert_eq!(CartridgeType::HuC3.mbc_kind(), None);
    }

    #[test]
    fn rejects_truncated_image() {
        let mut data = image(0x01, 0x02, 0x00);
        data.truncate(3 * ROM_BANK_SIZE);
        assert_eq!(
            Cartridge::from_bytes(data).unwrap_err(),
            CartridgeError::SizeMismatch {
                declared: 8 * ROM_BANK_SIZE,
                actual: 3 * ROM_BANK_SIZE,
            }
        );
    }

    #[test]
    fn rejects_unsupported_mapper() {
        assert_eq!(
            Cartridge::from_bytes(image(0xFE, 0x00, 0x00)).unwrap_err(),
            CartridgeError::UnsupportedType(0xFE)
        );
    }

    #[test]
    fn ram_only_allocated_for_ram_types() {
        let cart = Cartridge::from_bytes(image(0x01, 0x00, 0x02)).unwrap();
        assert_eq!(cart.mbc().ram_bank_count(), 0);
        let cart = Cartridge::from_bytes(image(0x03, 0x00, 0x02)).unwrap();
        assert_eq!(cart.mbc().ram_bank_count(), 1);
    }
}
