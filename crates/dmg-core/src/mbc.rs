use crate::memory_bank::{MemoryBank, RAM_BANK_SIZE, ROM_BANK_SIZE};

/// MBC2 carries 512 half-bytes of RAM inside the controller itself.
const MBC2_RAM_SIZE: usize = 0x200;

const RTC_CYCLES_PER_SECOND: u32 = 4_194_304;

/// Controller family wired between the bus and the cartridge banks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MbcKind {
    /// No cartridge inserted: every read floats to 0xFF.
    Unmapped,
    RomOnly,
    Mbc1,
    Mbc2,
    Mbc3,
    Mbc5,
}

/// MBC1 interpretation of the 0x4000-0x5FFF register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BankingMode {
    /// Register holds bits 5-6 of the ROM bank number.
    #[default]
    Simple,
    /// Register selects the external RAM bank.
    Advanced,
}

/// What the MBC3 0xA000-0xBFFF window is currently mapped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RamSelect {
    Bank,
    Rtc(u8),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RtcRegisters {
    pub seconds: u8,
    pub minutes: u8,
    pub hours: u8,
    pub days: u16,
    pub halt: bool,
    pub carry: bool,
}

impl RtcRegisters {
    fn control_byte(&self) -> u8 {
        let mut out = ((self.days >> 8) as u8) & 0x01;
        if self.halt {
            out |= 0x40;
        }
        if self.carry {
            out |= 0x80;
        }
        out
    }
}

/// MBC3 real-time clock, advanced by emulated cycles rather than wall time.
#[derive(Debug, Clone, Default)]
pub struct Rtc {
    live: RtcRegisters,
    latched: RtcRegisters,
    subsecond_cycles: u32,
}

impl Rtc {
    pub fn latch(&mut self) {
        self.latched = self.live;
    }

    pub fn latched(&self) -> RtcRegisters {
        self.latched
    }

    pub fn read(&self, reg: u8) -> u8 {
        match reg {
            0x08 => self.latched.seconds & 0x3F,
            0x09 => self.latched.minutes & 0x3F,
            0x0A => self.latched.hours & 0x1F,
            0x0B => self.latched.days as u8,
            0x0C => self.latched.control_byte(),
            _ => 0xFF,
        }
    }

    pub fn write(&mut self, reg: u8, value: u8) {
        match reg {
            0x08 => {
                self.live.seconds = value & 0x3F;
                self.subsecond_cycles = 0;
            }
            0x09 => self.live.minutes = value & 0x3F,
            0x0A => self.live.hours = value & 0x1F,
            0x0B => self.live.days = (self.live.days & 0x0100) | value as u16,
            0x0C => {
                self.live.days = (self.live.days & 0x00FF) | (((value & 0x01) as u16) << 8);
                self.live.halt = value & 0x40 != 0;
                self.live.carry = value & 0x80 != 0;
            }
            _ => {}
        }
        self.latched = self.live;
    }

    pub fn tick(&mut self, cycles: u32) {
        if self.live.halt {
            return;
        }
        self.subsecond_cycles += cycles;
        while self.subsecond_cycles >= RTC_CYCLES_PER_SECOND {
            self.subsecond_cycles -= RTC_CYCLES_PER_SECOND;
            self.advance_second();
        }
    }

    // Out-of-range values written by software keep counting up to the
    // register width and wrap without carrying into the next field.
    fn advance_second(&mut self) {
        if self.live.seconds != 59 {
            self.live.seconds = (self.live.seconds + 1) & 0x3F;
            return;
        }
        self.live.seconds = 0;
        if self.live.minutes != 59 {
            self.live.minutes = (self.live.minutes + 1) & 0x3F;
            return;
        }
        self.live.minutes = 0;
        if self.live.hours != 23 {
            self.live.hours = (self.live.hours + 1) & 0x1F;
            return;
        }
        self.live.hours = 0;
        if self.live.days >= 0x01FF {
            self.live.days = 0;
            self.live.carry = true;
        } else {
            self.live.days += 1;
        }
    }
}

/// Memory bank controller: maps the cartridge windows of the bus onto ROM
/// and external RAM banks and decodes control writes into the ROM range.
#[derive(Debug, Clone)]
pub struct Mbc {
    kind: MbcKind,
    rom: Vec<MemoryBank>,
    ram: Vec<MemoryBank>,
    rom_bank: usize,
    ram_bank: usize,
    ram_enabled: bool,
    banking_mode: BankingMode,
    /// Raw bank register contents; the effective index is derived from them.
    rom_low: u8,
    rom_high: u8,
    ram_select: RamSelect,
    rtc: Option<Rtc>,
    latch_armed: bool,
}

impl Default for Mbc {
    fn default() -> Self {
        Self::new(MbcKind::Unmapped, Vec::new(), 0, false)
    }
}

impl Mbc {
    pub fn new(kind: MbcKind, rom: Vec<MemoryBank>, ram_bank_count: usize, has_rtc: bool) -> Self {
        let ram = match kind {
            MbcKind::Unmapped => Vec::new(),
            MbcKind::Mbc2 => vec![MemoryBank::new(MBC2_RAM_SIZE)],
            _ => (0..ram_bank_count)
                .map(|_| MemoryBank::new(RAM_BANK_SIZE))
                .collect(),
        };
        let mut mbc = Self {
            kind,
            rom,
            ram,
            rom_bank: 1,
            ram_bank: 0,
            // Plain ROM+RAM boards have no enable latch.
            ram_enabled: kind == MbcKind::RomOnly,
            banking_mode: BankingMode::Simple,
            rom_low: 1,
            rom_high: 0,
            ram_select: RamSelect::Bank,
            rtc: (kind == MbcKind::Mbc3 && has_rtc).then(Rtc::default),
            latch_armed: false,
        };
        mbc.rom_bank = mbc.wrap_rom(1);
        mbc
    }

    pub fn kind(&self) -> MbcKind {
        self.kind
    }

    pub fn rom_bank(&self) -> usize {
        self.rom_bank
    }

    pub fn ram_bank(&self) -> usize {
        self.ram_bank
    }

    pub fn ram_enabled(&self) -> bool {
        self.ram_enabled
    }

    pub fn banking_mode(&self) -> BankingMode {
        self.banking_mode
    }

    pub fn rom_bank_count(&self) -> usize {
        self.rom.len()
    }

    pub fn ram_bank_count(&self) -> usize {
        self.ram.len()
    }

    pub fn rtc(&self) -> Option<&Rtc> {
        self.rtc.as_ref()
    }

    pub fn read(&self, address: u16) -> u8 {
        match address {
            0x0000..=0x3FFF => self.read_rom(0, address as usize),
            0x4000..=0x7FFF => self.read_rom(self.rom_bank, address as usize - ROM_BANK_SIZE),
            0xA000..=0xBFFF => self.read_ram(address),
            _ => 0xFF,
        }
    }

    pub fn write(&mut self, address: u16, value: u8) {
        match address {
            0x0000..=0x7FFF => self.write_control(address, value),
            0xA000..=0xBFFF => self.write_ram(address, value),
            _ => {}
        }
    }

    /// Advance cartridge-side clocks by `cycles` clock units.
    pub fn tick(&mut self, cycles: u32) {
        if let Some(rtc) = self.rtc.as_mut() {
            rtc.tick(cycles);
        }
    }

    fn read_rom(&self, bank: usize, offset: usize) -> u8 {
        self.rom.get(bank).map_or(0xFF, |b| b.read(offset))
    }

    fn read_ram(&self, address: u16) -> u8 {
        if !self.ram_enabled {
            return 0xFF;
        }
        match (self.kind, self.ram_select) {
            (MbcKind::Mbc2, _) => self
                .ram
                .first()
                .map_or(0xFF, |b| b.read(address as usize & 0x1FF) | 0xF0),
            (MbcKind::Mbc3, RamSelect::Rtc(reg)) => self.rtc.as_ref().map_or(0xFF, |r| r.read(reg)),
            _ => self
                .ram
                .get(self.ram_bank)
                .map_or(0xFF, |b| b.read(address as usize - 0xA000)),
        }
    }

    fn write_ram(&mut self, address: u16, value: u8) {
        if !self.ram_enabled {
            return;
        }
        match (self.kind, self.ram_select) {
            (MbcKind::Mbc2, _) => {
                if let Some(bank) = self.ram.first_mut() {
                    bank.write(address as usize & 0x1FF, value & 0x0F);
                }
            }
            (MbcKind::Mbc3, RamSelect::Rtc(reg)) => {
                if let Some(rtc) = self.rtc.as_mut() {
                    rtc.write(reg, value);
                }
            }
            _ => {
                if let Some(bank) = self.ram.get_mut(self.ram_bank) {
                    bank.write(address as usize - 0xA000, value);
                }
            }
        }
    }

    fn write_control(&mut self, address: u16, value: u8) {
        match self.kind {
            MbcKind::Unmapped | MbcKind::RomOnly => {}
            MbcKind::Mbc1 => self.write_mbc1(address, value),
            MbcKind::Mbc2 => self.write_mbc2(address, value),
            MbcKind::Mbc3 => self.write_mbc3(address, value),
            MbcKind::Mbc5 => self.write_mbc5(address, value),
        }
    }

    fn write_mbc1(&mut self, address: u16, value: u8) {
        match address {
            0x0000..=0x1FFF => self.ram_enabled = value & 0x0A != 0,
            0x2000..=0x3FFF => {
                self.rom_low = value & 0x1F;
                self.update_mbc1_rom_bank();
            }
            0x4000..=0x5FFF => match self.banking_mode {
                BankingMode::Simple => {
                    self.rom_high = value & 0x03;
                    self.update_mbc1_rom_bank();
                }
                BankingMode::Advanced => self.ram_bank = self.wrap_ram((value & 0x03) as usize),
            },
            _ => {
                self.banking_mode = if value & 0x01 != 0 {
                    BankingMode::Advanced
                } else {
                    BankingMode::Simple
                };
            }
        }
    }

    fn update_mbc1_rom_bank(&mut self) {
        let low = if self.rom_low == 0 { 1 } else { self.rom_low };
        let index = ((self.rom_high as usize) << 5) | low as usize;
        self.rom_bank = self.wrap_rom(index);
    }

    fn write_mbc2(&mut self, address: u16, value: u8) {
        if address >= 0x4000 {
            return;
        }
        if address & 0x0100 != 0 {
            let bank = (value & 0x0F).max(1);
            self.rom_bank = self.wrap_rom(bank as usize);
        } else {
            self.ram_enabled = value & 0x0F == 0x0A;
            self.ram_bank = 0;
        }
    }

    fn write_mbc3(&mut self, address: u16, value: u8) {
        match address {
            0x0000..=0x1FFF => self.ram_enabled = value & 0x0F == 0x0A,
            0x2000..=0x3FFF => {
                let bank = (value & 0x7F).max(1);
                self.rom_bank = self.wrap_rom(bank as usize);
            }
            0x4000..=0x5FFF => match value {
                0x00..=0x03 => {
                    self.ram_select = RamSelect::Bank;
                    self.ram_bank = self.wrap_ram(value as usize);
                }
                0x08..=0x0C => self.ram_select = RamSelect::Rtc(value),
                _ => log::warn!("MBC3: ignoring RAM/RTC select {value:#04X}"),
            },
            _ => {
                if value == 0x01 && self.latch_armed {
                    if let Some(rtc) = self.rtc.as_mut() {
                        rtc.latch();
                    }
                }
                self.latch_armed = value == 0x00;
            }
        }
    }

    fn write_mbc5(&mut self, address: u16, value: u8) {
        match address {
            0x0000..=0x1FFF => self.ram_enabled = value & 0x0F == 0x0A,
            0x2000..=0x2FFF => {
                self.rom_low = value;
                self.update_mbc5_rom_bank();
            }
            0x3000..=0x3FFF => {
                self.rom_high = value & 0x01;
                self.update_mbc5_rom_bank();
            }
            0x4000..=0x5FFF => {
                let bank = (value & 0x0F) as usize;
                if bank < self.ram.len() {
                    self.ram_bank = bank;
                }
            }
            _ => {}
        }
    }

    fn update_mbc5_rom_bank(&mut self) {
        let index = ((self.rom_high as usize) << 8) | self.rom_low as usize;
        self.rom_bank = self.wrap_rom(index);
    }

    fn wrap_rom(&self, index: usize) -> usize {
        match self.rom.len() {
            0 => 0,
            n => index % n,
        }
    }

    fn wrap_ram(&self, index: usize) -> usize {
        match self.ram.len() {
            0 => 0,
            n => index % n,
        }
    }
}
