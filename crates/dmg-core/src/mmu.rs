use crate::{
    apu::{Apu, channel::ChannelId},
    cartridge::Cartridge,
    input::Input,
    interrupts::{Interrupt, InterruptController},
    memory_bank::MemoryBank,
    timer::Timer,
};

const ADDRESS_SPACE: usize = 0x10000;
const CLOCKS_PER_TICK: u16 = 4;

const OAM_START: u16 = 0xFE00;
const OAM_END: u16 = 0xFE9F;
const OAM_SIZE: u16 = 0xA0;
/// 160 machine cycles.
const DMA_DURATION: u16 = 640;

const P1: u16 = 0xFF00;
const IF: u16 = 0xFF0F;
const NR52: u16 = 0xFF26;
const STAT: u16 = 0xFF41;
const DMA: u16 = 0xFF46;
const IE: u16 = 0xFFFF;

/// Byte-wide view of the address space used by the CPU.
pub trait Bus {
    fn read(&self, addr: u16) -> u8;
    fn write(&mut self, addr: u16, val: u8);

    fn read16(&self, addr: u16) -> u16 {
        u16::from_le_bytes([self.read(addr), self.read(addr.wrapping_add(1))])
    }

    fn write16(&mut self, addr: u16, val: u16) {
        let [lo, hi] = val.to_le_bytes();
        self.write(addr, lo);
        self.write(addr.wrapping_add(1), hi);
    }
}

/// The slice of the APU the bus forwards register traffic to.
pub trait ApuProxy {
    /// NR52 power bit.
    fn is_enabled(&self) -> bool;
    fn read_register(&self, addr: u16) -> u8;
    fn write_register(&mut self, addr: u16, val: u8);
    /// NRx1 store: reload the channel's length counter from `val`.
    fn write_length(&mut self, channel: ChannelId, val: u8);
}

/// Silent stand-in for hosts that do not emulate audio. Registers read high
/// and writes are dropped.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoAudio;

impl ApuProxy for NoAudio {
    fn is_enabled(&self) -> bool {
        false
    }

    fn read_register(&self, _addr: u16) -> u8 {
        0xFF
    }

    fn write_register(&mut self, _addr: u16, _val: u8) {}

    fn write_length(&mut self, _channel: ChannelId, _val: u8) {}
}

pub struct Mmu<A: ApuProxy = Apu> {
    memory: MemoryBank,
    cartridge: Option<Cartridge>,
    pub apu: A,
    pub timer: Timer,
    pub input: Input,
    if_reg: u8,
    ie_reg: u8,
    ime: bool,
    dma_cycles: u16,
    dma_source: u16,
}

impl Mmu<Apu> {
    pub fn new() -> Self {
        Self::with_apu(Apu::new())
    }
}

impl Default for Mmu<Apu> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: ApuProxy> Mmu<A> {
    pub fn with_apu(apu: A) -> Self {
        Self {
            memory: MemoryBank::new(ADDRESS_SPACE),
            cartridge: None,
            apu,
            timer: Timer::new(),
            input: Input::new(),
            if_reg: 0,
            ie_reg: 0,
            ime: false,
            dma_cycles: 0,
            dma_source: 0,
        }
    }

    /// Clear RAM, I/O and DMA state. The cartridge and the APU are left alone.
    pub fn reset(&mut self) {
        self.memory.reset();
        self.timer = Timer::new();
        self.input = Input::new();
        self.if_reg = 0;
        self.ie_reg = 0;
        self.ime = false;
        self.dma_cycles = 0;
        self.dma_source = 0;
    }

    pub fn load_cartridge(&mut self, cartridge: Cartridge) {
        self.cartridge = Some(cartridge);
    }

    pub fn take_cartridge(&mut self) -> Option<Cartridge> {
        self.cartridge.take()
    }

    pub fn cartridge(&self) -> Option<&Cartridge> {
        self.cartridge.as_ref()
    }

    /// Advance timer, DMA and cartridge clock by one machine cycle.
    pub fn tick(&mut self) {
        self.timer.tick(&mut self.if_reg);
        self.dma_cycles = self.dma_cycles.saturating_sub(CLOCKS_PER_TICK);
        if let Some(cart) = self.cartridge.as_mut() {
            cart.tick(CLOCKS_PER_TICK as u32);
        }
    }

    pub fn dma_active(&self) -> bool {
        self.dma_cycles > 0
    }

    /// Host-side button update (active-low). Raises the joypad interrupt on a
    /// new press of a selected line.
    pub fn set_buttons(&mut self, state: u8) {
        if self.input.set_buttons(state) {
            self.request(Interrupt::Joypad);
        }
    }

    pub fn set_dpad(&mut self, state: u8) {
        if self.input.set_dpad(state) {
            self.request(Interrupt::Joypad);
        }
    }

    pub fn read(&self, addr: u16) -> u8 {
        if self.dma_blocks(addr) {
            return 0xFF;
        }
        self.read_unblocked(addr)
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        if self.dma_cycles > 0 && (OAM_START..=OAM_END).contains(&addr) {
            return;
        }
        match addr {
            0x0000..=0x7FFF | 0xA000..=0xBFFF => {
                if let Some(cart) = self.cartridge.as_mut() {
                    cart.write(addr, val);
                }
            }
            0xE000..=0xFDFF => self.memory.write((addr - 0x2000) as usize, val),
            0xFEA0..=0xFEFF => {}
            P1 => self.input.write(val),
            0xFF04..=0xFF07 => self.timer.write(addr, val),
            IF => self.if_reg = val & 0x1F,
            0xFF15 | 0xFF1F | 0xFF27..=0xFF2F => {}
            0xFF10..=0xFF26 => self.write_audio(addr, val),
            0xFF30..=0xFF3F => self.apu.write_register(addr, val),
            STAT => {
                let hw = self.memory.read(STAT as usize) & 0x07;
                self.memory.write(STAT as usize, (val & 0x78) | hw);
            }
            DMA => {
                self.memory.write(DMA as usize, val);
                self.start_dma(val);
            }
            IE => self.ie_reg = val,
            _ => self.memory.write(addr as usize, val),
        }
    }

    fn read_unblocked(&self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x7FFF | 0xA000..=0xBFFF => {
                self.cartridge.as_ref().map_or(0xFF, |c| c.read(addr))
            }
            0xE000..=0xFDFF => self.memory.read((addr - 0x2000) as usize),
            0xFEA0..=0xFEFF => 0x00,
            P1 => self.input.read(),
            0xFF04..=0xFF07 => self.timer.read(addr),
            IF => self.if_reg | 0xE0,
            0xFF15 | 0xFF1F | 0xFF27..=0xFF2F => 0xFF,
            0xFF10..=0xFF26 | 0xFF30..=0xFF3F => self.apu.read_register(addr),
            STAT => self.memory.read(STAT as usize) | 0x80,
            IE => self.ie_reg,
            _ => self.memory.read(addr as usize),
        }
    }

    fn write_audio(&mut self, addr: u16, val: u8) {
        if !self.apu.is_enabled() && addr != NR52 {
            return;
        }
        match addr {
            0xFF11 => self.apu.write_length(ChannelId::Pulse1, val),
            0xFF16 => self.apu.write_length(ChannelId::Pulse2, val),
            0xFF1B => self.apu.write_length(ChannelId::Wave, val),
            0xFF20 => self.apu.write_length(ChannelId::Noise, val),
            _ => self.apu.write_register(addr, val),
        }
    }

    /// The transfer itself is immediate; the countdown only models the bus
    /// being held.
    fn start_dma(&mut self, page: u8) {
        let source = (page as u16) << 8;
        for offset in 0..OAM_SIZE {
            let byte = self.read_unblocked(source.wrapping_add(offset));
            self.memory.write((OAM_START + offset) as usize, byte);
        }
        self.dma_source = source;
        self.dma_cycles = DMA_DURATION;
        cpu_trace!("OAM DMA started src={:04X}", source);
    }

    fn dma_blocks(&self, addr: u16) -> bool {
        if self.dma_cycles == 0 {
            return false;
        }
        let source_end = self.dma_source.wrapping_add(OAM_SIZE - 1);
        (OAM_START..=OAM_END).contains(&addr) || (self.dma_source..=source_end).contains(&addr)
    }
}

impl<A: ApuProxy> Bus for Mmu<A> {
    fn read(&self, addr: u16) -> u8 {
        Mmu::read(self, addr)
    }

    fn write(&mut self, addr: u16, val: u8) {
        Mmu::write(self, addr, val);
    }
}

impl<A: ApuProxy> InterruptController for Mmu<A> {
    fn interrupt_enable(&self) -> u8 {
        self.ie_reg
    }

    fn interrupt_flags(&self) -> u8 {
        self.if_reg
    }

    fn set_interrupt_flags(&mut self, value: u8) {
        self.if_reg = value & 0x1F;
    }

    fn ime(&self) -> bool {
        self.ime
    }

    fn set_ime(&mut self, enabled: bool) {
        self.ime = enabled;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingApu {
        enabled: bool,
        writes: Vec<(u16, u8)>,
        lengths: Vec<(ChannelId, u8)>,
    }

    impl ApuProxy for RecordingApu {
        fn is_enabled(&self) -> bool {
            self.enabled
        }

        fn read_register(&self, addr: u16) -> u8 {
            addr as u8
        }

        fn write_register(&mut self, addr: u16, val: u8) {
            if addr == NR52 {
                self.enabled = val & 0x80 != 0;
            }
            self.writes.push((addr, val));
        }

        fn write_length(&mut self, channel: ChannelId, val: u8) {
            self.lengths.push((channel, val));
        }
    }

    #[test]
    fn echo_mirrors_work_ram() {
        let mut mmu = Mmu::with_apu(NoAudio);
        mmu.write(0xC123, 0x42);
        assert_eq!(mmu.read(0xE123), 0x42);
        mmu.write(0xFDFF, 0x99);
        assert_eq!(mmu.read(0xDDFF), 0x99);
    }

    #[test]
    fn prohibited_region_reads_zero() {
        let mut mmu = Mmu::with_apu(NoAudio);
        mmu.write(0xFEA0, 0x12);
        assert_eq!(mmu.read(0xFEA0), 0x00);
        assert_eq!(mmu.read(0xFEFF), 0x00);
    }

    #[test]
    fn no_cartridge_reads_high() {
        let mmu = Mmu::with_apu(NoAudio);
        assert_eq!(mmu.read(0x0150), 0xFF);
        assert_eq!(mmu.read(0xA000), 0xFF);
    }

    #[test]
    fn audio_writes_gated_on_power() {
        let mut mmu = Mmu::with_apu(RecordingApu::default());
        mmu.write(0xFF12, 0xF0);
        mmu.write(0xFF11, 0x3F);
        assert!(mmu.apu.writes.is_empty());
        assert!(mmu.apu.lengths.is_empty());

        mmu.write(NR52, 0x80);
        mmu.write(0xFF12, 0xF0);
        mmu.write(0xFF11, 0x3F);
        mmu.write(0xFF20, 0x01);
        assert_eq!(mmu.apu.writes, [(NR52, 0x80), (0xFF12, 0xF0)]);
        assert_eq!(
            mmu.apu.lengths,
            [(ChannelId::Pulse1, 0x3F), (ChannelId::Noise, 0x01)]
        );
    }

    #[test]
    fn wave_ram_ignores_power() {
        let mut mmu = Mmu::with_apu(RecordingApu::default());
        mmu.write(0xFF30, 0xAB);
        assert_eq!(mmu.apu.writes, [(0xFF30, 0xAB)]);
    }

    #[test]
    fn unused_audio_registers_read_high() {
        let mmu = Mmu::with_apu(RecordingApu::default());
        assert_eq!(mmu.read(0xFF15), 0xFF);
        assert_eq!(mmu.read(0xFF1F), 0xFF);
        assert_eq!(mmu.read(0xFF2A), 0xFF);
        assert_eq!(mmu.read(0xFF12), 0x12);
    }

    #[test]
    fn stat_masks() {
        let mut mmu = Mmu::with_apu(NoAudio);
        mmu.write(STAT, 0xFF);
        assert_eq!(mmu.read(STAT), 0xF8);
        mmu.write(STAT, 0x00);
        assert_eq!(mmu.read(STAT), 0x80);
    }

    #[test]
    fn interrupt_flags_upper_bits() {
        let mut mmu = Mmu::with_apu(NoAudio);
        mmu.write(IF, 0x01);
        assert_eq!(mmu.read(IF), 0xE1);
        mmu.write(IE, 0x1F);
        assert_eq!(mmu.pending(), 0x01);
    }

    #[test]
    fn dma_countdown() {
        let mut mmu = Mmu::with_apu(NoAudio);
        mmu.write(DMA, 0xC0);
        assert!(mmu.dma_active());
        for _ in 0..159 {
            mmu.tick();
        }
        assert!(mmu.dma_active());
        mmu.tick();
        assert!(!mmu.dma_active());
    }

    #[test]
    fn joypad_press_requests_interrupt() {
        let mut mmu = Mmu::with_apu(NoAudio);
        mmu.write(P1, 0x20);
        mmu.set_dpad(0x0F & !crate::input::DPAD_LEFT);
        assert_eq!(mmu.interrupt_flags() & 0x10, 0x10);
        assert_eq!(mmu.read(P1) & 0x0F, 0x0D);
    }
}
