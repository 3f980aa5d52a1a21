/// Interrupt sources in dispatch priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    VBlank,
    LcdStat,
    Timer,
    Serial,
    Joypad,
}

impl Interrupt {
    /// Highest priority first.
    pub const ALL: [Interrupt; 5] = [
        Interrupt::VBlank,
        Interrupt::LcdStat,
        Interrupt::Timer,
        Interrupt::Serial,
        Interrupt::Joypad,
    ];

    /// Bit mask in IE/IF.
    pub const fn mask(self) -> u8 {
        match self {
            Interrupt::VBlank => 0x01,
            Interrupt::LcdStat => 0x02,
            Interrupt::Timer => 0x04,
            Interrupt::Serial => 0x08,
            Interrupt::Joypad => 0x10,
        }
    }

    /// Handler address jumped to on dispatch.
    pub const fn vector(self) -> u16 {
        match self {
            Interrupt::VBlank => 0x40,
            Interrupt::LcdStat => 0x48,
            Interrupt::Timer => 0x50,
            Interrupt::Serial => 0x58,
            Interrupt::Joypad => 0x60,
        }
    }

    /// The interrupt that wins arbitration among the set bits of `pending`.
    pub fn highest_priority(pending: u8) -> Option<Interrupt> {
        Self::ALL.into_iter().find(|i| pending & i.mask() != 0)
    }
}

/// IE/IF/IME access for the CPU. The implementor owns the only copy of this
/// state.
pub trait InterruptController {
    fn interrupt_enable(&self) -> u8;
    fn interrupt_flags(&self) -> u8;
    fn set_interrupt_flags(&mut self, value: u8);
    fn ime(&self) -> bool;
    fn set_ime(&mut self, enabled: bool);

    fn request(&mut self, interrupt: Interrupt) {
        let flags = self.interrupt_flags() | interrupt.mask();
        self.set_interrupt_flags(flags);
    }

    fn acknowledge(&mut self, interrupt: Interrupt) {
        let flags = self.interrupt_flags() & !interrupt.mask();
        self.set_interrupt_flags(flags);
    }

    /// Interrupts both enabled and flagged.
    fn pending(&self) -> u8 {
        self.interrupt_enable() & self.interrupt_flags() & 0x1F
    }
}
