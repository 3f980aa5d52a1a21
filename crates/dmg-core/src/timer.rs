use crate::interrupts::Interrupt;

/// Clock units the divider advances per machine cycle.
const CLOCKS_PER_TICK: u16 = 4;

pub struct Timer {
    /// 16-bit internal divider counter. DIV register is the upper 8 bits.
    div: u16,
    /// Timer counter
    pub tima: u8,
    /// Timer modulo
    pub tma: u8,
    /// Timer control
    pub tac: u8,
    /// TIMA overflowed on the previous machine cycle; reload and interrupt
    /// happen on the next one.
    overflow_pending: bool,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            div: 0,
            tima: 0,
            tma: 0,
            tac: 0,
            overflow_pending: false,
        }
    }

    pub fn div_counter(&self) -> u16 {
        self.div
    }

    pub fn read(&self, addr: u16) -> u8 {
        match addr {
            0xFF04 => (self.div >> 8) as u8,
            0xFF05 => self.tima,
            0xFF06 => self.tma,
            0xFF07 => self.tac | 0xF8,
            _ => 0xFF,
        }
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        match addr {
            0xFF04 => self.reset_div(),
            0xFF05 => {
                // A write in the overflow cycle cancels the reload.
                self.overflow_pending = false;
                self.tima = val;
            }
            0xFF06 => self.tma = val,
            0xFF07 => {
                let before = self.signal();
                self.tac = val & 0x07;
                if before && !self.signal() {
                    self.increment();
                }
            }
            _ => {}
        }
    }

    /// Advance one machine cycle, setting the timer bit in `if_reg` when a
    /// delayed overflow reload lands.
    pub fn tick(&mut self, if_reg: &mut u8) {
        if self.overflow_pending {
            self.overflow_pending = false;
            self.tima = self.tma;
            *if_reg |= Interrupt::Timer.mask();
        }
        let before = self.signal();
        self.div = self.div.wrapping_add(CLOCKS_PER_TICK);
        if before && !self.signal() {
            self.increment();
        }
    }

    /// Any DIV write zeroes the whole counter, which can itself produce a
    /// falling edge on the selected bit.
    pub fn reset_div(&mut self) {
        let before = self.signal();
        self.div = 0;
        if before {
            self.increment();
        }
    }

    fn increment(&mut self) {
        let (value, overflow) = self.tima.overflowing_add(1);
        self.tima = value;
        if overflow {
            self.overflow_pending = true;
        }
    }

    fn signal(&self) -> bool {
        if self.tac & 0x04 == 0 {
            return false;
        }
        let bit = match self.tac & 0x03 {
            0x00 => 9,
            0x01 => 3,
            0x02 => 5,
            _ => 7,
        };
        (self.div >> bit) & 1 != 0
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
