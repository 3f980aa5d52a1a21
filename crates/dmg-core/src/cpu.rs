mod instructions;

pub use instructions::{CB_PREFIX, ILLEGAL_OPCODES, Instruction, decode};

use crate::{
    error::CpuError,
    interrupts::{Interrupt, InterruptController},
    mmu::Bus,
};

// CPU flag bits as documented in gbdev.io/pandocs/The_CPU_Flags.html
pub const FLAG_Z: u8 = 0x80; // Zero
pub const FLAG_N: u8 = 0x40; // Subtract
pub const FLAG_H: u8 = 0x20; // Half Carry
pub const FLAG_C: u8 = 0x10; // Carry

// Post-boot DMG state from gbdev.io/pandocs/Power_Up_State.html
const BOOT_PC: u16 = 0x0100;
const BOOT_SP: u16 = 0xFFFE;
const BOOT_A: u8 = 0x01;
const BOOT_F: u8 = 0xB0;
const BOOT_B: u8 = 0x00;
const BOOT_C: u8 = 0x13;
const BOOT_D: u8 = 0x00;
const BOOT_E: u8 = 0xD8;
const BOOT_H: u8 = 0x01;
const BOOT_L: u8 = 0x4D;

/// Interrupt dispatch: two wait states, the PC push and the jump.
const INTERRUPT_DISPATCH_CYCLES: u64 = 20;
const IDLE_CYCLES: u64 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuState {
    Running,
    /// Locked up after an illegal opcode. Only `reset` leaves this state.
    Panic,
    Halted,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operand {
    None,
    Byte(u8),
    Word(u16),
}

impl Operand {
    fn byte(self) -> u8 {
        match self {
            Operand::Byte(b) => b,
            Operand::Word(w) => w as u8,
            Operand::None => 0,
        }
    }

    fn word(self) -> u16 {
        match self {
            Operand::Word(w) => w,
            Operand::Byte(b) => b as u16,
            Operand::None => 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Cpu {
    pub a: u8,
    pub f: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub h: u8,
    pub l: u8,
    pub pc: u16,
    pub sp: u16,
    /// Clock units consumed so far.
    pub cycles: u64,
    state: CpuState,
    interrupts_just_enabled: bool,
    panic: Option<CpuError>,
}

impl Cpu {
    /// CPU with the register state the DMG boot ROM leaves behind.
    pub fn new() -> Self {
        Self {
            a: BOOT_A,
            f: BOOT_F,
            b: BOOT_B,
            c: BOOT_C,
            d: BOOT_D,
            e: BOOT_E,
            h: BOOT_H,
            l: BOOT_L,
            pc: BOOT_PC,
            sp: BOOT_SP,
            cycles: 0,
            state: CpuState::Running,
            interrupts_just_enabled: false,
            panic: None,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn state(&self) -> CpuState {
        self.state
    }

    /// The fault that put the CPU into [`CpuState::Panic`], if any.
    pub fn panic_reason(&self) -> Option<CpuError> {
        self.panic
    }

    pub fn interrupts_just_enabled(&self) -> bool {
        self.interrupts_just_enabled
    }

    pub fn af(&self) -> u16 {
        ((self.a as u16) << 8) | self.f as u16
    }

    pub fn bc(&self) -> u16 {
        ((self.b as u16) << 8) | self.c as u16
    }

    pub fn de(&self) -> u16 {
        ((self.d as u16) << 8) | self.e as u16
    }

    pub fn hl(&self) -> u16 {
        ((self.h as u16) << 8) | self.l as u16
    }

    fn set_af(&mut self, val: u16) {
        self.a = (val >> 8) as u8;
        self.f = val as u8 & 0xF0;
    }

    fn set_bc(&mut self, val: u16) {
        self.b = (val >> 8) as u8;
        self.c = val as u8;
    }

    fn set_de(&mut self, val: u16) {
        self.d = (val >> 8) as u8;
        self.e = val as u8;
    }

    fn set_hl(&mut self, val: u16) {
        self.h = (val >> 8) as u8;
        self.l = val as u8;
    }

    /// 16-bit operand register by encoding: BC, DE, HL, SP.
    fn read_rr(&self, index: u8) -> u16 {
        match index & 0x03 {
            0 => self.bc(),
            1 => self.de(),
            2 => self.hl(),
            _ => self.sp,
        }
    }

    fn write_rr(&mut self, index: u8, val: u16) {
        match index & 0x03 {
            0 => self.set_bc(val),
            1 => self.set_de(val),
            2 => self.set_hl(val),
            _ => self.sp = val,
        }
    }

    fn read_reg<B: Bus>(&self, bus: &B, index: u8) -> u8 {
        match index & 0x07 {
            0 => self.b,
            1 => self.c,
            2 => self.d,
            3 => self.e,
            4 => self.h,
            5 => self.l,
            6 => bus.read(self.hl()),
            _ => self.a,
        }
    }

    fn write_reg<B: Bus>(&mut self, bus: &mut B, index: u8, val: u8) {
        match index & 0x07 {
            0 => self.b = val,
            1 => self.c = val,
            2 => self.d = val,
            3 => self.e = val,
            4 => self.h = val,
            5 => self.l = val,
            6 => bus.write(self.hl(), val),
            _ => self.a = val,
        }
    }

    fn condition(&self, index: u8) -> bool {
        match index & 0x03 {
            0 => self.f & FLAG_Z == 0,
            1 => self.f & FLAG_Z != 0,
            2 => self.f & FLAG_C == 0,
            _ => self.f & FLAG_C != 0,
        }
    }

    fn fetch<B: Bus>(&mut self, bus: &B) -> u8 {
        let val = bus.read(self.pc);
        self.pc = self.pc.wrapping_add(1);
        val
    }

    fn push<B: Bus>(&mut self, bus: &mut B, val: u16) {
        self.sp = self.sp.wrapping_sub(1);
        bus.write(self.sp, (val >> 8) as u8);
        self.sp = self.sp.wrapping_sub(1);
        bus.write(self.sp, val as u8);
    }

    fn pop<B: Bus>(&mut self, bus: &B) -> u16 {
        let lo = bus.read(self.sp) as u16;
        self.sp = self.sp.wrapping_add(1);
        let hi = bus.read(self.sp) as u16;
        self.sp = self.sp.wrapping_add(1);
        (hi << 8) | lo
    }

    /// Run at most one instruction or interrupt dispatch. Does nothing while
    /// the CPU is ahead of `master_cycles`.
    pub fn tick<B: Bus + InterruptController>(
        &mut self,
        bus: &mut B,
        master_cycles: u64,
    ) -> Result<(), CpuError> {
        if self.state == CpuState::Panic || self.cycles > master_cycles {
            return Ok(());
        }
        if self.try_handle_interrupts(bus) {
            return Ok(());
        }
        match self.state {
            CpuState::Running => self.step(bus),
            CpuState::Halted | CpuState::Stopped => {
                self.cycles += IDLE_CYCLES;
                Ok(())
            }
            CpuState::Panic => Ok(()),
        }
    }

    /// Wake from HALT/STOP and dispatch at most one interrupt. Returns true
    /// when an interrupt was serviced.
    pub fn try_handle_interrupts<B: Bus + InterruptController>(&mut self, bus: &mut B) -> bool {
        let pending = bus.pending();
        if pending == 0 {
            return false;
        }
        match self.state {
            CpuState::Halted => self.state = CpuState::Running,
            CpuState::Stopped if pending & Interrupt::Joypad.mask() != 0 => {
                self.state = CpuState::Running
            }
            _ => {}
        }
        if self.state != CpuState::Running || !bus.ime() || self.interrupts_just_enabled {
            return false;
        }
        let Some(interrupt) = Interrupt::highest_priority(pending) else {
            return false;
        };

        bus.set_ime(false);
        bus.acknowledge(interrupt);
        let pc = self.pc;
        self.push(bus, pc);
        self.pc = interrupt.vector();
        self.cycles += INTERRUPT_DISPATCH_CYCLES;
        cpu_trace!("dispatch {:?} from {:04X}", interrupt, pc);
        true
    }

    fn step<B: Bus + InterruptController>(&mut self, bus: &mut B) -> Result<(), CpuError> {
        self.interrupts_just_enabled = false;

        let pc = self.pc;
        let mut opcode = self.fetch(bus);
        let extended = opcode == CB_PREFIX;
        if extended {
            opcode = self.fetch(bus);
        } else if instructions::is_illegal(opcode) {
            let err = CpuError::IllegalOpcode { opcode, pc };
            log::error!("CPU locked up: {err}");
            self.state = CpuState::Panic;
            self.panic = Some(err);
            return Err(err);
        }

        let instruction = decode(opcode, extended);
        let operand = match instruction.length {
            2 => Operand::Byte(self.fetch(bus)),
            3 => {
                let lo = self.fetch(bus);
                let hi = self.fetch(bus);
                Operand::Word(u16::from_le_bytes([lo, hi]))
            }
            _ => Operand::None,
        };
        cpu_trace!(
            "{:04X}: {}{:02X} {:?} af={:04X} bc={:04X} de={:04X} hl={:04X} sp={:04X}",
            pc,
            if extended { "CB " } else { "" },
            opcode,
            operand,
            self.af(),
            self.bc(),
            self.de(),
            self.hl(),
            self.sp
        );

        let branched = if extended {
            self.execute_extended(bus, opcode);
            false
        } else {
            self.execute(bus, opcode, operand)
        };
        self.cycles += if branched {
            instruction.branch_duration
        } else {
            instruction.duration
        } as u64;
        Ok(())
    }

    /// Returns true when a conditional branch was taken.
    fn execute<B: Bus + InterruptController>(
        &mut self,
        bus: &mut B,
        opcode: u8,
        operand: Operand,
    ) -> bool {
        let mut branched = false;
        match opcode {
            0x00 => {}
            0x01 | 0x11 | 0x21 | 0x31 => self.write_rr(opcode >> 4, operand.word()),
            0x02 => bus.write(self.bc(), self.a),
            0x12 => bus.write(self.de(), self.a),
            0x22 => {
                let hl = self.hl();
                bus.write(hl, self.a);
                self.set_hl(hl.wrapping_add(1));
            }
            0x32 => {
                let hl = self.hl();
                bus.write(hl, self.a);
                self.set_hl(hl.wrapping_sub(1));
            }
            0x03 | 0x13 | 0x23 | 0x33 => {
                let r = opcode >> 4;
                self.write_rr(r, self.read_rr(r).wrapping_add(1));
            }
            0x0B | 0x1B | 0x2B | 0x3B => {
                let r = opcode >> 4;
                self.write_rr(r, self.read_rr(r).wrapping_sub(1));
            }
            0x04 | 0x0C | 0x14 | 0x1C | 0x24 | 0x2C | 0x34 | 0x3C => {
                let r = opcode >> 3;
                let val = self.read_reg(bus, r);
                let res = self.inc8(val);
                self.write_reg(bus, r, res);
            }
            0x05 | 0x0D | 0x15 | 0x1D | 0x25 | 0x2D | 0x35 | 0x3D => {
                let r = opcode >> 3;
                let val = self.read_reg(bus, r);
                let res = self.dec8(val);
                self.write_reg(bus, r, res);
            }
            0x06 | 0x0E | 0x16 | 0x1E | 0x26 | 0x2E | 0x36 | 0x3E => {
                self.write_reg(bus, opcode >> 3, operand.byte())
            }
            0x07 => {
                let carry = self.a & 0x80 != 0;
                self.a = self.a.rotate_left(1);
                self.f = if carry { FLAG_C } else { 0 };
            }
            0x0F => {
                let carry = self.a & 0x01 != 0;
                self.a = self.a.rotate_right(1);
                self.f = if carry { FLAG_C } else { 0 };
            }
            0x17 => {
                let carry = self.a & 0x80 != 0;
                self.a = (self.a << 1) | (self.f & FLAG_C != 0) as u8;
                self.f = if carry { FLAG_C } else { 0 };
            }
            0x1F => {
                let carry = self.a & 0x01 != 0;
                self.a = (self.a >> 1) | (((self.f & FLAG_C != 0) as u8) << 7);
                self.f = if carry { FLAG_C } else { 0 };
            }
            0x08 => bus.write16(operand.word(), self.sp),
            0x09 | 0x19 | 0x29 | 0x39 => {
                let val = self.read_rr(opcode >> 4);
                self.add_hl(val);
            }
            0x0A => self.a = bus.read(self.bc()),
            0x1A => self.a = bus.read(self.de()),
            0x2A => {
                let hl = self.hl();
                self.a = bus.read(hl);
                self.set_hl(hl.wrapping_add(1));
            }
            0x3A => {
                let hl = self.hl();
                self.a = bus.read(hl);
                self.set_hl(hl.wrapping_sub(1));
            }
            0x10 => self.state = CpuState::Stopped,
            0x18 => self.jump_relative(operand.byte()),
            0x20 | 0x28 | 0x30 | 0x38 => {
                if self.condition(opcode >> 3) {
                    self.jump_relative(operand.byte());
                    branched = true;
                }
            }
            0x27 => self.daa(),
            0x2F => {
                self.a = !self.a;
                self.f = (self.f & (FLAG_Z | FLAG_C)) | FLAG_N | FLAG_H;
            }
            0x37 => self.f = (self.f & FLAG_Z) | FLAG_C,
            0x3F => self.f = (self.f & (FLAG_Z | FLAG_C)) ^ FLAG_C,
            0x76 => self.state = CpuState::Halted,
            0x40..=0x7F => {
                let val = self.read_reg(bus, opcode);
                self.write_reg(bus, opcode >> 3, val);
            }
            0x80..=0xBF => {
                let val = self.read_reg(bus, opcode);
                self.alu(opcode >> 3, val);
            }
            0xC6 | 0xCE | 0xD6 | 0xDE | 0xE6 | 0xEE | 0xF6 | 0xFE => {
                self.alu(opcode >> 3, operand.byte())
            }
            0xC0 | 0xC8 | 0xD0 | 0xD8 => {
                if self.condition(opcode >> 3) {
                    self.pc = self.pop(bus);
                    branched = true;
                }
            }
            0xC9 => self.pc = self.pop(bus),
            0xD9 => {
                self.pc = self.pop(bus);
                bus.set_ime(true);
            }
            0xC2 | 0xCA | 0xD2 | 0xDA => {
                if self.condition(opcode >> 3) {
                    self.pc = operand.word();
                    branched = true;
                }
            }
            0xC3 => self.pc = operand.word(),
            0xE9 => self.pc = self.hl(),
            0xC4 | 0xCC | 0xD4 | 0xDC => {
                if self.condition(opcode >> 3) {
                    self.call(bus, operand.word());
                    branched = true;
                }
            }
            0xCD => self.call(bus, operand.word()),
            0xC7 | 0xCF | 0xD7 | 0xDF | 0xE7 | 0xEF | 0xF7 | 0xFF => {
                self.call(bus, (opcode & 0x38) as u16)
            }
            0xC1 | 0xD1 | 0xE1 => {
                let val = self.pop(bus);
                self.write_rr((opcode >> 4) & 0x03, val);
            }
            0xF1 => {
                let val = self.pop(bus);
                self.set_af(val);
            }
            0xC5 | 0xD5 | 0xE5 => {
                let val = self.read_rr((opcode >> 4) & 0x03);
                self.push(bus, val);
            }
            0xF5 => {
                let val = self.af();
                self.push(bus, val);
            }
            0xE0 => bus.write(0xFF00 | operand.byte() as u16, self.a),
            0xF0 => self.a = bus.read(0xFF00 | operand.byte() as u16),
            0xE2 => bus.write(0xFF00 | self.c as u16, self.a),
            0xF2 => self.a = bus.read(0xFF00 | self.c as u16),
            0xEA => bus.write(operand.word(), self.a),
            0xFA => self.a = bus.read(operand.word()),
            0xE8 => self.sp = self.add_sp_signed(operand.byte()),
            0xF8 => {
                let val = self.add_sp_signed(operand.byte());
                self.set_hl(val);
            }
            0xF9 => self.sp = self.hl(),
            0xF3 => bus.set_ime(false),
            0xFB => {
                bus.set_ime(true);
                self.interrupts_just_enabled = true;
            }
            // CB prefix and the illegal opcodes never reach here.
            _ => {}
        }
        branched
    }

    fn execute_extended<B: Bus>(&mut self, bus: &mut B, opcode: u8) {
        let r = opcode & 0x07;
        let val = self.read_reg(bus, r);
        let carry_in = (self.f & FLAG_C != 0) as u8;
        let (res, carry) = match opcode >> 3 {
            // RLC
            0x00 => (val.rotate_left(1), val & 0x80 != 0),
            // RRC
            0x01 => (val.rotate_right(1), val & 0x01 != 0),
            // RL
            0x02 => ((val << 1) | carry_in, val & 0x80 != 0),
            // RR
            0x03 => ((val >> 1) | (carry_in << 7), val & 0x01 != 0),
            // SLA
            0x04 => (val << 1, val & 0x80 != 0),
            // SRA
            0x05 => ((val >> 1) | (val & 0x80), val & 0x01 != 0),
            // SWAP
            0x06 => (val.rotate_left(4), false),
            // SRL
            0x07 => (val >> 1, val & 0x01 != 0),
            0x08..=0x0F => {
                let bit = (opcode >> 3) & 0x07;
                self.f = (self.f & FLAG_C) | FLAG_H | if val & (1 << bit) == 0 { FLAG_Z } else { 0 };
                return;
            }
            0x10..=0x17 => {
                let bit = (opcode >> 3) & 0x07;
                self.write_reg(bus, r, val & !(1 << bit));
                return;
            }
            _ => {
                let bit = (opcode >> 3) & 0x07;
                self.write_reg(bus, r, val | (1 << bit));
                return;
            }
        };
        self.write_reg(bus, r, res);
        self.f = if res == 0 { FLAG_Z } else { 0 } | if carry { FLAG_C } else { 0 };
    }

    fn jump_relative(&mut self, offset: u8) {
        self.pc = self.pc.wrapping_add(offset as i8 as i16 as u16);
    }

    fn call<B: Bus>(&mut self, bus: &mut B, target: u16) {
        let ret = self.pc;
        self.push(bus, ret);
        self.pc = target;
    }

    fn inc8(&mut self, val: u8) -> u8 {
        let res = val.wrapping_add(1);
        self.f = (self.f & FLAG_C)
            | if res == 0 { FLAG_Z } else { 0 }
            | if val & 0x0F == 0x0F { FLAG_H } else { 0 };
        res
    }

    fn dec8(&mut self, val: u8) -> u8 {
        let res = val.wrapping_sub(1);
        self.f = (self.f & FLAG_C)
            | FLAG_N
            | if res == 0 { FLAG_Z } else { 0 }
            | if val & 0x0F == 0 { FLAG_H } else { 0 };
        res
    }

    fn add_hl(&mut self, val: u16) {
        let hl = self.hl();
        let (res, carry) = hl.overflowing_add(val);
        self.f = (self.f & FLAG_Z)
            | if (hl & 0x0FFF) + (val & 0x0FFF) > 0x0FFF { FLAG_H } else { 0 }
            | if carry { FLAG_C } else { 0 };
        self.set_hl(res);
    }

    /// SP plus a signed byte. H and C come from the unsigned low-byte add.
    fn add_sp_signed(&mut self, offset: u8) -> u16 {
        let sp = self.sp;
        let res = sp.wrapping_add(offset as i8 as i16 as u16);
        self.f = if (sp & 0x0F) + (offset as u16 & 0x0F) > 0x0F { FLAG_H } else { 0 }
            | if (sp & 0xFF) + offset as u16 > 0xFF { FLAG_C } else { 0 };
        res
    }

    /// ADD, ADC, SUB, SBC, AND, XOR, OR, CP by encoding.
    fn alu(&mut self, op: u8, val: u8) {
        let a = self.a;
        let carry_in = (self.f & FLAG_C != 0) as u8;
        match op & 0x07 {
            0 | 1 => {
                let c = if op & 0x07 == 1 { carry_in } else { 0 };
                let sum = a as u16 + val as u16 + c as u16;
                let res = sum as u8;
                self.f = if res == 0 { FLAG_Z } else { 0 }
                    | if (a & 0x0F) + (val & 0x0F) + c > 0x0F { FLAG_H } else { 0 }
                    | if sum > 0xFF { FLAG_C } else { 0 };
                self.a = res;
            }
            2 | 3 | 7 => {
                let c = if op & 0x07 == 3 { carry_in } else { 0 };
                let res = a.wrapping_sub(val).wrapping_sub(c);
                self.f = FLAG_N
                    | if res == 0 { FLAG_Z } else { 0 }
                    | if (a & 0x0F) < (val & 0x0F) + c { FLAG_H } else { 0 }
                    | if (a as u16) < val as u16 + c as u16 { FLAG_C } else { 0 };
                if op & 0x07 != 7 {
                    self.a = res;
                }
            }
            4 => {
                self.a = a & val;
                self.f = if self.a == 0 { FLAG_Z } else { 0 } | FLAG_H;
            }
            5 => {
                self.a = a ^ val;
                self.f = if self.a == 0 { FLAG_Z } else { 0 };
            }
            _ => {
                self.a = a | val;
                self.f = if self.a == 0 { FLAG_Z } else { 0 };
            }
        }
    }

    fn daa(&mut self) {
        let mut a = self.a;
        let mut carry = self.f & FLAG_C != 0;
        let half = self.f & FLAG_H != 0;
        if self.f & FLAG_N == 0 {
            if carry || a > 0x99 {
                a = a.wrapping_add(0x60);
                carry = true;
            }
            if half || a & 0x0F > 0x09 {
                a = a.wrapping_add(0x06);
            }
        } else {
            if carry {
                a = a.wrapping_sub(0x60);
            }
            if half {
                a = a.wrapping_sub(0x06);
            }
        }
        self.a = a;
        self.f = (self.f & FLAG_N) | if a == 0 { FLAG_Z } else { 0 } | if carry { FLAG_C } else { 0 };
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}
