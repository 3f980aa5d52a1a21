//! Opcode descriptors for the base and CB-prefixed tables.
//!
//! Durations are in clock units (T-cycles). CB entries include the prefix
//! fetch. Conditional branches list the not-taken duration in `duration` and
//! the taken one in `branch_duration`.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    /// Opcode plus operand bytes (1..=3).
    pub length: u8,
    pub duration: u8,
    pub branch_duration: u8,
}

/// Opcodes with no defined behavior; executing one locks the CPU up.
pub const ILLEGAL_OPCODES: [u8; 11] = [
    0xD3, 0xDB, 0xDD, 0xE3, 0xE4, 0xEB, 0xEC, 0xED, 0xF4, 0xFC, 0xFD,
];

pub const CB_PREFIX: u8 = 0xCB;

#[rustfmt::skip]
const LENGTHS: [u8; 256] = [
//  0  1  2  3  4  5  6  7  8  9  A  B  C  D  E  F
    1, 3, 1, 1, 1, 1, 2, 1, 3, 1, 1, 1, 1, 1, 2, 1, // 0
    2, 3, 1, 1, 1, 1, 2, 1, 2, 1, 1, 1, 1, 1, 2, 1, // 1
    2, 3, 1, 1, 1, 1, 2, 1, 2, 1, 1, 1, 1, 1, 2, 1, // 2
    2, 3, 1, 1, 1, 1, 2, 1, 2, 1, 1, 1, 1, 1, 2, 1, // 3
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, // 4
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, // 5
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, // 6
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, // 7
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, // 8
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, // 9
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, // A
    1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, // B
    1, 1, 3, 3, 3, 1, 2, 1, 1, 1, 3, 1, 3, 3, 2, 1, // C
    1, 1, 3, 1, 3, 1, 2, 1, 1, 1, 3, 1, 3, 1, 2, 1, // D
    2, 1, 1, 1, 1, 1, 2, 1, 2, 1, 3, 1, 1, 1, 2, 1, // E
    2, 1, 1, 1, 1, 1, 2, 1, 2, 1, 3, 1, 1, 1, 2, 1, // F
];

#[rustfmt::skip]
const DURATIONS: [u8; 256] = [
//   0   1   2   3   4   5   6   7   8   9   A   B   C   D   E   F
     4, 12,  8,  8,  4,  4,  8,  4, 20,  8,  8,  8,  4,  4,  8,  4, // 0
     4, 12,  8,  8,  4,  4,  8,  4, 12,  8,  8,  8,  4,  4,  8,  4, // 1
     8, 12,  8,  8,  4,  4,  8,  4,  8,  8,  8,  8,  4,  4,  8,  4, // 2
     8, 12,  8,  8, 12, 12, 12,  4,  8,  8,  8,  8,  4,  4,  8,  4, // 3
     4,  4,  4,  4,  4,  4,  8,  4,  4,  4,  4,  4,  4,  4,  8,  4, // 4
     4,  4,  4,  4,  4,  4,  8,  4,  4,  4,  4,  4,  4,  4,  8,  4, // 5
     4,  4,  4,  4,  4,  4,  8,  4,  4,  4,  4,  4,  4,  4,  8,  4, // 6
     8,  8,  8,  8,  8,  8,  4,  8,  4,  4,  4,  4,  4,  4,  8,  4, // 7
     4,  4,  4,  4,  4,  4,  8,  4,  4,  4,  4,  4,  4,  4,  8,  4, // 8
     4,  4,  4,  4,  4,  4,  8,  4,  4,  4,  4,  4,  4,  4,  8,  4, // 9
     4,  4,  4,  4,  4,  4,  8,  4,  4,  4,  4,  4,  4,  4,  8,  4, // A
     4,  4,  4,  4,  4,  4,  8,  4,  4,  4,  4,  4,  4,  4,  8,  4, // B
     8, 12, 12, 16, 12, 16,  8, 16,  8, 16, 12,  4, 12, 24,  8, 16, // C
     8, 12, 12,  4, 12, 16,  8, 16,  8, 16, 12,  4, 12,  4,  8, 16, // D
    12, 12,  8,  4,  4, 16,  8, 16, 16,  4, 16,  4,  4,  4,  8, 16, // E
    12, 12,  8,  4,  4, 16,  8, 16, 12,  8, 16,  4,  4,  4,  8, 16, // F
];

pub const BASE: [Instruction; 256] = build_base();
pub const EXTENDED: [Instruction; 256] = build_extended();

/// Descriptor for `opcode`, from the CB table when `extended` is set.
pub fn decode(opcode: u8, extended: bool) -> Instruction {
    if extended {
        EXTENDED[opcode as usize]
    } else {
        BASE[opcode as usize]
    }
}

pub fn is_illegal(opcode: u8) -> bool {
    ILLEGAL_OPCODES.contains(&opcode)
}

const fn taken_duration(opcode: u8, duration: u8) -> u8 {
    match opcode {
        // JR cc
        0x20 | 0x28 | 0x30 | 0x38 => 12,
        // RET cc
        0xC0 | 0xC8 | 0xD0 | 0xD8 => 20,
        // JP cc
        0xC2 | 0xCA | 0xD2 | 0xDA => 16,
        // CALL cc
        0xC4 | 0xCC | 0xD4 | 0xDC => 24,
        _ => duration,
    }
}

const fn build_base() -> [Instruction; 256] {
    let mut table = [Instruction {
        length: 1,
        duration: 4,
        branch_duration: 4,
    }; 256];
    let mut i = 0;
    while i < 256 {
        let duration = DURATIONS[i];
        table[i] = Instruction {
            length: LENGTHS[i],
            duration,
            branch_duration: taken_duration(i as u8, duration),
        };
        i += 1;
    }
    table
}

const fn build_extended() -> [Instruction; 256] {
    let mut table = [Instruction {
        length: 1,
        duration: 8,
        branch_duration: 8,
    }; 256];
    let mut i = 0;
    while i < 256 {
        if i & 0x07 == 6 {
            // BIT only reads (HL); everything else reads and writes it back.
            let duration = if i >= 0x40 && i < 0x80 { 12 } else { 16 };
            table[i] = Instruction {
                length: 1,
                duration,
                branch_duration: duration,
            };
        }
        i += 1;
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conditional_branches_have_taken_timing() {
        let jr = decode(0x20, false);
        assert_eq!((jr.duration, jr.branch_duration), (8, 12));
        let ret = decode(0xC8, false);
        assert_eq!((ret.duration, ret.branch_duration), (8, 20));
        let jp = decode(0xDA, false);
        assert_eq!((jp.duration, jp.branch_duration), (12, 16));
        let call = decode(0xC4, false);
        assert_eq!((call.length, call.duration, call.branch_duration), (3, 12, 24));
    }

    #[test]
    fn unconditional_entries_ignore_branch_column() {
        for opcode in [0x00u8, 0x18, 0xC3, 0xCD, 0xC9] {
            let ins = decode(opcode, false);
            assert_eq!(ins.duration, ins.branch_duration, "opcode {opcode:02X}");
        }
    }

    #[test]
    fn hl_indirect_costs_more() {
        assert_eq!(decode(0x46, false).duration, 8);
        assert_eq!(decode(0x70, false).duration, 8);
        assert_eq!(decode(0x86, false).duration, 8);
        assert_eq!(decode(0x76, false).duration, 4);
        assert_eq!(decode(0x34, false).duration, 12);
        assert_eq!(decode(0x36, false).length, 2);
    }

    #[test]
    fn extended_table_timing() {
        assert_eq!(decode(0x00, true).duration, 8);
        assert_eq!(decode(0x06, true).duration, 16);
        assert_eq!(decode(0x46, true).duration, 12);
        assert_eq!(decode(0x7E, true).duration, 12);
        assert_eq!(decode(0x86, true).duration, 16);
        assert_eq!(decode(0xFE, true).duration, 16);
        assert!(EXTENDED.iter().all(|i| i.length == 1));
    }

    #[test]
    fn operand_lengths() {
        assert_eq!(decode(0x01, false).length, 3);
        assert_eq!(decode(0x10, false).length, 2);
        assert_eq!(decode(0xE0, false).length, 2);
        assert_eq!(decode(0xEA, false).length, 3);
        assert_eq!(decode(0xF8, false).length, 2);
    }

    #[test]
    fn illegal_set() {
        assert!(is_illegal(0xD3));
        assert!(is_illegal(0xFD));
        assert!(!is_illegal(CB_PREFIX));
        assert!(!is_illegal(0x10));
    }
}
