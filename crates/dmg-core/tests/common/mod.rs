#![allow(dead_code)]

use dmg_core::{cartridge::Cartridge, gameboy::GameBoy};
use once_cell::sync::OnceCell;

const BANK_SIZE: usize = 0x4000;
/// Each bank stores its own index here so tests can tell banks apart.
pub const BANK_MARKER: u16 = 0x2000;
pub const PROGRAM_START: u16 = 0x0150;

static LOGGER: OnceCell<()> = OnceCell::new();

pub fn init_logger() {
    LOGGER.get_or_init(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

/// Synthetic ROM image with a well-formed header.
pub fn build_rom(cartridge_type: u8, rom_code: u8, ram_code: u8) -> Vec<u8> {
    let banks = 2usize << rom_code;
    let mut rom = vec![0u8; banks * BANK_SIZE];
    for bank in 0..banks {
        rom[bank * BANK_SIZE + BANK_MARKER as usize] = bank as u8;
    }
    rom[0x0134..0x0138].copy_from_slice(b"TEST");
    rom[0x0147] = cartridge_type;
    rom[0x0148] = rom_code;
    rom[0x0149] = ram_code;
    rom
}

/// 32KiB ROM-only image whose entry point jumps to `program` at 0x0150.
pub fn rom_with_program(program: &[u8]) -> Vec<u8> {
    let mut rom = build_rom(0x00, 0x00, 0x00);
    rom[0x0100..0x0103].copy_from_slice(&[0xC3, 0x50, 0x01]);
    let start = PROGRAM_START as usize;
    rom[start..start + program.len()].copy_from_slice(program);
    rom
}

pub fn cartridge(cartridge_type: u8, rom_code: u8, ram_code: u8) -> Cartridge {
    Cartridge::from_bytes(build_rom(cartridge_type, rom_code, ram_code))
        .expect("synthetic ROM should load")
}

/// Machine that has already executed the entry jump and sits at 0x0150.
pub fn machine_with_program(program: &[u8]) -> GameBoy {
    machine_with_rom(rom_with_program(program))
}

/// Same as [`machine_with_program`] for an image built by the caller.
pub fn machine_with_rom(rom: Vec<u8>) -> GameBoy {
    init_logger();
    let mut gb = GameBoy::new();
    gb.load_rom(rom).expect("synthetic ROM should load");
    while gb.cpu.pc != PROGRAM_START {
        gb.tick().expect("entry jump");
    }
    settle(&mut gb);
    gb
}

/// Tick until the CPU has caught up with the master clock, so the next
/// `tick` starts a fresh instruction.
pub fn settle(gb: &mut GameBoy) {
    while gb.cpu.cycles > gb.master_cycles() {
        gb.tick().expect("tick");
    }
}
