mod common;

use common::{PROGRAM_START, machine_with_program};
use dmg_core::{
    apu::AudioConfig,
    cpu::CpuState,
    error::ApuError,
    gameboy::{FRAME_CYCLES, GameBoy},
    input::BUTTON_A,
    interrupts::InterruptController,
};

#[test]
fn boot_state() {
    let gb = GameBoy::new();
    assert_eq!(gb.cpu.pc, 0x0100);
    assert_eq!(gb.cpu.af(), 0x01B0);
    assert_eq!(gb.mmu.read(0xFF26), 0xF0);
    assert_eq!(gb.mmu.read(0xFF24), 0x77);
    assert_eq!(gb.mmu.read(0xFF25), 0xF3);
    assert_eq!(gb.master_cycles(), 0);
    // Nothing inserted: ROM reads float high.
    assert_eq!(gb.mmu.read(0x0100), 0xFF);
}

#[test]
fn run_frame_advances_one_frame() {
    let mut gb = machine_with_program(&[0x18, 0xFE]);
    let start = gb.master_cycles();
    gb.run_frame().unwrap();
    assert_eq!(gb.master_cycles() - start, FRAME_CYCLES);
    assert_eq!(gb.frame_cycles(), start % FRAME_CYCLES);
    gb.run_frame().unwrap();
    assert_eq!(gb.master_cycles() - start, 2 * FRAME_CYCLES);
}

#[test]
fn reset_keeps_cartridge() {
    let mut gb = machine_with_program(&[0x3E, 0x99, 0xEA, 0x00, 0xC0, 0x76]);
    while gb.cpu.state() != CpuState::Halted {
        gb.tick().unwrap();
    }
    assert_eq!(gb.mmu.read(0xC000), 0x99);

    gb.reset();
    assert_eq!(gb.master_cycles(), 0);
    assert_eq!(gb.cpu.pc, 0x0100);
    assert_eq!(gb.mmu.read(0xC000), 0x00);
    assert_eq!(gb.mmu.read(0xFF24), 0x77);
    assert!(gb.mmu.cartridge().is_some());

    while gb.cpu.pc != PROGRAM_START {
        gb.tick().unwrap();
    }
    while gb.cpu.state() != CpuState::Halted {
        gb.tick().unwrap();
    }
    assert_eq!(gb.mmu.read(0xC000), 0x99);
}

#[test]
fn rejects_bad_audio_config() {
    let err = GameBoy::with_audio_config(AudioConfig::default().with_sample_rate(5_000_000))
        .err()
        .unwrap();
    assert_eq!(err, ApuError::InvalidSampleRate(5_000_000));
}

#[test]
fn joypad_press_wakes_stop() {
    // Select the buttons, then STOP.
    let mut gb = machine_with_program(&[0x3E, 0x10, 0xE0, 0x00, 0x10, 0x00, 0x00]);
    gb.mmu.write(0xFFFF, 0x10);
    for _ in 0..16 {
        gb.tick().unwrap();
    }
    assert_eq!(gb.cpu.state(), CpuState::Stopped);

    gb.set_buttons(0x0F & !BUTTON_A);
    assert_eq!(gb.mmu.interrupt_flags() & 0x10, 0x10);
    gb.tick().unwrap();
    assert_eq!(gb.cpu.state(), CpuState::Running);
}
