mod common;

use common::{init_logger, rom_with_program};
use dmg_core::{
    cartridge::Cartridge,
    input::{BUTTON_START, DPAD_DOWN},
    interrupts::{Interrupt, InterruptController},
    mmu::{Bus, Mmu, NoAudio},
};

fn mmu_with_dma_source() -> Mmu {
    init_logger();
    let mut rom = rom_with_program(&[]);
    for i in 0..0xA0usize {
        rom[0x1000 + i] = (i as u8) ^ 0x5A;
    }
    let mut mmu = Mmu::new();
    mmu.load_cartridge(Cartridge::from_bytes(rom).unwrap());
    mmu
}

#[test]
fn dma_copies_source_page_into_oam() {
    let mut mmu = mmu_with_dma_source();
    mmu.write(0xFF46, 0x10);

    // Source window and OAM are held by the transfer.
    assert_eq!(mmu.read(0x1000), 0xFF);
    assert_eq!(mmu.read(0x109F), 0xFF);
    assert_eq!(mmu.read(0xFE00), 0xFF);
    assert_eq!(mmu.read(0xFE9F), 0xFF);
    // Everything else stays reachable.
    assert_eq!(mmu.read(0x10A0), 0x00);
    mmu.write(0xC000, 0x77);
    assert_eq!(mmu.read(0xC000), 0x77);

    for _ in 0..160 {
        mmu.tick();
    }
    assert!(!mmu.dma_active());
    for i in 0..0xA0u16 {
        assert_eq!(mmu.read(0xFE00 + i), (i as u8) ^ 0x5A, "OAM byte {i:#04X}");
        assert_eq!(mmu.read(0x1000 + i), (i as u8) ^ 0x5A);
    }
}

#[test]
fn oam_writes_dropped_during_dma() {
    let mut mmu = mmu_with_dma_source();
    mmu.write(0xFF46, 0x10);
    mmu.write(0xFE00, 0x00);
    for _ in 0..160 {
        mmu.tick();
    }
    assert_eq!(mmu.read(0xFE00), 0x5A);
    mmu.write(0xFE00, 0x00);
    assert_eq!(mmu.read(0xFE00), 0x00);
}

#[test]
fn dma_from_work_ram() {
    let mut mmu = Mmu::with_apu(NoAudio);
    for i in 0..0xA0u16 {
        mmu.write(0xC100 + i, i as u8);
    }
    mmu.write(0xFF46, 0xC1);
    assert_eq!(mmu.read(0xFF46), 0xC1);
    for _ in 0..160 {
        mmu.tick();
    }
    assert_eq!(mmu.read(0xFE10), 0x10);
    assert_eq!(mmu.read(0xFE9F), 0x9F);
}

#[test]
fn echo_and_prohibited_regions() {
    let mut mmu = Mmu::with_apu(NoAudio);
    mmu.write(0xE000, 0xAA);
    assert_eq!(mmu.read(0xC000), 0xAA);
    mmu.write(0xD5FF, 0xBB);
    assert_eq!(mmu.read(0xF5FF), 0xBB);
    mmu.write(0xFEC0, 0xCC);
    assert_eq!(mmu.read(0xFEC0), 0x00);
}

#[test]
fn audio_range_follows_power() {
    let mut mmu = Mmu::new();
    assert_eq!(mmu.read(0xFF26), 0x70);
    mmu.write(0xFF24, 0x77);
    assert_eq!(mmu.read(0xFF24), 0x00);

    mmu.write(0xFF26, 0x80);
    mmu.write(0xFF24, 0x77);
    assert_eq!(mmu.read(0xFF24), 0x77);
    assert_eq!(mmu.read(0xFF15), 0xFF);
    assert_eq!(mmu.read(0xFF1F), 0xFF);
    for addr in 0xFF27..=0xFF2F {
        assert_eq!(mmu.read(addr), 0xFF);
    }
}

#[test]
fn length_writes_reach_channel_while_powered() {
    use dmg_core::apu::channel::ChannelId;
    let mut mmu = Mmu::new();
    mmu.write(0xFF26, 0x80);
    mmu.write(0xFF11, 0x3E);
    assert_eq!(mmu.apu.channel(ChannelId::Pulse1).length_timer(), 2);
    mmu.write(0xFF1B, 0xFF);
    assert_eq!(mmu.apu.channel(ChannelId::Wave).length_timer(), 1);
    // Duty bits latch through the same write.
    assert_eq!(mmu.read(0xFF11), 0x3F);
}

#[test]
fn joypad_register_and_interrupt() {
    let mut mmu = Mmu::with_apu(NoAudio);
    mmu.write(0xFF00, 0x10);
    mmu.set_buttons(0x0F & !BUTTON_START);
    assert_eq!(mmu.read(0xFF00), 0xD7);
    assert_eq!(mmu.interrupt_flags(), Interrupt::Joypad.mask());

    mmu.acknowledge(Interrupt::Joypad);
    // Unselected d-pad does not raise anything.
    mmu.set_dpad(0x0F & !DPAD_DOWN);
    assert_eq!(mmu.interrupt_flags(), 0);
    mmu.write(0xFF00, 0x00);
    assert_eq!(mmu.read(0xFF00) & 0x0F, 0x07);
}

#[test]
fn bus_word_access_is_little_endian() {
    let mut mmu = Mmu::with_apu(NoAudio);
    mmu.write16(0xC000, 0xBEEF);
    assert_eq!(mmu.read(0xC000), 0xEF);
    assert_eq!(mmu.read(0xC001), 0xBE);
    assert_eq!(mmu.read16(0xC000), 0xBEEF);
}

#[test]
fn interrupt_registers() {
    let mut mmu = Mmu::with_apu(NoAudio);
    mmu.write(0xFFFF, 0x05);
    mmu.request(Interrupt::Timer);
    mmu.request(Interrupt::Serial);
    assert_eq!(mmu.read(0xFF0F), 0xEC);
    assert_eq!(mmu.pending(), 0x04);
    mmu.write(0xFF0F, 0xFF);
    assert_eq!(mmu.interrupt_flags(), 0x1F);
}
