use crate::{
    apu::{AudioConfig, PlaybackCallback},
    cartridge::Cartridge,
    cpu::Cpu,
    error::{ApuError, CartridgeError, CpuError},
    mmu::Mmu,
};

/// Clock units in one 59.7 Hz video frame.
pub const FRAME_CYCLES: u64 = 70_224;
const CLOCKS_PER_TICK: u64 = 4;

// Audio registers as the DMG boot ROM leaves them.
const BOOT_AUDIO: [(u16, u8); 3] = [(0xFF26, 0x80), (0xFF24, 0x77), (0xFF25, 0xF3)];

pub struct GameBoy {
    pub cpu: Cpu,
    pub mmu: Mmu,
    master_cycles: u64,
}

impl GameBoy {
    pub fn new() -> Self {
        let mut gb = Self {
            cpu: Cpu::new(),
            mmu: Mmu::new(),
            master_cycles: 0,
        };
        gb.apply_boot_audio();
        gb
    }

    pub fn with_audio_config(config: AudioConfig) -> Result<Self, ApuError> {
        let mut gb = Self::new();
        gb.mmu.apu.configure(config)?;
        Ok(gb)
    }

    pub fn load_cartridge(&mut self, cartridge: Cartridge) {
        self.mmu.load_cartridge(cartridge);
    }

    /// Parse and insert a raw ROM image.
    pub fn load_rom(&mut self, data: Vec<u8>) -> Result<(), CartridgeError> {
        let cartridge = Cartridge::from_bytes(data)?;
        self.load_cartridge(cartridge);
        Ok(())
    }

    pub fn set_playback(&mut self, callback: PlaybackCallback) {
        self.mmu.apu.set_playback(callback);
    }

    pub fn set_buttons(&mut self, state: u8) {
        self.mmu.set_buttons(state);
    }

    pub fn set_dpad(&mut self, state: u8) {
        self.mmu.set_dpad(state);
    }

    /// Advance the whole machine by one machine cycle: CPU, then timer, DMA
    /// and cartridge clock, then audio.
    pub fn tick(&mut self) -> Result<(), CpuError> {
        self.cpu.tick(&mut self.mmu, self.master_cycles)?;
        self.mmu.tick();
        self.mmu.apu.tick();
        self.master_cycles += CLOCKS_PER_TICK;
        Ok(())
    }

    /// Run for one frame's worth of clock units.
    pub fn run_frame(&mut self) -> Result<(), CpuError> {
        let target = self.master_cycles + FRAME_CYCLES;
        while self.master_cycles < target {
            self.tick()?;
        }
        Ok(())
    }

    pub fn master_cycles(&self) -> u64 {
        self.master_cycles
    }

    /// Position within the current frame.
    pub fn frame_cycles(&self) -> u64 {
        self.master_cycles % FRAME_CYCLES
    }

    /// Back to the post-boot state. The cartridge, audio configuration and
    /// playback callback are kept.
    pub fn reset(&mut self) {
        self.cpu.reset();
        self.mmu.reset();
        self.mmu.apu.reset();
        self.master_cycles = 0;
        self.apply_boot_audio();
    }

    fn apply_boot_audio(&mut self) {
        for (addr, val) in BOOT_AUDIO {
            self.mmu.write(addr, val);
        }
    }
}

impl Default for GameBoy {
    fn default() -> Self {
        Self::new()
    }
}
