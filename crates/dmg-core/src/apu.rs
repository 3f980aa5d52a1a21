//! Audio processing unit: frame sequencer, stereo mixer, high-pass filter and
//! sample buffering on top of the four channels in [`channel`].

pub mod channel;

use crate::{error::ApuError, mmu::ApuProxy};
use channel::{Channel, ChannelId};

#[cfg(feature = "apu-trace")]
macro_rules! apu_trace {
    ($($arg:tt)*) => {
        log::trace!(target: "dmg_core::apu", $($arg)*);
    };
}
#[cfg(not(feature = "apu-trace"))]
macro_rules! apu_trace {
    ($($arg:tt)*) => {};
}

pub const CPU_CLOCK_HZ: u32 = 4_194_304;
// 512 Hz frame sequencer tick
const FRAME_SEQUENCER_PERIOD: u32 = 8192;
const CLOCKS_PER_TICK: u32 = 4;
const HIGH_PASS_BASE_CHARGE: f32 = 0.999_958;

const NR50: u16 = 0xFF24;
const NR51: u16 = 0xFF25;
const NR52: u16 = 0xFF26;
const WAVE_RAM_START: u16 = 0xFF30;
const WAVE_RAM_END: u16 = 0xFF3F;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StereoSample {
    pub left: f32,
    pub right: f32,
}

/// Host-facing audio options.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioConfig {
    /// Output rate in Hz.
    pub sample_rate: u32,
    /// Samples per committed buffer.
    pub buffer_size: usize,
    /// Per-channel mute switches, CH1..CH4.
    pub channels: [bool; 4],
    pub high_pass_filter: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            buffer_size: 512,
            channels: [true; 4],
            high_pass_filter: true,
        }
    }
}

impl AudioConfig {
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn with_channel(mut self, channel: ChannelId, enabled: bool) -> Self {
        self.channels[channel.index()] = enabled;
        self
    }

    pub fn with_high_pass_filter(mut self, enabled: bool) -> Self {
        self.high_pass_filter = enabled;
        self
    }

    fn validate(&self) -> Result<(), ApuError> {
        if self.sample_rate == 0 || self.sample_rate > CPU_CLOCK_HZ {
            return Err(ApuError::InvalidSampleRate(self.sample_rate));
        }
        if self.buffer_size == 0 {
            return Err(ApuError::EmptyBuffer);
        }
        Ok(())
    }
}

/// Receives every committed buffer. The vector is the callee's to keep.
pub type PlaybackCallback = Box<dyn FnMut(Vec<StereoSample>) + Send>;

/// What a single frame-sequencer step clocks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SequencerEvents {
    pub length: bool,
    pub sweep: bool,
    pub envelope: bool,
}

/// 512 Hz, eight-step sequencer. `step` is always the step that runs next.
#[derive(Debug, Clone, Default)]
pub struct FrameSequencer {
    step: u8,
    counter: u32,
}

impl FrameSequencer {
    pub fn step(&self) -> u8 {
        self.step
    }

    /// Whether the step after the pending one clocks length. The lookahead
    /// does not wrap, so it is false while step 7 is pending.
    pub fn will_tick_length(&self) -> bool {
        matches!(self.step + 1, 2 | 4 | 6)
    }

    /// Whether the step after the pending one clocks the envelopes.
    pub fn will_tick_envelope(&self) -> bool {
        self.step + 1 == 7
    }

    /// Run the pending step and move to the next one.
    pub fn advance(&mut self) -> SequencerEvents {
        let step = self.step;
        self.step = (step + 1) & 7;
        SequencerEvents {
            length: step % 2 == 0,
            sweep: step == 2 || step == 6,
            envelope: step == 7,
        }
    }

    fn tick(&mut self, clocks: u32) -> Option<SequencerEvents> {
        self.counter += clocks;
        if self.counter < FRAME_SEQUENCER_PERIOD {
            return None;
        }
        self.counter -= FRAME_SEQUENCER_PERIOD;
        Some(self.advance())
    }

    fn reset(&mut self) {
        self.step = 0;
        self.counter = 0;
    }
}

pub struct Apu {
    channels: [Channel; 4],
    sequencer: FrameSequencer,
    enabled: bool,
    nr50: u8,
    nr51: u8,
    config: AudioConfig,
    /// Clock units per output sample.
    sample_period: u32,
    sample_timer: u32,
    next_buffer: Vec<StereoSample>,
    buffer: Vec<StereoSample>,
    capacitor: StereoSample,
    charge_factor: f32,
    playback: Option<PlaybackCallback>,
}

impl Apu {
    pub fn new() -> Self {
        let config = AudioConfig::default();
        let mut apu = Self {
            channels: ChannelId::ALL.map(Channel::new),
            sequencer: FrameSequencer::default(),
            enabled: false,
            nr50: 0,
            nr51: 0,
            sample_period: 0,
            sample_timer: 0,
            next_buffer: Vec::new(),
            buffer: Vec::new(),
            capacitor: StereoSample::default(),
            charge_factor: 0.0,
            playback: None,
            config: config.clone(),
        };
        apu.apply_config(config);
        apu
    }

    pub fn with_config(config: AudioConfig) -> Result<Self, ApuError> {
        let mut apu = Self::new();
        apu.configure(config)?;
        Ok(apu)
    }

    /// Swap in new output settings. Buffers are reallocated and any partially
    /// filled buffer is dropped.
    pub fn configure(&mut self, config: AudioConfig) -> Result<(), ApuError> {
        config.validate()?;
        self.apply_config(config);
        log::info!(
            "APU configured: {} Hz, {} samples per buffer, high-pass {}",
            self.config.sample_rate,
            self.config.buffer_size,
            if self.config.high_pass_filter { "on" } else { "off" }
        );
        Ok(())
    }

    fn apply_config(&mut self, config: AudioConfig) {
        self.sample_period = CPU_CLOCK_HZ / config.sample_rate;
        self.sample_timer = 0;
        self.charge_factor =
            HIGH_PASS_BASE_CHARGE.powf(CPU_CLOCK_HZ as f32 / config.sample_rate as f32);
        self.capacitor = StereoSample::default();
        self.buffer = vec![StereoSample::default(); config.buffer_size];
        self.next_buffer = Vec::with_capacity(config.buffer_size);
        self.config = config;
    }

    pub fn config(&self) -> &AudioConfig {
        &self.config
    }

    pub fn set_playback(&mut self, callback: PlaybackCallback) {
        self.playback = Some(callback);
    }

    pub fn clear_playback(&mut self) {
        self.playback = None;
    }

    /// Copy of the last committed buffer.
    pub fn audio_buffer(&self) -> Vec<StereoSample> {
        self.buffer.clone()
    }

    pub fn channel(&self, id: ChannelId) -> &Channel {
        &self.channels[id.index()]
    }

    pub fn sequencer(&self) -> &FrameSequencer {
        &self.sequencer
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Power-on register state; wave RAM and configuration are kept.
    pub fn reset(&mut self) {
        for ch in &mut self.channels {
            ch.reset();
        }
        self.sequencer.reset();
        self.enabled = false;
        self.nr50 = 0;
        self.nr51 = 0;
        self.sample_timer = 0;
        self.capacitor = StereoSample::default();
        self.next_buffer.clear();
    }

    /// Advance one machine cycle.
    pub fn tick(&mut self) {
        if self.enabled {
            if let Some(events) = self.sequencer.tick(CLOCKS_PER_TICK) {
                self.clock_sequencer(events);
            }
            for ch in &mut self.channels {
                ch.tick();
            }
        }

        self.sample_timer += CLOCKS_PER_TICK;
        while self.sample_timer >= self.sample_period {
            self.sample_timer -= self.sample_period;
            let sample = self.mix();
            self.next_buffer.push(sample);
            if self.next_buffer.len() >= self.config.buffer_size {
                self.commit();
            }
        }
    }

    fn clock_sequencer(&mut self, events: SequencerEvents) {
        if events.length {
            for ch in &mut self.channels {
                ch.tick_length();
            }
        }
        if events.sweep {
            self.channels[ChannelId::Pulse1.index()].tick_sweep();
        }
        if events.envelope {
            for ch in &mut self.channels {
                ch.tick_envelope();
            }
        }
    }

    /// One stereo sample from the current channel outputs.
    pub fn mix(&self) -> StereoSample {
        let mut left = 0.0;
        let mut right = 0.0;
        for (i, ch) in self.channels.iter().enumerate() {
            if !ch.enabled() || !self.config.channels[i] {
                continue;
            }
            let analog = ch.analog_amplitude();
            if self.nr51 & (0x10 << i) != 0 {
                left += analog;
            }
            if self.nr51 & (0x01 << i) != 0 {
                right += analog;
            }
        }
        let left_volume = ((self.nr50 >> 4) & 0x07) as f32;
        let right_volume = (self.nr50 & 0x07) as f32;
        StereoSample {
            left: left / 4.0 * left_volume / 7.0,
            right: right / 4.0 * right_volume / 7.0,
        }
    }

    fn commit(&mut self) {
        let mut samples =
            std::mem::replace(&mut self.next_buffer, Vec::with_capacity(self.config.buffer_size));
        if self.config.high_pass_filter {
            for sample in &mut samples {
                *sample = self.high_pass(*sample);
            }
        }
        if let Some(playback) = self.playback.as_mut() {
            playback(samples.clone());
        }
        self.buffer = samples;
    }

    fn high_pass(&mut self, input: StereoSample) -> StereoSample {
        let left = input.left - self.capacitor.left;
        self.capacitor.left = input.left - left * self.charge_factor;
        let right = input.right - self.capacitor.right;
        self.capacitor.right = input.right - right * self.charge_factor;
        StereoSample { left, right }
    }

    pub fn read_register(&self, addr: u16) -> u8 {
        match addr {
            0xFF10..=0xFF23 => {
                let (ch, reg) = channel_register(addr);
                self.channels[ch].read(reg)
            }
            NR50 => self.nr50,
            NR51 => self.nr51,
            NR52 => self.read_nr52(),
            WAVE_RAM_START..=WAVE_RAM_END => {
                self.channels[ChannelId::Wave.index()].read_wave((addr - WAVE_RAM_START) as usize)
            }
            _ => 0xFF,
        }
    }

    pub fn write_register(&mut self, addr: u16, val: u8) {
        match addr {
            0xFF10..=0xFF23 => {
                let (ch, reg) = channel_register(addr);
                self.channels[ch].write(reg, val, &self.sequencer);
                if reg == 4 && val & 0x80 != 0 {
                    apu_trace!(
                        "trigger ch{} step={} enabled={}",
                        ch + 1,
                        self.sequencer.step(),
                        self.channels[ch].enabled()
                    );
                }
            }
            NR50 => self.nr50 = val,
            NR51 => self.nr51 = val,
            NR52 => self.write_nr52(val),
            WAVE_RAM_START..=WAVE_RAM_END => self.channels[ChannelId::Wave.index()]
                .write_wave((addr - WAVE_RAM_START) as usize, val),
            _ => {}
        }
    }

    pub fn read_nr52(&self) -> u8 {
        let status = self
            .channels
            .iter()
            .enumerate()
            .filter(|(_, ch)| ch.enabled())
            .fold(0u8, |acc, (i, _)| acc | (1 << i));
        ((self.enabled as u8) << 7) | 0x70 | status
    }

    pub fn write_nr52(&mut self, val: u8) {
        let power = val & 0x80 != 0;
        if !power && self.enabled {
            apu_trace!("power off");
            for ch in &mut self.channels {
                ch.clear_registers();
            }
            self.nr50 = 0;
            self.nr51 = 0;
            self.enabled = false;
        } else if power && !self.enabled {
            apu_trace!("power on");
            self.sequencer.reset();
            self.enabled = true;
        }
    }
}

impl Default for Apu {
    fn default() -> Self {
        Self::new()
    }
}

impl ApuProxy for Apu {
    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn read_register(&self, addr: u16) -> u8 {
        Apu::read_register(self, addr)
    }

    fn write_register(&mut self, addr: u16, val: u8) {
        Apu::write_register(self, addr, val);
    }

    fn write_length(&mut self, channel: ChannelId, val: u8) {
        self.channels[channel.index()].write_length(val);
    }
}

/// Channel index and NRx register number for an address in 0xFF10..=0xFF23.
fn channel_register(addr: u16) -> (usize, u8) {
    let offset = addr - 0xFF10;
    ((offset / 5) as usize, (offset % 5) as u8)
}
