//! The four sound generators. Every channel shares the same outer state
//! (enable, DAC, length counter, period and frequency timer); what differs
//! lives in [`Voice`].

use super::FrameSequencer;

// Duty table for pulse channels (CH1, CH2). Index (0..3) corresponds to the
// duty selector in NRx1.
pub const DUTY_PATTERNS: [[u8; 8]; 4] = [
    [0, 0, 0, 0, 0, 0, 0, 1], // 12.5%
    [1, 0, 0, 0, 0, 0, 0, 1], // 25%
    [1, 0, 0, 0, 0, 1, 1, 1], // 50%
    [0, 1, 1, 1, 1, 1, 1, 0], // 75%
];

/// Length counter reload value used when a channel triggers with an expired counter.
pub const DEFAULT_LENGTH: [u16; 4] = [64, 64, 256, 64];

/// Right shift applied to wave samples per NR32 output level (0 mutes).
pub const WAVE_SHIFT: [u8; 4] = [4, 0, 1, 2];

/// Noise divisors in machine cycles, indexed by the NR43 divider code.
pub const NOISE_DIVISORS: [u32; 8] = [2, 4, 8, 12, 16, 20, 24, 28];

/// Maps a 4-bit digital level onto the DAC's output range, 0 -> +1.0, 15 -> -1.0.
pub const DAC_LUT: [f32; 16] = dac_table();

const WAVE_SPEED_FACTOR: u32 = 2;
const MAX_PERIOD: u16 = 0x7FF;
const WAVE_RAM_SAMPLES: usize = 32;

const fn dac_table() -> [f32; 16] {
    let mut table = [0.0; 16];
    let mut i = 0;
    while i < 16 {
        table[i] = 1.0 - (i as f32 / 15.0) * 2.0;
        i += 1;
    }
    table
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelId {
    Pulse1,
    Pulse2,
    Wave,
    Noise,
}

impl ChannelId {
    pub const ALL: [ChannelId; 4] = [
        ChannelId::Pulse1,
        ChannelId::Pulse2,
        ChannelId::Wave,
        ChannelId::Noise,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Envelope {
    initial_volume: u8,
    increase: bool,
    pace: u8,
    volume: u8,
    timer: u8,
}

impl Envelope {
    fn read(&self) -> u8 {
        (self.initial_volume << 4) | ((self.increase as u8) << 3) | self.pace
    }

    fn write(&mut self, val: u8) {
        self.initial_volume = val >> 4;
        self.increase = val & 0x08 != 0;
        self.pace = val & 0x07;
    }

    fn trigger(&mut self) {
        self.volume = self.initial_volume;
        self.timer = self.pace;
    }

    fn tick(&mut self) {
        if self.pace == 0 {
            return;
        }
        if self.timer > 0 {
            self.timer -= 1;
        }
        if self.timer == 0 {
            self.timer = self.pace;
            if self.increase && self.volume < 15 {
                self.volume += 1;
            } else if !self.increase && self.volume > 0 {
                self.volume -= 1;
            }
        }
    }
}

// Channel 1 frequency sweep.
#[derive(Debug, Default, Clone, Copy)]
struct Sweep {
    pace: u8,
    decrease: bool,
    step: u8,
    timer: u8,
    shadow: u16,
    enabled: bool,
}

impl Sweep {
    fn read(&self) -> u8 {
        0x80 | (self.pace << 4) | ((self.decrease as u8) << 3) | self.step
    }

    fn write(&mut self, val: u8) {
        self.pace = (val >> 4) & 0x07;
        self.decrease = val & 0x08 != 0;
        self.step = val & 0x07;
    }

    fn next_period(&self) -> u16 {
        let delta = self.shadow >> self.step;
        if self.decrease {
            self.shadow.wrapping_sub(delta)
        } else {
            self.shadow.wrapping_add(delta)
        }
    }

    fn reload_timer(&mut self) {
        self.timer = if self.pace == 0 { 8 } else { self.pace };
    }
}

#[derive(Debug, Clone)]
struct Pulse {
    duty: u8,
    duty_step: u8,
    envelope: Envelope,
    sweep: Option<Sweep>,
}

#[derive(Debug, Clone)]
struct Wave {
    samples: [u8; WAVE_RAM_SAMPLES],
    position: usize,
    output_level: u8,
}

#[derive(Debug, Clone)]
struct Noise {
    envelope: Envelope,
    clock_shift: u8,
    short_mode: bool,
    divider: u8,
    lfsr: u16,
}

impl Noise {
    fn reload(&self) -> u32 {
        NOISE_DIVISORS[self.divider as usize] << self.clock_shift
    }

    fn clock_lfsr(&mut self) {
        let bit = !(self.lfsr ^ (self.lfsr >> 1)) & 1;
        let tap = if self.short_mode { 7 } else { 15 };
        self.lfsr = (self.lfsr & !(1 << tap)) | (bit << tap);
        self.lfsr >>= 1;
    }
}

#[derive(Debug, Clone)]
enum Voice {
    Pulse(Pulse),
    Wave(Wave),
    Noise(Noise),
}

/// One APU channel. Registers are addressed by their index within the
/// channel's five-byte block (NRx0..NRx4).
#[derive(Debug, Clone)]
pub struct Channel {
    id: ChannelId,
    enabled: bool,
    dac_enabled: bool,
    length_enabled: bool,
    length_timer: u16,
    period: u16,
    frequency_timer: u32,
    voice: Voice,
}

impl Channel {
    pub fn new(id: ChannelId) -> Self {
        let voice = match id {
            ChannelId::Pulse1 | ChannelId::Pulse2 => Voice::Pulse(Pulse {
                duty: 0,
                duty_step: 0,
                envelope: Envelope::default(),
                sweep: (id == ChannelId::Pulse1).then(Sweep::default),
            }),
            ChannelId::Wave => Voice::Wave(Wave {
                samples: [0; WAVE_RAM_SAMPLES],
                position: 0,
                output_level: 0,
            }),
            ChannelId::Noise => Voice::Noise(Noise {
                envelope: Envelope::default(),
                clock_shift: 0,
                short_mode: false,
                divider: 0,
                lfsr: 0,
            }),
        };
        Self {
            id,
            enabled: false,
            dac_enabled: false,
            length_enabled: false,
            length_timer: 0,
            period: 0,
            frequency_timer: 0,
            voice,
        }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn dac_enabled(&self) -> bool {
        self.dac_enabled
    }

    pub fn length_timer(&self) -> u16 {
        self.length_timer
    }

    pub fn period(&self) -> u16 {
        self.period
    }

    /// Current envelope volume, or `None` for the wave channel.
    pub fn volume(&self) -> Option<u8> {
        match &self.voice {
            Voice::Pulse(p) => Some(p.envelope.volume),
            Voice::Noise(n) => Some(n.envelope.volume),
            Voice::Wave(_) => None,
        }
    }

    pub fn lfsr(&self) -> Option<u16> {
        match &self.voice {
            Voice::Noise(n) => Some(n.lfsr),
            _ => None,
        }
    }

    pub fn has_envelope(&self) -> bool {
        !matches!(self.voice, Voice::Wave(_))
    }

    pub fn disable(&mut self) {
        self.enabled = false;
    }

    /// Back to power-on state. Wave RAM is not cleared.
    pub fn reset(&mut self) {
        let mut fresh = Self::new(self.id);
        if let (Voice::Wave(old), Voice::Wave(new)) = (&self.voice, &mut fresh.voice) {
            new.samples = old.samples;
        }
        *self = fresh;
    }

    /// Zero every register-backed field, as powering the APU off does. The
    /// length counter and wave RAM survive.
    pub fn clear_registers(&mut self) {
        self.enabled = false;
        self.dac_enabled = false;
        self.length_enabled = false;
        self.period = 0;
        match &mut self.voice {
            Voice::Pulse(p) => {
                p.duty = 0;
                p.envelope = Envelope::default();
                if let Some(sweep) = p.sweep.as_mut() {
                    *sweep = Sweep::default();
                }
            }
            Voice::Wave(w) => w.output_level = 0,
            Voice::Noise(n) => {
                n.envelope = Envelope::default();
                n.clock_shift = 0;
                n.short_mode = false;
                n.divider = 0;
            }
        }
    }

    pub fn read(&self, reg: u8) -> u8 {
        match (reg, &self.voice) {
            (0, Voice::Pulse(p)) => p.sweep.map_or(0xFF, |s| s.read()),
            (0, Voice::Wave(_)) => ((self.dac_enabled as u8) << 7) | 0x7F,
            (1, Voice::Pulse(p)) => (p.duty << 6) | 0x3F,
            (2, Voice::Pulse(p)) => p.envelope.read(),
            (2, Voice::Noise(n)) => n.envelope.read(),
            (2, Voice::Wave(w)) => (w.output_level << 5) | 0x9F,
            (3, Voice::Noise(n)) => (n.clock_shift << 4) | ((n.short_mode as u8) << 3) | n.divider,
            (4, _) => 0xBF | ((self.length_enabled as u8) << 6),
            _ => 0xFF,
        }
    }

    pub fn write(&mut self, reg: u8, val: u8, sequencer: &FrameSequencer) {
        match reg {
            0 => match &mut self.voice {
                Voice::Pulse(Pulse {
                    sweep: Some(sweep), ..
                }) => sweep.write(val),
                Voice::Wave(_) => self.set_dac(val & 0x80 != 0),
                _ => {}
            },
            1 => self.write_length(val),
            2 => match &mut self.voice {
                Voice::Pulse(Pulse { envelope, .. }) | Voice::Noise(Noise { envelope, .. }) => {
                    envelope.write(val);
                    self.set_dac(val & 0xF8 != 0);
                }
                Voice::Wave(w) => w.output_level = (val >> 5) & 0x03,
            },
            3 => match &mut self.voice {
                Voice::Noise(n) => {
                    n.clock_shift = val >> 4;
                    n.short_mode = val & 0x08 != 0;
                    n.divider = val & 0x07;
                }
                _ => self.period = (self.period & 0x0700) | val as u16,
            },
            4 => {
                if !matches!(self.voice, Voice::Noise(_)) {
                    self.period = (self.period & 0x00FF) | (((val & 0x07) as u16) << 8);
                }
                self.length_enabled = val & 0x40 != 0;
                if val & 0x80 != 0 {
                    self.trigger(sequencer);
                }
            }
            _ => {}
        }
    }

    /// NRx1 store: reloads the length counter from the low bits and, for
    /// pulse channels, latches the duty.
    pub fn write_length(&mut self, val: u8) {
        let mask = if self.id == ChannelId::Wave { 0xFF } else { 0x3F };
        self.length_timer = DEFAULT_LENGTH[self.id.index()] - (val & mask) as u16;
        if let Voice::Pulse(p) = &mut self.voice {
            p.duty = val >> 6;
        }
    }

    pub fn trigger(&mut self, sequencer: &FrameSequencer) {
        self.enabled = true;
        if self.length_timer == 0 {
            self.length_timer = DEFAULT_LENGTH[self.id.index()];
            if sequencer.will_tick_length() {
                self.length_timer -= 1;
            } else if self.has_envelope() && sequencer.will_tick_envelope() {
                self.length_timer += 1;
            }
        }

        let period = self.period;
        match &mut self.voice {
            Voice::Pulse(p) => {
                self.frequency_timer = 2048 - period as u32;
                p.envelope.trigger();
                if let Some(sweep) = p.sweep.as_mut() {
                    sweep.shadow = period;
                    sweep.reload_timer();
                    sweep.enabled = sweep.pace > 0 || sweep.step > 0;
                    if sweep.step > 0 && sweep.next_period() > MAX_PERIOD {
                        self.enabled = false;
                    }
                }
            }
            Voice::Wave(w) => {
                w.position = 0;
                self.frequency_timer = wave_reload(period);
            }
            Voice::Noise(n) => {
                n.envelope.trigger();
                n.lfsr = 0;
                self.frequency_timer = n.reload();
            }
        }

        if !self.dac_enabled {
            self.enabled = false;
        }
    }

    /// Advance the frequency timer by one machine cycle.
    pub fn tick(&mut self) {
        if self.frequency_timer > 0 {
            self.frequency_timer -= 1;
        }
        if self.frequency_timer != 0 {
            return;
        }
        let period = self.period;
        match &mut self.voice {
            Voice::Pulse(p) => {
                self.frequency_timer = 2048 - period as u32;
                p.duty_step = (p.duty_step + 1) % 8;
            }
            Voice::Wave(w) => {
                self.frequency_timer = wave_reload(period);
                w.position = (w.position + 1) % WAVE_RAM_SAMPLES;
            }
            Voice::Noise(n) => {
                self.frequency_timer = n.reload();
                n.clock_lfsr();
            }
        }
    }

    pub fn tick_length(&mut self) {
        if self.length_enabled && self.length_timer > 0 {
            self.length_timer -= 1;
            if self.length_timer == 0 {
                self.enabled = false;
            }
        }
    }

    pub fn tick_envelope(&mut self) {
        match &mut self.voice {
            Voice::Pulse(p) => p.envelope.tick(),
            Voice::Noise(n) => n.envelope.tick(),
            Voice::Wave(_) => {}
        }
    }

    pub fn tick_sweep(&mut self) {
        let Voice::Pulse(Pulse {
            sweep: Some(sweep), ..
        }) = &mut self.voice
        else {
            return;
        };
        if sweep.timer > 0 {
            sweep.timer -= 1;
        }
        if sweep.timer != 0 {
            return;
        }
        sweep.reload_timer();
        if !sweep.enabled || sweep.pace == 0 {
            return;
        }
        let period = sweep.next_period();
        if period > MAX_PERIOD {
            self.enabled = false;
            return;
        }
        if sweep.step > 0 {
            sweep.shadow = period;
            self.period = period;
            if sweep.next_period() > MAX_PERIOD {
                self.enabled = false;
            }
        }
    }

    /// Digital output level, 0..=15.
    pub fn amplitude(&self) -> u8 {
        if !self.enabled {
            return 0;
        }
        match &self.voice {
            Voice::Pulse(p) => {
                DUTY_PATTERNS[p.duty as usize][p.duty_step as usize] * p.envelope.volume
            }
            Voice::Wave(w) => w.samples[w.position] >> WAVE_SHIFT[w.output_level as usize],
            Voice::Noise(n) => (n.lfsr & 1) as u8 * n.envelope.volume,
        }
    }

    pub fn analog_amplitude(&self) -> f32 {
        if !self.dac_enabled {
            return 0.0;
        }
        DAC_LUT[self.amplitude() as usize]
    }

    /// Wave RAM byte `offset` (0..16). Reads float high while the channel plays.
    pub fn read_wave(&self, offset: usize) -> u8 {
        match &self.voice {
            Voice::Wave(w) if !self.enabled => {
                (w.samples[offset * 2] << 4) | w.samples[offset * 2 + 1]
            }
            _ => 0xFF,
        }
    }

    pub fn write_wave(&mut self, offset: usize, val: u8) {
        if self.enabled {
            return;
        }
        if let Voice::Wave(w) = &mut self.voice {
            w.samples[offset * 2] = val >> 4;
            w.samples[offset * 2 + 1] = val & 0x0F;
        }
    }

    fn set_dac(&mut self, on: bool) {
        self.dac_enabled = on;
        if !on {
            self.enabled = false;
        }
    }
}

fn wave_reload(period: u16) -> u32 {
    ((2048 - period as u32) / WAVE_SPEED_FACTOR).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn powered(id: ChannelId) -> Channel {
        let mut ch = Channel::new(id);
        let seq = FrameSequencer::default();
        match id {
            ChannelId::Wave => ch.write(0, 0x80, &seq),
            _ => ch.write(2, 0xF0, &seq),
        }
        ch
    }

    #[test]
    fn dac_lut_endpoints_and_monotonic() {
        assert_eq!(DAC_LUT[0], 1.0);
        assert_eq!(DAC_LUT[15], -1.0);
        assert!(DAC_LUT.windows(2).all(|w| w[0] > w[1]));
    }

    #[test]
    fn lfsr_short_mode_sequence() {
        let mut ch = powered(ChannelId::Noise);
        let seq = FrameSequencer::default();
        ch.write(3, 0x08, &seq);
        ch.write(4, 0x80, &seq);
        assert_eq!(ch.lfsr(), Some(0));

        let expected = [0x40, 0x60, 0x70, 0x78, 0x7C, 0x7E, 0x3F, 0x5F, 0x6F, 0x77];
        for want in expected {
            let Voice::Noise(n) = &mut ch.voice else {
                unreachable!()
            };
            n.clock_lfsr();
            assert_eq!(n.lfsr, want);
        }
    }

    #[test]
    fn lfsr_long_mode_feeds_bit_fifteen() {
        let mut ch = powered(ChannelId::Noise);
        let seq = FrameSequencer::default();
        ch.write(4, 0x80, &seq);
        let Voice::Noise(n) = &mut ch.voice else {
            unreachable!()
        };
        n.clock_lfsr();
        assert_eq!(n.lfsr, 0x4000);
        n.clock_lfsr();
        assert_eq!(n.lfsr, 0x6000);
    }

    #[test]
    fn noise_timer_uses_divisor_and_shift() {
        let mut ch = powered(ChannelId::Noise);
        let seq = FrameSequencer::default();
        // divider 1 (4 cycles) shifted by 2 -> 16 cycles per LFSR clock
        ch.write(3, 0x21, &seq);
        ch.write(4, 0x80, &seq);
        for _ in 0..15 {
            ch.tick();
        }
        assert_eq!(ch.lfsr(), Some(0));
        ch.tick();
        assert_eq!(ch.lfsr(), Some(0x4000));
    }

    #[test]
    fn sweep_overflow_disables_on_trigger() {
        let mut ch = powered(ChannelId::Pulse1);
        let seq = FrameSequencer::default();
        ch.write(0, 0x11, &seq); // pace 1, increase, step 1
        ch.write(3, 0xFF, &seq);
        ch.write(4, 0x86, &seq); // period 0x6FF -> 0x6FF + 0x37F overflows
        assert!(!ch.enabled());
    }

    #[test]
    fn sweep_commits_and_prechecks() {
        let mut ch = powered(ChannelId::Pulse1);
        let seq = FrameSequencer::default();
        ch.write(0, 0x11, &seq);
        ch.write(3, 0x00, &seq);
        ch.write(4, 0x84, &seq); // period 0x400
        assert!(ch.enabled());
        ch.tick_sweep();
        // 0x400 + 0x200 = 0x600 committed; next would be 0x900 -> disabled
        assert_eq!(ch.period(), 0x600);
        assert!(!ch.enabled());
    }

    #[test]
    fn sweep_decrease_never_overflows() {
        let mut ch = powered(ChannelId::Pulse1);
        let seq = FrameSequencer::default();
        ch.write(0, 0x19, &seq); // pace 1, decrease, step 1
        ch.write(3, 0x00, &seq);
        ch.write(4, 0x84, &seq);
        ch.tick_sweep();
        assert_eq!(ch.period(), 0x200);
        assert!(ch.enabled());
    }

    #[test]
    fn envelope_steps_volume_down_and_clamps() {
        let mut ch = Channel::new(ChannelId::Pulse2);
        let seq = FrameSequencer::default();
        ch.write(2, 0x21, &seq); // volume 2, decrease, pace 1
        ch.write(4, 0x80, &seq);
        assert_eq!(ch.volume(), Some(2));
        ch.tick_envelope();
        assert_eq!(ch.volume(), Some(1));
        ch.tick_envelope();
        ch.tick_envelope();
        assert_eq!(ch.volume(), Some(0));
    }

    #[test]
    fn envelope_pace_zero_holds_volume() {
        let mut ch = Channel::new(ChannelId::Pulse2);
        let seq = FrameSequencer::default();
        ch.write(2, 0xA8, &seq);
        ch.write(4, 0x80, &seq);
        for _ in 0..16 {
            ch.tick_envelope();
        }
        assert_eq!(ch.volume(), Some(10));
    }

    #[test]
    fn length_expiry_disables() {
        let mut ch = powered(ChannelId::Pulse2);
        let seq = FrameSequencer::default();
        ch.write(1, 0x3E, &seq); // length 2
        ch.write(4, 0xC0, &seq);
        ch.tick_length();
        assert!(ch.enabled());
        ch.tick_length();
        assert!(!ch.enabled());
    }

    #[test]
    fn wave_length_uses_full_byte() {
        let mut ch = Channel::new(ChannelId::Wave);
        ch.write_length(0x10);
        assert_eq!(ch.length_timer(), 256 - 0x10);
    }

    #[test]
    fn square_duty_and_amplitude() {
        let mut ch = powered(ChannelId::Pulse2);
        let seq = FrameSequencer::default();
        ch.write(1, 0x80, &seq); // 50%
        ch.write(3, 0xFF, &seq);
        ch.write(4, 0x87, &seq); // period 0x7FF -> one cycle per step
        // Step 0 of the 50% pattern is high.
        assert_eq!(ch.amplitude(), 15);
        ch.tick();
        assert_eq!(ch.amplitude(), 0);
        assert_eq!(ch.analog_amplitude(), 1.0);
    }

    #[test]
    fn wave_ram_blocked_while_playing() {
        let mut ch = powered(ChannelId::Wave);
        let seq = FrameSequencer::default();
        ch.write_wave(0, 0x9A);
        assert_eq!(ch.read_wave(0), 0x9A);
        ch.write(2, 0x20, &seq);
        ch.write(4, 0x80, &seq);
        assert_eq!(ch.read_wave(0), 0xFF);
        ch.write_wave(0, 0x11);
        ch.disable();
        assert_eq!(ch.read_wave(0), 0x9A);
    }

    #[test]
    fn reset_keeps_wave_ram() {
        let mut ch = powered(ChannelId::Wave);
        let seq = FrameSequencer::default();
        ch.write_wave(3, 0x5A);
        ch.write(2, 0x20, &seq);
        ch.write(4, 0x80, &seq);
        ch.reset();
        assert!(!ch.enabled());
        assert!(!ch.dac_enabled());
        assert_eq!(ch.read_wave(3), 0x5A);
    }

    #[test]
    fn wave_output_level_shifts() {
        let mut ch = powered(ChannelId::Wave);
        let seq = FrameSequencer::default();
        ch.write_wave(0, 0xC0);
        ch.write(2, 0x40, &seq); // level 2 -> shift 1
        ch.write(4, 0x80, &seq);
        assert_eq!(ch.amplitude(), 0x06);
        ch.write(2, 0x00, &seq);
        assert_eq!(ch.amplitude(), 0);
    }

    #[test]
    fn dac_off_disables_and_silences() {
        let mut ch = powered(ChannelId::Pulse2);
        let seq = FrameSequencer::default();
        ch.write(4, 0x80, &seq);
        assert!(ch.enabled());
        ch.write(2, 0x00, &seq);
        assert!(!ch.enabled());
        assert_eq!(ch.analog_amplitude(), 0.0);
        ch.write(4, 0x80, &seq);
        assert!(!ch.enabled());
    }

    #[test]
    fn register_read_masks() {
        let mut ch = Channel::new(ChannelId::Pulse1);
        let seq = FrameSequencer::default();
        ch.write(0, 0x00, &seq);
        assert_eq!(ch.read(0), 0x80);
        ch.write(1, 0xFF, &seq);
        assert_eq!(ch.read(1), 0xFF);
        ch.write(3, 0x12, &seq);
        assert_eq!(ch.read(3), 0xFF);
        ch.write(4, 0x40, &seq);
        assert_eq!(ch.read(4), 0xFF);
        ch.write(4, 0x00, &seq);
        assert_eq!(ch.read(4), 0xBF);

        let noise = Channel::new(ChannelId::Noise);
        assert_eq!(noise.read(0), 0xFF);
        assert_eq!(noise.read(1), 0xFF);
    }
}
