//! Native audio effects using fundsp

use std::cmp::Ord;
use std::f32::consts::TAU;
use std::fmt;

use cadence_core::ParamValue;
use fundsp::hacker::*;

use super::AudioEffect;

fn number(value: &ParamValue) -> Option<f32> {
    value.as_number().filter(|v| v.is_finite()).map(|v| v as f32)
}

fn mix(dry: f32, wet: f32, amount: f32) -> f32 {
    dry * (1.0 - amount) + wet * amount
}

/// Schroeder style reverb built from parallel feedback delay lines
pub struct ReverbEffect {
    room_size: f32,
    /// High-frequency damping cutoff in Hz
    dampening: f32,
    wet: f32,
    delays: Vec<Vec<f32>>,
    positions: Vec<usize>,
    /// One-pole lowpass memory per delay line
    damp_state: Vec<f32>,
    sample_rate: f32,
    bypassed: bool,
}

impl ReverbEffect {
    pub fn new(room_size: f32, dampening: f32, wet: f32, sample_rate: f32) -> Self {
        let mut effect = Self {
            room_size: room_size.clamp(0.0, 1.0),
            dampening: dampening.clamp(500.0, 10000.0),
            wet: wet.clamp(0.0, 1.0),
            delays: Vec::new(),
            positions: Vec::new(),
            damp_state: Vec::new(),
            sample_rate,
            bypassed: false,
        };
        effect.rebuild_delays();
        effect
    }

    fn rebuild_delays(&mut self) {
        let base_delay = self.room_size * 50.0 + 10.0;
        let delay_times_ms = [base_delay, base_delay * 1.13, base_delay * 1.27, base_delay * 1.41];

        self.delays = delay_times_ms
            .iter()
            .map(|&ms| {
                let samples = (ms * self.sample_rate / 1000.0) as usize;
                vec![0.0; Ord::max(samples, 1)]
            })
            .collect();
        self.positions = vec![0; self.delays.len()];
        self.damp_state = vec![0.0; self.delays.len()];
    }

    /// Lowpass coefficient for the damping cutoff
    fn damp_coeff(&self) -> f32 {
        1.0 - (-TAU * self.dampening / self.sample_rate).exp()
    }
}

impl fmt::Debug for ReverbEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReverbEffect")
            .field("room_size", &self.room_size)
            .field("dampening", &self.dampening)
            .field("wet", &self.wet)
            .field("bypassed", &self.bypassed)
            .finish()
    }
}

impl AudioEffect for ReverbEffect {
    fn name(&self) -> &str {
        "Reverb"
    }

    fn process(&mut self, samples: &mut [f32]) {
        let feedback = 0.5 + self.room_size * 0.35;
        let coeff = self.damp_coeff();

        for sample in samples.iter_mut() {
            let dry = *sample;
            let mut wet = 0.0;

            for (i, delay_buf) in self.delays.iter_mut().enumerate() {
                let pos = self.positions[i];
                let delayed = delay_buf[pos];
                self.damp_state[i] += coeff * (delayed - self.damp_state[i]);
                wet += delayed;
                delay_buf[pos] = dry + self.damp_state[i] * feedback;
                self.positions[i] = (pos + 1) % delay_buf.len();
            }

            wet /= self.delays.len() as f32;
            *sample = mix(dry, wet, self.wet);
        }
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) {
        let Some(value) = number(value) else { return };
        match name {
            "roomSize" => {
                self.room_size = value.clamp(0.0, 1.0);
                self.rebuild_delays();
            }
            "dampening" => self.dampening = value.clamp(500.0, 10000.0),
            "wet" => self.wet = value.clamp(0.0, 1.0),
            _ => {}
        }
    }

    fn set_bypass(&mut self, bypass: bool) {
        self.bypassed = bypass;
    }

    fn is_bypassed(&self) -> bool {
        self.bypassed
    }

    fn set_sample_rate(&mut self, sample_rate: f32) {
        if (sample_rate - self.sample_rate).abs() < 1.0 {
            return;
        }
        self.sample_rate = sample_rate;
        self.rebuild_delays();
    }
}

/// Feedback delay
pub struct DelayEffect {
    delay_secs: f32,
    feedback: f32,
    wet: f32,
    buffer: Vec<f32>,
    write_pos: usize,
    sample_rate: f32,
    bypassed: bool,
}

const MAX_DELAY_SECS: f32 = 1.0;

impl DelayEffect {
    pub fn new(delay_secs: f32, feedback: f32, wet: f32, sample_rate: f32) -> Self {
        Self {
            delay_secs: delay_secs.clamp(0.01, MAX_DELAY_SECS),
            feedback: feedback.clamp(0.0, 0.95),
            wet: wet.clamp(0.0, 1.0),
            buffer: vec![0.0; Self::buffer_len(sample_rate)],
            write_pos: 0,
            sample_rate,
            bypassed: false,
        }
    }

    fn buffer_len(sample_rate: f32) -> usize {
        Ord::max((MAX_DELAY_SECS * sample_rate) as usize + 1, 2)
    }
}

impl fmt::Debug for DelayEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelayEffect")
            .field("delay_secs", &self.delay_secs)
            .field("feedback", &self.feedback)
            .field("wet", &self.wet)
            .field("bypassed", &self.bypassed)
            .finish()
    }
}

impl AudioEffect for DelayEffect {
    fn name(&self) -> &str {
        "Delay"
    }

    fn process(&mut self, samples: &mut [f32]) {
        let len = self.buffer.len();
        let delay_samples = ((self.delay_secs * self.sample_rate) as usize).clamp(1, len - 1);

        for sample in samples.iter_mut() {
            let read_pos = (self.write_pos + len - delay_samples) % len;
            let delayed = self.buffer[read_pos];
            self.buffer[self.write_pos] = *sample + delayed * self.feedback;
            self.write_pos = (self.write_pos + 1) % len;
            *sample = mix(*sample, delayed, self.wet);
        }
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) {
        let Some(value) = number(value) else { return };
        match name {
            "delayTime" => self.delay_secs = value.clamp(0.01, MAX_DELAY_SECS),
            "feedback" => self.feedback = value.clamp(0.0, 0.95),
            "wet" => self.wet = value.clamp(0.0, 1.0),
            _ => {}
        }
    }

    fn set_bypass(&mut self, bypass: bool) {
        self.bypassed = bypass;
    }

    fn is_bypassed(&self) -> bool {
        self.bypassed
    }

    fn set_sample_rate(&mut self, sample_rate: f32) {
        if (sample_rate - self.sample_rate).abs() < 1.0 {
            return;
        }
        self.sample_rate = sample_rate;
        self.buffer = vec![0.0; Self::buffer_len(sample_rate)];
        self.write_pos = 0;
    }
}

/// Soft-clipping waveshaper
#[derive(Debug)]
pub struct DistortionEffect {
    amount: f32,
    wet: f32,
    bypassed: bool,
}

impl DistortionEffect {
    pub fn new(amount: f32, wet: f32) -> Self {
        Self { amount: amount.clamp(0.0, 1.0), wet: wet.clamp(0.0, 1.0), bypassed: false }
    }
}

impl AudioEffect for DistortionEffect {
    fn name(&self) -> &str {
        "Distortion"
    }

    fn process(&mut self, samples: &mut [f32]) {
        let drive = 1.0 + self.amount * 20.0;
        let norm = drive.tanh();
        for sample in samples.iter_mut() {
            let shaped = (*sample * drive).tanh() / norm;
            *sample = mix(*sample, shaped, self.wet);
        }
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) {
        let Some(value) = number(value) else { return };
        match name {
            "distortion" => self.amount = value.clamp(0.0, 1.0),
            "wet" => self.wet = value.clamp(0.0, 1.0),
            _ => {}
        }
    }

    fn set_bypass(&mut self, bypass: bool) {
        self.bypassed = bypass;
    }

    fn is_bypassed(&self) -> bool {
        self.bypassed
    }
}

/// LFO-modulated short delay
pub struct ChorusEffect {
    rate_hz: f32,
    delay_ms: f32,
    depth: f32,
    wet: f32,
    buffer: Vec<f32>,
    write_pos: usize,
    lfo_phase: f32,
    sample_rate: f32,
    bypassed: bool,
}

impl ChorusEffect {
    pub fn new(rate_hz: f32, delay_ms: f32, depth: f32, wet: f32, sample_rate: f32) -> Self {
        Self {
            rate_hz: rate_hz.clamp(0.1, 10.0),
            delay_ms: delay_ms.clamp(1.0, 20.0),
            depth: depth.clamp(0.0, 1.0),
            wet: wet.clamp(0.0, 1.0),
            buffer: vec![0.0; Self::buffer_len(sample_rate)],
            write_pos: 0,
            lfo_phase: 0.0,
            sample_rate,
            bypassed: false,
        }
    }

    /// Room for the longest base delay plus full modulation
    fn buffer_len(sample_rate: f32) -> usize {
        Ord::max((0.045 * sample_rate) as usize, 4)
    }
}

impl fmt::Debug for ChorusEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChorusEffect")
            .field("rate_hz", &self.rate_hz)
            .field("delay_ms", &self.delay_ms)
            .field("depth", &self.depth)
            .field("wet", &self.wet)
            .finish()
    }
}

impl AudioEffect for ChorusEffect {
    fn name(&self) -> &str {
        "Chorus"
    }

    fn process(&mut self, samples: &mut [f32]) {
        let len = self.buffer.len();
        let base = self.delay_ms * self.sample_rate / 1000.0;
        let lfo_step = self.rate_hz / self.sample_rate;

        for sample in samples.iter_mut() {
            self.buffer[self.write_pos] = *sample;

            let lfo = (self.lfo_phase * TAU).sin();
            self.lfo_phase = (self.lfo_phase + lfo_step).fract();
            let delay = (base * (1.0 + self.depth * lfo)).clamp(1.0, (len - 2) as f32);

            // linear interpolation between the two nearest taps
            let read = self.write_pos as f32 - delay + len as f32;
            let i0 = read.floor() as usize % len;
            let i1 = (i0 + 1) % len;
            let frac = read.fract();
            let delayed = self.buffer[i0] * (1.0 - frac) + self.buffer[i1] * frac;

            self.write_pos = (self.write_pos + 1) % len;
            *sample = mix(*sample, delayed, self.wet);
        }
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) {
        let Some(value) = number(value) else { return };
        match name {
            "frequency" => self.rate_hz = value.clamp(0.1, 10.0),
            "delayTime" => self.delay_ms = value.clamp(1.0, 20.0),
            "depth" => self.depth = value.clamp(0.0, 1.0),
            "wet" => self.wet = value.clamp(0.0, 1.0),
            _ => {}
        }
    }

    fn set_bypass(&mut self, bypass: bool) {
        self.bypassed = bypass;
    }

    fn is_bypassed(&self) -> bool {
        self.bypassed
    }

    fn set_sample_rate(&mut self, sample_rate: f32) {
        if (sample_rate - self.sample_rate).abs() < 1.0 {
            return;
        }
        self.sample_rate = sample_rate;
        self.buffer = vec![0.0; Self::buffer_len(sample_rate)];
        self.write_pos = 0;
    }
}

/// Compressor using the fundsp limiter as the detector.
///
/// The limiter is driven at unity threshold; the ratio blends the limited
/// signal back toward the input so excess level above the threshold is
/// divided by `ratio`.
pub struct CompressorEffect {
    threshold_db: f32,
    ratio: f32,
    attack_secs: f32,
    release_secs: f32,
    limiter: An<Limiter<U1>>,
    bypassed: bool,
}

impl CompressorEffect {
    pub fn new(threshold_db: f32, ratio: f32, attack_secs: f32, release_secs: f32) -> Self {
        let attack_secs = attack_secs.clamp(0.001, 1.0);
        let release_secs = release_secs.clamp(0.01, 1.0);
        Self {
            threshold_db: threshold_db.clamp(-60.0, 0.0),
            ratio: ratio.clamp(1.0, 20.0),
            attack_secs,
            release_secs,
            limiter: limiter(attack_secs, release_secs),
            bypassed: false,
        }
    }
}

impl fmt::Debug for CompressorEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompressorEffect")
            .field("threshold_db", &self.threshold_db)
            .field("ratio", &self.ratio)
            .field("attack_secs", &self.attack_secs)
            .field("release_secs", &self.release_secs)
            .field("bypassed", &self.bypassed)
            .finish()
    }
}

impl AudioEffect for CompressorEffect {
    fn name(&self) -> &str {
        "Compressor"
    }

    fn process(&mut self, samples: &mut [f32]) {
        let threshold_linear = db_amp(self.threshold_db) as f32;
        for sample in samples.iter_mut() {
            let scaled = *sample / threshold_linear;
            let output = self.limiter.tick(&Frame::from([scaled]));
            let limited = output[0];
            *sample = (limited + (scaled - limited) / self.ratio) * threshold_linear;
        }
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) {
        let Some(value) = number(value) else { return };
        match name {
            "threshold" => self.threshold_db = value.clamp(-60.0, 0.0),
            "ratio" => self.ratio = value.clamp(1.0, 20.0),
            "attack" => {
                self.attack_secs = value.clamp(0.001, 1.0);
                self.limiter = limiter(self.attack_secs, self.release_secs);
            }
            "release" => {
                self.release_secs = value.clamp(0.01, 1.0);
                self.limiter = limiter(self.attack_secs, self.release_secs);
            }
            _ => {}
        }
    }

    fn set_bypass(&mut self, bypass: bool) {
        self.bypassed = bypass;
    }

    fn is_bypassed(&self) -> bool {
        self.bypassed
    }
}

/// Three-band equalizer: crossover filters split low and high, the
/// remainder is the mid band
pub struct Eq3Effect {
    low_db: f32,
    mid_db: f32,
    high_db: f32,
    low_hz: f32,
    high_hz: f32,
    low_split: An<FixedSvf<f64, LowpassMode<f64>>>,
    high_split: An<FixedSvf<f64, HighpassMode<f64>>>,
    bypassed: bool,
}

impl Eq3Effect {
    pub fn new(low_hz: f32, high_hz: f32, sample_rate: f32) -> Self {
        let mut low_split = lowpass_hz(low_hz, 0.707);
        low_split.set_sample_rate(sample_rate as f64);
        let mut high_split = highpass_hz(high_hz, 0.707);
        high_split.set_sample_rate(sample_rate as f64);
        Self {
            low_db: 0.0,
            mid_db: 0.0,
            high_db: 0.0,
            low_hz,
            high_hz,
            low_split,
            high_split,
            bypassed: false,
        }
    }
}

impl fmt::Debug for Eq3Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Eq3Effect")
            .field("low_db", &self.low_db)
            .field("mid_db", &self.mid_db)
            .field("high_db", &self.high_db)
            .field("low_hz", &self.low_hz)
            .field("high_hz", &self.high_hz)
            .finish()
    }
}

impl AudioEffect for Eq3Effect {
    fn name(&self) -> &str {
        "EQ3"
    }

    fn process(&mut self, samples: &mut [f32]) {
        let low_gain = db_amp(self.low_db) as f32;
        let mid_gain = db_amp(self.mid_db) as f32;
        let high_gain = db_amp(self.high_db) as f32;
        for sample in samples.iter_mut() {
            let input = Frame::from([*sample]);
            let low = self.low_split.tick(&input)[0];
            let high = self.high_split.tick(&input)[0];
            let mid = *sample - low - high;
            *sample = low * low_gain + mid * mid_gain + high * high_gain;
        }
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) {
        let Some(value) = number(value) else { return };
        match name {
            "low" => self.low_db = value.clamp(-24.0, 24.0),
            "mid" => self.mid_db = value.clamp(-24.0, 24.0),
            "high" => self.high_db = value.clamp(-24.0, 24.0),
            "lowFrequency" => {
                self.low_hz = value.clamp(20.0, 1000.0);
                self.low_split.set(Setting::center(self.low_hz));
            }
            "highFrequency" => {
                self.high_hz = value.clamp(1000.0, 10000.0);
                self.high_split.set(Setting::center(self.high_hz));
            }
            _ => {}
        }
    }

    fn set_bypass(&mut self, bypass: bool) {
        self.bypassed = bypass;
    }

    fn is_bypassed(&self) -> bool {
        self.bypassed
    }

    fn set_sample_rate(&mut self, sample_rate: f32) {
        self.low_split.set_sample_rate(sample_rate as f64);
        self.high_split.set_sample_rate(sample_rate as f64);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FilterMode {
    Lowpass,
    Highpass,
    Bandpass,
}

impl FilterMode {
    fn from_key(key: &str) -> Option<Self> {
        match key {
            "lowpass" => Some(Self::Lowpass),
            "highpass" => Some(Self::Highpass),
            "bandpass" => Some(Self::Bandpass),
            _ => None,
        }
    }
}

/// State-variable filter with selectable response
pub struct FilterEffect {
    mode: FilterMode,
    cutoff_hz: f32,
    q: f32,
    lowpass: An<FixedSvf<f64, LowpassMode<f64>>>,
    highpass: An<FixedSvf<f64, HighpassMode<f64>>>,
    bandpass: An<FixedSvf<f64, BandpassMode<f64>>>,
    sample_rate: f32,
    bypassed: bool,
}

impl FilterEffect {
    pub fn new(cutoff_hz: f32, q: f32, sample_rate: f32) -> Self {
        let mut effect = Self {
            mode: FilterMode::Lowpass,
            cutoff_hz,
            q,
            lowpass: lowpass_hz(cutoff_hz, q),
            highpass: highpass_hz(cutoff_hz, q),
            bandpass: bandpass_hz(cutoff_hz, q),
            sample_rate,
            bypassed: false,
        };
        effect.set_sample_rate(sample_rate);
        effect
    }

    /// Q is baked into the filter, so changing it rebuilds all three
    fn rebuild(&mut self) {
        self.lowpass = lowpass_hz(self.cutoff_hz, self.q);
        self.highpass = highpass_hz(self.cutoff_hz, self.q);
        self.bandpass = bandpass_hz(self.cutoff_hz, self.q);
        let sample_rate = self.sample_rate;
        self.set_sample_rate(sample_rate);
    }
}

impl fmt::Debug for FilterEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterEffect")
            .field("mode", &self.mode)
            .field("cutoff_hz", &self.cutoff_hz)
            .field("q", &self.q)
            .field("bypassed", &self.bypassed)
            .finish()
    }
}

impl AudioEffect for FilterEffect {
    fn name(&self) -> &str {
        "Filter"
    }

    fn process(&mut self, samples: &mut [f32]) {
        for sample in samples.iter_mut() {
            let input = Frame::from([*sample]);
            let output = match self.mode {
                FilterMode::Lowpass => self.lowpass.tick(&input),
                FilterMode::Highpass => self.highpass.tick(&input),
                FilterMode::Bandpass => self.bandpass.tick(&input),
            };
            *sample = output[0];
        }
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) {
        match name {
            "type" => {
                if let Some(mode) = value.as_text().and_then(FilterMode::from_key) {
                    self.mode = mode;
                }
            }
            "frequency" => {
                let Some(hz) = number(value) else { return };
                self.cutoff_hz = hz.clamp(20.0, 20000.0);
                self.lowpass.set(Setting::center(self.cutoff_hz));
                self.highpass.set(Setting::center(self.cutoff_hz));
                self.bandpass.set(Setting::center(self.cutoff_hz));
            }
            "q" => {
                let Some(q) = number(value) else { return };
                self.q = q.clamp(0.1, 10.0);
                self.rebuild();
            }
            _ => {}
        }
    }

    fn set_bypass(&mut self, bypass: bool) {
        self.bypassed = bypass;
    }

    fn is_bypassed(&self) -> bool {
        self.bypassed
    }

    fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        self.lowpass.set_sample_rate(sample_rate as f64);
        self.highpass.set_sample_rate(sample_rate as f64);
        self.bandpass.set_sample_rate(sample_rate as f64);
    }
}

/// Amplitude quantizer
#[derive(Debug)]
pub struct BitCrusherEffect {
    bits: f32,
    wet: f32,
    bypassed: bool,
}

impl BitCrusherEffect {
    pub fn new(bits: f32, wet: f32) -> Self {
        Self { bits: bits.clamp(1.0, 16.0), wet: wet.clamp(0.0, 1.0), bypassed: false }
    }
}

impl AudioEffect for BitCrusherEffect {
    fn name(&self) -> &str {
        "BitCrusher"
    }

    fn process(&mut self, samples: &mut [f32]) {
        let steps = 2f32.powf(self.bits.round()) / 2.0;
        for sample in samples.iter_mut() {
            let crushed = (*sample * steps).round() / steps;
            *sample = mix(*sample, crushed, self.wet);
        }
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) {
        let Some(value) = number(value) else { return };
        match name {
            "bits" => self.bits = value.clamp(1.0, 16.0),
            "wet" => self.wet = value.clamp(0.0, 1.0),
            _ => {}
        }
    }

    fn set_bypass(&mut self, bypass: bool) {
        self.bypassed = bypass;
    }

    fn is_bypassed(&self) -> bool {
        self.bypassed
    }
}

/// Amplitude LFO
#[derive(Debug)]
pub struct TremoloEffect {
    rate_hz: f32,
    depth: f32,
    phase: f32,
    sample_rate: f32,
    bypassed: bool,
}

impl TremoloEffect {
    pub fn new(rate_hz: f32, depth: f32, sample_rate: f32) -> Self {
        Self {
            rate_hz: rate_hz.clamp(0.1, 40.0),
            depth: depth.clamp(0.0, 1.0),
            phase: 0.0,
            sample_rate,
            bypassed: false,
        }
    }
}

impl AudioEffect for TremoloEffect {
    fn name(&self) -> &str {
        "Tremolo"
    }

    fn process(&mut self, samples: &mut [f32]) {
        let step = self.rate_hz / self.sample_rate;
        for sample in samples.iter_mut() {
            let lfo = 0.5 + 0.5 * (self.phase * TAU).sin();
            *sample *= 1.0 - self.depth * lfo;
            self.phase = (self.phase + step).fract();
        }
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) {
        let Some(value) = number(value) else { return };
        match name {
            "frequency" => self.rate_hz = value.clamp(0.1, 40.0),
            "depth" => self.depth = value.clamp(0.0, 1.0),
            _ => {}
        }
    }

    fn set_bypass(&mut self, bypass: bool) {
        self.bypassed = bypass;
    }

    fn is_bypassed(&self) -> bool {
        self.bypassed
    }

    fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn impulse(len: usize) -> Vec<f32> {
        let mut v = vec![0.0; len];
        v[0] = 1.0;
        v
    }

    #[test]
    fn test_delay_echo_position() {
        let mut delay = DelayEffect::new(0.01, 0.0, 1.0, 1000.0);
        let mut samples = impulse(32);
        delay.process(&mut samples);
        assert_eq!(samples[0], 0.0);
        assert_eq!(samples[10], 1.0);
    }

    #[test]
    fn test_delay_param_names() {
        let mut delay = DelayEffect::new(0.25, 0.4, 0.3, 44100.0);
        delay.set_param("delayTime", &ParamValue::Number(0.5));
        delay.set_param("feedback", &ParamValue::Number(2.0));
        delay.set_param("bogus", &ParamValue::Number(1.0));
        assert_eq!(delay.delay_secs, 0.5);
        assert_eq!(delay.feedback, 0.95);
    }

    #[test]
    fn test_reverb_tail() {
        let mut reverb = ReverbEffect::new(0.7, 3000.0, 1.0, 8000.0);
        let mut samples = impulse(4000);
        reverb.process(&mut samples);
        let tail: f32 = samples[1000..].iter().map(|s| s.abs()).sum();
        assert!(tail > 0.0);
        assert!(samples.iter().all(|s| s.abs() < 2.0));
    }

    #[test]
    fn test_bitcrusher_quantizes() {
        let mut crush = BitCrusherEffect::new(1.0, 1.0);
        let mut samples = vec![0.3, -0.8, 0.05];
        crush.process(&mut samples);
        assert_eq!(samples, vec![0.0, -1.0, 0.0]);
    }

    #[test]
    fn test_filter_type_choice() {
        let mut filter = FilterEffect::new(1000.0, 0.707, 44100.0);
        filter.set_param("type", &ParamValue::from("highpass"));
        assert_eq!(filter.mode, FilterMode::Highpass);
        filter.set_param("type", &ParamValue::from("notch"));
        assert_eq!(filter.mode, FilterMode::Highpass);

        // highpass removes DC
        let mut samples = vec![1.0; 44100];
        filter.process(&mut samples);
        assert!(samples[44099].abs() < 0.01);
    }

    #[test]
    fn test_tremolo_depth_zero_is_transparent() {
        let mut trem = TremoloEffect::new(5.0, 0.0, 44100.0);
        let mut samples = vec![0.5; 128];
        trem.process(&mut samples);
        assert!(samples.iter().all(|s| *s == 0.5));
    }

    #[test]
    fn test_distortion_bounded() {
        let mut dist = DistortionEffect::new(1.0, 1.0);
        let mut samples = vec![4.0, -4.0, 0.0];
        dist.process(&mut samples);
        assert!(samples[0] <= 1.0001 && samples[1] >= -1.0001);
        assert_eq!(samples[2], 0.0);
    }
}
