//! Transport state and controls
//!
//! Position is derived from a monotonically increasing sample clock and an
//! anchor `(beats, frame)` pair, so a tempo change only re-anchors and never
//! moves the playhead. Loop wrapping is applied on read.

use serde::{Deserialize, Serialize};

use crate::error::{CadenceError, Result};

pub const DEFAULT_SAMPLE_RATE: u32 = 44100;
pub const DEFAULT_BPM: f64 = 120.0;
pub const MAX_BPM: f64 = 999.0;
pub const DEFAULT_LOOP_START: f64 = 0.0;
pub const DEFAULT_LOOP_END: f64 = 16.0;

/// Transport playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

/// Meter of the project. Both parts are non-zero, including when loaded from JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawTimeSignature")]
pub struct TimeSignature {
    numerator: u8,
    denominator: u8,
}

#[derive(Deserialize)]
struct RawTimeSignature {
    numerator: u8,
    denominator: u8,
}

impl TryFrom<RawTimeSignature> for TimeSignature {
    type Error = CadenceError;

    fn try_from(raw: RawTimeSignature) -> Result<Self> {
        Self::new(raw.numerator, raw.denominator)
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self { numerator: 4, denominator: 4 }
    }
}

impl TimeSignature {
    pub fn new(numerator: u8, denominator: u8) -> Result<Self> {
        if numerator == 0 || denominator == 0 {
            return Err(CadenceError::invalid(format!(
                "time signature {numerator}/{denominator}"
            )));
        }
        Ok(Self { numerator, denominator })
    }

    pub fn numerator(&self) -> u8 {
        self.numerator
    }

    pub fn denominator(&self) -> u8 {
        self.denominator
    }

    /// Length of one bar in quarter-note beats
    pub fn beats_per_bar(&self) -> f64 {
        self.numerator as f64 * 4.0 / self.denominator as f64
    }
}

/// Loop region in beats, half-open `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoopRegion {
    pub start: f64,
    pub end: f64,
}

impl Default for LoopRegion {
    fn default() -> Self {
        Self { start: DEFAULT_LOOP_START, end: DEFAULT_LOOP_END }
    }
}

impl LoopRegion {
    pub fn new(start: f64, end: f64) -> Result<Self> {
        if !start.is_finite() || !end.is_finite() || start < 0.0 {
            return Err(CadenceError::invalid(format!("loop region {start}..{end}")));
        }
        if start >= end {
            return Err(CadenceError::invalid(format!(
                "loop start {start} must be before loop end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn length(&self) -> f64 {
        self.end - self.start
    }

    pub fn contains(&self, beat: f64) -> bool {
        beat >= self.start && beat < self.end
    }

    /// Fold a position that has run past the loop back into it
    pub fn wrap(&self, beat: f64) -> f64 {
        if self.contains(beat) {
            return beat;
        }
        let wrapped = self.start + (beat - self.start).rem_euclid(self.length());
        // rem_euclid can round up to the divisor
        if wrapped >= self.end { self.start } else { wrapped }
    }

    /// Where playback should sit when asked to be at `beat` while looping
    pub fn normalize(&self, beat: f64) -> f64 {
        if beat < self.start { self.start } else { self.wrap(beat) }
    }
}

/// A contiguous run of beats covered by one rendered block.
///
/// A block is split into several segments when it crosses the loop end.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeatSegment {
    pub from_beat: f64,
    pub to_beat: f64,
    /// Audio clock time (seconds) at `from_beat`
    pub clock_secs: f64,
}

/// Result of advancing the transport by one block
#[derive(Debug, Clone, PartialEq)]
pub struct BlockSpan {
    /// Audio clock time at the first frame of the block
    pub clock_secs: f64,
    pub frames: usize,
    pub secs_per_beat: f64,
    pub segments: Vec<BeatSegment>,
}

impl BlockSpan {
    pub fn idle(clock_secs: f64, frames: usize, secs_per_beat: f64) -> Self {
        Self { clock_secs, frames, secs_per_beat, segments: Vec::new() }
    }
}

/// Point-in-time view of the transport for UI polling
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportSnapshot {
    pub state: TransportState,
    pub position_beats: f64,
    pub position_secs: f64,
    pub bpm: f64,
    pub time_signature: TimeSignature,
    pub loop_enabled: bool,
    pub loop_start: f64,
    pub loop_end: f64,
    /// 1-based bar number
    pub bar: u32,
    /// 1-based beat within the bar
    pub beat: f64,
}

/// Transport controls and position
#[derive(Debug, Clone)]
pub struct Transport {
    state: TransportState,
    bpm: f64,
    time_signature: TimeSignature,
    loop_enabled: bool,
    loop_region: LoopRegion,
    sample_rate: u32,
    /// Frames rendered while playing
    clock_frames: u64,
    anchor_beats: f64,
    anchor_frame: u64,
}

impl Default for Transport {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_RATE)
    }
}

impl Transport {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            state: TransportState::Stopped,
            bpm: DEFAULT_BPM,
            time_signature: TimeSignature::default(),
            loop_enabled: false,
            loop_region: LoopRegion::default(),
            sample_rate: sample_rate.max(1),
            clock_frames: 0,
            anchor_beats: 0.0,
            anchor_frame: 0,
        }
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == TransportState::Playing
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn time_signature(&self) -> TimeSignature {
        self.time_signature
    }

    pub fn loop_enabled(&self) -> bool {
        self.loop_enabled
    }

    pub fn loop_region(&self) -> LoopRegion {
        self.loop_region
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn secs_per_beat(&self) -> f64 {
        60.0 / self.bpm
    }

    fn beats_per_frame(&self) -> f64 {
        self.bpm / (60.0 * self.sample_rate as f64)
    }

    /// Audio clock in seconds
    pub fn clock_secs(&self) -> f64 {
        self.clock_frames as f64 / self.sample_rate as f64
    }

    /// Position before loop folding at the given clock frame
    fn unwrapped_at(&self, frame: u64) -> f64 {
        self.anchor_beats + (frame - self.anchor_frame) as f64 * self.beats_per_frame()
    }

    fn fold(&self, beat: f64) -> f64 {
        if self.loop_enabled { self.loop_region.wrap(beat) } else { beat }
    }

    /// Current position in beats
    pub fn position_beats(&self) -> f64 {
        self.fold(self.unwrapped_at(self.clock_frames))
    }

    /// Current position in seconds at the current tempo
    pub fn position_secs(&self) -> f64 {
        self.position_beats() * self.secs_per_beat()
    }

    fn reanchor(&mut self, beats: f64) {
        self.anchor_beats = if self.loop_enabled { self.loop_region.normalize(beats) } else { beats };
        self.anchor_frame = self.clock_frames;
    }

    pub fn start(&mut self) {
        if self.state == TransportState::Playing {
            return;
        }
        self.state = TransportState::Playing;
    }

    pub fn pause(&mut self) {
        if self.state == TransportState::Playing {
            self.state = TransportState::Paused;
        }
    }

    /// Stop and return to the top (or the loop start while looping)
    pub fn stop(&mut self) {
        self.state = TransportState::Stopped;
        let home = if self.loop_enabled { self.loop_region.start } else { 0.0 };
        self.reanchor(home);
    }

    pub fn seek(&mut self, beats: f64) -> Result<()> {
        if !beats.is_finite() || beats < 0.0 {
            return Err(CadenceError::invalid(format!("seek position {beats}")));
        }
        self.reanchor(beats);
        Ok(())
    }

    pub fn seek_secs(&mut self, secs: f64) -> Result<()> {
        if !secs.is_finite() || secs < 0.0 {
            return Err(CadenceError::invalid(format!("seek position {secs}s")));
        }
        self.seek(secs / self.secs_per_beat())
    }

    /// Change tempo without moving the playhead
    pub fn set_tempo(&mut self, bpm: f64) -> Result<()> {
        if !bpm.is_finite() || bpm <= 0.0 || bpm > MAX_BPM {
            return Err(CadenceError::invalid(format!("tempo {bpm} BPM")));
        }
        let position = self.position_beats();
        self.bpm = bpm;
        self.reanchor(position);
        Ok(())
    }

    pub fn set_time_signature(&mut self, time_signature: TimeSignature) {
        self.time_signature = time_signature;
    }

    pub fn set_loop(&mut self, enabled: bool, start: f64, end: f64) -> Result<()> {
        let position = self.position_beats();
        match LoopRegion::new(start, end) {
            Ok(region) => self.loop_region = region,
            Err(err) if enabled => return Err(err),
            // a disabled loop keeps its previous region
            Err(_) => {}
        }
        self.loop_enabled = enabled;
        self.reanchor(position);
        Ok(())
    }

    /// Switch the audio clock to a new device rate, keeping clock time and position
    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        let sample_rate = sample_rate.max(1);
        if sample_rate == self.sample_rate {
            return;
        }
        let position = self.position_beats();
        let secs = self.clock_secs();
        self.sample_rate = sample_rate;
        self.clock_frames = (secs * sample_rate as f64).round() as u64;
        self.reanchor(position);
    }

    /// Advance the clock by one block and report which beats it covered.
    ///
    /// Nothing moves unless the transport is playing.
    pub fn advance(&mut self, frames: usize) -> BlockSpan {
        let clock_secs = self.clock_secs();
        let spb = self.secs_per_beat();
        if self.state != TransportState::Playing || frames == 0 {
            return BlockSpan::idle(clock_secs, frames, spb);
        }

        let start_frame = self.clock_frames;
        let end_frame = start_frame + frames as u64;
        let from = self.unwrapped_at(start_frame);
        let to = self.unwrapped_at(end_frame);
        self.clock_frames = end_frame;

        let segments = if self.loop_enabled {
            self.loop_segments(from, to, clock_secs, spb)
        } else {
            vec![BeatSegment { from_beat: from, to_beat: to, clock_secs }]
        };
        BlockSpan { clock_secs, frames, secs_per_beat: spb, segments }
    }

    fn loop_segments(&self, from: f64, to: f64, clock_secs: f64, spb: f64) -> Vec<BeatSegment> {
        let region = self.loop_region;
        let w_from = region.wrap(from);
        let w_to = region.wrap(to);
        let total = to - from;
        let first = region.end - w_from;

        if total < first {
            return vec![BeatSegment { from_beat: w_from, to_beat: w_to, clock_secs }];
        }

        let mut segments = vec![BeatSegment { from_beat: w_from, to_beat: region.end, clock_secs }];
        let tail = w_to - region.start;
        let full_laps = ((total - first - tail) / region.length()).round().max(0.0) as u64;
        let mut consumed = first;
        for _ in 0..full_laps {
            segments.push(BeatSegment {
                from_beat: region.start,
                to_beat: region.end,
                clock_secs: clock_secs + consumed * spb,
            });
            consumed += region.length();
        }
        if tail > 0.0 {
            segments.push(BeatSegment {
                from_beat: region.start,
                to_beat: w_to,
                clock_secs: clock_secs + consumed * spb,
            });
        }
        segments
    }

    pub fn snapshot(&self) -> TransportSnapshot {
        let position_beats = self.position_beats();
        let per_bar = self.time_signature.beats_per_bar();
        let bar = (position_beats / per_bar).floor();
        TransportSnapshot {
            state: self.state,
            position_beats,
            position_secs: position_beats * self.secs_per_beat(),
            bpm: self.bpm,
            time_signature: self.time_signature,
            loop_enabled: self.loop_enabled,
            loop_start: self.loop_region.start,
            loop_end: self.loop_region.end,
            bar: bar as u32 + 1,
            beat: position_beats - bar * per_bar + 1.0,
        }
    }
}
