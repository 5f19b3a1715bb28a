//! Audio engine: drives the session clock and the mixer from the device callback

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use cadence_core::{Session, TransportSnapshot};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::audio_io::{AudioOutputError, RealtimeOutputStream};
use crate::mixer::Mixer;

#[derive(Debug, Error)]
pub enum AudioEngineError {
    #[error("Audio output error: {0}")]
    Output(#[from] AudioOutputError),
    #[error("Engine already running")]
    AlreadyRunning,
    #[error("Engine not running")]
    NotRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Rate used until a device reports its own
    pub sample_rate: u32,
    /// Largest block handed to the session at once
    pub block_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { sample_rate: 44_100, block_size: 512 }
    }
}

/// Audio engine state shared between the control side and the audio thread
#[derive(Debug)]
pub struct EngineState {
    pub session: Mutex<Session>,
    pub mixer: Mutex<Mixer>,
    /// Mirrors the transport after every block for lock-free polling
    pub playing: AtomicBool,
}

impl EngineState {
    fn new(session: Session) -> Self {
        let sample_rate = session.transport().sample_rate() as f32;
        let mut mixer = Mixer::new(sample_rate);
        mixer.sync(session.registry());
        Self { session: Mutex::new(session), mixer: Mutex::new(mixer), playing: AtomicBool::new(false) }
    }
}

/// Render `frames` frames of the session into the mixer's stereo bus
fn render_block<'m>(session: &mut Session, mixer: &'m mut Mixer, frames: usize) -> (&'m [f32], &'m [f32]) {
    for event in session.drain_events() {
        mixer.apply(event);
    }
    let span = session.render_block(frames, mixer);
    mixer.render(span.clock_secs, frames)
}

/// Audio engine for session playback
pub struct AudioEngine {
    state: Arc<EngineState>,
    stream: Option<RealtimeOutputStream>,
    config: EngineConfig,
}

impl std::fmt::Debug for AudioEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioEngine")
            .field("config", &self.config)
            .field("running", &self.stream.is_some())
            .finish()
    }
}

impl AudioEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self::from_session(Session::new(config.sample_rate), config)
    }

    pub fn from_session(session: Session, config: EngineConfig) -> Self {
        Self { state: Arc::new(EngineState::new(session)), stream: None, config }
    }

    /// Get shared state for UI access
    pub fn state(&self) -> Arc<EngineState> {
        self.state.clone()
    }

    pub fn config(&self) -> EngineConfig {
        self.config
    }

    pub fn is_running(&self) -> bool {
        self.stream.is_some()
    }

    /// Open the default output device and start pulling blocks from it.
    ///
    /// The session switches to the device's sample rate on the first callback.
    pub fn start(&mut self) -> Result<(), AudioEngineError> {
        if self.stream.is_some() {
            return Err(AudioEngineError::AlreadyRunning);
        }

        let state = self.state.clone();
        let block_size = self.config.block_size;
        let stream = RealtimeOutputStream::start(move |buffer, sample_rate, channels| {
            Self::render_audio(&state, buffer, sample_rate, channels, block_size);
        })?;

        self.stream = Some(stream);
        self.unlock();
        info!("Audio engine started");
        Ok(())
    }

    /// Stop the audio engine
    pub fn stop(&mut self) -> Result<(), AudioEngineError> {
        let stream = self.stream.take().ok_or(AudioEngineError::NotRunning)?;
        stream.stop();
        self.with_session(|s| s.stop());
        info!("Audio engine stopped");
        Ok(())
    }

    /// Mark audio output as usable. Previews start sounding and a deferred
    /// `play` begins.
    pub fn unlock(&self) {
        self.with_session(|s| s.mark_ready());
    }

    pub fn is_ready(&self) -> bool {
        self.state.session.lock().map(|s| s.is_ready()).unwrap_or(false)
    }

    pub fn is_playing(&self) -> bool {
        self.state.playing.load(Ordering::SeqCst)
    }

    /// Run `f` against the session, then bring the mixer in line with it
    pub fn with_session<F, R>(&self, f: F) -> Option<R>
    where
        F: FnOnce(&mut Session) -> R,
    {
        let mut session = self.state.session.lock().ok()?;
        let result = f(&mut session);
        let Ok(mut mixer) = self.state.mixer.lock() else {
            warn!("Mixer lock poisoned");
            return Some(result);
        };
        mixer.sync(session.registry());
        for event in session.drain_events() {
            mixer.apply(event);
        }
        self.state.playing.store(session.transport().is_playing(), Ordering::SeqCst);
        Some(result)
    }

    /// Errors the output device reported since the last call
    pub fn take_stream_errors(&self) -> Vec<String> {
        self.stream.as_ref().map(|s| s.take_errors()).unwrap_or_default()
    }

    pub fn snapshot(&self) -> Option<TransportSnapshot> {
        self.state.session.lock().ok().map(|s| s.snapshot())
    }

    /// Render session audio into an interleaved buffer (called from audio thread)
    fn render_audio(state: &EngineState, buffer: &mut [f32], sample_rate: u32, channels: u16, block_size: usize) {
        let Ok(mut session) = state.session.lock() else {
            buffer.fill(0.0);
            return;
        };
        let Ok(mut mixer) = state.mixer.lock() else {
            buffer.fill(0.0);
            return;
        };

        if session.transport().sample_rate() != sample_rate {
            debug!(sample_rate, "Following device sample rate");
            session.set_sample_rate(sample_rate);
            mixer.set_sample_rate(sample_rate as f32);
        }

        let channels = channels.max(1) as usize;
        for chunk in buffer.chunks_mut(block_size.max(1) * channels) {
            let frames = chunk.len() / channels;
            let (left, right) = render_block(&mut session, &mut mixer, frames);
            for (i, frame) in chunk.chunks_mut(channels).enumerate() {
                let (l, r) = (left.get(i).copied().unwrap_or(0.0), right.get(i).copied().unwrap_or(0.0));
                match frame.len() {
                    1 => frame[0] = (l + r) * 0.5,
                    _ => {
                        frame.fill(0.0);
                        frame[0] = l;
                        frame[1] = r;
                    }
                }
            }
        }
        state.playing.store(session.transport().is_playing(), Ordering::SeqCst);
    }

    /// Render the next `frames` frames without a device, as interleaved stereo
    pub fn render_offline(&self, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0; frames * 2];
        let sample_rate = self.state.session.lock().map(|s| s.transport().sample_rate()).unwrap_or(self.config.sample_rate);
        Self::render_audio(&self.state, &mut out, sample_rate, 2, self.config.block_size);
        out
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        if let Some(stream) = self.stream.take() {
            stream.stop();
        }
    }
}
