//! Subcommand implementations

use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use cadence_core::theory::scale_notes;
use cadence_core::{presets, EffectKind, Project, ScaleMode, Session, TrackKind};
use cadence_services::{default_output_info, AudioEngine};
use tracing::{info, warn};

use crate::config::CliConfig;

/// Seconds rendered after the last bar so releases and effect tails ring out
const TAIL_SECS: f64 = 1.0;
const DEFAULT_BARS: f64 = 4.0;

/// How much of a project to render or play
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Length {
    Seconds(f64),
    Bars(f64),
    /// The loop region when looping, otherwise four bars
    Auto,
}

impl Length {
    pub fn seconds(self, project: &Project) -> f64 {
        let secs_per_beat = 60.0 / project.bpm;
        let beats_per_bar = project.time_signature.beats_per_bar();
        match self {
            Self::Seconds(s) => s,
            Self::Bars(bars) => bars * beats_per_bar * secs_per_beat,
            Self::Auto if project.loop_enabled && project.loop_end > project.loop_start => {
                (project.loop_end - project.loop_start) * secs_per_beat
            }
            Self::Auto => DEFAULT_BARS * beats_per_bar * secs_per_beat,
        }
    }
}

fn session_for(project: Project, config: &CliConfig) -> Result<Session> {
    let mut session = Session::new(config.sample_rate).with_recorder(config.recorder());
    config.apply_keys(session.key_bindings_mut());
    session.import_project(project).context("project rejected")?;
    Ok(session)
}

fn load(path: &Path) -> Result<Project> {
    cadence_core::load_project(path).with_context(|| format!("reading {}", path.display()))
}

/// Render a project offline to a 32-bit float stereo WAV
pub fn render(config: &CliConfig, project_path: &Path, out_path: &Path, length: Length) -> Result<()> {
    let project = load(project_path)?;
    let secs = length.seconds(&project) + TAIL_SECS;
    if !secs.is_finite() || secs <= 0.0 {
        bail!("render length must be positive");
    }

    let engine = AudioEngine::from_session(session_for(project, config)?, config.engine());
    engine.unlock();
    engine.with_session(|s| s.play());

    let sample_rate = config.engine().sample_rate;
    let frames = (secs * sample_rate as f64).round() as usize;
    let started = Instant::now();
    let samples = engine.render_offline(frames);

    let spec = hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer =
        hound::WavWriter::create(out_path, spec).with_context(|| format!("creating {}", out_path.display()))?;
    for sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;

    info!(
        path = %out_path.display(),
        seconds = secs,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Rendered project"
    );
    Ok(())
}

/// Play a project through the default output device
pub fn play(config: &CliConfig, project_path: &Path, length: Length) -> Result<()> {
    let project = load(project_path)?;
    let secs = length.seconds(&project);

    let mut engine = AudioEngine::from_session(session_for(project, config)?, config.engine());
    // play before the device opens; the session starts it once output is ready
    engine.with_session(|s| s.play());
    engine.start()?;

    let deadline = Instant::now() + Duration::from_secs_f64(secs.max(0.0));
    while Instant::now() < deadline {
        thread::sleep(Duration::from_millis(500));
        for error in engine.take_stream_errors() {
            warn!(%error, "Output stream reported an error");
        }
        if let Some(snap) = engine.snapshot() {
            info!(bar = snap.bar, beat = snap.beat, seconds = snap.position_secs, "Playing");
        }
    }
    engine.with_session(|s| s.stop());
    thread::sleep(Duration::from_secs_f64(TAIL_SECS));
    engine.stop()?;
    Ok(())
}

/// Build the demo session: a house beat, a bass line and a recorded lead
pub fn demo_session(config: &CliConfig) -> Result<Session> {
    let mut session = Session::new(config.sample_rate).with_recorder(config.recorder());
    session.apply_tempo_preset("house")?;

    let drums = session.create_track(TrackKind::Drums, Some("Drums"), None);
    session.load_drum_pattern(drums, "house")?;
    session.add_effect(drums, EffectKind::Compressor)?;

    let bass = session.create_track(TrackKind::Instrument, Some("Bass"), Some("synth-bass"));
    // root, root, fifth, fourth of C minor
    let scale = scale_notes(36, ScaleMode::Minor);
    for (i, degree) in [0, 0, 4, 3].into_iter().enumerate() {
        session.add_note(bass, scale[degree], 110, i as f64 + 0.5, 0.5)?;
    }
    session.set_volume(bass, -3.0)?;

    let lead = session.create_track(TrackKind::Instrument, Some("Lead"), Some("pluck"));
    session.add_effect(lead, EffectKind::Delay)?;
    session.add_effect(lead, EffectKind::Reverb)?;
    session.set_pan(lead, 0.3)?;

    // play a phrase in as if from a keyboard
    session.arm_recording(lead)?;
    session.mark_ready();
    for (pitch, down, up) in [(72u8, 0.02, 0.4), (75, 1.0, 1.3), (79, 1.5, 2.2), (77, 2.97, 3.6)] {
        session.seek(down)?;
        session.note_down(lead, pitch, 96)?;
        session.seek(up)?;
        if session.note_up(pitch)?.is_none() {
            warn!(pitch, "Demo note was not recorded");
        }
    }
    session.disarm_recording();
    session.stop();
    session.drain_events();

    session.set_loop(true, 0.0, 4.0)?;
    Ok(session)
}

pub fn demo(config: &CliConfig, out_path: &Path) -> Result<()> {
    let session = demo_session(config)?;
    cadence_core::save_project(out_path, &session.export_project())
        .with_context(|| format!("writing {}", out_path.display()))?;
    info!(path = %out_path.display(), tracks = session.tracks().len(), "Wrote demo project");
    Ok(())
}

/// Print the output device and the preset tables
pub fn info(config: &CliConfig) -> Result<()> {
    match default_output_info() {
        Ok(device) => println!(
            "output: {} ({} Hz, {} channels)",
            device.name, device.sample_rate, device.channels
        ),
        Err(e) => println!("output: unavailable ({e})"),
    }
    println!("render rate: {} Hz, block {} frames", config.sample_rate, config.block_size);

    println!("\ninstruments:");
    for preset in presets::INSTRUMENTS {
        println!("  {:<16} {}", preset.key, preset.name);
    }
    println!("\ndrum kits:");
    for kit in presets::DRUM_KITS {
        println!("  {:<16} {}", kit.key, kit.name);
    }
    println!("\ndrum patterns:");
    for pattern in presets::DRUM_PATTERNS {
        println!("  {:<16} {}", pattern.key, pattern.name);
    }
    println!("\ntempos:");
    for tempo in presets::TEMPOS {
        println!("  {:<16} {:>5.0} BPM", tempo.key, tempo.bpm);
    }
    println!("\neffects:");
    for kind in EffectKind::ALL {
        println!("  {kind}");
    }
    Ok(())
}
