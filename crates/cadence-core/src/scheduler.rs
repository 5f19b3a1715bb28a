//! Converts patterns into timed triggers.
//!
//! `rebuild` flattens every audible track's pattern into a sorted list of
//! beat offsets. Each rendered block then asks `collect` which occurrences
//! (offset + k * pattern length) fall inside the beats the block covered,
//! and `dispatch` hands them to the track generators with exact clock times.

use crate::generator::{GeneratorRack, Trigger, TriggerKey};
use crate::pattern::{PatternContent, DEFAULT_VELOCITY};
use crate::registry::TrackRegistry;
use crate::track::TrackId;
use crate::transport::BlockSpan;

/// One note or step hit, positioned in beats
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledEvent {
    pub key: TriggerKey,
    pub velocity: u8,
    /// First occurrence on the timeline
    pub beat: f64,
    pub duration_beats: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackSchedule {
    pub track: TrackId,
    /// Repeat period (pattern length) in beats
    pub period: f64,
    pub events: Vec<ScheduledEvent>,
}

/// A trigger due inside the current block
#[derive(Debug, Clone, PartialEq)]
pub struct DueTrigger {
    pub track: TrackId,
    pub beat: f64,
    pub trigger: Trigger,
}

#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    schedules: Vec<TrackSchedule>,
    generation: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedules(&self) -> &[TrackSchedule] {
        &self.schedules
    }

    /// Bumped on every rebuild or clear
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_empty(&self) -> bool {
        self.schedules.is_empty()
    }

    /// Drop everything that was scheduled
    pub fn clear(&mut self) {
        self.schedules.clear();
        self.generation += 1;
    }

    /// Replace the schedule with one built from the registry's current state.
    ///
    /// Effectively muted tracks and empty patterns contribute nothing.
    pub fn rebuild(&mut self, registry: &TrackRegistry) {
        let mut schedules = Vec::new();
        for track in registry.audible() {
            let Some(pattern) = &track.pattern else { continue };
            if pattern.is_silent() {
                continue;
            }
            let origin = pattern.start_time;
            let mut events: Vec<ScheduledEvent> = match &pattern.content {
                PatternContent::Notes(notes) => notes
                    .iter()
                    .map(|n| ScheduledEvent {
                        key: TriggerKey::Pitch(n.pitch),
                        velocity: n.velocity,
                        beat: origin + n.time,
                        duration_beats: n.duration,
                    })
                    .collect(),
                PatternContent::StepGrid(grid) => {
                    let step = pattern.step_beats();
                    grid.iter()
                        .flat_map(|(sound, row)| {
                            row.iter().enumerate().filter(|(_, on)| **on).map(move |(i, _)| ScheduledEvent {
                                key: TriggerKey::Sound(sound.clone()),
                                velocity: DEFAULT_VELOCITY,
                                beat: origin + i as f64 * step,
                                duration_beats: step,
                            })
                        })
                        .collect()
                }
            };
            events.sort_by(|a, b| a.beat.total_cmp(&b.beat));
            schedules.push(TrackSchedule { track: track.id, period: pattern.duration, events });
        }
        self.schedules = schedules;
        self.generation += 1;
        tracing::debug!(
            tracks = self.schedules.len(),
            events = self.schedules.iter().map(|s| s.events.len()).sum::<usize>(),
            generation = self.generation,
            "Rebuilt schedule"
        );
    }

    /// Every occurrence whose beat lies in one of the block's half-open segments,
    /// ordered by time
    pub fn collect(&self, span: &BlockSpan) -> Vec<DueTrigger> {
        let spb = span.secs_per_beat;
        let mut due = Vec::new();
        for segment in &span.segments {
            for schedule in &self.schedules {
                for event in &schedule.events {
                    // one repeat early: the division can round past an
                    // occurrence sitting exactly on `from_beat`
                    let mut k = if segment.from_beat > event.beat {
                        (((segment.from_beat - event.beat) / schedule.period).ceil() - 1.0).max(0.0)
                    } else {
                        0.0
                    };
                    loop {
                        let beat = event.beat + k * schedule.period;
                        if beat >= segment.to_beat {
                            break;
                        }
                        if beat >= segment.from_beat {
                            due.push(DueTrigger {
                                track: schedule.track,
                                beat,
                                trigger: Trigger {
                                    key: event.key.clone(),
                                    velocity: event.velocity,
                                    time: segment.clock_secs + (beat - segment.from_beat) * spb,
                                    duration: event.duration_beats * spb,
                                },
                            });
                        }
                        k += 1.0;
                    }
                }
            }
        }
        due.sort_by(|a, b| a.trigger.time.total_cmp(&b.trigger.time));
        due
    }

    /// Fire the block's triggers. A failing or missing generator is logged and
    /// skipped; other tracks keep playing. Returns how many triggers fired.
    pub fn dispatch(&self, span: &BlockSpan, rack: &mut dyn GeneratorRack) -> usize {
        let mut fired = 0;
        for due in self.collect(span) {
            let Some(generator) = rack.generator_mut(due.track) else {
                tracing::warn!(track = %due.track, "No generator for scheduled track");
                continue;
            };
            match generator.trigger(due.trigger) {
                Ok(()) => fired += 1,
                Err(e) => tracing::warn!(track = %due.track, error = %e, "Trigger failed"),
            }
        }
        fired
    }
}
