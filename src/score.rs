use std::collections::{hash_map, HashMap};
use std::path::Path;

use derive_more::{Add, AddAssign, From, Sub, SubAssign};
use midly::{num::u24, num::u28, num::u7, Header, Smf, Timing, Track, TrackEventKind};
use thiserror::Error;

/// Tolerance used when matching tick-derived durations against the allowed
/// duration set. Exact `==` on f64 would reject legitimate quarter notes from
/// files with an odd ticks-per-beat value.
const DURATION_EPSILON: f64 = 1e-6;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Failed to read MIDI file: {0}")]
    File(#[from] std::io::Error),
    #[error("Failed to parse MIDI file: {0}")]
    Midi(#[from] midly::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// What happens at one point of a song's timeline. Chords carry their pitch
/// classes in normal order (most compact rotation), not absolute pitches.
pub enum EventKind {
    Note(u8),
    Rest,
    Chord(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq)]
/// One timed entry of a song: a note, rest, or chord, held for `duration`
/// quarter lengths.
pub struct Event {
    pub kind: EventKind,
    pub duration: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
/// In-memory representation of one parsed music file: an ordered timeline of
/// notes, rests, and chords with durations in quarter lengths.
pub struct Score {
    pub events: Vec<Event>,
}

impl Score {
    /// Parse a MIDI file into a Score.
    pub fn parse(path: impl AsRef<Path>) -> Result<Score, ParseError> {
        let raw = std::fs::read(path)?;
        let smf = Smf::parse(&raw)?;
        Ok(Score::from_smf(&smf))
    }

    /// Build a Score from an already-parsed MIDI file. Notes are gathered
    /// from every track, notes sharing an onset tick become a chord, and a
    /// rest is synthesized for any gap between consecutive events.
    pub fn from_smf(smf: &Smf) -> Score {
        let midi_info = MidiInfo::new(smf.header, &smf.tracks);

        let mut raw_notes = vec![];
        for track in &smf.tracks {
            raw_notes.extend(RawNote::from_track(track));
        }
        raw_notes.sort_by_key(|note| (note.onset, note.key.as_int()));

        let mut events = vec![];
        let mut cursor = Ticks::from(0u32);
        let mut i = 0;
        while i < raw_notes.len() {
            let onset = raw_notes[i].onset;
            let mut j = i;
            while j < raw_notes.len() && raw_notes[j].onset == onset {
                j += 1;
            }
            let group = &raw_notes[i..j];

            if onset > cursor {
                let gap = midi_info.to_beats(onset - cursor);
                if gap > 0.0 {
                    events.push(Event {
                        kind: EventKind::Rest,
                        duration: gap,
                    });
                }
            }

            let length = group
                .iter()
                .map(|note| note.length)
                .max()
                .unwrap_or_else(|| Ticks::from(0u32));
            let kind = if group.len() == 1 {
                EventKind::Note(group[0].key.as_int())
            } else {
                let pitches: Vec<u8> = group.iter().map(|note| note.key.as_int()).collect();
                EventKind::Chord(normal_order(&pitches))
            };
            events.push(Event {
                kind,
                duration: midi_info.to_beats(length),
            });

            cursor = cursor.max(onset + length);
            i = j;
        }

        Score { events }
    }

    /// True iff every event's duration is one of `acceptable` (in quarter
    /// lengths). Songs failing this check are dropped from the pipeline.
    pub fn has_acceptable_durations(&self, acceptable: &[f64]) -> bool {
        self.events.iter().all(|event| {
            acceptable
                .iter()
                .any(|allowed| (allowed - event.duration).abs() < DURATION_EPSILON)
        })
    }

    /// Return a copy of this Score shifted by `interval` semitones. Note
    /// pitches shift absolutely (clamped to the MIDI range); chord pitch
    /// classes shift modulo 12 and are put back into normal order.
    pub fn transposed(&self, interval: i32) -> Score {
        let events = self
            .events
            .iter()
            .map(|event| Event {
                duration: event.duration,
                kind: match &event.kind {
                    EventKind::Note(pitch) => {
                        EventKind::Note((*pitch as i32 + interval).clamp(0, 127) as u8)
                    }
                    EventKind::Rest => EventKind::Rest,
                    EventKind::Chord(pitch_classes) => {
                        let shifted: Vec<u8> = pitch_classes
                            .iter()
                            .map(|pc| (*pc as i32 + interval).rem_euclid(12) as u8)
                            .collect();
                        // Normal order is not translation-equivariant (the
                        // tie-break prefers the lowest starting class), so it
                        // must be recomputed after the shift.
                        EventKind::Chord(normal_order(&shifted))
                    }
                },
            })
            .collect();
        Score { events }
    }
}

#[derive(Debug, Clone, Copy)]
struct RawNote {
    key: u7,
    onset: Ticks,
    length: Ticks,
}

impl RawNote {
    /// Pair up NoteOn/NoteOff events into notes. A NoteOn with velocity zero
    /// counts as a NoteOff. NoteOff events without a corresponding NoteOn are
    /// dropped, as are NoteOn events that never end.
    fn from_track(track: &Track) -> Vec<RawNote> {
        let mut notes = vec![];
        let mut ticks = Ticks::from(0u32);

        let mut active_notes = HashMap::<u7, Vec<Ticks>>::new();

        for event in track {
            ticks = ticks + event.delta.into();
            if let TrackEventKind::Midi { message, .. } = event.kind {
                match message {
                    midly::MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                        active_notes.entry(key).or_default().push(ticks);
                    }
                    midly::MidiMessage::NoteOn { key, .. }
                    | midly::MidiMessage::NoteOff { key, .. } => {
                        if let hash_map::Entry::Occupied(mut entry) = active_notes.entry(key) {
                            if let Some(note_on) = entry.get_mut().pop() {
                                notes.push(RawNote {
                                    key,
                                    onset: note_on,
                                    length: ticks - note_on,
                                });
                            } else {
                                println!("[Warning] Dropping NoteOff event with no corresponding NoteOn event! {:?}", event);
                            }
                        } else {
                            println!("[Warning] Dropping NoteOff event with no corresponding NoteOn event! {:?}", event);
                        }
                    }
                    _ => (),
                }
            }
        }

        notes
    }
}

/// Compute the normal order of a set of pitches: the rotation of the sorted
/// distinct pitch classes with the smallest outer interval, ties broken by
/// successively smaller inner intervals, then by lowest starting class.
pub fn normal_order(pitches: &[u8]) -> Vec<u8> {
    let mut pitch_classes: Vec<u8> = pitches.iter().map(|pitch| pitch % 12).collect();
    pitch_classes.sort_unstable();
    pitch_classes.dedup();
    let n = pitch_classes.len();
    if n <= 1 {
        return pitch_classes;
    }

    let rotation = |r: usize| -> Vec<u8> { (0..n).map(|i| pitch_classes[(r + i) % n]).collect() };
    let mut best = rotation(0);
    for r in 1..n {
        let candidate = rotation(r);
        if more_compact(&candidate, &best) {
            best = candidate;
        }
    }
    best
}

fn more_compact(a: &[u8], b: &[u8]) -> bool {
    for k in (1..a.len()).rev() {
        let span_a = (a[k] + 12 - a[0]) % 12;
        let span_b = (b[k] + 12 - b[0]) % 12;
        if span_a != span_b {
            return span_a < span_b;
        }
    }
    a[0] < b[0]
}

#[derive(Debug, Clone, Copy)]
/// A struct which records the timing information about a midi (specifically, the Tempo and Timing
/// of the midi).
pub struct MidiInfo {
    timing: Timing,
    tempo: u24,
}

impl MidiInfo {
    /// Create a new MidiInfo from the given header and set of tracks. This will attempt to find the
    /// tempo midi messages. If there are multiple, warnings are printed and only the first one is used.
    /// If no tempo is specified, the tempo defaults to 120 BPM (equal to 500000 ticks per beat)
    pub fn new(header: Header, tracks: &[Track]) -> MidiInfo {
        let meta_events = tracks.iter().flatten().filter_map(|x| match x.kind {
            TrackEventKind::Meta(meta_msg) => Some(meta_msg),
            _ => None,
        });

        let mut tempo = None;
        for event in meta_events {
            if let midly::MetaMessage::Tempo(new_tempo) = event {
                if let Some(tempo) = tempo {
                    println!(
                        "[Warning] Tempo already set! Old: {:?}, new: {:?}",
                        tempo, new_tempo
                    );
                } else {
                    tempo = Some(new_tempo)
                }
            }
        }

        if tempo.is_none() {
            println!(
                "[Warning] No tempo specified, defaulting to 120 BPM (500,000 ticks per beat)"
            );
        }

        MidiInfo {
            timing: header.timing,
            tempo: tempo.unwrap_or_else(|| u24::new(500000)),
        }
    }

    /// Convert midi Ticks into beats (quarter lengths), using the specified
    /// Timing recorded by the MidiInfo.
    fn to_beats(&self, ticks: Ticks) -> f64 {
        let ticks: f64 = ticks.into();
        match self.timing {
            Timing::Metrical(ticks_per_beat) => {
                let ticks_per_beat = ticks_per_beat.as_int() as f64;
                ticks / ticks_per_beat
            }
            Timing::Timecode(fps, ticks_per_frame) => {
                let fps = fps.as_f32() as f64;
                let ticks_per_frame = ticks_per_frame as f64;
                let seconds = ticks / fps / ticks_per_frame;
                seconds / self.seconds_per_beat()
            }
        }
    }

    /// Get the number of seconds per beat that this Midi file specifies. This is based off of the
    /// given tempo value.
    fn seconds_per_beat(&self) -> f64 {
        // Note: tempo is in microseconds per beat (so a value of 1,000,000 equals 1 second per beat)
        self.tempo.as_int() as f64 / 1_000_000.0
    }
}

#[derive(
    From, Add, AddAssign, Sub, SubAssign, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Debug,
)]
/// Wrapper struct for the Midi Tick unit.
struct Ticks(u32);

impl From<u28> for Ticks {
    fn from(x: u28) -> Self {
        Ticks(x.as_int())
    }
}
impl From<Ticks> for f64 {
    fn from(x: Ticks) -> f64 {
        x.0 as f64
    }
}
