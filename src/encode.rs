use itertools::Itertools;

use crate::score::{EventKind, Score};
use crate::{HOLD_SYMBOL, REST_SYMBOL};

/// The token an event emits on the time step where it starts: the MIDI note
/// number for a note, `R` for a rest, and the dot-joined normal-order pitch
/// classes for a chord.
pub fn symbol(kind: &EventKind) -> String {
    match kind {
        EventKind::Note(pitch) => pitch.to_string(),
        EventKind::Rest => REST_SYMBOL.to_string(),
        EventKind::Chord(pitch_classes) => pitch_classes.iter().join("."),
    }
}

/// How many time steps an event occupies. The division truncates: an event
/// shorter than one time step occupies zero steps and vanishes from the
/// encoded stream entirely. Callers rely on this exact behavior.
pub fn steps_for_duration(duration: f64, time_step: f64) -> usize {
    (duration / time_step) as usize
}

/// Encode a score as a space-delimited token stream at `time_step`
/// granularity. Each event emits its symbol on the step where it starts and
/// a hold marker on every following step it is sustained.
pub fn encode_song(score: &Score, time_step: f64) -> String {
    let mut encoded_song = vec![];
    for event in &score.events {
        let steps = steps_for_duration(event.duration, time_step);
        for step in 0..steps {
            if step == 0 {
                encoded_song.push(symbol(&event.kind));
            } else {
                encoded_song.push(HOLD_SYMBOL.to_string());
            }
        }
    }
    encoded_song.join(" ")
}
