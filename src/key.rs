use crate::score::{EventKind, Score};

/// Krumhansl-Kessler major key profile (duration-weighted perception studies).
const MAJOR_PROFILE: [f64; 12] = [
    6.35, 2.23, 3.48, 2.33, 4.38, 4.09, 2.52, 5.19, 2.39, 3.66, 2.29, 2.88,
];

/// Krumhansl-Kessler minor key profile.
const MINOR_PROFILE: [f64; 12] = [
    6.33, 2.68, 3.52, 5.38, 2.60, 3.53, 2.54, 4.75, 3.98, 2.69, 3.34, 3.17,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Major,
    Minor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// An estimated key: tonic pitch class (0 = C) and mode.
pub struct Key {
    pub tonic: u8,
    pub mode: Mode,
}

/// Estimate the key of a score using the Krumhansl-Schmuckler algorithm.
///
/// Builds a duration-weighted pitch-class histogram over every note and
/// chord, and correlates it against all 24 major/minor key profiles. The
/// best Pearson correlation determines the key. A score with no pitched
/// events is reported as C major.
pub fn detect_key(score: &Score) -> Key {
    let mut histogram = [0.0_f64; 12];
    for event in &score.events {
        match &event.kind {
            EventKind::Note(pitch) => {
                histogram[(pitch % 12) as usize] += event.duration;
            }
            EventKind::Chord(pitch_classes) => {
                for pc in pitch_classes {
                    histogram[(pc % 12) as usize] += event.duration;
                }
            }
            EventKind::Rest => (),
        }
    }

    let total: f64 = histogram.iter().sum();
    if total == 0.0 {
        return Key {
            tonic: 0,
            mode: Mode::Major,
        };
    }
    for h in &mut histogram {
        *h /= total;
    }

    // Correlate against all 24 key profiles (12 roots x 2 modes)
    let mut best = Key {
        tonic: 0,
        mode: Mode::Major,
    };
    let mut best_corr = -1.0_f64;

    for tonic in 0..12u8 {
        // Rotate histogram so the candidate tonic sits at index 0
        let mut rotated = [0.0; 12];
        for (i, slot) in rotated.iter_mut().enumerate() {
            *slot = histogram[(i + tonic as usize) % 12];
        }

        let major_corr = pearson(&rotated, &MAJOR_PROFILE);
        if major_corr > best_corr {
            best_corr = major_corr;
            best = Key {
                tonic,
                mode: Mode::Major,
            };
        }

        let minor_corr = pearson(&rotated, &MINOR_PROFILE);
        if minor_corr > best_corr {
            best_corr = minor_corr;
            best = Key {
                tonic,
                mode: Mode::Minor,
            };
        }
    }

    best
}

/// Semitone interval that moves `key`'s tonic to C (major) or A (minor).
///
/// Matches the original octave-4 pitch arithmetic: the interval is the plain
/// difference of pitch classes, not the shortest path, so a B-major song
/// transposes down 11 semitones rather than up 1.
pub fn transposition_interval(key: Key) -> i32 {
    let target: i32 = match key.mode {
        Mode::Major => 0,
        Mode::Minor => 9,
    };
    target - key.tonic as i32
}

/// Transpose a score to C major or A minor, depending on its estimated mode.
/// Returns a new Score; the input is untouched.
pub fn transpose(score: &Score) -> Score {
    let key = detect_key(score);
    score.transposed(transposition_interval(key))
}

/// Pearson correlation coefficient between two 12-element arrays.
fn pearson(x: &[f64; 12], y: &[f64; 12]) -> f64 {
    let x_mean: f64 = x.iter().sum::<f64>() / 12.0;
    let y_mean: f64 = y.iter().sum::<f64>() / 12.0;

    let mut num = 0.0;
    let mut x_sq = 0.0;
    let mut y_sq = 0.0;

    for i in 0..12 {
        let xd = x[i] - x_mean;
        let yd = y[i] - y_mean;
        num += xd * yd;
        x_sq += xd * xd;
        y_sq += yd * yd;
    }

    let denom = (x_sq * y_sq).sqrt();
    if denom < 1e-10 {
        return 0.0;
    }
    num / denom
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::score::Event;

    use super::*;

    fn score_of(pitches: &[u8]) -> Score {
        Score {
            events: pitches
                .iter()
                .map(|&pitch| Event {
                    kind: EventKind::Note(pitch),
                    duration: 1.0,
                })
                .collect(),
        }
    }

    #[test]
    fn empty_score_defaults_to_c_major() {
        let key = detect_key(&Score::default());
        assert_eq!(
            key,
            Key {
                tonic: 0,
                mode: Mode::Major
            }
        );
    }

    #[test]
    fn c_major_scale_detected() {
        // C major scale: C D E F G A B, tonic doubled for emphasis
        let key = detect_key(&score_of(&[60, 62, 64, 65, 67, 69, 71, 72]));
        assert_eq!(
            key,
            Key {
                tonic: 0,
                mode: Mode::Major
            }
        );
    }

    #[test]
    fn g_major_scale_detected_and_transposed_down() {
        let score = score_of(&[67, 69, 71, 72, 74, 76, 78, 79]);
        let key = detect_key(&score);
        assert_eq!(
            key,
            Key {
                tonic: 7,
                mode: Mode::Major
            }
        );
        assert_eq!(transposition_interval(key), -7);

        let transposed = transpose(&score);
        assert_eq!(transposed.events[0].kind, EventKind::Note(60));
    }

    #[test]
    fn interval_is_not_normalized_to_shortest_path() {
        let b_major = Key {
            tonic: 11,
            mode: Mode::Major,
        };
        assert_eq!(transposition_interval(b_major), -11);

        let b_minor = Key {
            tonic: 11,
            mode: Mode::Minor,
        };
        assert_eq!(transposition_interval(b_minor), -2);
    }

    #[test]
    fn transposing_to_c_is_idempotent_for_c_major() {
        let score = score_of(&[60, 62, 64, 65, 67, 69, 71, 72]);
        let transposed = transpose(&score);
        assert_eq!(transposed, score);
    }

    #[test]
    fn pearson_of_identical_arrays_is_one() {
        let a = [
            1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0, 12.0,
        ];
        let r = pearson(&a, &a);
        assert!((r - 1.0).abs() < 1e-10, "self-correlation was {}", r);
    }
}
