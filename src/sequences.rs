use std::collections::HashSet;
use std::fs;
use std::path::Path;

use itertools::Itertools;
use tch::{Device, Kind, Tensor};

use crate::corpus::{convert_to_int, load_mapping, CorpusError};
use crate::DELIMITER_SYMBOL;

/// Windowed training examples before tensor encoding. `inputs` holds the
/// windows flattened row-major; `targets` and `weights` have one entry per
/// window.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Examples {
    pub inputs: Vec<i64>,
    pub targets: Vec<i64>,
    pub weights: Vec<i64>,
    pub window: usize,
}

impl Examples {
    fn new(window: usize) -> Examples {
        Examples {
            window,
            ..Examples::default()
        }
    }

    fn push(&mut self, input: &[i64], target: i64, weight: u32) {
        self.inputs.extend_from_slice(input);
        self.targets.push(target);
        self.weights.push(weight as i64);
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// The windowed training sequences: a one-hot input tensor of shape
/// `[examples, window, vocab_size]`, an integer target vector, and an
/// integer per-example quality-weight vector.
#[derive(Debug)]
pub struct TrainingSequences {
    pub inputs: Tensor,
    pub targets: Tensor,
    pub weights: Tensor,
}

/// Replicates the legacy per-song slicing: each song's sub-run is the entire
/// remaining sequence from the running offset. The offset therefore jumps to
/// the end after the first song, so only song 0 produces examples (windowed
/// over the whole corpus, delimiters included, carrying song 0's weight) and
/// every later song contributes nothing. Known bug, kept for parity; see
/// `collect_examples_split` for the corrected behavior.
pub fn collect_examples_legacy(int_songs: &[i64], weights: &[u32], window: usize) -> Examples {
    let mut examples = Examples::new(window);

    let mut song_start_idx = 0;
    for &weight in weights {
        let int_song = &int_songs[song_start_idx.min(int_songs.len())..];

        let num_sequences = int_song.len().saturating_sub(window);
        for i in 0..num_sequences {
            examples.push(&int_song[i..i + window], int_song[i + window], weight);
        }

        song_start_idx += int_song.len();
    }

    examples
}

/// Corrected windowing: split the integer corpus on boundary-marker tokens
/// so each song's run is windowed in isolation, paired with that song's own
/// weight. A run of length L yields `max(0, L - window)` examples; the
/// delimiter tokens themselves never appear in any example.
pub fn collect_examples_split(
    int_songs: &[i64],
    weights: &[u32],
    window: usize,
    delimiter_code: i64,
) -> Examples {
    let mut runs: Vec<Vec<i64>> = vec![];
    let mut current = vec![];
    for &code in int_songs {
        if code == delimiter_code {
            if !current.is_empty() {
                runs.push(std::mem::take(&mut current));
            }
        } else {
            current.push(code);
        }
    }
    if !current.is_empty() {
        runs.push(current);
    }

    if runs.len() != weights.len() {
        println!(
            "[Warning] Corpus contains {} songs but {} weights were recorded",
            runs.len(),
            weights.len()
        );
    }

    let mut examples = Examples::new(window);
    for (int_song, &weight) in runs.iter().zip(weights) {
        let num_sequences = int_song.len().saturating_sub(window);
        for i in 0..num_sequences {
            examples.push(&int_song[i..i + window], int_song[i + window], weight);
        }
    }

    examples
}

/// Load the merged corpus, convert it to integer codes through the persisted
/// mapping, window it into training examples, and one-hot encode the inputs
/// over the observed vocabulary.
///
/// The whole one-hot tensor is materialized in memory at once
/// (`examples x window x vocab_size` floats); corpus size is bounded by RAM.
pub fn generate_training_sequences(
    corpus_path: impl AsRef<Path>,
    mappings_path: impl AsRef<Path>,
    window: usize,
    weights: &[u32],
    split_songs: bool,
) -> Result<TrainingSequences, CorpusError> {
    let songs = fs::read_to_string(corpus_path)?;
    let mappings = load_mapping(mappings_path)?;
    let int_songs = convert_to_int(&songs, &mappings)?;

    let examples = if split_songs {
        let delimiter_code = mappings
            .get(DELIMITER_SYMBOL)
            .copied()
            .ok_or_else(|| CorpusError::UnknownSymbol(DELIMITER_SYMBOL.to_string()))?;
        collect_examples_split(&int_songs, weights, window, delimiter_code)
    } else {
        collect_examples_legacy(&int_songs, weights, window)
    };

    let vocabulary_size = int_songs.iter().collect::<HashSet<_>>().len();
    println!(
        "One-hot encoding {} examples over a vocabulary of {}...",
        examples.len(),
        vocabulary_size
    );
    Ok(one_hot(&examples, vocabulary_size))
}

/// One-hot encode the example windows over `vocabulary_size` classes.
fn one_hot(examples: &Examples, vocabulary_size: usize) -> TrainingSequences {
    let num_examples = examples.len();
    let window = examples.window;

    let inputs = if num_examples == 0 {
        Tensor::zeros(
            &[0, window as i64, vocabulary_size as i64],
            (Kind::Float, Device::Cpu),
        )
    } else {
        let inputs = Tensor::of_slice(&examples.inputs);
        let inputs = reshape(&[num_examples, window], &inputs);
        let inputs = inputs.onehot(vocabulary_size as i64).to_kind(Kind::Float);
        assert_shape(&[num_examples, window, vocabulary_size], &inputs);
        inputs
    };

    TrainingSequences {
        inputs,
        targets: Tensor::of_slice(&examples.targets),
        weights: Tensor::of_slice(&examples.weights),
    }
}

pub fn reshape(shape: &[usize], tensor: &Tensor) -> Tensor {
    let shape = shape.iter().map(|x| *x as i64).collect_vec();
    tensor.reshape(&shape)
}

#[track_caller]
pub fn assert_shape(expected: &[usize], actual: &Tensor) {
    let actual = actual.size();
    let same_len = expected.len() == actual.len();
    let same_values = expected
        .iter()
        .zip(actual.iter())
        .all(|(a, b)| *a as i64 == *b);
    if !same_len || !same_values {
        panic!(
            "Expected tensor to be of shape {:?}, got {:?}",
            expected, actual
        );
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn window_count_is_length_minus_window() {
        let int_songs = [0, 1, 2, 3, 4];
        let examples = collect_examples_legacy(&int_songs, &[7], 3);

        assert_eq!(examples.len(), 2);
        assert_eq!(examples.inputs, vec![0, 1, 2, 1, 2, 3]);
        assert_eq!(examples.targets, vec![3, 4]);
        assert_eq!(examples.weights, vec![7, 7]);
    }

    #[test]
    fn window_as_long_as_the_song_yields_nothing() {
        let int_songs = [0, 1, 2];
        assert!(collect_examples_legacy(&int_songs, &[4], 3).is_empty());
        assert!(collect_examples_legacy(&int_songs, &[4], 5).is_empty());
    }

    #[test]
    fn no_recorded_weights_means_no_examples() {
        let int_songs = [0, 1, 2, 3, 4, 5];
        assert!(collect_examples_legacy(&int_songs, &[], 2).is_empty());
    }

    #[test]
    fn legacy_slicing_attributes_everything_to_the_first_song() {
        // Two songs of 4 tokens each, separated by a 2-token delimiter run
        // (code 9). The legacy slice takes the whole remaining corpus for
        // song 0, so every example carries weight 5 and the windows cross
        // the delimiters; song 1's weight 8 is never used.
        let int_songs = [0, 1, 2, 3, 9, 9, 4, 5, 6, 7, 9, 9];
        let examples = collect_examples_legacy(&int_songs, &[5, 8], 3);

        assert_eq!(examples.len(), int_songs.len() - 3);
        assert!(examples.weights.iter().all(|&w| w == 5));
        // One of the crossing windows straddles the delimiter run.
        assert_eq!(&examples.inputs[3 * 3..3 * 4], &[3, 9, 9]);
    }

    #[test]
    fn split_mode_respects_song_boundaries() {
        let int_songs = [0, 1, 2, 3, 9, 9, 4, 5, 6, 7, 9, 9];
        let examples = collect_examples_split(&int_songs, &[5, 8], 2, 9);

        // Each 4-token run yields 4 - 2 = 2 examples with its own weight.
        assert_eq!(examples.len(), 4);
        assert_eq!(examples.inputs, vec![0, 1, 1, 2, 4, 5, 5, 6]);
        assert_eq!(examples.targets, vec![2, 3, 6, 7]);
        assert_eq!(examples.weights, vec![5, 5, 8, 8]);
    }

    #[test]
    fn split_mode_never_emits_delimiter_codes() {
        let int_songs = [9, 9, 0, 1, 2, 9, 9, 3, 4, 5, 9];
        let examples = collect_examples_split(&int_songs, &[1, 2], 1, 9);
        assert!(examples.inputs.iter().all(|&code| code != 9));
        assert!(examples.targets.iter().all(|&code| code != 9));
    }

    #[test]
    fn one_hot_tensor_has_examples_by_window_by_vocab_shape() {
        let int_songs = [0, 1, 2, 0, 1, 2, 0];
        let examples = collect_examples_legacy(&int_songs, &[4], 3);
        let sequences = one_hot(&examples, 3);

        assert_eq!(sequences.inputs.size(), vec![4, 3, 3]);
        assert_eq!(sequences.targets.size(), vec![4]);
        assert_eq!(sequences.weights.size(), vec![4]);

        let first_step = sequences.inputs.get(0).get(0);
        let first_row: Vec<f32> = (&first_step).into();
        assert_eq!(first_row, vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn zero_examples_still_produce_well_formed_tensors() {
        let sequences = one_hot(&Examples::new(8), 5);
        assert_eq!(sequences.inputs.size(), vec![0, 8, 5]);
        assert_eq!(sequences.targets.size(), vec![0]);

        // An empty corpus has an empty vocabulary; the shape says so.
        let sequences = one_hot(&Examples::new(8), 0);
        assert_eq!(sequences.inputs.size(), vec![0, 8, 0]);
    }
}
