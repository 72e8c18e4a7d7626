use std::error::Error;

use clap::{command, Parser};
use melody_corpus::{corpus, sequences, SEQUENCE_LENGTH, TIME_STEP};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
/// Converts a directory of MIDI files into integer-coded, fixed-length
/// training sequences with per-song quality weights.
struct Args {
    /// Path to the directory of input MIDI files.
    #[arg(short, long = "in", default_value = "training_set_3")]
    data_dir: String,
    /// Directory receiving one encoded text file per accepted song.
    #[arg(long, default_value = "encoded_songs_dataset")]
    dataset_dir: String,
    /// Path to the merged corpus file.
    #[arg(long, default_value = "dataset.txt")]
    corpus_path: String,
    /// Path to the vocabulary mapping JSON file.
    #[arg(long, default_value = "mappings.json")]
    mappings_path: String,
    /// Path to the ratings JSON file (filename -> integer rating).
    #[arg(long, default_value = "ratings.json")]
    ratings_path: String,
    /// Width of the training window, in tokens.
    #[arg(long, default_value_t = SEQUENCE_LENGTH)]
    sequence_length: usize,
    /// Encoding granularity, in quarter lengths.
    #[arg(long, default_value_t = TIME_STEP)]
    time_step: f64,
    /// Window each song in isolation at the boundary-marker runs, instead of
    /// replicating the legacy slicing that only isolates the first song.
    #[arg(long)]
    split_songs: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    println!("Loading songs...");
    let (songs, weights) = corpus::load_songs(&args.data_dir, &args.ratings_path)?;
    println!("Loaded {} songs.", songs.len());

    let accepted = corpus::preprocess(&songs, &args.dataset_dir, args.time_step)?;
    println!(
        "Encoded {} songs ({} skipped for unacceptable durations).",
        accepted.len(),
        songs.len() - accepted.len()
    );

    let corpus_text = corpus::merge(&args.dataset_dir, &args.corpus_path, args.sequence_length)?;
    corpus::create_mapping(&corpus_text, &args.mappings_path)?;

    // The legacy slicing walks the full loader weight list; the corrected
    // mode pairs each corpus run with the weight of an accepted song.
    let weights = if args.split_songs {
        accepted.iter().map(|&i| weights[i]).collect()
    } else {
        weights
    };

    let training = sequences::generate_training_sequences(
        &args.corpus_path,
        &args.mappings_path,
        args.sequence_length,
        &weights,
        args.split_songs,
    )?;

    println!("Inputs shape: {:?}", training.inputs.size());
    println!("Targets shape: {:?}", training.targets.size());
    println!("Weights shape: {:?}", training.weights.size());

    Ok(())
}
