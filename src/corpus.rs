use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use walkdir::WalkDir;

use crate::encode::encode_song;
use crate::key;
use crate::score::{ParseError, Score};
use crate::{ACCEPTABLE_DURATIONS, DEFAULT_RATING, DELIMITER_SYMBOL};

/// Files whose immediate parent directory has this exact name take their
/// quality weight from the ratings table instead of the default.
pub const RATED_DIR_NAME: &str = "Rated_Generations";

const MUSIC_FILE_EXTENSION: &str = "mid";

#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("No rating recorded for {0:?}")]
    MissingRating(String),
    #[error("Symbol {0:?} is missing from the vocabulary mapping")]
    UnknownSymbol(String),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("Failed to walk dataset directory: {0}")]
    Walk(#[from] walkdir::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("Malformed JSON table: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(transparent)]
/// Quality ratings keyed by original filename, persisted as a JSON object.
pub struct Ratings(HashMap<String, u32>);

impl Ratings {
    pub fn load(path: impl AsRef<Path>) -> Result<Ratings, CorpusError> {
        let file = fs::File::open(path)?;
        Ok(serde_json::from_reader(file)?)
    }

    /// Look up the rating for a file. Rated files must have an entry; a
    /// missing one aborts the run.
    pub fn get(&self, file_name: &str) -> Result<u32, CorpusError> {
        self.0
            .get(file_name)
            .copied()
            .ok_or_else(|| CorpusError::MissingRating(file_name.to_string()))
    }
}

/// Walk `data_dir` and parse every `.mid` file into a Score, pairing each
/// with a quality weight: the ratings-table entry for files directly inside
/// a `Rated_Generations` directory, the default weight otherwise. The two
/// returned lists are parallel and follow the (sorted) traversal order.
pub fn load_songs(
    data_dir: impl AsRef<Path>,
    ratings_path: impl AsRef<Path>,
) -> Result<(Vec<Score>, Vec<u32>), CorpusError> {
    let mut songs = vec![];
    let mut weights = vec![];
    // Loaded the first time a rated file shows up, then reused.
    let mut ratings: Option<Ratings> = None;

    for entry in WalkDir::new(data_dir).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if !path
            .extension()
            .is_some_and(|ext| ext == MUSIC_FILE_EXTENSION)
        {
            continue;
        }

        let in_rated_dir = path
            .parent()
            .and_then(Path::file_name)
            .is_some_and(|name| name == RATED_DIR_NAME);
        let weight = if in_rated_dir {
            let table = match ratings.take() {
                Some(table) => table,
                None => Ratings::load(ratings_path.as_ref())?,
            };
            let weight = table.get(&entry.file_name().to_string_lossy())?;
            ratings = Some(table);
            weight
        } else {
            DEFAULT_RATING
        };

        songs.push(Score::parse(path)?);
        weights.push(weight);
    }

    Ok((songs, weights))
}

/// Filter, transpose, encode, and write one token-stream file per accepted
/// song into `dataset_dir`, named `song_{i}.txt` by loader index (so the
/// indices of duration-rejected songs are skipped). Songs with a duration
/// outside the allowed set are silently dropped, not errors. Returns the
/// loader indices of the accepted songs.
pub fn preprocess(
    songs: &[Score],
    dataset_dir: impl AsRef<Path>,
    time_step: f64,
) -> Result<Vec<usize>, CorpusError> {
    let dataset_dir = dataset_dir.as_ref();
    fs::create_dir_all(dataset_dir)?;

    let mut accepted = vec![];
    for (i, song) in songs.iter().enumerate() {
        if !song.has_acceptable_durations(&ACCEPTABLE_DURATIONS) {
            continue;
        }

        // Transpose songs to Cmaj/Amin
        let song = key::transpose(song);
        let encoded_song = encode_song(&song, time_step);

        let save_path = dataset_dir.join(format!("song_{}.txt", i));
        fs::write(save_path, encoded_song)?;
        accepted.push(i);
    }

    Ok(accepted)
}

/// Concatenate every encoded song file under `dataset_dir` into one corpus
/// string: each song's content, a space, then `sequence_length` repetitions
/// of the boundary marker. One trailing character is trimmed from the final
/// string. The result is written to `corpus_path` and also returned.
pub fn merge(
    dataset_dir: impl AsRef<Path>,
    corpus_path: impl AsRef<Path>,
    sequence_length: usize,
) -> Result<String, CorpusError> {
    let new_song_delimiter = format!("{} ", DELIMITER_SYMBOL).repeat(sequence_length);

    let mut songs = String::new();
    for entry in WalkDir::new(dataset_dir).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        songs.push_str(&fs::read_to_string(entry.path())?);
        songs.push(' ');
        songs.push_str(&new_song_delimiter);
    }
    songs.pop();

    fs::write(corpus_path, &songs)?;
    Ok(songs)
}

/// Assign each distinct corpus symbol a dense integer code, in order of
/// first occurrence (so the same corpus always yields the same mapping),
/// and persist the table as JSON.
pub fn create_mapping(
    songs: &str,
    mappings_path: impl AsRef<Path>,
) -> Result<BTreeMap<String, i64>, CorpusError> {
    let mut mappings = BTreeMap::new();
    let mut next_code = 0i64;
    for symbol in songs.split_whitespace() {
        mappings.entry(symbol.to_string()).or_insert_with(|| {
            let code = next_code;
            next_code += 1;
            code
        });
    }

    let file = fs::File::create(mappings_path)?;
    serde_json::to_writer_pretty(file, &mappings)?;
    Ok(mappings)
}

/// Load a persisted vocabulary mapping.
pub fn load_mapping(path: impl AsRef<Path>) -> Result<BTreeMap<String, i64>, CorpusError> {
    let file = fs::File::open(path)?;
    Ok(serde_json::from_reader(file)?)
}

/// Map every whitespace-delimited token of `songs` through the vocabulary
/// mapping. A token absent from the mapping aborts the conversion.
pub fn convert_to_int(
    songs: &str,
    mappings: &BTreeMap<String, i64>,
) -> Result<Vec<i64>, CorpusError> {
    songs
        .split_whitespace()
        .map(|symbol| {
            mappings
                .get(symbol)
                .copied()
                .ok_or_else(|| CorpusError::UnknownSymbol(symbol.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn mapping_codes_follow_first_occurrence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mappings.json");
        let mappings = create_mapping("60 _ _ R 60 /", &path).unwrap();

        assert_eq!(mappings["60"], 0);
        assert_eq!(mappings["_"], 1);
        assert_eq!(mappings["R"], 2);
        assert_eq!(mappings["/"], 3);
        assert_eq!(mappings.len(), 4);

        // Persisted table round-trips.
        assert_eq!(load_mapping(&path).unwrap(), mappings);
    }

    #[test]
    fn mapping_is_deterministic_across_runs() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = "62 _ R _ 7.11.2 _ / / 62 R";
        let first = create_mapping(corpus, dir.path().join("a.json")).unwrap();
        let second = create_mapping(corpus, dir.path().join("b.json")).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn convert_to_int_maps_tokens_through_the_table() {
        let mappings = BTreeMap::from([
            ("60".to_string(), 0i64),
            ("R".to_string(), 1),
            ("_".to_string(), 2),
        ]);
        assert_eq!(convert_to_int("60 _ R", &mappings).unwrap(), vec![0, 2, 1]);
    }

    #[test]
    fn convert_to_int_rejects_unknown_symbols() {
        let mappings = BTreeMap::from([("60".to_string(), 0i64)]);
        let err = convert_to_int("60 61", &mappings).unwrap_err();
        assert!(matches!(err, CorpusError::UnknownSymbol(symbol) if symbol == "61"));
    }

    #[test]
    fn int_conversion_round_trips_through_the_inverse_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let stream = "60 _ _ _ R _ 0.4.7 _";
        let mappings = create_mapping(stream, &dir.path().join("m.json")).unwrap();
        let ints = convert_to_int(stream, &mappings).unwrap();

        let inverse: HashMap<i64, &str> = mappings
            .iter()
            .map(|(symbol, &code)| (code, symbol.as_str()))
            .collect();
        let decoded: Vec<&str> = ints.iter().map(|code| inverse[code]).collect();
        assert_eq!(decoded.join(" "), stream);
    }

    #[test]
    fn merge_joins_songs_with_delimiter_runs() {
        let dataset_dir = tempfile::tempdir().unwrap();
        fs::write(dataset_dir.path().join("song_0.txt"), "60 _ R _").unwrap();
        fs::write(dataset_dir.path().join("song_2.txt"), "64 _").unwrap();

        let out_dir = tempfile::tempdir().unwrap();
        let corpus_path = out_dir.path().join("dataset.txt");
        let corpus = merge(dataset_dir.path(), &corpus_path, 4).unwrap();

        assert_eq!(corpus, "60 _ R _ / / / / 64 _ / / / /");
        assert_eq!(fs::read_to_string(&corpus_path).unwrap(), corpus);
    }

    #[test]
    fn merge_tolerates_an_empty_song_file() {
        let dataset_dir = tempfile::tempdir().unwrap();
        fs::write(dataset_dir.path().join("song_0.txt"), "").unwrap();

        let out_dir = tempfile::tempdir().unwrap();
        let corpus = merge(dataset_dir.path(), out_dir.path().join("dataset.txt"), 3).unwrap();

        // The empty song contributes only its delimiter run.
        assert_eq!(corpus.split_whitespace().collect::<Vec<_>>(), ["/"; 3]);
    }

    #[test]
    fn ratings_lookup_fails_for_unrated_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ratings.json");
        fs::write(&path, r#"{"good.mid": 9, "bad.mid": 1}"#).unwrap();

        let ratings = Ratings::load(&path).unwrap();
        assert_eq!(ratings.get("good.mid").unwrap(), 9);
        let err = ratings.get("unknown.mid").unwrap_err();
        assert!(matches!(err, CorpusError::MissingRating(name) if name == "unknown.mid"));
    }
}
