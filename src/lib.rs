pub mod corpus;
pub mod encode;
pub mod key;
pub mod score;
pub mod sequences;

/// Durations (in quarter lengths) a song may use. Songs containing any other
/// duration are skipped entirely.
pub const ACCEPTABLE_DURATIONS: [f64; 8] = [0.25, 0.5, 0.75, 1.0, 1.5, 2.0, 3.0, 4.0];

/// Width of the training window, in tokens. Also the length of the
/// song-boundary marker run written between songs in the merged corpus.
pub const SEQUENCE_LENGTH: usize = 64;

/// Encoding granularity, in quarter lengths (0.25 = sixteenth notes).
pub const TIME_STEP: f64 = 0.25;

/// Quality weight assigned to songs without an entry in the ratings table.
pub const DEFAULT_RATING: u32 = 4;

/// Token emitted when a rest starts.
pub const REST_SYMBOL: &str = "R";

/// Token emitted on every time step an event is held past its first.
pub const HOLD_SYMBOL: &str = "_";

/// Token repeated `SEQUENCE_LENGTH` times between songs in the merged corpus.
pub const DELIMITER_SYMBOL: &str = "/";
