//! Domain error types.

/// Top-level error type for sticklab.
#[derive(Debug, thiserror::Error)]
pub enum SticklabError {
    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("stick payload decode error: {reason}")]
    Decode { reason: String },

    #[error("malformed stick payload: field {field} has {found} entries, expected {expected}")]
    MalformedPayload {
        field: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("epoch {0} is out of range")]
    InvalidEpoch(i64),

    #[error("no data for {symbol}")]
    NoData { symbol: String },

    #[error("insufficient data for {symbol}: have {bars} sticks, need {minimum}")]
    InsufficientData {
        symbol: String,
        bars: usize,
        minimum: usize,
    },

    #[error("report error: {reason}")]
    Report { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&SticklabError> for std::process::ExitCode {
    fn from(err: &SticklabError) -> Self {
        let code: u8 = match err {
            SticklabError::Io(_) | SticklabError::Report { .. } => 1,
            SticklabError::ConfigParse { .. }
            | SticklabError::ConfigMissing { .. }
            | SticklabError::ConfigInvalid { .. } => 2,
            SticklabError::Database { .. } | SticklabError::DatabaseQuery { .. } => 3,
            SticklabError::Decode { .. }
            | SticklabError::MalformedPayload { .. }
            | SticklabError::InvalidEpoch(_) => 4,
            SticklabError::NoData { .. } | SticklabError::InsufficientData { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
