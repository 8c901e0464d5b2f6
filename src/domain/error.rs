//! Domain error types.
//!
//! Only conditions that abort a run (or stop the CLI) are errors. Per-bar skips
//! and rejected duplicate orders are ordinary values, see
//! [`crate::domain::strategy::Decision`] and [`crate::domain::bracket::IssueOutcome`].

/// Top-level error type for closehigh.
#[derive(Debug, thiserror::Error)]
pub enum CloseHighError {
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

    #[error("no candles for {ticker} ({interval})")]
    NoData { ticker: String, interval: String },

    #[error("bad candle data in {source_name}: {reason}")]
    DataFormat { source_name: String, reason: String },

    #[error(
        "sizing inconsistency for {ticker}: cash={cash}, value={value}, price={price}"
    )]
    SizingInconsistency {
        ticker: String,
        cash: f64,
        value: f64,
        price: f64,
    },

    #[error("invalid bracket for {ticker}: {reason}")]
    InvalidBracket { ticker: String, reason: String },

    #[error("report error: {reason}")]
    Report { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CloseHighError {
    /// True for errors that abort a single simulation but leave a sweep running.
    pub fn is_run_fatal(&self) -> bool {
        matches!(
            self,
            CloseHighError::SizingInconsistency { .. } | CloseHighError::InvalidBracket { .. }
        )
    }
}

impl From<&CloseHighError> for std::process::ExitCode {
    fn from(err: &CloseHighError) -> Self {
        let code: u8 = match err {
            CloseHighError::Io(_) | CloseHighError::Report { .. } => 1,
            CloseHighError::ConfigParse { .. }
            | CloseHighError::ConfigMissing { .. }
            | CloseHighError::ConfigInvalid { .. } => 2,
            CloseHighError::DataFormat { .. } => 3,
            CloseHighError::SizingInconsistency { .. } | CloseHighError::InvalidBracket { .. } => 4,
            CloseHighError::NoData { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
