//! Domain error types.

/// Top-level error type for smartexpert.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SmartExpertError {
    /// The storage backend cannot be reached at all (pool or connection failure).
    #[error("database error: {reason}")]
    Database { reason: String },

    /// A single statement or transaction failed; earlier commits are untouched.
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

    #[error("unknown symbol: {name}")]
    UnknownSymbol { name: String },

    #[error("unknown timeframe: {name}")]
    UnknownTimeframe { name: String },

    #[error("unknown risk parameter: {name}")]
    UnknownParameter { name: String },

    #[error("broker connection to {server} failed: {reason}")]
    Connection { server: String, reason: String },

    #[error("fetch failed for {symbol} {timeframe}: {reason}")]
    Fetch {
        symbol: String,
        timeframe: String,
        reason: String,
    },

    #[error("cannot size position: {reason}")]
    DegenerateRisk { reason: String },

    #[error("io error: {0}")]
    Io(String),
}

impl SmartExpertError {
    /// Errors that end a whole ingestion run rather than a single pair.
    pub fn is_fatal_for_run(&self) -> bool {
        matches!(
            self,
            SmartExpertError::Database { .. } | SmartExpertError::Connection { .. }
        )
    }

    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            SmartExpertError::ConfigParse { .. }
                | SmartExpertError::ConfigMissing { .. }
                | SmartExpertError::ConfigInvalid { .. }
                | SmartExpertError::UnknownSymbol { .. }
                | SmartExpertError::UnknownTimeframe { .. }
                | SmartExpertError::UnknownParameter { .. }
        )
    }
}

impl From<std::io::Error> for SmartExpertError {
    fn from(err: std::io::Error) -> Self {
        SmartExpertError::Io(err.to_string())
    }
}

impl From<&SmartExpertError> for std::process::ExitCode {
    fn from(err: &SmartExpertError) -> Self {
        let code: u8 = match err {
            SmartExpertError::Io(_) => 1,
            SmartExpertError::ConfigParse { .. }
            | SmartExpertError::ConfigMissing { .. }
            | SmartExpertError::ConfigInvalid { .. }
            | SmartExpertError::UnknownSymbol { .. }
            | SmartExpertError::UnknownTimeframe { .. }
            | SmartExpertError::UnknownParameter { .. } => 2,
            SmartExpertError::Database { .. } | SmartExpertError::DatabaseQuery { .. } => 3,
            SmartExpertError::Connection { .. } => 4,
            SmartExpertError::Fetch { .. } => 5,
            SmartExpertError::DegenerateRisk { .. } => 6,
        };
        std::process::ExitCode::from(code)
    }
}
