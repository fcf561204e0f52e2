//! Typed error taxonomy for the matching engine.
//!
//! Every fallible public entry point returns `Result<_, Error>`. The top-level
//! match call is the only place an `Error` gets folded into a [`MatchResultTag`]
//! for the stats block; every inner stage just propagates with `?`.

use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Unparseable datetime, missing column, empty input.
    #[error("input error: {0}")]
    Input(String),

    /// Fewer than `minpoints` conditioned observations survived.
    #[error("too few points survived conditioning and candidate search: {surviving} < {required}")]
    TooSparse { surviving: usize, required: usize },

    /// Gateway query timeout or connectivity loss. `transient` distinguishes a
    /// retryable condition from one the caller should treat as permanent.
    #[error("gateway error: {message}")]
    Gateway { message: String, transient: bool },

    /// A contradicted invariant, e.g. a node referenced by a way but absent
    /// from the node table.
    #[error("internal invariant violated: {0}")]
    Internal(String),
}

impl Error {
    /// The batch-level result tag a failed match call reports in its stats
    /// block. This is the single place the `Error` → tag
    /// mapping lives.
    pub fn result_tag(&self) -> MatchResultTag {
        match self {
            Error::Input(_) => MatchResultTag::NotEnoughPoints,
            Error::TooSparse { .. } => MatchResultTag::NotEnoughPoints,
            Error::Gateway { .. } => MatchResultTag::DbError,
            Error::Internal(_) => MatchResultTag::InternalError,
        }
    }

    pub fn gateway(message: impl Into<String>, transient: bool) -> Self {
        Error::Gateway { message: message.into(), transient }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Error::Internal(message.into())
    }
}

/// The `result` column of the stats block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchResultTag {
    Ok,
    NotEnoughPoints,
    DbError,
    InternalError,
}

impl fmt::Display for MatchResultTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MatchResultTag::Ok => "ok",
            MatchResultTag::NotEnoughPoints => "not_enough_points",
            MatchResultTag::DbError => "db_error",
            MatchResultTag::InternalError => "internal_error",
        };
        f.write_str(s)
    }
}
