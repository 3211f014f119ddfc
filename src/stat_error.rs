use thiserror::Error;

use crate::expressions::{EvalError, ParseError};
use crate::stat_addressing::StatId;
use crate::modifiers::ModifierId;

/// Error type for the stat system
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StatError {
    /// The handle refers to a stat that was removed (or never belonged to this scope).
    #[error("stat handle {0} is stale")]
    StaleHandle(StatId),

    /// A stat with this display name or short name already exists in the scope.
    #[error("a stat named '{name}' already exists")]
    DuplicateStat { name: String },

    /// Stats need a non-empty display name.
    #[error("stat names must not be empty")]
    EmptyName,

    /// Stat not found by name
    #[error("stat '{name}' not found")]
    StatNotFound { name: String },

    /// Modifier not found on the given stat
    #[error("modifier {modifier} not found on stat {stat}")]
    ModifierNotFound { stat: StatId, modifier: ModifierId },

    /// A formula failed to compile
    #[error("invalid formula '{formula}': {source}")]
    Formula { formula: String, source: ParseError },
}

// Type alias for Result with StatError
pub type StatResult<T> = Result<T, StatError>;

/// Recoverable conditions raised while recomputing values.
///
/// None of these stop a read; the scope substitutes a fallback value, logs the
/// condition and keeps it in its diagnostics ring for tooling to inspect.
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// A formula names a stat that does not exist in the scope. The reference evaluated to `0`.
    UnresolvedReference { stat: String, reference: String },
    /// A stat's formula was re-entered while it was being evaluated. The stat fell back to its base value.
    CircularFormula { stat: String },
    /// The formula could not be parsed or evaluated. Its contribution was `0`.
    FormulaError { stat: String, error: EvalError },
}

impl Diagnostic {
    pub fn stat(&self) -> &str {
        match self {
            Diagnostic::UnresolvedReference { stat, .. } => stat,
            Diagnostic::CircularFormula { stat } => stat,
            Diagnostic::FormulaError { stat, .. } => stat,
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Diagnostic::UnresolvedReference { stat, reference } => {
                write!(f, "'{}' references unknown stat '{}', using 0", stat, reference)
            }
            Diagnostic::CircularFormula { stat } => {
                write!(f, "circular formula through '{}', using its base value", stat)
            }
            Diagnostic::FormulaError { stat, error } => {
                write!(f, "formula of '{}' failed: {}, using 0", stat, error)
            }
        }
    }
}
