//! Error types for the light-curve PCA pipeline.

use thiserror::Error;

/// Errors raised by the numeric pipeline and its table/report glue.
#[derive(Error, Debug)]
pub enum LightCurveError {
    /// A stage parameter or output option has an invalid value.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// A retained-component count outside `[1, max]`. Signed so that
    /// negative truncation orders from the command line can be reported.
    #[error("Invalid component count {requested}: must be between 1 and {max}")]
    InvalidComponentCount { requested: i64, max: usize },

    /// A row whose values are all equal cannot be min/max normalized.
    #[error("Degenerate input: row {row} has zero dynamic range")]
    DegenerateInput { row: usize },

    /// A light-curve, periods or observation table could not be parsed.
    #[error("Malformed table at line {line}: {message}")]
    MalformedTable { line: usize, message: String },

    /// A star has no entry in the periods mapping.
    #[error("No period listed for star '{star}'")]
    MissingPeriod { star: String },

    /// A stage was used before `fit`.
    #[error("{0} has not been fitted")]
    NotFitted(&'static str),

    /// Input dimensions disagree with the fitted state.
    #[error("Shape mismatch in {context}: expected {expected}, got {actual}")]
    ShapeMismatch {
        context: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Input that no stage can work with (empty, non-finite, too few samples).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The decomposition backend failed.
    #[error("Linear algebra error: {0}")]
    Linalg(String),

    /// A per-star output task failed.
    #[error("Output for star '{star}' failed: {source}")]
    Sink {
        star: String,
        #[source]
        source: Box<LightCurveError>,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type alias for light-curve PCA operations.
pub type Result<T> = std::result::Result<T, LightCurveError>;

impl LightCurveError {
    /// Create an invalid configuration error.
    #[must_use]
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create an invalid component count error.
    #[must_use]
    pub const fn invalid_component_count(requested: usize, max: usize) -> Self {
        Self::InvalidComponentCount {
            requested: requested as i64,
            max,
        }
    }

    /// Create a malformed table error for a 1-based line number.
    #[must_use]
    pub fn malformed_table(line: usize, message: impl Into<String>) -> Self {
        Self::MalformedTable {
            line,
            message: message.into(),
        }
    }

    /// Create an invalid input error.
    #[must_use]
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a linear algebra error.
    #[must_use]
    pub fn linalg(msg: impl Into<String>) -> Self {
        Self::Linalg(msg.into())
    }

    /// Wrap an error raised while producing output for `star`.
    #[must_use]
    pub fn sink(star: impl Into<String>, source: LightCurveError) -> Self {
        Self::Sink {
            star: star.into(),
            source: Box::new(source),
        }
    }
}
