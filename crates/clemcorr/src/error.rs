//! Error types shared across the correlation engine.

/// Result alias for clemcorr operations.
pub type Result<T> = std::result::Result<T, CorrError>;

/// Errors raised while fitting transforms or establishing a correlation.
#[derive(Debug, Clone, PartialEq)]
pub enum CorrError {
    /// A fit was requested with fewer point pairs than the model needs.
    InsufficientPoints { needed: usize, got: usize },
    /// Paired point sets (or a label list) differ in row count.
    MismatchedLengths { left: usize, right: usize },
    /// Decomposition or inversion attempted on a non-invertible linear part.
    SingularMatrix(&'static str),
    /// Mutually exclusive or missing parameters in the pipeline configuration.
    Configuration(String),
    /// A position source could not be read or parsed.
    Source(String),
}

impl std::fmt::Display for CorrError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InsufficientPoints { needed, got } => {
                write!(f, "too few point pairs: need {}, got {}", needed, got)
            }
            Self::MismatchedLengths { left, right } => {
                write!(f, "paired sets differ in length: {} vs {}", left, right)
            }
            Self::SingularMatrix(what) => write!(f, "singular linear part: {}", what),
            Self::Configuration(msg) => write!(f, "configuration error: {}", msg),
            Self::Source(msg) => write!(f, "position source error: {}", msg),
        }
    }
}

impl std::error::Error for CorrError {}
