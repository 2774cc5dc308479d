//! Error types for particle extraction.

/// Result alias for tomopart operations.
pub type Result<T> = std::result::Result<T, ExtractError>;

/// Errors raised while resolving boxes, reading volumes or extracting
/// particles. Intensity clipping is deliberately not here: it is reported
/// (via `tracing::warn!` and the particle record) but never fatal.
#[derive(Debug)]
pub enum ExtractError {
    /// The requested particle box exceeds the volume extent on some axis.
    BoxTooLarge { box_size: usize, shape: [usize; 3] },
    /// Std normalization requested on zero-variance data.
    ZeroVariance { identifier: String, id: i32 },
    /// Unknown identifier, missing label id, or inconsistent parameters.
    Configuration(String),
    /// A volume file could not be read, parsed or written.
    Volume(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BoxTooLarge { box_size, shape } => write!(
                f,
                "box size {} is larger than the volume shape {:?}",
                box_size, shape
            ),
            Self::ZeroVariance { identifier, id } => write!(
                f,
                "cannot normalize std of zero-variance particle {} id {}",
                identifier, id
            ),
            Self::Configuration(msg) => write!(f, "configuration error: {}", msg),
            Self::Volume(msg) => write!(f, "volume error: {}", msg),
        }
    }
}

impl std::error::Error for ExtractError {}

impl From<std::io::Error> for ExtractError {
    fn from(e: std::io::Error) -> Self {
        Self::Volume(e.to_string())
    }
}
