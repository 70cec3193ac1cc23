use streaming::{DataType, Dimensions, SourceError};

/// Errors raised while planning, fetching or validating layer data.
#[derive(Debug)]
pub enum LayerError {
    /// A visible grid cell has no pyramid levels.
    MissingSources { row: u32, col: u32 },
    /// A label pyramid was given with zero levels.
    EmptyPyramid,
    /// Pyramid levels disagree on their tile size.
    TileSizeMismatch { expected: u32, found: u32 },
    /// Label data must be integer typed.
    NonIntegerLabels(DataType),
    /// A fully fetched grid cell differs in shape from the first one.
    ShapeMismatch {
        row: u32,
        col: u32,
        expected: Dimensions,
        found: Dimensions,
    },
    Source(SourceError),
}

impl LayerError {
    /// Caller misuse that should surface instead of degrading to empty data.
    pub fn is_precondition(&self) -> bool {
        match self {
            LayerError::MissingSources { .. }
            | LayerError::EmptyPyramid
            | LayerError::TileSizeMismatch { .. }
            | LayerError::NonIntegerLabels(_) => true,
            LayerError::ShapeMismatch { .. } => false,
            LayerError::Source(err) => err.is_precondition(),
        }
    }
}

impl std::fmt::Display for LayerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LayerError::MissingSources { row, col } => {
                write!(f, "grid cell ({row}, {col}) has no pyramid levels")
            }
            LayerError::EmptyPyramid => write!(f, "label pyramid has no levels"),
            LayerError::TileSizeMismatch { expected, found } => write!(
                f,
                "pyramid levels must share one tile size (expected {expected}, found {found})"
            ),
            LayerError::NonIntegerLabels(dtype) => {
                write!(f, "label data must be integer typed, got {dtype}")
            }
            LayerError::ShapeMismatch {
                row,
                col,
                expected,
                found,
            } => write!(
                f,
                "grid cell ({row}, {col}) is {}x{}, expected {}x{}",
                found.width, found.height, expected.width, expected.height
            ),
            LayerError::Source(err) => write!(f, "pixel source error: {err}"),
        }
    }
}

impl std::error::Error for LayerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LayerError::Source(err) => Some(err),
            _ => None,
        }
    }
}

impl From<SourceError> for LayerError {
    fn from(err: SourceError) -> Self {
        LayerError::Source(err)
    }
}
