use std::path::PathBuf;
use thiserror::Error;

/// A received line that does not carry two `label: value V` readings.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("line is not valid UTF-8")]
    Encoding,
    #[error("expected two tab-separated fields, found {found}")]
    MissingField { found: usize },
    #[error("field {field} has no \": \" separator")]
    MissingSeparator { field: usize },
    #[error("field {field} value {value:?} is not a number")]
    InvalidNumber { field: usize, value: String },
}

/// The serial device could not be opened; the start transition is aborted.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("no serial ports available")]
    NoPortAvailable,
    #[error("failed to enumerate serial ports: {0}")]
    Enumerate(#[source] serialport::Error),
    #[error("failed to open {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: serialport::Error,
    },
}

/// Read failure on an open connection. Recovered as a no-op poll cycle.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("serial read failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("serial port error: {0}")]
    Port(#[from] serialport::Error),
}

#[derive(Debug, Error)]
pub enum SaveError {
    #[error("no samples recorded; nothing was written")]
    EmptyStore,
    #[error("capture is still running; stop it before saving")]
    CaptureActive,
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SaveError {
    /// Empty-store saves are a warning, not a failure.
    pub fn is_warning(&self) -> bool {
        matches!(self, SaveError::EmptyStore)
    }
}

#[derive(Debug, Error)]
pub enum PlotError {
    #[error("capture has no samples to plot")]
    Empty,
    #[error("failed to render plot: {0}")]
    Render(String),
}

impl<E: std::error::Error + Send + Sync + 'static> From<plotters::drawing::DrawingAreaErrorKind<E>>
    for PlotError
{
    fn from(value: plotters::drawing::DrawingAreaErrorKind<E>) -> Self {
        PlotError::Render(format!("{value:?}"))
    }
}

impl From<image::ImageError> for PlotError {
    fn from(value: image::ImageError) -> Self {
        PlotError::Render(value.to_string())
    }
}
