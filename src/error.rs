use std::path::PathBuf;

/// Errors raised while mapping, reconciling, building or crawling sensor files.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Identity string has fewer tokens than a sensor URN needs
    #[error("malformed identifier '{urn}': expected at least {expected} ':'-separated tokens")]
    MalformedIdentifier { urn: String, expected: usize },

    /// Fewer than two distinct time points survived reconciliation
    #[error("insufficient data: {unique_times} distinct time value(s), at least 2 required")]
    InsufficientData { unique_times: usize },

    /// Files being merged disagree on the rank of the data variable
    #[error("files disagree on rank of '{variable}': {expected} vs {found} in {}", path.display())]
    DimensionMismatch {
        variable: String,
        expected: usize,
        found: usize,
        path: PathBuf,
    },

    /// Scatter placement could not locate a row on the grid axes
    #[error("irregular grid: row (time={time}, vertical={vertical:?}) has no cell")]
    IrregularGrid { time: i64, vertical: Option<f64> },

    /// A time-only series holds two different values for one instant
    #[error("conflicting values at time {time}: {first} vs {second}")]
    ConflictingValues { time: i64, first: f64, second: f64 },

    /// Parallel input sequences differ in length
    #[error("input length mismatch: {times} times, {verticals} verticals, {values} values")]
    LengthMismatch {
        times: usize,
        verticals: usize,
        values: usize,
    },

    /// A required variable or attribute is absent from a file
    #[error("missing '{name}' in {}", path.display())]
    MissingVariable { name: String, path: PathBuf },

    /// Merged files report different station positions and the policy rejects it
    #[error("component files of {sensor} disagree on {axis}: {values:?}")]
    CoordinateMismatch {
        sensor: String,
        axis: &'static str,
        values: Vec<f64>,
    },

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// NetCDF library error
    #[error("NetCDF error: {0}")]
    NetCdf(#[from] netcdf::Error),

    /// Report serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Descriptor XML could not be produced
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// Configuration file could not be parsed
    #[error("configuration error: {0}")]
    Config(#[from] toml::de::Error),
}

impl Error {
    /// Whether a crawl, merge or descriptor pass may log this error and move on
    /// to the next file or sensor. Structural misuse of the API is not.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Error::LengthMismatch { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
