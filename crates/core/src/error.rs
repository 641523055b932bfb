use chrono::NaiveDate;
use thiserror::Error;

pub type InsightResult<T> = Result<T, InsightError>;

#[derive(Error, Debug)]
pub enum InsightError {
    #[error("Invalid date range: start {start} is after end {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    #[error("Invalid sort field: {0}")]
    InvalidSortField(String),

    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("Missing required parameter: {0}")]
    MissingRequiredParameter(&'static str),

    #[error("{kind} not found: {id}")]
    ResourceNotFound { kind: &'static str, id: String },

    #[error("Insufficient data: need {required} data points, have {available}")]
    InsufficientData { required: usize, available: usize },

    #[error("Transaction source error: {0}")]
    Source(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl InsightError {
    /// Stable machine-readable code surfaced to API consumers.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidDateRange { .. } => "INVALID_DATE_RANGE",
            Self::InvalidSortField(_) => "INVALID_SORT_FIELD",
            Self::InvalidParameter { .. } => "INVALID_PARAMETER",
            Self::MissingRequiredParameter(_) => "MISSING_REQUIRED_PARAMETER",
            Self::ResourceNotFound { .. } => "RESOURCE_NOT_FOUND",
            Self::InsufficientData { .. } => "INSUFFICIENT_DATA",
            Self::Source(_) => "SOURCE_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Parameter-shape errors, raised before any aggregation work.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidDateRange { .. }
                | Self::InvalidSortField(_)
                | Self::InvalidParameter { .. }
                | Self::MissingRequiredParameter(_)
        )
    }
}

impl From<config::ConfigError> for InsightError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
