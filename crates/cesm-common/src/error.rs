//! Error types for CESM time-series generation.

use thiserror::Error;

/// Result type alias using TseriesError.
pub type TseriesResult<T> = Result<T, TseriesError>;

/// Primary error type for time-series operations.
#[derive(Debug, Error)]
pub enum TseriesError {
    // === Request Errors ===
    #[error("unrecognized component: {0}")]
    UnrecognizedComponent(String),

    #[error("{op} not implemented for {context}")]
    UnrecognizedOperation { op: String, context: String },

    #[error("freq={0} not implemented")]
    UnsupportedFrequency(String),

    #[error(
        "no file matches found for varname={variable}, component={component}, \
         stream={stream}, experiment={experiment}"
    )]
    NoMatchingFiles {
        variable: String,
        component: String,
        stream: String,
        experiment: String,
    },

    // === Data Errors ===
    #[error("unexpected dim_cnt={found} (expected {expected}), varname={variable}")]
    DimensionMismatch {
        variable: String,
        expected: usize,
        found: usize,
    },

    #[error("variable not found: {0}")]
    MissingVariable(String),

    #[error("attribute '{attribute}' not found on {variable}")]
    MissingAttribute { variable: String, attribute: String },

    #[error("no time steps to reduce for varname={0}")]
    EmptyTimeAxis(String),

    #[error("invalid time specification: {0}")]
    InvalidTime(String),

    #[error("invalid units '{units}': {message}")]
    InvalidUnits { units: String, message: String },

    #[error("cannot convert from '{from}' to '{to}'")]
    IncompatibleUnits { from: String, to: String },

    #[error("invalid data format: {0}")]
    InvalidFormat(String),

    // === Infrastructure Errors ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("NetCDF error: {0}")]
    NetCdf(String),

    #[error("worker pool error: {0}")]
    WorkerPool(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl TseriesError {
    /// Create an UnrecognizedOperation error.
    pub fn unrecognized_operation(op: impl Into<String>, context: impl Into<String>) -> Self {
        Self::UnrecognizedOperation {
            op: op.into(),
            context: context.into(),
        }
    }

    /// Create a DimensionMismatch error.
    pub fn dimension_mismatch(variable: impl Into<String>, expected: usize, found: usize) -> Self {
        Self::DimensionMismatch {
            variable: variable.into(),
            expected,
            found,
        }
    }

    /// Create a MissingAttribute error.
    pub fn missing_attribute(variable: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self::MissingAttribute {
            variable: variable.into(),
            attribute: attribute.into(),
        }
    }

    /// Create an InvalidUnits error.
    pub fn invalid_units(units: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidUnits {
            units: units.into(),
            message: message.into(),
        }
    }

    /// Whether retrying the same request later could succeed.
    ///
    /// Request and data errors are fatal; I/O and worker failures are transient,
    /// and the cache leaves no lock behind so an external retry is safe.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TseriesError::Io(_) | TseriesError::NetCdf(_) | TseriesError::WorkerPool(_)
        )
    }
}

impl From<serde_json::Error> for TseriesError {
    fn from(err: serde_json::Error) -> Self {
        TseriesError::Serialization(format!("JSON error: {}", err))
    }
}

impl From<serde_yaml::Error> for TseriesError {
    fn from(err: serde_yaml::Error) -> Self {
        TseriesError::Serialization(format!("YAML error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_matching_files_message_embeds_query() {
        let err = TseriesError::NoMatchingFiles {
            variable: "FG_CO2".to_string(),
            component: "ocn".to_string(),
            stream: "pop.h".to_string(),
            experiment: "esm-hist".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("varname=FG_CO2"));
        assert!(msg.contains("component=ocn"));
        assert!(msg.contains("experiment=esm-hist"));
    }

    #[test]
    fn test_transient_classification() {
        let io = TseriesError::from(std::io::Error::new(std::io::ErrorKind::Other, "disk"));
        assert!(io.is_transient());
        assert!(!TseriesError::dimension_mismatch("TAREA", 2, 3).is_transient());
        assert!(!TseriesError::UnsupportedFrequency("day".into()).is_transient());
    }
}
