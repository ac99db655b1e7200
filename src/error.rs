//! Crate-wide error type

use thiserror::Error;

use crate::block::BlockError;
use crate::record::RecordError;
use crate::solvers::SolverError;

/// Errors surfaced by the simulator and models
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error(transparent)]
    Block(#[from] BlockError),

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error(transparent)]
    Solver(#[from] SolverError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Model(String),

    #[error("panic in model: {0}")]
    Panic(String),
}

impl Error {
    /// Short name of the error kind, used in failure reports
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Block(BlockError::SampleTimeMismatch { .. }) => "SampleTimeError",
            Error::Block(BlockError::MissingParameter { .. }) => "MissingParameterError",
            Error::Block(_) => "BlockError",
            Error::Record(RecordError::ShapeMismatch { .. }) => "ShapeError",
            Error::Record(_) => "RecordError",
            Error::Solver(_) => "SolverError",
            Error::Config(_) => "ConfigError",
            Error::Model(_) => "ModelError",
            Error::Panic(_) => "Panic",
        }
    }

    /// Error raised by model code
    pub fn model(message: impl Into<String>) -> Self {
        Error::Model(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_and_message() {
        let err: Error = RecordError::ShapeMismatch { group: 1, expected: 3, found: 2 }.into();
        assert_eq!(err.kind(), "ShapeError");
        assert_eq!(err.to_string(), "output group 1 has 2 rows, expected 1 or 3");

        let err = Error::model("controller diverged");
        assert_eq!(err.kind(), "ModelError");
        assert_eq!(err.to_string(), "controller diverged");
    }

    #[test]
    fn test_block_errors_convert() {
        let err: Error = BlockError::UnknownBlockType("vehicle.Rocket".into()).into();
        assert_eq!(err.kind(), "BlockError");
        assert_eq!(err.to_string(), "unknown block type 'vehicle.Rocket'");
    }
}
