//! Errors raised by [`FaceRecord`] accessors.
//!
//! Failures inside individual analysis stages are *not* reported through this type: they are
//! logged where they happen and recorded in the affected feature slot. Only reading a slot can
//! raise an [`Error`].
//!
//! [`FaceRecord`]: crate::record::FaceRecord

use thiserror::Error;

use crate::record::Feature;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// The record has not finished processing yet.
    #[error("face record has not been processed yet")]
    NotProcessed,

    /// Analysis of the requested feature was attempted and failed.
    #[error("{feature} is unavailable: {reason}")]
    Unavailable { feature: Feature, reason: String },

    /// A malformed argument (for example a NaN coordinate) was passed in.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages() {
        assert_eq!(
            Error::NotProcessed.to_string(),
            "face record has not been processed yet"
        );
        let err = Error::Unavailable {
            feature: Feature::Iris,
            reason: "no landmarks".into(),
        };
        assert_eq!(err.to_string(), "iris is unavailable: no landmarks");
    }
}
