//! Custom error types for the driver layer.
//!
//! `IviError` is the single error type returned by every driver operation.
//! Validation variants (`UnknownChannel`, `OutOfRange`, `UnsupportedValue`)
//! are always produced before any command reaches the instrument. Transport
//! variants (`Transport`, `Io`, `InvalidResponse`) are passed through from
//! the communication layer unchanged and never retried here.

use thiserror::Error;

/// Convenience alias for results using the driver error type.
pub type IviResult<T> = std::result::Result<T, IviError>;

/// Every failure a driver operation can report.
///
/// Callers that want to retry should only do so for
/// [`is_transport_failure`](IviError::is_transport_failure) errors; the
/// validation variants will fail the same way every time.
#[derive(Error, Debug)]
pub enum IviError {
    /// A channel name or index that is not in the instrument's channel table.
    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    /// A numeric value outside the channel's range. Never clamped.
    #[error("{attribute} value {value} out of range [{min}, {max}]")]
    OutOfRange {
        /// Attribute that was being written
        attribute: &'static str,
        /// Rejected value
        value: f64,
        /// Lower bound of the accepted interval
        min: f64,
        /// Upper bound of the accepted interval
        max: f64,
    },

    /// A value the model cannot take: an unsupported enum member, a bad
    /// waveform length, a wrong file extension, an unknown attribute name.
    #[error("Unsupported value: {0}")]
    UnsupportedValue(String),

    /// The communication layer failed (timeout, closed port, scripted mock
    /// failure).
    #[error("Transport error: {0}")]
    Transport(String),

    /// OS-level I/O error from a socket or serial port.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The instrument answered, but not with something the attribute's type
    /// can be parsed from.
    #[error("Unparseable response to '{command}': '{response}'")]
    InvalidResponse {
        /// Query that was sent
        command: String,
        /// Raw reply as received
        response: String,
    },

    /// `*IDN?` reported a model the driver does not support.
    #[error("Instrument ID mismatch, expecting {expected}, got {actual}")]
    IdentityMismatch {
        /// Accepted model prefixes, `|`-separated
        expected: String,
        /// Model string the instrument reported
        actual: String,
    },

    /// The settings file or environment could not be parsed.
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    /// Settings parsed but are unusable (empty resource, duplicate channel).
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// The resource needs a transport that was compiled out.
    #[error("Feature '{0}' is not enabled. Please build with --features {0}")]
    FeatureNotEnabled(String),
}

impl IviError {
    /// True for failures that originate in the communication layer.
    pub fn is_transport_failure(&self) -> bool {
        matches!(
            self,
            IviError::Transport(_) | IviError::Io(_) | IviError::InvalidResponse { .. }
        )
    }

    pub(crate) fn invalid_response(command: &str, response: &str) -> Self {
        IviError::InvalidResponse {
            command: command.to_string(),
            response: response.to_string(),
        }
    }
}
