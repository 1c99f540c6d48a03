//! Capability traits shared by every instrument class.
//!
//! Each driver implements the subset its hardware supports. Operations a
//! model declares but cannot perform return [`Outcome::Unsupported`] instead
//! of silently succeeding, so callers can tell "not implemented for this
//! model" apart from "done".

use super::identity::Identity;
use crate::error::{IviError, IviResult};
use serde::{Deserialize, Serialize};

/// Result of an operation that a model may not implement.
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    /// The operation ran and produced a value.
    Done(T),
    /// The model has no such operation. Nothing was sent.
    Unsupported,
}

impl<T> Outcome<T> {
    /// `true` for [`Outcome::Done`].
    pub fn is_supported(&self) -> bool {
        matches!(self, Outcome::Done(_))
    }

    /// Drop the distinction between unsupported and absent.
    pub fn into_option(self) -> Option<T> {
        match self {
            Outcome::Done(value) => Some(value),
            Outcome::Unsupported => None,
        }
    }

    /// Transform the value of a completed operation.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Done(value) => Outcome::Done(f(value)),
            Outcome::Unsupported => Outcome::Unsupported,
        }
    }

    /// Treat `Unsupported` as an error naming `operation`.
    pub fn required(self, operation: &str) -> IviResult<T> {
        self.into_option().ok_or_else(|| {
            IviError::UnsupportedValue(format!("{} is not supported by this instrument", operation))
        })
    }
}

/// `*TST?` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelfTestResult {
    /// Numeric result, 0 when the test passed.
    pub code: i64,
    /// Human-readable summary.
    pub message: String,
}

impl SelfTestResult {
    /// Build a result from the bare `*TST?` code. Instruments that only
    /// report a number get a generic pass/fail message.
    pub fn from_code(code: i64) -> Self {
        let message = if code == 0 {
            "Self test passed"
        } else {
            "Self test failed"
        };
        Self {
            code,
            message: message.to_string(),
        }
    }

    /// Whether the code is zero.
    pub fn passed(&self) -> bool {
        self.code == 0
    }
}

/// One entry of the instrument error queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    /// SCPI error number. 0 means the queue was empty; negative numbers are
    /// standard SCPI errors and positive ones are device specific.
    pub code: i64,
    /// Error text without the surrounding quotes.
    pub message: String,
}

impl ErrorReport {
    /// Parse a `SYST:ERR?` reply such as `-113,"Undefined header"`.
    pub fn parse(reply: &str) -> IviResult<Self> {
        let (code, message) = reply
            .trim()
            .split_once(',')
            .ok_or_else(|| IviError::invalid_response("SYST:ERR?", reply))?;
        let code = code
            .trim()
            .parse::<i64>()
            .map_err(|_| IviError::invalid_response("SYST:ERR?", reply))?;
        Ok(Self {
            code,
            message: message.trim().trim_matches('"').to_string(),
        })
    }

    /// The `0,"No error"` entry an empty queue reports.
    pub fn no_error() -> Self {
        Self {
            code: 0,
            message: "No error".to_string(),
        }
    }
}

/// Identity, reset, self-test and the error queue.
pub trait Utility {
    /// Cached `*IDN?` fields.
    fn identity(&mut self) -> IviResult<Identity>;

    /// Model prefixes this driver accepts during the id query.
    fn supported_models(&self) -> &'static [&'static str];

    /// `*RST`, then forget every cached value.
    fn reset(&mut self) -> IviResult<()>;

    /// Run the built-in self test. Some models need a long time to answer,
    /// so drivers may wait before reading the result.
    fn self_test(&mut self) -> IviResult<Outcome<SelfTestResult>>;

    /// Pop one entry from the instrument error queue.
    fn error_query(&mut self) -> IviResult<Outcome<ErrorReport>> {
        Ok(Outcome::Unsupported)
    }

    /// Lock the front panel.
    fn lock(&mut self) -> IviResult<Outcome<()>> {
        Ok(Outcome::Unsupported)
    }

    /// Return the front panel to local control.
    fn unlock(&mut self) -> IviResult<Outcome<()>> {
        Ok(Outcome::Unsupported)
    }

    /// Put the instrument in a safe state, outputs off.
    fn disable(&mut self) -> IviResult<Outcome<()>> {
        Ok(Outcome::Unsupported)
    }
}

/// `*TRG`.
pub trait SoftwareTrigger {
    /// Fire a bus trigger. Only acts on operations armed for a software
    /// trigger source.
    fn send_software_trigger(&mut self) -> IviResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_helpers() {
        let done = Outcome::Done(3);
        assert!(done.is_supported());
        assert_eq!(done.clone().map(|v| v * 2), Outcome::Done(6));
        assert_eq!(done.required("x").unwrap(), 3);

        let unsupported: Outcome<i32> = Outcome::Unsupported;
        assert_eq!(unsupported.clone().into_option(), None);
        assert!(matches!(
            unsupported.required("lock"),
            Err(IviError::UnsupportedValue(_))
        ));
    }

    #[test]
    fn test_self_test_messages() {
        assert!(SelfTestResult::from_code(0).passed());
        assert_eq!(SelfTestResult::from_code(0).message, "Self test passed");
        assert_eq!(SelfTestResult::from_code(5).message, "Self test failed");
    }

    #[test]
    fn test_error_report_parse() {
        let report = ErrorReport::parse("-113,\"Undefined header\"\n").unwrap();
        assert_eq!(report.code, -113);
        assert_eq!(report.message, "Undefined header");
        assert_eq!(ErrorReport::parse("0,\"No error\"").unwrap(), ErrorReport::no_error());
        assert!(ErrorReport::parse("garbage").is_err());
    }
}
