//! Instrument identity reported by `*IDN?`.

use crate::error::{IviError, IviResult};
use serde::{Deserialize, Serialize};

const SIMULATED: &str = "Not available while simulating";

/// The four `*IDN?` fields, fetched once per session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Vendor name as reported.
    pub manufacturer: String,
    /// Model string, matched against the driver's supported prefixes.
    pub model: String,
    /// Serial number.
    pub serial_number: String,
    /// Firmware (and sometimes hardware) revision.
    pub firmware_revision: String,
}

impl Identity {
    /// Parse `manufacturer,model,serial,firmware`.
    pub fn parse(reply: &str) -> IviResult<Self> {
        let fields: Vec<&str> = reply.trim().split(',').map(str::trim).collect();
        match fields.as_slice() {
            [manufacturer, model, serial_number, firmware_revision, ..] => Ok(Self {
                manufacturer: manufacturer.to_string(),
                model: model.to_string(),
                serial_number: serial_number.to_string(),
                firmware_revision: firmware_revision.to_string(),
            }),
            _ => Err(IviError::invalid_response("*IDN?", reply)),
        }
    }

    /// Placeholder identity reported in simulate mode, where no `*IDN?` is
    /// sent. Drivers skip the model check for it.
    pub fn simulated() -> Self {
        Self {
            manufacturer: SIMULATED.to_string(),
            model: SIMULATED.to_string(),
            serial_number: SIMULATED.to_string(),
            firmware_revision: SIMULATED.to_string(),
        }
    }

    /// Fail with `IdentityMismatch` unless the model starts with one of
    /// `expected` (case-insensitive). An empty list accepts any model.
    pub fn check_model(&self, expected: &[&str]) -> IviResult<()> {
        if expected.is_empty() {
            return Ok(());
        }
        let model = self.model.to_ascii_uppercase();
        if expected
            .iter()
            .any(|prefix| model.starts_with(&prefix.to_ascii_uppercase()))
        {
            Ok(())
        } else {
            Err(IviError::IdentityMismatch {
                expected: expected.join("|"),
                actual: self.model.clone(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_idn() {
        let identity =
            Identity::parse("Rohde&Schwarz,HMP2020,012345678,HW50020001/SW2.51\n").unwrap();
        assert_eq!(identity.manufacturer, "Rohde&Schwarz");
        assert_eq!(identity.model, "HMP2020");
        assert_eq!(identity.firmware_revision, "HW50020001/SW2.51");
    }

    #[test]
    fn test_short_idn_rejected() {
        assert!(Identity::parse("Rigol Technologies,DG1022Z").is_err());
    }

    #[test]
    fn test_check_model_prefix() {
        let identity = Identity::parse("Rigol Technologies,DG1062Z,DG1ZA1,00.01.14").unwrap();
        assert!(identity.check_model(&["DG1022Z", "DG1042Z", "DG1062Z"]).is_ok());
        assert!(identity.check_model(&[]).is_ok());
        assert!(matches!(
            identity.check_model(&["HMP2020"]),
            Err(IviError::IdentityMismatch { .. })
        ));
    }
}
