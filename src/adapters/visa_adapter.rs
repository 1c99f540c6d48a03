//! VISA transport for GPIB/USB-TMC/LXI instruments
//!
//! Wraps a `visa-rs` session. Supports resource strings like:
//! - "GPIB0::1::INSTR" (GPIB interface)
//! - "USB0::0x1AB1::0x0642::DG1ZA000000001::INSTR" (USB-TMC)
//! - "TCPIP0::192.168.1.100::INSTR" (VXI-11)

use super::Transport;
use crate::config::InstrumentSettings;
use crate::error::IviResult;

#[cfg(feature = "instrument_visa")]
use super::{ieee_block, read_line};
#[cfg(feature = "instrument_visa")]
use crate::error::IviError;
#[cfg(feature = "instrument_visa")]
use std::ffi::CString;
#[cfg(feature = "instrument_visa")]
use std::io::Write;
#[cfg(feature = "instrument_visa")]
use std::time::Duration;
#[cfg(feature = "instrument_visa")]
use tracing::debug;
#[cfg(feature = "instrument_visa")]
use visa_rs::prelude::*;

/// VISA-backed transport. Without the `instrument_visa` feature every
/// operation fails with [`IviError::FeatureNotEnabled`](crate::error::IviError::FeatureNotEnabled).
pub struct VisaAdapter {
    /// VISA resource string (e.g., "GPIB0::1::INSTR")
    resource_string: String,

    #[cfg(feature = "instrument_visa")]
    timeout: Duration,

    #[cfg(feature = "instrument_visa")]
    line_terminator: String,

    #[cfg(feature = "instrument_visa")]
    session: visa_rs::Instrument,
}

impl VisaAdapter {
    /// Open `resource` through the default resource manager.
    #[cfg(feature = "instrument_visa")]
    pub fn open(resource: &str, settings: &InstrumentSettings) -> IviResult<Self> {
        let visa_err = |e: visa_rs::Error| IviError::Transport(format!("VISA error: {}", e));

        let rm = DefaultRM::new().map_err(visa_err)?;
        let c_string = CString::new(resource)
            .map_err(|_| IviError::Configuration(format!("Invalid resource '{}'", resource)))?;
        let visa_string = visa_rs::VisaString::from(c_string);
        let session = rm
            .open(&visa_string, AccessMode::NO_LOCK, TIMEOUT_IMMEDIATE)
            .map_err(visa_err)?;

        debug!("VISA resource '{}' opened", resource);

        Ok(Self {
            resource_string: resource.to_string(),
            timeout: settings.timeout(),
            line_terminator: settings.line_terminator.clone(),
            session,
        })
    }

    /// Always fails: VISA support was not compiled in.
    #[cfg(not(feature = "instrument_visa"))]
    pub fn open(resource: &str, _settings: &InstrumentSettings) -> IviResult<Self> {
        let _ = resource;
        Err(super::not_enabled("instrument_visa"))
    }

    /// Resource this adapter was opened with.
    pub fn resource_string(&self) -> &str {
        &self.resource_string
    }
}

#[cfg(feature = "instrument_visa")]
impl Transport for VisaAdapter {
    fn write(&mut self, command: &str) -> IviResult<()> {
        let command_str = format!("{}{}", command, self.line_terminator);
        (&self.session).write_all(command_str.as_bytes())?;
        debug!("VISA write sent: {}", command);
        Ok(())
    }

    fn read(&mut self) -> IviResult<String> {
        let mut reader = &self.session;
        let response = read_line(&mut reader, b'\n', self.timeout)?;
        debug!("VISA read: {}", response);
        Ok(response)
    }

    fn write_block(&mut self, data: &[u8], prefix: &str) -> IviResult<()> {
        let mut frame = ieee_block(data, prefix);
        frame.extend_from_slice(self.line_terminator.as_bytes());
        (&self.session).write_all(&frame)?;
        debug!("VISA block sent: {}<{} bytes>", prefix, data.len());
        Ok(())
    }

    fn info(&self) -> String {
        format!(
            "VisaAdapter({} @ {}ms timeout)",
            self.resource_string,
            self.timeout.as_millis()
        )
    }
}

#[cfg(not(feature = "instrument_visa"))]
impl Transport for VisaAdapter {
    fn write(&mut self, _command: &str) -> IviResult<()> {
        Err(super::not_enabled("instrument_visa"))
    }

    fn read(&mut self) -> IviResult<String> {
        Err(super::not_enabled("instrument_visa"))
    }

    fn write_block(&mut self, _data: &[u8], _prefix: &str) -> IviResult<()> {
        Err(super::not_enabled("instrument_visa"))
    }

    fn info(&self) -> String {
        format!("VisaAdapter({}, disabled)", self.resource_string)
    }
}
