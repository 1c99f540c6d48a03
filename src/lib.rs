//! Channel-indexed attribute access for SCPI test instruments.
//!
//! Drivers translate typed get/set calls into each instrument's ASCII
//! command set. Every read goes through a per-channel attribute cache, so a
//! value that was just written or read is served without a round trip.
//! Writes that can disturb sibling channels invalidate that attribute on
//! every channel.
//!
//! ```no_run
//! use rust_ivi::config::InstrumentSettings;
//! use rust_ivi::drivers::Hmp2020;
//! use rust_ivi::instrument::dcpwr::DcOutput;
//!
//! # fn main() -> rust_ivi::error::IviResult<()> {
//! let settings = InstrumentSettings::load_from("config/hmp2020.toml")?;
//! let mut psu = Hmp2020::open(&settings)?;
//! psu.set_voltage_level("output2", 10.0)?;
//! assert_eq!(psu.voltage_level("output2")?, 10.0);
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod config;
pub mod drivers;
pub mod error;
pub mod instrument;
pub mod waveform;

pub use config::InstrumentSettings;
pub use error::{IviError, IviResult};
