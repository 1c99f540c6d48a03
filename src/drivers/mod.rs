//! Concrete instrument drivers.
//!
//! Each driver wraps a [`Session`] with its model's command set and declares
//! the capability traits it supports.

pub mod dg1022z;
pub mod hmp2020;

pub use dg1022z::Dg1022z;
pub use hmp2020::Hmp2020;

use crate::adapters::{self, MockTransport, Transport};
use crate::config::InstrumentSettings;
use crate::error::IviResult;
use crate::instrument::{AttributeKey, Addressing, Channels, RangeSpec, Session};
use tracing::info;

/// Transport for `settings`. A simulated instrument gets a detached mock
/// that no operation ever touches.
pub(crate) fn transport_for(settings: &InstrumentSettings) -> IviResult<Box<dyn Transport>> {
    settings.validate()?;
    if settings.simulate {
        Ok(Box::new(MockTransport::new()))
    } else {
        adapters::open(settings)
    }
}

/// Channel table from `settings`, falling back to the model's defaults.
pub(crate) fn channel_table(
    settings: &InstrumentSettings,
    prefix: &str,
    count: usize,
    spec: RangeSpec,
    addressing: Addressing,
) -> Channels {
    match settings.channels.as_deref() {
        Some(configs) if !configs.is_empty() => Channels::from_config(configs, addressing),
        _ => Channels::uniform(prefix, count, spec, addressing),
    }
}

/// Check the reported model against `supported` when an id query was
/// requested. Skipped while simulating.
pub(crate) fn verify_identity<K: AttributeKey>(
    session: &mut Session<K>,
    settings: &InstrumentSettings,
    supported: &[&str],
) -> IviResult<()> {
    if !settings.id_query || session.is_simulated() {
        return Ok(());
    }
    let identity = session.identity()?;
    identity.check_model(supported)?;
    info!(
        manufacturer = %identity.manufacturer,
        model = %identity.model,
        firmware = %identity.firmware_revision,
        "instrument identified"
    );
    Ok(())
}
