//! DC power supply class: attribute keys, symbols and capability traits.

use super::cache::{AttributeKey, AttributeValue};
use super::capabilities::Outcome;
use super::channel::ChannelRef;
use super::codec::Symbol;
use crate::error::{IviError, IviResult};
use std::str::FromStr;

/// Cached per-output attributes of a DC power supply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DcAttribute {
    /// Programmed output voltage (`"voltage"`).
    VoltageLevel,
    /// Programmed current limit.
    CurrentLimit,
    /// Output relay state. Cascades to every output.
    OutputEnabled,
    /// Whether over-voltage protection trips the output.
    OvpEnabled,
    /// Over-voltage protection threshold.
    OvpLimit,
    /// What starts a triggered level change.
    TriggerSource,
}

impl AttributeKey for DcAttribute {
    const ALL: &'static [Self] = &[
        DcAttribute::VoltageLevel,
        DcAttribute::CurrentLimit,
        DcAttribute::OutputEnabled,
        DcAttribute::OvpEnabled,
        DcAttribute::OvpLimit,
        DcAttribute::TriggerSource,
    ];

    fn column(self) -> usize {
        self as usize
    }

    fn name(self) -> &'static str {
        match self {
            DcAttribute::VoltageLevel => "voltage",
            DcAttribute::CurrentLimit => "current_limit",
            DcAttribute::OutputEnabled => "output_enabled",
            DcAttribute::OvpEnabled => "ovp_enabled",
            DcAttribute::OvpLimit => "ovp_limit",
            DcAttribute::TriggerSource => "trigger_source",
        }
    }

    fn default_value(self) -> AttributeValue {
        match self {
            DcAttribute::OutputEnabled | DcAttribute::OvpEnabled => AttributeValue::Bool(false),
            DcAttribute::TriggerSource => AttributeValue::Text("immediate".to_string()),
            _ => AttributeValue::Float(0.0),
        }
    }

    // Switching one output on or off can change the state the supply reports
    // for the other outputs
    fn cascades(self) -> bool {
        matches!(self, DcAttribute::OutputEnabled)
    }
}

impl FromStr for DcAttribute {
    type Err = IviError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DcAttribute::ALL
            .iter()
            .copied()
            .find(|key| key.name() == s)
            .ok_or_else(|| IviError::UnsupportedValue(format!("unknown attribute '{}'", s)))
    }
}

/// Event that applies pending trigger settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
    /// Apply as soon as the trigger system is initiated.
    Immediate,
    /// Wait for `*TRG` or a GET on the bus.
    Bus,
}

impl Symbol for TriggerSource {
    const TABLE: &'static [(Self, &'static str)] =
        &[(TriggerSource::Immediate, "imm"), (TriggerSource::Bus, "bus")];

    fn name(self) -> &'static str {
        match self {
            TriggerSource::Immediate => "immediate",
            TriggerSource::Bus => "bus",
        }
    }
}

/// Quantity read back by [`DcMeasurement::measure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasurementType {
    /// Voltage at the output terminals.
    Voltage,
    /// Current delivered to the load.
    Current,
}

impl MeasurementType {
    /// Query that reads this quantity on the selected output.
    pub fn query(self) -> &'static str {
        match self {
            MeasurementType::Voltage => "MEAS:VOLT?",
            MeasurementType::Current => "MEAS:CURR?",
        }
    }
}

/// Level, limit and protection settings of each output.
///
/// Outputs are named or indexed through [`ChannelRef`]. Every setter checks
/// its value against the output's range before anything is sent, and a
/// successful write is served back from the cache without a query.
pub trait DcOutput {
    /// Programmed voltage in volts.
    fn voltage_level(&mut self, output: impl Into<ChannelRef>) -> IviResult<f64>;
    /// Program the output voltage.
    ///
    /// # Errors
    ///
    /// [`IviError::OutOfRange`] when `volts` falls outside the output's
    /// voltage range, before any command is sent.
    fn set_voltage_level(&mut self, output: impl Into<ChannelRef>, volts: f64) -> IviResult<()>;

    /// Current limit in amps.
    fn current_limit(&mut self, output: impl Into<ChannelRef>) -> IviResult<f64>;
    /// Program the current limit, range-checked like the voltage.
    fn set_current_limit(&mut self, output: impl Into<ChannelRef>, amps: f64) -> IviResult<()>;

    /// Whether the output relay is closed.
    fn output_enabled(&mut self, output: impl Into<ChannelRef>) -> IviResult<bool>;
    /// Switch the output. Other outputs' cached states are dropped since the
    /// supply may change them as a side effect.
    fn set_output_enabled(&mut self, output: impl Into<ChannelRef>, enabled: bool) -> IviResult<()>;

    /// Whether over-voltage protection is armed.
    fn ovp_enabled(&mut self, output: impl Into<ChannelRef>) -> IviResult<bool>;
    /// Arm or disarm over-voltage protection.
    fn set_ovp_enabled(&mut self, output: impl Into<ChannelRef>, enabled: bool) -> IviResult<()>;

    /// Over-voltage protection threshold in volts.
    fn ovp_limit(&mut self, output: impl Into<ChannelRef>) -> IviResult<f64>;
    /// Program the protection threshold. Models that can only read it
    /// validate the value and return [`Outcome::Unsupported`].
    fn set_ovp_limit(&mut self, output: impl Into<ChannelRef>, volts: f64) -> IviResult<Outcome<()>>;
}

/// Trigger subsystem of a DC supply.
pub trait DcTrigger {
    /// Source the output waits on.
    fn trigger_source(&mut self, output: impl Into<ChannelRef>) -> IviResult<TriggerSource>;
    /// Select the trigger source for an output.
    fn set_trigger_source(
        &mut self,
        output: impl Into<ChannelRef>,
        source: TriggerSource,
    ) -> IviResult<()>;

    /// Arm the trigger system (`INIT`).
    fn initiate(&mut self) -> IviResult<()>;
    /// Disarm without applying pending settings (`ABOR`).
    fn abort(&mut self) -> IviResult<()>;
}

/// Uncached readback of the actual output.
pub trait DcMeasurement {
    /// Measure `kind` on `output`. Always goes to the instrument; a
    /// simulated instrument reports 0.0.
    fn measure(&mut self, output: impl Into<ChannelRef>, kind: MeasurementType) -> IviResult<f64>;
}

/// Numbered setup memories (`*SAV` / `*RCL`).
///
/// Slots are 0-based here whatever numbering the instrument uses.
pub trait StateMemory {
    /// Number of slots.
    fn memory_size(&self) -> usize;
    /// Store the present setup in `slot`.
    fn save_state(&mut self, slot: usize) -> IviResult<()>;
    /// Restore `slot`. Every cached value is dropped afterwards.
    fn recall_state(&mut self, slot: usize) -> IviResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_columns_match_all() {
        for (column, key) in DcAttribute::ALL.iter().enumerate() {
            assert_eq!(key.column(), column);
        }
    }

    #[test]
    fn test_attribute_names_parse() {
        assert_eq!("voltage".parse::<DcAttribute>().unwrap(), DcAttribute::VoltageLevel);
        assert_eq!(
            "output_enabled".parse::<DcAttribute>().unwrap(),
            DcAttribute::OutputEnabled
        );
        assert!("wattage".parse::<DcAttribute>().is_err());
    }

    #[test]
    fn test_trigger_source_tokens() {
        assert_eq!(TriggerSource::Immediate.to_wire(), "imm");
        assert_eq!(TriggerSource::from_wire("BUS"), Some(TriggerSource::Bus));
    }
}
