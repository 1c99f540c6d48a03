//! Function generator class: attribute keys, symbols and capability traits.

use super::cache::{AttributeKey, AttributeValue, CachedValue};
use super::capabilities::Outcome;
use super::channel::ChannelRef;
use super::codec::Symbol;
use crate::error::{IviError, IviResult};
use crate::waveform::{Catalog, WaveformData};
use std::str::FromStr;

/// Cached attributes of a function generator. `ArbitrarySampleRate` is
/// instrument-scoped and lives in row 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FgenAttribute {
    /// Output relay. Cascades.
    OutputEnabled,
    /// Expected load impedance.
    Impedance,
    /// Continuous or burst, driver-side only.
    OperationMode,
    /// Standard function or arbitrary playback, driver-side only.
    OutputMode,
    /// Reference oscillator. Cascades, since both channels share it.
    ReferenceClockSource,
    /// Peak-to-peak amplitude, volts.
    Amplitude,
    /// DC offset, volts.
    DcOffset,
    /// Start phase, degrees.
    StartPhase,
    /// Output frequency, hertz. Cascades.
    Frequency,
    /// Pulse duty cycle, percent.
    DutyCycleHigh,
    /// Standard waveform shape.
    Waveform,
    /// Arbitrary playback gain.
    ArbitraryGain,
    /// Arbitrary playback offset, volts.
    ArbitraryOffset,
    /// Handle of the waveform assigned to the channel.
    ArbitraryWaveform,
    /// Arbitrary playback clock, hertz.
    ArbitrarySampleRate,
    /// Cycles per burst.
    BurstCount,
}

impl AttributeKey for FgenAttribute {
    const ALL: &'static [Self] = &[
        FgenAttribute::OutputEnabled,
        FgenAttribute::Impedance,
        FgenAttribute::OperationMode,
        FgenAttribute::OutputMode,
        FgenAttribute::ReferenceClockSource,
        FgenAttribute::Amplitude,
        FgenAttribute::DcOffset,
        FgenAttribute::StartPhase,
        FgenAttribute::Frequency,
        FgenAttribute::DutyCycleHigh,
        FgenAttribute::Waveform,
        FgenAttribute::ArbitraryGain,
        FgenAttribute::ArbitraryOffset,
        FgenAttribute::ArbitraryWaveform,
        FgenAttribute::ArbitrarySampleRate,
        FgenAttribute::BurstCount,
    ];

    fn column(self) -> usize {
        self as usize
    }

    fn name(self) -> &'static str {
        match self {
            FgenAttribute::OutputEnabled => "output_enabled",
            FgenAttribute::Impedance => "impedance",
            FgenAttribute::OperationMode => "operation_mode",
            FgenAttribute::OutputMode => "output_mode",
            FgenAttribute::ReferenceClockSource => "reference_clock_source",
            FgenAttribute::Amplitude => "amplitude",
            FgenAttribute::DcOffset => "dc_offset",
            FgenAttribute::StartPhase => "start_phase",
            FgenAttribute::Frequency => "frequency",
            FgenAttribute::DutyCycleHigh => "duty_cycle_high",
            FgenAttribute::Waveform => "waveform",
            FgenAttribute::ArbitraryGain => "arbitrary_gain",
            FgenAttribute::ArbitraryOffset => "arbitrary_offset",
            FgenAttribute::ArbitraryWaveform => "arbitrary_waveform",
            FgenAttribute::ArbitrarySampleRate => "arbitrary_sample_rate",
            FgenAttribute::BurstCount => "burst_count",
        }
    }

    fn default_value(self) -> AttributeValue {
        match self {
            FgenAttribute::OutputEnabled => AttributeValue::Bool(false),
            FgenAttribute::Impedance => Impedance::Ohms(50.0).into_value(),
            FgenAttribute::OperationMode => OperationMode::Continuous.into_value(),
            FgenAttribute::OutputMode => OutputMode::Function.into_value(),
            FgenAttribute::ReferenceClockSource => ClockSource::Internal.into_value(),
            FgenAttribute::Waveform => StandardWaveform::Sine.into_value(),
            FgenAttribute::ArbitraryWaveform => AttributeValue::Text(String::new()),
            FgenAttribute::BurstCount => AttributeValue::Integer(1),
            FgenAttribute::DutyCycleHigh => AttributeValue::Float(50.0),
            _ => AttributeValue::Float(0.0),
        }
    }

    fn cascades(self) -> bool {
        matches!(
            self,
            FgenAttribute::OutputEnabled
                | FgenAttribute::Frequency
                | FgenAttribute::ReferenceClockSource
        )
    }
}

impl FromStr for FgenAttribute {
    type Err = IviError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FgenAttribute::ALL
            .iter()
            .copied()
            .find(|key| key.name() == s)
            .ok_or_else(|| IviError::UnsupportedValue(format!("unknown attribute '{}'", s)))
    }
}

/// Built-in waveform shapes. Only those in a driver's supported list can be
/// written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StandardWaveform {
    /// Sine.
    Sine,
    /// Square, duty cycle set by [`FgenAttribute::DutyCycleHigh`].
    Square,
    /// Symmetric triangle.
    Triangle,
    /// Rising sawtooth.
    RampUp,
    /// Falling sawtooth.
    RampDown,
    /// Constant level set by the offset.
    Dc,
}

impl Symbol for StandardWaveform {
    const TABLE: &'static [(Self, &'static str)] = &[
        (StandardWaveform::Sine, "sin"),
        (StandardWaveform::Square, "squ"),
        (StandardWaveform::RampUp, "ramp"),
        (StandardWaveform::Dc, "dc"),
    ];

    fn name(self) -> &'static str {
        match self {
            StandardWaveform::Sine => "sine",
            StandardWaveform::Square => "square",
            StandardWaveform::Triangle => "triangle",
            StandardWaveform::RampUp => "ramp_up",
            StandardWaveform::RampDown => "ramp_down",
            StandardWaveform::Dc => "dc",
        }
    }
}

/// Reference oscillator feeding the generator's clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockSource {
    /// On-board oscillator.
    Internal,
    /// 10 MHz reference on the rear-panel input.
    External,
}

impl ClockSource {
    /// Interpret a source query reply. Anything other than `EXT` means the
    /// instrument is running from its own oscillator.
    pub fn from_reading(reply: &str) -> Self {
        let token = reply.trim().trim_matches('"');
        if token.eq_ignore_ascii_case("EXT") {
            ClockSource::External
        } else {
            ClockSource::Internal
        }
    }
}

impl Symbol for ClockSource {
    const TABLE: &'static [(Self, &'static str)] =
        &[(ClockSource::Internal, "INT"), (ClockSource::External, "EXT")];

    fn name(self) -> &'static str {
        match self {
            ClockSource::Internal => "internal",
            ClockSource::External => "external",
        }
    }
}

/// Whether the channel runs freely or emits counted bursts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationMode {
    /// Free-running output.
    Continuous,
    /// [`BurstControl::burst_count`] cycles per trigger.
    Burst,
}

impl Symbol for OperationMode {
    const TABLE: &'static [(Self, &'static str)] = &[
        (OperationMode::Continuous, "continuous"),
        (OperationMode::Burst, "burst"),
    ];

    fn name(self) -> &'static str {
        match self {
            OperationMode::Continuous => "continuous",
            OperationMode::Burst => "burst",
        }
    }
}

/// What the channel plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// One of the [`StandardWaveform`] shapes.
    Function,
    /// An uploaded waveform.
    Arbitrary,
    /// A sequence of uploaded waveforms.
    Sequence,
}

impl Symbol for OutputMode {
    const TABLE: &'static [(Self, &'static str)] = &[
        (OutputMode::Function, "function"),
        (OutputMode::Arbitrary, "arbitrary"),
        (OutputMode::Sequence, "sequence"),
    ];

    fn name(self) -> &'static str {
        match self {
            OutputMode::Function => "function",
            OutputMode::Arbitrary => "arbitrary",
            OutputMode::Sequence => "sequence",
        }
    }
}

/// Output load impedance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Impedance {
    /// A finite load, in ohms.
    Ohms(f64),
    /// Open circuit; the instrument doubles its displayed amplitude.
    HighZ,
}

impl Impedance {
    /// Instruments report high-Z as a huge finite number.
    pub const HIGH_Z_THRESHOLD: f64 = 9.9e37;

    /// Classify a numeric impedance reading.
    pub fn from_reading(ohms: f64) -> Self {
        if ohms >= Self::HIGH_Z_THRESHOLD {
            Impedance::HighZ
        } else {
            Impedance::Ohms(ohms)
        }
    }
}

impl CachedValue for Impedance {
    fn into_value(self) -> AttributeValue {
        match self {
            Impedance::Ohms(ohms) => AttributeValue::Float(ohms),
            Impedance::HighZ => AttributeValue::Text("high_z".to_string()),
        }
    }

    fn from_value(value: &AttributeValue) -> Option<Self> {
        match value {
            AttributeValue::Float(ohms) => Some(Impedance::from_reading(*ohms)),
            AttributeValue::Integer(ohms) => Some(Impedance::from_reading(*ohms as f64)),
            AttributeValue::Text(text) if text.eq_ignore_ascii_case("high_z") => {
                Some(Impedance::HighZ)
            }
            _ => None,
        }
    }
}

/// Output switching, load and clocking.
pub trait FgenOutput {
    /// Whether the channel's output is on.
    fn output_enabled(&mut self, channel: impl Into<ChannelRef>) -> IviResult<bool>;
    /// Turn the output on or off.
    fn set_output_enabled(&mut self, channel: impl Into<ChannelRef>, enabled: bool) -> IviResult<()>;

    /// Load impedance the amplitude is calibrated for.
    fn impedance(&mut self, channel: impl Into<ChannelRef>) -> IviResult<Impedance>;
    /// Set the expected load.
    ///
    /// # Errors
    ///
    /// [`IviError::OutOfRange`] for a finite load outside what the model
    /// accepts.
    fn set_impedance(&mut self, channel: impl Into<ChannelRef>, impedance: Impedance) -> IviResult<()>;

    /// Continuous or burst.
    fn operation_mode(&mut self, channel: impl Into<ChannelRef>) -> IviResult<OperationMode>;
    /// Select continuous or burst operation.
    fn set_operation_mode(
        &mut self,
        channel: impl Into<ChannelRef>,
        mode: OperationMode,
    ) -> IviResult<()>;

    /// Function, arbitrary or sequence playback.
    fn output_mode(&mut self, channel: impl Into<ChannelRef>) -> IviResult<OutputMode>;
    /// Select what the channel plays. Modes outside the model's supported
    /// list fail with [`IviError::UnsupportedValue`].
    fn set_output_mode(&mut self, channel: impl Into<ChannelRef>, mode: OutputMode) -> IviResult<()>;

    /// Reference oscillator in use.
    fn reference_clock_source(&mut self, channel: impl Into<ChannelRef>) -> IviResult<ClockSource>;
    /// Switch the reference oscillator. The oscillator is shared, so every
    /// channel's cached value is dropped.
    fn set_reference_clock_source(
        &mut self,
        channel: impl Into<ChannelRef>,
        source: ClockSource,
    ) -> IviResult<()>;

    /// Start generation on every enabled output.
    fn initiate_generation(&mut self) -> IviResult<Outcome<()>> {
        Ok(Outcome::Unsupported)
    }

    /// Stop generation.
    fn abort_generation(&mut self) -> IviResult<Outcome<()>> {
        Ok(Outcome::Unsupported)
    }
}

/// Built-in waveform parameters.
///
/// Analog values are sent in `%e` notation and cached exactly as given.
pub trait StandardFunction {
    /// Peak-to-peak amplitude in volts.
    fn amplitude(&mut self, channel: impl Into<ChannelRef>) -> IviResult<f64>;
    /// Set the amplitude, bounded by the channel's voltage range.
    fn set_amplitude(&mut self, channel: impl Into<ChannelRef>, volts: f64) -> IviResult<()>;

    /// DC offset in volts.
    fn dc_offset(&mut self, channel: impl Into<ChannelRef>) -> IviResult<f64>;
    /// Set the DC offset, bounded by half the channel's voltage range.
    fn set_dc_offset(&mut self, channel: impl Into<ChannelRef>, volts: f64) -> IviResult<()>;

    /// Start phase in degrees.
    fn start_phase(&mut self, channel: impl Into<ChannelRef>) -> IviResult<f64>;
    /// Set the start phase, 0 to 360 degrees.
    fn set_start_phase(&mut self, channel: impl Into<ChannelRef>, degrees: f64) -> IviResult<()>;

    /// Output frequency in hertz.
    fn frequency(&mut self, channel: impl Into<ChannelRef>) -> IviResult<f64>;
    /// Set the frequency. Channels may be coupled on the instrument, so the
    /// other channels' cached frequencies are dropped.
    fn set_frequency(&mut self, channel: impl Into<ChannelRef>, hertz: f64) -> IviResult<()>;

    /// High time of a pulse or square wave, in percent of the period.
    fn duty_cycle_high(&mut self, channel: impl Into<ChannelRef>) -> IviResult<f64>;
    /// Set the duty cycle of this channel, 0 to 100 percent.
    fn set_duty_cycle_high(&mut self, channel: impl Into<ChannelRef>, percent: f64) -> IviResult<()>;

    /// Standard waveform shape.
    fn waveform(&mut self, channel: impl Into<ChannelRef>) -> IviResult<StandardWaveform>;
    /// Select a built-in shape. Shapes the model lacks fail with
    /// [`IviError::UnsupportedValue`] before anything is sent.
    fn set_waveform(
        &mut self,
        channel: impl Into<ChannelRef>,
        waveform: StandardWaveform,
    ) -> IviResult<()>;
}

/// Upload and playback of arbitrary waveforms.
///
/// ```no_run
/// use rust_ivi::config::InstrumentSettings;
/// use rust_ivi::drivers::Dg1022z;
/// use rust_ivi::instrument::fgen::ArbitraryWaveform;
/// use rust_ivi::waveform::WaveformData;
///
/// # fn main() -> rust_ivi::error::IviResult<()> {
/// let mut fgen = Dg1022z::open(&InstrumentSettings::simulated())?;
/// let ramp: Vec<f64> = (0..64).map(|i| i as f64 / 32.0 - 1.0).collect();
/// let handle = fgen.create_waveform(WaveformData::from(ramp))?;
/// fgen.set_arbitrary_waveform("channel1", &handle)?;
/// # Ok(())
/// # }
/// ```
pub trait ArbitraryWaveform {
    /// Playback gain of the assigned waveform.
    fn arbitrary_gain(&mut self, channel: impl Into<ChannelRef>) -> IviResult<f64>;
    /// Set the playback gain.
    fn set_arbitrary_gain(&mut self, channel: impl Into<ChannelRef>, gain: f64) -> IviResult<()>;

    /// Playback offset in volts.
    fn arbitrary_offset(&mut self, channel: impl Into<ChannelRef>) -> IviResult<f64>;
    /// Set the playback offset.
    fn set_arbitrary_offset(&mut self, channel: impl Into<ChannelRef>, volts: f64) -> IviResult<()>;

    /// Handle of the waveform assigned to the channel, lowercase.
    fn arbitrary_waveform(&mut self, channel: impl Into<ChannelRef>) -> IviResult<String>;
    /// Assign a stored waveform to a channel.
    ///
    /// # Errors
    ///
    /// [`IviError::UnsupportedValue`] when the handle has the wrong extension
    /// or is not in the instrument catalog.
    fn set_arbitrary_waveform(&mut self, channel: impl Into<ChannelRef>, handle: &str) -> IviResult<()>;

    /// Playback clock in samples per second. Shared by all channels.
    fn arbitrary_sample_rate(&mut self) -> IviResult<f64>;
    /// Set the playback clock.
    fn set_arbitrary_sample_rate(&mut self, hertz: f64) -> IviResult<()>;

    /// Waveforms currently stored on the instrument.
    fn catalog(&mut self) -> IviResult<Catalog>;

    /// Quantize and upload `data`, returning the handle it was stored under.
    fn create_waveform(&mut self, data: WaveformData) -> IviResult<String>;

    /// Delete a stored waveform.
    fn clear_waveform(&mut self, _handle: &str) -> IviResult<Outcome<()>> {
        Ok(Outcome::Unsupported)
    }
}

/// Create a waveform and assign it to a channel in one step.
pub trait ArbitraryChannelWaveform: ArbitraryWaveform {
    /// Upload `data` and assign the new handle to `channel`.
    fn create_channel_waveform(
        &mut self,
        channel: impl Into<ChannelRef>,
        data: WaveformData,
    ) -> IviResult<String> {
        let handle = self.create_waveform(data)?;
        self.set_arbitrary_waveform(channel, &handle)?;
        Ok(handle)
    }
}

/// Sequences of stored waveforms. Every operation defaults to
/// [`Outcome::Unsupported`].
pub trait ArbitrarySequence {
    /// Build a sequence playing each handle `loop_counts[i]` times.
    fn create_sequence(&mut self, _handles: &[String], _loop_counts: &[u32]) -> IviResult<Outcome<String>> {
        Ok(Outcome::Unsupported)
    }

    /// Delete a stored sequence.
    fn clear_sequence(&mut self, _handle: &str) -> IviResult<Outcome<()>> {
        Ok(Outcome::Unsupported)
    }

    /// Assign a sequence to a channel with its gain and offset.
    fn configure_sequence(
        &mut self,
        _channel: &ChannelRef,
        _handle: &str,
        _gain: f64,
        _offset: f64,
    ) -> IviResult<Outcome<()>> {
        Ok(Outcome::Unsupported)
    }

    /// Delete every stored waveform and sequence.
    fn clear_memory(&mut self) -> IviResult<Outcome<()>> {
        Ok(Outcome::Unsupported)
    }
}

/// Counted bursts in [`OperationMode::Burst`].
pub trait BurstControl {
    /// Cycles emitted per trigger.
    fn burst_count(&mut self, channel: impl Into<ChannelRef>) -> IviResult<i64>;
    /// Set the cycles per trigger, at least 1.
    fn set_burst_count(&mut self, channel: impl Into<ChannelRef>, count: i64) -> IviResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_columns_match_all() {
        for (column, key) in FgenAttribute::ALL.iter().enumerate() {
            assert_eq!(key.column(), column);
        }
    }

    #[test]
    fn test_clock_source_reading_defaults_to_internal() {
        assert_eq!(ClockSource::from_reading("EXT\n"), ClockSource::External);
        assert_eq!(ClockSource::from_reading("ext"), ClockSource::External);
        assert_eq!(ClockSource::from_reading("INT"), ClockSource::Internal);
        assert_eq!(ClockSource::from_reading("PLL"), ClockSource::Internal);
        assert_eq!(ClockSource::from_reading(""), ClockSource::Internal);
    }

    #[test]
    fn test_cascading_keys() {
        let cascading: Vec<_> = FgenAttribute::ALL
            .iter()
            .filter(|key| key.cascades())
            .map(|key| key.name())
            .collect();
        assert_eq!(
            cascading,
            vec!["output_enabled", "reference_clock_source", "frequency"]
        );
    }

    #[test]
    fn test_standard_waveform_tokens() {
        assert_eq!(StandardWaveform::RampUp.to_wire(), "ramp");
        assert_eq!(StandardWaveform::from_wire("SQU"), Some(StandardWaveform::Square));
        assert_eq!(StandardWaveform::from_name("triangle"), None);
    }

    #[test]
    fn test_impedance_high_z_threshold() {
        assert_eq!(Impedance::from_reading(50.0), Impedance::Ohms(50.0));
        assert_eq!(Impedance::from_reading(9.9e37), Impedance::HighZ);
        assert_eq!(
            Impedance::from_value(&Impedance::HighZ.into_value()),
            Some(Impedance::HighZ)
        );
    }
}
