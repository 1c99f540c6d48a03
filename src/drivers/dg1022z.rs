//! Rigol DG1000Z series (DG1022Z / DG1042Z / DG1062Z) two-channel arbitrary
//! function generator.
//!
//! Channels are addressed inline (`SOUR2:FREQuency ...`), so no select
//! command is ever sent. Analog quantities are written in `%e` notation.
//!
//! Arbitrary waveforms are uploaded as 12-bit samples under a `wNNNN.wfm`
//! handle that is absent from the instrument catalog at upload time; see
//! [`crate::waveform`].

use super::{channel_table, transport_for, verify_identity};
use crate::adapters::Transport;
use crate::config::InstrumentSettings;
use crate::error::{IviError, IviResult};
use crate::instrument::capabilities::{Outcome, SelfTestResult, SoftwareTrigger, Utility};
use crate::instrument::codec::{
    ensure_supported, parse_bool, parse_f64, parse_i64, scientific, strip_header, Symbol,
    WORD_BOOL,
};
use crate::instrument::fgen::{
    ArbitraryChannelWaveform, ArbitrarySequence, ArbitraryWaveform, BurstControl, ClockSource,
    FgenAttribute, FgenOutput, Impedance, OperationMode, OutputMode, StandardFunction,
    StandardWaveform,
};
use crate::instrument::range::{check_between, check_voltage};
use crate::instrument::{
    Addressing, AttributeKey, AttributeValue, CachedValue, ChannelRef, Identity, RangeSpec,
    Session,
};
use crate::waveform::{
    header_commands, Catalog, HandleAllocator, PreparedWaveform, WaveformData, WaveformLimits,
    CURVE_PREFIX,
};
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

/// The DG1000Z family shares one command set.
pub const SUPPORTED_MODELS: &[&str] = &["DG1022Z", "DG1042Z", "DG1062Z"];

/// Waveform memory constraints.
pub const LIMITS: WaveformLimits = WaveformLimits {
    quantum: 8,
    size_min: 64,
    size_max: 256 * 1024,
    number_waveforms_max: 0,
};

/// Peak-to-peak amplitude ceiling (into high-Z).
pub const CHANNEL_SPEC: RangeSpec = RangeSpec::new(20.0, 0.0, 0.0);

/// Built-in shapes [`StandardFunction::set_waveform`] accepts.
pub const SUPPORTED_WAVEFORMS: &[StandardWaveform] = &[
    StandardWaveform::Sine,
    StandardWaveform::Square,
    StandardWaveform::RampUp,
    StandardWaveform::Dc,
];

/// Sequence playback is not offered.
pub const SUPPORTED_OUTPUT_MODES: &[OutputMode] = &[OutputMode::Function, OutputMode::Arbitrary];

const SUPPORTED_OPERATION_MODES: &[OperationMode] =
    &[OperationMode::Continuous, OperationMode::Burst];

const CHANNEL_COUNT: usize = 2;
const CATALOG_QUERY: &str = ":MEMory:STATe:CATalog?";
const MAX_BURST_CYCLES: f64 = 500_000.0;
const IMPEDANCE_MAX: f64 = 10_000.0;

/// Rigol DG1022Z two-channel function and arbitrary waveform generator.
///
/// Commands carry the channel number inline, so no select is sent.
pub struct Dg1022z {
    session: Session<FgenAttribute>,
    allocator: HandleAllocator,
    /// Handles uploaded while simulating; stands in for the catalog.
    simulated_store: Vec<String>,
    self_test_wait: Duration,
}

impl Dg1022z {
    /// Open the resource named in `settings`, or a simulated instrument.
    pub fn open(settings: &InstrumentSettings) -> IviResult<Self> {
        let transport = transport_for(settings)?;
        Self::with_transport(transport, settings)
    }

    /// Bring up a driver on an already open transport: interface clear,
    /// optional model check, optional reset.
    pub fn with_transport(
        transport: Box<dyn Transport>,
        settings: &InstrumentSettings,
    ) -> IviResult<Self> {
        let channels = channel_table(
            settings,
            "channel",
            CHANNEL_COUNT,
            CHANNEL_SPEC,
            Addressing::Inline,
        );
        let mut session = Session::new(transport, channels, settings.simulate);
        session.clear()?;
        verify_identity(&mut session, settings, SUPPORTED_MODELS)?;

        let mut driver = Self {
            session,
            allocator: HandleAllocator::new(),
            simulated_store: Vec::new(),
            self_test_wait: settings.self_test_wait(),
        };
        if settings.reset {
            driver.reset()?;
        }
        info!(
            channels = driver.session.channels().len(),
            simulate = settings.simulate,
            "DG1022Z initialized"
        );
        Ok(driver)
    }

    /// The underlying session.
    pub fn session(&self) -> &Session<FgenAttribute> {
        &self.session
    }

    /// Channel names in index order.
    pub fn channel_names(&self) -> Vec<String> {
        self.session.channels().names().map(str::to_string).collect()
    }

    /// Waveform memory constraints of this model.
    pub fn limits(&self) -> WaveformLimits {
        LIMITS
    }

    fn resolve(&self, channel: impl Into<ChannelRef>) -> IviResult<(usize, usize)> {
        let index = self.session.resolve(channel)?;
        Ok((index, index + 1))
    }

    /// Read an attribute by name (see [`FgenAttribute`] for the names).
    ///
    /// The channel is resolved first for every attribute, including the
    /// instrument-scoped sample rate, so a bad channel never reaches the
    /// instrument.
    pub fn get(&mut self, channel: impl Into<ChannelRef>, attribute: &str) -> IviResult<AttributeValue> {
        let key: FgenAttribute = attribute.parse()?;
        let channel = self.session.resolve(channel)?;
        Ok(match key {
            FgenAttribute::OutputEnabled => self.output_enabled(channel)?.into(),
            FgenAttribute::Impedance => self.impedance(channel)?.into_value(),
            FgenAttribute::OperationMode => self.operation_mode(channel)?.name().into(),
            FgenAttribute::OutputMode => self.output_mode(channel)?.name().into(),
            FgenAttribute::ReferenceClockSource => self.reference_clock_source(channel)?.name().into(),
            FgenAttribute::Amplitude => self.amplitude(channel)?.into(),
            FgenAttribute::DcOffset => self.dc_offset(channel)?.into(),
            FgenAttribute::StartPhase => self.start_phase(channel)?.into(),
            FgenAttribute::Frequency => self.frequency(channel)?.into(),
            FgenAttribute::DutyCycleHigh => self.duty_cycle_high(channel)?.into(),
            FgenAttribute::Waveform => self.waveform(channel)?.name().into(),
            FgenAttribute::ArbitraryGain => self.arbitrary_gain(channel)?.into(),
            FgenAttribute::ArbitraryOffset => self.arbitrary_offset(channel)?.into(),
            FgenAttribute::ArbitraryWaveform => self.arbitrary_waveform(channel)?.into(),
            FgenAttribute::ArbitrarySampleRate => self.arbitrary_sample_rate()?.into(),
            FgenAttribute::BurstCount => self.burst_count(channel)?.into(),
        })
    }

    /// Write an attribute by name. Symbolic attributes take their lowercase
    /// names (`"square"`, `"external"`), impedance takes ohms or `"high_z"`.
    pub fn set(
        &mut self,
        channel: impl Into<ChannelRef>,
        attribute: &str,
        value: impl Into<AttributeValue>,
    ) -> IviResult<()> {
        let key: FgenAttribute = attribute.parse()?;
        let channel = self.session.resolve(channel)?;
        let value = value.into();
        let name = key.name();
        match key {
            FgenAttribute::OutputEnabled => self.set_output_enabled(channel, value.to(name)?),
            FgenAttribute::Impedance => self.set_impedance(channel, value.to(name)?),
            FgenAttribute::OperationMode => self.set_operation_mode(channel, value.to(name)?),
            FgenAttribute::OutputMode => self.set_output_mode(channel, value.to(name)?),
            FgenAttribute::ReferenceClockSource => {
                self.set_reference_clock_source(channel, value.to(name)?)
            }
            FgenAttribute::Amplitude => self.set_amplitude(channel, value.to(name)?),
            FgenAttribute::DcOffset => self.set_dc_offset(channel, value.to(name)?),
            FgenAttribute::StartPhase => self.set_start_phase(channel, value.to(name)?),
            FgenAttribute::Frequency => self.set_frequency(channel, value.to(name)?),
            FgenAttribute::DutyCycleHigh => self.set_duty_cycle_high(channel, value.to(name)?),
            FgenAttribute::Waveform => self.set_waveform(channel, value.to(name)?),
            FgenAttribute::ArbitraryGain => self.set_arbitrary_gain(channel, value.to(name)?),
            FgenAttribute::ArbitraryOffset => self.set_arbitrary_offset(channel, value.to(name)?),
            FgenAttribute::ArbitraryWaveform => {
                let handle: String = value.to(name)?;
                self.set_arbitrary_waveform(channel, &handle)
            }
            FgenAttribute::ArbitrarySampleRate => self.set_arbitrary_sample_rate(value.to(name)?),
            FgenAttribute::BurstCount => self.set_burst_count(channel, value.to(name)?),
        }
    }
}

/// Parse `"<header> <value>"` replies of the `:ch<n>:` command group.
fn parse_headed_f64(command: &str, reply: &str) -> IviResult<f64> {
    parse_f64(command, strip_header(command, reply)?)
}

impl FgenOutput for Dg1022z {
    fn output_enabled(&mut self, channel: impl Into<ChannelRef>) -> IviResult<bool> {
        let (index, wire) = self.resolve(channel)?;
        let query = format!(":OUTP{}:state?", wire);
        self.session.get(index, FgenAttribute::OutputEnabled, &query, parse_bool)
    }

    fn set_output_enabled(&mut self, channel: impl Into<ChannelRef>, enabled: bool) -> IviResult<()> {
        let (index, wire) = self.resolve(channel)?;
        let command = format!(":OUTP{}:state {}", wire, WORD_BOOL.encode(enabled));
        self.session.set(index, FgenAttribute::OutputEnabled, enabled, &[command])
    }

    fn impedance(&mut self, channel: impl Into<ChannelRef>) -> IviResult<Impedance> {
        let (index, wire) = self.resolve(channel)?;
        let query = format!(":OUTP{}:IMPedance?", wire);
        self.session.get(index, FgenAttribute::Impedance, &query, |command, reply| {
            parse_f64(command, reply).map(Impedance::from_reading)
        })
    }

    fn set_impedance(&mut self, channel: impl Into<ChannelRef>, impedance: Impedance) -> IviResult<()> {
        let (index, wire) = self.resolve(channel)?;
        let argument = match impedance {
            Impedance::HighZ => "INF".to_string(),
            Impedance::Ohms(ohms) => {
                check_between("impedance", ohms, 1.0, IMPEDANCE_MAX)?;
                format!("{}", ohms.round() as i64)
            }
        };
        let command = format!(":OUTP{}:IMPedance {}", wire, argument);
        self.session.set(index, FgenAttribute::Impedance, impedance, &[command])
    }

    fn operation_mode(&mut self, channel: impl Into<ChannelRef>) -> IviResult<OperationMode> {
        let (index, _) = self.resolve(channel)?;
        self.session.stored(index, FgenAttribute::OperationMode)
    }

    fn set_operation_mode(
        &mut self,
        channel: impl Into<ChannelRef>,
        mode: OperationMode,
    ) -> IviResult<()> {
        let (index, _) = self.resolve(channel)?;
        ensure_supported(mode, SUPPORTED_OPERATION_MODES)?;
        self.session.record(index, FgenAttribute::OperationMode, mode);
        Ok(())
    }

    fn output_mode(&mut self, channel: impl Into<ChannelRef>) -> IviResult<OutputMode> {
        let (index, _) = self.resolve(channel)?;
        self.session.stored(index, FgenAttribute::OutputMode)
    }

    fn set_output_mode(&mut self, channel: impl Into<ChannelRef>, mode: OutputMode) -> IviResult<()> {
        let (index, _) = self.resolve(channel)?;
        ensure_supported(mode, SUPPORTED_OUTPUT_MODES)?;
        self.session.record(index, FgenAttribute::OutputMode, mode);
        Ok(())
    }

    fn reference_clock_source(&mut self, channel: impl Into<ChannelRef>) -> IviResult<ClockSource> {
        let (index, _) = self.resolve(channel)?;
        self.session.get(
            index,
            FgenAttribute::ReferenceClockSource,
            ":SYSTem:ROSCillator:SOURce?",
            |_, reply| Ok(ClockSource::from_reading(reply)),
        )
    }

    fn set_reference_clock_source(
        &mut self,
        channel: impl Into<ChannelRef>,
        source: ClockSource,
    ) -> IviResult<()> {
        let (index, _) = self.resolve(channel)?;
        let command = format!(":SYSTem:ROSCillator:SOURce {}", source.to_wire());
        self.session
            .set(index, FgenAttribute::ReferenceClockSource, source, &[command])
    }
}

impl StandardFunction for Dg1022z {
    fn amplitude(&mut self, channel: impl Into<ChannelRef>) -> IviResult<f64> {
        let (index, wire) = self.resolve(channel)?;
        let query = format!("SOUR{}:VOLT?", wire);
        self.session.get(index, FgenAttribute::Amplitude, &query, parse_f64)
    }

    fn set_amplitude(&mut self, channel: impl Into<ChannelRef>, volts: f64) -> IviResult<()> {
        let (index, wire) = self.resolve(channel)?;
        check_voltage(self.session.spec(index)?, volts)?;
        let command = format!("SOUR{}:VOLT {}", wire, scientific(volts));
        self.session.set(index, FgenAttribute::Amplitude, volts, &[command])
    }

    fn dc_offset(&mut self, channel: impl Into<ChannelRef>) -> IviResult<f64> {
        let (index, wire) = self.resolve(channel)?;
        let query = format!(":SOUR{}:VOLT:OFFS?", wire);
        self.session.get(index, FgenAttribute::DcOffset, &query, parse_f64)
    }

    fn set_dc_offset(&mut self, channel: impl Into<ChannelRef>, volts: f64) -> IviResult<()> {
        let (index, wire) = self.resolve(channel)?;
        let limit = self.session.spec(index)?.voltage_max.abs() / 2.0;
        check_between("dc_offset", volts, -limit, limit)?;
        let command = format!(":SOUR{}:VOLT:OFFS {}", wire, scientific(volts));
        self.session.set(index, FgenAttribute::DcOffset, volts, &[command])
    }

    fn start_phase(&mut self, channel: impl Into<ChannelRef>) -> IviResult<f64> {
        let (index, wire) = self.resolve(channel)?;
        let query = format!(":SOUR{}:PHAS?", wire);
        self.session.get(index, FgenAttribute::StartPhase, &query, parse_f64)
    }

    fn set_start_phase(&mut self, channel: impl Into<ChannelRef>, degrees: f64) -> IviResult<()> {
        let (index, wire) = self.resolve(channel)?;
        check_between("start_phase", degrees, 0.0, 360.0)?;
        let command = format!(":SOUR{}:PHAS {}", wire, scientific(degrees));
        self.session.set(index, FgenAttribute::StartPhase, degrees, &[command])
    }

    fn frequency(&mut self, channel: impl Into<ChannelRef>) -> IviResult<f64> {
        let (index, wire) = self.resolve(channel)?;
        let query = format!("SOUR{}:FREQuency?", wire);
        self.session.get(index, FgenAttribute::Frequency, &query, parse_f64)
    }

    fn set_frequency(&mut self, channel: impl Into<ChannelRef>, hertz: f64) -> IviResult<()> {
        let (index, wire) = self.resolve(channel)?;
        check_between("frequency", hertz, 0.0, f64::MAX)?;
        let command = format!("SOUR{}:FREQuency {}", wire, scientific(hertz));
        self.session.set(index, FgenAttribute::Frequency, hertz, &[command])
    }

    fn duty_cycle_high(&mut self, channel: impl Into<ChannelRef>) -> IviResult<f64> {
        let (index, wire) = self.resolve(channel)?;
        let query = format!(":SOUR{}:FUNC:PULS:DCYC?", wire);
        self.session.get(index, FgenAttribute::DutyCycleHigh, &query, parse_f64)
    }

    fn set_duty_cycle_high(&mut self, channel: impl Into<ChannelRef>, percent: f64) -> IviResult<()> {
        let (index, wire) = self.resolve(channel)?;
        check_between("duty_cycle_high", percent, 0.0, 100.0)?;
        let command = format!(":SOUR{}:FUNC:PULS:DCYC {}", wire, scientific(percent));
        self.session.set(index, FgenAttribute::DutyCycleHigh, percent, &[command])
    }

    fn waveform(&mut self, channel: impl Into<ChannelRef>) -> IviResult<StandardWaveform> {
        let (index, wire) = self.resolve(channel)?;
        let query = format!(":SOUR{}:FUNC?", wire);
        self.session.get(index, FgenAttribute::Waveform, &query, StandardWaveform::parse_reply)
    }

    fn set_waveform(
        &mut self,
        channel: impl Into<ChannelRef>,
        waveform: StandardWaveform,
    ) -> IviResult<()> {
        let (index, wire) = self.resolve(channel)?;
        ensure_supported(waveform, SUPPORTED_WAVEFORMS)?;
        let command = format!(":SOUR{}:FUNC {}", wire, waveform.to_wire());
        self.session.set(index, FgenAttribute::Waveform, waveform, &[command])
    }
}

impl ArbitraryWaveform for Dg1022z {
    fn arbitrary_gain(&mut self, channel: impl Into<ChannelRef>) -> IviResult<f64> {
        let (index, wire) = self.resolve(channel)?;
        let query = format!(":ch{}:amplitude?", wire);
        self.session.get(index, FgenAttribute::ArbitraryGain, &query, parse_headed_f64)
    }

    fn set_arbitrary_gain(&mut self, channel: impl Into<ChannelRef>, gain: f64) -> IviResult<()> {
        let (index, wire) = self.resolve(channel)?;
        let command = format!(":ch{}:amplitude {}", wire, scientific(gain));
        self.session.set(index, FgenAttribute::ArbitraryGain, gain, &[command])
    }

    fn arbitrary_offset(&mut self, channel: impl Into<ChannelRef>) -> IviResult<f64> {
        let (index, wire) = self.resolve(channel)?;
        let query = format!(":ch{}:offset?", wire);
        self.session.get(index, FgenAttribute::ArbitraryOffset, &query, parse_headed_f64)
    }

    fn set_arbitrary_offset(&mut self, channel: impl Into<ChannelRef>, volts: f64) -> IviResult<()> {
        let (index, wire) = self.resolve(channel)?;
        let command = format!(":ch{}:offset {}", wire, scientific(volts));
        self.session.set(index, FgenAttribute::ArbitraryOffset, volts, &[command])
    }

    fn arbitrary_waveform(&mut self, channel: impl Into<ChannelRef>) -> IviResult<String> {
        let (index, wire) = self.resolve(channel)?;
        let query = format!(":ch{}:waveform?", wire);
        self.session.get(index, FgenAttribute::ArbitraryWaveform, &query, |command, reply| {
            let value = strip_header(command, reply)?;
            Ok(value.trim_matches('"').to_lowercase())
        })
    }

    fn set_arbitrary_waveform(&mut self, channel: impl Into<ChannelRef>, handle: &str) -> IviResult<()> {
        let (index, wire) = self.resolve(channel)?;
        let handle = handle.to_lowercase();
        if handle.rsplit_once('.').map(|(_, ext)| ext) != Some("wfm") {
            return Err(IviError::UnsupportedValue(format!(
                "'{}' is not a .wfm waveform",
                handle
            )));
        }
        if !self.catalog()?.contains(&handle) {
            return Err(IviError::UnsupportedValue(format!(
                "waveform '{}' is not stored on the instrument",
                handle
            )));
        }
        let command = format!(":ch{}:waveform \"{}\"", wire, handle);
        self.session
            .set(index, FgenAttribute::ArbitraryWaveform, handle, &[command])
    }

    fn arbitrary_sample_rate(&mut self) -> IviResult<f64> {
        self.session.get_global(
            FgenAttribute::ArbitrarySampleRate,
            ":clock:frequency?",
            parse_headed_f64,
        )
    }

    fn set_arbitrary_sample_rate(&mut self, hertz: f64) -> IviResult<()> {
        check_between("arbitrary_sample_rate", hertz, 0.0, f64::MAX)?;
        let command = format!(":clock:frequency {}", scientific(hertz));
        self.session
            .set_global(FgenAttribute::ArbitrarySampleRate, hertz, &command)
    }

    fn catalog(&mut self) -> IviResult<Catalog> {
        match self.session.query(CATALOG_QUERY)? {
            Some(reply) => Ok(Catalog::parse(&reply)),
            None => Ok(Catalog::from_names(self.simulated_store.iter().cloned())),
        }
    }

    fn create_waveform(&mut self, data: WaveformData) -> IviResult<String> {
        let prepared = PreparedWaveform::new(data, &LIMITS)?;
        let catalog = self.catalog()?;
        let handle = self.allocator.allocate(&catalog);

        for command in header_commands(&handle, prepared.x_increment) {
            self.session.write(&command)?;
        }
        self.session.write_block(&prepared.pack(), CURVE_PREFIX)?;

        if self.session.is_simulated() {
            self.simulated_store.push(handle.clone());
        }
        debug!(
            handle = %handle,
            samples = prepared.samples.len(),
            x_increment = prepared.x_increment,
            "waveform uploaded"
        );
        Ok(handle)
    }
}

impl ArbitraryChannelWaveform for Dg1022z {}

impl ArbitrarySequence for Dg1022z {}

impl BurstControl for Dg1022z {
    fn burst_count(&mut self, channel: impl Into<ChannelRef>) -> IviResult<i64> {
        let (index, wire) = self.resolve(channel)?;
        let query = format!(":SOUR{}:BURS:NCYC?", wire);
        self.session.get(index, FgenAttribute::BurstCount, &query, parse_i64)
    }

    fn set_burst_count(&mut self, channel: impl Into<ChannelRef>, count: i64) -> IviResult<()> {
        let (index, wire) = self.resolve(channel)?;
        check_between("burst_count", count as f64, 1.0, MAX_BURST_CYCLES)?;
        let command = format!(":SOUR{}:BURS:NCYC {}", wire, count);
        self.session.set(index, FgenAttribute::BurstCount, count, &[command])
    }
}

impl Utility for Dg1022z {
    fn identity(&mut self) -> IviResult<Identity> {
        self.session.identity().cloned()
    }

    fn supported_models(&self) -> &'static [&'static str] {
        SUPPORTED_MODELS
    }

    fn reset(&mut self) -> IviResult<()> {
        self.session.write("*RST")?;
        self.session.invalidate_all();
        Ok(())
    }

    /// Blocks for the configured self-test wait before reading the result.
    fn self_test(&mut self) -> IviResult<Outcome<SelfTestResult>> {
        if self.session.is_simulated() {
            return Ok(Outcome::Done(SelfTestResult::from_code(0)));
        }
        self.session.write("*TST?")?;
        thread::sleep(self.self_test_wait);
        let code = match self.session.read()? {
            Some(reply) => parse_i64("*TST?", &reply)?,
            None => 0,
        };
        Ok(Outcome::Done(SelfTestResult::from_code(code)))
    }
}

impl SoftwareTrigger for Dg1022z {
    fn send_software_trigger(&mut self) -> IviResult<()> {
        self.session.write("*TRG")
    }
}
