//! Rohde & Schwarz HMP2020 two-output DC power supply.
//!
//! Outputs share one selection register: every output-scoped command is
//! preceded by `instrument:nselect <n>`. Levels are written with two
//! decimals.
//!
//! ## Configuration
//!
//! ```toml
//! resource = "ASRL/dev/ttyUSB0::INSTR"
//! baud_rate = 9600
//! id_query = true
//! output_settle_ms = 100
//! ```

use super::{channel_table, transport_for, verify_identity};
use crate::adapters::Transport;
use crate::config::InstrumentSettings;
use crate::error::{IviError, IviResult};
use crate::instrument::capabilities::{
    ErrorReport, Outcome, SelfTestResult, SoftwareTrigger, Utility,
};
use crate::instrument::codec::{fixed2, parse_bool, parse_f64, parse_i64, Symbol, NUMERIC_BOOL};
use crate::instrument::dcpwr::{
    DcAttribute, DcMeasurement, DcOutput, DcTrigger, MeasurementType, StateMemory, TriggerSource,
};
use crate::instrument::range::{check_current, check_ovp, check_voltage};
use crate::instrument::{
    Addressing, AttributeKey, AttributeValue, ChannelRef, Identity, RangeSpec, Session,
};
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

/// Model prefixes accepted by the id query.
pub const SUPPORTED_MODELS: &[&str] = &["HMP2020"];

/// Range table shared by both outputs.
pub const OUTPUT_SPEC: RangeSpec = RangeSpec::new(30.0, 5.0, 30.0);

const OUTPUT_COUNT: usize = 2;
const SELECT: &str = "instrument:nselect {}";
const MEMORY_SIZE: usize = 3;
/// Slot 0 is `*SAV 1` on the wire.
const MEMORY_OFFSET: usize = 1;

/// Rohde & Schwarz HMP2020 two-output DC supply.
///
/// Outputs are addressed with `instrument:nselect n` before every channel
/// command. Output switching waits for the configured settle time after the
/// select.
pub struct Hmp2020 {
    session: Session<DcAttribute>,
    output_settle: Duration,
}

impl Hmp2020 {
    /// Open the resource named in `settings`, or a simulated instrument.
    pub fn open(settings: &InstrumentSettings) -> IviResult<Self> {
        let transport = transport_for(settings)?;
        Self::with_transport(transport, settings)
    }

    /// Bring up a driver on an already open transport.
    pub fn with_transport(
        transport: Box<dyn Transport>,
        settings: &InstrumentSettings,
    ) -> IviResult<Self> {
        let channels = channel_table(
            settings,
            "output",
            OUTPUT_COUNT,
            OUTPUT_SPEC,
            Addressing::Select(SELECT),
        );
        let mut session = Session::new(transport, channels, settings.simulate);
        verify_identity(&mut session, settings, SUPPORTED_MODELS)?;

        let mut driver = Self {
            session,
            output_settle: settings.output_settle(),
        };
        if settings.reset {
            driver.reset()?;
        }
        info!(
            outputs = driver.session.channels().len(),
            simulate = settings.simulate,
            "HMP2020 initialized"
        );
        Ok(driver)
    }

    /// The underlying session.
    pub fn session(&self) -> &Session<DcAttribute> {
        &self.session
    }

    /// Output names in index order.
    pub fn output_names(&self) -> Vec<String> {
        self.session.channels().names().map(str::to_string).collect()
    }

    /// Read an attribute by name.
    pub fn get(&mut self, output: impl Into<ChannelRef>, attribute: &str) -> IviResult<AttributeValue> {
        let key: DcAttribute = attribute.parse()?;
        Ok(match key {
            DcAttribute::VoltageLevel => self.voltage_level(output)?.into(),
            DcAttribute::CurrentLimit => self.current_limit(output)?.into(),
            DcAttribute::OutputEnabled => self.output_enabled(output)?.into(),
            DcAttribute::OvpEnabled => self.ovp_enabled(output)?.into(),
            DcAttribute::OvpLimit => self.ovp_limit(output)?.into(),
            DcAttribute::TriggerSource => self.trigger_source(output)?.name().into(),
        })
    }

    /// Write an attribute by name.
    pub fn set(
        &mut self,
        output: impl Into<ChannelRef>,
        attribute: &str,
        value: impl Into<AttributeValue>,
    ) -> IviResult<()> {
        let key: DcAttribute = attribute.parse()?;
        let value = value.into();
        match key {
            DcAttribute::VoltageLevel => self.set_voltage_level(output, value.to(key.name())?),
            DcAttribute::CurrentLimit => self.set_current_limit(output, value.to(key.name())?),
            DcAttribute::OutputEnabled => self.set_output_enabled(output, value.to(key.name())?),
            DcAttribute::OvpEnabled => self.set_ovp_enabled(output, value.to(key.name())?),
            DcAttribute::OvpLimit => self
                .set_ovp_limit(output, value.to(key.name())?)?
                .required("writing ovp_limit"),
            DcAttribute::TriggerSource => {
                let source: TriggerSource = value.to(key.name())?;
                self.set_trigger_source(output, source)
            }
        }
    }
}

impl DcOutput for Hmp2020 {
    fn voltage_level(&mut self, output: impl Into<ChannelRef>) -> IviResult<f64> {
        let index = self.session.resolve(output)?;
        self.session.get(index, DcAttribute::VoltageLevel, "VOLT?", parse_f64)
    }

    fn set_voltage_level(&mut self, output: impl Into<ChannelRef>, volts: f64) -> IviResult<()> {
        let index = self.session.resolve(output)?;
        check_voltage(self.session.spec(index)?, volts)?;
        let command = format!("VOLT {}", fixed2(volts));
        self.session.set(index, DcAttribute::VoltageLevel, volts, &[command])
    }

    fn current_limit(&mut self, output: impl Into<ChannelRef>) -> IviResult<f64> {
        let index = self.session.resolve(output)?;
        self.session.get(index, DcAttribute::CurrentLimit, "CURR?", parse_f64)
    }

    fn set_current_limit(&mut self, output: impl Into<ChannelRef>, amps: f64) -> IviResult<()> {
        let index = self.session.resolve(output)?;
        check_current(self.session.spec(index)?, amps)?;
        let command = format!("CURR {}", fixed2(amps));
        self.session.set(index, DcAttribute::CurrentLimit, amps, &[command])
    }

    fn output_enabled(&mut self, output: impl Into<ChannelRef>) -> IviResult<bool> {
        let index = self.session.resolve(output)?;
        self.session.get(index, DcAttribute::OutputEnabled, "OUTP:SEL?", parse_bool)
    }

    fn set_output_enabled(&mut self, output: impl Into<ChannelRef>, enabled: bool) -> IviResult<()> {
        let index = self.session.resolve(output)?;
        let settle = self.output_settle;
        let wire = index + 1;
        self.session
            .set_with(index, DcAttribute::OutputEnabled, enabled, |transport| {
                // The supply drops commands that arrive right after a select
                thread::sleep(settle);
                transport.write(&format!("OUTP:SEL {}", wire))?;
                transport.write(&format!("OUTP {}", NUMERIC_BOOL.encode(enabled)))
            })
    }

    fn ovp_enabled(&mut self, output: impl Into<ChannelRef>) -> IviResult<bool> {
        let index = self.session.resolve(output)?;
        self.session.get(
            index,
            DcAttribute::OvpEnabled,
            "VOLTage:PROTection:TRIPped?",
            parse_bool,
        )
    }

    fn set_ovp_enabled(&mut self, output: impl Into<ChannelRef>, enabled: bool) -> IviResult<()> {
        let index = self.session.resolve(output)?;
        let mode = if enabled { "PROT" } else { "MEAS" };
        let command = format!("VOLTage:PROTection:MODE {}", mode);
        self.session.set(index, DcAttribute::OvpEnabled, enabled, &[command])
    }

    fn ovp_limit(&mut self, output: impl Into<ChannelRef>) -> IviResult<f64> {
        let index = self.session.resolve(output)?;
        self.session.get(index, DcAttribute::OvpLimit, "VOLT:PROT?", parse_f64)
    }

    fn set_ovp_limit(&mut self, output: impl Into<ChannelRef>, volts: f64) -> IviResult<Outcome<()>> {
        let index = self.session.resolve(output)?;
        check_ovp(self.session.spec(index)?, volts)?;
        warn!(output = index + 1, volts, "HMP2020 driver cannot write the OVP limit");
        Ok(Outcome::Unsupported)
    }
}

impl DcTrigger for Hmp2020 {
    fn trigger_source(&mut self, output: impl Into<ChannelRef>) -> IviResult<TriggerSource> {
        let index = self.session.resolve(output)?;
        self.session.get(
            index,
            DcAttribute::TriggerSource,
            "TRIG:SOUR?",
            TriggerSource::parse_reply,
        )
    }

    fn set_trigger_source(
        &mut self,
        output: impl Into<ChannelRef>,
        source: TriggerSource,
    ) -> IviResult<()> {
        let index = self.session.resolve(output)?;
        let command = format!("TRIG:SOUR {}", source.to_wire());
        self.session.set(index, DcAttribute::TriggerSource, source, &[command])
    }

    fn initiate(&mut self) -> IviResult<()> {
        self.session.write("INIT")
    }

    fn abort(&mut self) -> IviResult<()> {
        self.session.write("ABOR")
    }
}

impl DcMeasurement for Hmp2020 {
    fn measure(&mut self, output: impl Into<ChannelRef>, kind: MeasurementType) -> IviResult<f64> {
        let index = self.session.resolve(output)?;
        match self.session.query_channel(index, kind.query())? {
            Some(reply) => parse_f64(kind.query(), &reply),
            None => Ok(0.0),
        }
    }
}

impl StateMemory for Hmp2020 {
    fn memory_size(&self) -> usize {
        MEMORY_SIZE
    }

    fn save_state(&mut self, slot: usize) -> IviResult<()> {
        check_slot(slot)?;
        self.session.write(&format!("*SAV {}", slot + MEMORY_OFFSET))
    }

    fn recall_state(&mut self, slot: usize) -> IviResult<()> {
        check_slot(slot)?;
        self.session.write(&format!("*RCL {}", slot + MEMORY_OFFSET))?;
        self.session.invalidate_all();
        Ok(())
    }
}

fn check_slot(slot: usize) -> IviResult<()> {
    if slot < MEMORY_SIZE {
        Ok(())
    } else {
        Err(IviError::OutOfRange {
            attribute: "memory_slot",
            value: slot as f64,
            min: 0.0,
            max: (MEMORY_SIZE - 1) as f64,
        })
    }
}

impl Utility for Hmp2020 {
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

    fn self_test(&mut self) -> IviResult<Outcome<SelfTestResult>> {
        let code = match self.session.query("*TST?")? {
            Some(reply) => parse_i64("*TST?", &reply)?,
            None => 0,
        };
        Ok(Outcome::Done(SelfTestResult::from_code(code)))
    }

    fn error_query(&mut self) -> IviResult<Outcome<ErrorReport>> {
        let report = match self.session.query("SYST:ERR?")? {
            Some(reply) => ErrorReport::parse(&reply)?,
            None => ErrorReport::no_error(),
        };
        Ok(Outcome::Done(report))
    }
}

impl SoftwareTrigger for Hmp2020 {
    fn send_software_trigger(&mut self) -> IviResult<()> {
        self.session.write("*TRG")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MockTransport;
    use tracing_test::traced_test;

    fn driver(mock: &MockTransport) -> Hmp2020 {
        let settings = InstrumentSettings {
            output_settle_ms: 0,
            ..InstrumentSettings::default()
        };
        Hmp2020::with_transport(Box::new(mock.clone()), &settings).unwrap()
    }

    #[test]
    fn test_memory_slots_are_offset() {
        let mock = MockTransport::new();
        let mut psu = driver(&mock);
        psu.save_state(0).unwrap();
        psu.recall_state(2).unwrap();
        assert_eq!(mock.commands(), vec!["*SAV 1", "*RCL 3"]);
        assert!(matches!(psu.save_state(3), Err(IviError::OutOfRange { .. })));
    }

    #[test]
    fn test_measurement_is_never_cached() {
        let mock = MockTransport::new();
        mock.reply("MEAS:VOLT?", "4.998");
        let mut psu = driver(&mock);
        for _ in 0..2 {
            assert_eq!(psu.measure("output1", MeasurementType::Voltage).unwrap(), 4.998);
        }
        assert_eq!(mock.read_count(), 2);
    }

    #[test]
    fn test_ovp_limit_write_is_validated_then_unsupported() {
        let mock = MockTransport::new();
        let mut psu = driver(&mock);
        assert!(matches!(
            psu.set_ovp_limit("output1", 31.0),
            Err(IviError::OutOfRange { .. })
        ));
        assert_eq!(psu.set_ovp_limit("output1", 12.0).unwrap(), Outcome::Unsupported);
        assert!(matches!(
            psu.set("output1", "ovp_limit", 12.0),
            Err(IviError::UnsupportedValue(_))
        ));
        assert!(mock.sent().is_empty());
    }

    #[test]
    #[traced_test]
    fn test_ovp_limit_write_is_logged() {
        let mock = MockTransport::new();
        let mut psu = driver(&mock);
        let _ = psu.set_ovp_limit("output2", 10.0).unwrap();
        assert!(logs_contain("cannot write the OVP limit"));
    }

    #[test]
    fn test_trigger_source_mapping() {
        let mock = MockTransport::new();
        mock.reply("TRIG:SOUR?", "BUS");
        let mut psu = driver(&mock);
        assert_eq!(psu.trigger_source("output2").unwrap(), TriggerSource::Bus);
        psu.set_trigger_source("output2", TriggerSource::Immediate).unwrap();
        assert_eq!(
            mock.commands(),
            vec![
                "instrument:nselect 2",
                "TRIG:SOUR?",
                "instrument:nselect 2",
                "TRIG:SOUR imm"
            ]
        );
    }
}
