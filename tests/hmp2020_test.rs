use rust_ivi::adapters::MockTransport;
use rust_ivi::config::{ChannelConfig, InstrumentSettings};
use rust_ivi::drivers::Hmp2020;
use rust_ivi::error::IviError;
use rust_ivi::instrument::capabilities::{Outcome, Utility};
use rust_ivi::instrument::dcpwr::{DcAttribute, DcOutput};
use rust_ivi::instrument::{AttributeValue, Shared};
use std::thread;

fn settings() -> InstrumentSettings {
    InstrumentSettings {
        output_settle_ms: 0,
        ..InstrumentSettings::default()
    }
}

fn connect(mock: &MockTransport) -> Hmp2020 {
    Hmp2020::with_transport(Box::new(mock.clone()), &settings()).unwrap()
}

#[test]
fn test_set_then_get_voltage_on_second_output() {
    let mock = MockTransport::new();
    let mut psu = connect(&mock);

    psu.set("output2", "voltage", 10.0).unwrap();
    assert_eq!(mock.commands(), vec!["instrument:nselect 2", "VOLT 10.00"]);

    assert_eq!(psu.get("output2", "voltage").unwrap(), AttributeValue::Float(10.0));
    assert_eq!(mock.commands().len(), 2);
    assert_eq!(mock.read_count(), 0);
}

#[test]
fn test_first_read_queries_then_hits_cache() {
    let mock = MockTransport::new();
    mock.reply("CURR?", "1.250");
    let mut psu = connect(&mock);

    assert_eq!(psu.current_limit("output1").unwrap(), 1.25);
    assert_eq!(psu.current_limit("output1").unwrap(), 1.25);
    assert_eq!(mock.commands(), vec!["instrument:nselect 1", "CURR?"]);
    assert_eq!(mock.read_count(), 1);
}

#[test]
fn test_out_of_range_sends_nothing() {
    let mock = MockTransport::new();
    let mut psu = connect(&mock);

    for volts in [30.01, -0.01, f64::NAN] {
        assert!(matches!(
            psu.set_voltage_level("output1", volts),
            Err(IviError::OutOfRange { .. })
        ));
    }
    assert!(matches!(
        psu.set_current_limit("output2", 5.5),
        Err(IviError::OutOfRange { .. })
    ));
    psu.set_voltage_level("output1", 30.0).unwrap();
    psu.set_voltage_level("output1", 0.0).unwrap();

    assert_eq!(
        mock.commands(),
        vec![
            "instrument:nselect 1",
            "VOLT 30.00",
            "instrument:nselect 1",
            "VOLT 0.00"
        ]
    );
}

#[test]
fn test_negative_only_output_from_config() {
    let mock = MockTransport::new();
    let settings = InstrumentSettings {
        channels: Some(vec![
            ChannelConfig {
                name: "pos".into(),
                voltage_max: 25.0,
                current_max: 1.0,
                ovp_max: None,
            },
            ChannelConfig {
                name: "neg".into(),
                voltage_max: -25.0,
                current_max: 1.0,
                ovp_max: None,
            },
        ]),
        ..settings()
    };
    let mut psu = Hmp2020::with_transport(Box::new(mock.clone()), &settings).unwrap();

    psu.set_voltage_level("neg", -25.0).unwrap();
    psu.set_voltage_level("neg", 0.0).unwrap();
    assert!(psu.set_voltage_level("neg", 0.5).is_err());
    assert!(psu.set_voltage_level("neg", -25.5).is_err());
    assert!(psu.set_voltage_level("pos", -1.0).is_err());
    assert_eq!(mock.commands()[1], "VOLT -25.00");
}

#[test]
fn test_output_enable_invalidates_sibling() {
    let mock = MockTransport::new();
    mock.reply("OUTP:SEL?", "1");
    let mut psu = connect(&mock);

    assert!(psu.output_enabled("output1").unwrap());
    assert!(psu.output_enabled("output2").unwrap());
    assert_eq!(mock.read_count(), 2);

    mock.clear_log();
    psu.set_output_enabled("output1", false).unwrap();
    assert_eq!(
        mock.commands(),
        vec!["instrument:nselect 1", "OUTP:SEL 1", "OUTP 0"]
    );

    let cache = psu.session().cache();
    assert!(cache.is_valid(0, DcAttribute::OutputEnabled));
    assert!(!cache.is_valid(1, DcAttribute::OutputEnabled));

    // Written output served from cache, sibling re-read
    assert!(!psu.output_enabled("output1").unwrap());
    assert!(psu.output_enabled("output2").unwrap());
    assert_eq!(mock.read_count(), 1);
}

#[test]
fn test_non_cascading_write_keeps_sibling_valid() {
    let mock = MockTransport::new();
    mock.reply("VOLT?", "3.3");
    let mut psu = connect(&mock);

    psu.voltage_level("output2").unwrap();
    psu.set_voltage_level("output1", 5.0).unwrap();
    assert!(psu
        .session()
        .cache()
        .is_valid(1, DcAttribute::VoltageLevel));
}

#[test]
fn test_transport_failure_propagates() {
    let mock = MockTransport::new();
    mock.fail_on("VOLT 5.00").reply("VOLT?", "4.0");
    let mut psu = connect(&mock);

    let err = psu.set_voltage_level("output1", 5.0).unwrap_err();
    assert!(err.is_transport_failure());
    assert_eq!(psu.voltage_level("output1").unwrap(), 4.0);
}

#[test]
fn test_unknown_channel_and_attribute() {
    let mock = MockTransport::new();
    let mut psu = connect(&mock);

    assert!(matches!(
        psu.voltage_level("output3"),
        Err(IviError::UnknownChannel(_))
    ));
    assert!(matches!(
        psu.set("output1", "wattage", 1.0),
        Err(IviError::UnsupportedValue(_))
    ));
    assert!(matches!(
        psu.set("output1", "voltage", true),
        Err(IviError::UnsupportedValue(_))
    ));
    assert!(mock.sent().is_empty());
}

#[test]
fn test_id_query() {
    let mock = MockTransport::new();
    mock.reply("*IDN?", "Rohde&Schwarz,HMP4040,123456,HW50020001/SW2.51");
    let settings = InstrumentSettings {
        id_query: true,
        ..settings()
    };
    let result = Hmp2020::with_transport(Box::new(mock.clone()), &settings);
    assert!(matches!(result, Err(IviError::IdentityMismatch { .. })));

    let mock = MockTransport::new();
    mock.reply("*IDN?", "Rohde&Schwarz,HMP2020,123456,HW50020001/SW2.51");
    let mut psu = Hmp2020::with_transport(Box::new(mock.clone()), &settings).unwrap();
    assert_eq!(psu.identity().unwrap().serial_number, "123456");
    assert_eq!(mock.read_count(), 1);
}

#[test]
fn test_reset_forgets_cached_values() {
    let mock = MockTransport::new();
    mock.reply("VOLT?", "12.0");
    let mut psu = connect(&mock);

    psu.voltage_level("output1").unwrap();
    psu.reset().unwrap();
    psu.voltage_level("output1").unwrap();

    assert_eq!(mock.read_count(), 2);
    assert!(mock.commands().contains(&"*RST".to_string()));
}

#[test]
fn test_self_test_and_error_queue() {
    let mock = MockTransport::new();
    mock.reply("*TST?", "0").reply("SYST:ERR?", "-222,\"Data out of range\"");
    let mut psu = connect(&mock);

    let result = psu.self_test().unwrap().into_option().unwrap();
    assert!(result.passed());
    let report = psu.error_query().unwrap().into_option().unwrap();
    assert_eq!(report.code, -222);
    assert_eq!(psu.unlock().unwrap(), Outcome::Unsupported);
}

#[test]
fn test_simulated_session() {
    let mut psu = Hmp2020::open(&InstrumentSettings::simulated()).unwrap();

    assert_eq!(psu.voltage_level("output1").unwrap(), 0.0);
    psu.set_voltage_level("output2", 12.5).unwrap();
    assert_eq!(psu.voltage_level("output2").unwrap(), 12.5);
    psu.set_output_enabled("output2", true).unwrap();
    assert!(psu.output_enabled("output2").unwrap());

    // Validation still applies
    assert!(psu.set_voltage_level("output2", 31.0).is_err());

    assert!(psu.self_test().unwrap().into_option().unwrap().passed());
    assert_eq!(
        psu.identity().unwrap().model,
        "Not available while simulating"
    );
}

#[test]
fn test_config_file_drives_simulated_instrument() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/hmp2020.toml");
    let mut settings = InstrumentSettings::load_from(path).unwrap();
    assert_eq!(settings.resource, "ASRL/dev/ttyUSB0::INSTR");
    settings.simulate = true;

    let psu = Hmp2020::open(&settings).unwrap();
    assert_eq!(psu.output_names(), vec!["output1", "output2"]);
}

#[test]
fn test_shared_handle_keeps_select_and_write_together() {
    let mock = MockTransport::new();
    let shared = Shared::new(connect(&mock));

    let workers: Vec<_> = ["output1", "output2"]
        .into_iter()
        .enumerate()
        .map(|(index, output)| {
            let shared = shared.clone();
            thread::spawn(move || {
                for _ in 0..25 {
                    shared
                        .with(|psu| psu.set_voltage_level(output, (index + 1) as f64))
                        .unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let commands = mock.commands();
    assert_eq!(commands.len(), 100);
    for pair in commands.chunks(2) {
        match pair[0].as_str() {
            "instrument:nselect 1" => assert_eq!(pair[1], "VOLT 1.00"),
            "instrument:nselect 2" => assert_eq!(pair[1], "VOLT 2.00"),
            other => panic!("unexpected command {}", other),
        }
    }
}
