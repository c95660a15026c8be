//! Host configuration serialization tests.

use sidchip::{ChipModel, CombinedWaveforms, SamplingMethod, SidConfig};

#[test]
fn test_config_json_roundtrip() {
    let config = SidConfig {
        chip_model: ChipModel::Mos6581,
        combined_waveforms: CombinedWaveforms::Weak,
        sampling_method: SamplingMethod::Resample,
        clock_frequency: 1_022_730.0,
        sampling_frequency: 48_000.0,
    };

    let json = serde_json::to_string(&config).unwrap();
    let back: SidConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(back, config);
}

#[test]
fn test_config_field_names_are_stable() {
    let json = serde_json::to_string(&SidConfig::default()).unwrap();
    for field in [
        "chip_model",
        "combined_waveforms",
        "sampling_method",
        "clock_frequency",
        "sampling_frequency",
    ] {
        assert!(json.contains(field), "missing field {field} in {json}");
    }
}

#[test]
fn test_enums_parse_from_host_strings() {
    assert_eq!("6581".parse::<ChipModel>().unwrap(), ChipModel::Mos6581);
    assert_eq!(
        "strong".parse::<CombinedWaveforms>().unwrap(),
        CombinedWaveforms::Strong
    );
    assert_eq!(
        "resample".parse::<SamplingMethod>().unwrap(),
        SamplingMethod::Resample
    );
    assert!("invalid".parse::<ChipModel>().is_err());
}

#[test]
fn test_partial_json_is_rejected() {
    // The config has no serde defaults; a truncated document must fail
    // loudly instead of silently filling in values.
    let json = r#"{"chip_model":"Mos8580"}"#;
    assert!(serde_json::from_str::<SidConfig>(json).is_err());
}
