use payflow_core::PipelineConfig;
use schemars::schema_for;

#[test]
fn config_schema_describes_every_top_level_setting() {
    let schema = schema_for!(PipelineConfig);
    let json = serde_json::to_value(&schema).expect("serialize generated schema");

    let properties = json
        .get("properties")
        .and_then(|value| value.as_object())
        .expect("properties object");

    for key in [
        "base_dir",
        "seed",
        "records_per_day",
        "customer_key_max",
        "signup_anchor",
        "signup_window_days",
        "retry",
        "reference",
    ] {
        assert!(properties.contains_key(key), "missing property {key}");
    }
}

#[test]
fn default_config_round_trips_through_toml() {
    let config = PipelineConfig::default();
    let encoded = toml::to_string_pretty(&config).expect("encode config");
    let decoded = PipelineConfig::from_toml(&encoded).expect("decode config");
    assert_eq!(decoded, config);
}
