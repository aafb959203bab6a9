use std::{collections::HashMap, fs, time::Duration};

use super::{apply_overrides, load_settings_from, ClientSettings};

#[test]
fn missing_file_yields_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let settings = load_settings_from(dir.path().join("absent.toml")).expect("load");
    assert_eq!(settings.max_forward_nodes, 200);
    assert_eq!(settings.long_message_brief_chars, 27);
}

#[test]
fn file_values_override_defaults_and_keep_the_rest() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("client.toml");
    fs::write(&path, "receipt_timeout_ms = 250\nfragment_bytes = 64\n").expect("write");

    let settings = load_settings_from(&path).expect("load");
    assert_eq!(settings.receipt_timeout_ms, 250);
    assert_eq!(settings.fragment_bytes, 64);
    assert_eq!(settings.max_text_chars, ClientSettings::default().max_text_chars);
}

#[test]
fn malformed_file_is_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("client.toml");
    fs::write(&path, "receipt_timeout_ms = \"soon\"").expect("write");

    let err = load_settings_from(&path).expect_err("malformed settings must fail");
    assert!(err.to_string().contains("failed to parse settings file"));
}

#[test]
fn env_overrides_ignore_unparsable_values() {
    let env: HashMap<&str, &str> = HashMap::from([
        ("APP__RECEIPT_TIMEOUT_MS", "10"),
        ("APP__MAX_TEXT_CHARS", "not-a-number"),
        ("APP__FRAGMENT_BYTES", " 32 "),
    ]);
    let mut settings = ClientSettings::default();
    apply_overrides(&mut settings, |key| env.get(key).map(|v| v.to_string()));

    assert_eq!(settings.receipt_timeout_ms, 10);
    assert_eq!(settings.max_text_chars, 5_000);
    assert_eq!(settings.fragment_bytes, 32);
}

#[test]
fn receipt_timeout_scales_with_expected_ids() {
    let settings = ClientSettings::default();
    assert_eq!(settings.receipt_timeout(3), Duration::from_millis(9_000));
    assert_eq!(settings.receipt_timeout(0), Duration::from_millis(3_000));
}

#[test]
fn timeouts_and_channel_capacity_can_be_overridden() {
    let env: HashMap<&str, &str> = HashMap::from([
        ("APP__RESPONSE_TIMEOUT_MS", "1500"),
        ("APP__UPLOAD_TIMEOUT_MS", "90000"),
        ("APP__EVENT_CHANNEL_CAPACITY", "16"),
    ]);
    let mut settings = ClientSettings::default();
    apply_overrides(&mut settings, |key| env.get(key).map(|v| v.to_string()));

    assert_eq!(settings.response_timeout(), Duration::from_millis(1_500));
    assert_eq!(settings.upload_timeout(), Duration::from_secs(90));
    assert_eq!(settings.event_channel_capacity, 16);
}

#[test]
fn response_timeout_follows_the_receipt_timeout_until_set() {
    let mut settings = ClientSettings {
        receipt_timeout_ms: 50,
        ..ClientSettings::default()
    };
    assert_eq!(settings.response_timeout(), Duration::from_millis(50));

    settings.response_timeout_ms = Some(400);
    assert_eq!(settings.response_timeout(), Duration::from_millis(400));
    assert_eq!(settings.upload_timeout(), Duration::from_secs(30));
}
