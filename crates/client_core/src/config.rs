use std::{fs, io::ErrorKind, path::Path, time::Duration};

use anyhow::Context;
use serde::Deserialize;

pub const DEFAULT_SETTINGS_FILE: &str = "client.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Receipt wait per expected internal id.
    pub receipt_timeout_ms: u64,
    /// Receipt wait for music shares and file feeds.
    pub special_receipt_timeout_ms: u64,
    /// Wait for the server's answer to a single outgoing packet. Falls back to
    /// `receipt_timeout_ms` when unset.
    pub response_timeout_ms: Option<u64>,
    /// Wait for one highway upload.
    pub upload_timeout_ms: u64,
    pub max_text_chars: usize,
    pub max_images: usize,
    pub max_forward_nodes: usize,
    /// Estimated wire bytes per fragment when a message has to be split.
    pub fragment_bytes: usize,
    pub long_message_brief_chars: usize,
    pub event_channel_capacity: usize,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            receipt_timeout_ms: 3_000,
            special_receipt_timeout_ms: 5_000,
            response_timeout_ms: None,
            upload_timeout_ms: 30_000,
            max_text_chars: 5_000,
            max_images: 50,
            max_forward_nodes: 200,
            fragment_bytes: 700,
            long_message_brief_chars: 27,
            event_channel_capacity: 1024,
        }
    }
}

impl ClientSettings {
    /// Total correlation budget for a send that produced `expected` wire messages.
    pub fn receipt_timeout(&self, expected: usize) -> Duration {
        let expected = u32::try_from(expected.max(1)).unwrap_or(u32::MAX);
        Duration::from_millis(self.receipt_timeout_ms).saturating_mul(expected)
    }

    pub fn special_receipt_timeout(&self) -> Duration {
        Duration::from_millis(self.special_receipt_timeout_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms.unwrap_or(self.receipt_timeout_ms))
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_millis(self.upload_timeout_ms)
    }
}

pub fn load_settings() -> anyhow::Result<ClientSettings> {
    load_settings_from(DEFAULT_SETTINGS_FILE)
}

pub fn load_settings_from(path: impl AsRef<Path>) -> anyhow::Result<ClientSettings> {
    let path = path.as_ref();
    let mut settings = match fs::read_to_string(path) {
        Ok(raw) => toml::from_str::<ClientSettings>(&raw)
            .with_context(|| format!("failed to parse settings file '{}'", path.display()))?,
        Err(err) if err.kind() == ErrorKind::NotFound => ClientSettings::default(),
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read settings file '{}'", path.display()))
        }
    };
    apply_overrides(&mut settings, |key| std::env::var(key).ok());
    Ok(settings)
}

/// Applies `APP__*` overrides; values that do not parse are ignored.
pub fn apply_overrides(settings: &mut ClientSettings, lookup: impl Fn(&str) -> Option<String>) {
    fn parsed<T: std::str::FromStr>(
        lookup: &impl Fn(&str) -> Option<String>,
        key: &str,
    ) -> Option<T> {
        lookup(key).and_then(|v| v.trim().parse::<T>().ok())
    }

    if let Some(v) = parsed(&lookup, "APP__RECEIPT_TIMEOUT_MS") {
        settings.receipt_timeout_ms = v;
    }
    if let Some(v) = parsed(&lookup, "APP__SPECIAL_RECEIPT_TIMEOUT_MS") {
        settings.special_receipt_timeout_ms = v;
    }
    if let Some(v) = parsed(&lookup, "APP__RESPONSE_TIMEOUT_MS") {
        settings.response_timeout_ms = Some(v);
    }
    if let Some(v) = parsed(&lookup, "APP__UPLOAD_TIMEOUT_MS") {
        settings.upload_timeout_ms = v;
    }
    if let Some(v) = parsed(&lookup, "APP__MAX_TEXT_CHARS") {
        settings.max_text_chars = v;
    }
    if let Some(v) = parsed(&lookup, "APP__MAX_IMAGES") {
        settings.max_images = v;
    }
    if let Some(v) = parsed(&lookup, "APP__MAX_FORWARD_NODES") {
        settings.max_forward_nodes = v;
    }
    if let Some(v) = parsed(&lookup, "APP__FRAGMENT_BYTES") {
        settings.fragment_bytes = v;
    }
    if let Some(v) = parsed(&lookup, "APP__LONG_MESSAGE_BRIEF_CHARS") {
        settings.long_message_brief_chars = v;
    }
    if let Some(v) = parsed(&lookup, "APP__EVENT_CHANNEL_CAPACITY") {
        settings.event_channel_capacity = v;
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
