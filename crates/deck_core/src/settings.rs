//! Typed per-action settings adopted from the host's raw settings map.
//!
//! Defaulting and clamping happen here, once, when the router adopts a map.

use std::time::Duration;

use serde_json::Value;
use shared::{domain::ActionKind, protocol::RawSettings};

pub const DEFAULT_HOLD_THRESHOLD_MS: u64 = 750;
pub const MIN_HOLD_THRESHOLD_MS: u64 = 300;
pub const MAX_HOLD_THRESHOLD_MS: u64 = 5_000;

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5_000;
pub const MIN_POLL_INTERVAL_MS: u64 = 1_000;
pub const MAX_POLL_INTERVAL_MS: u64 = 60_000;

pub const DEFAULT_PATH_QUERY: &str = "$";
pub const DEFAULT_DISPLAY_TEMPLATE: &str = "{value}";

const ENDPOINT_KEYS: &[&str] = &["moonrakerUrl", "endpointBaseUrl"];
const PRESS_COMMAND_KEYS: &[&str] = &["pressCommand", "pressGcode"];
const HOLD_COMMAND_KEYS: &[&str] = &["holdCommand", "holdGcode"];
const COMMAND_KEYS: &[&str] = &["gcode", "command"];
const HOLD_DELAY_KEYS: &[&str] = &["holdDelay", "holdThresholdMs"];
const SOURCE_URL_KEYS: &[&str] = &["url", "sourceUrl"];
const PATH_QUERY_KEYS: &[&str] = &["jsonPath", "pathQuery"];
const TEMPLATE_KEYS: &[&str] = &["template", "displayTemplate"];
const INTERVAL_KEYS: &[&str] = &["interval", "intervalMs"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GestureSettings {
    pub hold_threshold: Duration,
    pub press_command: String,
    pub hold_command: String,
    pub endpoint_base_url: String,
}

impl GestureSettings {
    pub fn from_raw(raw: &RawSettings) -> Self {
        Self {
            hold_threshold: Duration::from_millis(hold_threshold_ms(lookup(raw, HOLD_DELAY_KEYS))),
            press_command: trimmed_string(raw, PRESS_COMMAND_KEYS),
            hold_command: trimmed_string(raw, HOLD_COMMAND_KEYS),
            endpoint_base_url: trimmed_string(raw, ENDPOINT_KEYS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSettings {
    pub source_url: String,
    pub path_query: String,
    pub display_template: String,
    pub interval: Duration,
}

impl PollSettings {
    pub fn from_raw(raw: &RawSettings) -> Self {
        Self {
            source_url: trimmed_string(raw, SOURCE_URL_KEYS),
            path_query: non_empty_or(raw, PATH_QUERY_KEYS, DEFAULT_PATH_QUERY),
            display_template: non_empty_or(raw, TEMPLATE_KEYS, DEFAULT_DISPLAY_TEMPLATE),
            interval: Duration::from_millis(poll_interval_ms(lookup(raw, INTERVAL_KEYS))),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.source_url.is_empty()
    }
}

/// Settings of a button that sends one command per invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSettings {
    pub endpoint_base_url: String,
    pub command: String,
}

impl CommandSettings {
    pub fn from_raw(raw: &RawSettings) -> Self {
        Self {
            endpoint_base_url: trimmed_string(raw, ENDPOINT_KEYS),
            command: trimmed_string(raw, COMMAND_KEYS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionSettings {
    Gesture(GestureSettings),
    Poll(PollSettings),
    Passive(CommandSettings),
}

impl ActionSettings {
    pub fn adopt(kind: ActionKind, raw: &RawSettings) -> Self {
        match kind {
            ActionKind::Gesture => Self::Gesture(GestureSettings::from_raw(raw)),
            ActionKind::Poll => Self::Poll(PollSettings::from_raw(raw)),
            ActionKind::Passive => Self::Passive(CommandSettings::from_raw(raw)),
        }
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            Self::Gesture(_) => ActionKind::Gesture,
            Self::Poll(_) => ActionKind::Poll,
            Self::Passive(_) => ActionKind::Passive,
        }
    }
}

pub fn hold_threshold_ms(raw: Option<&Value>) -> u64 {
    match raw.and_then(leading_integer) {
        None => DEFAULT_HOLD_THRESHOLD_MS,
        Some(ms) => ms.clamp(MIN_HOLD_THRESHOLD_MS as i64, MAX_HOLD_THRESHOLD_MS as i64) as u64,
    }
}

/// Intervals below the minimum fall back to the default rather than the floor.
pub fn poll_interval_ms(raw: Option<&Value>) -> u64 {
    match raw.and_then(leading_integer) {
        Some(ms) if ms < MIN_POLL_INTERVAL_MS as i64 => DEFAULT_POLL_INTERVAL_MS,
        Some(ms) => ms.min(MAX_POLL_INTERVAL_MS as i64) as u64,
        None => DEFAULT_POLL_INTERVAL_MS,
    }
}

/// Integer prefix of a setting: numbers truncate, strings parse like `"750ms"`.
fn leading_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        Value::String(text) => parse_leading_integer(text),
        _ => None,
    }
}

fn parse_leading_integer(text: &str) -> Option<i64> {
    let text = text.trim_start();
    let (negative, digits) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    let magnitude = digits[..end].parse::<i64>().unwrap_or(i64::MAX);
    Some(if negative { -magnitude } else { magnitude })
}

fn lookup<'a>(raw: &'a RawSettings, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| raw.get(*key))
        .find(|value| !value.is_null())
}

fn trimmed_string(raw: &RawSettings, keys: &[&str]) -> String {
    keys.iter()
        .filter_map(|key| raw.get(*key))
        .filter_map(scalar_text)
        .map(|text| text.trim().to_string())
        .find(|text| !text.is_empty())
        .unwrap_or_default()
}

fn non_empty_or(raw: &RawSettings, keys: &[&str], default: &str) -> String {
    keys.iter()
        .filter_map(|key| raw.get(*key))
        .filter_map(scalar_text)
        .find(|text| !text.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> RawSettings {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn hold_threshold_defaults_and_clamps() {
        assert_eq!(hold_threshold_ms(None), 750);
        assert_eq!(hold_threshold_ms(Some(&json!("soon"))), 750);
        assert_eq!(hold_threshold_ms(Some(&json!(true))), 750);
        assert_eq!(hold_threshold_ms(Some(&json!(""))), 750);
        assert_eq!(hold_threshold_ms(Some(&json!(10))), 300);
        assert_eq!(hold_threshold_ms(Some(&json!(-50))), 300);
        assert_eq!(hold_threshold_ms(Some(&json!(300))), 300);
        assert_eq!(hold_threshold_ms(Some(&json!("1200"))), 1200);
        assert_eq!(hold_threshold_ms(Some(&json!("1200ms"))), 1200);
        assert_eq!(hold_threshold_ms(Some(&json!(999.9))), 999);
        assert_eq!(hold_threshold_ms(Some(&json!(5000))), 5000);
        assert_eq!(hold_threshold_ms(Some(&json!(90000))), 5000);
        assert_eq!(hold_threshold_ms(Some(&json!("99999999999999999999999"))), 5000);
    }

    #[test]
    fn poll_interval_defaults_and_clamps() {
        assert_eq!(poll_interval_ms(None), 5000);
        assert_eq!(poll_interval_ms(Some(&json!("abc"))), 5000);
        assert_eq!(poll_interval_ms(Some(&json!(999))), 5000);
        assert_eq!(poll_interval_ms(Some(&json!(0))), 5000);
        assert_eq!(poll_interval_ms(Some(&json!(1000))), 1000);
        assert_eq!(poll_interval_ms(Some(&json!("2500"))), 2500);
        assert_eq!(poll_interval_ms(Some(&json!(60000))), 60000);
        assert_eq!(poll_interval_ms(Some(&json!(120000))), 60000);
    }

    #[test]
    fn gesture_settings_accept_both_key_spellings() {
        let settings = GestureSettings::from_raw(&raw(json!({
            "moonrakerUrl": "  http://printer.local:7125/ ",
            "pressGcode": " G28 ",
            "holdCommand": "M112",
            "holdDelay": "500",
        })));
        assert_eq!(settings.endpoint_base_url, "http://printer.local:7125/");
        assert_eq!(settings.press_command, "G28");
        assert_eq!(settings.hold_command, "M112");
        assert_eq!(settings.hold_threshold, Duration::from_millis(500));
    }

    #[test]
    fn gesture_settings_default_to_noop_commands() {
        let settings = GestureSettings::from_raw(&RawSettings::new());
        assert_eq!(settings.press_command, "");
        assert_eq!(settings.hold_command, "");
        assert_eq!(settings.endpoint_base_url, "");
        assert_eq!(settings.hold_threshold, Duration::from_millis(750));
    }

    #[test]
    fn poll_settings_fill_defaults_for_blank_values() {
        let settings = PollSettings::from_raw(&raw(json!({
            "url": "http://printer.local/api",
            "jsonPath": "",
            "template": null,
            "interval": 250,
        })));
        assert_eq!(settings.source_url, "http://printer.local/api");
        assert_eq!(settings.path_query, "$");
        assert_eq!(settings.display_template, "{value}");
        assert_eq!(settings.interval, Duration::from_millis(5000));
        assert!(settings.is_enabled());

        assert!(!PollSettings::from_raw(&raw(json!({"sourceUrl": "  "}))).is_enabled());
    }

    #[test]
    fn passive_settings_trim_command_and_endpoint() {
        let settings = ActionSettings::adopt(
            ActionKind::Passive,
            &raw(json!({"endpointBaseUrl": " http://p ", "gcode": " M117 hi "})),
        );
        assert_eq!(settings.kind(), ActionKind::Passive);
        assert_eq!(
            settings,
            ActionSettings::Passive(CommandSettings {
                endpoint_base_url: "http://p".to_string(),
                command: "M117 hi".to_string(),
            })
        );
    }
}
