//! Named system intents the agent may launch without navigating the UI.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IntentExtra {
    Text(String),
    Int(i64),
}

/// Platform-level description of an intent, ready for the input layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentDescriptor {
    pub action: String,
    pub data: Option<String>,
    pub mime_type: Option<String>,
    pub extras: BTreeMap<String, IntentExtra>,
}

impl IntentDescriptor {
    fn new(action: &str) -> Self {
        Self {
            action: action.to_string(),
            data: None,
            mime_type: None,
            extras: BTreeMap::new(),
        }
    }

    fn data(mut self, uri: String) -> Self {
        self.data = Some(uri);
        self
    }

    fn text_extra(mut self, key: &str, value: &str) -> Self {
        self.extras.insert(key.to_string(), IntentExtra::Text(value.to_string()));
        self
    }

    fn int_extra(mut self, key: &str, value: i64) -> Self {
        self.extras.insert(key.to_string(), IntentExtra::Int(value));
        self
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IntentError {
    #[error("Unknown intent '{name}'. Available intents: {available}")]
    Unknown { name: String, available: String },

    #[error("Invalid parameters for intent '{name}': {reason}")]
    InvalidParameters { name: String, reason: String },
}

type Params = BTreeMap<String, String>;
type Builder = fn(&Params) -> Result<IntentDescriptor, String>;

struct IntentHandler {
    name: &'static str,
    build: Builder,
}

pub struct IntentCatalog {
    handlers: Vec<IntentHandler>,
}

impl IntentCatalog {
    /// Dial, SMS, browser, alarm, web search and share.
    pub fn standard() -> Self {
        Self {
            handlers: vec![
                IntentHandler { name: "dial", build: build_dial },
                IntentHandler { name: "send_sms", build: build_send_sms },
                IntentHandler { name: "open_url", build: build_open_url },
                IntentHandler { name: "set_alarm", build: build_set_alarm },
                IntentHandler { name: "web_search", build: build_web_search },
                IntentHandler { name: "share_text", build: build_share_text },
            ],
        }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|h| h.name).collect()
    }

    pub fn build(&self, name: &str, params: &Params) -> Result<IntentDescriptor, IntentError> {
        let handler = self
            .handlers
            .iter()
            .find(|h| h.name == name)
            .ok_or_else(|| IntentError::Unknown {
                name: name.to_string(),
                available: self.names().join(", "),
            })?;
        (handler.build)(params).map_err(|reason| IntentError::InvalidParameters {
            name: name.to_string(),
            reason,
        })
    }
}

impl Default for IntentCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

fn required<'a>(params: &'a Params, key: &str) -> Result<&'a str, String> {
    params
        .get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| format!("missing '{key}'"))
}

fn phone_number(params: &Params) -> Result<String, String> {
    let number = required(params, "number")?;
    let valid = number
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | ' ' | '(' | ')'));
    if !valid {
        return Err(format!("'{number}' is not a phone number"));
    }
    Ok(number.replace(' ', ""))
}

fn ranged(params: &Params, key: &str, max: i64) -> Result<i64, String> {
    let raw = required(params, key)?;
    let value: i64 = raw
        .parse()
        .map_err(|_| format!("'{key}' must be a number, got '{raw}'"))?;
    if !(0..=max).contains(&value) {
        return Err(format!("'{key}' must be between 0 and {max}"));
    }
    Ok(value)
}

fn build_dial(params: &Params) -> Result<IntentDescriptor, String> {
    let number = phone_number(params)?;
    Ok(IntentDescriptor::new("android.intent.action.DIAL").data(format!("tel:{number}")))
}

fn build_send_sms(params: &Params) -> Result<IntentDescriptor, String> {
    let number = phone_number(params)?;
    let mut intent =
        IntentDescriptor::new("android.intent.action.SENDTO").data(format!("smsto:{number}"));
    if let Some(message) = params.get("message") {
        intent = intent.text_extra("sms_body", message);
    }
    Ok(intent)
}

fn build_open_url(params: &Params) -> Result<IntentDescriptor, String> {
    let url = required(params, "url")?;
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(format!("'{url}' must start with http:// or https://"));
    }
    Ok(IntentDescriptor::new("android.intent.action.VIEW").data(url.to_string()))
}

fn build_set_alarm(params: &Params) -> Result<IntentDescriptor, String> {
    let hour = ranged(params, "hour", 23)?;
    let minutes = ranged(params, "minutes", 59)?;
    let mut intent = IntentDescriptor::new("android.intent.action.SET_ALARM")
        .int_extra("android.intent.extra.alarm.HOUR", hour)
        .int_extra("android.intent.extra.alarm.MINUTES", minutes);
    if let Some(label) = params.get("message") {
        intent = intent.text_extra("android.intent.extra.alarm.MESSAGE", label);
    }
    Ok(intent)
}

fn build_web_search(params: &Params) -> Result<IntentDescriptor, String> {
    let query = required(params, "query")?;
    Ok(IntentDescriptor::new("android.intent.action.WEB_SEARCH").text_extra("query", query))
}

fn build_share_text(params: &Params) -> Result<IntentDescriptor, String> {
    let text = required(params, "text")?;
    let mut intent = IntentDescriptor::new("android.intent.action.SEND")
        .text_extra("android.intent.extra.TEXT", text);
    intent.mime_type = Some("text/plain".to_string());
    Ok(intent)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> Params {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_dial_builds_tel_uri() {
        let intent = IntentCatalog::standard()
            .build("dial", &params(&[("number", "+1 555 0100")]))
            .unwrap();
        assert_eq!(intent.action, "android.intent.action.DIAL");
        assert_eq!(intent.data.as_deref(), Some("tel:+15550100"));
    }

    #[test]
    fn test_unknown_and_invalid_are_distinct() {
        let catalog = IntentCatalog::standard();
        let unknown = catalog.build("teleport", &Params::new()).unwrap_err();
        assert!(matches!(unknown, IntentError::Unknown { .. }));
        assert!(unknown.to_string().contains("dial"));

        let invalid = catalog.build("set_alarm", &params(&[("hour", "25"), ("minutes", "0")])).unwrap_err();
        assert!(matches!(invalid, IntentError::InvalidParameters { .. }));
        assert!(invalid.to_string().contains("hour"));
    }

    #[test]
    fn test_alarm_extras_are_integers() {
        let intent = IntentCatalog::standard()
            .build("set_alarm", &params(&[("hour", "7"), ("minutes", "30"), ("message", "Gym")]))
            .unwrap();
        assert_eq!(intent.extras["android.intent.extra.alarm.HOUR"], IntentExtra::Int(7));
        assert_eq!(
            intent.extras["android.intent.extra.alarm.MESSAGE"],
            IntentExtra::Text("Gym".into())
        );
    }

    #[test]
    fn test_open_url_requires_scheme() {
        let catalog = IntentCatalog::standard();
        assert!(catalog.build("open_url", &params(&[("url", "example.com")])).is_err());
        assert!(catalog.build("open_url", &params(&[("url", "https://example.com")])).is_ok());
    }

    #[test]
    fn test_share_text_sets_mime() {
        let intent = IntentCatalog::standard()
            .build("share_text", &params(&[("text", "hello")]))
            .unwrap();
        assert_eq!(intent.mime_type.as_deref(), Some("text/plain"));
    }
}
