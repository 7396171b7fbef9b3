//! Text escaping for `adb shell input text`.
//!
//! `input text` only handles ASCII; spaces must be sent as `%s` and the whole
//! argument is single-quoted for the device shell.

use crate::errors::{DroidClawError, DroidClawResult};

/// Returns true if the text contains anything `input text` cannot type.
pub fn contains_non_ascii(text: &str) -> bool {
    !text.is_ascii()
}

pub fn escape_input_text(text: &str) -> DroidClawResult<String> {
    if contains_non_ascii(text) {
        return Err(DroidClawError::Executor(
            "Only ASCII characters can be typed on this device".into(),
        ));
    }
    let spaced = text.replace(' ', "%s");
    Ok(format!("'{}'", spaced.replace('\'', r"'\''")))
}
