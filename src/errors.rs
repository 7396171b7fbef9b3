use thiserror::Error;

/// Maximum length of an error text once it is stored in history or an action result.
pub const MAX_ERROR_CHARS: usize = 200;

#[derive(Debug, Error)]
pub enum DroidClawError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Perception error: {0}")]
    Perception(String),

    #[error("Decoding error: {0}")]
    Decoding(String),

    #[error("Element with index {0} does not exist on the current screen")]
    ElementNotFound(u32),

    #[error("Element with index {0} has no usable bounds")]
    NoBounds(u32),

    #[error("LLM transport error: {0}")]
    Transport(String),

    #[error("LLM response blocked: {0}")]
    Blocked(String),

    #[error("Executor error: {0}")]
    Executor(String),

    #[error("Sandbox error: {0}")]
    Sandbox(String),

    #[error("Security error: {0}")]
    Security(String),

    #[error("Memory error: {0}")]
    Memory(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("Task cancelled")]
    Cancelled,
}

impl DroidClawError {
    /// Short, stable label used in logs and bus events.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Perception(_) => "perception",
            Self::Decoding(_) | Self::Json(_) => "decoding",
            Self::ElementNotFound(_) => "element_not_found",
            Self::NoBounds(_) => "no_bounds",
            Self::Transport(_) | Self::Http(_) => "transport",
            Self::Blocked(_) => "blocked",
            Self::Executor(_) => "executor",
            Self::Sandbox(_) => "sandbox",
            Self::Security(_) => "security",
            Self::Memory(_) => "memory",
            Self::Io(_) => "io",
            Self::TomlDe(_) => "config",
            Self::Cancelled => "cancelled",
        }
    }
}

impl serde::Serialize for DroidClawError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

pub type DroidClawResult<T> = Result<T, DroidClawError>;

/// Cut a message down to `max_chars` characters, marking the cut with `...`.
pub fn truncate_message(message: &str, max_chars: usize) -> String {
    if message.chars().count() <= max_chars {
        return message.to_string();
    }
    let kept: String = message.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{kept}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_short_message_untouched() {
        assert_eq!(truncate_message("boom", MAX_ERROR_CHARS), "boom");
    }

    #[test]
    fn test_truncate_long_message() {
        let long = "x".repeat(500);
        let cut = truncate_message(&long, MAX_ERROR_CHARS);
        assert_eq!(cut.chars().count(), MAX_ERROR_CHARS);
        assert!(cut.ends_with("..."));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let long = "é".repeat(300);
        let cut = truncate_message(&long, 10);
        assert_eq!(cut.chars().count(), 10);
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(DroidClawError::Blocked("SAFETY".into()).kind(), "blocked");
        assert_eq!(DroidClawError::Transport("503".into()).kind(), "transport");
        assert_eq!(DroidClawError::ElementNotFound(4).kind(), "element_not_found");
    }
}
