use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::executor::registry::ParamValue;

/// Everything the agent can ask the device or the user to do.
///
/// Element indices refer to the `[n]` labels of the screen analysis the
/// decision was made against.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    TapElement { index: u32 },
    LongPressElement { index: u32 },
    TypeText { text: String },
    TapElementInputTextAndEnter { index: u32, text: String },
    ScrollUp { amount: Option<u32> },
    ScrollDown { amount: Option<u32> },
    SwitchApp,
    Back,
    Home,
    Wait,
    Speak { message: String },
    Ask { question: String },
    OpenApp { app_name: String },
    SearchGoogle { query: String },
    ReadFile { file_name: String },
    WriteFile { file_name: String, content: String },
    AppendFile { file_name: String, content: String },
    LaunchIntent {
        intent_name: String,
        parameters: BTreeMap<String, String>,
    },
    Done {
        success: bool,
        text: String,
        files_to_display: Vec<String>,
    },
}

impl Action {
    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::TapElement { .. } => "tap_element",
            Self::LongPressElement { .. } => "long_press_element",
            Self::TypeText { .. } => "type_text",
            Self::TapElementInputTextAndEnter { .. } => "tap_element_input_text_and_enter",
            Self::ScrollUp { .. } => "scroll_up",
            Self::ScrollDown { .. } => "scroll_down",
            Self::SwitchApp => "switch_app",
            Self::Back => "back",
            Self::Home => "home",
            Self::Wait => "wait",
            Self::Speak { .. } => "speak",
            Self::Ask { .. } => "ask",
            Self::OpenApp { .. } => "open_app",
            Self::SearchGoogle { .. } => "search_google",
            Self::ReadFile { .. } => "read_file",
            Self::WriteFile { .. } => "write_file",
            Self::AppendFile { .. } => "append_file",
            Self::LaunchIntent { .. } => "launch_intent",
            Self::Done { .. } => "done",
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done { .. })
    }

    /// Parameters in wire form; absent optionals are left out.
    pub fn params(&self) -> Vec<(&'static str, ParamValue)> {
        use ParamValue as P;
        match self {
            Self::TapElement { index } | Self::LongPressElement { index } => {
                vec![("index", P::Integer(*index))]
            }
            Self::TypeText { text } => vec![("text", P::String(text.clone()))],
            Self::TapElementInputTextAndEnter { index, text } => vec![
                ("index", P::Integer(*index)),
                ("text", P::String(text.clone())),
            ],
            Self::ScrollUp { amount } | Self::ScrollDown { amount } => amount
                .map(|a| vec![("amount", P::Integer(a))])
                .unwrap_or_default(),
            Self::SwitchApp | Self::Back | Self::Home | Self::Wait => Vec::new(),
            Self::Speak { message } => vec![("message", P::String(message.clone()))],
            Self::Ask { question } => vec![("question", P::String(question.clone()))],
            Self::OpenApp { app_name } => vec![("app_name", P::String(app_name.clone()))],
            Self::SearchGoogle { query } => vec![("query", P::String(query.clone()))],
            Self::ReadFile { file_name } => vec![("file_name", P::String(file_name.clone()))],
            Self::WriteFile { file_name, content } | Self::AppendFile { file_name, content } => {
                vec![
                    ("file_name", P::String(file_name.clone())),
                    ("content", P::String(content.clone())),
                ]
            }
            Self::LaunchIntent {
                intent_name,
                parameters,
            } => vec![
                ("intent_name", P::String(intent_name.clone())),
                ("parameters", P::StringMap(parameters.clone())),
            ],
            Self::Done {
                success,
                text,
                files_to_display,
            } => vec![
                ("success", P::Boolean(*success)),
                ("text", P::String(text.clone())),
                ("files_to_display", P::StringList(files_to_display.clone())),
            ],
        }
    }

    /// `{"<wire_name>": {<params>}}`, the shape the decoder accepts.
    pub fn to_wire(&self) -> Value {
        let params: Map<String, Value> = self
            .params()
            .into_iter()
            .map(|(name, value)| (name.to_string(), value.to_json()))
            .collect();
        let mut outer = Map::new();
        outer.insert(self.wire_name().to_string(), Value::Object(params));
        Value::Object(outer)
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_wire())
    }
}
