//! Action registry: the single table behind decoding, the prompt's action
//! list and the structured-output response schema.
//!
//! Decoding is strict. A parameter of the wrong JSON type is an error, never
//! a default; `null` is treated the same as a missing key; keys the table does
//! not declare are ignored.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

use crate::errors::{DroidClawError, DroidClawResult};
use crate::executor::actions::Action;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Integer,
    String,
    Boolean,
    StringList,
    StringMap,
}

impl ParamType {
    fn label(self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::String => "string",
            Self::Boolean => "boolean",
            Self::StringList => "list of strings",
            Self::StringMap => "map of string to string",
        }
    }

    fn schema(self) -> Value {
        match self {
            Self::Integer => json!({ "type": "INTEGER" }),
            Self::String => json!({ "type": "STRING" }),
            Self::Boolean => json!({ "type": "BOOLEAN" }),
            Self::StringList => json!({ "type": "ARRAY", "items": { "type": "STRING" } }),
            // The schema dialect has no free-form maps, so a map travels as
            // key/value pairs. Decoding accepts both shapes.
            Self::StringMap => json!({
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "key": { "type": "STRING" },
                        "value": { "type": "STRING" },
                    },
                    "required": ["key", "value"],
                },
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Integer(u32),
    String(String),
    Boolean(bool),
    StringList(Vec<String>),
    StringMap(BTreeMap<String, String>),
}

impl ParamValue {
    pub fn to_json(&self) -> Value {
        match self {
            Self::Integer(v) => json!(v),
            Self::String(v) => json!(v),
            Self::Boolean(v) => json!(v),
            Self::StringList(v) => json!(v),
            Self::StringMap(v) => json!(v),
        }
    }
}

#[derive(Debug)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamType,
    pub required: bool,
    pub description: &'static str,
}

pub struct ActionSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub params: &'static [ParamSpec],
    build: fn(&mut Params) -> DroidClawResult<Action>,
}

/// Parameters of one action after type checking.
#[derive(Debug, Default)]
pub struct Params {
    action: &'static str,
    values: BTreeMap<&'static str, ParamValue>,
}

impl Params {
    fn missing(&self, name: &str) -> DroidClawError {
        DroidClawError::Decoding(format!(
            "action '{}' is missing required parameter '{name}'",
            self.action
        ))
    }

    fn integer(&mut self, name: &'static str) -> DroidClawResult<u32> {
        self.opt_integer(name)?.ok_or_else(|| self.missing(name))
    }

    fn opt_integer(&mut self, name: &'static str) -> DroidClawResult<Option<u32>> {
        match self.values.remove(name) {
            Some(ParamValue::Integer(v)) => Ok(Some(v)),
            None => Ok(None),
            Some(_) => Err(self.missing(name)),
        }
    }

    fn string(&mut self, name: &'static str) -> DroidClawResult<String> {
        match self.values.remove(name) {
            Some(ParamValue::String(v)) => Ok(v),
            _ => Err(self.missing(name)),
        }
    }

    fn boolean(&mut self, name: &'static str) -> DroidClawResult<bool> {
        match self.values.remove(name) {
            Some(ParamValue::Boolean(v)) => Ok(v),
            _ => Err(self.missing(name)),
        }
    }

    fn string_list(&mut self, name: &'static str) -> Vec<String> {
        match self.values.remove(name) {
            Some(ParamValue::StringList(v)) => v,
            _ => Vec::new(),
        }
    }

    fn string_map(&mut self, name: &'static str) -> BTreeMap<String, String> {
        match self.values.remove(name) {
            Some(ParamValue::StringMap(v)) => v,
            _ => BTreeMap::new(),
        }
    }
}

const fn param(
    name: &'static str,
    kind: ParamType,
    required: bool,
    description: &'static str,
) -> ParamSpec {
    ParamSpec {
        name,
        kind,
        required,
        description,
    }
}

const INDEX: ParamSpec = param(
    "index",
    ParamType::Integer,
    true,
    "Index of the element as shown in square brackets on the current screen",
);
const AMOUNT: ParamSpec = param(
    "amount",
    ParamType::Integer,
    false,
    "Pixels to scroll; defaults to roughly one screen",
);
const FILE_NAME: ParamSpec = param(
    "file_name",
    ParamType::String,
    true,
    "Plain file name ending in .md or .txt, no directories",
);
const CONTENT: ParamSpec = param("content", ParamType::String, true, "Text to store");

pub static ACTIONS: &[ActionSpec] = &[
    ActionSpec {
        name: "tap_element",
        description: "Tap the element with the given index.",
        params: &[INDEX],
        build: |p| Ok(Action::TapElement { index: p.integer("index")? }),
    },
    ActionSpec {
        name: "long_press_element",
        description: "Long-press the element with the given index.",
        params: &[INDEX],
        build: |p| Ok(Action::LongPressElement { index: p.integer("index")? }),
    },
    ActionSpec {
        name: "type_text",
        description: "Type text into the currently focused input field.",
        params: &[param("text", ParamType::String, true, "Text to type")],
        build: |p| Ok(Action::TypeText { text: p.string("text")? }),
    },
    ActionSpec {
        name: "tap_element_input_text_and_enter",
        description: "Tap an input element, type text into it and press enter.",
        params: &[
            INDEX,
            param("text", ParamType::String, true, "Text to type before pressing enter"),
        ],
        build: |p| {
            Ok(Action::TapElementInputTextAndEnter {
                index: p.integer("index")?,
                text: p.string("text")?,
            })
        },
    },
    ActionSpec {
        name: "scroll_up",
        description: "Scroll the screen up to reveal content above.",
        params: &[AMOUNT],
        build: |p| Ok(Action::ScrollUp { amount: p.opt_integer("amount")? }),
    },
    ActionSpec {
        name: "scroll_down",
        description: "Scroll the screen down to reveal content below.",
        params: &[AMOUNT],
        build: |p| Ok(Action::ScrollDown { amount: p.opt_integer("amount")? }),
    },
    ActionSpec {
        name: "switch_app",
        description: "Open the recent apps switcher.",
        params: &[],
        build: |_| Ok(Action::SwitchApp),
    },
    ActionSpec {
        name: "back",
        description: "Press the system back button.",
        params: &[],
        build: |_| Ok(Action::Back),
    },
    ActionSpec {
        name: "home",
        description: "Go to the home screen.",
        params: &[],
        build: |_| Ok(Action::Home),
    },
    ActionSpec {
        name: "wait",
        description: "Wait a few seconds for the screen to finish loading.",
        params: &[],
        build: |_| Ok(Action::Wait),
    },
    ActionSpec {
        name: "speak",
        description: "Say something to the user without waiting for a reply.",
        params: &[param("message", ParamType::String, true, "What to tell the user")],
        build: |p| Ok(Action::Speak { message: p.string("message")? }),
    },
    ActionSpec {
        name: "ask",
        description: "Ask the user a question and wait for the answer.",
        params: &[param("question", ParamType::String, true, "Question for the user")],
        build: |p| Ok(Action::Ask { question: p.string("question")? }),
    },
    ActionSpec {
        name: "open_app",
        description: "Launch an installed app by its name.",
        params: &[param("app_name", ParamType::String, true, "Name of the app as shown in the launcher")],
        build: |p| Ok(Action::OpenApp { app_name: p.string("app_name")? }),
    },
    ActionSpec {
        name: "search_google",
        description: "Run a web search for the query.",
        params: &[param("query", ParamType::String, true, "Search query")],
        build: |p| Ok(Action::SearchGoogle { query: p.string("query")? }),
    },
    ActionSpec {
        name: "read_file",
        description: "Read a file from the workspace. Its content is shown once in the next step.",
        params: &[FILE_NAME],
        build: |p| Ok(Action::ReadFile { file_name: p.string("file_name")? }),
    },
    ActionSpec {
        name: "write_file",
        description: "Create or overwrite a file in the workspace.",
        params: &[FILE_NAME, CONTENT],
        build: |p| {
            Ok(Action::WriteFile {
                file_name: p.string("file_name")?,
                content: p.string("content")?,
            })
        },
    },
    ActionSpec {
        name: "append_file",
        description: "Append text to a file in the workspace.",
        params: &[FILE_NAME, CONTENT],
        build: |p| {
            Ok(Action::AppendFile {
                file_name: p.string("file_name")?,
                content: p.string("content")?,
            })
        },
    },
    ActionSpec {
        name: "launch_intent",
        description: "Launch a named system intent: dial, send_sms, open_url, set_alarm, web_search, share_text.",
        params: &[
            param("intent_name", ParamType::String, true, "Name of the intent"),
            param("parameters", ParamType::StringMap, false, "Intent parameters"),
        ],
        build: |p| {
            Ok(Action::LaunchIntent {
                intent_name: p.string("intent_name")?,
                parameters: p.string_map("parameters"),
            })
        },
    },
    ActionSpec {
        name: "done",
        description: "Finish the task. Call this only when the task is complete or cannot be completed.",
        params: &[
            param("success", ParamType::Boolean, true, "Whether the task was completed"),
            param("text", ParamType::String, true, "Final answer or summary for the user"),
            param("files_to_display", ParamType::StringList, false, "Workspace files to show the user"),
        ],
        build: |p| {
            Ok(Action::Done {
                success: p.boolean("success")?,
                text: p.string("text")?,
                files_to_display: p.string_list("files_to_display"),
            })
        },
    },
];

pub fn find_action(name: &str) -> Option<&'static ActionSpec> {
    ACTIONS.iter().find(|spec| spec.name == name)
}

/// Decode one `{"<wire_name>": {params}}` object.
pub fn decode_action(raw: &Value) -> DroidClawResult<Action> {
    let object = raw.as_object().ok_or_else(|| {
        DroidClawError::Decoding(format!("action must be a JSON object, got {raw}"))
    })?;
    if object.len() != 1 {
        return Err(DroidClawError::Decoding(format!(
            "action object must have exactly one key, got {}",
            object.len()
        )));
    }
    let Some((name, body)) = object.iter().next() else {
        return Err(DroidClawError::Decoding("empty action object".into()));
    };
    let spec = find_action(name)
        .ok_or_else(|| DroidClawError::Decoding(format!("unknown action '{name}'")))?;

    let empty = Map::new();
    let fields = match body {
        Value::Object(map) => map,
        Value::Null => &empty,
        other => {
            return Err(DroidClawError::Decoding(format!(
                "parameters of '{name}' must be an object, got {other}"
            )))
        }
    };

    let mut params = Params {
        action: spec.name,
        values: BTreeMap::new(),
    };
    for declared in spec.params {
        match fields.get(declared.name) {
            None | Some(Value::Null) => {
                if declared.required {
                    return Err(params.missing(declared.name));
                }
            }
            Some(value) => {
                let typed = coerce(spec.name, declared, value)?;
                params.values.insert(declared.name, typed);
            }
        }
    }
    (spec.build)(&mut params)
}

fn coerce(action: &str, spec: &ParamSpec, value: &Value) -> DroidClawResult<ParamValue> {
    let mismatch = || {
        DroidClawError::Decoding(format!(
            "parameter '{}' of '{action}' must be a {}, got {value}",
            spec.name,
            spec.kind.label()
        ))
    };
    match spec.kind {
        ParamType::Integer => value
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .map(ParamValue::Integer)
            .ok_or_else(mismatch),
        ParamType::String => value
            .as_str()
            .map(|s| ParamValue::String(s.to_string()))
            .ok_or_else(mismatch),
        ParamType::Boolean => value.as_bool().map(ParamValue::Boolean).ok_or_else(mismatch),
        ParamType::StringList => {
            let items = value.as_array().ok_or_else(mismatch)?;
            items
                .iter()
                .map(|item| item.as_str().map(str::to_string).ok_or_else(mismatch))
                .collect::<DroidClawResult<Vec<_>>>()
                .map(ParamValue::StringList)
        }
        ParamType::StringMap => match value {
            Value::Object(entries) => entries
                .iter()
                .map(|(k, v)| {
                    v.as_str()
                        .map(|s| (k.clone(), s.to_string()))
                        .ok_or_else(mismatch)
                })
                .collect::<DroidClawResult<BTreeMap<_, _>>>()
                .map(ParamValue::StringMap),
            Value::Array(pairs) => pairs
                .iter()
                .map(|pair| {
                    match (pair.get("key").and_then(Value::as_str), pair.get("value").and_then(Value::as_str)) {
                        (Some(k), Some(v)) => Ok((k.to_string(), v.to_string())),
                        _ => Err(mismatch()),
                    }
                })
                .collect::<DroidClawResult<BTreeMap<_, _>>>()
                .map(ParamValue::StringMap),
            _ => Err(mismatch()),
        },
    }
}

/// The action list embedded in the system prompt.
pub fn describe_actions() -> String {
    let mut out = String::new();
    for spec in ACTIONS {
        out.push_str(&format!("- {}: {}\n", spec.name, spec.description));
        for p in spec.params {
            let required = if p.required { "required" } else { "optional" };
            out.push_str(&format!(
                "    {} ({}, {}): {}\n",
                p.name,
                p.kind.label(),
                required,
                p.description
            ));
        }
    }
    out
}

/// Schema-only property of actions that take no parameters.
const NO_PARAMS_PLACEHOLDER: &str = "note";

/// JSON schema for structured-output mode, in the generateContent dialect.
pub fn response_schema() -> Value {
    let action_properties: Map<String, Value> = ACTIONS
        .iter()
        .map(|spec| {
            let mut properties: Map<String, Value> = spec
                .params
                .iter()
                .map(|p| (p.name.to_string(), p.kind.schema()))
                .collect();
            let required: Vec<&str> = spec
                .params
                .iter()
                .filter(|p| p.required)
                .map(|p| p.name)
                .collect();
            if properties.is_empty() {
                // OBJECT nodes need at least one property; decoding ignores it.
                properties.insert(
                    NO_PARAMS_PLACEHOLDER.to_string(),
                    json!({ "type": "STRING", "nullable": true }),
                );
            }
            let mut schema = json!({
                "type": "OBJECT",
                "nullable": true,
                "properties": Value::Object(properties),
            });
            if !required.is_empty() {
                schema["required"] = json!(required);
            }
            (spec.name.to_string(), schema)
        })
        .collect();

    json!({
        "type": "OBJECT",
        "properties": {
            "evaluation_previous_goal": { "type": "STRING" },
            "memory": { "type": "STRING" },
            "next_goal": { "type": "STRING" },
            "actions": {
                "type": "ARRAY",
                "items": { "type": "OBJECT", "properties": action_properties },
            },
        },
        "required": ["evaluation_previous_goal", "memory", "next_goal", "actions"],
    })
}
