//! Action dispatcher: turns one validated action into collaborator calls.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::agent_engine::state::ActionResult;
use crate::config::AgentConfig;
use crate::errors::{DroidClawError, DroidClawResult};
use crate::executor::actions::Action;
use crate::executor::apps::{resolve_package, AppCatalog};
use crate::executor::files::FileSandbox;
use crate::executor::input::Finger;
use crate::executor::intents::{IntentCatalog, IntentDescriptor};
use crate::executor::safety::validate_file_name;
use crate::executor::user::UserChannel;
use crate::perception::renderer::{element_label, resolve_tap_point};
use crate::perception::types::ScreenAnalysis;

#[derive(Debug, Clone, Copy)]
pub struct ExecutorSettings {
    pub settle_delay: Duration,
    pub wait_delay: Duration,
    pub default_scroll_amount: u32,
}

impl From<&AgentConfig> for ExecutorSettings {
    fn from(cfg: &AgentConfig) -> Self {
        Self {
            settle_delay: Duration::from_millis(cfg.settle_delay_ms),
            wait_delay: Duration::from_millis(cfg.wait_delay_ms),
            default_scroll_amount: cfg.default_scroll_amount,
        }
    }
}

/// Collaborators the executor drives.
#[derive(Clone)]
pub struct Collaborators {
    pub finger: Arc<dyn Finger>,
    pub apps: Arc<dyn AppCatalog>,
    pub files: Arc<dyn FileSandbox>,
    pub user: Arc<dyn UserChannel>,
}

pub struct ActionExecutor {
    collaborators: Collaborators,
    intents: IntentCatalog,
    settings: ExecutorSettings,
}

impl ActionExecutor {
    pub fn new(collaborators: Collaborators, settings: ExecutorSettings) -> Self {
        Self {
            collaborators,
            intents: IntentCatalog::standard(),
            settings,
        }
    }

    /// Execute `action` against the screen it was decided on. Failures come
    /// back as error results; this never returns `Err`.
    pub async fn execute(&self, action: &Action, analysis: &ScreenAnalysis) -> ActionResult {
        tracing::info!(action = action.wire_name(), "executing action");
        match self.run(action, analysis).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(action = action.wire_name(), kind = e.kind(), error = %e, "action failed");
                ActionResult::error(e)
            }
        }
    }

    async fn run(&self, action: &Action, analysis: &ScreenAnalysis) -> DroidClawResult<ActionResult> {
        let c = &self.collaborators;
        match action {
            Action::TapElement { index } => {
                let (x, y) = resolve_tap_point(analysis, *index)?;
                c.finger.tap(x, y).await?;
                Ok(ActionResult::memory(format!("Tapped {}", describe(analysis, *index))))
            }
            Action::LongPressElement { index } => {
                let (x, y) = resolve_tap_point(analysis, *index)?;
                c.finger.long_press(x, y).await?;
                Ok(ActionResult::memory(format!("Long-pressed {}", describe(analysis, *index))))
            }
            Action::TypeText { text } => {
                c.finger.type_text(text).await?;
                Ok(ActionResult::memory(format!("Typed '{text}'")))
            }
            Action::TapElementInputTextAndEnter { index, text } => {
                let (x, y) = resolve_tap_point(analysis, *index)?;
                c.finger.tap(x, y).await?;
                tokio::time::sleep(self.settings.settle_delay).await;
                c.finger.type_text(text).await?;
                c.finger.press_enter().await?;
                Ok(ActionResult::memory(format!(
                    "Typed '{text}' into {} and pressed enter",
                    describe(analysis, *index)
                )))
            }
            Action::ScrollUp { amount } => {
                let px = amount.unwrap_or(self.settings.default_scroll_amount);
                c.finger.scroll_up(px).await?;
                Ok(ActionResult::memory(format!("Scrolled up {px} pixels")))
            }
            Action::ScrollDown { amount } => {
                let px = amount.unwrap_or(self.settings.default_scroll_amount);
                c.finger.scroll_down(px).await?;
                Ok(ActionResult::memory(format!("Scrolled down {px} pixels")))
            }
            Action::SwitchApp => {
                c.finger.switch_app().await?;
                Ok(ActionResult::memory("Opened the app switcher"))
            }
            Action::Back => {
                c.finger.back().await?;
                Ok(ActionResult::memory("Pressed back"))
            }
            Action::Home => {
                c.finger.home().await?;
                Ok(ActionResult::memory("Went to the home screen"))
            }
            Action::Wait => {
                tokio::time::sleep(self.settings.wait_delay).await;
                Ok(ActionResult::memory(format!(
                    "Waited {} ms",
                    self.settings.wait_delay.as_millis()
                )))
            }
            Action::Speak { message } => {
                c.user.speak(message).await?;
                Ok(ActionResult::memory(format!("Told the user: {message}")))
            }
            Action::Ask { question } => {
                let answer = c.user.ask(question).await?;
                Ok(ActionResult::one_shot(
                    format!("User answered '{question}': {answer}"),
                    format!("Asked the user: {question}"),
                ))
            }
            Action::OpenApp { app_name } => self.open_app(app_name).await,
            Action::SearchGoogle { query } => {
                let params = BTreeMap::from([("query".to_string(), query.clone())]);
                let intent = self
                    .intents
                    .build("web_search", &params)
                    .map_err(|e| DroidClawError::Executor(e.to_string()))?;
                self.launch(&intent, "web search").await?;
                Ok(ActionResult::memory(format!("Searched the web for '{query}'")))
            }
            Action::ReadFile { file_name } => {
                validate_file_name(file_name)?;
                let content = c.files.read(file_name).await?;
                Ok(ActionResult::one_shot(
                    format!("Content of {file_name}:\n{content}"),
                    format!("Read {file_name}"),
                ))
            }
            Action::WriteFile { file_name, content } => {
                validate_file_name(file_name)?;
                if !c.files.write(file_name, content).await? {
                    return Err(DroidClawError::Sandbox(format!("Could not write {file_name}")));
                }
                Ok(ActionResult::memory(format!(
                    "Wrote {} characters to {file_name}",
                    content.chars().count()
                )))
            }
            Action::AppendFile { file_name, content } => {
                validate_file_name(file_name)?;
                if !c.files.append(file_name, content).await? {
                    return Err(DroidClawError::Sandbox(format!("Could not append to {file_name}")));
                }
                Ok(ActionResult::memory(format!(
                    "Appended {} characters to {file_name}",
                    content.chars().count()
                )))
            }
            Action::LaunchIntent {
                intent_name,
                parameters,
            } => {
                let intent = self
                    .intents
                    .build(intent_name, parameters)
                    .map_err(|e| DroidClawError::Executor(e.to_string()))?;
                self.launch(&intent, intent_name).await?;
                Ok(ActionResult::memory(format!("Launched intent {intent_name}")))
            }
            Action::Done {
                success,
                text,
                files_to_display,
            } => Ok(ActionResult::done(*success, text.clone(), files_to_display.clone())),
        }
    }

    async fn open_app(&self, app_name: &str) -> DroidClawResult<ActionResult> {
        let apps = self.collaborators.apps.installed_apps().await?;
        let Some(app) = resolve_package(&apps, app_name) else {
            return Err(DroidClawError::Executor(format!(
                "No installed app matches '{app_name}'. Try another name for the app, or open the app drawer and scroll to find it"
            )));
        };
        if !self.collaborators.finger.open_app(&app.package).await? {
            return Err(DroidClawError::Executor(format!(
                "Could not launch '{}' ({}). Try another name for the app, or open it from the app drawer",
                app.label, app.package
            )));
        }
        Ok(ActionResult::memory(format!("Opened {} ({})", app.label, app.package)))
    }

    async fn launch(&self, intent: &IntentDescriptor, what: &str) -> DroidClawResult<()> {
        if self.collaborators.finger.launch_intent(intent).await? {
            Ok(())
        } else {
            Err(DroidClawError::Executor(format!(
                "No app on the device could handle the {what} intent"
            )))
        }
    }
}

fn describe(analysis: &ScreenAnalysis, index: u32) -> String {
    match analysis.element(index) {
        Some(node) => format!("element [{index}] {} ({})", element_label(node), node.simple_class()),
        None => format!("element [{index}]"),
    }
}
