//! Android device access through `adb` subprocesses.
//!
//! Every call runs a fixed command template with a timeout. Free text only
//! reaches the device shell single-quoted.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::OnceCell;

use crate::config::DeviceConfig;
use crate::errors::{DroidClawError, DroidClawResult};
use crate::executor::apps::{AppCatalog, InstalledApp};
use crate::executor::input::Finger;
use crate::executor::intents::{IntentDescriptor, IntentExtra};
use crate::executor::text_input::escape_input_text;
use crate::perception::traits::Eyes;

const KEYCODE_HOME: &str = "3";
const KEYCODE_BACK: &str = "4";
const KEYCODE_ENTER: &str = "66";
const KEYCODE_APP_SWITCH: &str = "187";

const LONG_PRESS_MS: &str = "1000";
const SCROLL_SWIPE_MS: u32 = 300;
const DEFAULT_SCREEN: (i32, i32) = (1080, 2400);

pub struct AdbDevice {
    adb_path: String,
    serial: Option<String>,
    timeout: Duration,
    screen: OnceCell<(i32, i32)>,
}

impl AdbDevice {
    pub fn new(adb_path: impl Into<String>, serial: Option<String>, timeout: Duration) -> Self {
        Self {
            adb_path: adb_path.into(),
            serial,
            timeout,
            screen: OnceCell::new(),
        }
    }

    pub fn from_config(config: &DeviceConfig) -> Self {
        Self::new(
            config.adb_path.clone(),
            config.serial.clone(),
            Duration::from_secs(config.command_timeout_secs),
        )
    }

    /// Run `adb [-s serial] <args>` and return stdout.
    async fn run_adb(&self, args: &[&str]) -> DroidClawResult<String> {
        let mut command = Command::new(&self.adb_path);
        if let Some(serial) = &self.serial {
            command.args(["-s", serial.as_str()]);
        }
        command.args(args).stdin(Stdio::null()).kill_on_drop(true);

        tracing::debug!(?args, "adb");
        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| {
                DroidClawError::Executor(format!(
                    "adb command timed out after {}s",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| DroidClawError::Executor(format!("failed to run adb: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DroidClawError::Executor(format!(
                "adb error (exit code {:?}): {}",
                output.status.code(),
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn shell(&self, args: &[&str]) -> DroidClawResult<String> {
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push("shell");
        full.extend_from_slice(args);
        self.run_adb(&full).await
    }

    async fn keyevent(&self, code: &str) -> DroidClawResult<()> {
        self.shell(&["input", "keyevent", code]).await.map(|_| ())
    }

    async fn swipe(&self, from: (i32, i32), to: (i32, i32), duration_ms: &str) -> DroidClawResult<()> {
        self.shell(&[
            "input",
            "swipe",
            &from.0.to_string(),
            &from.1.to_string(),
            &to.0.to_string(),
            &to.1.to_string(),
            duration_ms,
        ])
        .await
        .map(|_| ())
    }

    /// Physical screen size from `wm size`, cached after the first success.
    pub async fn screen_size(&self) -> (i32, i32) {
        let measured = self
            .screen
            .get_or_try_init(|| async {
                let out = self.shell(&["wm", "size"]).await?;
                parse_wm_size(&out).ok_or_else(|| {
                    DroidClawError::Executor(format!("unexpected wm size output: {}", out.trim()))
                })
            })
            .await;
        match measured {
            Ok(size) => *size,
            Err(e) => {
                tracing::warn!(error = %e, "screen size unknown, using default");
                DEFAULT_SCREEN
            }
        }
    }

    async fn scroll(&self, amount: u32, towards_top: bool) -> DroidClawResult<()> {
        let (from, to) = scroll_gesture(self.screen_size().await, amount, towards_top);
        self.swipe(from, to, &SCROLL_SWIPE_MS.to_string()).await
    }
}

#[async_trait]
impl Eyes for AdbDevice {
    async fn raw_tree(&self) -> Option<String> {
        match self.shell(&["uiautomator", "dump", "/dev/tty"]).await {
            Ok(out) => extract_hierarchy(&out).map(str::to_string),
            Err(e) => {
                tracing::debug!(error = %e, "uiautomator dump failed");
                None
            }
        }
    }

    async fn keyboard_visible(&self) -> bool {
        match self.shell(&["dumpsys", "input_method"]).await {
            Ok(out) => out.contains("mInputShown=true"),
            Err(e) => {
                tracing::debug!(error = %e, "input_method query failed");
                false
            }
        }
    }

    async fn foreground_activity(&self) -> String {
        match self.shell(&["dumpsys", "activity", "activities"]).await {
            Ok(out) => parse_resumed_activity(&out).unwrap_or_default(),
            Err(e) => {
                tracing::debug!(error = %e, "activity query failed");
                String::new()
            }
        }
    }
}

#[async_trait]
impl Finger for AdbDevice {
    async fn tap(&self, x: i32, y: i32) -> DroidClawResult<()> {
        self.shell(&["input", "tap", &x.to_string(), &y.to_string()])
            .await
            .map(|_| ())
    }

    async fn long_press(&self, x: i32, y: i32) -> DroidClawResult<()> {
        // Zero-distance swipe held for a second.
        self.swipe((x, y), (x, y), LONG_PRESS_MS).await
    }

    async fn type_text(&self, text: &str) -> DroidClawResult<()> {
        let escaped = escape_input_text(text)?;
        self.shell(&["input", "text", &escaped]).await.map(|_| ())
    }

    async fn press_enter(&self) -> DroidClawResult<()> {
        self.keyevent(KEYCODE_ENTER).await
    }

    async fn scroll_up(&self, amount: u32) -> DroidClawResult<()> {
        self.scroll(amount, true).await
    }

    async fn scroll_down(&self, amount: u32) -> DroidClawResult<()> {
        self.scroll(amount, false).await
    }

    async fn back(&self) -> DroidClawResult<()> {
        self.keyevent(KEYCODE_BACK).await
    }

    async fn home(&self) -> DroidClawResult<()> {
        self.keyevent(KEYCODE_HOME).await
    }

    async fn switch_app(&self) -> DroidClawResult<()> {
        self.keyevent(KEYCODE_APP_SWITCH).await
    }

    async fn open_app(&self, package: &str) -> DroidClawResult<bool> {
        if !is_package_name(package) {
            return Err(DroidClawError::Executor(format!(
                "Invalid package name: '{package}'"
            )));
        }
        let out = self
            .shell(&[
                "monkey",
                "-p",
                package,
                "-c",
                "android.intent.category.LAUNCHER",
                "1",
            ])
            .await?;
        // monkey exits 0 even when nothing could be launched.
        Ok(!out.contains("No activities found"))
    }

    async fn launch_intent(&self, intent: &IntentDescriptor) -> DroidClawResult<bool> {
        let args = intent_args(intent);
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let out = self.shell(&refs).await?;
        Ok(!out.contains("Error:") && !out.contains("unable to resolve Intent"))
    }
}

#[async_trait]
impl AppCatalog for AdbDevice {
    async fn installed_apps(&self) -> DroidClawResult<Vec<InstalledApp>> {
        let launchable = self
            .shell(&[
                "cmd",
                "package",
                "query-activities",
                "--brief",
                "-a",
                "android.intent.action.MAIN",
                "-c",
                "android.intent.category.LAUNCHER",
            ])
            .await;
        let packages = match launchable {
            Ok(out) => parse_launcher_activities(&out),
            Err(e) => {
                tracing::debug!(error = %e, "query-activities unavailable, listing packages");
                parse_package_list(&self.shell(&["pm", "list", "packages", "-3"]).await?)
            }
        };
        Ok(packages
            .into_iter()
            .map(|package| InstalledApp {
                label: label_from_package(&package),
                package,
            })
            .collect())
    }
}

/// The XML part of a `uiautomator dump /dev/tty` reply, which is followed by
/// a status line.
pub fn extract_hierarchy(output: &str) -> Option<&str> {
    let start = output.find('<')?;
    let end = output.rfind("</hierarchy>").map(|i| i + "</hierarchy>".len())?;
    (start < end).then(|| &output[start..end])
}

pub fn parse_wm_size(output: &str) -> Option<(i32, i32)> {
    // An "Override size" line, when present, comes last and wins.
    output.lines().rev().find_map(|line| {
        let (_, dims) = line.split_once(':')?;
        let (w, h) = dims.trim().split_once('x')?;
        Some((w.trim().parse().ok()?, h.trim().parse().ok()?))
    })
}

pub fn parse_resumed_activity(output: &str) -> Option<String> {
    output
        .lines()
        .find(|line| line.contains("mResumedActivity") || line.contains("topResumedActivity"))
        .and_then(|line| line.split_whitespace().find(|tok| tok.contains('/')))
        .map(|tok| tok.trim_end_matches('}').to_string())
}

pub fn parse_package_list(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.trim().strip_prefix("package:"))
        .map(str::to_string)
        .collect()
}

pub fn parse_launcher_activities(output: &str) -> Vec<String> {
    let mut packages: Vec<String> = Vec::new();
    for line in output.lines() {
        if let Some((package, _)) = line.trim().split_once('/') {
            if is_package_name(package) && !packages.iter().any(|p| p == package) {
                packages.push(package.to_string());
            }
        }
    }
    packages
}

/// Best-effort display name: the last package segment, capitalized.
pub fn label_from_package(package: &str) -> String {
    let last = package.rsplit('.').next().unwrap_or(package);
    let mut chars = last.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn is_package_name(package: &str) -> bool {
    let mut segments = 0;
    for segment in package.split('.') {
        let mut chars = segment.chars();
        let valid_start = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
        if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return false;
        }
        segments += 1;
    }
    segments >= 2
}

/// Start and end points of a vertical swipe that moves content by about
/// `amount` pixels.
pub fn scroll_gesture(screen: (i32, i32), amount: u32, towards_top: bool) -> ((i32, i32), (i32, i32)) {
    let (width, height) = screen;
    let x = width / 2;
    let low = height * 4 / 5;
    let high = height / 5;
    let travel = (amount as i32).clamp(1, low - high);
    if towards_top {
        // Finger moves down to reveal content above.
        ((x, high), (x, high + travel))
    } else {
        ((x, low), (x, low - travel))
    }
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// `am start` arguments for `intent`.
pub fn intent_args(intent: &IntentDescriptor) -> Vec<String> {
    let mut args = vec!["am".to_string(), "start".to_string(), "-a".to_string(), intent.action.clone()];
    if let Some(data) = &intent.data {
        args.push("-d".into());
        args.push(shell_quote(data));
    }
    if let Some(mime) = &intent.mime_type {
        args.push("-t".into());
        args.push(mime.clone());
    }
    for (key, extra) in &intent.extras {
        match extra {
            IntentExtra::Text(text) => {
                args.push("--es".into());
                args.push(key.clone());
                args.push(shell_quote(text));
            }
            IntentExtra::Int(n) => {
                args.push("--ei".into());
                args.push(key.clone());
                args.push(n.to_string());
            }
        }
    }
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_extract_hierarchy_drops_status_line() {
        let out = "<?xml version='1.0' ?><hierarchy rotation=\"0\"><node/></hierarchy>UI hierchary dumped to: /dev/tty\n";
        let xml = extract_hierarchy(out).unwrap();
        assert!(xml.starts_with("<?xml"));
        assert!(xml.ends_with("</hierarchy>"));
        assert!(extract_hierarchy("ERROR: null root node returned by UiTestAutomationBridge.").is_none());
    }

    #[test]
    fn test_parse_wm_size_prefers_override() {
        assert_eq!(parse_wm_size("Physical size: 1080x2400\n"), Some((1080, 2400)));
        assert_eq!(
            parse_wm_size("Physical size: 1440x3120\nOverride size: 1080x2340\n"),
            Some((1080, 2340))
        );
        assert_eq!(parse_wm_size("garbage"), None);
    }

    #[test]
    fn test_parse_resumed_activity() {
        let out = "  Stack #1:\n    mResumedActivity: ActivityRecord{8f1 u0 com.android.settings/.Settings t42}\n";
        assert_eq!(
            parse_resumed_activity(out).as_deref(),
            Some("com.android.settings/.Settings")
        );
        assert_eq!(parse_resumed_activity("nothing here"), None);
    }

    #[test]
    fn test_package_listings() {
        assert_eq!(
            parse_package_list("package:com.whatsapp\npackage:org.mozilla.firefox\n"),
            vec!["com.whatsapp", "org.mozilla.firefox"]
        );
        let activities = "com.android.chrome/com.google.android.apps.chrome.Main\ncom.android.chrome/.Other\n3 activities\n";
        assert_eq!(parse_launcher_activities(activities), vec!["com.android.chrome"]);
        assert_eq!(label_from_package("com.whatsapp"), "Whatsapp");
    }

    #[test]
    fn test_package_name_validation() {
        assert!(is_package_name("com.example.app_2"));
        assert!(!is_package_name("single"));
        assert!(!is_package_name("com.example;rm -rf"));
    }

    #[test]
    fn test_scroll_gesture_is_clamped() {
        let (from, to) = scroll_gesture((1000, 2000), 500, false);
        assert_eq!(from, (500, 1600));
        assert_eq!(to, (500, 1100));
        let (from, to) = scroll_gesture((1000, 2000), 10_000, true);
        assert_eq!(from, (500, 400));
        assert_eq!(to, (500, 1600));
    }

    #[test]
    fn test_intent_args_quote_free_text() {
        let mut extras = BTreeMap::new();
        extras.insert("android.intent.extra.TEXT".to_string(), IntentExtra::Text("it's late".into()));
        extras.insert("android.intent.extra.alarm.HOUR".to_string(), IntentExtra::Int(7));
        let intent = IntentDescriptor {
            action: "android.intent.action.SEND".into(),
            data: None,
            mime_type: Some("text/plain".into()),
            extras,
        };
        assert_eq!(
            intent_args(&intent),
            vec![
                "am", "start", "-a", "android.intent.action.SEND", "-t", "text/plain",
                "--es", "android.intent.extra.TEXT", r"'it'\''s late'",
                "--ei", "android.intent.extra.alarm.HOUR", "7",
            ]
        );
    }
}
