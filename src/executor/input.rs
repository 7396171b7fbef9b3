use async_trait::async_trait;

use crate::errors::DroidClawResult;
use crate::executor::intents::IntentDescriptor;

/// Input-injection collaborator. Coordinates are device pixels.
#[async_trait]
pub trait Finger: Send + Sync {
    async fn tap(&self, x: i32, y: i32) -> DroidClawResult<()>;

    async fn long_press(&self, x: i32, y: i32) -> DroidClawResult<()>;

    /// Types into whatever field currently holds focus.
    async fn type_text(&self, text: &str) -> DroidClawResult<()>;

    async fn press_enter(&self) -> DroidClawResult<()>;

    async fn scroll_up(&self, amount: u32) -> DroidClawResult<()>;

    async fn scroll_down(&self, amount: u32) -> DroidClawResult<()>;

    async fn back(&self) -> DroidClawResult<()>;

    async fn home(&self) -> DroidClawResult<()>;

    async fn switch_app(&self) -> DroidClawResult<()>;

    /// `Ok(false)` when the package could not be launched.
    async fn open_app(&self, package: &str) -> DroidClawResult<bool>;

    /// `Ok(false)` when no activity handled the intent.
    async fn launch_intent(&self, intent: &IntentDescriptor) -> DroidClawResult<bool>;
}
