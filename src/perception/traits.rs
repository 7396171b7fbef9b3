use async_trait::async_trait;

/// Screen-reading collaborator.
///
/// Implementations report failures by returning `None` / defaults; perception
/// never aborts a step because the device could not be read.
#[async_trait]
pub trait Eyes: Send + Sync {
    /// Raw hierarchy dump of the current screen, `None` when the reader is unavailable.
    async fn raw_tree(&self) -> Option<String>;

    async fn keyboard_visible(&self) -> bool;

    /// Component name of the foreground activity, empty when unknown.
    async fn foreground_activity(&self) -> String;
}
