use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::DroidClawResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledApp {
    pub label: String,
    pub package: String,
}

#[async_trait]
pub trait AppCatalog: Send + Sync {
    async fn installed_apps(&self) -> DroidClawResult<Vec<InstalledApp>>;
}

/// Exact case-insensitive label match first, then a substring of the label or
/// the package name. Ties keep catalog order.
pub fn resolve_package<'a>(apps: &'a [InstalledApp], name: &str) -> Option<&'a InstalledApp> {
    let wanted = name.trim().to_lowercase();
    if wanted.is_empty() {
        return None;
    }
    apps.iter()
        .find(|app| app.label.to_lowercase() == wanted)
        .or_else(|| {
            apps.iter().find(|app| {
                app.label.to_lowercase().contains(&wanted)
                    || app.package.to_lowercase().contains(&wanted)
            })
        })
}
