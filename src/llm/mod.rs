pub mod orchestrator;
pub mod provider;
pub mod providers;
pub mod registry;
pub mod retry;
pub mod types;
