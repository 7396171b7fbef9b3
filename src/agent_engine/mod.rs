pub mod conversation;
pub mod engine;
pub mod event_bus;
pub mod history;
pub mod loop_control;
pub mod prompt;
pub mod state;
