pub mod actions;
pub mod apps;
pub mod dispatcher;
pub mod files;
pub mod input;
pub mod intents;
pub mod registry;
pub mod safety;
pub mod text_input;
pub mod user;
