//! Concrete collaborators used by the `droidclaw` binary.

pub mod adb;
pub mod console;
