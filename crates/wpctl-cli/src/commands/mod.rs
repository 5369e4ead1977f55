//! Command implementations.

mod config;
mod control;
mod history;
mod status;
mod watch;

pub use config::cmd_config;
pub use control::{cmd_control, command_for};
pub use history::cmd_history;
pub use status::cmd_status;
pub use watch::cmd_watch;
