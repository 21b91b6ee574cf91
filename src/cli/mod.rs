pub mod command;
pub mod handlers;

pub use command::{Command, Commands};
pub use handlers::{Context, run};
