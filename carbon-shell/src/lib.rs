//! The shell-exec bridge: a daemon listening on a well-known RID that runs
//! commands embedded in remote events and replies with their exit status.

pub mod cmdline;
pub mod server;

pub use server::{ShellExecuteServer, EVENT_SHELL_EXECUTE, EVENT_SHELL_EXECUTE_REPLY, SHELL_EXECUTE_RID};
