//! adjoin directory capability.
//!
//! Every interaction with the directory service and the Kerberos tooling
//! goes through [`DirectoryClient`]. [`SambaDirectory`] drives the real
//! command-line tools; [`ScriptedDirectory`] replays scripted responses so
//! the lifecycle can be exercised without a domain controller.

mod client;
mod command;
pub mod keytab;
pub mod principal;
mod samba;
pub mod scripted;

pub use client::{DirectoryClient, JoinResult};
pub use principal::ServicePrincipalSet;
pub use samba::SambaDirectory;
pub use scripted::{Op, Script, ScriptedDirectory};

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("{tool} could not be started: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} failed ({}): {detail}", describe_exit(.code))]
    Command {
        tool: String,
        code: Option<i32>,
        detail: String,
    },

    #[error("unexpected response: {0}")]
    Unexpected(String),
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("exit {c}"),
        None => "terminated by signal".to_string(),
    }
}
