//! Login sessions as reported by the session manager.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::process::Command;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Session {
    /// Session handle passed back to `unlock`.
    #[serde(rename = "session")]
    pub id: String,
    pub user: String,
}

pub trait SessionProvider {
    fn active_sessions(&self) -> Result<Vec<Session>>;
    fn unlock(&self, session_id: &str) -> Result<()>;
}

/// systemd-logind through the `loginctl` client.
#[derive(Debug, Default, Clone, Copy)]
pub struct Loginctl;

impl Loginctl {
    fn parse(stdout: &[u8]) -> Result<Vec<Session>> {
        serde_json::from_slice(stdout)
            .map_err(|e| Error::Session(format!("unparsable loginctl output: {e}")))
    }

    fn run(args: &[&str]) -> Result<Vec<u8>> {
        let output = Command::new("loginctl")
            .args(args)
            .output()
            .map_err(|e| Error::Session(format!("run loginctl: {e}")))?;
        if !output.status.success() {
            return Err(Error::Session(format!(
                "loginctl {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(output.stdout)
    }
}

impl SessionProvider for Loginctl {
    fn active_sessions(&self) -> Result<Vec<Session>> {
        Self::parse(&Self::run(&["list-sessions", "--output=json"])?)
    }

    fn unlock(&self, session_id: &str) -> Result<()> {
        Self::run(&["unlock-session", session_id]).map(|_| ())
    }
}
