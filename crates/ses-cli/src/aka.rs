//! EAP-AKA responder backed by an external program.
//!
//! The program receives the base64 challenge as its only argument. Its
//! trimmed stdout is the challenge response. Output prefixed with `AUTS:`
//! is a SIM re-synchronisation request. A non-zero exit means the SIM
//! could not be queried.

use std::path::PathBuf;
use std::process::Command;

use ses_client::{AkaResponse, EapAkaResponder};

const AUTS_PREFIX: &str = "AUTS:";

#[derive(Debug, Clone)]
pub struct CommandAkaResponder {
    program: PathBuf,
}

impl CommandAkaResponder {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl EapAkaResponder for CommandAkaResponder {
    fn compute(&self, challenge: &str) -> Option<AkaResponse> {
        let output = match Command::new(&self.program).arg(challenge).output() {
            Ok(output) => output,
            Err(e) => {
                tracing::error!(program = %self.program.display(), error = %e, "failed to run AKA command");
                return None;
            }
        };
        if !output.status.success() {
            tracing::warn!(
                program = %self.program.display(),
                status = %output.status,
                "AKA command failed"
            );
            return None;
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stdout = stdout.trim();
        if let Some(auts) = stdout.strip_prefix(AUTS_PREFIX) {
            return Some(AkaResponse::synchronization_failure(auts.trim()));
        }
        if stdout.is_empty() {
            return Some(AkaResponse::default());
        }
        Some(AkaResponse::challenge(stdout))
    }
}
