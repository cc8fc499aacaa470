use anyhow::{Result, bail};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Validating,
    Aborted,
    Connected,
    Writing,
    Committed,
    RolledBack,
    Failed,
}

impl RunState {
    pub fn as_str(self) -> &'static str {
        match self {
            RunState::Validating => "validating",
            RunState::Aborted => "aborted",
            RunState::Connected => "connected",
            RunState::Writing => "writing",
            RunState::Committed => "committed",
            RunState::RolledBack => "rolled_back",
            RunState::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunState::Aborted | RunState::Committed | RunState::RolledBack | RunState::Failed
        )
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn validate_transition(from: RunState, to: RunState, commit: bool) -> Result<()> {
    if from.is_terminal() {
        bail!("invalid transition: run already terminal ({from})")
    }
    let allowed = match (from, to) {
        (RunState::Validating, RunState::Aborted) => true,
        (RunState::Validating, RunState::Connected) => true,
        (RunState::Connected, RunState::Aborted) => true,
        (RunState::Connected, RunState::Writing) => true,
        (RunState::Connected, RunState::Failed) => true,
        (RunState::Writing, RunState::Committed) => commit,
        (RunState::Writing, RunState::RolledBack) => !commit,
        (RunState::Writing, RunState::Failed) => true,
        _ => false,
    };
    if !allowed {
        bail!("invalid transition: {from} -> {to} (commit={commit})")
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_abort_happens_before_connecting() {
        assert!(validate_transition(RunState::Validating, RunState::Aborted, true).is_ok());
        assert!(validate_transition(RunState::Validating, RunState::Writing, true).is_err());
    }

    #[test]
    fn commit_flag_decides_the_writing_exit() {
        assert!(validate_transition(RunState::Writing, RunState::Committed, true).is_ok());
        assert!(validate_transition(RunState::Writing, RunState::RolledBack, true).is_err());
        assert!(validate_transition(RunState::Writing, RunState::RolledBack, false).is_ok());
        let err = validate_transition(RunState::Writing, RunState::Committed, false).unwrap_err();
        assert!(format!("{err}").contains("writing -> committed"));
    }

    #[test]
    fn terminal_states_are_final() {
        let err = validate_transition(RunState::Committed, RunState::Failed, true).unwrap_err();
        assert!(format!("{err}").contains("already terminal"));
    }
}
