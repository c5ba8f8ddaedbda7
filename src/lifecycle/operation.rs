//! Lifecycle rules for each operation: accepted starting states, the status
//! held while running, the status reached on success, and the tool arguments.

use std::path::Path;

use crate::process::Invocation;
use crate::session::{Operation, SessionStatus, PLAN_FILE};

/// Environment every tool invocation receives.
pub const TOOL_ENV: [(&str, &str); 2] = [("TF_IN_AUTOMATION", "1"), ("TF_INPUT", "0")];

impl Operation {
    /// Status the session holds while the operation runs.
    #[must_use]
    pub const fn running_status(self) -> SessionStatus {
        match self {
            Self::Init => SessionStatus::Initializing,
            Self::Plan => SessionStatus::Planning,
            Self::Apply => SessionStatus::Applying,
            Self::Destroy => SessionStatus::Destroying,
        }
    }

    /// Status the session reaches when the operation succeeds.
    #[must_use]
    pub const fn success_status(self) -> SessionStatus {
        match self {
            Self::Init => SessionStatus::Initialized,
            Self::Plan => SessionStatus::Planned,
            Self::Apply => SessionStatus::Applied,
            Self::Destroy => SessionStatus::Destroyed,
        }
    }

    /// Returns true if the operation may start from `status`.
    ///
    /// Only the in-memory half of the precondition; artifact checks on disk
    /// happen in the controller. `destroy` is gated on disk alone.
    #[must_use]
    pub const fn allowed_from(self, status: SessionStatus) -> bool {
        match self {
            Self::Init => matches!(status, SessionStatus::Idle | SessionStatus::Error),
            Self::Plan => matches!(
                status,
                SessionStatus::Initialized | SessionStatus::Planned | SessionStatus::Applied
            ),
            Self::Apply => matches!(status, SessionStatus::Planned),
            Self::Destroy => !status.is_in_progress(),
        }
    }

    /// Human-readable list of accepted starting states.
    #[must_use]
    pub const fn expected_states(self) -> &'static str {
        match self {
            Self::Init => "idle or error",
            Self::Plan => "initialized, planned or applied",
            Self::Apply => "planned",
            Self::Destroy => "any settled state",
        }
    }

    /// Arguments passed to the tool.
    #[must_use]
    pub const fn tool_args(self) -> &'static [&'static str] {
        match self {
            Self::Init => &["init", "-input=false", "-no-color"],
            Self::Plan => &["plan", "-input=false", "-no-color", "-out=tfplan"],
            Self::Apply => &["apply", "-input=false", "-no-color", "-auto-approve", PLAN_FILE],
            Self::Destroy => &["destroy", "-input=false", "-no-color", "-auto-approve"],
        }
    }

    /// Builds the tool invocation for a working directory.
    #[must_use]
    pub fn invocation(self, tool: &str, working_dir: &Path) -> Invocation {
        TOOL_ENV
            .iter()
            .fold(
                Invocation::new(tool, working_dir).args(self.tool_args().iter().copied()),
                |invocation, (key, value)| invocation.env(*key, *value),
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        for op in Operation::ALL {
            assert!(op.running_status().is_in_progress());
            assert!(!op.success_status().is_in_progress());
        }
        assert_eq!(Operation::Plan.success_status(), SessionStatus::Planned);
    }

    #[test]
    fn test_allowed_from() {
        assert!(Operation::Init.allowed_from(SessionStatus::Idle));
        assert!(Operation::Init.allowed_from(SessionStatus::Error));
        assert!(!Operation::Init.allowed_from(SessionStatus::Applied));

        assert!(Operation::Plan.allowed_from(SessionStatus::Initialized));
        assert!(Operation::Plan.allowed_from(SessionStatus::Applied));
        assert!(!Operation::Plan.allowed_from(SessionStatus::Idle));

        assert!(Operation::Apply.allowed_from(SessionStatus::Planned));
        assert!(!Operation::Apply.allowed_from(SessionStatus::Initialized));

        assert!(Operation::Destroy.allowed_from(SessionStatus::Idle));
        assert!(Operation::Destroy.allowed_from(SessionStatus::Error));
        assert!(!Operation::Destroy.allowed_from(SessionStatus::Applying));
    }

    #[test]
    fn test_invocation() {
        let invocation = Operation::Apply.invocation("terraform", Path::new("/work/s1"));
        assert_eq!(
            invocation.command_line(),
            "terraform apply -input=false -no-color -auto-approve tfplan"
        );
        assert!(invocation
            .env
            .contains(&(String::from("TF_IN_AUTOMATION"), String::from("1"))));
        assert!(invocation
            .env
            .contains(&(String::from("TF_INPUT"), String::from("0"))));
    }
}
