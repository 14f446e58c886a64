//! Operator confirmation for dangerous operations.

/// Asks the operator to confirm an action.
pub trait Prompt: Send + Sync {
    /// Shows `message` and returns whether the operator accepted.
    fn confirm(&self, message: &str) -> bool;
}

/// Prompt that always gives the same answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedAnswer(pub bool);

impl Prompt for FixedAnswer {
    fn confirm(&self, _message: &str) -> bool {
        self.0
    }
}

/// Result of an operation that may be declined at the confirmation prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Done(String),
    Cancelled,
}

impl Outcome {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Done(message) => Some(message),
            Self::Cancelled => None,
        }
    }
}

pub(crate) fn remove_instance_warning(address: &str, force: bool) -> String {
    let mut text = format!(
        "The instance '{}' will be removed from the InnoDB cluster. Depending on the instance \
         being the Seed or not, the Metadata session might become invalid. If so, please start \
         a new session to the Metadata Storage R/W instance.",
        address
    );
    if force {
        text.push_str(
            "\nWARNING: with force enabled the instance is removed from the Metadata even if it \
             cannot leave the group. An instance that is still running will keep replicating \
             with a group that no longer manages it.",
        );
    }
    text
}

pub(crate) fn dissolve_warning(cluster: &str, force: bool) -> String {
    let mut text = format!(
        "The cluster '{}' will be dissolved: every instance leaves the group and the cluster \
         Metadata is removed. This operation cannot be reverted.",
        cluster
    );
    if force {
        text.push_str(
            "\nWARNING: with force enabled instances that fail to leave the group are ignored \
             and may keep running as members of a group without Metadata.",
        );
    }
    text
}

pub(crate) fn force_quorum_warning(address: &str) -> String {
    format!(
        "WARNING: Restoring the quorum using the partition of '{}' is a dangerous operation. \
         If another partition of the same group is still operating elsewhere, this creates a \
         split-brain with two groups accepting writes. Only proceed if every instance outside \
         this partition is known to be stopped.",
        address
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_answer() {
        assert!(FixedAnswer(true).confirm("?"));
        assert!(!FixedAnswer(false).confirm("?"));
    }

    #[test]
    fn test_warnings_mention_risk() {
        assert!(force_quorum_warning("a:3306").contains("split-brain"));
        assert!(remove_instance_warning("a:3306", true).contains("WARNING"));
        assert!(!remove_instance_warning("a:3306", false).contains("WARNING"));
        assert!(dissolve_warning("c1", true).contains("WARNING"));
    }
}
