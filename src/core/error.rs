use thiserror::Error;

/// Classification of every failure the admin layer can report.
///
/// Callers branch on the kind, never on the message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Argument,
    Metadata,
    Logic,
    Runtime,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdminError {
    /// Malformed, missing or empty parameter, invalid option key or value.
    #[error("{0}")]
    Argument(String),

    /// The metadata catalog is unreachable or an update failed.
    #[error("{0}")]
    Metadata(String),

    /// The operation is not valid for the current topology.
    #[error("{0}")]
    Logic(String),

    /// Unreachable instance, provisioning failure, split-brain, quorum loss.
    #[error("{0}")]
    Runtime(String),
}

impl AdminError {
    pub fn argument(msg: impl Into<String>) -> Self {
        Self::Argument(msg.into())
    }

    pub fn metadata(msg: impl Into<String>) -> Self {
        Self::Metadata(msg.into())
    }

    pub fn logic(msg: impl Into<String>) -> Self {
        Self::Logic(msg.into())
    }

    pub fn runtime(msg: impl Into<String>) -> Self {
        Self::Runtime(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Argument(_) => ErrorKind::Argument,
            Self::Metadata(_) => ErrorKind::Metadata,
            Self::Logic(_) => ErrorKind::Logic,
            Self::Runtime(_) => ErrorKind::Runtime,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Argument(m) | Self::Metadata(m) | Self::Logic(m) | Self::Runtime(m) => m,
        }
    }

    /// Prefixes the message with the public name of the failing operation,
    /// e.g. `Cluster.addInstance: ...`. The kind is preserved and an already
    /// prefixed message is left untouched.
    pub fn in_function(self, function: &str) -> Self {
        let prefix = format!("{}: ", function);
        if self.message().starts_with(&prefix) {
            return self;
        }
        let wrap = |m: String| format!("{}{}", prefix, m);
        match self {
            Self::Argument(m) => Self::Argument(wrap(m)),
            Self::Metadata(m) => Self::Metadata(wrap(m)),
            Self::Logic(m) => Self::Logic(wrap(m)),
            Self::Runtime(m) => Self::Runtime(wrap(m)),
        }
    }
}

pub type Result<T> = std::result::Result<T, AdminError>;

impl<T> From<std::sync::PoisonError<T>> for AdminError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::Metadata(format!("Metadata lock poisoned: {}", err))
    }
}

impl From<serde_json::Error> for AdminError {
    fn from(err: serde_json::Error) -> Self {
        Self::Argument(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_function_keeps_kind() {
        let err = AdminError::logic("ReplicaSet not initialized.").in_function("Cluster.rescan");
        assert_eq!(err.kind(), ErrorKind::Logic);
        assert_eq!(err.to_string(), "Cluster.rescan: ReplicaSet not initialized.");
    }

    #[test]
    fn test_in_function_is_idempotent() {
        let err = AdminError::runtime("boom")
            .in_function("Cluster.status")
            .in_function("Cluster.status");
        assert_eq!(err.message(), "Cluster.status: boom");
    }
}
