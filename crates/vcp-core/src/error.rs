use std::fmt;

/// Machine-readable error codes shared by every vcp error type.
///
/// Correctness failures (`E1xxx`, `E2xxx`) are never retried automatically.
/// Availability failures (`E4xxx`) are retried with bounded attempts and always
/// escalate to an operator-visible state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InvalidValueType,
    UnsupportedAlgorithm,
    ConfigParseError,
    ChainBroken,
    HashMismatch,
    IndexOutOfRange,
    SignFailure,
    AnchorFailure,
    AnchorTimeout,
    AllTargetsFailed,
    RetryExhausted,
    NoAnchorTargets,
    StateCorrupt,
    StateWriteFailed,
    LockContention,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::InvalidValueType => "E1001",
            Self::UnsupportedAlgorithm => "E1002",
            Self::ConfigParseError => "E1003",
            Self::ChainBroken => "E2001",
            Self::HashMismatch => "E2002",
            Self::IndexOutOfRange => "E2003",
            Self::SignFailure => "E2004",
            Self::AnchorFailure => "E4001",
            Self::AnchorTimeout => "E4002",
            Self::AllTargetsFailed => "E4003",
            Self::RetryExhausted => "E4004",
            Self::NoAnchorTargets => "E4005",
            Self::StateCorrupt => "E5001",
            Self::StateWriteFailed => "E5002",
            Self::LockContention => "E5003",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::InvalidValueType => "Value cannot be canonicalized",
            Self::UnsupportedAlgorithm => "Unsupported hash or signature algorithm",
            Self::ConfigParseError => "Config file parse error",
            Self::ChainBroken => "Hash chain broken",
            Self::HashMismatch => "Stored event hash does not match content",
            Self::IndexOutOfRange => "Leaf index not present in batch",
            Self::SignFailure => "Event signing failed",
            Self::AnchorFailure => "Anchor target failed",
            Self::AnchorTimeout => "Anchor target timed out",
            Self::AllTargetsFailed => "All anchor targets failed",
            Self::RetryExhausted => "Anchor retries exhausted",
            Self::NoAnchorTargets => "No anchor targets configured",
            Self::StateCorrupt => "Persisted anchor state is corrupt",
            Self::StateWriteFailed => "Persisted anchor state write failed",
            Self::LockContention => "Lock contention",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::InvalidValueType => {
                Some("Model financial values as decimal strings, never as floating point.")
            }
            Self::UnsupportedAlgorithm => {
                Some("Use one of the registered algorithms (sha256, blake3).")
            }
            Self::ConfigParseError => Some("Fix syntax in .vcp/config.toml and retry."),
            Self::ChainBroken | Self::HashMismatch => {
                Some("Treat as a tamper alert: quarantine the stream and investigate upstream.")
            }
            Self::IndexOutOfRange => Some("Request the proof from the batch that holds the leaf."),
            Self::SignFailure => Some("Check signer availability and key configuration."),
            Self::AnchorFailure | Self::AnchorTimeout => None,
            Self::AllTargetsFailed => {
                Some("The root is queued for retry; check anchor target availability.")
            }
            Self::RetryExhausted => {
                Some("Anchor the listed root manually and acknowledge it in the anchor state.")
            }
            Self::NoAnchorTargets => Some("Add at least one [[anchor.targets]] entry."),
            Self::StateCorrupt => Some("Restore the anchor state file from backup."),
            Self::StateWriteFailed => Some("Check disk space and write permissions."),
            Self::LockContention => Some("Retry after the other scheduler releases its lock."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }

    /// Whether this failure is an availability problem that may be retried.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::AnchorFailure
                | Self::AnchorTimeout
                | Self::AllTargetsFailed
                | Self::LockContention
                | Self::StateWriteFailed
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::ErrorCode;
    use std::collections::HashSet;

    const ALL: [ErrorCode; 16] = [
        ErrorCode::InvalidValueType,
        ErrorCode::UnsupportedAlgorithm,
        ErrorCode::ConfigParseError,
        ErrorCode::ChainBroken,
        ErrorCode::HashMismatch,
        ErrorCode::IndexOutOfRange,
        ErrorCode::SignFailure,
        ErrorCode::AnchorFailure,
        ErrorCode::AnchorTimeout,
        ErrorCode::AllTargetsFailed,
        ErrorCode::RetryExhausted,
        ErrorCode::NoAnchorTargets,
        ErrorCode::StateCorrupt,
        ErrorCode::StateWriteFailed,
        ErrorCode::LockContention,
        ErrorCode::InternalUnexpected,
    ];

    #[test]
    fn all_codes_are_unique() {
        let mut seen = HashSet::new();
        for code in ALL {
            assert!(seen.insert(code.code()), "duplicate code {}", code.code());
        }
    }

    #[test]
    fn code_format_is_machine_friendly() {
        for code in ALL {
            let s = code.code();
            assert_eq!(s.len(), 5);
            assert!(s.starts_with('E'));
            assert!(s.chars().skip(1).all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn correctness_errors_are_not_retryable() {
        assert!(!ErrorCode::InvalidValueType.is_retryable());
        assert!(!ErrorCode::ChainBroken.is_retryable());
        assert!(!ErrorCode::HashMismatch.is_retryable());
        assert!(ErrorCode::AllTargetsFailed.is_retryable());
        assert!(!ErrorCode::RetryExhausted.is_retryable());
    }
}
