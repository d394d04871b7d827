//! Formatted output helpers for CLI commands.

use stackline_model::resource::ResourceKind;
use stackline_runtime::task::TaskStatus;

const DIGEST_PREFIX: &str = "sha256:";
const SHORT_DIGEST_LEN: usize = 12;

/// A horizontal rule of `width` box-drawing characters.
#[must_use]
pub fn rule(width: usize) -> String {
    "\u{2550}".repeat(width)
}

/// Shortens a `sha256:` digest to its first hex characters.
#[must_use]
pub fn short_digest(digest: &str) -> &str {
    let hex = digest.strip_prefix(DIGEST_PREFIX).unwrap_or(digest);
    hex.get(..SHORT_DIGEST_LEN).unwrap_or(hex)
}

/// Compact label for a resource kind.
#[must_use]
pub const fn kind_label(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Registry => "registry",
        ResourceKind::Role => "role",
        ResourceKind::LogSink => "log-group",
        ResourceKind::TaskSpec => "task-def",
        ResourceKind::Service => "service",
    }
}

/// One-line task status.
#[must_use]
pub fn task_status(status: &TaskStatus) -> String {
    match status {
        TaskStatus::Provisioning => "PROVISIONING".into(),
        TaskStatus::Running => "RUNNING".into(),
        TaskStatus::Stopped { reason } => format!("STOPPED ({reason})"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_has_requested_width() {
        assert_eq!(rule(3).chars().count(), 3);
    }

    #[test]
    fn short_digest_strips_prefix() {
        assert_eq!(short_digest("sha256:0123456789abcdef"), "0123456789ab");
    }

    #[test]
    fn short_digest_keeps_short_input() {
        assert_eq!(short_digest("abc"), "abc");
    }

    #[test]
    fn task_status_includes_reason() {
        let status = TaskStatus::Stopped {
            reason: "failed health check".into(),
        };
        assert_eq!(task_status(&status), "STOPPED (failed health check)");
    }
}
