//! Rollback kind detection (§4.7): inspects the normalized command's first
//! tokens to decide whether a snapshot can be captured at all.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackKind {
    Filesystem,
    Git,
    Kubernetes,
}

/// Detect the rollback kind from whitespace tokens of the command to be
/// executed, or `None` if this command has no rollback story.
#[must_use]
pub fn detect_kind(tokens: &[&str]) -> Option<RollbackKind> {
    match tokens {
        ["kubectl", "delete", ..] => Some(RollbackKind::Kubernetes),
        ["git", second, ..] if matches!(*second, "reset" | "checkout" | "clean") => Some(RollbackKind::Git),
        ["rm", rest @ ..] if rest.iter().any(|t| !t.starts_with('-')) => Some(RollbackKind::Filesystem),
        _ => None,
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kubectl_delete_is_kubernetes() {
        assert_eq!(detect_kind(&["kubectl", "delete", "pod", "x"]), Some(RollbackKind::Kubernetes));
    }

    #[test]
    fn git_reset_is_git() {
        assert_eq!(detect_kind(&["git", "reset", "--hard"]), Some(RollbackKind::Git));
    }

    #[test]
    fn git_push_has_no_rollback() {
        assert_eq!(detect_kind(&["git", "push", "origin", "main"]), None);
    }

    #[test]
    fn rm_with_target_is_filesystem() {
        assert_eq!(detect_kind(&["rm", "-rf", "/tmp/x"]), Some(RollbackKind::Filesystem));
    }

    #[test]
    fn rm_with_only_flags_has_no_rollback() {
        assert_eq!(detect_kind(&["rm", "-rf"]), None);
    }

    #[test]
    fn unrelated_command_has_no_rollback() {
        assert_eq!(detect_kind(&["echo", "hi"]), None);
    }
}
