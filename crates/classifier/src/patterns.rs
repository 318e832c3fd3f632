//! Built-in pattern set (§4.2). All patterns are matched case-insensitively.
//!
//! This is the seed data the classifier is constructed with; it is not
//! loaded from disk, so classification stays deterministic across processes
//! without any IO at classify time (Testable Property 1).

use slb_common::RiskTier;

/// `(pattern, description)` pairs for one tier.
pub type PatternDef = (&'static str, &'static str);

pub const SAFE: &[PatternDef] = &[
    (r"^rm .*\.log$", "removing a log file"),
    (r"^kubectl delete pod ", "deleting a kubernetes pod"),
    (r"^npm cache clean", "clearing the npm cache"),
    (r"^git stash$", "stashing uncommitted changes"),
    (r"^git status", "inspecting repo status"),
    (r"^git log", "inspecting commit history"),
    (r"^git diff", "inspecting a diff"),
    (r"^ls(\s|$)", "listing a directory"),
    (r"^cat\s", "reading a file"),
    (r"^echo\s", "printing text"),
    (r"^pwd$", "printing the working directory"),
];

pub const CRITICAL: &[PatternDef] = &[
    (
        r"^rm (-[rf]+ )+/(etc|usr|var|boot|home|root|bin|sbin|lib)",
        "recursive removal of a core system directory",
    ),
    (r"(?i)\bDROP\s+DATABASE\b", "dropping a database"),
    (r"(?i)\bTRUNCATE\s+TABLE\b", "truncating a table"),
    (
        r"(?i)\bDELETE\s+FROM\s+\w+\s*(;|$|--|/\*)",
        "unconditional DELETE FROM",
    ),
    (
        r"^terraform destroy(\s*$|\s+-auto-approve|\s+[^-])",
        "destroying terraform-managed infrastructure",
    ),
    (r"^git push .*--force(\s|$)", "force-pushing to a remote"),
    (r"\bdd\b.*of=/dev/", "writing raw bytes to a device"),
    (r"^mkfs", "formatting a filesystem"),
    (r"(?i)\bDROP\s+SCHEMA\b", "dropping a schema"),
];

pub const DANGEROUS: &[PatternDef] = &[
    (r"^rm -rf", "recursive forced removal"),
    (r"^git reset --hard", "discarding uncommitted work"),
    (r"^kubectl delete", "deleting a kubernetes resource"),
    (r"^helm uninstall", "uninstalling a helm release"),
    (r"^docker rm", "removing a docker container"),
    (r"(?i)\bDROP\s+TABLE\b", "dropping a table"),
    (r"(?i)\bDELETE\s+FROM\s+.*\bWHERE\b", "conditional DELETE FROM"),
    (r"^chmod -R", "recursively changing permissions"),
    (
        r"^git push --force-with-lease",
        "force-with-lease push to a remote",
    ),
];

pub const CAUTION: &[PatternDef] = &[
    (r"^rm [^-]", "removing a file"),
    (r"^npm uninstall", "uninstalling a package"),
    (r"^git branch -[dD]", "deleting a branch"),
];

#[must_use]
pub fn defs_for(tier: RiskTier) -> &'static [PatternDef] {
    match tier {
        RiskTier::Safe => SAFE,
        RiskTier::Critical => CRITICAL,
        RiskTier::Dangerous => DANGEROUS,
        RiskTier::Caution => CAUTION,
    }
}
