use slb_common::RiskTier;
use slb_normalizer::NormalizedCommand;

use crate::engine::PatternEngine;

/// Result of classifying one command (§4.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifyResult {
    pub tier: RiskTier,
    pub matched_pattern: Option<String>,
    pub min_approvals: u32,
    pub needs_approval: bool,
    pub is_safe: bool,
    pub matched_segments: Vec<String>,
    pub parse_error: bool,
}

/// A segment's raw classification before the parse-error upgrade is applied.
enum RawClass {
    Matched(RiskTier, String),
    Unmatched,
}

/// Precedence order for single-segment lookup: safe first, then critical,
/// then dangerous, then caution.
const PRECEDENCE: [RiskTier; 4] = [
    RiskTier::Safe,
    RiskTier::Critical,
    RiskTier::Dangerous,
    RiskTier::Caution,
];

fn classify_raw(engine: &PatternEngine, segment: &str) -> RawClass {
    for tier in PRECEDENCE {
        if let Some(&idx) = engine.matches(tier, segment).first() {
            let desc = engine
                .description_at(tier, idx)
                .unwrap_or_else(|| segment.to_string());
            return RawClass::Matched(tier, desc);
        }
    }

    match fallback_sql_detector(segment) {
        Some((tier, desc)) => RawClass::Matched(tier, desc),
        None => RawClass::Unmatched,
    }
}

/// `DELETE FROM` without `WHERE` is critical; with `WHERE` is dangerous.
/// Only consulted when no tier pattern matched.
fn fallback_sql_detector(segment: &str) -> Option<(RiskTier, String)> {
    let lower = segment.to_ascii_lowercase();
    if !lower.contains("delete from") {
        return None;
    }
    if lower.contains("where") {
        Some((RiskTier::Dangerous, "DELETE FROM with WHERE clause".to_string()))
    } else {
        Some((RiskTier::Critical, "DELETE FROM without WHERE clause".to_string()))
    }
}

/// Strip an `xargs` prefix (and its flags) so the wrapped command is what
/// gets classified, e.g. `xargs -I{} rm {}` classifies `rm {}`.
fn xargs_inner(segment: &str) -> &str {
    let mut rest = match segment.trim_start().strip_prefix("xargs") {
        Some(r) => r,
        None => return segment,
    };
    loop {
        rest = rest.trim_start();
        match rest.split_whitespace().next() {
            Some(tok) if tok.starts_with('-') => rest = &rest[tok.len()..],
            _ => break,
        }
    }
    let rest = rest.trim_start();
    if rest.is_empty() { segment } else { rest }
}

/// Classify a normalized command (§4.2). Compound commands take the highest
/// tier observed across segments, under `critical > dangerous > caution >
/// safe`; the parse-error upgrade (§4.2) is then applied once, overall.
#[must_use]
pub fn classify(engine: &PatternEngine, normalized: &NormalizedCommand) -> ClassifyResult {
    let mut matched_segments = Vec::new();
    let mut best: Option<(RiskTier, String)> = None;
    let mut any_matched = false;

    let segments: Vec<&str> = if normalized.segments.is_empty() {
        vec![normalized.primary.as_str()]
    } else {
        normalized.segments.iter().map(String::as_str).collect()
    };

    for segment in &segments {
        let target = xargs_inner(segment);
        match classify_raw(engine, target) {
            RawClass::Matched(tier, desc) => {
                any_matched = true;
                matched_segments.push((*segment).to_string());
                let better = match &best {
                    Some((best_tier, _)) => tier > *best_tier,
                    None => true,
                };
                if better {
                    best = Some((tier, desc));
                }
            },
            RawClass::Unmatched => {},
        }
    }

    let (mut tier, mut matched_pattern) = match &best {
        Some((tier, desc)) => (*tier, Some(desc.clone())),
        None => (RiskTier::Safe, None),
    };

    if normalized.parse_error {
        if any_matched {
            tier = tier.upgrade();
        } else {
            tier = RiskTier::Caution;
            matched_pattern = Some("parse_error".to_string());
        }
    }

    let needs_approval = tier != RiskTier::Safe;
    ClassifyResult {
        tier,
        matched_pattern,
        min_approvals: tier.base_min_approvals(),
        needs_approval,
        is_safe: tier == RiskTier::Safe,
        matched_segments,
        parse_error: normalized.parse_error,
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use slb_normalizer::normalize;

    use super::*;
    use crate::engine::PatternEngine;

    fn engine() -> PatternEngine {
        PatternEngine::new().unwrap()
    }

    #[test]
    fn s1_force_with_lease_is_dangerous() {
        let engine = engine();
        let n = normalize("git push --force-with-lease origin main", None);
        let r = classify(&engine, &n);
        assert_eq!(r.tier, RiskTier::Dangerous);
        assert_eq!(r.min_approvals, 1);
        assert!(r.needs_approval);
    }

    #[test]
    fn s2_quoted_delete_is_critical() {
        let engine = engine();
        let n = normalize("psql -c 'DELETE FROM users;'", None);
        let r = classify(&engine, &n);
        assert_eq!(r.tier, RiskTier::Critical);
        assert!(r.matched_pattern.unwrap().to_uppercase().contains("DELETE"));
        assert_eq!(r.min_approvals, 2);
    }

    #[test]
    fn s3_compound_takes_max_tier() {
        let engine = engine();
        let n = normalize("ls && rm -rf /etc", None);
        let r = classify(&engine, &n);
        assert_eq!(r.tier, RiskTier::Critical);
    }

    #[test]
    fn precedence_safe_beats_everything() {
        let engine = engine();
        let n = normalize("git stash", None);
        let r = classify(&engine, &n);
        assert!(r.is_safe);
        assert!(!r.needs_approval);
    }

    #[test]
    fn unmatched_defaults_to_safe() {
        let engine = engine();
        let n = normalize("whoami", None);
        let r = classify(&engine, &n);
        assert_eq!(r.tier, RiskTier::Safe);
    }

    #[test]
    fn parse_error_upgrades_unmatched_to_caution() {
        let engine = engine();
        let n = normalize("whoami 'unterminated", None);
        assert!(n.parse_error);
        let r = classify(&engine, &n);
        assert_eq!(r.tier, RiskTier::Caution);
        assert_eq!(r.matched_pattern.as_deref(), Some("parse_error"));
        assert!(r.needs_approval);
    }

    #[test]
    fn parse_error_upgrades_matched_tier_by_one_step() {
        let engine = engine();
        let n = normalize("rm file.txt 'unterminated", None);
        assert!(n.parse_error);
        let r = classify(&engine, &n);
        // "rm file.txt" alone matches caution (`^rm [^-]`); upgraded once -> dangerous.
        assert_eq!(r.tier, RiskTier::Dangerous);
    }

    #[test]
    fn xargs_classifies_wrapped_command() {
        let engine = engine();
        let n = normalize("find . -name '*.tmp' | xargs rm -rf", None);
        let r = classify(&engine, &n);
        assert_eq!(r.tier, RiskTier::Dangerous);
    }
}
