//! Schema and reference-integrity checks, applied after each role turn.
//!
//! Validators return an explicit error with a reason and the offending
//! evidence rather than panicking or throwing through the stack. Every
//! reference-integrity message cites the bad ids verbatim so the strict
//! re-prompt can name them.

use std::collections::{BTreeSet, HashSet};

use crate::artifact::{Analysis, ArtifactKind, CourierRow, Critique, Production, Strategy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationReason {
    BadId,
    DuplicateId,
    MissingField,
    UnresolvedRef,
    UndeclaredAsset,
    Insufficient,
    NarrowCoverage,
    OutOfRange,
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{reason:?}: {evidence}")]
pub struct ValidationError {
    pub reason: ValidationReason,
    pub evidence: String,
}

impl ValidationError {
    fn new(reason: ValidationReason, evidence: impl Into<String>) -> Self {
        Self {
            reason,
            evidence: evidence.into(),
        }
    }
}

fn id_matches(id: &str, prefix: char) -> bool {
    let mut chars = id.chars();
    chars.next() == Some(prefix)
        && chars.next() == Some('-')
        && {
            let rest = &id[2..];
            !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit())
        }
}

fn check_unique<'a>(
    ids: impl Iterator<Item = &'a str>,
) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(ValidationError::new(
                ValidationReason::DuplicateId,
                format!("duplicate id {id}"),
            ));
        }
    }
    Ok(())
}

fn unresolved<'a>(
    refs: impl Iterator<Item = &'a str>,
    known: &HashSet<String>,
) -> BTreeSet<String> {
    refs.filter(|r| !known.contains(*r))
        .map(|r| r.to_string())
        .collect()
}

pub fn validate_strategies(items: &[Strategy]) -> Result<(), ValidationError> {
    if items.is_empty() {
        return Err(ValidationError::new(
            ValidationReason::Insufficient,
            "strategist emitted no S entries",
        ));
    }
    check_unique(items.iter().map(|s| s.s_id.as_str()))?;
    for s in items {
        if !id_matches(&s.s_id, 'S') {
            return Err(ValidationError::new(
                ValidationReason::BadId,
                format!("s_id '{}' does not match S-<n>", s.s_id),
            ));
        }
        if s.title.trim().is_empty() || s.audience.trim().is_empty() {
            return Err(ValidationError::new(
                ValidationReason::MissingField,
                format!("{}: title and audience must be non-empty", s.s_id),
            ));
        }
        if s.hooks.is_empty() || s.three_step_plan.is_empty() {
            return Err(ValidationError::new(
                ValidationReason::MissingField,
                format!("{}: hooks and three_step_plan must be non-empty", s.s_id),
            ));
        }
        if s.acceptance_tests.is_empty() {
            return Err(ValidationError::new(
                ValidationReason::Insufficient,
                format!("{}: at least one acceptance test required", s.s_id),
            ));
        }
    }
    Ok(())
}

pub fn validate_analyses(
    items: &[Analysis],
    s_ids: &HashSet<String>,
) -> Result<(), ValidationError> {
    if items.is_empty() {
        return Err(ValidationError::new(
            ValidationReason::Insufficient,
            "analyst emitted no A entries",
        ));
    }
    check_unique(items.iter().map(|a| a.a_id.as_str()))?;
    for a in items {
        if !id_matches(&a.a_id, 'A') {
            return Err(ValidationError::new(
                ValidationReason::BadId,
                format!("a_id '{}' does not match A-<n>", a.a_id),
            ));
        }
        let missing = unresolved(a.s_refs.iter().map(|r| r.as_str()), s_ids);
        if !missing.is_empty() {
            return Err(ValidationError::new(
                ValidationReason::UnresolvedRef,
                format!(
                    "{} references unknown strategy ids: {}",
                    a.a_id,
                    join(&missing)
                ),
            ));
        }
        if a.s_refs.is_empty() {
            return Err(ValidationError::new(
                ValidationReason::MissingField,
                format!("{}: s_refs must name at least one strategy", a.a_id),
            ));
        }
        if a.kpi_table.is_empty() {
            return Err(ValidationError::new(
                ValidationReason::Insufficient,
                format!("{}: kpi_table needs at least one row", a.a_id),
            ));
        }
        for row in &a.kpi_table {
            if row.metric.trim().is_empty() || row.unit.trim().is_empty() {
                return Err(ValidationError::new(
                    ValidationReason::MissingField,
                    format!("{}: KPI rows need metric and unit", a.a_id),
                ));
            }
            if !row.target.is_finite() {
                return Err(ValidationError::new(
                    ValidationReason::OutOfRange,
                    format!("{}: KPI target for '{}' is not numeric", a.a_id, row.metric),
                ));
            }
        }
        if a.falsifications.is_empty() {
            return Err(ValidationError::new(
                ValidationReason::Insufficient,
                format!("{}: at least one falsification required", a.a_id),
            ));
        }
    }
    Ok(())
}

pub fn validate_productions(
    items: &[Production],
    a_ids: &HashSet<String>,
) -> Result<(), ValidationError> {
    if items.is_empty() {
        return Err(ValidationError::new(
            ValidationReason::Insufficient,
            "producer emitted no P entries",
        ));
    }
    check_unique(items.iter().map(|p| p.p_id.as_str()))?;
    for p in items {
        if !id_matches(&p.p_id, 'P') {
            return Err(ValidationError::new(
                ValidationReason::BadId,
                format!("p_id '{}' does not match P-<n>", p.p_id),
            ));
        }
        let missing = unresolved(p.a_refs.iter().map(|r| r.as_str()), a_ids);
        if !missing.is_empty() {
            return Err(ValidationError::new(
                ValidationReason::UnresolvedRef,
                format!(
                    "{} references unknown analysis ids: {}",
                    p.p_id,
                    join(&missing)
                ),
            ));
        }
        if p.body.trim().is_empty() {
            return Err(ValidationError::new(
                ValidationReason::MissingField,
                format!("{}: body must be non-empty", p.p_id),
            ));
        }
    }
    Ok(())
}

/// Courier rows may only schedule assets Producer actually declared.
/// This is enforced against the explicit `producer_assets` list, not
/// whatever happens to be in the registry.
pub fn validate_courier(
    items: &[CourierRow],
    producer_assets: &[String],
) -> Result<(), ValidationError> {
    if items.is_empty() {
        return Err(ValidationError::new(
            ValidationReason::Insufficient,
            "courier emitted no rows",
        ));
    }
    let declared: HashSet<String> = producer_assets.iter().cloned().collect();
    let missing: BTreeSet<String> = items
        .iter()
        .map(|row| row.p_id.as_str())
        .filter(|id| !declared.contains(*id))
        .map(|id| id.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(ValidationError::new(
            ValidationReason::UndeclaredAsset,
            format!("Courier used undeclared assets: {{{}}}", join(&missing)),
        ));
    }
    for row in items {
        if row.day.trim().is_empty()
            || row.channel.trim().is_empty()
            || row.kpi_target.trim().is_empty()
            || row.owner_action.trim().is_empty()
        {
            return Err(ValidationError::new(
                ValidationReason::MissingField,
                format!(
                    "courier row for {} needs day, channel, kpi_target, and owner_action",
                    row.p_id
                ),
            ));
        }
    }
    Ok(())
}

/// Critic references must classify, span at least three kinds, and —
/// for S/A/P ids — resolve against the registry. Day tokens (courier
/// rows carry no ids) and X ids from the same batch only classify.
pub fn validate_critiques(
    items: &[Critique],
    s_ids: &HashSet<String>,
    a_ids: &HashSet<String>,
    p_ids: &HashSet<String>,
) -> Result<(), ValidationError> {
    if items.is_empty() {
        return Err(ValidationError::new(
            ValidationReason::Insufficient,
            "critic emitted no X entries",
        ));
    }
    check_unique(items.iter().map(|x| x.x_id.as_str()))?;
    let mut kinds: HashSet<ArtifactKind> = HashSet::new();
    for x in items {
        if !id_matches(&x.x_id, 'X') {
            return Err(ValidationError::new(
                ValidationReason::BadId,
                format!("x_id '{}' does not match X-<n>", x.x_id),
            ));
        }
        if x.issue.trim().is_empty() || x.fix.trim().is_empty() {
            return Err(ValidationError::new(
                ValidationReason::MissingField,
                format!("{}: issue and fix must be non-empty", x.x_id),
            ));
        }
        for dim in [
            x.proof_scores.logic,
            x.proof_scores.evidence,
            x.proof_scores.feasibility,
            x.proof_scores.clarity,
            x.proof_scores.impact,
        ] {
            if !dim.is_finite() {
                return Err(ValidationError::new(
                    ValidationReason::OutOfRange,
                    format!("{}: proof_scores must be numeric", x.x_id),
                ));
            }
        }
        for r in &x.refs {
            let kind = match ArtifactKind::of_ref(r) {
                Some(kind) => kind,
                None => {
                    return Err(ValidationError::new(
                        ValidationReason::UnresolvedRef,
                        format!("{} references unclassifiable id '{}'", x.x_id, r),
                    ));
                }
            };
            let resolves = match kind {
                ArtifactKind::Strategy => s_ids.contains(r),
                ArtifactKind::Analysis => a_ids.contains(r),
                ArtifactKind::Production => p_ids.contains(r),
                ArtifactKind::Courier | ArtifactKind::Critique => true,
            };
            if !resolves {
                return Err(ValidationError::new(
                    ValidationReason::UnresolvedRef,
                    format!("{} references unknown id '{}'", x.x_id, r),
                ));
            }
            kinds.insert(kind);
        }
    }
    if kinds.len() < 3 {
        return Err(ValidationError::new(
            ValidationReason::NarrowCoverage,
            format!(
                "critic references span {} artifact kinds, need at least 3",
                kinds.len()
            ),
        ));
    }
    Ok(())
}

fn join(ids: &BTreeSet<String>) -> String {
    ids.iter().cloned().collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{KpiRow, ProofScores, Severity, SpecType};

    fn strategy(id: &str) -> Strategy {
        Strategy {
            s_id: id.to_string(),
            title: "Door-hanger blitz".to_string(),
            audience: "homeowners".to_string(),
            hooks: vec!["storm season".to_string()],
            three_step_plan: vec!["print".into(), "canvass".into(), "follow up".into()],
            acceptance_tests: vec!["5 calls booked".to_string()],
        }
    }

    fn analysis(id: &str, s_ref: &str) -> Analysis {
        Analysis {
            a_id: id.to_string(),
            s_refs: vec![s_ref.to_string()],
            kpi_table: vec![KpiRow {
                metric: "booked_jobs".to_string(),
                target: 5.0,
                unit: "jobs".to_string(),
            }],
            falsifications: vec!["no calls after 200 hangers".to_string()],
            risks: vec![],
        }
    }

    fn production(id: &str, a_ref: &str) -> Production {
        Production {
            p_id: id.to_string(),
            a_refs: vec![a_ref.to_string()],
            spec_type: SpecType::CopyBlock,
            body: "Call before the next storm does.".to_string(),
        }
    }

    fn courier_row(p_id: &str) -> CourierRow {
        CourierRow {
            day: "D1".to_string(),
            time: "09:00".to_string(),
            channel: "door".to_string(),
            p_id: p_id.to_string(),
            kpi_target: "20 hangers".to_string(),
            owner_action: "canvass Oak St".to_string(),
        }
    }

    fn critique(id: &str, refs: &[&str]) -> Critique {
        Critique {
            x_id: id.to_string(),
            refs: refs.iter().map(|r| r.to_string()).collect(),
            issue: "kpi target unmeasurable".to_string(),
            fix: "track calls per hanger batch".to_string(),
            severity: Severity::Med,
            proof_scores: ProofScores {
                logic: 0.8,
                evidence: 0.7,
                feasibility: 0.9,
                clarity: 0.8,
                impact: 0.6,
            },
        }
    }

    #[test]
    fn valid_strategies_pass() {
        assert!(validate_strategies(&[strategy("S-1"), strategy("S-2")]).is_ok());
    }

    #[test]
    fn empty_strategist_output_is_insufficient() {
        let err = validate_strategies(&[]).unwrap_err();
        assert_eq!(err.reason, ValidationReason::Insufficient);
    }

    #[test]
    fn bad_strategy_id_is_rejected() {
        let err = validate_strategies(&[strategy("STRAT-1")]).unwrap_err();
        assert_eq!(err.reason, ValidationReason::BadId);
        assert!(err.evidence.contains("STRAT-1"));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let err = validate_strategies(&[strategy("S-1"), strategy("S-1")]).unwrap_err();
        assert_eq!(err.reason, ValidationReason::DuplicateId);
    }

    #[test]
    fn analysis_with_unknown_s_ref_names_the_id() {
        let s_ids: HashSet<String> = ["S-1".to_string()].into();
        let err = validate_analyses(&[analysis("A-1", "S-9")], &s_ids).unwrap_err();
        assert_eq!(err.reason, ValidationReason::UnresolvedRef);
        assert!(err.evidence.contains("S-9"));
    }

    #[test]
    fn analysis_requires_falsification() {
        let s_ids: HashSet<String> = ["S-1".to_string()].into();
        let mut a = analysis("A-1", "S-1");
        a.falsifications.clear();
        let err = validate_analyses(&[a], &s_ids).unwrap_err();
        assert_eq!(err.reason, ValidationReason::Insufficient);
    }

    #[test]
    fn production_refs_must_resolve() {
        let a_ids: HashSet<String> = ["A-1".to_string()].into();
        assert!(validate_productions(&[production("P-1", "A-1")], &a_ids).is_ok());
        let err = validate_productions(&[production("P-1", "A-7")], &a_ids).unwrap_err();
        assert!(err.evidence.contains("A-7"));
    }

    #[test]
    fn courier_undeclared_assets_report_the_set_difference() {
        let assets = vec!["P-1".to_string(), "P-2".to_string(), "P-3".to_string()];
        let rows = vec![courier_row("P-1"), courier_row("P-4")];
        let err = validate_courier(&rows, &assets).unwrap_err();
        assert_eq!(err.reason, ValidationReason::UndeclaredAsset);
        assert_eq!(err.evidence, "Courier used undeclared assets: {P-4}");
    }

    #[test]
    fn critic_must_span_three_kinds() {
        let s_ids: HashSet<String> = ["S-1".to_string(), "S-2".to_string()].into();
        let a_ids: HashSet<String> = ["A-1".to_string()].into();
        let p_ids: HashSet<String> = ["P-2".to_string()].into();

        let narrow = critique("X-1", &["S-1", "S-2"]);
        let err = validate_critiques(&[narrow], &s_ids, &a_ids, &p_ids).unwrap_err();
        assert_eq!(err.reason, ValidationReason::NarrowCoverage);

        let wide = critique("X-1", &["S-1", "A-1", "P-2", "D3"]);
        assert!(validate_critiques(&[wide], &s_ids, &a_ids, &p_ids).is_ok());
    }

    #[test]
    fn critic_refs_must_resolve_for_id_kinds() {
        let s_ids: HashSet<String> = ["S-1".to_string()].into();
        let a_ids: HashSet<String> = ["A-1".to_string()].into();
        let p_ids: HashSet<String> = HashSet::new();

        let ghost = critique("X-1", &["S-1", "A-1", "P-9"]);
        let err = validate_critiques(&[ghost], &s_ids, &a_ids, &p_ids).unwrap_err();
        assert_eq!(err.reason, ValidationReason::UnresolvedRef);
        assert!(err.evidence.contains("P-9"));
    }
}
