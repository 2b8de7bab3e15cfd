//! Tri-Axis Evaluation Standard scoring.
//!
//! Sub-scores are produced by deterministic heuristic graders: the same
//! text, domain, and weights always yield the same record. The canonical
//! IV formula is fixed; domain weights produce an additional reported
//! aggregate, never a substitute.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use axon_config::{AxisWeights, Domain};

use crate::detect::{contradiction_count, hedge_count, superlative_count};

/// Axis weights applied when a Reality Reconciliation Pass re-scores.
pub const RRP_WEIGHTS: AxisWeights = AxisWeights::new(0.3, 0.3, 0.4);

const SUMMARY_THRESHOLD: usize = 2500;
const SUMMARY_HEAD: usize = 1500;
const SUMMARY_TAIL: usize = 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaesRecord {
    pub role: String,
    pub domain: Domain,
    pub logical: f64,
    pub practical: f64,
    pub probable: f64,
    /// Canonical IV: 0.5·logical + 0.35·practical + 0.15·probable.
    pub iv: f64,
    /// Aggregate under the domain's axis weights, reported alongside.
    pub domain_weighted: f64,
    pub ird: f64,
    pub contradiction_count: usize,
    pub hedge_count: usize,
    pub requires_reconciliation: bool,
}

pub struct TaesEvaluator {
    weights: HashMap<Domain, AxisWeights>,
}

impl TaesEvaluator {
    pub fn new(weights: HashMap<Domain, AxisWeights>) -> Self {
        Self { weights }
    }

    pub fn weights_for(&self, domain: Domain) -> AxisWeights {
        self.weights
            .get(&domain)
            .copied()
            .unwrap_or(AxisWeights::new(0.45, 0.35, 0.20))
    }

    pub fn evaluate(
        &self,
        role: &str,
        domain: Domain,
        text: &str,
        has_acceptance_checks: bool,
    ) -> TaesRecord {
        self.evaluate_with_weights(role, domain, text, has_acceptance_checks, self.weights_for(domain))
    }

    /// Score with explicit axis weights (the RRP path shifts toward
    /// `probable`). The canonical IV is unaffected by the weights.
    pub fn evaluate_with_weights(
        &self,
        role: &str,
        domain: Domain,
        text: &str,
        has_acceptance_checks: bool,
        weights: AxisWeights,
    ) -> TaesRecord {
        let scored = summarize(text);
        let contradictions = contradiction_count(&scored);
        let hedges = hedge_count(&scored);

        let logical = score_logical(&scored, contradictions);
        let practical = score_practical(&scored, hedges);
        let probable = score_probable(&scored, has_acceptance_checks);

        let iv = 0.5 * logical + 0.35 * practical + 0.15 * probable;
        let domain_weighted =
            weights.logical * logical + weights.practical * practical + weights.probable * probable;
        let ird = (0.65 - iv).max(0.0) + 0.05 * contradictions as f64 + 0.02 * hedges as f64;

        TaesRecord {
            role: role.to_string(),
            domain,
            logical,
            practical,
            probable,
            iv,
            domain_weighted,
            ird,
            contradiction_count: contradictions,
            hedge_count: hedges,
            requires_reconciliation: ird > 0.5,
        }
    }
}

/// Long outputs are scored on head + tail so the framing and the
/// conclusion both survive the cut.
fn summarize(text: &str) -> String {
    if text.chars().count() <= SUMMARY_THRESHOLD {
        return text.to_string();
    }
    let head: String = text.chars().take(SUMMARY_HEAD).collect();
    let tail_start = text.chars().count() - SUMMARY_TAIL;
    let tail: String = text.chars().skip(tail_start).collect();
    format!("{head}\n...\n{tail}")
}

fn clamp(v: f64) -> f64 {
    v.clamp(0.0, 1.0)
}

const STRUCTURE_MARKERS: &[&str] = &["because", "therefore", "so that", "which means", "1.", "2.", "3."];
const CONSTRAINT_TERMS: &[&str] = &["budget", "deadline", "within", "limit", "owner", "capacity", "by day"];
const BEHAVIOR_TERMS: &[&str] = &["customer", "user", "caller", "reply", "walk-in", "neighbor", "visit", "reader"];

fn count_terms(text: &str, terms: &[&str]) -> usize {
    let lower = text.to_lowercase();
    terms.iter().filter(|t| lower.contains(*t)).count()
}

/// Internal consistency: structural connective density minus detected
/// contradictions.
fn score_logical(text: &str, contradictions: usize) -> f64 {
    let markers = count_terms(text, STRUCTURE_MARKERS).min(4);
    clamp(0.62 + 0.05 * markers as f64 - 0.10 * contradictions as f64)
}

/// Feasibility: acknowledged constraints and numeric specificity, less
/// hedging.
fn score_practical(text: &str, hedges: usize) -> f64 {
    let constraints = count_terms(text, CONSTRAINT_TERMS).min(4);
    let digit_tokens = text
        .split_whitespace()
        .filter(|w| w.chars().any(|c| c.is_ascii_digit()))
        .count()
        .min(8);
    clamp(0.52 + 0.04 * constraints as f64 + 0.02 * digit_tokens as f64 - 0.02 * hedges as f64)
}

/// Human-behavior realism: behavioral vocabulary and testable claims,
/// less superlative certainty.
fn score_probable(text: &str, has_acceptance_checks: bool) -> f64 {
    let behavior = count_terms(text, BEHAVIOR_TERMS).min(4);
    let check_bonus = if has_acceptance_checks { 0.10 } else { 0.0 };
    clamp(0.55 + 0.05 * behavior as f64 + check_bonus - 0.04 * superlative_count(text) as f64)
}
