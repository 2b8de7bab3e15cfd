//! Directive coupling: detected signals become enforcement actions.
//!
//! Hard directives clamp IV down and floor IRD up, never the converse.
//! Soft directives only leave audit tags. When the coupling config is
//! unreadable the engine fails closed: every signal is treated soft and
//! each outcome carries `COUPLING_UNAVAILABLE`.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use axon_config::{CouplingConfig, PolicyMode};

use crate::detect::SignalHit;
use crate::taes::TaesRecord;

pub const COUPLING_UNAVAILABLE_TAG: &str = "COUPLING_UNAVAILABLE";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GovernanceOutcome {
    /// Directive ids recorded as audit tags; no score change.
    pub soft_signals: Vec<String>,
    /// Directive ids whose hard policy clamped the scores.
    pub hard_actions: Vec<String>,
    /// Evidence snippets from the detectors that fired.
    pub evidence: Vec<String>,
    pub coupling_unavailable: bool,
}

impl GovernanceOutcome {
    pub fn is_clean(&self) -> bool {
        self.soft_signals.is_empty() && self.hard_actions.is_empty()
    }
}

pub struct GovernanceEngine {
    coupling: CouplingConfig,
    available: bool,
}

impl GovernanceEngine {
    /// Load `coupling.json`; an unreadable file fails closed.
    pub fn load(protocol_dir: &Path) -> Self {
        match CouplingConfig::load(protocol_dir) {
            Ok(coupling) => Self {
                coupling,
                available: true,
            },
            Err(err) => {
                tracing::warn!(error = %err, "coupling config unavailable, failing closed to soft-only");
                Self {
                    coupling: CouplingConfig::default(),
                    available: false,
                }
            }
        }
    }

    pub fn with_coupling(coupling: CouplingConfig) -> Self {
        Self {
            coupling,
            available: true,
        }
    }

    pub fn available(&self) -> bool {
        self.available
    }

    /// Apply the directive policy to a scored role output. Mutates the
    /// TAES record in place: the clamped IV/IRD are what reach the
    /// ledger.
    pub fn apply(&self, taes: &mut TaesRecord, hits: &[SignalHit]) -> GovernanceOutcome {
        let mut soft: BTreeSet<String> = BTreeSet::new();
        let mut hard: BTreeSet<String> = BTreeSet::new();
        let mut evidence = Vec::new();
        let mut iv_cap: Option<f64> = None;
        let mut ird_floor: Option<f64> = None;

        if !self.available && !hits.is_empty() {
            soft.insert(COUPLING_UNAVAILABLE_TAG.to_string());
        }

        for hit in hits {
            evidence.push(format!("{}: {}", hit.signal.key(), hit.evidence));
            for (id, policy) in &self.coupling.directives {
                if policy.signal != hit.signal.key() {
                    continue;
                }
                match policy.mode {
                    PolicyMode::Soft => {
                        soft.insert(id.clone());
                    }
                    PolicyMode::Hard if self.available => {
                        hard.insert(id.clone());
                        // Strictest cap and strictest floor win.
                        if let Some(cap) = policy.iv_max {
                            iv_cap = Some(iv_cap.map_or(cap, |c: f64| c.min(cap)));
                        }
                        if let Some(floor) = policy.ird_min {
                            ird_floor = Some(ird_floor.map_or(floor, |f: f64| f.max(floor)));
                        }
                    }
                    PolicyMode::Hard => {
                        // Engine failed closed: demote to an audit tag.
                        soft.insert(id.clone());
                    }
                }
            }
        }

        if let Some(cap) = iv_cap {
            taes.iv = taes.iv.min(cap);
        }
        if let Some(floor) = ird_floor {
            taes.ird = taes.ird.max(floor);
        }

        GovernanceOutcome {
            soft_signals: soft.into_iter().collect(),
            hard_actions: hard.into_iter().collect(),
            evidence,
            coupling_unavailable: !self.available,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::Signal;
    use axon_config::Domain;

    fn record(iv: f64, ird: f64) -> TaesRecord {
        TaesRecord {
            role: "strategist".to_string(),
            domain: Domain::Marketing,
            logical: 0.8,
            practical: 0.8,
            probable: 0.8,
            iv,
            domain_weighted: iv,
            ird,
            contradiction_count: 0,
            hedge_count: 0,
            requires_reconciliation: false,
        }
    }

    fn hit(signal: Signal) -> SignalHit {
        SignalHit {
            signal,
            evidence: "snippet".to_string(),
        }
    }

    #[test]
    fn sycophancy_hard_gate_clamps_and_records_d13() {
        let engine = GovernanceEngine::with_coupling(CouplingConfig::builtin());
        let mut taes = record(0.80, 0.10);
        let outcome = engine.apply(&mut taes, &[hit(Signal::Sycophancy)]);
        assert_eq!(outcome.hard_actions, vec!["D13".to_string()]);
        assert_eq!(taes.iv, 0.62);
        assert_eq!(taes.ird, 0.65);
    }

    #[test]
    fn hard_gates_never_raise_iv_or_lower_ird() {
        let engine = GovernanceEngine::with_coupling(CouplingConfig::builtin());
        let mut taes = record(0.40, 0.90);
        engine.apply(&mut taes, &[hit(Signal::Sycophancy)]);
        // Already below the cap / above the floor: untouched.
        assert_eq!(taes.iv, 0.40);
        assert_eq!(taes.ird, 0.90);
    }

    #[test]
    fn strictest_cap_and_floor_win_across_directives() {
        let engine = GovernanceEngine::with_coupling(CouplingConfig::builtin());
        let mut taes = record(0.90, 0.0);
        let outcome = engine.apply(
            &mut taes,
            &[hit(Signal::Sycophancy), hit(Signal::Secrets)],
        );
        // D9 (secrets) caps at 0.40 and floors at 0.80; both stricter
        // than D13.
        assert_eq!(taes.iv, 0.40);
        assert_eq!(taes.ird, 0.80);
        assert_eq!(
            outcome.hard_actions,
            vec!["D13".to_string(), "D9".to_string()]
        );
    }

    #[test]
    fn soft_signals_leave_scores_alone() {
        let engine = GovernanceEngine::with_coupling(CouplingConfig::builtin());
        let mut taes = record(0.70, 0.20);
        let outcome = engine.apply(&mut taes, &[hit(Signal::Ambiguity)]);
        assert_eq!(outcome.soft_signals, vec!["D7".to_string()]);
        assert!(outcome.hard_actions.is_empty());
        assert_eq!(taes.iv, 0.70);
        assert_eq!(taes.ird, 0.20);
    }

    #[test]
    fn unavailable_coupling_fails_closed_to_soft() {
        let dir = tempfile::tempdir().unwrap();
        let engine = GovernanceEngine::load(dir.path());
        assert!(!engine.available());

        let mut taes = record(0.90, 0.0);
        let outcome = engine.apply(&mut taes, &[hit(Signal::Sycophancy)]);
        assert!(outcome.hard_actions.is_empty());
        assert!(outcome
            .soft_signals
            .contains(&COUPLING_UNAVAILABLE_TAG.to_string()));
        assert!(outcome.coupling_unavailable);
        assert_eq!(taes.iv, 0.90);
    }
}
