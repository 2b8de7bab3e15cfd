use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// The five chain roles, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Strategist,
    Analyst,
    Producer,
    Courier,
    Critic,
}

impl Role {
    pub fn all() -> &'static [Role] {
        &[
            Role::Strategist,
            Role::Analyst,
            Role::Producer,
            Role::Courier,
            Role::Critic,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Role::Strategist => "strategist",
            Role::Analyst => "analyst",
            Role::Producer => "producer",
            Role::Courier => "courier",
            Role::Critic => "critic",
        }
    }

    /// Fence tag letter for this role's JSON payload.
    pub fn letter(&self) -> char {
        match self {
            Role::Strategist => 'S',
            Role::Analyst => 'A',
            Role::Producer => 'P',
            Role::Courier => 'C',
            Role::Critic => 'X',
        }
    }

    /// Sampling temperature policy: structural roles run cold, the
    /// generative middle runs warmer. Recorded per entry for replay.
    pub fn temperature(&self) -> f32 {
        match self {
            Role::Strategist | Role::Analyst | Role::Critic => 0.2,
            Role::Producer | Role::Courier => 0.6,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    Strategy,
    Analysis,
    Production,
    Courier,
    Critique,
}

impl ArtifactKind {
    /// Classify a cross-reference id by its shape. Courier rows carry no
    /// synthetic id, so day tokens (D1..D7) count as courier references.
    pub fn of_ref(id: &str) -> Option<ArtifactKind> {
        let rest_is_num = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
        if let Some(rest) = id.strip_prefix("S-") {
            return rest_is_num(rest).then_some(ArtifactKind::Strategy);
        }
        if let Some(rest) = id.strip_prefix("A-") {
            return rest_is_num(rest).then_some(ArtifactKind::Analysis);
        }
        if let Some(rest) = id.strip_prefix("P-") {
            return rest_is_num(rest).then_some(ArtifactKind::Production);
        }
        if let Some(rest) = id.strip_prefix("X-") {
            return rest_is_num(rest).then_some(ArtifactKind::Critique);
        }
        if let Some(rest) = id.strip_prefix('D') {
            return rest_is_num(rest).then_some(ArtifactKind::Courier);
        }
        None
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Strategy {
    pub s_id: String,
    pub title: String,
    pub audience: String,
    pub hooks: Vec<String>,
    pub three_step_plan: Vec<String>,
    pub acceptance_tests: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KpiRow {
    pub metric: String,
    pub target: f64,
    pub unit: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    pub a_id: String,
    pub s_refs: Vec<String>,
    pub kpi_table: Vec<KpiRow>,
    pub falsifications: Vec<String>,
    #[serde(default)]
    pub risks: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecType {
    Api,
    Ddl,
    Config,
    CopyBlock,
    Wiring,
    PromptPack,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Production {
    pub p_id: String,
    pub a_refs: Vec<String>,
    pub spec_type: SpecType,
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourierRow {
    pub day: String,
    pub time: String,
    pub channel: String,
    pub p_id: String,
    pub kpi_target: String,
    pub owner_action: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Med,
    High,
}

/// Five fixed proof dimensions for a critique finding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofScores {
    pub logic: f64,
    pub evidence: f64,
    pub feasibility: f64,
    pub clarity: f64,
    pub impact: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Critique {
    pub x_id: String,
    pub refs: Vec<String>,
    pub issue: String,
    pub fix: String,
    pub severity: Severity,
    pub proof_scores: ProofScores,
}

/// Parsed output of one role turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleOutput {
    Strategies(Vec<Strategy>),
    Analyses(Vec<Analysis>),
    Productions(Vec<Production>),
    Courier(Vec<CourierRow>),
    Critiques(Vec<Critique>),
}

impl RoleOutput {
    pub fn len(&self) -> usize {
        match self {
            RoleOutput::Strategies(v) => v.len(),
            RoleOutput::Analyses(v) => v.len(),
            RoleOutput::Productions(v) => v.len(),
            RoleOutput::Courier(v) => v.len(),
            RoleOutput::Critiques(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Session-scoped artifact store, owned exclusively by the orchestrator.
/// Entries are append-only: a role's artifacts land once, after
/// validation, and are never mutated afterwards.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Registry {
    pub strategies: Vec<Strategy>,
    pub analyses: Vec<Analysis>,
    pub productions: Vec<Production>,
    pub courier: Vec<CourierRow>,
    pub critiques: Vec<Critique>,
}

impl Registry {
    pub fn strategy_ids(&self) -> HashSet<String> {
        self.strategies.iter().map(|s| s.s_id.clone()).collect()
    }

    pub fn analysis_ids(&self) -> HashSet<String> {
        self.analyses.iter().map(|a| a.a_id.clone()).collect()
    }

    pub fn production_ids(&self) -> Vec<String> {
        self.productions.iter().map(|p| p.p_id.clone()).collect()
    }

    pub fn absorb(&mut self, output: RoleOutput) {
        match output {
            RoleOutput::Strategies(v) => self.strategies.extend(v),
            RoleOutput::Analyses(v) => self.analyses.extend(v),
            RoleOutput::Productions(v) => self.productions.extend(v),
            RoleOutput::Courier(v) => self.courier.extend(v),
            RoleOutput::Critiques(v) => self.critiques.extend(v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ref_classification() {
        assert_eq!(ArtifactKind::of_ref("S-1"), Some(ArtifactKind::Strategy));
        assert_eq!(ArtifactKind::of_ref("A-12"), Some(ArtifactKind::Analysis));
        assert_eq!(ArtifactKind::of_ref("P-3"), Some(ArtifactKind::Production));
        assert_eq!(ArtifactKind::of_ref("D4"), Some(ArtifactKind::Courier));
        assert_eq!(ArtifactKind::of_ref("X-2"), Some(ArtifactKind::Critique));
        assert_eq!(ArtifactKind::of_ref("S-"), None);
        assert_eq!(ArtifactKind::of_ref("Q-1"), None);
        assert_eq!(ArtifactKind::of_ref("Dx"), None);
    }

    #[test]
    fn temperatures_follow_policy() {
        assert!(Role::Strategist.temperature() < Role::Producer.temperature());
        assert_eq!(Role::Courier.temperature(), Role::Producer.temperature());
        assert_eq!(Role::Critic.temperature(), 0.2);
    }

    #[test]
    fn spec_type_uses_snake_case_wire_names() {
        let parsed: SpecType = serde_json::from_str("\"copy_block\"").unwrap();
        assert_eq!(parsed, SpecType::CopyBlock);
        assert_eq!(
            serde_json::to_string(&SpecType::PromptPack).unwrap(),
            "\"prompt_pack\""
        );
    }
}
