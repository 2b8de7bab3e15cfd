//! The chain orchestrator.
//!
//! Five roles run strictly in order with two single-shot micro Q&A
//! exchanges between them. Each role sees a curated slice of state, is
//! validated, scored, governed, and committed to the ledger before the
//! next role starts. The registry is owned here and nowhere else.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use axon_config::{load_domain_weights, Domain, RoleShapes, Settings};
use axon_ledger::{sha256_hex, AppendRequest, EntrySigner, Ledger, LedgerOptions};
use axon_provider::{CompletionRequest, Provider};

use crate::artifact::{
    Analysis, ArtifactKind, CourierRow, Critique, Production, Registry, Role, RoleOutput, Strategy,
};
use crate::detect::{
    detect_ambiguity, detect_contradictions, detect_fabrication, detect_misroute,
    detect_observability_gap, detect_overconfidence, detect_redundancy, detect_secrets,
    detect_sycophancy, SignalHit,
};
use crate::directives::PromptComposer;
use crate::executor::{execute_role, RoleExecution, RoleRequest};
use crate::governance::{GovernanceEngine, GovernanceOutcome};
use crate::ird_log::IrdLog;
use crate::report::compose_report;
use crate::session::save_session;
use crate::shots;
use crate::taes::{TaesEvaluator, TaesRecord, RRP_WEIGHTS};
use crate::validate::{
    validate_analyses, validate_courier, validate_critiques, validate_productions,
    validate_strategies, ValidationError,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleResult {
    pub role: String,
    pub taes: TaesRecord,
    pub governance: GovernanceOutcome,
    pub attempts: u32,
    pub temperature: f32,
    pub elapsed_ms: u64,
    pub rrp_applied: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainResults {
    pub session_id: String,
    pub domain: Domain,
    pub config_hash: String,
    pub registry: Registry,
    pub roles: Vec<RoleResult>,
    pub errors: Vec<String>,
    /// Set when a role failed terminally; drives exit code 3.
    pub failed_role: Option<String>,
    pub report: Option<String>,
    pub qa_notes: Vec<String>,
}

/// What `run_chain` hands back: the five role outputs plus the result
/// envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainOutcome {
    pub strategist: Vec<Strategy>,
    pub analyst: Vec<Analysis>,
    pub producer: Vec<Production>,
    pub courier: Vec<CourierRow>,
    pub critic: Vec<Critique>,
    pub results: ChainResults,
}

pub struct Chain {
    settings: Settings,
    provider: Arc<dyn Provider>,
    ledger: Ledger,
    composer: PromptComposer,
    taes: TaesEvaluator,
    governance: GovernanceEngine,
    shapes: RoleShapes,
    config_hash: String,
    ird_log: IrdLog,
}

impl Chain {
    pub fn from_settings(settings: Settings) -> Result<Self> {
        let provider = axon_provider::create_provider(&settings.provider)
            .context("Failed to create LLM provider")?;
        Self::with_provider(settings, Arc::from(provider))
    }

    /// Build a chain around an injected provider (tests, embedding).
    pub fn with_provider(settings: Settings, provider: Arc<dyn Provider>) -> Result<Self> {
        settings.ensure_dirs().context("Failed to create data dirs")?;
        // The config hash is frozen here: mid-session edits to protocol
        // files never affect an in-flight session.
        let config_hash = axon_config::config_fingerprint(&settings.paths.protocol_dir);
        let signer = EntrySigner::open(&settings.paths.ledger_dir, &settings.signing)
            .context("Failed to open signing key")?;
        let ledger = Ledger::open(
            &settings.paths.ledger_dir,
            signer,
            config_hash.clone(),
            LedgerOptions {
                mirror: settings.ledger.mirror,
                rotate_bytes: settings.ledger.rotate_bytes,
            },
        )
        .context("Failed to open ledger")?;
        let governance = GovernanceEngine::load(&settings.paths.protocol_dir);
        let taes = TaesEvaluator::new(load_domain_weights(&settings.paths.protocol_dir));
        let shapes = RoleShapes::load(&settings.paths.protocol_dir);
        let composer = PromptComposer::load(
            settings.paths.protocol_dir.clone(),
            settings.chain.default_domain,
        );
        let ird_log = IrdLog::new(&settings.paths.logs_dir);
        Ok(Self {
            settings,
            provider,
            ledger,
            composer,
            taes,
            governance,
            shapes,
            config_hash,
            ird_log,
        })
    }

    pub fn config_hash(&self) -> &str {
        &self.config_hash
    }

    pub async fn run(
        &self,
        objective: &str,
        domain: Option<Domain>,
        session_id: Option<String>,
    ) -> Result<ChainOutcome> {
        self.run_with_cancel(objective, domain, session_id, CancellationToken::new())
            .await
    }

    pub async fn run_with_cancel(
        &self,
        objective: &str,
        domain: Option<Domain>,
        session_id: Option<String>,
        cancel: CancellationToken,
    ) -> Result<ChainOutcome> {
        let domain = domain.unwrap_or(self.settings.chain.default_domain);
        let session_id = session_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        self.composer.ensure_role_prompts(domain)?;

        tracing::info!(%session_id, %domain, "chain starting");

        if !self.governance.available() {
            self.append_entry(
                &session_id,
                "system",
                "config_error",
                serde_json::json!({"error": "coupling config unavailable, signals demoted to soft"}),
                None,
                None,
            );
        }

        let deadline =
            Instant::now() + Duration::from_secs(self.settings.chain.session_budget_secs);
        let mut registry = Registry::default();
        let mut roles = Vec::new();
        let mut errors = Vec::new();
        let mut failed_role: Option<String> = None;
        let mut upstream_texts: Vec<(String, String)> = Vec::new();
        let mut qa_notes = Vec::new();

        for role in Role::all().iter().copied() {
            if cancel.is_cancelled() {
                errors.push(format!("session cancelled before {role}"));
                break;
            }
            if Instant::now() >= deadline {
                errors.push(format!("session budget exhausted before {role}"));
                break;
            }
            // Only a courier failure leaves the critic useful work;
            // any earlier failure ends the pipeline outright.
            if let Some(failed) = &failed_role {
                if !(failed == "courier" && role == Role::Critic) {
                    continue;
                }
            }

            let note = match role {
                Role::Producer => {
                    Some(self.micro_qa(Role::Analyst, Role::Producer, &registry, domain).await)
                }
                Role::Courier => {
                    Some(self.micro_qa(Role::Producer, Role::Courier, &registry, domain).await)
                }
                _ => None,
            };
            if let Some(n) = note.as_ref().filter(|n| !n.is_empty()) {
                qa_notes.push(n.clone());
            }

            match self
                .run_role(
                    role,
                    objective,
                    domain,
                    &registry,
                    note.as_deref(),
                    deadline,
                    &upstream_texts,
                )
                .await
            {
                Ok((exec, result)) => {
                    self.append_entry(
                        &session_id,
                        role.name(),
                        "role_output",
                        serde_json::json!({
                            "artifacts": exec.output,
                            "taes": result.taes,
                            "temperature": result.temperature,
                            "attempts": result.attempts,
                            "rrp": result.rrp_applied,
                            "model": self.settings.provider.model,
                        }),
                        some_nonempty(&result.governance.soft_signals),
                        some_nonempty(&result.governance.hard_actions),
                    );
                    if let Err(err) = self.ird_log.append(&session_id, &result.taes) {
                        tracing::warn!(error = %err, "IRD log append failed");
                    }
                    upstream_texts.push((role.name().to_string(), exec.raw));
                    registry.absorb(exec.output);
                    roles.push(result);
                }
                Err(failure) => {
                    let detail = failure.error.detail();
                    tracing::error!(role = %role, %detail, "role terminally failed");
                    self.append_entry(
                        &session_id,
                        role.name(),
                        failure.error.action(),
                        serde_json::json!({
                            "error": detail,
                            "raw_sha256": sha256_hex(failure.last_raw.as_bytes()),
                        }),
                        None,
                        None,
                    );
                    errors.push(format!("{role}: {detail}"));
                    failed_role = Some(role.name().to_string());
                }
            }
        }

        let report = if failed_role.is_none() && roles.len() == Role::all().len() {
            let text = compose_report(objective, domain, &registry);
            self.append_entry(
                &session_id,
                "composer",
                "composer",
                serde_json::json!({
                    "report_sha256": sha256_hex(text.as_bytes()),
                    "chars": text.len(),
                }),
                None,
                None,
            );
            Some(text)
        } else {
            None
        };

        let results = ChainResults {
            session_id,
            domain,
            config_hash: self.config_hash.clone(),
            registry: registry.clone(),
            roles,
            errors,
            failed_role,
            report,
            qa_notes,
        };
        if let Err(err) = save_session(&self.settings.paths.logs_dir, objective, &results) {
            tracing::warn!(error = %err, "session artifact save failed");
        }

        Ok(ChainOutcome {
            strategist: registry.strategies,
            analyst: registry.analyses,
            producer: registry.productions,
            courier: registry.courier,
            critic: registry.critiques,
            results,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_role(
        &self,
        role: Role,
        objective: &str,
        domain: Domain,
        registry: &Registry,
        note: Option<&str>,
        deadline: Instant,
        upstream: &[(String, String)],
    ) -> std::result::Result<(RoleExecution, RoleResult), crate::executor::RoleFailure> {
        let request = RoleRequest {
            role,
            system_prompt: self
                .composer
                .system_prompt(domain, role)
                .unwrap_or_default(),
            user_prompt: self.role_slice(role, objective, registry, note),
            model: self.settings.provider.model.clone(),
            max_tokens: self.settings.provider.max_tokens,
            timeout: Duration::from_secs(self.settings.role_timeout(role.name())),
            one_shot: shots::one_shot(&self.settings.paths.protocol_dir, role),
            banned_patterns: self.shapes.patterns_for(role.name()).to_vec(),
            session_deadline: Some(deadline),
        };

        let s_ids = registry.strategy_ids();
        let a_ids = registry.analysis_ids();
        let producer_assets = registry.production_ids();
        let p_ids: HashSet<String> = producer_assets.iter().cloned().collect();
        let validator = move |output: &RoleOutput| -> std::result::Result<(), ValidationError> {
            match output {
                RoleOutput::Strategies(v) => validate_strategies(v),
                RoleOutput::Analyses(v) => validate_analyses(v, &s_ids),
                RoleOutput::Productions(v) => validate_productions(v, &a_ids),
                RoleOutput::Courier(v) => validate_courier(v, &producer_assets),
                RoleOutput::Critiques(v) => validate_critiques(v, &s_ids, &a_ids, &p_ids),
            }
        };

        let started = Instant::now();
        let mut exec = execute_role(self.provider.as_ref(), &request, &validator).await?;
        let mut rrp_applied = false;

        let mut taes = self.taes.evaluate(
            role.name(),
            domain,
            &exec.raw,
            has_acceptance_checks(&exec.output),
        );

        // One Reality Reconciliation Pass: re-invoke with a realism
        // addendum, re-score with probable-shifted weights. Still-high
        // IRD is surfaced, not blocked.
        if taes.requires_reconciliation
            && self.settings.chain.reconciliation
            && Instant::now() < deadline
        {
            rrp_applied = true;
            let rrp_request = RoleRequest {
                user_prompt: format!(
                    "{}\n\nREALITY CHECK: your previous answer scored as implausible. Revise it \
                     to reflect how people actually behave; keep the same JSON shape.",
                    request.user_prompt
                ),
                system_prompt: request.system_prompt.clone(),
                one_shot: request.one_shot.clone(),
                banned_patterns: request.banned_patterns.clone(),
                model: request.model.clone(),
                ..request
            };
            match execute_role(self.provider.as_ref(), &rrp_request, &validator).await {
                Ok(second) => {
                    taes = self.taes.evaluate_with_weights(
                        role.name(),
                        domain,
                        &second.raw,
                        has_acceptance_checks(&second.output),
                        RRP_WEIGHTS,
                    );
                    exec = second;
                }
                Err(failure) => {
                    tracing::warn!(role = %role, detail = %failure.error.detail(), "reconciliation pass failed, keeping original");
                    taes = self.taes.evaluate_with_weights(
                        role.name(),
                        domain,
                        &exec.raw,
                        has_acceptance_checks(&exec.output),
                        RRP_WEIGHTS,
                    );
                }
            }
        }

        let hits = self.collect_hits(&exec, domain, upstream);
        let governance = self.governance.apply(&mut taes, &hits);

        let result = RoleResult {
            role: role.name().to_string(),
            taes,
            governance,
            attempts: exec.attempts,
            temperature: role.temperature(),
            elapsed_ms: started.elapsed().as_millis() as u64,
            rrp_applied,
        };
        Ok((exec, result))
    }

    fn collect_hits(
        &self,
        exec: &RoleExecution,
        domain: Domain,
        upstream: &[(String, String)],
    ) -> Vec<SignalHit> {
        let raw = &exec.raw;
        let mut hits = Vec::new();
        hits.extend(detect_sycophancy(raw));
        hits.extend(detect_contradictions(raw).into_iter().take(1));
        hits.extend(detect_ambiguity(raw));
        hits.extend(detect_overconfidence(raw, has_acceptance_checks(&exec.output)));
        hits.extend(detect_fabrication(raw, domain));
        hits.extend(detect_secrets(raw));
        hits.extend(detect_misroute(raw, domain));
        if let RoleOutput::Critiques(critiques) = &exec.output {
            let kinds: HashSet<ArtifactKind> = critiques
                .iter()
                .flat_map(|x| x.refs.iter())
                .filter_map(|r| ArtifactKind::of_ref(r))
                .collect();
            hits.extend(detect_observability_gap(kinds.len()));
        }
        hits.extend(detect_redundancy(
            raw,
            upstream,
            self.settings.chain.redundancy_threshold,
        ));
        hits
    }

    async fn micro_qa(
        &self,
        asker: Role,
        answerer: Role,
        registry: &Registry,
        domain: Domain,
    ) -> String {
        let limit = self.settings.chain.qa_char_limit;
        let context = match asker {
            Role::Analyst => serde_json::to_string(&registry.analyses).unwrap_or_default(),
            _ => serde_json::to_string(&registry.productions).unwrap_or_default(),
        };

        let question = match self
            .qa_call(
                asker,
                domain,
                format!(
                    "In one question of at most {limit} characters, ask the {answerer} what it \
                     most needs to know before building on your work:\n{context}"
                ),
            )
            .await
        {
            Some(q) => truncate_chars(&q, limit),
            None => return String::new(),
        };

        let answer = match self
            .qa_call(
                answerer,
                domain,
                format!("Answer in at most {limit} characters: {question}"),
            )
            .await
        {
            Some(a) => truncate_chars(&a, limit),
            None => String::new(),
        };

        format!("Q({asker}): {question}\nA({answerer}): {answer}")
    }

    async fn qa_call(&self, role: Role, domain: Domain, prompt: String) -> Option<String> {
        let system = self.composer.system_prompt(domain, role).ok()?;
        let request = CompletionRequest {
            model: self.settings.provider.model.clone(),
            system,
            prompt,
            temperature: role.temperature(),
            max_tokens: 512,
        };
        match self.provider.complete(&request).await {
            Ok(reply) => Some(reply),
            Err(err) => {
                // The exchange is an advisory note, not an artifact.
                tracing::warn!(role = %role, error = %err, "micro Q&A call failed, continuing without note");
                None
            }
        }
    }

    /// Curated per-role slice: objective spec plus only the registry
    /// sections the role builds on, never the full upstream prose.
    fn role_slice(
        &self,
        role: Role,
        objective: &str,
        registry: &Registry,
        note: Option<&str>,
    ) -> String {
        let note_block = note
            .filter(|n| !n.is_empty())
            .map(|n| format!("\n\nExchange note:\n{n}"))
            .unwrap_or_default();
        match role {
            Role::Strategist => format!("{}\n\nEmit your S array.", objective_spec(objective)),
            Role::Analyst => format!(
                "Objective: {objective}\n\nStrategies:\n{}\n\nEmit your A array; every s_ref must name one of these ids.",
                serde_json::to_string_pretty(&registry.strategies).unwrap_or_default()
            ),
            Role::Producer => format!(
                "Objective: {objective}\n\nAnalyses:\n{}{note_block}\n\nEmit your P array; every a_ref must name one of these ids.",
                serde_json::to_string_pretty(&registry.analyses).unwrap_or_default()
            ),
            Role::Courier => {
                let assets: Vec<serde_json::Value> = registry
                    .productions
                    .iter()
                    .map(|p| serde_json::json!({"p_id": p.p_id, "spec_type": p.spec_type}))
                    .collect();
                format!(
                    "Objective: {objective}\n\nDeclared producer assets (the only p_ids you may schedule):\n{}{note_block}\n\nEmit your C array covering days D1..D7.",
                    serde_json::to_string_pretty(&assets).unwrap_or_default()
                )
            }
            Role::Critic => format!(
                "Objective: {objective}\n\nFull registry:\n{}\n\nEmit your X array; references must span at least three artifact kinds.",
                serde_json::to_string_pretty(registry).unwrap_or_default()
            ),
        }
    }

    fn append_entry(
        &self,
        session_id: &str,
        role: &str,
        action: &str,
        payload: serde_json::Value,
        soft_signals: Option<Vec<String>>,
        hard_actions: Option<Vec<String>>,
    ) {
        let request = AppendRequest {
            session_id: session_id.to_string(),
            role: role.to_string(),
            action: action.to_string(),
            payload,
            soft_signals,
            hard_actions,
        };
        if let Err(err) = self.ledger.append(request) {
            tracing::error!(error = %err, role, action, "ledger append failed");
        }
    }
}

/// The strategist sees only the objective spec slice: goal text plus
/// any `audience:` / `constraint:` lines the operator tagged.
fn objective_spec(objective: &str) -> String {
    let mut goal = Vec::new();
    let mut audience = Vec::new();
    let mut constraints = Vec::new();
    for line in objective.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("audience:") {
            audience.push(rest.trim());
        } else if let Some(rest) = trimmed.strip_prefix("constraint:") {
            constraints.push(rest.trim());
        } else if !trimmed.is_empty() {
            goal.push(trimmed);
        }
    }
    let mut out = format!("Objective: {}", goal.join(" "));
    if !audience.is_empty() {
        out.push_str(&format!("\nAudience hints: {}", audience.join("; ")));
    }
    if !constraints.is_empty() {
        out.push_str(&format!("\nConstraints: {}", constraints.join("; ")));
    }
    out
}

fn has_acceptance_checks(output: &RoleOutput) -> bool {
    match output {
        RoleOutput::Strategies(v) => v.iter().any(|s| !s.acceptance_tests.is_empty()),
        RoleOutput::Analyses(v) => v.iter().any(|a| !a.falsifications.is_empty()),
        RoleOutput::Critiques(_) => true,
        RoleOutput::Productions(_) | RoleOutput::Courier(_) => false,
    }
}

fn some_nonempty(v: &[String]) -> Option<Vec<String>> {
    (!v.is_empty()).then(|| v.to_vec())
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// Library entry point per the chain API.
pub async fn run_chain(
    objective: &str,
    domain: Option<Domain>,
    session_id: Option<String>,
) -> Result<ChainOutcome> {
    let settings = Settings::load()?;
    let chain = Chain::from_settings(settings)?;
    chain.run(objective, domain, session_id).await
}
