//! One role turn, as a bounded state machine.
//!
//! initial → awaiting_llm → parsed → validated, with one strict_retry
//! loop permitted before failed. Transport errors get a single separate
//! retry. Nothing here loops unbounded; the chain above decides what a
//! failure means.

use std::time::{Duration, Instant};

use regex::Regex;
use serde_json::Value;

use axon_provider::{CompletionRequest, Provider};

use crate::artifact::{Role, RoleOutput};
use crate::validate::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecPhase {
    Initial,
    AwaitingLlm,
    Parsed,
    Validated,
    StrictRetry,
    Failed,
}

#[derive(Debug)]
pub enum RoleError {
    Transport(String),
    Parse(String),
    Validation(ValidationError),
    Timeout,
    Shape(String),
}

impl RoleError {
    /// Ledger action recorded for this failure.
    pub fn action(&self) -> &'static str {
        match self {
            RoleError::Transport(_) => "transport_error",
            RoleError::Timeout => "role_timeout",
            _ => "role_failure",
        }
    }

    pub fn detail(&self) -> String {
        match self {
            RoleError::Transport(msg) => format!("transport: {msg}"),
            RoleError::Parse(msg) => format!("parse: {msg}"),
            RoleError::Validation(err) => format!("validation: {err}"),
            RoleError::Timeout => "timeout".to_string(),
            RoleError::Shape(msg) => format!("banned shape: {msg}"),
        }
    }
}

pub struct RoleRequest {
    pub role: Role,
    pub system_prompt: String,
    pub user_prompt: String,
    pub model: String,
    pub max_tokens: u32,
    pub timeout: Duration,
    pub one_shot: String,
    pub banned_patterns: Vec<String>,
    /// Outer session budget; a strict retry is skipped once past it.
    pub session_deadline: Option<Instant>,
}

#[derive(Debug)]
pub struct RoleExecution {
    pub output: RoleOutput,
    pub raw: String,
    pub attempts: u32,
    pub strict_retry: bool,
}

/// A failed role turn, carrying the last raw reply so the ledger can
/// commit to its hash.
#[derive(Debug)]
pub struct RoleFailure {
    pub error: RoleError,
    pub last_raw: String,
}

pub async fn execute_role(
    provider: &dyn Provider,
    request: &RoleRequest,
    validate: &(dyn Fn(&RoleOutput) -> Result<(), ValidationError> + Send + Sync),
) -> Result<RoleExecution, RoleFailure> {
    let mut phase = ExecPhase::Initial;
    let mut attempts = 0u32;
    let mut transport_retried = false;
    let mut last_raw = String::new();

    loop {
        let strict = phase == ExecPhase::StrictRetry;
        let prompt = if strict {
            strict_prompt(request, &last_raw)
        } else {
            request.user_prompt.clone()
        };

        tracing::debug!(role = request.role.name(), strict, "role turn starting");
        attempts += 1;
        let raw = loop {
            match call_llm(provider, request, &prompt).await {
                Ok(raw) => break raw,
                Err(CallError::Transport(msg)) if !transport_retried => {
                    tracing::warn!(role = request.role.name(), error = %msg, "transport error, retrying once");
                    transport_retried = true;
                }
                Err(CallError::Transport(msg)) => {
                    return Err(RoleFailure {
                        error: RoleError::Transport(msg),
                        last_raw: last_raw.clone(),
                    })
                }
                Err(CallError::Timeout) => {
                    if strict || !deadline_allows_retry(request) {
                        return Err(RoleFailure {
                            error: RoleError::Timeout,
                            last_raw: last_raw.clone(),
                        });
                    }
                    phase = ExecPhase::StrictRetry;
                    break String::new();
                }
            }
        };
        if raw.is_empty() && phase == ExecPhase::StrictRetry && !strict {
            // Timed-out first attempt; go around as the strict retry.
            continue;
        }
        last_raw = raw.clone();

        let failure = match step(request, &raw, validate) {
            Ok(output) => {
                phase = ExecPhase::Validated;
                tracing::debug!(role = request.role.name(), ?phase, items = output.len(), "role turn accepted");
                return Ok(RoleExecution {
                    output,
                    raw,
                    attempts,
                    strict_retry: strict,
                });
            }
            Err(failure) => failure,
        };

        if strict {
            phase = ExecPhase::Failed;
            tracing::warn!(role = request.role.name(), ?phase, detail = %failure.detail(), "role failed after strict retry");
            return Err(RoleFailure {
                error: failure,
                last_raw,
            });
        }
        if !deadline_allows_retry(request) {
            return Err(RoleFailure {
                error: RoleError::Timeout,
                last_raw,
            });
        }
        tracing::info!(role = request.role.name(), detail = %failure.detail(), "strict re-prompt");
        phase = ExecPhase::StrictRetry;
    }
}

fn deadline_allows_retry(request: &RoleRequest) -> bool {
    request
        .session_deadline
        .map(|d| Instant::now() < d)
        .unwrap_or(true)
}

enum CallError {
    Transport(String),
    Timeout,
}

async fn call_llm(
    provider: &dyn Provider,
    request: &RoleRequest,
    prompt: &str,
) -> Result<String, CallError> {
    let completion = CompletionRequest {
        model: request.model.clone(),
        system: request.system_prompt.clone(),
        prompt: prompt.to_string(),
        temperature: request.role.temperature(),
        max_tokens: request.max_tokens,
    };
    match tokio::time::timeout(request.timeout, provider.complete(&completion)).await {
        Ok(Ok(raw)) => Ok(raw),
        Ok(Err(err)) => Err(CallError::Transport(err.to_string())),
        Err(_) => Err(CallError::Timeout),
    }
}

/// Parse, shape-check, and validate one raw reply.
fn step(
    request: &RoleRequest,
    raw: &str,
    validate: &(dyn Fn(&RoleOutput) -> Result<(), ValidationError> + Send + Sync),
) -> Result<RoleOutput, RoleError> {
    let value = extract_role_json(raw, request.role.letter()).map_err(RoleError::Parse)?;
    let output = parse_output(request.role, value).map_err(RoleError::Parse)?;

    if let Some(pattern) = banned_match(raw, &request.banned_patterns) {
        return Err(RoleError::Shape(pattern));
    }
    validate(&output).map_err(RoleError::Validation)?;
    Ok(output)
}

fn banned_match(raw: &str, patterns: &[String]) -> Option<String> {
    for pattern in patterns {
        match Regex::new(pattern) {
            Ok(re) => {
                if re.is_match(raw) {
                    return Some(pattern.clone());
                }
            }
            Err(err) => {
                tracing::warn!(pattern = %pattern, error = %err, "skipping invalid shape pattern");
            }
        }
    }
    None
}

/// Extract the first fenced block tagged with the role letter; fall back
/// to the first JSON array anywhere. Trailing narrative inside the fence
/// is a parse failure.
pub fn extract_role_json(raw: &str, letter: char) -> Result<Value, String> {
    let fence = Regex::new(r"(?s)```[ \t]*([A-Za-z]*)[ \t]*\n(.*?)```").expect("static regex");
    for cap in fence.captures_iter(raw) {
        let tag = cap[1].to_uppercase();
        if tag != letter.to_string() {
            continue;
        }
        let body = cap[2].trim();
        return match serde_json::from_str::<Value>(body) {
            Ok(Value::Array(items)) => Ok(Value::Array(items)),
            Ok(_) => Err(format!("fenced {letter} block is not a JSON array")),
            Err(err) => Err(format!("fenced {letter} block rejected: {err}")),
        };
    }

    // Fallback: first parseable top-level array anywhere in the reply.
    for (idx, ch) in raw.char_indices() {
        if ch != '[' {
            continue;
        }
        let mut stream = serde_json::Deserializer::from_str(&raw[idx..]).into_iter::<Value>();
        if let Some(Ok(Value::Array(items))) = stream.next() {
            return Ok(Value::Array(items));
        }
    }
    Err(format!("no fenced {letter} block and no JSON array found"))
}

fn parse_output(role: Role, value: Value) -> Result<RoleOutput, String> {
    let err = |e: serde_json::Error| format!("{} payload shape: {e}", role.name());
    Ok(match role {
        Role::Strategist => RoleOutput::Strategies(serde_json::from_value(value).map_err(err)?),
        Role::Analyst => RoleOutput::Analyses(serde_json::from_value(value).map_err(err)?),
        Role::Producer => RoleOutput::Productions(serde_json::from_value(value).map_err(err)?),
        Role::Courier => RoleOutput::Courier(serde_json::from_value(value).map_err(err)?),
        Role::Critic => RoleOutput::Critiques(serde_json::from_value(value).map_err(err)?),
    })
}

fn strict_prompt(request: &RoleRequest, last_raw: &str) -> String {
    let letter = request.role.letter();
    let rejected = if last_raw.is_empty() {
        String::new()
    } else {
        "Your previous reply was rejected.\n".to_string()
    };
    format!(
        "{original}\n\nSTRICT MODE ({version}): {rejected}\
         Respond with exactly one fenced code block tagged {letter} holding a JSON array of \
         objects, and nothing else. Example of the required shape:\n```{letter}\n{shot}\n```",
        original = request.user_prompt,
        version = crate::shots::SHOT_VERSION,
        rejected = rejected,
        letter = letter,
        shot = request.one_shot,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axon_provider::ProviderError;
    use std::sync::Mutex;

    /// Scripted provider: pops one canned reply per call.
    struct Script {
        replies: Mutex<Vec<Result<String, ()>>>,
        pub calls: Mutex<Vec<String>>,
    }

    impl Script {
        fn new(replies: Vec<Result<&str, ()>>) -> Self {
            Self {
                replies: Mutex::new(
                    replies
                        .into_iter()
                        .rev()
                        .map(|r| r.map(|s| s.to_string()))
                        .collect(),
                ),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Provider for Script {
        fn name(&self) -> &str {
            "script"
        }

        async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
            self.calls.lock().unwrap().push(request.prompt.clone());
            match self.replies.lock().unwrap().pop() {
                Some(Ok(reply)) => Ok(reply),
                Some(Err(())) => Err(ProviderError::Transport("connection reset".to_string())),
                None => Err(ProviderError::Empty),
            }
        }
    }

    fn request(role: Role) -> RoleRequest {
        RoleRequest {
            role,
            system_prompt: "system".to_string(),
            user_prompt: "produce artifacts".to_string(),
            model: "test-model".to_string(),
            max_tokens: 512,
            timeout: Duration::from_secs(5),
            one_shot: crate::shots::one_shot(std::path::Path::new("/nonexistent"), role),
            banned_patterns: Vec::new(),
            session_deadline: None,
        }
    }

    const GOOD_S: &str = "```S\n[{\"s_id\":\"S-1\",\"title\":\"t\",\"audience\":\"a\",\"hooks\":[\"h\"],\"three_step_plan\":[\"x\"],\"acceptance_tests\":[\"ok\"]}]\n```";

    fn accept_all(_: &RoleOutput) -> Result<(), ValidationError> {
        Ok(())
    }

    #[tokio::test]
    async fn fenced_block_parses_first_try() {
        let script = Script::new(vec![Ok(GOOD_S)]);
        let exec = execute_role(&script, &request(Role::Strategist), &accept_all)
            .await
            .unwrap();
        assert_eq!(exec.attempts, 1);
        assert!(!exec.strict_retry);
        assert_eq!(exec.output.len(), 1);
    }

    #[tokio::test]
    async fn prose_reply_triggers_strict_retry_then_succeeds() {
        let script = Script::new(vec![Ok("Here are my thoughts, no JSON today."), Ok(GOOD_S)]);
        let exec = execute_role(&script, &request(Role::Strategist), &accept_all)
            .await
            .unwrap();
        assert_eq!(exec.attempts, 2);
        assert!(exec.strict_retry);
        let calls = script.calls.lock().unwrap();
        assert!(calls[1].contains("STRICT MODE"));
        assert!(calls[1].contains("```S"));
    }

    #[tokio::test]
    async fn second_parse_failure_is_fatal() {
        let script = Script::new(vec![Ok("still prose"), Ok("more prose")]);
        let failure = execute_role(&script, &request(Role::Strategist), &accept_all)
            .await
            .unwrap_err();
        assert!(matches!(failure.error, RoleError::Parse(_)));
        assert_eq!(failure.error.action(), "role_failure");
        assert_eq!(failure.last_raw, "more prose");
    }

    #[tokio::test]
    async fn transport_error_gets_one_retry() {
        let script = Script::new(vec![Err(()), Ok(GOOD_S)]);
        let exec = execute_role(&script, &request(Role::Strategist), &accept_all)
            .await
            .unwrap();
        assert_eq!(exec.attempts, 1, "transport retry is not a strict retry");
    }

    #[tokio::test]
    async fn second_transport_error_surfaces() {
        let script = Script::new(vec![Err(()), Err(())]);
        let failure = execute_role(&script, &request(Role::Strategist), &accept_all)
            .await
            .unwrap_err();
        assert_eq!(failure.error.action(), "transport_error");
    }

    #[tokio::test]
    async fn banned_shape_rejects_and_retries() {
        let banned = "```S\n[{\"s_id\":\"S-1\",\"title\":\"Day 3 schedule\",\"audience\":\"a\",\"hooks\":[\"h\"],\"three_step_plan\":[\"x\"],\"acceptance_tests\":[\"ok\"]}]\n```";
        let script = Script::new(vec![Ok(banned), Ok(GOOD_S)]);
        let mut req = request(Role::Strategist);
        req.banned_patterns = vec![r"(?i)\bday\s*[1-7]\b".to_string()];
        let exec = execute_role(&script, &req, &accept_all).await.unwrap();
        assert!(exec.strict_retry);
    }

    struct Stalled;

    #[async_trait]
    impl Provider for Stalled {
        fn name(&self) -> &str {
            "stalled"
        }

        async fn complete(&self, _request: &CompletionRequest) -> Result<String, ProviderError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(String::new())
        }
    }

    #[tokio::test]
    async fn timeout_past_session_budget_is_role_timeout() {
        let mut req = request(Role::Strategist);
        req.timeout = Duration::from_millis(10);
        req.session_deadline = Some(Instant::now());
        let failure = execute_role(&Stalled, &req, &accept_all).await.unwrap_err();
        assert!(matches!(failure.error, RoleError::Timeout));
        assert_eq!(failure.error.action(), "role_timeout");
    }

    #[test]
    fn fence_rejects_trailing_narrative() {
        let raw = "```S\n[{\"k\":1}] and then some prose\n```";
        let err = extract_role_json(raw, 'S').unwrap_err();
        assert!(err.contains("rejected"));
    }

    #[test]
    fn fence_prefers_matching_tag() {
        let raw = "```A\n[{\"wrong\":true}]\n```\n```S\n[{\"right\":true}]\n```";
        let value = extract_role_json(raw, 'S').unwrap();
        assert_eq!(value[0]["right"], serde_json::json!(true));
    }

    #[test]
    fn fallback_finds_bare_array() {
        let raw = "Sure! [{\"s_id\":\"S-1\"}] hope that helps";
        let value = extract_role_json(raw, 'S').unwrap();
        assert_eq!(value[0]["s_id"], serde_json::json!("S-1"));
    }

    #[test]
    fn no_array_anywhere_is_a_parse_error() {
        assert!(extract_role_json("nothing here", 'S').is_err());
    }
}
