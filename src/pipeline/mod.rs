//! The generate → validate → execute → retry loop.
//!
//! One pipeline run is one strictly sequential chain of attempts; each
//! attempt's prompt depends on the previous attempt's outcome, carried in an
//! explicit [`RetrySession`] value. Both external steps sit behind traits so
//! the loop is testable with scripted stand-ins.

use anyhow::Result;
use owo_colors::OwoColorize;

use crate::dataset::DatasetSummary;
use crate::execution::python::{run_script, ExecContext};
use crate::execution::{AnalyticsResult, ExecError};
use crate::llm::{ChatMessage, ChatOptions, LlmClient, Role};
use crate::prompt::{self, AttemptFailure};
use crate::safety::{validate, CodePolicy};
use crate::utils::extract_code;

/// Generation boundary: turns a prompt pair into response text.
#[allow(async_fn_in_trait)]
pub trait GenerateCode {
    async fn generate(&mut self, system_prompt: &str, user_prompt: &str) -> Result<String>;
}

/// Execution boundary: runs a validator-accepted script.
#[allow(async_fn_in_trait)]
pub trait ExecuteScript {
    async fn execute(&mut self, source: &str) -> Result<AnalyticsResult, ExecError>;
}

/// The real generation client: one blocking chat completion per attempt.
pub struct LlmGenerator {
    pub client: LlmClient,
    pub opts: ChatOptions,
}

impl GenerateCode for LlmGenerator {
    async fn generate(&mut self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let messages = vec![
            ChatMessage::new(Role::System, system_prompt),
            ChatMessage::new(Role::User, user_prompt),
        ];
        self.client.chat(messages, self.opts.clone()).await
    }
}

/// The real executor: a fresh Python subprocess per script.
pub struct PythonExecutor {
    pub ctx: ExecContext,
}

impl ExecuteScript for PythonExecutor {
    async fn execute(&mut self, source: &str) -> Result<AnalyticsResult, ExecError> {
        run_script(source, &self.ctx).await
    }
}

/// Attempt bookkeeping for one pipeline run. Holds the attempt counter and
/// at most one pending (reason, source) pair from the previous attempt.
#[derive(Debug)]
struct RetrySession {
    attempt: usize,
    max_attempts: usize,
    pending: Option<AttemptFailure>,
}

impl RetrySession {
    fn new(max_attempts: usize) -> Self {
        Self { attempt: 1, max_attempts, pending: None }
    }

    /// Record a failed attempt. Returns false once attempts are exhausted;
    /// otherwise advances to the next attempt.
    fn carry(&mut self, reason: String, source: String) -> bool {
        self.pending = Some(AttemptFailure { reason, source });
        if self.attempt >= self.max_attempts {
            return false;
        }
        self.attempt += 1;
        true
    }
}

// Not a thiserror derive: the `source` field here is the generated script,
// not an error source, and the derive reserves that field name.
#[derive(Debug)]
pub enum PipelineError {
    /// All attempts consumed without a successful execution. Carries the
    /// last failure and its script for diagnostics.
    Exhausted { attempts: usize, reason: String, source: String },

    /// The generation client itself failed; nothing to retry against.
    Generation(anyhow::Error),
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exhausted { attempts, reason, .. } => {
                write!(f, "no working script after {attempts} attempts; last error: {reason}")
            }
            Self::Generation(err) => std::fmt::Display::fmt(err, f),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Exhausted { .. } => None,
            Self::Generation(err) => err.source(),
        }
    }
}

impl From<anyhow::Error> for PipelineError {
    fn from(err: anyhow::Error) -> Self {
        Self::Generation(err)
    }
}

/// A successful run: the result, the script that produced it, and how many
/// attempts it took.
#[derive(Debug)]
pub struct Solved {
    pub result: AnalyticsResult,
    pub source: String,
    pub attempts: usize,
}

/// Drive bounded generate→validate→execute cycles until a script succeeds
/// or attempts run out.
pub async fn run<G, E>(
    generator: &mut G,
    executor: &mut E,
    question: &str,
    summary: &DatasetSummary,
    policy: &CodePolicy,
    max_attempts: usize,
) -> Result<Solved, PipelineError>
where
    G: GenerateCode,
    E: ExecuteScript,
{
    let system = prompt::system_prompt(policy);
    let mut session = RetrySession::new(max_attempts.max(1));

    loop {
        let attempt = session.attempt;
        println!(
            "{}",
            format!("Attempt {}/{}: generating script...", attempt, session.max_attempts).dimmed()
        );

        let user = prompt::user_prompt(question, summary, session.pending.as_ref());
        let response = generator.generate(&system, &user).await?;
        let source = extract_code(&response);

        if let Err(violation) = validate(&source, policy) {
            let reason = violation.to_string();
            println!("{}", format!("Rejected: {}", reason).yellow());
            if session.carry(reason, source) {
                continue;
            }
            return Err(exhausted(session));
        }

        match executor.execute(&source).await {
            Ok(result) => {
                println!("{}", "Script executed successfully.".green());
                return Ok(Solved { result, source, attempts: attempt });
            }
            Err(err) => {
                let reason = err.to_string();
                println!("{}", format!("Execution failed: {}", reason).yellow());
                if session.carry(reason, source) {
                    continue;
                }
                return Err(exhausted(session));
            }
        }
    }
}

fn exhausted(session: RetrySession) -> PipelineError {
    let attempts = session.attempt;
    let failure = session.pending.unwrap_or(AttemptFailure {
        reason: "unknown failure".to_string(),
        source: String::new(),
    });
    PipelineError::Exhausted {
        attempts,
        reason: failure.reason,
        source: failure.source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    struct ScriptedGen {
        responses: Vec<String>,
        calls: usize,
        user_prompts: Vec<String>,
    }

    impl ScriptedGen {
        fn new(responses: &[&str]) -> Self {
            Self {
                responses: responses.iter().map(|s| s.to_string()).collect(),
                calls: 0,
                user_prompts: Vec::new(),
            }
        }
    }

    impl GenerateCode for ScriptedGen {
        async fn generate(&mut self, _system: &str, user: &str) -> Result<String> {
            self.user_prompts.push(user.to_string());
            let response = self
                .responses
                .get(self.calls)
                .cloned()
                .unwrap_or_else(|| "ANALYTICS_RESULT = {}".to_string());
            self.calls += 1;
            Ok(response)
        }
    }

    struct StubExecutor {
        outcomes: Vec<Result<AnalyticsResult, ExecError>>,
        executed: Vec<String>,
    }

    impl StubExecutor {
        fn succeeding() -> Self {
            Self { outcomes: vec![Ok(empty_result())], executed: Vec::new() }
        }
    }

    impl ExecuteScript for StubExecutor {
        async fn execute(&mut self, source: &str) -> Result<AnalyticsResult, ExecError> {
            self.executed.push(source.to_string());
            if self.outcomes.is_empty() {
                Ok(empty_result())
            } else {
                self.outcomes.remove(0)
            }
        }
    }

    fn empty_result() -> AnalyticsResult {
        AnalyticsResult {
            metrics: serde_json::Map::new(),
            plots: Vec::new(),
            extra: serde_json::Map::new(),
        }
    }

    fn empty_summary() -> DatasetSummary {
        DatasetSummary { rows: 0, columns: BTreeMap::new() }
    }

    async fn drive(
        generator: &mut ScriptedGen,
        executor: &mut StubExecutor,
        max_attempts: usize,
    ) -> Result<Solved, PipelineError> {
        run(
            generator,
            executor,
            "average salary?",
            &empty_summary(),
            &CodePolicy::default(),
            max_attempts,
        )
        .await
    }

    #[tokio::test]
    async fn test_three_rejections_exhaust_without_executing() {
        let mut generator =
            ScriptedGen::new(&["import subprocess", "import socket", "import requests"]);
        let mut executor = StubExecutor::succeeding();
        let err = drive(&mut generator, &mut executor, 3).await.unwrap_err();

        assert_eq!(generator.calls, 3);
        assert!(executor.executed.is_empty(), "rejected code must never run");
        match err {
            PipelineError::Exhausted { attempts, reason, source } => {
                assert_eq!(attempts, 3);
                assert!(reason.contains("requests"), "reason: {}", reason);
                assert_eq!(source, "import requests");
            }
            other => panic!("expected Exhausted, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rejection_then_success() {
        let mut generator = ScriptedGen::new(&[
            "import subprocess",
            "```python\nANALYTICS_RESULT = {'metrics': {}, 'plots': []}\n```",
        ]);
        let mut executor = StubExecutor::succeeding();
        let solved = drive(&mut generator, &mut executor, 3).await.unwrap();

        assert_eq!(generator.calls, 2);
        assert_eq!(solved.attempts, 2);
        assert_eq!(executor.executed.len(), 1);
        assert!(
            !executor.executed[0].contains("subprocess"),
            "the rejected program was executed"
        );
        // Fences stripped before validation and execution.
        assert!(executor.executed[0].starts_with("ANALYTICS_RESULT"));
    }

    #[tokio::test]
    async fn test_runtime_failure_feeds_back_into_next_prompt() {
        let mut generator = ScriptedGen::new(&["ANALYTICS_RESULT = {}", "ANALYTICS_RESULT = {}"]);
        let mut executor = StubExecutor {
            outcomes: vec![
                Err(ExecError::Runtime {
                    kind: "KeyError".to_string(),
                    message: "'salary'".to_string(),
                }),
                Ok(empty_result()),
            ],
            executed: Vec::new(),
        };
        let solved = drive(&mut generator, &mut executor, 3).await.unwrap();

        assert_eq!(solved.attempts, 2);
        assert_eq!(executor.executed.len(), 2);
        assert!(generator.user_prompts[0].contains("average salary?"));
        assert!(
            generator.user_prompts[1].contains("KeyError"),
            "second prompt must carry the failure: {}",
            generator.user_prompts[1]
        );
    }

    #[tokio::test]
    async fn test_contract_violation_exhausts_at_max() {
        let mut generator = ScriptedGen::new(&["x = 1", "x = 2"]);
        let mut executor = StubExecutor {
            outcomes: vec![
                Err(ExecError::Contract("did not define 'ANALYTICS_RESULT'".into())),
                Err(ExecError::Contract("did not define 'ANALYTICS_RESULT'".into())),
            ],
            executed: Vec::new(),
        };
        let err = drive(&mut generator, &mut executor, 2).await.unwrap_err();

        assert_eq!(generator.calls, 2);
        match err {
            PipelineError::Exhausted { attempts, reason, .. } => {
                assert_eq!(attempts, 2);
                assert!(reason.contains("ANALYTICS_RESULT"), "reason: {}", reason);
            }
            other => panic!("expected Exhausted, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_single_attempt_budget() {
        let mut generator = ScriptedGen::new(&["import socket"]);
        let mut executor = StubExecutor::succeeding();
        let err = drive(&mut generator, &mut executor, 1).await.unwrap_err();
        assert_eq!(generator.calls, 1);
        assert!(matches!(err, PipelineError::Exhausted { attempts: 1, .. }));
    }
}
