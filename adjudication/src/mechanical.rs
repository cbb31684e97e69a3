//! Stage 1 — deterministic mechanical checks.
//!
//! Runs the configured external commands (lint, build, test, static
//! analysis, coverage) and aggregates pass/fail. A failing command is an
//! expected outcome, never an error: spawn failures and timeouts become
//! failed [`CheckResult`]s. Checks without a configured command pass with a
//! skipped marker.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::subprocess::run_command;

/// Maximum stdout/stderr preview length carried in check details.
const OUTPUT_PREVIEW_MAX: usize = 500;

/// Tabular coverage summary line, e.g. `TOTAL    312     78    75%`.
static COVERAGE_TOTAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^TOTAL\b.*?(\d+(?:\.\d+)?)%").expect("COVERAGE_TOTAL_RE regex should compile")
});

/// Prose coverage line, e.g. `Coverage: 82.5%`.
static COVERAGE_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Coverage:\s*(\d+(?:\.\d+)?)%").expect("COVERAGE_LINE_RE regex should compile")
});

/// The mechanical check kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckType {
    Lint,
    Build,
    Test,
    Static,
    Coverage,
}

impl CheckType {
    /// Canonical execution order.
    pub fn all() -> [CheckType; 5] {
        [Self::Lint, Self::Build, Self::Test, Self::Static, Self::Coverage]
    }
}

impl fmt::Display for CheckType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lint => write!(f, "lint"),
            Self::Build => write!(f, "build"),
            Self::Test => write!(f, "test"),
            Self::Static => write!(f, "static"),
            Self::Coverage => write!(f, "coverage"),
        }
    }
}

/// Outcome of one mechanical check. Created once, never mutated —
/// except the coverage rewrite during aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub check_type: CheckType,
    pub passed: bool,
    pub message: String,
    #[serde(default)]
    pub details: HashMap<String, Value>,
}

/// Stage 1 aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MechanicalResult {
    pub passed: bool,
    pub checks: Vec<CheckResult>,
    pub coverage_score: Option<f64>,
}

impl MechanicalResult {
    /// AND all checks, with the coverage threshold gate applied first.
    ///
    /// When a coverage score is present and below threshold, the coverage
    /// check is rewritten to failed with an explanatory message before
    /// aggregation, so the audit trail shows why.
    pub fn aggregate(
        mut checks: Vec<CheckResult>,
        coverage_score: Option<f64>,
        coverage_threshold: f64,
    ) -> Self {
        let coverage_ok = coverage_score.map_or(true, |score| score >= coverage_threshold);
        if !coverage_ok {
            if let Some(check) = checks
                .iter_mut()
                .find(|c| c.check_type == CheckType::Coverage)
            {
                check.passed = false;
                check.message = format!(
                    "coverage {:.1}% below threshold {:.1}%",
                    coverage_score.unwrap_or(0.0) * 100.0,
                    coverage_threshold * 100.0
                );
            }
        }

        let passed = coverage_ok && checks.iter().all(|c| c.passed);
        Self {
            passed,
            checks,
            coverage_score,
        }
    }
}

/// Configuration for the mechanical verifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MechanicalConfig {
    /// Command (argv) per check type. Absent entry = check is skipped.
    pub commands: HashMap<CheckType, Vec<String>>,
    /// Wall-clock bound per command (seconds).
    pub timeout_secs: u64,
    /// Minimum acceptable coverage score in [0, 1].
    pub coverage_threshold: f64,
    /// Working directory for check commands (None = inherit).
    pub working_dir: Option<PathBuf>,
}

impl Default for MechanicalConfig {
    fn default() -> Self {
        Self {
            commands: HashMap::new(),
            timeout_secs: 300,
            coverage_threshold: 0.7,
            working_dir: None,
        }
    }
}

/// The Stage 1 verifier.
pub struct MechanicalVerifier {
    config: MechanicalConfig,
}

impl MechanicalVerifier {
    pub fn new(config: MechanicalConfig) -> Self {
        Self { config }
    }

    /// Run the requested checks and aggregate.
    ///
    /// Never returns an error: subprocess failures of any kind become
    /// failed CheckResults.
    pub async fn verify(&self, execution_id: &str, checks: &[CheckType]) -> MechanicalResult {
        let mut results = Vec::with_capacity(checks.len());
        let mut coverage_score = None;

        for &check in checks {
            let (result, coverage) = self.run_check(check).await;
            if coverage.is_some() {
                coverage_score = coverage;
            }
            results.push(result);
        }

        let aggregate =
            MechanicalResult::aggregate(results, coverage_score, self.config.coverage_threshold);
        tracing::info!(
            execution_id,
            passed = aggregate.passed,
            checks = aggregate.checks.len(),
            coverage = ?aggregate.coverage_score,
            "mechanical verification finished"
        );
        aggregate
    }

    async fn run_check(&self, check: CheckType) -> (CheckResult, Option<f64>) {
        let argv = match self.config.commands.get(&check) {
            Some(argv) if !argv.is_empty() => argv,
            _ => {
                return (
                    CheckResult {
                        check_type: check,
                        passed: true,
                        message: format!("no {check} command configured, check skipped"),
                        details: HashMap::from([("skipped".to_string(), json!(true))]),
                    },
                    None,
                );
            }
        };

        tracing::debug!(check = %check, command = ?argv, "running mechanical check");

        match run_command(argv, self.config.timeout_secs, self.config.working_dir.as_deref()).await
        {
            Ok(output) if output.timed_out => (
                CheckResult {
                    check_type: check,
                    passed: false,
                    message: format!(
                        "{check} check timed out after {}s",
                        self.config.timeout_secs
                    ),
                    details: HashMap::from([("timed_out".to_string(), json!(true))]),
                },
                None,
            ),
            Ok(output) => {
                let passed = output.exit_code == Some(0);
                let mut details = HashMap::new();
                details.insert("exit_code".to_string(), json!(output.exit_code));
                details.insert("stdout".to_string(), json!(preview(&output.stdout)));
                details.insert("stderr".to_string(), json!(preview(&output.stderr)));

                let coverage = if check == CheckType::Coverage {
                    parse_coverage(&output.stdout)
                } else {
                    None
                };
                if let Some(score) = coverage {
                    details.insert("coverage_percent".to_string(), json!(score * 100.0));
                }

                let message = if passed {
                    format!("{check} check passed")
                } else {
                    let code = output
                        .exit_code
                        .map(|c| c.to_string())
                        .unwrap_or_else(|| "signal".to_string());
                    format!("{check} check failed with exit code {code}")
                };

                (
                    CheckResult {
                        check_type: check,
                        passed,
                        message,
                        details,
                    },
                    coverage,
                )
            }
            Err(e) => (
                CheckResult {
                    check_type: check,
                    passed: false,
                    message: format!("failed to execute {check} command: {e}"),
                    details: HashMap::from([("spawn_error".to_string(), json!(e.to_string()))]),
                },
                None,
            ),
        }
    }
}

/// Extract a coverage score from free-text tool output.
///
/// Recognizes a tabular `TOTAL ... NN%` summary line or a `Coverage: NN%`
/// line; no match means the threshold gate does not apply.
fn parse_coverage(stdout: &str) -> Option<f64> {
    for re in [&*COVERAGE_TOTAL_RE, &*COVERAGE_LINE_RE] {
        if let Some(caps) = re.captures(stdout) {
            if let Ok(pct) = caps[1].parse::<f64>() {
                return Some(pct / 100.0);
            }
        }
    }
    None
}

/// Char-bounded output preview for check details.
fn preview(output: &str) -> String {
    if output.chars().count() <= OUTPUT_PREVIEW_MAX {
        output.to_string()
    } else {
        let head: String = output.chars().take(OUTPUT_PREVIEW_MAX).collect();
        format!("{head}...[truncated, {} chars total]", output.chars().count())
    }
}
