pub mod gates;
pub mod tools;

use std::path::Path;

use tracing::warn;

use crate::config::{ProjectConfig, QualityGates};
use crate::error::Result;
use crate::trust::{Severity, TrustDecision, TrustEngine};

pub use gates::{GateReport, GateResult};

/// Uniform wrapper over per-language format/lint/test/coverage tools,
/// fronting the trust engine's finding ledger.
pub struct QualityService {
    project_config: ProjectConfig,
    trust: TrustEngine,
}

impl QualityService {
    pub fn new(project_config: ProjectConfig, trust: TrustEngine) -> Self {
        Self {
            project_config,
            trust,
        }
    }

    fn gate_toggles(&self) -> &QualityGates {
        &self.project_config.settings.quality_gates
    }

    pub async fn auto_format(&self, language: &str, path: &Path) -> GateResult {
        self.run_gate("format", language, &self.project_config.quality.format_commands, path, true)
            .await
    }

    pub async fn run_lint(&self, language: &str, path: &Path) -> GateResult {
        if !self.gate_toggles().lint {
            return GateResult::skipped("lint");
        }
        self.run_gate("lint", language, &self.project_config.quality.lint_commands, path, false)
            .await
    }

    pub async fn run_tests(&self, language: &str, path: &Path) -> GateResult {
        if !self.gate_toggles().tests {
            return GateResult::skipped("tests");
        }
        self.run_gate("tests", language, &self.project_config.quality.test_commands, path, false)
            .await
    }

    async fn run_build(&self, language: &str, path: &Path) -> GateResult {
        if !self.gate_toggles().build {
            return GateResult::skipped("build");
        }
        self.run_gate("build", language, &self.project_config.quality.build_commands, path, false)
            .await
    }

    async fn run_gate(
        &self,
        gate_name: &str,
        language: &str,
        commands: &std::collections::HashMap<String, String>,
        path: &Path,
        stub_is_pass_without_config: bool,
    ) -> GateResult {
        let Some(command) = commands.get(language) else {
            return if stub_is_pass_without_config {
                GateResult::pass(gate_name, "no formatter configured, nothing to do")
            } else {
                GateResult::stub(gate_name)
            };
        };
        match tools::run_configured_command(gate_name, command, path).await {
            Ok(out) if out.success() => GateResult::pass(gate_name, out.stdout()),
            Ok(out) => GateResult::fail(
                gate_name,
                format!("exit {}: {}", out.exit_code, out.stderr()),
            ),
            Err(e) => {
                warn!("{gate_name} gate failed to run: {e}");
                GateResult::fail(gate_name, e.to_string())
            }
        }
    }

    /// Coverage is parsed from the test command's stdout for a trailing
    /// `COVERAGE: <percent>` marker, matching the convention a wrapping test
    /// runner is expected to emit; absent a configured coverage command this
    /// is a stub pass.
    pub async fn check_coverage(&self, language: &str, path: &Path) -> GateResult {
        if !self.gate_toggles().coverage {
            return GateResult::skipped("coverage");
        }
        let Some(command) = self.project_config.quality.test_commands.get(language) else {
            return GateResult::stub("coverage");
        };
        match tools::run_configured_command("coverage", command, path).await {
            Ok(out) => {
                let stdout = out.stdout();
                let percent = stdout
                    .lines()
                    .rev()
                    .find_map(|l| l.strip_prefix("COVERAGE: "))
                    .and_then(|v| v.trim_end_matches('%').parse::<f64>().ok());
                let threshold = self.project_config.settings.coverage_threshold.unwrap_or(0.0);
                match percent {
                    Some(p) if p >= threshold => {
                        GateResult::pass("coverage", format!("{p:.1}% >= {threshold:.1}%"))
                    }
                    Some(p) => GateResult::fail(
                        "coverage",
                        format!("{p:.1}% < required {threshold:.1}%"),
                    ),
                    None => GateResult::stub("coverage"),
                }
            }
            Err(e) => GateResult::fail("coverage", e.to_string()),
        }
    }

    fn check_findings(&self) -> GateResult {
        if !self.gate_toggles().findings {
            return GateResult::skipped("findings");
        }
        GateResult::stub("findings")
    }

    pub async fn check_all_gates(&self, language: &str, path: &Path) -> GateReport {
        let build = self.run_build(language, path).await;
        let lint = self.run_lint(language, path).await;
        let tests = self.run_tests(language, path).await;
        let coverage = self.check_coverage(language, path).await;
        let findings = self.check_findings();
        GateReport::new(build, lint, tests, coverage, findings)
    }

    pub async fn validate(&self, language: &str, path: &Path) -> GateReport {
        self.check_all_gates(language, path).await
    }

    pub fn get_trust_decision(&self, finding_id: &str) -> Result<TrustDecision> {
        self.trust.get_trust_decision(finding_id)
    }

    pub fn record_dismissal(
        &self,
        finding_id: &str,
        justification: &str,
        dismissed_by: &str,
        dismissed_at: &str,
    ) -> Result<()> {
        self.trust
            .record_dismissal(finding_id, justification, dismissed_by, dismissed_at)
    }

    pub fn record_finding(
        &self,
        id: &str,
        tool: &str,
        severity: Severity,
        component: Option<&str>,
        description: &str,
        created_at: &str,
    ) -> Result<()> {
        self.trust
            .record_finding(id, tool, severity, component, description, created_at)
    }
}
