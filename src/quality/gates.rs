use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GateResult {
    pub name: String,
    pub passed: bool,
    pub detail: String,
}

impl GateResult {
    pub fn skipped(name: &str) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            detail: "Skipped (disabled)".to_string(),
        }
    }

    pub fn stub(name: &str) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            detail: format!("Stub: no {name} tool configured"),
        }
    }

    pub fn pass(name: &str, detail: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            detail: detail.into(),
        }
    }

    pub fn fail(name: &str, detail: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            passed: false,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GateReport {
    pub build: GateResult,
    pub lint: GateResult,
    pub tests: GateResult,
    pub coverage: GateResult,
    pub findings: GateResult,
    pub all_passed: bool,
}

impl GateReport {
    pub fn new(
        build: GateResult,
        lint: GateResult,
        tests: GateResult,
        coverage: GateResult,
        findings: GateResult,
    ) -> Self {
        let all_passed =
            build.passed && lint.passed && tests.passed && coverage.passed && findings.passed;
        Self {
            build,
            lint,
            tests,
            coverage,
            findings,
            all_passed,
        }
    }
}
