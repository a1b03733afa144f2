use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

impl Severity {
    fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }

    fn parse(s: &str) -> Severity {
        match s {
            "critical" => Severity::Critical,
            "warning" => Severity::Warning,
            _ => Severity::Info,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub id: String,
    pub tool: String,
    pub severity: Severity,
    pub component: Option<String>,
    pub description: String,
    pub created_at: String,
    pub status: FindingStatus,
    pub dismissed_by: Option<String>,
    pub dismissal_justification: Option<String>,
    pub dismissed_at: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingStatus {
    Open,
    Dismissed,
}

/// Trust classification returned by `get_trust_decision`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustDecision {
    Block { rationale: String },
    Investigate { rationale: String },
    Track { justification: String, dismissed_by: String },
}

/// Ledger of quality findings with an auditable dismissal trail. Backed by
/// the trust sqlite store described in [6].
pub struct TrustEngine {
    conn: Mutex<Connection>,
}

impl TrustEngine {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS findings (
                id TEXT PRIMARY KEY,
                tool TEXT NOT NULL,
                severity TEXT NOT NULL,
                component TEXT,
                description TEXT NOT NULL,
                created_at TEXT NOT NULL,
                status TEXT NOT NULL,
                dismissed_by TEXT,
                dismissal_justification TEXT,
                dismissed_at TEXT
            );
            CREATE TABLE IF NOT EXISTS dismissal_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                finding_id TEXT NOT NULL,
                dismissed_by TEXT NOT NULL,
                justification TEXT NOT NULL,
                dismissed_at TEXT NOT NULL
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open(":memory:")
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
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO findings
             (id, tool, severity, component, description, created_at, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'open')",
            params![id, tool, severity.as_str(), component, description, created_at],
        )?;
        Ok(())
    }

    /// Classify a finding id. Unknown ids classify BLOCK with a "presumed
    /// legitimate" rationale per [4.3].
    pub fn get_trust_decision(&self, finding_id: &str) -> Result<TrustDecision> {
        let conn = self.conn.lock().unwrap();
        let row: Option<(String, Option<String>, Option<String>)> = conn
            .query_row(
                "SELECT status, dismissed_by, dismissal_justification FROM findings WHERE id = ?1",
                params![finding_id],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .ok();

        Ok(match row {
            None => TrustDecision::Block {
                rationale: "presumed legitimate".to_string(),
            },
            Some((status, dismissed_by, justification)) if status == "dismissed" => {
                TrustDecision::Track {
                    justification: justification.unwrap_or_default(),
                    dismissed_by: dismissed_by.unwrap_or_default(),
                }
            }
            Some(_) => TrustDecision::Block {
                rationale: "open finding, not yet reviewed".to_string(),
            },
        })
    }

    /// Dismiss a finding with a mandatory justification, appending exactly
    /// one audit row [P8]. Rejects an empty justification.
    pub fn record_dismissal(
        &self,
        finding_id: &str,
        justification: &str,
        dismissed_by: &str,
        dismissed_at: &str,
    ) -> Result<()> {
        if justification.trim().is_empty() {
            return Err(crate::error::Error::ConfigValidation(
                "dismissal justification must not be empty".to_string(),
            ));
        }
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE findings SET status = 'dismissed', dismissed_by = ?1,
             dismissal_justification = ?2, dismissed_at = ?3 WHERE id = ?4",
            params![dismissed_by, justification, dismissed_at, finding_id],
        )?;
        if updated == 0 {
            return Err(crate::error::Error::NotFound(format!(
                "finding {finding_id}"
            )));
        }
        conn.execute(
            "INSERT INTO dismissal_history (finding_id, dismissed_by, justification, dismissed_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![finding_id, dismissed_by, justification, dismissed_at],
        )?;
        Ok(())
    }

    pub fn dismissal_history(&self, finding_id: &str) -> Result<Vec<(String, String, String)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT dismissed_by, justification, dismissed_at FROM dismissal_history
             WHERE finding_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(params![finding_id], |r| {
                Ok((r.get(0)?, r.get(1)?, r.get(2)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_finding_blocks() {
        let engine = TrustEngine::open_in_memory().unwrap();
        let decision = engine.get_trust_decision("nonexistent").unwrap();
        assert_eq!(
            decision,
            TrustDecision::Block {
                rationale: "presumed legitimate".to_string()
            }
        );
    }

    #[test]
    fn test_open_finding_blocks() {
        let engine = TrustEngine::open_in_memory().unwrap();
        engine
            .record_finding("f1", "clippy", Severity::Warning, None, "unused var", "2026-01-01")
            .unwrap();
        let decision = engine.get_trust_decision("f1").unwrap();
        assert!(matches!(decision, TrustDecision::Block { .. }));
    }

    #[test]
    fn test_dismissal_requires_justification() {
        let engine = TrustEngine::open_in_memory().unwrap();
        engine
            .record_finding("f1", "clippy", Severity::Warning, None, "unused var", "2026-01-01")
            .unwrap();
        let err = engine.record_dismissal("f1", "", "alice", "2026-01-02").unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn test_dismissal_then_track_classification() {
        let engine = TrustEngine::open_in_memory().unwrap();
        engine
            .record_finding("f1", "clippy", Severity::Warning, None, "unused var", "2026-01-01")
            .unwrap();
        engine
            .record_dismissal("f1", "false positive in generated code", "alice", "2026-01-02")
            .unwrap();
        let decision = engine.get_trust_decision("f1").unwrap();
        assert_eq!(
            decision,
            TrustDecision::Track {
                justification: "false positive in generated code".to_string(),
                dismissed_by: "alice".to_string()
            }
        );
    }

    #[test]
    fn test_dismissal_appends_exactly_one_audit_row() {
        let engine = TrustEngine::open_in_memory().unwrap();
        engine
            .record_finding("f1", "clippy", Severity::Warning, None, "unused var", "2026-01-01")
            .unwrap();
        engine
            .record_dismissal("f1", "reviewed, acceptable", "alice", "2026-01-02")
            .unwrap();
        let history = engine.dismissal_history("f1").unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].0, "alice");
    }

    #[test]
    fn test_dismissal_of_unknown_finding_errors() {
        let engine = TrustEngine::open_in_memory().unwrap();
        let err = engine
            .record_dismissal("ghost", "justification", "alice", "2026-01-02")
            .unwrap_err();
        assert!(err.to_string().contains("not_found"));
    }
}
