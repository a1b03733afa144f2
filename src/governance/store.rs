use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;

use crate::error::Result;

#[derive(Debug, Clone, PartialEq)]
pub struct DecisionRow {
    pub id: i64,
    pub task_id: String,
    pub sequence: i64,
    pub agent: String,
    pub category: String,
    pub summary: String,
    pub detail: String,
    pub components_affected: String,
    pub alternatives: String,
    pub confidence: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReviewRow {
    pub id: i64,
    pub decision_id: Option<i64>,
    pub plan_id: Option<i64>,
    pub verdict: String,
    pub findings: String,
    pub guidance: Option<String>,
    pub standards_verified: String,
    pub reviewer: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GovernedTaskRow {
    pub id: i64,
    pub implementation_task_id: String,
    pub subject: String,
    pub description: String,
    pub context: String,
    pub current_status: String,
    pub created_at: String,
    pub released_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskReviewRow {
    pub id: i64,
    pub review_task_id: String,
    pub implementation_task_id: String,
    pub review_type: String,
    pub status: String,
    pub context: String,
    pub verdict: Option<String>,
    pub guidance: Option<String>,
    pub findings: String,
    pub standards_verified: String,
    pub reviewer: String,
    pub created_at: String,
    pub completed_at: Option<String>,
}

/// Relational backing store for decisions, reviews, and the governed task
/// DAG's review metadata, per [6]'s governance store schema.
pub struct GovernanceStore {
    conn: Mutex<Connection>,
}

impl GovernanceStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS decisions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                task_id TEXT NOT NULL,
                sequence INTEGER NOT NULL,
                agent TEXT NOT NULL,
                category TEXT NOT NULL,
                summary TEXT NOT NULL,
                detail TEXT NOT NULL,
                components_affected TEXT NOT NULL,
                alternatives TEXT NOT NULL,
                confidence TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_decisions_task_id ON decisions(task_id);

            CREATE TABLE IF NOT EXISTS reviews (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                decision_id INTEGER,
                plan_id INTEGER,
                verdict TEXT NOT NULL,
                findings TEXT NOT NULL,
                guidance TEXT,
                standards_verified TEXT NOT NULL,
                reviewer TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_reviews_decision_id ON reviews(decision_id);
            CREATE INDEX IF NOT EXISTS idx_reviews_plan_id ON reviews(plan_id);

            CREATE TABLE IF NOT EXISTS governed_tasks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                implementation_task_id TEXT NOT NULL UNIQUE,
                subject TEXT NOT NULL,
                description TEXT NOT NULL,
                context TEXT NOT NULL,
                current_status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                released_at TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_governed_tasks_impl_id
                ON governed_tasks(implementation_task_id);

            CREATE TABLE IF NOT EXISTS task_reviews (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                review_task_id TEXT NOT NULL,
                implementation_task_id TEXT NOT NULL,
                review_type TEXT NOT NULL,
                status TEXT NOT NULL,
                context TEXT NOT NULL,
                verdict TEXT,
                guidance TEXT,
                findings TEXT NOT NULL,
                standards_verified TEXT NOT NULL,
                reviewer TEXT NOT NULL,
                created_at TEXT NOT NULL,
                completed_at TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_task_reviews_review_task_id
                ON task_reviews(review_task_id);
            CREATE INDEX IF NOT EXISTS idx_task_reviews_impl_task_id
                ON task_reviews(implementation_task_id);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    /// Insert a decision with a strictly-increasing per-task `sequence`,
    /// assigned inside a single transaction so two concurrent callers on the
    /// same task id serialize through SQLite's write lock rather than racing
    /// on the max-then-insert read.
    pub fn insert_decision(
        &self,
        task_id: &str,
        agent: &str,
        category: &str,
        summary: &str,
        detail: &str,
        components_affected: &str,
        alternatives: &str,
        confidence: &str,
        created_at: &str,
    ) -> Result<DecisionRow> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let sequence: i64 = tx.query_row(
            "SELECT COALESCE(MAX(sequence), 0) + 1 FROM decisions WHERE task_id = ?1",
            params![task_id],
            |r| r.get(0),
        )?;
        tx.execute(
            "INSERT INTO decisions
             (task_id, sequence, agent, category, summary, detail, components_affected,
              alternatives, confidence, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                task_id, sequence, agent, category, summary, detail, components_affected,
                alternatives, confidence, created_at
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;
        Ok(DecisionRow {
            id,
            task_id: task_id.to_string(),
            sequence,
            agent: agent.to_string(),
            category: category.to_string(),
            summary: summary.to_string(),
            detail: detail.to_string(),
            components_affected: components_affected.to_string(),
            alternatives: alternatives.to_string(),
            confidence: confidence.to_string(),
            created_at: created_at.to_string(),
        })
    }

    pub fn decisions_for_task(&self, task_id: &str) -> Result<Vec<DecisionRow>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, task_id, sequence, agent, category, summary, detail,
                    components_affected, alternatives, confidence, created_at
             FROM decisions WHERE task_id = ?1 ORDER BY sequence ASC",
        )?;
        let rows = stmt
            .query_map(params![task_id], |r| {
                Ok(DecisionRow {
                    id: r.get(0)?,
                    task_id: r.get(1)?,
                    sequence: r.get(2)?,
                    agent: r.get(3)?,
                    category: r.get(4)?,
                    summary: r.get(5)?,
                    detail: r.get(6)?,
                    components_affected: r.get(7)?,
                    alternatives: r.get(8)?,
                    confidence: r.get(9)?,
                    created_at: r.get(10)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Verdict rows are append-only [P10] — there is no update path here,
    /// intentionally.
    pub fn insert_review(
        &self,
        decision_id: Option<i64>,
        plan_id: Option<i64>,
        verdict: &str,
        findings: &str,
        guidance: Option<&str>,
        standards_verified: &str,
        reviewer: &str,
        created_at: &str,
    ) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO reviews
             (decision_id, plan_id, verdict, findings, guidance, standards_verified, reviewer, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![decision_id, plan_id, verdict, findings, guidance, standards_verified, reviewer, created_at],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn reviews_for_decision(&self, decision_id: i64) -> Result<Vec<ReviewRow>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, decision_id, plan_id, verdict, findings, guidance, standards_verified, reviewer, created_at
             FROM reviews WHERE decision_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(params![decision_id], row_to_review)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn insert_governed_task(
        &self,
        implementation_task_id: &str,
        subject: &str,
        description: &str,
        context: &str,
        current_status: &str,
        created_at: &str,
    ) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO governed_tasks
             (implementation_task_id, subject, description, context, current_status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![implementation_task_id, subject, description, context, current_status, created_at],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn update_governed_task_status(
        &self,
        implementation_task_id: &str,
        status: &str,
        released_at: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE governed_tasks SET current_status = ?1, released_at = COALESCE(?2, released_at)
             WHERE implementation_task_id = ?3",
            params![status, released_at, implementation_task_id],
        )?;
        Ok(())
    }

    pub fn governed_task(&self, implementation_task_id: &str) -> Result<Option<GovernedTaskRow>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, implementation_task_id, subject, description, context, current_status,
                    created_at, released_at
             FROM governed_tasks WHERE implementation_task_id = ?1",
            params![implementation_task_id],
            row_to_governed_task,
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other.into()),
        })
    }

    pub fn insert_task_review(
        &self,
        review_task_id: &str,
        implementation_task_id: &str,
        review_type: &str,
        context: &str,
        reviewer: &str,
        created_at: &str,
    ) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO task_reviews
             (review_task_id, implementation_task_id, review_type, status, context,
              findings, standards_verified, reviewer, created_at)
             VALUES (?1, ?2, ?3, 'pending', ?4, '[]', '[]', ?5, ?6)",
            params![review_task_id, implementation_task_id, review_type, context, reviewer, created_at],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn complete_task_review(
        &self,
        review_task_id: &str,
        verdict: &str,
        guidance: Option<&str>,
        findings: &str,
        standards_verified: &str,
        completed_at: &str,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE task_reviews SET status = 'complete', verdict = ?1, guidance = ?2,
             findings = ?3, standards_verified = ?4, completed_at = ?5
             WHERE review_task_id = ?6",
            params![verdict, guidance, findings, standards_verified, completed_at, review_task_id],
        )?;
        Ok(())
    }

    pub fn mark_task_review_error(&self, review_task_id: &str, reason: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE task_reviews SET status = 'error', guidance = ?1 WHERE review_task_id = ?2",
            params![reason, review_task_id],
        )?;
        Ok(())
    }

    pub fn task_reviews_for_impl(&self, implementation_task_id: &str) -> Result<Vec<TaskReviewRow>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, review_task_id, implementation_task_id, review_type, status, context,
                    verdict, guidance, findings, standards_verified, reviewer, created_at, completed_at
             FROM task_reviews WHERE implementation_task_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(params![implementation_task_id], row_to_task_review)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Task reviews whose `context` embeds the given session id, used by the
    /// settle-check worker [4.10] to debounce a burst of task creations from
    /// one agent session. `context` is stamped `session_id={id}` by the
    /// interception hook since the documented schema has no dedicated column.
    pub fn task_reviews_for_session(&self, session_id: &str) -> Result<Vec<TaskReviewRow>> {
        let conn = self.conn.lock().unwrap();
        let pattern = format!("session_id={session_id}");
        let mut stmt = conn.prepare(
            "SELECT id, review_task_id, implementation_task_id, review_type, status, context,
                    verdict, guidance, findings, standards_verified, reviewer, created_at, completed_at
             FROM task_reviews WHERE context = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(params![pattern], row_to_task_review)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn pending_task_reviews(&self) -> Result<Vec<TaskReviewRow>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, review_task_id, implementation_task_id, review_type, status, context,
                    verdict, guidance, findings, standards_verified, reviewer, created_at, completed_at
             FROM task_reviews WHERE status = 'pending' ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map([], row_to_task_review)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn row_to_review(r: &rusqlite::Row) -> rusqlite::Result<ReviewRow> {
    Ok(ReviewRow {
        id: r.get(0)?,
        decision_id: r.get(1)?,
        plan_id: r.get(2)?,
        verdict: r.get(3)?,
        findings: r.get(4)?,
        guidance: r.get(5)?,
        standards_verified: r.get(6)?,
        reviewer: r.get(7)?,
        created_at: r.get(8)?,
    })
}

fn row_to_governed_task(r: &rusqlite::Row) -> rusqlite::Result<GovernedTaskRow> {
    Ok(GovernedTaskRow {
        id: r.get(0)?,
        implementation_task_id: r.get(1)?,
        subject: r.get(2)?,
        description: r.get(3)?,
        context: r.get(4)?,
        current_status: r.get(5)?,
        created_at: r.get(6)?,
        released_at: r.get(7)?,
    })
}

fn row_to_task_review(r: &rusqlite::Row) -> rusqlite::Result<TaskReviewRow> {
    Ok(TaskReviewRow {
        id: r.get(0)?,
        review_task_id: r.get(1)?,
        implementation_task_id: r.get(2)?,
        review_type: r.get(3)?,
        status: r.get(4)?,
        context: r.get(5)?,
        verdict: r.get(6)?,
        guidance: r.get(7)?,
        findings: r.get(8)?,
        standards_verified: r.get(9)?,
        reviewer: r.get(10)?,
        created_at: r.get(11)?,
        completed_at: r.get(12)?,
    })
}
