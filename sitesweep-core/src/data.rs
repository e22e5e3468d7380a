use crate::config::AuditConfig;
use crate::error::{AuditError, Result};
use crate::issue::ValidationIssue;
use crate::redirect::RedirectChain;
use crate::report::AuditReport;
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// History of completed audits.
pub struct Database {
    conn: Connection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: String,
    pub site_url: String,
    pub start_time: i64,
    pub end_time: Option<i64>,
    pub status: String,
    pub health_score: Option<u32>,
    pub issue_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredIssue {
    pub id: i64,
    pub kind: String,
    pub severity: String,
    pub url: String,
    pub issue: ValidationIssue,
}

fn current_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

impl Database {
    pub fn drop(path: &Path) -> std::io::Result<()> {
        fs::remove_file(path)
    }

    pub fn exists(path: &Path) -> bool {
        path.exists()
    }

    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            PRAGMA foreign_keys = ON;
            ",
        )?;

        let db = Database { conn };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "
CREATE TABLE IF NOT EXISTS audit_sessions (
    id TEXT PRIMARY KEY,
    site_url TEXT NOT NULL,
    start_time INTEGER NOT NULL,
    end_time INTEGER,
    status TEXT NOT NULL CHECK(status IN ('running', 'completed', 'failed')),
    configuration TEXT,       -- JSON AuditConfig
    summary TEXT,             -- JSON AuditSummary
    report TEXT               -- JSON AuditReport
);

CREATE TABLE IF NOT EXISTS issues (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL,
    kind TEXT NOT NULL,
    severity TEXT NOT NULL CHECK(severity IN ('critical', 'error', 'warning')),
    url TEXT NOT NULL,
    payload TEXT NOT NULL,    -- JSON ValidationIssue
    FOREIGN KEY(session_id) REFERENCES audit_sessions(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_issues_session ON issues(session_id);
CREATE INDEX IF NOT EXISTS idx_issues_kind ON issues(session_id, kind);

CREATE TABLE IF NOT EXISTS redirect_chains (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL,
    start_url TEXT NOT NULL,
    final_url TEXT NOT NULL,
    total_hops INTEGER NOT NULL,
    payload TEXT NOT NULL,    -- JSON RedirectChain
    FOREIGN KEY(session_id) REFERENCES audit_sessions(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_redirect_chains_session ON redirect_chains(session_id);
            ",
        )?;
        Ok(())
    }

    pub fn get_connection(&self) -> &Connection {
        &self.conn
    }

    // Session management
    pub fn create_session(&self, site_url: &str, config: &AuditConfig) -> Result<String> {
        let session_id = uuid::Uuid::new_v4().to_string();

        self.conn.execute(
            "INSERT INTO audit_sessions (id, site_url, start_time, status, configuration) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![&session_id, site_url, current_timestamp(), "running", config.to_json()?],
        )?;

        Ok(session_id)
    }

    pub fn complete_session(&self, session_id: &str) -> Result<()> {
        self.set_status(session_id, "completed")
    }

    pub fn fail_session(&self, session_id: &str) -> Result<()> {
        self.set_status(session_id, "failed")
    }

    fn set_status(&self, session_id: &str, status: &str) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE audit_sessions SET status = ?1, end_time = ?2 WHERE id = ?3",
            params![status, current_timestamp(), session_id],
        )?;
        if updated == 0 {
            return Err(AuditError::SessionNotFound(session_id.to_string()));
        }
        Ok(())
    }

    pub fn session_status(&self, session_id: &str) -> Result<Option<String>> {
        Ok(self
            .conn
            .query_row(
                "SELECT status FROM audit_sessions WHERE id = ?1",
                [session_id],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub fn insert_issue(&self, session_id: &str, issue: &ValidationIssue) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO issues (session_id, kind, severity, url, payload) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                session_id,
                issue.kind().as_str(),
                issue.severity().as_str(),
                issue.primary_url(),
                serde_json::to_string(issue)?
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn insert_redirect_chain(&self, session_id: &str, chain: &RedirectChain) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO redirect_chains (session_id, start_url, final_url, total_hops, payload) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                session_id,
                &chain.start_url,
                &chain.final_url,
                chain.total_hops as i64,
                serde_json::to_string(chain)?
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_issues_by_session(&self, session_id: &str) -> Result<Vec<StoredIssue>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, kind, severity, url, payload FROM issues
             WHERE session_id = ?1
             ORDER BY CASE severity
                 WHEN 'critical' THEN 1
                 WHEN 'error' THEN 2
                 WHEN 'warning' THEN 3
             END, id",
        )?;

        let rows = stmt
            .query_map([session_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(id, kind, severity, url, payload)| -> Result<StoredIssue> {
                Ok(StoredIssue {
                    id,
                    kind,
                    severity,
                    url,
                    issue: serde_json::from_str(&payload)?,
                })
            })
            .collect()
    }

    pub fn get_issue_counts_by_kind(&self, session_id: &str) -> Result<Vec<(String, i64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT kind, COUNT(*) FROM issues WHERE session_id = ?1 GROUP BY kind ORDER BY kind",
        )?;
        let counts = stmt
            .query_map([session_id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(counts)
    }

    /// Persist a finished audit as one completed session.
    pub fn save_report(&self, report: &AuditReport, config: &AuditConfig) -> Result<String> {
        let session_id = self.create_session(&report.site_url, config)?;

        let stored = (|| -> Result<()> {
            let tx = self.conn.unchecked_transaction()?;
            for issue in report.all_issues() {
                self.insert_issue(&session_id, issue)?;
            }
            for chain in &report.redirect_chains {
                self.insert_redirect_chain(&session_id, chain)?;
            }
            self.conn.execute(
                "UPDATE audit_sessions SET start_time = ?1, summary = ?2, report = ?3 WHERE id = ?4",
                params![
                    report.started_at,
                    serde_json::to_string(&report.summary)?,
                    serde_json::to_string(report)?,
                    &session_id
                ],
            )?;
            tx.commit()?;
            Ok(())
        })();

        match stored {
            Ok(()) => {
                self.complete_session(&session_id)?;
                Ok(session_id)
            }
            Err(e) => {
                self.fail_session(&session_id)?;
                Err(e)
            }
        }
    }

    pub fn load_report(&self, session_id: &str) -> Result<AuditReport> {
        let payload: Option<Option<String>> = self
            .conn
            .query_row(
                "SELECT report FROM audit_sessions WHERE id = ?1",
                [session_id],
                |row| row.get(0),
            )
            .optional()?;

        match payload {
            Some(Some(json)) => Ok(serde_json::from_str(&json)?),
            _ => Err(AuditError::SessionNotFound(session_id.to_string())),
        }
    }

    /// Most recent first.
    pub fn list_sessions(&self) -> Result<Vec<SessionInfo>> {
        let mut stmt = self.conn.prepare(
            "SELECT s.id, s.site_url, s.start_time, s.end_time, s.status, s.summary,
                    (SELECT COUNT(*) FROM issues i WHERE i.session_id = s.id)
             FROM audit_sessions s
             ORDER BY s.start_time DESC, s.rowid DESC",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    SessionInfo {
                        id: row.get(0)?,
                        site_url: row.get(1)?,
                        start_time: row.get(2)?,
                        end_time: row.get(3)?,
                        status: row.get(4)?,
                        health_score: None,
                        issue_count: row.get(6)?,
                    },
                    row.get::<_, Option<String>>(5)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows
            .into_iter()
            .map(|(mut info, summary)| {
                info.health_score = summary
                    .and_then(|s| serde_json::from_str::<serde_json::Value>(&s).ok())
                    .and_then(|v| v.get("health_score").and_then(|h| h.as_u64()))
                    .map(|h| h as u32);
                info
            })
            .collect())
    }
}
