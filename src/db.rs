use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};

use crate::models::{Contact, OutreachResult, Profile, Run, RunOutcome, Source, Status};

/// Key under which the profile snapshot lives in the `kv` table.
pub const PROFILE_KEY: &str = "coffeechat_user_profile";

pub struct Database {
    conn: Connection,
    path: PathBuf,
}

impl Database {
    pub fn open(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path(),
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;
        Ok(Self { conn, path })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn,
            path: PathBuf::from(":memory:"),
        })
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn default_path() -> PathBuf {
        Self::data_dir().join("coffeechat.db")
    }

    /// XDG data directory, or the current directory as a fallback.
    pub fn data_dir() -> PathBuf {
        directories::ProjectDirs::from("", "", "coffeechat")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                model TEXT NOT NULL,
                outcome TEXT NOT NULL DEFAULT 'running' CHECK (outcome IN ('running', 'completed', 'cancelled', 'quota')),
                started_at TEXT NOT NULL,
                finished_at TEXT
            );

            CREATE TABLE IF NOT EXISTS results (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id INTEGER NOT NULL REFERENCES runs(id),
                position INTEGER NOT NULL,
                email TEXT NOT NULL,
                company_name TEXT NOT NULL,
                research TEXT NOT NULL,
                drafted_email TEXT NOT NULL,
                sources TEXT NOT NULL DEFAULT '[]',
                status TEXT NOT NULL CHECK (status IN ('pending', 'processing', 'completed', 'error')),
                error TEXT,
                updated_at TEXT NOT NULL,
                UNIQUE (run_id, position)
            );

            CREATE TABLE IF NOT EXISTS pending_contacts (
                position INTEGER PRIMARY KEY,
                email TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_results_run ON results(run_id);
            CREATE INDEX IF NOT EXISTS idx_results_email ON results(email);
            "#,
        )?;
        Ok(())
    }

    pub fn ensure_initialized(&self) -> Result<()> {
        let tables: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='results'",
            [],
            |row| row.get(0),
        )?;
        if tables == 0 {
            return Err(anyhow!(
                "Database not initialized. Run 'coffeechat init' first."
            ));
        }
        Ok(())
    }

    // --- Profile snapshot ---

    fn get_value(&self, key: &str) -> Result<Option<String>> {
        self.conn
            .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| row.get(0))
            .optional()
            .context("Failed to read key/value store")
    }

    fn put_value(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, now()],
        )?;
        Ok(())
    }

    pub fn load_profile(&self) -> Result<Option<Profile>> {
        match self.get_value(PROFILE_KEY)? {
            Some(json) => {
                let profile = serde_json::from_str(&json).context("Stored profile snapshot is corrupt")?;
                Ok(Some(profile))
            }
            None => Ok(None),
        }
    }

    /// The stored profile, or a fresh one seeded from the environment.
    pub fn load_profile_or_default(&self) -> Result<Profile> {
        Ok(self.load_profile()?.unwrap_or_else(Profile::from_env))
    }

    pub fn save_profile(&self, profile: &Profile) -> Result<()> {
        let json = serde_json::to_string(profile)?;
        self.put_value(PROFILE_KEY, &json)?;
        tracing::debug!(bytes = json.len(), "profile snapshot saved");
        Ok(())
    }

    // --- Runs ---

    pub fn start_run(&self, model: &str) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO runs (model, started_at) VALUES (?1, ?2)",
            params![model, now()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn finish_run(&self, run_id: i64, outcome: RunOutcome) -> Result<()> {
        self.conn.execute(
            "UPDATE runs SET outcome = ?1, finished_at = ?2 WHERE id = ?3",
            params![outcome.as_str(), now(), run_id],
        )?;
        Ok(())
    }

    /// Close a run and keep whatever it did not get to for a later resume.
    pub fn record_outcome(&mut self, run_id: i64, outcome: RunOutcome, unprocessed: &[Contact]) -> Result<()> {
        self.finish_run(run_id, outcome)?;
        self.replace_pending(unprocessed)?;
        tracing::info!(run_id, outcome = outcome.as_str(), pending = unprocessed.len(), "run recorded");
        Ok(())
    }

    pub fn latest_run(&self) -> Result<Option<Run>> {
        self.conn
            .query_row(
                "SELECT id, model, outcome, started_at, finished_at FROM runs ORDER BY id DESC LIMIT 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, Option<String>>(4)?,
                    ))
                },
            )
            .optional()?
            .map(|(id, model, outcome, started_at, finished_at)| {
                Ok(Run {
                    id,
                    model,
                    outcome: outcome.parse()?,
                    started_at,
                    finished_at,
                })
            })
            .transpose()
    }

    // --- Results ---

    /// Insert or replace the result at `position` of a run.
    pub fn save_result(&self, run_id: i64, position: usize, result: &OutreachResult) -> Result<()> {
        let sources = serde_json::to_string(&result.sources)?;
        self.conn.execute(
            "INSERT INTO results (run_id, position, email, company_name, research, drafted_email,
                                  sources, status, error, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(run_id, position) DO UPDATE SET
                email = excluded.email,
                company_name = excluded.company_name,
                research = excluded.research,
                drafted_email = excluded.drafted_email,
                sources = excluded.sources,
                status = excluded.status,
                error = excluded.error,
                updated_at = excluded.updated_at",
            params![
                run_id,
                position as i64,
                result.email,
                result.company_name,
                result.research,
                result.drafted_email,
                sources,
                result.status.as_str(),
                result.error,
                now(),
            ],
        )?;
        Ok(())
    }

    pub fn list_results(&self, run_id: i64, status: Option<Status>) -> Result<Vec<OutreachResult>> {
        let mut sql = String::from(
            "SELECT email, company_name, research, drafted_email, sources, status, error
             FROM results WHERE run_id = ?1",
        );
        if status.is_some() {
            sql.push_str(" AND status = ?2");
        }
        sql.push_str(" ORDER BY position");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = if let Some(s) = status {
            stmt.query_map(params![run_id, s.as_str()], Self::row_to_raw)?
        } else {
            stmt.query_map(params![run_id], Self::row_to_raw)?
        };

        rows.map(|row| row.map_err(anyhow::Error::from).and_then(RawResult::into_result))
            .collect::<Result<Vec<_>>>()
            .context("Failed to list results")
    }

    /// First result for `email` in a run.
    pub fn find_result(&self, run_id: i64, email: &str) -> Result<Option<OutreachResult>> {
        self.conn
            .query_row(
                "SELECT email, company_name, research, drafted_email, sources, status, error
                 FROM results WHERE run_id = ?1 AND LOWER(email) = LOWER(?2)
                 ORDER BY position LIMIT 1",
                params![run_id, email],
                Self::row_to_raw,
            )
            .optional()?
            .map(RawResult::into_result)
            .transpose()
    }

    fn row_to_raw(row: &rusqlite::Row) -> rusqlite::Result<RawResult> {
        Ok(RawResult {
            email: row.get(0)?,
            company_name: row.get(1)?,
            research: row.get(2)?,
            drafted_email: row.get(3)?,
            sources: row.get(4)?,
            status: row.get(5)?,
            error: row.get(6)?,
        })
    }

    // --- Preserved queue ---

    pub fn replace_pending(&mut self, contacts: &[Contact]) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM pending_contacts", [])?;
        for (position, contact) in contacts.iter().enumerate() {
            tx.execute(
                "INSERT INTO pending_contacts (position, email) VALUES (?1, ?2)",
                params![position as i64, contact.email],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn pending_contacts(&self) -> Result<Vec<Contact>> {
        let mut stmt = self
            .conn
            .prepare("SELECT email FROM pending_contacts ORDER BY position")?;
        let rows = stmt.query_map([], |row| Ok(Contact { email: row.get(0)? }))?;
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to read pending contacts")
    }
}

/// A results row before its JSON and enum columns are decoded.
struct RawResult {
    email: String,
    company_name: String,
    research: String,
    drafted_email: String,
    sources: String,
    status: String,
    error: Option<String>,
}

impl RawResult {
    fn into_result(self) -> Result<OutreachResult> {
        let sources: Vec<Source> = serde_json::from_str(&self.sources)
            .with_context(|| format!("Corrupt sources for {}", self.email))?;
        Ok(OutreachResult {
            status: self.status.parse()?,
            email: self.email,
            company_name: self.company_name,
            research: self.research,
            drafted_email: self.drafted_email,
            sources,
            error: self.error,
        })
    }
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.init().unwrap();
        db
    }

    fn completed(email: &str, company: &str) -> OutreachResult {
        OutreachResult {
            email: email.to_string(),
            company_name: company.to_string(),
            research: format!("Company Name: {}", company),
            drafted_email: "Hi there".to_string(),
            sources: vec![Source {
                title: "About".to_string(),
                uri: "https://example.com/about".to_string(),
            }],
            status: Status::Completed,
            error: None,
        }
    }

    #[test]
    fn test_ensure_initialized() {
        let db = Database::open_in_memory().unwrap();
        let err = db.ensure_initialized().unwrap_err();
        assert!(err.to_string().contains("coffeechat init"));

        db.init().unwrap();
        assert!(db.ensure_initialized().is_ok());
        // init is idempotent
        db.init().unwrap();
    }

    #[test]
    fn test_profile_snapshot_is_rewritten() {
        let db = db();
        assert!(db.load_profile().unwrap().is_none());

        let mut profile = Profile {
            user_name: "Ada".to_string(),
            ..Default::default()
        };
        db.save_profile(&profile).unwrap();
        profile.resume_text = "Engines".to_string();
        db.save_profile(&profile).unwrap();

        assert_eq!(db.load_profile().unwrap(), Some(profile));
        let stored: i64 = db
            .conn
            .query_row("SELECT COUNT(*) FROM kv WHERE key = ?1", [PROFILE_KEY], |row| row.get(0))
            .unwrap();
        assert_eq!(stored, 1);
    }

    #[test]
    fn test_corrupt_profile_is_an_error() {
        let db = db();
        db.put_value(PROFILE_KEY, "{not json").unwrap();
        assert!(db.load_profile().is_err());
    }

    #[test]
    fn test_results_are_updated_in_place() {
        let db = db();
        let run_id = db.start_run("gemini-test").unwrap();

        db.save_result(run_id, 0, &OutreachResult::processing("a@acme.com", "acme.com"))
            .unwrap();
        db.save_result(run_id, 1, &OutreachResult::processing("b@foo.org", "foo.org"))
            .unwrap();
        db.save_result(run_id, 0, &completed("a@acme.com", "Acme")).unwrap();

        let results = db.list_results(run_id, None).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0], completed("a@acme.com", "Acme"));
        assert_eq!(results[1].status, Status::Processing);

        let only_done = db.list_results(run_id, Some(Status::Completed)).unwrap();
        assert_eq!(only_done.len(), 1);
        assert_eq!(only_done[0].email, "a@acme.com");
    }

    #[test]
    fn test_find_result_is_case_insensitive() {
        let db = db();
        let run_id = db.start_run("gemini-test").unwrap();
        db.save_result(run_id, 0, &completed("Sam@Acme.com", "Acme")).unwrap();

        let found = db.find_result(run_id, "sam@acme.com").unwrap().unwrap();
        assert_eq!(found.company_name, "Acme");
        assert!(db.find_result(run_id, "nobody@acme.com").unwrap().is_none());
    }

    #[test]
    fn test_latest_run_and_outcome() {
        let db = db();
        assert!(db.latest_run().unwrap().is_none());

        let first = db.start_run("gemini-a").unwrap();
        db.finish_run(first, RunOutcome::Completed).unwrap();
        let second = db.start_run("gemini-b").unwrap();

        let run = db.latest_run().unwrap().unwrap();
        assert_eq!(run.id, second);
        assert_eq!(run.model, "gemini-b");
        assert_eq!(run.outcome, RunOutcome::Running);
        assert!(run.finished_at.is_none());

        db.finish_run(second, RunOutcome::QuotaExhausted).unwrap();
        let run = db.latest_run().unwrap().unwrap();
        assert_eq!(run.outcome, RunOutcome::QuotaExhausted);
        assert!(run.finished_at.is_some());
    }

    #[test]
    fn test_pending_queue_is_replaced() {
        let mut db = db();
        let contacts = |emails: &[&str]| -> Vec<Contact> {
            emails.iter().map(|e| Contact { email: e.to_string() }).collect()
        };

        db.replace_pending(&contacts(&["b@x.com", "c@y.com"])).unwrap();
        assert_eq!(db.pending_contacts().unwrap(), contacts(&["b@x.com", "c@y.com"]));

        db.replace_pending(&[]).unwrap();
        assert!(db.pending_contacts().unwrap().is_empty());
    }

    #[test]
    fn test_record_outcome_closes_run_and_keeps_queue() {
        let mut db = db();
        let run_id = db.start_run("gemini-test").unwrap();
        let left = vec![Contact { email: "c@z.io".to_string() }];

        db.record_outcome(run_id, RunOutcome::Cancelled, &left).unwrap();

        let run = db.latest_run().unwrap().unwrap();
        assert_eq!(run.outcome, RunOutcome::Cancelled);
        assert!(run.finished_at.is_some());
        assert_eq!(db.pending_contacts().unwrap(), left);

        let next = db.start_run("gemini-test").unwrap();
        db.record_outcome(next, RunOutcome::Completed, &[]).unwrap();
        assert!(db.pending_contacts().unwrap().is_empty());
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/coffeechat.db");
        let db = Database::open(Some(&path)).unwrap();
        db.init().unwrap();
        assert!(path.exists());
        assert_eq!(db.path(), &path);
    }
}
