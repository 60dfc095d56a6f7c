use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::models::{GeneratedQuestion, IngestManifest};
use crate::session::PendingQuestions;

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(config: &AppConfig) -> Result<Self> {
        tokio::fs::create_dir_all(&config.data_dir).await?;

        let options = SqliteConnectOptions::from_str(&config.sqlite_dsn())?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// A private in-memory database. One connection, since each connection to
    /// `:memory:` would otherwise see its own empty database.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS manifests (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                pdf_hash TEXT NOT NULL,
                created_at TEXT NOT NULL,
                chunk_count INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (session_id) REFERENCES sessions(id)
            );

            CREATE TABLE IF NOT EXISTS pending_questions (
                session_id TEXT PRIMARY KEY,
                question_json TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (session_id) REFERENCES sessions(id)
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn record_manifest(&self, manifest: &IngestManifest) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO manifests (pdf_hash, created_at, chunk_count)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(&manifest.pdf_hash)
        .bind(manifest.created_at.to_rfc3339())
        .bind(manifest.chunk_count)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn latest_manifest(&self) -> Result<Option<IngestManifest>> {
        let row = sqlx::query(
            r#"
            SELECT pdf_hash, created_at, chunk_count
            FROM manifests
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        let manifest = row.map(|r| IngestManifest {
            pdf_hash: r.get::<String, _>("pdf_hash"),
            created_at: chrono::DateTime::parse_from_rfc3339(&r.get::<String, _>("created_at"))
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
            chunk_count: r.get::<i64, _>("chunk_count"),
        });

        Ok(manifest)
    }

    pub async fn create_session(&self) -> Result<String> {
        let session_id = Uuid::new_v4().to_string();
        self.ensure_session(&session_id).await?;
        Ok(session_id)
    }

    pub async fn ensure_session(&self, session_id: &str) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO sessions (id, created_at) VALUES (?, ?)")
            .bind(session_id)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn save_message(&self, session_id: &str, role: &str, content: &str) -> Result<()> {
        self.ensure_session(session_id).await?;
        sqlx::query(
            "INSERT INTO messages (session_id, role, content, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(session_id)
        .bind(role)
        .bind(content)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn latest_messages(
        &self,
        session_id: &str,
        limit: i64,
    ) -> Result<Vec<(String, String)>> {
        let rows = sqlx::query(
            r#"
            SELECT role, content
            FROM messages
            WHERE session_id = ?
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(session_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut out: Vec<(String, String)> = rows
            .into_iter()
            .map(|r| (r.get::<String, _>("role"), r.get::<String, _>("content")))
            .collect();
        out.reverse();
        Ok(out)
    }
}

impl PendingQuestions for Database {
    async fn store(&self, session_id: &str, question: &GeneratedQuestion) -> Result<()> {
        self.ensure_session(session_id).await?;
        let json = serde_json::to_string(question).context("failed to encode pending question")?;
        sqlx::query(
            r#"
            INSERT INTO pending_questions (session_id, question_json, created_at)
            VALUES (?, ?, ?)
            ON CONFLICT(session_id) DO UPDATE SET
                question_json = excluded.question_json,
                created_at = excluded.created_at
            "#,
        )
        .bind(session_id)
        .bind(json)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn clear(&self, session_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM pending_questions WHERE session_id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn take(&self, session_id: &str) -> Result<Option<GeneratedQuestion>> {
        let row = sqlx::query(
            "DELETE FROM pending_questions WHERE session_id = ? RETURNING question_json",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| decode_question(&r.get::<String, _>("question_json")))
            .transpose()
    }

    async fn peek(&self, session_id: &str) -> Result<Option<GeneratedQuestion>> {
        let row = sqlx::query("SELECT question_json FROM pending_questions WHERE session_id = ?")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| decode_question(&r.get::<String, _>("question_json")))
            .transpose()
    }
}

fn decode_question(json: &str) -> Result<GeneratedQuestion> {
    serde_json::from_str(json).context("failed to decode pending question")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Difficulty, QuestionType};

    fn question(answer: &str) -> GeneratedQuestion {
        GeneratedQuestion {
            question: "배열의 길이를 구하는 속성은?".to_string(),
            options: vec![
                "size".to_string(),
                "length".to_string(),
                "count".to_string(),
                "len".to_string(),
            ],
            correct_answer: answer.to_string(),
            explanation: "배열은 length 속성을 가진다.".to_string(),
            chapter: None,
            concept_keywords: vec!["배열".to_string()],
            difficulty: Difficulty::Normal,
            question_type: QuestionType::MultipleChoice,
            degraded_fields: vec![],
        }
    }

    #[tokio::test]
    async fn pending_question_round_trip_per_session() {
        let db = Database::in_memory().await.expect("db");
        db.store("a", &question("2")).await.expect("store a");
        db.store("b", &question("4")).await.expect("store b");
        db.store("a", &question("3")).await.expect("replace a");

        let peeked = db.peek("a").await.expect("peek").expect("present");
        assert_eq!(peeked.correct_answer, "3");

        let taken = db.take("a").await.expect("take").expect("present");
        assert_eq!(taken.correct_answer, "3");
        assert!(db.take("a").await.expect("take again").is_none());
        assert_eq!(
            db.peek("b").await.expect("peek b").map(|q| q.correct_answer),
            Some("4".to_string())
        );

        db.clear("b").await.expect("clear");
        assert!(db.peek("b").await.expect("peek b").is_none());
    }

    #[tokio::test]
    async fn messages_come_back_in_insertion_order() {
        let db = Database::in_memory().await.expect("db");
        let session = db.create_session().await.expect("session");
        db.save_message(&session, "user", "배열 문제").await.expect("save");
        db.save_message(&session, "assistant", "문제: ...").await.expect("save");
        db.save_message(&session, "user", "2").await.expect("save");

        let messages = db.latest_messages(&session, 2).await.expect("messages");
        assert_eq!(
            messages,
            vec![
                ("assistant".to_string(), "문제: ...".to_string()),
                ("user".to_string(), "2".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn latest_manifest_wins() {
        let db = Database::in_memory().await.expect("db");
        assert!(db.latest_manifest().await.expect("query").is_none());
        for (hash, count) in [("aaa", 10), ("bbb", 12)] {
            db.record_manifest(&IngestManifest {
                pdf_hash: hash.to_string(),
                created_at: Utc::now(),
                chunk_count: count,
            })
            .await
            .expect("record");
        }
        let latest = db.latest_manifest().await.expect("query").expect("present");
        assert_eq!(latest.pdf_hash, "bbb");
        assert_eq!(latest.chunk_count, 12);
    }
}
