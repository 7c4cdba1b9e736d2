//! SQLite persistence for router weights, feedback and episodic memory.
//!
//! One [`Database`] backs both [`RouterWeightStorage`] and [`MemoryService`].
//! Tables are created on open if missing. Trait methods run their SQLite
//! work on the blocking pool so callers can bound them with a timeout.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::lexical::{extract_bigrams, jaccard};
use crate::traits::{MemoryService, RouterWeightStorage};
use crate::util::window_start;
use crate::types::{
    clamp_confidence, clamp_weight, AgentType, Category, EpisodicMemory, Intent, KeywordWeight,
    Outcome, RouterFeedback, RouterStats, UserId, WeightTable,
};

/// Most recent successful episodes considered by a history search.
const EPISODE_SEARCH_POOL: i64 = 200;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS router_weight (
    user_id     INTEGER NOT NULL,
    category    TEXT    NOT NULL,
    keyword     TEXT    NOT NULL,
    weight      INTEGER NOT NULL,
    updated_at  INTEGER NOT NULL,
    PRIMARY KEY (user_id, category, keyword)
);

CREATE TABLE IF NOT EXISTS router_feedback (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id        INTEGER NOT NULL,
    input          TEXT    NOT NULL,
    predicted      TEXT    NOT NULL,
    actual         TEXT    NOT NULL,
    feedback_type  TEXT    NOT NULL,
    timestamp      INTEGER NOT NULL,
    source         TEXT    NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_router_feedback_user_ts
    ON router_feedback (user_id, timestamp);

CREATE TABLE IF NOT EXISTS episodic_memory (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id     INTEGER NOT NULL,
    timestamp   INTEGER NOT NULL,
    agent_type  TEXT    NOT NULL,
    user_input  TEXT    NOT NULL,
    outcome     TEXT    NOT NULL,
    summary     TEXT    NOT NULL DEFAULT '',
    importance  REAL    NOT NULL DEFAULT 0.5
);
CREATE INDEX IF NOT EXISTS idx_episodic_memory_user_ts
    ON episodic_memory (user_id, timestamp DESC);
";

/// Database connection wrapper.
///
/// Thread-safe via internal Mutex. All database operations acquire the lock.
/// Clones share the same connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (creating if needed) the database at `path`.
    pub fn open_path(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path).map_err(Error::Database)?;
        Self::from_connection(conn)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(Error::Database)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| Error::LockPoisoned)
    }

    /// Run `f` against a clone of this handle on the blocking pool.
    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| Error::storage(format!("database task failed: {}", e)))?
    }

    /// Check database connectivity
    pub fn ping(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch("SELECT 1").map_err(Error::Database)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Weights
    // ─────────────────────────────────────────────────────────────────────────

    /// Stored weight rows of a user. Rows with an unknown category are skipped.
    pub fn keyword_weights(&self, user_id: UserId) -> Result<Vec<KeywordWeight>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT category, keyword, weight FROM router_weight
             WHERE user_id = ?1
             ORDER BY category, keyword",
        )?;
        let rows = stmt
            .query_map(params![user_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i32>(2)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut weights = Vec::with_capacity(rows.len());
        for (category, keyword, weight) in rows {
            match Category::parse(&category) {
                Some(category) => weights.push(KeywordWeight {
                    user_id,
                    category,
                    keyword,
                    weight: clamp_weight(weight),
                }),
                None => warn!(category = %category, "skipping weight with unknown category"),
            }
        }
        Ok(weights)
    }

    /// Load a user's stored weights.
    pub fn load_weights(&self, user_id: UserId) -> Result<WeightTable> {
        let mut table = WeightTable::new();
        for kw in self.keyword_weights(user_id)? {
            table.entry(kw.category).or_default().insert(kw.keyword, kw.weight);
        }
        Ok(table)
    }

    /// Upsert weights in one transaction.
    pub fn upsert_weights(&self, user_id: UserId, weights: &WeightTable) -> Result<()> {
        let mut conn = self.lock()?;
        let now = Utc::now().timestamp_millis();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO router_weight (user_id, category, keyword, weight, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (user_id, category, keyword)
                 DO UPDATE SET weight = excluded.weight, updated_at = excluded.updated_at",
            )?;
            for (category, keywords) in weights {
                for (keyword, weight) in keywords {
                    stmt.execute(params![
                        user_id,
                        category.as_str(),
                        keyword,
                        clamp_weight(*weight),
                        now
                    ])?;
                }
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Delete all of a user's stored weights. Returns the number removed.
    pub fn clear_weights(&self, user_id: UserId) -> Result<usize> {
        let conn = self.lock()?;
        let removed = conn.execute("DELETE FROM router_weight WHERE user_id = ?1", params![user_id])?;
        Ok(removed)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Feedback
    // ─────────────────────────────────────────────────────────────────────────

    /// Append a feedback event.
    pub fn insert_feedback(&self, feedback: &RouterFeedback) -> Result<i64> {
        let conn = self.lock()?;
        let timestamp = if feedback.timestamp == 0 {
            Utc::now().timestamp()
        } else {
            feedback.timestamp
        };
        conn.execute(
            "INSERT INTO router_feedback
             (user_id, input, predicted, actual, feedback_type, timestamp, source)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                feedback.user_id,
                feedback.input,
                feedback.predicted.as_str(),
                feedback.actual.as_str(),
                feedback.feedback_type.as_str(),
                timestamp,
                feedback.source.as_str(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Aggregate feedback for `user_id` recorded at or after `since` (unix seconds).
    pub fn feedback_stats(&self, user_id: UserId, since: i64) -> Result<RouterStats> {
        let conn = self.lock()?;
        let mut stats = RouterStats::empty();

        let (total, correct): (i64, i64) = conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(CASE WHEN feedback_type = 'positive' THEN 1 ELSE 0 END), 0)
             FROM router_feedback
             WHERE user_id = ?1 AND timestamp >= ?2",
            params![user_id, since],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        stats.total_predictions = total;
        stats.correct_count = correct;
        stats.incorrect_count = total - correct;
        if total > 0 {
            stats.accuracy = correct as f64 / total as f64;
        }

        let mut stmt = conn.prepare(
            "SELECT predicted, COUNT(*) FROM router_feedback
             WHERE user_id = ?1 AND timestamp >= ?2
             GROUP BY predicted",
        )?;
        let by_intent = stmt
            .query_map(params![user_id, since], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        for (intent, count) in by_intent {
            match intent.parse::<Intent>() {
                Ok(intent) => {
                    stats.by_intent.insert(intent, count);
                }
                Err(e) => debug!(error = %e, "skipping feedback with unknown intent"),
            }
        }

        let mut stmt = conn.prepare(
            "SELECT source, COUNT(*) FROM router_feedback
             WHERE user_id = ?1 AND timestamp >= ?2
             GROUP BY source",
        )?;
        let by_source = stmt
            .query_map(params![user_id, since], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<std::result::Result<HashMap<_, _>, _>>()?;
        stats.by_source = by_source;

        Ok(stats)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Episodic memory
    // ─────────────────────────────────────────────────────────────────────────

    /// Persist an episode, returning its id.
    pub fn insert_episode(&self, episode: &EpisodicMemory) -> Result<i64> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO episodic_memory
             (user_id, timestamp, agent_type, user_input, outcome, summary, importance)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                episode.user_id,
                episode.timestamp.timestamp_millis(),
                episode.agent_type.as_str(),
                episode.user_input,
                episode.outcome.as_str(),
                episode.summary,
                clamp_confidence(episode.importance) as f64,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Most recent episodes of a user, newest first.
    pub fn recent_episodes(&self, user_id: UserId, limit: i64) -> Result<Vec<EpisodicMemory>> {
        self.query_episodes(
            "SELECT id, user_id, timestamp, agent_type, user_input, outcome, summary, importance
             FROM episodic_memory
             WHERE user_id = ?1
             ORDER BY timestamp DESC, id DESC
             LIMIT ?2",
            user_id,
            limit,
        )
    }

    /// Most recent successful episodes of a user, newest first.
    pub fn recent_successful_episodes(
        &self,
        user_id: UserId,
        limit: i64,
    ) -> Result<Vec<EpisodicMemory>> {
        self.query_episodes(
            "SELECT id, user_id, timestamp, agent_type, user_input, outcome, summary, importance
             FROM episodic_memory
             WHERE user_id = ?1 AND outcome = 'success'
             ORDER BY timestamp DESC, id DESC
             LIMIT ?2",
            user_id,
            limit,
        )
    }

    fn query_episodes(&self, sql: &str, user_id: UserId, limit: i64) -> Result<Vec<EpisodicMemory>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let episodes = stmt
            .query_map(params![user_id, limit], Self::map_episode)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(episodes)
    }

    /// Successful episodes most similar to `query`, newest first among equal scores.
    pub fn similar_episodes(
        &self,
        user_id: UserId,
        query: &str,
        limit: usize,
    ) -> Result<Vec<EpisodicMemory>> {
        let candidates = self.recent_successful_episodes(user_id, EPISODE_SEARCH_POOL)?;
        let query_bigrams = extract_bigrams(query);

        let mut scored: Vec<(f32, EpisodicMemory)> = candidates
            .into_iter()
            .map(|ep| (jaccard(&query_bigrams, &extract_bigrams(&ep.user_input)), ep))
            .collect();
        // Stable sort keeps newest-first among equal scores.
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        Ok(scored.into_iter().take(limit).map(|(_, ep)| ep).collect())
    }

    fn map_episode(row: &rusqlite::Row) -> rusqlite::Result<EpisodicMemory> {
        let millis: i64 = row.get(2)?;
        let agent_type: String = row.get(3)?;
        let outcome: String = row.get(5)?;
        let importance: f64 = row.get(7)?;
        Ok(EpisodicMemory {
            id: row.get(0)?,
            user_id: row.get(1)?,
            timestamp: DateTime::from_timestamp_millis(millis).unwrap_or_default(),
            agent_type: AgentType::parse(&agent_type),
            user_input: row.get(4)?,
            outcome: Outcome::parse(&outcome),
            summary: row.get(6)?,
            importance: importance as f32,
        })
    }
}

#[async_trait]
impl RouterWeightStorage for Database {
    async fn get_weights(&self, user_id: UserId) -> Result<WeightTable> {
        self.blocking(move |db| db.load_weights(user_id)).await
    }

    async fn save_weights(&self, user_id: UserId, weights: &WeightTable) -> Result<()> {
        let weights = weights.clone();
        self.blocking(move |db| db.upsert_weights(user_id, &weights)).await
    }

    async fn record_feedback(&self, feedback: &RouterFeedback) -> Result<()> {
        let feedback = feedback.clone();
        self.blocking(move |db| db.insert_feedback(&feedback).map(|_| ()))
            .await
    }

    async fn get_stats(&self, user_id: UserId, window: Duration) -> Result<RouterStats> {
        let since = window_start(Utc::now().timestamp(), window);
        self.blocking(move |db| db.feedback_stats(user_id, since)).await
    }
}

#[async_trait]
impl MemoryService for Database {
    async fn search_episodes(
        &self,
        user_id: UserId,
        query: &str,
        limit: usize,
    ) -> Result<Vec<EpisodicMemory>> {
        let query = query.to_string();
        self.blocking(move |db| db.similar_episodes(user_id, &query, limit))
            .await
    }

    async fn save_episode(&self, episode: EpisodicMemory) -> Result<()> {
        self.blocking(move |db| db.insert_episode(&episode).map(|_| ()))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ClassificationSource, FeedbackType};
    use tempfile::tempdir;
    use tokio_test::assert_ok;

    fn feedback(kind: FeedbackType, source: ClassificationSource, timestamp: i64) -> RouterFeedback {
        RouterFeedback {
            user_id: 1,
            input: "明天会议".into(),
            predicted: Intent::ScheduleQuery,
            actual: Intent::ScheduleQuery,
            feedback_type: kind,
            timestamp,
            source,
        }
    }

    #[test]
    fn test_open_path_creates_schema() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("cascade.db");
        let db = Database::open_path(&path).unwrap();
        db.ping().unwrap();
        assert!(path.exists());

        // Reopening is idempotent.
        drop(db);
        Database::open_path(&path).unwrap().ping().unwrap();
    }

    #[tokio::test]
    async fn test_weights_upsert_and_merge() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.get_weights(1).await.unwrap().is_empty());

        let mut first = WeightTable::new();
        first.entry(Category::Schedule).or_default().insert("会议".into(), 3);
        first.entry(Category::Memo).or_default().insert("笔记".into(), 9);
        db.save_weights(1, &first).await.unwrap();

        let mut second = WeightTable::new();
        second.entry(Category::Schedule).or_default().insert("会议".into(), 4);
        db.save_weights(1, &second).await.unwrap();

        let weights = db.get_weights(1).await.unwrap();
        assert_eq!(weights[&Category::Schedule]["会议"], 4);
        assert_eq!(weights[&Category::Memo]["笔记"], 5);
        assert!(db.get_weights(2).await.unwrap().is_empty());

        assert_eq!(db.clear_weights(1).unwrap(), 2);
        assert!(db.get_weights(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_feedback_stats_window() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now().timestamp();
        db.record_feedback(&feedback(FeedbackType::Positive, ClassificationSource::Rule, now))
            .await
            .unwrap();
        db.record_feedback(&feedback(FeedbackType::Switch, ClassificationSource::Llm, now))
            .await
            .unwrap();
        db.record_feedback(&feedback(FeedbackType::Positive, ClassificationSource::Rule, now - 7200))
            .await
            .unwrap();

        let stats = db.get_stats(1, Duration::from_secs(3600)).await.unwrap();
        assert_eq!(stats.total_predictions, 2);
        assert_eq!(stats.correct_count, 1);
        assert_eq!(stats.incorrect_count, 1);
        assert!((stats.accuracy - 0.5).abs() < f64::EPSILON);
        assert_eq!(stats.by_intent[&Intent::ScheduleQuery], 2);
        assert_eq!(stats.by_source["llm"], 1);
        assert_eq!(stats.by_source["rule"], 1);

        let empty = db.get_stats(2, Duration::from_secs(3600)).await.unwrap();
        assert_eq!(empty.total_predictions, 0);
        assert_eq!(empty.accuracy, 0.0);
    }

    #[tokio::test]
    async fn test_feedback_zero_timestamp_is_now() {
        let db = Database::open_in_memory().unwrap();
        db.record_feedback(&feedback(FeedbackType::Positive, ClassificationSource::Cache, 0))
            .await
            .unwrap();
        let stats = db.get_stats(1, Duration::from_secs(60)).await.unwrap();
        assert_eq!(stats.total_predictions, 1);
    }

    #[tokio::test]
    async fn test_episode_search_ranks_by_overlap() {
        let db = Database::open_in_memory().unwrap();
        for (input, intent) in [
            ("搜索会议笔记", Intent::MemoSearch),
            ("明天有什么会议", Intent::ScheduleQuery),
            ("帮我翻译一下", Intent::General),
        ] {
            db.save_episode(EpisodicMemory::routing_decision(1, input, intent, true))
                .await
                .unwrap();
        }
        db.save_episode(EpisodicMemory::routing_decision(
            2,
            "明天有什么会议",
            Intent::ScheduleQuery,
            true,
        ))
        .await
        .unwrap();

        let found = db.search_episodes(1, "明天有什么安排", 2).await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].user_input, "明天有什么会议");
        assert_eq!(found[0].agent_type, AgentType::Schedule);
        assert!(found[0].is_success());
        assert_eq!(found[0].summary, "routing_decision:schedule_query");
        assert!(found.iter().all(|ep| ep.user_id == 1));
    }

    #[tokio::test]
    async fn test_feedback_stats_unbounded_window() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now().timestamp();
        assert_ok!(
            db.record_feedback(&feedback(FeedbackType::Positive, ClassificationSource::Rule, now))
                .await
        );

        let stats = assert_ok!(db.get_stats(1, Duration::from_secs(u64::MAX)).await);
        assert_eq!(stats.total_predictions, 1);
        assert_eq!(stats.correct_count, 1);
    }

    #[tokio::test]
    async fn test_episode_search_skips_failures() {
        let db = Database::open_in_memory().unwrap();
        db.save_episode(EpisodicMemory::routing_decision(
            1,
            "明天有什么会议",
            Intent::ScheduleQuery,
            true,
        ))
        .await
        .unwrap();
        // Newer and identical to the query, but a failed routing.
        db.save_episode(EpisodicMemory::routing_decision(
            1,
            "明天有什么安排",
            Intent::MemoSearch,
            false,
        ))
        .await
        .unwrap();

        let found = db.search_episodes(1, "明天有什么安排", 5).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].user_input, "明天有什么会议");
        assert!(found[0].is_success());

        // The unfiltered listing still keeps both.
        assert_eq!(db.recent_episodes(1, 10).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_keyword_weights_rows() {
        let db = Database::open_in_memory().unwrap();
        let mut table = WeightTable::new();
        table.entry(Category::Schedule).or_default().insert("会议".into(), 0);
        db.upsert_weights(7, &table).unwrap();
        {
            let conn = db.lock().unwrap();
            conn.execute(
                "INSERT INTO router_weight (user_id, category, keyword, weight, updated_at)
                 VALUES (7, 'weather', '下雨', 3, 0)",
                [],
            )
            .unwrap();
        }

        let rows = db.keyword_weights(7).unwrap();
        assert_eq!(
            rows,
            vec![KeywordWeight {
                user_id: 7,
                category: Category::Schedule,
                keyword: "会议".into(),
                weight: 1,
            }]
        );
        assert_eq!(db.load_weights(7).unwrap()[&Category::Schedule]["会议"], 1);
    }

    #[tokio::test]
    async fn test_trait_calls_do_not_block_on_held_connection() {
        let db = Database::open_in_memory().unwrap();
        let conn = db.conn.clone();
        let (locked_tx, locked_rx) = std::sync::mpsc::channel();
        let holder = std::thread::spawn(move || {
            let _guard = conn.lock();
            let _ = locked_tx.send(());
            std::thread::sleep(Duration::from_millis(600));
        });
        locked_rx.recv().unwrap();

        let save = db.save_episode(EpisodicMemory::routing_decision(
            1,
            "明天有什么会议",
            Intent::ScheduleQuery,
            true,
        ));
        let result = tokio::time::timeout(Duration::from_millis(20), save).await;
        assert!(result.is_err(), "save should still be waiting on the connection");

        holder.join().unwrap();
        assert_ok!(db.ping());
    }
}
