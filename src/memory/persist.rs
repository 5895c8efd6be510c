//! SQLite-backed persistent memory with vector recall.
//!
//! Chat history rows carry an embedding BLOB (little-endian f32 array).
//! Retrieval scores rows with a `cosine_similarity` scalar function
//! registered on every pooled connection; for normalized vectors the score
//! is the plain dot product. Writes are serialized by a process-wide mutex
//! (SQLite single-writer discipline); reads go through the connection pool.

use std::path::Path;
use std::sync::{Arc, Mutex};

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::functions::FunctionFlags;
use rusqlite::{params, Connection};
use tracing::warn;

use crate::error::{PicoError, Result};
use crate::session::Message;

use super::embedder::EmbedProvider;
use super::{MemoryItem, MemoryKind};

/// Default similarity threshold for recall.
pub const DEFAULT_THRESHOLD: f64 = 0.87;

/// Default number of items returned by a query.
pub const DEFAULT_TOP_K: usize = 10;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS history (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    channel_id  TEXT NOT NULL,
    role        TEXT NOT NULL,
    content     TEXT NOT NULL,
    timestamp   TEXT NOT NULL,
    embedding   BLOB NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_channel_id ON history(channel_id);
";

/// Embedded chat history with cosine-similarity recall.
pub struct PersistentMemory {
    pool: Pool<SqliteConnectionManager>,
    write_lock: Mutex<()>,
    embedder: Arc<dyn EmbedProvider>,
    threshold: f64,
    top_k: usize,
}

impl PersistentMemory {
    /// Open (or create) the database at `db_path`.
    ///
    /// `threshold <= 0` and `top_k == 0` select the defaults (0.87, 10).
    pub fn open(
        db_path: &Path,
        embedder: Arc<dyn EmbedProvider>,
        threshold: f64,
        top_k: usize,
    ) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let manager = SqliteConnectionManager::file(db_path).with_init(register_functions);
        let pool = Pool::builder()
            .build(manager)
            .map_err(|e| PicoError::Memory(format!("opening sqlite pool: {}", e)))?;

        {
            let conn = pool
                .get()
                .map_err(|e| PicoError::Memory(format!("sqlite connection: {}", e)))?;
            conn.execute_batch(SCHEMA)?;
        }

        Ok(Self {
            pool,
            write_lock: Mutex::new(()),
            embedder,
            threshold: if threshold <= 0.0 {
                DEFAULT_THRESHOLD
            } else {
                threshold
            },
            top_k: if top_k == 0 { DEFAULT_TOP_K } else { top_k },
        })
    }

    /// Embed `content` and insert one history row in its own transaction.
    pub fn store_history(
        &self,
        channel_id: &str,
        role: &str,
        content: &str,
        timestamp: &str,
    ) -> Result<()> {
        let embedding = self
            .embedder
            .embed(content)
            .map_err(|e| PicoError::Memory(format!("embedding content: {}", e)))?;

        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut conn = self
            .pool
            .get()
            .map_err(|e| PicoError::Memory(format!("sqlite connection: {}", e)))?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO history (channel_id, role, content, timestamp, embedding)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![channel_id, role, content, timestamp, floats_to_bytes(&embedding)],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Insert many messages in one transaction with one prepared statement.
    ///
    /// Any embedding or insert failure rolls the whole batch back.
    pub fn batch_store_history(&self, channel_id: &str, items: &[Message]) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }

        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut conn = self
            .pool
            .get()
            .map_err(|e| PicoError::Memory(format!("sqlite connection: {}", e)))?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO history (channel_id, role, content, timestamp, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for item in items {
                let embedding = self.embedder.embed(&item.content)?;
                stmt.execute(params![
                    channel_id,
                    item.role.to_string(),
                    item.content,
                    item.timestamp,
                    floats_to_bytes(&embedding)
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Recall the most similar stored items for `query`.
    ///
    /// Returns up to `top_k` items (0 selects the configured default) with
    /// similarity at or above the threshold, in descending similarity order.
    /// The channel filter applies only when `channel_id` is non-empty.
    pub fn query_history(
        &self,
        channel_id: &str,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<MemoryItem>> {
        let embedding = self
            .embedder
            .embed(query)
            .map_err(|e| PicoError::Memory(format!("embedding query: {}", e)))?;
        let blob = floats_to_bytes(&embedding);
        let top_k = if top_k == 0 { self.top_k } else { top_k };

        let conn = self
            .pool
            .get()
            .map_err(|e| PicoError::Memory(format!("sqlite connection: {}", e)))?;

        let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<MemoryItem> {
            Ok(MemoryItem {
                role: row.get(0)?,
                text: row.get(1)?,
                timestamp: row.get(2)?,
                similarity: row.get(3)?,
                kind: MemoryKind::Persistent,
            })
        };

        let items = if channel_id.is_empty() {
            let mut stmt = conn.prepare(
                "SELECT role, content, timestamp, cosine_similarity(embedding, ?1) AS similarity
                 FROM history
                 WHERE similarity >= ?2
                 ORDER BY similarity DESC
                 LIMIT ?3",
            )?;
            let rows = stmt.query_map(params![blob, self.threshold, top_k as i64], map_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        } else {
            let mut stmt = conn.prepare(
                "SELECT role, content, timestamp, cosine_similarity(embedding, ?1) AS similarity
                 FROM history
                 WHERE similarity >= ?2
                 AND channel_id = ?3
                 ORDER BY similarity DESC
                 LIMIT ?4",
            )?;
            let rows = stmt.query_map(
                params![blob, self.threshold, channel_id, top_k as i64],
                map_row,
            )?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };

        Ok(items)
    }

    /// Number of stored history rows.
    pub fn len(&self) -> Result<usize> {
        let conn = self
            .pool
            .get()
            .map_err(|e| PicoError::Memory(format!("sqlite connection: {}", e)))?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM history", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Check whether the store holds no rows.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Embed text with the configured embedder.
    pub fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embedder.embed(text)
    }
}

/// Register the deterministic similarity functions on a connection.
///
/// Determinism is declared so the query planner may cache results within a
/// statement.
fn register_functions(conn: &mut Connection) -> rusqlite::Result<()> {
    let flags = FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC;

    conn.create_scalar_function("cosine_similarity", 2, flags, |ctx| {
        let a = ctx.get_raw(0).as_blob().map_err(into_user_error)?;
        let b = ctx.get_raw(1).as_blob().map_err(into_user_error)?;
        blob_dot(a, b).map_err(|e| rusqlite::Error::UserFunctionError(e.into()))
    })?;

    conn.create_scalar_function("cosine_distance", 2, flags, |ctx| {
        let a = ctx.get_raw(0).as_blob().map_err(into_user_error)?;
        let b = ctx.get_raw(1).as_blob().map_err(into_user_error)?;
        if a.is_empty() || b.is_empty() {
            return Ok(1.0);
        }
        blob_dot(a, b)
            .map(|sim| 1.0 - sim)
            .map_err(|e| rusqlite::Error::UserFunctionError(e.into()))
    })?;

    Ok(())
}

fn into_user_error(e: rusqlite::types::FromSqlError) -> rusqlite::Error {
    rusqlite::Error::UserFunctionError(Box::new(e))
}

/// Dot product of two BLOBs holding little-endian f32 arrays.
///
/// Mismatched lengths are tolerated: the shorter BLOB is zero-padded to the
/// longer. With normalized inputs the dot product is the cosine similarity.
fn blob_dot(a: &[u8], b: &[u8]) -> std::result::Result<f64, String> {
    if a.len() % 4 != 0 || b.len() % 4 != 0 {
        return Err("blobs must contain whole float32 values".to_string());
    }
    if a.is_empty() || b.is_empty() {
        return Ok(0.0);
    }

    let (a_vec, b_vec) = if a.len() != b.len() {
        warn!(
            a_len = a.len() / 4,
            b_len = b.len() / 4,
            "vector dimension mismatch, zero-padding shorter vector"
        );
        let len = a.len().max(b.len());
        let mut a_pad = a.to_vec();
        let mut b_pad = b.to_vec();
        a_pad.resize(len, 0);
        b_pad.resize(len, 0);
        (bytes_to_floats(&a_pad), bytes_to_floats(&b_pad))
    } else {
        (bytes_to_floats(a), bytes_to_floats(b))
    };

    let mut dot = 0.0f64;
    for (x, y) in a_vec.iter().zip(b_vec.iter()) {
        dot += (*x as f64) * (*y as f64);
    }
    Ok(dot)
}

/// Encode a float vector as a little-endian BLOB.
pub(crate) fn floats_to_bytes(vec: &[f32]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(vec.len() * 4);
    for f in vec {
        buf.extend_from_slice(&f.to_le_bytes());
    }
    buf
}

/// Decode a little-endian BLOB into a float vector.
pub(crate) fn bytes_to_floats(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Deterministic embedder: known phrases share a direction, everything
    /// else is orthogonal.
    struct StubEmbedder;

    impl EmbedProvider for StubEmbedder {
        fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let lower = text.to_lowercase();
            let mut v = vec![0.0f32; 4];
            if lower.contains("password") {
                v[0] = 1.0;
            } else if lower.contains("weather") {
                v[1] = 1.0;
            } else {
                v[2] = 1.0;
            }
            Ok(v)
        }
    }

    fn store() -> (PersistentMemory, TempDir) {
        let dir = TempDir::new().unwrap();
        let mem = PersistentMemory::open(
            &dir.path().join("memory.db"),
            Arc::new(StubEmbedder),
            0.0,
            0,
        )
        .unwrap();
        (mem, dir)
    }

    #[test]
    fn test_blob_roundtrip() {
        let vec = vec![1.0f32, -0.5, 0.25, 1e-7];
        let bytes = floats_to_bytes(&vec);
        assert_eq!(bytes.len(), 16);
        assert_eq!(bytes_to_floats(&bytes), vec);
    }

    #[test]
    fn test_self_similarity_is_one() {
        // cosine_similarity(v, v) ~ 1 for any normalized v.
        let v = {
            let mut v = vec![0.3f32, -0.4, 0.5, 0.1, 0.7];
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            v.iter_mut().for_each(|x| *x /= norm);
            v
        };
        let blob = floats_to_bytes(&v);
        let sim = blob_dot(&blob, &blob).unwrap();
        assert!((sim - 1.0).abs() < 1e-5, "self similarity was {}", sim);
    }

    #[test]
    fn test_distance_is_one_minus_similarity() {
        let (mem, _dir) = store();
        let conn = mem.pool.get().unwrap();
        let a = floats_to_bytes(&[0.6f32, 0.8]);
        let b = floats_to_bytes(&[1.0f32, 0.0]);
        let (sim, dist): (f64, f64) = conn
            .query_row(
                "SELECT cosine_similarity(?1, ?2), cosine_distance(?1, ?2)",
                params![a, b],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(dist, 1.0 - sim);
    }

    #[test]
    fn test_dimension_mismatch_zero_pads() {
        let a = floats_to_bytes(&[1.0f32, 0.0, 0.5]);
        let b = floats_to_bytes(&[1.0f32]);
        // Padded dot: 1*1 + 0*0 + 0.5*0 = 1.0, not an error.
        let sim = blob_dot(&a, &b).unwrap();
        assert_eq!(sim, 1.0);
    }

    #[test]
    fn test_ragged_blob_is_an_error() {
        let a = vec![1u8, 2, 3];
        let b = floats_to_bytes(&[1.0f32]);
        assert!(blob_dot(&a, &b).is_err());
    }

    #[test]
    fn test_store_and_recall() {
        let (mem, _dir) = store();
        mem.store_history(
            "c1",
            "assistant",
            "the password is 42",
            "2026-01-01T00:00:00Z",
        )
        .unwrap();
        mem.store_history(
            "c1",
            "assistant",
            "the weather is sunny",
            "2026-01-01T00:01:00Z",
        )
        .unwrap();

        let results = mem.query_history("c1", "what is the password", 0).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].text, "the password is 42");
        assert_eq!(results[0].role, "assistant");
        assert_eq!(results[0].kind, MemoryKind::Persistent);
        assert!(results[0].similarity >= DEFAULT_THRESHOLD);
    }

    #[test]
    fn test_channel_filter() {
        let (mem, _dir) = store();
        mem.store_history("c1", "assistant", "the password is 42", "t1")
            .unwrap();
        mem.store_history("c2", "assistant", "another password here", "t2")
            .unwrap();

        let c1 = mem.query_history("c1", "password", 0).unwrap();
        assert_eq!(c1.len(), 1);
        assert_eq!(c1[0].text, "the password is 42");

        // Empty channel matches all channels.
        let all = mem.query_history("", "password", 0).unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_query_respects_top_k_and_ordering() {
        let (mem, _dir) = store();
        for i in 0..5 {
            mem.store_history("c1", "assistant", &format!("password note {}", i), "t")
                .unwrap();
        }

        let results = mem.query_history("c1", "password", 3).unwrap();
        assert_eq!(results.len(), 3);
        for pair in results.windows(2) {
            assert!(
                pair[0].similarity >= pair[1].similarity,
                "results must be sorted non-increasing"
            );
        }
        for item in &results {
            assert!(item.similarity >= DEFAULT_THRESHOLD);
        }
    }

    #[test]
    fn test_threshold_filters_low_similarity() {
        let (mem, _dir) = store();
        mem.store_history("c1", "assistant", "the weather is sunny", "t")
            .unwrap();
        // Orthogonal query: similarity 0 < 0.87.
        let results = mem.query_history("c1", "password", 0).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_batch_store() {
        let (mem, _dir) = store();
        let items = vec![
            Message::assistant("password alpha"),
            Message::assistant("password beta"),
            Message::tool_result("call_1", "password gamma"),
        ];
        mem.batch_store_history("c1", &items).unwrap();
        assert_eq!(mem.len().unwrap(), 3);

        let results = mem.query_history("c1", "password", 0).unwrap();
        assert_eq!(results.len(), 3);
    }

    #[test]
    fn test_batch_store_empty_is_noop() {
        let (mem, _dir) = store();
        mem.batch_store_history("c1", &[]).unwrap();
        assert!(mem.is_empty().unwrap());
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("memory.db");
        {
            let mem =
                PersistentMemory::open(&db, Arc::new(StubEmbedder), 0.0, 0).unwrap();
            mem.store_history("c1", "assistant", "the password is 42", "t")
                .unwrap();
        }
        {
            let mem =
                PersistentMemory::open(&db, Arc::new(StubEmbedder), 0.0, 0).unwrap();
            let results = mem.query_history("c1", "password", 0).unwrap();
            assert_eq!(results.len(), 1);
        }
    }
}
