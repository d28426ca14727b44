//! SQLite-backed vector store.
//!
//! Chunks are stored with their embedding as a little-endian f32 BLOB and
//! searched with a brute-force cosine scan. Good enough for a personal
//! library of a few thousand chunks.

use baixiao_core::error::{BaixiaoError, Result};
use rusqlite::{Connection, params};
use std::path::Path;
use std::sync::Mutex;

/// A stored chunk returned by a similarity search.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub id: String,
    pub source: String,
    pub content: String,
    pub score: f32,
}

pub struct KnowledgeStore {
    conn: Mutex<Connection>,
}

fn db_err(e: rusqlite::Error) -> BaixiaoError {
    BaixiaoError::Knowledge(e.to_string())
}

fn insert_chunk(conn: &Connection, id: &str, source: &str, content: &str, embedding: &[f32]) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO chunks (id, source, content, embedding, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            id,
            source,
            content,
            encode_embedding(embedding),
            chrono::Utc::now().to_rfc3339()
        ],
    )
    .map_err(db_err)?;
    Ok(())
}

impl KnowledgeStore {
    /// Open (or create) the store at `path`. `":memory:"` gives a throwaway store.
    pub fn open(path: &Path) -> Result<Self> {
        if path != Path::new(":memory:")
            && let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(db_err)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                source TEXT NOT NULL,
                content TEXT NOT NULL,
                embedding BLOB NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_chunks_source ON chunks(source);",
        )
        .map_err(db_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| BaixiaoError::Knowledge("store lock poisoned".into()))
    }

    /// Insert or replace a chunk by id.
    pub fn upsert(&self, id: &str, source: &str, content: &str, embedding: &[f32]) -> Result<()> {
        let conn = self.conn()?;
        insert_chunk(&conn, id, source, content, embedding)
    }

    /// Swap all chunks of `source` for `chunks` (`(id, content, embedding)`)
    /// in one transaction. On error the previous chunks are kept.
    pub fn replace_source(&self, source: &str, chunks: &[(String, String, Vec<f32>)]) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(db_err)?;
        tx.execute("DELETE FROM chunks WHERE source = ?1", params![source])
            .map_err(db_err)?;
        for (id, content, embedding) in chunks {
            insert_chunk(&tx, id, source, content, embedding)?;
        }
        tx.commit().map_err(db_err)?;
        Ok(chunks.len())
    }

    /// Top-`k` chunks by cosine similarity to `query`, best first.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        if k == 0 {
            return Ok(vec![]);
        }
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT id, source, content, embedding FROM chunks")
            .map_err(db_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Vec<u8>>(3)?,
                ))
            })
            .map_err(db_err)?;

        let mut scored = Vec::new();
        for row in rows {
            let (id, source, content, blob) = row.map_err(db_err)?;
            let embedding = decode_embedding(&blob);
            if embedding.len() != query.len() {
                tracing::debug!("Skipping chunk {id}: dimension {} != {}", embedding.len(), query.len());
                continue;
            }
            scored.push(ScoredChunk {
                id,
                source,
                content,
                score: cosine_similarity(query, &embedding),
            });
        }

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);
        Ok(scored)
    }

    /// (distinct sources, chunks)
    pub fn stats(&self) -> (usize, usize) {
        let Ok(conn) = self.conn() else {
            return (0, 0);
        };
        let sources = conn
            .query_row("SELECT COUNT(DISTINCT source) FROM chunks", [], |r| r.get::<_, i64>(0))
            .unwrap_or(0);
        let chunks = conn
            .query_row("SELECT COUNT(*) FROM chunks", [], |r| r.get::<_, i64>(0))
            .unwrap_or(0);
        (sources as usize, chunks as usize)
    }
}

fn encode_embedding(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn decode_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut na = 0.0f32;
    let mut nb = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na.sqrt() * nb.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> KnowledgeStore {
        KnowledgeStore::open(Path::new(":memory:")).unwrap()
    }

    #[test]
    fn test_search_orders_by_similarity() {
        let kb = store();
        kb.upsert("a#0", "a.md", "cats", &[1.0, 0.0, 0.0]).unwrap();
        kb.upsert("b#0", "b.md", "dogs", &[0.0, 1.0, 0.0]).unwrap();
        kb.upsert("c#0", "c.md", "kittens", &[0.9, 0.1, 0.0]).unwrap();

        let hits = kb.search(&[1.0, 0.0, 0.0], 2).unwrap();
        let contents: Vec<_> = hits.iter().map(|h| h.content.as_str()).collect();
        assert_eq!(contents, vec!["cats", "kittens"]);
        assert!(hits[0].score >= hits[1].score);
    }

    #[test]
    fn test_upsert_replaces_by_id() {
        let kb = store();
        kb.upsert("x#0", "x.txt", "old", &[1.0, 0.0]).unwrap();
        kb.upsert("x#0", "x.txt", "new", &[1.0, 0.0]).unwrap();
        assert_eq!(kb.stats(), (1, 1));
        assert_eq!(kb.search(&[1.0, 0.0], 5).unwrap()[0].content, "new");
    }

    #[test]
    fn test_empty_store_and_zero_k() {
        let kb = store();
        assert!(kb.search(&[1.0], 5).unwrap().is_empty());
        kb.upsert("x#0", "x.txt", "text", &[1.0]).unwrap();
        assert!(kb.search(&[1.0], 0).unwrap().is_empty());
    }

    #[test]
    fn test_dimension_mismatch_is_skipped() {
        let kb = store();
        kb.upsert("x#0", "x.txt", "short", &[1.0]).unwrap();
        kb.upsert("y#0", "y.txt", "right", &[1.0, 0.0]).unwrap();
        let hits = kb.search(&[1.0, 0.0], 5).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "y#0");
    }

    fn chunk(id: &str, content: &str) -> (String, String, Vec<f32>) {
        (id.to_string(), content.to_string(), vec![1.0, 0.0])
    }

    #[test]
    fn test_replace_source_swaps_chunks() {
        let kb = store();
        kb.upsert("x.txt#0", "x.txt", "a", &[1.0, 0.0]).unwrap();
        kb.upsert("x.txt#1", "x.txt", "b", &[1.0, 0.0]).unwrap();
        kb.upsert("y.txt#0", "y.txt", "c", &[1.0, 0.0]).unwrap();

        let stored = kb.replace_source("x.txt", &[chunk("x.txt#0", "fresh")]).unwrap();
        assert_eq!(stored, 1);
        assert_eq!(kb.stats(), (2, 2));
        let contents: Vec<_> = kb
            .search(&[1.0, 0.0], 5)
            .unwrap()
            .into_iter()
            .map(|h| h.content)
            .collect();
        assert!(contents.contains(&"fresh".to_string()));
        assert!(!contents.contains(&"b".to_string()));
    }

    #[test]
    fn test_replace_source_rolls_back_on_failure() {
        let kb = store();
        kb.upsert("x.txt#0", "x.txt", "a", &[1.0, 0.0]).unwrap();
        kb.upsert("x.txt#1", "x.txt", "b", &[1.0, 0.0]).unwrap();
        kb.conn()
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER reject_bad BEFORE INSERT ON chunks WHEN NEW.content = 'bad'
                 BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            )
            .unwrap();

        let err = kb
            .replace_source("x.txt", &[chunk("x.txt#0", "good"), chunk("x.txt#1", "bad")])
            .unwrap_err();
        assert!(matches!(err, BaixiaoError::Knowledge(_)));

        // Old chunks survive untouched
        assert_eq!(kb.stats(), (1, 2));
        let mut contents: Vec<_> = kb
            .search(&[1.0, 0.0], 5)
            .unwrap()
            .into_iter()
            .map(|h| h.content)
            .collect();
        contents.sort();
        assert_eq!(contents, vec!["a", "b"]);
    }

    #[test]
    fn test_embedding_blob_roundtrip() {
        let v = vec![0.25f32, -3.5, 1e-3];
        assert_eq!(decode_embedding(&encode_embedding(&v)), v);
    }

    #[test]
    fn test_cosine_zero_vector() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }
}
