//! Message-store adapter
//!
//! Warm SQLite handle over a local message archive. Opened once at daemon
//! startup and held for the process lifetime; only the dispatcher calls into
//! it, so no locking is needed.
//!
//! The listing path is deliberately batched: `recent_conversations` fetches
//! ids in one query and enriches all of them with a single aggregate detail
//! query, instead of one detail query per conversation. The adapter counts
//! statements issued so the batching property stays testable.

use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime, Utc};
use rusqlite::{params_from_iter, Connection, Row};
use serde_json::{json, Value};

use gateway_common::GatewayError;

/// Adapter name surfaced in `BACKEND_ERROR` details.
pub const ADAPTER_NAME: &str = "message-store";

const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Snippet window (chars either side of a search match).
const SNIPPET_RADIUS: usize = 40;

#[derive(Debug)]
pub struct MessageStore {
    conn: Connection,
    path: String,
    queries_run: u64,
}

fn db_err(e: rusqlite::Error) -> GatewayError {
    if let rusqlite::Error::SqliteFailure(ref err, _) = e {
        if err.code == rusqlite::ErrorCode::PermissionDenied {
            return GatewayError::Auth {
                adapter: ADAPTER_NAME.to_string(),
                message: e.to_string(),
            };
        }
    }
    GatewayError::backend(ADAPTER_NAME, e)
}

impl MessageStore {
    /// Open an existing message archive. A missing file is a startup-fatal
    /// backend error; the daemon never creates the archive itself.
    pub fn open(path: &Path) -> Result<Self, GatewayError> {
        if !path.exists() {
            return Err(GatewayError::backend(
                ADAPTER_NAME,
                format!("database not found: {}", path.display()),
            ));
        }
        let conn = Connection::open(path).map_err(db_err)?;
        Ok(Self {
            conn,
            path: path.display().to_string(),
            queries_run: 0,
        })
    }

    /// In-memory store with an initialized schema, for tests and provisioning.
    pub fn open_in_memory() -> Result<Self, GatewayError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        let mut store = Self {
            conn,
            path: ":memory:".to_string(),
            queries_run: 0,
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create the archive schema. Used by provisioning scripts and tests.
    pub fn init_schema(&mut self) -> Result<(), GatewayError> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS conversations (
                    id INTEGER PRIMARY KEY,
                    contact TEXT NOT NULL,
                    display_name TEXT,
                    last_active TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS messages (
                    id INTEGER PRIMARY KEY,
                    conversation_id INTEGER NOT NULL REFERENCES conversations(id),
                    contact TEXT NOT NULL,
                    text TEXT NOT NULL,
                    sent_at TEXT NOT NULL,
                    is_from_me INTEGER NOT NULL DEFAULT 0,
                    is_read INTEGER NOT NULL DEFAULT 0
                );
                CREATE INDEX IF NOT EXISTS idx_messages_conversation
                    ON messages(conversation_id, sent_at);
                CREATE INDEX IF NOT EXISTS idx_messages_contact
                    ON messages(contact, sent_at);",
            )
            .map_err(db_err)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Statements issued since open. One statement is one round trip to the
    /// backing store.
    pub fn queries_run(&self) -> u64 {
        self.queries_run
    }

    /// Cheap consistency probe: can the archive currently be read.
    pub fn probe(&mut self) -> Result<Value, GatewayError> {
        let count = self.unread_count()?;
        Ok(json!({ "reachable": true, "unread": count }))
    }

    pub fn unread_count(&mut self) -> Result<i64, GatewayError> {
        self.queries_run += 1;
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM messages WHERE is_read = 0 AND is_from_me = 0",
                [],
                |row| row.get(0),
            )
            .map_err(db_err)
    }

    pub fn unread_messages(&mut self, limit: i64) -> Result<Vec<Value>, GatewayError> {
        self.queries_run += 1;
        let mut stmt = self
            .conn
            .prepare(
                "SELECT m.sent_at, m.contact, c.display_name, m.text, m.conversation_id
                 FROM messages m
                 JOIN conversations c ON c.id = m.conversation_id
                 WHERE m.is_read = 0 AND m.is_from_me = 0
                 ORDER BY m.sent_at DESC
                 LIMIT ?1",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map([limit], |row| {
                let sent_at: String = row.get(0)?;
                Ok(json!({
                    "date": sent_at,
                    "contact": row.get::<_, String>(1)?,
                    "display_name": row.get::<_, Option<String>>(2)?,
                    "text": row.get::<_, String>(3)?,
                    "conversation_id": row.get::<_, i64>(4)?,
                    "days_old": days_old(&sent_at),
                }))
            })
            .map_err(db_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(db_err)
    }

    /// Recent conversations with last-message detail.
    ///
    /// Two round trips total regardless of `limit`: one for the id page, one
    /// aggregate detail query.
    pub fn recent_conversations(&mut self, limit: i64) -> Result<Vec<Value>, GatewayError> {
        self.queries_run += 1;
        let ids: Vec<i64> = {
            let mut stmt = self
                .conn
                .prepare("SELECT id FROM conversations ORDER BY last_active DESC LIMIT ?1")
                .map_err(db_err)?;
            let rows = stmt.query_map([limit], |row| row.get(0)).map_err(db_err)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(db_err)?
        };
        self.conversation_details(&ids)
    }

    /// Batched detail fetch: one `IN (...)` query for the whole id list,
    /// results returned in input order. Unknown ids are skipped.
    pub fn conversation_details(&mut self, ids: &[i64]) -> Result<Vec<Value>, GatewayError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.queries_run += 1;
        let placeholders = vec!["?"; ids.len()].join(",");
        let sql = format!(
            "SELECT c.id, c.contact, c.display_name, c.last_active,
                    (SELECT text FROM messages m
                     WHERE m.conversation_id = c.id
                     ORDER BY m.sent_at DESC LIMIT 1) AS last_message,
                    (SELECT is_from_me FROM messages m
                     WHERE m.conversation_id = c.id
                     ORDER BY m.sent_at DESC LIMIT 1) AS last_from_me,
                    (SELECT COUNT(*) FROM messages m
                     WHERE m.conversation_id = c.id
                       AND m.is_read = 0 AND m.is_from_me = 0) AS unread
             FROM conversations c
             WHERE c.id IN ({})",
            placeholders
        );
        let mut stmt = self.conn.prepare(&sql).map_err(db_err)?;
        let rows = stmt
            .query_map(params_from_iter(ids.iter()), conversation_row)
            .map_err(db_err)?;
        let mut by_id = std::collections::HashMap::new();
        for row in rows {
            let (id, detail) = row.map_err(db_err)?;
            by_id.insert(id, detail);
        }
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    /// Single-conversation detail. The per-item primitive behind `thread`;
    /// list enrichment goes through `conversation_details` instead.
    pub fn conversation_detail(&mut self, id: i64) -> Result<Option<Value>, GatewayError> {
        Ok(self.conversation_details(&[id])?.into_iter().next())
    }

    pub fn search(
        &mut self,
        query: &str,
        limit: i64,
        since: Option<&str>,
    ) -> Result<Vec<Value>, GatewayError> {
        let since_norm = since.map(normalize_since).transpose()?;
        self.queries_run += 1;
        let pattern = format!("%{}%", query);
        let mut stmt = self
            .conn
            .prepare(
                "SELECT m.sent_at, m.contact, m.is_from_me, m.text, m.conversation_id
                 FROM messages m
                 WHERE m.text LIKE ?1
                   AND (?2 IS NULL OR m.sent_at >= ?2)
                 ORDER BY m.sent_at DESC
                 LIMIT ?3",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(rusqlite::params![pattern, since_norm, limit], |row| {
                let text: String = row.get(3)?;
                Ok(json!({
                    "date": row.get::<_, String>(0)?,
                    "contact": row.get::<_, String>(1)?,
                    "is_from_me": row.get::<_, i64>(2)? != 0,
                    "text": text.clone(),
                    "match_snippet": match_snippet(&text, query),
                    "conversation_id": row.get::<_, i64>(4)?,
                }))
            })
            .map_err(db_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(db_err)
    }

    pub fn messages_by_contact(
        &mut self,
        contact: &str,
        limit: i64,
    ) -> Result<Vec<Value>, GatewayError> {
        self.queries_run += 1;
        let mut stmt = self
            .conn
            .prepare(
                "SELECT sent_at, is_from_me, text, conversation_id
                 FROM messages
                 WHERE contact = ?1
                 ORDER BY sent_at DESC
                 LIMIT ?2",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(rusqlite::params![contact, limit], |row| {
                Ok(json!({
                    "date": row.get::<_, String>(0)?,
                    "is_from_me": row.get::<_, i64>(1)? != 0,
                    "text": row.get::<_, String>(2)?,
                    "conversation_id": row.get::<_, i64>(3)?,
                }))
            })
            .map_err(db_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(db_err)
    }

    /// Mark a contact's inbound messages read. Returns the number updated.
    pub fn mark_read(&mut self, contact: &str) -> Result<usize, GatewayError> {
        self.queries_run += 1;
        self.conn
            .execute(
                "UPDATE messages SET is_read = 1
                 WHERE contact = ?1 AND is_from_me = 0 AND is_read = 0",
                [contact],
            )
            .map_err(db_err)
    }
}

type ConversationRow = (i64, Value);

fn conversation_row(row: &Row<'_>) -> rusqlite::Result<ConversationRow> {
    let id: i64 = row.get(0)?;
    let detail = json!({
        "conversation_id": id,
        "contact": row.get::<_, String>(1)?,
        "display_name": row.get::<_, Option<String>>(2)?,
        "date": row.get::<_, String>(3)?,
        "text": row.get::<_, Option<String>>(4)?,
        "is_from_me": row.get::<_, Option<i64>>(5)?.map(|v| v != 0),
        "unread": row.get::<_, i64>(6)?,
    });
    Ok((id, detail))
}

fn days_old(sent_at: &str) -> i64 {
    NaiveDateTime::parse_from_str(sent_at, DATE_FORMAT)
        .map(|dt| (Utc::now().naive_utc() - dt).num_days().max(0))
        .unwrap_or(0)
}

/// Accept `YYYY-MM-DD` or `YYYY-MM-DDTHH:MM:SS`, normalized for string
/// comparison against stored timestamps.
fn normalize_since(s: &str) -> Result<String, GatewayError> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, DATE_FORMAT) {
        return Ok(dt.format(DATE_FORMAT).to_string());
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(dt) = d.and_hms_opt(0, 0, 0) {
            return Ok(dt.format(DATE_FORMAT).to_string());
        }
    }
    Err(GatewayError::invalid_params(
        "since",
        "expected ISO date or date-time",
    ))
}

fn match_snippet(text: &str, query: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let needle = query.to_lowercase();
    if needle.is_empty() {
        return chars.iter().take(2 * SNIPPET_RADIUS).collect();
    }

    // Lowercase the haystack while mapping each lowercased byte back to the
    // original char it came from. Lowercasing can change a char's length
    // (one char may lowercase to several), so positions found in the
    // lowercased text cannot be used to index the original directly.
    let mut haystack = String::new();
    let mut origin = Vec::new();
    for (i, c) in chars.iter().enumerate() {
        for lc in c.to_lowercase() {
            for _ in 0..lc.len_utf8() {
                origin.push(i);
            }
            haystack.push(lc);
        }
    }

    let byte_pos = match haystack.find(&needle) {
        Some(p) => p,
        None => return chars.iter().take(2 * SNIPPET_RADIUS).collect(),
    };
    let match_start = origin.get(byte_pos).copied().unwrap_or(0);
    let match_end = origin
        .get(byte_pos + needle.len() - 1)
        .map(|&i| i + 1)
        .unwrap_or(chars.len());

    let start = match_start.saturating_sub(SNIPPET_RADIUS);
    let end = (match_end + SNIPPET_RADIUS).min(chars.len());
    let mut out = String::new();
    if start > 0 {
        out.push('…');
    }
    out.extend(&chars[start..end]);
    if end < chars.len() {
        out.push('…');
    }
    out
}


#[cfg(test)]
mod tests {
    use super::testutil::seed;
    use super::*;

    fn store_with(n: i64) -> MessageStore {
        let mut store = MessageStore::open_in_memory().unwrap();
        seed(&mut store, n);
        store
    }

    #[test]
    fn test_open_missing_file_is_backend_error() {
        let err = MessageStore::open(Path::new("/nonexistent/archive.db")).unwrap_err();
        let obj = err.to_object();
        assert_eq!(obj.code, gateway_common::ErrorCode::BackendError);
        assert_eq!(obj.details.unwrap()["adapter"], ADAPTER_NAME);
    }

    #[test]
    fn test_unread_count_and_mark_read() {
        let mut store = store_with(3);
        assert_eq!(store.unread_count().unwrap(), 3);
        let updated = store.mark_read("+15550000002").unwrap();
        assert_eq!(updated, 1);
        assert_eq!(store.unread_count().unwrap(), 2);
        // Second pass is a no-op.
        assert_eq!(store.mark_read("+15550000002").unwrap(), 0);
    }

    #[test]
    fn test_batched_details_match_naive_in_order() {
        let mut store = store_with(10);
        let before = store.queries_run();
        let batched = store.recent_conversations(10).unwrap();
        let round_trips = store.queries_run() - before;

        assert_eq!(batched.len(), 10);
        assert!(round_trips <= 2, "expected <= 2 round trips, got {}", round_trips);

        // Naive path: one detail call per id, 11 round trips for the same list.
        let ids: Vec<i64> = batched
            .iter()
            .map(|c| c["conversation_id"].as_i64().unwrap())
            .collect();
        let naive: Vec<Value> = ids
            .iter()
            .map(|id| store.conversation_detail(*id).unwrap().unwrap())
            .collect();
        assert_eq!(batched, naive);
    }

    #[test]
    fn test_recent_orders_by_last_active_desc() {
        let mut store = store_with(5);
        let recent = store.recent_conversations(3).unwrap();
        let ids: Vec<i64> = recent
            .iter()
            .map(|c| c["conversation_id"].as_i64().unwrap())
            .collect();
        assert_eq!(ids, vec![5, 4, 3]);
        assert_eq!(recent[0]["unread"], 1);
        assert!(recent[0]["text"].as_str().unwrap().contains("reply"));
    }

    #[test]
    fn test_search_with_since_filter() {
        let mut store = store_with(6);
        let all = store.search("dinner", 50, None).unwrap();
        assert_eq!(all.len(), 6);
        assert!(all[0]["match_snippet"].as_str().unwrap().contains("dinner"));

        let late = store.search("dinner", 50, Some("2026-08-04")).unwrap();
        assert_eq!(late.len(), 3);

        let err = store.search("dinner", 50, Some("next tuesday")).unwrap_err();
        assert!(err.to_string().contains("since"));
    }

    #[test]
    fn test_messages_by_contact() {
        let mut store = store_with(2);
        let msgs = store.messages_by_contact("+15550000001", 10).unwrap();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0]["is_from_me"], true);
        assert_eq!(msgs[1]["is_from_me"], false);
    }

    #[test]
    fn test_unknown_conversation_detail_is_none() {
        let mut store = store_with(1);
        assert!(store.conversation_detail(99).unwrap().is_none());
    }

    #[test]
    fn test_snippet_survives_case_expanding_chars() {
        // 'İ' lowercases to two chars, so the lowercased text is longer
        // than the original. The window must still index the original.
        let text = format!("{}needle", "İ".repeat(50));
        let snip = match_snippet(&text, "needle");
        assert!(snip.contains("needle"));

        // Same property through the query path.
        let mut store = MessageStore::open_in_memory().unwrap();
        store
            .conn
            .execute(
                "INSERT INTO conversations (id, contact, display_name, last_active)
                 VALUES (1, '+15550000001', 'I', '2026-08-01T10:00:00')",
                [],
            )
            .unwrap();
        store
            .conn
            .execute(
                "INSERT INTO messages (conversation_id, contact, text, sent_at, is_from_me, is_read)
                 VALUES (1, '+15550000001', ?1, '2026-08-01T09:30:00', 0, 0)",
                [text],
            )
            .unwrap();
        let results = store.search("needle", 10, None).unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0]["match_snippet"].as_str().unwrap().contains("needle"));
    }

    #[test]
    fn test_snippet_windows_long_text() {
        let text = format!("{} needle {}", "x".repeat(100), "y".repeat(100));
        let snip = match_snippet(&text, "needle");
        assert!(snip.contains("needle"));
        assert!(snip.chars().count() < text.chars().count());
        assert!(snip.starts_with('…') && snip.ends_with('…'));
    }
}
