use std::collections::HashSet;

use anyhow::{bail, Result};
use rusqlite::Connection;

use crate::batch::RunSummary;

const DB_PATH: &str = "data/cards.sqlite";

pub fn connect() -> Result<Connection> {
    std::fs::create_dir_all("data")?;
    let conn = Connection::open(DB_PATH)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS cards (
            id          INTEGER PRIMARY KEY,
            card_uid    TEXT UNIQUE NOT NULL,
            card_id     TEXT NOT NULL,
            card_code   TEXT UNIQUE NOT NULL,
            booster     TEXT NOT NULL,
            series      TEXT NOT NULL,
            series_code TEXT NOT NULL,
            anime_code  TEXT NOT NULL,
            card_name   TEXT,
            rarity      TEXT,
            image       TEXT,
            url_image   TEXT,
            fields      TEXT NOT NULL DEFAULT '{}',
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_cards_card_id ON cards(card_id);
        CREATE INDEX IF NOT EXISTS idx_cards_series ON cards(series);
        CREATE INDEX IF NOT EXISTS idx_cards_booster ON cards(booster);

        CREATE TABLE IF NOT EXISTS run_summaries (
            id          INTEGER PRIMARY KEY,
            job_key     TEXT NOT NULL,
            processed   INTEGER NOT NULL,
            succeeded   INTEGER NOT NULL,
            failed      INTEGER NOT NULL,
            failures    TEXT NOT NULL DEFAULT '{}',
            finished_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_summaries_job ON run_summaries(job_key);
        ",
    )?;
    Ok(())
}

// ── Cards ──

/// One stored printing. `fields` carries the remaining scraped attributes
/// as an opaque JSON object.
#[derive(Debug, Clone)]
pub struct CardRecord {
    pub card_uid: String,
    pub card_id: String,
    pub card_code: String,
    pub booster: String,
    pub series: String,
    pub series_code: String,
    pub anime_code: String,
    pub card_name: String,
    pub rarity: String,
    pub image: String,
    pub url_image: String,
    pub fields: serde_json::Value,
}

/// Insert a card, ignoring uids/codes already present so re-runs after a
/// lost checkpoint never duplicate records. Returns whether a row landed.
pub fn insert_card(conn: &Connection, card: &CardRecord) -> Result<bool> {
    let changed = conn.execute(
        "INSERT OR IGNORE INTO cards
         (card_uid, card_id, card_code, booster, series, series_code, anime_code,
          card_name, rarity, image, url_image, fields)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        rusqlite::params![
            card.card_uid,
            card.card_id,
            card.card_code,
            card.booster,
            card.series,
            card.series_code,
            card.anime_code,
            card.card_name,
            card.rarity,
            card.image,
            card.url_image,
            card.fields.to_string(),
        ],
    )?;
    Ok(changed > 0)
}

pub fn insert_cards(conn: &Connection, cards: &[CardRecord]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT OR IGNORE INTO cards
             (card_uid, card_id, card_code, booster, series, series_code, anime_code,
              card_name, rarity, image, url_image, fields)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        )?;
        for card in cards {
            count += stmt.execute(rusqlite::params![
                card.card_uid,
                card.card_id,
                card.card_code,
                card.booster,
                card.series,
                card.series_code,
                card.anime_code,
                card.card_name,
                card.rarity,
                card.image,
                card.url_image,
                card.fields.to_string(),
            ])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

/// Uids already stored for a logical card id. Seeds the ALT allocator;
/// queried fresh per run, never cached across runs.
pub fn find_uids_for_logical_id(conn: &Connection, card_id: &str) -> Result<HashSet<String>> {
    column_set(conn, "SELECT card_uid FROM cards WHERE card_id = ?1", card_id)
}

/// Raw card codes already stored for a logical card id (exact-duplicate guard).
pub fn find_codes_for_logical_id(conn: &Connection, card_id: &str) -> Result<HashSet<String>> {
    column_set(conn, "SELECT card_code FROM cards WHERE card_id = ?1", card_id)
}

pub fn list_uids_for_series(conn: &Connection, series: &str) -> Result<HashSet<String>> {
    column_set(conn, "SELECT card_uid FROM cards WHERE series = ?1", series)
}

/// Raw card codes stored for a series — the "known" side of cardlist
/// reconciliation.
pub fn list_codes_for_series(conn: &Connection, series: &str) -> Result<HashSet<String>> {
    column_set(conn, "SELECT card_code FROM cards WHERE series = ?1", series)
}

fn column_set(conn: &Connection, sql: &str, param: &str) -> Result<HashSet<String>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map([param], |row| row.get::<_, String>(0))?
        .collect::<Result<HashSet<_>, _>>()?;
    Ok(rows)
}

/// Count cards where a column equals a value. The column name is checked
/// against the schema, not interpolated blindly.
pub fn count_matching(conn: &Connection, field: &str, value: &str) -> Result<i64> {
    const COLUMNS: &[&str] = &[
        "card_uid", "card_id", "card_code", "booster", "series", "series_code", "anime_code",
        "rarity",
    ];
    if !COLUMNS.contains(&field) {
        bail!("unknown cards column: {}", field);
    }
    let sql = format!("SELECT COUNT(*) FROM cards WHERE {} = ?1", field);
    let count = conn.query_row(&sql, [value], |r| r.get(0))?;
    Ok(count)
}

// ── Run summaries ──

pub fn save_run_summary(conn: &Connection, summary: &RunSummary) -> Result<()> {
    conn.execute(
        "INSERT INTO run_summaries (job_key, processed, succeeded, failed, failures, finished_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            summary.job_key,
            summary.processed,
            summary.succeeded,
            summary.failed,
            serde_json::to_string(&summary.failures)?,
            summary.finished_at,
        ],
    )?;
    Ok(())
}

pub fn last_run_summary(conn: &Connection, job_key: &str) -> Result<Option<RunSummary>> {
    let mut stmt = conn.prepare(
        "SELECT job_key, processed, succeeded, failed, failures, finished_at
         FROM run_summaries WHERE job_key = ?1 ORDER BY id DESC LIMIT 1",
    )?;
    let mut rows = stmt.query([job_key])?;
    match rows.next()? {
        Some(row) => {
            let failures: String = row.get(4)?;
            Ok(Some(RunSummary {
                job_key: row.get(0)?,
                processed: row.get::<_, i64>(1)? as usize,
                succeeded: row.get::<_, i64>(2)? as usize,
                failed: row.get::<_, i64>(3)? as usize,
                failures: serde_json::from_str(&failures)?,
                finished_at: row.get(5)?,
            }))
        }
        None => Ok(None),
    }
}

// ── Stats ──

pub struct Stats {
    pub total: usize,
    pub logical_cards: usize,
    pub alt_variants: usize,
    pub series: usize,
    pub runs: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let total: usize = conn.query_row("SELECT COUNT(*) FROM cards", [], |r| r.get(0))?;
    let logical_cards: usize =
        conn.query_row("SELECT COUNT(DISTINCT card_id) FROM cards", [], |r| r.get(0))?;
    let alt_variants: usize = conn.query_row(
        "SELECT COUNT(*) FROM cards WHERE instr(card_uid, '_ALT') > 0",
        [],
        |r| r.get(0),
    )?;
    let series: usize =
        conn.query_row("SELECT COUNT(DISTINCT series) FROM cards", [], |r| r.get(0))?;
    let runs: usize = conn.query_row("SELECT COUNT(*) FROM run_summaries", [], |r| r.get(0))?;
    Ok(Stats {
        total,
        logical_cards,
        alt_variants,
        series,
        runs,
    })
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn card(uid: &str, id: &str, code: &str) -> CardRecord {
        CardRecord {
            card_uid: uid.into(),
            card_id: id.into(),
            card_code: code.into(),
            booster: "UAPR".into(),
            series: "Hunter x Hunter".into(),
            series_code: "htr".into(),
            anime_code: "st01".into(),
            card_name: "Gon".into(),
            rarity: "C".into(),
            image: format!("/UD/{}.webp", uid),
            url_image: "https://example.test/card.png".into(),
            fields: serde_json::json!({"apcost": 1}),
        }
    }

    #[test]
    fn insert_is_idempotent_by_uid() {
        let conn = test_conn();
        assert!(insert_card(&conn, &card("X", "X", "UAPR/X")).unwrap());
        // Same uid again: ignored, not duplicated.
        assert!(!insert_card(&conn, &card("X", "X", "UAPR/X")).unwrap());
        assert_eq!(count_matching(&conn, "card_uid", "X").unwrap(), 1);
    }

    #[test]
    fn uid_and_code_lookups_are_scoped_to_the_logical_id() {
        let conn = test_conn();
        insert_cards(
            &conn,
            &[
                card("X", "X", "UAPR/X"),
                card("X_ALT", "X", "UAPR/X_p1"),
                card("Y", "Y", "UAPR/Y"),
            ],
        )
        .unwrap();

        let uids = find_uids_for_logical_id(&conn, "X").unwrap();
        assert_eq!(uids.len(), 2);
        assert!(uids.contains("X_ALT"));

        let codes = find_codes_for_logical_id(&conn, "X").unwrap();
        assert!(codes.contains("UAPR/X_p1"));
        assert!(!codes.contains("UAPR/Y"));
    }

    #[test]
    fn series_listings_feed_reconciliation() {
        let conn = test_conn();
        insert_cards(&conn, &[card("X", "X", "UAPR/X"), card("Y", "Y", "UAPR/Y")]).unwrap();
        let codes = list_codes_for_series(&conn, "Hunter x Hunter").unwrap();
        assert_eq!(codes.len(), 2);
        assert!(list_uids_for_series(&conn, "Naruto").unwrap().is_empty());
    }

    #[test]
    fn count_matching_rejects_unknown_columns() {
        let conn = test_conn();
        assert!(count_matching(&conn, "card_uid; DROP TABLE cards", "X").is_err());
    }

    #[test]
    fn run_summary_round_trip() {
        let conn = test_conn();
        let mut failures = std::collections::BTreeMap::new();
        failures.insert("UAPR/X".to_string(), "fetch: 503".to_string());
        let summary = RunSummary {
            job_key: "htr".into(),
            processed: 3,
            succeeded: 2,
            failed: 1,
            failures,
            finished_at: "2025-01-01T00:00:00Z".into(),
        };
        save_run_summary(&conn, &summary).unwrap();

        let loaded = last_run_summary(&conn, "htr").unwrap().unwrap();
        assert_eq!(loaded.succeeded, 2);
        assert_eq!(loaded.failures.get("UAPR/X").unwrap(), "fetch: 503");
        assert!(last_run_summary(&conn, "other").unwrap().is_none());
    }

    #[test]
    fn stats_count_variants() {
        let conn = test_conn();
        insert_cards(
            &conn,
            &[
                card("X", "X", "UAPR/X"),
                card("X_ALT", "X", "UAPR/X_p1"),
                card("X_ALT2", "X", "UAPR/X_p2"),
            ],
        )
        .unwrap();
        let stats = get_stats(&conn).unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.logical_cards, 1);
        assert_eq!(stats.alt_variants, 2);
        assert_eq!(stats.series, 1);
    }
}
