use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{Map, Value};

use crate::aggregate::{CorpusRecord, IdentifierResult, PLACEHOLDER_KEYWORD, PLACEHOLDER_LOCATION};
use crate::metrics::BatchTally;
use crate::parser::extract::answers::FieldAnswer;
use crate::parser::extract::QuestionRow;
use crate::store::{MasterRow, MasterTable};

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("cannot create {}", parent.display()))?;
    }
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS master (
            identifier  TEXT PRIMARY KEY,
            position    INTEGER NOT NULL,
            metadata    TEXT NOT NULL,
            imported_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS corpus_records (
            id              INTEGER PRIMARY KEY,
            identifier      TEXT NOT NULL,
            position        INTEGER NOT NULL,
            keyword         TEXT NOT NULL,
            location        TEXT NOT NULL,
            question        TEXT,
            response        TEXT,
            source_document TEXT NOT NULL,
            metadata        TEXT NOT NULL,
            run_id          TEXT NOT NULL,
            UNIQUE(identifier, position)
        );
        CREATE INDEX IF NOT EXISTS idx_records_keyword ON corpus_records(keyword);

        -- Configured answer fields, one row per identifier and field
        CREATE TABLE IF NOT EXISTS answers (
            identifier TEXT NOT NULL,
            field      TEXT NOT NULL,
            position   INTEGER NOT NULL,
            answer     TEXT,
            run_id     TEXT NOT NULL,
            PRIMARY KEY(identifier, field)
        );

        CREATE TABLE IF NOT EXISTS questions (
            id       INTEGER PRIMARY KEY,
            document TEXT NOT NULL,
            section  TEXT NOT NULL,
            question TEXT NOT NULL,
            UNIQUE(document, section, question)
        );

        -- One row per scan/questions invocation
        CREATE TABLE IF NOT EXISTS runs (
            run_id                        TEXT PRIMARY KEY,
            command                       TEXT NOT NULL,
            finished_at                   TEXT NOT NULL,
            identifiers                   INTEGER NOT NULL,
            identifiers_without_documents INTEGER NOT NULL,
            documents_processed           INTEGER NOT NULL,
            documents_skipped             INTEGER NOT NULL,
            documents_without_occurrences INTEGER NOT NULL,
            pages_failed                  INTEGER NOT NULL,
            placeholder_records           INTEGER NOT NULL,
            records                       INTEGER NOT NULL
        );
        ",
    )?;
    Ok(())
}

// ── Master ──

/// Replaces the whole master table.
pub fn save_master(conn: &Connection, table: &MasterTable) -> Result<usize> {
    let now = Utc::now().to_rfc3339();
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM master", [])?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO master (identifier, position, metadata, imported_at)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        for (pos, row) in table.rows().iter().enumerate() {
            let metadata = serde_json::to_string(&row.metadata)?;
            stmt.execute(params![row.identifier, pos as i64, metadata, now])?;
        }
    }
    tx.commit()?;
    Ok(table.len())
}

pub fn load_master(conn: &Connection) -> Result<MasterTable> {
    let mut stmt = conn.prepare("SELECT identifier, metadata FROM master ORDER BY position")?;
    let raw = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    let rows = raw
        .into_iter()
        .map(|(identifier, metadata)| {
            let metadata = parse_metadata(&metadata)
                .with_context(|| format!("bad metadata for identifier {}", identifier))?;
            Ok(MasterRow {
                identifier,
                metadata,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(MasterTable::from_rows(rows))
}

fn parse_metadata(text: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str(text)? {
        Value::Object(map) => Ok(map),
        _ => anyhow::bail!("metadata is not a JSON object"),
    }
}

// ── Records ──

/// Replaces the stored records and answers of every identifier in
/// `results`. A result with no records clears the identifier.
pub fn save_records(conn: &Connection, run_id: &str, results: &[IdentifierResult]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut delete = tx.prepare("DELETE FROM corpus_records WHERE identifier = ?1")?;
        let mut delete_answers = tx.prepare("DELETE FROM answers WHERE identifier = ?1")?;
        let mut insert = tx.prepare(
            "INSERT INTO corpus_records
             (identifier, position, keyword, location, question, response, source_document, metadata, run_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )?;
        let mut insert_answer = tx.prepare(
            "INSERT INTO answers (identifier, field, position, answer, run_id)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for result in results {
            delete.execute(params![result.identifier])?;
            delete_answers.execute(params![result.identifier])?;
            for (pos, a) in result.answers.iter().enumerate() {
                insert_answer.execute(params![result.identifier, a.field, pos as i64, a.answer, run_id])?;
            }
            for (pos, r) in result.records.iter().enumerate() {
                let metadata = serde_json::to_string(&r.metadata)?;
                count += insert.execute(params![
                    r.identifier, pos as i64, r.keyword, r.location, r.question,
                    r.response, r.source_document, metadata, run_id,
                ])?;
            }
        }
    }
    tx.commit()?;
    Ok(count)
}

/// Stored records in master order, then record order within an identifier.
pub fn fetch_records(conn: &Connection) -> Result<Vec<CorpusRecord>> {
    let mut stmt = conn.prepare(
        "SELECT r.identifier, r.metadata, r.keyword, r.location, r.question, r.response, r.source_document
         FROM corpus_records r
         LEFT JOIN master m ON m.identifier = r.identifier
         ORDER BY m.position IS NULL, m.position, r.identifier, r.position",
    )?;
    let raw = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let answers = fetch_answers(conn)?;
    raw.into_iter()
        .map(|(identifier, metadata, keyword, location, question, response, source_document)| {
            Ok(CorpusRecord {
                metadata: parse_metadata(&metadata)?,
                answers: answers.get(&identifier).cloned().unwrap_or_default(),
                identifier,
                keyword,
                location,
                question,
                response,
                source_document,
            })
        })
        .collect()
}

/// Stored answers grouped by identifier, in field order.
pub fn fetch_answers(conn: &Connection) -> Result<HashMap<String, Vec<FieldAnswer>>> {
    let mut stmt =
        conn.prepare("SELECT identifier, field, answer FROM answers ORDER BY identifier, position")?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                FieldAnswer {
                    field: row.get(1)?,
                    answer: row.get(2)?,
                },
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut grouped: HashMap<String, Vec<FieldAnswer>> = HashMap::new();
    for (identifier, answer) in rows {
        grouped.entry(identifier).or_default().push(answer);
    }
    Ok(grouped)
}

// ── Questions ──

pub fn save_questions(conn: &Connection, rows: &[QuestionRow]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT OR IGNORE INTO questions (document, section, question) VALUES (?1, ?2, ?3)",
        )?;
        for r in rows {
            count += stmt.execute(params![r.document, r.section, r.question])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

// ── Runs ──

pub fn save_run(conn: &Connection, run_id: &str, command: &str, t: &BatchTally) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO runs
         (run_id, command, finished_at, identifiers, identifiers_without_documents,
          documents_processed, documents_skipped, documents_without_occurrences,
          pages_failed, placeholder_records, records)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            run_id,
            command,
            Utc::now().to_rfc3339(),
            t.identifiers as i64,
            t.identifiers_without_documents as i64,
            t.documents_processed as i64,
            t.documents_skipped as i64,
            t.documents_without_occurrences as i64,
            t.pages_failed as i64,
            t.placeholder_records as i64,
            t.records as i64,
        ],
    )?;
    Ok(())
}

pub struct RunRow {
    pub run_id: String,
    pub command: String,
    pub finished_at: String,
    pub tally: BatchTally,
}

pub fn latest_run(conn: &Connection) -> Result<Option<RunRow>> {
    let row = conn
        .query_row(
            "SELECT run_id, command, finished_at, identifiers, identifiers_without_documents,
                    documents_processed, documents_skipped, documents_without_occurrences,
                    pages_failed, placeholder_records, records
             FROM runs ORDER BY finished_at DESC, rowid DESC LIMIT 1",
            [],
            |r| {
                Ok(RunRow {
                    run_id: r.get(0)?,
                    command: r.get(1)?,
                    finished_at: r.get(2)?,
                    tally: BatchTally {
                        identifiers: r.get(3)?,
                        identifiers_without_documents: r.get(4)?,
                        documents_processed: r.get(5)?,
                        documents_skipped: r.get(6)?,
                        documents_without_occurrences: r.get(7)?,
                        pages_failed: r.get(8)?,
                        placeholder_records: r.get(9)?,
                        records: r.get(10)?,
                    },
                })
            },
        )
        .optional()?;
    Ok(row)
}

// ── Stats ──

pub struct Stats {
    pub master_rows: usize,
    pub records: usize,
    pub placeholder_records: usize,
    pub identifiers_with_records: usize,
    pub answered_fields: usize,
    pub questions: usize,
    pub runs: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let master_rows: usize = conn.query_row("SELECT COUNT(*) FROM master", [], |r| r.get(0))?;
    let records: usize = conn.query_row("SELECT COUNT(*) FROM corpus_records", [], |r| r.get(0))?;
    let placeholder_records: usize = conn.query_row(
        "SELECT COUNT(*) FROM corpus_records WHERE keyword = ?1 AND location = ?2",
        params![PLACEHOLDER_KEYWORD, PLACEHOLDER_LOCATION],
        |r| r.get(0),
    )?;
    let identifiers_with_records: usize = conn.query_row(
        "SELECT COUNT(DISTINCT identifier) FROM corpus_records",
        [],
        |r| r.get(0),
    )?;
    let answered_fields: usize = conn.query_row(
        "SELECT COUNT(*) FROM answers WHERE answer IS NOT NULL",
        [],
        |r| r.get(0),
    )?;
    let questions: usize = conn.query_row("SELECT COUNT(*) FROM questions", [], |r| r.get(0))?;
    let runs: usize = conn.query_row("SELECT COUNT(*) FROM runs", [], |r| r.get(0))?;
    Ok(Stats {
        master_rows,
        records,
        placeholder_records,
        identifiers_with_records,
        answered_fields,
        questions,
        runs,
    })
}
