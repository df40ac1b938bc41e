//! Document analysis repository. One row per normalized document id.

use rusqlite::{params, Row};

use super::{now, AnalysisStatus, Database, DatabaseError};
use crate::analysis::AnalysisReport;

#[derive(Debug, Clone)]
pub struct AnalysisRow {
    pub id: String,
    pub document_id: i64,
    pub status: AnalysisStatus,
    pub fraud_sentences: Vec<String>,
    pub mistake_words: Vec<String>,
    pub document_type: Option<String>,
    pub document_summary: Option<String>,
    pub document_text: Option<String>,
    pub error_log: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

struct RawAnalysis {
    id: String,
    document_id: i64,
    status: String,
    fraud_sentences: String,
    mistake_words: String,
    document_type: Option<String>,
    document_summary: Option<String>,
    document_text: Option<String>,
    error_log: Option<String>,
    created_at: String,
    updated_at: String,
}

impl RawAnalysis {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            document_id: row.get("document_id")?,
            status: row.get("status")?,
            fraud_sentences: row.get("fraud_sentences")?,
            mistake_words: row.get("mistake_words")?,
            document_type: row.get("document_type")?,
            document_summary: row.get("document_summary")?,
            document_text: row.get("document_text")?,
            error_log: row.get("error_log")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    fn resolve(self) -> Result<AnalysisRow, DatabaseError> {
        Ok(AnalysisRow {
            id: self.id,
            document_id: self.document_id,
            status: AnalysisStatus::from_column(self.status)?,
            fraud_sentences: parse_list("fraud_sentences", self.fraud_sentences)?,
            mistake_words: parse_list("mistake_words", self.mistake_words)?,
            document_type: self.document_type,
            document_summary: self.document_summary,
            document_text: self.document_text,
            error_log: self.error_log,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn parse_list(column: &'static str, text: String) -> Result<Vec<String>, DatabaseError> {
    serde_json::from_str(&text).map_err(|_| DatabaseError::Corrupt {
        column,
        value: text,
    })
}

fn encode_list(items: &[String]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

/// Opens (or re-opens) the analysis record for a document in PROCESSING.
pub fn start(db: &Database, document_id: i64) -> Result<AnalysisRow, DatabaseError> {
    let ts = now();
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO document_analyses (id, document_id, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(document_id) DO UPDATE SET
                status = excluded.status,
                fraud_sentences = '[]',
                mistake_words = '[]',
                document_type = NULL,
                document_summary = NULL,
                document_text = NULL,
                error_log = NULL,
                updated_at = excluded.updated_at",
            params![
                uuid::Uuid::new_v4().to_string(),
                document_id,
                AnalysisStatus::Processing.as_str(),
                ts
            ],
        )?;
        Ok(())
    })?;

    find_by_document_id(db, document_id)?.ok_or(DatabaseError::Corrupt {
        column: "document_id",
        value: document_id.to_string(),
    })
}

/// PROCESSING → COMPLETED. Returns `false` if the record was not PROCESSING.
pub fn complete(
    db: &Database,
    document_id: i64,
    document_text: &str,
    report: &AnalysisReport,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE document_analyses SET status = ?2, fraud_sentences = ?3, mistake_words = ?4,
             document_type = ?5, document_summary = ?6, document_text = ?7, error_log = NULL,
             updated_at = ?8
             WHERE document_id = ?1 AND status = 'PROCESSING'",
            params![
                document_id,
                AnalysisStatus::Completed.as_str(),
                encode_list(&report.fraud_sentences),
                encode_list(&report.mistake_words),
                report.document_type,
                report.document_summary,
                document_text,
                now()
            ],
        )?;
        Ok(changed == 1)
    })
}

/// PROCESSING → FAILED with the error message kept in `error_log`.
pub fn fail(db: &Database, document_id: i64, error_log: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE document_analyses SET status = ?2, error_log = ?3, updated_at = ?4
             WHERE document_id = ?1 AND status = 'PROCESSING'",
            params![
                document_id,
                AnalysisStatus::Failed.as_str(),
                error_log,
                now()
            ],
        )?;
        Ok(changed == 1)
    })
}

pub fn find_by_document_id(
    db: &Database,
    document_id: i64,
) -> Result<Option<AnalysisRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM document_analyses WHERE document_id = ?1")?;
        let mut rows = stmt.query_map(params![document_id], RawAnalysis::from_row)?;
        match rows.next() {
            Some(raw) => Ok(Some(raw?.resolve()?)),
            None => Ok(None),
        }
    })
}
