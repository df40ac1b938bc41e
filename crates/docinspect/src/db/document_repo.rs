//! Document repository.
//!
//! A document row is written twice in its life: once at intake (PENDING) and
//! once when the pipeline finishes. The second write is guarded on
//! `status = 'PENDING'` so a terminal status can never be overwritten.

use rusqlite::{params, Row};

use super::{now, Database, DatabaseError, DocumentStatus};

#[derive(Debug, Clone)]
pub struct DocumentRow {
    pub id: i64,
    pub session_id: i64,
    pub original_name: String,
    pub status: DocumentStatus,
    pub has_qr: bool,
    pub has_stamp: bool,
    pub has_signature: bool,
    pub labels_position: Option<serde_json::Value>,
    pub created_at: String,
    pub updated_at: String,
}

/// Detection flags written together with the payload on success.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DetectionFlags {
    pub has_qr: bool,
    pub has_stamp: bool,
    pub has_signature: bool,
}

struct RawDocument {
    row: DocumentRow,
    status: String,
    labels_position: Option<String>,
}

impl DocumentRow {
    pub(crate) fn pending(id: i64, session_id: i64, original_name: String, ts: String) -> Self {
        Self {
            id,
            session_id,
            original_name,
            status: DocumentStatus::Pending,
            has_qr: false,
            has_stamp: false,
            has_signature: false,
            labels_position: None,
            created_at: ts.clone(),
            updated_at: ts,
        }
    }

    fn from_row(row: &Row<'_>) -> Result<RawDocument, rusqlite::Error> {
        let created_at: String = row.get("created_at")?;
        Ok(RawDocument {
            row: Self {
                id: row.get("id")?,
                session_id: row.get("session_id")?,
                original_name: row.get("original_name")?,
                status: DocumentStatus::Pending,
                has_qr: row.get("has_qr")?,
                has_stamp: row.get("has_stamp")?,
                has_signature: row.get("has_signature")?,
                labels_position: None,
                created_at,
                updated_at: row.get("updated_at")?,
            },
            status: row.get("status")?,
            labels_position: row.get("labels_position")?,
        })
    }

    pub fn flags(&self) -> DetectionFlags {
        DetectionFlags {
            has_qr: self.has_qr,
            has_stamp: self.has_stamp,
            has_signature: self.has_signature,
        }
    }
}

impl RawDocument {
    fn resolve(self) -> Result<DocumentRow, DatabaseError> {
        let mut row = self.row;
        row.status = DocumentStatus::from_column(self.status)?;
        row.labels_position = match self.labels_position {
            Some(text) => Some(serde_json::from_str(&text).map_err(|_| DatabaseError::Corrupt {
                column: "labels_position",
                value: text,
            })?),
            None => None,
        };
        Ok(row)
    }
}

pub fn find_by_id(db: &Database, id: i64) -> Result<Option<DocumentRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM documents WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], DocumentRow::from_row)?;
        match rows.next() {
            Some(raw) => Ok(Some(raw?.resolve()?)),
            None => Ok(None),
        }
    })
}

/// Sort order for session document listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    NewestFirst,
    OldestFirst,
}

/// Lists the documents of a session, optionally filtered by status.
pub fn list_by_session(
    db: &Database,
    session_id: i64,
    status: Option<DocumentStatus>,
    order: Order,
) -> Result<Vec<DocumentRow>, DatabaseError> {
    db.with_conn(|conn| {
        let direction = match order {
            Order::NewestFirst => "DESC",
            Order::OldestFirst => "ASC",
        };

        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = vec![Box::new(session_id)];
        let mut where_clause = "WHERE session_id = ?1".to_string();
        if let Some(status) = status {
            where_clause.push_str(" AND status = ?2");
            param_values.push(Box::new(status.as_str()));
        }

        let sql = format!(
            "SELECT * FROM documents {} ORDER BY created_at {dir}, id {dir}",
            where_clause,
            dir = direction
        );
        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();

        let mut stmt = conn.prepare(&sql)?;
        let raw = stmt
            .query_map(params_ref.as_slice(), DocumentRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        raw.into_iter().map(RawDocument::resolve).collect()
    })
}

/// Moves a PENDING document to SUCCESSFUL with its payload and flags.
///
/// Returns `false` when the row was not PENDING (or does not exist); nothing
/// is written in that case.
pub fn mark_successful(
    db: &Database,
    id: i64,
    flags: DetectionFlags,
    labels_position: &serde_json::Value,
) -> Result<bool, DatabaseError> {
    let payload = labels_position.to_string();
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE documents SET status = ?2, has_qr = ?3, has_stamp = ?4, has_signature = ?5,
             labels_position = ?6, updated_at = ?7
             WHERE id = ?1 AND status = 'PENDING'",
            params![
                id,
                DocumentStatus::Successful.as_str(),
                flags.has_qr,
                flags.has_stamp,
                flags.has_signature,
                payload,
                now()
            ],
        )?;
        Ok(changed == 1)
    })
}

/// Moves a PENDING document to FAILED. Same guard as [`mark_successful`].
pub fn mark_failed(db: &Database, id: i64) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE documents SET status = ?2, updated_at = ?3 WHERE id = ?1 AND status = 'PENDING'",
            params![id, DocumentStatus::Failed.as_str(), now()],
        )?;
        Ok(changed == 1)
    })
}
