//! Session repository. A session is created together with its documents
//! and afterwards only its aggregate status changes.

use rusqlite::{params, Connection, Row};

use super::document_repo::DocumentRow;
use super::{now, Database, DatabaseError, DocumentStatus, SessionStatus};

#[derive(Debug, Clone)]
pub struct SessionRow {
    pub id: i64,
    pub status: SessionStatus,
    pub documents_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl SessionRow {
    fn from_row(row: &Row<'_>) -> Result<(Self, String), rusqlite::Error> {
        Ok((
            Self {
                id: row.get("id")?,
                status: SessionStatus::Processing,
                documents_count: row.get("documents_count")?,
                created_at: row.get("created_at")?,
                updated_at: row.get("updated_at")?,
            },
            row.get("status")?,
        ))
    }

    fn resolve((mut session, status): (Self, String)) -> Result<Self, DatabaseError> {
        session.status = SessionStatus::from_column(status)?;
        Ok(session)
    }
}

/// Per-status document tallies for one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: i64,
    pub successful: i64,
    pub failed: i64,
}

/// Derives the session aggregate from its document tallies.
///
/// SUCCESS once every document succeeded, FAILED once nothing is pending
/// and at least one document failed, PROCESSING otherwise.
pub fn aggregate_status(documents_count: i64, counts: StatusCounts) -> SessionStatus {
    if documents_count > 0 && counts.successful == documents_count {
        SessionStatus::Success
    } else if counts.pending == 0 && counts.failed > 0 {
        SessionStatus::Failed
    } else {
        SessionStatus::Processing
    }
}

/// Creates a session and one PENDING document per name in a single transaction.
pub fn create_with_documents(
    db: &Database,
    original_names: &[String],
) -> Result<(SessionRow, Vec<DocumentRow>), DatabaseError> {
    db.with_conn(|conn| {
        let tx = conn.unchecked_transaction()?;
        let ts = now();

        tx.execute(
            "INSERT INTO sessions (status, documents_count, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?3)",
            params![
                SessionStatus::Processing.as_str(),
                original_names.len() as i64,
                ts
            ],
        )?;
        let session_id = tx.last_insert_rowid();

        let mut documents = Vec::with_capacity(original_names.len());
        for name in original_names {
            tx.execute(
                "INSERT INTO documents (session_id, original_name, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                params![session_id, name, DocumentStatus::Pending.as_str(), ts],
            )?;
            documents.push(DocumentRow::pending(
                tx.last_insert_rowid(),
                session_id,
                name.clone(),
                ts.clone(),
            ));
        }

        tx.commit()?;

        let session = SessionRow {
            id: session_id,
            status: SessionStatus::Processing,
            documents_count: original_names.len() as i64,
            created_at: ts.clone(),
            updated_at: ts,
        };
        Ok((session, documents))
    })
}

pub fn find_by_id(db: &Database, id: i64) -> Result<Option<SessionRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM sessions WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], SessionRow::from_row)?;
        match rows.next() {
            Some(row) => Ok(Some(SessionRow::resolve(row?)?)),
            None => Ok(None),
        }
    })
}

/// Lists sessions newest first, optionally filtered by status.
pub fn list(db: &Database, status: Option<SessionStatus>) -> Result<Vec<SessionRow>, DatabaseError> {
    db.with_conn(|conn| {
        let raw = match status {
            Some(status) => {
                let mut stmt = conn.prepare(
                    "SELECT * FROM sessions WHERE status = ?1 ORDER BY created_at DESC, id DESC",
                )?;
                let rows = stmt
                    .query_map(params![status.as_str()], SessionRow::from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
            None => {
                let mut stmt =
                    conn.prepare("SELECT * FROM sessions ORDER BY created_at DESC, id DESC")?;
                let rows = stmt
                    .query_map([], SessionRow::from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
        };
        raw.into_iter().map(SessionRow::resolve).collect()
    })
}

pub fn status_counts(db: &Database, session_id: i64) -> Result<StatusCounts, DatabaseError> {
    db.with_conn(|conn| tally(conn, session_id))
}

fn tally(conn: &Connection, session_id: i64) -> Result<StatusCounts, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT status, COUNT(*) FROM documents WHERE session_id = ?1 GROUP BY status",
    )?;
    let pairs = stmt
        .query_map(params![session_id], |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut counts = StatusCounts::default();
    for (status, n) in pairs {
        match DocumentStatus::from_column(status)? {
            DocumentStatus::Pending => counts.pending = n,
            DocumentStatus::Successful => counts.successful = n,
            DocumentStatus::Failed => counts.failed = n,
        }
    }
    Ok(counts)
}

/// Recomputes and stores the session aggregate. Returns the resulting status.
///
/// The tally and the write happen in one transaction under the connection
/// lock, so concurrent callers for the same session always store the
/// aggregate of the latest document states.
pub fn recompute_status(db: &Database, session_id: i64) -> Result<SessionStatus, DatabaseError> {
    db.with_conn(|conn| {
        let tx = conn.unchecked_transaction()?;
        let counts = tally(&tx, session_id)?;
        let (documents_count, current): (i64, String) = tx.query_row(
            "SELECT documents_count, status FROM sessions WHERE id = ?1",
            params![session_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?;
        let current = SessionStatus::from_column(current)?;
        let next = aggregate_status(documents_count, counts);

        if next != current {
            tx.execute(
                "UPDATE sessions SET status = ?2, updated_at = ?3 WHERE id = ?1",
                params![session_id, next.as_str(), now()],
            )?;
            log::info!("Session {} moved {} -> {}", session_id, current, next);
        }
        tx.commit()?;
        Ok(next)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    fn names(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("doc{}.pdf", i)).collect()
    }

    #[test]
    fn test_create_with_documents() {
        let db = test_db();
        let (session, docs) = create_with_documents(&db, &names(3)).unwrap();

        assert_eq!(session.documents_count, 3);
        assert_eq!(session.status, SessionStatus::Processing);
        assert_eq!(docs.len(), 3);
        assert!(docs.iter().all(|d| d.session_id == session.id));
        assert!(docs.iter().all(|d| d.status == DocumentStatus::Pending));

        let counts = status_counts(&db, session.id).unwrap();
        assert_eq!(counts.pending, 3);
    }

    #[test]
    fn test_find_nonexistent() {
        let db = test_db();
        assert!(find_by_id(&db, 42).unwrap().is_none());
    }

    #[test]
    fn test_list_filters_by_status_newest_first() {
        let db = test_db();
        let (first, _) = create_with_documents(&db, &names(1)).unwrap();
        let (second, _) = create_with_documents(&db, &names(1)).unwrap();
        db.with_conn(|conn| {
            conn.execute(
                "UPDATE sessions SET status = 'SUCCESS' WHERE id = ?1",
                params![first.id],
            )?;
            Ok(())
        })
        .unwrap();

        let all = list(&db, None).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, second.id);

        let done = list(&db, Some(SessionStatus::Success)).unwrap();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].id, first.id);
    }

    #[test]
    fn test_aggregate_status_rules() {
        let c = |pending, successful, failed| StatusCounts {
            pending,
            successful,
            failed,
        };
        assert_eq!(aggregate_status(2, c(0, 2, 0)), SessionStatus::Success);
        assert_eq!(aggregate_status(2, c(1, 1, 0)), SessionStatus::Processing);
        assert_eq!(aggregate_status(2, c(1, 0, 1)), SessionStatus::Processing);
        assert_eq!(aggregate_status(2, c(0, 1, 1)), SessionStatus::Failed);
        assert_eq!(aggregate_status(0, c(0, 0, 0)), SessionStatus::Processing);
    }

    #[test]
    fn test_recompute_status_reaches_failed() {
        let db = test_db();
        let (session, docs) = create_with_documents(&db, &names(2)).unwrap();

        for doc in &docs {
            assert_eq!(recompute_status(&db, session.id).unwrap(), SessionStatus::Processing);
            super::super::document_repo::mark_failed(&db, doc.id).ok();
        }
        // both failed, nothing pending
        assert_eq!(recompute_status(&db, session.id).unwrap(), SessionStatus::Failed);
        assert_eq!(
            find_by_id(&db, session.id).unwrap().unwrap().status,
            SessionStatus::Failed
        );
    }

    #[test]
    fn test_concurrent_completions_reach_success() {
        use super::super::document_repo::{self, DetectionFlags};

        let db = test_db();
        let payload = serde_json::json!({});
        let sessions: Vec<_> = (0..200)
            .map(|_| create_with_documents(&db, &names(2)).unwrap())
            .collect();

        for (_, docs) in &sessions {
            std::thread::scope(|scope| {
                for doc in docs {
                    let db = db.clone();
                    let payload = &payload;
                    scope.spawn(move || {
                        document_repo::mark_successful(&db, doc.id, DetectionFlags::default(), payload)
                            .unwrap();
                        recompute_status(&db, doc.session_id).unwrap();
                    });
                }
            });
        }

        for (session, _) in &sessions {
            assert_eq!(
                find_by_id(&db, session.id).unwrap().unwrap().status,
                SessionStatus::Success,
                "session {} stuck",
                session.id
            );
        }
    }
}
