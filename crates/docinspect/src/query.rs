//! Read side: the views served by the status endpoints.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::db::document_repo::{self, DocumentRow, Order};
use crate::db::session_repo::{self, SessionRow};
use crate::db::{analysis_repo, AnalysisStatus, Database, DocumentStatus, SessionStatus};
use crate::error::{PersistenceError, Result};
use crate::ids::normalize_document_id;
use crate::payload::LabelsPayload;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDto {
    pub id: String,
    pub status: SessionStatus,
    pub total_documents: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl From<SessionRow> for SessionDto {
    fn from(row: SessionRow) -> Self {
        Self {
            id: row.id.to_string(),
            status: row.status,
            total_documents: row.documents_count,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Verification {
    #[serde(rename = "hasQR")]
    pub has_qr: bool,
    pub has_stamp: bool,
    pub has_signature: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentDto {
    pub id: String,
    /// Original PDF URL once processed, otherwise the original file name.
    pub document_url: String,
    pub original_name: String,
    pub status: DocumentStatus,
    pub created_at: String,
    pub updated_at: String,
    pub verification: Verification,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentDetailsDto {
    #[serde(flatten)]
    pub document: DocumentDto,
    pub labeled_document_url: Option<String>,
    pub labels_position: Option<Value>,
}

fn parsed_payload(row: &DocumentRow) -> Option<LabelsPayload> {
    let value = row.labels_position.as_ref()?;
    match LabelsPayload::normalize(value) {
        Ok(payload) => Some(payload),
        Err(e) => {
            tracing::warn!(document_id = row.id, error = %e, "Unreadable labels payload");
            None
        }
    }
}

impl DocumentDto {
    fn build(row: &DocumentRow, payload: Option<&LabelsPayload>) -> Self {
        let document_url = payload
            .and_then(LabelsPayload::original_pdf_url)
            .map(str::to_string)
            .unwrap_or_else(|| row.original_name.clone());

        Self {
            id: row.id.to_string(),
            document_url,
            original_name: row.original_name.clone(),
            status: row.status,
            created_at: row.created_at.clone(),
            updated_at: row.updated_at.clone(),
            verification: Verification {
                has_qr: row.has_qr,
                has_stamp: row.has_stamp,
                has_signature: row.has_signature,
            },
        }
    }
}

impl From<&DocumentRow> for DocumentDto {
    fn from(row: &DocumentRow) -> Self {
        Self::build(row, parsed_payload(row).as_ref())
    }
}

impl From<DocumentRow> for DocumentDetailsDto {
    fn from(row: DocumentRow) -> Self {
        let payload = parsed_payload(&row);
        Self {
            document: DocumentDto::build(&row, payload.as_ref()),
            labeled_document_url: payload
                .as_ref()
                .and_then(LabelsPayload::labeled_pdf_url)
                .map(str::to_string),
            labels_position: row.labels_position,
        }
    }
}

/// Sessions, newest first.
pub fn list_sessions(db: &Database, status: Option<SessionStatus>) -> Result<Vec<SessionDto>> {
    Ok(session_repo::list(db, status)?
        .into_iter()
        .map(SessionDto::from)
        .collect())
}

pub fn get_session(db: &Database, session_id: i64) -> Result<SessionDto> {
    session_repo::find_by_id(db, session_id)?
        .map(SessionDto::from)
        .ok_or_else(|| {
            PersistenceError::NotFound {
                entity: "session",
                id: session_id,
            }
            .into()
        })
}

/// Documents of a session, newest first. An unknown session has no documents.
pub fn list_documents(
    db: &Database,
    session_id: i64,
    status: Option<DocumentStatus>,
) -> Result<Vec<DocumentDto>> {
    Ok(
        document_repo::list_by_session(db, session_id, status, Order::NewestFirst)?
            .iter()
            .map(DocumentDto::from)
            .collect(),
    )
}

/// Document details, only if it belongs to `session_id`.
pub fn get_document(db: &Database, session_id: i64, document_id: i64) -> Result<DocumentDetailsDto> {
    document_repo::find_by_id(db, document_id)?
        .filter(|row| row.session_id == session_id)
        .map(DocumentDetailsDto::from)
        .ok_or_else(|| {
            PersistenceError::NotFound {
                entity: "document",
                id: document_id,
            }
            .into()
        })
}

/// Maps each processed document's name to its `page_<n>` entries.
///
/// Documents are taken oldest first; a repeated name becomes `name (2)`,
/// `name (3)` and so on. Documents without a readable payload are left out.
pub fn labels_map(db: &Database, session_id: i64) -> Result<Map<String, Value>> {
    let rows = document_repo::list_by_session(db, session_id, None, Order::OldestFirst)?;
    let mut out = Map::new();

    for row in &rows {
        let Some(payload) = parsed_payload(row) else {
            continue;
        };

        let name = payload
            .original_name()
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .or_else(|| Some(row.original_name.clone()).filter(|n| !n.is_empty()))
            .unwrap_or_else(|| format!("document_{}.pdf", row.id));

        out.insert(unique_key(&out, &name), Value::Object(payload.pages_map()));
    }

    Ok(out)
}

fn unique_key(taken: &Map<String, Value>, name: &str) -> String {
    let mut key = name.to_string();
    let mut suffix = 1;
    while taken.contains_key(&key) {
        suffix += 1;
        key = format!("{} ({})", name, suffix);
    }
    key
}

pub const NOT_FOUND_MESSAGE: &str = "No analysis found for this document";

/// Analysis state as reported to clients. Result fields are present only
/// for the matching status.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisStatusDto {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fraud_sentences: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mistake_words: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_log: Option<String>,
}

impl AnalysisStatusDto {
    fn not_found() -> Self {
        Self {
            message: Some(NOT_FOUND_MESSAGE.to_string()),
            ..Self::with_status("NOT_FOUND")
        }
    }

    fn with_status(status: &str) -> Self {
        Self {
            status: status.to_string(),
            message: None,
            document_id: None,
            fraud_sentences: None,
            mistake_words: None,
            document_type: None,
            document_summary: None,
            error_log: None,
        }
    }
}

/// Looks up the analysis for a raw document reference (`"42"` or a path
/// ending in the id).
pub fn analysis_status(db: &Database, raw_document_id: &str) -> Result<AnalysisStatusDto> {
    let document_id = normalize_document_id(raw_document_id)?;
    let Some(row) = analysis_repo::find_by_document_id(db, document_id)? else {
        return Ok(AnalysisStatusDto::not_found());
    };

    let mut dto = AnalysisStatusDto {
        document_id: Some(row.document_id.to_string()),
        ..AnalysisStatusDto::with_status(row.status.as_str())
    };

    match row.status {
        AnalysisStatus::Completed => {
            dto.fraud_sentences = Some(row.fraud_sentences);
            dto.mistake_words = Some(row.mistake_words);
            dto.document_type = row.document_type;
            dto.document_summary = row.document_summary;
        }
        AnalysisStatus::Failed => dto.error_log = row.error_log,
        AnalysisStatus::Processing => {}
    }
    Ok(dto)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::AnalysisReport;
    use crate::db::document_repo::DetectionFlags;
    use crate::error::InspectError;
    use serde_json::json;

    fn seeded(names: &[&str]) -> (Database, i64, Vec<i64>) {
        let db = Database::open_in_memory().unwrap();
        let names: Vec<String> = names.iter().map(|n| n.to_string()).collect();
        let (session, docs) = session_repo::create_with_documents(&db, &names).unwrap();
        (db, session.id, docs.iter().map(|d| d.id).collect())
    }

    fn challenge(key: &str, name: &str, original_url: &str) -> Value {
        json!({
            "shape": "challenge",
            key: {
                "page_1": {
                    "annotations": [
                        {"annotation_1": {"category": "qr", "bbox": {"x": 1.0, "y": 2.0, "width": 3.0, "height": 4.0}, "area": 12.0, "confidence": 0.9}}
                    ],
                    "page_size": {"width": 100, "height": 200}
                },
                "original_name": name,
                "artifacts": {
                    "originalPdfUrl": original_url,
                    "labeledPdfUrl": "http://s3/labeled.pdf",
                    "pages": []
                }
            }
        })
    }

    #[test]
    fn test_session_dto_shape() {
        let (db, session_id, _) = seeded(&["a.pdf", "b.pdf"]);
        let dto = get_session(&db, session_id).unwrap();
        let value = serde_json::to_value(&dto).unwrap();
        assert_eq!(value["id"], session_id.to_string());
        assert_eq!(value["status"], "PROCESSING");
        assert_eq!(value["totalDocuments"], 2);
        assert!(value.get("createdAt").is_some());
    }

    #[test]
    fn test_missing_session_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        let err = get_session(&db, 99).unwrap_err();
        assert!(matches!(
            err,
            InspectError::Persistence(PersistenceError::NotFound { entity: "session", id: 99 })
        ));
    }

    #[test]
    fn test_document_url_falls_back_to_original_name() {
        let (db, session_id, ids) = seeded(&["a.pdf", "b.pdf"]);
        document_repo::mark_successful(
            &db,
            ids[1],
            DetectionFlags {
                has_qr: true,
                ..Default::default()
            },
            &challenge("b_pdf", "b.pdf", "http://s3/b.pdf"),
        )
        .unwrap();

        let docs = list_documents(&db, session_id, None).unwrap();
        assert_eq!(docs.len(), 2);
        let by_id = |id: i64| docs.iter().find(|d| d.id == id.to_string()).unwrap();
        assert_eq!(by_id(ids[0]).document_url, "a.pdf");
        assert_eq!(by_id(ids[1]).document_url, "http://s3/b.pdf");

        let value = serde_json::to_value(by_id(ids[1])).unwrap();
        assert_eq!(value["verification"], json!({"hasQR": true, "hasStamp": false, "hasSignature": false}));

        let successful = list_documents(&db, session_id, Some(DocumentStatus::Successful)).unwrap();
        assert_eq!(successful.len(), 1);
    }

    #[test]
    fn test_document_details() {
        let (db, session_id, ids) = seeded(&["a.pdf"]);
        let payload = challenge("a_pdf", "a.pdf", "http://s3/a.pdf");
        document_repo::mark_successful(&db, ids[0], DetectionFlags::default(), &payload).unwrap();

        let details = get_document(&db, session_id, ids[0]).unwrap();
        assert_eq!(details.labeled_document_url.as_deref(), Some("http://s3/labeled.pdf"));
        assert_eq!(details.labels_position, Some(payload));

        let value = serde_json::to_value(&details).unwrap();
        assert_eq!(value["documentUrl"], "http://s3/a.pdf");
        assert_eq!(value["labeledDocumentUrl"], "http://s3/labeled.pdf");
    }

    #[test]
    fn test_document_of_other_session_is_not_found() {
        let (db, session_id, ids) = seeded(&["a.pdf"]);
        assert!(get_document(&db, session_id + 1, ids[0]).is_err());
        assert!(get_document(&db, session_id, ids[0] + 100).is_err());
    }

    #[test]
    fn test_labels_map_dedupes_names_in_creation_order() {
        let (db, session_id, ids) = seeded(&["scan.pdf", "scan.pdf", "other.pdf", "pending.pdf"]);
        for (id, name) in ids.iter().zip(["scan.pdf", "scan.pdf", "other.pdf"]) {
            document_repo::mark_successful(
                &db,
                *id,
                DetectionFlags::default(),
                &challenge("k", name, "http://s3/x.pdf"),
            )
            .unwrap();
        }

        let map = labels_map(&db, session_id).unwrap();
        let mut keys: Vec<&String> = map.keys().collect();
        keys.sort();
        assert_eq!(keys, vec!["other.pdf", "scan.pdf", "scan.pdf (2)"]);
        let page = &map["scan.pdf"]["page_1"];
        assert_eq!(page["page_size"]["width"], 100);
        assert!(map["scan.pdf"].get("original_name").is_none());
    }

    #[test]
    fn test_labels_map_reads_legacy_payload() {
        let (db, session_id, ids) = seeded(&["old.pdf"]);
        let legacy = json!({
            "artifacts": {"originalPdfUrl": "http://s3/old.pdf", "labeledPdfUrl": null, "pages": []},
            "detections": {
                "1": [{"category": "stamp", "x": 1.0, "y": 1.0, "width": 2.0, "height": 2.0, "area": 4.0, "confidence": 0.8}]
            }
        });
        document_repo::mark_successful(&db, ids[0], DetectionFlags::default(), &legacy).unwrap();

        let map = labels_map(&db, session_id).unwrap();
        let annotations = map["old.pdf"]["page_1"]["annotations"].as_array().unwrap();
        assert_eq!(annotations[0]["annotation_1"]["category"], "stamp");
    }

    #[test]
    fn test_analysis_status_variants() {
        let (db, _, ids) = seeded(&["a.pdf", "b.pdf", "c.pdf"]);

        let missing = analysis_status(&db, "12345").unwrap();
        assert_eq!(
            serde_json::to_value(&missing).unwrap(),
            json!({"status": "NOT_FOUND", "message": NOT_FOUND_MESSAGE})
        );

        analysis_repo::start(&db, ids[0]).unwrap();
        let processing = analysis_status(&db, &ids[0].to_string()).unwrap();
        assert_eq!(
            serde_json::to_value(&processing).unwrap(),
            json!({"status": "PROCESSING", "documentId": ids[0].to_string()})
        );

        analysis_repo::start(&db, ids[1]).unwrap();
        let report = AnalysisReport {
            fraud_sentences: vec!["wire it today".to_string()],
            mistake_words: vec![],
            document_type: "Invoice".to_string(),
            document_summary: "An invoice.".to_string(),
        };
        analysis_repo::complete(&db, ids[1], "text", &report).unwrap();
        let completed = analysis_status(&db, &format!("sessions/1/documents/{}", ids[1])).unwrap();
        assert_eq!(completed.status, "COMPLETED");
        assert_eq!(completed.fraud_sentences, Some(vec!["wire it today".to_string()]));
        assert_eq!(completed.document_type.as_deref(), Some("Invoice"));
        assert!(completed.error_log.is_none());

        analysis_repo::start(&db, ids[2]).unwrap();
        analysis_repo::fail(&db, ids[2], "Failed to extract text from PDF: timed out").unwrap();
        let failed = analysis_status(&db, &ids[2].to_string()).unwrap();
        assert_eq!(failed.status, "FAILED");
        assert_eq!(failed.error_log.as_deref(), Some("Failed to extract text from PDF: timed out"));
        assert!(failed.fraud_sentences.is_none());
    }

    #[test]
    fn test_analysis_status_rejects_bad_id() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(
            analysis_status(&db, "documents/abc"),
            Err(InspectError::InvalidId(_))
        ));
    }
}
