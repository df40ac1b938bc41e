//! Session intake: turns a batch of uploads into a session, one PENDING
//! document per PDF, and one queued pipeline job per document.
//!
//! Intake never waits for a pipeline run, only for room in the job queue.
//! A document whose job cannot be queued because the pool has shut down is
//! marked FAILED on the spot and the session is still returned.

use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use tracing::{error, info, info_span, warn};

use crate::db::session_repo::{self, SessionRow};
use crate::db::{document_repo, Database};
use crate::error::{IntakeError, PersistenceError};
use crate::pipeline::best_effort;
use crate::sanitize;
use crate::worker::{Job, JobSink};

/// One file as received from the client.
#[derive(Debug, Clone)]
pub struct Upload {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }
}

/// A PDF ready to become a document. `name` is a base name only.
#[derive(Debug, Clone)]
pub struct PdfBlob {
    pub name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UploadKind {
    Pdf,
    Zip,
    Other,
}

fn classify(name: &str) -> UploadKind {
    let lower = name.to_ascii_lowercase();
    if lower.ends_with(".pdf") {
        UploadKind::Pdf
    } else if lower.ends_with(".zip") {
        UploadKind::Zip
    } else {
        UploadKind::Other
    }
}

/// Upper bound on the bytes one archive may inflate to.
pub const DEFAULT_MAX_EXTRACTED_BYTES: u64 = 512 * 1024 * 1024;

/// Expands archives and drops everything that is not a PDF.
pub fn collect_pdfs(uploads: Vec<Upload>) -> Result<Vec<PdfBlob>, IntakeError> {
    collect_pdfs_limited(uploads, DEFAULT_MAX_EXTRACTED_BYTES)
}

/// Like [`collect_pdfs`], with each archive allowed to inflate to at most
/// `max_extracted_bytes` of PDF data.
pub fn collect_pdfs_limited(
    uploads: Vec<Upload>,
    max_extracted_bytes: u64,
) -> Result<Vec<PdfBlob>, IntakeError> {
    if uploads.is_empty() {
        return Err(IntakeError::NoFiles);
    }

    let mut pdfs = Vec::new();
    for upload in uploads {
        match classify(&upload.name) {
            UploadKind::Pdf => pdfs.push(PdfBlob {
                name: sanitize::base_name(&upload.name).to_string(),
                bytes: upload.bytes,
            }),
            UploadKind::Zip => pdfs.extend(pdfs_from_zip(
                &upload.name,
                upload.bytes,
                max_extracted_bytes,
            )?),
            UploadKind::Other => {
                tracing::debug!(name = %sanitize::base_name(&upload.name), "Skipping non-PDF upload");
            }
        }
    }

    if pdfs.is_empty() {
        return Err(IntakeError::NoPdfs);
    }
    Ok(pdfs)
}

fn pdfs_from_zip(
    archive_name: &str,
    bytes: Vec<u8>,
    limit: u64,
) -> Result<Vec<PdfBlob>, IntakeError> {
    let corrupt = |e: &dyn std::fmt::Display| IntakeError::CorruptArchive {
        name: sanitize::base_name(archive_name).to_string(),
        message: e.to_string(),
    };
    let too_large = || IntakeError::ArchiveTooLarge {
        name: sanitize::base_name(archive_name).to_string(),
        limit,
    };
    let mut remaining = limit;

    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| corrupt(&e))?;
    let mut pdfs = Vec::new();

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| corrupt(&e))?;
        if entry.is_dir() || classify(entry.name()) != UploadKind::Pdf {
            continue;
        }
        if entry.size() > remaining {
            return Err(too_large());
        }
        let name = sanitize::base_name(entry.name()).to_string();

        // The header size is only a claim; the read itself is capped too.
        let mut data = Vec::new();
        (&mut entry)
            .take(remaining + 1)
            .read_to_end(&mut data)
            .map_err(|e| corrupt(&e))?;
        let read = data.len() as u64;
        if read > remaining {
            return Err(too_large());
        }
        remaining -= read;
        pdfs.push(PdfBlob { name, bytes: data });
    }

    Ok(pdfs)
}

pub struct SessionIntake {
    db: Database,
    work_root: PathBuf,
    max_extracted_bytes: u64,
}

impl SessionIntake {
    pub fn new(db: Database, work_root: impl Into<PathBuf>) -> Self {
        Self {
            db,
            work_root: work_root.into(),
            max_extracted_bytes: DEFAULT_MAX_EXTRACTED_BYTES,
        }
    }

    /// Caps how far a single archive may inflate.
    pub fn with_max_extracted_bytes(mut self, bytes: u64) -> Self {
        self.max_extracted_bytes = bytes;
        self
    }

    /// `{work_root}/uploads/{session_id}`
    pub fn upload_dir(&self, session_id: i64) -> PathBuf {
        self.work_root.join("uploads").join(session_id.to_string())
    }

    pub fn create_session(
        &self,
        uploads: Vec<Upload>,
        sink: &dyn JobSink,
    ) -> Result<SessionRow, IntakeError> {
        let _span = info_span!("intake", uploads = uploads.len()).entered();

        let pdfs = collect_pdfs_limited(uploads, self.max_extracted_bytes)?;
        let names: Vec<String> = pdfs.iter().map(|p| p.name.clone()).collect();
        let (session, documents) =
            session_repo::create_with_documents(&self.db, &names).map_err(PersistenceError::from)?;

        info!(
            session_id = session.id,
            documents = documents.len(),
            "Session created"
        );

        let dir = self.upload_dir(session.id);
        let mut rejected = 0usize;

        for (document, pdf) in documents.iter().zip(pdfs) {
            let path = dir.join(format!("{}.pdf", document.id));
            if let Err(e) = write_blob(&path, &pdf.bytes) {
                error!(document_id = document.id, error = %e, "Failed to store upload");
                self.reject(document.id);
                rejected += 1;
                continue;
            }

            let job = Job::new(session.id, document.id, path.clone(), document.original_name.clone());
            if let Err(e) = sink.submit(job) {
                warn!(document_id = document.id, error = %e, "Pipeline job not accepted");
                self.reject(document.id);
                best_effort("remove refused upload", || std::fs::remove_file(&path));
                rejected += 1;
            }
        }

        if rejected == 0 {
            return Ok(session);
        }

        best_effort("recompute session status", || {
            session_repo::recompute_status(&self.db, session.id)
        });
        Ok(session_repo::find_by_id(&self.db, session.id)
            .ok()
            .flatten()
            .unwrap_or(session))
    }

    fn reject(&self, document_id: i64) {
        best_effort("mark document failed", || {
            document_repo::mark_failed(&self.db, document_id)
        });
    }
}

fn write_blob(path: &Path, bytes: &[u8]) -> Result<(), IntakeError> {
    let io_err = |e| IntakeError::Io {
        path: path.to_path_buf(),
        source: e,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    std::fs::write(path, bytes).map_err(io_err)
}
