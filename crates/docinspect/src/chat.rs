//! Questions about an analyzed document, answered by the LLM with the
//! document's analysis and detection flags as context.

use crate::analysis::{prompts, Analyzer, ChatReply};
use crate::db::{analysis_repo, document_repo, AnalysisStatus, Database};
use crate::error::{InspectError, PersistenceError, Result};
use crate::ids::normalize_document_id;

const MAX_FRAUD_SENTENCES: usize = 10;
const MAX_MISTAKE_WORDS: usize = 50;

/// What the assistant knows about one document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatContext {
    pub document_type: Option<String>,
    pub document_summary: Option<String>,
    pub fraud_sentences: Vec<String>,
    pub mistake_words: Vec<String>,
    pub has_signature: bool,
    pub has_stamp: bool,
}

/// Loads the chat context for a raw document reference. The document must
/// exist and its analysis must be COMPLETED.
pub fn load_context(db: &Database, raw_document_id: &str) -> Result<ChatContext> {
    let document_id = normalize_document_id(raw_document_id)?;
    let document = document_repo::find_by_id(db, document_id)?.ok_or(PersistenceError::NotFound {
        entity: "document",
        id: document_id,
    })?;
    let analysis = analysis_repo::find_by_document_id(db, document_id)?
        .filter(|a| a.status == AnalysisStatus::Completed)
        .ok_or(InspectError::AnalysisNotReady(document_id))?;

    Ok(ChatContext {
        document_type: analysis.document_type,
        document_summary: analysis.document_summary,
        fraud_sentences: analysis.fraud_sentences,
        mistake_words: analysis.mistake_words,
        has_signature: document.has_signature,
        has_stamp: document.has_stamp,
    })
}

/// Primary language of an `Accept-Language` header: `"de-CH, en;q=0.8"` → `"de"`.
pub fn pick_language(accept_language: Option<&str>) -> Option<String> {
    let first = accept_language?.split(',').next()?;
    let tag = first.split(';').next()?.trim();
    let primary = tag.split('-').next()?.trim().to_ascii_lowercase();
    (!primary.is_empty() && primary != "*").then_some(primary)
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

/// Context block followed by the user's question.
pub fn build_prompt(ctx: &ChatContext, language: Option<&str>, message: &str) -> String {
    let mut lines = vec![prompts::CHAT_PREAMBLE.to_string()];
    if let Some(language) = language {
        lines.push(format!("Respond in language: {language}."));
    }
    lines.push(format!(
        "Document type: {}",
        ctx.document_type.as_deref().unwrap_or("unknown")
    ));
    if let Some(summary) = ctx.document_summary.as_deref().filter(|s| !s.trim().is_empty()) {
        lines.push("Document summary:".to_string());
        lines.push(summary.trim().to_string());
    }
    lines.push("Verification signals:".to_string());
    lines.push(format!(" - Signature present: {}", yes_no(ctx.has_signature)));
    lines.push(format!(" - Stamp present: {}", yes_no(ctx.has_stamp)));
    if !ctx.fraud_sentences.is_empty() {
        lines.push("Potential fraud sentences:".to_string());
        lines.extend(
            ctx.fraud_sentences
                .iter()
                .take(MAX_FRAUD_SENTENCES)
                .map(|s| format!(" - {s}")),
        );
    }
    if !ctx.mistake_words.is_empty() {
        let words: Vec<&str> = ctx
            .mistake_words
            .iter()
            .take(MAX_MISTAKE_WORDS)
            .map(String::as_str)
            .collect();
        lines.push(format!("Detected misspelled words: {}", words.join(", ")));
    }
    lines.push(prompts::CHAT_GUIDANCE.to_string());

    format!("{}{}{}", lines.join("\n"), prompts::USER_QUESTION, message.trim())
}

/// Answers `message` about the document described by `ctx`.
pub async fn answer(
    analyzer: &dyn Analyzer,
    ctx: &ChatContext,
    language: Option<&str>,
    message: &str,
) -> Result<ChatReply> {
    let prompt = build_prompt(ctx, language, message);
    tracing::debug!(prompt_chars = prompt.len(), "Sending chat question");
    Ok(analyzer.chat(&prompt).await?)
}
