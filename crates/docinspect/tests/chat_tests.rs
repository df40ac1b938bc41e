//! Follow-up work on processed documents: re-analysis through the worker
//! pool and chat questions answered from the stored analysis.

mod common;

use common::{harness::pdf_upload, raw_box, FakeAnalyzer, FakeDetector, TestHarness};
use docinspect::chat;
use docinspect::db::AnalysisStatus;
use docinspect::detect::Category;
use docinspect::reanalysis;
use docinspect::{DocumentStatus, InspectError, SessionStatus};

#[test]
fn reanalysis_on_the_pool_replaces_a_failed_analysis() {
    let h = TestHarness::new();
    let mut adapters = h.adapters();
    adapters.analyzer = FakeAnalyzer::failing();
    let pool = h.pool(h.pipeline(h.config(), adapters), 1);

    let session = h
        .intake()
        .create_session(vec![pdf_upload("invoice.pdf", 2)], &pool)
        .unwrap();
    let first = h.collect_results(&pool, 1);
    pool.shutdown();
    pool.wait();
    let doc_id = first[0].document_id;
    assert_eq!(h.analysis(doc_id).unwrap().status, AnalysisStatus::Failed);

    let pool = h.pool(h.pipeline(h.config(), h.adapters()), 1);
    let queued = reanalysis::schedule(&h.db, &pool, &format!("documents/{doc_id}")).unwrap();
    let results = h.collect_results(&pool, 1);
    pool.shutdown();
    pool.wait();

    assert_eq!(queued, doc_id);
    assert!(results[0].success, "failed: {:?}", results[0].error);
    let analysis = h.analysis(doc_id).unwrap();
    assert_eq!(analysis.status, AnalysisStatus::Completed);
    assert_eq!(analysis.document_type.as_deref(), Some("Invoice"));
    assert!(analysis.error_log.is_none());

    assert_eq!(h.document_statuses(session.id), vec![DocumentStatus::Successful]);
    assert_eq!(h.session_status(session.id), SessionStatus::Success);
}

#[test]
fn inline_reanalysis_returns_the_stored_status() {
    let h = TestHarness::new();
    let pipeline = h.pipeline(h.config(), h.adapters());
    let pool = h.pool(pipeline.clone(), 1);

    h.intake()
        .create_session(vec![pdf_upload("invoice.pdf", 1)], &pool)
        .unwrap();
    let results = h.collect_results(&pool, 1);
    pool.shutdown();
    pool.wait();
    let doc_id = results[0].document_id;

    let dto = reanalysis::run(&pipeline, &h.db, &doc_id.to_string()).unwrap();

    assert_eq!(dto.status, "COMPLETED");
    assert_eq!(dto.document_id, Some(doc_id.to_string()));
    assert_eq!(dto.mistake_words, Some(vec!["recieve".to_string()]));
}

#[test]
fn chat_prompt_carries_analysis_and_detection_signals() {
    let h = TestHarness::new();
    let mut adapters = h.adapters();
    adapters.signature =
        FakeDetector::on_page(Category::Signature, 1, vec![raw_box(10.0, 10.0, 40.0, 30.0, 0.9)]);
    let pool = h.pool(h.pipeline(h.config(), adapters), 1);

    h.intake()
        .create_session(vec![pdf_upload("signed.pdf", 1)], &pool)
        .unwrap();
    let results = h.collect_results(&pool, 1);
    pool.shutdown();
    pool.wait();

    let ctx = chat::load_context(&h.db, &results[0].document_id.to_string()).unwrap();
    let language = chat::pick_language(Some("de-DE,de;q=0.9,en;q=0.8"));
    let analyzer = FakeAnalyzer::reporting("Invoice");
    let reply = h
        .runtime
        .block_on(chat::answer(analyzer.as_ref(), &ctx, language.as_deref(), "Is it signed?"))
        .unwrap();

    let prompt = reply.answer;
    assert!(prompt.contains("Respond in language: de."), "{prompt}");
    assert!(prompt.contains("Document type: Invoice"), "{prompt}");
    assert!(prompt.contains(" - Signature present: yes"), "{prompt}");
    assert!(prompt.contains(" - Stamp present: no"), "{prompt}");
    assert!(prompt.contains("Pay in cash only."), "{prompt}");
    assert!(prompt.contains("recieve"), "{prompt}");
    assert!(prompt.ends_with("User question: Is it signed?"), "{prompt}");
    assert_eq!(reply.model.as_deref(), Some("fake"));
}

#[test]
fn chat_waits_for_a_completed_analysis() {
    let h = TestHarness::new();
    let mut config = h.config();
    config.analysis_enabled = false;
    let pool = h.pool(h.pipeline(config, h.adapters()), 1);

    h.intake()
        .create_session(vec![pdf_upload("plain.pdf", 1)], &pool)
        .unwrap();
    let results = h.collect_results(&pool, 1);
    pool.shutdown();
    pool.wait();

    let err = chat::load_context(&h.db, &results[0].document_id.to_string()).unwrap_err();
    assert!(matches!(err, InspectError::AnalysisNotReady(_)), "{err}");
}

#[test]
fn chat_upstream_failure_is_an_analysis_error() {
    let h = TestHarness::new();
    let err = h
        .runtime
        .block_on(chat::answer(
            FakeAnalyzer::failing().as_ref(),
            &chat::ChatContext::default(),
            None,
            "hello",
        ))
        .unwrap_err();
    assert!(matches!(err, InspectError::Analysis(_)), "{err}");
}
