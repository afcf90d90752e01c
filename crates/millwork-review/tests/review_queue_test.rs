//! Review decisions and interpretation merges against the in-memory store.

use std::sync::Arc;

use async_trait::async_trait;
use millwork_core::{
    AccessPolicy, Candidate, Capability, ConfidenceLevel, ConfidenceScorer, Decision,
    DimensionSet, Error, InterpretationResult, InterpretationSource, NewReview, Recommendation,
    RequestContext, ResourceKind, ReviewFilter, ReviewStatus, ReviewType, SyncConflict,
    SyncDirection,
};
use millwork_db::{MemoryStore, Stores};
use millwork_inference::{DimensionInterpreter, MockGenerationBackend};
use millwork_review::{ApproveRequest, ReviewConfig, ReviewQueue};

const PROJECT: Option<i64> = Some(7);

struct Harness {
    store: Arc<MemoryStore>,
    stores: Stores,
    queue: Arc<ReviewQueue>,
}

fn harness_with(interpreter: DimensionInterpreter) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let stores = Stores::memory(store.clone());
    let queue = Arc::new(ReviewQueue::new(&stores, Arc::new(interpreter)));
    Harness {
        store,
        stores,
        queue,
    }
}

fn harness() -> Harness {
    harness_with(DimensionInterpreter::rules_only())
}

fn reviewer() -> RequestContext {
    RequestContext::new(Some(42), Some(1))
}

async fn pending_review(h: &Harness, name: &str, total: f64) -> i64 {
    let candidate = Candidate::named(name).with_dimensions(30.0, 34.5, 24.0);
    let mut score = ConfidenceScorer::default().score(&candidate);
    score.total = total;
    score.level = ReviewConfig::default().thresholds.level_for(total);
    h.stores
        .reviews
        .create(NewReview {
            job_id: Some(1),
            project_id: PROJECT,
            review_type: ReviewType::Ambiguous,
            candidate,
            score,
            cabinet_id: None,
            sync_conflict: None,
        })
        .await
        .unwrap()
        .id
}

fn approve_answer(score: f64, width: f64) -> InterpretationResult {
    InterpretationResult {
        recommendation: Recommendation::Approve,
        corrected_dimensions: Some(DimensionSet {
            width: Some(width),
            ..Default::default()
        }),
        improved_confidence: Some(score),
        warnings: vec![],
        reasoning: Some("standard vanity".to_string()),
        source: InterpretationSource::External,
    }
}

#[tokio::test]
async fn test_approve_materializes_corrected_cabinet() {
    let h = harness();
    let id = pending_review(&h, "Austin-Van", 60.0).await;

    let corrections = DimensionSet {
        width: Some(33.0),
        ..Default::default()
    };
    let review = h
        .queue
        .approve(&reviewer(), id, ApproveRequest::with_corrections(corrections))
        .await
        .unwrap();

    assert_eq!(review.status, ReviewStatus::Approved);
    assert_eq!(review.reviewer_id, Some(42));
    assert!(review.reviewed_at.is_some());
    assert_eq!(review.corrections, Some(corrections));

    let cabinet = h
        .stores
        .cabinets
        .get(review.cabinet_id.expect("cabinet linked"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cabinet.length_inches, Some(33.0));
    assert_eq!(cabinet.project_id, PROJECT);
    assert_eq!(cabinet.source_review_id, Some(id));
    assert_eq!(
        cabinet.sync_baseline.map(|b| b.direction),
        Some(SyncDirection::Cad)
    );
}

#[tokio::test]
async fn test_second_decision_is_already_processed() {
    let h = harness();
    let approved = pending_review(&h, "Austin-Van", 60.0).await;
    let rejected = pending_review(&h, "Austin-Base", 60.0).await;

    h.queue
        .approve(&reviewer(), approved, ApproveRequest::default())
        .await
        .unwrap();
    let err = h
        .queue
        .approve(&reviewer(), approved, ApproveRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AlreadyProcessed(_)));
    let err = h
        .queue
        .reject(&reviewer(), approved, "duplicate")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AlreadyProcessed(_)));

    h.queue
        .reject(&reviewer(), rejected, "not a cabinet")
        .await
        .unwrap();
    let err = h
        .queue
        .reject(&reviewer(), rejected, "again")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AlreadyProcessed(_)));
    let err = h
        .queue
        .approve(&reviewer(), rejected, ApproveRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AlreadyProcessed(_)));

    assert_eq!(h.stores.cabinets.list_for_project(PROJECT).await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_approvals_create_one_cabinet() {
    let h = harness();
    let id = pending_review(&h, "Austin-Van", 60.0).await;

    let tasks: Vec<_> = [30.0, 36.0]
        .into_iter()
        .map(|width| {
            let queue = h.queue.clone();
            tokio::spawn(async move {
                let corrections = DimensionSet {
                    width: Some(width),
                    ..Default::default()
                };
                queue
                    .approve(&reviewer(), id, ApproveRequest::with_corrections(corrections))
                    .await
            })
        })
        .collect();
    let results: Vec<_> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    let already = results
        .iter()
        .filter(|r| matches!(r, Err(Error::AlreadyProcessed(_))))
        .count();
    assert_eq!((succeeded, already), (1, 1));
    assert_eq!(h.stores.cabinets.list_for_project(PROJECT).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_failed_materialization_leaves_review_pending() {
    let h = harness();
    let id = pending_review(&h, "Austin-Van", 60.0).await;
    h.store.set_fail_cabinet_writes(true);

    assert!(h
        .queue
        .approve(&reviewer(), id, ApproveRequest::default())
        .await
        .is_err());
    let review = h.queue.get(&reviewer(), id).await.unwrap();
    assert_eq!(review.status, ReviewStatus::Pending);
    assert!(review.cabinet_id.is_none());
}

#[tokio::test]
async fn test_invalid_input_is_rejected_before_any_write() {
    let h = harness();
    let id = pending_review(&h, "Austin-Van", 60.0).await;

    let out_of_range = DimensionSet {
        width: Some(500.0),
        ..Default::default()
    };
    let err = h
        .queue
        .approve(&reviewer(), id, ApproveRequest::with_corrections(out_of_range))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let err = h.queue.reject(&reviewer(), id, "   ").await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let err = h.queue.get(&reviewer(), 999).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    assert!(h.queue.get(&reviewer(), id).await.unwrap().is_pending());
}

#[tokio::test]
async fn test_sync_conflict_cannot_be_approved_directly() {
    let h = harness();
    let candidate = Candidate::named("Austin-Van").with_dimensions(30.0, 34.5, 24.0);
    let score = ConfidenceScorer::default().score(&candidate);
    let review = h
        .stores
        .reviews
        .create(NewReview {
            job_id: None,
            project_id: PROJECT,
            review_type: ReviewType::SyncConflict,
            candidate,
            score,
            cabinet_id: Some(1),
            sync_conflict: Some(SyncConflict {
                cabinet_id: 1,
                erp: DimensionSet::default(),
                cad: DimensionSet::default(),
                baseline: None,
                fields: vec![],
            }),
        })
        .await
        .unwrap();

    let err = h
        .queue
        .approve(&reviewer(), review.id, ApproveRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
async fn test_list_defaults_to_pending_and_dedupes_by_group() {
    let h = harness();
    let older = pending_review(&h, "Austin-Van", 40.0).await;
    let newer = pending_review(&h, "Austin-Van", 45.0).await;
    let decided = pending_review(&h, "Austin-Base", 60.0).await;
    h.queue
        .reject(&reviewer(), decided, "not needed")
        .await
        .unwrap();

    let page = h
        .queue
        .list(&reviewer(), ReviewFilter::default())
        .await
        .unwrap();
    assert_eq!(page.total, 2);
    assert!(page.items.iter().all(|r| r.is_pending()));

    let page = h
        .queue
        .list(
            &reviewer(),
            ReviewFilter {
                dedupe: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].id, newer);
    assert_ne!(page.items[0].id, older);

    let page = h
        .queue
        .list(
            &reviewer(),
            ReviewFilter {
                status: None,
                min_confidence: Some(50.0),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].id, decided);
}

#[tokio::test]
async fn test_interpretation_never_lowers_score() {
    let h = harness();
    let id = pending_review(&h, "Austin-Van", 60.0).await;

    let mut lower = approve_answer(20.0, 30.0);
    lower.recommendation = Recommendation::Review;
    let saved = h
        .queue
        .save_interpretation(&reviewer(), id, lower, false)
        .await
        .unwrap();
    assert_eq!(saved.review.confidence_score, 60.0);
    assert!(!saved.auto_applied);
    assert!(saved.review.ai_interpretation.is_some());

    let higher = approve_answer(75.0, 30.0);
    let saved = h
        .queue
        .save_interpretation(&reviewer(), id, higher, false)
        .await
        .unwrap();
    assert_eq!(saved.review.confidence_score, 75.0);
    assert!(saved.review.is_pending());
}

#[tokio::test]
async fn test_auto_apply_approves_with_corrected_dimensions() {
    let h = harness();
    let id = pending_review(&h, "Austin-Van", 60.0).await;

    let saved = h
        .queue
        .save_interpretation(&RequestContext::system(), id, approve_answer(90.0, 31.5), true)
        .await
        .unwrap();
    assert!(saved.auto_applied);
    assert_eq!(saved.review.status, ReviewStatus::Approved);
    assert_eq!(saved.review.confidence_level, ConfidenceLevel::High);

    let cabinet = h
        .stores
        .cabinets
        .get(saved.review.cabinet_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cabinet.length_inches, Some(31.5));
}

#[tokio::test]
async fn test_auto_apply_requires_confidence_and_approve() {
    let h = harness();
    let id = pending_review(&h, "Austin-Van", 40.0).await;

    let saved = h
        .queue
        .save_interpretation(&reviewer(), id, approve_answer(70.0, 30.0), true)
        .await
        .unwrap();
    assert!(!saved.auto_applied);
    assert!(saved.review.is_pending());

    let mut review_only = approve_answer(95.0, 30.0);
    review_only.recommendation = Recommendation::Review;
    let saved = h
        .queue
        .save_interpretation(&reviewer(), id, review_only, true)
        .await
        .unwrap();
    assert!(!saved.auto_applied);
    assert!(saved.review.is_pending());
}

#[tokio::test]
async fn test_auto_apply_after_human_decision_is_noop() {
    let h = harness();
    let id = pending_review(&h, "Austin-Van", 60.0).await;
    h.queue
        .reject(&reviewer(), id, "wrong group")
        .await
        .unwrap();

    let saved = h
        .queue
        .save_interpretation(&RequestContext::system(), id, approve_answer(95.0, 30.0), true)
        .await
        .unwrap();
    assert!(!saved.auto_applied);
    assert_eq!(saved.review.status, ReviewStatus::Rejected);
    assert!(saved.review.ai_interpretation.is_none());
    assert!(h.stores.cabinets.list_for_project(PROJECT).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_invalid_interpretation_is_rejected() {
    let h = harness();
    let id = pending_review(&h, "Austin-Van", 60.0).await;
    let err = h
        .queue
        .save_interpretation(&reviewer(), id, approve_answer(140.0, 30.0), false)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
async fn test_request_interpretation_saves_model_answer() {
    let backend = MockGenerationBackend::new().with_response(
        r#"{"interpretation": {"corrected_dimensions": {"width": 30}},
            "improved_confidence": {"score": 88},
            "recommendation": "approve"}"#,
    );
    let h = harness_with(DimensionInterpreter::new(Arc::new(backend.clone())));
    let id = pending_review(&h, "Austin-Van", 60.0).await;

    let task = h
        .queue
        .request_interpretation(&reviewer(), id, true)
        .await
        .unwrap();
    task.await.unwrap();

    let review = h.queue.get(&reviewer(), id).await.unwrap();
    assert_eq!(backend.call_count(), 1);
    assert_eq!(review.status, ReviewStatus::Approved);
    assert_eq!(review.confidence_score, 88.0);
    assert_eq!(
        review.ai_interpretation.map(|i| i.source),
        Some(InterpretationSource::Model)
    );
}

#[tokio::test]
async fn test_request_interpretation_falls_back_to_rules() {
    let backend = MockGenerationBackend::new().with_failure();
    let h = harness_with(DimensionInterpreter::new(Arc::new(backend)));
    let id = pending_review(&h, "Austin-Van", 60.0).await;

    h.queue
        .request_interpretation(&reviewer(), id, false)
        .await
        .unwrap()
        .await
        .unwrap();

    let review = h.queue.get(&reviewer(), id).await.unwrap();
    assert!(review.is_pending());
    assert_eq!(review.confidence_score, 60.0);
    assert_eq!(
        review.ai_interpretation.map(|i| i.source),
        Some(InterpretationSource::Rules)
    );
}

#[tokio::test]
async fn test_interpretation_context_uses_corrected_candidate() {
    let h = harness();
    let id = pending_review(&h, "Austin-Van", 60.0).await;
    let context = h.queue.interpretation_context(&reviewer(), id).await.unwrap();
    assert_eq!(context.cabinet.name, "Austin-Van");
    assert_eq!(context.confidence_score.total, 60.0);
    assert!(context.prompt.contains("Austin-Van"));
}

struct DenyDecisions;

#[async_trait]
impl AccessPolicy for DenyDecisions {
    async fn check(
        &self,
        _: &RequestContext,
        _: ResourceKind,
        capability: Capability,
    ) -> millwork_core::Result<Decision> {
        Ok(match capability {
            Capability::Decide => Decision::Deny,
            _ => Decision::Allow,
        })
    }
}

#[tokio::test]
async fn test_policy_denial_is_forbidden() {
    let mut h = harness();
    let queue = ReviewQueue::new(&h.stores, Arc::new(DimensionInterpreter::rules_only()))
        .with_policy(Arc::new(DenyDecisions));
    h.queue = Arc::new(queue);
    let id = pending_review(&h, "Austin-Van", 60.0).await;

    let err = h
        .queue
        .approve(&reviewer(), id, ApproveRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Forbidden(_)));
    assert!(h.queue.get(&reviewer(), id).await.unwrap().is_pending());
}
