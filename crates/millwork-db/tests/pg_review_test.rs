//! Review queue guarantees against PostgreSQL.
//!
//! Requires a migrated database at `DATABASE_URL`; run with
//! `cargo test -p millwork-db --features migrations -- --ignored`.

use millwork_db::test_fixtures::test_database_url;
use millwork_db::{
    Approval, ApprovalEffect, Candidate, ConfidenceScorer, Database, Error, ExtractionJobRepository,
    InterpretationResult, JobStatus, JobSummary, LevelThresholds, NewExtractionJob, NewReview,
    PgExtractionJobRepository, Recommendation, ReviewFilter, ReviewRepository, ReviewStatus,
    ReviewType,
};

async fn setup_db() -> Database {
    let db = Database::connect(&test_database_url())
        .await
        .expect("Failed to connect to test database");
    #[cfg(feature = "migrations")]
    db.migrate().await.expect("Failed to migrate");
    db
}

fn review_for(name: &str, project_id: i64) -> NewReview {
    let candidate = Candidate::named(name).with_dimensions(30.0, 34.5, 24.0);
    let score = ConfidenceScorer::default().score(&candidate);
    NewReview {
        job_id: None,
        project_id: Some(project_id),
        review_type: ReviewType::LowConfidence,
        candidate,
        score,
        cabinet_id: None,
        sync_conflict: None,
    }
}

fn unique_project() -> i64 {
    (uuid::Uuid::now_v7().as_u128() % 1_000_000_000) as i64
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_pg_approve_is_compare_and_set() {
    let db = setup_db().await;
    let review = db
        .reviews
        .create(review_for("Austin-Van", unique_project()))
        .await
        .unwrap();

    let approved = db
        .reviews
        .approve(review.id, Approval::default(), ApprovalEffect::None)
        .await
        .unwrap();
    assert_eq!(approved.status, ReviewStatus::Approved);

    let err = db
        .reviews
        .reject(review.id, None, "too late")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AlreadyProcessed(_)));
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_pg_list_dedupes_by_group() {
    let db = setup_db().await;
    let project = unique_project();
    db.reviews
        .create(review_for("Austin-Van", project))
        .await
        .unwrap();
    let newer = db
        .reviews
        .create(review_for("Austin-Van", project))
        .await
        .unwrap();

    let page = db
        .reviews
        .list(&ReviewFilter {
            project_id: Some(project),
            dedupe: true,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].id, newer.id);
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_pg_job_lifecycle() {
    let db = setup_db().await;
    let (job, created) = db
        .jobs
        .queue_deduplicated(NewExtractionJob {
            project_id: Some(unique_project()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(created);
    assert_eq!(job.status, JobStatus::Pending);

    // Other tests may have queued jobs; drain until ours is claimed.
    while let Some(claimed) = db.jobs.claim_next().await.unwrap() {
        if claimed.id == job.id {
            break;
        }
    }
    assert!(db.jobs.complete(job.id, &JobSummary::default()).await.unwrap());
    assert!(!db.jobs.fail(job.id, "late", None).await.unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires PostgreSQL"]
async fn test_pg_concurrent_dedupe_queues_one_job() {
    let db = setup_db().await;
    let project = unique_project();

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..8 {
        let jobs = PgExtractionJobRepository::with_notify(db.pool.clone(), db.jobs.job_notify());
        tasks.spawn(async move {
            jobs.queue_deduplicated(NewExtractionJob {
                project_id: Some(project),
                ..Default::default()
            })
            .await
        });
    }

    let mut results = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        results.push(joined.unwrap().unwrap());
    }
    assert_eq!(results.iter().filter(|(_, created)| *created).count(), 1);
    let first = results[0].0.id;
    assert!(results.iter().all(|(job, _)| job.id == first));

    // A forced scan is allowed alongside the active one.
    let forced = db
        .jobs
        .queue(NewExtractionJob {
            project_id: Some(project),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_ne!(forced.id, first);
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_pg_interpretation_refused_after_decision() {
    let db = setup_db().await;
    let review = db
        .reviews
        .create(review_for("Austin-Van", unique_project()))
        .await
        .unwrap();
    db.reviews.reject(review.id, Some(2), "duplicate").await.unwrap();

    let answer = InterpretationResult {
        recommendation: Recommendation::Approve,
        corrected_dimensions: None,
        improved_confidence: Some(99.0),
        warnings: vec![],
        reasoning: None,
        source: Default::default(),
    };
    let err = db
        .reviews
        .record_interpretation(review.id, &answer, &LevelThresholds::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AlreadyProcessed(_)));

    let stored = db.reviews.get(review.id).await.unwrap().unwrap();
    assert!(stored.ai_interpretation.is_none());
    assert_eq!(stored.confidence_score, review.confidence_score);

    let err = db
        .reviews
        .record_interpretation(i64::MAX, &answer, &LevelThresholds::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}
