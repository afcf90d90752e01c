//! Push, pull and forced resolution against a mock CAD document.

use std::sync::Arc;

use millwork_cad::{DataExtractor, MockCadConnector};
use millwork_core::{
    BoundingBox, Candidate, DimensionSet, Error, Mapper, MappingContext, PullOptions,
    RequestContext, ReviewFilter, ReviewStatus, ReviewType, SyncBaseline, SyncDirection,
    SyncEventKind,
};
use millwork_db::{MemoryStore, Stores};
use millwork_sync::SyncService;

const PROJECT: Option<i64> = Some(3);
const GROUP: &str = "Austin-Base";

struct Harness {
    stores: Stores,
    cad: Arc<MockCadConnector>,
    sync: SyncService,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let stores = Stores::memory(store);
    let cad = Arc::new(
        MockCadConnector::new()
            .with_group(GROUP, BoundingBox::new([0.0; 3], [36.0, 24.0, 34.5])),
    );
    let sync = SyncService::new(&stores, Arc::new(DataExtractor::new(cad.clone())));
    Harness { stores, cad, sync }
}

fn actor() -> RequestContext {
    RequestContext::new(Some(9), Some(1))
}

/// Cabinet for the mock group, agreed with CAD at 36 x 34.5 x 24.
async fn seed_cabinet(h: &Harness, width: f64) -> i64 {
    let candidate = Candidate::named(GROUP).with_dimensions(width, 34.5, 24.0);
    let ctx = MappingContext {
        project_id: PROJECT,
        ..Default::default()
    };
    let draft = Mapper::new().map_to_entity(&candidate, &ctx);
    let cabinet = h.stores.cabinets.create(&draft, None).await.unwrap();
    let agreed = DimensionSet {
        width: Some(36.0),
        height: Some(34.5),
        depth: Some(24.0),
        ..Default::default()
    };
    h.stores
        .cabinets
        .set_baseline(cabinet.id, &SyncBaseline::new(agreed, SyncDirection::Cad))
        .await
        .unwrap();
    cabinet.id
}

fn cad_width(h: &Harness, width: f64) {
    h.cad
        .set_group_bbox(GROUP, BoundingBox::new([0.0; 3], [width, 24.0, 34.5]));
}

async fn erp_width(h: &Harness, id: i64, width: f64) {
    let edit = DimensionSet {
        width: Some(width),
        ..Default::default()
    };
    h.stores
        .cabinets
        .update_dimensions(id, &edit, None)
        .await
        .unwrap();
}

async fn conflict_reviews(h: &Harness) -> Vec<millwork_core::ExtractionReview> {
    h.stores
        .reviews
        .list(&ReviewFilter {
            project_id: PROJECT,
            review_type: Some(ReviewType::SyncConflict),
            ..Default::default()
        })
        .await
        .unwrap()
        .items
}

#[tokio::test]
async fn test_push_then_pull_has_no_conflict() {
    let h = harness();
    let id = seed_cabinet(&h, 30.0).await;

    let pushed = h.sync.push(&actor(), id).await.unwrap();
    assert!(pushed.success);
    assert_eq!(h.cad.group_bbox(GROUP).unwrap().width(), 30.0);

    let pulled = h
        .sync
        .pull(&actor(), PROJECT, PullOptions::default())
        .await
        .unwrap();
    assert!(pulled.success);
    let details = pulled.details.unwrap();
    assert_eq!(details["unchanged"], 1);
    assert!(details["conflicts"].as_array().unwrap().is_empty());
    assert_eq!(
        h.stores.reviews.count_pending(PROJECT, None).await.unwrap(),
        0
    );

    let cabinet = h.stores.cabinets.get(id).await.unwrap().unwrap();
    assert_eq!(cabinet.length_inches, Some(30.0));
}

/// The mock group drawn 30" wide with a width annotation in its elevation.
fn annotated_harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let stores = Stores::memory(store);
    let cad = Arc::new(
        MockCadConnector::new()
            .with_group(GROUP, BoundingBox::new([0.0; 3], [30.0, 24.0, 34.5]))
            .with_text("Elevation", 0.0, 500.0)
            .with_text(GROUP, 20.0, 550.0)
            .with_text("Door", 10.0, 10.0)
            .with_dimension("30", Some(30.0), Some("DIM-Width"), 10.0, 650.0)
            .with_dimension("34-1/2\"", None, Some("DIM-Height"), 30.0, 600.0),
    );
    let sync = SyncService::new(&stores, Arc::new(DataExtractor::new(cad.clone())));
    Harness { stores, cad, sync }
}

/// Cabinet agreed with the annotated drawing at 30 x 34.5 x 24.
async fn seed_annotated_cabinet(h: &Harness) -> i64 {
    let id = seed_cabinet(h, 30.0).await;
    let agreed = DimensionSet {
        width: Some(30.0),
        height: Some(34.5),
        depth: Some(24.0),
        ..Default::default()
    };
    h.stores
        .cabinets
        .set_baseline(
            id,
            &SyncBaseline::new(agreed, SyncDirection::Cad).with_cad_geometry(agreed),
        )
        .await
        .unwrap();
    id
}

#[tokio::test]
async fn test_push_then_pull_annotated_group_keeps_erp_value() {
    let h = annotated_harness();
    let id = seed_annotated_cabinet(&h).await;
    erp_width(&h, id, 33.0).await;

    assert!(h.sync.push(&actor(), id).await.unwrap().success);
    assert_eq!(h.cad.group_bbox(GROUP).unwrap().width(), 33.0);

    // Push rescales geometry only; the drawn annotation still reads 30.
    let extracted = DataExtractor::new(h.cad.clone()).extract(false).await.unwrap();
    assert_eq!(extracted.candidates[0].width, Some(30.0));

    let pulled = h
        .sync
        .pull(&actor(), PROJECT, PullOptions::default())
        .await
        .unwrap();
    let details = pulled.details.unwrap();
    assert_eq!(details["unchanged"], 1);
    assert!(details["merged"].as_array().unwrap().is_empty());
    assert!(details["conflicts"].as_array().unwrap().is_empty());

    let cabinet = h.stores.cabinets.get(id).await.unwrap().unwrap();
    assert_eq!(cabinet.length_inches, Some(33.0));
    assert_eq!(cabinet.height_inches, Some(34.5));
    assert_eq!(cabinet.depth_inches, Some(24.0));
}

#[tokio::test]
async fn test_annotated_group_resized_in_cad_merges_geometry() {
    let h = annotated_harness();
    let id = seed_annotated_cabinet(&h).await;
    cad_width(&h, 36.0);

    let pulled = h
        .sync
        .pull(&actor(), PROJECT, PullOptions::default())
        .await
        .unwrap();
    let details = pulled.details.unwrap();
    assert_eq!(details["merged"].as_array().unwrap().len(), 1);

    let cabinet = h.stores.cabinets.get(id).await.unwrap().unwrap();
    assert_eq!(cabinet.length_inches, Some(36.0));
    let baseline = cabinet.sync_baseline.unwrap();
    assert_eq!(baseline.dimensions.width, Some(36.0));
    assert_eq!(baseline.cad_reference().width, Some(36.0));

    // Merged state is stable on the next pull.
    let again = h
        .sync
        .pull(&actor(), PROJECT, PullOptions::default())
        .await
        .unwrap();
    assert_eq!(again.details.unwrap()["unchanged"], 1);
}

#[tokio::test]
async fn test_push_is_idempotent() {
    let h = harness();
    let id = seed_cabinet(&h, 30.0).await;

    h.sync.push(&actor(), id).await.unwrap();
    let first = h.cad.group_bbox(GROUP);
    h.sync.push(&actor(), id).await.unwrap();

    assert_eq!(h.cad.group_bbox(GROUP), first);
    assert_eq!(h.cad.group_count(), 1);
}

#[tokio::test]
async fn test_cad_only_change_is_auto_merged() {
    let h = harness();
    let id = seed_cabinet(&h, 36.0).await;
    cad_width(&h, 40.0);

    let pulled = h
        .sync
        .pull(&actor(), PROJECT, PullOptions::default())
        .await
        .unwrap();
    assert_eq!(pulled.details.unwrap()["merged"][0], id);

    let cabinet = h.stores.cabinets.get(id).await.unwrap().unwrap();
    assert_eq!(cabinet.length_inches, Some(40.0));
    let baseline = cabinet.sync_baseline.unwrap();
    assert_eq!(baseline.dimensions.width, Some(40.0));
    assert_eq!(baseline.direction, SyncDirection::Cad);
    assert!(conflict_reviews(&h).await.is_empty());
}

#[tokio::test]
async fn test_cad_change_without_auto_merge_raises_review() {
    let h = harness();
    let id = seed_cabinet(&h, 36.0).await;
    cad_width(&h, 40.0);

    h.sync
        .pull(
            &actor(),
            PROJECT,
            PullOptions {
                auto_merge: false,
                create_new: false,
            },
        )
        .await
        .unwrap();

    let reviews = conflict_reviews(&h).await;
    assert_eq!(reviews.len(), 1);
    assert_eq!(reviews[0].cabinet_id, Some(id));
    let conflict = reviews[0].sync_conflict.as_ref().unwrap();
    assert_eq!(conflict.fields[0].field, "width");
    assert_eq!(conflict.fields[0].cad, Some(40.0));

    let cabinet = h.stores.cabinets.get(id).await.unwrap().unwrap();
    assert_eq!(cabinet.length_inches, Some(36.0));
}

#[tokio::test]
async fn test_both_sides_changed_raises_one_conflict() {
    let h = harness();
    let id = seed_cabinet(&h, 36.0).await;
    erp_width(&h, id, 33.0).await;
    cad_width(&h, 40.0);

    h.sync
        .pull(&actor(), PROJECT, PullOptions::default())
        .await
        .unwrap();
    let second = h
        .sync
        .pull(&actor(), PROJECT, PullOptions::default())
        .await
        .unwrap();
    assert_eq!(second.details.unwrap()["skipped"][0], id);

    let reviews = conflict_reviews(&h).await;
    assert_eq!(reviews.len(), 1);
    let conflict = reviews[0].sync_conflict.as_ref().unwrap();
    assert_eq!(conflict.fields[0].baseline, Some(36.0));
    assert_eq!(conflict.fields[0].erp, Some(33.0));
    assert_eq!(conflict.fields[0].cad, Some(40.0));

    let err = h.sync.push(&actor(), id).await.unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));
}

#[tokio::test]
async fn test_force_erp_resolves_conflict() {
    let h = harness();
    let id = seed_cabinet(&h, 36.0).await;
    erp_width(&h, id, 33.0).await;
    cad_width(&h, 40.0);
    h.sync
        .pull(&actor(), PROJECT, PullOptions::default())
        .await
        .unwrap();

    let before = h.sync.status(&actor(), PROJECT).await.unwrap();
    assert_eq!(before.conflict_count, 1);
    assert_eq!(before.last_direction, Some(SyncDirection::Cad));
    assert!(!before.in_agreement);

    let review_id = conflict_reviews(&h).await[0].id;
    let outcome = h
        .sync
        .force(&actor(), review_id, SyncDirection::Erp)
        .await
        .unwrap();
    assert!(outcome.success);

    let after = h.sync.status(&actor(), PROJECT).await.unwrap();
    assert_eq!(after.conflict_count, 0);
    assert_eq!(after.last_direction, Some(SyncDirection::Erp));
    assert!(after.in_agreement);

    assert_eq!(h.cad.group_bbox(GROUP).unwrap().width(), 33.0);
    let review = h.stores.reviews.get(review_id).await.unwrap().unwrap();
    assert_eq!(review.status, ReviewStatus::Approved);
    let resolution = review.resolution.unwrap();
    assert_eq!(resolution.direction, SyncDirection::Erp);
    assert_eq!(resolution.actor_id, Some(9));

    let cabinet = h.stores.cabinets.get(id).await.unwrap().unwrap();
    assert_eq!(cabinet.length_inches, Some(33.0));
    assert_eq!(
        cabinet.sync_baseline.unwrap().direction,
        SyncDirection::Erp
    );
}

#[tokio::test]
async fn test_force_cad_overwrites_cabinet() {
    let h = harness();
    let id = seed_cabinet(&h, 36.0).await;
    erp_width(&h, id, 33.0).await;
    cad_width(&h, 40.0);
    h.sync
        .pull(&actor(), PROJECT, PullOptions::default())
        .await
        .unwrap();
    let review_id = conflict_reviews(&h).await[0].id;

    h.sync
        .force(&actor(), review_id, SyncDirection::Cad)
        .await
        .unwrap();

    let cabinet = h.stores.cabinets.get(id).await.unwrap().unwrap();
    assert_eq!(cabinet.length_inches, Some(40.0));
    assert_eq!(
        cabinet.sync_baseline.unwrap().dimensions.width,
        Some(40.0)
    );

    let again = h
        .sync
        .force(&actor(), review_id, SyncDirection::Erp)
        .await
        .unwrap_err();
    assert!(matches!(again, Error::AlreadyProcessed(_)));

    // Both sides agree again, so the next pull is quiet.
    let pulled = h
        .sync
        .pull(&actor(), PROJECT, PullOptions::default())
        .await
        .unwrap();
    assert_eq!(pulled.details.unwrap()["unchanged"], 1);
}

#[tokio::test]
async fn test_force_requires_sync_conflict_review() {
    let h = harness();
    let err = h
        .sync
        .force(&actor(), 404, SyncDirection::Erp)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    h.sync
        .pull(
            &actor(),
            PROJECT,
            PullOptions {
                auto_merge: true,
                create_new: true,
            },
        )
        .await
        .unwrap();
    let review = h
        .stores
        .reviews
        .list(&ReviewFilter {
            project_id: PROJECT,
            ..Default::default()
        })
        .await
        .unwrap()
        .items
        .remove(0);
    assert_eq!(review.review_type, ReviewType::NewFromCad);

    let err = h
        .sync
        .force(&actor(), review.id, SyncDirection::Cad)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[tokio::test]
async fn test_create_new_proposes_each_group_once() {
    let h = harness();
    let options = PullOptions {
        auto_merge: true,
        create_new: true,
    };

    let first = h.sync.pull(&actor(), PROJECT, options).await.unwrap();
    assert_eq!(first.details.unwrap()["new_reviews"].as_array().unwrap().len(), 1);
    let second = h.sync.pull(&actor(), PROJECT, options).await.unwrap();
    assert!(second.details.unwrap()["new_reviews"]
        .as_array()
        .unwrap()
        .is_empty());

    assert_eq!(
        h.stores
            .reviews
            .count_pending(PROJECT, Some(ReviewType::NewFromCad))
            .await
            .unwrap(),
        1
    );

    let ignored = h
        .sync
        .pull(&actor(), PROJECT, PullOptions::default())
        .await
        .unwrap();
    assert_eq!(ignored.details.unwrap()["unmatched"][0], GROUP);
}

#[tokio::test]
async fn test_offline_cad_reports_failure_and_logs_event() {
    let h = harness();
    let id = seed_cabinet(&h, 30.0).await;
    h.cad.set_offline(true);

    let pushed = h.sync.push(&actor(), id).await.unwrap();
    assert!(!pushed.success);
    assert!(pushed.error.is_some());

    let pulled = h
        .sync
        .pull(&actor(), PROJECT, PullOptions::default())
        .await
        .unwrap();
    assert!(!pulled.success);

    let history = h.sync.history(PROJECT, 10).await.unwrap();
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|e| !e.success));
    assert_eq!(history[0].kind, SyncEventKind::Pull);

    let status = h.sync.status(&actor(), PROJECT).await.unwrap();
    assert!(!status.sync_available);
    assert!(status.last_push.is_none());

    // The failed push left the old baseline in place.
    let cabinet = h.stores.cabinets.get(id).await.unwrap().unwrap();
    assert_eq!(cabinet.sync_baseline.unwrap().direction, SyncDirection::Cad);
}

#[tokio::test]
async fn test_push_unknown_cabinet_is_not_found() {
    let h = harness();
    let err = h.sync.push(&actor(), 77).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn test_status_is_read_only() {
    let h = harness();
    let id = seed_cabinet(&h, 36.0).await;
    h.sync.push(&actor(), id).await.unwrap();

    let first = h.sync.status(&actor(), PROJECT).await.unwrap();
    let second = h.sync.status(&actor(), PROJECT).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.cabinet_count, 1);
    assert!(first.last_push.is_some());
    assert!(first.sync_available);
    assert_eq!(h.sync.history(PROJECT, 10).await.unwrap().len(), 1);
}
