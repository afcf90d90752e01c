//! Review queue service.
//!
//! Every decision goes through the repository's compare-and-set on `status`,
//! so concurrent approvals, rejections and auto-applies cannot both succeed.
//! Materialization is part of the same atomic unit as the status flip.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use millwork_core::{
    authorize, defaults, AccessPolicy, AllowAll, Approval, ApprovalEffect, Capability,
    ConfidenceScore, ConfidenceScorer, ConstructionDefaults, DimensionSet, Error, ExtractionReview, InterpretationResult, InterpretationSource, Mapper, MappingContext,
    Recommendation, RequestContext, ResourceKind, Result, ReviewFilter, ReviewPage,
    ReviewRepository, ReviewType, SyncBaseline, SyncDirection,
};
use millwork_db::Stores;
use millwork_inference::{DimensionInterpreter, InterpretationContext};

use crate::config::ReviewConfig;

/// Approve payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ApproveRequest {
    /// Reviewer fixes merged over the extracted values.
    pub corrections: Option<DimensionSet>,
    pub notes: Option<String>,
    /// Create the cabinet as part of the approval.
    pub materialize: bool,
}

impl Default for ApproveRequest {
    fn default() -> Self {
        Self {
            corrections: None,
            notes: None,
            materialize: true,
        }
    }
}

impl ApproveRequest {
    pub fn with_corrections(corrections: DimensionSet) -> Self {
        Self {
            corrections: Some(corrections),
            ..Default::default()
        }
    }
}

/// Result of merging an interpretation into a review.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedInterpretation {
    pub review: ExtractionReview,
    pub auto_applied: bool,
}

/// Human-in-the-loop decisions over extraction candidates.
pub struct ReviewQueue {
    reviews: Arc<dyn ReviewRepository>,
    interpreter: Arc<DimensionInterpreter>,
    policy: Arc<dyn AccessPolicy>,
    scorer: ConfidenceScorer,
    mapper: Mapper,
    mapping: MappingContext,
    config: ReviewConfig,
}

impl ReviewQueue {
    pub fn new(stores: &Stores, interpreter: Arc<DimensionInterpreter>) -> Self {
        Self {
            reviews: stores.reviews.clone(),
            interpreter,
            policy: Arc::new(AllowAll),
            scorer: ConfidenceScorer::default(),
            mapper: Mapper::new(),
            mapping: MappingContext::default(),
            config: ReviewConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ReviewConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_policy(mut self, policy: Arc<dyn AccessPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Scorer used when a stored review has no score breakdown.
    pub fn with_scorer(mut self, scorer: ConfidenceScorer) -> Self {
        self.scorer = scorer;
        self
    }

    /// Codes and template applied to cabinets created on approval. The
    /// project always comes from the review.
    pub fn with_mapping_defaults(mut self, mapping: MappingContext) -> Self {
        self.mapping = mapping;
        self
    }

    pub fn config(&self) -> &ReviewConfig {
        &self.config
    }

    pub fn interpreter(&self) -> &Arc<DimensionInterpreter> {
        &self.interpreter
    }

    // =========================================================================
    // READS
    // =========================================================================

    pub async fn get(&self, ctx: &RequestContext, id: i64) -> Result<ExtractionReview> {
        authorize(self.policy.as_ref(), ctx, ResourceKind::Review, Capability::View).await?;
        self.load(id).await
    }

    /// Paged listing. Limit is clamped to `[1, PAGE_LIMIT_MAX]`.
    pub async fn list(&self, ctx: &RequestContext, filter: ReviewFilter) -> Result<ReviewPage> {
        authorize(self.policy.as_ref(), ctx, ResourceKind::Review, Capability::View).await?;
        let filter = normalize_filter(filter)?;
        self.reviews.list(&filter).await
    }

    /// Prepared payload for an external reasoning actor.
    pub async fn interpretation_context(
        &self,
        ctx: &RequestContext,
        id: i64,
    ) -> Result<InterpretationContext> {
        authorize(self.policy.as_ref(), ctx, ResourceKind::Review, Capability::View).await?;
        let review = self.load(id).await?;
        let candidate = review.effective_candidate();
        let score = self.score_for(&review);
        Ok(self
            .interpreter
            .prepare_context(&candidate, &score, self.template()))
    }

    // =========================================================================
    // DECISIONS
    // =========================================================================

    /// Approve a pending review. Normal reviews materialize a cabinet from
    /// the corrected candidate unless `materialize` is off; if that write
    /// fails the review stays pending.
    #[instrument(skip(self, ctx, request), fields(subsystem = "review", component = "queue", op = "approve", review_id = id))]
    pub async fn approve(
        &self,
        ctx: &RequestContext,
        id: i64,
        request: ApproveRequest,
    ) -> Result<ExtractionReview> {
        authorize(self.policy.as_ref(), ctx, ResourceKind::Review, Capability::Decide).await?;
        validate_notes(request.notes.as_deref(), "notes")?;
        if let Some(corrections) = &request.corrections {
            corrections.validate()?;
        }

        let review = self.load(id).await?;
        if !review.is_pending() {
            return Err(already_processed(&review));
        }
        if review.review_type == ReviewType::SyncConflict {
            return Err(Error::Validation(
                "sync conflicts are resolved with a forced sync and an explicit direction"
                    .to_string(),
            ));
        }

        let effect = if request.materialize {
            let extracted = &review.extraction_data;
            let mut candidate = extracted.clone();
            if let Some(corrections) = &request.corrections {
                corrections.apply_to(&mut candidate);
            }
            let ctx = MappingContext {
                project_id: review.project_id,
                ..self.mapping.clone()
            };
            let draft = self.mapper.map_to_entity(&candidate, &ctx);
            let baseline = SyncBaseline::new(draft.dimensions(), SyncDirection::Cad)
                .with_cad_geometry(DimensionSet::group_geometry(extracted));
            ApprovalEffect::CreateCabinet {
                draft: Box::new(draft),
                baseline: Some(baseline),
            }
        } else {
            ApprovalEffect::None
        };

        let approved = self
            .reviews
            .approve(
                id,
                Approval {
                    reviewer_id: ctx.actor_id,
                    corrections: request.corrections,
                    notes: request.notes,
                    resolution: None,
                },
                effect,
            )
            .await?;

        info!(
            review_id = id,
            cabinet_id = ?approved.cabinet_id,
            reviewer_id = ?ctx.actor_id,
            "Review approved"
        );
        Ok(approved)
    }

    /// Reject a pending review. Never materializes anything.
    #[instrument(skip(self, ctx, reason), fields(subsystem = "review", component = "queue", op = "reject", review_id = id))]
    pub async fn reject(
        &self,
        ctx: &RequestContext,
        id: i64,
        reason: &str,
    ) -> Result<ExtractionReview> {
        authorize(self.policy.as_ref(), ctx, ResourceKind::Review, Capability::Decide).await?;
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(Error::Validation("reason is required".to_string()));
        }
        validate_notes(Some(reason), "reason")?;

        let rejected = self.reviews.reject(id, ctx.actor_id, reason).await?;
        info!(review_id = id, reviewer_id = ?ctx.actor_id, "Review rejected");
        Ok(rejected)
    }

    // =========================================================================
    // INTERPRETATION
    // =========================================================================

    /// Merge an interpretation into a review. The stored score never goes
    /// down. With `auto_apply`, an `approve` recommendation at or above the
    /// configured confidence approves the review using the corrected
    /// dimensions; if someone else decided it first this is a no-op.
    #[instrument(skip(self, ctx, interpretation), fields(subsystem = "review", component = "queue", op = "save_interpretation", review_id = id))]
    pub async fn save_interpretation(
        &self,
        ctx: &RequestContext,
        id: i64,
        interpretation: InterpretationResult,
        auto_apply: bool,
    ) -> Result<SavedInterpretation> {
        authorize(self.policy.as_ref(), ctx, ResourceKind::Review, Capability::Decide).await?;
        interpretation.validate()?;

        let review = match self
            .reviews
            .record_interpretation(id, &interpretation, &self.config.thresholds)
            .await
        {
            Ok(review) => review,
            Err(Error::AlreadyProcessed(_)) => {
                info!(review_id = id, "Review already decided, interpretation not stored");
                return Ok(SavedInterpretation {
                    review: self.load(id).await?,
                    auto_applied: false,
                });
            }
            Err(e) => return Err(e),
        };
        debug!(
            review_id = id,
            confidence_score = review.confidence_score,
            level = %review.confidence_level,
            "Interpretation recorded"
        );

        let eligible = auto_apply
            && interpretation.recommendation == Recommendation::Approve
            && review.is_pending()
            && review.review_type != ReviewType::SyncConflict
            && review.confidence_score >= self.config.auto_apply_min_confidence;
        if !eligible {
            return Ok(SavedInterpretation {
                review,
                auto_applied: false,
            });
        }

        let request = ApproveRequest {
            corrections: interpretation.corrected_dimensions,
            notes: Some(format!(
                "Auto-applied {} interpretation",
                source_label(&interpretation)
            )),
            materialize: true,
        };
        match self.approve(ctx, id, request).await {
            Ok(review) => Ok(SavedInterpretation {
                review,
                auto_applied: true,
            }),
            Err(Error::AlreadyProcessed(_)) => {
                info!(review_id = id, "Review decided concurrently, auto-apply skipped");
                Ok(SavedInterpretation {
                    review: self.load(id).await?,
                    auto_applied: false,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Interpret a review on a background task and save the result. Falls
    /// back to the rule-based interpretation when the reasoning service has
    /// nothing usable. Returns once the task is spawned.
    pub async fn request_interpretation(
        self: &Arc<Self>,
        ctx: &RequestContext,
        id: i64,
        auto_apply: bool,
    ) -> Result<JoinHandle<()>> {
        authorize(self.policy.as_ref(), ctx, ResourceKind::Review, Capability::Decide).await?;
        let review = self.load(id).await?;
        let candidate = review.effective_candidate();
        let score = self.score_for(&review);
        let template = self.template().copied();

        let receiver = self
            .interpreter
            .spawn_interpretation(candidate.clone(), score.clone(), template);
        let queue = Arc::clone(self);
        let ctx = *ctx;

        Ok(tokio::spawn(async move {
            let result = match receiver.await {
                Ok(Some(result)) => result,
                Ok(None) | Err(_) => queue.interpreter.interpret_with_fallback(&candidate, &score),
            };
            match queue.save_interpretation(&ctx, id, result, auto_apply).await {
                Ok(saved) => info!(
                    review_id = id,
                    auto_applied = saved.auto_applied,
                    confidence_score = saved.review.confidence_score,
                    "Background interpretation saved"
                ),
                Err(e) => warn!(review_id = id, error = %e, "Background interpretation not saved"),
            }
        }))
    }

    async fn load(&self, id: i64) -> Result<ExtractionReview> {
        self.reviews
            .get(id)
            .await?
            .ok_or_else(|| ResourceKind::Review.not_found(id))
    }

    fn score_for(&self, review: &ExtractionReview) -> ConfidenceScore {
        review
            .score_details
            .clone()
            .unwrap_or_else(|| self.scorer.score(&review.effective_candidate()))
    }

    fn template(&self) -> Option<&ConstructionDefaults> {
        self.mapping.template.as_ref()
    }
}

fn normalize_filter(mut filter: ReviewFilter) -> Result<ReviewFilter> {
    for bound in [filter.min_confidence, filter.max_confidence].into_iter().flatten() {
        if !(0.0..=100.0).contains(&bound) {
            return Err(Error::Validation(format!(
                "confidence bounds must be between 0 and 100, got {bound}"
            )));
        }
    }
    if let (Some(min), Some(max)) = (filter.min_confidence, filter.max_confidence) {
        if min > max {
            return Err(Error::Validation(format!(
                "minConfidence {min} is greater than maxConfidence {max}"
            )));
        }
    }
    filter.limit = filter.limit.clamp(1, defaults::PAGE_LIMIT_MAX);
    filter.offset = filter.offset.max(0);
    Ok(filter)
}

fn validate_notes(text: Option<&str>, field: &str) -> Result<()> {
    match text {
        Some(t) if t.chars().count() > defaults::NOTES_MAX_LEN => Err(Error::Validation(format!(
            "{field} must be at most {} characters",
            defaults::NOTES_MAX_LEN
        ))),
        _ => Ok(()),
    }
}

fn already_processed(review: &ExtractionReview) -> Error {
    Error::AlreadyProcessed(format!("review {} is already {}", review.id, review.status))
}

fn source_label(interpretation: &InterpretationResult) -> &'static str {
    match interpretation.source {
        InterpretationSource::Model => "model",
        InterpretationSource::Rules => "rule-based",
        InterpretationSource::External => "external",
    }
}
