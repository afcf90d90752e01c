//! Dimension interpretation for ambiguous candidates.
//!
//! The interpreter builds a disambiguation request from a candidate, its
//! score and the shop's construction standards, sends it to a generation
//! backend and parses the answer into an [`InterpretationResult`]. It is
//! advisory: failures are logged and surface as `None`, never as errors that
//! could block a job or a review decision.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, info, instrument, warn};

use millwork_core::{
    Candidate, ConfidenceScore, ConstructionDefaults, DimensionSet, Error, GenerationBackend,
    InterpretationResult, InterpretationSource, Recommendation, Result,
};

use crate::standards::{
    infer_cabinet_type, infer_missing_dimensions, CabinetType, ConstructionStandards,
    StandardSpec,
};

const SYSTEM_PROMPT: &str = "You are an expert cabinet manufacturing technician reviewing \
dimensions extracted from CAD drawings. Answer with a single JSON object and nothing else.";

/// Request payload for one interpretation.
#[derive(Debug, Clone, Serialize)]
pub struct InterpretationContext {
    pub cabinet: Candidate,
    pub confidence_score: ConfidenceScore,
    pub construction_standards: ConstructionStandards,
    pub standard_specs: BTreeMap<&'static str, StandardSpec>,
    pub system: String,
    pub prompt: String,
}

/// Turns candidates into interpretation requests and answers.
pub struct DimensionInterpreter {
    backend: Option<Arc<dyn GenerationBackend>>,
}

impl DimensionInterpreter {
    pub fn new(backend: Arc<dyn GenerationBackend>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    /// Interpreter without a reasoning service; only the rule-based
    /// fallback and context preparation are available.
    pub fn rules_only() -> Self {
        Self { backend: None }
    }

    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    /// Build the request payload. Pure.
    pub fn prepare_context(
        &self,
        candidate: &Candidate,
        score: &ConfidenceScore,
        template: Option<&ConstructionDefaults>,
    ) -> InterpretationContext {
        let construction_standards = ConstructionStandards::from_template(template);
        let standard_specs: BTreeMap<&'static str, StandardSpec> = CabinetType::ALL
            .iter()
            .map(|kind| (kind.as_str(), kind.spec().clone()))
            .collect();

        let prompt = build_prompt(candidate, score, &construction_standards, &standard_specs);

        InterpretationContext {
            cabinet: candidate.clone(),
            confidence_score: score.clone(),
            construction_standards,
            standard_specs,
            system: SYSTEM_PROMPT.to_string(),
            prompt,
        }
    }

    /// Ask the reasoning service. `None` when there is no backend, the call
    /// fails, or the answer cannot be used.
    #[instrument(skip(self, candidate, score, template), fields(subsystem = "inference", component = "interpreter", op = "interpret", group_name = %candidate.name))]
    pub async fn interpret(
        &self,
        candidate: &Candidate,
        score: &ConfidenceScore,
        template: Option<&ConstructionDefaults>,
    ) -> Option<InterpretationResult> {
        let backend = self.backend.as_ref()?;
        let context = self.prepare_context(candidate, score, template);
        let start = Instant::now();

        let answer = match backend
            .generate_with_system(&context.system, &context.prompt)
            .await
        {
            Ok(answer) => answer,
            Err(e) => {
                warn!(error = %e, model = backend.model_name(), "Interpretation request failed");
                return None;
            }
        };

        match parse_model_answer(&answer) {
            Ok(result) => {
                info!(
                    recommendation = result.recommendation.as_str(),
                    improved_confidence = ?result.improved_confidence,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Interpretation complete"
                );
                Some(result)
            }
            Err(e) => {
                warn!(error = %e, response_len = answer.len(), "Unusable interpretation answer");
                None
            }
        }
    }

    /// Rule-based interpretation from cabinet standards. Always succeeds.
    pub fn interpret_with_fallback(
        &self,
        candidate: &Candidate,
        score: &ConfidenceScore,
    ) -> InterpretationResult {
        let kind = infer_cabinet_type(candidate);
        let inferred = infer_missing_dimensions(candidate, kind);

        let mut warnings = Vec::new();
        for (field, value) in [
            ("width", inferred.width),
            ("height", inferred.height),
            ("depth", inferred.depth),
        ] {
            if value.is_some() {
                warnings.push(format!("{field} inferred from {} standards", kind.as_str()));
            }
        }

        let recommendation = if score.total >= millwork_core::defaults::THRESHOLD_HIGH {
            Recommendation::Approve
        } else {
            Recommendation::Review
        };
        debug!(
            cabinet_type = kind.as_str(),
            inferred_fields = warnings.len(),
            "Rule-based interpretation"
        );

        InterpretationResult {
            recommendation,
            corrected_dimensions: (!inferred.is_empty()).then_some(inferred),
            improved_confidence: Some(score.total),
            warnings,
            reasoning: Some(format!(
                "Rule-based interpretation as a {} cabinet",
                kind.as_str()
            )),
            source: InterpretationSource::Rules,
        }
    }

    /// Run [`interpret`](Self::interpret) on a background task. The receiver
    /// yields the result; dropping it discards the answer.
    pub fn spawn_interpretation(
        self: &Arc<Self>,
        candidate: Candidate,
        score: ConfidenceScore,
        template: Option<ConstructionDefaults>,
    ) -> oneshot::Receiver<Option<InterpretationResult>> {
        let (tx, rx) = oneshot::channel();
        let interpreter = Arc::clone(self);
        tokio::spawn(async move {
            let result = interpreter
                .interpret(&candidate, &score, template.as_ref())
                .await;
            if tx.send(result).is_err() {
                debug!(group_name = %candidate.name, "Interpretation receiver dropped");
            }
        });
        rx
    }
}

fn build_prompt(
    candidate: &Candidate,
    score: &ConfidenceScore,
    standards: &ConstructionStandards,
    specs: &BTreeMap<&'static str, StandardSpec>,
) -> String {
    let cabinet = serde_json::to_string_pretty(candidate).unwrap_or_default();
    let score = serde_json::to_string_pretty(score).unwrap_or_default();
    let standards = serde_json::to_string_pretty(standards).unwrap_or_default();
    let specs = serde_json::to_string_pretty(specs).unwrap_or_default();

    format!(
        r#"Interpret the dimensions of this cabinet extracted from a CAD drawing.

## Extracted cabinet
{cabinet}

## Confidence score
{score}

## Shop construction standards (inches)
{standards}

## Standard cabinet sizes by type (inches)
{specs}

Determine the cabinet type, correct or infer missing or implausible
dimensions using the standards above, and count drawers and doors.

Respond with JSON in exactly this shape:
{{
  "interpretation": {{
    "cabinet_type": "base|wall|tall|vanity",
    "corrected_dimensions": {{"width": number, "height": number, "depth": number}},
    "dimension_sources": {{"width": "elevation|plan|bounding_box|standard"}},
    "corrections_applied": ["..."],
    "inferences": ["..."]
  }},
  "component_analysis": {{
    "drawer_count": number,
    "door_count": number,
    "has_false_front": boolean,
    "component_reasoning": "..."
  }},
  "improved_confidence": {{"score": number, "improvement_reason": "..."}},
  "warnings": ["..."],
  "recommendation": "approve|review|reject"
}}"#
    )
}

// =============================================================================
// ANSWER PARSING
// =============================================================================

#[derive(Debug, Default, Deserialize)]
struct ModelAnswer {
    #[serde(default)]
    interpretation: Option<ModelInterpretation>,
    #[serde(default)]
    component_analysis: Option<ComponentAnalysis>,
    #[serde(default)]
    improved_confidence: Option<ImprovedConfidence>,
    #[serde(default)]
    warnings: Vec<String>,
    #[serde(default)]
    recommendation: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ModelInterpretation {
    #[serde(default)]
    corrected_dimensions: Option<BTreeMap<String, Value>>,
}

#[derive(Debug, Default, Deserialize)]
struct ComponentAnalysis {
    #[serde(default)]
    drawer_count: Option<i32>,
    #[serde(default)]
    door_count: Option<i32>,
    #[serde(default)]
    component_reasoning: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ImprovedConfidence {
    #[serde(default)]
    score: Option<f64>,
    #[serde(default)]
    improvement_reason: Option<String>,
}

/// Parse a model answer. Code fences and prose around the JSON object are
/// ignored; a missing recommendation means `review`.
pub fn parse_model_answer(text: &str) -> Result<InterpretationResult> {
    let json = extract_json_object(text)
        .ok_or_else(|| Error::ExternalBoundary("no JSON object in model answer".to_string()))?;
    let answer: ModelAnswer = serde_json::from_str(json)?;

    let recommendation = match answer.recommendation.as_deref().map(str::trim) {
        Some(r) if r.eq_ignore_ascii_case("approve") => Recommendation::Approve,
        Some(r) if r.eq_ignore_ascii_case("reject") => Recommendation::Reject,
        _ => Recommendation::Review,
    };

    let mut dims = DimensionSet::default();
    if let Some(corrected) = answer
        .interpretation
        .as_ref()
        .and_then(|i| i.corrected_dimensions.as_ref())
    {
        for field in millwork_core::LENGTH_FIELDS {
            dims.set_length(field, corrected.get(field).and_then(number));
        }
    }
    let components = answer.component_analysis.unwrap_or_default();
    dims.drawer_count = components.drawer_count;
    dims.door_count = components.door_count;

    let improved = answer.improved_confidence.unwrap_or_default();
    let reasoning = improved
        .improvement_reason
        .or(components.component_reasoning)
        .filter(|r| !r.trim().is_empty());

    let result = InterpretationResult {
        recommendation,
        corrected_dimensions: (!dims.is_empty()).then_some(dims),
        improved_confidence: improved.score,
        warnings: answer.warnings,
        reasoning,
        source: InterpretationSource::Model,
    };
    result.validate()?;
    Ok(result)
}

/// Numbers may come back as JSON numbers or as dimension strings like `34 1/2`.
fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => millwork_core::parse_dimension_text(s),
        _ => None,
    }
}

fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}
