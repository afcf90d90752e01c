//! Capability checks.
//!
//! Resource kinds are a closed enum resolved from short names through a static
//! table. Policies return `Result<Decision>`; a failed check resolves to
//! [`Decision::on_error`] rather than being caught and ignored.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::context::RequestContext;
use crate::error::{Error, Result};

/// Resource kinds the service exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    ExtractionJob,
    Review,
    Cabinet,
    Project,
}

/// Short name → kind.
static RESOURCE_NAMES: &[(&str, ResourceKind)] = &[
    ("job", ResourceKind::ExtractionJob),
    ("extraction_job", ResourceKind::ExtractionJob),
    ("review", ResourceKind::Review),
    ("extraction_review", ResourceKind::Review),
    ("cabinet", ResourceKind::Cabinet),
    ("project", ResourceKind::Project),
];

impl ResourceKind {
    pub fn from_short_name(name: &str) -> Option<Self> {
        RESOURCE_NAMES
            .iter()
            .find(|(short, _)| short.eq_ignore_ascii_case(name))
            .map(|(_, kind)| *kind)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::ExtractionJob => "extraction_job",
            ResourceKind::Review => "review",
            ResourceKind::Cabinet => "cabinet",
            ResourceKind::Project => "project",
        }
    }

    /// `NotFound` error naming this kind.
    pub fn not_found(&self, id: impl std::fmt::Display) -> Error {
        Error::NotFound(format!("{} {} not found", self.as_str(), id))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    View,
    Scan,
    Decide,
    Sync,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    /// Decision used when a policy check itself fails.
    pub fn on_error() -> Self {
        Decision::Deny
    }
}

#[async_trait]
pub trait AccessPolicy: Send + Sync {
    async fn check(
        &self,
        ctx: &RequestContext,
        kind: ResourceKind,
        capability: Capability,
    ) -> Result<Decision>;
}

/// Policy that allows everything. Authentication is handled upstream.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl AccessPolicy for AllowAll {
    async fn check(&self, _: &RequestContext, _: ResourceKind, _: Capability) -> Result<Decision> {
        Ok(Decision::Allow)
    }
}

/// Run a policy check and turn a denial into `Error::Forbidden`.
pub async fn authorize(
    policy: &dyn AccessPolicy,
    ctx: &RequestContext,
    kind: ResourceKind,
    capability: Capability,
) -> Result<()> {
    let decision = match policy.check(ctx, kind, capability).await {
        Ok(decision) => decision,
        Err(e) => {
            warn!(error = %e, resource = kind.as_str(), "Access check failed, denying");
            Decision::on_error()
        }
    };
    match decision {
        Decision::Allow => Ok(()),
        Decision::Deny => Err(Error::Forbidden(format!(
            "{capability:?} on {} not permitted",
            kind.as_str()
        ))),
    }
}
