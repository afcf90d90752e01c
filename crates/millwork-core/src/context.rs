//! Explicit request context.

use serde::{Deserialize, Serialize};

/// Who is acting, and for which company. Absent values stay `None`; nothing
/// downstream substitutes a default user or company.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub actor_id: Option<i64>,
    pub company_id: Option<i64>,
}

impl RequestContext {
    pub fn new(actor_id: Option<i64>, company_id: Option<i64>) -> Self {
        Self {
            actor_id,
            company_id,
        }
    }

    /// Context for work not initiated by a person (reaper, auto-apply).
    pub fn system() -> Self {
        Self::default()
    }
}
