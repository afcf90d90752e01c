//! Mock generation backend for deterministic testing.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use millwork_inference::mock::MockGenerationBackend;
//!
//! let backend = MockGenerationBackend::new()
//!     .with_response(r#"{"recommendation": "approve"}"#);
//! ```

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use millwork_core::{Error, GenerationBackend, Result};

#[derive(Debug, Clone)]
struct MockConfig {
    response: String,
    fail: bool,
    latency_ms: u64,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            response: "{}".to_string(),
            fail: false,
            latency_ms: 0,
        }
    }
}

/// Mock generation backend for testing.
#[derive(Clone, Default)]
pub struct MockGenerationBackend {
    config: Arc<MockConfig>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl MockGenerationBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every request with `response`.
    pub fn with_response(mut self, response: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config).response = response.into();
        self
    }

    /// Fail every request with an external boundary error.
    pub fn with_failure(mut self) -> Self {
        Arc::make_mut(&mut self.config).fail = true;
        self
    }

    /// Simulated latency for every request.
    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        Arc::make_mut(&mut self.config).latency_ms = latency_ms;
        self
    }

    /// Prompts received, in order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl GenerationBackend for MockGenerationBackend {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.generate_with_system("", prompt).await
    }

    async fn generate_with_system(&self, _system: &str, prompt: &str) -> Result<String> {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(prompt.to_string());

        if self.config.latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.latency_ms)).await;
        }
        if self.config.fail {
            return Err(Error::ExternalBoundary(
                "mock backend unavailable".to_string(),
            ));
        }
        Ok(self.config.response.clone())
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}
