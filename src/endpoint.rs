use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::{GenerationError, GenerationRequest, GenerationResult};
use crate::validation::validate;

#[derive(Debug, Clone, PartialEq)]
pub enum AttemptFailure {
    Error(GenerationError),
    Cancelled,
}

/// One remote generation call. Implementations must check `cancel` after
/// every suspension point.
#[async_trait]
pub trait GenerationEndpoint: Send + Sync {
    async fn generate(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<GenerationResult, AttemptFailure>;
}

const OVERLOAD_MESSAGES: &[&str] = &[
    "Model is currently overloaded. Please try again.",
    "High demand right now, the model could not take this request.",
    "Generation service is temporarily busy.",
];

const IMAGE_POOL: &[&str] = &[
    "https://picsum.photos/seed/studio-editorial/768/1024",
    "https://picsum.photos/seed/studio-runway/768/1024",
    "https://picsum.photos/seed/studio-atelier/768/1024",
    "https://picsum.photos/seed/studio-lookbook/768/1024",
    "https://picsum.photos/seed/studio-street/768/1024",
];

#[derive(Debug, Clone, PartialEq)]
pub struct MockConfig {
    pub error_rate: f64,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            error_rate: 0.20,
            min_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(2000),
        }
    }
}

impl MockConfig {
    fn delay_bounds_ms(&self) -> (u64, u64) {
        let a = self.min_delay.as_millis() as u64;
        let b = self.max_delay.as_millis() as u64;
        if a <= b { (a, b) } else { (b, a) }
    }
}

pub struct MockEndpoint {
    config: MockConfig,
    rng: Mutex<StdRng>,
}

impl MockEndpoint {
    pub fn new(config: MockConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    pub fn with_rng(config: MockConfig, rng: StdRng) -> Self {
        Self { config, rng: Mutex::new(rng) }
    }

    pub fn config(&self) -> &MockConfig { &self.config }

    fn processing_delay(&self) -> Duration {
        let (min, max) = self.config.delay_bounds_ms();
        Duration::from_millis(self.rng.lock().gen_range(min..=max))
    }

    fn roll_overload(&self) -> Option<GenerationError> {
        let mut rng = self.rng.lock();
        if rng.gen::<f64>() < self.config.error_rate {
            let message = OVERLOAD_MESSAGES.choose(&mut *rng).copied().unwrap_or(OVERLOAD_MESSAGES[0]);
            Some(GenerationError::overloaded(message))
        } else {
            None
        }
    }

    fn pick_image(&self) -> String {
        let mut rng = self.rng.lock();
        IMAGE_POOL.choose(&mut *rng).copied().unwrap_or(IMAGE_POOL[0]).to_string()
    }
}

#[async_trait]
impl GenerationEndpoint for MockEndpoint {
    async fn generate(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<GenerationResult, AttemptFailure> {
        let report = validate(request);
        if !report.is_valid {
            warn!(request_id = %request.request_id, "Rejected invalid request at endpoint");
            return Err(AttemptFailure::Error(report.to_error()));
        }

        let delay = self.processing_delay();
        debug!(request_id = %request.request_id, delay_ms = delay.as_millis() as u64, "⏳ Simulating processing");

        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(delay) => {}
        }
        if cancel.is_cancelled() {
            debug!(request_id = %request.request_id, "Endpoint call abandoned");
            return Err(AttemptFailure::Cancelled);
        }

        if let Some(err) = self.roll_overload() {
            warn!(request_id = %request.request_id, "⚠️ Simulated overload: {}", err.message);
            return Err(AttemptFailure::Error(err));
        }

        let result = GenerationResult {
            id: Uuid::new_v4().to_string(),
            image_url: self.pick_image(),
            prompt: request.prompt.clone(),
            style: request.style,
            created_at: Utc::now(),
            processing_time: delay,
        };
        info!(request_id = %request.request_id, result_id = %result.id, "🖼️ Generated image in {}ms", delay.as_millis());
        Ok(result)
    }
}
