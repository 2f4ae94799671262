use parking_lot::Mutex;
use rand::{rngs::StdRng, SeedableRng};
use std::{
    collections::HashMap,
    sync::{atomic::{AtomicU64, Ordering}, Arc},
    time::Duration,
};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::endpoint::{AttemptFailure, GenerationEndpoint};
use crate::history::HistoryStore;
use crate::models::{GenerationError, GenerationRequest, GenerationResult, GenerationState, GenerationStatus};
use crate::retry::{next_delay, should_retry, RetryConfig};
use crate::validation::{validate, ValidationResult};

pub const PROGRESS_MILESTONES: [u8; 4] = [10, 30, 60, 90];

pub type RetryObserver = Arc<dyn Fn(u32, &GenerationError) + Send + Sync>;
pub type ProgressObserver = Arc<dyn Fn(u8) + Send + Sync>;

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("invalid request: {}", .0.to_error().message)]
    Invalid(ValidationResult),
    #[error("generation failed: {error}")]
    Failed { error: GenerationError, attempts: u32 },
    #[error("generation failed after {attempts} attempts: {error}")]
    Exhausted { error: GenerationError, attempts: u32 },
    #[error("generation cancelled")]
    Cancelled,
    #[error("request {0} cannot be retried")]
    NotRetryable(String),
}

impl SubmitError {
    pub fn generation_error(&self) -> Option<&GenerationError> {
        match self {
            SubmitError::Failed { error, .. } | SubmitError::Exhausted { error, .. } => Some(error),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool { matches!(self, SubmitError::Cancelled) }
}

#[derive(Clone, Default)]
pub struct SubmitOptions {
    pub retry_config: Option<RetryConfig>,
    pub on_retry: Option<RetryObserver>,
    pub on_progress: Option<ProgressObserver>,
}

impl SubmitOptions {
    pub fn retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = Some(config);
        self
    }

    pub fn on_retry(mut self, f: impl Fn(u32, &GenerationError) + Send + Sync + 'static) -> Self {
        self.on_retry = Some(Arc::new(f));
        self
    }

    pub fn on_progress(mut self, f: impl Fn(u8) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Arc::new(f));
        self
    }

    fn notify_retry(&self, attempt: u32, error: &GenerationError) {
        if let Some(f) = &self.on_retry { f(attempt, error) }
    }

    fn notify_progress(&self, percent: u8) {
        if let Some(f) = &self.on_progress { f(percent) }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    pub retry: RetryConfig,
    // zero reports milestones back to back
    pub progress_step: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self { retry: RetryConfig::default(), progress_step: Duration::from_millis(200) }
    }
}

struct Submission {
    epoch: u64,
    token: CancellationToken,
    request: GenerationRequest,
    retry_config: RetryConfig,
    state: GenerationState,
}

struct Run {
    epoch: u64,
    token: CancellationToken,
    request: GenerationRequest,
    retry_config: RetryConfig,
    attempts: u32,
    retry_count: u32,
}

pub struct GenerationController {
    endpoint: Arc<dyn GenerationEndpoint>,
    history: Arc<HistoryStore>,
    config: ControllerConfig,
    submissions: Mutex<HashMap<String, Submission>>,
    next_epoch: AtomicU64,
    rng: Mutex<StdRng>,
}

impl GenerationController {
    pub fn new(endpoint: Arc<dyn GenerationEndpoint>, history: Arc<HistoryStore>, config: ControllerConfig) -> Self {
        Self::with_rng(endpoint, history, config, StdRng::from_entropy())
    }

    pub fn with_rng(
        endpoint: Arc<dyn GenerationEndpoint>,
        history: Arc<HistoryStore>,
        config: ControllerConfig,
        rng: StdRng,
    ) -> Self {
        Self {
            endpoint,
            history,
            config,
            submissions: Mutex::new(HashMap::new()),
            next_epoch: AtomicU64::new(1),
            rng: Mutex::new(rng),
        }
    }

    pub fn history(&self) -> &Arc<HistoryStore> { &self.history }

    pub fn config(&self) -> &ControllerConfig { &self.config }

    pub async fn submit(&self, request: GenerationRequest, options: SubmitOptions) -> Result<GenerationResult, SubmitError> {
        let report = validate(&request);
        if !report.is_valid {
            debug!(request_id = %request.request_id, errors = ?report.field_errors, "Submission rejected by validation");
            return Err(SubmitError::Invalid(report));
        }

        let retry_config = options.retry_config.unwrap_or(self.config.retry).normalized();
        let run = Run {
            epoch: self.next_epoch.fetch_add(1, Ordering::Relaxed),
            token: CancellationToken::new(),
            request,
            retry_config,
            attempts: 0,
            retry_count: 0,
        };

        let previous = {
            let mut subs = self.submissions.lock();
            // finished runs only stay around while a manual retry is still possible
            subs.retain(|_, sub| !sub.state.status.is_terminal() || sub.state.can_retry);
            subs.insert(
                run.request.request_id.clone(),
                Submission {
                    epoch: run.epoch,
                    token: run.token.clone(),
                    request: run.request.clone(),
                    retry_config,
                    state: GenerationState { status: GenerationStatus::Generating, ..Default::default() },
                },
            )
        };
        if let Some(previous) = previous {
            if !previous.state.status.is_terminal() {
                info!(request_id = %run.request.request_id, "Replacing in-flight submission");
            }
            previous.token.cancel();
        }

        info!(
            request_id = %run.request.request_id,
            style = %run.request.style,
            max_attempts = retry_config.max_attempts,
            "🚀 Starting generation"
        );
        self.drive(run, &options).await
    }

    /// Resumes a failed request whose state still has `can_retry` set. The
    /// attempt loop only gives up on retryable errors once the budget is spent,
    /// so failures from `submit` itself come back as `NotRetryable`.
    pub async fn retry(&self, request_id: &str, options: SubmitOptions) -> Result<GenerationResult, SubmitError> {
        let run = {
            let mut subs = self.submissions.lock();
            let sub = match subs.get_mut(request_id) {
                Some(sub) if sub.state.status == GenerationStatus::Error && sub.state.can_retry => sub,
                _ => return Err(SubmitError::NotRetryable(request_id.to_string())),
            };
            sub.epoch = self.next_epoch.fetch_add(1, Ordering::Relaxed);
            sub.token = CancellationToken::new();
            sub.state.status = GenerationStatus::Generating;
            sub.state.progress = 0;
            sub.state.error = None;
            sub.state.can_retry = false;
            Run {
                epoch: sub.epoch,
                token: sub.token.clone(),
                request: sub.request.clone(),
                retry_config: sub.retry_config,
                attempts: sub.state.attempts,
                retry_count: sub.state.retry_count,
            }
        };

        info!(request_id, attempts = run.attempts, "🔁 Retrying failed generation");
        self.drive(run, &options).await
    }

    pub fn cancel(&self, request_id: &str) -> bool {
        let subs = self.submissions.lock();
        match subs.get(request_id) {
            Some(sub) if !sub.state.status.is_terminal() => {
                debug!(request_id, "Cancellation requested");
                sub.token.cancel();
                true
            }
            _ => false,
        }
    }

    pub fn cancel_all(&self) -> usize {
        let subs = self.submissions.lock();
        let mut cancelled = 0;
        for sub in subs.values().filter(|sub| !sub.state.status.is_terminal()) {
            sub.token.cancel();
            cancelled += 1;
        }
        debug!(cancelled, "Cancelled all submissions");
        cancelled
    }

    pub fn state(&self, request_id: &str) -> Option<GenerationState> {
        self.submissions.lock().get(request_id).map(|sub| sub.state.clone())
    }

    pub fn is_active(&self, request_id: &str) -> bool {
        self.state(request_id).is_some_and(|state| state.status == GenerationStatus::Generating)
    }

    pub fn dismiss(&self, request_id: &str) -> bool {
        let mut subs = self.submissions.lock();
        match subs.get(request_id) {
            Some(sub) if sub.state.status.is_terminal() => {
                subs.remove(request_id);
                true
            }
            _ => false,
        }
    }

    fn update(&self, run: &Run, f: impl FnOnce(&mut GenerationState)) -> bool {
        let mut subs = self.submissions.lock();
        match subs.get_mut(&run.request.request_id) {
            Some(sub) if sub.epoch == run.epoch => {
                f(&mut sub.state);
                true
            }
            _ => false,
        }
    }

    // false when the run was cancelled first
    async fn pause(&self, run: &Run, delay: Duration) -> bool {
        if delay.is_zero() {
            return !run.token.is_cancelled();
        }
        tokio::select! {
            _ = run.token.cancelled() => false,
            _ = tokio::time::sleep(delay) => !run.token.is_cancelled(),
        }
    }

    async fn report_progress(&self, run: &Run, options: &SubmitOptions) -> bool {
        for milestone in PROGRESS_MILESTONES {
            let current = self.state(&run.request.request_id).map(|s| s.progress).unwrap_or(0);
            if milestone <= current {
                continue;
            }
            if !self.pause(run, self.config.progress_step).await {
                return false;
            }
            if !self.update(run, |s| s.progress = s.progress.max(milestone)) {
                return false;
            }
            options.notify_progress(milestone);
        }
        true
    }

    async fn drive(&self, mut run: Run, options: &SubmitOptions) -> Result<GenerationResult, SubmitError> {
        loop {
            if run.token.is_cancelled() || !self.report_progress(&run, options).await {
                return Err(self.abort(&run));
            }

            run.attempts += 1;
            let attempt = run.attempts;
            self.update(&run, |s| s.attempts = attempt);
            debug!(request_id = %run.request.request_id, attempt, "Calling generation endpoint");

            let outcome = self.endpoint.generate(&run.request, &run.token).await;
            if run.token.is_cancelled() {
                return Err(self.abort(&run));
            }

            let err = match outcome {
                Ok(result) => return self.succeed(&run, result, options),
                Err(AttemptFailure::Cancelled) => return Err(self.abort(&run)),
                Err(AttemptFailure::Error(err)) => err,
            };

            if !should_retry(&err, attempt, &run.retry_config) {
                return Err(self.fail(&run, err));
            }

            run.retry_count += 1;
            let retry_count = run.retry_count;
            let last = err.clone();
            self.update(&run, move |s| {
                s.retry_count = retry_count;
                s.error = Some(last);
            });

            let delay = {
                let mut rng = self.rng.lock();
                next_delay(attempt, &run.retry_config, &mut *rng)
            };
            warn!(
                request_id = %run.request.request_id,
                attempt,
                max_attempts = run.retry_config.max_attempts,
                delay_ms = delay.as_millis() as u64,
                "🔄 {} - retrying",
                err.message
            );
            options.notify_retry(attempt, &err);

            if !self.pause(&run, delay).await {
                return Err(self.abort(&run));
            }
        }
    }

    fn succeed(&self, run: &Run, result: GenerationResult, options: &SubmitOptions) -> Result<GenerationResult, SubmitError> {
        let current = self.update(run, |s| {
            s.status = GenerationStatus::Success;
            s.progress = 100;
            s.error = None;
            s.can_retry = false;
        });
        if !current {
            return Err(self.abort(run));
        }
        options.notify_progress(100);
        self.history.record_generation(&run.request, &result);
        info!(
            request_id = %run.request.request_id,
            attempts = run.attempts,
            processing_ms = result.processing_time.as_millis() as u64,
            "✅ Generation complete"
        );
        Ok(result)
    }

    fn fail(&self, run: &Run, err: GenerationError) -> SubmitError {
        let can_retry = err.retryable && run.attempts < run.retry_config.max_attempts;
        let stored = err.clone();
        let current = self.update(run, |s| {
            s.status = GenerationStatus::Error;
            s.error = Some(stored);
            s.can_retry = can_retry;
        });
        if !current {
            return self.abort(run);
        }
        error!(request_id = %run.request.request_id, attempts = run.attempts, can_retry, "❌ Generation failed: {}", err);
        if err.retryable {
            SubmitError::Exhausted { error: err, attempts: run.attempts }
        } else {
            SubmitError::Failed { error: err, attempts: run.attempts }
        }
    }

    fn abort(&self, run: &Run) -> SubmitError {
        let current = self.update(run, |s| {
            s.status = GenerationStatus::Aborted;
            s.progress = 0;
            s.error = None;
            s.can_retry = false;
        });
        info!(request_id = %run.request.request_id, superseded = !current, "Generation cancelled");
        SubmitError::Cancelled
    }
}
