//! The job orchestrator: single owner of the active [`VideoJob`].
//!
//! One logical job at a time, driven by a spawned task per submission:
//! submit (with one-shot template fallback and rate-limit recovery) ->
//! poll on an interval -> terminal state. For duration-capped providers
//! the task chains one submission per dialogue segment, seeding each
//! clip with the previous clip's last frame.
//!
//! Every transition is validated against the state machine, published on
//! the watch channel, and persisted before the next network call. Each
//! submission bumps an epoch; updates from an abandoned epoch are
//! discarded, so a late poll response for a replaced job can never touch
//! state, and a terminal status is never overwritten.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, watch, Mutex};
use tokio_util::sync::CancellationToken;

use clipchain_core::error::CoreError;
use clipchain_core::estimate::estimate_spoken_secs;
use clipchain_core::job::{state_machine, JobStatus, PollStatus, VideoJob};
use clipchain_core::request::GenerationRequest;
use clipchain_core::segment::split_into_segments;
use clipchain_core::strategy::{resolve_strategy, GenerationStrategy};
use clipchain_providers::adapter::{ClipSpec, ProviderAdapter, SubmitError, SubmitOutcome};
use clipchain_providers::registry::AdapterRegistry;
use clipchain_store::{JobStore, PersistedJob, StoreError};

use crate::config::OrchestratorConfig;
use crate::events::JobEvent;

/// Broadcast channel capacity for job events.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Errors returned by the orchestrator's command API.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Persistence error: {0}")]
    Store(#[from] StoreError),
}

/// Owns the job lifecycle and the single active [`VideoJob`].
///
/// Cheap to share: commands go through `&self`, observers subscribe to
/// the watch and event channels.
pub struct Orchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    registry: Arc<dyn AdapterRegistry>,
    store: Arc<dyn JobStore>,
    config: OrchestratorConfig,
    state: Mutex<JobSlot>,
    watch_tx: watch::Sender<VideoJob>,
    event_tx: broadcast::Sender<JobEvent>,
}

/// The single mutable slot: the active job, its request, and the
/// cancellation token of the task driving it.
struct JobSlot {
    /// Bumped on every submit/resume/reset. Updates carrying an older
    /// epoch are discarded.
    epoch: u64,
    job: VideoJob,
    request: Option<GenerationRequest>,
    cancel: CancellationToken,
}

impl JobSlot {
    fn new() -> Self {
        Self {
            epoch: 0,
            job: VideoJob::empty_draft(),
            request: None,
            cancel: CancellationToken::new(),
        }
    }
}

/// What a spawned run task has to do, derived at submit or resume time.
struct RunPlan {
    /// Clip texts in chaining order. A single entry for unchained jobs.
    clips: Vec<String>,
    /// Index of the first clip this run submits (or polls, on resume).
    start_index: usize,
    /// Provider handle of a clip already in flight, to poll before any
    /// new submission. Set only when resuming a `Processing` job.
    resume_poll_job_id: Option<String>,
    /// Seed image for the first submission of this run.
    initial_seed: Option<String>,
    /// Seconds to wait before the first submission. Set only when
    /// resuming a `RateLimited` job.
    initial_wait_secs: Option<u32>,
    /// Result URLs of segments completed before this run started.
    prior_results: Vec<String>,
}

impl RunPlan {
    fn fresh(clips: Vec<String>) -> Self {
        Self {
            clips,
            start_index: 0,
            resume_poll_job_id: None,
            initial_seed: None,
            initial_wait_secs: None,
            prior_results: Vec::new(),
        }
    }
}

impl Orchestrator {
    pub fn new(
        registry: Arc<dyn AdapterRegistry>,
        store: Arc<dyn JobStore>,
        config: OrchestratorConfig,
    ) -> Self {
        let (watch_tx, _) = watch::channel(VideoJob::empty_draft());
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                registry,
                store,
                config,
                state: Mutex::new(JobSlot::new()),
                watch_tx,
                event_tx,
            }),
        }
    }

    /// Subscribe to the current-job projection. The receiver always
    /// holds the latest [`VideoJob`] snapshot.
    pub fn watch(&self) -> watch::Receiver<VideoJob> {
        self.inner.watch_tx.subscribe()
    }

    /// Subscribe to discrete [`JobEvent`]s.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.inner.event_tx.subscribe()
    }

    /// Snapshot of the current job state.
    pub fn current(&self) -> VideoJob {
        self.inner.watch_tx.borrow().clone()
    }

    /// Resolve a strategy and start a new generation job.
    ///
    /// Any job still in flight is abandoned first (single-flight
    /// invariant). Configuration and validation problems are returned
    /// immediately and leave the previous state untouched.
    pub async fn submit(&self, request: GenerationRequest) -> Result<(), OrchestratorError> {
        request.validate()?;
        let strategy = resolve_strategy(&request, &self.inner.config.available_templates, false)?;
        let adapter = self
            .inner
            .registry
            .select(&strategy, request.preferred_provider)?;

        tracing::info!(
            provider = %adapter.id(),
            strategy = strategy.kind(),
            "Submitting generation job",
        );

        let job = VideoJob::draft(adapter.id(), strategy.clone());
        let (epoch, cancel) = self.inner.install(job, request.clone()).await;

        // Persist the submitting state before the first network call so
        // a crash mid-submit is visible on restart.
        if !self
            .inner
            .apply(epoch, |job| job.status = JobStatus::Submitting)
            .await
        {
            return Ok(()); // already replaced by a newer submission
        }

        let plan = RunPlan::fresh(build_clips(&request, adapter.as_ref()));
        let inner = Arc::clone(&self.inner);
        tokio::spawn(run_job(inner, epoch, cancel, adapter, request, strategy, plan));
        Ok(())
    }

    /// Stop polling the active job. The job record keeps its last
    /// published state; late responses for it are ignored.
    pub async fn cancel(&self) {
        let slot = self.inner.state.lock().await;
        slot.cancel.cancel();
        tracing::info!("Cancelled polling for the active job");
    }

    /// Abandon the active job, clear the persisted slot, and return to
    /// an empty draft.
    pub async fn reset(&self) -> Result<(), OrchestratorError> {
        {
            let mut slot = self.inner.state.lock().await;
            slot.cancel.cancel();
            slot.cancel = CancellationToken::new();
            slot.epoch += 1;
            slot.job = VideoJob::empty_draft();
            slot.request = None;
            let _ = self.inner.watch_tx.send(slot.job.clone());
        }
        self.inner.store.clear().await?;
        tracing::info!("Job state reset");
        Ok(())
    }

    /// Resume the persisted job after a restart, if there is one worth
    /// resuming. Returns `true` when a job was picked up.
    ///
    /// A `Processing` job is polled under its existing provider handle
    /// without resubmitting; a `RateLimited` job waits out its
    /// `retry_after` and resubmits with the persisted continuation seed.
    /// A record that never obtained a provider handle has nothing
    /// provider-side to resume and is cleared.
    pub async fn resume(&self) -> Result<bool, OrchestratorError> {
        let Some(record) = self.inner.store.load().await? else {
            return Ok(false);
        };
        let (job, request) = record.into_parts();
        if job.status.is_terminal() {
            return Ok(false);
        }

        let (Some(provider_id), Some(strategy)) = (job.provider_id, job.strategy.clone()) else {
            tracing::warn!("Persisted job lacks a provider or strategy; clearing the slot");
            self.inner.store.clear().await?;
            return Ok(false);
        };
        let Some(adapter) = self.inner.registry.get(provider_id) else {
            tracing::warn!(
                provider = %provider_id,
                "Persisted job references an unconfigured provider; leaving the record in place",
            );
            return Ok(false);
        };

        let plan = match (job.status, job.id.clone()) {
            (JobStatus::Processing, Some(job_id)) => RunPlan {
                clips: build_clips(&request, adapter.as_ref()),
                start_index: job.segment_results.len(),
                resume_poll_job_id: Some(job_id),
                initial_seed: None,
                initial_wait_secs: None,
                prior_results: job.segment_results.clone(),
            },
            (JobStatus::RateLimited, _) => RunPlan {
                clips: build_clips(&request, adapter.as_ref()),
                start_index: job.segment_results.len(),
                resume_poll_job_id: None,
                initial_seed: job.continuation_seed_url.clone(),
                initial_wait_secs: Some(job.retry_after_secs.unwrap_or(0)),
                prior_results: job.segment_results.clone(),
            },
            _ => {
                tracing::warn!(
                    status = ?job.status,
                    "Persisted job has no provider handle; clearing the slot",
                );
                self.inner.store.clear().await?;
                return Ok(false);
            }
        };

        tracing::info!(
            provider = %provider_id,
            job_id = ?plan.resume_poll_job_id,
            status = ?job.status,
            "Resuming persisted job",
        );

        let (epoch, cancel) = self.inner.install(job, request.clone()).await;
        let inner = Arc::clone(&self.inner);
        tokio::spawn(run_job(inner, epoch, cancel, adapter, request, strategy, plan));
        Ok(true)
    }
}

impl Inner {
    /// Install a new active job, abandoning the previous one. Returns
    /// the new epoch and its cancellation token.
    async fn install(
        &self,
        job: VideoJob,
        request: GenerationRequest,
    ) -> (u64, CancellationToken) {
        let mut slot = self.state.lock().await;
        slot.cancel.cancel();
        slot.cancel = CancellationToken::new();
        slot.epoch += 1;
        slot.job = job.clone();
        slot.request = Some(request);
        let _ = self.watch_tx.send(job);
        (slot.epoch, slot.cancel.clone())
    }

    /// Apply a mutation to the active job: epoch-checked, transition-
    /// validated, published on the watch channel, and persisted.
    ///
    /// Returns `false` when the update was discarded — the epoch is
    /// stale or the status change is invalid (e.g. out of a terminal
    /// state). Callers must stop driving the job when that happens.
    async fn apply(
        &self,
        epoch: u64,
        mutate: impl FnOnce(&mut VideoJob) + Send,
    ) -> bool {
        let mut slot = self.state.lock().await;
        if slot.epoch != epoch {
            tracing::debug!("Discarding update from an abandoned job");
            return false;
        }

        let old_status = slot.job.status;
        let mut candidate = slot.job.clone();
        mutate(&mut candidate);

        if candidate.status != old_status {
            if let Err(e) = state_machine::validate_transition(old_status, candidate.status) {
                tracing::warn!(error = %e, "Discarding invalid status transition");
                return false;
            }
        }

        slot.job = candidate.clone();
        let _ = self.watch_tx.send(candidate.clone());
        if candidate.status != old_status {
            self.emit(JobEvent::StatusChanged {
                from: old_status,
                to: candidate.status,
            });
        }

        if let Some(request) = &slot.request {
            if let Err(e) = self
                .store
                .save(&PersistedJob::snapshot(&candidate, request))
                .await
            {
                tracing::error!(error = %e, "Failed to persist job state");
            }
        }
        true
    }

    /// Epoch-checked update that must not change the status (poll
    /// timestamps). Published on the watch channel, not persisted.
    async fn touch(&self, epoch: u64, mutate: impl FnOnce(&mut VideoJob) + Send) -> bool {
        let mut slot = self.state.lock().await;
        if slot.epoch != epoch {
            return false;
        }
        mutate(&mut slot.job);
        let _ = self.watch_tx.send(slot.job.clone());
        true
    }

    /// Move the job to `Failed` with a user-facing reason.
    async fn fail(&self, epoch: u64, reason: String) {
        tracing::error!(error = %reason, "Generation failed");
        let reason_for_job = reason.clone();
        if self
            .apply(epoch, move |job| {
                job.status = JobStatus::Failed;
                job.error = Some(reason_for_job);
            })
            .await
        {
            self.emit(JobEvent::Failed { error: reason });
        }
    }

    fn emit(&self, event: JobEvent) {
        // SendError only means there are zero subscribers.
        let _ = self.event_tx.send(event);
    }
}

// ---------------------------------------------------------------------------
// Run task
// ---------------------------------------------------------------------------

/// Derive the clip texts for a request against an adapter's duration
/// cap: one clip when it fits, a chained segment list when it does not.
fn build_clips(request: &GenerationRequest, adapter: &dyn ProviderAdapter) -> Vec<String> {
    let full = request.full_text();
    match adapter.max_clip_secs() {
        Some(cap) if estimate_spoken_secs(&full) > cap => {
            let segments = split_into_segments(&full, cap);
            tracing::info!(
                segments = segments.len(),
                cap_secs = cap,
                "Dialogue exceeds the provider clip cap; chaining segments",
            );
            segments.into_iter().map(|s| s.text).collect()
        }
        _ => vec![full],
    }
}

/// Drive one job from submission to a terminal state.
///
/// All state effects go through `Inner::apply` under `epoch`; once the
/// slot moves on (new submission, reset) every remaining effect of this
/// task is discarded and the task unwinds.
async fn run_job(
    inner: Arc<Inner>,
    epoch: u64,
    cancel: CancellationToken,
    mut adapter: Arc<dyn ProviderAdapter>,
    request: GenerationRequest,
    mut strategy: GenerationStrategy,
    plan: RunPlan,
) {
    let total = plan.clips.len();
    let mut results = plan.prior_results;
    let mut seed = plan.initial_seed;
    let mut index = plan.start_index;
    let mut pending_poll = plan.resume_poll_job_id;

    // Resuming a rate-limited job: honor the provider's wait before the
    // first submission.
    if let Some(wait) = plan.initial_wait_secs {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(Duration::from_secs(u64::from(wait))) => {}
        }
        if !inner
            .apply(epoch, |job| {
                job.status = JobStatus::Submitting;
                job.retry_after_secs = None;
            })
            .await
        {
            return;
        }
    }

    while index < total {
        let job_id = match pending_poll.take() {
            // A clip was already in flight when this run started.
            Some(id) => id,
            None => {
                match submit_with_recovery(
                    &inner,
                    epoch,
                    &cancel,
                    &mut adapter,
                    &mut strategy,
                    &request,
                    &plan.clips[index],
                    seed.clone(),
                )
                .await
                {
                    Some(id) => id,
                    None => return,
                }
            }
        };

        match poll_until_terminal(&inner, epoch, &cancel, &adapter, &job_id).await {
            PollFlow::Stopped => return,
            PollFlow::Failed(reason) => {
                inner.fail(epoch, reason).await;
                return;
            }
            PollFlow::Completed {
                result_url,
                cover_url,
            } => {
                results.push(result_url.clone());
                seed = cover_url.clone();
                if total > 1 {
                    inner.emit(JobEvent::SegmentCompleted {
                        index,
                        total,
                        url: result_url,
                    });
                }
                index += 1;

                if index >= total {
                    finish(&inner, epoch, results, cover_url).await;
                    return;
                }

                // More clips: back to Submitting for the next segment.
                let results_snapshot = results.clone();
                if !inner
                    .apply(epoch, move |job| {
                        job.status = JobStatus::Submitting;
                        job.id = None;
                        job.segment_results = results_snapshot;
                    })
                    .await
                {
                    return;
                }
            }
        }
    }
}

/// Submit one clip, recovering from rate limiting (bounded resubmission
/// with the provider's continuation seed) and applying the one-shot
/// template-to-avatar fallback. Returns the provider job handle, or
/// `None` when the run is over (cancelled, replaced, or failed — state
/// already reflects it).
#[allow(clippy::too_many_arguments)]
async fn submit_with_recovery(
    inner: &Arc<Inner>,
    epoch: u64,
    cancel: &CancellationToken,
    adapter: &mut Arc<dyn ProviderAdapter>,
    strategy: &mut GenerationStrategy,
    request: &GenerationRequest,
    text: &str,
    mut seed: Option<String>,
) -> Option<String> {
    let mut rate_limit_attempts = 0u32;
    let mut fallback_used = false;

    loop {
        if cancel.is_cancelled() {
            return None;
        }

        let clip = ClipSpec::new(text).with_seed(seed.clone());
        match adapter.submit(strategy, request, &clip).await {
            Ok(SubmitOutcome::Accepted { job_id }) => {
                let accepted_id = job_id.clone();
                if !inner
                    .apply(epoch, move |job| {
                        job.status = JobStatus::Processing;
                        job.id = Some(job_id);
                        job.retry_after_secs = None;
                        job.continuation_seed_url = None;
                    })
                    .await
                {
                    return None;
                }
                return Some(accepted_id);
            }

            Ok(SubmitOutcome::RateLimited {
                retry_after_secs,
                continuation_seed_url,
            }) => {
                rate_limit_attempts += 1;
                if rate_limit_attempts > inner.config.max_rate_limit_retries {
                    inner
                        .fail(
                            epoch,
                            format!(
                                "provider still rate limited after {} resubmissions",
                                inner.config.max_rate_limit_retries
                            ),
                        )
                        .await;
                    return None;
                }

                // Prefer the freshest continuation seed the provider gave us.
                seed = continuation_seed_url.or(seed);
                let seed_for_job = seed.clone();
                if !inner
                    .apply(epoch, move |job| {
                        job.status = JobStatus::RateLimited;
                        job.retry_after_secs = Some(retry_after_secs);
                        job.continuation_seed_url = seed_for_job;
                    })
                    .await
                {
                    return None;
                }
                inner.emit(JobEvent::RateLimitScheduled {
                    retry_after_secs,
                    attempt: rate_limit_attempts,
                });
                tracing::info!(
                    retry_after_secs,
                    attempt = rate_limit_attempts,
                    "Rate limited; resubmission scheduled",
                );

                tokio::select! {
                    _ = cancel.cancelled() => return None,
                    _ = tokio::time::sleep(Duration::from_secs(u64::from(retry_after_secs))) => {}
                }

                if !inner
                    .apply(epoch, |job| {
                        job.status = JobStatus::Submitting;
                        job.retry_after_secs = None;
                    })
                    .await
                {
                    return None;
                }
            }

            Err(SubmitError::TemplateUnsupported(reason))
                if !fallback_used
                    && matches!(*strategy, GenerationStrategy::Template { .. }) =>
            {
                fallback_used = true;
                tracing::warn!(
                    reason = %reason,
                    "Template rejected; retrying once with an avatar strategy",
                );

                let fallback = match resolve_strategy(
                    request,
                    &inner.config.available_templates,
                    true,
                ) {
                    Ok(s) => s,
                    Err(e) => {
                        inner
                            .fail(
                                epoch,
                                format!("template rejected ({reason}); no avatar fallback: {e}"),
                            )
                            .await;
                        return None;
                    }
                };
                let next_adapter = match inner
                    .registry
                    .select(&fallback, request.preferred_provider)
                {
                    Ok(a) => a,
                    Err(e) => {
                        inner.fail(epoch, e.to_string()).await;
                        return None;
                    }
                };

                *adapter = next_adapter;
                *strategy = fallback.clone();
                let provider_id = adapter.id();
                if !inner
                    .apply(epoch, move |job| {
                        job.status = JobStatus::Submitting;
                        job.strategy = Some(fallback);
                        job.provider_id = Some(provider_id);
                    })
                    .await
                {
                    return None;
                }
            }

            Err(e) => {
                inner.fail(epoch, e.to_string()).await;
                return None;
            }
        }
    }
}

/// Outcome of polling one clip to its end.
enum PollFlow {
    Completed {
        result_url: String,
        cover_url: Option<String>,
    },
    Failed(String),
    Stopped,
}

/// Poll one clip on a fixed interval until the provider reports a
/// terminal status. Transient poll errors are logged and retried on the
/// next tick; they never change job state. At most one poll is in
/// flight at a time.
async fn poll_until_terminal(
    inner: &Arc<Inner>,
    epoch: u64,
    cancel: &CancellationToken,
    adapter: &Arc<dyn ProviderAdapter>,
    job_id: &str,
) -> PollFlow {
    let interval = inner
        .config
        .poll_interval
        .unwrap_or_else(|| adapter.poll_interval());
    let mut consecutive = 0u32;
    let mut stuck_emitted = false;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return PollFlow::Stopped,
            _ = tokio::time::sleep(interval) => {}
        }

        match adapter.poll(job_id).await {
            Ok(result) => {
                consecutive += 1;
                if !inner
                    .touch(epoch, |job| job.last_polled_at = Some(Utc::now()))
                    .await
                {
                    return PollFlow::Stopped;
                }
                match result.status {
                    PollStatus::Completed => match result.result_url {
                        Some(url) => {
                            return PollFlow::Completed {
                                result_url: url,
                                cover_url: result.cover_url,
                            }
                        }
                        // Adapters normally hold Completed until the URL
                        // exists; keep polling if one slips through.
                        None => {
                            tracing::warn!(job_id, "Completed poll without a result URL");
                        }
                    },
                    PollStatus::Failed => {
                        return PollFlow::Failed(
                            result
                                .error
                                .unwrap_or_else(|| "provider reported generation failure".into()),
                        );
                    }
                    PollStatus::Processing => {}
                }
            }
            Err(e) => {
                consecutive += 1;
                tracing::warn!(job_id, error = %e, "Transient poll error; retrying next tick");
            }
        }

        if consecutive >= inner.config.stuck_after_polls && !stuck_emitted {
            stuck_emitted = true;
            inner.emit(JobEvent::Stuck { polls: consecutive });
            tracing::warn!(
                job_id,
                polls = consecutive,
                "No terminal state after many polls; flagging as possibly stuck",
            );
        }
    }
}

/// Complete the job with the final clip's result. For chained jobs the
/// per-segment URLs are recorded alongside the final URL.
async fn finish(inner: &Arc<Inner>, epoch: u64, results: Vec<String>, cover_url: Option<String>) {
    let Some(result_url) = results.last().cloned() else {
        return;
    };
    let segment_results = if results.len() > 1 { results } else { Vec::new() };
    let url_for_event = result_url.clone();

    if inner
        .apply(epoch, move |job| {
            job.status = JobStatus::Completed;
            job.result_url = Some(result_url);
            job.cover_url = cover_url;
            job.segment_results = segment_results;
        })
        .await
    {
        tracing::info!("Generation completed");
        inner.emit(JobEvent::Completed {
            result_url: url_for_event,
        });
    }
}
