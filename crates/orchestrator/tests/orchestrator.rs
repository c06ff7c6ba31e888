//! End-to-end orchestrator behavior against scripted mock adapters.
//!
//! All tests run on a paused tokio clock, so rate-limit waits and poll
//! intervals elapse instantly while still being observable through
//! `tokio::time::Instant`.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;

use clipchain_core::error::CoreError;
use clipchain_core::job::{JobStatus, PollResult, ProviderId, VideoJob};
use clipchain_core::request::{AspectRatio, DialogueLine, GenerationRequest, SpeakerProfile};
use clipchain_core::strategy::{GenerationStrategy, SpeakerRole};
use clipchain_orchestrator::{JobEvent, Orchestrator, OrchestratorConfig, OrchestratorError};
use clipchain_providers::adapter::{
    ClipSpec, PollError, ProviderAdapter, SubmitError, SubmitOutcome,
};
use clipchain_providers::registry::AdapterRegistry;
use clipchain_store::{JobStore, MemoryJobStore, PersistedJob};

// ---------------------------------------------------------------------------
// Mock adapter and registry
// ---------------------------------------------------------------------------

enum SubmitScript {
    Accept,
    RateLimited {
        retry_after_secs: u32,
        seed: Option<&'static str>,
    },
    TemplateUnsupported,
    Reject,
}

#[derive(Debug, Clone)]
struct SubmitRecord {
    strategy_kind: &'static str,
    text: String,
    seed: Option<String>,
    at: Instant,
}

struct MockAdapter {
    id: ProviderId,
    max_clip_secs: Option<u32>,
    submit_script: Mutex<VecDeque<SubmitScript>>,
    poll_script: Mutex<VecDeque<Result<PollResult, PollError>>>,
    poll_delays: Mutex<VecDeque<Duration>>,
    default_poll: Mutex<PollResult>,
    submits: Mutex<Vec<SubmitRecord>>,
    polls: Mutex<Vec<(String, Instant)>>,
    next_id: Mutex<u32>,
}

impl MockAdapter {
    fn new(id: ProviderId) -> Arc<Self> {
        Self::build(id, None)
    }

    fn with_clip_cap(id: ProviderId, cap: u32) -> Arc<Self> {
        Self::build(id, Some(cap))
    }

    fn build(id: ProviderId, max_clip_secs: Option<u32>) -> Arc<Self> {
        Arc::new(Self {
            id,
            max_clip_secs,
            submit_script: Mutex::new(VecDeque::new()),
            poll_script: Mutex::new(VecDeque::new()),
            poll_delays: Mutex::new(VecDeque::new()),
            default_poll: Mutex::new(PollResult::completed("https://cdn.test/final.mp4", None)),
            submits: Mutex::new(Vec::new()),
            polls: Mutex::new(Vec::new()),
            next_id: Mutex::new(0),
        })
    }

    fn script_submit(&self, script: SubmitScript) {
        self.submit_script.lock().unwrap().push_back(script);
    }

    fn script_poll(&self, result: Result<PollResult, PollError>) {
        self.poll_script.lock().unwrap().push_back(result);
    }

    /// Make the next poll call hang for `delay` before answering, as a
    /// slow transport would.
    fn delay_next_poll(&self, delay: Duration) {
        self.poll_delays.lock().unwrap().push_back(delay);
    }

    fn set_default_poll(&self, result: PollResult) {
        *self.default_poll.lock().unwrap() = result;
    }

    fn submits(&self) -> Vec<SubmitRecord> {
        self.submits.lock().unwrap().clone()
    }

    fn polls(&self) -> Vec<(String, Instant)> {
        self.polls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProviderAdapter for MockAdapter {
    fn id(&self) -> ProviderId {
        self.id
    }

    fn max_clip_secs(&self) -> Option<u32> {
        self.max_clip_secs
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_secs(1)
    }

    async fn submit(
        &self,
        strategy: &GenerationStrategy,
        _request: &GenerationRequest,
        clip: &ClipSpec,
    ) -> Result<SubmitOutcome, SubmitError> {
        self.submits.lock().unwrap().push(SubmitRecord {
            strategy_kind: strategy.kind(),
            text: clip.text.clone(),
            seed: clip.seed_image_url.clone(),
            at: Instant::now(),
        });

        let script = self.submit_script.lock().unwrap().pop_front();
        match script.unwrap_or(SubmitScript::Accept) {
            SubmitScript::Accept => {
                let mut next = self.next_id.lock().unwrap();
                *next += 1;
                Ok(SubmitOutcome::Accepted {
                    job_id: format!("job-{next}", next = *next),
                })
            }
            SubmitScript::RateLimited {
                retry_after_secs,
                seed,
            } => Ok(SubmitOutcome::RateLimited {
                retry_after_secs,
                continuation_seed_url: seed.map(String::from),
            }),
            SubmitScript::TemplateUnsupported => Err(SubmitError::TemplateUnsupported(
                "template lacks a slot for this payload".into(),
            )),
            SubmitScript::Reject => Err(SubmitError::Rejected {
                status: 422,
                message: "unprocessable payload".into(),
            }),
        }
    }

    async fn poll(&self, job_id: &str) -> Result<PollResult, PollError> {
        let delay = self.poll_delays.lock().unwrap().pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.polls
            .lock()
            .unwrap()
            .push((job_id.to_string(), Instant::now()));
        match self.poll_script.lock().unwrap().pop_front() {
            Some(result) => result,
            None => Ok(self.default_poll.lock().unwrap().clone()),
        }
    }
}

/// Registry handing out a single swappable mock adapter regardless of
/// strategy, so tests control routing completely.
struct MockRegistry {
    adapter: Mutex<Arc<MockAdapter>>,
}

impl MockRegistry {
    fn new(adapter: Arc<MockAdapter>) -> Arc<Self> {
        Arc::new(Self {
            adapter: Mutex::new(adapter),
        })
    }

    fn set(&self, adapter: Arc<MockAdapter>) {
        *self.adapter.lock().unwrap() = adapter;
    }

    fn current(&self) -> Arc<MockAdapter> {
        self.adapter.lock().unwrap().clone()
    }
}

impl AdapterRegistry for MockRegistry {
    fn get(&self, id: ProviderId) -> Option<Arc<dyn ProviderAdapter>> {
        let adapter = self.current();
        (adapter.id() == id).then(|| adapter as Arc<dyn ProviderAdapter>)
    }

    fn select(
        &self,
        _strategy: &GenerationStrategy,
        _preferred: Option<ProviderId>,
    ) -> Result<Arc<dyn ProviderAdapter>, CoreError> {
        Ok(self.current() as Arc<dyn ProviderAdapter>)
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct Harness {
    orchestrator: Orchestrator,
    registry: Arc<MockRegistry>,
    store: Arc<MemoryJobStore>,
}

fn harness(adapter: Arc<MockAdapter>, config: OrchestratorConfig) -> Harness {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let registry = MockRegistry::new(adapter);
    let store = Arc::new(MemoryJobStore::new());
    let orchestrator = Orchestrator::new(registry.clone(), store.clone(), config);
    Harness {
        orchestrator,
        registry,
        store,
    }
}

fn profile(avatar: &str, voice: &str) -> SpeakerProfile {
    SpeakerProfile {
        avatar_id: Some(avatar.to_string()),
        voice_id: Some(voice.to_string()),
    }
}

fn solo_request(text: &str) -> GenerationRequest {
    let mut speakers = BTreeMap::new();
    speakers.insert("host".to_string(), profile("av-host", "vo-host"));
    GenerationRequest {
        dialogue: vec![DialogueLine {
            speaker_id: "host".into(),
            text: text.into(),
        }],
        aspect_ratio: AspectRatio::Landscape,
        captions: false,
        speakers,
        template_id: None,
        preferred_provider: None,
    }
}

fn pair_template_request(template_id: &str) -> GenerationRequest {
    let mut speakers = BTreeMap::new();
    speakers.insert("host".to_string(), profile("av-host", "vo-host"));
    speakers.insert("guest".to_string(), profile("av-guest", "vo-guest"));
    GenerationRequest {
        dialogue: vec![
            DialogueLine {
                speaker_id: "host".into(),
                text: "Welcome back to the show.".into(),
            },
            DialogueLine {
                speaker_id: "guest".into(),
                text: "Glad to be here.".into(),
            },
        ],
        aspect_ratio: AspectRatio::Portrait,
        captions: true,
        speakers,
        template_id: Some(template_id.to_string()),
        preferred_provider: None,
    }
}

fn solo_strategy() -> GenerationStrategy {
    GenerationStrategy::AvatarSolo {
        speaker: SpeakerRole {
            speaker_id: "host".into(),
            avatar_id: "av-host".into(),
            voice_id: "vo-host".into(),
        },
    }
}

async fn wait_for_status(rx: &mut watch::Receiver<VideoJob>, status: JobStatus) -> VideoJob {
    tokio::time::timeout(Duration::from_secs(3600), async {
        loop {
            {
                let job = rx.borrow();
                if job.status == status {
                    return job.clone();
                }
            }
            rx.changed().await.expect("orchestrator dropped");
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {status:?}"))
}

fn drain_events(rx: &mut broadcast::Receiver<JobEvent>) -> Vec<JobEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

// ---------------------------------------------------------------------------
// Happy path and validation
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn job_polls_to_completion() {
    let adapter = MockAdapter::new(ProviderId::AvatarStudio);
    adapter.script_poll(Ok(PollResult::processing()));
    adapter.script_poll(Ok(PollResult::processing()));
    adapter.script_poll(Ok(PollResult::completed("https://cdn.test/video.mp4", None)));

    let h = harness(adapter.clone(), OrchestratorConfig::default());
    let mut rx = h.orchestrator.watch();

    h.orchestrator.submit(solo_request("Hello world.")).await.unwrap();
    let job = wait_for_status(&mut rx, JobStatus::Completed).await;

    assert_eq!(job.result_url.as_deref(), Some("https://cdn.test/video.mp4"));
    assert!(job.error.is_none());
    assert!(job.segment_results.is_empty());
    assert_eq!(adapter.submits().len(), 1);
    assert_eq!(adapter.polls().len(), 3);

    // Terminal state is persisted.
    let record = h.store.load().await.unwrap().unwrap();
    assert_eq!(record.status, JobStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn unresolvable_strategy_is_rejected_before_any_submission() {
    let adapter = MockAdapter::new(ProviderId::AvatarStudio);
    let h = harness(adapter.clone(), OrchestratorConfig::default());

    // No configured speakers and no template.
    let mut request = solo_request("Hello world.");
    request.speakers.clear();

    let err = h.orchestrator.submit(request).await.unwrap_err();
    assert_matches!(err, OrchestratorError::Core(CoreError::Configuration(_)));
    assert_eq!(h.orchestrator.current().status, JobStatus::Draft);
    assert!(adapter.submits().is_empty());
}

#[tokio::test(start_paused = true)]
async fn empty_dialogue_is_a_validation_error() {
    let adapter = MockAdapter::new(ProviderId::AvatarStudio);
    let h = harness(adapter, OrchestratorConfig::default());

    let err = h.orchestrator.submit(solo_request("   ")).await.unwrap_err();
    assert_matches!(err, OrchestratorError::Core(CoreError::Validation(_)));
}

// ---------------------------------------------------------------------------
// Rate-limit recovery
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn rate_limited_submission_waits_and_reuses_the_continuation_seed() {
    let adapter = MockAdapter::new(ProviderId::MotionFrame);
    adapter.script_submit(SubmitScript::RateLimited {
        retry_after_secs: 5,
        seed: Some("https://cdn.test/prepared-seed.png"),
    });
    adapter.script_submit(SubmitScript::Accept);

    let h = harness(adapter.clone(), OrchestratorConfig::default());
    let mut rx = h.orchestrator.watch();
    let mut events = h.orchestrator.subscribe();

    h.orchestrator.submit(solo_request("Hello world.")).await.unwrap();
    wait_for_status(&mut rx, JobStatus::Completed).await;

    let submits = adapter.submits();
    assert_eq!(submits.len(), 2);
    assert!(submits[0].seed.is_none());
    assert_eq!(
        submits[1].seed.as_deref(),
        Some("https://cdn.test/prepared-seed.png"),
        "resubmission must carry the provider's continuation seed",
    );
    assert!(
        submits[1].at.duration_since(submits[0].at) >= Duration::from_secs(5),
        "resubmission must wait out retry_after",
    );

    let events = drain_events(&mut events);
    assert!(events.iter().any(|e| matches!(
        e,
        JobEvent::RateLimitScheduled {
            retry_after_secs: 5,
            attempt: 1,
        }
    )));
    assert!(events
        .iter()
        .any(|e| matches!(e, JobEvent::StatusChanged { to: JobStatus::RateLimited, .. })));
}

#[tokio::test(start_paused = true)]
async fn rate_limit_resubmissions_are_capped() {
    let adapter = MockAdapter::new(ProviderId::MotionFrame);
    for _ in 0..3 {
        adapter.script_submit(SubmitScript::RateLimited {
            retry_after_secs: 1,
            seed: None,
        });
    }

    let config = OrchestratorConfig {
        max_rate_limit_retries: 2,
        ..OrchestratorConfig::default()
    };
    let h = harness(adapter.clone(), config);
    let mut rx = h.orchestrator.watch();

    h.orchestrator.submit(solo_request("Hello world.")).await.unwrap();
    let job = wait_for_status(&mut rx, JobStatus::Failed).await;

    assert!(job.error.as_deref().unwrap().contains("rate limited"));
    // Initial attempt plus two permitted resubmissions.
    assert_eq!(adapter.submits().len(), 3);
}

// ---------------------------------------------------------------------------
// Template fallback
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn template_rejection_falls_back_to_avatar_pair_once() {
    let adapter = MockAdapter::new(ProviderId::AvatarStudio);
    adapter.script_submit(SubmitScript::TemplateUnsupported);
    adapter.script_submit(SubmitScript::Accept);

    let config = OrchestratorConfig {
        available_templates: vec!["news-desk".into()],
        ..OrchestratorConfig::default()
    };
    let h = harness(adapter.clone(), config);
    let mut rx = h.orchestrator.watch();

    h.orchestrator
        .submit(pair_template_request("news-desk"))
        .await
        .unwrap();
    let job = wait_for_status(&mut rx, JobStatus::Completed).await;

    let submits = adapter.submits();
    assert_eq!(submits.len(), 2);
    assert_eq!(submits[0].strategy_kind, "template");
    assert_eq!(submits[1].strategy_kind, "avatar_pair");
    assert_matches!(job.strategy, Some(GenerationStrategy::AvatarPair { .. }));
}

#[tokio::test(start_paused = true)]
async fn template_rejection_without_avatar_fallback_fails() {
    let adapter = MockAdapter::new(ProviderId::AvatarStudio);
    adapter.script_submit(SubmitScript::TemplateUnsupported);

    let config = OrchestratorConfig {
        available_templates: vec!["news-desk".into()],
        ..OrchestratorConfig::default()
    };
    let h = harness(adapter.clone(), config);
    let mut rx = h.orchestrator.watch();

    // Template selected but no speaker has a complete profile.
    let mut request = pair_template_request("news-desk");
    request.speakers.clear();

    h.orchestrator.submit(request).await.unwrap();
    let job = wait_for_status(&mut rx, JobStatus::Failed).await;

    assert!(job.error.as_deref().unwrap().contains("template rejected"));
    assert_eq!(adapter.submits().len(), 1, "fallback must not resubmit");
}

#[tokio::test(start_paused = true)]
async fn fallback_is_strictly_one_shot() {
    let adapter = MockAdapter::new(ProviderId::AvatarStudio);
    adapter.script_submit(SubmitScript::TemplateUnsupported);
    adapter.script_submit(SubmitScript::Reject);

    let config = OrchestratorConfig {
        available_templates: vec!["news-desk".into()],
        ..OrchestratorConfig::default()
    };
    let h = harness(adapter.clone(), config);
    let mut rx = h.orchestrator.watch();

    h.orchestrator
        .submit(pair_template_request("news-desk"))
        .await
        .unwrap();
    let job = wait_for_status(&mut rx, JobStatus::Failed).await;

    assert_eq!(adapter.submits().len(), 2);
    assert!(job.error.as_deref().unwrap().contains("rejected"));
}

// ---------------------------------------------------------------------------
// Polling semantics
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn transient_poll_errors_never_fail_the_job() {
    let adapter = MockAdapter::new(ProviderId::AvatarStudio);
    adapter.script_poll(Err(PollError::Payload("truncated body".into())));
    adapter.script_poll(Err(PollError::Payload("502 from gateway".into())));
    adapter.script_poll(Ok(PollResult::completed("https://cdn.test/video.mp4", None)));

    let h = harness(adapter.clone(), OrchestratorConfig::default());
    let mut rx = h.orchestrator.watch();

    h.orchestrator.submit(solo_request("Hello world.")).await.unwrap();
    let job = wait_for_status(&mut rx, JobStatus::Completed).await;

    assert_eq!(job.result_url.as_deref(), Some("https://cdn.test/video.mp4"));
    assert_eq!(adapter.polls().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn provider_reported_failure_is_terminal() {
    let adapter = MockAdapter::new(ProviderId::AvatarStudio);
    adapter.script_poll(Ok(PollResult::failed("content policy violation")));

    let h = harness(adapter.clone(), OrchestratorConfig::default());
    let mut rx = h.orchestrator.watch();

    h.orchestrator.submit(solo_request("Hello world.")).await.unwrap();
    let job = wait_for_status(&mut rx, JobStatus::Failed).await;

    assert!(job.error.as_deref().unwrap().contains("content policy"));
}

#[tokio::test(start_paused = true)]
async fn stuck_signal_fires_once_and_polling_continues() {
    let adapter = MockAdapter::new(ProviderId::AvatarStudio);
    for _ in 0..5 {
        adapter.script_poll(Ok(PollResult::processing()));
    }

    let config = OrchestratorConfig {
        stuck_after_polls: 3,
        ..OrchestratorConfig::default()
    };
    let h = harness(adapter.clone(), config);
    let mut rx = h.orchestrator.watch();
    let mut events = h.orchestrator.subscribe();

    h.orchestrator.submit(solo_request("Hello world.")).await.unwrap();
    let job = wait_for_status(&mut rx, JobStatus::Completed).await;

    // The job still completes; the signal is informational only.
    assert!(job.result_url.is_some());
    let stuck: Vec<_> = drain_events(&mut events)
        .into_iter()
        .filter(|e| matches!(e, JobEvent::Stuck { .. }))
        .collect();
    assert_eq!(stuck.len(), 1);
    assert_matches!(stuck[0], JobEvent::Stuck { polls: 3 });
}

// ---------------------------------------------------------------------------
// Single-flight and terminal protection
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn new_submission_replaces_the_active_job() {
    let first = MockAdapter::new(ProviderId::AvatarStudio);
    first.set_default_poll(PollResult::processing());

    let h = harness(first.clone(), OrchestratorConfig::default());
    let mut rx = h.orchestrator.watch();

    h.orchestrator.submit(solo_request("First job.")).await.unwrap();
    wait_for_status(&mut rx, JobStatus::Processing).await;

    let second = MockAdapter::new(ProviderId::AvatarStudio);
    second.set_default_poll(PollResult::completed("https://cdn.test/second.mp4", None));
    h.registry.set(second.clone());

    h.orchestrator.submit(solo_request("Second job.")).await.unwrap();
    let job = wait_for_status(&mut rx, JobStatus::Completed).await;

    assert_eq!(job.result_url.as_deref(), Some("https://cdn.test/second.mp4"));
    assert_eq!(first.submits().len(), 1);
    assert_eq!(second.submits().len(), 1);

    // The abandoned job's poll loop stops; late responses change nothing.
    let polls_after_completion = first.polls().len();
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(first.polls().len(), polls_after_completion);
    assert_eq!(h.orchestrator.current().result_url.as_deref(), Some("https://cdn.test/second.mp4"));
}

#[tokio::test(start_paused = true)]
async fn stale_processing_response_after_completion_is_discarded() {
    // The first job's only poll is stuck in transport and will resolve
    // as Processing long after the job has been replaced and the
    // replacement has completed.
    let first = MockAdapter::new(ProviderId::AvatarStudio);
    first.delay_next_poll(Duration::from_secs(30));
    first.script_poll(Ok(PollResult::processing()));

    let h = harness(first.clone(), OrchestratorConfig::default());
    let mut rx = h.orchestrator.watch();

    h.orchestrator.submit(solo_request("First job.")).await.unwrap();
    wait_for_status(&mut rx, JobStatus::Processing).await;

    // Advance past one poll interval so the delayed poll is genuinely
    // in flight before the job is replaced.
    tokio::time::sleep(Duration::from_secs(2)).await;

    let second = MockAdapter::new(ProviderId::AvatarStudio);
    second.set_default_poll(PollResult::completed("https://cdn.test/fresh.mp4", None));
    h.registry.set(second.clone());

    h.orchestrator.submit(solo_request("Second job.")).await.unwrap();
    let job = wait_for_status(&mut rx, JobStatus::Completed).await;
    assert_eq!(job.result_url.as_deref(), Some("https://cdn.test/fresh.mp4"));

    // Let the slow Processing response land; it must not pull the job
    // back out of its terminal state.
    tokio::time::sleep(Duration::from_secs(60)).await;
    let after = h.orchestrator.current();
    assert_eq!(after.status, JobStatus::Completed);
    assert_eq!(after.result_url.as_deref(), Some("https://cdn.test/fresh.mp4"));
    assert_eq!(first.polls().len(), 1, "the abandoned poll loop must stop");
}

#[tokio::test(start_paused = true)]
async fn cancel_after_completion_leaves_the_terminal_state_intact() {
    let adapter = MockAdapter::new(ProviderId::AvatarStudio);
    let h = harness(adapter, OrchestratorConfig::default());
    let mut rx = h.orchestrator.watch();

    h.orchestrator.submit(solo_request("Hello world.")).await.unwrap();
    let completed = wait_for_status(&mut rx, JobStatus::Completed).await;

    h.orchestrator.cancel().await;
    tokio::time::sleep(Duration::from_secs(5)).await;
    let after = h.orchestrator.current();
    assert_eq!(after.status, JobStatus::Completed);
    assert_eq!(after.result_url, completed.result_url);
}

#[tokio::test(start_paused = true)]
async fn reset_clears_the_store_and_returns_to_draft() {
    let adapter = MockAdapter::new(ProviderId::AvatarStudio);
    let h = harness(adapter, OrchestratorConfig::default());
    let mut rx = h.orchestrator.watch();

    h.orchestrator.submit(solo_request("Hello world.")).await.unwrap();
    wait_for_status(&mut rx, JobStatus::Completed).await;

    h.orchestrator.reset().await.unwrap();
    assert_eq!(h.orchestrator.current().status, JobStatus::Draft);
    assert!(h.store.load().await.unwrap().is_none());
}

// ---------------------------------------------------------------------------
// Segment chaining
// ---------------------------------------------------------------------------

/// Three 15-word sentences: 6 seconds each, 18 total. At a 10 second cap
/// no two sentences share a segment.
const CHAIN_TEXT: &str = "The studio lights warmed up slowly while the crew checked every cable on the floor. \
     Our host opened the evening show with a calm summary of the most important stories. \
     Viewers at home sent in questions faster than the panel could possibly answer them all.";

#[tokio::test(start_paused = true)]
async fn capped_provider_chains_segments_with_frame_seeds() {
    let adapter = MockAdapter::with_clip_cap(ProviderId::MotionFrame, 10);
    adapter.script_poll(Ok(PollResult::completed(
        "https://cdn.test/seg1.mp4",
        Some("https://cdn.test/frame1.png".into()),
    )));
    adapter.script_poll(Ok(PollResult::completed(
        "https://cdn.test/seg2.mp4",
        Some("https://cdn.test/frame2.png".into()),
    )));
    adapter.script_poll(Ok(PollResult::completed(
        "https://cdn.test/seg3.mp4",
        Some("https://cdn.test/frame3.png".into()),
    )));

    let h = harness(adapter.clone(), OrchestratorConfig::default());
    let mut rx = h.orchestrator.watch();
    let mut events = h.orchestrator.subscribe();

    h.orchestrator.submit(solo_request(CHAIN_TEXT)).await.unwrap();
    let job = wait_for_status(&mut rx, JobStatus::Completed).await;

    let submits = adapter.submits();
    assert_eq!(submits.len(), 3);
    assert!(submits[0].text.starts_with("The studio lights"));
    assert!(submits[1].text.starts_with("Our host opened"));
    assert!(submits[2].text.starts_with("Viewers at home"));

    // Each clip after the first is seeded with the previous last frame.
    assert!(submits[0].seed.is_none());
    assert_eq!(submits[1].seed.as_deref(), Some("https://cdn.test/frame1.png"));
    assert_eq!(submits[2].seed.as_deref(), Some("https://cdn.test/frame2.png"));

    assert_eq!(
        job.segment_results,
        vec![
            "https://cdn.test/seg1.mp4",
            "https://cdn.test/seg2.mp4",
            "https://cdn.test/seg3.mp4",
        ]
    );
    assert_eq!(job.result_url.as_deref(), Some("https://cdn.test/seg3.mp4"));
    assert_eq!(job.cover_url.as_deref(), Some("https://cdn.test/frame3.png"));

    let segment_events: Vec<_> = drain_events(&mut events)
        .into_iter()
        .filter_map(|e| match e {
            JobEvent::SegmentCompleted { index, total, .. } => Some((index, total)),
            _ => None,
        })
        .collect();
    assert_eq!(segment_events, vec![(0, 3), (1, 3), (2, 3)]);
}

#[tokio::test(start_paused = true)]
async fn short_dialogue_on_a_capped_provider_is_not_chained() {
    let adapter = MockAdapter::with_clip_cap(ProviderId::MotionFrame, 10);
    let h = harness(adapter.clone(), OrchestratorConfig::default());
    let mut rx = h.orchestrator.watch();

    h.orchestrator.submit(solo_request("Hello world.")).await.unwrap();
    let job = wait_for_status(&mut rx, JobStatus::Completed).await;

    assert_eq!(adapter.submits().len(), 1);
    assert!(job.segment_results.is_empty());
}

// ---------------------------------------------------------------------------
// Resumption
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn resume_polls_the_existing_provider_job_without_resubmitting() {
    let adapter = MockAdapter::new(ProviderId::AvatarStudio);
    let h = harness(adapter.clone(), OrchestratorConfig::default());

    let mut job = VideoJob::draft(ProviderId::AvatarStudio, solo_strategy());
    job.id = Some("vid-9".into());
    job.status = JobStatus::Processing;
    h.store
        .save(&PersistedJob::snapshot(&job, &solo_request("Hello world.")))
        .await
        .unwrap();

    let mut rx = h.orchestrator.watch();
    assert!(h.orchestrator.resume().await.unwrap());
    let resumed = wait_for_status(&mut rx, JobStatus::Completed).await;

    assert!(adapter.submits().is_empty(), "resume must not resubmit");
    assert_eq!(adapter.polls()[0].0, "vid-9");
    assert!(resumed.result_url.is_some());
}

#[tokio::test(start_paused = true)]
async fn resume_of_a_rate_limited_job_waits_then_resubmits_with_the_seed() {
    let adapter = MockAdapter::new(ProviderId::MotionFrame);
    let h = harness(adapter.clone(), OrchestratorConfig::default());

    let mut job = VideoJob::draft(ProviderId::MotionFrame, solo_strategy());
    job.status = JobStatus::RateLimited;
    job.retry_after_secs = Some(10);
    job.continuation_seed_url = Some("https://cdn.test/persisted-seed.png".into());
    h.store
        .save(&PersistedJob::snapshot(&job, &solo_request("Hello world.")))
        .await
        .unwrap();

    let start = Instant::now();
    let mut rx = h.orchestrator.watch();
    assert!(h.orchestrator.resume().await.unwrap());
    wait_for_status(&mut rx, JobStatus::Completed).await;

    let submits = adapter.submits();
    assert_eq!(submits.len(), 1);
    assert_eq!(
        submits[0].seed.as_deref(),
        Some("https://cdn.test/persisted-seed.png")
    );
    assert!(submits[0].at.duration_since(start) >= Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn resume_continues_a_chained_job_from_the_interrupted_segment() {
    let adapter = MockAdapter::with_clip_cap(ProviderId::MotionFrame, 10);
    // Segment 2 was in flight when the process stopped; segment 3 is new.
    adapter.script_poll(Ok(PollResult::completed(
        "https://cdn.test/seg2.mp4",
        Some("https://cdn.test/frame2.png".into()),
    )));
    adapter.script_poll(Ok(PollResult::completed(
        "https://cdn.test/seg3.mp4",
        Some("https://cdn.test/frame3.png".into()),
    )));

    let h = harness(adapter.clone(), OrchestratorConfig::default());

    let mut job = VideoJob::draft(ProviderId::MotionFrame, solo_strategy());
    job.id = Some("vid-seg2".into());
    job.status = JobStatus::Processing;
    job.segment_results = vec!["https://cdn.test/seg1.mp4".into()];
    h.store
        .save(&PersistedJob::snapshot(&job, &solo_request(CHAIN_TEXT)))
        .await
        .unwrap();

    let mut rx = h.orchestrator.watch();
    assert!(h.orchestrator.resume().await.unwrap());
    let resumed = wait_for_status(&mut rx, JobStatus::Completed).await;

    // Only the final segment required a new submission, seeded with the
    // in-flight segment's last frame.
    let submits = adapter.submits();
    assert_eq!(submits.len(), 1);
    assert!(submits[0].text.starts_with("Viewers at home"));
    assert_eq!(submits[0].seed.as_deref(), Some("https://cdn.test/frame2.png"));
    assert_eq!(adapter.polls()[0].0, "vid-seg2");

    assert_eq!(
        resumed.segment_results,
        vec![
            "https://cdn.test/seg1.mp4",
            "https://cdn.test/seg2.mp4",
            "https://cdn.test/seg3.mp4",
        ]
    );
    assert_eq!(resumed.result_url.as_deref(), Some("https://cdn.test/seg3.mp4"));
}

#[tokio::test(start_paused = true)]
async fn resume_ignores_empty_and_terminal_records() {
    let adapter = MockAdapter::new(ProviderId::AvatarStudio);
    let h = harness(adapter, OrchestratorConfig::default());

    assert!(!h.orchestrator.resume().await.unwrap());

    let mut job = VideoJob::draft(ProviderId::AvatarStudio, solo_strategy());
    job.status = JobStatus::Completed;
    job.result_url = Some("https://cdn.test/done.mp4".into());
    h.store
        .save(&PersistedJob::snapshot(&job, &solo_request("Hello world.")))
        .await
        .unwrap();

    assert!(!h.orchestrator.resume().await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn resume_clears_a_record_that_never_got_a_provider_handle() {
    let adapter = MockAdapter::new(ProviderId::AvatarStudio);
    let h = harness(adapter.clone(), OrchestratorConfig::default());

    // Crashed mid-submit: no provider job id yet.
    let mut job = VideoJob::draft(ProviderId::AvatarStudio, solo_strategy());
    job.status = JobStatus::Submitting;
    h.store
        .save(&PersistedJob::snapshot(&job, &solo_request("Hello world.")))
        .await
        .unwrap();

    assert!(!h.orchestrator.resume().await.unwrap());
    assert!(h.store.load().await.unwrap().is_none());
    assert!(adapter.submits().is_empty());
}
