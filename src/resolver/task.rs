//! Drivers that run the pure machine against a real [`ImageLoader`].
//!
//! [`ImageResolver::resolve`] walks one machine to a terminal state inline.
//! [`ImageResolver::spawn`] hands the machine to a tokio task that owns it;
//! the returned [`ImageHandle`] can swap the source at any time. Each attempt
//! runs as its own task and reports back over a channel tagged with its
//! [`AttemptToken`], so a result that arrives after a reset is dropped by
//! [`transition`] instead of mutating the new generation.

use crate::config::CatalogConfig;
use crate::error::CatalogError;
use crate::pipeline::encode;
use crate::progress::ProgressCallback;
use crate::resolver::loader::{HttpImageLoader, ImageLoader, LoadedImage};
use crate::resolver::machine::{
    transition, AccessMode, FailureReport, ImageResolutionState, ImageRole, LoadRequest,
    ResolutionEvent, ResolutionPlan, Strategy,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Final result for one image instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageOutcome {
    /// Caller-chosen identifier, e.g. `product:<id>:image`.
    pub key: String,
    pub role: ImageRole,
    pub original_reference: String,
    /// URL that rendered, or a `data:` URI when inlining is on.
    pub resolved_url: Option<String>,
    pub strategy: Option<Strategy>,
    pub mode: Option<AccessMode>,
    /// Safe for a capture surface: loaded over CORS or inlined.
    pub capture_safe: bool,
    /// Fetches performed in the settling generation.
    pub attempts: u32,
    pub generation: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureReport>,
}

impl ImageOutcome {
    pub fn is_loaded(&self) -> bool {
        self.resolved_url.is_some()
    }

    /// What to draw: the resolved URL or the role placeholder text.
    pub fn display(&self) -> &str {
        self.resolved_url
            .as_deref()
            .unwrap_or_else(|| self.role.placeholder())
    }
}

/// Runs image-resolution machines.
#[derive(Clone)]
pub struct ImageResolver {
    loader: Arc<dyn ImageLoader>,
    plan: ResolutionPlan,
    inline: bool,
    callback: Option<ProgressCallback>,
}

impl ImageResolver {
    pub fn new(loader: Arc<dyn ImageLoader>, config: &CatalogConfig) -> Self {
        Self {
            loader,
            plan: ResolutionPlan {
                proxy_base: config.proxy_base.clone(),
            },
            inline: config.inline_images,
            callback: config.progress_callback.clone(),
        }
    }

    /// Resolver backed by [`HttpImageLoader`].
    pub fn from_config(config: &CatalogConfig) -> Result<Self, CatalogError> {
        Ok(Self::new(Arc::new(HttpImageLoader::new(config)?), config))
    }

    pub(crate) fn callback(&self) -> Option<&ProgressCallback> {
        self.callback.as_ref()
    }

    /// Drive one machine to a terminal state.
    pub async fn resolve(&self, key: &str, reference: &str, role: ImageRole) -> ImageOutcome {
        let mut state = ImageResolutionState::new(reference, role, self.plan.clone(), 0);
        if let Some(outcome) = self.preloaded(key, &state) {
            return outcome;
        }
        if let Some(cb) = &self.callback {
            cb.on_image_start(key);
        }

        let mut loaded = None;
        while let Some(request) = state.current_request() {
            let (event, image) = attempt(self.loader.as_ref(), &request).await;
            let next = transition(&state, event);
            if next.is_loaded() {
                loaded = image;
            }
            state = next;
        }
        self.settle(key, &state, loaded)
    }

    /// Start a long-lived machine owned by a background task.
    pub fn spawn(&self, key: impl Into<String>, reference: &str, role: ImageRole) -> ImageHandle {
        let key = key.into();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (outcome_tx, outcome_rx) = watch::channel(None);
        let state = ImageResolutionState::new(reference, role, self.plan.clone(), 0);

        let actor = Actor {
            resolver: self.clone(),
            key,
            outcome: outcome_tx,
        };
        let task = tokio::spawn(actor.run(state, commands_rx));

        ImageHandle {
            commands: commands_tx,
            outcome: outcome_rx,
            generation: 0,
            task,
        }
    }

    /// Short-circuit for references that need no network at all.
    fn preloaded(&self, key: &str, state: &ImageResolutionState) -> Option<ImageOutcome> {
        if encode::is_data_uri(&state.original_reference) {
            return Some(ImageOutcome {
                key: key.to_string(),
                role: state.role,
                original_reference: state.original_reference.clone(),
                resolved_url: Some(state.original_reference.clone()),
                strategy: Some(Strategy::Direct),
                mode: None,
                capture_safe: true,
                attempts: 0,
                generation: state.generation,
                failure: None,
            });
        }
        if state.is_failed() {
            return Some(self.settle(key, state, None));
        }
        None
    }

    /// Build the outcome for a terminal state and fire the matching callback.
    fn settle(&self, key: &str, state: &ImageResolutionState, image: Option<LoadedImage>) -> ImageOutcome {
        let attempts = if state.original_reference.is_empty() {
            0
        } else {
            state.step + 1
        };
        let mut outcome = ImageOutcome {
            key: key.to_string(),
            role: state.role,
            original_reference: state.original_reference.clone(),
            resolved_url: None,
            strategy: None,
            mode: None,
            capture_safe: false,
            attempts,
            generation: state.generation,
            failure: state.failure_report(),
        };

        if state.is_loaded() {
            let inlined = match (&image, self.inline) {
                (Some(img), true) => Some(encode::to_data_uri(img)),
                _ => None,
            };
            outcome.capture_safe = inlined.is_some() || state.mode.is_cors();
            outcome.resolved_url = Some(inlined.unwrap_or_else(|| state.current_candidate_url.clone()));
            outcome.strategy = Some(state.strategy);
            outcome.mode = Some(state.mode);
            debug!(
                "Image {} loaded via {} ({:?}) after {} attempts",
                key, state.strategy, state.mode, attempts
            );
            if let Some(cb) = &self.callback {
                cb.on_image_loaded(key, state.strategy);
            }
        } else if let Some(report) = &outcome.failure {
            warn!(
                "Image {} exhausted every strategy (reference: {}, id: {:?})",
                key, report.original_reference, report.extracted_id
            );
            if let Some(cb) = &self.callback {
                cb.on_image_failed(key, report);
            }
        } else {
            debug!("Image {} settled on placeholder '{}'", key, state.role.placeholder());
        }
        outcome
    }
}

/// Run one fetch and translate its result into a machine event.
async fn attempt(loader: &dyn ImageLoader, request: &LoadRequest) -> (ResolutionEvent, Option<LoadedImage>) {
    match loader.load(request).await {
        Ok(image) => (ResolutionEvent::Loaded { token: request.token }, Some(image)),
        Err(e) => {
            debug!(
                "Attempt {:?} ({} / {:?}) failed: {}",
                request.token, request.strategy, request.mode, e
            );
            (
                ResolutionEvent::Failed {
                    token: request.token,
                    cache_buster: cache_buster(),
                },
                None,
            )
        }
    }
}

/// Millisecond timestamp plus a process-wide counter, so two transitions in
/// the same millisecond still get distinct tokens.
fn cache_buster() -> String {
    static SEQ: AtomicU64 = AtomicU64::new(0);
    let seq = SEQ.fetch_add(1, Ordering::Relaxed) % 1000;
    format!("{}{:03}", chrono::Utc::now().timestamp_millis(), seq)
}

enum Command {
    SetSource(String),
}

type AttemptResult = (ResolutionEvent, Option<LoadedImage>);

struct Actor {
    resolver: ImageResolver,
    key: String,
    outcome: watch::Sender<Option<ImageOutcome>>,
}

impl Actor {
    async fn run(self, mut state: ImageResolutionState, mut commands: mpsc::UnboundedReceiver<Command>) {
        let (results_tx, mut results_rx) = mpsc::unbounded_channel::<AttemptResult>();
        let mut in_flight = self.begin(&state, &results_tx);

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::SetSource(reference)) => {
                        if let Some(task) = in_flight.take() {
                            task.abort();
                        }
                        state = transition(&state, ResolutionEvent::SourceChanged { reference });
                        debug!("Image {} reset to generation {}", self.key, state.generation);
                        in_flight = self.begin(&state, &results_tx);
                    }
                    None => break,
                },
                Some((event, image)) = results_rx.recv() => {
                    let next = transition(&state, event);
                    if next == state {
                        warn!("Image {}: discarded stale attempt result", self.key);
                        continue;
                    }
                    state = next;
                    in_flight = if state.is_terminal() {
                        let loaded = if state.is_loaded() { image } else { None };
                        let outcome = self.resolver.settle(&self.key, &state, loaded);
                        self.outcome.send_replace(Some(outcome));
                        None
                    } else {
                        self.launch(&state, &results_tx)
                    };
                }
            }
        }

        if let Some(task) = in_flight {
            task.abort();
        }
    }

    /// Enter a fresh generation: publish immediately if nothing needs
    /// fetching, otherwise launch the first attempt.
    fn begin(&self, state: &ImageResolutionState, tx: &mpsc::UnboundedSender<AttemptResult>) -> Option<JoinHandle<()>> {
        if let Some(outcome) = self.resolver.preloaded(&self.key, state) {
            self.outcome.send_replace(Some(outcome));
            return None;
        }
        if let Some(cb) = self.resolver.callback() {
            cb.on_image_start(&self.key);
        }
        self.launch(state, tx)
    }

    fn launch(&self, state: &ImageResolutionState, tx: &mpsc::UnboundedSender<AttemptResult>) -> Option<JoinHandle<()>> {
        let request = state.current_request()?;
        let loader = Arc::clone(&self.resolver.loader);
        let tx = tx.clone();
        Some(tokio::spawn(async move {
            let result = attempt(loader.as_ref(), &request).await;
            let _ = tx.send(result);
        }))
    }
}

/// Handle to a spawned image machine.
///
/// Dropping the handle stops the machine and aborts any in-flight fetch.
pub struct ImageHandle {
    commands: mpsc::UnboundedSender<Command>,
    outcome: watch::Receiver<Option<ImageOutcome>>,
    generation: u64,
    task: JoinHandle<()>,
}

impl ImageHandle {
    /// Point the element at a new reference: full reset, in-flight result discarded.
    pub fn set_source(&mut self, reference: impl Into<String>) {
        if self.commands.send(Command::SetSource(reference.into())).is_ok() {
            self.generation += 1;
        }
    }

    /// Wait for the current source to settle.
    ///
    /// Returns `None` only if the machine task is gone.
    pub async fn settled(&mut self) -> Option<ImageOutcome> {
        let generation = self.generation;
        let guard = self
            .outcome
            .wait_for(|o| o.as_ref().is_some_and(|o| o.generation == generation))
            .await
            .ok()?;
        guard.clone()
    }

    /// Latest settled outcome of any generation, without waiting.
    pub fn latest(&self) -> Option<ImageOutcome> {
        self.outcome.borrow().clone()
    }
}

impl Drop for ImageHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
