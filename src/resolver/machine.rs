//! Pure per-image fallback state machine.
//!
//! ```text
//!  Direct ──cors──▶ (Proxy) ──▶ Direct ──anon──▶ Thumbnail ──▶ Export ──▶ Cdn ──▶ Failed
//!                                               cors → anon  cors → anon  cors → anon
//! ```
//!
//! Every candidate is tried in CORS mode first and retried in anonymous mode
//! with the same URL before the machine advances. The optional proxy hop
//! only exists for the direct candidate. Alternate endpoints are keyed off an
//! identifier extracted from the *original* reference; without one the
//! machine fails as soon as the direct candidate is exhausted.
//!
//! [`transition`] is a pure function. Drivers feed it [`ResolutionEvent`]s
//! carrying the [`AttemptToken`] of the attempt they ran; tokens from a
//! superseded attempt or generation are ignored, which is how late network
//! callbacks are kept from touching a reset machine.

use crate::pipeline::links;
use serde::{Deserialize, Serialize};
use std::fmt;

/// URL-construction approach for one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Direct,
    Thumbnail,
    Export,
    Cdn,
}

impl Strategy {
    /// Successor in the fixed fallback order; `None` after `Cdn`.
    pub fn next(self) -> Option<Strategy> {
        match self {
            Strategy::Direct => Some(Strategy::Thumbnail),
            Strategy::Thumbnail => Some(Strategy::Export),
            Strategy::Export => Some(Strategy::Cdn),
            Strategy::Cdn => None,
        }
    }

    /// Ordinal position in the fallback sequence.
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Strategy::Direct => "direct",
            Strategy::Thumbnail => "thumbnail",
            Strategy::Export => "export",
            Strategy::Cdn => "cdn",
        };
        f.write_str(s)
    }
}

/// How the current candidate is fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessMode {
    /// Cross-origin request that must come back with permissive CORS headers.
    Cors,
    /// The direct candidate routed through the rewriting proxy.
    Proxied,
    /// Plain request; renders, but taints capture surfaces.
    Anonymous,
}

impl AccessMode {
    pub fn is_cors(self) -> bool {
        matches!(self, AccessMode::Cors | AccessMode::Proxied)
    }
}

/// What the image is used for; decides the placeholder and failure reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageRole {
    Product,
    Logo,
    Cover,
}

impl ImageRole {
    /// Text drawn in place of an image that could not be resolved.
    pub fn placeholder(self) -> &'static str {
        match self {
            ImageRole::Logo => "LOGO",
            ImageRole::Product | ImageRole::Cover => "No Image",
        }
    }

    /// Logos degrade silently; everything else is reported.
    pub fn reports_failure(self) -> bool {
        !matches!(self, ImageRole::Logo)
    }
}

/// Debug information handed to the host when an image is exhausted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureReport {
    pub original_reference: String,
    pub extracted_id: Option<String>,
}

/// Identifies one attempt of one generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttemptToken {
    pub generation: u64,
    pub step: u32,
}

/// Where the machine is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Attempting,
    Loaded,
    Failed,
}

/// Fallback settings shared by every machine of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionPlan {
    /// Base of the rewriting proxy; `None` skips the proxy hop.
    pub proxy_base: Option<String>,
}

/// Inputs to [`transition`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionEvent {
    /// The attempt identified by `token` rendered.
    Loaded { token: AttemptToken },
    /// The attempt identified by `token` failed. `cache_buster` is embedded in
    /// the next candidate when the machine moves to an endpoint that needs one.
    Failed {
        token: AttemptToken,
        cache_buster: String,
    },
    /// The owning element now shows a different reference.
    SourceChanged { reference: String },
}

/// A fetch the driver should perform next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    pub url: String,
    pub mode: AccessMode,
    pub strategy: Strategy,
    pub token: AttemptToken,
}

/// Per-image resolution state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageResolutionState {
    pub original_reference: String,
    pub role: ImageRole,
    pub extracted_id: Option<String>,
    pub current_candidate_url: String,
    pub strategy: Strategy,
    pub mode: AccessMode,
    pub phase: Phase,
    pub generation: u64,
    pub step: u32,
    plan: ResolutionPlan,
}

impl ImageResolutionState {
    /// Initial state for `reference`. An empty reference starts out failed.
    pub fn new(reference: &str, role: ImageRole, plan: ResolutionPlan, generation: u64) -> Self {
        let reference = reference.trim().to_string();
        let extracted_id = links::extract_identifier(&reference).map(str::to_string);
        let phase = if reference.is_empty() {
            Phase::Failed
        } else {
            Phase::Attempting
        };
        Self {
            current_candidate_url: reference.clone(),
            original_reference: reference,
            role,
            extracted_id,
            strategy: Strategy::Direct,
            mode: AccessMode::Cors,
            phase,
            generation,
            step: 0,
            plan,
        }
    }

    pub fn token(&self) -> AttemptToken {
        AttemptToken {
            generation: self.generation,
            step: self.step,
        }
    }

    /// Ordinal of the current strategy; never decreases within a generation.
    pub fn strategy_index(&self) -> usize {
        self.strategy.index()
    }

    pub fn is_terminal(&self) -> bool {
        self.phase != Phase::Attempting
    }

    pub fn is_failed(&self) -> bool {
        self.phase == Phase::Failed
    }

    pub fn is_loaded(&self) -> bool {
        self.phase == Phase::Loaded
    }

    /// The fetch to run, while the machine is still attempting.
    pub fn current_request(&self) -> Option<LoadRequest> {
        (self.phase == Phase::Attempting).then(|| LoadRequest {
            url: self.current_candidate_url.clone(),
            mode: self.mode,
            strategy: self.strategy,
            token: self.token(),
        })
    }

    /// Report owed to the host once this state has failed.
    ///
    /// `None` for logos and for empty references.
    pub fn failure_report(&self) -> Option<FailureReport> {
        (self.is_failed() && self.role.reports_failure() && !self.original_reference.is_empty())
            .then(|| FailureReport {
                original_reference: self.original_reference.clone(),
                extracted_id: self.extracted_id.clone(),
            })
    }

    fn accepts(&self, token: AttemptToken) -> bool {
        self.phase == Phase::Attempting && token == self.token()
    }

    fn retry_with(&self, url: String, strategy: Strategy, mode: AccessMode) -> Self {
        Self {
            current_candidate_url: url,
            strategy,
            mode,
            step: self.step + 1,
            ..self.clone()
        }
    }

    fn settle(&self, phase: Phase) -> Self {
        Self {
            phase,
            ..self.clone()
        }
    }

    fn after_failure(&self, cache_buster: &str) -> Self {
        match (self.strategy, self.mode) {
            (Strategy::Direct, AccessMode::Cors) => match self.plan.proxy_base.as_deref() {
                Some(base) => self.retry_with(
                    links::proxy_url(base, &self.original_reference),
                    Strategy::Direct,
                    AccessMode::Proxied,
                ),
                None => self.retry_with(
                    self.original_reference.clone(),
                    Strategy::Direct,
                    AccessMode::Anonymous,
                ),
            },
            (Strategy::Direct, AccessMode::Proxied) => self.retry_with(
                self.original_reference.clone(),
                Strategy::Direct,
                AccessMode::Anonymous,
            ),
            (strategy, AccessMode::Cors) => self.retry_with(
                self.current_candidate_url.clone(),
                strategy,
                AccessMode::Anonymous,
            ),
            (strategy, _) => self.advance(strategy, cache_buster),
        }
    }

    fn advance(&self, from: Strategy, cache_buster: &str) -> Self {
        let (Some(id), Some(next)) = (self.extracted_id.as_deref(), from.next()) else {
            return self.settle(Phase::Failed);
        };
        let url = match next {
            Strategy::Thumbnail => links::thumbnail_url(id, cache_buster),
            Strategy::Export => links::export_url(id, cache_buster),
            Strategy::Cdn => links::cdn_url(id),
            Strategy::Direct => return self.settle(Phase::Failed),
        };
        self.retry_with(url, next, AccessMode::Cors)
    }
}

/// Apply `event` to `state`.
///
/// Events for another generation or an earlier attempt, and any attempt
/// event after the machine settled, return the state unchanged.
/// `SourceChanged` always resets to a fresh machine of the next generation.
pub fn transition(state: &ImageResolutionState, event: ResolutionEvent) -> ImageResolutionState {
    match event {
        ResolutionEvent::SourceChanged { reference } => ImageResolutionState::new(
            &reference,
            state.role,
            state.plan.clone(),
            state.generation + 1,
        ),
        ResolutionEvent::Loaded { token } if state.accepts(token) => state.settle(Phase::Loaded),
        ResolutionEvent::Failed {
            token,
            cache_buster,
        } if state.accepts(token) => state.after_failure(&cache_buster),
        _ => state.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "1AbCdEfGhIjKlMnOpQrStUvWxYz0123"; // 31 chars

    fn drive_ref() -> String {
        format!("https://drive.google.com/file/d/{ID}/view")
    }

    fn fail(state: &ImageResolutionState, cb: &str) -> ImageResolutionState {
        transition(
            state,
            ResolutionEvent::Failed {
                token: state.token(),
                cache_buster: cb.to_string(),
            },
        )
    }

    #[test]
    fn full_fallback_walk_reaches_failed() {
        let s0 = ImageResolutionState::new(&drive_ref(), ImageRole::Product, ResolutionPlan::default(), 0);
        assert_eq!(s0.mode, AccessMode::Cors);
        assert_eq!(s0.current_candidate_url, drive_ref());

        let s1 = fail(&s0, "t1");
        assert_eq!((s1.strategy, s1.mode), (Strategy::Direct, AccessMode::Anonymous));
        assert_eq!(s1.current_candidate_url, drive_ref());

        let s2 = fail(&s1, "t2");
        assert_eq!((s2.strategy, s2.mode), (Strategy::Thumbnail, AccessMode::Cors));
        assert_eq!(s2.current_candidate_url, links::thumbnail_url(ID, "t2"));

        // Anonymous retry keeps the exact candidate, including its cache buster.
        let s3 = fail(&s2, "t3");
        assert_eq!(s3.mode, AccessMode::Anonymous);
        assert_eq!(s3.current_candidate_url, links::thumbnail_url(ID, "t2"));

        let s4 = fail(&s3, "t4");
        assert_eq!(s4.strategy, Strategy::Export);
        assert_eq!(s4.current_candidate_url, links::export_url(ID, "t4"));

        let s6 = fail(&fail(&s4, "t5"), "t6");
        assert_eq!(s6.strategy, Strategy::Cdn);
        assert_eq!(s6.current_candidate_url, links::cdn_url(ID));

        let s8 = fail(&fail(&s6, "t7"), "t8");
        assert!(s8.is_failed());
        assert_eq!(
            s8.failure_report(),
            Some(FailureReport {
                original_reference: drive_ref(),
                extracted_id: Some(ID.to_string()),
            })
        );
        assert!(s8.current_request().is_none());
    }

    #[test]
    fn strategy_index_never_decreases() {
        let mut s = ImageResolutionState::new(&drive_ref(), ImageRole::Product, ResolutionPlan::default(), 0);
        let mut last = s.strategy_index();
        let mut n = 0;
        while !s.is_terminal() {
            s = fail(&s, &n.to_string());
            assert!(s.strategy_index() >= last);
            last = s.strategy_index();
            n += 1;
        }
        assert_eq!(n, 8);
    }

    #[test]
    fn no_identifier_fails_after_direct() {
        let s0 = ImageResolutionState::new("https://shop.sa/x.png", ImageRole::Product, ResolutionPlan::default(), 0);
        let s2 = fail(&fail(&s0, "a"), "b");
        assert!(s2.is_failed());
        assert_eq!(s2.failure_report().unwrap().extracted_id, None);
    }

    #[test]
    fn logo_failure_is_silent() {
        let s0 = ImageResolutionState::new("https://shop.sa/x.png", ImageRole::Logo, ResolutionPlan::default(), 0);
        let s = fail(&fail(&s0, "a"), "b");
        assert!(s.is_failed());
        assert!(s.failure_report().is_none());
        assert_eq!(s.role.placeholder(), "LOGO");
    }

    #[test]
    fn empty_reference_starts_failed_without_report() {
        let s = ImageResolutionState::new("  ", ImageRole::Product, ResolutionPlan::default(), 0);
        assert!(s.is_failed());
        assert!(s.failure_report().is_none());
        assert!(s.current_request().is_none());
    }

    #[test]
    fn proxy_hop_between_cors_and_anonymous_direct() {
        let plan = ResolutionPlan {
            proxy_base: Some("https://images.weserv.nl/".into()),
        };
        let s0 = ImageResolutionState::new("https://a.co/x.png", ImageRole::Cover, plan, 0);
        let s1 = fail(&s0, "a");
        assert_eq!(s1.mode, AccessMode::Proxied);
        assert!(s1.current_candidate_url.starts_with("https://images.weserv.nl/?url="));
        assert!(s1.mode.is_cors());
        let s2 = fail(&s1, "b");
        assert_eq!(s2.mode, AccessMode::Anonymous);
        assert_eq!(s2.current_candidate_url, "https://a.co/x.png");
    }

    #[test]
    fn stale_tokens_are_ignored() {
        let s0 = ImageResolutionState::new(&drive_ref(), ImageRole::Product, ResolutionPlan::default(), 0);
        let old = s0.token();
        let s1 = fail(&s0, "a");
        let same = transition(&s1, ResolutionEvent::Loaded { token: old });
        assert_eq!(same, s1);
        let same = transition(
            &s1,
            ResolutionEvent::Failed {
                token: old,
                cache_buster: "x".into(),
            },
        );
        assert_eq!(same, s1);
    }

    #[test]
    fn loaded_is_terminal() {
        let s0 = ImageResolutionState::new(&drive_ref(), ImageRole::Product, ResolutionPlan::default(), 0);
        let s1 = transition(&s0, ResolutionEvent::Loaded { token: s0.token() });
        assert!(s1.is_loaded());
        assert!(s1.failure_report().is_none());
        // Nothing moves a settled machine except a new source.
        assert_eq!(fail(&s1, "z"), s1);
    }

    #[test]
    fn source_change_resets_everything() {
        let s0 = ImageResolutionState::new(&drive_ref(), ImageRole::Product, ResolutionPlan::default(), 0);
        let s3 = fail(&fail(&fail(&s0, "a"), "b"), "c");
        let old_token = s3.token();
        let r = transition(
            &s3,
            ResolutionEvent::SourceChanged {
                reference: "https://a.co/new.png".into(),
            },
        );
        assert_eq!(r.generation, 1);
        assert_eq!(r.step, 0);
        assert_eq!(r.strategy, Strategy::Direct);
        assert_eq!(r.mode, AccessMode::Cors);
        assert_eq!(r.extracted_id, None);
        assert_eq!(r.role, ImageRole::Product);
        // A late failure from the previous generation cannot move it.
        let late = transition(
            &r,
            ResolutionEvent::Failed {
                token: old_token,
                cache_buster: "late".into(),
            },
        );
        assert_eq!(late, r);
    }
}
