//! Run coordination with stale-result suppression.
//!
//! Every run request takes a fresh [`RequestToken`] from a monotonically
//! increasing counter. Loading the source may complete late and out of
//! order; when a completion arrives, its token is compared against the
//! latest one issued and anything older is dropped without running the
//! effect stages. Runs already in progress are never aborted, only their
//! results are discarded.
//!
//! Loading happens on a background thread ([`Orchestrator::submit`]) and
//! completions come back over a channel drained by
//! [`Orchestrator::recv_timeout`], which never blocks longer than the
//! given timeout. [`Orchestrator::run`] is the synchronous shortcut for
//! callers that already hold the source.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::decode::FrameLoader;
use crate::noise::{NoiseSource, SimplexNoise};
use crate::types::{EffectConfig, PipelineError, PipelineResult, RasterBuffer};

/// Identifies one run request. Later requests compare greater.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestToken(u64);

impl RequestToken {
    /// The raw counter value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// What happened to a completed request.
#[derive(Debug)]
pub enum RunOutcome {
    /// The request was the latest and its result should be presented.
    Presented {
        /// Token of the request.
        token: RequestToken,
        /// The finished buffer.
        result: PipelineResult,
    },
    /// The request was the latest but loading or processing failed.
    Failed {
        /// Token of the request.
        token: RequestToken,
        /// Why the run failed.
        error: PipelineError,
    },
    /// A newer request was issued before this one completed; the result
    /// was discarded.
    Stale {
        /// Token of the discarded request.
        token: RequestToken,
    },
}

impl RunOutcome {
    /// Token of the request this outcome belongs to.
    #[must_use]
    pub const fn token(&self) -> RequestToken {
        match self {
            Self::Presented { token, .. } | Self::Failed { token, .. } | Self::Stale { token } => {
                *token
            }
        }
    }

    /// Whether the result was discarded as stale.
    #[must_use]
    pub const fn is_stale(&self) -> bool {
        matches!(self, Self::Stale { .. })
    }
}

/// A load that finished on a background thread.
struct Completion {
    token: RequestToken,
    config: EffectConfig,
    source: Result<RasterBuffer, PipelineError>,
}

/// Coordinates pipeline runs and discards superseded results.
///
/// Holds the noise field (seeded once) and, optionally, a fixed seed for
/// the wobble generator so that repeated runs are reproducible.
pub struct Orchestrator {
    latest: AtomicU64,
    noise: Box<dyn NoiseSource>,
    seed: Option<u64>,
    completions_tx: Sender<Completion>,
    completions_rx: Receiver<Completion>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("latest", &self.latest)
            .field("seed", &self.seed)
            .finish_non_exhaustive()
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Orchestrator {
    /// Create an orchestrator with simplex noise.
    ///
    /// With `Some(seed)`, both the noise field and every run's wobble
    /// offsets are derived from it, so identical inputs give identical
    /// output. With `None`, both come from entropy.
    #[must_use]
    pub fn new(seed: Option<u64>) -> Self {
        let noise_seed = seed.unwrap_or_else(rand::random);
        Self::with_noise(seed, Box::new(SimplexNoise::new(noise_seed)))
    }

    /// Create an orchestrator with a caller-supplied noise field.
    #[must_use]
    pub fn with_noise(seed: Option<u64>, noise: Box<dyn NoiseSource>) -> Self {
        let (completions_tx, completions_rx) = mpsc::channel();
        Self {
            latest: AtomicU64::new(0),
            noise,
            seed,
            completions_tx,
            completions_rx,
        }
    }

    /// Issue a new token, superseding every earlier one.
    pub fn begin(&self) -> RequestToken {
        RequestToken(self.latest.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Whether `token` is the most recently issued one.
    #[must_use]
    pub fn is_latest(&self, token: RequestToken) -> bool {
        self.latest.load(Ordering::SeqCst) == token.0
    }

    /// Resolve a completed load for `token`.
    ///
    /// Stale tokens are discarded before any stage runs. Otherwise the
    /// effect stages run synchronously on the loaded source.
    pub fn accept(
        &self,
        token: RequestToken,
        source: Result<RasterBuffer, PipelineError>,
        config: &EffectConfig,
    ) -> RunOutcome {
        if !self.is_latest(token) {
            tracing::warn!(
                token = token.0,
                latest = self.latest.load(Ordering::SeqCst),
                "discarding stale completion"
            );
            return RunOutcome::Stale { token };
        }

        let outcome = source.and_then(|source| {
            let mut rng = self.run_rng();
            crate::process(source, config, &mut rng, self.noise.as_ref())
        });

        match outcome {
            Ok(result) => {
                tracing::debug!(token = token.0, dimensions = %result.dimensions, "run complete");
                RunOutcome::Presented { token, result }
            }
            Err(error) => {
                tracing::warn!(token = token.0, error = %error, "run failed");
                RunOutcome::Failed { token, error }
            }
        }
    }

    /// Load and process synchronously under a fresh token.
    pub fn run<L: FrameLoader + ?Sized>(&self, loader: &L, config: &EffectConfig) -> RunOutcome {
        let token = self.begin();
        self.accept(token, loader.load(), config)
    }

    /// Start loading on a background thread under a fresh token.
    ///
    /// The completion is delivered through
    /// [`recv_timeout`](Self::recv_timeout).
    pub fn submit<L: FrameLoader>(&self, loader: L, config: EffectConfig) -> RequestToken {
        let token = self.begin();
        let tx = self.completions_tx.clone();
        std::thread::spawn(move || {
            let completion = Completion {
                token,
                config,
                source: loader.load(),
            };
            if tx.send(completion).is_err() {
                tracing::debug!(token = token.0, "orchestrator dropped before load completed");
            }
        });
        tracing::debug!(token = token.0, "load submitted");
        token
    }

    /// Wait up to `timeout` for the next background completion and
    /// resolve it.
    ///
    /// Returns `None` if nothing completed in time.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<RunOutcome> {
        match self.completions_rx.recv_timeout(timeout) {
            Ok(completion) => {
                Some(self.accept(completion.token, completion.source, &completion.config))
            }
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    fn run_rng(&self) -> StdRng {
        self.seed
            .map_or_else(StdRng::from_entropy, StdRng::seed_from_u64)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::ErrorKind;

    fn source() -> RasterBuffer {
        RasterBuffer::from_fn(6, 6, |x, y| image::Rgba([(x * 40) as u8, (y * 40) as u8, 9, 255]))
    }

    #[test]
    fn tokens_increase() {
        let orch = Orchestrator::new(Some(1));
        let a = orch.begin();
        let b = orch.begin();
        assert!(b > a);
        assert!(orch.is_latest(b));
        assert!(!orch.is_latest(a));
    }

    #[test]
    fn latest_token_is_presented() {
        let orch = Orchestrator::new(Some(1));
        let token = orch.begin();
        let outcome = orch.accept(token, Ok(source()), &EffectConfig::default());
        assert!(matches!(outcome, RunOutcome::Presented { .. }));
        assert_eq!(outcome.token(), token);
    }

    #[test]
    fn older_completion_is_discarded() {
        let orch = Orchestrator::new(Some(1));
        let first = orch.begin();
        let second = orch.begin();
        let late = orch.accept(first, Ok(source()), &EffectConfig::default());
        assert!(late.is_stale());
        let fresh = orch.accept(second, Ok(source()), &EffectConfig::default());
        assert!(matches!(fresh, RunOutcome::Presented { token, .. } if token == second));
    }

    #[test]
    fn stale_failure_is_also_discarded() {
        let orch = Orchestrator::new(Some(1));
        let first = orch.begin();
        orch.begin();
        let outcome = orch.accept(first, Err(PipelineError::EmptyInput), &EffectConfig::default());
        assert!(outcome.is_stale());
    }

    #[test]
    fn load_failure_is_reported_and_token_advances() {
        let orch = Orchestrator::new(Some(1));
        let blocked = || -> Result<RasterBuffer, PipelineError> {
            Err(PipelineError::DecodeBlocked("tainted".into()))
        };
        let outcome = orch.run(&blocked, &EffectConfig::default());
        let token = outcome.token();
        assert!(matches!(
            outcome,
            RunOutcome::Failed { ref error, .. } if error.kind() == ErrorKind::DecodeBlocked
        ));

        let ok = move || -> Result<RasterBuffer, PipelineError> { Ok(source()) };
        let next = orch.run(&ok, &EffectConfig::default());
        assert!(next.token() > token);
        assert!(matches!(next, RunOutcome::Presented { .. }));
    }

    #[test]
    fn seeded_runs_are_reproducible() {
        let config = EffectConfig {
            vertex_wobble_enabled: true,
            vertex_intensity: 1.0,
            noise_scale: 0.1,
            ..EffectConfig::default()
        };
        let loader = move || -> Result<RasterBuffer, PipelineError> { Ok(source()) };
        let buffer = |outcome: RunOutcome| match outcome {
            RunOutcome::Presented { result, .. } => Some(result.buffer),
            _ => None,
        };
        let a = buffer(Orchestrator::new(Some(42)).run(&loader, &config)).unwrap();
        let b = buffer(Orchestrator::new(Some(42)).run(&loader, &config)).unwrap();
        assert_eq!(a.as_raw(), b.as_raw());
    }

    #[test]
    fn recv_timeout_returns_none_when_idle() {
        let orch = Orchestrator::new(Some(1));
        assert!(orch.recv_timeout(Duration::from_millis(10)).is_none());
    }

    #[test]
    fn background_completion_is_delivered() {
        let orch = Orchestrator::new(Some(1));
        let token = orch.submit(
            move || -> Result<RasterBuffer, PipelineError> { Ok(source()) },
            EffectConfig::default(),
        );
        let outcome = orch.recv_timeout(Duration::from_secs(10)).unwrap();
        assert_eq!(outcome.token(), token);
        assert!(matches!(outcome, RunOutcome::Presented { .. }));
    }
}
