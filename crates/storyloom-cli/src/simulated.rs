//! Seeded offline generation backend
//!
//! Produces deterministic `blob:sim/<kind>/<digest>` references and injects
//! rate limits and hard failures at configured rates, so a reading session
//! can be exercised end to end without a provider.

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use storyloom_assets::AssetKind;
use storyloom_core::{Generated, GenerationBackend, GenerationError, TokenUsage};

/// Simulation knobs
#[derive(Debug, Clone, Copy)]
pub(crate) struct SimulationConfig {
    pub(crate) seed: u64,
    pub(crate) rate_limit_rate: f64,
    pub(crate) failure_rate: f64,
    pub(crate) latency: Duration,
}

/// Backend answering from a seeded RNG
#[derive(Debug)]
pub(crate) struct SimulatedBackend {
    config: SimulationConfig,
    rng: Mutex<StdRng>,
}

impl SimulatedBackend {
    pub(crate) fn new(config: SimulationConfig) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(config.seed)),
            config,
        }
    }

    async fn generate(&self, kind: AssetKind, text: &str) -> Result<Generated, GenerationError> {
        let (rate_limited, failed, jitter) = {
            let mut rng = self.rng.lock();
            (
                rng.random_bool(self.config.rate_limit_rate),
                rng.random_bool(self.config.failure_rate),
                rng.random_range(0..=u64::try_from(self.config.latency.as_millis()).unwrap_or(u64::MAX)),
            )
        };
        tokio::time::sleep(self.config.latency + Duration::from_millis(jitter)).await;

        if rate_limited {
            return Err(GenerationError::backend(
                Some(429),
                "RESOURCE_EXHAUSTED: simulated quota exhausted",
            ));
        }
        if failed {
            return Err(GenerationError::MissingPayload(kind.suffix()));
        }

        Ok(Generated::new(payload_for(kind, text)).with_usage(usage_for(text)))
    }
}

fn payload_for(kind: AssetKind, text: &str) -> String {
    let digest = blake3::hash(text.as_bytes());
    format!("blob:sim/{kind}/{}", &digest.to_hex()[..16])
}

fn usage_for(text: &str) -> TokenUsage {
    let prompt_tokens = text.split_whitespace().count() as u64;
    let response_tokens = prompt_tokens * 4;
    TokenUsage {
        prompt_tokens,
        response_tokens,
        total_tokens: prompt_tokens + response_tokens,
    }
}

#[async_trait]
impl GenerationBackend for SimulatedBackend {
    async fn generate_image(&self, prompt: &str) -> Result<Generated, GenerationError> {
        self.generate(AssetKind::Image, prompt).await
    }

    async fn generate_speech(&self, text: &str) -> Result<Generated, GenerationError> {
        self.generate(AssetKind::Audio, text).await
    }
}
