//! Hyperparameters for the actor-critic training step, loaded the way the
//! teacher loads its `OptimizerDe`/`MetricDe` JSON fragments: every field
//! falls back to a sane default so a partially specified document still
//! produces a valid agent.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

fn default_reward_decay() -> f32 {
    10.0
}
fn default_value_decay() -> f32 {
    10.0
}
fn default_lambda() -> f32 {
    0.5
}
fn default_alpha() -> Vec<f32> {
    vec![0.1]
}
fn default_save_interval_ms() -> u64 {
    30_000
}
fn default_reward_range() -> (f32, f32) {
    (-1.0, 1.0)
}
fn default_alpha_floor() -> f32 {
    0.01
}
fn default_seed() -> u64 {
    0
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AgentConfig {
    #[serde(default = "default_reward_decay")]
    pub reward_decay: f32,
    #[serde(default = "default_value_decay")]
    pub value_decay: f32,
    #[serde(default = "default_lambda")]
    pub lambda: f32,
    /// One step factor per actor dimension, in the same order as the
    /// agent's `actor_sinks`.
    #[serde(default = "default_alpha")]
    pub alpha: Vec<f32>,
    #[serde(default = "default_save_interval_ms")]
    pub save_interval_ms: u64,
    /// `(min, max)` reward range the critic's `(-1, 1)` output denormalizes into.
    #[serde(default = "default_reward_range")]
    pub reward_range: (f32, f32),
    /// When set, each actor's `alpha` blends toward `alpha_floor` over this
    /// time constant instead of staying fixed.
    #[serde(default)]
    pub alpha_decay_tau: Option<f32>,
    #[serde(default = "default_alpha_floor")]
    pub alpha_floor: f32,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            reward_decay: default_reward_decay(),
            value_decay: default_value_decay(),
            lambda: default_lambda(),
            alpha: default_alpha(),
            save_interval_ms: default_save_interval_ms(),
            reward_range: default_reward_range(),
            alpha_decay_tau: None,
            alpha_floor: default_alpha_floor(),
            seed: default_seed(),
        }
    }
}

impl AgentConfig {
    pub fn from_json(text: &str) -> CoreResult<AgentConfig> {
        serde_json::from_str(text).map_err(|e| CoreError::SpecInvalid(format!("malformed agent config: {e}")))
    }

    pub fn to_json_pretty(&self) -> CoreResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| CoreError::Persistence(format!("failed to serialize agent config: {e}")))
    }
}
