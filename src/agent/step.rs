//! Glue for a single `(s0, action, reward, s1, dt)` transition: runs the
//! trunk forward on both observations, derives the TD error, builds the
//! critic and actor labels, and drives one `TDNetwork::train` call.

use std::collections::HashMap;

use log::{debug, warn};

use crate::agent::actor::{self, ActorLabel};
use crate::agent::config::AgentConfig;
use crate::agent::{blend, critic};
use crate::error::{CoreError, CoreResult};
use crate::kpi::KpiSink;
use crate::network::TDNetwork;
use crate::state::NetworkState;
use crate::tensor::Tensor;

/// Persists across steps: the running average reward and the current
/// per-actor step factors (mutated in place only by [`train_step`]'s alpha
/// decay, never reset between steps).
#[derive(Clone, Debug, PartialEq)]
pub struct AgentRuntime {
    pub avg: f32,
    pub alphas: Vec<f32>,
}

impl AgentRuntime {
    pub fn new(config: &AgentConfig) -> AgentRuntime {
        AgentRuntime {
            avg: 0.0,
            alphas: config.alpha.clone(),
        }
    }
}

pub struct StepInput {
    pub s0: HashMap<String, Tensor>,
    pub s1: HashMap<String, Tensor>,
    /// One sampled action index per entry of `actor_sinks`, same order.
    pub actions: Vec<usize>,
    pub reward: f32,
    pub dt: f32,
}

pub struct StepOutcome {
    pub delta: f32,
    pub v0: f32,
    pub v1: f32,
    pub v0_star: f32,
}

/// Runs one actor-critic training step against `state`, replacing it with
/// the post-train state on success. `state` is left untouched if any part
/// of the step fails.
pub fn train_step(
    network: &TDNetwork,
    state: &mut NetworkState,
    runtime: &mut AgentRuntime,
    config: &AgentConfig,
    critic_sink: &str,
    actor_sinks: &[String],
    input: &StepInput,
    kpi: &mut dyn KpiSink,
) -> CoreResult<StepOutcome> {
    if input.actions.len() != actor_sinks.len() {
        return Err(CoreError::SpecInvalid(format!(
            "expected {} actions, found {}",
            actor_sinks.len(),
            input.actions.len()
        )));
    }
    if runtime.alphas.len() != actor_sinks.len() {
        return Err(CoreError::SpecInvalid(format!(
            "expected {} alpha factors, found {}",
            actor_sinks.len(),
            runtime.alphas.len()
        )));
    }

    let mut lookahead = state.deep_dup();
    for (name, tensor) in &input.s1 {
        lookahead.put_values(name, tensor.clone());
    }
    network.forward(&mut lookahead, false)?;
    let v1_hat = lookahead
        .values(critic_sink)
        .ok_or_else(|| CoreError::SpecInvalid(format!("critic sink '{critic_sink}' produced no values")))?
        .clone();
    let v1 = critic::denormalize(&v1_hat, config.reward_range)?;

    let mut working = state.deep_dup();
    for (name, tensor) in &input.s0 {
        working.put_values(name, tensor.clone());
    }
    network.forward(&mut working, false)?;
    let v0_hat = working
        .values(critic_sink)
        .ok_or_else(|| CoreError::SpecInvalid(format!("critic sink '{critic_sink}' produced no values")))?
        .clone();
    let v0 = critic::denormalize(&v0_hat, config.reward_range)?;

    let target = v1 + input.reward - runtime.avg;
    let v0_star = blend(runtime.avg, target, input.dt / config.value_decay);
    let delta = v0_star - v0;
    let new_avg = blend(runtime.avg, input.reward, input.dt / config.reward_decay);

    let critic_label = critic::normalize(v0_star, config.reward_range);
    let critic_grad = Tensor::from_scalar(critic_label).sub(&v0_hat)?;
    working.accumulate_grads(critic_sink, critic_grad)?;

    let mut alpha_star = runtime.alphas.clone();
    for (i, sink) in actor_sinks.iter().enumerate() {
        let probs = working
            .values(sink)
            .ok_or_else(|| CoreError::SpecInvalid(format!("actor sink '{sink}' produced no values")))?
            .clone();
        let ActorLabel { h, h_star, alpha_star: next_alpha } =
            actor::compute_labels(&probs, input.actions[i], runtime.alphas[i], input.dt, config.alpha_decay_tau, config.alpha_floor)?;
        kpi.emit(&format!("{sink}.h"), &h);
        kpi.emit(&format!("{sink}.h_star"), &h_star);
        working.accumulate_grads(sink, h_star)?;
        alpha_star[i] = next_alpha;
    }

    if !delta.is_finite() {
        warn!("TD error went non-finite (v0={v0}, v1={v1}, v0_star={v0_star})");
    }

    let delta_tensor = Tensor::from_scalar(delta);
    network.train(&mut working, &delta_tensor, config.lambda, kpi)?;

    runtime.avg = new_avg;
    runtime.alphas = alpha_star.clone();

    debug!("train_step: delta={delta} v0={v0} v1={v1} new_average={new_avg}");
    kpi.emit_scalar("score", input.reward);
    kpi.emit_scalar("delta", delta);
    kpi.emit_scalar("new_average", new_avg);
    kpi.emit_scalar("v0_star", v0_star);
    kpi.emit_scalar("j0", v0);
    kpi.emit_scalar("j1", v1);
    for (sink, a) in actor_sinks.iter().zip(alpha_star.iter()) {
        kpi.emit_scalar(&format!("{sink}.alpha_star"), *a);
    }

    *state = working;
    Ok(StepOutcome { delta, v0, v1, v0_star })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kpi::RecordingKpiSink;
    use crate::layers::{LayerDescriptor, LayerKind};

    fn tiny_network() -> TDNetwork {
        let layers = vec![
            LayerDescriptor::new(
                "trunk",
                LayerKind::Dense {
                    in_size: 2,
                    out_size: 2,
                    max_abs_weights: 10.0,
                    drop_out: 1.0,
                },
                vec!["x".into()],
            ),
            LayerDescriptor::new(
                "critic",
                LayerKind::Dense {
                    in_size: 2,
                    out_size: 1,
                    max_abs_weights: 10.0,
                    drop_out: 1.0,
                },
                vec!["trunk".into()],
            ),
            LayerDescriptor::new("critic_out", LayerKind::Tanh, vec!["critic".into()]),
            LayerDescriptor::new(
                "policy",
                LayerKind::Dense {
                    in_size: 2,
                    out_size: 2,
                    max_abs_weights: 10.0,
                    drop_out: 1.0,
                },
                vec!["trunk".into()],
            ),
            LayerDescriptor::new("policy_out", LayerKind::Softmax { temperature: 1.0 }, vec!["policy".into()]),
        ];
        let sizes = [("x", 2), ("trunk", 2), ("critic", 1), ("critic_out", 1), ("policy", 2), ("policy_out", 2)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        TDNetwork::build(layers, sizes).unwrap()
    }

    #[test]
    fn train_step_updates_runtime_and_parameters() {
        let _ = env_logger::builder().is_test(true).try_init();
        let network = tiny_network();
        let mut state = NetworkState::new(42);
        network.init(&mut state).unwrap();

        let config = AgentConfig::default();
        let mut runtime = AgentRuntime::new(&config);

        let mut s0 = HashMap::new();
        s0.insert("x".to_string(), Tensor::from_rows(vec![vec![0.1, -0.2]]).unwrap());
        let mut s1 = HashMap::new();
        s1.insert("x".to_string(), Tensor::from_rows(vec![vec![0.2, -0.1]]).unwrap());

        let input = StepInput {
            s0,
            s1,
            actions: vec![0],
            reward: 1.0,
            dt: 1.0,
        };

        let before = state.weights("trunk").unwrap().clone();
        let mut kpi = RecordingKpiSink::new();
        let outcome = train_step(
            &network,
            &mut state,
            &mut runtime,
            &config,
            "critic_out",
            &["policy_out".to_string()],
            &input,
            &mut kpi,
        )
        .unwrap();

        assert!(outcome.delta.is_finite());
        assert_ne!(state.weights("trunk").unwrap(), &before);
        assert!(kpi.get("delta").is_some());
        assert_eq!(kpi.get("score").unwrap().to_scalar().unwrap(), 1.0);
        assert_ne!(runtime.avg, 0.0);

        // S7 self-consistency: shapes hold, weights stayed finite and within
        // the configured clip, every parameter tensor is still finite.
        for name in ["trunk", "critic", "policy"] {
            let w = state.weights(name).unwrap();
            assert!(w.is_finite());
            assert!(w.max_abs() <= 10.0 + 1e-5);
            assert!(state.bias(name).unwrap().is_finite());
        }
    }

    #[test]
    fn train_step_rejects_mismatched_action_count() {
        let network = tiny_network();
        let mut state = NetworkState::new(1);
        network.init(&mut state).unwrap();
        let config = AgentConfig::default();
        let mut runtime = AgentRuntime::new(&config);
        let input = StepInput {
            s0: HashMap::new(),
            s1: HashMap::new(),
            actions: vec![],
            reward: 0.0,
            dt: 1.0,
        };
        let mut kpi = crate::kpi::NullKpiSink;
        assert!(train_step(&network, &mut state, &mut runtime, &config, "critic_out", &["policy_out".to_string()], &input, &mut kpi).is_err());
    }
}
