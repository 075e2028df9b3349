//! Discrete actor head: action sampling and the policy-gradient label fed
//! back into the trunk's softmax sink.

use rand::rngs::StdRng;
use rand::Rng;

use crate::agent::blend;
use crate::error::{CoreError, CoreResult};
use crate::tensor::Tensor;

/// Samples an index from a `(1, n)` probability row via inverse-CDF.
pub fn sample_action(probs: &Tensor, rng: &mut StdRng) -> CoreResult<usize> {
    if probs.rows() != 1 {
        return Err(CoreError::shape_mismatch(vec![1, probs.cols()], vec![probs.rows(), probs.cols()]));
    }
    let draw: f32 = rng.gen();
    let row = probs.as_array2();
    let mut cumulative = 0.0;
    for (i, &p) in row.row(0).iter().enumerate() {
        cumulative += p;
        if draw < cumulative {
            return Ok(i);
        }
    }
    Ok(row.ncols() - 1)
}

pub struct ActorLabel {
    /// Raw preference gradient `1[j = a] - pi_j`, before the `alpha` scale.
    pub h: Tensor,
    /// `alpha * h`, the gradient handed to `TDNetwork::train` for this sink.
    pub h_star: Tensor,
    pub alpha_star: f32,
}

/// `h_j = 1[j = a] - pi_j`, `h*_j = alpha * h_j`. `alpha*` stays fixed unless
/// `alpha_decay_tau` is set, in which case it blends toward `alpha_floor`
/// over that time constant.
pub fn compute_labels(
    probs: &Tensor,
    action: usize,
    alpha: f32,
    dt: f32,
    alpha_decay_tau: Option<f32>,
    alpha_floor: f32,
) -> CoreResult<ActorLabel> {
    if probs.rows() != 1 {
        return Err(CoreError::shape_mismatch(vec![1, probs.cols()], vec![probs.rows(), probs.cols()]));
    }
    let n = probs.cols();
    if action >= n {
        return Err(CoreError::SpecInvalid(format!("action index {action} out of range for {n} outcomes")));
    }

    let row = probs.as_array2();
    let h: Vec<f32> = (0..n)
        .map(|j| (if j == action { 1.0 } else { 0.0 }) - row[[0, j]])
        .collect();
    let h_star: Vec<f32> = h.iter().map(|v| alpha * v).collect();

    let alpha_star = match alpha_decay_tau {
        Some(tau) if tau > 0.0 => blend(alpha, alpha_floor, dt / tau),
        _ => alpha,
    };

    Ok(ActorLabel {
        h: Tensor::from_rows(vec![h])?,
        h_star: Tensor::from_rows(vec![h_star])?,
        alpha_star,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn sample_action_picks_deterministically_for_a_fixed_seed() {
        let probs = Tensor::from_rows(vec![vec![0.1, 0.2, 0.7]]).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let a = sample_action(&probs, &mut rng).unwrap();
        assert!(a < 3);
    }

    #[test]
    fn compute_labels_is_zero_at_the_sampled_action_when_probability_is_one() {
        let probs = Tensor::from_rows(vec![vec![0.0, 1.0]]).unwrap();
        let label = compute_labels(&probs, 1, 1.0, 1.0, None, 0.01).unwrap();
        assert!((label.h.as_array2()[[0, 1]]).abs() < 1e-6);
        assert_eq!(label.alpha_star, 1.0);
    }

    #[test]
    fn compute_labels_scales_by_alpha() {
        let probs = Tensor::from_rows(vec![vec![0.5, 0.5]]).unwrap();
        let label = compute_labels(&probs, 0, 0.1, 1.0, None, 0.01).unwrap();
        assert!((label.h_star.as_array2()[[0, 0]] - 0.05).abs() < 1e-6);
    }

    #[test]
    fn alpha_decays_toward_floor_when_configured() {
        let probs = Tensor::from_rows(vec![vec![0.5, 0.5]]).unwrap();
        let label = compute_labels(&probs, 0, 1.0, 10.0, Some(10.0), 0.0).unwrap();
        assert!(label.alpha_star < 1.0);
    }

    #[test]
    fn rejects_out_of_range_action() {
        let probs = Tensor::from_rows(vec![vec![0.5, 0.5]]).unwrap();
        assert!(compute_labels(&probs, 5, 1.0, 1.0, None, 0.01).is_err());
    }
}
