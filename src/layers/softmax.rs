//! Temperature-scaled softmax over each row, used as an actor's action-
//! probability head.
//!
//! Softmax mixes every output of a row together, so both forward and
//! backward operate row by row rather than as a single whole-matrix op.

use crate::error::{CoreError, CoreResult};
use crate::layers::LayerDescriptor;
use crate::state::NetworkState;
use crate::tensor::Tensor;

fn softmax_row(row: &Tensor, temperature: f32) -> CoreResult<Tensor> {
    let scaled = row.scale(1.0 / temperature);
    let max = scaled.as_array2().iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let shifted = scaled.add_scalar(-max);
    let exp = shifted.exp();
    let total = exp.sum();
    Ok(exp.scale(1.0 / total))
}

pub fn forward(desc: &LayerDescriptor, state: &mut NetworkState, temperature: f32) -> CoreResult<()> {
    let input = desc.single_input()?;
    let x = state
        .values(input)
        .ok_or_else(|| CoreError::SpecInvalid(format!("layer '{}' has no input values for '{}'", desc.name, input)))?
        .clone();
    let rows: Vec<Tensor> = (0..x.rows()).map(|i| x.row(i).and_then(|r| softmax_row(&r, temperature))).collect::<CoreResult<_>>()?;
    state.put_values(&desc.name, Tensor::vstack(&rows)?);
    Ok(())
}

/// Per row `i`: `grad_in_i = ((g_i ⊙ y_i) . (I - 1·y_i^T)) / temperature`,
/// where `I - 1·y_i^T` is the softmax Jacobian in outer-product form.
pub fn train(desc: &LayerDescriptor, state: &mut NetworkState, temperature: f32) -> CoreResult<()> {
    let input = desc.single_input()?.to_string();
    let y = state
        .values(&desc.name)
        .ok_or_else(|| CoreError::SpecInvalid(format!("layer '{}' has no stored output", desc.name)))?
        .clone();
    let g = state.grads(&desc.name).cloned().unwrap_or_else(|| Tensor::zeros(y.rows(), y.cols()));

    let n = y.cols();
    let mut rows = Vec::with_capacity(y.rows());
    for i in 0..y.rows() {
        let y_i = y.row(i)?;
        let g_i = g.row(i)?;
        let weighted = g_i.mul(&y_i)?;
        let ones_col = Tensor::ones(n, 1);
        let jacobian = Tensor::eye(n).sub(&ones_col.matmul(&y_i)?)?;
        let grad_in_i = weighted.matmul(&jacobian)?.scale(1.0 / temperature);
        rows.push(grad_in_i);
    }
    state.accumulate_grads(&input, Tensor::vstack(&rows)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::LayerKind;

    #[test]
    fn forward_rows_sum_to_one() {
        let desc = LayerDescriptor::new("sm", LayerKind::Softmax { temperature: 1.0 }, vec!["x".into()]);
        let mut state = NetworkState::new(1);
        state.put_values("x", Tensor::from_rows(vec![vec![1.0, 2.0, 3.0]]).unwrap());
        forward(&desc, &mut state, 1.0).unwrap();
        let y = state.values("sm").unwrap();
        approx::assert_abs_diff_eq!(y.sum(), 1.0, epsilon = 1e-5);
        assert!(y.as_array2().iter().all(|&v| v > 0.0));
        // S4: argmax of a softmax over [1, 2, 3] lands on the largest logit.
        assert_eq!(y.argmax_row0().unwrap(), 2);
    }

    /// §8 invariant 5: backward matches a central finite-difference estimate
    /// of the scalar `f(x) = g . softmax(x/T)` at random inputs, i.e. the
    /// vector-Jacobian product `train` computes is `grad f` w.r.t. `x`.
    #[test]
    fn backward_matches_finite_difference_of_dot_product_at_random_inputs() {
        let desc = LayerDescriptor::new("sm", LayerKind::Softmax { temperature: 1.0 }, vec!["x".into()]);
        let temperature = 1.0;
        let mut seed_state = NetworkState::new(77);
        let n = 4;
        let x = Tensor::fill_uniform(1, n, seed_state.rng_mut()).scale(4.0).add_scalar(-2.0);
        let g = Tensor::fill_uniform(1, n, seed_state.rng_mut()).scale(2.0).add_scalar(-1.0);

        let eval = |x_row: &Tensor| -> f32 {
            let mut state = NetworkState::new(1);
            state.put_values("x", x_row.clone());
            forward(&desc, &mut state, temperature).unwrap();
            state.values("sm").unwrap().mul(&g).unwrap().sum()
        };

        let mut state = NetworkState::new(1);
        state.put_values("x", x.clone());
        forward(&desc, &mut state, temperature).unwrap();
        state.accumulate_grads("sm", g.clone()).unwrap();
        train(&desc, &mut state, temperature).unwrap();
        let analytic = state.grads("x").unwrap().clone();

        let eps = 1e-3;
        for j in 0..n {
            let mut x_plus = x.as_array2().clone();
            x_plus[[0, j]] += eps;
            let mut x_minus = x.as_array2().clone();
            x_minus[[0, j]] -= eps;
            let f_plus = eval(&Tensor::from_array2(x_plus));
            let f_minus = eval(&Tensor::from_array2(x_minus));
            let numeric = (f_plus - f_minus) / (2.0 * eps);
            approx::assert_abs_diff_eq!(analytic.as_array2()[[0, j]], numeric, epsilon = 1e-3);
        }
    }

    #[test]
    fn higher_temperature_flattens_distribution() {
        let desc = LayerDescriptor::new("sm", LayerKind::Softmax { temperature: 100.0 }, vec!["x".into()]);
        let mut state = NetworkState::new(1);
        state.put_values("x", Tensor::from_rows(vec![vec![1.0, 2.0, 3.0]]).unwrap());
        forward(&desc, &mut state, 100.0).unwrap();
        let y = state.values("sm").unwrap();
        let spread = y.max_abs() - y.as_array2().iter().cloned().fold(f32::INFINITY, f32::min);
        assert!(spread < 0.1);
    }
}
