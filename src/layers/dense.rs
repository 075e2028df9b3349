//! Fully connected layer: the only kind that owns parameters.
//!
//! Training is the row-sequential eligibility-trace update: each row of the
//! batch is folded into the trace and applied before moving to the next row,
//! rather than averaging gradients across the batch the way a supervised
//! dense layer would.

use crate::error::{CoreError, CoreResult};
use crate::kpi::KpiSink;
use crate::layers::LayerDescriptor;
use crate::state::NetworkState;
use crate::tensor::Tensor;

fn effective_input(desc: &LayerDescriptor, state: &NetworkState, drop_out: f32) -> CoreResult<Tensor> {
    let input = desc.single_input()?;
    let x = state
        .values(input)
        .ok_or_else(|| CoreError::SpecInvalid(format!("layer '{}' has no input values for '{}'", desc.name, input)))?
        .clone();
    match state.mask(&desc.name) {
        Some(mask) if drop_out < 1.0 => Ok(x.mul(mask)?.scale(1.0 / drop_out)),
        _ => Ok(x),
    }
}

pub fn forward(desc: &LayerDescriptor, state: &mut NetworkState, training: bool, drop_out: f32) -> CoreResult<()> {
    let input = desc.single_input()?;
    let x = state
        .values(input)
        .ok_or_else(|| CoreError::SpecInvalid(format!("layer '{}' has no input values for '{}'", desc.name, input)))?
        .clone();

    state.remove(|k| k.layer == desc.name && k.slot == crate::state::Slot::Mask);
    let x_eff = if training && drop_out < 1.0 {
        let mask = Tensor::bernoulli_mask(x.rows(), x.cols(), drop_out, state.rng_mut());
        let scaled = x.mul(&mask)?.scale(1.0 / drop_out);
        state.put_mask(&desc.name, mask);
        scaled
    } else {
        x
    };

    let w = state
        .weights(&desc.name)
        .ok_or_else(|| CoreError::SpecInvalid(format!("layer '{}' has no weights", desc.name)))?
        .clone();
    let b = state
        .bias(&desc.name)
        .ok_or_else(|| CoreError::SpecInvalid(format!("layer '{}' has no bias", desc.name)))?
        .clone();

    let y = x_eff.matmul(&w)?.add(&b)?;
    state.put_values(&desc.name, y);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn train(
    desc: &LayerDescriptor,
    state: &mut NetworkState,
    delta: &Tensor,
    lambda: f32,
    kpi: &mut dyn KpiSink,
    in_size: usize,
    out_size: usize,
    max_abs_weights: f32,
    drop_out: f32,
) -> CoreResult<()> {
    let input = desc.single_input()?.to_string();
    let applied_dropout = state.mask(&desc.name).is_some() && drop_out < 1.0;

    let g = state
        .grads(&desc.name)
        .cloned()
        .unwrap_or_else(|| Tensor::zeros(1, out_size));
    let rows = g.rows();

    let x_eff = effective_input(desc, state, drop_out)?;

    let w = state
        .weights(&desc.name)
        .ok_or_else(|| CoreError::SpecInvalid(format!("layer '{}' has no weights", desc.name)))?
        .clone();

    let grad_in_pre = g.matmul(&w.transpose())?;
    let grad_in = if applied_dropout {
        grad_in_pre.scale(1.0 / drop_out)
    } else {
        grad_in_pre
    };
    state.accumulate_grads(&input, grad_in)?;

    let mut eb = state
        .bias_trace(&desc.name)
        .cloned()
        .unwrap_or_else(|| Tensor::zeros(1, out_size));
    let mut ew = state
        .weights_trace(&desc.name)
        .cloned()
        .unwrap_or_else(|| Tensor::zeros(in_size, out_size));
    let mut weights = w;
    let mut bias = state
        .bias(&desc.name)
        .ok_or_else(|| CoreError::SpecInvalid(format!("layer '{}' has no bias", desc.name)))?
        .clone();

    for i in 0..rows {
        let g_i = g.row(i)?;
        let g_i_scaled = if applied_dropout { g_i.scale(1.0 / drop_out) } else { g_i };

        eb = eb.scale(lambda).add(&g_i_scaled)?;

        let x_i = x_eff.row(i)?;
        let outer = x_i.transpose().matmul(&g_i_scaled)?;
        ew = ew.scale(lambda).add(&outer)?;

        let delta_row = if delta.rows() == rows { i } else { 0 };
        let delta_i = delta.row(delta_row)?.to_scalar()?;
        let db = eb.scale(delta_i);
        let dw = ew.scale(delta_i);

        bias = bias.add(&db)?;
        weights = weights.add(&dw)?.clip(-max_abs_weights, max_abs_weights);

        kpi.emit(&format!("{}_db", desc.name), &db);
        kpi.emit(&format!("{}_dw", desc.name), &dw);
    }

    state.put_bias_trace(&desc.name, eb);
    state.put_weights_trace(&desc.name, ew);
    state.put_bias(&desc.name, bias);
    state.put_weights(&desc.name, weights);
    Ok(())
}

pub fn init_variables(desc: &LayerDescriptor, state: &mut NetworkState, in_size: usize, out_size: usize) {
    state.put_bias_trace(&desc.name, Tensor::zeros(1, out_size));
    state.put_weights_trace(&desc.name, Tensor::zeros(in_size, out_size));
}

/// `W ~ N(0, 1) / (in_size + out_size)`, `b = 0`. Matches the scale the rest
/// of the network was trained against; not the textbook Xavier variance.
pub fn init_parameters(desc: &LayerDescriptor, state: &mut NetworkState, in_size: usize, out_size: usize) {
    let divisor = (in_size + out_size) as f32;
    let w = Tensor::fill_gaussian(in_size, out_size, state.rng_mut()).scale(1.0 / divisor);
    state.put_weights(&desc.name, w);
    state.put_bias(&desc.name, Tensor::zeros(1, out_size));
}

pub fn validate(desc: &LayerDescriptor, state: &NetworkState, in_size: usize, out_size: usize) -> CoreResult<()> {
    let w = state
        .weights(&desc.name)
        .ok_or_else(|| CoreError::SpecInvalid(format!("layer '{}' has no weights", desc.name)))?;
    if w.shape() != (in_size, out_size) {
        return Err(CoreError::shape_mismatch(vec![in_size, out_size], vec![w.rows(), w.cols()]));
    }
    let b = state
        .bias(&desc.name)
        .ok_or_else(|| CoreError::SpecInvalid(format!("layer '{}' has no bias", desc.name)))?;
    if b.shape() != (1, out_size) {
        return Err(CoreError::shape_mismatch(vec![1, out_size], vec![b.rows(), b.cols()]));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::LayerKind;

    fn dense_desc() -> LayerDescriptor {
        LayerDescriptor::new(
            "d1",
            LayerKind::Dense {
                in_size: 2,
                out_size: 2,
                max_abs_weights: 10.0,
                drop_out: 1.0,
            },
            vec!["x".into()],
        )
    }

    #[test]
    fn forward_applies_weights_and_bias() {
        let desc = dense_desc();
        let mut state = NetworkState::new(1);
        state.put_values("x", Tensor::from_rows(vec![vec![1.0, 0.0]]).unwrap());
        state.put_weights("d1", Tensor::eye(2));
        state.put_bias("d1", Tensor::from_rows(vec![vec![0.5, 0.5]]).unwrap());
        forward(&desc, &mut state, false, 1.0).unwrap();
        assert_eq!(state.values("d1").unwrap().as_array2()[[0, 0]], 1.5);
        assert_eq!(state.values("d1").unwrap().as_array2()[[0, 1]], 0.5);
    }

    /// S5: seed 42, in=2/out=2, W must match a plain `N(0,1)` sampler from the
    /// same seed divided by `(in+out)`; one forward-backward with a fixed
    /// upstream gradient lands the trace and parameter values at hand-derived
    /// constants.
    #[test]
    fn xavier_init_matches_raw_gaussian_sampler_divided_by_fan_in_out() {
        let desc = dense_desc();
        let mut state = NetworkState::new(42);
        init_parameters(&desc, &mut state, 2, 2);

        let mut reference_rng = NetworkState::new(42);
        let raw = Tensor::fill_gaussian(2, 2, reference_rng.rng_mut());
        let expected = raw.scale(1.0 / 4.0);

        assert_eq!(state.weights("d1").unwrap(), &expected);
        assert_eq!(state.bias("d1").unwrap(), &Tensor::zeros(1, 2));

        init_variables(&desc, &mut state, 2, 2);
        state.put_values("x", Tensor::from_rows(vec![vec![1.0, 1.0]]).unwrap());
        forward(&desc, &mut state, false, 1.0).unwrap();
        state.accumulate_grads("d1", Tensor::from_rows(vec![vec![1.0, 0.0]]).unwrap()).unwrap();

        let w_before = state.weights("d1").unwrap().clone();
        let b_before = state.bias("d1").unwrap().clone();
        let mut kpi = crate::kpi::NullKpiSink;
        let delta = Tensor::from_scalar(1.0);
        train(&desc, &mut state, &delta, 0.0, &mut kpi, 2, 2, 10.0, 1.0).unwrap();

        let eb = state.bias_trace("d1").unwrap();
        let ew = state.weights_trace("d1").unwrap();
        assert_eq!(eb, &Tensor::from_rows(vec![vec![1.0, 0.0]]).unwrap());
        assert_eq!(ew, &Tensor::from_rows(vec![vec![1.0, 0.0], vec![1.0, 0.0]]).unwrap());
        assert_eq!(state.bias("d1").unwrap(), &b_before.add(eb).unwrap());
        assert_eq!(state.weights("d1").unwrap(), &w_before.add(ew).unwrap().clip(-10.0, 10.0));
    }

    /// §8 invariant 8, λ=1 half: with no decay, `eb`/`ew` after N steps equal
    /// the plain sum of every step's raw gradient/outer-product since init
    /// (the λ=0 half is covered by `xavier_init_matches_raw_gaussian_sampler_divided_by_fan_in_out`).
    #[test]
    fn lambda_one_accumulates_traces_as_a_running_sum() {
        let desc = dense_desc();
        let mut state = NetworkState::new(1);
        state.put_weights("d1", Tensor::zeros(2, 2));
        state.put_bias("d1", Tensor::zeros(1, 2));
        init_variables(&desc, &mut state, 2, 2);

        let mut kpi = crate::kpi::NullKpiSink;
        let delta = Tensor::from_scalar(0.0);

        let inputs = [vec![1.0, 2.0], vec![0.5, -1.0], vec![2.0, 0.0]];
        let grads = [vec![1.0, 0.5], vec![-0.5, 1.0], vec![0.3, 0.3]];

        let mut expected_eb = Tensor::zeros(1, 2);
        let mut expected_ew = Tensor::zeros(2, 2);

        for (x, g) in inputs.iter().zip(grads.iter()) {
            state.put_values("x", Tensor::from_rows(vec![x.clone()]).unwrap());
            forward(&desc, &mut state, false, 1.0).unwrap();
            state.accumulate_grads("d1", Tensor::from_rows(vec![g.clone()]).unwrap()).unwrap();
            // delta=0 so parameters stay fixed; only the traces accumulate.
            train(&desc, &mut state, &delta, 1.0, &mut kpi, 2, 2, 10.0, 1.0).unwrap();

            let g_row = Tensor::from_rows(vec![g.clone()]).unwrap();
            let x_row = Tensor::from_rows(vec![x.clone()]).unwrap();
            expected_eb = expected_eb.add(&g_row).unwrap();
            expected_ew = expected_ew.add(&x_row.transpose().matmul(&g_row).unwrap()).unwrap();
        }

        assert_eq!(state.bias_trace("d1").unwrap(), &expected_eb);
        assert_eq!(state.weights_trace("d1").unwrap(), &expected_ew);
    }

    #[test]
    fn train_updates_weights_and_propagates_grad() {
        let desc = dense_desc();
        let mut state = NetworkState::new(1);
        state.put_values("x", Tensor::from_rows(vec![vec![1.0, 2.0]]).unwrap());
        state.put_weights("d1", Tensor::zeros(2, 2));
        state.put_bias("d1", Tensor::zeros(1, 2));
        forward(&desc, &mut state, false, 1.0).unwrap();
        state.accumulate_grads("d1", Tensor::from_rows(vec![vec![1.0, 1.0]]).unwrap()).unwrap();

        let mut kpi = crate::kpi::NullKpiSink;
        let delta = Tensor::from_scalar(1.0);
        train(&desc, &mut state, &delta, 0.0, &mut kpi, 2, 2, 10.0, 1.0).unwrap();

        assert!(state.weights("d1").unwrap().max_abs() > 0.0);
        assert!(state.grads("x").is_some());
    }
}
