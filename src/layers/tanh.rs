//! Elementwise `tanh` activation.

use crate::error::{CoreError, CoreResult};
use crate::layers::LayerDescriptor;
use crate::state::NetworkState;
use crate::tensor::Tensor;

pub fn forward(desc: &LayerDescriptor, state: &mut NetworkState) -> CoreResult<()> {
    let input = desc.single_input()?;
    let x = state
        .values(input)
        .ok_or_else(|| CoreError::SpecInvalid(format!("layer '{}' has no input values for '{}'", desc.name, input)))?;
    state.put_values(&desc.name, x.tanh());
    Ok(())
}

/// `d/dx tanh(x) = 1 - tanh(x)^2`, evaluated from this layer's own stored
/// output rather than recomputing `tanh` from the input.
pub fn train(desc: &LayerDescriptor, state: &mut NetworkState) -> CoreResult<()> {
    let input = desc.single_input()?.to_string();
    let y = state
        .values(&desc.name)
        .ok_or_else(|| CoreError::SpecInvalid(format!("layer '{}' has no stored output", desc.name)))?
        .clone();
    let g = state.grads(&desc.name).cloned().unwrap_or_else(|| Tensor::zeros(y.rows(), y.cols()));
    let one_minus_y2 = y.mul(&y)?.scale(-1.0).add_scalar(1.0);
    state.accumulate_grads(&input, g.mul(&one_minus_y2)?)?;
    Ok(())
}
