//! Elementwise rectified linear unit.

use crate::error::{CoreError, CoreResult};
use crate::layers::LayerDescriptor;
use crate::state::NetworkState;
use crate::tensor::Tensor;

pub fn forward(desc: &LayerDescriptor, state: &mut NetworkState) -> CoreResult<()> {
    let input = desc.single_input()?;
    let x = state
        .values(input)
        .ok_or_else(|| CoreError::SpecInvalid(format!("layer '{}' has no input values for '{}'", desc.name, input)))?;
    state.put_values(&desc.name, x.max_scalar(0.0));
    Ok(())
}

pub fn train(desc: &LayerDescriptor, state: &mut NetworkState) -> CoreResult<()> {
    let input = desc.single_input()?.to_string();
    let x = state
        .values(&input)
        .ok_or_else(|| CoreError::SpecInvalid(format!("layer '{}' has no input values for '{}'", desc.name, input)))?
        .clone();
    let g = state.grads(&desc.name).cloned().unwrap_or_else(|| Tensor::zeros(x.rows(), x.cols()));
    let mask = x.gt_scalar(0.0);
    state.accumulate_grads(&input, g.mul(&mask)?)?;
    Ok(())
}
