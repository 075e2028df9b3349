//! Marker layer: declares a drop-out rate for documentation/spec purposes
//! without applying it itself — actual masking lives inside whichever
//! `Dense` layer reads this one, per its own `drop_out` hyperparameter. Both
//! forward and backward are the identity.

use crate::error::{CoreError, CoreResult};
use crate::layers::LayerDescriptor;
use crate::state::NetworkState;
use crate::tensor::Tensor;

pub fn forward(desc: &LayerDescriptor, state: &mut NetworkState) -> CoreResult<()> {
    let input = desc.single_input()?;
    let x = state
        .values(input)
        .ok_or_else(|| CoreError::SpecInvalid(format!("layer '{}' has no input values for '{}'", desc.name, input)))?
        .clone();
    state.put_values(&desc.name, x);
    Ok(())
}

pub fn train(desc: &LayerDescriptor, state: &mut NetworkState) -> CoreResult<()> {
    let input = desc.single_input()?.to_string();
    let out_shape = state.values(&desc.name).map(|v| v.shape());
    let g = match (state.grads(&desc.name).cloned(), out_shape) {
        (Some(g), _) => g,
        (None, Some((r, c))) => Tensor::zeros(r, c),
        (None, None) => return Ok(()),
    };
    state.accumulate_grads(&input, g)?;
    Ok(())
}
