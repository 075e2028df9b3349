//! `y = w * x + b` with `w`, `b` fixed scalars: an affine rescaling layer with
//! no learned parameters, used to map a network's raw output into a
//! different numeric range (e.g. clamp-free `tanh` output into a reward
//! range).

use crate::error::CoreResult;
use crate::layers::LayerDescriptor;
use crate::state::NetworkState;

pub fn forward(desc: &LayerDescriptor, state: &mut NetworkState, b: f32, w: f32) -> CoreResult<()> {
    let input = desc.single_input()?;
    let x = state.values(input).ok_or_else(|| missing(desc, input))?;
    let y = x.scale(w).add_scalar(b);
    state.put_values(&desc.name, y);
    Ok(())
}

pub fn train(desc: &LayerDescriptor, state: &mut NetworkState, w: f32) -> CoreResult<()> {
    let input = desc.single_input()?.to_string();
    let out_shape = state
        .values(&desc.name)
        .map(|v| v.shape())
        .unwrap_or((1, 1));
    let g = state
        .grads(&desc.name)
        .cloned()
        .unwrap_or_else(|| crate::tensor::Tensor::zeros(out_shape.0, out_shape.1));
    state.accumulate_grads(&input, g.scale(w))?;
    Ok(())
}

fn missing(desc: &LayerDescriptor, input: &str) -> crate::error::CoreError {
    crate::error::CoreError::SpecInvalid(format!("layer '{}' has no input values for '{}'", desc.name, input))
}
