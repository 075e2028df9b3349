//! Column-wise concatenation of two or more inputs, used to fan branches
//! back into a single tensor before a shared `Dense` head.

use crate::error::{CoreError, CoreResult};
use crate::layers::LayerDescriptor;
use crate::state::NetworkState;
use crate::tensor::Tensor;

pub fn forward(desc: &LayerDescriptor, state: &mut NetworkState) -> CoreResult<()> {
    let mut parts = Vec::with_capacity(desc.inputs.len());
    for input in &desc.inputs {
        let x = state
            .values(input)
            .ok_or_else(|| CoreError::SpecInvalid(format!("layer '{}' has no input values for '{}'", desc.name, input)))?
            .clone();
        parts.push(x);
    }
    state.put_values(&desc.name, Tensor::hstack(&parts)?);
    Ok(())
}

/// Splits the accumulated gradient back into per-input slices, in the same
/// column order the inputs were concatenated in. Widths are read back from
/// each input's own stored values, since `Concat` never declares them.
pub fn train(desc: &LayerDescriptor, state: &mut NetworkState) -> CoreResult<()> {
    let widths: Vec<usize> = desc
        .inputs
        .iter()
        .map(|input| {
            state
                .values(input)
                .map(|v| v.cols())
                .ok_or_else(|| CoreError::SpecInvalid(format!("layer '{}' has no input values for '{}'", desc.name, input)))
        })
        .collect::<CoreResult<_>>()?;
    let total_cols: usize = widths.iter().sum();

    let g = match state.grads(&desc.name).cloned() {
        Some(g) => g,
        None => return Ok(()),
    };
    if g.cols() != total_cols {
        return Err(CoreError::shape_mismatch(vec![g.rows(), total_cols], vec![g.rows(), g.cols()]));
    }

    let mut offset = 0;
    for (input, width) in desc.inputs.iter().zip(widths) {
        let slice = g.slice_cols(offset, offset + width)?;
        state.accumulate_grads(input, slice)?;
        offset += width;
    }
    Ok(())
}
