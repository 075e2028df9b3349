//! Elementwise sum of two or more same-shaped inputs, used to merge a
//! skip connection or recombine split branches.

use crate::error::{CoreError, CoreResult};
use crate::layers::LayerDescriptor;
use crate::state::NetworkState;
use crate::tensor::Tensor;

pub fn forward(desc: &LayerDescriptor, state: &mut NetworkState) -> CoreResult<()> {
    let mut total: Option<Tensor> = None;
    for input in &desc.inputs {
        let x = state
            .values(input)
            .ok_or_else(|| CoreError::SpecInvalid(format!("layer '{}' has no input values for '{}'", desc.name, input)))?;
        total = Some(match total {
            Some(acc) => acc.add(x)?,
            None => x.clone(),
        });
    }
    let total = total.ok_or_else(|| CoreError::SpecInvalid(format!("layer '{}' has no inputs", desc.name)))?;
    state.put_values(&desc.name, total);
    Ok(())
}

/// Every input receives the same gradient unchanged, since `d(sum)/d(x_k) = 1`.
pub fn train(desc: &LayerDescriptor, state: &mut NetworkState) -> CoreResult<()> {
    let out_shape = state.values(&desc.name).map(|v| v.shape());
    let g = match (state.grads(&desc.name).cloned(), out_shape) {
        (Some(g), _) => g,
        (None, Some((r, c))) => Tensor::zeros(r, c),
        (None, None) => return Ok(()),
    };
    for input in desc.inputs.clone() {
        state.accumulate_grads(&input, g.clone())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::LayerKind;

    #[test]
    fn forward_adds_every_input() {
        let desc = LayerDescriptor::new("s1", LayerKind::Sum, vec!["a".into(), "b".into(), "c".into()]);
        let mut state = NetworkState::new(1);
        state.put_values("a", Tensor::from_scalar(1.0));
        state.put_values("b", Tensor::from_scalar(2.0));
        state.put_values("c", Tensor::from_scalar(3.0));
        forward(&desc, &mut state).unwrap();
        assert_eq!(state.values("s1").unwrap().to_scalar().unwrap(), 6.0);
    }

    #[test]
    fn train_broadcasts_gradient_to_every_input() {
        let desc = LayerDescriptor::new("s1", LayerKind::Sum, vec!["a".into(), "b".into()]);
        let mut state = NetworkState::new(1);
        state.put_values("a", Tensor::from_scalar(1.0));
        state.put_values("b", Tensor::from_scalar(2.0));
        forward(&desc, &mut state).unwrap();
        state.accumulate_grads("s1", Tensor::from_scalar(5.0)).unwrap();
        train(&desc, &mut state).unwrap();
        assert_eq!(state.grads("a").unwrap().to_scalar().unwrap(), 5.0);
        assert_eq!(state.grads("b").unwrap().to_scalar().unwrap(), 5.0);
    }
}
