//! The layer catalog.
//!
//! Every layer kind is a variant of [`LayerKind`] rather than a trait object:
//! the set of kinds a network can declare is closed, so dispatch is a single
//! `match` instead of a vtable. Each variant carries its own immutable
//! hyperparameters; mutable state (values, grads, parameters, traces) lives in
//! [`crate::state::NetworkState`], keyed by the layer's name.
//!
//! The actual math for each kind lives in its own submodule, grounded on the
//! corresponding activation/layer file it replaces.

pub(crate) mod concat;
mod dense;
mod dropout;
mod linear;
mod relu;
mod softmax;
pub(crate) mod sum;
mod tanh;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::kpi::KpiSink;
use crate::state::NetworkState;
use crate::tensor::Tensor;

/// The hyperparameters that make a layer behave the way it does. Shapes are
/// not stored here except where the kind declares them explicitly (`Dense`);
/// everything else infers its shape from its inputs at `init_variables` time.
///
/// Tagged directly for the declarative network spec: `{"kind": "dense",
/// "in_size": 4, ...}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LayerKind {
    Dense {
        in_size: usize,
        out_size: usize,
        max_abs_weights: f32,
        drop_out: f32,
    },
    Linear {
        b: f32,
        w: f32,
    },
    Tanh,
    Relu,
    Softmax {
        temperature: f32,
    },
    Sum,
    Concat,
    Dropout {
        drop_out: f32,
    },
}

impl LayerKind {
    /// Exact input arity this kind requires, or `None` for "one or more"
    /// (`Sum`, `Concat`).
    fn fixed_arity(&self) -> Option<usize> {
        match self {
            LayerKind::Sum | LayerKind::Concat => None,
            _ => Some(1),
        }
    }

    pub fn has_parameters(&self) -> bool {
        matches!(self, LayerKind::Dense { .. })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LayerDescriptor {
    pub name: String,
    #[serde(flatten)]
    pub kind: LayerKind,
    #[serde(default)]
    pub inputs: Vec<String>,
}

impl LayerDescriptor {
    pub fn new(name: impl Into<String>, kind: LayerKind, inputs: Vec<String>) -> Self {
        LayerDescriptor {
            name: name.into(),
            kind,
            inputs,
        }
    }

    /// Checks input arity against the kind's requirement. Called once, while
    /// [`crate::network::TDNetwork`] is built from a spec.
    pub fn validate_arity(&self) -> CoreResult<()> {
        match self.kind.fixed_arity() {
            Some(n) if self.inputs.len() != n => Err(CoreError::SpecInvalid(format!(
                "layer '{}' takes exactly {} input(s), found {}",
                self.name,
                n,
                self.inputs.len()
            ))),
            Some(_) => Ok(()),
            None if self.inputs.is_empty() => Err(CoreError::SpecInvalid(format!(
                "layer '{}' needs at least one input",
                self.name
            ))),
            None => Ok(()),
        }
    }

    fn single_input(&self) -> CoreResult<&str> {
        match self.inputs.as_slice() {
            [only] => Ok(only.as_str()),
            _ => Err(CoreError::SpecInvalid(format!(
                "layer '{}' expects exactly one input",
                self.name
            ))),
        }
    }

    pub fn forward(&self, state: &mut NetworkState, training: bool) -> CoreResult<()> {
        match &self.kind {
            LayerKind::Dense { drop_out, .. } => dense::forward(self, state, training, *drop_out),
            LayerKind::Linear { b, w } => linear::forward(self, state, *b, *w),
            LayerKind::Tanh => tanh::forward(self, state),
            LayerKind::Relu => relu::forward(self, state),
            LayerKind::Softmax { temperature } => softmax::forward(self, state, *temperature),
            LayerKind::Sum => sum::forward(self, state),
            LayerKind::Concat => concat::forward(self, state),
            LayerKind::Dropout { .. } => dropout::forward(self, state),
        }
    }

    /// Consumes this layer's accumulated gradient (zero if none was ever
    /// written, e.g. a sink nobody downstream fed back into), updates its own
    /// parameters if it has any, and accumulates a gradient into each of its
    /// inputs.
    pub fn train(
        &self,
        state: &mut NetworkState,
        delta: &Tensor,
        lambda: f32,
        kpi: &mut dyn KpiSink,
    ) -> CoreResult<()> {
        match &self.kind {
            LayerKind::Dense {
                in_size,
                out_size,
                max_abs_weights,
                drop_out,
            } => dense::train(self, state, delta, lambda, kpi, *in_size, *out_size, *max_abs_weights, *drop_out),
            LayerKind::Linear { w, .. } => linear::train(self, state, *w),
            LayerKind::Tanh => tanh::train(self, state),
            LayerKind::Relu => relu::train(self, state),
            LayerKind::Softmax { temperature } => softmax::train(self, state, *temperature),
            LayerKind::Sum => sum::train(self, state),
            LayerKind::Concat => concat::train(self, state),
            LayerKind::Dropout { .. } => dropout::train(self, state),
        }
    }

    /// Zeroes whatever per-episode working state this kind keeps
    /// (eligibility traces for `Dense`; nothing for everything else).
    pub fn init_variables(&self, state: &mut NetworkState) -> CoreResult<()> {
        if let LayerKind::Dense { in_size, out_size, .. } = &self.kind {
            dense::init_variables(self, state, *in_size, *out_size);
        }
        Ok(())
    }

    /// Samples fresh parameters (`Dense` only; every other kind is
    /// parameter-free).
    pub fn init_parameters(&self, state: &mut NetworkState) -> CoreResult<()> {
        if let LayerKind::Dense { in_size, out_size, .. } = &self.kind {
            dense::init_parameters(self, state, *in_size, *out_size);
        }
        Ok(())
    }

    pub fn validate(&self, state: &NetworkState) -> CoreResult<()> {
        if let LayerKind::Dense { in_size, out_size, .. } = &self.kind {
            dense::validate(self, state, *in_size, *out_size)?;
        }
        Ok(())
    }

    /// Declared output width, when it can be known without running the
    /// network (`Dense`'s is explicit; everything else infers from its
    /// input(s), so this returns `None` and the network derives it live).
    pub fn declared_out_size(&self) -> Option<usize> {
        match &self.kind {
            LayerKind::Dense { out_size, .. } => Some(*out_size),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_arity_rejects_wrong_input_count() {
        let d = LayerDescriptor::new("d1", LayerKind::Tanh, vec!["a".into(), "b".into()]);
        assert!(d.validate_arity().is_err());
    }

    #[test]
    fn variadic_arity_requires_at_least_one() {
        let d = LayerDescriptor::new("s1", LayerKind::Sum, vec![]);
        assert!(d.validate_arity().is_err());
        let d = LayerDescriptor::new("s1", LayerKind::Sum, vec!["a".into()]);
        assert!(d.validate_arity().is_ok());
    }
}
