//! The declarative computation graph: an ordered list of layers, each naming
//! the layers that feed it, traversed forward for inference/training and in
//! reverse for the backward pass.
//!
//! There is no runtime graph-walking or dynamic scheduling: a [`TDNetwork`]
//! is built once from a [`crate::spec::NetworkSpec`], its topological order is
//! computed and validated at construction time, and every subsequent
//! `forward`/`train` call just iterates that fixed `Vec`.

use std::collections::{HashMap, HashSet};

use log::{debug, trace, warn};

use crate::error::{CoreError, CoreResult};
use crate::kpi::KpiSink;
use crate::layers::LayerDescriptor;
use crate::state::NetworkState;
use crate::tensor::Tensor;

#[derive(Clone, Debug)]
pub struct TDNetwork {
    /// Topologically ordered: every layer appears after all of its inputs.
    layers: Vec<LayerDescriptor>,
    index_by_name: HashMap<String, usize>,
    /// Width of every source and declared layer, as supplied by the spec's
    /// `sizes` table. Sources have no `LayerDescriptor` of their own — this
    /// is the only place their width is recorded.
    sizes: HashMap<String, usize>,
}

impl TDNetwork {
    /// Validates arity, name uniqueness, input references, and acyclicity,
    /// then orders the layers topologically. Construction is the only place
    /// a malformed graph gets caught; every later call assumes the graph is
    /// sound.
    ///
    /// `sizes` must cover every source name (a name used as an input but
    /// never declared as a layer) plus every declared layer; a reference
    /// that resolves to neither a declared layer nor a `sizes` entry is a
    /// dangling input.
    pub fn build(layers: Vec<LayerDescriptor>, sizes: HashMap<String, usize>) -> CoreResult<TDNetwork> {
        let mut seen = HashSet::new();
        for layer in &layers {
            layer.validate_arity()?;
            if !seen.insert(layer.name.clone()) {
                return Err(CoreError::SpecInvalid(format!("duplicate layer name '{}'", layer.name)));
            }
        }
        let by_name: HashMap<&str, &LayerDescriptor> = layers.iter().map(|l| (l.name.as_str(), l)).collect();
        for layer in &layers {
            for input in &layer.inputs {
                if !by_name.contains_key(input.as_str()) && !sizes.contains_key(input.as_str()) {
                    return Err(CoreError::SpecInvalid(format!(
                        "layer '{}' references unknown input '{}'",
                        layer.name, input
                    )));
                }
            }
            if !sizes.contains_key(layer.name.as_str()) {
                return Err(CoreError::SpecInvalid(format!("layer '{}' has no entry in the size table", layer.name)));
            }
            if let Some(expected) = layer.declared_out_size() {
                if sizes.get(layer.name.as_str()) != Some(&expected) {
                    return Err(CoreError::SpecInvalid(format!(
                        "layer '{}' declares output size {} but the size table says {:?}",
                        layer.name,
                        expected,
                        sizes.get(layer.name.as_str())
                    )));
                }
            }
        }

        let ordered = topological_order(&layers)?;
        let index_by_name = ordered.iter().enumerate().map(|(i, l)| (l.name.clone(), i)).collect();
        debug!("built TDNetwork with {} layers", ordered.len());
        Ok(TDNetwork {
            layers: ordered,
            index_by_name,
            sizes,
        })
    }

    pub fn layers(&self) -> &[LayerDescriptor] {
        &self.layers
    }

    pub fn layer(&self, name: &str) -> Option<&LayerDescriptor> {
        self.index_by_name.get(name).map(|&i| &self.layers[i])
    }

    pub fn sizes(&self) -> &HashMap<String, usize> {
        &self.sizes
    }

    pub fn size_of(&self, name: &str) -> Option<usize> {
        self.sizes.get(name).copied()
    }

    /// Names referenced as an input by some layer but never themselves
    /// declared — the graph's externally supplied inputs.
    pub fn source_names(&self) -> Vec<&str> {
        let declared: HashSet<&str> = self.layers.iter().map(|l| l.name.as_str()).collect();
        let mut referenced: Vec<&str> = self
            .layers
            .iter()
            .flat_map(|l| l.inputs.iter().map(String::as_str))
            .filter(|name| !declared.contains(name))
            .collect();
        referenced.sort_unstable();
        referenced.dedup();
        referenced
    }

    /// Layers nobody reads from — the graph's outputs.
    pub fn sink_names(&self) -> Vec<&str> {
        let referenced: HashSet<&str> = self.layers.iter().flat_map(|l| l.inputs.iter().map(String::as_str)).collect();
        self.layers
            .iter()
            .filter(|l| !referenced.contains(l.name.as_str()))
            .map(|l| l.name.as_str())
            .collect()
    }

    /// Seeds the state's size table, samples every parameterized layer's
    /// weights/bias from scratch, and zeroes eligibility traces. Call once,
    /// before the first forward pass.
    pub fn init(&self, state: &mut NetworkState) -> CoreResult<()> {
        *state = state.set_sizes(self.sizes.clone());
        for layer in &self.layers {
            layer.init_parameters(state)?;
            layer.init_variables(state)?;
        }
        Ok(())
    }

    /// Clears every layer's eligibility trace, without touching parameters.
    /// Called at the start of a new episode.
    pub fn reset_traces(&self, state: &mut NetworkState) -> CoreResult<()> {
        for layer in &self.layers {
            layer.init_variables(state)?;
        }
        Ok(())
    }

    pub fn validate(&self, state: &NetworkState) -> CoreResult<()> {
        for layer in &self.layers {
            layer.validate(state)?;
        }
        Ok(())
    }

    /// Runs every layer in topological order. `training` controls whether
    /// `Dense` samples a fresh drop-out mask. A non-finite output is a
    /// `NumericInstability` condition (see DESIGN.md): logged and left in
    /// place rather than turned into a fatal error, since the structural
    /// graph is still sound.
    pub fn forward(&self, state: &mut NetworkState, training: bool) -> CoreResult<()> {
        trace!("forward pass, training={training}");
        for layer in &self.layers {
            layer.forward(state, training)?;
            if let Some(values) = state.values(&layer.name) {
                if !values.is_finite() {
                    warn!("layer '{}' produced non-finite values after forward", layer.name);
                }
            }
        }
        Ok(())
    }

    /// Runs the backward pass in reverse topological order: `delta` seeds
    /// every sink layer's gradient, each layer consumes its own accumulated
    /// gradient and feeds one back into its inputs, and eligibility traces
    /// are updated in place. Clears every layer's gradient on the way in so
    /// a caller can call `train` repeatedly without residue from a previous
    /// step leaking in, except for whatever gradient the caller seeded onto
    /// a sink before calling this.
    pub fn train(&self, state: &mut NetworkState, delta: &Tensor, lambda: f32, kpi: &mut dyn KpiSink) -> CoreResult<()> {
        trace!("backward pass, lambda={lambda}");
        for layer in self.layers.iter().rev() {
            layer.train(state, delta, lambda, kpi)?;
            if let Some(w) = state.weights(&layer.name) {
                if !w.is_finite() {
                    warn!("layer '{}' weights went non-finite after update", layer.name);
                }
            }
        }
        state.drop_all_grads();
        Ok(())
    }

    pub fn parameters(&self, state: &NetworkState) -> HashMap<crate::state::VarKey, Tensor> {
        state.parameters()
    }
}

fn topological_order(layers: &[LayerDescriptor]) -> CoreResult<Vec<LayerDescriptor>> {
    let by_name: HashMap<&str, &LayerDescriptor> = layers.iter().map(|l| (l.name.as_str(), l)).collect();
    let mut visited: HashSet<&str> = HashSet::new();
    let mut in_progress: HashSet<&str> = HashSet::new();
    let mut ordered: Vec<&LayerDescriptor> = Vec::with_capacity(layers.len());

    fn visit<'a>(
        name: &'a str,
        by_name: &HashMap<&'a str, &'a LayerDescriptor>,
        visited: &mut HashSet<&'a str>,
        in_progress: &mut HashSet<&'a str>,
        ordered: &mut Vec<&'a LayerDescriptor>,
    ) -> CoreResult<()> {
        if visited.contains(name) {
            return Ok(());
        }
        // A name with no `LayerDescriptor` is a source: a leaf with nothing
        // upstream to visit, already validated against the size table by
        // `TDNetwork::build`.
        let layer = match by_name.get(name) {
            Some(layer) => *layer,
            None => return Ok(()),
        };
        if !in_progress.insert(name) {
            return Err(CoreError::SpecInvalid(format!("cycle detected through layer '{}'", name)));
        }
        for input in &layer.inputs {
            visit(input.as_str(), by_name, visited, in_progress, ordered)?;
        }
        in_progress.remove(name);
        visited.insert(name);
        ordered.push(layer);
        Ok(())
    }

    for layer in layers {
        visit(layer.name.as_str(), &by_name, &mut visited, &mut in_progress, &mut ordered)?;
    }
    Ok(ordered.into_iter().cloned().collect())
}
