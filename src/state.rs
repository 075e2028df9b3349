//! Name-keyed owner of every tensor a [`crate::network::TDNetwork`] needs:
//! per-layer values, gradients, dropout masks, parameters, and eligibility
//! traces, plus the seeded RNG that drives dropout sampling, weight
//! initialization, and action sampling.
//!
//! Variable names are logically `"<layer>.<kind>"` (see [`Slot::suffix`]) but
//! the runtime key is a `(layer, Slot)` pair rather than a formatted string,
//! per the re-architecture in DESIGN.md: strings stay stable for
//! serialization without being the hash key on the hot path.

use std::collections::HashMap;

use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;

use crate::error::CoreResult;
use crate::tensor::Tensor;

/// One of the seven array roles a layer's variables can occupy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Slot {
    Values,
    Grads,
    Mask,
    Weights,
    Bias,
    WeightsTrace,
    BiasTrace,
}

impl Slot {
    pub fn suffix(self) -> &'static str {
        match self {
            Slot::Values => "values",
            Slot::Grads => "grads",
            Slot::Mask => "mask",
            Slot::Weights => "weights",
            Slot::Bias => "bias",
            Slot::WeightsTrace => "weights.trace",
            Slot::BiasTrace => "bias.trace",
        }
    }

    pub fn is_parameter(self) -> bool {
        matches!(self, Slot::Weights | Slot::Bias)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct VarKey {
    pub layer: String,
    pub slot: Slot,
}

impl VarKey {
    pub fn new(layer: impl Into<String>, slot: Slot) -> Self {
        VarKey {
            layer: layer.into(),
            slot,
        }
    }

    /// The `"<layer>.<kind>"` name used by the declarative spec and by the
    /// persisted parameter blob.
    pub fn name(&self) -> String {
        format!("{}.{}", self.layer, self.slot.suffix())
    }
}

#[derive(Clone, Debug)]
pub struct NetworkState {
    vars: HashMap<VarKey, Tensor>,
    sizes: HashMap<String, usize>,
    rng: StdRng,
}

impl NetworkState {
    pub fn new(seed: u64) -> Self {
        NetworkState {
            vars: HashMap::new(),
            sizes: HashMap::new(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn rng_mut(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    pub fn sizes(&self) -> &HashMap<String, usize> {
        &self.sizes
    }

    pub fn size_of(&self, name: &str) -> Option<usize> {
        self.sizes.get(name).copied()
    }

    /// Returns a new state with an updated size table. Sizes are treated as
    /// immutable once a [`crate::network::TDNetwork`] has been built from
    /// this state; nothing in the state itself re-exposes a mutator.
    pub fn set_sizes(&mut self, sizes: HashMap<String, usize>) -> NetworkState {
        NetworkState {
            vars: self.vars.clone(),
            sizes,
            rng: self.reseeded_rng(),
        }
    }

    pub fn get(&self, key: &VarKey) -> Option<&Tensor> {
        self.vars.get(key)
    }

    pub fn put(&mut self, key: VarKey, value: Tensor) {
        self.vars.insert(key, value);
    }

    /// Accumulates: present -> `old + delta`, absent -> `delta`.
    pub fn add(&mut self, key: VarKey, delta: Tensor) -> CoreResult<()> {
        let merged = match self.vars.get(&key) {
            Some(existing) => existing.add(&delta)?,
            None => delta,
        };
        self.vars.insert(key, merged);
        Ok(())
    }

    pub fn values(&self, layer: &str) -> Option<&Tensor> {
        self.get(&VarKey::new(layer, Slot::Values))
    }
    pub fn grads(&self, layer: &str) -> Option<&Tensor> {
        self.get(&VarKey::new(layer, Slot::Grads))
    }
    pub fn mask(&self, layer: &str) -> Option<&Tensor> {
        self.get(&VarKey::new(layer, Slot::Mask))
    }
    pub fn weights(&self, layer: &str) -> Option<&Tensor> {
        self.get(&VarKey::new(layer, Slot::Weights))
    }
    pub fn bias(&self, layer: &str) -> Option<&Tensor> {
        self.get(&VarKey::new(layer, Slot::Bias))
    }
    pub fn weights_trace(&self, layer: &str) -> Option<&Tensor> {
        self.get(&VarKey::new(layer, Slot::WeightsTrace))
    }
    pub fn bias_trace(&self, layer: &str) -> Option<&Tensor> {
        self.get(&VarKey::new(layer, Slot::BiasTrace))
    }

    pub fn put_values(&mut self, layer: &str, value: Tensor) {
        self.put(VarKey::new(layer, Slot::Values), value);
    }
    pub fn put_mask(&mut self, layer: &str, value: Tensor) {
        self.put(VarKey::new(layer, Slot::Mask), value);
    }
    pub fn put_weights(&mut self, layer: &str, value: Tensor) {
        self.put(VarKey::new(layer, Slot::Weights), value);
    }
    pub fn put_bias(&mut self, layer: &str, value: Tensor) {
        self.put(VarKey::new(layer, Slot::Bias), value);
    }
    pub fn put_weights_trace(&mut self, layer: &str, value: Tensor) {
        self.put(VarKey::new(layer, Slot::WeightsTrace), value);
    }
    pub fn put_bias_trace(&mut self, layer: &str, value: Tensor) {
        self.put(VarKey::new(layer, Slot::BiasTrace), value);
    }

    pub fn accumulate_grads(&mut self, layer: &str, delta: Tensor) -> CoreResult<()> {
        self.add(VarKey::new(layer, Slot::Grads), delta)
    }

    pub fn filter_keys<F: Fn(&VarKey) -> bool>(&self, predicate: F) -> HashMap<VarKey, Tensor> {
        self.vars
            .iter()
            .filter(|(k, _)| predicate(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Same as [`Self::filter_keys`] but wraps the result back up as a
    /// standalone state sharing this state's size table and a freshly
    /// derived RNG, for callers that want a sub-state rather than a bare map.
    pub fn filter_keys_and_dup<F: Fn(&VarKey) -> bool>(&mut self, predicate: F) -> NetworkState {
        let vars = self.filter_keys(predicate);
        NetworkState {
            vars,
            sizes: self.sizes.clone(),
            rng: self.reseeded_rng(),
        }
    }

    pub fn remove<F: Fn(&VarKey) -> bool>(&mut self, predicate: F) {
        self.vars.retain(|k, _| !predicate(k));
    }

    fn reseeded_rng(&mut self) -> StdRng {
        let seed: u64 = self.rng.gen();
        StdRng::seed_from_u64(seed)
    }

    /// Shallow copy: clones the variable map (cheap; `Tensor` is
    /// reference-counted) and re-seeds a fresh, independent RNG from the
    /// current RNG's state so replay stays deterministic.
    pub fn dup(&mut self) -> NetworkState {
        NetworkState {
            vars: self.vars.clone(),
            sizes: self.sizes.clone(),
            rng: self.reseeded_rng(),
        }
    }

    /// Like [`Self::dup`], but guarantees every tensor is its own
    /// allocation, independent of this state's tensors even under
    /// internal mutation. Used before a training forward pass, where the
    /// per-row Dense update mutates values that must not be visible to the
    /// state the caller is still holding.
    pub fn deep_dup(&mut self) -> NetworkState {
        let vars = self
            .vars
            .iter()
            .map(|(k, v)| (k.clone(), Tensor::from_array2(v.to_array2())))
            .collect();
        NetworkState {
            vars,
            sizes: self.sizes.clone(),
            rng: self.reseeded_rng(),
        }
    }

    pub fn drop_all_grads(&mut self) {
        self.remove(|k| k.slot == Slot::Grads);
    }

    pub fn parameters(&self) -> HashMap<VarKey, Tensor> {
        self.filter_keys(|k| k.slot.is_parameter())
    }
}
