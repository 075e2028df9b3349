//! Parameter blob persistence: loading and saving the weights/bias every
//! `Dense` layer owns, independent of the declarative topology in
//! [`crate::spec`].
//!
//! The blob is a flat `{"<layer>.<slot>": tensor}` map, pretty-printed JSON,
//! the same shape the teacher's perceptron persisted its own layer values as.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::network::TDNetwork;
use crate::state::NetworkState;
use crate::tensor::Tensor;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParamsBlob {
    values: HashMap<String, Tensor>,
}

impl ParamsBlob {
    pub fn from_state(network: &TDNetwork, state: &NetworkState) -> ParamsBlob {
        let values = network
            .parameters(state)
            .into_iter()
            .map(|(key, tensor)| (key.name(), tensor))
            .collect();
        ParamsBlob { values }
    }

    /// Loads every entry into `state`, checking each tensor's shape against
    /// what `network` expects before accepting any of them.
    pub fn apply(&self, network: &TDNetwork, state: &mut NetworkState) -> CoreResult<()> {
        for layer in network.layers() {
            if !layer.kind.has_parameters() {
                continue;
            }
            for slot in [crate::state::Slot::Weights, crate::state::Slot::Bias] {
                let key = crate::state::VarKey::new(layer.name.clone(), slot);
                let tensor = self
                    .values
                    .get(&key.name())
                    .ok_or_else(|| CoreError::CheckpointIncompatible(format!("missing parameter '{}'", key.name())))?;
                state.put(key, tensor.clone());
            }
        }
        network.validate(state)?;
        debug!("applied {} persisted parameter tensors", self.values.len());
        Ok(())
    }

    pub fn to_json_pretty(&self) -> CoreResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| CoreError::Persistence(format!("failed to serialize parameters: {e}")))
    }

    pub fn from_json(text: &str) -> CoreResult<ParamsBlob> {
        serde_json::from_str(text).map_err(|e| CoreError::Persistence(format!("malformed parameter blob: {e}")))
    }

    pub fn save_to_path(&self, path: &Path) -> CoreResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| CoreError::Persistence(format!("failed to create {}: {e}", parent.display())))?;
        }
        let json = self.to_json_pretty()?;
        fs::write(path, json).map_err(|e| CoreError::Persistence(format!("failed to write {}: {e}", path.display())))?;
        info!("wrote {} parameter tensors to {}", self.values.len(), path.display());
        Ok(())
    }

    pub fn load_from_path(path: &Path) -> CoreResult<ParamsBlob> {
        let text = fs::read_to_string(path).map_err(|e| CoreError::Persistence(format!("failed to read {}: {e}", path.display())))?;
        Self::from_json(&text)
    }
}
