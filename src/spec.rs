//! Declarative, JSON-serializable description of a network's topology.
//!
//! This is the wire format a host loads from disk and hands to
//! [`NetworkSpec::build`]; it never carries parameter values (see
//! [`crate::params`] for that), only the shape of the graph.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::layers::LayerDescriptor;
use crate::network::TDNetwork;

/// Wire format for a network's topology: an ordered layer list plus the size
/// table that assigns a width to every source and declared layer. Never
/// carries parameter values — see [`crate::params`] for those.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetworkSpec {
    pub layers: Vec<LayerDescriptor>,
    pub sizes: HashMap<String, usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
}

impl NetworkSpec {
    pub fn from_json(text: &str) -> CoreResult<NetworkSpec> {
        serde_json::from_str(text).map_err(|e| CoreError::SpecInvalid(format!("malformed network spec: {e}")))
    }

    pub fn to_json_pretty(&self) -> CoreResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| CoreError::Persistence(format!("failed to serialize network spec: {e}")))
    }

    /// Validates and orders the declared layers into a runnable
    /// [`TDNetwork`].
    pub fn build(self) -> CoreResult<TDNetwork> {
        TDNetwork::build(self.layers, self.sizes)
    }

    pub fn from_network(network: &TDNetwork) -> NetworkSpec {
        NetworkSpec {
            layers: network.layers().to_vec(),
            sizes: network.sizes().clone(),
            schema: None,
        }
    }
}
