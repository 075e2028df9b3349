//! Temporal-difference neural network core and actor-critic training loop.
//!
//! A declarative, statically-shaped computation graph ([`network::TDNetwork`])
//! performs forward inference and an online backward pass driven by
//! eligibility traces rather than mini-batch gradient descent. The
//! [`agent`] module layers an actor-critic training step on top: a critic
//! estimates value, one or more discrete actors choose actions, and both
//! are updated from a shared scalar TD error each environment step.

pub mod agent;
pub mod error;
pub mod kpi;
pub mod layers;
pub mod network;
pub mod params;
pub mod spec;
pub mod state;
pub mod tensor;

pub use error::{CoreError, CoreResult};
pub use kpi::KpiSink;
pub use network::TDNetwork;
pub use state::NetworkState;
pub use tensor::Tensor;
