//! Observability sink for the training step.
//!
//! The spec calls this an optional callback `(name, tensor) -> ()`; in Rust
//! terms that is a trait object so the host can plug in whatever sink it
//! likes (a channel, a CSV writer, a `tracing` span) without this crate
//! depending on any of them.

use crate::tensor::Tensor;

pub trait KpiSink {
    fn emit(&mut self, name: &str, value: &Tensor);

    fn emit_scalar(&mut self, name: &str, value: f32) {
        self.emit(name, &Tensor::from_scalar(value));
    }
}

/// A sink that drops every KPI. Used when the host registers nothing.
pub struct NullKpiSink;

impl KpiSink for NullKpiSink {
    fn emit(&mut self, _name: &str, _value: &Tensor) {}
}

/// Convenience sink for tests and small tools: keeps every emitted KPI in
/// insertion order so assertions can walk them.
#[derive(Default)]
pub struct RecordingKpiSink {
    pub records: Vec<(String, Tensor)>,
}

impl KpiSink for RecordingKpiSink {
    fn emit(&mut self, name: &str, value: &Tensor) {
        self.records.push((name.to_string(), value.clone()));
    }
}

impl RecordingKpiSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.records.iter().rev().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}
