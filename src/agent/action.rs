//! Decoding a discrete actor's sampled index into the value it stands for,
//! and assembling the Wheelly domain's 4-dimensional action surface from one
//! decode per dimension. The TDN core never interprets these values itself;
//! this is purely the thin contract at the agent's boundary (see DESIGN.md).

use crate::error::{CoreError, CoreResult};

/// The ordered set of quantized values a single action dimension's softmax
/// head ranges over; index `i` of the probability row names `values[i]`.
#[derive(Clone, Debug, PartialEq)]
pub struct QuantizedSet {
    values: Vec<f32>,
}

impl QuantizedSet {
    pub fn new(values: Vec<f32>) -> CoreResult<QuantizedSet> {
        if values.is_empty() {
            return Err(CoreError::SpecInvalid("quantized action set must not be empty".into()));
        }
        Ok(QuantizedSet { values })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn decode(&self, index: usize) -> CoreResult<f32> {
        self.values
            .get(index)
            .copied()
            .ok_or_else(|| CoreError::SpecInvalid(format!("action index {index} out of range for a {}-value set", self.values.len())))
    }
}

/// `(halt, direction_deg, speed_pps, sensor_deg)`, canonical for the Wheelly
/// domain: `halt` is decoded as "nonzero means stop".
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WheellyAction {
    pub halt: bool,
    pub direction_deg: f32,
    pub speed_pps: f32,
    pub sensor_deg: f32,
}

/// One quantized set and sampled index per dimension, in `(halt, direction,
/// speed, sensor)` order.
pub fn decode_wheelly_action(sets: &[QuantizedSet; 4], indices: &[usize; 4]) -> CoreResult<WheellyAction> {
    let halt = sets[0].decode(indices[0])? != 0.0;
    let direction_deg = sets[1].decode(indices[1])?;
    let speed_pps = sets[2].decode(indices[2])?;
    let sensor_deg = sets[3].decode(indices[3])?;
    Ok(WheellyAction {
        halt,
        direction_deg,
        speed_pps,
        sensor_deg,
    })
}
