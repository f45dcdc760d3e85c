//! Environment boundary: where policies get their pre-processed frames

use crate::frame::{ObservationFrame, Perception};

/// Source of pre-processed frames for the current tick.
///
/// Calling `processed_state` twice with the same perception and no
/// intervening environment step must yield the same frame.
pub trait Environment {
    fn processed_state(&mut self, perception: Perception) -> ObservationFrame;
}

/// Environment that renders every perception as an all-zero frame.
#[derive(Debug, Clone, Copy)]
pub struct BlankEnvironment {
    height: usize,
    width: usize,
}

impl BlankEnvironment {
    pub fn new(height: usize, width: usize) -> Self {
        Self { height, width }
    }
}

impl Environment for BlankEnvironment {
    fn processed_state(&mut self, _perception: Perception) -> ObservationFrame {
        ObservationFrame::zeros(self.height, self.width)
    }
}
