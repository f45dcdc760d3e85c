//! Pre-processed observation frames and per-policy frame histories

use std::collections::VecDeque;

use burn::prelude::*;

use crate::error::{PolicyError, Result};

/// Depth pre-processing parameters a policy expects its frames to be rendered with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Perception {
    pub depth_radius: f32,
    pub depth_contrast: f32,
}

impl Perception {
    pub fn new(depth_radius: f32, depth_contrast: f32) -> Self {
        Self {
            depth_radius,
            depth_contrast,
        }
    }
}

impl Default for Perception {
    fn default() -> Self {
        Self {
            depth_radius: 1.0,
            depth_contrast: 0.8,
        }
    }
}

/// One single-channel `height x width` snapshot, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationFrame {
    height: usize,
    width: usize,
    pixels: Vec<f32>,
}

impl ObservationFrame {
    pub fn new(height: usize, width: usize, pixels: Vec<f32>) -> Result<Self> {
        if pixels.len() != height * width {
            return Err(PolicyError::FrameSize {
                expected: height * width,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            height,
            width,
            pixels,
        })
    }

    pub fn filled(height: usize, width: usize, value: f32) -> Self {
        Self {
            height,
            width,
            pixels: vec![value; height * width],
        }
    }

    pub fn zeros(height: usize, width: usize) -> Self {
        Self::filled(height, width, 0.0)
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    pub fn pixels(&self) -> &[f32] {
        &self.pixels
    }
}

/// Fixed-length window over the most recent frames seen by one policy.
///
/// The first push fills the whole window with copies of that frame, so a
/// policy can act from the very first tick. Later pushes evict the oldest
/// frame.
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    frames: VecDeque<ObservationFrame>,
    capacity: usize,
}

impl HistoryBuffer {
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "history buffer needs room for at least one frame");
        Self {
            frames: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Oldest to newest.
    pub fn frames(&self) -> impl Iterator<Item = &ObservationFrame> {
        self.frames.iter()
    }

    pub fn oldest(&self) -> Option<&ObservationFrame> {
        self.frames.front()
    }

    pub fn newest(&self) -> Option<&ObservationFrame> {
        self.frames.back()
    }

    pub fn push(&mut self, frame: ObservationFrame) -> Result<()> {
        if let Some(newest) = self.frames.back() {
            if newest.shape() != frame.shape() {
                return Err(PolicyError::FrameShape {
                    expected: newest.shape(),
                    actual: frame.shape(),
                });
            }
            self.frames.pop_front();
            self.frames.push_back(frame);
        } else {
            // Cold start: treat the first frame as the whole history
            self.frames.extend(std::iter::repeat_n(frame, self.capacity));
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    /// Batch of one history, shaped `[1, capacity, height, width]`.
    pub fn to_tensor<B: Backend>(&self, device: &B::Device) -> Option<Tensor<B, 4>> {
        let (height, width) = self.newest()?.shape();
        let pixels: Vec<f32> = self
            .frames
            .iter()
            .flat_map(|frame| frame.pixels.iter().copied())
            .collect();
        let data = TensorData::new(pixels, [1, self.frames.len(), height, width]);
        Some(Tensor::from_data(data, device))
    }
}
