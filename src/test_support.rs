//! Shared fixtures for unit tests

use std::path::PathBuf;

use burn::module::{Module, Param};
use burn::prelude::*;

use crate::action::{Action, ActionSet};
use crate::env::Environment;
use crate::frame::{ObservationFrame, Perception};
use crate::network::QFunction;

/// Q-function that ignores its input and always returns the same values
#[derive(Module, Debug)]
pub struct FixedQ<B: Backend> {
    values: Param<Tensor<B, 1>>,
}

impl<B: Backend> FixedQ<B> {
    pub fn new(values: &[f32], device: &B::Device) -> Self {
        Self {
            values: Param::from_tensor(Tensor::from_floats(values, device)),
        }
    }

    pub fn values(&self) -> Vec<f32> {
        self.values.val().into_data().convert::<f32>().to_vec().unwrap()
    }
}

impl<B: Backend> QFunction<B> for FixedQ<B> {
    fn q_values(&self, histories: Tensor<B, 4>) -> Tensor<B, 2> {
        let [batch, ..] = histories.dims();
        self.values.val().unsqueeze_dim::<2>(0).repeat_dim(0, batch)
    }
}

/// Environment whose frames are filled with the current tick number.
/// Records every perception it was asked to render.
#[derive(Debug, Default)]
pub struct ScriptedEnvironment {
    pub tick: usize,
    pub requests: Vec<Perception>,
}

pub const FRAME_HEIGHT: usize = 2;
pub const FRAME_WIDTH: usize = 3;

impl ScriptedEnvironment {
    pub fn advance(&mut self) {
        self.tick += 1;
    }

    pub fn frame_at(tick: usize) -> ObservationFrame {
        ObservationFrame::filled(FRAME_HEIGHT, FRAME_WIDTH, tick as f32)
    }
}

impl Environment for ScriptedEnvironment {
    fn processed_state(&mut self, perception: Perception) -> ObservationFrame {
        self.requests.push(perception);
        Self::frame_at(self.tick)
    }
}

pub fn actions(buttons: &[&[u8]]) -> ActionSet {
    buttons.iter().map(|b| Action::new(b)).collect()
}

/// Fresh per-test directory under the system temp dir.
pub fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("hdqn-{}-{name}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}
