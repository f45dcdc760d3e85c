//! Flat DQN policy over a static action set

use burn::prelude::*;

use super::{Compiled, Distribution, Selection, checked_q_values};
use crate::action::{Action, ActionSet};
use crate::error::Result;
use crate::frame::Perception;
use crate::network::QFunction;
use crate::values::l2_normalize;
use crate::weights::{TrainingSetup, WeightStore};

/// Leaf policy: one network, one action per output.
#[derive(Debug)]
pub struct FlatPolicy<B: Backend, N> {
    compiled: Compiled<N>,
    actions: ActionSet,
    perception: Perception,
    nb_frames: usize,
    device: B::Device,
}

impl<B: Backend, N: QFunction<B>> FlatPolicy<B, N> {
    pub fn new(
        network: N,
        actions: ActionSet,
        perception: Perception,
        nb_frames: usize,
        device: B::Device,
    ) -> Self {
        Self {
            compiled: Compiled::new(network),
            actions,
            perception,
            nb_frames,
            device,
        }
    }

    pub fn actions(&self) -> &ActionSet {
        &self.actions
    }

    pub fn perception(&self) -> Perception {
        self.perception
    }

    pub fn nb_frames(&self) -> usize {
        self.nb_frames
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    pub fn network(&self) -> &N {
        &self.compiled.network
    }

    pub fn training(&self) -> &TrainingSetup {
        &self.compiled.setup
    }

    /// # Panics
    ///
    /// Panics if `index` is out of range for the action set.
    pub fn predict(&self, index: usize) -> &Action {
        &self.actions[index]
    }

    /// Raw values of the first sample of `batch`, one per action.
    pub fn q_values(&self, batch: Tensor<B, 4>) -> Result<Vec<f32>> {
        checked_q_values(&self.compiled.network, batch, self.actions.len())
    }

    /// Softmax of the L2-normalized values, re-indexed onto `target`.
    /// `forced` is returned as is.
    pub fn softmax_q_values(
        &self,
        batch: Tensor<B, 4>,
        target: &ActionSet,
        forced: Option<usize>,
    ) -> Result<Distribution> {
        let values = l2_normalize(&self.q_values(batch)?);
        let probabilities = self.actions.project(&values, target).softmax();

        Ok(Distribution {
            probabilities,
            selection: forced.map(Selection::Native),
        })
    }

    pub fn load_weights(&mut self, store: &WeightStore, name: &str) -> Result<()> {
        self.compiled =
            self.compiled
                .reload::<B>(store, name, &self.device, TrainingSetup::regression())?;
        Ok(())
    }

    pub fn save_weights(&self, store: &WeightStore, name: &str) -> Result<()> {
        store.save::<B, N>(self.compiled.network.clone(), name)
    }
}
