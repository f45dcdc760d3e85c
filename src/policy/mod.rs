//! Flat and hierarchical DQN policies
//!
//! A [`Policy`] is either a leaf [`FlatPolicy`] over a static action set or a
//! [`HierarchicalPolicy`] whose output also has one slot per sub-policy.
//!
//! ```text
//! HierarchicalPolicy  outputs: [ native_0 .. native_n | sub_0 .. sub_k ]
//!     │                                                   │
//!     │ predict(index >= n)                               ▼
//!     └──────────────► sub-policy k: arg-max over its own values on its
//!                      own history, then predict() one level down
//! ```

mod flat;
mod hierarchical;
mod skill;

pub use flat::FlatPolicy;
pub use hierarchical::HierarchicalPolicy;
pub use skill::SkillRunner;

use burn::prelude::*;

use crate::action::{Action, ActionSet};
use crate::env::Environment;
use crate::error::{PolicyError, Result};
use crate::frame::{HistoryBuffer, Perception};
use crate::network::QFunction;
use crate::values::argmax;
use crate::weights::{TrainingSetup, WeightStore};

/// Where an index of a policy's output vector points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Index into the policy's own actions
    Native(usize),
    /// Index into the policy's sub-policies, in registration order
    SubModel(usize),
}

/// Softmax over a caller-supplied action vocabulary.
#[derive(Debug, Clone, PartialEq)]
pub struct Distribution {
    /// One probability per vocabulary entry
    pub probabilities: Vec<f32>,
    /// Forced index passed through by flat policies; the resolved choice
    /// for hierarchical ones
    pub selection: Option<Selection>,
}

/// Leaf or composite policy sharing one network type.
#[derive(Debug)]
pub enum Policy<B: Backend, N: QFunction<B>> {
    Flat(FlatPolicy<B, N>),
    Hierarchical(HierarchicalPolicy<B, N>),
}

impl<B: Backend, N: QFunction<B>> Policy<B, N> {
    /// The policy's own (native) actions.
    pub fn actions(&self) -> &ActionSet {
        match self {
            Self::Flat(policy) => policy.actions(),
            Self::Hierarchical(policy) => policy.actions(),
        }
    }

    pub fn perception(&self) -> Perception {
        match self {
            Self::Flat(policy) => policy.perception(),
            Self::Hierarchical(policy) => policy.perception(),
        }
    }

    /// Frames per history this policy's network consumes.
    pub fn nb_frames(&self) -> usize {
        match self {
            Self::Flat(policy) => policy.nb_frames(),
            Self::Hierarchical(policy) => policy.nb_frames(),
        }
    }

    pub fn output_size(&self) -> usize {
        match self {
            Self::Flat(policy) => policy.actions().len(),
            Self::Hierarchical(policy) => policy.output_size(),
        }
    }

    /// Extra ticks a chosen sub-policy keeps control. Always 0 for flat policies.
    pub fn skill_frame_skip(&self) -> usize {
        match self {
            Self::Flat(_) => 0,
            Self::Hierarchical(policy) => policy.skill_frame_skip(),
        }
    }

    pub fn selection(&self, index: usize) -> Selection {
        match self {
            Self::Flat(_) => Selection::Native(index),
            Self::Hierarchical(policy) => policy.selection(index),
        }
    }

    pub fn device(&self) -> &B::Device {
        match self {
            Self::Flat(policy) => policy.device(),
            Self::Hierarchical(policy) => policy.device(),
        }
    }

    /// Raw values of the first sample of `batch`.
    pub fn q_values(&self, batch: Tensor<B, 4>) -> Result<Vec<f32>> {
        match self {
            Self::Flat(policy) => policy.q_values(batch),
            Self::Hierarchical(policy) => policy.q_values(batch),
        }
    }

    /// Arg-max over this policy's output for `history`.
    pub fn greedy_index(&self, history: &HistoryBuffer) -> Result<usize> {
        let batch = history
            .to_tensor::<B>(self.device())
            .ok_or(PolicyError::EmptyHistory { sub_model: None })?;
        argmax(&self.q_values(batch)?).ok_or(PolicyError::EmptyActionSpace)
    }

    /// Action for output index `index`, delegating into sub-policies as needed.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not below [`Policy::output_size`].
    pub fn predict<E: Environment>(&mut self, env: &mut E, index: usize) -> Result<Action> {
        match self {
            Self::Flat(policy) => Ok(policy.predict(index).clone()),
            Self::Hierarchical(policy) => policy.predict(env, index),
        }
    }

    pub fn softmax_q_values(
        &self,
        batch: Tensor<B, 4>,
        target: &ActionSet,
        forced: Option<usize>,
    ) -> Result<Distribution> {
        match self {
            Self::Flat(policy) => policy.softmax_q_values(batch, target, forced),
            Self::Hierarchical(policy) => policy.softmax_q_values(batch, target, forced),
        }
    }

    /// Raw values of the leaf policy that would act on `batch`, together
    /// with that leaf's action set.
    pub(crate) fn resolve_leaf(&self, batch: Tensor<B, 4>) -> Result<(&ActionSet, Vec<f32>)> {
        match self {
            Self::Flat(policy) => Ok((policy.actions(), policy.q_values(batch)?)),
            Self::Hierarchical(policy) => policy.resolve_leaf(batch),
        }
    }

    pub fn load_weights(&mut self, store: &WeightStore, name: &str) -> Result<()> {
        match self {
            Self::Flat(policy) => policy.load_weights(store, name),
            Self::Hierarchical(policy) => policy.load_weights(store, name),
        }
    }

    pub fn save_weights(&self, store: &WeightStore, name: &str) -> Result<()> {
        match self {
            Self::Flat(policy) => policy.save_weights(store, name),
            Self::Hierarchical(policy) => policy.save_weights(store, name),
        }
    }
}

impl<B: Backend, N: QFunction<B>> From<FlatPolicy<B, N>> for Policy<B, N> {
    fn from(policy: FlatPolicy<B, N>) -> Self {
        Self::Flat(policy)
    }
}

impl<B: Backend, N: QFunction<B>> From<HierarchicalPolicy<B, N>> for Policy<B, N> {
    fn from(policy: HierarchicalPolicy<B, N>) -> Self {
        Self::Hierarchical(policy)
    }
}

/// Read a network's output for one history and check it has `expected` values.
pub(crate) fn checked_q_values<B: Backend, N: QFunction<B>>(
    network: &N,
    batch: Tensor<B, 4>,
    expected: usize,
) -> Result<Vec<f32>> {
    let values = crate::network::first_row(network.q_values(batch))?;
    if values.len() != expected {
        return Err(PolicyError::OutputSize {
            expected,
            actual: values.len(),
        });
    }
    Ok(values)
}

/// A network and the training setup it was compiled with. Reloading weights
/// replaces the whole value.
#[derive(Debug, Clone)]
pub(crate) struct Compiled<N> {
    pub(crate) network: N,
    pub(crate) setup: TrainingSetup,
}

impl<N> Compiled<N> {
    pub(crate) fn new(network: N) -> Self {
        Self {
            network,
            setup: TrainingSetup::regression(),
        }
    }

    /// Fresh value holding the snapshot `name` compiled with `setup`.
    pub(crate) fn reload<B: Backend>(
        &self,
        store: &WeightStore,
        name: &str,
        device: &B::Device,
        setup: TrainingSetup,
    ) -> Result<Self>
    where
        N: QFunction<B>,
    {
        let network = store.load::<B, N>(self.network.clone(), name, device)?;
        Ok(Self { network, setup })
    }
}
