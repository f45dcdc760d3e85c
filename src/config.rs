//! JSON policy-tree configuration

use std::path::Path;

use burn::prelude::*;

use crate::action::ActionSet;
use crate::error::{self, PolicyError};
use crate::frame::Perception;
use crate::network::{QNetwork, QNetworkConfig};
use crate::policy::{FlatPolicy, HierarchicalPolicy, Policy};
use crate::weights::WeightStore;

/// One node of a policy tree. A node with sub-models becomes a hierarchical
/// policy, a node without becomes a flat one.
#[derive(Debug, Config)]
pub struct PolicySpec {
    /// Native actions as button states
    pub actions: Vec<Vec<u8>>,
    #[config(default = 1.0)]
    pub depth_radius: f32,
    #[config(default = 0.8)]
    pub depth_contrast: f32,
    #[config(default = 1)]
    pub nb_frames: usize,
    /// Frame height and width
    #[config(default = "[120, 160]")]
    pub resolution: [usize; 2],
    /// Extra ticks a chosen sub-model keeps control
    #[config(default = 0)]
    pub skill_frame_skip: usize,
    /// Softmax output head (distilled student)
    #[config(default = false)]
    pub distilled: bool,
    /// Weight snapshot to load, by name
    #[config(default = "None")]
    pub weights: Option<String>,
    #[config(default = "Vec::new()")]
    pub sub_models: Vec<PolicySpec>,
}

impl PolicySpec {
    pub fn from_file(path: impl AsRef<Path>) -> error::Result<Self> {
        let path = path.as_ref();
        Self::load(path)
            .map_err(|err| PolicyError::Config(format!("{}: {err:?}", path.display())))
    }

    pub fn perception(&self) -> Perception {
        Perception::new(self.depth_radius, self.depth_contrast)
    }

    pub fn is_hierarchical(&self) -> bool {
        !self.sub_models.is_empty()
    }

    pub fn output_size(&self) -> usize {
        self.actions.len() + self.sub_models.len()
    }

    pub fn network_config(&self) -> QNetworkConfig {
        QNetworkConfig::new(self.resolution, self.nb_frames, self.output_size())
            .with_distilled(self.distilled)
    }
}

impl<B: Backend> Policy<B, QNetwork<B>> {
    /// Build the policy tree described by `spec` with freshly initialized networks.
    pub fn from_spec(spec: &PolicySpec, device: &B::Device) -> error::Result<Self> {
        let network = spec.network_config().init::<B>(device)?;
        let actions = ActionSet::from(spec.actions.clone());

        if !spec.is_hierarchical() {
            return Ok(Policy::Flat(FlatPolicy::new(
                network,
                actions,
                spec.perception(),
                spec.nb_frames,
                device.clone(),
            )));
        }

        let sub_models = spec
            .sub_models
            .iter()
            .map(|sub| Self::from_spec(sub, device))
            .collect::<error::Result<Vec<_>>>()?;

        let policy = HierarchicalPolicy::new(
            network,
            actions,
            sub_models,
            spec.perception(),
            spec.nb_frames,
            device.clone(),
        )
        .with_skill_frame_skip(spec.skill_frame_skip);
        Ok(Policy::Hierarchical(policy))
    }

    /// Load every snapshot named in `spec`, walking the tree alongside it.
    pub fn load_spec_weights(
        &mut self,
        spec: &PolicySpec,
        store: &WeightStore,
    ) -> error::Result<()> {
        if let Some(name) = &spec.weights {
            self.load_weights(store, name)?;
        }

        if let Policy::Hierarchical(policy) = self {
            for (sub, sub_spec) in policy.sub_models_mut().iter_mut().zip(&spec.sub_models) {
                sub.load_spec_weights(sub_spec, store)?;
            }
        }
        Ok(())
    }
}
