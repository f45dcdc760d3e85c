//! Weight snapshots on disk and the training setup re-established on load

use std::path::{Path, PathBuf};

use burn::module::Module;
use burn::nn::loss::{MseLoss, Reduction};
use burn::optim::RmsPropConfig;
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use burn::tensor::ElementConversion;

use crate::error::{PolicyError, Result};

/// Directory weights live in unless configured otherwise.
pub const DEFAULT_WEIGHTS_DIR: &str = "../data/model_weights";

/// Learning rate of the RMSprop optimizer policies train with.
pub const LEARNING_RATE: f64 = 1e-4;

/// Named weight snapshots under one directory, one file per name.
#[derive(Debug, Clone)]
pub struct WeightStore {
    dir: PathBuf,
}

impl WeightStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Snapshot path for `name`. The recorder adds its own extension.
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Replace `module`'s parameters with the snapshot called `name`.
    pub fn load<B: Backend, M: Module<B>>(
        &self,
        module: M,
        name: &str,
        device: &B::Device,
    ) -> Result<M> {
        let path = self.path(name);
        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        let module = module
            .load_file(path.clone(), &recorder, device)
            .map_err(|err| PolicyError::Weights {
                path: path.clone(),
                reason: format!("{err:?}"),
            })?;
        tracing::info!("Loaded weights from {}", path.display());
        Ok(module)
    }

    /// Write `module`'s parameters as `name`, overwriting any previous snapshot.
    pub fn save<B: Backend, M: Module<B>>(&self, module: M, name: &str) -> Result<()> {
        std::fs::create_dir_all(&self.dir).map_err(|source| PolicyError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let path = self.path(name);
        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        module
            .save_file(path.clone(), &recorder)
            .map_err(|err| PolicyError::Weights {
                path: path.clone(),
                reason: format!("{err:?}"),
            })?;
        tracing::info!("Saved weights to {}", path.display());
        Ok(())
    }
}

impl Default for WeightStore {
    fn default() -> Self {
        Self::new(DEFAULT_WEIGHTS_DIR)
    }
}

/// Metrics recorded alongside the loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    /// Fraction of samples whose arg-max matches the target's
    Accuracy,
}

/// Optimizer, loss and metrics a network is trained with.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSetup {
    pub learning_rate: f64,
    pub metrics: Vec<Metric>,
}

/// Loss and tracked metrics for one batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub loss: f32,
    pub accuracy: Option<f32>,
}

impl TrainingSetup {
    /// RMSprop on mean-squared error, no metrics.
    pub fn regression() -> Self {
        Self {
            learning_rate: LEARNING_RATE,
            metrics: Vec::new(),
        }
    }

    pub fn with_metric(mut self, metric: Metric) -> Self {
        if !self.metrics.contains(&metric) {
            self.metrics.push(metric);
        }
        self
    }

    pub fn tracks(&self, metric: Metric) -> bool {
        self.metrics.contains(&metric)
    }

    pub fn optimizer(&self) -> RmsPropConfig {
        RmsPropConfig::new()
    }

    /// Mean-squared error between predicted and target values.
    pub fn loss<B: Backend>(&self, predicted: Tensor<B, 2>, target: Tensor<B, 2>) -> Tensor<B, 1> {
        MseLoss::new().forward(predicted, target, Reduction::Mean)
    }

    /// Loss plus every tracked metric, as host values.
    pub fn evaluate<B: Backend>(&self, predicted: Tensor<B, 2>, target: Tensor<B, 2>) -> Evaluation {
        let accuracy = self.tracks(Metric::Accuracy).then(|| {
            predicted
                .clone()
                .argmax(1)
                .equal(target.clone().argmax(1))
                .float()
                .mean()
                .into_scalar()
                .elem::<f32>()
        });
        let loss = self.loss(predicted, target).into_scalar().elem::<f32>();

        Evaluation { loss, accuracy }
    }
}

impl Default for TrainingSetup {
    fn default() -> Self {
        Self::regression()
    }
}
