//! Hierarchical DQN policy delegating to sub-policies

use burn::prelude::*;

use super::{Compiled, Distribution, Policy, Selection, checked_q_values};
use crate::action::{Action, ActionSet};
use crate::env::Environment;
use crate::error::{PolicyError, Result};
use crate::frame::{HistoryBuffer, Perception};
use crate::network::QFunction;
use crate::values::{HIERARCHICAL_TEMPERATURE, argmax};
use crate::weights::{Metric, TrainingSetup, WeightStore};

/// Composite policy: the network scores every native action plus one
/// "hand control to sub-policy k" slot per registered sub-policy.
///
/// Each sub-policy sees the environment through its own perception, so the
/// policy keeps one frame history per sub-policy, sized by that sub-policy's
/// `nb_frames`.
#[derive(Debug)]
pub struct HierarchicalPolicy<B: Backend, N: QFunction<B>> {
    compiled: Compiled<N>,
    actions: ActionSet,
    sub_models: Vec<Policy<B, N>>,
    sub_histories: Vec<HistoryBuffer>,
    perception: Perception,
    nb_frames: usize,
    skill_frame_skip: usize,
    device: B::Device,
}

impl<B: Backend, N: QFunction<B>> HierarchicalPolicy<B, N> {
    pub fn new(
        network: N,
        actions: ActionSet,
        sub_models: Vec<Policy<B, N>>,
        perception: Perception,
        nb_frames: usize,
        device: B::Device,
    ) -> Self {
        let sub_histories = sub_models
            .iter()
            .map(|model| HistoryBuffer::new(model.nb_frames()))
            .collect();

        Self {
            compiled: Compiled::new(network),
            actions,
            sub_models,
            sub_histories,
            perception,
            nb_frames,
            skill_frame_skip: 0,
            device,
        }
    }

    pub fn with_skill_frame_skip(mut self, skill_frame_skip: usize) -> Self {
        self.skill_frame_skip = skill_frame_skip;
        self
    }

    /// Native actions only; sub-policy slots follow them in the output.
    pub fn actions(&self) -> &ActionSet {
        &self.actions
    }

    pub fn sub_models(&self) -> &[Policy<B, N>] {
        &self.sub_models
    }

    pub(crate) fn sub_models_mut(&mut self) -> &mut [Policy<B, N>] {
        &mut self.sub_models
    }

    /// History kept for sub-policy `index`.
    pub fn sub_history(&self, index: usize) -> Option<&HistoryBuffer> {
        self.sub_histories.get(index)
    }

    pub fn perception(&self) -> Perception {
        self.perception
    }

    pub fn nb_frames(&self) -> usize {
        self.nb_frames
    }

    pub fn skill_frame_skip(&self) -> usize {
        self.skill_frame_skip
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

    pub fn output_size(&self) -> usize {
        self.actions.len() + self.sub_models.len()
    }

    pub fn selection(&self, index: usize) -> Selection {
        let native = self.actions.len();
        if index < native {
            Selection::Native(index)
        } else {
            Selection::SubModel(index - native)
        }
    }

    /// Raw values of the first sample of `batch` over the whole output.
    pub fn q_values(&self, batch: Tensor<B, 4>) -> Result<Vec<f32>> {
        checked_q_values(&self.compiled.network, batch, self.output_size())
    }

    /// Push one freshly rendered frame into every sub-policy's history,
    /// descending into nested hierarchies so each buffer advances once per call.
    pub fn update_sub_model_frames<E: Environment>(&mut self, env: &mut E) -> Result<()> {
        for (model, history) in self.sub_models.iter_mut().zip(self.sub_histories.iter_mut()) {
            history.push(env.processed_state(model.perception()))?;
            if let Policy::Hierarchical(nested) = model {
                nested.update_sub_model_frames(env)?;
            }
        }
        Ok(())
    }

    /// # Panics
    ///
    /// Panics if `index` is not below [`HierarchicalPolicy::output_size`].
    pub fn predict<E: Environment>(&mut self, env: &mut E, index: usize) -> Result<Action> {
        self.update_sub_model_frames(env)?;
        self.act(index)
    }

    /// Resolve `index` on histories that are already current.
    fn act(&self, index: usize) -> Result<Action> {
        match self.selection(index) {
            Selection::Native(index) => Ok(self.actions[index].clone()),
            Selection::SubModel(sub) => {
                let model = &self.sub_models[sub];
                let sub_index = argmax(&model.q_values(self.sub_batch(sub)?)?)
                    .ok_or(PolicyError::EmptyActionSpace)?;
                tracing::debug!("Delegating to sub-policy {} (its output {})", sub, sub_index);
                match model {
                    Policy::Flat(leaf) => Ok(leaf.predict(sub_index).clone()),
                    Policy::Hierarchical(nested) => nested.act(sub_index),
                }
            }
        }
    }

    /// Tempered softmax over `target` of the values of whichever policy is
    /// responsible for the chosen output.
    ///
    /// The chosen output is `forced` when given, the arg-max of this
    /// policy's values otherwise. A native choice projects the native values;
    /// a sub-policy choice follows delegation down to the acting leaf and
    /// projects that leaf's values. On a native choice, target positions this
    /// policy does not know take part with value 0. On a sub-policy choice
    /// they get probability zero.
    pub fn softmax_q_values(
        &self,
        batch: Tensor<B, 4>,
        target: &ActionSet,
        forced: Option<usize>,
    ) -> Result<Distribution> {
        let values = self.q_values(batch)?;
        let index = match forced {
            Some(index) => index,
            None => argmax(&values).ok_or(PolicyError::EmptyActionSpace)?,
        };

        let selection = self.selection(index);
        let (actions, leaf_values) = self.expand(selection, values)?;
        let projection = actions.project(&leaf_values, target);
        let probabilities = match selection {
            Selection::Native(_) => projection.tempered_softmax(HIERARCHICAL_TEMPERATURE),
            Selection::SubModel(_) => {
                if !target.is_empty() && !projection.matched.contains(&true) {
                    tracing::warn!(
                        "Acting policy shares none of the {} target actions, using uniform",
                        target.len()
                    );
                }
                projection.masked_softmax(HIERARCHICAL_TEMPERATURE)
            }
        };

        Ok(Distribution {
            probabilities,
            selection: Some(selection),
        })
    }

    pub(crate) fn resolve_leaf(&self, batch: Tensor<B, 4>) -> Result<(&ActionSet, Vec<f32>)> {
        let values = self.q_values(batch)?;
        let index = argmax(&values).ok_or(PolicyError::EmptyActionSpace)?;
        self.expand(self.selection(index), values)
    }

    fn expand(&self, selection: Selection, mut values: Vec<f32>) -> Result<(&ActionSet, Vec<f32>)> {
        match selection {
            Selection::Native(_) => {
                values.truncate(self.actions.len());
                Ok((&self.actions, values))
            }
            Selection::SubModel(sub) => self.sub_models[sub].resolve_leaf(self.sub_batch(sub)?),
        }
    }

    fn sub_batch(&self, sub: usize) -> Result<Tensor<B, 4>> {
        self.sub_histories[sub]
            .to_tensor(&self.device)
            .ok_or(PolicyError::EmptyHistory {
                sub_model: Some(sub),
            })
    }

    /// Load this policy's own network. Sub-policies keep their weights.
    pub fn load_weights(&mut self, store: &WeightStore, name: &str) -> Result<()> {
        let setup = TrainingSetup::regression().with_metric(Metric::Accuracy);
        self.compiled = self.compiled.reload::<B>(store, name, &self.device, setup)?;
        Ok(())
    }

    pub fn save_weights(&self, store: &WeightStore, name: &str) -> Result<()> {
        store.save::<B, N>(self.compiled.network.clone(), name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::FlatPolicy;
    use crate::test_support::{FixedQ, ScriptedEnvironment, actions, scratch_dir};
    use burn::backend::NdArray;

    type TestBackend = NdArray;
    type TestPolicy = Policy<TestBackend, FixedQ<TestBackend>>;

    fn leaf(values: &[f32], buttons: &[&[u8]], radius: f32, nb_frames: usize) -> TestPolicy {
        let device = Default::default();
        Policy::Flat(FlatPolicy::new(
            FixedQ::new(values, &device),
            actions(buttons),
            Perception::new(radius, 0.5),
            nb_frames,
            device,
        ))
    }

    fn hierarchy(
        values: &[f32],
        buttons: &[&[u8]],
        sub_models: Vec<TestPolicy>,
    ) -> HierarchicalPolicy<TestBackend, FixedQ<TestBackend>> {
        let device = Default::default();
        HierarchicalPolicy::new(
            FixedQ::new(values, &device),
            actions(buttons),
            sub_models,
            Perception::default(),
            2,
            device,
        )
    }

    /// Two native actions, one sub-policy with two actions of its own.
    fn two_level() -> HierarchicalPolicy<TestBackend, FixedQ<TestBackend>> {
        let sub = leaf(&[0.2, 0.7], &[&[0, 0, 1], &[0, 1, 1]], 0.5, 3);
        hierarchy(&[0.1, 0.3, 0.9], &[&[1, 0, 0], &[0, 1, 0]], vec![sub])
    }

    fn batch() -> Tensor<TestBackend, 4> {
        let mut history = HistoryBuffer::new(2);
        history.push(ScriptedEnvironment::frame_at(0)).unwrap();
        history.to_tensor(&Default::default()).unwrap()
    }

    #[test]
    fn test_cold_start_fills_each_sub_history() {
        let mut policy = hierarchy(
            &[0.0; 3],
            &[&[1, 0]],
            vec![leaf(&[0.0], &[&[0, 1]], 0.5, 3), leaf(&[0.0], &[&[1, 1]], 2.0, 2)],
        );
        let mut env = ScriptedEnvironment {
            tick: 7,
            ..Default::default()
        };

        policy.update_sub_model_frames(&mut env).unwrap();

        for (index, expected_len) in [(0, 3), (1, 2)] {
            let history = policy.sub_history(index).unwrap();
            assert_eq!(history.len(), expected_len);
            assert!(history.frames().all(|f| *f == ScriptedEnvironment::frame_at(7)));
        }
        assert_eq!(
            env.requests,
            vec![Perception::new(0.5, 0.5), Perception::new(2.0, 0.5)]
        );
    }

    #[test]
    fn test_sub_history_slides() {
        let mut policy = two_level();
        let mut env = ScriptedEnvironment::default();

        for _ in 0..5 {
            env.advance();
            policy.update_sub_model_frames(&mut env).unwrap();
        }

        let history = policy.sub_history(0).unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history.newest(), Some(&ScriptedEnvironment::frame_at(5)));
        assert_eq!(history.oldest(), Some(&ScriptedEnvironment::frame_at(3)));
    }

    #[test]
    fn test_predict_native_action() {
        let mut policy = two_level();
        let mut env = ScriptedEnvironment::default();

        let action = policy.predict(&mut env, 1).unwrap();
        assert_eq!(action, policy.actions()[1]);
        // histories are refreshed even when no delegation happens
        assert_eq!(policy.sub_history(0).unwrap().len(), 3);
    }

    #[test]
    fn test_predict_delegates_to_sub_arg_max() {
        let mut policy = two_level();
        let mut env = ScriptedEnvironment::default();

        let action = policy.predict(&mut env, 2).unwrap();

        let sub_actions = policy.sub_models()[0].actions();
        assert_eq!(action, sub_actions[1]);
        assert!(!policy.actions().contains(&action));
    }

    #[test]
    #[should_panic]
    fn test_predict_out_of_range_panics() {
        let mut policy = two_level();
        let _ = policy.predict(&mut ScriptedEnvironment::default(), 3);
    }

    #[test]
    fn test_predict_recurses_through_nested_hierarchy() {
        let leaf = leaf(&[0.3, 0.1], &[&[0, 0, 0, 1], &[0, 0, 1, 1]], 0.5, 2);
        let middle: TestPolicy = hierarchy(&[0.0, 1.0], &[&[0, 1, 0, 0]], vec![leaf]).into();
        let mut top = hierarchy(&[0.0, 1.0], &[&[1, 0, 0, 0]], vec![middle]);
        let mut env = ScriptedEnvironment::default();

        let action = top.predict(&mut env, 1).unwrap();
        assert_eq!(action.buttons(), &[0, 0, 0, 1]);
    }

    #[test]
    fn test_softmax_native_choice_projects_native_values() {
        let policy = two_level();
        let target = actions(&[&[0, 1, 0], &[1, 0, 0], &[1, 1, 1]]);

        let distribution = policy.softmax_q_values(batch(), &target, Some(0)).unwrap();

        assert_eq!(distribution.selection, Some(Selection::Native(0)));
        // the unknown [1, 1, 1] keeps a zero value but still takes probability mass
        let exps = [0.3f32, 0.1, 0.0].map(|v| (v / HIERARCHICAL_TEMPERATURE).exp());
        let sum: f32 = exps.iter().sum();
        for (p, e) in distribution.probabilities.iter().zip(exps) {
            assert!((p - e / sum).abs() < 1e-5, "{p} != {}", e / sum);
        }
        assert!(distribution.probabilities[2] > 0.0);
    }

    #[test]
    fn test_softmax_delegate_reflects_leaf_actions() {
        let mut policy = two_level();
        policy
            .update_sub_model_frames(&mut ScriptedEnvironment::default())
            .unwrap();
        let target = actions(&[&[0, 1, 1], &[1, 0, 0], &[0, 0, 1], &[1, 1, 1]]);

        let distribution = policy.softmax_q_values(batch(), &target, None).unwrap();

        assert_eq!(distribution.selection, Some(Selection::SubModel(0)));
        let p = &distribution.probabilities;
        let sub_actions = policy.sub_models()[0].actions();
        for (slot, action) in target.iter().enumerate() {
            assert_eq!(p[slot] > 0.0, sub_actions.contains(action), "slot {slot}");
        }
        let expected = 1.0 / (1.0 + ((0.2f32 - 0.7) / HIERARCHICAL_TEMPERATURE).exp());
        assert!((p[0] - expected).abs() < 1e-5);
        assert!((p.iter().sum::<f32>() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_softmax_follows_nested_delegation_to_leaf() {
        let leaf = leaf(&[0.3, 0.1], &[&[0, 0, 0, 1], &[0, 0, 1, 1]], 0.5, 2);
        let middle: TestPolicy = hierarchy(&[0.0, 1.0], &[&[0, 1, 0, 0]], vec![leaf]).into();
        let mut top = hierarchy(&[0.0, 1.0], &[&[1, 0, 0, 0]], vec![middle]);
        top.predict(&mut ScriptedEnvironment::default(), 1).unwrap();
        let target = actions(&[&[0, 1, 0, 0], &[0, 0, 0, 1]]);

        let distribution = top.softmax_q_values(batch(), &target, None).unwrap();

        assert_eq!(distribution.selection, Some(Selection::SubModel(0)));
        assert_eq!(distribution.probabilities, vec![0.0, 1.0]);
    }

    #[test]
    fn test_softmax_without_shared_actions_is_uniform() {
        let mut policy = two_level();
        policy
            .update_sub_model_frames(&mut ScriptedEnvironment::default())
            .unwrap();
        let target = actions(&[&[1, 1, 1], &[1, 0, 1]]);

        let distribution = policy.softmax_q_values(batch(), &target, Some(2)).unwrap();
        assert_eq!(distribution.selection, Some(Selection::SubModel(0)));
        assert_eq!(distribution.probabilities, vec![0.5, 0.5]);
    }

    fn nested() -> HierarchicalPolicy<TestBackend, FixedQ<TestBackend>> {
        let leaf = leaf(&[0.3, 0.1], &[&[0, 0, 0, 1], &[0, 0, 1, 1]], 0.5, 2);
        let middle: TestPolicy = hierarchy(&[0.0, 1.0], &[&[0, 1, 0, 0]], vec![leaf]).into();
        hierarchy(&[1.0, 0.0], &[&[1, 0, 0, 0]], vec![middle])
    }

    fn middle_history(
        top: &HierarchicalPolicy<TestBackend, FixedQ<TestBackend>>,
    ) -> &HistoryBuffer {
        let Policy::Hierarchical(middle) = &top.sub_models()[0] else {
            panic!("expected a nested hierarchy");
        };
        middle.sub_history(0).unwrap()
    }

    #[test]
    fn test_nested_histories_refresh_without_delegation() {
        let mut top = nested();
        let mut env = ScriptedEnvironment::default();
        for _ in 0..3 {
            env.advance();
            top.predict(&mut env, 0).unwrap();
        }
        assert_eq!(middle_history(&top).newest(), Some(&ScriptedEnvironment::frame_at(3)));

        let target = actions(&[&[0, 0, 0, 1], &[0, 0, 1, 1]]);
        let distribution = top.softmax_q_values(batch(), &target, Some(1)).unwrap();

        assert_eq!(distribution.selection, Some(Selection::SubModel(0)));
        let expected = 1.0 / (1.0 + ((0.1f32 - 0.3) / HIERARCHICAL_TEMPERATURE).exp());
        assert!((distribution.probabilities[0] - expected).abs() < 1e-5);
    }

    #[test]
    fn test_delegation_advances_nested_history_once_per_tick() {
        let mut top = nested();
        let mut env = ScriptedEnvironment::default();
        for _ in 0..3 {
            env.advance();
            let action = top.predict(&mut env, 1).unwrap();
            assert_eq!(action.buttons(), &[0, 0, 0, 1]);
        }

        let history = middle_history(&top);
        assert_eq!(history.oldest(), Some(&ScriptedEnvironment::frame_at(2)));
        assert_eq!(history.newest(), Some(&ScriptedEnvironment::frame_at(3)));
    }

    #[test]
    fn test_softmax_before_any_update_fails() {
        let policy = two_level();
        let target = actions(&[&[0, 1, 1]]);

        let err = policy.softmax_q_values(batch(), &target, None).unwrap_err();
        assert!(matches!(err, PolicyError::EmptyHistory { sub_model: Some(0) }));
    }

    #[test]
    fn test_softmax_is_idempotent() {
        let mut policy = two_level();
        policy
            .update_sub_model_frames(&mut ScriptedEnvironment::default())
            .unwrap();
        let target = actions(&[&[0, 0, 1], &[0, 1, 1]]);

        let first = policy.softmax_q_values(batch(), &target, None).unwrap();
        let second = policy.softmax_q_values(batch(), &target, None).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_load_tracks_accuracy() {
        let store = WeightStore::new(scratch_dir("hierarchical_load"));
        two_level().save_weights(&store, "hdqn").unwrap();

        let sub = leaf(&[0.0, 0.0], &[&[0, 0, 1], &[0, 1, 1]], 0.5, 3);
        let mut policy = hierarchy(&[0.0; 3], &[&[1, 0, 0], &[0, 1, 0]], vec![sub]);
        assert!(!policy.training().tracks(Metric::Accuracy));

        policy.load_weights(&store, "hdqn").unwrap();

        assert!(policy.training().tracks(Metric::Accuracy));
        assert_eq!(policy.q_values(batch()).unwrap(), vec![0.1, 0.3, 0.9]);
    }
}
