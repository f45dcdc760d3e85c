//! Greedy control loop that lets a chosen sub-policy keep control for a few ticks

use burn::prelude::*;

use super::{Policy, Selection};
use crate::action::Action;
use crate::env::Environment;
use crate::error::Result;
use crate::frame::HistoryBuffer;
use crate::network::QFunction;

#[derive(Debug, Clone, Copy)]
struct ActiveSkill {
    index: usize,
    remaining: usize,
}

/// Drives a policy greedily, one action per tick.
///
/// When the top-level policy hands control to a sub-policy, that sub-policy
/// is re-entered for the next `skill_frame_skip` ticks without consulting the
/// top-level network. The sub-policy still picks its own best action on
/// every one of those ticks.
#[derive(Debug)]
pub struct SkillRunner<B: Backend, N: QFunction<B>> {
    policy: Policy<B, N>,
    active: Option<ActiveSkill>,
}

impl<B: Backend, N: QFunction<B>> SkillRunner<B, N> {
    pub fn new(policy: Policy<B, N>) -> Self {
        Self {
            policy,
            active: None,
        }
    }

    pub fn policy(&self) -> &Policy<B, N> {
        &self.policy
    }

    pub fn into_policy(self) -> Policy<B, N> {
        self.policy
    }

    /// Sub-policy currently holding control, if any.
    pub fn active_skill(&self) -> Option<usize> {
        self.active
            .and_then(|skill| match self.policy.selection(skill.index) {
                Selection::SubModel(sub) => Some(sub),
                Selection::Native(_) => None,
            })
    }

    /// Choose and resolve the action for this tick. `history` is the
    /// top-level policy's own frame history, already holding this tick's frame.
    pub fn step<E: Environment>(&mut self, env: &mut E, history: &HistoryBuffer) -> Result<Action> {
        let index = match self.active.as_mut() {
            Some(skill) if skill.remaining > 0 => {
                skill.remaining -= 1;
                skill.index
            }
            _ => {
                self.active = None;
                let index = self.policy.greedy_index(history)?;
                let skip = self.policy.skill_frame_skip();
                if skip > 0 && matches!(self.policy.selection(index), Selection::SubModel(_)) {
                    tracing::debug!("Sub-policy slot {} keeps control for {} ticks", index, skip);
                    self.active = Some(ActiveSkill {
                        index,
                        remaining: skip,
                    });
                }
                index
            }
        };

        self.policy.predict(env, index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Perception;
    use crate::policy::{FlatPolicy, HierarchicalPolicy};
    use crate::test_support::{FixedQ, ScriptedEnvironment, actions};
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn runner(top_values: &[f32], skip: usize) -> SkillRunner<TestBackend, FixedQ<TestBackend>> {
        let device: <TestBackend as Backend>::Device = Default::default();
        let sub = FlatPolicy::new(
            FixedQ::new(&[0.0, 1.0], &device),
            actions(&[&[0, 0, 1], &[0, 1, 1]]),
            Perception::new(0.5, 0.5),
            2,
            device.clone(),
        );
        let top = HierarchicalPolicy::new(
            FixedQ::new(top_values, &device),
            actions(&[&[1, 0, 0]]),
            vec![Policy::Flat(sub)],
            Perception::default(),
            1,
            device,
        )
        .with_skill_frame_skip(skip);
        SkillRunner::new(Policy::Hierarchical(top))
    }

    fn history() -> HistoryBuffer {
        let mut history = HistoryBuffer::new(1);
        history.push(ScriptedEnvironment::frame_at(0)).unwrap();
        history
    }

    #[test]
    fn test_native_choice_does_not_start_skill() {
        let mut runner = runner(&[1.0, 0.0], 3);
        let mut env = ScriptedEnvironment::default();

        let action = runner.step(&mut env, &history()).unwrap();
        assert_eq!(action.buttons(), &[1, 0, 0]);
        assert_eq!(runner.active_skill(), None);
    }

    #[test]
    fn test_skill_holds_for_frame_skip_ticks() {
        let mut runner = runner(&[0.0, 1.0], 2);
        let mut env = ScriptedEnvironment::default();
        let history = history();

        for _ in 0..3 {
            let action = runner.step(&mut env, &history).unwrap();
            assert_eq!(action.buttons(), &[0, 1, 1]);
            assert_eq!(runner.active_skill(), Some(0));
        }
        // skip exhausted: the next tick consults the top-level network again
        runner.step(&mut env, &history).unwrap();
        assert_eq!(runner.active_skill(), Some(0));
    }

    #[test]
    fn test_zero_skip_never_holds() {
        let mut runner = runner(&[0.0, 1.0], 0);
        let mut env = ScriptedEnvironment::default();

        let action = runner.step(&mut env, &history()).unwrap();
        assert_eq!(action.buttons(), &[0, 1, 1]);
        assert_eq!(runner.active_skill(), None);
    }
}
