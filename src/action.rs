//! Discrete actions and ordered action sets

use std::fmt;
use std::ops::Index;

use crate::values::{masked_softmax, softmax, tempered_softmax};

/// A discrete action, expressed as the button states sent to the game.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Action(Vec<u8>);

impl Action {
    pub fn new(buttons: &[u8]) -> Self {
        Self(buttons.to_vec())
    }

    pub fn buttons(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Action {
    fn from(buttons: Vec<u8>) -> Self {
        Self(buttons)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

/// Ordered action vocabulary. Index `i` of a value vector refers to `self[i]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionSet(Vec<Action>);

impl ActionSet {
    pub fn new(actions: Vec<Action>) -> Self {
        Self(actions)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Action> {
        self.0.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Action> {
        self.0.iter()
    }

    pub fn contains(&self, action: &Action) -> bool {
        self.position(action).is_some()
    }

    /// Index of `action` in this set.
    pub fn position(&self, action: &Action) -> Option<usize> {
        self.0.iter().position(|a| a == action)
    }

    /// Re-index `values` (aligned with this set) onto `target`.
    ///
    /// Each target position takes the value of the matching action in this
    /// set. Target actions unknown to this set get 0.0, and actions of this
    /// set missing from `target` are dropped.
    pub fn project(&self, values: &[f32], target: &ActionSet) -> Projection {
        debug_assert_eq!(values.len(), self.len());

        let mut projected = vec![0.0; target.len()];
        let mut matched = vec![false; target.len()];
        for (slot, action) in target.iter().enumerate() {
            if let Some(value) = self.position(action).and_then(|i| values.get(i)) {
                projected[slot] = *value;
                matched[slot] = true;
            }
        }

        Projection {
            values: projected,
            matched,
        }
    }
}

impl Index<usize> for ActionSet {
    type Output = Action;

    fn index(&self, index: usize) -> &Action {
        &self.0[index]
    }
}

impl FromIterator<Action> for ActionSet {
    fn from_iter<I: IntoIterator<Item = Action>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<Vec<Vec<u8>>> for ActionSet {
    fn from(actions: Vec<Vec<u8>>) -> Self {
        actions.into_iter().map(Action::from).collect()
    }
}

/// Values re-indexed onto a target vocabulary.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    /// One value per target position, 0.0 where unmatched.
    pub values: Vec<f32>,
    /// Whether the target position matched an action of the source set.
    pub matched: Vec<bool>,
}

impl Projection {
    /// Plain softmax over every target position, unmatched ones included.
    pub fn softmax(&self) -> Vec<f32> {
        softmax(&self.values)
    }

    /// Tempered softmax over every target position, unmatched ones included.
    pub fn tempered_softmax(&self, temperature: f32) -> Vec<f32> {
        tempered_softmax(&self.values, temperature)
    }

    /// Tempered softmax restricted to matched positions.
    pub fn masked_softmax(&self, temperature: f32) -> Vec<f32> {
        masked_softmax(&self.values, &self.matched, temperature)
    }
}
