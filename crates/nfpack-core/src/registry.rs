//! Tracks which function descriptors the service descriptor requires and
//! which of those have been packaged.

use nfpack_schema::FunctionId;
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionState {
    Registered,
    Packaged,
}

impl fmt::Display for FunctionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FunctionState::Registered => f.write_str("registered"),
            FunctionState::Packaged => f.write_str("packaged"),
        }
    }
}

/// Registry of required FunctionIds.
///
/// Each id moves through absent → `Registered` → `Packaged`. Any other
/// transition is refused with `false` and leaves the registry unchanged.
#[derive(Debug, Default)]
pub struct DependencyRegistry {
    order: Vec<FunctionId>,
    states: HashMap<FunctionId, FunctionState>,
}

impl DependencyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a required id. Returns `false` if it was already present.
    pub fn register(&mut self, id: &FunctionId) -> bool {
        if self.states.contains_key(id) {
            debug!("{id} already registered");
            return false;
        }
        self.states.insert(id.clone(), FunctionState::Registered);
        self.order.push(id.clone());
        true
    }

    /// Mark a registered id as packaged. Returns `false` if the id is not
    /// registered or was already packaged.
    pub fn mark_packaged(&mut self, id: &FunctionId) -> bool {
        match self.states.get_mut(id) {
            Some(state) if *state == FunctionState::Registered => {
                *state = FunctionState::Packaged;
                true
            }
            _ => false,
        }
    }

    pub fn state(&self, id: &FunctionId) -> Option<FunctionState> {
        self.states.get(id).copied()
    }

    pub fn is_registered(&self, id: &FunctionId) -> bool {
        self.states.contains_key(id)
    }

    /// Registered ids not yet packaged, in registration order.
    pub fn unresolved(&self) -> Vec<FunctionId> {
        self.order
            .iter()
            .filter(|id| self.states.get(*id) == Some(&FunctionState::Registered))
            .cloned()
            .collect()
    }

    /// Every registered id, in registration order.
    pub fn ids(&self) -> &[FunctionId] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
