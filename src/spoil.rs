//! Spoiled-reference policy: what to do with a reference whose terminal
//! state this run is not good.

use std::collections::HashMap;

use crate::reference::RefState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpoilAction {
    /// Leave the previously committed document alone.
    Ignore,
    /// Ask the committer to remove the previously committed document.
    Delete,
    /// Tolerate one bad run; delete on the next one if still spoiled.
    GraceOnce,
}

/// Action applied when a policy has no mapping for a state.
pub const DEFAULT_SPOIL_ACTION: SpoilAction = SpoilAction::Delete;

pub trait SpoilPolicy: Send + Sync {
    /// Resolve the action for a spoiled reference. `None` means the policy
    /// has no opinion and the engine applies [`DEFAULT_SPOIL_ACTION`].
    fn resolve(&self, reference: &str, state: RefState) -> Option<SpoilAction>;
}

/// Per-state mapping with a configurable fallback.
pub struct GenericSpoilPolicy {
    mappings: HashMap<RefState, SpoilAction>,
    fallback: SpoilAction,
}

impl GenericSpoilPolicy {
    pub fn new() -> Self {
        let mut mappings = HashMap::new();
        mappings.insert(RefState::NotFound, SpoilAction::Delete);
        mappings.insert(RefState::BadStatus, SpoilAction::GraceOnce);
        mappings.insert(RefState::Error, SpoilAction::GraceOnce);
        Self {
            mappings,
            fallback: DEFAULT_SPOIL_ACTION,
        }
    }

    pub fn with_mapping(mut self, state: RefState, action: SpoilAction) -> Self {
        self.mappings.insert(state, action);
        self
    }

    pub fn with_fallback(mut self, fallback: SpoilAction) -> Self {
        self.fallback = fallback;
        self
    }
}

impl Default for GenericSpoilPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl SpoilPolicy for GenericSpoilPolicy {
    fn resolve(&self, _reference: &str, state: RefState) -> Option<SpoilAction> {
        Some(*self.mappings.get(&state).unwrap_or(&self.fallback))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_mappings() {
        let policy = GenericSpoilPolicy::new();
        assert_eq!(
            policy.resolve("a", RefState::NotFound),
            Some(SpoilAction::Delete)
        );
        assert_eq!(
            policy.resolve("a", RefState::BadStatus),
            Some(SpoilAction::GraceOnce)
        );
        assert_eq!(
            policy.resolve("a", RefState::Error),
            Some(SpoilAction::GraceOnce)
        );
    }

    #[test]
    fn test_unmapped_state_uses_fallback() {
        let policy = GenericSpoilPolicy::new();
        assert_eq!(
            policy.resolve("a", RefState::Rejected),
            Some(DEFAULT_SPOIL_ACTION)
        );

        let lenient = GenericSpoilPolicy::new().with_fallback(SpoilAction::Ignore);
        assert_eq!(
            lenient.resolve("a", RefState::Rejected),
            Some(SpoilAction::Ignore)
        );
    }

    #[test]
    fn test_mapping_override() {
        let policy = GenericSpoilPolicy::new().with_mapping(RefState::Error, SpoilAction::Ignore);
        assert_eq!(
            policy.resolve("a", RefState::Error),
            Some(SpoilAction::Ignore)
        );
    }
}
