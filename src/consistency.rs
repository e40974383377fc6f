//! Effective-consistency resolution.
//!
//! Three override layers, highest wins: the per-call override, the active
//! flush context's override, then the entity's static default. When all are
//! absent the driver/session default applies. Resolution happens when a
//! statement is built, not at flush time, so two statements queued under
//! different overrides keep their own resolved levels.

use crate::types::ConsistencyLevel;

pub fn resolve(
    per_call: Option<ConsistencyLevel>,
    context: Option<ConsistencyLevel>,
    entity_default: Option<ConsistencyLevel>,
) -> Option<ConsistencyLevel> {
    per_call.or(context).or(entity_default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ConsistencyLevel::*;

    #[test]
    fn test_per_call_wins() {
        assert_eq!(resolve(Some(All), Some(Quorum), Some(One)), Some(All));
    }

    #[test]
    fn test_context_beats_entity_default() {
        assert_eq!(resolve(None, Some(Quorum), Some(One)), Some(Quorum));
    }

    #[test]
    fn test_entity_default_as_fallback() {
        assert_eq!(resolve(None, None, Some(LocalQuorum)), Some(LocalQuorum));
    }

    #[test]
    fn test_all_absent_leaves_driver_default() {
        assert_eq!(resolve(None, None, None), None);
    }
}
