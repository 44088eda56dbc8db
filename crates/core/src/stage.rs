//! Pure stage transition policy. No I/O; the engine applies the result.

use crate::domain::intent::IntentCategory;
use crate::domain::opportunity::DealStage;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StageResolution {
    pub next: DealStage,
    pub is_terminal: bool,
    /// Whether the intent's stage level is at or beyond the current one.
    /// Cancellation is a forced transition, not forward progress.
    pub is_forward: bool,
}

/// Stage each intent category drives a record toward.
fn target_stage(category: IntentCategory) -> DealStage {
    match category {
        IntentCategory::Schedule => DealStage::Scheduled,
        IntentCategory::Inquire | IntentCategory::Urgent => DealStage::Inquiry,
        IntentCategory::Pay => DealStage::PaymentReady,
        IntentCategory::Cancel => DealStage::Lost,
    }
}

/// Stage a freshly created record starts in. A message with no recognized
/// category still opens a plain inquiry.
pub fn initial_stage(category: Option<IntentCategory>) -> DealStage {
    match category {
        Some(IntentCategory::Cancel) | None => DealStage::Inquiry,
        Some(category) => target_stage(category),
    }
}

/// Resolve the stage an existing record should move to given the latest
/// intent. Cancel always forces `Lost`; any other intent only applies when
/// its level is at or beyond the current one, so an ambiguous later message
/// never regresses a record's progress.
pub fn resolve_stage(current: DealStage, category: Option<IntentCategory>) -> StageResolution {
    if category == Some(IntentCategory::Cancel) {
        return StageResolution { next: DealStage::Lost, is_terminal: true, is_forward: false };
    }

    let Some(category) = category else {
        return StageResolution {
            next: current,
            is_terminal: current.is_terminal(),
            is_forward: false,
        };
    };

    let target = target_stage(category);
    let is_forward = target.level() >= current.level();
    let next = if is_forward { target } else { current };

    StageResolution { next, is_terminal: next.is_terminal(), is_forward }
}

#[cfg(test)]
mod tests {
    use crate::domain::intent::IntentCategory;
    use crate::domain::opportunity::DealStage;

    use super::{initial_stage, resolve_stage};

    #[test]
    fn cancel_forces_lost_from_every_stage() {
        for current in [
            DealStage::Inquiry,
            DealStage::Scheduled,
            DealStage::PaymentReady,
            DealStage::Won,
            DealStage::Lost,
        ] {
            let resolution = resolve_stage(current, Some(IntentCategory::Cancel));
            assert_eq!(resolution.next, DealStage::Lost);
            assert!(resolution.is_terminal);
            assert!(!resolution.is_forward);
        }
    }

    #[test]
    fn forward_intent_advances_the_stage() {
        let resolution = resolve_stage(DealStage::Inquiry, Some(IntentCategory::Schedule));
        assert_eq!(resolution.next, DealStage::Scheduled);
        assert!(resolution.is_forward);
        assert!(!resolution.is_terminal);

        let resolution = resolve_stage(DealStage::Scheduled, Some(IntentCategory::Pay));
        assert_eq!(resolution.next, DealStage::PaymentReady);
        assert!(resolution.is_forward);
    }

    #[test]
    fn lower_level_intent_never_regresses_the_stage() {
        let resolution = resolve_stage(DealStage::PaymentReady, Some(IntentCategory::Inquire));
        assert_eq!(resolution.next, DealStage::PaymentReady);
        assert!(!resolution.is_forward);

        let resolution = resolve_stage(DealStage::Scheduled, Some(IntentCategory::Urgent));
        assert_eq!(resolution.next, DealStage::Scheduled);
        assert!(!resolution.is_forward);
    }

    #[test]
    fn same_level_intent_counts_as_forward_progress() {
        let resolution = resolve_stage(DealStage::Scheduled, Some(IntentCategory::Schedule));
        assert_eq!(resolution.next, DealStage::Scheduled);
        assert!(resolution.is_forward);
    }

    #[test]
    fn missing_category_keeps_the_current_stage() {
        let resolution = resolve_stage(DealStage::Scheduled, None);
        assert_eq!(resolution.next, DealStage::Scheduled);
        assert!(!resolution.is_forward);
        assert!(!resolution.is_terminal);
    }

    #[test]
    fn initial_stage_follows_the_intent_and_defaults_to_inquiry() {
        assert_eq!(initial_stage(Some(IntentCategory::Schedule)), DealStage::Scheduled);
        assert_eq!(initial_stage(Some(IntentCategory::Pay)), DealStage::PaymentReady);
        assert_eq!(initial_stage(Some(IntentCategory::Urgent)), DealStage::Inquiry);
        assert_eq!(initial_stage(None), DealStage::Inquiry);
        // A cancel with no open record never creates (handled upstream), but
        // the policy still answers something sane.
        assert_eq!(initial_stage(Some(IntentCategory::Cancel)), DealStage::Inquiry);
    }
}
