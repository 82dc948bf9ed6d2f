//! Re-engagement eligibility. The cutoff formulas are a compatibility
//! surface: `standard_cutoff = now - timeout_minutes` (default 60) with
//! `recall_count < max_attempts - 1`, and `final_cutoff = now -
//! final_timeout_minutes` (default 1440) with `recall_count ==
//! max_attempts - 1`.

use chrono::{DateTime, Duration, Utc};

use crate::domain::contact::Contact;
use crate::domain::tenant::RecallSettings;
use crate::wire::InstructionAction;

/// Which follow-up a contact qualifies for: one more nudge, or the last
/// allowed attempt that asks the assistant to wrap the conversation up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecallKind {
    Standard,
    Final,
}

impl RecallKind {
    /// The instruction the driver runs for this attempt.
    pub fn instruction_action(&self) -> InstructionAction {
        match self {
            Self::Standard => InstructionAction::ResumeConversation,
            Self::Final => InstructionAction::CloseConversation,
        }
    }
}

/// The two cutoff instants for one sweep evaluation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecallCutoffs {
    pub standard: DateTime<Utc>,
    pub r#final: DateTime<Utc>,
}

pub fn recall_cutoffs(settings: &RecallSettings, now: DateTime<Utc>) -> RecallCutoffs {
    RecallCutoffs {
        standard: now - Duration::minutes(settings.standard_timeout_minutes()),
        r#final: now - Duration::minutes(settings.final_timeout_minutes()),
    }
}

/// Decides whether `contact` is due a follow-up at `now`. Contacts that
/// opted out of AI replies, are waiting on a human, or (when the tenant says
/// so) have a pending appointment confirmation never qualify.
pub fn recall_eligibility(
    settings: &RecallSettings,
    contact: &Contact,
    now: DateTime<Utc>,
) -> Option<RecallKind> {
    if !settings.enabled || !contact.ai_replies_enabled || contact.awaiting_human {
        return None;
    }
    if settings.skips_pending_confirmation && contact.pending_confirmation {
        return None;
    }
    let last_message = contact.last_message_at?;
    if settings.max_attempts == 0 {
        return None;
    }

    let cutoffs = recall_cutoffs(settings, now);
    let final_attempt = settings.max_attempts - 1;

    if contact.recall_count < final_attempt && last_message <= cutoffs.standard {
        return Some(RecallKind::Standard);
    }
    if contact.recall_count == final_attempt && last_message <= cutoffs.r#final {
        return Some(RecallKind::Final);
    }
    None
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use crate::domain::contact::{Contact, ContactId};
    use crate::domain::tenant::{RecallSettings, TenantId};
    use crate::wire::InstructionAction;

    use super::{recall_cutoffs, recall_eligibility, RecallKind};

    fn settings() -> RecallSettings {
        RecallSettings {
            enabled: true,
            timeout_minutes: Some(60),
            final_timeout_minutes: Some(1440),
            max_attempts: 3,
            skips_pending_confirmation: false,
        }
    }

    fn contact(minutes_ago: i64, recall_count: u32) -> Contact {
        let now = Utc::now();
        Contact {
            id: ContactId("c-1".to_string()),
            tenant_id: TenantId("t-1".to_string()),
            external_id: "5511999990000".to_string(),
            display_name: None,
            phone: None,
            thread_id: Some("thread_abc".to_string()),
            assistant_id: None,
            last_message_at: Some(now - Duration::minutes(minutes_ago)),
            recall_count,
            pending_confirmation: false,
            awaiting_human: false,
            ai_replies_enabled: true,
            crm_deal_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn sixty_one_minutes_idle_with_zero_attempts_is_standard() {
        let eligibility = recall_eligibility(&settings(), &contact(61, 0), Utc::now());
        assert_eq!(eligibility, Some(RecallKind::Standard));
    }

    #[test]
    fn final_attempt_waits_for_the_final_cutoff() {
        let now = Utc::now();
        // recall_count == max_attempts - 1: past the standard cutoff but not
        // the final one, so not yet eligible.
        assert_eq!(recall_eligibility(&settings(), &contact(61, 2), now), None);
        // At the final cutoff it becomes a final recall.
        assert_eq!(recall_eligibility(&settings(), &contact(1441, 2), now), Some(RecallKind::Final));
    }

    #[test]
    fn exhausted_attempts_never_qualify() {
        assert_eq!(recall_eligibility(&settings(), &contact(10_000, 3), Utc::now()), None);
    }

    #[test]
    fn opted_out_and_awaiting_human_contacts_are_skipped() {
        let now = Utc::now();

        let mut muted = contact(61, 0);
        muted.ai_replies_enabled = false;
        assert_eq!(recall_eligibility(&settings(), &muted, now), None);

        let mut waiting = contact(61, 0);
        waiting.awaiting_human = true;
        assert_eq!(recall_eligibility(&settings(), &waiting, now), None);
    }

    #[test]
    fn pending_confirmation_is_skipped_only_when_the_tenant_says_so() {
        let now = Utc::now();
        let mut pending = contact(61, 0);
        pending.pending_confirmation = true;

        assert_eq!(recall_eligibility(&settings(), &pending, now), Some(RecallKind::Standard));

        let strict = RecallSettings { skips_pending_confirmation: true, ..settings() };
        assert_eq!(recall_eligibility(&strict, &pending, now), None);
    }

    #[test]
    fn cutoffs_use_defaults_when_timeouts_are_unset() {
        let now = Utc::now();
        let defaults = RecallSettings { enabled: true, ..RecallSettings::default() };
        let cutoffs = recall_cutoffs(&defaults, now);
        assert_eq!((now - cutoffs.standard).num_minutes(), 60);
        assert_eq!((now - cutoffs.r#final).num_minutes(), 1440);
    }

    #[test]
    fn recall_kinds_map_to_resume_and_close_instructions() {
        assert_eq!(
            RecallKind::Standard.instruction_action(),
            InstructionAction::ResumeConversation
        );
        assert_eq!(RecallKind::Final.instruction_action(), InstructionAction::CloseConversation);
    }
}
