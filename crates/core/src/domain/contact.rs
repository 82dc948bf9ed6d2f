use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::assistant::AssistantId;
use crate::domain::tenant::TenantId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContactId(pub String);

/// One row per (tenant, external channel identity). Created on the first
/// inbound event; the thread id, once assigned, is stable until an explicit
/// reset or close.
#[derive(Clone, Debug, PartialEq)]
pub struct Contact {
    pub id: ContactId,
    pub tenant_id: TenantId,
    pub external_id: String,
    pub display_name: Option<String>,
    pub phone: Option<String>,
    pub thread_id: Option<String>,
    pub assistant_id: Option<AssistantId>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub recall_count: u32,
    pub pending_confirmation: bool,
    pub awaiting_human: bool,
    pub ai_replies_enabled: bool,
    pub crm_deal_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Contact {
    /// The close/reset applied by activity `E` and explicit resets: dialogue
    /// thread, assistant assignment, recall counter, and the confirmation and
    /// awaiting-human flags all go back to their initial state.
    pub fn reset(&mut self) {
        self.thread_id = None;
        self.assistant_id = None;
        self.last_message_at = None;
        self.recall_count = 0;
        self.pending_confirmation = false;
        self.awaiting_human = false;
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::domain::assistant::AssistantId;
    use crate::domain::tenant::TenantId;

    use super::{Contact, ContactId};

    #[test]
    fn reset_clears_thread_assistant_counter_and_flags() {
        let mut contact = Contact {
            id: ContactId("c-1".to_string()),
            tenant_id: TenantId("t-1".to_string()),
            external_id: "5511999990000@c.us".to_string(),
            display_name: Some("Ana".to_string()),
            phone: Some("5511999990000".to_string()),
            thread_id: Some("thread_abc".to_string()),
            assistant_id: Some(AssistantId("a-1".to_string())),
            last_message_at: Some(Utc::now()),
            recall_count: 2,
            pending_confirmation: true,
            awaiting_human: true,
            ai_replies_enabled: true,
            crm_deal_id: Some("deal-9".to_string()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        contact.reset();

        assert_eq!(contact.thread_id, None);
        assert_eq!(contact.assistant_id, None);
        assert_eq!(contact.last_message_at, None);
        assert_eq!(contact.recall_count, 0);
        assert!(!contact.pending_confirmation);
        assert!(!contact.awaiting_human);
        // Identity and CRM linkage survive a reset.
        assert_eq!(contact.external_id, "5511999990000@c.us");
        assert_eq!(contact.crm_deal_id.as_deref(), Some("deal-9"));
        assert!(contact.ai_replies_enabled);
    }
}
