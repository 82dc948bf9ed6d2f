pub mod assistant;
pub mod contact;
pub mod directory;
pub mod tenant;

pub use assistant::{Assistant, AssistantId, AssistantPurpose};
pub use contact::{Contact, ContactId};
pub use directory::{Agenda, BillingAccount, Department, Employee, MediaAsset, MediaKind};
pub use tenant::{
    BillingProvider, CalendarProvider, CancelPolicy, ChatProvider, CrmProvider, CrmStages,
    ProviderCredentials, RecallSettings, Tenant, TenantId,
};
