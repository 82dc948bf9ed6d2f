pub mod availability;
pub mod config;
pub mod domain;
pub mod errors;
pub mod recall;
pub mod wire;

pub use availability::{availability_bitmap, fully_booked, BusinessHours, CalendarEvent};
pub use domain::assistant::{Assistant, AssistantId, AssistantPurpose};
pub use domain::contact::{Contact, ContactId};
pub use domain::directory::{Agenda, BillingAccount, Department, Employee, MediaAsset, MediaKind};
pub use domain::tenant::{
    BillingProvider, CalendarProvider, CancelPolicy, ChatProvider, CrmProvider, CrmStages,
    ProviderCredentials, RecallSettings, Tenant, TenantId,
};
pub use errors::{ApplicationError, DomainError, InterfaceError, ReferenceKind};
pub use recall::{recall_eligibility, RecallKind};
pub use wire::{Activity, Instruction, InstructionAction, InstructionData, Response};
