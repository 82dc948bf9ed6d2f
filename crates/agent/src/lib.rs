//! The conversation layer: thread backend, the retrying driver, instruction
//! builders, tool dispatch, and the flows that turn assistant replies into
//! gateway, calendar, and CRM side effects.

use frontdesk_core::ApplicationError;
use frontdesk_db::RepositoryError;
use frontdesk_gateway::GatewayError;

pub mod backend;
pub mod driver;
pub mod engagement;
pub mod instructions;
pub mod openai;
pub mod routing;
pub mod scheduling;
pub mod tools;

pub use backend::{BackendError, RunHandle, RunState, ThreadBackend, ThreadMessage};
pub use driver::{ConversationDriver, DriveOutcome, DriveRequest, DriverSettings};
pub use engagement::EngagementFlow;
pub use openai::OpenAiBackend;
pub use routing::{AdapterSet, RouteOutcome, RouteRequest, RoutingEngine};
pub use scheduling::SchedulingFlow;
pub use tools::{Tool, ToolRegistry};

/// Repository errors become opaque persistence failures at the application
/// boundary.
pub fn persistence_failure(error: RepositoryError) -> ApplicationError {
    ApplicationError::Persistence(error.to_string())
}

/// Gateway errors keep their provider/operation context; missing credentials
/// are configuration problems, not transport ones.
pub fn gateway_failure(error: GatewayError) -> ApplicationError {
    match error {
        GatewayError::Request { provider, operation, reason } => ApplicationError::Adapter {
            provider: provider.to_string(),
            operation: operation.to_string(),
            reason,
        },
        GatewayError::MissingCredential(name) => {
            ApplicationError::Configuration(format!("tenant is missing credential `{name}`"))
        }
        GatewayError::UnexpectedPayload { provider, reason } => ApplicationError::Adapter {
            provider: provider.to_string(),
            operation: "decode".to_string(),
            reason,
        },
    }
}
