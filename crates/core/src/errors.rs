use thiserror::Error;

/// What a shortcut in an assistant response was supposed to resolve to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReferenceKind {
    Department,
    Assistant,
    Agenda,
    Media,
}

impl ReferenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Department => "department",
            Self::Assistant => "assistant",
            Self::Agenda => "agenda",
            Self::Media => "media",
        }
    }
}

impl std::fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("unresolved {kind} reference `{shortcut}`")]
    UnresolvedReference { kind: ReferenceKind, shortcut: String },
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    #[error("invalid timezone `{0}`")]
    InvalidTimezone(String),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("assistant produced no usable response after {attempts} attempts: {reason}")]
    AiResponse { attempts: u32, reason: String },
    #[error("{provider} adapter failed during {operation}: {reason}")]
    Adapter { provider: String, operation: String, reason: String },
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => "The request body did not match a supported gateway shape.",
            Self::NotFound { .. } => "No tenant matches the supplied slug and token.",
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        match value {
            ApplicationError::Domain(DomainError::MalformedPayload(message)) => {
                Self::BadRequest { message, correlation_id: "unassigned".to_owned() }
            }
            ApplicationError::Domain(domain) => Self::BadRequest {
                message: domain.to_string(),
                correlation_id: "unassigned".to_owned(),
            },
            ApplicationError::AiResponse { attempts, reason } => Self::ServiceUnavailable {
                message: format!("assistant unavailable after {attempts} attempts: {reason}"),
                correlation_id: "unassigned".to_owned(),
            },
            ApplicationError::Adapter { provider, operation, reason } => {
                Self::ServiceUnavailable {
                    message: format!("{provider} {operation}: {reason}"),
                    correlation_id: "unassigned".to_owned(),
                }
            }
            ApplicationError::Persistence(message) => {
                Self::ServiceUnavailable { message, correlation_id: "unassigned".to_owned() }
            }
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: "unassigned".to_owned() }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ApplicationError, DomainError, InterfaceError, ReferenceKind};

    #[test]
    fn malformed_payload_maps_to_bad_request() {
        let interface = ApplicationError::from(DomainError::MalformedPayload(
            "neither gateway shape matched".to_owned(),
        ))
        .into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest {
                ref correlation_id,
                ..
            } if correlation_id == "req-1"
        ));
    }

    #[test]
    fn unresolved_reference_names_kind_and_shortcut() {
        let error = DomainError::UnresolvedReference {
            kind: ReferenceKind::Department,
            shortcut: "suporte".to_owned(),
        };
        assert_eq!(error.to_string(), "unresolved department reference `suporte`");
    }

    #[test]
    fn ai_response_failure_maps_to_service_unavailable() {
        let interface = ApplicationError::AiResponse {
            attempts: 5,
            reason: "run expired".to_owned(),
        }
        .into_interface("req-2");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert_eq!(
            interface.user_message(),
            "The service is temporarily unavailable. Please retry shortly."
        );
    }

    #[test]
    fn adapter_failure_carries_provider_and_operation() {
        let error = ApplicationError::Adapter {
            provider: "digisac".to_owned(),
            operation: "transfer".to_owned(),
            reason: "HTTP 502".to_owned(),
        };
        assert_eq!(
            error.to_string(),
            "digisac adapter failed during transfer: HTTP 502"
        );
    }
}
