use thiserror::Error;

/// Errors produced by the session coordinator and its collaborators.
///
/// Every lane task resolves its own failures: the error is logged, reported on
/// the alert channel when [`SessionError::is_user_facing`] says so, and handed
/// back through the task's [`Ticket`](crate::session::Ticket).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
    #[error("Resource unavailable: {0}")]
    ResourceUnavailable(String),
    #[error("Resource busy: {0}")]
    ResourceBusy(String),
    #[error("Transport failure: {0}")]
    TransportFailure(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),
    #[error("Device error: {0}")]
    Device(String),
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Lane closed: {0}")]
    LaneClosed(String),
}

impl SessionError {
    /// Whether the error should be shown on the presentation alert channel.
    pub fn is_user_facing(&self) -> bool {
        !matches!(self, SessionError::LaneClosed(_))
    }

    /// Short machine-friendly name of the variant, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionError::InvalidTransition(_) => "invalid_transition",
            SessionError::ResourceUnavailable(_) => "resource_unavailable",
            SessionError::ResourceBusy(_) => "resource_busy",
            SessionError::TransportFailure(_) => "transport_failure",
            SessionError::InvalidArgument(_) => "invalid_argument",
            SessionError::InvalidCredentials(_) => "invalid_credentials",
            SessionError::Device(_) => "device",
            SessionError::Persistence(_) => "persistence",
            SessionError::Config(_) => "config",
            SessionError::LaneClosed(_) => "lane_closed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_message() {
        let error = SessionError::ResourceUnavailable("no camera".to_string());
        assert_eq!(error.to_string(), "Resource unavailable: no camera");
    }

    #[test]
    fn test_lane_closed_is_not_user_facing() {
        assert!(!SessionError::LaneClosed("publish".to_string()).is_user_facing());
        assert!(SessionError::TransportFailure("x".to_string()).is_user_facing());
    }
}
