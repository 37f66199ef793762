//! Error types for credential validation and context resolution.

use std::fmt;

use rmcp::model::ErrorCode;

use crate::auth::repository::RepositoryError;
use crate::types::TenantId;

/// MCP error code returned when a session presents a bad credential.
pub const INVALID_CREDENTIAL_ERROR_CODE: i32 = -32001;

/// Why a presented credential does not grant access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidCredential {
    /// Empty or absent credential; rejected before any lookup.
    Missing,
    /// Absent from both key layouts.
    NotFound,
    /// Present but disabled.
    Inactive,
    /// Active, but neither carries a tenant nor has an owner with one.
    NoTenant,
}

impl InvalidCredential {
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Missing => "no credential provided",
            Self::NotFound => "credential not found",
            Self::Inactive => "credential inactive",
            Self::NoTenant => "no tenant for credential",
        }
    }
}

impl fmt::Display for InvalidCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason())
    }
}

/// Failures of an authentication call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The credential does not grant access. User-facing.
    InvalidCredential(InvalidCredential),

    /// The credential resolved to a tenant that does not exist.
    ReferentialInconsistency { tenant_id: TenantId },

    /// The datastore could not answer; the caller may retry.
    DatastoreUnavailable(String),

    /// No credential is configured in the calling environment.
    ConfigurationMissing(String),

    /// Anything else.
    Internal(String),
}

impl AuthError {
    /// Whether retrying the same call later could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::DatastoreUnavailable(_))
    }

    /// Whether the message can be shown to the caller as a credential problem.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::InvalidCredential(_) | Self::ConfigurationMissing(_)
        )
    }

    /// Convert to an MCP error for session-level rejections.
    pub fn to_mcp_error(&self) -> rmcp::ErrorData {
        match self {
            Self::InvalidCredential(reason) => rmcp::ErrorData::new(
                ErrorCode(INVALID_CREDENTIAL_ERROR_CODE),
                format!("Invalid API key: {}", reason),
                None,
            ),
            Self::ConfigurationMissing(msg) => rmcp::ErrorData::new(
                ErrorCode(INVALID_CREDENTIAL_ERROR_CODE),
                msg.clone(),
                None,
            ),
            Self::ReferentialInconsistency { .. }
            | Self::DatastoreUnavailable(_)
            | Self::Internal(_) => rmcp::ErrorData::internal_error(self.to_string(), None),
        }
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidCredential(reason) => write!(f, "{}", reason),
            Self::ReferentialInconsistency { .. } => write!(f, "failed to retrieve context"),
            Self::DatastoreUnavailable(msg) => write!(f, "Datastore unavailable: {}", msg),
            Self::ConfigurationMissing(msg) => write!(f, "Configuration missing: {}", msg),
            Self::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<InvalidCredential> for AuthError {
    fn from(reason: InvalidCredential) -> Self {
        Self::InvalidCredential(reason)
    }
}

impl From<RepositoryError> for AuthError {
    fn from(err: RepositoryError) -> Self {
        if err.is_transient() {
            Self::DatastoreUnavailable(err.to_string())
        } else {
            Self::Internal(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_credential_reasons() {
        assert_eq!(InvalidCredential::NotFound.to_string(), "credential not found");
        assert_eq!(InvalidCredential::Inactive.to_string(), "credential inactive");
        assert_eq!(InvalidCredential::NoTenant.to_string(), "no tenant for credential");
        assert_eq!(
            AuthError::from(InvalidCredential::Missing).to_string(),
            "no credential provided"
        );
    }

    #[test]
    fn test_repository_errors_classify() {
        let transient: AuthError = RepositoryError::Timeout.into();
        assert!(transient.is_transient());
        assert!(!transient.is_user_facing());

        let rejected: AuthError = RepositoryError::Rejected {
            status: 401,
            message: "Invalid API key".into(),
        }
        .into();
        assert!(matches!(rejected, AuthError::Internal(_)));
        assert!(!rejected.is_transient());
    }

    #[test]
    fn test_referential_inconsistency_is_internal() {
        let err = AuthError::ReferentialInconsistency {
            tenant_id: TenantId::new("T404"),
        };
        assert_eq!(err.to_string(), "failed to retrieve context");
        assert!(!err.is_user_facing());
        assert_eq!(err.to_mcp_error().code, ErrorCode::INTERNAL_ERROR);
    }

    #[test]
    fn test_invalid_credential_mcp_code() {
        let err = AuthError::InvalidCredential(InvalidCredential::Inactive);
        let mcp = err.to_mcp_error();
        assert_eq!(mcp.code, ErrorCode(INVALID_CREDENTIAL_ERROR_CODE));
        assert!(mcp.message.contains("credential inactive"));
    }
}
