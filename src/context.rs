//! Caller Context
//!
//! Built once per request and passed explicitly to every dataset operation.
//! It identifies the request for tracing and names the caller when one is
//! known. No process-wide identity state exists; authentication is the job of
//! whatever sits in front of this service.

use uuid::Uuid;

/// Name used when a request does not identify its caller
pub const ANONYMOUS_CALLER: &str = "anonymous";

/// Context carried through one operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerContext {
    /// Request ID for tracing
    pub request_id: Uuid,
    /// Caller identity supplied by the transport, if any
    pub caller: Option<String>,
}

impl CallerContext {
    /// Context for an identified caller
    pub fn new(caller: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            caller: Some(caller.into()),
        }
    }

    /// Context without a caller identity
    pub fn anonymous() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            caller: None,
        }
    }

    /// Context for local tooling (CLI)
    pub fn local() -> Self {
        Self::new("local")
    }

    /// Caller name for logs and generated URLs
    pub fn caller_name(&self) -> &str {
        self.caller.as_deref().unwrap_or(ANONYMOUS_CALLER)
    }
}

impl Default for CallerContext {
    fn default() -> Self {
        Self::anonymous()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_caller_name() {
        assert_eq!(CallerContext::anonymous().caller_name(), ANONYMOUS_CALLER);
        assert_eq!(CallerContext::new("ana").caller_name(), "ana");
    }

    #[test]
    fn test_request_ids_are_unique() {
        assert_ne!(
            CallerContext::anonymous().request_id,
            CallerContext::anonymous().request_id
        );
    }
}
