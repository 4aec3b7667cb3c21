//! Operation Context
//!
//! Who a request acts for, and the id that ties its log lines together.

use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationContext {
    /// Session-bound user ID from X-Request-User-Id header
    pub user_id: Uuid,

    /// From X-Correlation-Id, or generated per request
    pub correlation_id: Uuid,
}

impl OperationContext {
    pub fn new(user_id: Uuid, correlation_id: Option<Uuid>) -> Self {
        Self {
            user_id,
            correlation_id: correlation_id.unwrap_or_else(Uuid::new_v4),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_caller_correlation_id() {
        let user_id = Uuid::new_v4();
        let correlation_id = Uuid::new_v4();

        let context = OperationContext::new(user_id, Some(correlation_id));
        assert_eq!(context.user_id, user_id);
        assert_eq!(context.correlation_id, correlation_id);
    }

    #[test]
    fn test_generates_correlation_id() {
        let user_id = Uuid::new_v4();
        let first = OperationContext::new(user_id, None);
        let second = OperationContext::new(user_id, None);

        assert_ne!(first.correlation_id, second.correlation_id);
    }
}
