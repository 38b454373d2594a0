//! Outcome of the most recent operation on a harness object
//!
//! Phones, calls and subscriptions each carry a [`LastOperation`]. Every
//! public operation overwrites it exactly once, so after a wait returns
//! `None` the test can ask why:
//!
//! ```rust
//! use sipunit::operation::LastOperation;
//! use sipunit::SipUnitError;
//! use std::time::Duration;
//!
//! let last = LastOperation::new();
//! last.fail("wait_response", &SipUnitError::timeout("response", Duration::from_millis(200)));
//! assert!(!last.is_success());
//! assert!(last.format().contains("200ms"));
//! ```

use std::fmt;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, SipUnitError, SipUnitResult};

/// Success or failure of one operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Success,
    Failure { kind: ErrorKind, detail: String },
}

/// One recorded operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub operation: String,
    pub outcome: Outcome,
    /// Status code received (or sent) when the operation involved one
    pub status_code: Option<u16>,
}

impl fmt::Display for OperationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            Outcome::Success => write!(f, "{}: ok", self.operation)?,
            Outcome::Failure { kind, detail } => {
                write!(f, "{}: failed ({}): {}", self.operation, kind, detail)?
            }
        }
        if let Some(code) = self.status_code {
            write!(f, " [status {}]", code)?;
        }
        Ok(())
    }
}

/// Holder for the latest [`OperationRecord`]
#[derive(Debug, Default)]
pub struct LastOperation {
    record: Mutex<Option<OperationRecord>>,
}

impl LastOperation {
    pub fn new() -> Self {
        Self::default()
    }

    fn set(&self, operation: &str, outcome: Outcome, status_code: Option<u16>) {
        *self.record.lock() = Some(OperationRecord {
            operation: operation.to_string(),
            outcome,
            status_code,
        });
    }

    pub fn succeed(&self, operation: &str) {
        self.set(operation, Outcome::Success, None);
    }

    pub fn succeed_with_status(&self, operation: &str, status: u16) {
        self.set(operation, Outcome::Success, Some(status));
    }

    pub fn fail(&self, operation: &str, error: &SipUnitError) {
        self.fail_with_status(operation, error, None);
    }

    pub fn fail_with_status(&self, operation: &str, error: &SipUnitError, status: Option<u16>) {
        tracing::debug!("{} failed: {}", operation, error);
        self.set(
            operation,
            Outcome::Failure {
                kind: error.kind(),
                detail: error.to_string(),
            },
            status,
        );
    }

    /// Records `result` and passes it through
    pub fn record<T>(&self, operation: &str, result: SipUnitResult<T>) -> SipUnitResult<T> {
        match &result {
            Ok(_) => self.succeed(operation),
            Err(e) => self.fail(operation, e),
        }
        result
    }

    /// Like [`record`](Self::record), attaching the status code involved
    pub fn record_with_status<T>(
        &self,
        operation: &str,
        result: SipUnitResult<T>,
        status: u16,
    ) -> SipUnitResult<T> {
        match &result {
            Ok(_) => self.succeed_with_status(operation, status),
            Err(e) => self.fail_with_status(operation, e, Some(status)),
        }
        result
    }

    pub fn get(&self) -> Option<OperationRecord> {
        self.record.lock().clone()
    }

    /// False until something succeeded
    pub fn is_success(&self) -> bool {
        matches!(
            self.record.lock().as_ref().map(|r| &r.outcome),
            Some(Outcome::Success)
        )
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self.record.lock().as_ref().map(|r| &r.outcome) {
            Some(Outcome::Failure { kind, .. }) => Some(*kind),
            _ => None,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        self.record.lock().as_ref().and_then(|r| r.status_code)
    }

    /// Human readable form for assertion messages
    pub fn format(&self) -> String {
        match self.record.lock().as_ref() {
            Some(record) => record.to_string(),
            None => "no operation performed".to_string(),
        }
    }
}

/// Implemented by every object that records its operations
pub trait HasLastOperation {
    fn last_operation(&self) -> &LastOperation;

    fn format_last_operation(&self) -> String {
        self.last_operation().format()
    }

    fn last_operation_succeeded(&self) -> bool {
        self.last_operation().is_success()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty() {
        let last = LastOperation::new();
        assert!(!last.is_success());
        assert_eq!(last.error_kind(), None);
        assert_eq!(last.format(), "no operation performed");
    }

    #[test]
    fn test_overwrite() {
        let last = LastOperation::new();
        last.fail("send_request", &SipUnitError::transport("refused"));
        assert_eq!(last.error_kind(), Some(ErrorKind::Transport));

        last.succeed_with_status("wait_response", 180);
        assert!(last.is_success());
        assert_eq!(last.status_code(), Some(180));
        assert_eq!(last.format(), "wait_response: ok [status 180]");
    }

    #[test]
    fn test_record_passes_result_through() {
        let last = LastOperation::new();
        let result: SipUnitResult<u32> = last.record("op", Ok(7));
        assert_eq!(result.unwrap(), 7);
        assert!(last.is_success());

        let result: SipUnitResult<u32> =
            last.record("op", Err(SipUnitError::invalid_state("idle")));
        assert!(result.is_err());
        let record = last.get().unwrap();
        assert_eq!(record.operation, "op");
        assert!(matches!(record.outcome, Outcome::Failure { kind: ErrorKind::Programming, .. }));
    }
}
