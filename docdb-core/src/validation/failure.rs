// Validator for expected errors
// Matches status, category, message and the cause chain structurally

use super::{ValidationFailure, ValidationResult};
use crate::error::{DocDbError, ErrorCategory, StatusCode};
use std::any::type_name;
use std::error::Error as StdError;

type ErrorCheck = Box<dyn Fn(&DocDbError) -> ValidationResult<()> + Send + Sync>;

/// Predicates over the error that terminated an operation
pub struct FailureValidator {
    checks: Vec<ErrorCheck>,
}

impl FailureValidator {
    pub fn builder() -> FailureValidatorBuilder {
        FailureValidatorBuilder { checks: Vec::new() }
    }

    pub fn validate(&self, error: &DocDbError) -> ValidationResult<()> {
        self.checks.iter().try_for_each(|check| check(error))
    }
}

pub struct FailureValidatorBuilder {
    checks: Vec<ErrorCheck>,
}

impl FailureValidatorBuilder {
    pub fn status_code(self, expected: u16) -> Self {
        self.with_check(move |err| {
            if err.status_code() == Some(expected) {
                Ok(())
            } else {
                Err(ValidationFailure::mismatch("status code", Some(expected), err.status_code()))
            }
        })
    }

    pub fn sub_status(self, expected: u32) -> Self {
        self.with_check(move |err| {
            if err.sub_status() == Some(expected) {
                Ok(())
            } else {
                Err(ValidationFailure::mismatch("sub-status", Some(expected), err.sub_status()))
            }
        })
    }

    pub fn category(self, expected: ErrorCategory) -> Self {
        self.with_check(move |err| {
            if err.category() == expected {
                Ok(())
            } else {
                Err(ValidationFailure::mismatch("error category", expected, err.category()))
            }
        })
    }

    pub fn not_found(self) -> Self {
        self.status_code(StatusCode::NotFound.as_u16())
    }

    pub fn conflict(self) -> Self {
        self.status_code(StatusCode::Conflict.as_u16())
    }

    pub fn bad_request(self) -> Self {
        self.status_code(StatusCode::BadRequest.as_u16())
    }

    /// The error's own display text contains `fragment`
    pub fn message_contains(self, fragment: impl Into<String>) -> Self {
        let fragment = fragment.into();
        self.with_check(move |err| {
            let text = err.to_string();
            if text.contains(&fragment) {
                Ok(())
            } else {
                Err(ValidationFailure::mismatch(
                    "error message",
                    format!("contains {:?}", fragment),
                    text,
                ))
            }
        })
    }

    /// Some error in the cause chain, below the outermost, is an `E`
    pub fn caused_by<E>(self) -> Self
    where
        E: StdError + 'static,
    {
        self.with_check(|err| {
            let chain = err.cause_chain();
            if chain.iter().skip(1).any(|cause| cause.downcast_ref::<E>().is_some()) {
                Ok(())
            } else {
                Err(ValidationFailure::mismatch(
                    "cause chain",
                    format!("contains {}", type_name::<E>()),
                    describe_chain(&chain),
                ))
            }
        })
    }

    /// The innermost cause is an `E`
    pub fn root_cause_is<E>(self) -> Self
    where
        E: StdError + 'static,
    {
        self.with_check(|err| {
            if err.root_cause().downcast_ref::<E>().is_some() {
                Ok(())
            } else {
                Err(ValidationFailure::mismatch(
                    "root cause",
                    type_name::<E>(),
                    describe_chain(&err.cause_chain()),
                ))
            }
        })
    }

    pub fn root_cause_message_contains(self, fragment: impl Into<String>) -> Self {
        let fragment = fragment.into();
        self.with_check(move |err| {
            let text = err.root_cause().to_string();
            if text.contains(&fragment) {
                Ok(())
            } else {
                Err(ValidationFailure::mismatch(
                    "root cause message",
                    format!("contains {:?}", fragment),
                    text,
                ))
            }
        })
    }

    pub fn with_check<F>(mut self, check: F) -> Self
    where
        F: Fn(&DocDbError) -> ValidationResult<()> + Send + Sync + 'static,
    {
        self.checks.push(Box::new(check));
        self
    }

    pub fn build(self) -> FailureValidator {
        FailureValidator {
            checks: self.checks,
        }
    }
}

fn describe_chain(chain: &[&(dyn StdError + 'static)]) -> String {
    chain
        .iter()
        .map(|cause| cause.to_string())
        .collect::<Vec<_>>()
        .join(" <- ")
}
