// Validator for single-result responses

use super::{ValidationFailure, ValidationResult};
use crate::protocol::{Document, Offer, Resource, ResourceResponse};
use serde_json::Value;

type ResponseCheck<T> = Box<dyn Fn(&ResourceResponse<T>) -> ValidationResult<()> + Send + Sync>;

pub struct ResourceResponseValidator<T> {
    checks: Vec<ResponseCheck<T>>,
}

impl<T: 'static> ResourceResponseValidator<T> {
    pub fn builder() -> ResourceResponseValidatorBuilder<T> {
        ResourceResponseValidatorBuilder { checks: Vec::new() }
    }
}

impl<T> ResourceResponseValidator<T> {
    pub fn validate(&self, response: &ResourceResponse<T>) -> ValidationResult<()> {
        self.checks.iter().try_for_each(|check| check(response))
    }
}

pub struct ResourceResponseValidatorBuilder<T> {
    checks: Vec<ResponseCheck<T>>,
}

impl<T: 'static> ResourceResponseValidatorBuilder<T> {
    pub fn status_code(self, expected: u16) -> Self {
        self.with_check(move |response| {
            if response.status_code == expected {
                Ok(())
            } else {
                Err(ValidationFailure::mismatch("status code", expected, response.status_code))
            }
        })
    }

    pub fn request_charge_at_least(self, minimum: f64) -> Self {
        self.with_check(move |response| {
            if response.request_charge >= minimum {
                Ok(())
            } else {
                Err(ValidationFailure::mismatch(
                    "request charge",
                    format!(">= {}", minimum),
                    response.request_charge,
                ))
            }
        })
    }

    pub fn with_check<F>(mut self, check: F) -> Self
    where
        F: Fn(&ResourceResponse<T>) -> ValidationResult<()> + Send + Sync + 'static,
    {
        self.checks.push(Box::new(check));
        self
    }

    pub fn build(self) -> ResourceResponseValidator<T> {
        ResourceResponseValidator {
            checks: self.checks,
        }
    }
}

impl<T: Resource + 'static> ResourceResponseValidatorBuilder<T> {
    pub fn with_id(self, expected: impl Into<String>) -> Self {
        let expected = expected.into();
        self.with_check(move |response| {
            if response.resource.id() == expected {
                Ok(())
            } else {
                Err(ValidationFailure::mismatch("id", &expected, response.resource.id()))
            }
        })
    }

    /// The service stamped its system properties on the resource
    pub fn with_system_properties(self) -> Self {
        self.with_check(|response| {
            let system = response.resource.system();
            if system.rid.is_some() && system.self_link.is_some() && system.etag.is_some() {
                Ok(())
            } else {
                Err(ValidationFailure::mismatch(
                    "system properties",
                    "_rid, _self, _etag set",
                    system,
                ))
            }
        })
    }
}

impl ResourceResponseValidatorBuilder<Document> {
    pub fn with_property(self, key: impl Into<String>, expected: impl Into<Value>) -> Self {
        let key = key.into();
        let expected = expected.into();
        self.with_check(move |response| {
            let actual = response.resource.get_path(&key);
            if actual == Some(&expected) {
                Ok(())
            } else {
                Err(ValidationFailure::mismatch(
                    format!("property {}", key),
                    Some(&expected),
                    actual,
                ))
            }
        })
    }
}

impl ResourceResponseValidatorBuilder<Offer> {
    pub fn with_throughput(self, expected: u32) -> Self {
        self.with_check(move |response| {
            if response.resource.throughput() == expected {
                Ok(())
            } else {
                Err(ValidationFailure::mismatch(
                    "offer throughput",
                    expected,
                    response.resource.throughput(),
                ))
            }
        })
    }
}
