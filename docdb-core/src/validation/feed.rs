// Validators over realised feeds
// Predicates are collected by a builder and evaluated once, in insertion order

use super::{ValidationFailure, ValidationResult};
use crate::feed::Page;
use crate::protocol::Resource;
use std::collections::HashMap;

type ListCheck<T> = Box<dyn Fn(&[Page<T>]) -> ValidationResult<()> + Send + Sync>;
type PageCheck<T> = Box<dyn Fn(&Page<T>) -> ValidationResult<()> + Send + Sync>;

/// Predicates over the full list of pages a feed produced
pub struct FeedResponseListValidator<T> {
    checks: Vec<ListCheck<T>>,
}

impl<T: 'static> FeedResponseListValidator<T> {
    pub fn builder() -> FeedResponseListValidatorBuilder<T> {
        FeedResponseListValidatorBuilder { checks: Vec::new() }
    }
}

impl<T> FeedResponseListValidator<T> {
    /// Apply every predicate; the first mismatch wins
    pub fn validate(&self, pages: &[Page<T>]) -> ValidationResult<()> {
        self.checks.iter().try_for_each(|check| check(pages))
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }
}

pub struct FeedResponseListValidatorBuilder<T> {
    checks: Vec<ListCheck<T>>,
}

impl<T: 'static> FeedResponseListValidatorBuilder<T> {
    /// Sum of items over all pages
    pub fn total_size(self, expected: usize) -> Self {
        self.with_check(move |pages| {
            let actual: usize = pages.iter().map(Page::len).sum();
            expect_eq("total size", expected, actual)
        })
    }

    /// Exact page count. With a fixed page size `p` and `n` items this is `ceil(n / p)`;
    /// the last page holding the remainder is not a violation.
    pub fn number_of_pages(self, expected: usize) -> Self {
        self.with_check(move |pages| expect_eq("number of pages", expected, pages.len()))
    }

    pub fn number_of_pages_at_least(self, minimum: usize) -> Self {
        self.with_check(move |pages| {
            if pages.len() >= minimum {
                Ok(())
            } else {
                Err(ValidationFailure::mismatch(
                    "number of pages",
                    format!(">= {}", minimum),
                    pages.len(),
                ))
            }
        })
    }

    pub fn total_request_charge_at_least(self, minimum: f64) -> Self {
        self.with_check(move |pages| {
            let total: f64 = pages.iter().map(|p| p.request_charge).sum();
            if total >= minimum {
                Ok(())
            } else {
                Err(ValidationFailure::mismatch(
                    "total request charge",
                    format!(">= {}", minimum),
                    total,
                ))
            }
        })
    }

    /// Apply a page validator to the page at `index`
    pub fn page_satisfy(self, index: usize, validator: FeedResponseValidator<T>) -> Self {
        self.with_check(move |pages| match pages.get(index) {
            Some(page) => validator.validate(page).map_err(|f| f.in_page(index)),
            None => Err(ValidationFailure::mismatch(
                format!("page[{}] presence", index),
                format!("more than {} pages", index),
                pages.len(),
            )),
        })
    }

    /// Apply a page validator to every page
    pub fn all_pages_satisfy(self, validator: FeedResponseValidator<T>) -> Self {
        self.with_check(move |pages| {
            pages.iter().enumerate().try_for_each(|(index, page)| {
                validator.validate(page).map_err(|f| f.in_page(index))
            })
        })
    }

    /// Add an arbitrary predicate over the realised pages
    pub fn with_check<F>(mut self, check: F) -> Self
    where
        F: Fn(&[Page<T>]) -> ValidationResult<()> + Send + Sync + 'static,
    {
        self.checks.push(Box::new(check));
        self
    }

    pub fn build(self) -> FeedResponseListValidator<T> {
        FeedResponseListValidator {
            checks: self.checks,
        }
    }
}

impl<T: Resource + 'static> FeedResponseListValidatorBuilder<T> {
    /// The ids across all pages equal `expected` as a multiset; order is not checked
    pub fn exactly_contains_in_any_order<I, S>(self, expected: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let expected: Vec<String> = expected.into_iter().map(Into::into).collect();
        self.with_check(move |pages| {
            let actual: Vec<&str> = pages
                .iter()
                .flat_map(|p| p.items.iter().map(|item| item.id()))
                .collect();
            compare_multiset(&expected, &actual)
        })
    }

    /// The ids across all pages, in feed order, equal `expected`
    pub fn contains_exactly<I, S>(self, expected: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let expected: Vec<String> = expected.into_iter().map(Into::into).collect();
        self.with_check(move |pages| {
            let actual: Vec<&str> = pages
                .iter()
                .flat_map(|p| p.items.iter().map(|item| item.id()))
                .collect();
            if actual.iter().copied().eq(expected.iter().map(String::as_str)) {
                Ok(())
            } else {
                Err(ValidationFailure::mismatch("ordered ids", &expected, &actual))
            }
        })
    }
}

fn compare_multiset(expected: &[String], actual: &[&str]) -> ValidationResult<()> {
    let mut counts: HashMap<&str, i64> = HashMap::new();
    for id in expected {
        *counts.entry(id.as_str()).or_default() += 1;
    }
    for id in actual {
        *counts.entry(*id).or_default() -= 1;
    }

    let mut missing: Vec<&str> = Vec::new();
    let mut unexpected: Vec<&str> = Vec::new();
    for (id, count) in counts {
        for _ in 0..count.max(0) {
            missing.push(id);
        }
        for _ in 0..(-count).max(0) {
            unexpected.push(id);
        }
    }

    if missing.is_empty() && unexpected.is_empty() {
        return Ok(());
    }

    missing.sort_unstable();
    unexpected.sort_unstable();
    Err(ValidationFailure::Assertion {
        check: "ids in any order".to_string(),
        expected: format!("{} ids, missing {:?}", expected.len(), missing),
        actual: format!("{} ids, unexpected {:?}", actual.len(), unexpected),
    })
}

fn expect_eq(check: &str, expected: usize, actual: usize) -> ValidationResult<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(ValidationFailure::mismatch(check, expected, actual))
    }
}

/// Predicates over a single page
pub struct FeedResponseValidator<T> {
    checks: Vec<PageCheck<T>>,
}

impl<T: 'static> FeedResponseValidator<T> {
    pub fn builder() -> FeedResponseValidatorBuilder<T> {
        FeedResponseValidatorBuilder { checks: Vec::new() }
    }
}

impl<T> FeedResponseValidator<T> {
    pub fn validate(&self, page: &Page<T>) -> ValidationResult<()> {
        self.checks.iter().try_for_each(|check| check(page))
    }
}

pub struct FeedResponseValidatorBuilder<T> {
    checks: Vec<PageCheck<T>>,
}

impl<T: 'static> FeedResponseValidatorBuilder<T> {
    pub fn request_charge_at_least(self, minimum: f64) -> Self {
        self.with_check(move |page| {
            if page.request_charge >= minimum {
                Ok(())
            } else {
                Err(ValidationFailure::mismatch(
                    "request charge",
                    format!(">= {}", minimum),
                    page.request_charge,
                ))
            }
        })
    }

    pub fn positive_request_charge(self) -> Self {
        self.with_check(|page| {
            if page.request_charge > 0.0 {
                Ok(())
            } else {
                Err(ValidationFailure::mismatch("request charge", "> 0", page.request_charge))
            }
        })
    }

    pub fn number_of_results(self, expected: usize) -> Self {
        self.with_check(move |page| expect_eq("number of results", expected, page.len()))
    }

    pub fn page_size_at_most(self, maximum: usize) -> Self {
        self.with_check(move |page| {
            if page.len() <= maximum {
                Ok(())
            } else {
                Err(ValidationFailure::mismatch(
                    "page size",
                    format!("<= {}", maximum),
                    page.len(),
                ))
            }
        })
    }

    pub fn has_continuation(self, expected: bool) -> Self {
        self.with_check(move |page| {
            if page.has_more() == expected {
                Ok(())
            } else {
                Err(ValidationFailure::mismatch(
                    "continuation present",
                    expected,
                    &page.continuation,
                ))
            }
        })
    }

    pub fn with_check<F>(mut self, check: F) -> Self
    where
        F: Fn(&Page<T>) -> ValidationResult<()> + Send + Sync + 'static,
    {
        self.checks.push(Box::new(check));
        self
    }

    pub fn build(self) -> FeedResponseValidator<T> {
        FeedResponseValidator {
            checks: self.checks,
        }
    }
}

impl<T: Resource + 'static> FeedResponseValidatorBuilder<T> {
    /// The page's ids, in order
    pub fn ids_exactly_are<I, S>(self, expected: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let expected: Vec<String> = expected.into_iter().map(Into::into).collect();
        self.with_check(move |page| {
            let actual: Vec<&str> = page.items.iter().map(|item| item.id()).collect();
            if actual.iter().copied().eq(expected.iter().map(String::as_str)) {
                Ok(())
            } else {
                Err(ValidationFailure::mismatch("page ids", &expected, &actual))
            }
        })
    }
}
