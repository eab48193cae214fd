//! Email address value object: equality by value, validated at the boundary.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// A validated email address.
///
/// Validation is intentionally shallow (`local@domain`, non-empty parts,
/// domain contains a dot); deliverability is the mail sender's problem.
/// Comparison is case-insensitive on the domain part only.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmailAddress(String);

impl EmailAddress {
    pub fn new(raw: impl Into<String>) -> DomainResult<Self> {
        let raw = raw.into();
        let Some((local, domain)) = raw.split_once('@') else {
            return Err(DomainError::validation(format!("email missing '@': {raw}")));
        };
        if local.is_empty() {
            return Err(DomainError::validation("email has empty local part"));
        }
        if domain.is_empty() || !domain.contains('.') || domain.contains('@') {
            return Err(DomainError::validation(format!("email has bad domain: {raw}")));
        }
        if raw.chars().any(char::is_whitespace) {
            return Err(DomainError::validation("email contains whitespace"));
        }
        let normalized = format!("{local}@{}", domain.to_ascii_lowercase());
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for EmailAddress {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}
