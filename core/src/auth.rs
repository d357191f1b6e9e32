//! Auth identity parsing for `principal/ipAddress` strings.
//!
//! Every request carries an identity of the form `user@example.edu/10.0.0.7`.
//! The principal must look like an email address; the address segment must be
//! a syntactically valid IPv4 or IPv6 address. Test-harness traffic carries a
//! sentinel principal, which is substituted with a configured fallback before
//! validation so harness requests pass the same checks as real ones.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use thiserror::Error;

/// Why an auth identity string was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthIdError {
    /// No `/` separator between principal and address.
    #[error("Auth user id has no principal/address separator: {0}")]
    MissingSeparator(String),
    /// The principal is not an email-like string.
    #[error("Auth principal is not email-like: {0}")]
    InvalidPrincipal(String),
    /// The address segment is not a valid IPv4/IPv6 address.
    #[error("Auth address is not a valid IP address: {0}")]
    InvalidAddress(String),
}

/// Substitution applied to test-harness identities before validation.
///
/// When the principal segment equals `sentinel_principal`, it is replaced by
/// `fallback_principal` and validation proceeds on the substituted identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HarnessIdentity {
    /// Principal the test harness sends.
    pub sentinel_principal: String,
    /// Email-like principal substituted in its place.
    pub fallback_principal: String,
}

impl Default for HarnessIdentity {
    fn default() -> Self {
        Self {
            sentinel_principal: "provisioning-harness".to_string(),
            fallback_principal: "harness@steward.internal".to_string(),
        }
    }
}

/// A validated `principal/ipAddress` identity.
///
/// # Examples
///
/// ```
/// use steward_core::auth::AuthUserId;
///
/// let id = AuthUserId::parse("user@example.edu/127.0.0.1").unwrap();
/// assert_eq!(id.principal(), "user@example.edu");
///
/// assert!(AuthUserId::parse("user@example.edu").is_err());
/// assert!(AuthUserId::parse("user@example.edu/999.999.999.999").is_err());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUserId {
    principal: String,
    address: IpAddr,
}

impl AuthUserId {
    /// Parse and validate a raw identity string.
    ///
    /// The string is split at the last `/`; everything before it is the
    /// principal, everything after it must be the address.
    ///
    /// # Errors
    ///
    /// Returns [`AuthIdError`] naming the first rule that failed.
    pub fn parse(raw: &str) -> Result<Self, AuthIdError> {
        let (principal, address) = raw
            .rsplit_once('/')
            .ok_or_else(|| AuthIdError::MissingSeparator(raw.to_string()))?;

        if !is_email_like(principal) {
            return Err(AuthIdError::InvalidPrincipal(principal.to_string()));
        }

        let address: IpAddr = address
            .parse()
            .map_err(|_| AuthIdError::InvalidAddress(address.to_string()))?;

        Ok(Self {
            principal: principal.to_string(),
            address,
        })
    }

    /// Parse with harness substitution applied first.
    ///
    /// # Errors
    ///
    /// Returns [`AuthIdError`] if the (possibly substituted) identity fails
    /// validation.
    pub fn parse_with_harness(raw: &str, harness: &HarnessIdentity) -> Result<Self, AuthIdError> {
        match raw.rsplit_once('/') {
            Some((principal, address)) if principal == harness.sentinel_principal => {
                Self::parse(&format!("{}/{}", harness.fallback_principal, address))
            }
            _ => Self::parse(raw),
        }
    }

    /// The validated email-like principal.
    #[must_use]
    pub fn principal(&self) -> &str {
        &self.principal
    }

    /// The validated source address.
    #[must_use]
    pub const fn address(&self) -> IpAddr {
        self.address
    }
}

impl fmt::Display for AuthUserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.principal, self.address)
    }
}

/// Syntactic email shape: one `@`, nonempty local and domain parts, a dotted
/// domain, no whitespace. Deliverability is not this module's concern.
fn is_email_like(principal: &str) -> bool {
    if principal.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = principal.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return false;
    }
    domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can unwrap
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn accepts_valid_ipv4_identity() {
        let id = AuthUserId::parse("user@example.edu/127.0.0.1").unwrap();
        assert_eq!(id.principal(), "user@example.edu");
        assert_eq!(id.address(), "127.0.0.1".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn accepts_valid_ipv6_identity() {
        let id = AuthUserId::parse("user@example.edu/::1").unwrap();
        assert_eq!(id.address(), "::1".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn rejects_non_email_principal() {
        let err = AuthUserId::parse("not-an-email/127.0.0.1").unwrap_err();
        assert_eq!(err, AuthIdError::InvalidPrincipal("not-an-email".to_string()));
    }

    #[test]
    fn rejects_out_of_range_ipv4() {
        let err = AuthUserId::parse("user@example.edu/999.999.999.999").unwrap_err();
        assert_eq!(
            err,
            AuthIdError::InvalidAddress("999.999.999.999".to_string())
        );
    }

    #[test]
    fn rejects_missing_separator() {
        let err = AuthUserId::parse("user@example.edu").unwrap_err();
        assert_eq!(
            err,
            AuthIdError::MissingSeparator("user@example.edu".to_string())
        );
    }

    #[test]
    fn rejects_undotted_domain() {
        assert!(AuthUserId::parse("user@localhost/127.0.0.1").is_err());
    }

    #[test]
    fn harness_sentinel_is_substituted_then_validated() {
        let harness = HarnessIdentity::default();
        let id =
            AuthUserId::parse_with_harness("provisioning-harness/127.0.0.1", &harness).unwrap();
        assert_eq!(id.principal(), "harness@steward.internal");
    }

    #[test]
    fn non_sentinel_principal_is_not_substituted() {
        let harness = HarnessIdentity::default();
        let err =
            AuthUserId::parse_with_harness("someone-else/127.0.0.1", &harness).unwrap_err();
        assert_eq!(
            err,
            AuthIdError::InvalidPrincipal("someone-else".to_string())
        );
    }

    #[test]
    fn display_round_trips() {
        let id = AuthUserId::parse("user@example.edu/10.0.0.7").unwrap();
        assert_eq!(id.to_string(), "user@example.edu/10.0.0.7");
    }

    proptest! {
        // Parsing never panics and accepted identities always re-parse.
        #[test]
        fn parse_total_and_reparseable(raw in ".{0,64}") {
            if let Ok(id) = AuthUserId::parse(&raw) {
                let reparsed = AuthUserId::parse(&id.to_string()).unwrap();
                prop_assert_eq!(id, reparsed);
            }
        }
    }
}
