//! HTTP Basic authentication for the conversion endpoint.
//!
//! [`require_auth`] is an axum middleware. It lets a request through when an
//! outer layer already attached an [`Identity`] to it; otherwise it checks the
//! `Authorization: Basic …` header against an [`Authenticator`] and, on
//! success, inserts the [`Identity`] for the handler.
//!
//! | Credentials                   | Result |
//! |-------------------------------|--------|
//! | missing, malformed, wrong     | 401 + `WWW-Authenticate: Basic` |
//! | valid, account inactive       | 403    |
//! | valid, account active         | handler runs |

use crate::error::ServiceError;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

/// The authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user: String,
}

/// Result of checking one set of credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthDecision {
    Granted(Identity),
    /// Correct password, disabled account.
    Forbidden,
    Denied,
}

/// Credential store consulted by [`require_auth`].
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, user: &str, password: &str) -> AuthDecision;
}

#[derive(Debug, Clone)]
struct Account {
    password: String,
    active: bool,
}

/// A fixed table of accounts, typically loaded from configuration.
///
/// The textual form is a comma-separated list of `user:password` entries; a
/// leading `!` marks an account as disabled:
///
/// ```rust
/// use pdf_print_service::auth::{AuthDecision, Authenticator, StaticCredentials};
///
/// let creds: StaticCredentials = "alice:s3cret,!bob:hunter2".parse().unwrap();
/// assert!(matches!(creds.authenticate("alice", "s3cret"), AuthDecision::Granted(_)));
/// assert_eq!(creds.authenticate("bob", "hunter2"), AuthDecision::Forbidden);
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    accounts: BTreeMap<String, Account>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.insert(user.into(), password.into(), true);
        self
    }

    pub fn with_inactive_user(
        mut self,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.insert(user.into(), password.into(), false);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    fn insert(&mut self, user: String, password: String, active: bool) {
        self.accounts.insert(user, Account { password, active });
    }
}

impl FromStr for StaticCredentials {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut creds = StaticCredentials::new();
        for entry in s.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (active, entry) = match entry.strip_prefix('!') {
                Some(rest) => (false, rest),
                None => (true, entry),
            };
            let (user, password) = entry
                .split_once(':')
                .filter(|(user, _)| !user.is_empty())
                .ok_or_else(|| {
                    ServiceError::InvalidConfig(format!(
                        "credential entry '{entry}' must look like user:password"
                    ))
                })?;
            creds.insert(user.to_string(), password.to_string(), active);
        }
        Ok(creds)
    }
}

impl Authenticator for StaticCredentials {
    fn authenticate(&self, user: &str, password: &str) -> AuthDecision {
        let Some(account) = self.accounts.get(user) else {
            return AuthDecision::Denied;
        };
        let matches: bool = account.password.as_bytes().ct_eq(password.as_bytes()).into();
        match (matches, account.active) {
            (false, _) => AuthDecision::Denied,
            (true, false) => AuthDecision::Forbidden,
            (true, true) => AuthDecision::Granted(Identity {
                user: user.to_string(),
            }),
        }
    }
}

/// Extract `(user, password)` from an `Authorization: Basic` header.
pub fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(token.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, password) = decoded.split_once(':')?;
    Some((user.to_string(), password.to_string()))
}

/// Middleware guarding the conversion routes.
pub async fn require_auth(
    State(authenticator): State<Arc<dyn Authenticator>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ServiceError> {
    if let Some(identity) = request.extensions().get::<Identity>() {
        debug!("Request already authenticated as '{}'", identity.user);
        return Ok(next.run(request).await);
    }

    let Some((user, password)) = basic_credentials(request.headers()) else {
        warn!("Bad password for user '<none>'");
        return Err(ServiceError::Unauthorized);
    };

    match authenticator.authenticate(&user, &password) {
        AuthDecision::Granted(identity) => {
            debug!("Authenticated '{}'", identity.user);
            request.extensions_mut().insert(identity);
            Ok(next.run(request).await)
        }
        AuthDecision::Forbidden => {
            warn!("Inactive account '{}' refused", user);
            Err(ServiceError::Forbidden { user })
        }
        AuthDecision::Denied => {
            warn!("Bad password for user '{}'", user);
            Err(ServiceError::Unauthorized)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with(auth: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(header::AUTHORIZATION, HeaderValue::from_str(auth).unwrap());
        h
    }

    #[test]
    fn parses_basic_header() {
        let token = STANDARD.encode("alice:pa:ss");
        assert_eq!(
            basic_credentials(&headers_with(&format!("Basic {token}"))),
            Some(("alice".into(), "pa:ss".into()))
        );
        assert_eq!(
            basic_credentials(&headers_with(&format!("basic {token}"))),
            Some(("alice".into(), "pa:ss".into()))
        );
    }

    #[test]
    fn rejects_other_schemes_and_garbage() {
        assert!(basic_credentials(&HeaderMap::new()).is_none());
        assert!(basic_credentials(&headers_with("Bearer abc")).is_none());
        assert!(basic_credentials(&headers_with("Basic !!!")).is_none());
        let no_colon = STANDARD.encode("alice");
        assert!(basic_credentials(&headers_with(&format!("Basic {no_colon}"))).is_none());
    }

    #[test]
    fn decisions_follow_password_and_activity() {
        let creds = StaticCredentials::new()
            .with_user("alice", "s3cret")
            .with_inactive_user("bob", "hunter2");

        assert_eq!(
            creds.authenticate("alice", "s3cret"),
            AuthDecision::Granted(Identity { user: "alice".into() })
        );
        assert_eq!(creds.authenticate("alice", "wrong"), AuthDecision::Denied);
        assert_eq!(creds.authenticate("bob", "hunter2"), AuthDecision::Forbidden);
        assert_eq!(creds.authenticate("bob", "wrong"), AuthDecision::Denied);
        assert_eq!(creds.authenticate("carol", ""), AuthDecision::Denied);
    }

    #[test]
    fn credential_list_parsing() {
        let creds: StaticCredentials = " alice:a , !bob:b:c ,".parse().unwrap();
        assert_eq!(creds.len(), 2);
        assert_eq!(creds.authenticate("bob", "b:c"), AuthDecision::Forbidden);
        assert!("".parse::<StaticCredentials>().unwrap().is_empty());
        assert!("alice".parse::<StaticCredentials>().is_err());
        assert!(":nobody".parse::<StaticCredentials>().is_err());
    }
}
