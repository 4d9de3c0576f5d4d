use alloc::string::String;

use log::warn;

use crate::connectivity::LinkState;
use crate::request::{Request, Verb};

/// Default shared secret.
pub const DEFAULT_SECRET: &str = "WHALE";

/// The outcome of a request authorization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthResult {
    /// Whether the request has been authorized.
    pub authorized: bool,
    /// The status code sent back to the client.
    pub status: u16,
    /// The plain-text message sent back to the client.
    pub message: String,
}

impl AuthResult {
    fn accepted(message: &str) -> Self {
        Self {
            authorized: true,
            status: 200,
            message: message.into(),
        }
    }

    fn rejected(status: u16, message: &str) -> Self {
        Self {
            authorized: false,
            status,
            message: message.into(),
        }
    }
}

/// Authorizes requests through a verb constraint and a shared secret.
///
/// The gate is stateless: each authorization only depends on the request,
/// the configured secret, and the current [`LinkState`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthGate {
    secret: String,
    verb: Verb,
}

impl Default for AuthGate {
    fn default() -> Self {
        Self::new(DEFAULT_SECRET)
    }
}

impl AuthGate {
    /// Creates an [`AuthGate`] permitting only [`Verb::Post`] requests
    /// carrying the given secret.
    #[must_use]
    pub fn new(secret: &str) -> Self {
        Self {
            secret: secret.into(),
            verb: Verb::Post,
        }
    }

    /// Sets the only permitted verb.
    #[must_use]
    pub const fn permitted_verb(mut self, verb: Verb) -> Self {
        self.verb = verb;
        self
    }

    /// Returns the permitted verb.
    #[must_use]
    pub const fn permitted(&self) -> Verb {
        self.verb
    }

    /// Returns the shared secret.
    #[must_use]
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Authorizes a request.
    ///
    /// The verb is checked before the secret, so a request with a wrong
    /// verb is rejected with `405` even when its secret is correct. An
    /// authorized request is answered with the given response, or with
    /// `OK` when none is given.
    ///
    /// When the device is not connected, the request is never authorized.
    #[must_use]
    pub fn authorize(&self, request: &Request, state: LinkState, response: Option<&str>) -> AuthResult {
        if !state.is_connected() {
            return AuthResult::rejected(503, "OFFLINE");
        }

        if request.verb() != self.verb {
            warn!("Rejected {} request, only {} is permitted", request.verb(), self.verb);
            return AuthResult::rejected(405, "WRONG METHOD");
        }

        if request.secret() != Some(self.secret.as_str()) {
            warn!("Rejected request with a wrong secret");
            return AuthResult::rejected(403, "ERROR");
        }

        AuthResult::accepted(response.unwrap_or("OK"))
    }
}
