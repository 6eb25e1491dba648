//! Rate limit key generation.

/// Whose budget a request is charged against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyScope {
    /// An authenticated subject
    User,
    /// A client address, used when no subject is known
    Ip,
}

impl KeyScope {
    /// The tag used in the rendered key.
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyScope::User => "user",
            KeyScope::Ip => "ip",
        }
    }
}

/// A key that uniquely identifies one sliding window.
///
/// The key is composed of the scope, the identity within that scope and the
/// request path, so every route gets its own budget.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey {
    /// Scope of the identity
    pub scope: KeyScope,
    /// Subject id or client address
    pub identity: String,
    /// Route path the budget applies to
    pub path: String,
}

impl RateLimitKey {
    /// Build the key for a request.
    ///
    /// An authenticated subject always wins over the client address.
    pub fn for_request(subject: Option<&str>, client_ip: &str, path: &str) -> Self {
        match subject {
            Some(subject) => Self::user(subject, path),
            None => Self::ip(client_ip, path),
        }
    }

    /// Key charged to an authenticated subject.
    pub fn user(subject: &str, path: &str) -> Self {
        Self {
            scope: KeyScope::User,
            identity: subject.to_string(),
            path: path.to_string(),
        }
    }

    /// Key charged to a client address.
    pub fn ip(addr: &str, path: &str) -> Self {
        Self {
            scope: KeyScope::Ip,
            identity: addr.to_string(),
            path: path.to_string(),
        }
    }

    /// Convert the key to its string representation.
    pub fn to_string_key(&self) -> String {
        format!("{}:{}:{}", self.scope.as_str(), self.identity, self.path)
    }
}

impl std::fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_string_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_takes_precedence() {
        let key = RateLimitKey::for_request(Some("alice"), "10.0.0.1", "/api/chat");

        assert_eq!(key.scope, KeyScope::User);
        assert_eq!(key.identity, "alice");
        assert_eq!(key.to_string_key(), "user:alice:/api/chat");
    }

    #[test]
    fn test_falls_back_to_ip() {
        let key = RateLimitKey::for_request(None, "10.0.0.1", "/api/chat");

        assert_eq!(key.scope, KeyScope::Ip);
        assert_eq!(key.to_string(), "ip:10.0.0.1:/api/chat");
    }

    #[test]
    fn test_key_is_stable_for_identical_requests() {
        let key1 = RateLimitKey::for_request(Some("bob"), "1.1.1.1", "/api/users");
        let key2 = RateLimitKey::for_request(Some("bob"), "2.2.2.2", "/api/users");

        assert_eq!(key1, key2);
    }

    #[test]
    fn test_scopes_do_not_collide() {
        // A subject id that happens to look like an address is still a user key.
        let user = RateLimitKey::user("10.0.0.1", "/api");
        let ip = RateLimitKey::ip("10.0.0.1", "/api");

        assert_ne!(user, ip);
    }
}
