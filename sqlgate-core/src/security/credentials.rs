//! Secure credential container with automatic memory zeroing.

use zeroize::{Zeroize, Zeroizing};

/// Username and optional password lifted out of a connection URL.
///
/// Both values are kept exactly as they appear in the URL (percent-encoded),
/// so they can be written back into a DSN without re-encoding.
///
/// # Example
///
/// ```rust
/// use sqlgate_core::security::Credentials;
///
/// let creds = Credentials::new("admin".to_string(), Some("secret".to_string()));
/// assert_eq!(creds.username(), "admin");
/// assert!(creds.has_password());
/// assert!(!format!("{:?}", creds).contains("secret"));
/// ```
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct Credentials {
    username: Zeroizing<String>,
    password: Zeroizing<Option<String>>,
}

impl Credentials {
    /// Creates new credentials with automatic memory zeroing.
    pub fn new(username: String, password: Option<String>) -> Self {
        Self {
            username: Zeroizing::new(username),
            password: Zeroizing::new(password),
        }
    }

    /// Gets the username (still protected by Zeroizing).
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Checks if password is present without exposing it.
    pub fn has_password(&self) -> bool {
        self.password.is_some()
    }

    /// Exposes the password for DSN assembly only.
    pub(crate) fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username())
            .field("password", &self.password.as_ref().map(|_| "****"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_new() {
        let creds = Credentials::new("testuser".to_string(), Some("testpass".to_string()));
        assert_eq!(creds.username(), "testuser");
        assert!(creds.has_password());
        assert_eq!(creds.password(), Some("testpass"));
    }

    #[test]
    fn test_credentials_no_password() {
        let creds = Credentials::new("testuser".to_string(), None);
        assert!(!creds.has_password());
        assert_eq!(creds.password(), None);
    }

    #[test]
    fn test_credential_debug_is_redacted() {
        let creds = Credentials::new("user".to_string(), Some("hunter2".to_string()));
        let debug = format!("{:?}", creds);
        assert!(debug.contains("user"));
        assert!(debug.contains("****"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_credentials_clone() {
        let creds1 = Credentials::new("user".to_string(), Some("pass".to_string()));
        let creds2 = creds1.clone();
        assert_eq!(creds1.username(), creds2.username());
        assert_eq!(creds1.has_password(), creds2.has_password());
    }
}
