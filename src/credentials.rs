//! Credential selection for a session.
//!
//! A session is fixed to one [`Credentials`] value for its lifetime.  The
//! factory backends decide how a profile name turns into actual keys.

use std::fmt;

/// Name of a credential profile in the shared credential store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Profile(String);

impl Profile {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl Default for Profile {
    fn default() -> Self {
        Self::new("default")
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a session authenticates against the service.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Resolve keys from a named profile.
    Profile(Profile),
    /// Explicit long-lived keys.
    Static {
        access_key_id: String,
        secret_access_key: String,
    },
}

impl Credentials {
    pub fn profile(name: impl Into<String>) -> Self {
        Credentials::Profile(Profile::new(name))
    }

    pub fn keys(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Credentials::Static {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
        }
    }

    /// Non-secret label identifying these credentials in logs and handles.
    pub fn label(&self) -> &str {
        match self {
            Credentials::Profile(profile) => profile.name(),
            Credentials::Static { access_key_id, .. } => access_key_id,
        }
    }
}

// Secrets must never reach log output.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Profile(profile) => f.debug_tuple("Profile").field(profile).finish(),
            Credentials::Static { access_key_id, .. } => f
                .debug_struct("Static")
                .field("access_key_id", access_key_id)
                .field("secret_access_key", &"<redacted>")
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label() {
        assert_eq!(Credentials::profile("work").label(), "work");
        assert_eq!(Credentials::keys("AKIAEXAMPLE", "s3cr3t").label(), "AKIAEXAMPLE");
    }

    #[test]
    fn test_debug_redacts_secret() {
        let rendered = format!("{:?}", Credentials::keys("AKIAEXAMPLE", "s3cr3t"));
        assert!(rendered.contains("AKIAEXAMPLE"));
        assert!(!rendered.contains("s3cr3t"));
    }

    #[test]
    fn test_default_profile() {
        assert_eq!(Profile::default().name(), "default");
    }
}
