//! Session snapshot types

use serde::{Deserialize, Serialize};

/// The signed-in user as the storefront knows it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Principal {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// Bearer credential. Never printed in full.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Short tokens would be printed whole by any prefix
        if self.0.chars().count() > 8 {
            let visible: String = self.0.chars().take(4).collect();
            write!(f, "Credential({}…)", visible)
        } else {
            f.write_str("Credential(…)")
        }
    }
}

/// Immutable view of the session at one version
///
/// Two snapshots describe the same logical state when principal and credential
/// match; `version` only orders them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    principal: Option<Principal>,
    credential: Option<Credential>,
    version: u64,
}

impl SessionState {
    pub(crate) fn new(
        principal: Option<Principal>,
        credential: Option<Credential>,
        version: u64,
    ) -> Self {
        Self {
            principal,
            credential,
            version,
        }
    }

    pub(crate) fn signed_out(version: u64) -> Self {
        Self::new(None, None, version)
    }

    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Signed in means we hold a credential to send
    pub fn is_authenticated(&self) -> bool {
        self.credential.is_some()
    }

    /// Structural equality, ignoring the version
    pub fn same_identity(
        &self,
        principal: Option<&Principal>,
        credential: Option<&Credential>,
    ) -> bool {
        self.principal.as_ref() == principal && self.credential.as_ref() == credential
    }
}
