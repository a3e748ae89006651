use std::collections::HashMap;

use crate::config::ConfigError;
use crate::models::principal::{Principal, Role};

/// Resolves a bearer token into a verified principal.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, token: &str) -> Option<Principal>;
}

/// Static token directory, loaded from `AUTH_TOKENS`.
///
/// Entries look like `token=role:user[:gym_id[:email[:name]]]` and are separated by `;`.
/// Roles are `member` and `system_admin`. Email and name are handed to the gateway as the
/// purchaser at checkout. An administrator without a gym leaves that slot empty
/// (`t=system_admin:root::root@example.com`).
#[derive(Debug, Default, Clone)]
pub struct TokenAuthenticator {
    principals: HashMap<String, Principal>,
}

impl TokenAuthenticator {
    pub fn parse(directory: &str) -> Result<Self, ConfigError> {
        let mut principals = HashMap::new();

        for entry in directory.split(';').map(str::trim).filter(|e| !e.is_empty()) {
            let invalid = || ConfigError::Invalid {
                var: "AUTH_TOKENS",
                value: redact(entry),
            };

            let (token, identity) = entry.split_once('=').ok_or_else(invalid)?;
            let mut parts = identity.split(':').map(str::trim);
            let role = match parts.next() {
                Some("member") => Role::Member,
                Some("system_admin") | Some("admin") => Role::SystemAdmin,
                _ => return Err(invalid()),
            };
            let user_id = parts.next().filter(|u| !u.is_empty()).ok_or_else(invalid)?;
            let gym_id = parts.next().filter(|g| !g.is_empty()).map(str::to_string);
            if role == Role::Member && gym_id.is_none() {
                return Err(invalid());
            }
            let email = parts.next().filter(|e| !e.is_empty()).map(str::to_string);
            if email.as_deref().is_some_and(|e| !e.contains('@')) {
                return Err(invalid());
            }
            let name = parts.next().filter(|n| !n.is_empty()).map(str::to_string);
            if parts.next().is_some() {
                return Err(invalid());
            }

            principals.insert(
                token.trim().to_string(),
                Principal {
                    user_id: user_id.to_string(),
                    role,
                    gym_id,
                    email,
                    name,
                },
            );
        }

        log::info!("Loaded {} API principals", principals.len());
        Ok(Self { principals })
    }

    pub fn with_principal(mut self, token: impl Into<String>, principal: Principal) -> Self {
        self.principals.insert(token.into(), principal);
        self
    }
}

impl Authenticator for TokenAuthenticator {
    fn authenticate(&self, token: &str) -> Option<Principal> {
        self.principals.get(token.trim()).cloned()
    }
}

/// Keeps the token out of error messages.
fn redact(entry: &str) -> String {
    match entry.split_once('=') {
        Some((_, identity)) => format!("***={}", identity),
        None => "***".to_string(),
    }
}
