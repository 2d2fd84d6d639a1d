//! User directory and stateless HMAC bearer tokens.
//!
//! Tokens are self-contained: `base64url(subject "." expiry "." hex_sig)`
//! where the signature is HMAC-SHA256 over `subject "." expiry` with the
//! shared secret. Validity is re-derived entirely from the token fields,
//! so the authority keeps no session state.

use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use ring::hmac;
use ring::rand::SystemRandom;
use tracing::debug;

use crate::error::{AuthErrorKind, VpnError, VpnResult};

use super::user::{generate_id, User};

/// Issues and validates bearer tokens and owns the user directory.
pub struct TokenAuthority {
    key: hmac::Key,
    token_ttl: Duration,
    rng: SystemRandom,
    /// Directory keyed by email when one was supplied, else by ID.
    users: RwLock<HashMap<String, User>>,
}

impl TokenAuthority {
    /// Create a new token authority with the given signing secret.
    pub fn new(secret: &[u8], token_ttl: Duration) -> Self {
        Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, secret),
            token_ttl,
            rng: SystemRandom::new(),
            users: RwLock::new(HashMap::new()),
        }
    }

    /// Load the token-signing secret from a file.
    ///
    /// Security: Verifies the file has restrictive permissions (0600 or 0400)
    /// before loading to prevent secrets from being readable by other users.
    pub fn load_secret(path: &Path) -> VpnResult<Vec<u8>> {
        let metadata = std::fs::metadata(path).map_err(|e| VpnError::Auth {
            kind: AuthErrorKind::SecretError {
                message: format!(
                    "Failed to read secret metadata from {}: {}",
                    path.display(),
                    e
                ),
            },
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = metadata.permissions().mode();
            // Group and world bits must be zero
            if mode & 0o077 != 0 {
                return Err(VpnError::Auth {
                    kind: AuthErrorKind::SecretError {
                        message: format!(
                            "Secret file {} has insecure permissions {:04o}, expected 0600 or 0400",
                            path.display(),
                            mode & 0o777
                        ),
                    },
                });
            }
        }

        std::fs::read(path).map_err(|e| VpnError::Auth {
            kind: AuthErrorKind::SecretError {
                message: format!("Failed to read secret from {}: {}", path.display(), e),
            },
        })
    }

    /// Register a new user with an optional email.
    ///
    /// Fails with `DuplicateEmail` if a non-empty email is already present
    /// in the directory. The user is stored under the email when one was
    /// supplied, otherwise under the generated ID.
    pub fn register_user(&self, email: Option<&str>, public_key: &str) -> VpnResult<User> {
        let email = email.filter(|e| !e.is_empty());

        let mut users = match self.users.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(email) = email {
            if users.contains_key(email) {
                return Err(VpnError::Auth {
                    kind: AuthErrorKind::DuplicateEmail,
                });
            }
        }

        // Retry until the candidate ID does not collide with a directory
        // key. Collisions are astronomically unlikely with 48 bits of
        // randomness, but the loop is a correctness requirement.
        let mut id = generate_id(&self.rng)?;
        while users.contains_key(&id) {
            id = generate_id(&self.rng)?;
        }

        let user = User {
            id,
            email: email.map(str::to_string),
            public_key: public_key.to_string(),
            created_at: unix_now()?,
        };

        let directory_key = user.email.clone().unwrap_or_else(|| user.id.clone());
        users.insert(directory_key, user.clone());

        debug!(user_id = %user.id, has_email = user.email.is_some(), "User registered");

        Ok(user)
    }

    /// Look up a user by directory key (email when one was supplied at
    /// registration, else the generated ID).
    pub fn find_user(&self, key: &str) -> Option<User> {
        let users = match self.users.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        users.get(key).cloned()
    }

    /// Number of registered users.
    pub fn user_count(&self) -> usize {
        let users = match self.users.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        users.len()
    }

    /// Issue a bearer token for the given subject.
    ///
    /// The subject is not checked against the directory; binding the
    /// subject to a registered user is the caller's responsibility.
    pub fn issue_token(&self, subject_id: &str) -> VpnResult<String> {
        let expiry = unix_now()? + self.token_ttl.as_secs();
        Ok(self.encode_token(subject_id, expiry))
    }

    /// Token lifetime configured for this authority.
    pub fn token_ttl(&self) -> Duration {
        self.token_ttl
    }

    /// Verify a bearer token and return the subject ID it was issued for.
    pub fn verify_token(&self, token: &str) -> VpnResult<String> {
        let decoded = URL_SAFE.decode(token).map_err(|e| malformed(format!("Invalid encoding: {}", e)))?;
        let decoded =
            String::from_utf8(decoded).map_err(|_| malformed("Token is not valid UTF-8".to_string()))?;

        let parts: Vec<&str> = decoded.split('.').collect();
        if parts.len() != 3 {
            return Err(malformed(format!("Expected 3 fields, got {}", parts.len())));
        }

        let (subject, expiry_str, signature) = (parts[0], parts[1], parts[2]);

        let expiry: u64 = expiry_str
            .parse()
            .map_err(|_| malformed("Invalid expiry timestamp".to_string()))?;

        if unix_now()? >= expiry {
            return Err(VpnError::Auth {
                kind: AuthErrorKind::Expired,
            });
        }

        let message = format!("{}.{}", subject, expiry_str);
        let signature_bytes = hex::decode(signature).map_err(|_| VpnError::Auth {
            kind: AuthErrorKind::InvalidSignature,
        })?;

        // Constant-time comparison
        hmac::verify(&self.key, message.as_bytes(), &signature_bytes).map_err(|_| VpnError::Auth {
            kind: AuthErrorKind::InvalidSignature,
        })?;

        Ok(subject.to_string())
    }

    fn encode_token(&self, subject_id: &str, expiry: u64) -> String {
        let message = format!("{}.{}", subject_id, expiry);
        let tag = hmac::sign(&self.key, message.as_bytes());
        let token = format!("{}.{}", message, hex::encode(tag.as_ref()));
        URL_SAFE.encode(token)
    }
}

fn unix_now() -> VpnResult<u64> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| VpnError::Auth {
            kind: AuthErrorKind::SecretError {
                message: format!("System time error: {}", e),
            },
        })?
        .as_secs())
}

fn malformed(message: String) -> VpnError {
    VpnError::Auth {
        kind: AuthErrorKind::MalformedToken { message },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authority() -> TokenAuthority {
        TokenAuthority::new(b"test secret", Duration::from_secs(86_400))
    }

    #[test]
    fn test_token_round_trip() {
        let authority = authority();
        let token = authority.issue_token("i-0000-1111-2222").unwrap();
        let subject = authority.verify_token(&token).unwrap();
        assert_eq!(subject, "i-0000-1111-2222");
    }

    #[test]
    fn test_token_wrong_secret_rejected() {
        let issuer = TokenAuthority::new(b"secret one", Duration::from_secs(60));
        let verifier = TokenAuthority::new(b"secret two", Duration::from_secs(60));

        let token = issuer.issue_token("i-0000-1111-2222").unwrap();
        let result = verifier.verify_token(&token);
        assert!(matches!(
            result,
            Err(VpnError::Auth {
                kind: AuthErrorKind::InvalidSignature
            })
        ));
    }

    #[test]
    fn test_expired_token_rejected() {
        let authority = authority();
        // Consistently signed, but with an expiry in the past
        let token = authority.encode_token("i-0000-1111-2222", 1_000);

        let result = authority.verify_token(&token);
        assert!(matches!(
            result,
            Err(VpnError::Auth {
                kind: AuthErrorKind::Expired
            })
        ));
    }

    #[test]
    fn test_tampered_signature_rejected() {
        let authority = authority();
        let token = authority.issue_token("i-0000-1111-2222").unwrap();

        let decoded = String::from_utf8(URL_SAFE.decode(&token).unwrap()).unwrap();
        let mut parts: Vec<String> = decoded.split('.').map(str::to_string).collect();
        // Flip a hex digit in the signature
        let sig = parts[2].clone();
        parts[2] = if sig.starts_with('0') {
            format!("1{}", &sig[1..])
        } else {
            format!("0{}", &sig[1..])
        };
        let tampered = URL_SAFE.encode(parts.join("."));

        let result = authority.verify_token(&tampered);
        assert!(matches!(
            result,
            Err(VpnError::Auth {
                kind: AuthErrorKind::InvalidSignature
            })
        ));
    }

    #[test]
    fn test_tampered_subject_rejected() {
        let authority = authority();
        let token = authority.issue_token("i-0000-1111-2222").unwrap();

        let decoded = String::from_utf8(URL_SAFE.decode(&token).unwrap()).unwrap();
        let mut parts: Vec<String> = decoded.split('.').map(str::to_string).collect();
        parts[0] = "i-aaaa-bbbb-cccc".to_string();
        let tampered = URL_SAFE.encode(parts.join("."));

        let result = authority.verify_token(&tampered);
        assert!(matches!(
            result,
            Err(VpnError::Auth {
                kind: AuthErrorKind::InvalidSignature
            })
        ));
    }

    #[test]
    fn test_malformed_tokens_rejected() {
        let authority = authority();

        // Not base64url at all
        let cases = [
            "not a token!".to_string(),
            // Valid encoding, wrong field count
            URL_SAFE.encode("only-one-field"),
            URL_SAFE.encode("two.fields"),
            URL_SAFE.encode("a.b.c.d"),
            // Non-numeric expiry
            URL_SAFE.encode("i-0000-1111-2222.notanumber.deadbeef"),
        ];

        for token in cases {
            let result = authority.verify_token(&token);
            assert!(
                matches!(
                    result,
                    Err(VpnError::Auth {
                        kind: AuthErrorKind::MalformedToken { .. }
                    })
                ),
                "expected MalformedToken for {:?}",
                token
            );
        }
    }

    #[test]
    fn test_issue_does_not_require_registered_subject() {
        let authority = authority();
        let token = authority.issue_token("i-no-such-user").unwrap();
        assert_eq!(authority.verify_token(&token).unwrap(), "i-no-such-user");
    }

    #[test]
    fn test_register_duplicate_email_rejected() {
        let authority = authority();
        authority
            .register_user(Some("test@example.com"), "abc123")
            .unwrap();

        let result = authority.register_user(Some("test@example.com"), "cde345");
        assert!(matches!(
            result,
            Err(VpnError::Auth {
                kind: AuthErrorKind::DuplicateEmail
            })
        ));
    }

    #[test]
    fn test_register_anonymous_users() {
        let authority = authority();
        let a = authority.register_user(None, "key-a").unwrap();
        let b = authority.register_user(Some(""), "key-b").unwrap();

        assert_ne!(a.id, b.id);
        assert!(a.email.is_none());
        assert!(b.email.is_none());
        assert_eq!(authority.user_count(), 2);
    }

    #[test]
    fn test_register_fields() {
        let authority = authority();
        let user = authority
            .register_user(Some("test@example.com"), "abc123")
            .unwrap();

        assert_eq!(user.email.as_deref(), Some("test@example.com"));
        assert_eq!(user.public_key, "abc123");
        assert!(!user.id.is_empty());
        assert!(user.created_at > 0);
    }

    #[test]
    fn test_directory_key_asymmetry() {
        // A user registered with an email is stored under the email only;
        // lookup by the generated ID finds nothing.
        let authority = authority();
        let user = authority
            .register_user(Some("test@example.com"), "abc123")
            .unwrap();

        assert!(authority.find_user("test@example.com").is_some());
        assert!(authority.find_user(&user.id).is_none());

        // An anonymous user is stored under the ID.
        let anon = authority.register_user(None, "key").unwrap();
        assert!(authority.find_user(&anon.id).is_some());
    }
}
