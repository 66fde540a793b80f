//! Credential and identifier collaborators used by the registration path.
//!
//! - [`password`]: [`password::CredentialHasher`] and its Argon2id implementation
//! - [`ids`]: [`ids::IdGenerator`] and its UUID v4 implementation

pub mod ids;
pub mod password;
