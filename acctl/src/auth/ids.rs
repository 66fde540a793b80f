//! Account identifier generation.

use crate::types::UserId;
use uuid::Uuid;

/// Produces a fresh, globally unique account id. Infallible.
pub trait IdGenerator: Send + Sync {
    fn new_id(&self) -> UserId;
}

/// Random (v4) UUIDs in hyphenated lowercase form.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidV4Generator;

impl IdGenerator for UuidV4Generator {
    fn new_id(&self) -> UserId {
        Uuid::new_v4().to_string()
    }
}
