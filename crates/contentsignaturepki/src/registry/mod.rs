mod memory;

use std::time::Duration;

use anyhow::Result;
use time::OffsetDateTime;

pub use memory::MemoryRegistry;

/// A row of the end-entity table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndEntityRecord {
    pub label: String,
    pub signer_id: String,
    pub x5u: String,
    /// Key-store handle of the end-entity private key.
    pub key_handle: String,
    pub created_at: OffsetDateTime,
    /// Cleared when a newer end-entity is inserted for the same signer.
    pub is_current: bool,
}

/// What an end-entity is inserted with; the registry stamps the rest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEndEntity {
    pub x5u: String,
    pub label: String,
    pub signer_id: String,
    pub key_handle: String,
}

/// Outcome of looking up an end-entity for a signer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EeLookup {
    Found(EndEntityRecord),
    /// No current end-entity still within its validity. One should be made.
    NotFound,
}

/// Store recording which end-entity is active for each signer.
pub trait EndEntityRegistry: Send + Sync {
    /// Opens a scope that is exclusive for `signer_id` until it is committed
    /// or dropped. Blocks while another scope holds the same signer.
    fn begin_end_entity_operations<'a>(
        &'a self,
        signer_id: &str,
    ) -> Result<Box<dyn EndEntityTransaction + 'a>>;
}

/// An open end-entity scope.
///
/// Dropping the scope without calling `commit` rolls back every insert made
/// through it and releases the signer.
pub trait EndEntityTransaction {
    /// Most recent current end-entity of `signer_id` created within `validity`.
    fn find_suitable_ee(&mut self, signer_id: &str, validity: Duration) -> Result<EeLookup>;

    fn insert_ee(&mut self, ee: NewEndEntity) -> Result<()>;

    /// Commits the inserts and releases the scope.
    fn commit(self: Box<Self>) -> Result<()>;
}
