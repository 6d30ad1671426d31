//! Graph store adapter.
//!
//! The lifecycle managers never touch storage directly; they consume the
//! [`GraphStore`] trait. Two layers implement it here:
//!
//! - [`mem::MemGraphStore`] — resources in concurrent hashmaps (DashMap),
//!   with per-resource entry locks providing the atomic expected-date check
//! - [`durable::DurableStore`] — redb-backed write-through persistence the
//!   memory layer loads from on open
//!
//! Every mutation carries a [`LastModCheck`]; the store re-validates it under
//! the target resource's exclusive lock, so racing writers are resolved
//! deterministically (one [`StoreError::WriteConflict`]) rather than by
//! silent overwrite.

pub mod durable;
pub mod mem;

pub use durable::DurableStore;
pub use mem::MemGraphStore;

use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::iri::{ActorIri, PropertyIri, ResourceIri, ValueIri};
use crate::perm::Acl;
use crate::resource::Resource;
use crate::value::{DeletionInfo, ValueRecord, ValueVersion};
use uuid::Uuid;

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// The optimistic-concurrency expectation attached to a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LastModCheck {
    /// No expectation; the write always proceeds (value-level operations).
    Unchecked,
    /// The resource must never have been modified.
    Absent,
    /// The stored last modification date must equal this exactly.
    Exactly(DateTime<Utc>),
}

impl LastModCheck {
    /// Build the check the metadata-level operations use: `Some(ts)` demands
    /// an exact match, `None` demands absence.
    pub fn expecting(expected: Option<DateTime<Utc>>) -> Self {
        match expected {
            Some(ts) => LastModCheck::Exactly(ts),
            None => LastModCheck::Absent,
        }
    }
}

/// Where a value-version IRI resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueAddress {
    pub resource: ResourceIri,
    pub value: Uuid,
    pub index: u32,
}

/// One store mutation. Every variant names its target resource and carries
/// the concurrency expectation checked under the entry lock.
#[derive(Debug, Clone)]
pub enum WriteRequest {
    CreateResource {
        resource: Resource,
    },
    UpdateMetadata {
        resource: ResourceIri,
        check: LastModCheck,
        label: Option<String>,
        permissions: Option<Acl>,
        timestamp: DateTime<Utc>,
        actor: ActorIri,
    },
    MarkResourceDeleted {
        resource: ResourceIri,
        check: LastModCheck,
        deletion: DeletionInfo,
        timestamp: DateTime<Utc>,
    },
    CreateValue {
        resource: ResourceIri,
        check: LastModCheck,
        property: PropertyIri,
        record: ValueRecord,
        timestamp: DateTime<Utc>,
    },
    AppendValueVersion {
        resource: ResourceIri,
        check: LastModCheck,
        value: Uuid,
        version: ValueVersion,
        timestamp: DateTime<Utc>,
    },
    MarkValueDeleted {
        resource: ResourceIri,
        check: LastModCheck,
        value: Uuid,
        deletion: DeletionInfo,
        timestamp: DateTime<Utc>,
    },
}

impl WriteRequest {
    /// The resource the write targets.
    pub fn target(&self) -> &ResourceIri {
        match self {
            WriteRequest::CreateResource { resource } => &resource.iri,
            WriteRequest::UpdateMetadata { resource, .. }
            | WriteRequest::MarkResourceDeleted { resource, .. }
            | WriteRequest::CreateValue { resource, .. }
            | WriteRequest::AppendValueVersion { resource, .. }
            | WriteRequest::MarkValueDeleted { resource, .. } => resource,
        }
    }
}

/// What an erase physically removed, for logging and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EraseReport {
    /// Values of the erased resource (all their versions went with them).
    pub values_removed: usize,
    /// Version records across those values.
    pub versions_removed: usize,
    /// Standoff tags across those versions.
    pub standoff_removed: usize,
    /// Link values in *other* resources that pointed at the erased one.
    pub dangling_links_removed: usize,
}

/// The narrow storage interface the engine consumes.
pub trait GraphStore: Send + Sync {
    /// Whether a resource with this IRI exists (erased resources do not).
    fn exists(&self, iri: &ResourceIri) -> bool;

    /// Whether any link value anywhere targets `iri`. With
    /// `include_deleted`, soft-deleted links and links held by soft-deleted
    /// resources count too; otherwise only live links do.
    fn is_referenced(&self, iri: &ResourceIri, include_deleted: bool) -> bool;

    /// Read the current state of a resource.
    fn read_resource(&self, iri: &ResourceIri) -> StoreResult<Resource>;

    /// Read the full version chain of a value.
    fn read_value_chain(&self, resource: &ResourceIri, value: Uuid)
        -> StoreResult<Vec<ValueVersion>>;

    /// Resolve a value-version IRI to its chain position, if it exists.
    fn resolve_value_iri(&self, iri: &ValueIri) -> Option<ValueAddress>;

    /// Apply one mutation atomically and return the updated resource.
    ///
    /// The stored `last_modification_date` after a successful mutating write
    /// is strictly greater than before (the store nudges a stale timestamp
    /// forward by one millisecond).
    fn write(&self, request: WriteRequest) -> StoreResult<Resource>;

    /// Physically remove a resource, all its value versions and standoff
    /// tags, and every link value that pointed at it. Re-validates that no
    /// live incoming link exists immediately before deletion and fails with
    /// [`StoreError::Referenced`] otherwise.
    fn erase_subtree(&self, iri: &ResourceIri, check: LastModCheck) -> StoreResult<EraseReport>;
}
