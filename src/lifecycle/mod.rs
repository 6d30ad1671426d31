//! Lifecycle managers: the operation layer of the engine.
//!
//! Every mutation enters through a request struct carrying the acting
//! [`Actor`], the optimistic-concurrency expectation where the operation
//! demands one, and an idempotency token for request tracing. The managers
//! validate (permissions, ontology, payload well-formedness, duplicates,
//! referential integrity) *before* touching the store, then submit a single
//! [`crate::store::WriteRequest`]; a store-level write conflict surfaces as
//! [`LifecycleError::EditConflict`].

pub mod integrity;
pub mod resource;
pub mod value;

use chrono::{DateTime, TimeDelta, Utc};
use uuid::Uuid;

use crate::actor::Actor;
use crate::error::{LifecycleError, StoreError};
use crate::iri::{ActorIri, ClassIri, ProjectIri, PropertyIri, ResourceIri, ValueIri};
use crate::perm::{Acl, Level, ObjectCtx};
use crate::resource::Resource;
use crate::store::LastModCheck;
use crate::value::ValueContent;

pub use integrity::ReferentialIntegrity;
pub use resource::ResourceManager;
pub use value::ValueManager;

/// Result type for lifecycle operations.
pub type LifecycleResult<T> = std::result::Result<T, LifecycleError>;

/// One value submitted as part of resource creation.
#[derive(Debug, Clone)]
pub struct NewValue {
    pub property: PropertyIri,
    pub content: ValueContent,
    pub comment: Option<String>,
    /// `None` takes the class default permissions.
    pub permissions: Option<Acl>,
    /// Caller-supplied stable UUID; `None` mints a fresh one.
    pub value_uuid: Option<Uuid>,
}

impl NewValue {
    pub fn new(property: PropertyIri, content: ValueContent) -> Self {
        Self {
            property,
            content,
            comment: None,
            permissions: None,
            value_uuid: None,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn with_permissions(mut self, acl: Acl) -> Self {
        self.permissions = Some(acl);
        self
    }

    pub fn with_uuid(mut self, uuid: Uuid) -> Self {
        self.value_uuid = Some(uuid);
        self
    }
}

/// Create a resource together with its initial values.
#[derive(Debug, Clone)]
pub struct CreateResourceRequest {
    pub class: ClassIri,
    pub label: String,
    pub project: ProjectIri,
    pub values: Vec<NewValue>,
    /// `None` takes the class default permissions.
    pub permissions: Option<Acl>,
    pub actor: Actor,
    /// Idempotency token, logged for request tracing.
    pub request_id: Uuid,
}

/// Update a resource's label and/or permissions.
#[derive(Debug, Clone)]
pub struct UpdateMetadataRequest {
    pub resource: ResourceIri,
    /// The class the caller believes the resource has; mismatch is a bad
    /// request.
    pub class: Option<ClassIri>,
    /// The last modification date the caller read; `None` asserts the
    /// resource has never been modified.
    pub expected_last_modification: Option<DateTime<Utc>>,
    /// Caller-supplied new modification date; must be strictly after the
    /// stored one. `None` takes the current time.
    pub new_modification_date: Option<DateTime<Utc>>,
    pub label: Option<String>,
    pub permissions: Option<Acl>,
    pub actor: Actor,
}

/// Soft-delete a resource.
#[derive(Debug, Clone)]
pub struct MarkDeletedRequest {
    pub resource: ResourceIri,
    pub class: Option<ClassIri>,
    pub expected_last_modification: Option<DateTime<Utc>>,
    pub comment: Option<String>,
    /// Caller-supplied deletion date; `None` takes the current time.
    pub delete_date: Option<DateTime<Utc>>,
    pub actor: Actor,
}

/// Physically remove a resource and everything that hangs off it.
#[derive(Debug, Clone)]
pub struct EraseRequest {
    pub resource: ResourceIri,
    pub class: Option<ClassIri>,
    pub expected_last_modification: Option<DateTime<Utc>>,
    pub actor: Actor,
}

/// Add a value to an existing resource.
#[derive(Debug, Clone)]
pub struct CreateValueRequest {
    pub resource: ResourceIri,
    /// Optional resource-level expectation; value operations are already
    /// guarded by current-version addressing, so `None` skips the check.
    pub expected_last_modification: Option<DateTime<Utc>>,
    pub property: PropertyIri,
    pub content: ValueContent,
    pub comment: Option<String>,
    pub permissions: Option<Acl>,
    pub value_uuid: Option<Uuid>,
    pub actor: Actor,
    pub request_id: Uuid,
}

/// Append a content version to a value, addressed by its *current* version
/// IRI.
#[derive(Debug, Clone)]
pub struct UpdateValueContentRequest {
    pub resource: ResourceIri,
    pub expected_last_modification: Option<DateTime<Utc>>,
    pub value: ValueIri,
    pub content: ValueContent,
    pub comment: Option<String>,
    pub actor: Actor,
    pub request_id: Uuid,
}

/// Replace a value's permissions without touching its content.
#[derive(Debug, Clone)]
pub struct UpdateValuePermissionsRequest {
    pub resource: ResourceIri,
    pub expected_last_modification: Option<DateTime<Utc>>,
    pub value: ValueIri,
    pub permissions: Acl,
    pub actor: Actor,
}

/// Soft-delete a value.
#[derive(Debug, Clone)]
pub struct DeleteValueRequest {
    pub resource: ResourceIri,
    pub expected_last_modification: Option<DateTime<Utc>>,
    pub value: ValueIri,
    pub comment: Option<String>,
    pub delete_date: Option<DateTime<Utc>>,
    pub actor: Actor,
}

/// What a successful value mutation returns: where the new version lives and
/// the resource's new concurrency anchor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueReceipt {
    pub resource: ResourceIri,
    pub value: Uuid,
    pub version: ValueIri,
    pub last_modification_date: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// A timestamp strictly after `prev`, normally just now.
pub(crate) fn timestamp_after(prev: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = Utc::now();
    match prev {
        Some(p) if now <= p => p + TimeDelta::milliseconds(1),
        _ => now,
    }
}

/// The concurrency check a value operation uses: an explicit expectation
/// when the caller supplied one, otherwise unchecked (current-version
/// addressing already guards the edit).
pub(crate) fn value_check(expected: Option<DateTime<Utc>>) -> LastModCheck {
    match expected {
        Some(ts) => LastModCheck::Exactly(ts),
        None => LastModCheck::Unchecked,
    }
}

/// Fail when the caller's idea of the resource's class disagrees with the
/// stored one.
pub(crate) fn check_class(resource: &Resource, expected: Option<&ClassIri>) -> LifecycleResult<()> {
    match expected {
        Some(class) if *class != resource.class => Err(LifecycleError::bad_request(format!(
            "resource {} has class {}, not {class}",
            resource.iri, resource.class
        ))),
        _ => Ok(()),
    }
}

/// Surface a store write conflict as the operation-level edit conflict.
pub(crate) fn map_conflict(err: StoreError) -> LifecycleError {
    match err {
        StoreError::WriteConflict {
            resource,
            expected,
            actual,
        } => LifecycleError::EditConflict {
            resource,
            expected,
            actual,
        },
        other => LifecycleError::Store(other),
    }
}

/// Mutations need an authenticated actor.
pub(crate) fn require_identity(actor: &Actor) -> LifecycleResult<ActorIri> {
    actor
        .id()
        .cloned()
        .ok_or_else(|| LifecycleError::Forbidden {
            actor: actor.describe(),
            needed: "an authenticated identity".to_string(),
            target: "any mutation".to_string(),
        })
}

/// ACL gate with the administrator bypass layered on top.
pub(crate) fn require_level(
    acl: &Acl,
    actor: &Actor,
    ctx: ObjectCtx<'_>,
    needed: Level,
    target: &str,
) -> LifecycleResult<()> {
    if actor.can_administer(ctx.project) || acl.grants(actor, ctx, needed) {
        Ok(())
    } else {
        Err(LifecycleError::Forbidden {
            actor: actor.describe(),
            needed: needed.to_string(),
            target: target.to_string(),
        })
    }
}

/// The highest level an ACL grants anyone.
fn acl_ceiling(acl: &Acl) -> Option<Level> {
    acl.entries().iter().map(|(level, _)| *level).max()
}

/// Gate a caller-supplied ACL: a non-administrator may not grant a higher
/// level than the class default does.
pub(crate) fn admit_custom_acl(
    custom: Option<Acl>,
    default: &Acl,
    actor: &Actor,
    project: &ProjectIri,
) -> LifecycleResult<Acl> {
    match custom {
        None => Ok(default.clone()),
        Some(acl) => {
            if !actor.can_administer(project) && acl_ceiling(&acl) > acl_ceiling(default) {
                return Err(LifecycleError::bad_request(format!(
                    "custom permissions \"{acl}\" grant more than the class default \"{default}\""
                )));
            }
            Ok(acl)
        }
    }
}
