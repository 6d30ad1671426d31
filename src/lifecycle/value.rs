//! Value-level lifecycle operations.
//!
//! Values are addressed by the IRI of their *current* version: submitting a
//! superseded version IRI is an edit conflict, which is what makes value
//! edits safe without a resource-level expected date. Every content edit
//! appends a version; nothing is ever rewritten in place.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::error::LifecycleError;
use crate::iri::{ResourceIri, ValueIri};
use crate::lifecycle::{
    admit_custom_acl, map_conflict, require_identity, require_level, timestamp_after,
    value_check, CreateValueRequest, DeleteValueRequest, LifecycleResult, ReferentialIntegrity,
    UpdateValueContentRequest, UpdateValuePermissionsRequest, ValueReceipt,
};
use crate::ontology::Ontology;
use crate::perm::{Level, ObjectCtx};
use crate::resource::Resource;
use crate::standoff::{carry_over_uuids, validate_forest};
use crate::store::{GraphStore, WriteRequest};
use crate::value::{
    DeletionInfo, ValueContent, ValueRecord, ValueVersion, VersionChange,
};

/// Manager for value-level operations.
pub struct ValueManager {
    store: Arc<dyn GraphStore>,
    ontology: Arc<dyn Ontology>,
    integrity: ReferentialIntegrity,
}

impl ValueManager {
    pub fn new(store: Arc<dyn GraphStore>, ontology: Arc<dyn Ontology>) -> Self {
        let integrity = ReferentialIntegrity::new(Arc::clone(&store));
        Self {
            store,
            ontology,
            integrity,
        }
    }

    /// Add a value to an existing resource.
    pub fn create(&self, request: CreateValueRequest) -> LifecycleResult<ValueReceipt> {
        let actor_iri = require_identity(&request.actor)?;
        let resource = self.read_live(&request.resource)?;
        let ctx = ObjectCtx {
            creator: &resource.created_by,
            project: &resource.project,
        };
        require_level(
            &resource.permissions,
            &request.actor,
            ctx,
            Level::Modify,
            request.resource.as_str(),
        )?;

        self.validate_content(&resource, &request.property, &request.content)?;
        self.ontology.validate_cardinality(
            &resource.class,
            &request.property,
            resource.live_value_count(&request.property) + 1,
        )?;
        for live in resource.live_values_of(&request.property) {
            if live.current().content.duplicate_of(&request.content) {
                return Err(LifecycleError::DuplicateValue {
                    property: request.property.to_string(),
                });
            }
        }

        let default_acl = self.ontology.default_permissions(&resource.class)?;
        let permissions = admit_custom_acl(
            request.permissions.clone(),
            &default_acl,
            &request.actor,
            &resource.project,
        )?;

        let uuid = request.value_uuid.unwrap_or_else(Uuid::new_v4);
        if resource.values.contains_key(&uuid) {
            return Err(LifecycleError::bad_request(format!(
                "value UUID {uuid} already exists on {}",
                request.resource
            )));
        }

        let timestamp = timestamp_after(resource.last_modification_date);
        let record = ValueRecord {
            uuid,
            property: request.property.clone(),
            versions: vec![ValueVersion {
                iri: ValueIri::mint(&request.resource, uuid, 0),
                index: 0,
                content: request.content.clone(),
                comment: request.comment.clone(),
                permissions,
                created_at: timestamp,
                created_by: actor_iri.clone(),
                change: VersionChange::Created,
                deletion: None,
            }],
        };

        let stored = self
            .store
            .write(WriteRequest::CreateValue {
                resource: request.resource.clone(),
                check: value_check(request.expected_last_modification),
                property: request.property.clone(),
                record,
                timestamp,
            })
            .map_err(map_conflict)?;
        info!(
            resource = %request.resource,
            property = %request.property,
            value = %uuid,
            actor = %actor_iri,
            request_id = %request.request_id,
            "value created"
        );
        Ok(Self::receipt(&stored, uuid))
    }

    /// Append a content version to a value.
    pub fn update_content(
        &self,
        request: UpdateValueContentRequest,
    ) -> LifecycleResult<ValueReceipt> {
        let actor_iri = require_identity(&request.actor)?;
        let resource = self.read_live(&request.resource)?;
        let (uuid, current) = self.current_version(&resource, &request.resource, &request.value)?;
        let record = resource.value(uuid).expect("record resolved above");

        let ctx = ObjectCtx {
            creator: record.creator(),
            project: &resource.project,
        };
        require_level(
            &current.permissions,
            &request.actor,
            ctx,
            Level::Modify,
            request.value.as_str(),
        )?;

        if request.content.kind() != current.content.kind() {
            return Err(LifecycleError::bad_request(format!(
                "cannot change a {} value into a {} value",
                current.content.kind(),
                request.content.kind()
            )));
        }
        self.validate_content(&resource, &record.property, &request.content)?;

        if current.content.duplicate_of(&request.content) {
            return Err(LifecycleError::DuplicateValue {
                property: record.property.to_string(),
            });
        }
        for live in resource.live_values_of(&record.property) {
            if live.uuid != uuid && live.current().content.duplicate_of(&request.content) {
                return Err(LifecycleError::DuplicateValue {
                    property: record.property.to_string(),
                });
            }
        }

        // Standoff tags that survive the edit keep their stable UUIDs.
        let mut content = request.content.clone();
        if let (
            ValueContent::Text {
                standoff: previous, ..
            },
            ValueContent::Text { standoff, .. },
        ) = (&current.content, &mut content)
        {
            carry_over_uuids(previous, standoff)?;
        }

        let timestamp = timestamp_after(resource.last_modification_date);
        let index = current.index + 1;
        let version = ValueVersion {
            iri: ValueIri::mint(&request.resource, uuid, index),
            index,
            content,
            comment: request.comment.clone(),
            permissions: current.permissions.clone(),
            created_at: timestamp,
            created_by: actor_iri.clone(),
            change: VersionChange::ContentChanged,
            deletion: None,
        };

        let stored = self
            .store
            .write(WriteRequest::AppendValueVersion {
                resource: request.resource.clone(),
                check: value_check(request.expected_last_modification),
                value: uuid,
                version,
                timestamp,
            })
            .map_err(map_conflict)?;
        info!(
            resource = %request.resource,
            value = %uuid,
            actor = %actor_iri,
            request_id = %request.request_id,
            "value content updated"
        );
        Ok(Self::receipt(&stored, uuid))
    }

    /// Replace a value's permissions, leaving its content untouched.
    pub fn update_permissions(
        &self,
        request: UpdateValuePermissionsRequest,
    ) -> LifecycleResult<ValueReceipt> {
        let actor_iri = require_identity(&request.actor)?;
        let resource = self.read_live(&request.resource)?;
        let (uuid, current) = self.current_version(&resource, &request.resource, &request.value)?;
        let record = resource.value(uuid).expect("record resolved above");

        let ctx = ObjectCtx {
            creator: record.creator(),
            project: &resource.project,
        };
        require_level(
            &current.permissions,
            &request.actor,
            ctx,
            Level::ChangeRights,
            request.value.as_str(),
        )?;

        if request.permissions == current.permissions {
            return Err(LifecycleError::bad_request(
                "submitted permissions are identical to the current ones",
            ));
        }

        let timestamp = timestamp_after(resource.last_modification_date);
        let index = current.index + 1;
        let version = ValueVersion {
            iri: ValueIri::mint(&request.resource, uuid, index),
            index,
            content: current.content.clone(),
            comment: None,
            permissions: request.permissions.clone(),
            created_at: timestamp,
            created_by: actor_iri.clone(),
            change: VersionChange::PermissionsChanged,
            deletion: None,
        };

        let stored = self
            .store
            .write(WriteRequest::AppendValueVersion {
                resource: request.resource.clone(),
                check: value_check(request.expected_last_modification),
                value: uuid,
                version,
                timestamp,
            })
            .map_err(map_conflict)?;
        info!(
            resource = %request.resource,
            value = %uuid,
            actor = %actor_iri,
            "value permissions updated"
        );
        Ok(Self::receipt(&stored, uuid))
    }

    /// Soft-delete a value. Its versions stay in the arena for history.
    pub fn delete(&self, request: DeleteValueRequest) -> LifecycleResult<ValueReceipt> {
        let actor_iri = require_identity(&request.actor)?;
        let resource = self.read_live(&request.resource)?;
        let (uuid, current) = self.current_version(&resource, &request.resource, &request.value)?;
        let record = resource.value(uuid).expect("record resolved above");

        let ctx = ObjectCtx {
            creator: record.creator(),
            project: &resource.project,
        };
        require_level(
            &current.permissions,
            &request.actor,
            ctx,
            Level::Modify,
            request.value.as_str(),
        )?;

        let deleted_at = request.delete_date.unwrap_or_else(Utc::now);
        if deleted_at < current.created_at {
            return Err(LifecycleError::bad_request(format!(
                "deletion date {deleted_at} precedes the value's current version {}",
                current.created_at
            )));
        }

        let timestamp = timestamp_after(resource.last_modification_date);
        let stored = self
            .store
            .write(WriteRequest::MarkValueDeleted {
                resource: request.resource.clone(),
                check: value_check(request.expected_last_modification),
                value: uuid,
                deletion: DeletionInfo {
                    comment: request.comment,
                    deleted_at,
                    deleted_by: actor_iri.clone(),
                },
                timestamp,
            })
            .map_err(map_conflict)?;
        info!(
            resource = %request.resource,
            value = %uuid,
            actor = %actor_iri,
            "value marked deleted"
        );
        Ok(Self::receipt(&stored, uuid))
    }

    /// Resolve a submitted version IRI to its value, requiring it to be the
    /// value's current version and the value to be live.
    fn current_version<'r>(
        &self,
        resource: &'r Resource,
        resource_iri: &ResourceIri,
        version_iri: &ValueIri,
    ) -> LifecycleResult<(Uuid, &'r ValueVersion)> {
        let address = self
            .store
            .resolve_value_iri(version_iri)
            .ok_or_else(|| LifecycleError::not_found(format!("value version {version_iri}")))?;
        if address.resource != *resource_iri {
            return Err(LifecycleError::bad_request(format!(
                "value version {version_iri} does not belong to {resource_iri}"
            )));
        }
        let record = resource
            .value(address.value)
            .ok_or_else(|| LifecycleError::not_found(format!("value {}", address.value)))?;
        if record.is_deleted() {
            return Err(LifecycleError::not_found(format!(
                "value {} is deleted",
                address.value
            )));
        }
        let current = record.current();
        if current.index != address.index {
            return Err(LifecycleError::EditConflict {
                resource: resource_iri.to_string(),
                expected: current.iri.to_string(),
                actual: version_iri.to_string(),
            });
        }
        Ok((address.value, current))
    }

    /// Payload checks shared by create and content update.
    fn validate_content(
        &self,
        resource: &Resource,
        property: &crate::iri::PropertyIri,
        content: &ValueContent,
    ) -> LifecycleResult<()> {
        content.validate().map_err(LifecycleError::bad_request)?;
        self.ontology
            .validate_value_type(&resource.class, property, content)?;
        match content {
            ValueContent::Text { standoff, .. } => validate_forest(standoff)?,
            ValueContent::Link { target } => self.integrity.assert_target_live(target)?,
            ValueContent::ListNode(node) => {
                if !self.ontology.list_node_exists(node) {
                    return Err(LifecycleError::not_found(format!("list node {node}")));
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn read_live(&self, iri: &ResourceIri) -> LifecycleResult<Resource> {
        let resource = self
            .store
            .read_resource(iri)
            .map_err(|_| LifecycleError::not_found(format!("resource {iri}")))?;
        if resource.is_deleted() {
            return Err(LifecycleError::not_found(format!(
                "resource {iri} is deleted"
            )));
        }
        Ok(resource)
    }

    fn receipt(stored: &Resource, uuid: Uuid) -> ValueReceipt {
        let current = stored
            .value(uuid)
            .expect("written value present in snapshot")
            .current();
        ValueReceipt {
            resource: stored.iri.clone(),
            value: uuid,
            version: current.iri.clone(),
            last_modification_date: stored
                .last_modification_date
                .expect("mutating write sets the last modification date"),
        }
    }
}

impl std::fmt::Debug for ValueManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueManager").finish()
    }
}
