//! Resource-level lifecycle operations.
//!
//! Creation with initial values, metadata updates, soft deletion, and the
//! administrator-only physical erase. All validation happens against a point
//! read; the single store write re-checks the caller's concurrency
//! expectation under the resource's entry lock.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::actor::Actor;
use crate::error::LifecycleError;
use crate::iri::{PropertyIri, ResourceIri, ValueIri};
use crate::lifecycle::{
    admit_custom_acl, check_class, map_conflict, require_identity, require_level,
    timestamp_after, CreateResourceRequest, EraseRequest, LifecycleResult, MarkDeletedRequest,
    NewValue, ReferentialIntegrity, UpdateMetadataRequest,
};
use crate::ontology::Ontology;
use crate::perm::{Level, ObjectCtx};
use crate::resource::Resource;
use crate::standoff::validate_forest;
use crate::store::{EraseReport, GraphStore, LastModCheck, WriteRequest};
use crate::value::{DeletionInfo, ValueContent, ValueRecord, ValueVersion, VersionChange};

/// Manager for resource-level operations.
pub struct ResourceManager {
    store: Arc<dyn GraphStore>,
    ontology: Arc<dyn Ontology>,
    integrity: ReferentialIntegrity,
}

impl ResourceManager {
    pub fn new(store: Arc<dyn GraphStore>, ontology: Arc<dyn Ontology>) -> Self {
        let integrity = ReferentialIntegrity::new(Arc::clone(&store));
        Self {
            store,
            ontology,
            integrity,
        }
    }

    /// Create a resource with its initial values in one atomic write.
    pub fn create(&self, request: CreateResourceRequest) -> LifecycleResult<Resource> {
        let actor_iri = require_identity(&request.actor)?;
        if !request.actor.is_member_of(&request.project)
            && !request.actor.can_administer(&request.project)
        {
            return Err(LifecycleError::Forbidden {
                actor: request.actor.describe(),
                needed: "membership".to_string(),
                target: request.project.to_string(),
            });
        }
        if request.label.trim().is_empty() {
            return Err(LifecycleError::bad_request("resource label must not be empty"));
        }

        let default_acl = self.ontology.default_permissions(&request.class)?;
        let permissions = admit_custom_acl(
            request.permissions.clone(),
            &default_acl,
            &request.actor,
            &request.project,
        )?;

        // Whole-instance cardinality check over the submitted counts.
        let mut counts: BTreeMap<PropertyIri, usize> = BTreeMap::new();
        for value in &request.values {
            *counts.entry(value.property.clone()).or_insert(0) += 1;
        }
        self.ontology.validate_resource(&request.class, &counts)?;

        for (i, value) in request.values.iter().enumerate() {
            self.validate_new_value(&request, value)?;
            // Duplicates within the same request.
            for earlier in &request.values[..i] {
                if earlier.property == value.property
                    && earlier.content.duplicate_of(&value.content)
                {
                    return Err(LifecycleError::DuplicateValue {
                        property: value.property.to_string(),
                    });
                }
            }
        }

        let iri = ResourceIri::mint();
        let created_at = Utc::now();
        let mut resource = Resource {
            iri: iri.clone(),
            class: request.class.clone(),
            label: request.label.clone(),
            project: request.project.clone(),
            created_by: actor_iri.clone(),
            created_at,
            permissions,
            last_modification_date: None,
            deletion: None,
            property_order: BTreeMap::new(),
            values: BTreeMap::new(),
            metadata_log: Vec::new(),
        };

        for value in &request.values {
            let value_acl = admit_custom_acl(
                value.permissions.clone(),
                &default_acl,
                &request.actor,
                &request.project,
            )?;
            let uuid = value.value_uuid.unwrap_or_else(uuid::Uuid::new_v4);
            if resource.values.contains_key(&uuid) {
                return Err(LifecycleError::bad_request(format!(
                    "value UUID {uuid} supplied twice"
                )));
            }
            let record = ValueRecord {
                uuid,
                property: value.property.clone(),
                versions: vec![ValueVersion {
                    iri: ValueIri::mint(&iri, uuid, 0),
                    index: 0,
                    content: value.content.clone(),
                    comment: value.comment.clone(),
                    permissions: value_acl,
                    created_at,
                    created_by: actor_iri.clone(),
                    change: VersionChange::Created,
                    deletion: None,
                }],
            };
            resource
                .property_order
                .entry(value.property.clone())
                .or_default()
                .push(uuid);
            resource.values.insert(uuid, record);
        }

        let stored = self
            .store
            .write(WriteRequest::CreateResource { resource })
            .map_err(map_conflict)?;
        info!(
            resource = %stored.iri,
            class = %stored.class,
            values = stored.values.len(),
            actor = %actor_iri,
            request_id = %request.request_id,
            "resource created"
        );
        Ok(stored)
    }

    /// Read a resource as seen by `viewer`: the viewer needs at least
    /// restricted view on the resource, and values the viewer has no level on
    /// are omitted.
    pub fn fetch(&self, iri: &ResourceIri, viewer: &Actor) -> LifecycleResult<Resource> {
        let resource = self.read_existing(iri)?;
        let ctx = ObjectCtx {
            creator: &resource.created_by,
            project: &resource.project,
        };
        if !viewer.can_administer(&resource.project)
            && !resource.permissions.grants(viewer, ctx, Level::RestrictedView)
        {
            return Err(LifecycleError::Forbidden {
                actor: viewer.describe(),
                needed: Level::RestrictedView.to_string(),
                target: iri.to_string(),
            });
        }

        let mut view = resource.clone();
        view.values.retain(|_, record| {
            let value_ctx = ObjectCtx {
                creator: record.creator(),
                project: &resource.project,
            };
            viewer.can_administer(&resource.project)
                || record
                    .current()
                    .permissions
                    .effective_level(viewer, value_ctx)
                    .is_some()
        });
        let visible = &view.values;
        for order in view.property_order.values_mut() {
            order.retain(|uuid| visible.contains_key(uuid));
        }
        Ok(view)
    }

    /// Update the label and/or permissions of a resource.
    pub fn update_metadata(&self, request: UpdateMetadataRequest) -> LifecycleResult<Resource> {
        let actor_iri = require_identity(&request.actor)?;
        if request.label.is_none() && request.permissions.is_none() {
            return Err(LifecycleError::bad_request(
                "metadata update must change the label or the permissions",
            ));
        }
        if let Some(label) = &request.label {
            if label.trim().is_empty() {
                return Err(LifecycleError::bad_request("resource label must not be empty"));
            }
        }

        let resource = self.read_live(&request.resource)?;
        check_class(&resource, request.class.as_ref())?;
        let ctx = ObjectCtx {
            creator: &resource.created_by,
            project: &resource.project,
        };
        // Changing permissions demands the higher level.
        let needed = if request.permissions.is_some() {
            Level::ChangeRights
        } else {
            Level::Modify
        };
        require_level(
            &resource.permissions,
            &request.actor,
            ctx,
            needed,
            request.resource.as_str(),
        )?;

        let timestamp = match request.new_modification_date {
            Some(ts) => {
                let floor = resource.last_modification_date.unwrap_or(resource.created_at);
                if ts <= floor {
                    return Err(LifecycleError::bad_request(format!(
                        "new modification date {ts} is not after the stored one {floor}"
                    )));
                }
                ts
            }
            None => timestamp_after(resource.last_modification_date),
        };
        let stored = self
            .store
            .write(WriteRequest::UpdateMetadata {
                resource: request.resource.clone(),
                check: LastModCheck::expecting(request.expected_last_modification),
                label: request.label,
                permissions: request.permissions,
                timestamp,
                actor: actor_iri.clone(),
            })
            .map_err(map_conflict)?;
        info!(resource = %stored.iri, actor = %actor_iri, "resource metadata updated");
        Ok(stored)
    }

    /// Soft-delete a resource. It stays readable as a deletion stub and its
    /// history stays reconstructable; erase is the only way to remove it.
    pub fn mark_deleted(&self, request: MarkDeletedRequest) -> LifecycleResult<Resource> {
        let actor_iri = require_identity(&request.actor)?;
        let resource = self.read_live(&request.resource)?;
        check_class(&resource, request.class.as_ref())?;
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

        let deleted_at = request.delete_date.unwrap_or_else(Utc::now);
        let floor = resource.last_modification_date.unwrap_or(resource.created_at);
        if deleted_at < floor {
            return Err(LifecycleError::bad_request(format!(
                "deletion date {deleted_at} precedes the resource's last change {floor}"
            )));
        }

        let timestamp = timestamp_after(resource.last_modification_date);
        let stored = self
            .store
            .write(WriteRequest::MarkResourceDeleted {
                resource: request.resource.clone(),
                check: LastModCheck::expecting(request.expected_last_modification),
                deletion: DeletionInfo {
                    comment: request.comment,
                    deleted_at,
                    deleted_by: actor_iri.clone(),
                },
                timestamp,
            })
            .map_err(map_conflict)?;
        info!(resource = %stored.iri, actor = %actor_iri, "resource marked deleted");
        Ok(stored)
    }

    /// Physically erase a resource, every version of every value it carries,
    /// their standoff tags, and any link values elsewhere that pointed at it.
    ///
    /// Only project or system administrators may erase, and only when no
    /// live link value references the resource.
    pub fn erase(&self, request: EraseRequest) -> LifecycleResult<EraseReport> {
        let actor_iri = require_identity(&request.actor)?;
        let resource = self.read_existing(&request.resource)?;
        check_class(&resource, request.class.as_ref())?;
        if !request.actor.can_administer(&resource.project) {
            return Err(LifecycleError::Forbidden {
                actor: request.actor.describe(),
                needed: "administrator standing".to_string(),
                target: request.resource.to_string(),
            });
        }

        self.integrity.assert_unreferenced(&request.resource)?;
        debug!(resource = %request.resource, "erase integrity check passed");

        let report = self
            .store
            .erase_subtree(
                &request.resource,
                LastModCheck::expecting(request.expected_last_modification),
            )
            .map_err(|err| match err {
                crate::error::StoreError::Referenced { iri } => LifecycleError::bad_request(
                    format!("cannot erase {iri}: live link values still reference it"),
                ),
                other => map_conflict(other),
            })?;
        info!(
            resource = %request.resource,
            actor = %actor_iri,
            values = report.values_removed,
            versions = report.versions_removed,
            "resource erased"
        );
        Ok(report)
    }

    /// Validation shared by every initial value of a create request.
    fn validate_new_value(
        &self,
        request: &CreateResourceRequest,
        value: &NewValue,
    ) -> LifecycleResult<()> {
        value
            .content
            .validate()
            .map_err(LifecycleError::bad_request)?;
        self.ontology
            .validate_value_type(&request.class, &value.property, &value.content)?;
        match &value.content {
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

    /// Read a resource that must exist, deleted or not.
    fn read_existing(&self, iri: &ResourceIri) -> LifecycleResult<Resource> {
        self.store
            .read_resource(iri)
            .map_err(|_| LifecycleError::not_found(format!("resource {iri}")))
    }

    /// Read a resource that must exist and not be soft-deleted.
    pub(crate) fn read_live(&self, iri: &ResourceIri) -> LifecycleResult<Resource> {
        let resource = self.read_existing(iri)?;
        if resource.is_deleted() {
            return Err(LifecycleError::not_found(format!(
                "resource {iri} is deleted"
            )));
        }
        Ok(resource)
    }
}

impl std::fmt::Debug for ResourceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceManager").finish()
    }
}
