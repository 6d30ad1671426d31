//! Deterministic history reconstruction.
//!
//! A resource's stored state already contains everything that ever happened
//! to it: the creation facts, the metadata-change log, the deletion markers,
//! and every value's full version arena. Reconstruction is therefore a pure
//! function of one point read. Events are ordered by `(timestamp, kind,
//! value, version)`, so two reconstructions of the same state always agree.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::actor::Actor;
use crate::error::LifecycleError;
use crate::iri::{ActorIri, PropertyIri, ResourceIri, ValueIri};
use crate::lifecycle::LifecycleResult;
use crate::perm::{Level, ObjectCtx};
use crate::store::GraphStore;
use crate::value::VersionChange;

/// What happened at one point of a resource's history.
///
/// The declaration order doubles as the tie-break rank for events sharing a
/// timestamp: structural events sort before value events.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum HistoryEventKind {
    ResourceCreated,
    MetadataUpdated,
    ResourceDeleted,
    ValueCreated,
    ValueContentChanged,
    ValuePermissionsChanged,
    ValueDeleted,
}

/// What object an event concerns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventBody {
    Resource {
        resource: ResourceIri,
    },
    Value {
        resource: ResourceIri,
        value: Uuid,
        version: ValueIri,
        property: PropertyIri,
        index: u32,
    },
}

/// One reconstructed history event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEvent {
    pub kind: HistoryEventKind,
    pub timestamp: DateTime<Utc>,
    pub actor: ActorIri,
    pub body: EventBody,
}

/// Reconstruct histories from stored resource state.
pub struct HistoryManager {
    store: Arc<dyn GraphStore>,
}

impl HistoryManager {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    /// The full event history of a resource, oldest first, optionally
    /// restricted to the inclusive `[start, end]` window.
    ///
    /// The viewer needs at least restricted view on the resource; events of
    /// values the viewer holds no level on are omitted.
    pub fn reconstruct(
        &self,
        resource: &ResourceIri,
        viewer: &Actor,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> LifecycleResult<Vec<HistoryEvent>> {
        if let (Some(s), Some(e)) = (start, end) {
            if s > e {
                return Err(LifecycleError::bad_request(format!(
                    "history window starts {s} after it ends {e}"
                )));
            }
        }
        let stored = self
            .store
            .read_resource(resource)
            .map_err(|_| LifecycleError::not_found(format!("resource {resource}")))?;

        let ctx = ObjectCtx {
            creator: &stored.created_by,
            project: &stored.project,
        };
        let is_admin = viewer.can_administer(&stored.project);
        if !is_admin && !stored.permissions.grants(viewer, ctx, Level::RestrictedView) {
            return Err(LifecycleError::Forbidden {
                actor: viewer.describe(),
                needed: Level::RestrictedView.to_string(),
                target: resource.to_string(),
            });
        }

        let mut events = Vec::new();
        events.push(HistoryEvent {
            kind: HistoryEventKind::ResourceCreated,
            timestamp: stored.created_at,
            actor: stored.created_by.clone(),
            body: EventBody::Resource {
                resource: resource.clone(),
            },
        });
        for change in &stored.metadata_log {
            events.push(HistoryEvent {
                kind: HistoryEventKind::MetadataUpdated,
                timestamp: change.at,
                actor: change.by.clone(),
                body: EventBody::Resource {
                    resource: resource.clone(),
                },
            });
        }
        if let Some(deletion) = &stored.deletion {
            events.push(HistoryEvent {
                kind: HistoryEventKind::ResourceDeleted,
                timestamp: deletion.deleted_at,
                actor: deletion.deleted_by.clone(),
                body: EventBody::Resource {
                    resource: resource.clone(),
                },
            });
        }

        for record in stored.all_values() {
            let value_ctx = ObjectCtx {
                creator: record.creator(),
                project: &stored.project,
            };
            let visible = is_admin
                || record
                    .current()
                    .permissions
                    .effective_level(viewer, value_ctx)
                    .is_some();
            if !visible {
                continue;
            }
            for version in &record.versions {
                let kind = match version.change {
                    VersionChange::Created => HistoryEventKind::ValueCreated,
                    VersionChange::ContentChanged => HistoryEventKind::ValueContentChanged,
                    VersionChange::PermissionsChanged => {
                        HistoryEventKind::ValuePermissionsChanged
                    }
                };
                events.push(HistoryEvent {
                    kind,
                    timestamp: version.created_at,
                    actor: version.created_by.clone(),
                    body: EventBody::Value {
                        resource: resource.clone(),
                        value: record.uuid,
                        version: version.iri.clone(),
                        property: record.property.clone(),
                        index: version.index,
                    },
                });
                if let Some(deletion) = &version.deletion {
                    events.push(HistoryEvent {
                        kind: HistoryEventKind::ValueDeleted,
                        timestamp: deletion.deleted_at,
                        actor: deletion.deleted_by.clone(),
                        body: EventBody::Value {
                            resource: resource.clone(),
                            value: record.uuid,
                            version: version.iri.clone(),
                            property: record.property.clone(),
                            index: version.index,
                        },
                    });
                }
            }
        }

        events.sort_by(|a, b| {
            (a.timestamp, a.kind, event_value(a), event_index(a)).cmp(&(
                b.timestamp,
                b.kind,
                event_value(b),
                event_index(b),
            ))
        });
        events.retain(|e| {
            start.is_none_or(|s| e.timestamp >= s) && end.is_none_or(|e2| e.timestamp <= e2)
        });

        debug!(resource = %resource, events = events.len(), "history reconstructed");
        Ok(events)
    }
}

fn event_value(event: &HistoryEvent) -> Option<Uuid> {
    match &event.body {
        EventBody::Resource { .. } => None,
        EventBody::Value { value, .. } => Some(*value),
    }
}

fn event_index(event: &HistoryEvent) -> u32 {
    match &event.body {
        EventBody::Resource { .. } => 0,
        EventBody::Value { index, .. } => *index,
    }
}

impl std::fmt::Debug for HistoryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryManager").finish()
    }
}
