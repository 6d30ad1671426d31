//! In-memory graph store keyed by resource IRI.
//!
//! Resources live in a `DashMap`; a mutation takes the target's exclusive
//! entry lock, re-validates the caller's [`LastModCheck`] inside it, applies
//! the change, and (when persistence is configured) writes the updated record
//! through to redb before releasing the lock. Two secondary indexes — value
//! version IRIs and incoming links — are maintained alongside.
//!
//! Erase is the one two-phase operation: the target entry is removed first
//! (an atomic take), the incoming-link liveness is re-validated against the
//! removed state, and only then does the cascade touch other resources, one
//! entry lock at a time. A link created between the re-validation and the
//! removal is the documented race inherent to a store without
//! multi-statement transactions.

use std::collections::HashSet;
use std::path::Path;

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::{DashMap, Entry};
use uuid::Uuid;

use crate::error::StoreError;
use crate::iri::{ResourceIri, ValueIri};
use crate::resource::{MetadataChange, Resource};
use crate::store::durable::DurableStore;
use crate::store::{
    EraseReport, GraphStore, LastModCheck, StoreResult, ValueAddress, WriteRequest,
};
use crate::value::{ValueContent, ValueVersion};

/// Concurrent in-memory store with optional redb write-through.
pub struct MemGraphStore {
    resources: DashMap<ResourceIri, Resource>,
    /// Version IRI → chain position, for every version ever written.
    value_index: DashMap<ValueIri, ValueAddress>,
    /// Link target → (source resource, value UUID), for every link value
    /// version ever written. Liveness is computed at query time.
    incoming_links: DashMap<ResourceIri, HashSet<(ResourceIri, Uuid)>>,
    durable: Option<DurableStore>,
}

impl MemGraphStore {
    /// A memory-only store.
    pub fn new() -> Self {
        Self {
            resources: DashMap::new(),
            value_index: DashMap::new(),
            incoming_links: DashMap::new(),
            durable: None,
        }
    }

    /// A store with redb write-through, loading every persisted resource
    /// into memory and rebuilding the secondary indexes.
    pub fn with_persistence(data_dir: &Path) -> StoreResult<Self> {
        let durable = DurableStore::open(data_dir)?;
        let records = durable.scan_all()?;
        let store = Self {
            resources: DashMap::new(),
            value_index: DashMap::new(),
            incoming_links: DashMap::new(),
            durable: Some(durable),
        };
        for (_, bytes) in records {
            let resource: Resource =
                bincode::deserialize(&bytes).map_err(|e| StoreError::Serialization {
                    message: format!("failed to decode persisted resource: {e}"),
                })?;
            store.index_resource(&resource);
            store.resources.insert(resource.iri.clone(), resource);
        }
        Ok(store)
    }

    /// Number of resources currently held.
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Whether the store holds no resources.
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Whether the store writes through to redb.
    pub fn is_persistent(&self) -> bool {
        self.durable.is_some()
    }

    fn index_resource(&self, resource: &Resource) {
        for record in resource.all_values() {
            for version in &record.versions {
                self.value_index.insert(
                    version.iri.clone(),
                    ValueAddress {
                        resource: resource.iri.clone(),
                        value: record.uuid,
                        index: version.index,
                    },
                );
            }
        }
        for (target, uuid) in resource.link_targets() {
            self.incoming_links
                .entry(target.clone())
                .or_default()
                .insert((resource.iri.clone(), uuid));
        }
    }

    fn persist(&self, resource: &Resource) -> StoreResult<()> {
        if let Some(durable) = &self.durable {
            let bytes = bincode::serialize(resource).map_err(|e| StoreError::Serialization {
                message: format!("failed to encode resource {}: {e}", resource.iri),
            })?;
            durable.put(resource.iri.as_str().as_bytes(), &bytes)?;
        }
        Ok(())
    }

    fn validate_check(resource: &Resource, check: LastModCheck) -> StoreResult<()> {
        let ok = match (check, resource.last_modification_date) {
            (LastModCheck::Unchecked, _) => true,
            (LastModCheck::Absent, None) => true,
            (LastModCheck::Exactly(expected), Some(stored)) => expected == stored,
            _ => false,
        };
        if ok {
            Ok(())
        } else {
            Err(StoreError::WriteConflict {
                resource: resource.iri.to_string(),
                expected: match check {
                    LastModCheck::Unchecked => "any".to_string(),
                    LastModCheck::Absent => "absent".to_string(),
                    LastModCheck::Exactly(ts) => ts.to_rfc3339(),
                },
                actual: match resource.last_modification_date {
                    Some(ts) => ts.to_rfc3339(),
                    None => "absent".to_string(),
                },
            })
        }
    }

    /// Keep `last_modification_date` strictly increasing even when two
    /// mutations land within the same clock tick.
    fn monotonic(resource: &Resource, requested: DateTime<Utc>) -> DateTime<Utc> {
        let floor = resource
            .last_modification_date
            .unwrap_or(resource.created_at);
        if requested > floor {
            requested
        } else {
            floor + TimeDelta::milliseconds(1)
        }
    }

    fn standoff_count(version: &ValueVersion) -> usize {
        match &version.content {
            ValueContent::Text { standoff, .. } => standoff.len(),
            _ => 0,
        }
    }
}

impl Default for MemGraphStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemGraphStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemGraphStore")
            .field("resources", &self.resources.len())
            .field("persistent", &self.durable.is_some())
            .finish()
    }
}

impl GraphStore for MemGraphStore {
    fn exists(&self, iri: &ResourceIri) -> bool {
        self.resources.contains_key(iri)
    }

    fn is_referenced(&self, iri: &ResourceIri, include_deleted: bool) -> bool {
        // Snapshot the source set before reading `resources`: writers take a
        // resource entry lock first and the link index second, so holding the
        // link-index guard across resource reads could deadlock.
        let sources: Vec<(ResourceIri, Uuid)> = match self.incoming_links.get(iri) {
            Some(set) => set.iter().cloned().collect(),
            None => return false,
        };
        for (source, uuid) in sources {
            // A resource's link to itself never blocks its own erase.
            if source == *iri {
                continue;
            }
            if include_deleted {
                return true;
            }
            let Some(entry) = self.resources.get(&source) else {
                continue;
            };
            let resource = entry.value();
            if resource.is_deleted() {
                continue;
            }
            if resource.value(uuid).is_some_and(|v| v.is_live_link_to(iri)) {
                return true;
            }
        }
        false
    }

    fn read_resource(&self, iri: &ResourceIri) -> StoreResult<Resource> {
        self.resources
            .get(iri)
            .map(|r| r.clone())
            .ok_or_else(|| StoreError::ResourceNotFound {
                iri: iri.to_string(),
            })
    }

    fn read_value_chain(
        &self,
        resource: &ResourceIri,
        value: Uuid,
    ) -> StoreResult<Vec<ValueVersion>> {
        let record = self.read_resource(resource)?;
        record
            .value(value)
            .map(|v| v.versions.clone())
            .ok_or(StoreError::ValueNotFound {
                resource: resource.to_string(),
                value,
            })
    }

    fn resolve_value_iri(&self, iri: &ValueIri) -> Option<ValueAddress> {
        self.value_index.get(iri).map(|a| a.clone())
    }

    fn write(&self, request: WriteRequest) -> StoreResult<Resource> {
        match request {
            WriteRequest::CreateResource { resource } => {
                match self.resources.entry(resource.iri.clone()) {
                    Entry::Occupied(_) => {
                        return Err(StoreError::AlreadyExists {
                            iri: resource.iri.to_string(),
                        });
                    }
                    Entry::Vacant(slot) => {
                        self.index_resource(&resource);
                        self.persist(&resource)?;
                        slot.insert(resource.clone());
                    }
                }
                Ok(resource)
            }

            WriteRequest::UpdateMetadata {
                resource,
                check,
                label,
                permissions,
                timestamp,
                actor,
            } => {
                let mut entry =
                    self.resources
                        .get_mut(&resource)
                        .ok_or_else(|| StoreError::ResourceNotFound {
                            iri: resource.to_string(),
                        })?;
                let record = entry.value_mut();
                Self::validate_check(record, check)?;
                let ts = Self::monotonic(record, timestamp);
                if let Some(label) = label {
                    record.label = label;
                }
                if let Some(acl) = permissions {
                    record.permissions = acl;
                }
                record.metadata_log.push(MetadataChange { at: ts, by: actor });
                record.last_modification_date = Some(ts);
                let snapshot = record.clone();
                self.persist(&snapshot)?;
                Ok(snapshot)
            }

            WriteRequest::MarkResourceDeleted {
                resource,
                check,
                deletion,
                timestamp,
            } => {
                let mut entry =
                    self.resources
                        .get_mut(&resource)
                        .ok_or_else(|| StoreError::ResourceNotFound {
                            iri: resource.to_string(),
                        })?;
                let record = entry.value_mut();
                Self::validate_check(record, check)?;
                let ts = Self::monotonic(record, timestamp);
                record.deletion = Some(deletion);
                record.last_modification_date = Some(ts);
                let snapshot = record.clone();
                self.persist(&snapshot)?;
                Ok(snapshot)
            }

            WriteRequest::CreateValue {
                resource,
                check,
                property,
                mut record,
                timestamp,
            } => {
                let mut entry =
                    self.resources
                        .get_mut(&resource)
                        .ok_or_else(|| StoreError::ResourceNotFound {
                            iri: resource.to_string(),
                        })?;
                let res = entry.value_mut();
                Self::validate_check(res, check)?;
                if res.values.contains_key(&record.uuid) {
                    return Err(StoreError::AlreadyExists {
                        iri: record.uuid.to_string(),
                    });
                }
                let ts = Self::monotonic(res, timestamp);
                for version in &mut record.versions {
                    version.created_at = ts;
                }
                for version in &record.versions {
                    self.value_index.insert(
                        version.iri.clone(),
                        ValueAddress {
                            resource: resource.clone(),
                            value: record.uuid,
                            index: version.index,
                        },
                    );
                    if let Some(target) = version.content.link_target() {
                        self.incoming_links
                            .entry(target.clone())
                            .or_default()
                            .insert((resource.clone(), record.uuid));
                    }
                }
                res.property_order
                    .entry(property)
                    .or_default()
                    .push(record.uuid);
                res.values.insert(record.uuid, record);
                res.last_modification_date = Some(ts);
                let snapshot = res.clone();
                self.persist(&snapshot)?;
                Ok(snapshot)
            }

            WriteRequest::AppendValueVersion {
                resource,
                check,
                value,
                mut version,
                timestamp,
            } => {
                let mut entry =
                    self.resources
                        .get_mut(&resource)
                        .ok_or_else(|| StoreError::ResourceNotFound {
                            iri: resource.to_string(),
                        })?;
                let res = entry.value_mut();
                Self::validate_check(res, check)?;
                let ts = Self::monotonic(res, timestamp);
                let record =
                    res.values
                        .get_mut(&value)
                        .ok_or_else(|| StoreError::ValueNotFound {
                            resource: resource.to_string(),
                            value,
                        })?;
                // The store owns version numbering: the index and IRI are
                // finalized under the entry lock, so concurrent appends to
                // the same value cannot collide. Continuing from the highest
                // surviving index keeps a chain pruned by an erase from
                // reusing one.
                let index = record.versions.last().map_or(0, |v| v.index + 1);
                version.index = index;
                version.iri = ValueIri::mint(&resource, value, index);
                version.created_at = ts;
                self.value_index.insert(
                    version.iri.clone(),
                    ValueAddress {
                        resource: resource.clone(),
                        value,
                        index,
                    },
                );
                if let Some(target) = version.content.link_target() {
                    self.incoming_links
                        .entry(target.clone())
                        .or_default()
                        .insert((resource.clone(), value));
                }
                record.versions.push(version);
                res.last_modification_date = Some(ts);
                let snapshot = res.clone();
                self.persist(&snapshot)?;
                Ok(snapshot)
            }

            WriteRequest::MarkValueDeleted {
                resource,
                check,
                value,
                deletion,
                timestamp,
            } => {
                let mut entry =
                    self.resources
                        .get_mut(&resource)
                        .ok_or_else(|| StoreError::ResourceNotFound {
                            iri: resource.to_string(),
                        })?;
                let res = entry.value_mut();
                Self::validate_check(res, check)?;
                let ts = Self::monotonic(res, timestamp);
                let record =
                    res.values
                        .get_mut(&value)
                        .ok_or_else(|| StoreError::ValueNotFound {
                            resource: resource.to_string(),
                            value,
                        })?;
                let current = record
                    .versions
                    .last_mut()
                    .expect("value record has at least one version");
                current.deletion = Some(deletion);
                res.last_modification_date = Some(ts);
                let snapshot = res.clone();
                self.persist(&snapshot)?;
                Ok(snapshot)
            }
        }
    }

    fn erase_subtree(&self, iri: &ResourceIri, check: LastModCheck) -> StoreResult<EraseReport> {
        // Atomic take of the target; re-validated below, reinserted on failure.
        let (_, resource) =
            self.resources
                .remove(iri)
                .ok_or_else(|| StoreError::ResourceNotFound {
                    iri: iri.to_string(),
                })?;

        if let Err(conflict) = Self::validate_check(&resource, check) {
            self.resources.insert(iri.clone(), resource);
            return Err(conflict);
        }

        // Re-validation immediately before the cascade: with the target
        // entry gone, is_referenced only reads other resources.
        if self.is_referenced(iri, false) {
            self.resources.insert(iri.clone(), resource);
            return Err(StoreError::Referenced {
                iri: iri.to_string(),
            });
        }

        let mut report = EraseReport {
            values_removed: resource.values.len(),
            ..EraseReport::default()
        };

        // Drop every trace of the resource's own values from the indexes.
        for record in resource.all_values() {
            report.versions_removed += record.versions.len();
            for version in &record.versions {
                report.standoff_removed += Self::standoff_count(version);
                self.value_index.remove(&version.iri);
            }
        }
        for (target, uuid) in resource.link_targets() {
            if let Some(mut set) = self.incoming_links.get_mut(target) {
                set.remove(&(iri.clone(), uuid));
            }
        }

        // Prune link versions in other resources that pointed here. No live
        // current version does (those failed the check above), so everything
        // dropped is superseded or soft-deleted; a value later retargeted to
        // a live resource keeps its remaining tail.
        if let Some((_, sources)) = self.incoming_links.remove(iri) {
            for (source, uuid) in sources {
                if source == *iri {
                    continue;
                }
                let Some(mut entry) = self.resources.get_mut(&source) else {
                    continue;
                };
                let res = entry.value_mut();
                let Some(record) = res.values.get_mut(&uuid) else {
                    continue;
                };
                let (dropped, kept): (Vec<_>, Vec<_>) = record
                    .versions
                    .drain(..)
                    .partition(|v| v.content.link_target() == Some(iri));
                record.versions = kept;
                if dropped.is_empty() {
                    continue;
                }
                for version in &dropped {
                    self.value_index.remove(&version.iri);
                }
                if record.versions.is_empty() {
                    let property = record.property.clone();
                    res.values.remove(&uuid);
                    if let Some(order) = res.property_order.get_mut(&property) {
                        order.retain(|u| *u != uuid);
                    }
                }
                report.dangling_links_removed += 1;
                let snapshot = res.clone();
                drop(entry);
                self.persist(&snapshot)?;
            }
        }

        if let Some(durable) = &self.durable {
            durable.remove(iri.as_str().as_bytes())?;
        }

        tracing::debug!(
            resource = %iri,
            values = report.values_removed,
            versions = report.versions_removed,
            standoff = report.standoff_removed,
            dangling_links = report.dangling_links_removed,
            "erased resource subtree"
        );
        Ok(report)
    }
}
