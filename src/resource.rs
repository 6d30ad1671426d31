//! Resource records.
//!
//! A resource owns an ordered set of values per property. The record also
//! carries the optimistic-concurrency anchor (`last_modification_date`) and a
//! metadata-change log, so the history reconstructor is a pure function of
//! stored state.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::iri::{ActorIri, ClassIri, ProjectIri, PropertyIri, ResourceIri};
use crate::perm::Acl;
use crate::value::{DeletionInfo, ValueRecord};

/// One successful metadata update, kept for history reconstruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataChange {
    pub at: DateTime<Utc>,
    pub by: ActorIri,
}

/// A versioned, permission-guarded resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub iri: ResourceIri,
    pub class: ClassIri,
    pub label: String,
    pub project: ProjectIri,
    pub created_by: ActorIri,
    pub created_at: DateTime<Utc>,
    pub permissions: Acl,
    /// Absent until the first metadata or value change after creation.
    pub last_modification_date: Option<DateTime<Utc>>,
    /// Set when the resource was soft-deleted.
    pub deletion: Option<DeletionInfo>,
    /// Per property, the value UUIDs in insertion order.
    pub property_order: BTreeMap<PropertyIri, Vec<Uuid>>,
    /// Every value the resource ever carried, keyed by stable UUID.
    pub values: BTreeMap<Uuid, ValueRecord>,
    /// One entry per successful metadata update.
    pub metadata_log: Vec<MetadataChange>,
}

impl Resource {
    /// Whether the resource is soft-deleted.
    pub fn is_deleted(&self) -> bool {
        self.deletion.is_some()
    }

    /// Look up a value by its stable UUID.
    pub fn value(&self, uuid: Uuid) -> Option<&ValueRecord> {
        self.values.get(&uuid)
    }

    /// Live (non-deleted) values of a property, in insertion order.
    pub fn live_values_of(&self, property: &PropertyIri) -> Vec<&ValueRecord> {
        self.property_order
            .get(property)
            .into_iter()
            .flatten()
            .filter_map(|uuid| self.values.get(uuid))
            .filter(|v| !v.is_deleted())
            .collect()
    }

    /// Count of live values of a property.
    pub fn live_value_count(&self, property: &PropertyIri) -> usize {
        self.live_values_of(property).len()
    }

    /// Iterate over all values, live or deleted.
    pub fn all_values(&self) -> impl Iterator<Item = &ValueRecord> {
        self.values.values()
    }

    /// Targets of all link values the resource holds, live or deleted.
    pub fn link_targets(&self) -> Vec<(&ResourceIri, Uuid)> {
        self.values
            .values()
            .flat_map(|record| {
                record
                    .versions
                    .iter()
                    .filter_map(move |v| v.content.link_target().map(|t| (t, record.uuid)))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{ValueContent, ValueVersion, VersionChange};
    use crate::iri::ValueIri;

    fn acl() -> Acl {
        Acl::parse("CR creator|V knownUser").unwrap()
    }

    fn actor() -> ActorIri {
        ActorIri::new("http://per-ankh.dev/users/ada").unwrap()
    }

    fn bare_resource() -> Resource {
        Resource {
            iri: ResourceIri::mint(),
            class: ClassIri::new("http://per-ankh.dev/ontology#Letter").unwrap(),
            label: "a letter".into(),
            project: ProjectIri::new("http://per-ankh.dev/projects/0001").unwrap(),
            created_by: actor(),
            created_at: Utc::now(),
            permissions: acl(),
            last_modification_date: None,
            deletion: None,
            property_order: BTreeMap::new(),
            values: BTreeMap::new(),
            metadata_log: Vec::new(),
        }
    }

    fn int_value(resource: &ResourceIri, property: &PropertyIri, n: i64) -> ValueRecord {
        let uuid = Uuid::new_v4();
        ValueRecord {
            uuid,
            property: property.clone(),
            versions: vec![ValueVersion {
                iri: ValueIri::mint(resource, uuid, 0),
                index: 0,
                content: ValueContent::Int(n),
                comment: None,
                permissions: acl(),
                created_at: Utc::now(),
                created_by: actor(),
                change: VersionChange::Created,
                deletion: None,
            }],
        }
    }

    #[test]
    fn live_value_counting_skips_deleted() {
        let mut r = bare_resource();
        let prop = PropertyIri::new("http://per-ankh.dev/ontology#pageCount").unwrap();
        let mut v1 = int_value(&r.iri, &prop, 1);
        let v2 = int_value(&r.iri, &prop, 2);
        v1.versions[0].deletion = Some(DeletionInfo {
            comment: None,
            deleted_at: Utc::now(),
            deleted_by: actor(),
        });
        r.property_order
            .insert(prop.clone(), vec![v1.uuid, v2.uuid]);
        r.values.insert(v1.uuid, v1);
        r.values.insert(v2.uuid, v2);

        assert_eq!(r.live_value_count(&prop), 1);
        assert_eq!(r.all_values().count(), 2);
    }

    #[test]
    fn link_targets_cover_all_versions() {
        let mut r = bare_resource();
        let prop = PropertyIri::new("http://per-ankh.dev/ontology#refersTo").unwrap();
        let old_target = ResourceIri::mint();
        let new_target = ResourceIri::mint();
        let uuid = Uuid::new_v4();
        let record = ValueRecord {
            uuid,
            property: prop.clone(),
            versions: vec![
                ValueVersion {
                    iri: ValueIri::mint(&r.iri, uuid, 0),
                    index: 0,
                    content: ValueContent::Link {
                        target: old_target.clone(),
                    },
                    comment: None,
                    permissions: acl(),
                    created_at: Utc::now(),
                    created_by: actor(),
                    change: VersionChange::Created,
                    deletion: None,
                },
                ValueVersion {
                    iri: ValueIri::mint(&r.iri, uuid, 1),
                    index: 1,
                    content: ValueContent::Link {
                        target: new_target.clone(),
                    },
                    comment: None,
                    permissions: acl(),
                    created_at: Utc::now(),
                    created_by: actor(),
                    change: VersionChange::ContentChanged,
                    deletion: None,
                },
            ],
        };
        r.property_order.insert(prop, vec![uuid]);
        r.values.insert(uuid, record);

        let targets = r.link_targets();
        assert!(targets.iter().any(|(t, _)| **t == old_target));
        assert!(targets.iter().any(|(t, _)| **t == new_target));
    }
}
