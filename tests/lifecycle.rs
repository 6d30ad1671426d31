//! Integration tests for the resource and value lifecycle.

use std::sync::Arc;

use per_ankh::actor::Actor;
use per_ankh::engine::{Engine, EngineConfig};
use per_ankh::error::{LifecycleError, PerAnkhError};
use per_ankh::iri::{ActorIri, ClassIri, ListNodeIri, ProjectIri, PropertyIri, ResourceIri};
use per_ankh::lifecycle::{
    CreateResourceRequest, CreateValueRequest, DeleteValueRequest, EraseRequest,
    MarkDeletedRequest, NewValue, UpdateMetadataRequest, UpdateValueContentRequest,
    UpdateValuePermissionsRequest,
};
use per_ankh::ontology::{Cardinality, Ontology, ProjectOntology};
use per_ankh::perm::Acl;
use per_ankh::resource::Resource;
use per_ankh::value::{ValueContent, ValueKind};
use uuid::Uuid;

fn class() -> ClassIri {
    ClassIri::new("http://per-ankh.dev/ontology#Letter").unwrap()
}

fn title() -> PropertyIri {
    PropertyIri::new("http://per-ankh.dev/ontology#title").unwrap()
}

fn page_count() -> PropertyIri {
    PropertyIri::new("http://per-ankh.dev/ontology#pageCount").unwrap()
}

fn refers_to() -> PropertyIri {
    PropertyIri::new("http://per-ankh.dev/ontology#refersTo").unwrap()
}

fn status() -> PropertyIri {
    PropertyIri::new("http://per-ankh.dev/ontology#status").unwrap()
}

fn keyword() -> PropertyIri {
    PropertyIri::new("http://per-ankh.dev/ontology#keyword").unwrap()
}

fn draft_node() -> ListNodeIri {
    ListNodeIri::new("http://per-ankh.dev/lists/status/draft").unwrap()
}

fn project() -> ProjectIri {
    ProjectIri::new("http://per-ankh.dev/projects/0001").unwrap()
}

fn ontology() -> Arc<dyn Ontology> {
    Arc::new(
        ProjectOntology::new()
            .with_cardinality(class(), title(), Cardinality::one(ValueKind::Text))
            .with_cardinality(class(), page_count(), Cardinality::at_most_one(ValueKind::Int))
            .with_cardinality(class(), refers_to(), Cardinality::unbounded(ValueKind::Link))
            .with_cardinality(class(), status(), Cardinality::at_most_one(ValueKind::ListNode))
            .with_cardinality(class(), keyword(), Cardinality::unbounded(ValueKind::Text))
            .with_list_node(draft_node()),
    )
}

fn member(name: &str) -> Actor {
    Actor::new(ActorIri::new(format!("http://per-ankh.dev/users/{name}")).unwrap())
        .in_project(project())
}

fn admin() -> Actor {
    Actor::new(ActorIri::new("http://per-ankh.dev/users/chief").unwrap()).admin_of(project())
}

fn engine() -> Engine {
    Engine::new(EngineConfig::default(), ontology()).unwrap()
}

fn text(s: &str) -> ValueContent {
    ValueContent::Text {
        text: s.into(),
        standoff: vec![],
    }
}

fn letter(engine: &Engine, actor: &Actor, label: &str) -> Resource {
    engine
        .create_resource(CreateResourceRequest {
            class: class(),
            label: label.into(),
            project: project(),
            values: vec![NewValue::new(title(), text(label))],
            permissions: None,
            actor: actor.clone(),
            request_id: Uuid::new_v4(),
        })
        .unwrap()
}

fn lifecycle_err(err: PerAnkhError) -> LifecycleError {
    match err {
        PerAnkhError::Lifecycle(e) => e,
        other => panic!("expected a lifecycle error, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Resource creation
// ---------------------------------------------------------------------------

#[test]
fn create_resource_with_initial_values() {
    let engine = engine();
    let ada = member("ada");
    let resource = letter(&engine, &ada, "first letter");

    assert_eq!(resource.label, "first letter");
    assert_eq!(resource.values.len(), 1);
    assert!(resource.last_modification_date.is_none());
    assert_eq!(
        resource.permissions.to_string(),
        "CR creator|M projectMember|V knownUser|RV unknownUser"
    );
    let record = resource.live_values_of(&title())[0];
    assert_eq!(record.versions.len(), 1);
    assert_eq!(record.current().index, 0);
}

#[test]
fn create_requires_project_membership() {
    let engine = engine();
    let outsider = Actor::new(ActorIri::new("http://per-ankh.dev/users/out").unwrap());
    let err = engine
        .create_resource(CreateResourceRequest {
            class: class(),
            label: "no".into(),
            project: project(),
            values: vec![NewValue::new(title(), text("no"))],
            permissions: None,
            actor: outsider,
            request_id: Uuid::new_v4(),
        })
        .unwrap_err();
    assert!(matches!(
        lifecycle_err(err),
        LifecycleError::Forbidden { .. }
    ));
}

#[test]
fn create_rejects_missing_required_property() {
    let engine = engine();
    let err = engine
        .create_resource(CreateResourceRequest {
            class: class(),
            label: "untitled".into(),
            project: project(),
            values: vec![NewValue::new(page_count(), ValueContent::Int(3))],
            permissions: None,
            actor: member("ada"),
            request_id: Uuid::new_v4(),
        })
        .unwrap_err();
    assert!(matches!(
        lifecycle_err(err),
        LifecycleError::Ontology(_)
    ));
}

#[test]
fn create_rejects_duplicate_values_within_request() {
    let engine = engine();
    let err = engine
        .create_resource(CreateResourceRequest {
            class: class(),
            label: "dup".into(),
            project: project(),
            values: vec![
                NewValue::new(title(), text("dup")),
                NewValue::new(keyword(), text("caf\u{e9}")),
                // NFC-equivalent text counts as the same value.
                NewValue::new(keyword(), text("cafe\u{301}")),
            ],
            permissions: None,
            actor: member("ada"),
            request_id: Uuid::new_v4(),
        })
        .unwrap_err();
    assert!(matches!(
        lifecycle_err(err),
        LifecycleError::DuplicateValue { .. }
    ));
}

#[test]
fn create_gates_overreaching_custom_permissions() {
    let strict_class = ClassIri::new("http://per-ankh.dev/ontology#Note").unwrap();
    let ontology = Arc::new(
        ProjectOntology::new()
            .with_cardinality(strict_class.clone(), title(), Cardinality::one(ValueKind::Text))
            .with_class_permissions(strict_class.clone(), Acl::parse("V projectMember").unwrap()),
    );
    let engine = Engine::new(EngineConfig::default(), ontology).unwrap();

    let request = |actor: Actor| CreateResourceRequest {
        class: strict_class.clone(),
        label: "note".into(),
        project: project(),
        values: vec![NewValue::new(title(), text("note"))],
        permissions: Some(Acl::parse("CR projectMember").unwrap()),
        actor,
        request_id: Uuid::new_v4(),
    };

    let err = engine.create_resource(request(member("ada"))).unwrap_err();
    assert!(matches!(
        lifecycle_err(err),
        LifecycleError::BadRequest { .. }
    ));

    // Administrators may grant beyond the class default.
    assert!(engine.create_resource(request(admin())).is_ok());
}

// ---------------------------------------------------------------------------
// Metadata updates and optimistic concurrency
// ---------------------------------------------------------------------------

#[test]
fn metadata_update_bumps_last_modification_monotonically() {
    let engine = engine();
    let ada = member("ada");
    let resource = letter(&engine, &ada, "letter");

    let updated = engine
        .update_metadata(UpdateMetadataRequest {
            resource: resource.iri.clone(),
            class: None,
            new_modification_date: None,
            expected_last_modification: None,
            label: Some("renamed".into()),
            permissions: None,
            actor: ada.clone(),
        })
        .unwrap();
    let first = updated.last_modification_date.unwrap();

    let updated = engine
        .update_metadata(UpdateMetadataRequest {
            resource: resource.iri.clone(),
            class: None,
            new_modification_date: None,
            expected_last_modification: Some(first),
            label: Some("renamed again".into()),
            permissions: None,
            actor: ada,
        })
        .unwrap();
    assert!(updated.last_modification_date.unwrap() > first);
    assert_eq!(updated.metadata_log.len(), 2);
}

#[test]
fn stale_expected_date_is_an_edit_conflict() {
    let engine = engine();
    let ada = member("ada");
    let resource = letter(&engine, &ada, "letter");

    engine
        .update_metadata(UpdateMetadataRequest {
            resource: resource.iri.clone(),
            class: None,
            new_modification_date: None,
            expected_last_modification: None,
            label: Some("one".into()),
            permissions: None,
            actor: ada.clone(),
        })
        .unwrap();

    // Replaying the pre-update expectation must conflict.
    let err = engine
        .update_metadata(UpdateMetadataRequest {
            resource: resource.iri,
            class: None,
            new_modification_date: None,
            expected_last_modification: None,
            label: Some("two".into()),
            permissions: None,
            actor: ada,
        })
        .unwrap_err();
    assert!(matches!(
        lifecycle_err(err),
        LifecycleError::EditConflict { .. }
    ));
}

#[test]
fn empty_metadata_update_rejected() {
    let engine = engine();
    let ada = member("ada");
    let resource = letter(&engine, &ada, "letter");
    let err = engine
        .update_metadata(UpdateMetadataRequest {
            resource: resource.iri,
            class: None,
            new_modification_date: None,
            expected_last_modification: None,
            label: None,
            permissions: None,
            actor: ada,
        })
        .unwrap_err();
    assert!(matches!(
        lifecycle_err(err),
        LifecycleError::BadRequest { .. }
    ));
}

#[test]
fn class_mismatch_rejected_before_any_write() {
    let engine = engine();
    let ada = member("ada");
    let resource = letter(&engine, &ada, "letter");

    let err = engine
        .update_metadata(UpdateMetadataRequest {
            resource: resource.iri.clone(),
            class: Some(ClassIri::new("http://per-ankh.dev/ontology#Note").unwrap()),
            new_modification_date: None,
            expected_last_modification: None,
            label: Some("renamed".into()),
            permissions: None,
            actor: ada.clone(),
        })
        .unwrap_err();
    assert!(matches!(
        lifecycle_err(err),
        LifecycleError::BadRequest { .. }
    ));

    // The right class tag passes through.
    assert!(engine
        .update_metadata(UpdateMetadataRequest {
            resource: resource.iri,
            class: Some(class()),
            new_modification_date: None,
            expected_last_modification: None,
            label: Some("renamed".into()),
            permissions: None,
            actor: ada,
        })
        .is_ok());
}

#[test]
fn caller_supplied_modification_date_must_move_forward() {
    let engine = engine();
    let ada = member("ada");
    let resource = letter(&engine, &ada, "letter");
    let future = resource.created_at + chrono::TimeDelta::minutes(5);

    let updated = engine
        .update_metadata(UpdateMetadataRequest {
            resource: resource.iri.clone(),
            class: None,
            new_modification_date: Some(future),
            expected_last_modification: None,
            label: Some("renamed".into()),
            permissions: None,
            actor: ada.clone(),
        })
        .unwrap();
    assert_eq!(updated.last_modification_date, Some(future));

    // A date at or before the stored one is rejected outright.
    let err = engine
        .update_metadata(UpdateMetadataRequest {
            resource: resource.iri,
            class: None,
            new_modification_date: Some(future),
            expected_last_modification: Some(future),
            label: Some("renamed again".into()),
            permissions: None,
            actor: ada,
        })
        .unwrap_err();
    assert!(matches!(
        lifecycle_err(err),
        LifecycleError::BadRequest { .. }
    ));
}

#[test]
fn changing_permissions_needs_change_rights() {
    let engine = engine();
    let ada = member("ada");
    let resource = letter(&engine, &ada, "letter");

    // A plain project member has Modify via the default ACL, not CR.
    let bob = member("bob");
    let err = engine
        .update_metadata(UpdateMetadataRequest {
            resource: resource.iri.clone(),
            class: None,
            new_modification_date: None,
            expected_last_modification: None,
            label: None,
            permissions: Some(Acl::parse("CR creator").unwrap()),
            actor: bob,
        })
        .unwrap_err();
    assert!(matches!(
        lifecycle_err(err),
        LifecycleError::Forbidden { .. }
    ));

    // The creator holds CR.
    assert!(engine
        .update_metadata(UpdateMetadataRequest {
            resource: resource.iri,
            class: None,
            new_modification_date: None,
            expected_last_modification: None,
            label: None,
            permissions: Some(Acl::parse("CR creator").unwrap()),
            actor: ada,
        })
        .is_ok());
}

#[test]
fn concurrent_metadata_updates_resolve_to_one_winner() {
    let engine = Arc::new(engine());
    let ada = member("ada");
    let resource = letter(&engine, &ada, "contested");
    let base = engine
        .update_metadata(UpdateMetadataRequest {
            resource: resource.iri.clone(),
            class: None,
            new_modification_date: None,
            expected_last_modification: None,
            label: Some("base".into()),
            permissions: None,
            actor: ada.clone(),
        })
        .unwrap()
        .last_modification_date
        .unwrap();

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let engine = Arc::clone(&engine);
            let iri = resource.iri.clone();
            let actor = member(&format!("writer{i}"));
            std::thread::spawn(move || {
                engine.update_metadata(UpdateMetadataRequest {
                    resource: iri,
                    class: None,
                    new_modification_date: None,
                    expected_last_modification: Some(base),
                    label: Some(format!("writer-{i}")),
                    permissions: None,
                    actor,
                })
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    for lost in results.into_iter().filter(Result::is_err) {
        assert!(matches!(
            lifecycle_err(lost.unwrap_err()),
            LifecycleError::EditConflict { .. }
        ));
    }
}

// ---------------------------------------------------------------------------
// Value lifecycle
// ---------------------------------------------------------------------------

#[test]
fn value_update_appends_versions_and_keeps_old_iris_resolvable() {
    let engine = engine();
    let ada = member("ada");
    let resource = letter(&engine, &ada, "letter");

    let receipt = engine
        .create_value(CreateValueRequest {
            resource: resource.iri.clone(),
            expected_last_modification: None,
            property: page_count(),
            content: ValueContent::Int(5),
            comment: None,
            permissions: None,
            value_uuid: None,
            actor: ada.clone(),
            request_id: Uuid::new_v4(),
        })
        .unwrap();
    let v0 = receipt.version.clone();

    let receipt = engine
        .update_value_content(UpdateValueContentRequest {
            resource: resource.iri.clone(),
            expected_last_modification: None,
            value: v0.clone(),
            content: ValueContent::Int(6),
            comment: Some("recounted".into()),
            actor: ada.clone(),
            request_id: Uuid::new_v4(),
        })
        .unwrap();
    assert_ne!(receipt.version, v0);

    let fetched = engine.fetch_resource(&resource.iri, &ada).unwrap();
    let record = fetched.value(receipt.value).unwrap();
    assert_eq!(record.versions.len(), 2);
    assert_eq!(record.current().content, ValueContent::Int(6));
    assert_eq!(record.versions[0].content, ValueContent::Int(5));

    // Both version IRIs still resolve in the store.
    assert!(engine.store().resolve_value_iri(&v0).is_some());
    assert!(engine.store().resolve_value_iri(&receipt.version).is_some());
}

#[test]
fn updating_via_superseded_version_iri_conflicts() {
    let engine = engine();
    let ada = member("ada");
    let resource = letter(&engine, &ada, "letter");
    let v0 = engine
        .create_value(CreateValueRequest {
            resource: resource.iri.clone(),
            expected_last_modification: None,
            property: page_count(),
            content: ValueContent::Int(5),
            comment: None,
            permissions: None,
            value_uuid: None,
            actor: ada.clone(),
            request_id: Uuid::new_v4(),
        })
        .unwrap()
        .version;
    engine
        .update_value_content(UpdateValueContentRequest {
            resource: resource.iri.clone(),
            expected_last_modification: None,
            value: v0.clone(),
            content: ValueContent::Int(6),
            comment: None,
            actor: ada.clone(),
            request_id: Uuid::new_v4(),
        })
        .unwrap();

    let err = engine
        .update_value_content(UpdateValueContentRequest {
            resource: resource.iri,
            expected_last_modification: None,
            value: v0,
            content: ValueContent::Int(7),
            comment: None,
            actor: ada,
            request_id: Uuid::new_v4(),
        })
        .unwrap_err();
    assert!(matches!(
        lifecycle_err(err),
        LifecycleError::EditConflict { .. }
    ));
}

#[test]
fn resubmitting_identical_content_is_a_duplicate() {
    let engine = engine();
    let ada = member("ada");
    let resource = letter(&engine, &ada, "letter");
    let v0 = engine
        .create_value(CreateValueRequest {
            resource: resource.iri.clone(),
            expected_last_modification: None,
            property: page_count(),
            content: ValueContent::Int(5),
            comment: None,
            permissions: None,
            value_uuid: None,
            actor: ada.clone(),
            request_id: Uuid::new_v4(),
        })
        .unwrap()
        .version;

    let err = engine
        .update_value_content(UpdateValueContentRequest {
            resource: resource.iri,
            expected_last_modification: None,
            value: v0,
            content: ValueContent::Int(5),
            comment: None,
            actor: ada,
            request_id: Uuid::new_v4(),
        })
        .unwrap_err();
    assert!(matches!(
        lifecycle_err(err),
        LifecycleError::DuplicateValue { .. }
    ));
}

#[test]
fn cardinality_enforced_on_value_creation() {
    let engine = engine();
    let ada = member("ada");
    let resource = letter(&engine, &ada, "letter");
    let make = |n: i64| CreateValueRequest {
        resource: resource.iri.clone(),
        expected_last_modification: None,
        property: page_count(),
        content: ValueContent::Int(n),
        comment: None,
        permissions: None,
        value_uuid: None,
        actor: ada.clone(),
        request_id: Uuid::new_v4(),
    };
    engine.create_value(make(1)).unwrap();
    let err = engine.create_value(make(2)).unwrap_err();
    assert!(matches!(
        lifecycle_err(err),
        LifecycleError::Ontology(_)
    ));
}

#[test]
fn deleted_value_frees_its_cardinality_slot() {
    let engine = engine();
    let ada = member("ada");
    let resource = letter(&engine, &ada, "letter");
    let receipt = engine
        .create_value(CreateValueRequest {
            resource: resource.iri.clone(),
            expected_last_modification: None,
            property: page_count(),
            content: ValueContent::Int(1),
            comment: None,
            permissions: None,
            value_uuid: None,
            actor: ada.clone(),
            request_id: Uuid::new_v4(),
        })
        .unwrap();
    engine
        .delete_value(DeleteValueRequest {
            resource: resource.iri.clone(),
            expected_last_modification: None,
            value: receipt.version,
            comment: Some("miscounted".into()),
            delete_date: None,
            actor: ada.clone(),
        })
        .unwrap();

    // The at-most-one slot is free again.
    assert!(engine
        .create_value(CreateValueRequest {
            resource: resource.iri,
            expected_last_modification: None,
            property: page_count(),
            content: ValueContent::Int(2),
            comment: None,
            permissions: None,
            value_uuid: None,
            actor: ada,
            request_id: Uuid::new_v4(),
        })
        .is_ok());
}

#[test]
fn deleted_value_rejects_further_edits() {
    let engine = engine();
    let ada = member("ada");
    let resource = letter(&engine, &ada, "letter");
    let receipt = engine
        .create_value(CreateValueRequest {
            resource: resource.iri.clone(),
            expected_last_modification: None,
            property: page_count(),
            content: ValueContent::Int(1),
            comment: None,
            permissions: None,
            value_uuid: None,
            actor: ada.clone(),
            request_id: Uuid::new_v4(),
        })
        .unwrap();
    engine
        .delete_value(DeleteValueRequest {
            resource: resource.iri.clone(),
            expected_last_modification: None,
            value: receipt.version.clone(),
            comment: None,
            delete_date: None,
            actor: ada.clone(),
        })
        .unwrap();

    let err = engine
        .update_value_content(UpdateValueContentRequest {
            resource: resource.iri,
            expected_last_modification: None,
            value: receipt.version,
            content: ValueContent::Int(2),
            comment: None,
            actor: ada,
            request_id: Uuid::new_v4(),
        })
        .unwrap_err();
    assert!(matches!(
        lifecycle_err(err),
        LifecycleError::NotFound { .. }
    ));
}

#[test]
fn value_kind_cannot_change_across_versions() {
    let engine = engine();
    let ada = member("ada");
    let resource = letter(&engine, &ada, "letter");
    let v0 = engine
        .create_value(CreateValueRequest {
            resource: resource.iri.clone(),
            expected_last_modification: None,
            property: page_count(),
            content: ValueContent::Int(5),
            comment: None,
            permissions: None,
            value_uuid: None,
            actor: ada.clone(),
            request_id: Uuid::new_v4(),
        })
        .unwrap()
        .version;
    let err = engine
        .update_value_content(UpdateValueContentRequest {
            resource: resource.iri,
            expected_last_modification: None,
            value: v0,
            content: ValueContent::Boolean(true),
            comment: None,
            actor: ada,
            request_id: Uuid::new_v4(),
        })
        .unwrap_err();
    assert!(matches!(
        lifecycle_err(err),
        LifecycleError::BadRequest { .. }
    ));
}

#[test]
fn unknown_list_node_rejected() {
    let engine = engine();
    let ada = member("ada");
    let resource = letter(&engine, &ada, "letter");
    let err = engine
        .create_value(CreateValueRequest {
            resource: resource.iri.clone(),
            expected_last_modification: None,
            property: status(),
            content: ValueContent::ListNode(
                ListNodeIri::new("http://per-ankh.dev/lists/status/unknown").unwrap(),
            ),
            comment: None,
            permissions: None,
            value_uuid: None,
            actor: ada.clone(),
            request_id: Uuid::new_v4(),
        })
        .unwrap_err();
    assert!(matches!(
        lifecycle_err(err),
        LifecycleError::NotFound { .. }
    ));

    assert!(engine
        .create_value(CreateValueRequest {
            resource: resource.iri,
            expected_last_modification: None,
            property: status(),
            content: ValueContent::ListNode(draft_node()),
            comment: None,
            permissions: None,
            value_uuid: None,
            actor: ada,
            request_id: Uuid::new_v4(),
        })
        .is_ok());
}

#[test]
fn value_permission_update_needs_change_rights_and_a_real_change() {
    let engine = engine();
    let ada = member("ada");
    let resource = letter(&engine, &ada, "letter");
    let v0 = engine
        .create_value(CreateValueRequest {
            resource: resource.iri.clone(),
            expected_last_modification: None,
            property: page_count(),
            content: ValueContent::Int(5),
            comment: None,
            permissions: None,
            value_uuid: None,
            actor: ada.clone(),
            request_id: Uuid::new_v4(),
        })
        .unwrap()
        .version;

    // Identical permissions: nothing to do.
    let same = Acl::parse("CR creator|M projectMember|V knownUser|RV unknownUser").unwrap();
    let err = engine
        .update_value_permissions(UpdateValuePermissionsRequest {
            resource: resource.iri.clone(),
            expected_last_modification: None,
            value: v0.clone(),
            permissions: same,
            actor: ada.clone(),
        })
        .unwrap_err();
    assert!(matches!(
        lifecycle_err(err),
        LifecycleError::BadRequest { .. }
    ));

    // A non-creator member holds Modify, not ChangeRights.
    let err = engine
        .update_value_permissions(UpdateValuePermissionsRequest {
            resource: resource.iri.clone(),
            expected_last_modification: None,
            value: v0.clone(),
            permissions: Acl::parse("CR creator").unwrap(),
            actor: member("bob"),
        })
        .unwrap_err();
    assert!(matches!(
        lifecycle_err(err),
        LifecycleError::Forbidden { .. }
    ));

    let receipt = engine
        .update_value_permissions(UpdateValuePermissionsRequest {
            resource: resource.iri.clone(),
            expected_last_modification: None,
            value: v0,
            permissions: Acl::parse("CR creator").unwrap(),
            actor: ada.clone(),
        })
        .unwrap();
    let fetched = engine.fetch_resource(&resource.iri, &ada).unwrap();
    let record = fetched.value(receipt.value).unwrap();
    assert_eq!(record.versions.len(), 2);
    assert_eq!(record.current().content, ValueContent::Int(5));
}

// ---------------------------------------------------------------------------
// Deletion and erase
// ---------------------------------------------------------------------------

#[test]
fn deleted_resource_rejects_mutations_but_stays_readable() {
    let engine = engine();
    let ada = member("ada");
    let resource = letter(&engine, &ada, "letter");
    engine
        .mark_resource_deleted(MarkDeletedRequest {
            resource: resource.iri.clone(),
            class: None,
            expected_last_modification: None,
            comment: Some("superseded".into()),
            delete_date: None,
            actor: ada.clone(),
        })
        .unwrap();

    let fetched = engine.fetch_resource(&resource.iri, &ada).unwrap();
    assert!(fetched.is_deleted());

    let err = engine
        .create_value(CreateValueRequest {
            resource: resource.iri,
            expected_last_modification: None,
            property: page_count(),
            content: ValueContent::Int(1),
            comment: None,
            permissions: None,
            value_uuid: None,
            actor: ada,
            request_id: Uuid::new_v4(),
        })
        .unwrap_err();
    assert!(matches!(
        lifecycle_err(err),
        LifecycleError::NotFound { .. }
    ));
}

#[test]
fn deletion_date_may_not_precede_last_change() {
    let engine = engine();
    let ada = member("ada");
    let resource = letter(&engine, &ada, "letter");
    let err = engine
        .mark_resource_deleted(MarkDeletedRequest {
            resource: resource.iri,
            class: None,
            expected_last_modification: None,
            comment: None,
            delete_date: Some(resource.created_at - chrono::TimeDelta::days(1)),
            actor: ada,
        })
        .unwrap_err();
    assert!(matches!(
        lifecycle_err(err),
        LifecycleError::BadRequest { .. }
    ));
}

#[test]
fn erase_is_admin_only() {
    let engine = engine();
    let ada = member("ada");
    let resource = letter(&engine, &ada, "letter");
    let err = engine
        .erase_resource(EraseRequest {
            resource: resource.iri.clone(),
            class: None,
            expected_last_modification: None,
            actor: ada,
        })
        .unwrap_err();
    assert!(matches!(
        lifecycle_err(err),
        LifecycleError::Forbidden { .. }
    ));

    let report = engine
        .erase_resource(EraseRequest {
            resource: resource.iri.clone(),
            class: None,
            expected_last_modification: None,
            actor: admin(),
        })
        .unwrap();
    assert_eq!(report.values_removed, 1);
    assert!(!engine.store().exists(&resource.iri));
}

#[test]
fn erase_blocked_by_live_link_then_allowed_after_its_deletion() {
    let engine = engine();
    let ada = member("ada");
    let target = letter(&engine, &ada, "target");
    let source = letter(&engine, &ada, "source");
    let link = engine
        .create_value(CreateValueRequest {
            resource: source.iri.clone(),
            expected_last_modification: None,
            property: refers_to(),
            content: ValueContent::Link {
                target: target.iri.clone(),
            },
            comment: None,
            permissions: None,
            value_uuid: None,
            actor: ada.clone(),
            request_id: Uuid::new_v4(),
        })
        .unwrap();

    let err = engine
        .erase_resource(EraseRequest {
            resource: target.iri.clone(),
            class: None,
            expected_last_modification: None,
            actor: admin(),
        })
        .unwrap_err();
    assert!(matches!(
        lifecycle_err(err),
        LifecycleError::BadRequest { .. }
    ));

    engine
        .delete_value(DeleteValueRequest {
            resource: source.iri.clone(),
            expected_last_modification: None,
            value: link.version,
            comment: None,
            delete_date: None,
            actor: ada.clone(),
        })
        .unwrap();

    let report = engine
        .erase_resource(EraseRequest {
            resource: target.iri.clone(),
            class: None,
            expected_last_modification: None,
            actor: admin(),
        })
        .unwrap();
    assert_eq!(report.dangling_links_removed, 1);

    // The soft-deleted link value was purged from the source too.
    let source = engine.fetch_resource(&source.iri, &ada).unwrap();
    assert!(source.value(link.value).is_none());
}

#[test]
fn erase_keeps_link_values_retargeted_elsewhere() {
    let engine = engine();
    let ada = member("ada");
    let old_target = letter(&engine, &ada, "old target");
    let new_target = letter(&engine, &ada, "new target");
    let source = letter(&engine, &ada, "source");
    let link = engine
        .create_value(CreateValueRequest {
            resource: source.iri.clone(),
            expected_last_modification: None,
            property: refers_to(),
            content: ValueContent::Link {
                target: old_target.iri.clone(),
            },
            comment: None,
            permissions: None,
            value_uuid: None,
            actor: ada.clone(),
            request_id: Uuid::new_v4(),
        })
        .unwrap();

    // Retarget the link; only a superseded version points at the old target.
    let link = engine
        .update_value_content(UpdateValueContentRequest {
            resource: source.iri.clone(),
            expected_last_modification: None,
            value: link.version,
            content: ValueContent::Link {
                target: new_target.iri.clone(),
            },
            comment: None,
            actor: ada.clone(),
            request_id: Uuid::new_v4(),
        })
        .unwrap();

    let report = engine
        .erase_resource(EraseRequest {
            resource: old_target.iri.clone(),
            class: None,
            expected_last_modification: None,
            actor: admin(),
        })
        .unwrap();
    assert_eq!(report.dangling_links_removed, 1);

    // The live link to the surviving target is untouched.
    let source = engine.fetch_resource(&source.iri, &ada).unwrap();
    let record = source.value(link.value).expect("retargeted link survives");
    assert!(matches!(
        &record.current().content,
        ValueContent::Link { target } if *target == new_target.iri
    ));

    // And it still blocks erasing the surviving target.
    let err = engine
        .erase_resource(EraseRequest {
            resource: new_target.iri.clone(),
            class: None,
            expected_last_modification: None,
            actor: admin(),
        })
        .unwrap_err();
    assert!(matches!(
        lifecycle_err(err),
        LifecycleError::BadRequest { .. }
    ));
}

#[test]
fn link_to_missing_or_deleted_target_rejected() {
    let engine = engine();
    let ada = member("ada");
    let source = letter(&engine, &ada, "source");

    let err = engine
        .create_value(CreateValueRequest {
            resource: source.iri.clone(),
            expected_last_modification: None,
            property: refers_to(),
            content: ValueContent::Link {
                target: ResourceIri::mint(),
            },
            comment: None,
            permissions: None,
            value_uuid: None,
            actor: ada.clone(),
            request_id: Uuid::new_v4(),
        })
        .unwrap_err();
    assert!(matches!(
        lifecycle_err(err),
        LifecycleError::NotFound { .. }
    ));

    let target = letter(&engine, &ada, "target");
    engine
        .mark_resource_deleted(MarkDeletedRequest {
            resource: target.iri.clone(),
            class: None,
            expected_last_modification: None,
            comment: None,
            delete_date: None,
            actor: ada.clone(),
        })
        .unwrap();
    let err = engine
        .create_value(CreateValueRequest {
            resource: source.iri,
            expected_last_modification: None,
            property: refers_to(),
            content: ValueContent::Link { target: target.iri },
            comment: None,
            permissions: None,
            value_uuid: None,
            actor: ada,
            request_id: Uuid::new_v4(),
        })
        .unwrap_err();
    assert!(matches!(
        lifecycle_err(err),
        LifecycleError::NotFound { .. }
    ));
}

// ---------------------------------------------------------------------------
// Permission-filtered reads
// ---------------------------------------------------------------------------

#[test]
fn fetch_filters_values_the_viewer_cannot_see() {
    let engine = engine();
    let ada = member("ada");
    let resource = letter(&engine, &ada, "letter");
    // A value only its creator can see.
    engine
        .create_value(CreateValueRequest {
            resource: resource.iri.clone(),
            expected_last_modification: None,
            property: page_count(),
            content: ValueContent::Int(5),
            comment: None,
            permissions: Some(Acl::parse("CR creator").unwrap()),
            value_uuid: None,
            actor: ada.clone(),
            request_id: Uuid::new_v4(),
        })
        .unwrap();

    let ada_view = engine.fetch_resource(&resource.iri, &ada).unwrap();
    assert_eq!(ada_view.values.len(), 2);

    let bob_view = engine
        .fetch_resource(&resource.iri, &member("bob"))
        .unwrap();
    assert_eq!(bob_view.values.len(), 1);
    assert_eq!(bob_view.live_value_count(&page_count()), 0);
}

#[test]
fn fetch_forbidden_without_restricted_view() {
    let restricted_class = ClassIri::new("http://per-ankh.dev/ontology#Secret").unwrap();
    let ontology = Arc::new(
        ProjectOntology::new()
            .with_cardinality(
                restricted_class.clone(),
                title(),
                Cardinality::one(ValueKind::Text),
            )
            .with_class_permissions(restricted_class.clone(), Acl::parse("CR creator").unwrap()),
    );
    let engine = Engine::new(EngineConfig::default(), ontology).unwrap();
    let ada = member("ada");
    let resource = engine
        .create_resource(CreateResourceRequest {
            class: restricted_class,
            label: "secret".into(),
            project: project(),
            values: vec![NewValue::new(title(), text("secret"))],
            permissions: None,
            actor: ada.clone(),
            request_id: Uuid::new_v4(),
        })
        .unwrap();

    assert!(engine.fetch_resource(&resource.iri, &ada).is_ok());
    let err = engine
        .fetch_resource(&resource.iri, &member("bob"))
        .unwrap_err();
    assert!(matches!(
        lifecycle_err(err),
        LifecycleError::Forbidden { .. }
    ));

    // Administrators bypass the ACL.
    assert!(engine.fetch_resource(&resource.iri, &admin()).is_ok());
}
