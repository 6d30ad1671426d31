//! # per-ankh
//!
//! A versioned, permission-aware resource lifecycle engine: an append-only
//! multi-version data model with optimistic concurrency, ACL permission
//! evaluation, referential-integrity-checked erase, standoff text markup,
//! and deterministic history reconstruction.
//!
//! ## Architecture
//!
//! - **Identity** (`iri`, `actor`): typed IRI newtypes and requesting-actor
//!   standing
//! - **Permissions** (`perm`): parsed ACLs and effective-level evaluation
//! - **Data model** (`value`, `resource`, `standoff`): version arenas,
//!   resource records, and standoff markup forests
//! - **Schema** (`ontology`): cardinality and value-type validation
//! - **Storage** (`store`): concurrent in-memory store (DashMap) with redb
//!   write-through persistence
//! - **Operations** (`lifecycle`): the validated create/update/delete/erase
//!   managers
//! - **History** (`history`): deterministic event reconstruction from stored
//!   state
//!
//! ## Library usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use per_ankh::engine::{Engine, EngineConfig};
//! use per_ankh::actor::Actor;
//! use per_ankh::iri::{ActorIri, ClassIri, ProjectIri, PropertyIri};
//! use per_ankh::lifecycle::{CreateResourceRequest, NewValue};
//! use per_ankh::ontology::{Cardinality, ProjectOntology};
//! use per_ankh::value::{ValueContent, ValueKind};
//!
//! let class = ClassIri::new("http://example.org/ontology#Letter").unwrap();
//! let page_count = PropertyIri::new("http://example.org/ontology#pageCount").unwrap();
//! let project = ProjectIri::new("http://example.org/projects/0001").unwrap();
//!
//! let ontology = Arc::new(ProjectOntology::new().with_cardinality(
//!     class.clone(),
//!     page_count.clone(),
//!     Cardinality::at_most_one(ValueKind::Int),
//! ));
//! let engine = Engine::new(EngineConfig::default(), ontology).unwrap();
//!
//! let actor = Actor::new(ActorIri::new("http://example.org/users/ada").unwrap())
//!     .in_project(project.clone());
//! let resource = engine
//!     .create_resource(CreateResourceRequest {
//!         class,
//!         label: "a letter".into(),
//!         project,
//!         values: vec![NewValue::new(page_count, ValueContent::Int(3))],
//!         permissions: None,
//!         actor,
//!         request_id: uuid::Uuid::new_v4(),
//!     })
//!     .unwrap();
//! println!("created {}", resource.iri);
//! ```

pub mod actor;
pub mod engine;
pub mod error;
pub mod history;
pub mod iri;
pub mod lifecycle;
pub mod ontology;
pub mod perm;
pub mod resource;
pub mod standoff;
pub mod store;
pub mod value;
