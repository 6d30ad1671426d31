//! Engine facade: top-level API for the per-ankh system.
//!
//! The `Engine` owns the store, the ontology, and the lifecycle managers, and
//! provides the public interface for creating, editing, deleting, erasing,
//! and inspecting versioned resources.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::actor::Actor;
use crate::error::{EngineError, PerAnkhResult};
use crate::history::{HistoryEvent, HistoryManager};
use crate::iri::ResourceIri;
use crate::lifecycle::{
    CreateResourceRequest, CreateValueRequest, DeleteValueRequest, EraseRequest,
    MarkDeletedRequest, ResourceManager, UpdateMetadataRequest, UpdateValueContentRequest,
    UpdateValuePermissionsRequest, ValueManager, ValueReceipt,
};
use crate::ontology::Ontology;
use crate::resource::Resource;
use crate::store::{EraseReport, GraphStore, MemGraphStore};

/// Configuration for the per-ankh engine.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Data directory for persistence. `None` for memory-only mode.
    pub data_dir: Option<PathBuf>,
}

/// The per-ankh resource lifecycle engine.
///
/// Owns all subsystems: the graph store, the ontology oracle, the resource
/// and value managers, and the history reconstructor.
pub struct Engine {
    config: EngineConfig,
    store: Arc<dyn GraphStore>,
    resources: ResourceManager,
    values: ValueManager,
    history: HistoryManager,
}

impl Engine {
    /// Create a new engine with the given configuration and ontology.
    pub fn new(config: EngineConfig, ontology: Arc<dyn Ontology>) -> PerAnkhResult<Self> {
        let store: Arc<dyn GraphStore> = if let Some(ref dir) = config.data_dir {
            std::fs::create_dir_all(dir).map_err(|_| EngineError::DataDir {
                path: dir.display().to_string(),
            })?;
            Arc::new(MemGraphStore::with_persistence(dir)?)
        } else {
            Arc::new(MemGraphStore::new())
        };

        tracing::info!(
            persistent = config.data_dir.is_some(),
            "initializing per-ankh engine"
        );

        let resources = ResourceManager::new(Arc::clone(&store), Arc::clone(&ontology));
        let values = ValueManager::new(Arc::clone(&store), Arc::clone(&ontology));
        let history = HistoryManager::new(Arc::clone(&store));

        Ok(Self {
            config,
            store,
            resources,
            values,
            history,
        })
    }

    /// Create a resource with its initial values.
    pub fn create_resource(&self, request: CreateResourceRequest) -> PerAnkhResult<Resource> {
        Ok(self.resources.create(request)?)
    }

    /// Read a resource as seen by `viewer`, with values the viewer holds no
    /// permission level on omitted.
    pub fn fetch_resource(
        &self,
        iri: &ResourceIri,
        viewer: &Actor,
    ) -> PerAnkhResult<Resource> {
        Ok(self.resources.fetch(iri, viewer)?)
    }

    /// Update a resource's label and/or permissions.
    pub fn update_metadata(&self, request: UpdateMetadataRequest) -> PerAnkhResult<Resource> {
        Ok(self.resources.update_metadata(request)?)
    }

    /// Soft-delete a resource.
    pub fn mark_resource_deleted(&self, request: MarkDeletedRequest) -> PerAnkhResult<Resource> {
        Ok(self.resources.mark_deleted(request)?)
    }

    /// Physically erase a resource and everything that hangs off it.
    pub fn erase_resource(&self, request: EraseRequest) -> PerAnkhResult<EraseReport> {
        Ok(self.resources.erase(request)?)
    }

    /// Add a value to an existing resource.
    pub fn create_value(&self, request: CreateValueRequest) -> PerAnkhResult<ValueReceipt> {
        Ok(self.values.create(request)?)
    }

    /// Append a content version to a value.
    pub fn update_value_content(
        &self,
        request: UpdateValueContentRequest,
    ) -> PerAnkhResult<ValueReceipt> {
        Ok(self.values.update_content(request)?)
    }

    /// Replace a value's permissions.
    pub fn update_value_permissions(
        &self,
        request: UpdateValuePermissionsRequest,
    ) -> PerAnkhResult<ValueReceipt> {
        Ok(self.values.update_permissions(request)?)
    }

    /// Soft-delete a value.
    pub fn delete_value(&self, request: DeleteValueRequest) -> PerAnkhResult<ValueReceipt> {
        Ok(self.values.delete(request)?)
    }

    /// Reconstruct a resource's event history, optionally windowed.
    pub fn history(
        &self,
        resource: &ResourceIri,
        viewer: &Actor,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> PerAnkhResult<Vec<HistoryEvent>> {
        Ok(self.history.reconstruct(resource, viewer, start, end)?)
    }

    /// Get the store handle.
    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    /// Get the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Get summary info about the engine state.
    pub fn info(&self) -> EngineInfo {
        EngineInfo {
            persistent: self.config.data_dir.is_some(),
        }
    }
}

/// Summary information about the engine state.
#[derive(Debug, Clone)]
pub struct EngineInfo {
    pub persistent: bool,
}

impl std::fmt::Display for EngineInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "per-ankh engine info")?;
        writeln!(f, "  persistent:   {}", self.persistent)?;
        Ok(())
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iri::{ActorIri, ClassIri, ProjectIri, PropertyIri};
    use crate::lifecycle::NewValue;
    use crate::ontology::{Cardinality, ProjectOntology};
    use crate::value::{ValueContent, ValueKind};
    use uuid::Uuid;

    fn ontology() -> Arc<dyn Ontology> {
        Arc::new(
            ProjectOntology::new().with_cardinality(
                ClassIri::new("http://per-ankh.dev/ontology#Letter").unwrap(),
                PropertyIri::new("http://per-ankh.dev/ontology#pageCount").unwrap(),
                Cardinality::at_most_one(ValueKind::Int),
            ),
        )
    }

    fn member() -> Actor {
        Actor::new(ActorIri::new("http://per-ankh.dev/users/ada").unwrap())
            .in_project(ProjectIri::new("http://per-ankh.dev/projects/0001").unwrap())
    }

    fn create_request() -> CreateResourceRequest {
        CreateResourceRequest {
            class: ClassIri::new("http://per-ankh.dev/ontology#Letter").unwrap(),
            label: "a letter".into(),
            project: ProjectIri::new("http://per-ankh.dev/projects/0001").unwrap(),
            values: vec![NewValue::new(
                PropertyIri::new("http://per-ankh.dev/ontology#pageCount").unwrap(),
                ValueContent::Int(3),
            )],
            permissions: None,
            actor: member(),
            request_id: Uuid::new_v4(),
        }
    }

    #[test]
    fn create_memory_only_engine() {
        let engine = Engine::new(EngineConfig::default(), ontology()).unwrap();
        assert!(!engine.info().persistent);
    }

    #[test]
    fn engine_with_persistence() {
        let dir = tempfile::TempDir::new().unwrap();
        let engine = Engine::new(
            EngineConfig {
                data_dir: Some(dir.path().to_path_buf()),
            },
            ontology(),
        )
        .unwrap();
        assert!(engine.info().persistent);
    }

    #[test]
    fn create_and_fetch_through_facade() {
        let engine = Engine::new(EngineConfig::default(), ontology()).unwrap();
        let created = engine.create_resource(create_request()).unwrap();
        let fetched = engine.fetch_resource(&created.iri, &member()).unwrap();
        assert_eq!(fetched.label, "a letter");
        assert_eq!(fetched.values.len(), 1);
    }
}
