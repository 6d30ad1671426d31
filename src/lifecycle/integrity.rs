//! Referential-integrity checks over link values.
//!
//! Link values are the only cross-resource edges, so integrity reduces to two
//! questions: does a link's target exist and is it live, and does anything
//! still hold a live link at a resource about to be erased.

use std::sync::Arc;

use crate::error::LifecycleError;
use crate::iri::ResourceIri;
use crate::lifecycle::LifecycleResult;
use crate::store::GraphStore;

/// Integrity oracle shared by the lifecycle managers.
#[derive(Clone)]
pub struct ReferentialIntegrity {
    store: Arc<dyn GraphStore>,
}

impl ReferentialIntegrity {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    /// A link may only be created or retargeted at an existing, live
    /// resource.
    pub fn assert_target_live(&self, target: &ResourceIri) -> LifecycleResult<()> {
        let resource = self
            .store
            .read_resource(target)
            .map_err(|_| LifecycleError::not_found(format!("link target {target}")))?;
        if resource.is_deleted() {
            return Err(LifecycleError::not_found(format!(
                "link target {target} is deleted"
            )));
        }
        Ok(())
    }

    /// Erase precondition: no live link value anywhere may still point here.
    ///
    /// The store re-validates this under its own lock immediately before the
    /// physical deletion; this check exists to fail fast with a clear
    /// message.
    pub fn assert_unreferenced(&self, iri: &ResourceIri) -> LifecycleResult<()> {
        if self.store.is_referenced(iri, false) {
            Err(LifecycleError::bad_request(format!(
                "cannot erase {iri}: live link values still reference it"
            )))
        } else {
            Ok(())
        }
    }
}

impl std::fmt::Debug for ReferentialIntegrity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferentialIntegrity").finish()
    }
}
