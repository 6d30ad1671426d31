//! Typed IRI-like identifiers.
//!
//! Every entity in the engine is addressed by an immutable IRI string. Distinct
//! newtypes keep resource, value, property, project, actor, group, class, and
//! list-node identifiers from being mixed up at compile time. Freshly created
//! entities get minted IRIs with a UUID suffix under the `http://per-ankh.dev/`
//! namespace; callers may also bring their own IRIs.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! iri_newtype {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a caller-supplied IRI string.
            ///
            /// Returns `None` for strings that are empty or contain whitespace.
            pub fn new(raw: impl Into<String>) -> Option<Self> {
                let raw = raw.into();
                if raw.is_empty() || raw.chars().any(char::is_whitespace) {
                    return None;
                }
                Some(Self(raw))
            }

            /// The underlying IRI string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

iri_newtype!(
    /// Immutable identifier of a resource.
    ResourceIri
);
iri_newtype!(
    /// Identifier of one value *version*. Each edit mints a new one; old
    /// version IRIs stay resolvable for history.
    ValueIri
);
iri_newtype!(
    /// Identifier of a property linking a resource to its values.
    PropertyIri
);
iri_newtype!(
    /// Identifier of a project.
    ProjectIri
);
iri_newtype!(
    /// Identifier of an authenticated actor.
    ActorIri
);
iri_newtype!(
    /// Identifier of a named actor group.
    GroupIri
);
iri_newtype!(
    /// Identifier of a resource class.
    ClassIri
);
iri_newtype!(
    /// Identifier of a node in a controlled-vocabulary list.
    ListNodeIri
);

impl ResourceIri {
    /// Mint a fresh resource IRI in the engine namespace.
    pub fn mint() -> Self {
        Self(format!("http://per-ankh.dev/resources/{}", Uuid::new_v4()))
    }
}

impl ValueIri {
    /// Mint the IRI of one version of a value: the value's stable UUID plus
    /// the version index, nested under the owning resource.
    pub fn mint(resource: &ResourceIri, value: Uuid, index: u32) -> Self {
        Self(format!("{}/values/{value}/{index}", resource.as_str()))
    }
}
