//! Ontology collaborator.
//!
//! The engine does not interpret schemas itself; it consumes a narrow
//! [`Ontology`] trait for cardinality and value-type validation and for the
//! class default permissions that gate custom ACLs at creation time.
//! [`ProjectOntology`] is a map-backed implementation sufficient for
//! self-contained deployments and tests.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::error::OntologyError;
use crate::iri::{ClassIri, ListNodeIri, PropertyIri};
use crate::perm::Acl;
use crate::value::{ValueContent, ValueKind};

/// How many values of a property a resource may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cardinality {
    pub kind: ValueKind,
    pub min: usize,
    /// `None` means unbounded.
    pub max: Option<usize>,
}

impl Cardinality {
    /// Exactly one value.
    pub fn one(kind: ValueKind) -> Self {
        Self { kind, min: 1, max: Some(1) }
    }

    /// Zero or one value.
    pub fn at_most_one(kind: ValueKind) -> Self {
        Self { kind, min: 0, max: Some(1) }
    }

    /// Any number of values, including none.
    pub fn unbounded(kind: ValueKind) -> Self {
        Self { kind, min: 0, max: None }
    }

    /// At least one value.
    pub fn at_least_one(kind: ValueKind) -> Self {
        Self { kind, min: 1, max: None }
    }

    fn admits(&self, count: usize) -> bool {
        count >= self.min && self.max.is_none_or(|max| count <= max)
    }

    fn max_display(&self) -> String {
        match self.max {
            Some(n) => n.to_string(),
            None => "n".to_string(),
        }
    }
}

/// Schema and default-permission oracle consumed by the lifecycle managers.
pub trait Ontology: Send + Sync {
    /// Whether `proposed` values of `property` are admissible on `class`.
    fn validate_cardinality(
        &self,
        class: &ClassIri,
        property: &PropertyIri,
        proposed: usize,
    ) -> Result<(), OntologyError>;

    /// Validate a whole instance: every supplied property's count, plus
    /// presence of every property the class requires.
    fn validate_resource(
        &self,
        class: &ClassIri,
        counts: &BTreeMap<PropertyIri, usize>,
    ) -> Result<(), OntologyError>;

    /// Whether `content`'s kind matches `property`'s declared object type.
    fn validate_value_type(
        &self,
        class: &ClassIri,
        property: &PropertyIri,
        content: &ValueContent,
    ) -> Result<(), OntologyError>;

    /// The permission string new objects of `class` default to.
    fn default_permissions(&self, class: &ClassIri) -> Result<Acl, OntologyError>;

    /// Whether a controlled-vocabulary list node exists.
    fn list_node_exists(&self, node: &ListNodeIri) -> bool;
}

/// Map-backed [`Ontology`] built with the `with_*` methods.
#[derive(Debug, Clone)]
pub struct ProjectOntology {
    classes: HashMap<ClassIri, ClassDef>,
    list_nodes: HashSet<ListNodeIri>,
    fallback_permissions: Acl,
}

#[derive(Debug, Clone)]
struct ClassDef {
    cardinalities: HashMap<PropertyIri, Cardinality>,
    default_permissions: Option<Acl>,
}

impl ProjectOntology {
    /// An empty ontology with the standard default permission string
    /// (`CR creator|M projectMember|V knownUser|RV unknownUser`).
    pub fn new() -> Self {
        Self {
            classes: HashMap::new(),
            list_nodes: HashSet::new(),
            fallback_permissions: Acl::parse(
                "CR creator|M projectMember|V knownUser|RV unknownUser",
            )
            .expect("builtin default ACL parses"),
        }
    }

    /// Register a resource class.
    pub fn with_class(mut self, class: ClassIri) -> Self {
        self.classes.entry(class).or_insert_with(|| ClassDef {
            cardinalities: HashMap::new(),
            default_permissions: None,
        });
        self
    }

    /// Register a property cardinality on a class (registering the class if
    /// needed).
    pub fn with_cardinality(
        mut self,
        class: ClassIri,
        property: PropertyIri,
        cardinality: Cardinality,
    ) -> Self {
        self.classes
            .entry(class)
            .or_insert_with(|| ClassDef {
                cardinalities: HashMap::new(),
                default_permissions: None,
            })
            .cardinalities
            .insert(property, cardinality);
        self
    }

    /// Override the default permissions for one class.
    pub fn with_class_permissions(mut self, class: ClassIri, acl: Acl) -> Self {
        self.classes
            .entry(class)
            .or_insert_with(|| ClassDef {
                cardinalities: HashMap::new(),
                default_permissions: None,
            })
            .default_permissions = Some(acl);
        self
    }

    /// Register a list node.
    pub fn with_list_node(mut self, node: ListNodeIri) -> Self {
        self.list_nodes.insert(node);
        self
    }

    fn class_def(&self, class: &ClassIri) -> Result<&ClassDef, OntologyError> {
        self.classes.get(class).ok_or_else(|| OntologyError::UnknownClass {
            class: class.to_string(),
        })
    }

    fn cardinality_of(
        &self,
        class: &ClassIri,
        property: &PropertyIri,
    ) -> Result<Cardinality, OntologyError> {
        self.class_def(class)?
            .cardinalities
            .get(property)
            .copied()
            .ok_or_else(|| OntologyError::UnknownProperty {
                class: class.to_string(),
                property: property.to_string(),
            })
    }
}

impl Default for ProjectOntology {
    fn default() -> Self {
        Self::new()
    }
}

impl Ontology for ProjectOntology {
    fn validate_cardinality(
        &self,
        class: &ClassIri,
        property: &PropertyIri,
        proposed: usize,
    ) -> Result<(), OntologyError> {
        let card = self.cardinality_of(class, property)?;
        if card.admits(proposed) {
            Ok(())
        } else {
            Err(OntologyError::CardinalityViolation {
                property: property.to_string(),
                proposed,
                min: card.min,
                max: card.max_display(),
            })
        }
    }

    fn validate_resource(
        &self,
        class: &ClassIri,
        counts: &BTreeMap<PropertyIri, usize>,
    ) -> Result<(), OntologyError> {
        for (property, count) in counts {
            self.validate_cardinality(class, property, *count)?;
        }
        for (property, card) in &self.class_def(class)?.cardinalities {
            if card.min > 0 && !counts.contains_key(property) {
                return Err(OntologyError::CardinalityViolation {
                    property: property.to_string(),
                    proposed: 0,
                    min: card.min,
                    max: card.max_display(),
                });
            }
        }
        Ok(())
    }

    fn validate_value_type(
        &self,
        class: &ClassIri,
        property: &PropertyIri,
        content: &ValueContent,
    ) -> Result<(), OntologyError> {
        let card = self.cardinality_of(class, property)?;
        if card.kind == content.kind() {
            Ok(())
        } else {
            Err(OntologyError::TypeMismatch {
                property: property.to_string(),
                expected: card.kind.to_string(),
                actual: content.kind().to_string(),
            })
        }
    }

    fn default_permissions(&self, class: &ClassIri) -> Result<Acl, OntologyError> {
        Ok(self
            .class_def(class)?
            .default_permissions
            .clone()
            .unwrap_or_else(|| self.fallback_permissions.clone()))
    }

    fn list_node_exists(&self, node: &ListNodeIri) -> bool {
        self.list_nodes.contains(node)
    }
}
