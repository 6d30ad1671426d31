//! Rich diagnostic error types for the per-ankh engine.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes, help text, and source chains so callers know exactly
//! what went wrong and how to recover.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the per-ankh engine.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain (error codes, help text, sources) through to the caller.
#[derive(Debug, Error, Diagnostic)]
pub enum PerAnkhError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Acl(#[from] AclError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Standoff(#[from] StandoffError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Ontology(#[from] OntologyError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Engine(#[from] EngineError),
}

// ---------------------------------------------------------------------------
// ACL errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum AclError {
    #[error("empty permission string")]
    #[diagnostic(
        code(pa::acl::empty),
        help(
            "A permission string needs at least one entry, \
             e.g. \"CR creator|V knownUser\"."
        )
    )]
    Empty,

    #[error("unknown permission level: {token}")]
    #[diagnostic(
        code(pa::acl::unknown_level),
        help("Valid levels, lowest to highest: RV, V, M, CR.")
    )]
    UnknownLevel { token: String },

    #[error("permission level {level} appears more than once")]
    #[diagnostic(
        code(pa::acl::duplicate_level),
        help("Merge the principal lists into a single entry per level.")
    )]
    DuplicateLevel { level: String },

    #[error("permission level {level} has no principals")]
    #[diagnostic(
        code(pa::acl::missing_principals),
        help(
            "Each entry is \"<LEVEL> <principal>(,<principal>)*\". \
             Add at least one principal after the level."
        )
    )]
    MissingPrincipals { level: String },

    #[error("invalid principal: {token}")]
    #[diagnostic(
        code(pa::acl::invalid_principal),
        help(
            "Principals are creator, projectMember, projectAdmin, knownUser, \
             unknownUser, or a group IRI."
        )
    )]
    InvalidPrincipal { token: String },
}

// ---------------------------------------------------------------------------
// Standoff errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum StandoffError {
    #[error("tag {index} has an empty or inverted span: [{start}, {end})")]
    #[diagnostic(
        code(pa::standoff::bad_span),
        help("A standoff span must satisfy start < end.")
    )]
    BadSpan { index: usize, start: u32, end: u32 },

    #[error("tag {index} points at nonexistent parent {parent}")]
    #[diagnostic(
        code(pa::standoff::dangling_parent),
        help("Parent indices refer to positions within the same tag sequence.")
    )]
    DanglingParent { index: usize, parent: usize },

    #[error("tag {index} starts at {start} but its parent starts at {parent_start}")]
    #[diagnostic(
        code(pa::standoff::parent_order),
        help("A parent tag must start strictly before its child.")
    )]
    ParentOrder {
        index: usize,
        start: u32,
        parent_start: u32,
    },

    #[error("tag {index} with span [{start}, {end}) escapes its parent's span [{parent_start}, {parent_end})")]
    #[diagnostic(
        code(pa::standoff::span_escape),
        help("A child tag's span must be contained in its parent's span.")
    )]
    SpanEscape {
        index: usize,
        start: u32,
        end: u32,
        parent_start: u32,
        parent_end: u32,
    },

    #[error("root tags {first} and {second} overlap")]
    #[diagnostic(
        code(pa::standoff::overlapping_roots),
        help(
            "Top-level spans must not overlap: each top-level span has at most \
             one root tag. Nest one tag under the other instead."
        )
    )]
    OverlappingRoots { first: usize, second: usize },

    #[error("duplicate tag UUID {uuid} at positions {first} and {second}")]
    #[diagnostic(
        code(pa::standoff::duplicate_uuid),
        help("Every tag in a value version must carry a distinct UUID.")
    )]
    DuplicateUuid {
        uuid: uuid::Uuid,
        first: usize,
        second: usize,
    },
}

// ---------------------------------------------------------------------------
// Ontology errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum OntologyError {
    #[error("unknown resource class: {class}")]
    #[diagnostic(
        code(pa::ontology::unknown_class),
        help("Register the class with the ontology before creating resources of it.")
    )]
    UnknownClass { class: String },

    #[error("property {property} is not defined for class {class}")]
    #[diagnostic(
        code(pa::ontology::unknown_property),
        help("Only properties with a cardinality on the resource class may carry values.")
    )]
    UnknownProperty { class: String, property: String },

    #[error("cardinality violation on {property}: {proposed} value(s), allowed {min}..{max}")]
    #[diagnostic(
        code(pa::ontology::cardinality),
        help(
            "The proposed value count falls outside the property's cardinality. \
             Delete a value first, or check the class definition."
        )
    )]
    CardinalityViolation {
        property: String,
        proposed: usize,
        min: usize,
        max: String,
    },

    #[error("type mismatch on {property}: expected {expected}, got {actual}")]
    #[diagnostic(
        code(pa::ontology::type_mismatch),
        help("The value content kind must match the property's declared object type.")
    )]
    TypeMismatch {
        property: String,
        expected: String,
        actual: String,
    },
}

// ---------------------------------------------------------------------------
// Store errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("I/O error: {source}")]
    #[diagnostic(
        code(pa::store::io),
        help(
            "A filesystem operation failed. Check that the data directory exists, \
             has correct permissions, and that the disk is not full."
        )
    )]
    Io {
        #[source]
        source: std::io::Error,
    },

    #[error("redb transaction error: {message}")]
    #[diagnostic(
        code(pa::store::redb),
        help(
            "The embedded database encountered a transaction error. \
             This may indicate corruption — try running with a fresh data directory. \
             If the problem persists, file a bug report."
        )
    )]
    Redb { message: String },

    #[error("serialization error: {message}")]
    #[diagnostic(
        code(pa::store::serde),
        help(
            "Failed to serialize or deserialize a stored record. \
             This usually means the stored data format has changed between versions."
        )
    )]
    Serialization { message: String },

    #[error("resource not found: {iri}")]
    #[diagnostic(
        code(pa::store::resource_not_found),
        help("No resource with this IRI exists in the store (it may have been erased).")
    )]
    ResourceNotFound { iri: String },

    #[error("value {value} not found on resource {resource}")]
    #[diagnostic(
        code(pa::store::value_not_found),
        help("The value UUID does not belong to this resource.")
    )]
    ValueNotFound {
        resource: String,
        value: uuid::Uuid,
    },

    #[error("write conflict on {resource}: expected last modification {expected}, found {actual}")]
    #[diagnostic(
        code(pa::store::write_conflict),
        help(
            "Another write landed first. Re-read the resource to obtain the \
             current last modification date and resubmit."
        )
    )]
    WriteConflict {
        resource: String,
        expected: String,
        actual: String,
    },

    #[error("resource {iri} is still referenced by live link values")]
    #[diagnostic(
        code(pa::store::referenced),
        help(
            "A live link value pointing at this resource appeared between the \
             integrity check and the physical deletion. Delete the link value \
             and retry the erase."
        )
    )]
    Referenced { iri: String },

    #[error("resource already exists: {iri}")]
    #[diagnostic(
        code(pa::store::already_exists),
        help("Resource IRIs are immutable and unique; mint a fresh one.")
    )]
    AlreadyExists { iri: String },
}

// ---------------------------------------------------------------------------
// Lifecycle errors
// ---------------------------------------------------------------------------

/// The operation-level error taxonomy returned by the lifecycle managers.
///
/// Every failed validation happens before any store mutation; a store-level
/// [`StoreError::WriteConflict`] is surfaced as [`LifecycleError::EditConflict`]
/// by the managers.
#[derive(Debug, Error, Diagnostic)]
pub enum LifecycleError {
    #[error("edit conflict on {resource}: expected {expected}, found {actual}")]
    #[diagnostic(
        code(pa::lifecycle::edit_conflict),
        help(
            "The object was modified since you last read it. Re-fetch its \
             current state and resubmit the request."
        )
    )]
    EditConflict {
        resource: String,
        expected: String,
        actual: String,
    },

    #[error("bad request: {message}")]
    #[diagnostic(code(pa::lifecycle::bad_request))]
    BadRequest { message: String },

    #[error("forbidden: {actor} needs {needed} rights on {target}")]
    #[diagnostic(
        code(pa::lifecycle::forbidden),
        help(
            "The requesting actor's effective permission level is too low for \
             this mutation. Ask a project or system administrator."
        )
    )]
    Forbidden {
        actor: String,
        needed: String,
        target: String,
    },

    #[error("not found: {what}")]
    #[diagnostic(
        code(pa::lifecycle::not_found),
        help("The referenced resource, value, or list node does not exist or is deleted.")
    )]
    NotFound { what: String },

    #[error("duplicate value on property {property}")]
    #[diagnostic(
        code(pa::lifecycle::duplicate_value),
        help(
            "A live value with the same normalized content already exists for \
             this property (or the update would duplicate the current version)."
        )
    )]
    DuplicateValue { property: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Ontology(#[from] OntologyError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Standoff(#[from] StandoffError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Acl(#[from] AclError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),
}

impl LifecycleError {
    /// Shorthand for a [`LifecycleError::BadRequest`].
    pub fn bad_request(message: impl Into<String>) -> Self {
        LifecycleError::BadRequest {
            message: message.into(),
        }
    }

    /// Shorthand for a [`LifecycleError::NotFound`].
    pub fn not_found(what: impl Into<String>) -> Self {
        LifecycleError::NotFound { what: what.into() }
    }
}

// ---------------------------------------------------------------------------
// Engine errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum EngineError {
    #[error("invalid configuration: {message}")]
    #[diagnostic(
        code(pa::engine::invalid_config),
        help("Check the EngineConfig fields. {message}")
    )]
    InvalidConfig { message: String },

    #[error("data directory error: {path}")]
    #[diagnostic(
        code(pa::engine::data_dir),
        help(
            "The data directory could not be accessed. \
             Ensure the path exists and has read/write permissions."
        )
    )]
    DataDir { path: String },
}

/// Convenience alias for functions returning per-ankh results.
pub type PerAnkhResult<T> = std::result::Result<T, PerAnkhError>;
