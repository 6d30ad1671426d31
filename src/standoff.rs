//! Standoff markup tags over text values.
//!
//! Markup is kept out-of-band: a text value version carries an ordered
//! sequence of [`StandoffTag`]s, each covering a character span and optionally
//! pointing at a parent tag in the same sequence, forming a forest. Tag UUIDs
//! are stable across content edits that preserve the same class and span, so
//! external references to a tag survive re-submission of the text.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StandoffError;
use crate::iri::ClassIri;

/// One markup tag over a character span of a text value version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandoffTag {
    /// The tag class (paragraph, emphasis, link, ...).
    pub class: ClassIri,
    /// Stable identity of the tag across content edits.
    pub uuid: Uuid,
    /// Start character offset (inclusive).
    pub start: u32,
    /// End character offset (exclusive); must be greater than `start`.
    pub end: u32,
    /// Index of the parent tag within the same sequence; `None` for roots.
    pub parent: Option<usize>,
}

impl StandoffTag {
    /// Create a root tag with a freshly minted UUID.
    pub fn new(class: ClassIri, start: u32, end: u32) -> Self {
        Self {
            class,
            uuid: Uuid::new_v4(),
            start,
            end,
            parent: None,
        }
    }

    /// Nest this tag under the tag at `parent` in the submitted sequence.
    pub fn with_parent(mut self, parent: usize) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Pin the tag to a caller-supplied stable UUID.
    pub fn with_uuid(mut self, uuid: Uuid) -> Self {
        self.uuid = uuid;
        self
    }
}

/// Validate the forest invariants of a tag sequence before commit.
///
/// Checked, in order, for every tag: non-empty span; parent index in bounds;
/// parent starts strictly before the child; child span contained in the
/// parent span. Root spans must not overlap (at most one root per top-level
/// span), and every UUID must be distinct.
pub fn validate_forest(tags: &[StandoffTag]) -> Result<(), StandoffError> {
    for (i, tag) in tags.iter().enumerate() {
        if tag.start >= tag.end {
            return Err(StandoffError::BadSpan {
                index: i,
                start: tag.start,
                end: tag.end,
            });
        }
        if let Some(p) = tag.parent {
            let parent = tags.get(p).ok_or(StandoffError::DanglingParent {
                index: i,
                parent: p,
            })?;
            if parent.start >= tag.start {
                return Err(StandoffError::ParentOrder {
                    index: i,
                    start: tag.start,
                    parent_start: parent.start,
                });
            }
            if tag.end > parent.end {
                return Err(StandoffError::SpanEscape {
                    index: i,
                    start: tag.start,
                    end: tag.end,
                    parent_start: parent.start,
                    parent_end: parent.end,
                });
            }
        }
    }

    // Roots sorted by start; any overlap means two roots share a top-level span.
    let mut roots: Vec<usize> = (0..tags.len()).filter(|&i| tags[i].parent.is_none()).collect();
    roots.sort_by_key(|&i| tags[i].start);
    for pair in roots.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        if tags[b].start < tags[a].end {
            return Err(StandoffError::OverlappingRoots { first: a, second: b });
        }
    }

    let mut seen: std::collections::HashMap<Uuid, usize> = std::collections::HashMap::new();
    for (i, tag) in tags.iter().enumerate() {
        if let Some(&first) = seen.get(&tag.uuid) {
            return Err(StandoffError::DuplicateUuid {
                uuid: tag.uuid,
                first,
                second: i,
            });
        }
        seen.insert(tag.uuid, i);
    }

    Ok(())
}

/// Carry stable UUIDs over from a previous value version.
///
/// A submitted tag whose `(class, start, end)` matches a tag of the previous
/// version inherits that tag's UUID; each previous tag is consumed at most
/// once. Tags with no surviving counterpart keep the UUID they were submitted
/// with. Fails if a carried UUID collides with one the caller pinned on
/// another tag, since the sequence would no longer have distinct identities.
pub fn carry_over_uuids(
    previous: &[StandoffTag],
    submitted: &mut [StandoffTag],
) -> Result<(), StandoffError> {
    let mut unclaimed: Vec<&StandoffTag> = previous.iter().collect();
    for tag in submitted.iter_mut() {
        if let Some(pos) = unclaimed
            .iter()
            .position(|p| p.class == tag.class && p.start == tag.start && p.end == tag.end)
        {
            tag.uuid = unclaimed.swap_remove(pos).uuid;
        }
    }

    let mut seen: std::collections::HashMap<Uuid, usize> = std::collections::HashMap::new();
    for (i, tag) in submitted.iter().enumerate() {
        if let Some(&first) = seen.get(&tag.uuid) {
            return Err(StandoffError::DuplicateUuid {
                uuid: tag.uuid,
                first,
                second: i,
            });
        }
        seen.insert(tag.uuid, i);
    }
    Ok(())
}
