//! Value payloads and version records.
//!
//! A value belongs to exactly one resource and one property. Its identity is a
//! stable UUID; every edit appends a [`ValueVersion`] to the value's version
//! arena, so "current" is simply the highest index and the previous version is
//! index − 1. Old version IRIs stay resolvable for history.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;
use uuid::Uuid;

use crate::iri::{ActorIri, ListNodeIri, PropertyIri, ResourceIri, ValueIri};
use crate::perm::Acl;
use crate::standoff::StandoffTag;

/// Calendar a date span is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Calendar {
    Gregorian,
    Julian,
    Islamic,
}

/// A day-precision date span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateSpan {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub calendar: Calendar,
}

/// The typed payload of a value version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ValueContent {
    /// Text with optional standoff markup.
    Text {
        text: String,
        standoff: Vec<StandoffTag>,
    },
    Int(i64),
    Decimal(f64),
    Boolean(bool),
    Date(DateSpan),
    /// A time interval in seconds.
    Interval { start: f64, end: f64 },
    /// A `#rrggbb` color literal.
    Color(String),
    Uri(String),
    /// A node of a controlled-vocabulary list.
    ListNode(ListNodeIri),
    /// An opaque JSON figure; not comparable for duplicate detection.
    Geometry(String),
    /// A reference to another resource — what referential-integrity
    /// checking inspects.
    Link { target: ResourceIri },
}

/// Discriminant of [`ValueContent`], used for ontology type checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Text,
    Int,
    Decimal,
    Boolean,
    Date,
    Interval,
    Color,
    Uri,
    ListNode,
    Geometry,
    Link,
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ValueKind::Text => "Text",
            ValueKind::Int => "Int",
            ValueKind::Decimal => "Decimal",
            ValueKind::Boolean => "Boolean",
            ValueKind::Date => "Date",
            ValueKind::Interval => "Interval",
            ValueKind::Color => "Color",
            ValueKind::Uri => "Uri",
            ValueKind::ListNode => "ListNode",
            ValueKind::Geometry => "Geometry",
            ValueKind::Link => "Link",
        };
        f.write_str(name)
    }
}

impl ValueContent {
    /// The content kind.
    pub fn kind(&self) -> ValueKind {
        match self {
            ValueContent::Text { .. } => ValueKind::Text,
            ValueContent::Int(_) => ValueKind::Int,
            ValueContent::Decimal(_) => ValueKind::Decimal,
            ValueContent::Boolean(_) => ValueKind::Boolean,
            ValueContent::Date(_) => ValueKind::Date,
            ValueContent::Interval { .. } => ValueKind::Interval,
            ValueContent::Color(_) => ValueKind::Color,
            ValueContent::Uri(_) => ValueKind::Uri,
            ValueContent::ListNode(_) => ValueKind::ListNode,
            ValueContent::Geometry(_) => ValueKind::Geometry,
            ValueContent::Link { .. } => ValueKind::Link,
        }
    }

    /// The link target, if this is a link value.
    pub fn link_target(&self) -> Option<&ResourceIri> {
        match self {
            ValueContent::Link { target } => Some(target),
            _ => None,
        }
    }

    /// Check well-formedness of the payload itself (spans, literals, JSON).
    ///
    /// Returns a human-readable complaint; the lifecycle layer maps it to a
    /// `BadRequest`.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            ValueContent::Text { text, standoff } => {
                let len = text.chars().count() as u32;
                for tag in standoff {
                    if tag.end > len {
                        return Err(format!(
                            "standoff span [{}, {}) exceeds text length {len}",
                            tag.start, tag.end
                        ));
                    }
                }
                Ok(())
            }
            ValueContent::Date(span) => {
                if span.start > span.end {
                    Err(format!(
                        "date span starts {} after it ends {}",
                        span.start, span.end
                    ))
                } else {
                    Ok(())
                }
            }
            ValueContent::Interval { start, end } => {
                if !start.is_finite() || !end.is_finite() {
                    Err("interval bounds must be finite".to_string())
                } else if start > end {
                    Err(format!("interval starts {start} after it ends {end}"))
                } else {
                    Ok(())
                }
            }
            ValueContent::Color(hex) => {
                let ok = hex.len() == 7
                    && hex.starts_with('#')
                    && hex[1..].chars().all(|c| c.is_ascii_hexdigit());
                if ok {
                    Ok(())
                } else {
                    Err(format!("not a #rrggbb color literal: {hex}"))
                }
            }
            ValueContent::Uri(uri) => {
                if uri.is_empty() || !uri.contains(':') {
                    Err(format!("not an absolute URI: {uri}"))
                } else {
                    Ok(())
                }
            }
            ValueContent::Geometry(json) => serde_json::from_str::<serde_json::Value>(json)
                .map(|_| ())
                .map_err(|e| format!("geometry is not valid JSON: {e}")),
            ValueContent::Int(_)
            | ValueContent::Decimal(_)
            | ValueContent::Boolean(_)
            | ValueContent::ListNode(_)
            | ValueContent::Link { .. } => Ok(()),
        }
    }

    /// Whether two payloads count as duplicates of each other.
    ///
    /// Text compares NFC-normalized, together with the multiset of standoff
    /// `(class, span)` pairs; geometry is non-comparable, so geometry values
    /// never count as duplicates.
    pub fn duplicate_of(&self, other: &ValueContent) -> bool {
        match (self, other) {
            (
                ValueContent::Text { text: a, standoff: sa },
                ValueContent::Text { text: b, standoff: sb },
            ) => nfc(a) == nfc(b) && span_multiset(sa) == span_multiset(sb),
            (ValueContent::Color(a), ValueContent::Color(b)) => {
                a.to_ascii_lowercase() == b.to_ascii_lowercase()
            }
            (ValueContent::Geometry(_), ValueContent::Geometry(_)) => false,
            (a, b) => a == b,
        }
    }
}

fn nfc(text: &str) -> String {
    text.nfc().collect()
}

fn span_multiset(tags: &[StandoffTag]) -> Vec<(&str, u32, u32)> {
    let mut spans: Vec<_> = tags
        .iter()
        .map(|t| (t.class.as_str(), t.start, t.end))
        .collect();
    spans.sort_unstable();
    spans
}

/// The soft-deletion marker shared by resources and values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionInfo {
    pub comment: Option<String>,
    pub deleted_at: DateTime<Utc>,
    pub deleted_by: ActorIri,
}

/// What kind of edit produced a version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VersionChange {
    /// The first version of the value.
    Created,
    /// The content payload changed.
    ContentChanged,
    /// Only the permissions changed.
    PermissionsChanged,
}

/// One immutable version of a value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueVersion {
    /// This version's own resolvable IRI.
    pub iri: ValueIri,
    /// Position in the value's version arena; 0 is the creation version.
    pub index: u32,
    pub content: ValueContent,
    pub comment: Option<String>,
    pub permissions: Acl,
    pub created_at: DateTime<Utc>,
    pub created_by: ActorIri,
    pub change: VersionChange,
    /// Set when the value was soft-deleted at this version.
    pub deletion: Option<DeletionInfo>,
}

/// A value: its stable identity plus the full version arena.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueRecord {
    /// Stable across versions; may be supplied by the caller at creation.
    pub uuid: Uuid,
    pub property: PropertyIri,
    /// Append-only; never empty.
    pub versions: Vec<ValueVersion>,
}

impl ValueRecord {
    /// The current (highest-index) version.
    pub fn current(&self) -> &ValueVersion {
        self.versions
            .last()
            .expect("value record has at least one version")
    }

    /// The actor that created the value (creator of version 0), used for the
    /// `creator` ACL pseudo-group.
    pub fn creator(&self) -> &ActorIri {
        &self.versions[0].created_by
    }

    /// Whether the value is soft-deleted (deletion marker on the current
    /// version).
    pub fn is_deleted(&self) -> bool {
        self.current().deletion.is_some()
    }

    /// Whether this is a live (non-deleted) link to `target`.
    pub fn is_live_link_to(&self, target: &ResourceIri) -> bool {
        !self.is_deleted() && self.current().content.link_target() == Some(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iri::ClassIri;

    #[test]
    fn text_duplicates_compare_nfc_normalized() {
        // "é" precomposed vs. "e" + combining acute.
        let a = ValueContent::Text {
            text: "caf\u{e9}".into(),
            standoff: vec![],
        };
        let b = ValueContent::Text {
            text: "cafe\u{301}".into(),
            standoff: vec![],
        };
        assert!(a.duplicate_of(&b));
    }

    #[test]
    fn text_duplicates_include_standoff_spans() {
        let class = ClassIri::new("http://per-ankh.dev/standoff#emphasis").unwrap();
        let a = ValueContent::Text {
            text: "hello world".into(),
            standoff: vec![StandoffTag::new(class.clone(), 0, 5)],
        };
        let b = ValueContent::Text {
            text: "hello world".into(),
            standoff: vec![StandoffTag::new(class.clone(), 0, 5)],
        };
        let c = ValueContent::Text {
            text: "hello world".into(),
            standoff: vec![StandoffTag::new(class, 6, 11)],
        };
        // Same spans, different UUIDs: still duplicates.
        assert!(a.duplicate_of(&b));
        assert!(!a.duplicate_of(&c));
    }

    #[test]
    fn geometry_is_never_a_duplicate() {
        let g = ValueContent::Geometry(r#"{"type":"rectangle"}"#.into());
        assert!(!g.duplicate_of(&g.clone()));
    }

    #[test]
    fn colors_compare_case_insensitively() {
        let a = ValueContent::Color("#FF00AA".into());
        let b = ValueContent::Color("#ff00aa".into());
        assert!(a.duplicate_of(&b));
    }

    #[test]
    fn links_compare_by_target() {
        let t1 = ResourceIri::mint();
        let t2 = ResourceIri::mint();
        let a = ValueContent::Link { target: t1.clone() };
        assert!(a.duplicate_of(&ValueContent::Link { target: t1 }));
        assert!(!a.duplicate_of(&ValueContent::Link { target: t2 }));
    }

    #[test]
    fn validate_rejects_malformed_literals() {
        assert!(ValueContent::Color("red".into()).validate().is_err());
        assert!(ValueContent::Uri("not a uri".into()).validate().is_err());
        assert!(ValueContent::Geometry("{".into()).validate().is_err());
        assert!(ValueContent::Interval { start: 5.0, end: 1.0 }.validate().is_err());
        assert!(ValueContent::Interval { start: 0.0, end: f64::NAN }
            .validate()
            .is_err());
    }

    #[test]
    fn validate_rejects_standoff_past_text_end() {
        let class = ClassIri::new("http://per-ankh.dev/standoff#emphasis").unwrap();
        let content = ValueContent::Text {
            text: "short".into(),
            standoff: vec![StandoffTag::new(class, 0, 10)],
        };
        assert!(content.validate().is_err());
    }

    #[test]
    fn date_span_ordering_enforced() {
        let bad = ValueContent::Date(DateSpan {
            start: NaiveDate::from_ymd_opt(2020, 5, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2020, 4, 1).unwrap(),
            calendar: Calendar::Gregorian,
        });
        assert!(bad.validate().is_err());
    }
}
