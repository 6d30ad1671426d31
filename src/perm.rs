//! Permission ACLs and effective-permission evaluation.
//!
//! A permission string like `"CR creator|M projectMember|V knownUser|RV
//! unknownUser"` is parsed **once** at the boundary into an [`Acl`] — an
//! ordered list of `(level, principals)` entries — and never re-parsed
//! internally. [`Acl::effective_level`] computes the maximum level any entry
//! grants an [`Actor`] against an object, or `None` when no entry matches.
//!
//! Administrator bypasses (system admins, project admins acting on their own
//! project) are *not* applied here; the lifecycle managers layer those on top.

use serde::{Deserialize, Serialize};

use crate::actor::Actor;
use crate::error::AclError;
use crate::iri::{ActorIri, GroupIri, ProjectIri};

/// A permission level, from the fixed ordered set.
///
/// The derived `Ord` follows declaration order:
/// `RestrictedView < View < Modify < ChangeRights`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Level {
    /// See that the object exists; content may be redacted by the caller.
    RestrictedView,
    /// Read the object.
    View,
    /// Edit content, add values, soft-delete.
    Modify,
    /// Everything, including changing the object's permissions.
    ChangeRights,
}

impl Level {
    /// The serialized token for this level.
    pub fn token(self) -> &'static str {
        match self {
            Level::RestrictedView => "RV",
            Level::View => "V",
            Level::Modify => "M",
            Level::ChangeRights => "CR",
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.token())
    }
}

impl std::str::FromStr for Level {
    type Err = AclError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RV" => Ok(Level::RestrictedView),
            "V" => Ok(Level::View),
            "M" => Ok(Level::Modify),
            "CR" => Ok(Level::ChangeRights),
            other => Err(AclError::UnknownLevel {
                token: other.to_string(),
            }),
        }
    }
}

/// Who an ACL entry grants its level to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Principal {
    /// The actor that created the object.
    Creator,
    /// Any member of the object's project.
    ProjectMember,
    /// Any administrator of the object's project.
    ProjectAdmin,
    /// Any authenticated actor.
    KnownUser,
    /// The anonymous actor.
    UnknownUser,
    /// An explicit group.
    Group(GroupIri),
}

impl Principal {
    fn parse(token: &str) -> Result<Self, AclError> {
        match token {
            "creator" => Ok(Principal::Creator),
            "projectMember" => Ok(Principal::ProjectMember),
            "projectAdmin" => Ok(Principal::ProjectAdmin),
            "knownUser" => Ok(Principal::KnownUser),
            "unknownUser" => Ok(Principal::UnknownUser),
            other => GroupIri::new(other)
                .map(Principal::Group)
                .ok_or_else(|| AclError::InvalidPrincipal {
                    token: other.to_string(),
                }),
        }
    }
}

impl std::fmt::Display for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Principal::Creator => f.write_str("creator"),
            Principal::ProjectMember => f.write_str("projectMember"),
            Principal::ProjectAdmin => f.write_str("projectAdmin"),
            Principal::KnownUser => f.write_str("knownUser"),
            Principal::UnknownUser => f.write_str("unknownUser"),
            Principal::Group(g) => write!(f, "{g}"),
        }
    }
}

/// The object-side facts an evaluation needs: who created the object and
/// which project it lives in.
#[derive(Debug, Clone, Copy)]
pub struct ObjectCtx<'a> {
    pub creator: &'a ActorIri,
    pub project: &'a ProjectIri,
}

/// A parsed permission grant list: ordered `(level, principals)` entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acl {
    entries: Vec<(Level, Vec<Principal>)>,
}

impl Acl {
    /// Parse a serialized permission string.
    ///
    /// Grammar: `"<LEVEL> <principal>(,<principal>)*(|<LEVEL> ...)*"`.
    /// Each level may appear at most once.
    pub fn parse(input: &str) -> Result<Self, AclError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(AclError::Empty);
        }

        let mut entries: Vec<(Level, Vec<Principal>)> = Vec::new();
        for segment in input.split('|') {
            let segment = segment.trim();
            let (level_token, rest) = match segment.split_once(char::is_whitespace) {
                Some((l, r)) => (l, r.trim()),
                None => (segment, ""),
            };
            let level: Level = level_token.parse()?;
            if entries.iter().any(|(l, _)| *l == level) {
                return Err(AclError::DuplicateLevel {
                    level: level.to_string(),
                });
            }
            if rest.is_empty() {
                return Err(AclError::MissingPrincipals {
                    level: level.to_string(),
                });
            }
            let principals = rest
                .split(',')
                .map(|t| Principal::parse(t.trim()))
                .collect::<Result<Vec<_>, _>>()?;
            entries.push((level, principals));
        }
        Ok(Self { entries })
    }

    /// Build an ACL from structured entries (levels must be distinct).
    pub fn from_entries(entries: Vec<(Level, Vec<Principal>)>) -> Result<Self, AclError> {
        let rendered = Self { entries };
        // Round-trip through the grammar invariants.
        Acl::parse(&rendered.to_string())
    }

    /// The parsed entries.
    pub fn entries(&self) -> &[(Level, Vec<Principal>)] {
        &self.entries
    }

    /// The maximum level this ACL grants `actor` on an object with context
    /// `ctx`, or `None` if no entry matches.
    pub fn effective_level(&self, actor: &Actor, ctx: ObjectCtx<'_>) -> Option<Level> {
        self.entries
            .iter()
            .filter(|(_, principals)| {
                principals.iter().any(|p| Self::matches(p, actor, ctx))
            })
            .map(|(level, _)| *level)
            .max()
    }

    /// Whether this ACL grants `actor` at least `needed` on the object.
    pub fn grants(&self, actor: &Actor, ctx: ObjectCtx<'_>, needed: Level) -> bool {
        self.effective_level(actor, ctx)
            .is_some_and(|have| have >= needed)
    }

    fn matches(principal: &Principal, actor: &Actor, ctx: ObjectCtx<'_>) -> bool {
        match principal {
            Principal::Creator => actor.id() == Some(ctx.creator),
            Principal::ProjectMember => actor.is_member_of(ctx.project),
            Principal::ProjectAdmin => actor.is_admin_of(ctx.project),
            Principal::KnownUser => actor.is_authenticated(),
            Principal::UnknownUser => !actor.is_authenticated(),
            Principal::Group(g) => actor.is_in_group(g),
        }
    }
}

impl std::fmt::Display for Acl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for (level, principals) in &self.entries {
            if !first {
                f.write_str("|")?;
            }
            first = false;
            write!(f, "{level} ")?;
            for (i, p) in principals.iter().enumerate() {
                if i > 0 {
                    f.write_str(",")?;
                }
                write!(f, "{p}")?;
            }
        }
        Ok(())
    }
}

impl std::str::FromStr for Acl {
    type Err = AclError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Acl::parse(s)
    }
}
