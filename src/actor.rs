//! Requesting-actor identity.
//!
//! Every lifecycle request names the actor performing it. An [`Actor`] carries
//! its identity (or anonymity), explicit group memberships, project
//! memberships, and administrator standing. The permission evaluator in
//! [`crate::perm`] matches these against ACL entries; the lifecycle managers
//! use the admin flags for their bypass rules.

use serde::{Deserialize, Serialize};

use crate::iri::{ActorIri, GroupIri, ProjectIri};

/// The identity and standing of the actor behind a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// `None` for anonymous requests.
    id: Option<ActorIri>,
    groups: Vec<GroupIri>,
    projects: Vec<ProjectIri>,
    admin_projects: Vec<ProjectIri>,
    system_admin: bool,
}

impl Actor {
    /// An authenticated actor with no memberships yet.
    pub fn new(id: ActorIri) -> Self {
        Self {
            id: Some(id),
            groups: Vec::new(),
            projects: Vec::new(),
            admin_projects: Vec::new(),
            system_admin: false,
        }
    }

    /// The anonymous actor.
    pub fn anonymous() -> Self {
        Self {
            id: None,
            groups: Vec::new(),
            projects: Vec::new(),
            admin_projects: Vec::new(),
            system_admin: false,
        }
    }

    /// Add an explicit group membership.
    pub fn with_group(mut self, group: GroupIri) -> Self {
        self.groups.push(group);
        self
    }

    /// Add a project membership.
    pub fn in_project(mut self, project: ProjectIri) -> Self {
        self.projects.push(project);
        self
    }

    /// Grant administrator standing in a project (implies membership).
    pub fn admin_of(mut self, project: ProjectIri) -> Self {
        if !self.projects.contains(&project) {
            self.projects.push(project.clone());
        }
        self.admin_projects.push(project);
        self
    }

    /// Grant system-administrator standing.
    pub fn as_system_admin(mut self) -> Self {
        self.system_admin = true;
        self
    }

    /// The actor's IRI, if authenticated.
    pub fn id(&self) -> Option<&ActorIri> {
        self.id.as_ref()
    }

    /// Whether the actor is authenticated at all.
    pub fn is_authenticated(&self) -> bool {
        self.id.is_some()
    }

    /// Whether the actor belongs to the given explicit group.
    pub fn is_in_group(&self, group: &GroupIri) -> bool {
        self.groups.contains(group)
    }

    /// Whether the actor is a member of the given project.
    pub fn is_member_of(&self, project: &ProjectIri) -> bool {
        self.projects.contains(project)
    }

    /// Whether the actor administers the given project.
    pub fn is_admin_of(&self, project: &ProjectIri) -> bool {
        self.admin_projects.contains(project)
    }

    /// Whether the actor is a system administrator.
    pub fn is_system_admin(&self) -> bool {
        self.system_admin
    }

    /// System admins and project admins may bypass ACL evaluation and the
    /// custom-permission grant ceiling for objects in `project`.
    pub fn can_administer(&self, project: &ProjectIri) -> bool {
        self.system_admin || self.is_admin_of(project)
    }

    /// A display form for error messages and logs.
    pub fn describe(&self) -> String {
        match &self.id {
            Some(iri) => iri.to_string(),
            None => "anonymous".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project() -> ProjectIri {
        ProjectIri::new("http://per-ankh.dev/projects/0001").unwrap()
    }

    #[test]
    fn anonymous_has_no_standing() {
        let a = Actor::anonymous();
        assert!(!a.is_authenticated());
        assert!(!a.is_member_of(&project()));
        assert!(!a.can_administer(&project()));
        assert_eq!(a.describe(), "anonymous");
    }

    #[test]
    fn project_admin_is_also_member() {
        let a = Actor::new(ActorIri::new("http://per-ankh.dev/users/ada").unwrap())
            .admin_of(project());
        assert!(a.is_member_of(&project()));
        assert!(a.is_admin_of(&project()));
        assert!(a.can_administer(&project()));
        assert!(!a.is_system_admin());
    }

    #[test]
    fn system_admin_administers_any_project() {
        let a = Actor::new(ActorIri::new("http://per-ankh.dev/users/root").unwrap())
            .as_system_admin();
        assert!(a.can_administer(&project()));
        assert!(!a.is_member_of(&project()));
    }
}
