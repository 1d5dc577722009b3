//! Authorization module - capability rules, policy strategies and the route gate
//!
//! Routes declare an [`AccessRule`] made of up to three requirements:
//! - the coarse admin flag stored on the user record
//! - any-of role slugs
//! - any-of permission slugs (usually built from a [`Capability`])
//!
//! Each requirement is checked by a [`CapabilityPolicy`] strategy, and the gate
//! middleware runs them all before the handler executes.

mod evaluator;
mod middleware;
mod principal;

pub use evaluator::{authorize, AdminFlagPolicy, CapabilityPolicy, Decision, RoleGraphPolicy};
pub use middleware::{enforce, gate, Gate};
pub use principal::Principal;

/// Well-known role slugs
pub mod roles {
    pub const SUPER_ADMIN: &str = "super-admin";
    pub const ADMIN: &str = "admin";
    pub const EDITOR: &str = "editor";
    pub const VIEWER: &str = "viewer";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    View,
    Create,
    Edit,
    Delete,
}

impl Action {
    pub const ALL: [Action; 4] = [Action::View, Action::Create, Action::Edit, Action::Delete];

    pub fn as_str(self) -> &'static str {
        match self {
            Action::View => "view",
            Action::Create => "create",
            Action::Edit => "edit",
            Action::Delete => "delete",
        }
    }
}

/// Resource-type tags that permissions are granted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    User,
    Request,
    Complaint,
    Resource,
    Commissioner,
    News,
    Settings,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 7] = [
        ResourceKind::User,
        ResourceKind::Request,
        ResourceKind::Complaint,
        ResourceKind::Resource,
        ResourceKind::Commissioner,
        ResourceKind::News,
        ResourceKind::Settings,
    ];

    pub fn singular(self) -> &'static str {
        match self {
            ResourceKind::User => "user",
            ResourceKind::Request => "request",
            ResourceKind::Complaint => "complaint",
            ResourceKind::Resource => "resource",
            ResourceKind::Commissioner => "commissioner",
            ResourceKind::News => "news",
            ResourceKind::Settings => "settings",
        }
    }

    pub fn plural(self) -> &'static str {
        match self {
            ResourceKind::User => "users",
            ResourceKind::Request => "requests",
            ResourceKind::Complaint => "complaints",
            ResourceKind::Resource => "resources",
            ResourceKind::Commissioner => "commissioners",
            ResourceKind::News => "news",
            ResourceKind::Settings => "settings",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ResourceKind::User => "User",
            ResourceKind::Request => "Request",
            ResourceKind::Complaint => "Complaint",
            ResourceKind::Resource => "Resource",
            ResourceKind::Commissioner => "Commissioner",
            ResourceKind::News => "News",
            ResourceKind::Settings => "Settings",
        }
    }
}

/// An (action, resource-type) pair, rendered as a permission slug.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Capability {
    pub action: Action,
    pub resource: ResourceKind,
}

impl Capability {
    pub const fn new(action: Action, resource: ResourceKind) -> Self {
        Self { action, resource }
    }

    /// `view-<plural>` for reads, `<action>-<singular>` otherwise.
    pub fn slug(&self) -> String {
        match self.action {
            Action::View => format!("view-{}", self.resource.plural()),
            action => format!("{}-{}", action.as_str(), self.resource.singular()),
        }
    }

    pub fn title(&self) -> String {
        let verb = match self.action {
            Action::View => "View",
            Action::Create => "Create",
            Action::Edit => "Edit",
            Action::Delete => "Delete",
        };
        format!("{verb} {}", self.resource.label())
    }

    pub fn all() -> impl Iterator<Item = Capability> {
        ResourceKind::ALL
            .into_iter()
            .flat_map(|resource| Action::ALL.into_iter().map(move |action| Capability::new(action, resource)))
    }
}

/// Per-route access requirements. Empty means "authenticated only".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessRule {
    pub admin_flag: bool,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
}

impl AccessRule {
    pub fn authenticated() -> Self {
        Self::default()
    }

    pub fn admin() -> Self {
        Self {
            admin_flag: true,
            ..Self::default()
        }
    }

    pub fn roles<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::default().with_roles(roles)
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles.extend(roles.into_iter().map(Into::into));
        self
    }

    pub fn with_permissions<I, S>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.permissions.extend(permissions.into_iter().map(Into::into));
        self
    }

    pub fn with_capability(self, action: Action, resource: ResourceKind) -> Self {
        self.with_permissions([Capability::new(action, resource).slug()])
    }

    pub fn is_authentication_only(&self) -> bool {
        !self.admin_flag && self.roles.is_empty() && self.permissions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_slugs_follow_seed_naming() {
        assert_eq!(Capability::new(Action::View, ResourceKind::User).slug(), "view-users");
        assert_eq!(Capability::new(Action::Edit, ResourceKind::Resource).slug(), "edit-resource");
        assert_eq!(Capability::new(Action::Delete, ResourceKind::News).slug(), "delete-news");
        assert_eq!(Capability::new(Action::View, ResourceKind::Settings).slug(), "view-settings");
    }

    #[test]
    fn every_capability_is_distinct() {
        let slugs: std::collections::HashSet<String> = Capability::all().map(|c| c.slug()).collect();
        assert_eq!(slugs.len(), ResourceKind::ALL.len() * Action::ALL.len());
    }

    #[test]
    fn empty_rule_only_requires_identity() {
        assert!(AccessRule::authenticated().is_authentication_only());
        assert!(!AccessRule::admin().is_authentication_only());
        assert!(!AccessRule::roles([roles::ADMIN]).is_authentication_only());
    }
}
