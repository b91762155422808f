use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use lowcode_core::{ANONYMOUS_PRINCIPAL, Principal};

/// Concrete permission attached to a governed entity.
///
/// Serialized as `"{capability}:{collection}"`, e.g. `"manage:applications"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Permission {
    #[serde(rename = "manage:applications")]
    ManageApplications,
    #[serde(rename = "read:applications")]
    ReadApplications,
    #[serde(rename = "manage:pages")]
    ManagePages,
    #[serde(rename = "read:pages")]
    ReadPages,
    #[serde(rename = "manage:actions")]
    ManageActions,
    #[serde(rename = "read:actions")]
    ReadActions,
    #[serde(rename = "execute:actions")]
    ExecuteActions,
    #[serde(rename = "manage:datasources")]
    ManageDatasources,
    #[serde(rename = "read:datasources")]
    ReadDatasources,
    #[serde(rename = "execute:datasources")]
    ExecuteDatasources,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::ManageApplications => "manage:applications",
            Permission::ReadApplications => "read:applications",
            Permission::ManagePages => "manage:pages",
            Permission::ReadPages => "read:pages",
            Permission::ManageActions => "manage:actions",
            Permission::ReadActions => "read:actions",
            Permission::ExecuteActions => "execute:actions",
            Permission::ManageDatasources => "manage:datasources",
            Permission::ReadDatasources => "read:datasources",
            Permission::ExecuteDatasources => "execute:datasources",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind-independent capability. Each entity kind maps it to its own
/// [`Permission`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Manage,
    Read,
    Execute,
}

/// Kinds of governed entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Application,
    Page,
    Action,
    ActionCollection,
    Datasource,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Application => "application",
            EntityKind::Page => "page",
            EntityKind::Action => "action",
            EntityKind::ActionCollection => "action collection",
            EntityKind::Datasource => "datasource",
        }
    }

    /// Capabilities this kind carries policies for.
    pub fn capabilities(&self) -> &'static [Capability] {
        match self {
            EntityKind::Application | EntityKind::Page => &[Capability::Manage, Capability::Read],
            EntityKind::Action | EntityKind::ActionCollection | EntityKind::Datasource => {
                &[Capability::Manage, Capability::Read, Capability::Execute]
            }
        }
    }

    /// Concrete permission for a capability, or None when the kind does
    /// not support it (Application/Page have no EXECUTE).
    pub fn permission_for(&self, capability: Capability) -> Option<Permission> {
        use Capability::*;
        use Permission::*;
        match (self, capability) {
            (EntityKind::Application, Manage) => Some(ManageApplications),
            (EntityKind::Application, Read) => Some(ReadApplications),
            (EntityKind::Page, Manage) => Some(ManagePages),
            (EntityKind::Page, Read) => Some(ReadPages),
            (EntityKind::Action | EntityKind::ActionCollection, Manage) => Some(ManageActions),
            (EntityKind::Action | EntityKind::ActionCollection, Read) => Some(ReadActions),
            (EntityKind::Action | EntityKind::ActionCollection, Execute) => Some(ExecuteActions),
            (EntityKind::Datasource, Manage) => Some(ManageDatasources),
            (EntityKind::Datasource, Read) => Some(ReadDatasources),
            (EntityKind::Datasource, Execute) => Some(ExecuteDatasources),
            (EntityKind::Application | EntityKind::Page, Execute) => None,
        }
    }

    /// Capability granted to ANONYMOUS when the owning application is public.
    pub fn public_capability(&self) -> Capability {
        match self {
            EntityKind::Application | EntityKind::Page => Capability::Read,
            _ => Capability::Execute,
        }
    }

    pub fn public_permission(&self) -> Permission {
        match self {
            EntityKind::Application => Permission::ReadApplications,
            EntityKind::Page => Permission::ReadPages,
            EntityKind::Action | EntityKind::ActionCollection => Permission::ExecuteActions,
            EntityKind::Datasource => Permission::ExecuteDatasources,
        }
    }
}

/// Serialized form of one entry in a [`PolicySet`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub permission: Permission,
    #[serde(default)]
    pub subjects: BTreeSet<String>,
}

/// Permission → subjects mapping. At most one entry per permission.
///
/// Entries are never removed: revoking the last subject leaves an empty
/// policy behind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Policy>", into = "Vec<Policy>")]
pub struct PolicySet(BTreeMap<Permission, BTreeSet<String>>);

impl From<Vec<Policy>> for PolicySet {
    fn from(policies: Vec<Policy>) -> Self {
        let mut set = PolicySet::default();
        for policy in policies {
            set.0.entry(policy.permission).or_default().extend(policy.subjects);
        }
        set
    }
}

impl From<PolicySet> for Vec<Policy> {
    fn from(set: PolicySet) -> Self {
        set.0
            .into_iter()
            .map(|(permission, subjects)| Policy { permission, subjects })
            .collect()
    }
}

impl PolicySet {
    /// Policies for a freshly created entity: the owner holds every
    /// capability the kind supports.
    pub fn for_owner(kind: EntityKind, owner_id: &str) -> Self {
        let mut set = PolicySet::default();
        set.grant_all(kind, owner_id);
        set
    }

    /// Grant `subject` every permission the kind supports.
    pub fn grant_all(&mut self, kind: EntityKind, subject: &str) {
        for &capability in kind.capabilities() {
            if let Some(permission) = kind.permission_for(capability) {
                self.grant(permission, &[subject]);
            }
        }
    }

    /// Policies for a child entity derived from its parent's.
    ///
    /// Named subjects carry over capability by capability (EXECUTE falls
    /// back to the parent's READ). ANONYMOUS is only granted the child's
    /// public permission, and only when the parent is public.
    pub fn inherit(parent: &PolicySet, parent_kind: EntityKind, child_kind: EntityKind) -> Self {
        let mut set = PolicySet::default();
        for &capability in child_kind.capabilities() {
            let Some(child_permission) = child_kind.permission_for(capability) else {
                continue;
            };
            let source = parent_kind.permission_for(capability).or_else(|| {
                (capability == Capability::Execute)
                    .then(|| parent_kind.permission_for(Capability::Read))
                    .flatten()
            });
            let subjects = source
                .and_then(|p| parent.subjects(p))
                .map(|s| {
                    s.iter()
                        .filter(|id| id.as_str() != ANONYMOUS_PRINCIPAL)
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();
            set.0.insert(child_permission, subjects);
        }
        if parent.contains(parent_kind.public_permission(), ANONYMOUS_PRINCIPAL) {
            set.grant(child_kind.public_permission(), &[ANONYMOUS_PRINCIPAL]);
        }
        set
    }

    /// Union `principals` into the permission's subjects, creating the
    /// policy if absent. Returns whether any subject was added.
    pub fn grant(&mut self, permission: Permission, principals: &[&str]) -> bool {
        let subjects = self.0.entry(permission).or_default();
        let mut changed = false;
        for principal in principals {
            changed |= subjects.insert((*principal).to_string());
        }
        changed
    }

    /// Remove `principals` from the permission's subjects. The policy
    /// itself stays even when emptied. Returns whether any subject was removed.
    pub fn revoke(&mut self, permission: Permission, principals: &[&str]) -> bool {
        let Some(subjects) = self.0.get_mut(&permission) else {
            return false;
        };
        principals
            .iter()
            .fold(false, |changed, principal| subjects.remove(*principal) | changed)
    }

    pub fn subjects(&self, permission: Permission) -> Option<&BTreeSet<String>> {
        self.0.get(&permission)
    }

    pub fn has_policy(&self, permission: Permission) -> bool {
        self.0.contains_key(&permission)
    }

    pub fn contains(&self, permission: Permission, subject: &str) -> bool {
        self.0.get(&permission).is_some_and(|s| s.contains(subject))
    }

    /// Whether `principal` holds `permission`, directly or through ANONYMOUS.
    pub fn allows(&self, permission: Permission, principal: &Principal) -> bool {
        self.contains(permission, &principal.id) || self.contains(permission, ANONYMOUS_PRINCIPAL)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Permission, &BTreeSet<String>)> {
        self.0.iter().map(|(p, s)| (*p, s))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Shared access to an entity's policies. Propagation and cloning work
/// against this capability instead of the concrete entity types.
pub trait PolicyHolder {
    fn kind(&self) -> EntityKind;
    fn policies(&self) -> &PolicySet;
    fn policies_mut(&mut self) -> &mut PolicySet;

    fn grant(&mut self, permission: Permission, principals: &[&str]) -> bool {
        self.policies_mut().grant(permission, principals)
    }

    fn revoke(&mut self, permission: Permission, principals: &[&str]) -> bool {
        self.policies_mut().revoke(permission, principals)
    }

    /// Concrete permission this entity uses for `capability`.
    fn policies_for(&self, capability: Capability) -> Option<Permission> {
        self.kind().permission_for(capability)
    }

    /// Grant or revoke ANONYMOUS on the kind's public permission only.
    /// Returns whether the policies changed.
    fn set_public(&mut self, public: bool) -> bool {
        let permission = self.kind().public_permission();
        if public {
            self.grant(permission, &[ANONYMOUS_PRINCIPAL])
        } else {
            self.revoke(permission, &[ANONYMOUS_PRINCIPAL])
        }
    }

    fn is_public(&self) -> bool {
        self.policies()
            .contains(self.kind().public_permission(), ANONYMOUS_PRINCIPAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Holder(EntityKind, PolicySet);

    impl PolicyHolder for Holder {
        fn kind(&self) -> EntityKind {
            self.0
        }
        fn policies(&self) -> &PolicySet {
            &self.1
        }
        fn policies_mut(&mut self) -> &mut PolicySet {
            &mut self.1
        }
    }

    #[test]
    fn grant_and_revoke_are_idempotent() {
        let mut set = PolicySet::default();
        assert!(set.grant(Permission::ReadPages, &["alice", "bob"]));
        assert!(!set.grant(Permission::ReadPages, &["alice"]));
        assert_eq!(set.subjects(Permission::ReadPages).unwrap().len(), 2);

        assert!(set.revoke(Permission::ReadPages, &["alice", "bob"]));
        assert!(!set.revoke(Permission::ReadPages, &["alice"]));
        // Emptied policy is kept.
        assert!(set.has_policy(Permission::ReadPages));
        assert!(set.subjects(Permission::ReadPages).unwrap().is_empty());

        // Revoking from an absent policy does not create it.
        assert!(!set.revoke(Permission::ManagePages, &["alice"]));
        assert!(!set.has_policy(Permission::ManagePages));
    }

    #[test]
    fn owner_policies_per_kind() {
        let app = PolicySet::for_owner(EntityKind::Application, "api_user");
        assert_eq!(app.len(), 2);
        assert!(app.contains(Permission::ManageApplications, "api_user"));
        assert!(app.contains(Permission::ReadApplications, "api_user"));

        let ds = PolicySet::for_owner(EntityKind::Datasource, "api_user");
        assert_eq!(ds.len(), 3);
        assert!(ds.contains(Permission::ExecuteDatasources, "api_user"));
    }

    #[test]
    fn capability_mapping() {
        assert_eq!(EntityKind::Application.permission_for(Capability::Execute), None);
        assert_eq!(
            EntityKind::ActionCollection.permission_for(Capability::Execute),
            Some(Permission::ExecuteActions)
        );
        assert_eq!(EntityKind::Page.public_permission(), Permission::ReadPages);
        assert_eq!(EntityKind::Datasource.public_capability(), Capability::Execute);
    }

    #[test]
    fn allows_through_anonymous() {
        let mut set = PolicySet::for_owner(EntityKind::Page, "owner");
        let stranger = Principal::new("stranger");
        assert!(!set.allows(Permission::ReadPages, &stranger));

        set.grant(Permission::ReadPages, &[ANONYMOUS_PRINCIPAL]);
        assert!(set.allows(Permission::ReadPages, &stranger));
        assert!(!set.allows(Permission::ManagePages, &stranger));
    }

    #[test]
    fn inherit_maps_capabilities_and_strips_anonymous() {
        let mut page = PolicySet::for_owner(EntityKind::Page, "owner");
        page.grant(Permission::ReadPages, &["viewer"]);

        let action = PolicySet::inherit(&page, EntityKind::Page, EntityKind::Action);
        assert!(action.contains(Permission::ManageActions, "owner"));
        assert!(action.contains(Permission::ReadActions, "viewer"));
        // EXECUTE falls back to the parent's READ.
        assert!(action.contains(Permission::ExecuteActions, "viewer"));
        assert!(!action.contains(Permission::ExecuteActions, ANONYMOUS_PRINCIPAL));

        page.grant(Permission::ReadPages, &[ANONYMOUS_PRINCIPAL]);
        let action = PolicySet::inherit(&page, EntityKind::Page, EntityKind::Action);
        assert!(action.contains(Permission::ExecuteActions, ANONYMOUS_PRINCIPAL));
        assert!(!action.contains(Permission::ReadActions, ANONYMOUS_PRINCIPAL));
    }

    #[test]
    fn set_public_touches_only_public_permission() {
        let mut holder = Holder(
            EntityKind::Action,
            PolicySet::for_owner(EntityKind::Action, "owner"),
        );
        assert!(holder.set_public(true));
        assert!(!holder.set_public(true));
        assert!(holder.is_public());
        assert!(!holder.policies().contains(Permission::ReadActions, ANONYMOUS_PRINCIPAL));

        assert!(holder.set_public(false));
        assert!(!holder.is_public());
        assert!(holder.policies().contains(Permission::ManageActions, "owner"));
        assert_eq!(holder.policies_for(Capability::Read), Some(Permission::ReadActions));
    }

    #[test]
    fn serializes_as_policy_list() {
        let set = PolicySet::for_owner(EntityKind::Application, "api_user");
        let json = serde_json::to_value(&set).unwrap();
        assert_eq!(
            json,
            serde_json::json!([
                {"permission": "manage:applications", "subjects": ["api_user"]},
                {"permission": "read:applications", "subjects": ["api_user"]},
            ])
        );
        let back: PolicySet = serde_json::from_value(json).unwrap();
        assert_eq!(back, set);
    }
}
