//! ACL collaborator seam.
//!
//! # Purpose
//! The realm subsystem only consumes `has_permission`; the ACL tree itself is
//! managed elsewhere. The in-memory implementation covers development and
//! tests: grants attach identities with permission sets to paths, and a check
//! on a path also consults every ancestor up to the root.

use crate::error::IamError;
use async_trait::async_trait;
use keygate_auth::{Caller, Identity};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

#[async_trait]
pub trait Acls: Send + Sync {
    /// Whether `caller` holds `permission` on `path` or any ancestor path.
    async fn has_permission(
        &self,
        path: &str,
        permission: &str,
        caller: &Caller,
    ) -> Result<bool, IamError>;
}

/// In-memory ACL tree. With `open` set, every caller is granted everything;
/// that is the development default, mirroring an unbootstrapped deployment.
pub struct InMemoryAcls {
    open: bool,
    grants: RwLock<HashMap<String, Vec<(Identity, HashSet<String>)>>>,
}

impl InMemoryAcls {
    pub fn new(open: bool) -> Self {
        Self {
            open,
            grants: RwLock::new(HashMap::new()),
        }
    }

    pub async fn grant(
        &self,
        path: impl Into<String>,
        identity: Identity,
        permissions: impl IntoIterator<Item = &str>,
    ) {
        let permissions: HashSet<String> =
            permissions.into_iter().map(str::to_string).collect();
        let mut grants = self.grants.write().await;
        let entries = grants.entry(path.into()).or_default();
        if let Some((_, existing)) = entries.iter_mut().find(|(who, _)| *who == identity) {
            existing.extend(permissions);
        } else {
            entries.push((identity, permissions));
        }
    }
}

#[async_trait]
impl Acls for InMemoryAcls {
    async fn has_permission(
        &self,
        path: &str,
        permission: &str,
        caller: &Caller,
    ) -> Result<bool, IamError> {
        if self.open {
            return Ok(true);
        }
        let grants = self.grants.read().await;
        for ancestor in ancestors(path) {
            if let Some(entries) = grants.get(ancestor) {
                let granted = entries.iter().any(|(identity, permissions)| {
                    permissions.contains(permission) && caller.identities.contains(identity)
                });
                if granted {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }
}

/// The path and all its ancestors, root last: `/a/b` -> `/a/b`, `/a`, `/`.
fn ancestors(path: &str) -> Vec<&str> {
    let mut result = vec![path];
    let mut current = path;
    while let Some(split) = current.rfind('/') {
        if split == 0 {
            if current != "/" {
                result.push("/");
            }
            break;
        }
        current = &current[..split];
        result.push(current);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use keygate_realm::Label;

    fn label(raw: &str) -> Label {
        Label::new(raw).expect("label")
    }

    #[test]
    fn ancestors_walk_to_the_root() {
        assert_eq!(ancestors("/realms/google"), vec!["/realms/google", "/realms", "/"]);
        assert_eq!(ancestors("/realms"), vec!["/realms", "/"]);
        assert_eq!(ancestors("/"), vec!["/"]);
    }

    #[tokio::test]
    async fn open_acls_allow_everything() {
        let acls = InMemoryAcls::new(true);
        let allowed = acls
            .has_permission("/realms", "realms/write", &Caller::anonymous())
            .await
            .expect("check");
        assert!(allowed);
    }

    #[tokio::test]
    async fn grants_match_caller_identities() {
        let acls = InMemoryAcls::new(false);
        acls.grant(
            "/realms",
            Identity::Group {
                group: "admins".to_string(),
                realm: label("internal"),
            },
            ["realms/write", "realms/read"],
        )
        .await;

        let admin = Caller::authenticated("alice", label("internal"), vec!["admins".to_string()]);
        assert!(
            acls.has_permission("/realms", "realms/write", &admin)
                .await
                .expect("check")
        );

        let outsider = Caller::authenticated("bob", label("internal"), Vec::new());
        assert!(
            !acls
                .has_permission("/realms", "realms/write", &outsider)
                .await
                .expect("check")
        );
        assert!(
            !acls
                .has_permission("/realms", "realms/write", &Caller::anonymous())
                .await
                .expect("check")
        );
    }

    #[tokio::test]
    async fn root_grants_apply_to_nested_paths() {
        let acls = InMemoryAcls::new(false);
        acls.grant("/", Identity::Anonymous, ["realms/read"]).await;

        assert!(
            acls.has_permission("/realms", "realms/read", &Caller::anonymous())
                .await
                .expect("check")
        );
        assert!(
            !acls
                .has_permission("/realms", "realms/write", &Caller::anonymous())
                .await
                .expect("check")
        );
    }
}
