//! Caller identity model.
//!
//! # Purpose
//! Normalizes a verified token (or its absence) into the identity set used by
//! ACL evaluation: the subject plus everything it can act as.

use keygate_realm::Label;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A single identity derived from an access token, or `Anonymous` when no
/// credentials were presented.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(tag = "@type")]
pub enum Identity {
    Anonymous,
    Authenticated { realm: Label },
    User { subject: String, realm: Label },
    Group { group: String, realm: Label },
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => f.write_str("anonymous"),
            Self::Authenticated { realm } => write!(f, "realm:{realm}"),
            Self::User { subject, .. } => f.write_str(subject),
            Self::Group { group, realm } => write!(f, "group:{realm}/{group}"),
        }
    }
}

/// The authenticated principal plus its derived identities. Value object
/// scoped to a single request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub subject: Identity,
    pub identities: BTreeSet<Identity>,
}

impl Caller {
    /// Caller for requests carrying no credentials.
    pub fn anonymous() -> Self {
        Self {
            subject: Identity::Anonymous,
            identities: BTreeSet::from([Identity::Anonymous]),
        }
    }

    /// Caller for a verified token: the user subject plus the anonymous and
    /// authenticated-realm identities, and one group identity per group.
    pub fn authenticated(
        subject: impl Into<String>,
        realm: Label,
        groups: impl IntoIterator<Item = String>,
    ) -> Self {
        let subject = Identity::User {
            subject: subject.into(),
            realm: realm.clone(),
        };
        let mut identities = BTreeSet::from([
            Identity::Anonymous,
            subject.clone(),
            Identity::Authenticated {
                realm: realm.clone(),
            },
        ]);
        identities.extend(groups.into_iter().map(|group| Identity::Group {
            group,
            realm: realm.clone(),
        }));
        Self {
            subject,
            identities,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.subject == Identity::Anonymous
    }

    /// Rendering of the subject used as the `subject` stamped on events.
    pub fn subject_name(&self) -> String {
        self.subject.to_string()
    }
}
