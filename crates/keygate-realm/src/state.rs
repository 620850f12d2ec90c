use crate::label::Label;
use crate::well_known::GrantType;
use chrono::{DateTime, Utc};
use jsonwebtoken::jwk::JwkSet;
use serde::{Deserialize, Serialize};
use url::Url;

/// Aggregate state for one realm. `Initial` means no events were persisted;
/// snapshots serialize the full state with the `@type` discriminator.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "@type")]
pub enum RealmState {
    #[default]
    Initial,
    Active(ActiveRealm),
    Deprecated(DeprecatedRealm),
}

/// A realm accepting tokens: carries the resolved endpoints and the public
/// signature keys the verifier uses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveRealm {
    pub id: Label,
    pub rev: u64,
    pub name: String,
    pub open_id_config: Url,
    pub issuer: String,
    pub keys: JwkSet,
    pub grant_types: Vec<GrantType>,
    pub logo: Option<Url>,
    pub authorization_endpoint: Url,
    pub token_endpoint: Url,
    pub userinfo_endpoint: Url,
    pub revocation_endpoint: Option<Url>,
    pub end_session_endpoint: Option<Url>,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub updated_at: DateTime<Utc>,
    pub updated_by: String,
}

/// A frozen realm: rejects tokens and contributes no keys to verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeprecatedRealm {
    pub id: Label,
    pub rev: u64,
    pub name: String,
    pub open_id_config: Url,
    pub logo: Option<Url>,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub updated_at: DateTime<Utc>,
    pub updated_by: String,
}

impl RealmState {
    /// Revision of the last applied event, 0 for `Initial`.
    pub fn rev(&self) -> u64 {
        match self {
            Self::Initial => 0,
            Self::Active(realm) => realm.rev,
            Self::Deprecated(realm) => realm.rev,
        }
    }

    pub fn id(&self) -> Option<&Label> {
        match self {
            Self::Initial => None,
            Self::Active(realm) => Some(&realm.id),
            Self::Deprecated(realm) => Some(&realm.id),
        }
    }

    pub fn is_initial(&self) -> bool {
        matches!(self, Self::Initial)
    }

    pub fn is_deprecated(&self) -> bool {
        matches!(self, Self::Deprecated(_))
    }
}
