use crate::label::Label;
use crate::state::RealmState;
use crate::well_known::GrantType;
use chrono::{DateTime, Utc};
use jsonwebtoken::jwk::JwkSet;
use serde::{Deserialize, Serialize};
use url::Url;
use utoipa::ToSchema;

/// Type identifier attached to every realm resource.
pub const REALM_TYPE: &str = "nxv:Realm";

/// Read-model projection of a current (active or deprecated) realm, as stored
/// in the index and rendered by the HTTP API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RealmResource {
    pub id: Label,
    pub rev: u64,
    pub types: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub updated_at: DateTime<Utc>,
    pub updated_by: String,
    pub deprecated: bool,
    pub value: RealmProjection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum RealmProjection {
    Active(ActiveProjection),
    Deprecated(DeprecatedProjection),
}

/// Full realm definition published for active realms; the token verifier
/// pulls `issuer` and `keys` from here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ActiveProjection {
    pub name: String,
    pub open_id_config: Url,
    pub issuer: String,
    #[schema(value_type = Object)]
    pub keys: JwkSet,
    pub grant_types: Vec<GrantType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<Url>,
    pub authorization_endpoint: Url,
    pub token_endpoint: Url,
    pub userinfo_endpoint: Url,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revocation_endpoint: Option<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_session_endpoint: Option<Url>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeprecatedProjection {
    pub name: String,
    pub open_id_config: Url,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<Url>,
}

impl RealmState {
    /// Project the state into its read-model resource, `None` for `Initial`.
    pub fn to_resource(&self) -> Option<RealmResource> {
        match self {
            Self::Initial => None,
            Self::Active(realm) => Some(RealmResource {
                id: realm.id.clone(),
                rev: realm.rev,
                types: vec![REALM_TYPE.to_string()],
                created_at: realm.created_at,
                created_by: realm.created_by.clone(),
                updated_at: realm.updated_at,
                updated_by: realm.updated_by.clone(),
                deprecated: false,
                value: RealmProjection::Active(ActiveProjection {
                    name: realm.name.clone(),
                    open_id_config: realm.open_id_config.clone(),
                    issuer: realm.issuer.clone(),
                    keys: realm.keys.clone(),
                    grant_types: realm.grant_types.clone(),
                    logo: realm.logo.clone(),
                    authorization_endpoint: realm.authorization_endpoint.clone(),
                    token_endpoint: realm.token_endpoint.clone(),
                    userinfo_endpoint: realm.userinfo_endpoint.clone(),
                    revocation_endpoint: realm.revocation_endpoint.clone(),
                    end_session_endpoint: realm.end_session_endpoint.clone(),
                }),
            }),
            Self::Deprecated(realm) => Some(RealmResource {
                id: realm.id.clone(),
                rev: realm.rev,
                types: vec![REALM_TYPE.to_string()],
                created_at: realm.created_at,
                created_by: realm.created_by.clone(),
                updated_at: realm.updated_at,
                updated_by: realm.updated_by.clone(),
                deprecated: true,
                value: RealmProjection::Deprecated(DeprecatedProjection {
                    name: realm.name.clone(),
                    open_id_config: realm.open_id_config.clone(),
                    logo: realm.logo.clone(),
                }),
            }),
        }
    }
}

impl RealmResource {
    /// The issuer of an active realm; deprecated realms never contribute one.
    pub fn issuer(&self) -> Option<&str> {
        match &self.value {
            RealmProjection::Active(projection) => Some(&projection.issuer),
            RealmProjection::Deprecated(_) => None,
        }
    }

    pub fn keys(&self) -> Option<&JwkSet> {
        match &self.value {
            RealmProjection::Active(projection) => Some(&projection.keys),
            RealmProjection::Deprecated(_) => None,
        }
    }
}
