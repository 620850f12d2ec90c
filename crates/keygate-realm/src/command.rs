use crate::label::Label;
use serde::{Deserialize, Serialize};
use url::Url;
use utoipa::ToSchema;

/// User-supplied realm definition, shared by create and update. The issuer,
/// endpoints, and keys come from resolving `open_id_config`, never from the
/// client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RealmFields {
    pub name: String,
    pub open_id_config: Url,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<Url>,
}

/// Commands accepted by the realm aggregate. `rev` is the optimistic
/// concurrency token: it must equal the current revision.
#[derive(Debug, Clone, PartialEq)]
pub enum RealmCommand {
    Create {
        id: Label,
        fields: RealmFields,
        subject: String,
    },
    Update {
        id: Label,
        rev: u64,
        fields: RealmFields,
        subject: String,
    },
    Deprecate {
        id: Label,
        rev: u64,
        subject: String,
    },
}

impl RealmCommand {
    pub fn id(&self) -> &Label {
        match self {
            Self::Create { id, .. } | Self::Update { id, .. } | Self::Deprecate { id, .. } => id,
        }
    }
}
