use crate::label::Label;
use crate::well_known::GrantType;
use chrono::{DateTime, Utc};
use jsonwebtoken::jwk::JwkSet;
use serde::{Deserialize, Serialize};
use url::Url;

/// Journal events for the realm aggregate. Revisions start at 1 and grow by
/// exactly one per persisted event; the `@type` tag is the journal codec's
/// discriminator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "@type")]
pub enum RealmEvent {
    RealmCreated(RealmChangeData),
    RealmUpdated(RealmChangeData),
    RealmDeprecated {
        id: Label,
        rev: u64,
        instant: DateTime<Utc>,
        subject: String,
    },
}

/// Payload shared by `RealmCreated` and `RealmUpdated`: the full realm
/// definition at that revision, including the resolved well-known material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealmChangeData {
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
    pub instant: DateTime<Utc>,
    pub subject: String,
}

impl RealmEvent {
    pub fn id(&self) -> &Label {
        match self {
            Self::RealmCreated(data) | Self::RealmUpdated(data) => &data.id,
            Self::RealmDeprecated { id, .. } => id,
        }
    }

    pub fn rev(&self) -> u64 {
        match self {
            Self::RealmCreated(data) | Self::RealmUpdated(data) => data.rev,
            Self::RealmDeprecated { rev, .. } => *rev,
        }
    }

    pub fn instant(&self) -> DateTime<Utc> {
        match self {
            Self::RealmCreated(data) | Self::RealmUpdated(data) => data.instant,
            Self::RealmDeprecated { instant, .. } => *instant,
        }
    }

    pub fn subject(&self) -> &str {
        match self {
            Self::RealmCreated(data) | Self::RealmUpdated(data) => &data.subject,
            Self::RealmDeprecated { subject, .. } => subject,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::change_data;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn events_round_trip_through_the_journal_codec() {
        let events = vec![
            RealmEvent::RealmCreated(change_data("google", 1)),
            RealmEvent::RealmUpdated(change_data("google", 2)),
            RealmEvent::RealmDeprecated {
                id: Label::new("google").expect("label"),
                rev: 3,
                instant: Utc.with_ymd_and_hms(2024, 6, 2, 12, 0, 0).unwrap(),
                subject: "alice".to_string(),
            },
        ];

        for event in events {
            let payload = serde_json::to_value(&event).expect("encode");
            let decoded: RealmEvent = serde_json::from_value(payload).expect("decode");
            assert_eq!(decoded, event);
        }
    }

    #[test]
    fn events_carry_the_type_discriminator() {
        let payload =
            serde_json::to_value(RealmEvent::RealmCreated(change_data("google", 1))).expect("json");
        assert_eq!(payload["@type"], json!("RealmCreated"));
        assert_eq!(payload["rev"], json!(1));
    }
}
