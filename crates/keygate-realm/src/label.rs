use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

/// Realm identifier: 1 to 32 characters drawn from `[A-Za-z0-9_-]`.
///
/// The label is the aggregate identity and the shard key, so validation
/// happens once at construction and the inner string never changes.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(try_from = "String", into = "String")]
pub struct Label(#[schema(value_type = String)] String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("illegal label {0:?}: expected 1 to 32 characters from [A-Za-z0-9_-]")]
pub struct IllegalLabel(pub String);

impl Label {
    pub fn new(value: impl Into<String>) -> Result<Self, IllegalLabel> {
        let value = value.into();
        let valid = !value.is_empty()
            && value.len() <= 32
            && value
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
        if valid {
            Ok(Self(value))
        } else {
            Err(IllegalLabel(value))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Label {
    type Error = IllegalLabel;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Label> for String {
    fn from(label: Label) -> Self {
        label.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_labels() {
        for raw in ["google", "bbp-dev", "a", "realm_01", "A-Z_09"] {
            let label = Label::new(raw).expect("label");
            assert_eq!(label.as_str(), raw);
            assert_eq!(label.to_string(), raw);
        }
    }

    #[test]
    fn rejects_invalid_labels() {
        for raw in ["", "with space", "slash/realm", "über", &"x".repeat(33)] {
            assert!(Label::new(raw).is_err(), "expected rejection for {raw:?}");
        }
    }

    #[test]
    fn serde_round_trip_validates() {
        let label: Label = serde_json::from_str("\"google\"").expect("label");
        assert_eq!(serde_json::to_string(&label).expect("json"), "\"google\"");

        let err = serde_json::from_str::<Label>("\"not a label\"");
        assert!(err.is_err());
    }
}
