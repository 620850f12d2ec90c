//! Realm state machine: pure event application and command evaluation.
//!
//! `next` is total so journal replay is idempotent regardless of how the
//! event list is grouped; `evaluate` is the only place domain validity is
//! decided, and reads the clock exactly once per command.

use crate::clock::Clock;
use crate::command::{RealmCommand, RealmFields};
use crate::event::{RealmChangeData, RealmEvent};
use crate::label::Label;
use crate::rejection::RealmRejection;
use crate::state::{ActiveRealm, DeprecatedRealm, RealmState};
use crate::well_known::WellKnownResolver;
use chrono::{DateTime, Utc};

/// Capabilities injected into command evaluation; tests supply fixed clocks
/// and in-memory directories.
pub struct EvaluationDeps<'a> {
    pub clock: &'a dyn Clock,
    pub resolver: &'a WellKnownResolver,
    pub issuers: &'a dyn IssuerDirectory,
}

/// Lookup keeping issuers globally unique across active realms: a create or
/// update whose resolved issuer is already claimed by a different realm is
/// rejected before any event is produced.
pub trait IssuerDirectory: Send + Sync {
    /// The label of a realm other than `requester` currently claiming
    /// `issuer`, if any.
    fn claimed_by(&self, issuer: &str, requester: &Label) -> Option<Label>;
}

impl IssuerDirectory for std::collections::HashMap<String, Label> {
    fn claimed_by(&self, issuer: &str, requester: &Label) -> Option<Label> {
        self.get(issuer).filter(|label| *label != requester).cloned()
    }
}

/// Apply `event` to `state`. Combinations outside the realm lifecycle return
/// the state unchanged.
pub fn next(state: RealmState, event: RealmEvent) -> RealmState {
    match (state, event) {
        (RealmState::Initial, RealmEvent::RealmCreated(data)) => {
            RealmState::Active(active_from(data, None))
        }
        (RealmState::Active(current), RealmEvent::RealmUpdated(data)) => {
            RealmState::Active(active_from(data, Some((current.created_at, current.created_by))))
        }
        // An update on a deprecated realm revives it.
        (RealmState::Deprecated(current), RealmEvent::RealmUpdated(data)) => {
            RealmState::Active(active_from(data, Some((current.created_at, current.created_by))))
        }
        (
            RealmState::Active(current),
            RealmEvent::RealmDeprecated {
                rev,
                instant,
                subject,
                ..
            },
        ) => RealmState::Deprecated(DeprecatedRealm {
            id: current.id,
            rev,
            name: current.name,
            open_id_config: current.open_id_config,
            logo: current.logo,
            created_at: current.created_at,
            created_by: current.created_by,
            updated_at: instant,
            updated_by: subject,
        }),
        (state, _) => state,
    }
}

/// Evaluate `command` against `state`, producing the event to persist or the
/// rejection. Authorization happens at the facade; this function is about
/// domain validity only.
pub async fn evaluate(
    deps: &EvaluationDeps<'_>,
    state: &RealmState,
    command: RealmCommand,
) -> Result<RealmEvent, RealmRejection> {
    let instant = deps.clock.now();
    match (state, command) {
        (RealmState::Initial, RealmCommand::Create { id, fields, subject }) => {
            resolve_change(deps, id, 1, fields, subject, instant)
                .await
                .map(RealmEvent::RealmCreated)
        }
        (
            RealmState::Initial,
            RealmCommand::Update { id, .. } | RealmCommand::Deprecate { id, .. },
        ) => Err(RealmRejection::RealmNotFound(id)),
        (
            RealmState::Active(_) | RealmState::Deprecated(_),
            RealmCommand::Create { id, .. },
        ) => Err(RealmRejection::RealmAlreadyExists(id)),
        (
            RealmState::Active(current),
            RealmCommand::Update {
                id,
                rev,
                fields,
                subject,
            },
        ) => {
            expect_rev(rev, current.rev)?;
            resolve_change(deps, id, current.rev + 1, fields, subject, instant)
                .await
                .map(RealmEvent::RealmUpdated)
        }
        (
            RealmState::Deprecated(current),
            RealmCommand::Update {
                id,
                rev,
                fields,
                subject,
            },
        ) => {
            // Updating a deprecated realm with the right revision revives it.
            expect_rev(rev, current.rev)?;
            resolve_change(deps, id, current.rev + 1, fields, subject, instant)
                .await
                .map(RealmEvent::RealmUpdated)
        }
        (RealmState::Active(current), RealmCommand::Deprecate { id, rev, subject }) => {
            expect_rev(rev, current.rev)?;
            Ok(RealmEvent::RealmDeprecated {
                id,
                rev: current.rev + 1,
                instant,
                subject,
            })
        }
        (RealmState::Deprecated(_), RealmCommand::Deprecate { id, .. }) => {
            Err(RealmRejection::RealmAlreadyDeprecated(id))
        }
    }
}

fn expect_rev(provided: u64, expected: u64) -> Result<(), RealmRejection> {
    if provided == expected {
        Ok(())
    } else {
        Err(RealmRejection::IncorrectRev { provided, expected })
    }
}

async fn resolve_change(
    deps: &EvaluationDeps<'_>,
    id: Label,
    rev: u64,
    fields: RealmFields,
    subject: String,
    instant: DateTime<Utc>,
) -> Result<RealmChangeData, RealmRejection> {
    let well_known = deps.resolver.resolve(&fields.open_id_config).await?;
    if let Some(by) = deps.issuers.claimed_by(&well_known.issuer, &id) {
        return Err(RealmRejection::DuplicateIssuer {
            issuer: well_known.issuer,
            by,
        });
    }
    Ok(RealmChangeData {
        id,
        rev,
        name: fields.name,
        open_id_config: fields.open_id_config,
        issuer: well_known.issuer,
        keys: well_known.keys,
        grant_types: well_known.grant_types,
        logo: fields.logo,
        authorization_endpoint: well_known.authorization_endpoint,
        token_endpoint: well_known.token_endpoint,
        userinfo_endpoint: well_known.userinfo_endpoint,
        revocation_endpoint: well_known.revocation_endpoint,
        end_session_endpoint: well_known.end_session_endpoint,
        instant,
        subject,
    })
}

fn active_from(data: RealmChangeData, created: Option<(DateTime<Utc>, String)>) -> ActiveRealm {
    let (created_at, created_by) = created.unwrap_or_else(|| (data.instant, data.subject.clone()));
    ActiveRealm {
        id: data.id,
        rev: data.rev,
        name: data.name,
        open_id_config: data.open_id_config,
        issuer: data.issuer,
        keys: data.keys,
        grant_types: data.grant_types,
        logo: data.logo,
        authorization_endpoint: data.authorization_endpoint,
        token_endpoint: data.token_endpoint,
        userinfo_endpoint: data.userinfo_endpoint,
        revocation_endpoint: data.revocation_endpoint,
        end_session_endpoint: data.end_session_endpoint,
        created_at,
        created_by,
        updated_at: data.instant,
        updated_by: data.subject,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::retry::RetryStrategy;
    use crate::test_support::{change_data, provider_document, rsa_jwk, spawn_provider};
    use chrono::TimeZone;
    use serde_json::json;
    use std::collections::HashMap;
    use url::Url;

    fn label(raw: &str) -> Label {
        Label::new(raw).expect("label")
    }

    fn created(id: &str) -> RealmState {
        next(
            RealmState::Initial,
            RealmEvent::RealmCreated(change_data(id, 1)),
        )
    }

    fn deprecated_event(id: &str, rev: u64) -> RealmEvent {
        RealmEvent::RealmDeprecated {
            id: label(id),
            rev,
            instant: Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap(),
            subject: "bob".to_string(),
        }
    }

    #[test]
    fn created_activates_and_keeps_creation_metadata() {
        let state = created("google");
        let RealmState::Active(realm) = &state else {
            panic!("expected active state");
        };
        assert_eq!(realm.rev, 1);
        assert_eq!(realm.created_by, "alice");
        assert_eq!(realm.updated_by, "alice");
    }

    #[test]
    fn updated_bumps_rev_and_preserves_created_fields() {
        let state = created("google");
        let mut update = change_data("google", 2);
        update.subject = "bob".to_string();
        update.instant = Utc.with_ymd_and_hms(2024, 6, 2, 8, 0, 0).unwrap();
        let state = next(state, RealmEvent::RealmUpdated(update.clone()));

        let RealmState::Active(realm) = &state else {
            panic!("expected active state");
        };
        assert_eq!(realm.rev, 2);
        assert_eq!(realm.created_by, "alice");
        assert_eq!(realm.updated_by, "bob");
        assert_eq!(realm.updated_at, update.instant);
    }

    #[test]
    fn deprecated_freezes_the_realm() {
        let state = next(created("google"), deprecated_event("google", 2));
        let RealmState::Deprecated(realm) = &state else {
            panic!("expected deprecated state");
        };
        assert_eq!(realm.rev, 2);
        assert_eq!(realm.created_by, "alice");
        assert_eq!(realm.updated_by, "bob");
    }

    #[test]
    fn updated_revives_a_deprecated_realm() {
        let state = next(created("google"), deprecated_event("google", 2));
        let state = next(state, RealmEvent::RealmUpdated(change_data("google", 3)));
        let RealmState::Active(realm) = &state else {
            panic!("expected active state after revive");
        };
        assert_eq!(realm.rev, 3);
        assert_eq!(realm.created_by, "alice");
    }

    #[test]
    fn next_ignores_out_of_lifecycle_events() {
        // Initial absorbs updates and deprecations.
        let state = next(
            RealmState::Initial,
            RealmEvent::RealmUpdated(change_data("google", 2)),
        );
        assert_eq!(state, RealmState::Initial);
        let state = next(RealmState::Initial, deprecated_event("google", 2));
        assert_eq!(state, RealmState::Initial);

        // Active absorbs a replayed create.
        let active = created("google");
        let replayed = next(
            active.clone(),
            RealmEvent::RealmCreated(change_data("google", 1)),
        );
        assert_eq!(replayed, active);

        // Deprecated absorbs another deprecation.
        let frozen = next(created("google"), deprecated_event("google", 2));
        let replayed = next(frozen.clone(), deprecated_event("google", 2));
        assert_eq!(replayed, frozen);
    }

    #[test]
    fn replay_is_independent_of_prefix_grouping() {
        let events = vec![
            RealmEvent::RealmCreated(change_data("google", 1)),
            RealmEvent::RealmUpdated(change_data("google", 2)),
            deprecated_event("google", 3),
            RealmEvent::RealmUpdated(change_data("google", 4)),
        ];

        let folded = events
            .iter()
            .cloned()
            .fold(RealmState::Initial, |state, event| next(state, event));

        // Fold a prefix first, then the remainder.
        let prefix = events[..2]
            .iter()
            .cloned()
            .fold(RealmState::Initial, |state, event| next(state, event));
        let grouped = events[2..]
            .iter()
            .cloned()
            .fold(prefix, |state, event| next(state, event));

        assert_eq!(folded, grouped);
    }

    struct EvalHarness {
        clock: FixedClock,
        resolver: WellKnownResolver,
        issuers: HashMap<String, Label>,
    }

    impl EvalHarness {
        fn deps(&self) -> EvaluationDeps<'_> {
            EvaluationDeps {
                clock: &self.clock,
                resolver: &self.resolver,
                issuers: &self.issuers,
            }
        }
    }

    fn harness() -> EvalHarness {
        EvalHarness {
            clock: FixedClock(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()),
            resolver: WellKnownResolver::new(reqwest::Client::new(), RetryStrategy::Never),
            issuers: HashMap::new(),
        }
    }

    fn fields(config_url: &Url) -> RealmFields {
        RealmFields {
            name: "Google".to_string(),
            open_id_config: config_url.clone(),
            logo: None,
        }
    }

    #[tokio::test]
    async fn create_resolves_the_well_known_document() {
        let provider = spawn_provider(
            provider_document("https://accounts.example.com", &["authorization_code"]),
            json!({ "keys": [rsa_jwk("kid-1")] }),
        )
        .await;
        let harness = harness();

        let event = evaluate(
            &harness.deps(),
            &RealmState::Initial,
            RealmCommand::Create {
                id: label("google"),
                fields: fields(&provider.config_url()),
                subject: "alice".to_string(),
            },
        )
        .await
        .expect("event");

        let RealmEvent::RealmCreated(data) = event else {
            panic!("expected a created event");
        };
        assert_eq!(data.rev, 1);
        assert_eq!(data.issuer, "https://accounts.example.com");
        assert_eq!(data.instant, harness.clock.0);
        assert_eq!(data.keys.keys.len(), 1);
    }

    #[tokio::test]
    async fn create_rejects_a_duplicate_issuer() {
        let provider = spawn_provider(
            provider_document("https://accounts.example.com", &[]),
            json!({ "keys": [rsa_jwk("kid-1")] }),
        )
        .await;
        let mut harness = harness();
        harness.issuers.insert(
            "https://accounts.example.com".to_string(),
            label("other-realm"),
        );

        let err = evaluate(
            &harness.deps(),
            &RealmState::Initial,
            RealmCommand::Create {
                id: label("google"),
                fields: fields(&provider.config_url()),
                subject: "alice".to_string(),
            },
        )
        .await
        .expect_err("rejection");
        assert_eq!(
            err,
            RealmRejection::DuplicateIssuer {
                issuer: "https://accounts.example.com".to_string(),
                by: label("other-realm"),
            }
        );
    }

    #[tokio::test]
    async fn update_keeps_the_issuer_of_the_same_realm() {
        let provider = spawn_provider(
            provider_document("https://accounts.example.com", &[]),
            json!({ "keys": [rsa_jwk("kid-1")] }),
        )
        .await;
        let mut harness = harness();
        // The directory already maps the issuer to this very realm.
        harness
            .issuers
            .insert("https://accounts.example.com".to_string(), label("google"));

        let event = evaluate(
            &harness.deps(),
            &created("google"),
            RealmCommand::Update {
                id: label("google"),
                rev: 1,
                fields: fields(&provider.config_url()),
                subject: "alice".to_string(),
            },
        )
        .await
        .expect("event");
        assert_eq!(event.rev(), 2);
    }

    #[tokio::test]
    async fn rejections_that_need_no_resolution() {
        let harness = harness();
        let deps = harness.deps();
        let dummy = Url::parse("https://unused.example.com/config").unwrap();

        let err = evaluate(
            &deps,
            &RealmState::Initial,
            RealmCommand::Update {
                id: label("google"),
                rev: 1,
                fields: fields(&dummy),
                subject: "alice".to_string(),
            },
        )
        .await
        .expect_err("rejection");
        assert_eq!(err, RealmRejection::RealmNotFound(label("google")));

        let err = evaluate(
            &deps,
            &created("google"),
            RealmCommand::Create {
                id: label("google"),
                fields: fields(&dummy),
                subject: "alice".to_string(),
            },
        )
        .await
        .expect_err("rejection");
        assert_eq!(err, RealmRejection::RealmAlreadyExists(label("google")));

        let err = evaluate(
            &deps,
            &created("google"),
            RealmCommand::Update {
                id: label("google"),
                rev: 7,
                fields: fields(&dummy),
                subject: "alice".to_string(),
            },
        )
        .await
        .expect_err("rejection");
        assert_eq!(
            err,
            RealmRejection::IncorrectRev {
                provided: 7,
                expected: 1
            }
        );

        let frozen = next(created("google"), deprecated_event("google", 2));
        let err = evaluate(
            &deps,
            &frozen,
            RealmCommand::Deprecate {
                id: label("google"),
                rev: 2,
                subject: "alice".to_string(),
            },
        )
        .await
        .expect_err("rejection");
        assert_eq!(err, RealmRejection::RealmAlreadyDeprecated(label("google")));
    }

    #[tokio::test]
    async fn deprecate_with_matching_rev_produces_the_event() {
        let harness = harness();
        let event = evaluate(
            &harness.deps(),
            &created("google"),
            RealmCommand::Deprecate {
                id: label("google"),
                rev: 1,
                subject: "bob".to_string(),
            },
        )
        .await
        .expect("event");
        assert_eq!(event.rev(), 2);
        assert!(matches!(event, RealmEvent::RealmDeprecated { .. }));
    }

    #[tokio::test]
    async fn revive_after_deprecation_follows_the_matrix() {
        // After deprecation, create and deprecate reject but an update with
        // the right rev succeeds and reactivates.
        let provider = spawn_provider(
            provider_document("https://accounts.example.com", &[]),
            json!({ "keys": [rsa_jwk("kid-1")] }),
        )
        .await;
        let harness = harness();
        let deps = harness.deps();
        let frozen = next(created("google"), deprecated_event("google", 2));

        let err = evaluate(
            &deps,
            &frozen,
            RealmCommand::Create {
                id: label("google"),
                fields: fields(&provider.config_url()),
                subject: "alice".to_string(),
            },
        )
        .await
        .expect_err("rejection");
        assert_eq!(err, RealmRejection::RealmAlreadyExists(label("google")));

        let event = evaluate(
            &deps,
            &frozen,
            RealmCommand::Update {
                id: label("google"),
                rev: 2,
                fields: fields(&provider.config_url()),
                subject: "alice".to_string(),
            },
        )
        .await
        .expect("revive event");
        assert_eq!(event.rev(), 3);
        assert!(matches!(next(frozen, event), RealmState::Active(_)));
    }
}
