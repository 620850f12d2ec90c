// Keygate IAM service (HTTP)
// ---------------------------
// Manages authentication realms federated to external OpenID Connect
// providers and verifies bearer tokens against them.
//
// Write path: the realms facade checks ACL permissions, the per-realm
// aggregate resolves the provider's well-known document and appends an event
// to the journal, and the index is refreshed synchronously. The projector
// tails the journal in the background so the index also converges after
// crashes or missed refreshes.
//
// Read path: token verification looks up the active realm by the token's
// `iss` claim in the index and checks the RS256 signature against that
// realm's published JWKS.

use anyhow::Result;
use iam::acls::{Acls, InMemoryAcls};
use iam::app::{AppState, build_router};
use iam::config::IamConfig;
use iam::journal::memory::{MemoryJournal, MemoryProgressStore, MemorySnapshotStore};
use iam::observability;
use iam::realms::aggregate::RealmAggregate;
use iam::realms::index::{LocalKeyValueStore, RealmIndex};
use iam::realms::projector::RealmProjector;
use iam::realms::Realms;
use keygate_auth::TokenVerifier;
use keygate_realm::{SystemClock, WellKnownResolver};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    let metrics_handle = observability::init_observability("keygate-iam");
    let config = IamConfig::from_env_or_yaml()?;

    let journal = Arc::new(MemoryJournal::new());
    let snapshots = Arc::new(MemorySnapshotStore::new());
    let progress = Arc::new(MemoryProgressStore::new());
    let index = Arc::new(RealmIndex::new(
        Arc::new(LocalKeyValueStore::new()),
        config.index_config(),
    ));

    let resolver = WellKnownResolver::new(
        reqwest::Client::new(),
        config.aggregate.retry.to_strategy(),
    );
    let aggregate = RealmAggregate::new(
        journal.clone(),
        snapshots,
        resolver,
        Arc::new(SystemClock),
        index.clone(),
        config.aggregate_config(),
    );

    let acls = Arc::new(InMemoryAcls::new(config.acls_open));
    if config.acls_open {
        tracing::warn!("ACLs are open: every caller is granted everything");
    }
    let realms = Arc::new(Realms::new(
        aggregate.clone(),
        index.clone(),
        Box::new(move || acls.clone() as Arc<dyn Acls>),
        TokenVerifier::default(),
    ));

    let projector = RealmProjector::new(
        journal,
        aggregate,
        index,
        progress,
        config.indexing_config(),
    );
    let _projector = projector.spawn();

    tokio::spawn(observability::serve_metrics(
        metrics_handle,
        config.metrics_bind,
    ));

    let app = build_router(AppState {
        realms,
        api_version: "v1".to_string(),
    });
    let addr = config.bind_addr;
    tracing::info!(%addr, "iam service listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
