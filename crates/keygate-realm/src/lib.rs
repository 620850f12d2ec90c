//! Realm domain model for the Keygate IAM service.
//!
//! # Purpose
//! Defines the event-sourced realm lifecycle (states, events, commands,
//! rejections), the pure state machine driving it, the OIDC well-known
//! resolver that turns a discovery URL into issuer/endpoint/key material, and
//! the retry policy shared by the service's infrastructure layers.
//!
//! # How it fits
//! The service crate hosts the aggregate runtime, read index, and projector
//! on top of these types; the auth crate consumes the read-model projections
//! to verify bearer tokens.
//!
//! # Key invariants
//! - Event revisions per realm are `1, 2, 3, ...` with no gaps.
//! - `next` is total: replaying any event list from `Initial` is idempotent.
//! - Issuers are unique across active realms; duplicates are rejected at
//!   evaluation time.

mod clock;
mod command;
mod event;
mod label;
pub mod machine;
mod rejection;
mod resource;
pub mod retry;
mod state;
mod well_known;

#[cfg(test)]
mod test_support;

pub use clock::{Clock, FixedClock, SystemClock};
pub use command::{RealmCommand, RealmFields};
pub use event::{RealmChangeData, RealmEvent};
pub use label::{IllegalLabel, Label};
pub use machine::{EvaluationDeps, IssuerDirectory, evaluate, next};
pub use rejection::RealmRejection;
pub use resource::{
    ActiveProjection, DeprecatedProjection, REALM_TYPE, RealmProjection, RealmResource,
};
pub use retry::RetryStrategy;
pub use state::{ActiveRealm, DeprecatedRealm, RealmState};
pub use well_known::{GrantType, WellKnown, WellKnownResolver};
