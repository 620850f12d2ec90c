//! Caller identity and bearer-token verification for the Keygate IAM service.
//!
//! # Purpose
//! Centralizes the identity model (anonymous, authenticated, user, group) and
//! the RS256 token verifier that turns a bearer string into a [`Caller`]
//! using the key sets of active realms.
//!
//! # How it fits
//! The service's realms facade resolves every request's caller through this
//! crate and feeds the result to ACL evaluation; the read index supplies the
//! issuer-to-keys lookup.
//!
//! # Key invariants
//! - Deprecated realms never contribute keys: an issuer lookup only returns
//!   active realms.
//! - A verified caller always carries the anonymous, user, and
//!   authenticated-realm identities, plus one identity per group.

mod identity;
mod rejection;
mod verifier;

pub use identity::{Caller, Identity};
pub use rejection::TokenRejection;
pub use verifier::{IssuerRealms, RealmKeys, TokenVerifier};
