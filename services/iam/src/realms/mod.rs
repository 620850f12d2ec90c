//! Realms facade: authorization gate, public contract, caller resolution.
//!
//! # Purpose
//! The single entry point the HTTP layer talks to. Every write checks the
//! `realms/write` ACL permission, submits the command to the aggregate, then
//! synchronously refreshes the index for that realm (best-effort) so a read
//! right after a write observes it. Reads require `realms/read` and are
//! served from the index; fetch-by-revision folds the journal instead.

pub mod aggregate;
pub mod index;
pub mod projector;

use crate::acls::Acls;
use crate::error::IamError;
use aggregate::RealmAggregate;
use chrono::{DateTime, Utc};
use index::RealmIndex;
use keygate_auth::{Caller, TokenRejection, TokenVerifier};
use keygate_realm::{
    Label, RealmCommand, RealmFields, RealmRejection, RealmResource, RealmState,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

/// ACL path realm operations are checked against.
pub const REALMS_PATH: &str = "/realms";
pub const READ_PERMISSION: &str = "realms/read";
pub const WRITE_PERMISSION: &str = "realms/write";

/// Accessor breaking the construction cycle: ACLs authorize through realm
/// callers, realms authorize through ACLs.
pub type AclsAccessor = Box<dyn Fn() -> Arc<dyn Acls> + Send + Sync>;

/// Metadata returned by every successful write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMetadata {
    pub id: Label,
    pub rev: u64,
    pub types: Vec<String>,
    pub deprecated: bool,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub updated_at: DateTime<Utc>,
    pub updated_by: String,
}

impl ResourceMetadata {
    fn of(state: &RealmState) -> Option<Self> {
        state.to_resource().map(|resource| Self {
            id: resource.id,
            rev: resource.rev,
            types: resource.types,
            deprecated: resource.deprecated,
            created_at: resource.created_at,
            created_by: resource.created_by,
            updated_at: resource.updated_at,
            updated_by: resource.updated_by,
        })
    }
}

/// Outcome of a write operation.
pub type WriteOutcome = Result<ResourceMetadata, RealmRejection>;

pub struct Realms {
    aggregate: RealmAggregate,
    index: Arc<RealmIndex>,
    acls: AclsAccessor,
    verifier: TokenVerifier,
}

impl Realms {
    pub fn new(
        aggregate: RealmAggregate,
        index: Arc<RealmIndex>,
        acls: AclsAccessor,
        verifier: TokenVerifier,
    ) -> Self {
        Self {
            aggregate,
            index,
            acls,
            verifier,
        }
    }

    pub async fn create(
        &self,
        id: Label,
        fields: RealmFields,
        caller: &Caller,
    ) -> Result<WriteOutcome, IamError> {
        self.check(caller, WRITE_PERMISSION).await?;
        self.submit(RealmCommand::Create {
            id,
            fields,
            subject: caller.subject_name(),
        })
        .await
    }

    pub async fn update(
        &self,
        id: Label,
        rev: u64,
        fields: RealmFields,
        caller: &Caller,
    ) -> Result<WriteOutcome, IamError> {
        self.check(caller, WRITE_PERMISSION).await?;
        self.submit(RealmCommand::Update {
            id,
            rev,
            fields,
            subject: caller.subject_name(),
        })
        .await
    }

    pub async fn deprecate(
        &self,
        id: Label,
        rev: u64,
        caller: &Caller,
    ) -> Result<WriteOutcome, IamError> {
        self.check(caller, WRITE_PERMISSION).await?;
        self.submit(RealmCommand::Deprecate {
            id,
            rev,
            subject: caller.subject_name(),
        })
        .await
    }

    /// The latest resource for `id`, from the index.
    pub async fn fetch(
        &self,
        id: &Label,
        caller: &Caller,
    ) -> Result<Option<RealmResource>, IamError> {
        self.check(caller, READ_PERMISSION).await?;
        Ok(self.index.get(id))
    }

    /// The resource as of revision `rev`, folded from the journal. `None`
    /// when the realm never reached that revision.
    pub async fn fetch_at(
        &self,
        id: &Label,
        rev: u64,
        caller: &Caller,
    ) -> Result<Option<RealmResource>, IamError> {
        self.check(caller, READ_PERMISSION).await?;
        let state = self.aggregate.state_at(id, rev).await?;
        if state.rev() != rev {
            return Ok(None);
        }
        Ok(state.to_resource())
    }

    /// All current realms, sorted by creation time.
    pub async fn list(&self, caller: &Caller) -> Result<Vec<RealmResource>, IamError> {
        self.check(caller, READ_PERMISSION).await?;
        Ok(self.index.list())
    }

    /// Resolve the caller for a request: anonymous without credentials,
    /// otherwise full verification against the active realms in the index.
    pub fn caller(&self, token: Option<&str>) -> Result<Caller, TokenRejection> {
        match token {
            None => Ok(Caller::anonymous()),
            Some(token) => self.verifier.verify(token, self.index.as_ref()),
        }
    }

    async fn submit(&self, command: RealmCommand) -> Result<WriteOutcome, IamError> {
        match self.aggregate.evaluate(command).await? {
            Err(rejection) => Ok(Err(rejection)),
            Ok(state) => {
                self.refresh_index(&state).await;
                match ResourceMetadata::of(&state) {
                    Some(metadata) => {
                        metrics::counter!("keygate_realm_writes_total").increment(1);
                        Ok(Ok(metadata))
                    }
                    None => Err(IamError::internal(
                        "a successful write left the realm in its initial state",
                    )),
                }
            }
        }
    }

    /// Synchronous index refresh after a write. Best-effort: the projector
    /// converges the index anyway, so failures are only logged.
    async fn refresh_index(&self, state: &RealmState) {
        if let Some(resource) = state.to_resource()
            && let Err(err) = self.index.put(resource).await
        {
            tracing::warn!(error = %err, "failed to refresh realm index after write");
        }
    }

    async fn check(&self, caller: &Caller, permission: &str) -> Result<(), IamError> {
        let acls = (self.acls)();
        if acls.has_permission(REALMS_PATH, permission, caller).await? {
            Ok(())
        } else {
            Err(IamError::AccessDenied {
                resource: REALMS_PATH.to_string(),
                permission: permission.to_string(),
            })
        }
    }
}
