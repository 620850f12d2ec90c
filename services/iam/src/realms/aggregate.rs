//! Event-sourced realm aggregate: a single-writer task per label.
//!
//! # Purpose
//! Owns every state mutation for one realm. Commands for the same label are
//! evaluated strictly sequentially by a dedicated task with a bounded
//! mailbox; events are appended to the journal before the caller is
//! acknowledged. Entities are rehydrated on demand from the latest snapshot
//! plus the journal tail, and passivate after the configured idle or total
//! lifetime.
//!
//! # Failure semantics
//! - Command evaluation is bounded by `command_evaluation_timeout`; on expiry
//!   the command fails with `OperationTimedOut` and the entity re-recovers.
//! - Journal append failures are not retried here: the command fails, the
//!   entity recovers, and callers may resubmit.
//! - Recovery reads retry transient failures per the configured strategy.

use crate::error::IamError;
use crate::journal::{EventEnvelope, EventJournal, REALM_TAG, SnapshotStore, persistence_id};
use dashmap::DashMap;
use keygate_realm::machine::{self, EvaluationDeps, IssuerDirectory};
use keygate_realm::retry::{self, RetryStrategy};
use keygate_realm::{
    Clock, Label, RealmCommand, RealmEvent, RealmRejection, RealmResource, RealmState,
    WellKnownResolver,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

/// Outcome of a write: the new state, or the domain rejection.
pub type Evaluated = Result<RealmState, RealmRejection>;

/// Aggregate runtime settings (`aggregate.*` in the configuration).
#[derive(Debug, Clone)]
pub struct AggregateConfig {
    pub ask_timeout: Duration,
    pub command_evaluation_timeout: Duration,
    /// Shard count for the entity registry, rounded up to a power of two.
    pub shards: usize,
    /// A snapshot is taken whenever `rev` is a multiple of this; 0 disables.
    pub snapshot_every: u64,
    pub passivate_after_interaction: Duration,
    pub passivate_after_recovery: Duration,
    pub retry: RetryStrategy,
}

impl Default for AggregateConfig {
    fn default() -> Self {
        Self {
            ask_timeout: Duration::from_secs(10),
            command_evaluation_timeout: Duration::from_secs(5),
            shards: 64,
            snapshot_every: 100,
            passivate_after_interaction: Duration::from_secs(300),
            passivate_after_recovery: Duration::from_secs(1800),
            retry: RetryStrategy::exponential(
                Duration::from_millis(100),
                Duration::from_secs(2),
                3,
            ),
        }
    }
}

const MAILBOX_CAPACITY: usize = 16;

enum EntityMessage {
    Evaluate {
        command: RealmCommand,
        reply: oneshot::Sender<Result<Evaluated, IamError>>,
    },
    CurrentState {
        reply: oneshot::Sender<RealmState>,
    },
}

struct AggregateInner {
    journal: Arc<dyn EventJournal>,
    snapshots: Arc<dyn SnapshotStore>,
    resolver: WellKnownResolver,
    clock: Arc<dyn Clock>,
    issuers: Arc<dyn IssuerDirectory>,
    config: AggregateConfig,
    entities: DashMap<Label, mpsc::Sender<EntityMessage>>,
}

/// Handle to the sharded aggregate runtime; cheap to clone.
#[derive(Clone)]
pub struct RealmAggregate {
    inner: Arc<AggregateInner>,
}

impl RealmAggregate {
    pub fn new(
        journal: Arc<dyn EventJournal>,
        snapshots: Arc<dyn SnapshotStore>,
        resolver: WellKnownResolver,
        clock: Arc<dyn Clock>,
        issuers: Arc<dyn IssuerDirectory>,
        config: AggregateConfig,
    ) -> Self {
        let shards = config.shards.next_power_of_two().max(2);
        Self {
            inner: Arc::new(AggregateInner {
                journal,
                snapshots,
                resolver,
                clock,
                issuers,
                config,
                entities: DashMap::with_shard_amount(shards),
            }),
        }
    }

    /// Evaluate a command with single-writer semantics for the target label.
    pub async fn evaluate(&self, command: RealmCommand) -> Result<Evaluated, IamError> {
        let id = command.id().clone();
        let (reply, receive) = oneshot::channel();
        self.deliver(&id, EntityMessage::Evaluate { command, reply })
            .await?;

        // The reply can lag by a full evaluation on a busy entity.
        let budget =
            self.inner.config.ask_timeout + self.inner.config.command_evaluation_timeout;
        match tokio::time::timeout(budget, receive).await {
            Err(_) => Err(IamError::OperationTimedOut(format!(
                "realm '{id}' command evaluation"
            ))),
            Ok(Err(_)) => Err(IamError::internal("realm aggregate dropped the reply")),
            Ok(Ok(outcome)) => outcome,
        }
    }

    /// The current state; observes every event persisted before the call.
    pub async fn current_state(&self, id: &Label) -> Result<RealmState, IamError> {
        let (reply, receive) = oneshot::channel();
        self.deliver(id, EntityMessage::CurrentState { reply })
            .await?;
        match tokio::time::timeout(self.inner.config.ask_timeout, receive).await {
            Err(_) => Err(IamError::OperationTimedOut(format!(
                "realm '{id}' state read"
            ))),
            Ok(Err(_)) => Err(IamError::internal("realm aggregate dropped the reply")),
            Ok(Ok(state)) => Ok(state),
        }
    }

    /// The current read-model resource; `UnexpectedInitialState` when no
    /// events exist.
    pub async fn current_resource(&self, id: &Label) -> Result<RealmResource, IamError> {
        self.current_state(id)
            .await?
            .to_resource()
            .ok_or_else(|| IamError::UnexpectedInitialState(id.clone()))
    }

    /// Left fold of the journal from `Initial` up to and including `rev`,
    /// for fetch-by-revision reads.
    pub async fn state_at(&self, id: &Label, rev: u64) -> Result<RealmState, IamError> {
        let pid = persistence_id(id);
        let envelopes = self
            .inner
            .journal
            .replay(&pid, 0)
            .await
            .map_err(IamError::internal)?;
        let mut state = RealmState::Initial;
        for envelope in envelopes {
            if envelope.sequence_nr > rev {
                break;
            }
            state = machine::next(state, decode_event(&envelope)?);
        }
        Ok(state)
    }

    async fn deliver(&self, id: &Label, message: EntityMessage) -> Result<(), IamError> {
        let sender = self.entity(id);
        match tokio::time::timeout(self.inner.config.ask_timeout, sender.send(message)).await {
            Err(_) => Err(IamError::OperationTimedOut(format!("realm '{id}' mailbox"))),
            Ok(Ok(())) => Ok(()),
            Ok(Err(mpsc::error::SendError(message))) => {
                // The entity passivated between lookup and send; replace it
                // and deliver to the fresh one.
                self.inner
                    .entities
                    .remove_if(id, |_, entry| entry.same_channel(&sender));
                let sender = self.entity(id);
                match tokio::time::timeout(self.inner.config.ask_timeout, sender.send(message))
                    .await
                {
                    Err(_) => Err(IamError::OperationTimedOut(format!(
                        "realm '{id}' mailbox"
                    ))),
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(_)) => Err(IamError::internal(format!("realm '{id}' mailbox closed"))),
                }
            }
        }
    }

    /// The live entity sender for `id`, spawning the task under the shard
    /// entry lock so a label never gets two writers.
    fn entity(&self, id: &Label) -> mpsc::Sender<EntityMessage> {
        self.inner
            .entities
            .entry(id.clone())
            .or_insert_with(|| spawn_entity(self.inner.clone(), id.clone()))
            .clone()
    }

    #[cfg(test)]
    fn live_entities(&self) -> usize {
        self.inner.entities.len()
    }
}

fn spawn_entity(inner: Arc<AggregateInner>, id: Label) -> mpsc::Sender<EntityMessage> {
    let (sender, mut mailbox) = mpsc::channel(MAILBOX_CAPACITY);
    let self_sender = sender.clone();
    tokio::spawn(async move {
        let pid = persistence_id(&id);
        let mut state = match recover(&inner, &pid).await {
            Ok(state) => state,
            Err(err) => {
                tracing::error!(realm = %id, error = %err, "realm recovery failed");
                inner
                    .entities
                    .remove_if(&id, |_, entry| entry.same_channel(&self_sender));
                return;
            }
        };
        let recovered_at = Instant::now();
        tracing::debug!(realm = %id, rev = state.rev(), "realm entity recovered");

        loop {
            let message = match tokio::time::timeout(
                inner.config.passivate_after_interaction,
                mailbox.recv(),
            )
            .await
            {
                Ok(Some(message)) => message,
                // All senders dropped, or the idle budget lapsed.
                Ok(None) | Err(_) => break,
            };

            match message {
                EntityMessage::CurrentState { reply } => {
                    let _ = reply.send(state.clone());
                }
                EntityMessage::Evaluate { command, reply } => {
                    let outcome = handle_command(&inner, &pid, &mut state, command).await;
                    let _ = reply.send(outcome);
                }
            }

            if recovered_at.elapsed() >= inner.config.passivate_after_recovery {
                break;
            }
        }

        inner
            .entities
            .remove_if(&id, |_, entry| entry.same_channel(&self_sender));
        tracing::debug!(realm = %id, "realm entity passivated");
    });
    sender
}

async fn handle_command(
    inner: &Arc<AggregateInner>,
    pid: &str,
    state: &mut RealmState,
    command: RealmCommand,
) -> Result<Evaluated, IamError> {
    let deps = EvaluationDeps {
        clock: inner.clock.as_ref(),
        resolver: &inner.resolver,
        issuers: inner.issuers.as_ref(),
    };
    let evaluated = tokio::time::timeout(
        inner.config.command_evaluation_timeout,
        machine::evaluate(&deps, state, command),
    )
    .await;

    let event = match evaluated {
        Err(_) => {
            // Usually a hanging provider; rebuild the state from the journal
            // before accepting the next command.
            restore(inner, pid, state).await;
            return Err(IamError::OperationTimedOut(
                "command evaluation".to_string(),
            ));
        }
        Ok(Err(rejection)) => return Ok(Err(rejection)),
        Ok(Ok(event)) => event,
    };

    let payload = serde_json::to_value(&event).map_err(IamError::internal)?;
    if let Err(err) = inner
        .journal
        .append(pid, event.rev(), REALM_TAG, payload)
        .await
    {
        restore(inner, pid, state).await;
        return Err(IamError::internal(err));
    }

    *state = machine::next(state.clone(), event);
    metrics::counter!("keygate_realm_events_total").increment(1);

    let rev = state.rev();
    if inner.config.snapshot_every > 0 && rev % inner.config.snapshot_every == 0 {
        save_snapshot(inner, pid, state, rev).await;
    }
    Ok(Ok(state.clone()))
}

/// Snapshots are best-effort: a failure is logged and the journal remains
/// the source of truth.
async fn save_snapshot(inner: &Arc<AggregateInner>, pid: &str, state: &RealmState, rev: u64) {
    match serde_json::to_value(state) {
        Ok(snapshot) => {
            if let Err(err) = inner.snapshots.save(pid, rev, snapshot).await {
                tracing::warn!(persistence_id = pid, error = %err, "snapshot save failed");
            }
        }
        Err(err) => {
            tracing::warn!(persistence_id = pid, error = %err, "snapshot encode failed");
        }
    }
}

async fn restore(inner: &Arc<AggregateInner>, pid: &str, state: &mut RealmState) {
    match recover(inner, pid).await {
        Ok(recovered) => *state = recovered,
        Err(err) => {
            tracing::error!(persistence_id = pid, error = %err, "realm re-recovery failed");
        }
    }
}

/// Latest snapshot plus the journal tail. Transient read failures are
/// retried; an undecodable snapshot is discarded in favor of a full replay.
async fn recover(inner: &Arc<AggregateInner>, pid: &str) -> Result<RealmState, IamError> {
    let snapshot = retry::retry(&inner.config.retry, |_| true, || inner.snapshots.load(pid))
        .await
        .map_err(IamError::internal)?;
    let (mut state, from) = match snapshot {
        Some((sequence_nr, value)) => match serde_json::from_value::<RealmState>(value) {
            Ok(state) => (state, sequence_nr),
            Err(err) => {
                tracing::warn!(persistence_id = pid, error = %err, "discarding undecodable snapshot");
                (RealmState::Initial, 0)
            }
        },
        None => (RealmState::Initial, 0),
    };

    let envelopes = retry::retry(&inner.config.retry, |_| true, || {
        inner.journal.replay(pid, from)
    })
    .await
    .map_err(IamError::internal)?;
    for envelope in envelopes {
        state = machine::next(state, decode_event(&envelope)?);
    }
    Ok(state)
}

fn decode_event(envelope: &EventEnvelope) -> Result<RealmEvent, IamError> {
    serde_json::from_value(envelope.payload.clone()).map_err(|err| {
        IamError::internal(format!(
            "corrupt event at sequence {} of '{}': {err}",
            envelope.sequence_nr, envelope.persistence_id
        ))
    })
}
