//! Lease based leader election so only one operator replica reconciles.
//!
//! Writes carry the resourceVersion they were read at. A concurrent writer makes the
//! update fail with 409 and the loser retries on the next period. A leader keeps retrying
//! failed renewals until the renew deadline passes.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use ccmo_common::settings::LeaderElectionArgs;
use chrono::{DateTime, Utc};
use k8s_openapi::{
    api::coordination::v1::{Lease, LeaseSpec},
    apimachinery::pkg::apis::meta::v1::{MicroTime, ObjectMeta},
};
use kube::{
    api::{Api, PostParams},
    Client,
};
use tokio::{sync::oneshot, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{
    constants::LEADER_LEASE_NAME,
    error::{OperatorError, OperatorResult},
};

/// What a candidate may do with the lease it just read.
#[derive(Debug, Clone, PartialEq, Eq)]
enum LeaseDecision {
    Create,
    Renew,
    TakeOver { transitions: i32 },
    HeldByOther,
}

fn decide(lease: Option<&Lease>, identity: &str, now: DateTime<Utc>) -> LeaseDecision {
    let Some(lease) = lease else {
        return LeaseDecision::Create;
    };
    let spec = lease.spec.as_ref();
    if spec.and_then(|s| s.holder_identity.as_deref()) == Some(identity) {
        return LeaseDecision::Renew;
    }

    let expired = match (
        spec.and_then(|s| s.renew_time.as_ref()),
        spec.and_then(|s| s.lease_duration_seconds),
    ) {
        (Some(renewed), Some(duration)) => now > renewed.0 + chrono::Duration::seconds(duration.into()),
        _ => true,
    };
    if expired {
        LeaseDecision::TakeOver {
            transitions: spec.and_then(|s| s.lease_transitions).unwrap_or(0),
        }
    } else {
        LeaseDecision::HeldByOther
    }
}

/// Outcome of one write against the lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    Acquired,
    HeldByOther,
    /// The lease changed between read and write.
    Conflict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RenewalStep {
    Renewed,
    Retry,
    GiveUp,
}

/// Only another live holder ends leadership at once. Conflicts and API errors are retried
/// while the last successful renewal is within the renew deadline.
fn renewal_step(attempt: &OperatorResult<Attempt>, since_renewed: Duration, renew_deadline: Duration) -> RenewalStep {
    match attempt {
        Ok(Attempt::Acquired) => RenewalStep::Renewed,
        Ok(Attempt::HeldByOther) => RenewalStep::GiveUp,
        Ok(Attempt::Conflict) | Err(_) if since_renewed < renew_deadline => RenewalStep::Retry,
        Ok(Attempt::Conflict) | Err(_) => RenewalStep::GiveUp,
    }
}

/// Pod name when running in cluster, otherwise something unique to this process.
pub fn default_identity() -> String {
    std::env::var("POD_NAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| format!("{LEADER_LEASE_NAME}-{}", std::process::id()))
}

pub struct LeaderElector {
    client: Client,
    namespace: String,
    identity: String,
    lease_duration: Duration,
    renew_deadline: Duration,
    retry_period: Duration,
    is_leader: Arc<AtomicBool>,
}

impl LeaderElector {
    pub fn new(client: Client, args: &LeaderElectionArgs, identity: &str) -> Self {
        Self {
            client,
            namespace: args.namespace.clone(),
            identity: identity.to_string(),
            lease_duration: Duration::from_secs(args.lease_duration_secs),
            renew_deadline: Duration::from_secs(args.renew_deadline_secs),
            retry_period: Duration::from_secs(args.retry_period_secs),
            is_leader: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_leader(&self) -> bool {
        self.is_leader.load(Ordering::SeqCst)
    }

    /// Blocks until the lease is held. The returned guard keeps renewing it.
    pub async fn acquire(self: Arc<Self>) -> LeaderGuard {
        info!(identity = %self.identity, lease = LEADER_LEASE_NAME, "Waiting for leadership");
        loop {
            match self.try_acquire_or_renew().await {
                Ok(Attempt::Acquired) => {
                    info!(identity = %self.identity, "Leadership acquired");
                    self.is_leader.store(true, Ordering::SeqCst);
                    return self.create_guard();
                }
                Ok(Attempt::HeldByOther) => debug!(identity = %self.identity, "Lease held by another replica"),
                Ok(Attempt::Conflict) => debug!(identity = %self.identity, "Lease changed concurrently"),
                Err(e) => warn!(identity = %self.identity, error = %e, "Failed to acquire lease, retrying"),
            }
            tokio::time::sleep(self.retry_period).await;
        }
    }

    fn create_guard(self: &Arc<Self>) -> LeaderGuard {
        let (lost_tx, lost_rx) = oneshot::channel();
        let elector = Arc::clone(self);
        let renewal_task = tokio::spawn(async move {
            elector.renewal_loop(lost_tx).await;
        });
        LeaderGuard {
            elector: Arc::clone(self),
            renewal_task,
            lost_rx: Some(lost_rx),
        }
    }

    async fn try_acquire_or_renew(&self) -> OperatorResult<Attempt> {
        let api: Api<Lease> = Api::namespaced(self.client.clone(), &self.namespace);
        let now = Utc::now();
        let existing = api.get_opt(LEADER_LEASE_NAME).await?;

        let lease = match decide(existing.as_ref(), &self.identity, now) {
            LeaseDecision::HeldByOther => return Ok(Attempt::HeldByOther),
            LeaseDecision::Create => {
                return write_outcome(api.create(&PostParams::default(), &self.lease(now, 0, None)).await)
            }
            LeaseDecision::Renew => {
                let mut lease = existing.unwrap_or_default();
                if let Some(spec) = lease.spec.as_mut() {
                    spec.renew_time = Some(MicroTime(now));
                }
                lease
            }
            LeaseDecision::TakeOver { transitions } => {
                let resource_version = existing.and_then(|l| l.metadata.resource_version);
                info!(identity = %self.identity, transitions = transitions + 1, "Taking over expired lease");
                self.lease(now, transitions + 1, resource_version)
            }
        };
        write_outcome(api.replace(LEADER_LEASE_NAME, &PostParams::default(), &lease).await)
    }

    fn lease(&self, now: DateTime<Utc>, transitions: i32, resource_version: Option<String>) -> Lease {
        Lease {
            metadata: ObjectMeta {
                name: Some(LEADER_LEASE_NAME.to_string()),
                namespace: Some(self.namespace.clone()),
                resource_version,
                ..Default::default()
            },
            spec: Some(LeaseSpec {
                holder_identity: Some(self.identity.clone()),
                lease_duration_seconds: Some(self.lease_duration.as_secs() as i32),
                acquire_time: Some(MicroTime(now)),
                renew_time: Some(MicroTime(now)),
                lease_transitions: Some(transitions),
                ..Default::default()
            }),
        }
    }

    /// Renews every retry period. Leadership is given up once no renewal succeeded
    /// within the renew deadline.
    async fn renewal_loop(&self, lost_tx: oneshot::Sender<()>) {
        let mut last_renewed = tokio::time::Instant::now();
        loop {
            tokio::time::sleep(self.retry_period).await;
            let attempt = self.try_acquire_or_renew().await;
            match renewal_step(&attempt, last_renewed.elapsed(), self.renew_deadline) {
                RenewalStep::Renewed => last_renewed = tokio::time::Instant::now(),
                RenewalStep::Retry => {
                    warn!(identity = %self.identity, outcome = ?attempt, "Lease renewal failed, retrying");
                }
                RenewalStep::GiveUp => {
                    warn!(identity = %self.identity, outcome = ?attempt, "Giving up the lease");
                    break;
                }
            }
        }
        self.is_leader.store(false, Ordering::SeqCst);
        let _ = lost_tx.send(());
    }
}

fn write_outcome(result: Result<Lease, kube::Error>) -> OperatorResult<Attempt> {
    match result {
        Ok(_) => Ok(Attempt::Acquired),
        Err(e) => {
            let err = OperatorError::from(e);
            if err.is_conflict() {
                Ok(Attempt::Conflict)
            } else {
                Err(err)
            }
        }
    }
}

pub struct LeaderGuard {
    elector: Arc<LeaderElector>,
    renewal_task: JoinHandle<()>,
    lost_rx: Option<oneshot::Receiver<()>>,
}

impl LeaderGuard {
    /// Resolves once leadership is lost.
    pub async fn lost(&mut self) {
        if let Some(rx) = self.lost_rx.take() {
            let _ = rx.await;
        }
    }
}

impl Drop for LeaderGuard {
    fn drop(&mut self) {
        self.elector.is_leader.store(false, Ordering::SeqCst);
        self.renewal_task.abort();
        info!(identity = %self.elector.identity, "Leadership released");
    }
}
