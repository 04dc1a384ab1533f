//! Capability contracts consumed by the consensus core.
//!
//! The core drives neither the network nor role sampling itself; both are
//! injected at construction behind minimal traits so that production and
//! simulation supply their own implementations. Implementations are shared
//! across concurrent instances and must be safe for concurrent use.

use hare_types::{InstanceId, PublicKey, Signature, ValueSet};
use hare_types::HareMessage;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Errors surfaced by a [`NetworkService`] broadcast.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// The transport is no longer accepting messages.
    #[error("network channel closed")]
    ChannelClosed,

    /// Transport-specific failure.
    #[error("broadcast failed: {0}")]
    Broadcast(String),
}

/// Gossip transport contract.
///
/// Payloads are opaque bytes; the broker outside the core demarshals inbound
/// traffic and dispatches it to instance-specific inboxes. `broadcast` must
/// hand off asynchronously or fail promptly; it is called from the event
/// loop and must not block it.
pub trait NetworkService: Send + Sync {
    /// Subscribe to a gossip protocol, receiving every peer payload.
    fn register_gossip_protocol(&self, protocol: &str) -> mpsc::UnboundedReceiver<Vec<u8>>;

    /// Broadcast a payload to all peers subscribed to `protocol`.
    fn broadcast(&self, protocol: &str, payload: Vec<u8>) -> Result<(), NetworkError>;
}

/// Errors surfaced by a [`RoleOracle`].
#[derive(Debug, Error)]
pub enum OracleError {
    /// The oracle could not answer. The caller treats this as "not
    /// eligible" for the round in question.
    #[error("role oracle unavailable: {0}")]
    Unavailable(String),
}

/// Role-eligibility sampling contract.
///
/// Must be deterministic and agreement-preserving: every honest participant
/// asking about the same `(seed, committee_size, identity)` gets the same
/// answer.
pub trait RoleOracle: Send + Sync {
    /// Is `identity` part of the committee of `committee_size` sampled for
    /// `seed`? The role proof is the VRF-like input tied to the identity.
    fn eligible(
        &self,
        seed: u32,
        committee_size: usize,
        identity: &PublicKey,
        role_proof: &Signature,
    ) -> Result<bool, OracleError>;
}

/// The terminal output of one instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminationOutput {
    /// The instance that terminated.
    pub instance_id: InstanceId,
    /// The agreed set.
    pub agreed_set: ValueSet,
}

/// A message delivered to a process inbox by the broker.
///
/// Carries an optional one-shot reporting channel through which the process
/// tells the broker whether the message passed role and syntactic
/// validation. Contextual outcomes are never reported, since peers may
/// legitimately disagree on the current round.
#[derive(Debug)]
pub struct InboundMessage {
    /// The decoded message.
    pub message: HareMessage,
    report: Option<oneshot::Sender<bool>>,
}

impl InboundMessage {
    /// Wrap a message with no validation reporting.
    pub fn new(message: HareMessage) -> Self {
        Self {
            message,
            report: None,
        }
    }

    /// Wrap a message, reporting the validation outcome on `report`.
    pub fn with_report(message: HareMessage, report: oneshot::Sender<bool>) -> Self {
        Self {
            message,
            report: Some(report),
        }
    }

    /// Report the validation outcome to the broker, at most once.
    ///
    /// Stashed messages go through validation again on re-injection; the
    /// consumed sender makes the second report a no-op.
    pub fn report_validation(&mut self, valid: bool) {
        if let Some(tx) = self.report.take() {
            let _ = tx.send(valid);
        }
    }
}
