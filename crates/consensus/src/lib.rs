//! Hare consensus core.
//!
//! This crate implements one instance of the four-round Byzantine
//! fault-tolerant set-agreement protocol. Given a starting set of candidate
//! values at each honest participant, the instance outputs a single agreed
//! set together with a certificate proving agreement, or closes without
//! output when the fault bound is exceeded.
//!
//! # Architecture
//!
//! Each [`ConsensusProcess`] runs a single event loop that selects over its
//! inbox, the round timer, and a close signal:
//!
//! ```text
//! inbox ─┐
//! timer ─┼─ select ─→ validator ─→ trackers ─→ round handlers ─→ broadcast
//! close ─┘                                          │
//!                                                   └─→ termination output
//! ```
//!
//! Trackers and state are owned by the loop and never shared across tasks,
//! so no locking is required. All I/O goes through two injected capabilities:
//! a [`NetworkService`] for gossip broadcast and a [`RoleOracle`] for
//! per-round eligibility sampling.
//!
//! # Rounds
//!
//! The round counter `k` starts at 0 after the PreRound bootstrap phase.
//! `k / 4` is the iteration and `k % 4` the round within it:
//!
//! - **Status** (`k % 4 == 0`): every active participant reports its set.
//! - **Proposal** (`k % 4 == 1`): the sampled leader proposes the union of
//!   reported sets, justified by a safe-value proof.
//! - **Commit** (`k % 4 == 2`): participants vote to commit the proposal;
//!   f+1 matching commits form a certificate and trigger a notification.
//! - **Notify** (`k % 4 == 3`): certificates propagate; f+1 notifications
//!   on one set terminate the instance.

mod builder;
mod codec;
mod process;
mod roles;
mod traits;
mod trackers;
mod validator;

#[cfg(test)]
pub(crate) mod testutil;

pub use builder::{BuildError, MessageBuilder};
pub use codec::{decode_message, encode_message, CodecError, GOSSIP_PROTOCOL, WIRE_VERSION};
pub use process::{Closer, ConsensusProcess, ProcessError, StartError, State};
pub use roles::{expected_committee_size, role_proof, validate_role_proof, Role};
pub use traits::{
    InboundMessage, NetworkError, NetworkService, OracleError, RoleOracle, TerminationOutput,
};
pub use trackers::{
    CommitTracker, NotifyTracker, PreRoundTracker, ProposalTracker, StatusTracker,
};
pub use validator::{ContextError, MessageValidator, SyntaxError};

/// Round within an iteration, derived from the round counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Round {
    /// Participants report their current sets.
    Status,
    /// The leader proposes a set.
    Proposal,
    /// Participants vote to commit the proposal.
    Commit,
    /// Commit certificates propagate.
    Notify,
}

impl Round {
    /// The round a counter value falls in.
    pub fn from_counter(k: u32) -> Self {
        match k % 4 {
            0 => Round::Status,
            1 => Round::Proposal,
            2 => Round::Commit,
            _ => Round::Notify,
        }
    }

    /// The iteration a counter value falls in.
    pub fn iteration(k: u32) -> u32 {
        k / 4
    }
}
