//! Syntactic and contextual message validation.
//!
//! Syntactic validation is pure and final: a message that fails it can
//! never become valid and is dropped without being stashed. Contextual
//! validation judges a message against a candidate round counter; a message
//! that fails for the current counter may still pass for the next one, in
//! which case the caller stashes it as an early arrival.

use crate::Round;
use hare_types::{AggregatedMessages, HareMessage, MessageType, PublicKey, ValueSet};
use std::collections::BTreeSet;
use thiserror::Error;

/// Final validation failures. Never stash a message that produced one.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SyntaxError {
    #[error("values list is empty")]
    EmptyValues,

    #[error("signature verification failed")]
    BadSignature,

    #[error("proposal is missing its safe-value proof")]
    MissingSvp,

    #[error("notify is missing its certificate")]
    MissingCertificate,

    #[error("{0} messages carry no aggregate")]
    UnexpectedAggregate(&'static str),

    #[error("aggregate has {have} distinct senders, needs {need}")]
    InsufficientAggregate { have: usize, need: usize },

    #[error("aggregate contains a {found} message, expected {expected}")]
    AggregateType {
        expected: &'static str,
        found: &'static str,
    },

    #[error("aggregate message speaks about a different set")]
    AggregateSetMismatch,

    #[error("aggregate messages span multiple rounds")]
    AggregateRoundMismatch,
}

/// Round-context failures. A message failing for round `candidate_k` may be
/// stashed if it passes for `candidate_k + 1`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContextError {
    #[error("message for round {msg_k} not valid at round {candidate_k}")]
    WrongRound { msg_k: u32, candidate_k: u32 },

    #[error("notify for round {msg_k} outside the iteration of round {candidate_k}")]
    WrongIteration { msg_k: u32, candidate_k: u32 },
}

/// Validates inbound messages. Pure: holds only the evidence threshold.
#[derive(Debug, Clone)]
pub struct MessageValidator {
    threshold: usize,
}

impl MessageValidator {
    /// Create a validator enforcing aggregates of at least `threshold`
    /// (f+1) distinct senders.
    pub fn new(threshold: usize) -> Self {
        Self { threshold }
    }

    /// Check well-formedness: signatures, non-empty values, and the
    /// per-type aggregate requirements, including every nested message.
    pub fn validate_syntax(&self, msg: &HareMessage) -> Result<(), SyntaxError> {
        if msg.inner.values.is_empty() {
            return Err(SyntaxError::EmptyValues);
        }
        if !msg.verify_signature() {
            return Err(SyntaxError::BadSignature);
        }

        match msg.inner.message_type {
            MessageType::PreRound | MessageType::Status | MessageType::Commit => {
                // These types carry no aggregate. Rejecting stray payloads
                // keeps trackers from storing unbounded attacker bytes for
                // the rest of the round.
                if msg.svp.is_some() || msg.certificate.is_some() {
                    return Err(SyntaxError::UnexpectedAggregate(
                        msg.inner.message_type.name(),
                    ));
                }
                Ok(())
            }
            MessageType::Proposal => {
                let svp = msg.svp.as_ref().ok_or(SyntaxError::MissingSvp)?;
                self.validate_aggregate(&svp.aggregate, MessageType::Status, None)
            }
            MessageType::Notify => {
                let cert = msg.certificate.as_ref().ok_or(SyntaxError::MissingCertificate)?;
                let certified = cert.value_set();
                self.validate_aggregate(&cert.aggregate, MessageType::Commit, Some(&certified))
            }
        }
    }

    /// Check round context against `candidate_k`.
    ///
    /// PreRound is timeless. Status and Commit demand an exact counter
    /// match. A Proposal is valid in its own round and, as a late arrival,
    /// during the following commit round. A Notify is valid anywhere within
    /// its iteration.
    pub fn validate_context(
        &self,
        msg: &HareMessage,
        candidate_k: u32,
    ) -> Result<(), ContextError> {
        let msg_k = msg.inner.k;
        match msg.inner.message_type {
            MessageType::PreRound => Ok(()),
            MessageType::Status | MessageType::Commit => {
                if msg_k == candidate_k {
                    Ok(())
                } else {
                    Err(ContextError::WrongRound { msg_k, candidate_k })
                }
            }
            MessageType::Proposal => {
                let in_own_round = msg_k == candidate_k;
                let late = msg_k.checked_add(1) == Some(candidate_k);
                if Round::from_counter(msg_k) == Round::Proposal && (in_own_round || late) {
                    Ok(())
                } else {
                    Err(ContextError::WrongRound { msg_k, candidate_k })
                }
            }
            MessageType::Notify => {
                if Round::iteration(msg_k) == Round::iteration(candidate_k) {
                    Ok(())
                } else {
                    Err(ContextError::WrongIteration { msg_k, candidate_k })
                }
            }
        }
    }

    fn validate_aggregate(
        &self,
        aggregate: &AggregatedMessages,
        expected_type: MessageType,
        expected_set: Option<&ValueSet>,
    ) -> Result<(), SyntaxError> {
        let mut senders: BTreeSet<PublicKey> = BTreeSet::new();
        let mut round = None;

        for nested in &aggregate.messages {
            if nested.inner.message_type != expected_type {
                return Err(SyntaxError::AggregateType {
                    expected: expected_type.name(),
                    found: nested.inner.message_type.name(),
                });
            }
            if nested.inner.values.is_empty() {
                return Err(SyntaxError::EmptyValues);
            }
            if !nested.verify_signature() {
                return Err(SyntaxError::BadSignature);
            }
            if let Some(expected) = expected_set {
                if &nested.value_set() != expected {
                    return Err(SyntaxError::AggregateSetMismatch);
                }
            }
            match round {
                None => round = Some(nested.inner.k),
                Some(k) if k != nested.inner.k => {
                    return Err(SyntaxError::AggregateRoundMismatch)
                }
                Some(_) => {}
            }
            senders.insert(nested.pub_key);
        }

        if senders.len() < self.threshold {
            return Err(SyntaxError::InsufficientAggregate {
                have: senders.len(),
                need: self.threshold,
            });
        }
        Ok(())
    }
}
