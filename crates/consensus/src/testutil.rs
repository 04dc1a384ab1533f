//! Shared helpers for in-crate tests: deterministic keypairs, message
//! factories, and stub capability implementations.

use crate::builder::MessageBuilder;
use crate::roles;
use crate::traits::{NetworkError, NetworkService, OracleError, RoleOracle};
use hare_types::{
    AggregatedMessages, Certificate, HareMessage, InstanceId, Keypair, MessageType, PublicKey,
    SafeValueProof, Signature, ValueId, ValueSet,
};
use std::sync::Mutex;
use tokio::sync::mpsc;

pub(crate) fn keypair(seed: u8) -> Keypair {
    Keypair::from_seed(&[seed; 32])
}

pub(crate) fn values(seeds: &[u8]) -> ValueSet {
    seeds.iter().map(|&s| ValueId::from_seed(s)).collect()
}

pub(crate) fn make_message(
    signer: &Keypair,
    instance_id: InstanceId,
    message_type: MessageType,
    k: u32,
    ki: i32,
    seeds: &[u8],
) -> MessageBuilder {
    MessageBuilder::new()
        .pub_key(signer.public_key())
        .instance_id(instance_id)
        .message_type(message_type)
        .round_counter(k)
        .ki(ki)
        .values(values(seeds))
        .role_proof(roles::role_proof(signer, k))
}

pub(crate) fn make_pre_round(
    signer: &Keypair,
    instance_id: InstanceId,
    seeds: &[u8],
) -> HareMessage {
    make_message(signer, instance_id, MessageType::PreRound, 0, -1, seeds)
        .sign(signer)
        .build()
        .unwrap()
}

pub(crate) fn make_status(
    signer: &Keypair,
    instance_id: InstanceId,
    k: u32,
    ki: i32,
    seeds: &[u8],
) -> HareMessage {
    make_message(signer, instance_id, MessageType::Status, k, ki, seeds)
        .sign(signer)
        .build()
        .unwrap()
}

pub(crate) fn make_commit(
    signer: &Keypair,
    instance_id: InstanceId,
    k: u32,
    seeds: &[u8],
) -> HareMessage {
    make_message(signer, instance_id, MessageType::Commit, k, -1, seeds)
        .sign(signer)
        .build()
        .unwrap()
}

pub(crate) fn make_certificate(
    signers: &[&Keypair],
    instance_id: InstanceId,
    k: u32,
    seeds: &[u8],
) -> Certificate {
    let commits = signers
        .iter()
        .map(|signer| make_commit(signer, instance_id, k, seeds))
        .collect();
    Certificate {
        values: values(seeds).to_vec(),
        aggregate: AggregatedMessages { messages: commits },
    }
}

pub(crate) fn make_notify(
    signer: &Keypair,
    instance_id: InstanceId,
    k: u32,
    ki: i32,
    seeds: &[u8],
    certificate: Certificate,
) -> HareMessage {
    make_message(signer, instance_id, MessageType::Notify, k, ki, seeds)
        .certificate(certificate)
        .sign(signer)
        .build()
        .unwrap()
}

pub(crate) fn make_svp(
    signers: &[&Keypair],
    instance_id: InstanceId,
    k: u32,
    seeds: &[u8],
) -> SafeValueProof {
    let statuses = signers
        .iter()
        .map(|signer| make_status(signer, instance_id, k, -1, seeds))
        .collect();
    SafeValueProof {
        aggregate: AggregatedMessages { messages: statuses },
    }
}

pub(crate) fn make_proposal(
    signer: &Keypair,
    instance_id: InstanceId,
    k: u32,
    seeds: &[u8],
    svp: SafeValueProof,
) -> HareMessage {
    make_message(signer, instance_id, MessageType::Proposal, k, -1, seeds)
        .svp(svp)
        .sign(signer)
        .build()
        .unwrap()
}

/// Oracle that admits everyone to every committee.
pub(crate) struct AlwaysEligible;

impl RoleOracle for AlwaysEligible {
    fn eligible(
        &self,
        _seed: u32,
        _committee_size: usize,
        _identity: &PublicKey,
        _role_proof: &Signature,
    ) -> Result<bool, OracleError> {
        Ok(true)
    }
}

/// Oracle that never answers.
pub(crate) struct UnavailableOracle;

impl RoleOracle for UnavailableOracle {
    fn eligible(
        &self,
        _seed: u32,
        _committee_size: usize,
        _identity: &PublicKey,
        _role_proof: &Signature,
    ) -> Result<bool, OracleError> {
        Err(OracleError::Unavailable("no answer".into()))
    }
}

/// Network that records every broadcast payload.
#[derive(Default)]
pub(crate) struct RecordingNetwork {
    sent: Mutex<Vec<Vec<u8>>>,
}

impl RecordingNetwork {
    pub(crate) fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn sent_messages(&self) -> Vec<HareMessage> {
        self.sent()
            .iter()
            .map(|payload| crate::codec::decode_message(payload).unwrap())
            .collect()
    }
}

impl NetworkService for RecordingNetwork {
    fn register_gossip_protocol(&self, _protocol: &str) -> mpsc::UnboundedReceiver<Vec<u8>> {
        let (_tx, rx) = mpsc::unbounded_channel();
        rx
    }

    fn broadcast(&self, _protocol: &str, payload: Vec<u8>) -> Result<(), NetworkError> {
        self.sent.lock().unwrap().push(payload);
        Ok(())
    }
}
