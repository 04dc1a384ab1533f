//! Core types for the Hare set-agreement protocol.
//!
//! This crate provides the foundational types used throughout the consensus
//! implementation:
//!
//! - **Primitives**: FNV-32 hashing, Ed25519 keys and signatures
//! - **Identifiers**: InstanceId, ValueId, SetId
//! - **Protocol types**: ValueSet, HareMessage, Certificate, SafeValueProof
//! - **Configuration**: committee size, fault tolerance, round duration
//!
//! # Design Philosophy
//!
//! This crate is self-contained with minimal dependencies. It does not depend
//! on any other workspace crates, making it the foundation layer.

mod config;
mod crypto;
mod hash;
mod identifiers;
mod message;
mod set;

pub use config::{ConfigError, HareConfig};
pub use crypto::{Keypair, PublicKey, Signature};
pub use hash::{eligibility_seed, role_proof_digest, Fnv32};
pub use identifiers::{InstanceId, ValueId};
pub use message::{
    AggregatedMessages, Certificate, HareMessage, InnerMessage, MessageType, SafeValueProof,
};
pub use set::{SetId, ValueSet};
