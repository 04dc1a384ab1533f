//! Fluent construction of signed outgoing messages.

use hare_types::{
    Certificate, HareMessage, InnerMessage, InstanceId, Keypair, MessageType, PublicKey,
    SafeValueProof, Signature, ValueSet,
};
use thiserror::Error;

/// Errors raised when finishing a message.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BuildError {
    /// A required field was never set.
    #[error("missing field: {0}")]
    Missing(&'static str),

    /// A Proposal was built without a safe-value proof.
    #[error("proposal requires a safe-value proof")]
    MissingSvp,

    /// A Notify was built without a certificate.
    #[error("notify requires a certificate")]
    MissingCertificate,

    /// The inner payload could not be encoded for signing.
    #[error("failed to encode inner payload: {0}")]
    Encode(String),
}

/// Builds a [`HareMessage`] field by field, signs the inner payload, and
/// enforces the per-type payload requirements at build time.
///
/// `sign` snapshots the inner payload as it stands, so every inner field
/// must be set before signing. The aggregates ride outside the signature
/// and may be attached in any order.
#[derive(Debug, Default)]
pub struct MessageBuilder {
    pub_key: Option<PublicKey>,
    message_type: Option<MessageType>,
    instance_id: Option<InstanceId>,
    k: Option<u32>,
    ki: i32,
    values: Option<ValueSet>,
    role_proof: Option<Signature>,
    certificate: Option<Certificate>,
    svp: Option<SafeValueProof>,
    signature: Option<Signature>,
    sign_error: Option<BuildError>,
}

impl MessageBuilder {
    /// Start an empty builder. `ki` defaults to -1 (never committed).
    pub fn new() -> Self {
        Self {
            ki: -1,
            ..Default::default()
        }
    }

    /// Set the sender identity.
    pub fn pub_key(mut self, pub_key: PublicKey) -> Self {
        self.pub_key = Some(pub_key);
        self
    }

    /// Set the message type.
    pub fn message_type(mut self, message_type: MessageType) -> Self {
        self.message_type = Some(message_type);
        self
    }

    /// Set the instance id.
    pub fn instance_id(mut self, instance_id: InstanceId) -> Self {
        self.instance_id = Some(instance_id);
        self
    }

    /// Set the round counter.
    pub fn round_counter(mut self, k: u32) -> Self {
        self.k = Some(k);
        self
    }

    /// Set the committed-iteration marker.
    pub fn ki(mut self, ki: i32) -> Self {
        self.ki = ki;
        self
    }

    /// Set the value set the message speaks about.
    pub fn values(mut self, values: ValueSet) -> Self {
        self.values = Some(values);
        self
    }

    /// Attach the role proof for the round counter.
    pub fn role_proof(mut self, proof: Signature) -> Self {
        self.role_proof = Some(proof);
        self
    }

    /// Attach a commit certificate (Notify messages).
    pub fn certificate(mut self, certificate: Certificate) -> Self {
        self.certificate = Some(certificate);
        self
    }

    /// Attach a safe-value proof (Proposal messages).
    pub fn svp(mut self, svp: SafeValueProof) -> Self {
        self.svp = Some(svp);
        self
    }

    /// Sign the inner payload as currently assembled.
    pub fn sign(mut self, keypair: &Keypair) -> Self {
        match self.inner() {
            Ok(inner) => match inner.signed_bytes() {
                Ok(bytes) => self.signature = Some(keypair.sign(&bytes)),
                Err(err) => self.sign_error = Some(BuildError::Encode(err.to_string())),
            },
            Err(err) => self.sign_error = Some(err),
        }
        self
    }

    /// Finish the message, checking per-type payload requirements.
    pub fn build(self) -> Result<HareMessage, BuildError> {
        if let Some(err) = self.sign_error {
            return Err(err);
        }
        let inner = self.inner()?;
        match inner.message_type {
            MessageType::Proposal if self.svp.is_none() => return Err(BuildError::MissingSvp),
            MessageType::Notify if self.certificate.is_none() => {
                return Err(BuildError::MissingCertificate)
            }
            _ => {}
        }
        Ok(HareMessage {
            pub_key: self.pub_key.ok_or(BuildError::Missing("pub_key"))?,
            signature: self.signature.ok_or(BuildError::Missing("signature"))?,
            inner,
            certificate: self.certificate,
            svp: self.svp,
        })
    }

    fn inner(&self) -> Result<InnerMessage, BuildError> {
        Ok(InnerMessage {
            message_type: self.message_type.ok_or(BuildError::Missing("type"))?,
            instance_id: self.instance_id.ok_or(BuildError::Missing("instance_id"))?,
            k: self.k.ok_or(BuildError::Missing("round_counter"))?,
            ki: self.ki,
            values: self
                .values
                .as_ref()
                .ok_or(BuildError::Missing("values"))?
                .to_vec(),
            role_proof: self.role_proof.ok_or(BuildError::Missing("role_proof"))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hare_types::{AggregatedMessages, ValueId};

    fn base_builder(keypair: &Keypair) -> MessageBuilder {
        let values: ValueSet = [ValueId::from_seed(1)].into_iter().collect();
        MessageBuilder::new()
            .pub_key(keypair.public_key())
            .instance_id(InstanceId(1))
            .round_counter(0)
            .values(values)
            .role_proof(crate::roles::role_proof(keypair, 0))
    }

    #[test]
    fn test_build_signed_status() {
        let keypair = Keypair::from_seed(&[1u8; 32]);
        let msg = base_builder(&keypair)
            .message_type(MessageType::Status)
            .sign(&keypair)
            .build()
            .unwrap();
        assert_eq!(msg.inner.message_type, MessageType::Status);
        assert_eq!(msg.inner.ki, -1);
        assert!(msg.verify_signature());
    }

    #[test]
    fn test_unsigned_build_fails() {
        let keypair = Keypair::from_seed(&[1u8; 32]);
        let err = base_builder(&keypair)
            .message_type(MessageType::Status)
            .build()
            .unwrap_err();
        assert_eq!(err, BuildError::Missing("signature"));
    }

    #[test]
    fn test_proposal_requires_svp() {
        let keypair = Keypair::from_seed(&[1u8; 32]);
        let err = base_builder(&keypair)
            .message_type(MessageType::Proposal)
            .sign(&keypair)
            .build()
            .unwrap_err();
        assert_eq!(err, BuildError::MissingSvp);
    }

    #[test]
    fn test_notify_requires_certificate() {
        let keypair = Keypair::from_seed(&[1u8; 32]);
        let err = base_builder(&keypair)
            .message_type(MessageType::Notify)
            .sign(&keypair)
            .build()
            .unwrap_err();
        assert_eq!(err, BuildError::MissingCertificate);
    }

    #[test]
    fn test_notify_with_certificate_builds() {
        let keypair = Keypair::from_seed(&[1u8; 32]);
        let certificate = Certificate {
            values: vec![ValueId::from_seed(1)],
            aggregate: AggregatedMessages { messages: vec![] },
        };
        let msg = base_builder(&keypair)
            .message_type(MessageType::Notify)
            .certificate(certificate)
            .sign(&keypair)
            .build()
            .unwrap();
        assert!(msg.certificate.is_some());
        assert!(msg.verify_signature());
    }

    #[test]
    fn test_missing_type_reported_at_sign() {
        let keypair = Keypair::from_seed(&[1u8; 32]);
        let err = base_builder(&keypair).sign(&keypair).build().unwrap_err();
        assert_eq!(err, BuildError::Missing("type"));
    }
}
