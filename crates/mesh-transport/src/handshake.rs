//! Three-message mutual-authentication handshake.
//!
//! Both sides prove possession of their signing key over a freshly minted
//! challenge. The initiator mints [`MessageId`] once in [`create_initial`]
//! and it rides unchanged through Response and Confirm, so each side's
//! per-session pending-challenge table can be keyed on it directly.

use mesh_core::envelope::{HandshakeConfirm, HandshakeInit, HandshakeResponse, MessageId};
use mesh_core::error::AuthenticationError;
use mesh_core::identity::NodeId;
use mesh_crypto::SignatureService;
use rand::RngCore;
use uuid::Uuid;

pub struct HandshakeEngine;

impl HandshakeEngine {
    /// Initiator side: mint a challenge, sign our own id over it, and return
    /// the message id the caller must remember to match the later Response.
    pub fn create_initial(
        signature: &SignatureService,
        local_id: &NodeId,
    ) -> (MessageId, HandshakeInit, [u8; 32]) {
        let mut challenge = [0u8; 32];
        rand::rng().fill_bytes(&mut challenge);

        let sig = signature.sign(local_id.as_bytes());
        let init = HandshakeInit { public_key: signature.public_key(), signature: sig, challenge };

        (Uuid::new_v4(), init, challenge)
    }

    /// Acceptor side: verify the initiator's signature over its own
    /// (claimed) id, mint our own challenge, echo theirs, and sign
    /// `local_id || their_challenge` to prove we hold our key too.
    pub fn handle_init(
        signature: &SignatureService,
        local_id: &NodeId,
        sender_id: &NodeId,
        msg: &HandshakeInit,
    ) -> Result<(HandshakeResponse, [u8; 32]), AuthenticationError> {
        if !SignatureService::verify(sender_id.as_bytes(), &msg.signature, &msg.public_key) {
            return Err(AuthenticationError::SignatureInvalid);
        }

        let mut challenge = [0u8; 32];
        rand::rng().fill_bytes(&mut challenge);

        let mut to_sign = local_id.as_bytes().to_vec();
        to_sign.extend_from_slice(&msg.challenge);
        let sig = signature.sign(&to_sign);

        let response = HandshakeResponse {
            public_key: signature.public_key(),
            signature: sig,
            challenge,
            challenge_echo: msg.challenge,
        };
        Ok((response, challenge))
    }

    /// Initiator side: verify the acceptor echoed our challenge and proved
    /// key possession, then sign their challenge back to complete the
    /// exchange.
    pub fn handle_response(
        signature: &SignatureService,
        peer_id: &NodeId,
        stored_challenge: [u8; 32],
        msg: &HandshakeResponse,
    ) -> Result<HandshakeConfirm, AuthenticationError> {
        if msg.challenge_echo != stored_challenge {
            return Err(AuthenticationError::ChallengeMismatch);
        }

        let mut to_verify = peer_id.as_bytes().to_vec();
        to_verify.extend_from_slice(&stored_challenge);
        if !SignatureService::verify(&to_verify, &msg.signature, &msg.public_key) {
            return Err(AuthenticationError::SignatureInvalid);
        }

        let sig = signature.sign(&msg.challenge);
        Ok(HandshakeConfirm { signature: sig, challenge_echo: msg.challenge })
    }

    /// Acceptor side: verify the initiator's final proof over the challenge
    /// we issued in [`handle_init`].
    pub fn verify_confirm(
        peer_public_key: &[u8],
        stored_challenge: [u8; 32],
        msg: &HandshakeConfirm,
    ) -> bool {
        if msg.challenge_echo != stored_challenge {
            return false;
        }
        SignatureService::verify(&stored_challenge, &msg.signature, peer_public_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_exchange_succeeds() {
        let alice_sig = SignatureService::generate();
        let bob_sig = SignatureService::generate();
        let alice_id = alice_sig.node_id();
        let bob_id = bob_sig.node_id();

        let (_msg_id, init, alice_challenge) = HandshakeEngine::create_initial(&alice_sig, &alice_id);

        let (response, bob_challenge) =
            HandshakeEngine::handle_init(&bob_sig, &bob_id, &alice_id, &init).unwrap();

        let confirm =
            HandshakeEngine::handle_response(&alice_sig, &bob_id, alice_challenge, &response).unwrap();

        assert!(HandshakeEngine::verify_confirm(&alice_sig.public_key(), bob_challenge, &confirm));
    }

    #[test]
    fn tampered_init_signature_rejected() {
        let alice_sig = SignatureService::generate();
        let bob_sig = SignatureService::generate();
        let bob_id = bob_sig.node_id();
        let wrong_id = SignatureService::generate().node_id();

        let (_id, init, _challenge) = HandshakeEngine::create_initial(&alice_sig, &wrong_id);
        let result = HandshakeEngine::handle_init(&bob_sig, &bob_id, &wrong_id, &init);
        assert!(result.is_err());
    }

    #[test]
    fn mismatched_challenge_echo_rejected() {
        let alice_sig = SignatureService::generate();
        let bob_sig = SignatureService::generate();
        let alice_id = alice_sig.node_id();
        let bob_id = bob_sig.node_id();

        let (_id, init, _alice_challenge) = HandshakeEngine::create_initial(&alice_sig, &alice_id);
        let (response, _bob_challenge) =
            HandshakeEngine::handle_init(&bob_sig, &bob_id, &alice_id, &init).unwrap();

        let wrong_challenge = [0xFFu8; 32];
        let result = HandshakeEngine::handle_response(&alice_sig, &bob_id, wrong_challenge, &response);
        assert!(matches!(result, Err(AuthenticationError::ChallengeMismatch)));
    }

    #[test]
    fn verify_confirm_rejects_wrong_key() {
        let alice_sig = SignatureService::generate();
        let bob_sig = SignatureService::generate();
        let alice_id = alice_sig.node_id();
        let bob_id = bob_sig.node_id();

        let (_id, init, alice_challenge) = HandshakeEngine::create_initial(&alice_sig, &alice_id);
        let (response, bob_challenge) =
            HandshakeEngine::handle_init(&bob_sig, &bob_id, &alice_id, &init).unwrap();
        let confirm =
            HandshakeEngine::handle_response(&alice_sig, &bob_id, alice_challenge, &response).unwrap();

        let impostor = SignatureService::generate();
        assert!(!HandshakeEngine::verify_confirm(&impostor.public_key(), bob_challenge, &confirm));
    }
}
