//! Envelope sealing using `XChaCha20-Poly1305`
//!
//! All functions are pure: the nonce is derived from the message itself, so no
//! randomness is needed and sealing the same message twice is byte-identical.

use bnotify_proto::{Envelope, Message, ServerIdentity};
use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit},
};

use crate::{error::CryptoError, key::SymmetricKey};

/// `XChaCha20` nonce size (24 bytes)
pub const NONCE_SIZE: usize = 24;

/// Poly1305 tag size (16 bytes)
pub const TAG_SIZE: usize = 16;

const _: () = assert!(ServerIdentity::SIZE + 8 == NONCE_SIZE);

/// Build the 24-byte nonce for `(server_id, seq)`.
///
/// Structure:
/// - bytes 0-15: `server_id`
/// - bytes 16-23: `seq` (big-endian)
pub fn build_nonce(server_id: &ServerIdentity, seq: u64) -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    nonce[..ServerIdentity::SIZE].copy_from_slice(server_id.as_bytes());
    nonce[ServerIdentity::SIZE..].copy_from_slice(&seq.to_be_bytes());
    nonce
}

/// Encrypt a message into an envelope.
///
/// # Security
///
/// The caller guarantees `(message.server_id, message.seq)` was never sealed
/// before under `key`. The sender's sequence allocator is what upholds this.
pub fn seal(key: &SymmetricKey, message: &Message) -> Result<Envelope, CryptoError> {
    let plaintext = message.encode().map_err(|e| CryptoError::Serialization(e.to_string()))?;
    let nonce = build_nonce(&message.server_id, message.seq);
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());

    let Ok(ciphertext) = cipher.encrypt(XNonce::from_slice(&nonce), plaintext.as_slice()) else {
        unreachable!("XChaCha20-Poly1305 encryption cannot fail with valid inputs");
    };

    debug_assert_eq!(ciphertext.len(), plaintext.len() + TAG_SIZE);

    Ok(Envelope { ciphertext, nonce: nonce.to_vec() })
}

/// Decrypt and authenticate an envelope.
///
/// # Errors
///
/// - `AuthenticationFailed`: wrong key, tampered ciphertext or nonce,
///   malformed nonce, undecodable plaintext, or a nonce that does not match
///   the decrypted message's `(server_id, seq)`
pub fn open(key: &SymmetricKey, envelope: &Envelope) -> Result<Message, CryptoError> {
    if envelope.nonce.len() != NONCE_SIZE {
        return Err(CryptoError::auth(format!(
            "nonce must be {NONCE_SIZE} bytes, got {}",
            envelope.nonce.len()
        )));
    }
    if envelope.ciphertext.len() < TAG_SIZE {
        return Err(CryptoError::auth("ciphertext shorter than tag"));
    }

    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    let plaintext = cipher
        .decrypt(XNonce::from_slice(&envelope.nonce), envelope.ciphertext.as_slice())
        .map_err(|_| CryptoError::auth("tag mismatch"))?;

    let message =
        Message::decode(&plaintext).map_err(|e| CryptoError::auth(format!("plaintext: {e}")))?;

    if build_nonce(&message.server_id, message.seq).as_slice() != envelope.nonce.as_slice() {
        return Err(CryptoError::auth("nonce does not match message"));
    }

    Ok(message)
}

#[cfg(test)]
mod tests {
    use bnotify_proto::NotificationContent;

    use super::*;
    use crate::key::KEY_SIZE;

    fn test_key(fill: u8) -> SymmetricKey {
        SymmetricKey::from_bytes([fill; KEY_SIZE])
    }

    fn test_message(seq: u64) -> Message {
        Message {
            server_id: ServerIdentity::from_bytes([0x11; 16]),
            seq,
            notification: NotificationContent::new("Build finished", "All 42 tests passed")
                .unwrap(),
        }
    }

    #[test]
    fn seal_open_roundtrip() {
        let key = test_key(0x42);
        let message = test_message(1);

        let envelope = seal(&key, &message).unwrap();
        assert_eq!(open(&key, &envelope).unwrap(), message);
    }

    #[test]
    fn nonce_structure() {
        let id = ServerIdentity::from_bytes([0xAB; 16]);
        let nonce = build_nonce(&id, 0x0102_0304_0506_0708);

        assert_eq!(&nonce[0..16], &[0xAB; 16]);
        assert_eq!(&nonce[16..24], &[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08]);
    }

    #[test]
    fn envelope_carries_nonce() {
        let message = test_message(7);
        let envelope = seal(&test_key(1), &message).unwrap();
        assert_eq!(envelope.nonce, build_nonce(&message.server_id, 7).to_vec());
    }

    #[test]
    fn wrong_key_fails() {
        let envelope = seal(&test_key(1), &test_message(1)).unwrap();
        assert!(matches!(
            open(&test_key(2), &envelope),
            Err(CryptoError::AuthenticationFailed { .. })
        ));
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let key = test_key(1);
        let mut envelope = seal(&key, &test_message(1)).unwrap();
        envelope.ciphertext[0] ^= 0x01;

        assert!(matches!(open(&key, &envelope), Err(CryptoError::AuthenticationFailed { .. })));
    }

    #[test]
    fn tampered_nonce_fails() {
        let key = test_key(1);
        let mut envelope = seal(&key, &test_message(1)).unwrap();
        envelope.nonce[23] ^= 0x01;

        assert!(matches!(open(&key, &envelope), Err(CryptoError::AuthenticationFailed { .. })));
    }

    #[test]
    fn malformed_structure_fails() {
        let key = test_key(1);
        let good = seal(&key, &test_message(1)).unwrap();

        let short_nonce = Envelope { ciphertext: good.ciphertext.clone(), nonce: vec![0; 12] };
        let empty_ciphertext = Envelope { ciphertext: Vec::new(), nonce: good.nonce.clone() };

        assert!(open(&key, &short_nonce).is_err());
        assert!(open(&key, &empty_ciphertext).is_err());
    }

    #[test]
    fn mismatched_nonce_and_message_fails() {
        // Authentic ciphertext whose nonce claims a different seq than the
        // plaintext inside it
        let key = test_key(1);
        let message = test_message(5);
        let plaintext = message.encode().unwrap();
        let forged_nonce = build_nonce(&message.server_id, 6);
        let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
        let ciphertext =
            cipher.encrypt(XNonce::from_slice(&forged_nonce), plaintext.as_slice()).unwrap();

        let envelope = Envelope { ciphertext, nonce: forged_nonce.to_vec() };
        let result = open(&key, &envelope);

        assert!(matches!(
            result,
            Err(CryptoError::AuthenticationFailed { reason }) if reason.contains("nonce")
        ));
    }

    #[test]
    fn largest_notification_survives_the_gateway_encoding() {
        let key = test_key(4);
        // Multi-byte text: the limit counts bytes, not chars
        let text = "\u{1F514}".repeat(bnotify_proto::MAX_CONTENT_SIZE / 4 - 1) + "abc";
        let message = Message {
            server_id: ServerIdentity::from_bytes([0xFF; 16]),
            seq: u64::MAX,
            notification: NotificationContent::new("T", text).unwrap(),
        };
        assert_eq!(message.notification.title.len() + message.notification.text.len(), 61_440);

        let payload = seal(&key, &message).unwrap().to_gateway_payload().unwrap();
        let envelope = Envelope::from_gateway_payload(&payload).unwrap();
        assert_eq!(open(&key, &envelope).unwrap(), message);
    }

    #[test]
    fn sealing_is_deterministic() {
        let key = test_key(3);
        let message = test_message(9);
        assert_eq!(seal(&key, &message).unwrap(), seal(&key, &message).unwrap());
    }
}
