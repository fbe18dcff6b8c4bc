//! Fuzz target for the receiving decode path
//!
//! # Strategy
//!
//! - Raw strings: arbitrary gateway payloads through base64 + CBOR decode
//! - Mutated envelopes: a genuine sealed envelope with fuzzer-chosen bit
//!   flips and truncation
//!
//! # Invariants
//!
//! - Decoding NEVER panics
//! - `open` of anything but the untouched envelope is `AuthenticationFailed`
//! - The untouched envelope opens to the original message

#![no_main]

use arbitrary::Arbitrary;
use bnotify_crypto::{CryptoError, SymmetricKey, open, seal};
use bnotify_proto::{Envelope, Message, NotificationContent, ServerIdentity};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
enum Input {
    Raw(String),
    Mutated { seq: u64, flips: Vec<(u16, u8)>, truncate: Option<u16> },
}

fuzz_target!(|input: Input| {
    let key = SymmetricKey::from_bytes([0x5A; 32]);

    match input {
        Input::Raw(payload) => {
            if let Ok(envelope) = Envelope::from_gateway_payload(&payload) {
                let _ = open(&key, &envelope);
            }
        },
        Input::Mutated { seq, flips, truncate } => {
            let message = Message {
                server_id: ServerIdentity::from_bytes([1; 16]),
                seq,
                notification: NotificationContent { title: "T".into(), text: "X".into() },
            };
            let original = seal(&key, &message).unwrap();

            let mut envelope = original.clone();
            for (pos, mask) in flips {
                let len = envelope.ciphertext.len() + envelope.nonce.len();
                let pos = pos as usize % len;
                if pos < envelope.ciphertext.len() {
                    envelope.ciphertext[pos] ^= mask;
                } else {
                    envelope.nonce[pos - envelope.ciphertext.len()] ^= mask;
                }
            }
            if let Some(cut) = truncate {
                envelope.ciphertext.truncate(cut as usize);
            }

            match open(&key, &envelope) {
                Ok(opened) => {
                    assert_eq!(envelope, original, "modified envelope authenticated");
                    assert_eq!(opened, message);
                },
                Err(e) => {
                    assert_ne!(envelope, original, "genuine envelope rejected");
                    assert!(matches!(e, CryptoError::AuthenticationFailed { .. }));
                },
            }
        },
    }
});
