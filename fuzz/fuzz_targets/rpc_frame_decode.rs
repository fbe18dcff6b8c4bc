//! Fuzz target for local RPC frame decoding
//!
//! # Invariants
//!
//! - Length prefixes over the limit are rejected before allocation
//! - Body decoding NEVER panics
//! - A decoded request re-encodes to a frame that decodes to the same request

#![no_main]

use bnotify_proto::{
    RpcRequest, RpcResponse,
    rpc::{LENGTH_PREFIX_SIZE, MAX_RPC_BODY, body_len, decode_body, encode_frame},
};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() < LENGTH_PREFIX_SIZE {
        return;
    }

    let (prefix, body) = data.split_at(LENGTH_PREFIX_SIZE);
    let prefix: [u8; LENGTH_PREFIX_SIZE] = prefix.try_into().unwrap();

    if let Ok(len) = body_len(prefix) {
        assert!(len <= MAX_RPC_BODY);
    }

    let _ = decode_body::<RpcResponse>(body);

    if let Ok(request) = decode_body::<RpcRequest>(body) {
        if let Ok(frame) = encode_frame(&request) {
            let again: RpcRequest = decode_body(&frame[LENGTH_PREFIX_SIZE..]).unwrap();
            assert_eq!(again, request);
        }
    }
});
