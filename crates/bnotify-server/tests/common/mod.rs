//! Test doubles shared by the integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::Duration,
};

use bnotify_crypto::SymmetricKey;
use bnotify_proto::NotificationContent;
use bnotify_server::{Environment, Gateway, GatewayError};

pub const TEST_KEY: [u8; 32] = [0x42; 32];

pub fn test_key() -> Arc<SymmetricKey> {
    Arc::new(SymmetricKey::from_bytes(TEST_KEY))
}

pub fn content(title: &str, text: &str) -> NotificationContent {
    NotificationContent { title: title.to_string(), text: text.to_string() }
}

/// Environment that records requested sleeps instead of waiting.
#[derive(Clone, Default)]
pub struct RecordingEnv {
    sleeps: Arc<Mutex<Vec<Duration>>>,
    identity_byte: u8,
}

impl RecordingEnv {
    pub fn with_identity_byte(identity_byte: u8) -> Self {
        Self { sleeps: Arc::default(), identity_byte }
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

impl Environment for RecordingEnv {
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        self.sleeps.lock().unwrap().push(duration);
        tokio::task::yield_now()
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        buffer.fill(self.identity_byte);
    }
}

/// Environment whose sleeps of at least `gate` block until [`GatedEnv::open`].
///
/// Shorter sleeps return at once.
#[derive(Clone)]
pub struct GatedEnv {
    gate: Duration,
    opened: Arc<tokio::sync::watch::Sender<bool>>,
}

impl GatedEnv {
    pub fn new(gate: Duration) -> Self {
        Self { gate, opened: Arc::new(tokio::sync::watch::Sender::new(false)) }
    }

    pub fn open(&self) {
        self.opened.send_replace(true);
    }
}

impl Environment for GatedEnv {
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        let gated = duration >= self.gate;
        let mut opened = self.opened.subscribe();
        async move {
            if !gated {
                tokio::task::yield_now().await;
                return;
            }
            loop {
                let open = *opened.borrow_and_update();
                if open || opened.changed().await.is_err() {
                    return;
                }
            }
        }
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        buffer.fill(0x22);
    }
}

/// Gateway that answers from a script, then succeeds.
#[derive(Clone, Default)]
pub struct ScriptedGateway {
    state: Arc<Mutex<GatewayState>>,
}

#[derive(Default)]
struct GatewayState {
    script: VecDeque<Result<(), GatewayError>>,
    always_fail: bool,
    pushes: Vec<String>,
}

impl ScriptedGateway {
    /// Fail `failures` times with a transport error, then succeed.
    pub fn failing(failures: usize) -> Self {
        let gateway = Self::default();
        {
            let mut state = gateway.state.lock().unwrap();
            for i in 0..failures {
                state.script.push_back(Err(if i % 2 == 0 {
                    GatewayError::Transport("connection reset".to_string())
                } else {
                    GatewayError::Status { status: 503 }
                }));
            }
        }
        gateway
    }

    /// Never succeed.
    pub fn broken() -> Self {
        let gateway = Self::default();
        gateway.state.lock().unwrap().always_fail = true;
        gateway
    }

    pub fn pushes(&self) -> Vec<String> {
        self.state.lock().unwrap().pushes.clone()
    }
}

impl Gateway for ScriptedGateway {
    fn push(
        &self,
        payload: &str,
    ) -> impl std::future::Future<Output = Result<(), GatewayError>> + Send {
        let mut state = self.state.lock().unwrap();
        state.pushes.push(payload.to_string());
        let result = if state.always_fail {
            Err(GatewayError::Rejected("Unavailable".to_string()))
        } else {
            state.script.pop_front().unwrap_or(Ok(()))
        };
        std::future::ready(result)
    }
}
