//! Bnotify receiving side.
//!
//! Everything the paired device does with a push payload, minus the UI:
//! open the envelope, reject replays, and hand fresh notifications to a
//! [`NotificationSink`]. Settings changes invalidate the cached key.
//!
//! # Components
//!
//! - [`ReplayGuard`]: interval set of accepted sequence numbers
//! - [`ReceiverStorage`]: durable ranges, settings, and cached key
//!   ([`RedbStorage`] in production)
//! - [`Receiver`]: the pipeline

#![forbid(unsafe_code)]

mod receiver;
pub mod replay;
pub mod storage;

pub use receiver::{NotificationSink, ReceiveError, ReceiveOutcome, Receiver};
pub use replay::{RangeError, ReplayGuard, UsedRange};
pub use storage::{MemoryStorage, ReceiverStorage, RedbStorage, Secret, StorageError};
