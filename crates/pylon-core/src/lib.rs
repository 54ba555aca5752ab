//! # Pylon Core
//!
//! Request-scoped state for the Pylon toolkit.
//!
//! This crate provides the pieces every stage of a Pylon pipeline reads and
//! writes:
//!
//! - [`store`] - Keyed store backends with type-directed keys
//! - [`Envelope`] - One per in-flight request: store, error slots, flags,
//!   route template and codec
//! - [`StoreManager`] - Pooled envelope allocation with acquire, release and
//!   transfer
//! - [`CallContext`] - Per-call context with O(1) envelope lookup and
//!   hierarchical cancellation
//! - [`Exchange`] - Request, response and context handed to every stage
//! - [`HttpError`] / [`RecordedError`] - Errors recorded into the envelope
//!
//! ## Lifecycle
//!
//! ```text
//!  StoreManager::acquire ──▶ stages read/write Envelope ──▶ StoreManager::release
//!                                        │
//!                                        └── StoreManager::transfer ──▶ OwnedEnvelope
//! ```

#![doc(html_root_url = "https://docs.rs/pylon-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod cancel;
pub mod codec;
mod context;
mod envelope;
mod error;
mod exchange;
mod flags;
mod manager;
pub mod store;

pub use cancel::{CancelOnDrop, CancelSignal};
pub use codec::{CodecPair, Decoder, Encoder, JsonCodec};
pub use context::{CallContext, RequestId};
pub use envelope::{Envelope, OwnedEnvelope};
pub use error::{
    CoreError, CoreResult, ErrorBody, ErrorBodyDetail, ErrorCategory, HttpError, RecordedError,
};
pub use exchange::{Exchange, Request, Response};
pub use flags::Flags;
pub use manager::{
    EnvelopeScope, ManagerStats, StoreManager, StoreManagerConfig, DEFAULT_MAX_IDLE,
    DEFAULT_PREFILL,
};
pub use store::{HashableKey, Key, StoreBackend};
