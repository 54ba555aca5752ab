//! Pooled envelope allocation.
//!
//! The [`StoreManager`] hands one [`Envelope`] to each call and takes it back
//! when the call finishes. Idle envelopes sit in a lock-free bounded queue
//! shared by every worker thread:
//!
//! ```text
//!            acquire                       release
//!  idle queue ───────▶ CallContext ─────────────────▶ idle queue
//!      ▲                    │ transfer
//!      │ reclaim            ▼
//!      └──────────── OwnedEnvelope (caller owns it)
//! ```
//!
//! The pool never runs dry: an empty queue means a fresh allocation, and a
//! full queue on release means the envelope is dropped. Ownership is tracked
//! by moves, so the pool can never receive the same envelope twice.

use crate::codec::CodecPair;
use crate::context::CallContext;
use crate::envelope::{Envelope, OwnedEnvelope};
use crate::flags::Flags;
use crate::store::StoreBackend;
use crossbeam_queue::ArrayQueue;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, trace};

/// Envelopes created up front.
pub const DEFAULT_PREFILL: usize = 32;

/// Idle envelopes retained by default.
pub const DEFAULT_MAX_IDLE: usize = 1024;

/// Sizing and backend choice for a [`StoreManager`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreManagerConfig {
    /// Backend used for every envelope.
    pub backend: StoreBackend,
    /// Envelopes allocated when the manager is created.
    pub prefill: usize,
    /// Upper bound on idle envelopes kept for reuse.
    pub max_idle: usize,
}

impl Default for StoreManagerConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            prefill: DEFAULT_PREFILL,
            max_idle: DEFAULT_MAX_IDLE,
        }
    }
}

/// Counters describing pool behaviour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ManagerStats {
    /// Envelopes ever allocated.
    pub allocated: usize,
    /// Envelopes currently idle in the pool.
    pub idle: usize,
    /// Envelopes handed out through [`StoreManager::transfer`].
    pub transferred: usize,
    /// Envelopes dropped because the pool was full.
    pub discarded: usize,
}

/// Owns the envelope pool.
///
/// Shared between connections as `Arc<StoreManager>`; every method takes
/// `&self`.
///
/// # Example
///
/// ```
/// use pylon_core::{CallContext, StoreManager};
///
/// let manager = StoreManager::default();
/// let mut ctx = CallContext::new();
///
/// manager.acquire(&mut ctx);
/// ctx.envelope_mut().unwrap().insert("user", 42u64);
/// manager.release(&mut ctx);
///
/// assert!(!ctx.has_envelope());
/// ```
#[derive(Debug)]
pub struct StoreManager {
    idle: ArrayQueue<Box<Envelope>>,
    backend: StoreBackend,
    codec: CodecPair,
    allocated: AtomicUsize,
    transferred: AtomicUsize,
    discarded: AtomicUsize,
}

impl StoreManager {
    /// Creates a manager and prefills its pool.
    #[must_use]
    pub fn new(config: &StoreManagerConfig, codec: CodecPair) -> Self {
        let manager = Self {
            idle: ArrayQueue::new(config.max_idle.max(1)),
            backend: config.backend,
            codec,
            allocated: AtomicUsize::new(0),
            transferred: AtomicUsize::new(0),
            discarded: AtomicUsize::new(0),
        };
        for _ in 0..config.prefill.min(manager.idle.capacity()) {
            let envelope = manager.allocate();
            // Capacity was checked above.
            let _ = manager.idle.push(envelope);
        }
        manager
    }

    /// The backend envelopes are created with.
    #[must_use]
    pub const fn backend(&self) -> StoreBackend {
        self.backend
    }

    /// The codec installed on acquired envelopes.
    #[must_use]
    pub fn codec(&self) -> &CodecPair {
        &self.codec
    }

    /// Attaches a ready envelope to `ctx`.
    ///
    /// The envelope comes from the pool, or is allocated if the pool is
    /// empty. Its flags and error slots are cleared and the manager's codec
    /// is installed. An envelope already held by `ctx` is released first;
    /// if that one was transferred it stays in place and nothing is acquired.
    pub fn acquire(&self, ctx: &mut CallContext) {
        if ctx.has_envelope() {
            self.release(ctx);
            if ctx.has_envelope() {
                debug!("context already carries a transferred envelope, not acquiring");
                return;
            }
        }

        let mut envelope = self.idle.pop().unwrap_or_else(|| {
            debug!(backend = %self.backend, "envelope pool empty, allocating");
            self.allocate()
        });
        envelope.prepare(&self.codec);
        ctx.put_envelope(envelope);
    }

    /// Detaches the envelope from `ctx` and returns it to the pool.
    ///
    /// A no-op when `ctx` holds no envelope or holds a transferred one.
    pub fn release(&self, ctx: &mut CallContext) {
        match ctx.envelope() {
            Some(envelope) if !envelope.is_transferred() => {}
            _ => return,
        }
        if let Some(envelope) = ctx.take_envelope() {
            self.recycle(envelope);
        }
    }

    /// Moves the envelope out of `ctx` and out of automatic reclamation.
    ///
    /// Returns `None` if `ctx` holds no envelope. A later
    /// [`release`](Self::release) on `ctx` is a no-op.
    pub fn transfer(&self, ctx: &mut CallContext) -> Option<OwnedEnvelope> {
        let mut envelope = ctx.take_envelope()?;
        if !envelope.is_transferred() {
            envelope.set_flag(Flags::TRANSFERRED, true);
            self.transferred.fetch_add(1, Ordering::Relaxed);
        }
        Some(OwnedEnvelope(envelope))
    }

    /// Returns a transferred envelope to the pool.
    pub fn reclaim(&self, envelope: OwnedEnvelope) {
        self.recycle(envelope.0);
    }

    /// Opens a nested envelope scope on `ctx`.
    ///
    /// The envelope `ctx` already holds (if any) is set aside untouched and a
    /// fresh one is acquired. Pass the returned scope to
    /// [`leave`](Self::leave) to release the inner envelope and put the outer
    /// one back, with its values and recorded error intact.
    pub fn enter(&self, ctx: &mut CallContext) -> EnvelopeScope {
        let outer = ctx.take_envelope();
        if outer.is_some() {
            trace!("envelope set aside for nested scope");
        }
        self.acquire(ctx);
        EnvelopeScope { outer }
    }

    /// Closes a scope opened with [`enter`](Self::enter).
    ///
    /// The inner envelope is released (or left to its new owner if it was
    /// transferred) and the outer envelope is reattached.
    pub fn leave(&self, ctx: &mut CallContext, scope: EnvelopeScope) {
        self.release(ctx);
        let Some(outer) = scope.outer else {
            return;
        };
        if let Some(inner) = ctx.take_envelope() {
            debug!("dropping transferred envelope still attached at scope exit");
            drop(inner);
        }
        ctx.put_envelope(outer);
    }

    /// Current pool counters.
    #[must_use]
    pub fn stats(&self) -> ManagerStats {
        ManagerStats {
            allocated: self.allocated.load(Ordering::Relaxed),
            idle: self.idle.len(),
            transferred: self.transferred.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }

    fn allocate(&self) -> Box<Envelope> {
        self.allocated.fetch_add(1, Ordering::Relaxed);
        Box::new(Envelope::new(self.backend, self.codec.clone()))
    }

    fn recycle(&self, mut envelope: Box<Envelope>) {
        envelope.reset();
        if self.idle.push(envelope).is_err() {
            self.discarded.fetch_add(1, Ordering::Relaxed);
            debug!("envelope pool full, dropping envelope");
        }
    }
}

/// The enclosing envelope set aside by [`StoreManager::enter`].
#[derive(Debug)]
#[must_use = "pass the scope to StoreManager::leave to restore the enclosing envelope"]
pub struct EnvelopeScope {
    outer: Option<Box<Envelope>>,
}

impl EnvelopeScope {
    /// Returns `true` if an enclosing envelope was set aside.
    #[must_use]
    pub fn is_nested(&self) -> bool {
        self.outer.is_some()
    }
}

impl Default for StoreManager {
    fn default() -> Self {
        Self::new(&StoreManagerConfig::default(), CodecPair::json())
    }
}
