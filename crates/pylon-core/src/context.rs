//! Per-call context.
//!
//! [`CallContext`] is what travels with a request through the pipeline: a
//! [`CancelSignal`], a typed value map for anything layered onto the call,
//! and the request [`Envelope`].
//!
//! The envelope does not live in the value map. It has its own slot, so
//! finding it costs the same no matter how many other values were layered on;
//! every other value goes through the map unchanged.

use crate::cancel::CancelSignal;
use crate::envelope::{Envelope, OwnedEnvelope};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A unique identifier for each request, using UUID v7.
///
/// UUID v7 is time-ordered, which makes it a good fit for log correlation.
///
/// ```
/// use pylon_core::RequestId;
///
/// let id = RequestId::new();
/// assert_eq!(id.to_string().len(), 36);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Creates a new unique request ID using UUID v7.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a `RequestId` from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for RequestId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Context carried by one call.
///
/// # Example
///
/// ```
/// use pylon_core::CallContext;
///
/// #[derive(Clone)]
/// struct Tenant(&'static str);
///
/// let mut ctx = CallContext::new();
/// ctx.insert_value(Tenant("acme"));
///
/// let derived = ctx.child();
/// assert_eq!(derived.value::<Tenant>().unwrap().0, "acme");
/// assert!(!derived.has_envelope());
/// ```
#[derive(Debug, Default)]
pub struct CallContext {
    envelope: Option<Box<Envelope>>,
    values: http::Extensions,
    cancel: CancelSignal,
}

impl CallContext {
    /// Creates a context with a fresh root cancellation signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context bound to an existing cancellation signal.
    #[must_use]
    pub fn with_cancel(cancel: CancelSignal) -> Self {
        Self {
            envelope: None,
            values: http::Extensions::new(),
            cancel,
        }
    }

    /// Derives a new context.
    ///
    /// Layered values are copied, the cancellation signal becomes a child of
    /// this one, and no envelope is carried over: an envelope moves between
    /// contexts only through [`attach`](Self::attach).
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            envelope: None,
            values: self.values.clone(),
            cancel: self.cancel.child(),
        }
    }

    /// Returns the envelope, if one is attached.
    #[must_use]
    pub fn envelope(&self) -> Option<&Envelope> {
        self.envelope.as_deref()
    }

    /// Returns the envelope mutably, if one is attached.
    pub fn envelope_mut(&mut self) -> Option<&mut Envelope> {
        self.envelope.as_deref_mut()
    }

    /// Returns `true` if an envelope is attached.
    #[must_use]
    pub fn has_envelope(&self) -> bool {
        self.envelope.is_some()
    }

    /// Installs a transferred envelope into this context.
    ///
    /// The handle moves; store contents are not copied. Returns the handle
    /// back if the context already carries an envelope.
    pub fn attach(&mut self, envelope: OwnedEnvelope) -> Result<(), OwnedEnvelope> {
        if self.envelope.is_some() {
            return Err(envelope);
        }
        self.envelope = Some(envelope.0);
        Ok(())
    }

    /// Removes a transferred envelope previously installed with
    /// [`attach`](Self::attach).
    ///
    /// Envelopes still owned by the store manager stay in place; those leave
    /// only through [`StoreManager::transfer`](crate::StoreManager::transfer).
    pub fn detach(&mut self) -> Option<OwnedEnvelope> {
        if !self.envelope.as_ref()?.is_transferred() {
            return None;
        }
        self.envelope.take().map(OwnedEnvelope)
    }

    pub(crate) fn put_envelope(&mut self, envelope: Box<Envelope>) {
        self.envelope = Some(envelope);
    }

    pub(crate) fn take_envelope(&mut self) -> Option<Box<Envelope>> {
        self.envelope.take()
    }

    /// Layers a value onto the context, returning the previous one of the
    /// same type.
    pub fn insert_value<T: Clone + Send + Sync + 'static>(&mut self, value: T) -> Option<T> {
        self.values.insert(value)
    }

    /// Returns the layered value of type `T`.
    #[must_use]
    pub fn value<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.values.get::<T>()
    }

    /// Removes the layered value of type `T`.
    pub fn remove_value<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.values.remove::<T>()
    }

    /// The cancellation signal of this call.
    #[must_use]
    pub fn cancel_signal(&self) -> &CancelSignal {
        &self.cancel
    }

    /// Replaces the cancellation signal, returning the previous one.
    pub fn replace_cancel_signal(&mut self, cancel: CancelSignal) -> CancelSignal {
        std::mem::replace(&mut self.cancel, cancel)
    }

    /// Returns `true` once the call is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Completes once the call is cancelled.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }
}
