//! Built-in pipeline stages.
//!
//! | Stage | Gated | Purpose |
//! |-------|-------|---------|
//! | [`StoreInit`] | no | Acquires and releases the request envelope |
//! | [`Recover`] | no | Turns a panic into a recorded error |
//! | [`RealIp`] | no | Resolves the client address behind proxies |
//! | [`RequestIdMiddleware`] | no | Assigns and echoes `X-Request-ID` |
//! | [`CustomHeaders`] | no | Adds fixed response headers |
//! | [`TrailingSlash`] | no | Strips or redirects trailing slashes |
//! | [`UseCodec`] | yes | Overrides the codec for one route |
//! | [`abort_with`] | no | Records an error and stops |
//! | [`abort_if`] | yes | Records an error and stops when a predicate holds |

pub mod abort;
pub mod codec;
pub mod headers;
pub mod path;
pub mod real_ip;
pub mod recover;
pub mod request_id;
pub mod store_init;

pub use abort::{abort_if, abort_with, AbortIf, AbortWith};
pub use codec::UseCodec;
pub use headers::{server_name, CustomHeaders};
pub use path::TrailingSlash;
pub use real_ip::{real_ip, InvalidNetwork, PeerAddr, RealIp, RealIpKey, TrustedNet};
pub use recover::Recover;
pub use request_id::{RequestIdKey, RequestIdMiddleware, REQUEST_ID_HEADER};
pub use store_init::StoreInit;
