//! Client address resolution behind proxies.
//!
//! [`RealIp`] works out the address of the client that started the request
//! and stores it in the envelope under [`RealIpKey`]. Proxy headers are read
//! right to left: every hop inside a trusted network is skipped and the first
//! address outside them is the client. With no trusted networks configured
//! the rightmost entry wins.
//!
//! Headers added with [`RealIp::with_header`] are consulted before
//! `X-Forwarded-For`. When no header yields an address, the peer address of
//! the connection ([`PeerAddr`], set by the server) is used.

use crate::handler::{BoxFuture, BoxedHandler, Handler};
use crate::middleware::Middleware;
use http::header::HeaderName;
use http::Request;
use pylon_core::Exchange;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::trace;

/// The header every proxy appends to.
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

pylon_core::marker_key! {
    /// Envelope key under which the resolved client [`IpAddr`] is stored.
    pub struct RealIpKey;
}

/// Address of the directly connected peer.
///
/// Inserted into the request extensions by the server for every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerAddr(pub SocketAddr);

/// A trusted network that failed to parse.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid trusted network {input:?}: {reason}")]
pub struct InvalidNetwork {
    /// The rejected text.
    pub input: String,
    /// What was wrong with it.
    pub reason: &'static str,
}

/// An address block in CIDR notation, such as `10.0.0.0/8` or `::1/128`.
///
/// A bare address parses as a single-host block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrustedNet {
    network: IpAddr,
    prefix: u8,
}

impl TrustedNet {
    /// Returns `true` if `ip` falls inside this block.
    ///
    /// IPv4-mapped IPv6 addresses match IPv4 blocks.
    #[must_use]
    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self.network, ip.to_canonical()) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = u32::MAX.checked_shl(32 - u32::from(self.prefix)).unwrap_or(0);
                u32::from(net) & mask == u32::from(ip) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = u128::MAX.checked_shl(128 - u32::from(self.prefix)).unwrap_or(0);
                u128::from(net) & mask == u128::from(ip) & mask
            }
            _ => false,
        }
    }

    /// The prefix length in bits.
    #[must_use]
    pub const fn prefix(&self) -> u8 {
        self.prefix
    }
}

impl FromStr for TrustedNet {
    type Err = InvalidNetwork;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason| InvalidNetwork {
            input: s.to_string(),
            reason,
        };
        let (addr, prefix) = match s.trim().split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (s.trim(), None),
        };
        let network: IpAddr = addr.parse().map_err(|_| invalid("not an IP address"))?;
        let max = if network.is_ipv4() { 32 } else { 128 };
        let prefix = match prefix {
            Some(bits) => bits.parse::<u8>().map_err(|_| invalid("bad prefix length"))?,
            None => max,
        };
        if prefix > max {
            return Err(invalid("prefix longer than the address"));
        }
        Ok(Self { network, prefix })
    }
}

impl fmt::Display for TrustedNet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

/// Called with the resolved address. The default stores it under
/// [`RealIpKey`].
pub type IpSaver = Arc<dyn Fn(&mut Exchange, IpAddr) + Send + Sync>;

/// Resolves the client address from proxy headers.
///
/// ```
/// use pylon_middleware::stages::RealIp;
///
/// let stage = RealIp::new()
///     .trust_cidrs(["10.0.0.0/8", "fd00::/8"])
///     .unwrap()
///     .with_header(http::HeaderName::from_static("x-real-ip"));
/// # let _ = stage;
/// ```
#[derive(Clone, Default)]
pub struct RealIp {
    trusted: Vec<TrustedNet>,
    headers: Vec<HeaderName>,
    saver: Option<IpSaver>,
}

impl fmt::Debug for RealIp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealIp")
            .field("trusted", &self.trusted)
            .field("headers", &self.headers)
            .field("custom_saver", &self.saver.is_some())
            .finish()
    }
}

impl RealIp {
    /// Creates the stage with no trusted networks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Trusts `net` as a proxy hop.
    #[must_use]
    pub fn trust(mut self, net: TrustedNet) -> Self {
        if !self.trusted.contains(&net) {
            self.trusted.push(net);
        }
        self
    }

    /// Trusts every block in `cidrs`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidNetwork`] for the first entry that does not parse.
    pub fn trust_cidrs<I, S>(mut self, cidrs: I) -> Result<Self, InvalidNetwork>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for cidr in cidrs {
            self = self.trust(cidr.as_ref().parse()?);
        }
        Ok(self)
    }

    /// Scans `name` before `X-Forwarded-For`. Duplicates are ignored.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName) -> Self {
        if name != FORWARDED_FOR_HEADER && !self.headers.contains(&name) {
            self.headers.push(name);
        }
        self
    }

    /// Hands the resolved address to `saver` instead of the envelope.
    #[must_use]
    pub fn with_saver<F>(mut self, saver: F) -> Self
    where
        F: Fn(&mut Exchange, IpAddr) + Send + Sync + 'static,
    {
        self.saver = Some(Arc::new(saver));
        self
    }

    /// The trusted networks.
    #[must_use]
    pub fn trusted(&self) -> &[TrustedNet] {
        &self.trusted
    }

    /// Resolves the client address of `request`.
    #[must_use]
    pub fn resolve<B>(&self, request: &Request<B>) -> Option<IpAddr> {
        let forwarded = HeaderName::from_static(FORWARDED_FOR_HEADER);
        self.headers
            .iter()
            .chain(std::iter::once(&forwarded))
            .find_map(|name| {
                let value = request.headers().get(name)?.to_str().ok()?;
                self.client_from_chain(value)
            })
            .or_else(|| request.extensions().get::<PeerAddr>().map(|peer| peer.0.ip()))
    }

    /// Walks a comma-separated hop list from the nearest hop outwards.
    ///
    /// An entry that is not an address ends the walk for this header.
    fn client_from_chain(&self, chain: &str) -> Option<IpAddr> {
        for hop in chain.rsplit(',').map(str::trim).filter(|hop| !hop.is_empty()) {
            let ip = hop.parse::<IpAddr>().ok()?;
            if !self.trusted.iter().any(|net| net.contains(ip)) {
                return Some(ip);
            }
        }
        None
    }
}

struct Resolving {
    stage: RealIp,
    next: BoxedHandler,
}

impl Handler for Resolving {
    fn call<'a>(&'a self, ex: &'a mut Exchange) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            if let Some(ip) = self.stage.resolve(ex.request()) {
                trace!(client_ip = %ip, "client address resolved");
                match &self.stage.saver {
                    Some(save) => save(ex, ip),
                    None => ex.set_value(RealIpKey, ip),
                }
            }
            self.next.call(ex).await;
        })
    }

    fn name(&self) -> &'static str {
        "real_ip"
    }

    fn check_error_before(&self) -> bool {
        false
    }
}

impl Middleware for RealIp {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        Arc::new(Resolving {
            stage: self.clone(),
            next,
        })
    }

    fn name(&self) -> &'static str {
        "real_ip"
    }

    fn check_error_before(&self) -> bool {
        false
    }
}

/// The client address stored by [`RealIp`], if it ran.
#[must_use]
pub fn real_ip(ex: &Exchange) -> Option<IpAddr> {
    ex.value::<IpAddr>(RealIpKey).copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::EmptyHandler;
    use bytes::Bytes;
    use pylon_core::StoreManager;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn exchange(headers: &[(&str, &str)], peer: Option<&str>) -> Exchange {
        let mut builder = http::Request::builder().uri("/");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let mut request = builder.body(Bytes::new()).unwrap();
        if let Some(peer) = peer {
            request.extensions_mut().insert(PeerAddr(peer.parse().unwrap()));
        }
        let mut ex = Exchange::new(request);
        StoreManager::default().acquire(ex.context_mut());
        ex
    }

    async fn run(stage: &RealIp, ex: &mut Exchange) {
        stage.wrap(Arc::new(EmptyHandler)).call(ex).await;
    }

    #[test]
    fn test_parse_networks() {
        let net: TrustedNet = "10.1.0.0/16".parse().unwrap();
        assert_eq!(net.prefix(), 16);
        assert_eq!(net.to_string(), "10.1.0.0/16");
        assert_eq!("::1".parse::<TrustedNet>().unwrap().prefix(), 128);
        assert!("10.0.0.0/33".parse::<TrustedNet>().is_err());
        assert!("proxy.local/8".parse::<TrustedNet>().is_err());
        assert!("10.0.0.0/x".parse::<TrustedNet>().is_err());
    }

    #[test]
    fn test_contains() {
        let v4: TrustedNet = "192.168.0.0/16".parse().unwrap();
        assert!(v4.contains(ip("192.168.44.1")));
        assert!(!v4.contains(ip("192.169.0.1")));
        assert!(v4.contains(ip("::ffff:192.168.1.1")));
        assert!(!v4.contains(ip("fd00::1")));

        let everything: TrustedNet = "0.0.0.0/0".parse().unwrap();
        assert!(everything.contains(ip("8.8.8.8")));

        let v6: TrustedNet = "fd00::/8".parse().unwrap();
        assert!(v6.contains(ip("fd12:3456::1")));
        assert!(!v6.contains(ip("2001:db8::1")));
    }

    #[tokio::test]
    async fn test_trusted_proxies_are_skipped() {
        let stage = RealIp::new().trust_cidrs(["10.0.0.0/8"]).unwrap();
        let mut ex = exchange(
            &[(FORWARDED_FOR_HEADER, "203.0.113.7, 10.0.0.5, 10.2.3.4")],
            Some("10.9.9.9:4000"),
        );
        run(&stage, &mut ex).await;
        assert_eq!(real_ip(&ex), Some(ip("203.0.113.7")));
    }

    #[tokio::test]
    async fn test_untrusted_hop_stops_the_walk() {
        let stage = RealIp::new().trust_cidrs(["10.0.0.0/8"]).unwrap();
        let mut ex = exchange(
            &[(FORWARDED_FOR_HEADER, "1.1.1.1, 198.51.100.20, 10.0.0.5")],
            Some("10.9.9.9:4000"),
        );
        run(&stage, &mut ex).await;
        // 1.1.1.1 was supplied by the client and is not believed.
        assert_eq!(real_ip(&ex), Some(ip("198.51.100.20")));
    }

    #[tokio::test]
    async fn test_no_trusted_networks_takes_rightmost() {
        let mut ex = exchange(&[(FORWARDED_FOR_HEADER, "1.1.1.1, 2.2.2.2")], None);
        run(&RealIp::new(), &mut ex).await;
        assert_eq!(real_ip(&ex), Some(ip("2.2.2.2")));
    }

    #[tokio::test]
    async fn test_all_hops_trusted_falls_back_to_peer() {
        let stage = RealIp::new().trust_cidrs(["10.0.0.0/8"]).unwrap();
        let mut ex = exchange(&[(FORWARDED_FOR_HEADER, "10.0.0.1")], Some("10.0.0.2:80"));
        run(&stage, &mut ex).await;
        assert_eq!(real_ip(&ex), Some(ip("10.0.0.2")));
    }

    #[tokio::test]
    async fn test_garbage_header_falls_back_to_peer() {
        let mut ex = exchange(&[(FORWARDED_FOR_HEADER, "unknown")], Some("198.51.100.1:5555"));
        run(&RealIp::new(), &mut ex).await;
        assert_eq!(real_ip(&ex), Some(ip("198.51.100.1")));
    }

    #[tokio::test]
    async fn test_extra_header_checked_first() {
        let stage = RealIp::new().with_header(HeaderName::from_static("x-real-ip"));
        let mut ex = exchange(
            &[("x-real-ip", "203.0.113.9"), (FORWARDED_FOR_HEADER, "198.51.100.3")],
            None,
        );
        run(&stage, &mut ex).await;
        assert_eq!(real_ip(&ex), Some(ip("203.0.113.9")));
    }

    #[tokio::test]
    async fn test_nothing_to_resolve() {
        let mut ex = exchange(&[], None);
        run(&RealIp::new(), &mut ex).await;
        assert_eq!(real_ip(&ex), None);
    }

    #[tokio::test]
    async fn test_custom_saver() {
        let stage = RealIp::new().with_saver(|ex, ip| {
            ex.response_mut()
                .headers_mut()
                .insert("x-client-ip", ip.to_string().parse().unwrap());
        });
        let mut ex = exchange(&[], Some("192.0.2.44:1234"));
        run(&stage, &mut ex).await;

        assert_eq!(ex.response().headers()["x-client-ip"], "192.0.2.44");
        assert_eq!(real_ip(&ex), None);
    }

    #[test]
    fn test_duplicate_headers_and_networks_ignored() {
        let stage = RealIp::new()
            .with_header(HeaderName::from_static("x-real-ip"))
            .with_header(HeaderName::from_static("x-real-ip"))
            .with_header(HeaderName::from_static(FORWARDED_FOR_HEADER))
            .trust_cidrs(["10.0.0.0/8", "10.0.0.0/8"])
            .unwrap();
        assert_eq!(stage.headers.len(), 1);
        assert_eq!(stage.trusted().len(), 1);
    }
}
