/// Secure UDP channel to the telemetry collector.
///
/// A [`ChannelConfig`] is the not-yet-usable channel: nothing is bound and no keys exist yet.
/// [`ChannelConfig::open`] resolves the collector address, acquires the session key pair and
/// binds the socket, and only then hands out a [`SecureChannel`]. Every later send is
/// independent of the others.
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use rsa::RsaPublicKey;
use tracing::{debug, info};

use crate::{
    keys::{KeyPair, KeyStore},
    protocol::{wire::WireSealer, TelemMsg},
    Error, TTResult,
};

/// Split `host:port`. The port is absent unless the text after the last `:` is all digits.
/// Brackets around an IPv6 host are dropped.
pub fn resolve_host_port(address: &str) -> TTResult<(String, Option<u16>)> {
    let Some((host, port)) = address.rsplit_once(':') else {
        return Ok((address.to_string(), None));
    };
    if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
        return Ok((address.to_string(), None));
    }
    let port = port
        .parse::<u16>()
        .map_err(|e| Error::InvalidParameter(format!("port in '{address}': {e}")))?;
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    Ok((host.to_string(), Some(port)))
}

/// Collector address used when none is configured.
pub const DEFAULT_ADDRESS: &str = "127.0.0.1:5005";

/// Uninitialized channel.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Collector `host:port`.
    pub address: String,
    /// Local address to bind. Defaults to the wildcard address of the collector's family.
    pub bind_addr: Option<SocketAddr>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self::new(DEFAULT_ADDRESS)
    }
}

impl ChannelConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            bind_addr: None,
        }
    }

    /// Move to the ready state. A bad address fails before any key is loaded or created and
    /// before the socket is bound.
    pub fn open(self, keys: &dyn KeyStore) -> TTResult<SecureChannel> {
        info!("Sender parsing address {}", self.address);
        let (host, port) = resolve_host_port(&self.address)?;
        let port = port.ok_or_else(|| Error::MissingPort(self.address.clone()))?;
        let dest = (host.as_str(), port)
            .to_socket_addrs()
            .map_err(|e| Error::InvalidParameter(format!("cannot resolve '{host}': {e}")))?
            .next()
            .ok_or_else(|| Error::InvalidParameter(format!("cannot resolve '{host}'")))?;

        let keys = keys.load_or_create_key_pair()?;

        let bind_addr = self.bind_addr.unwrap_or_else(|| {
            if dest.is_ipv6() {
                SocketAddr::from(([0u16; 8], 0))
            } else {
                SocketAddr::from(([0u8; 4], 0))
            }
        });
        let socket = UdpSocket::bind(bind_addr)?;
        debug!("bound {} for collector {}", socket.local_addr()?, dest);

        Ok(SecureChannel {
            sealer: WireSealer::new(keys.public.clone()),
            keys,
            socket,
            dest,
        })
    }
}

/// Ready channel: owns the session keys and the socket.
#[derive(Debug)]
pub struct SecureChannel {
    keys: KeyPair,
    sealer: WireSealer,
    socket: UdpSocket,
    dest: SocketAddr,
}

impl SecureChannel {
    pub fn destination(&self) -> SocketAddr {
        self.dest
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.keys.public
    }

    /// Keys for the receiving end of this channel.
    pub fn key_pair(&self) -> &KeyPair {
        &self.keys
    }

    pub fn sealer(&self) -> &WireSealer {
        &self.sealer
    }

    /// Size of every datagram this channel sends.
    pub fn wire_len(&self) -> usize {
        self.sealer.wire_len()
    }

    /// Seal `msg` and send it as one datagram. Fire and forget: nothing is awaited or retried.
    pub fn send<M: TelemMsg>(&self, msg: &M) -> TTResult<usize> {
        let wire = self.sealer.seal(&mut rand::thread_rng(), &msg.to_bytes())?;
        let sent = self.socket.send_to(&wire.to_bytes(), self.dest)?;
        debug!("Sender sent {} byte message to {}", sent, self.dest);
        Ok(sent)
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::*;
    use crate::{
        keys::{FixedKeyStore, PemKeyStore},
        lazy_init_tracing,
        model::Sample,
        protocol::{TelemetryRecord, VehicleIdentity},
    };
    use tempfile::TempDir;

    #[test]
    fn test_resolve_host_port() {
        let cases = [
            ("127.0.0.1:5005", ("127.0.0.1", Some(5005))),
            ("collector.local:9", ("collector.local", Some(9))),
            ("[::1]:5005", ("::1", Some(5005))),
            ("localhost", ("localhost", None)),
            ("localhost:", ("localhost:", None)),
            ("localhost:http", ("localhost:http", None)),
        ];
        for (input, (host, port)) in cases {
            let (h, p) = resolve_host_port(input).unwrap();
            assert_eq!((h.as_str(), p), (host, port), "{input}");
        }
        assert!(matches!(
            resolve_host_port("host:99999"),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_missing_port_is_fatal() {
        lazy_init_tracing();
        let err = ChannelConfig::new("127.0.0.1")
            .open(&FixedKeyStore)
            .unwrap_err();
        assert!(matches!(err, Error::MissingPort(ref a) if a == "127.0.0.1"));
    }

    #[test]
    fn test_unresolvable_host_has_no_side_effects() {
        lazy_init_tracing();
        let temp = TempDir::new().unwrap();
        let store = PemKeyStore::new(temp.path().join("keys"));
        let err = ChannelConfig::new("collector.invalid:5005")
            .open(&store)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidParameter(_)), "{err}");
        assert!(!store.public_path().exists());
        assert!(!store.private_path().exists());
    }

    #[test]
    fn test_default_config() {
        let config = ChannelConfig::default();
        assert_eq!(config.address, DEFAULT_ADDRESS);
        assert!(config.bind_addr.is_none());
    }

    #[test]
    fn test_send_over_loopback() {
        lazy_init_tracing();
        let collector = UdpSocket::bind("127.0.0.1:0").unwrap();
        collector
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let addr = collector.local_addr().unwrap();

        let channel = ChannelConfig::new(addr.to_string())
            .open(&FixedKeyStore)
            .unwrap();
        assert_eq!(channel.destination(), addr);
        assert_eq!(channel.wire_len(), 128 + 32);

        let identity = VehicleIdentity {
            id: 148822899220,
            vehicle_type: 1,
            model: "Toyota Corolla".into(),
        };
        let sample = Sample {
            lat: 55.0,
            lon: 37.0,
            elevation: 100.0,
            bearing: 0.0,
            speed_kmh: 61.25,
        };
        let record =
            TelemetryRecord::from_sample(&sample, 1_700_000_000_000).with_identity(&identity);

        let sent = channel.send(&record).unwrap();
        assert_eq!(sent, channel.wire_len());

        let mut buf = [0u8; 2048];
        let (n, from) = collector.recv_from(&mut buf).unwrap();
        assert_eq!(n, channel.wire_len());
        assert_eq!(from.port(), channel.socket.local_addr().unwrap().port());
        let opened = channel
            .sealer()
            .open(&channel.key_pair().private, &buf[..n])
            .unwrap();
        assert_eq!(opened, record);
    }
}
