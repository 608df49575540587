//! Portal: authenticated request/response channel to a CCNx forwarder.
//!
//! A portal is created from a keystore over any byte transport. Both ends exchange
//! a handshake (version, key id, public key), derive a session key, then trade
//! sealed packets framed with a 4-byte big-endian length.

use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::identity::{self, Credentials, KeyId, Keystore, KeystoreError, PublicKey, SealError};
use crate::protocol::{Interest, Message, PROTOCOL_VERSION};
use crate::wire::{self, PacketDecodeError, PacketEncodeError, MAX_PACKET_LEN};

const HANDSHAKE_SIZE: usize = 1 + 32 + 32; // version + key id + public key
const LEN_SIZE: usize = 4;
const SEAL_TAG_SIZE: usize = 16;
const MAX_SEALED_LEN: usize = MAX_PACKET_LEN + SEAL_TAG_SIZE;

/// How long a send or receive may block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Timeout {
    /// Block until the operation completes or the transport fails.
    #[default]
    Never,
    /// Return at once if nothing is ready.
    Immediate,
    After(Duration),
}

impl Timeout {
    /// Socket timeout for this policy. Sockets reject a zero timeout, so `Immediate` is 1 ms.
    fn socket_timeout(self) -> Option<Duration> {
        match self {
            Timeout::Never => None,
            Timeout::Immediate => Some(Duration::from_millis(1)),
            Timeout::After(d) if d.is_zero() => Some(Duration::from_millis(1)),
            Timeout::After(d) => Some(d),
        }
    }

    /// `None` maps to `Never`.
    pub fn from_millis(ms: Option<u64>) -> Self {
        match ms {
            None => Timeout::Never,
            Some(0) => Timeout::Immediate,
            Some(ms) => Timeout::After(Duration::from_millis(ms)),
        }
    }
}

/// Request/response channel used by the stream controller.
pub trait Portal {
    fn send(&mut self, interest: &Interest, timeout: Timeout) -> Result<(), PortalError>;
    fn receive(&mut self, timeout: Timeout) -> Result<Message, PortalError>;
}

impl<P: Portal + ?Sized> Portal for Box<P> {
    fn send(&mut self, interest: &Interest, timeout: Timeout) -> Result<(), PortalError> {
        (**self).send(interest, timeout)
    }

    fn receive(&mut self, timeout: Timeout) -> Result<Message, PortalError> {
        (**self).receive(timeout)
    }
}

/// Byte stream a portal can run over.
pub trait Transport: Read + Write {
    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()>;
    fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()>;
}

impl Transport for TcpStream {
    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        TcpStream::set_read_timeout(self, timeout)
    }

    fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        TcpStream::set_write_timeout(self, timeout)
    }
}

#[cfg(unix)]
impl Transport for std::os::unix::net::UnixStream {
    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        std::os::unix::net::UnixStream::set_read_timeout(self, timeout)
    }

    fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        std::os::unix::net::UnixStream::set_write_timeout(self, timeout)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PortalError {
    #[error("keystore: {0}")]
    Keystore(#[from] KeystoreError),
    #[error("io: {0}")]
    Io(#[from] io::Error),
    #[error("handshake failed: {0}")]
    Handshake(&'static str),
    #[error("encode: {0}")]
    Encode(#[from] PacketEncodeError),
    #[error("decode: {0}")]
    Decode(#[from] PacketDecodeError),
    #[error("crypto: {0}")]
    Crypto(#[from] SealError),
    #[error("frame too large: {0} bytes")]
    FrameTooLarge(usize),
    #[error("timed out")]
    Timeout,
    #[error("portal closed")]
    Closed,
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

/// Creates portals signed in with one keystore.
pub struct PortalFactory {
    keystore: Keystore,
}

impl PortalFactory {
    pub fn new(credentials: Credentials) -> Result<Self, PortalError> {
        Ok(Self {
            keystore: Keystore::open(credentials)?,
        })
    }

    pub fn keystore(&self) -> &Keystore {
        &self.keystore
    }

    /// Connect to a forwarder over TCP.
    pub fn connect<A: ToSocketAddrs>(&self, addr: A) -> Result<FramedPortal<TcpStream>, PortalError> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        self.create_portal(stream)
    }

    /// Run the handshake over `transport` and return a ready portal.
    pub fn create_portal<T: Transport>(&self, mut transport: T) -> Result<FramedPortal<T>, PortalError> {
        let mut hello = [0u8; HANDSHAKE_SIZE];
        hello[0] = PROTOCOL_VERSION;
        hello[1..33].copy_from_slice(self.keystore.key_id().as_bytes());
        hello[33..65].copy_from_slice(self.keystore.public_key().as_bytes());
        transport.write_all(&hello)?;
        transport.flush()?;

        let mut peer_hello = [0u8; HANDSHAKE_SIZE];
        transport.read_exact(&mut peer_hello)?;
        if peer_hello[0] != PROTOCOL_VERSION {
            return Err(PortalError::Handshake("protocol version mismatch"));
        }
        let mut id = [0u8; 32];
        id.copy_from_slice(&peer_hello[1..33]);
        let mut pk = [0u8; 32];
        pk.copy_from_slice(&peer_hello[33..65]);
        let peer_key = PublicKey::from_bytes(pk);
        let peer_id = KeyId::from_bytes(id);
        if KeyId::from_public_key(&peer_key) != peer_id {
            return Err(PortalError::Handshake("key id does not match public key"));
        }
        let own_id = self.keystore.key_id();
        if own_id == peer_id {
            return Err(PortalError::Handshake("peer presented our own key"));
        }

        let shared = self.keystore.shared_secret(&peer_key);
        let session_key = identity::derive_session_key(&shared, &own_id, &peer_id);
        // Lower key id sends on direction 0.
        let (send_direction, recv_direction) = if own_id.as_bytes() < peer_id.as_bytes() {
            (0, 1)
        } else {
            (1, 0)
        };
        log::info!(
            "portal open: key {} <-> peer {}",
            own_id.short_hex(),
            peer_id.short_hex()
        );
        Ok(FramedPortal {
            transport,
            session_key,
            local: own_id,
            peer: peer_id,
            send_direction,
            recv_direction,
            send_counter: 0,
            recv_counter: 0,
            broken: false,
        })
    }
}

/// Portal over a framed, sealed byte transport.
pub struct FramedPortal<T: Transport> {
    transport: T,
    session_key: [u8; 32],
    local: KeyId,
    peer: KeyId,
    send_direction: u8,
    recv_direction: u8,
    send_counter: u64,
    recv_counter: u64,
    /// Set after a partial frame read or write; the stream is out of sync.
    broken: bool,
}

impl<T: Transport> FramedPortal<T> {
    pub fn local(&self) -> KeyId {
        self.local
    }

    pub fn peer(&self) -> KeyId {
        self.peer
    }

    /// Send any message (the serving side replies with content objects through this).
    pub fn send_message(&mut self, msg: &Message, timeout: Timeout) -> Result<(), PortalError> {
        if self.broken {
            return Err(PortalError::Closed);
        }
        let packet = wire::encode_packet(msg)?;
        let sealed = identity::seal(
            &self.session_key,
            self.send_direction,
            self.send_counter,
            &packet,
        )?;
        self.send_counter += 1;
        self.transport.set_write_timeout(timeout.socket_timeout())?;
        let mut frame = Vec::with_capacity(LEN_SIZE + sealed.len());
        frame.extend_from_slice(&(sealed.len() as u32).to_be_bytes());
        frame.extend_from_slice(&sealed);
        if let Err(e) = self.transport.write_all(&frame).and_then(|_| self.transport.flush()) {
            self.broken = true;
            return Err(if is_timeout(&e) {
                PortalError::Timeout
            } else {
                PortalError::Io(e)
            });
        }
        Ok(())
    }

    fn receive_message(&mut self, timeout: Timeout) -> Result<Message, PortalError> {
        if self.broken {
            return Err(PortalError::Closed);
        }
        self.transport.set_read_timeout(timeout.socket_timeout())?;

        let mut len_buf = [0u8; LEN_SIZE];
        let mut filled = 0;
        while filled < LEN_SIZE {
            match self.transport.read(&mut len_buf[filled..]) {
                Ok(0) => {
                    self.broken = true;
                    return Err(PortalError::Closed);
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                // Nothing consumed yet: the stream is still in sync. A late reply may
                // follow; the exchange drops it by name.
                Err(e) if is_timeout(&e) && filled == 0 => return Err(PortalError::Timeout),
                Err(e) => {
                    self.broken = true;
                    return Err(PortalError::Io(e));
                }
            }
        }
        let len = u32::from_be_bytes(len_buf) as usize;
        if len > MAX_SEALED_LEN {
            self.broken = true;
            return Err(PortalError::FrameTooLarge(len));
        }
        let mut sealed = vec![0u8; len];
        if let Err(e) = self.transport.read_exact(&mut sealed) {
            self.broken = true;
            return Err(match e.kind() {
                io::ErrorKind::UnexpectedEof => PortalError::Closed,
                _ if is_timeout(&e) => PortalError::Timeout,
                _ => PortalError::Io(e),
            });
        }
        let packet = match identity::open(
            &self.session_key,
            self.recv_direction,
            self.recv_counter,
            &sealed,
        ) {
            Ok(p) => p,
            Err(e) => {
                self.broken = true;
                return Err(e.into());
            }
        };
        self.recv_counter += 1;
        let (msg, used) = wire::decode_packet(&packet)?;
        if used != packet.len() {
            return Err(PortalError::Decode(PacketDecodeError::BadLength));
        }
        Ok(msg)
    }
}

impl<T: Transport> Portal for FramedPortal<T> {
    fn send(&mut self, interest: &Interest, timeout: Timeout) -> Result<(), PortalError> {
        self.send_message(&Message::Interest(interest.clone()), timeout)
    }

    fn receive(&mut self, timeout: Timeout) -> Result<Message, PortalError> {
        self.receive_message(timeout)
    }
}

/// Scripted in-memory portal for controller and exchange tests.
#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;

    use super::*;

    #[derive(Default)]
    pub struct ScriptedPortal {
        pub sent: Vec<Interest>,
        pub replies: VecDeque<Result<Message, PortalError>>,
        pub fail_sends: bool,
        pub receives: usize,
    }

    impl ScriptedPortal {
        pub fn reply(&mut self, msg: Message) {
            self.replies.push_back(Ok(msg));
        }
    }

    impl Portal for ScriptedPortal {
        fn send(&mut self, interest: &Interest, _timeout: Timeout) -> Result<(), PortalError> {
            if self.fail_sends {
                return Err(PortalError::Io(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "scripted send failure",
                )));
            }
            self.sent.push(interest.clone());
            Ok(())
        }

        fn receive(&mut self, _timeout: Timeout) -> Result<Message, PortalError> {
            self.receives += 1;
            self.replies.pop_front().unwrap_or(Err(PortalError::Closed))
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::net::UnixStream;
    use std::thread;

    use super::*;
    use crate::name::Name;
    use crate::protocol::ContentObject;

    fn factory() -> PortalFactory {
        PortalFactory::new(Credentials::default()).unwrap()
    }

    fn pair() -> (FramedPortal<UnixStream>, FramedPortal<UnixStream>) {
        let (a, b) = UnixStream::pair().unwrap();
        let server = thread::spawn(move || factory().create_portal(b).unwrap());
        let client = factory().create_portal(a).unwrap();
        (client, server.join().unwrap())
    }

    #[test]
    fn timeout_policy_mapping() {
        assert_eq!(Timeout::from_millis(None), Timeout::Never);
        assert_eq!(Timeout::from_millis(Some(0)), Timeout::Immediate);
        assert_eq!(
            Timeout::from_millis(Some(250)),
            Timeout::After(Duration::from_millis(250))
        );
        assert_eq!(Timeout::Never.socket_timeout(), None);
        assert!(Timeout::Immediate.socket_timeout().is_some());
    }

    #[test]
    fn interest_and_content_object_exchange() {
        let (mut client, mut server) = pair();
        assert_eq!(client.peer(), server.local());
        assert_eq!(server.peer(), client.local());
        let name = Name::parse_uri("ccnx:/ccnx/tutorial/fetch/movie.mpg/Chunk=0").unwrap();
        client
            .send(&Interest::new(name.clone()), Timeout::Never)
            .unwrap();
        match server.receive(Timeout::Never).unwrap() {
            Message::Interest(i) => assert_eq!(i.name, name),
            other => panic!("expected Interest, got {:?}", other),
        }
        let co = ContentObject {
            name: name.clone(),
            final_chunk: Some(3),
            payload: vec![9u8; 1200],
        };
        server
            .send_message(&Message::ContentObject(co.clone()), Timeout::Never)
            .unwrap();
        assert_eq!(
            client.receive(Timeout::Never).unwrap(),
            Message::ContentObject(co)
        );
    }

    #[test]
    fn receive_times_out_without_breaking() {
        let (mut client, mut server) = pair();
        let r = client.receive(Timeout::After(Duration::from_millis(30)));
        assert!(matches!(r, Err(PortalError::Timeout)));
        // Stream still usable.
        let co = ContentObject {
            name: Name::new(),
            final_chunk: None,
            payload: b"x".to_vec(),
        };
        server
            .send_message(&Message::ContentObject(co), Timeout::Never)
            .unwrap();
        assert!(client.receive(Timeout::Never).unwrap().is_content_object());
    }

    #[test]
    fn peer_close_reports_closed() {
        let (mut client, server) = pair();
        drop(server);
        assert!(matches!(
            client.receive(Timeout::Never),
            Err(PortalError::Closed)
        ));
        assert!(matches!(
            client.receive(Timeout::Never),
            Err(PortalError::Closed)
        ));
    }

    #[test]
    fn handshake_rejects_bad_version() {
        let (a, mut b) = UnixStream::pair().unwrap();
        let peer = thread::spawn(move || {
            let mut hello = [0u8; HANDSHAKE_SIZE];
            b.read_exact(&mut hello).unwrap();
            b.write_all(&[9u8; HANDSHAKE_SIZE]).unwrap();
        });
        let r = factory().create_portal(a);
        assert!(matches!(r, Err(PortalError::Handshake(_))));
        peer.join().unwrap();
    }

    #[test]
    fn handshake_rejects_forged_key_id() {
        let (a, mut b) = UnixStream::pair().unwrap();
        let peer = thread::spawn(move || {
            let mut hello = [0u8; HANDSHAKE_SIZE];
            b.read_exact(&mut hello).unwrap();
            let mut forged = [7u8; HANDSHAKE_SIZE];
            forged[0] = PROTOCOL_VERSION;
            b.write_all(&forged).unwrap();
        });
        let r = factory().create_portal(a);
        assert!(matches!(r, Err(PortalError::Handshake(_))));
        peer.join().unwrap();
    }
}
