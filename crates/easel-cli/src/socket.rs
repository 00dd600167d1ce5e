use std::io::{self, ErrorKind};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use easel_contracts::ServerConfig;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{self, WebPkiSupportedAlgorithms};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use tungstenite::client::IntoClientRequest;
use tungstenite::error::ProtocolError;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Connector, Message as WsMessage, WebSocket};

use crate::error::SessionError;

pub type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

/// Upper bound on how long a reader holds the socket lock while idle, so
/// keepalive pings can interleave with the dispatch loop.
const READ_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Anything that can take one outbound frame.
pub trait FrameSink {
    fn send_frame(&self, message: WsMessage) -> Result<(), tungstenite::Error>;
}

impl<T: FrameSink + ?Sized> FrameSink for Arc<T> {
    fn send_frame(&self, message: WsMessage) -> Result<(), tungstenite::Error> {
        (**self).send_frame(message)
    }
}

/// Frame read from the server, with control frames filtered out.
#[derive(Debug)]
pub enum Inbound {
    Data(Vec<u8>),
    Closed(String),
}

/// Websocket shared between the dispatch loop and the keepalive thread.
/// Each read poll and each frame write holds the lock for that one call.
#[derive(Clone)]
pub struct SharedSocket {
    inner: Arc<Mutex<Socket>>,
}

impl SharedSocket {
    pub fn new(ws: Socket) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ws)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Socket> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// One bounded read attempt. `Ok(None)` means the poll interval elapsed
    /// without a complete frame.
    pub fn poll_read(&self) -> Result<Option<WsMessage>, tungstenite::Error> {
        match self.lock().read() {
            Ok(message) => Ok(Some(message)),
            Err(tungstenite::Error::Io(err)) if is_poll_timeout(&err) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Blocks until a text/binary frame or a close frame arrives.
    pub fn next_inbound(&self) -> Result<Inbound, tungstenite::Error> {
        loop {
            let Some(message) = self.poll_read()? else {
                continue;
            };
            match message {
                WsMessage::Text(text) => {
                    return Ok(Inbound::Data(text.as_str().as_bytes().to_vec()))
                }
                WsMessage::Binary(bytes) => return Ok(Inbound::Data(bytes.to_vec())),
                WsMessage::Close(frame) => {
                    let reason = frame
                        .map(|frame| format!("{} {}", u16::from(frame.code), frame.reason.as_str()))
                        .unwrap_or_else(|| "closed by peer".to_string());
                    return Ok(Inbound::Closed(reason.trim().to_string()));
                }
                WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => continue,
            }
        }
    }

    /// Best-effort close handshake.
    pub fn close(&self) {
        let mut ws = self.lock();
        let _ = ws.close(None);
        let _ = ws.flush();
    }
}

impl FrameSink for SharedSocket {
    fn send_frame(&self, message: WsMessage) -> Result<(), tungstenite::Error> {
        self.lock().send(message)
    }
}

/// Closes the socket when the session scope ends, on every exit path.
pub struct CloseOnDrop(pub SharedSocket);

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        self.0.close();
    }
}

pub fn dial(server: &ServerConfig) -> Result<SharedSocket, SessionError> {
    let url = server.url();
    let request = url
        .as_str()
        .into_client_request()
        .map_err(|err| SessionError::Dial(format!("invalid server url {url}: {err}")))?;
    let addrs = server
        .authority()
        .to_socket_addrs()
        .map_err(|err| SessionError::Dial(format!("failed to resolve {}: {err}", server.authority())))?
        .collect::<Vec<SocketAddr>>();
    let stream = connect_any(&addrs, server.connect_timeout())
        .map_err(|err| SessionError::Dial(format!("failed to connect {url}: {err}")))?;

    // The upgrade (and TLS) handshake is bounded by the connect timeout.
    let configure = |stream: &TcpStream| -> io::Result<()> {
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(server.connect_timeout()))?;
        stream.set_write_timeout(Some(server.write_timeout()))
    };
    configure(&stream).map_err(|err| SessionError::Dial(format!("socket setup failed: {err}")))?;

    let connector = tls_connector(server)
        .map_err(|err| SessionError::Dial(format!("tls setup failed: {err}")))?;
    let (mut ws, _response) = tungstenite::client_tls_with_config(request, stream, None, connector)
        .map_err(|err| SessionError::Dial(format!("websocket handshake with {url} failed: {err}")))?;
    set_socket_read_timeout(&mut ws, Some(READ_POLL_INTERVAL));
    Ok(SharedSocket::new(ws))
}

/// `None` keeps tungstenite's default connector (webpki roots). With
/// `tls_insecure` on a `wss` server, any certificate is accepted; handshake
/// signatures are still checked.
fn tls_connector(server: &ServerConfig) -> Result<Option<Connector>, rustls::Error> {
    if !server.tls_insecure || server.scheme != "wss" {
        return Ok(None);
    }
    let provider = crypto::ring::default_provider();
    let verifier = AcceptAnyServerCert {
        algorithms: provider.signature_verification_algorithms,
    };
    let config = ClientConfig::builder_with_provider(Arc::new(provider))
        .with_safe_default_protocol_versions()?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(verifier))
        .with_no_client_auth();
    Ok(Some(Connector::Rustls(Arc::new(config))))
}

#[derive(Debug)]
struct AcceptAnyServerCert {
    algorithms: WebPkiSupportedAlgorithms,
}

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        crypto::verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        crypto::verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}

fn connect_any(addrs: &[SocketAddr], timeout: Duration) -> io::Result<TcpStream> {
    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect_timeout(addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(err) => last_err = Some(err),
        }
    }
    Err(last_err.unwrap_or_else(|| io::Error::new(ErrorKind::NotFound, "no addresses resolved")))
}

fn set_socket_read_timeout(ws: &mut Socket, timeout: Option<Duration>) {
    match ws.get_mut() {
        MaybeTlsStream::Plain(stream) => {
            let _ = stream.set_read_timeout(timeout);
        }
        MaybeTlsStream::Rustls(stream) => {
            let _ = stream.get_mut().set_read_timeout(timeout);
        }
        _ => {}
    }
}

fn is_poll_timeout(err: &io::Error) -> bool {
    matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}

/// Read errors that mean the peer or the network went away, as opposed to
/// the server speaking something this client can't parse.
pub fn is_connection_closed(err: &tungstenite::Error) -> bool {
    match err {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => true,
        tungstenite::Error::Io(io_err) => is_transport_io_error_kind(io_err.kind()),
        tungstenite::Error::Protocol(ProtocolError::ResetWithoutClosingHandshake) => true,
        tungstenite::Error::Tls(_) => true,
        _ => false,
    }
}

fn is_transport_io_error_kind(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof
            | ErrorKind::NotConnected
    )
}
