use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use muxrpc_codec::{
    CodecError, CodecReader, CodecType, CodecWriter, FrameConfig, FrameReader, FrameWriter,
    Header, DEFAULT_MAX_PAYLOAD,
};
use muxrpc_transport::{RpcStream, TcpTransport};
use tracing::{debug, info, warn};

use crate::error::{Result, RpcError};
use crate::options::{handshake_server, HandshakeConfig};

/// Routes a decoded request to its handler.
///
/// Receives the raw argument bytes and the connection's codec; returns the
/// encoded reply, or an error message to send back in the response header.
pub trait Dispatch: Send + Sync {
    fn dispatch(
        &self,
        service_method: &str,
        codec: CodecType,
        args: &[u8],
    ) -> std::result::Result<Vec<u8>, String>;
}

impl<F> Dispatch for F
where
    F: Fn(&str, CodecType, &[u8]) -> std::result::Result<Vec<u8>, String> + Send + Sync,
{
    fn dispatch(
        &self,
        service_method: &str,
        codec: CodecType,
        args: &[u8],
    ) -> std::result::Result<Vec<u8>, String> {
        self(service_method, codec, args)
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Time allowed for a new connection to send its options.
    pub handshake_timeout: Duration,
    /// Maximum options payload size in bytes.
    pub max_handshake_payload: usize,
    /// Maximum payload size of request and reply frames after the handshake.
    /// A reply over the limit is answered with an error instead.
    pub max_payload_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let handshake = HandshakeConfig::default();
        Self {
            handshake_timeout: handshake.timeout,
            max_handshake_payload: handshake.max_handshake_payload,
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}

impl ServerConfig {
    fn handshake(&self) -> HandshakeConfig {
        HandshakeConfig {
            timeout: self.handshake_timeout,
            max_handshake_payload: self.max_handshake_payload,
        }
    }
}

/// A request read off a connection, waiting to be dispatched.
#[derive(Debug)]
pub struct Request {
    /// The request header. Its `error` field is filled in if dispatch fails
    /// and the header is echoed back as the response header.
    pub header: Header,
    /// Undecoded arguments.
    pub args: Bytes,
}

/// Serves requests on accepted connections, one thread per connection and
/// one per in-flight request.
#[derive(Clone)]
pub struct Server {
    dispatcher: Arc<dyn Dispatch>,
    config: ServerConfig,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Server {
    pub fn new(dispatcher: impl Dispatch + 'static) -> Self {
        Self::with_config(dispatcher, ServerConfig::default())
    }

    pub fn with_config(dispatcher: impl Dispatch + 'static, config: ServerConfig) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
            config,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Accept connections until the listener fails, serving each on its own
    /// thread.
    pub fn accept(&self, listener: &TcpTransport) -> Result<()> {
        info!(
            addr = %listener.local_addr(),
            transport = listener.transport_name(),
            "accepting connections"
        );
        loop {
            let stream = listener.accept().inspect_err(|err| {
                warn!(error = %err, "accept failed");
            })?;

            let server = self.clone();
            thread::Builder::new()
                .name("muxrpc-conn".to_string())
                .spawn(move || {
                    let peer = stream.peer_addr().ok();
                    if let Err(err) = server.serve_conn(stream) {
                        warn!(peer = ?peer, error = %err, "connection failed");
                    }
                })
                .map_err(|source| RpcError::Spawn {
                    name: "connection",
                    source,
                })?;
        }
    }

    /// Serve one connection until the client hangs up.
    ///
    /// Blocks. Handshake failures are returned; once requests are flowing,
    /// a read error just ends the connection. The connection is closed on
    /// return, after every in-flight request has been answered or dropped.
    pub fn serve_conn(&self, stream: RpcStream) -> Result<()> {
        let peer = stream.peer_addr().ok();
        let closer = stream.try_clone()?;
        let result = self.serve_stream(stream, peer);
        let _ = closer.shutdown();
        result
    }

    fn serve_stream(&self, stream: RpcStream, peer: Option<SocketAddr>) -> Result<()> {
        let mut frames = FrameReader::with_config_stream(
            stream.try_clone()?,
            FrameConfig {
                max_payload_size: self.config.max_handshake_payload,
                read_timeout: Some(self.config.handshake_timeout),
                write_timeout: None,
            },
        )?;
        let codec = handshake_server(&mut frames, &self.config.handshake())?;

        frames.set_read_timeout(None)?;
        frames.set_max_payload_size(self.config.max_payload_size);
        let writer = FrameWriter::with_config_stream(
            stream,
            FrameConfig {
                max_payload_size: self.config.max_payload_size,
                ..FrameConfig::default()
            },
        )?;

        let (reader, writer) = codec.new_codec(frames, writer);
        debug!(peer = ?peer, codec = %codec, "connection established");
        self.serve_codec(reader, writer, peer);
        Ok(())
    }

    fn serve_codec(
        &self,
        mut reader: CodecReader<RpcStream>,
        writer: CodecWriter<RpcStream>,
        peer: Option<SocketAddr>,
    ) {
        let codec = reader.codec_type();
        let sending = Mutex::new(writer);
        let dispatcher = &*self.dispatcher;

        thread::scope(|scope| loop {
            let request = match read_request(&mut reader) {
                Ok(request) => request,
                Err(ReadFailure::Header(err)) => {
                    if matches!(err, CodecError::ConnectionClosed) {
                        debug!(peer = ?peer, "client hung up");
                    } else {
                        warn!(peer = ?peer, error = %err, "failed to read request header");
                    }
                    break;
                }
                Err(ReadFailure::Body { mut header, err }) => {
                    warn!(
                        peer = ?peer,
                        seq = header.seq,
                        error = %err,
                        "failed to read request body"
                    );
                    header.error = format!("rpc server: read request body: {err}");
                    send_response(&sending, &header, &empty_body(codec));
                    break;
                }
            };

            let sending = &sending;
            let spawned = thread::Builder::new()
                .name("muxrpc-request".to_string())
                .spawn_scoped(scope, move || {
                    request.handle(dispatcher, codec, sending);
                });
            if let Err(err) = spawned {
                warn!(
                    peer = ?peer,
                    error = %err,
                    "cannot spawn request thread, dropping connection"
                );
                break;
            }
        });
    }
}

enum ReadFailure {
    Header(CodecError),
    Body { header: Header, err: CodecError },
}

fn read_request(reader: &mut CodecReader<RpcStream>) -> std::result::Result<Request, ReadFailure> {
    let header = reader.read_header().map_err(ReadFailure::Header)?;
    match reader.read_body_raw() {
        Ok(args) => Ok(Request { header, args }),
        Err(err) => Err(ReadFailure::Body { header, err }),
    }
}

impl Request {
    fn handle(
        mut self,
        dispatcher: &dyn Dispatch,
        codec: CodecType,
        sending: &Mutex<CodecWriter<RpcStream>>,
    ) {
        let body = match dispatcher.dispatch(&self.header.service_method, codec, &self.args) {
            Ok(body) => body,
            Err(error) => {
                debug!(
                    seq = self.header.seq,
                    service_method = %self.header.service_method,
                    %error,
                    "call failed"
                );
                self.header.error = error;
                empty_body(codec)
            }
        };
        send_response(sending, &self.header, &body);
    }
}

fn empty_body(codec: CodecType) -> Vec<u8> {
    codec.encode(&()).unwrap_or_default()
}

/// Write a response. A reply the writer refuses before touching the stream
/// (over the payload limit) is turned into an error response, so the caller
/// still gets a completion.
fn send_response(sending: &Mutex<CodecWriter<RpcStream>>, header: &Header, body: &[u8]) {
    let mut writer = sending.lock().unwrap_or_else(PoisonError::into_inner);
    match writer.write_raw(header, body) {
        Ok(()) => {}
        Err(err @ CodecError::PayloadTooLarge { .. }) if !header.is_error() => {
            warn!(
                seq = header.seq,
                service_method = %header.service_method,
                error = %err,
                "reply rejected by writer"
            );
            let failed = Header {
                error: format!("rpc server: reply too large: {err}"),
                ..header.clone()
            };
            let empty = empty_body(writer.codec_type());
            if let Err(err) = writer.write_raw(&failed, &empty) {
                debug!(seq = header.seq, error = %err, "failed to write error response");
            }
        }
        Err(err) => {
            debug!(seq = header.seq, error = %err, "failed to write response");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use muxrpc_codec::FrameKind;

    use super::*;
    use crate::options::{handshake_client, Options, MAGIC_NUMBER};

    fn echo(_: &str, _: CodecType, args: &[u8]) -> std::result::Result<Vec<u8>, String> {
        Ok(args.to_vec())
    }

    fn serve_one(server: Server) -> (SocketAddr, thread::JoinHandle<Result<()>>) {
        let listener = TcpTransport::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr();
        let handle = thread::spawn(move || {
            let stream = listener.accept().unwrap();
            server.serve_conn(stream)
        });
        (addr, handle)
    }

    #[test]
    fn wrong_magic_closes_connection() {
        let (addr, handle) = serve_one(Server::new(echo));

        let mut stream = TcpTransport::connect(addr).unwrap();
        let options = serde_json::to_vec(&Options {
            magic_number: MAGIC_NUMBER + 1,
            codec_type: CodecType::Json.tag().to_string(),
        })
        .unwrap();
        let header = CodecType::Json.encode(&Header::request("Echo.Echo", 1)).unwrap();
        let body = CodecType::Json.encode("ping").unwrap();

        // A well-formed request rides in the same write as the bad options.
        FrameWriter::new(stream.try_clone().unwrap())
            .send_frames(&[
                (FrameKind::Options, &options),
                (FrameKind::Header, &header),
                (FrameKind::Body, &body),
            ])
            .unwrap();

        let err = handle.join().unwrap().unwrap_err();
        assert!(matches!(err, RpcError::HandshakeFailed(_)));

        let mut received = Vec::new();
        match stream.read_to_end(&mut received) {
            Ok(_) => assert!(received.is_empty(), "server answered: {received:?}"),
            Err(err) => assert_eq!(err.kind(), std::io::ErrorKind::ConnectionReset),
        }
    }

    #[test]
    fn unknown_codec_closes_connection() {
        let (addr, handle) = serve_one(Server::new(echo));

        let stream = TcpTransport::connect(addr).unwrap();
        let mut writer = FrameWriter::new(stream);
        handshake_client(
            &mut writer,
            &Options {
                magic_number: MAGIC_NUMBER,
                codec_type: "application/gob".to_string(),
            },
        )
        .unwrap();

        let err = handle.join().unwrap().unwrap_err();
        assert!(matches!(err, RpcError::HandshakeFailed(ref msg) if msg.contains("gob")));
    }

    #[test]
    fn silent_client_times_out() {
        let server = Server::with_config(
            echo,
            ServerConfig {
                handshake_timeout: Duration::from_millis(100),
                ..ServerConfig::default()
            },
        );
        let (addr, handle) = serve_one(server);
        let _stream = TcpTransport::connect(addr).unwrap();

        let err = handle.join().unwrap().unwrap_err();
        assert!(matches!(err, RpcError::Timeout(_)));
    }

    #[test]
    fn serves_until_client_hangs_up() {
        let (addr, handle) = serve_one(Server::new(echo));
        let stream = TcpTransport::connect(addr).unwrap();

        let mut writer = FrameWriter::new(stream.try_clone().unwrap());
        handshake_client(&mut writer, &Options::with_codec(CodecType::Json)).unwrap();
        let (mut reader, mut writer) =
            CodecType::Json.new_codec(FrameReader::new(stream.try_clone().unwrap()), writer);

        writer.write(&Header::request("Echo.Echo", 1), "ping").unwrap();
        let header = reader.read_header().unwrap();
        assert_eq!(header.seq, 1);
        assert_eq!(header.service_method, "Echo.Echo");
        assert!(!header.is_error());
        assert_eq!(reader.read_body::<String>().unwrap(), "ping");

        stream.shutdown().unwrap();
        handle.join().unwrap().unwrap();
    }

    #[test]
    fn dispatch_error_sets_header_and_unit_body() {
        fn failing(method: &str, _: CodecType, _: &[u8]) -> std::result::Result<Vec<u8>, String> {
            Err(format!("rpc server: can't find service {method}"))
        }
        let (addr, _handle) = serve_one(Server::new(failing));
        let stream = TcpTransport::connect(addr).unwrap();

        let mut writer = FrameWriter::new(stream.try_clone().unwrap());
        handshake_client(&mut writer, &Options::with_codec(CodecType::Bincode)).unwrap();
        let (mut reader, mut writer) =
            CodecType::Bincode.new_codec(FrameReader::new(stream.try_clone().unwrap()), writer);

        writer.write(&Header::request("Nope.Call", 4), &1u8).unwrap();
        let header = reader.read_header().unwrap();
        assert_eq!(header.seq, 4);
        assert_eq!(header.error, "rpc server: can't find service Nope.Call");
        reader.read_body::<()>().unwrap();
        stream.shutdown().unwrap();
    }
}
