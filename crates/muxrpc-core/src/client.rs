use std::collections::HashMap;
use std::fmt::Display;
use std::net::ToSocketAddrs;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use crossbeam::channel::{bounded, RecvTimeoutError, Sender};
use muxrpc_codec::{
    CodecError, CodecReader, CodecType, CodecWriter, FrameConfig, FrameReader, FrameWriter, Header,
};
use muxrpc_transport::{RpcStream, TcpTransport};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::call::{AsyncCall, Call, CallSlot, PendingReply, DONE_CHANNEL_CAPACITY};
use crate::error::{Result, RpcError};
use crate::options::{handshake_client, Options};

/// Connect to a server over TCP and start a client on the connection.
///
/// `None` options select the default codec.
pub fn dial<A: ToSocketAddrs + Display>(addr: A, options: Option<Options>) -> Result<Client> {
    let options = Options::resolve(options);
    // Fail on a bad codec tag before opening anything.
    options.codec()?;
    let stream = TcpTransport::connect(addr)?;
    Client::new(stream, Some(options))
}

/// Like [`dial`], bounding how long connecting may take.
pub fn dial_timeout<A: ToSocketAddrs + Display>(
    addr: A,
    options: Option<Options>,
    timeout: Duration,
) -> Result<Client> {
    let options = Options::resolve(options);
    options.codec()?;
    let stream = TcpTransport::connect_timeout(addr, timeout)?;
    Client::new(stream, Some(options))
}

/// A client multiplexing concurrent calls over one connection.
///
/// Calls may be issued from any number of threads through a shared
/// reference. Responses are matched to calls by sequence number and may
/// arrive in any order. Dropping the client closes the connection.
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    options: Options,
    codec: CodecType,
    // Lock order: `sending` before `state`.
    sending: Mutex<CodecWriter<RpcStream>>,
    state: Mutex<ClientState>,
    closer: RpcStream,
}

struct ClientState {
    seq: u64,
    pending: HashMap<u64, Box<dyn PendingReply>>,
    closing: bool,
    shutdown: bool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Client {
    /// Start a client on an open connection.
    ///
    /// Writes the connection options and spawns the thread that reads
    /// responses. On error the connection is closed.
    pub fn new(stream: RpcStream, options: Option<Options>) -> Result<Client> {
        let options = Options::resolve(options);
        let codec = options.codec().inspect_err(|_| {
            warn!(codec = %options.codec_type, "rejecting unknown codec");
        })?;
        // Every clone of the stream is dropped on failure, which closes it.
        Self::start(stream, options, codec)
    }

    fn start(stream: RpcStream, options: Options, codec: CodecType) -> Result<Client> {
        let reader_stream = stream.try_clone()?;
        let closer = stream.try_clone()?;

        let mut writer = FrameWriter::with_config_stream(stream, FrameConfig::default())?;
        handshake_client(&mut writer, &options)?;
        let reader = FrameReader::with_config_stream(reader_stream, FrameConfig::default())?;
        let (reader, writer) = codec.new_codec(reader, writer);

        let inner = Arc::new(ClientInner {
            options,
            codec,
            sending: Mutex::new(writer),
            state: Mutex::new(ClientState {
                seq: 1,
                pending: HashMap::new(),
                closing: false,
                shutdown: false,
            }),
            closer,
        });

        let receiver = Arc::clone(&inner);
        thread::Builder::new()
            .name("muxrpc-client-reader".to_string())
            .spawn(move || receiver.receive(reader))
            .map_err(|source| RpcError::Spawn {
                name: "client reader",
                source,
            })?;

        debug!(codec = %codec, "client started");
        Ok(Client { inner })
    }

    /// Options this client's connection was opened with.
    pub fn options(&self) -> &Options {
        &self.inner.options
    }

    pub fn codec_type(&self) -> CodecType {
        self.inner.codec
    }

    /// Start a call without waiting for it.
    ///
    /// Never blocks on the response. Failures, including a dead
    /// connection, are reported through the returned call.
    pub fn go<A, R>(&self, service_method: &str, args: &A) -> AsyncCall<R>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned + Send + 'static,
    {
        let (done, rx) = bounded(DONE_CHANNEL_CAPACITY);
        let seq = self.go_with_done(service_method, args, done);
        AsyncCall {
            seq,
            service_method: service_method.to_string(),
            done: rx,
        }
    }

    /// Start a call that reports completion on a caller-supplied channel.
    ///
    /// Several calls may share one channel. Returns the sequence number
    /// assigned to the call, or `0` when it was rejected without being
    /// sent; the rejection is still delivered on `done`.
    ///
    /// # Panics
    ///
    /// Panics if `done` is a zero-capacity channel.
    pub fn go_with_done<A, R>(&self, service_method: &str, args: &A, done: Sender<Call<R>>) -> u64
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned + Send + 'static,
    {
        assert!(
            done.capacity() != Some(0),
            "muxrpc: done channel is unbuffered"
        );
        let slot = Box::new(CallSlot::new(service_method, done));
        self.inner.send(service_method, args, slot)
    }

    /// Invoke `service_method` and wait for its reply.
    pub fn call<A, R>(&self, service_method: &str, args: &A) -> Result<R>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned + Send + 'static,
    {
        self.go(service_method, args).wait().into_result()
    }

    /// Invoke `service_method`, giving up after `timeout`.
    ///
    /// A call that times out is withdrawn, so a reply arriving later is
    /// read and discarded without disturbing other calls.
    pub fn call_timeout<A, R>(&self, service_method: &str, args: &A, timeout: Duration) -> Result<R>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned + Send + 'static,
    {
        let pending = self.go::<A, R>(service_method, args);
        match pending.done.recv_timeout(timeout) {
            Ok(call) => call.into_result(),
            Err(RecvTimeoutError::Timeout) => {
                if self.inner.remove_call(pending.seq).is_some() {
                    debug!(seq = pending.seq, service_method, "call withdrawn after timeout");
                    return Err(RpcError::Timeout(timeout));
                }
                // Already taken by the reader thread; its result is on the way.
                pending.wait().into_result()
            }
            Err(RecvTimeoutError::Disconnected) => Err(RpcError::Shutdown),
        }
    }

    /// Close the connection.
    ///
    /// Pending calls fail once the reader thread sees the connection go
    /// down. Returns [`RpcError::Shutdown`] if the client was already
    /// closed.
    pub fn close(&self) -> Result<()> {
        let mut state = lock(&self.inner.state);
        if state.closing {
            return Err(RpcError::Shutdown);
        }
        state.closing = true;
        drop(state);
        self.inner.closer.shutdown()?;
        debug!("client closed");
        Ok(())
    }

    /// Whether new calls can still be sent.
    pub fn is_available(&self) -> bool {
        let state = lock(&self.inner.state);
        !state.closing && !state.shutdown
    }

    /// Number of calls waiting for a response.
    pub fn pending_calls(&self) -> usize {
        lock(&self.inner.state).pending.len()
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("codec", &self.inner.codec)
            .field("peer", &self.inner.closer.peer_addr().ok())
            .field("available", &self.is_available())
            .finish()
    }
}

impl ClientInner {
    fn send<A: Serialize + ?Sized>(
        &self,
        service_method: &str,
        args: &A,
        slot: Box<dyn PendingReply>,
    ) -> u64 {
        let mut writer = lock(&self.sending);

        let seq = match self.register_call(slot) {
            Ok(seq) => seq,
            Err(slot) => {
                slot.fail(RpcError::Shutdown);
                return 0;
            }
        };

        let header = Header::request(service_method, seq);
        if let Err(err) = writer.write(&header, args) {
            warn!(seq, service_method, error = %err, "failed to send request");
            // The reader thread may have failed the call already.
            if let Some(call) = self.remove_call(seq) {
                call.fail(err.into());
            }
        }
        seq
    }

    fn register_call(
        &self,
        mut slot: Box<dyn PendingReply>,
    ) -> std::result::Result<u64, Box<dyn PendingReply>> {
        let mut state = lock(&self.state);
        if state.closing || state.shutdown {
            return Err(slot);
        }
        let seq = state.seq;
        state.seq += 1;
        slot.set_seq(seq);
        state.pending.insert(seq, slot);
        Ok(seq)
    }

    fn remove_call(&self, seq: u64) -> Option<Box<dyn PendingReply>> {
        lock(&self.state).pending.remove(&seq)
    }

    fn receive(&self, mut reader: CodecReader<RpcStream>) {
        let err = loop {
            let header = match reader.read_header() {
                Ok(header) => header,
                Err(err) => break Arc::new(err),
            };

            let outcome = match self.remove_call(header.seq) {
                None => {
                    // Withdrawn, or a partially failed send. The body still
                    // has to be read to keep the stream framed.
                    debug!(seq = header.seq, "discarding response for unknown call");
                    reader.discard_body()
                }
                Some(call) if header.is_error() => {
                    let discarded = reader.discard_body();
                    call.fail(RpcError::Server(header.error));
                    discarded
                }
                Some(call) => match reader.read_body_raw() {
                    Ok(body) => {
                        call.complete(self.codec, &body);
                        Ok(())
                    }
                    Err(err) => {
                        let err = Arc::new(err);
                        call.fail(RpcError::Codec(Arc::clone(&err)));
                        break err;
                    }
                },
            };

            if let Err(err) = outcome {
                break Arc::new(err);
            }
        };

        self.terminate_calls(err);
    }

    fn terminate_calls(&self, err: Arc<CodecError>) {
        let _sending = lock(&self.sending);
        let mut state = lock(&self.state);
        state.shutdown = true;

        if state.closing {
            debug!(pending = state.pending.len(), error = %err, "client reader stopped");
        } else {
            warn!(pending = state.pending.len(), error = %err, "client connection lost");
        }

        for (_, call) in state.pending.drain() {
            call.fail(RpcError::Codec(Arc::clone(&err)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_codec_fails_before_connecting() {
        let options = Options {
            magic_number: 0,
            codec_type: "application/gob".to_string(),
        };
        // Nothing listens on port 9; the codec check must come first.
        let err = dial("127.0.0.1:9", Some(options)).unwrap_err();
        assert!(
            matches!(err, RpcError::Codec(ref e) if matches!(**e, CodecError::UnknownCodec(_)))
        );
    }

    #[test]
    fn dial_refused_is_transport_error() {
        let listener = TcpTransport::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr();
        drop(listener);
        let err = dial(addr, None).unwrap_err();
        assert!(matches!(err, RpcError::Transport(_)));
    }

    #[test]
    fn close_twice_reports_shutdown() {
        let listener = TcpTransport::bind("127.0.0.1:0").unwrap();
        let client = dial(listener.local_addr(), None).unwrap();
        let _server_side = listener.accept().unwrap();

        assert!(client.is_available());
        client.close().unwrap();
        assert!(!client.is_available());
        assert!(matches!(client.close(), Err(RpcError::Shutdown)));
    }

    #[test]
    fn calls_after_close_fail_with_shutdown() {
        let listener = TcpTransport::bind("127.0.0.1:0").unwrap();
        let client = dial(listener.local_addr(), None).unwrap();
        let _server_side = listener.accept().unwrap();
        client.close().unwrap();

        let pending = client.go::<_, i64>("Arith.Sum", &(1, 2));
        assert_eq!(pending.seq(), 0);
        let call = pending.wait();
        assert!(matches!(call.result, Err(RpcError::Shutdown)));
    }

    #[test]
    #[should_panic(expected = "done channel is unbuffered")]
    fn unbuffered_done_channel_panics() {
        let listener = TcpTransport::bind("127.0.0.1:0").unwrap();
        let client = dial(listener.local_addr(), None).unwrap();
        let (done, _rx) = bounded::<Call<i64>>(0);
        client.go_with_done("Arith.Sum", &(1, 2), done);
    }

    #[test]
    fn sequence_numbers_start_at_one_and_increase() {
        let listener = TcpTransport::bind("127.0.0.1:0").unwrap();
        let client = dial(listener.local_addr(), None).unwrap();
        let _server_side = listener.accept().unwrap();

        let seqs: Vec<u64> = (0..4)
            .map(|i| client.go::<_, i64>("Arith.Sum", &(i, i)).seq())
            .collect();
        assert_eq!(seqs, vec![1, 2, 3, 4]);
    }
}
