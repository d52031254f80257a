use std::time::Duration;

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use muxrpc_codec::CodecType;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{Result, RpcError};

/// Capacity of the completion channel created for each call by
/// [`Client::go`](crate::Client::go).
pub const DONE_CHANNEL_CAPACITY: usize = 1;

/// A finished call: which request it was and how it ended.
#[derive(Debug)]
pub struct Call<R> {
    /// Sequence number assigned when the call was sent. `0` means the call
    /// never reached the wire.
    pub seq: u64,
    /// `"Service.Method"` that was invoked.
    pub service_method: String,
    /// The decoded reply or the reason there is none.
    pub result: Result<R>,
}

impl<R> Call<R> {
    /// Consume the call, keeping only its outcome.
    pub fn into_result(self) -> Result<R> {
        self.result
    }

    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// A call in flight, returned by [`Client::go`](crate::Client::go).
#[derive(Debug)]
pub struct AsyncCall<R> {
    pub(crate) seq: u64,
    pub(crate) service_method: String,
    pub(crate) done: Receiver<Call<R>>,
}

impl<R> AsyncCall<R> {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn service_method(&self) -> &str {
        &self.service_method
    }

    /// The completion channel, for use with `crossbeam::select!`.
    pub fn done(&self) -> &Receiver<Call<R>> {
        &self.done
    }

    /// Block until the call completes.
    pub fn wait(self) -> Call<R> {
        match self.done.recv() {
            Ok(call) => call,
            Err(_) => self.abandoned(),
        }
    }

    /// Wait at most `timeout` for the call to complete.
    ///
    /// The call stays registered on timeout; use
    /// [`Client::call_timeout`](crate::Client::call_timeout) to give up on it.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Call<R>> {
        match self.done.recv_timeout(timeout) {
            Ok(call) => Some(call),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(self.abandoned()),
        }
    }

    /// Return the completed call if it is ready.
    pub fn try_wait(&self) -> Option<Call<R>> {
        match self.done.try_recv() {
            Ok(call) => Some(call),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(self.abandoned()),
        }
    }

    // The pending entry was dropped without completing, which only happens
    // when the call was withdrawn.
    fn abandoned(&self) -> Call<R> {
        Call {
            seq: self.seq,
            service_method: self.service_method.clone(),
            result: Err(RpcError::Shutdown),
        }
    }
}

/// A pending entry as the client's reader thread sees it: it knows the
/// sequence number but not the reply type.
pub(crate) trait PendingReply: Send {
    fn set_seq(&mut self, seq: u64);

    /// Decode `body` as the reply and deliver it.
    fn complete(self: Box<Self>, codec: CodecType, body: &[u8]);

    /// Deliver a failure.
    fn fail(self: Box<Self>, err: RpcError);
}

pub(crate) struct CallSlot<R> {
    seq: u64,
    service_method: String,
    done: Sender<Call<R>>,
}

impl<R> CallSlot<R> {
    pub(crate) fn new(service_method: &str, done: Sender<Call<R>>) -> Self {
        Self {
            seq: 0,
            service_method: service_method.to_string(),
            done,
        }
    }

    fn deliver(self, result: Result<R>) {
        let call = Call {
            seq: self.seq,
            service_method: self.service_method,
            result,
        };
        // A dropped receiver means the caller stopped waiting.
        if self.done.send(call).is_err() {
            debug!(seq = self.seq, "call completed after its caller went away");
        }
    }
}

impl<R: DeserializeOwned + Send + 'static> PendingReply for CallSlot<R> {
    fn set_seq(&mut self, seq: u64) {
        self.seq = seq;
    }

    fn complete(self: Box<Self>, codec: CodecType, body: &[u8]) {
        (*self).deliver(codec.decode(body).map_err(RpcError::from));
    }

    fn fail(self: Box<Self>, err: RpcError) {
        (*self).deliver(Err(err));
    }
}

#[cfg(test)]
mod tests {
    use crossbeam::channel::bounded;

    use super::*;

    fn slot(done: Sender<Call<u32>>) -> Box<dyn PendingReply> {
        let mut slot = Box::new(CallSlot::new("Arith.Sum", done));
        slot.set_seq(9);
        slot
    }

    #[test]
    fn complete_decodes_reply() {
        let (tx, rx) = bounded(DONE_CHANNEL_CAPACITY);
        let body = CodecType::Json.encode(&42u32).unwrap();
        slot(tx).complete(CodecType::Json, &body);

        let call = rx.recv().unwrap();
        assert_eq!(call.seq, 9);
        assert_eq!(call.service_method, "Arith.Sum");
        assert_eq!(call.into_result().unwrap(), 42);
    }

    #[test]
    fn undecodable_reply_becomes_call_error() {
        let (tx, rx) = bounded(DONE_CHANNEL_CAPACITY);
        let body = CodecType::Json.encode("forty-two").unwrap();
        slot(tx).complete(CodecType::Json, &body);

        let call = rx.recv().unwrap();
        assert!(matches!(call.result, Err(RpcError::Codec(_))));
    }

    #[test]
    fn fail_delivers_error() {
        let (tx, rx) = bounded(DONE_CHANNEL_CAPACITY);
        slot(tx).fail(RpcError::Server("boom".to_string()));
        let call = rx.recv().unwrap();
        assert!(matches!(call.result, Err(RpcError::Server(ref msg)) if msg == "boom"));
    }

    #[test]
    fn delivery_to_departed_caller_is_dropped() {
        let (tx, rx) = bounded::<Call<u32>>(DONE_CHANNEL_CAPACITY);
        drop(rx);
        slot(tx).fail(RpcError::Shutdown);
    }

    #[test]
    fn withdrawn_call_reads_as_shutdown() {
        let (tx, rx) = bounded::<Call<u32>>(DONE_CHANNEL_CAPACITY);
        let pending = AsyncCall {
            seq: 3,
            service_method: "A.B".to_string(),
            done: rx,
        };
        assert!(pending.try_wait().is_none());
        drop(tx);
        let call = pending.wait();
        assert_eq!(call.seq, 3);
        assert!(matches!(call.result, Err(RpcError::Shutdown)));
    }
}
