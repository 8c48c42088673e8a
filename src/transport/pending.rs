//! Request lifecycle: queued, awaiting reply, settled.
//!
//! A [`PendingRequest`] is in exactly one place at a time: the outbound
//! queue or the awaiting-reply table of [`RequestTable`]. Settling consumes
//! it, so it cannot be settled twice. The caller holds the matching
//! [`PendingReply`].

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use rustc_hash::FxHashMap;
use tokio::sync::oneshot;
use tracing::trace;

use crate::error::{Error, Result};
use crate::identifiers::ReqSeq;
use crate::protocol::{Reply, ResponseType};

// ============================================================================
// PendingRequest
// ============================================================================

/// An encoded request waiting to be sent or answered.
#[derive(Debug)]
pub(crate) struct PendingRequest {
    pub(crate) req_seq: ReqSeq,
    pub(crate) uri: String,
    pub(crate) frame: Bytes,
    pub(crate) response_type: ResponseType,
    reply_tx: oneshot::Sender<Result<Reply>>,
}

impl PendingRequest {
    /// Creates a request and the future its caller awaits.
    pub(crate) fn new(
        req_seq: ReqSeq,
        uri: String,
        frame: Bytes,
        response_type: ResponseType,
    ) -> (Self, PendingReply) {
        let (reply_tx, reply_rx) = oneshot::channel();
        let request = Self {
            req_seq,
            uri,
            frame,
            response_type,
            reply_tx,
        };
        (request, PendingReply::new(req_seq, reply_rx))
    }

    /// Returns `true` if the caller dropped its [`PendingReply`].
    #[inline]
    pub(crate) fn is_cancelled(&self) -> bool {
        self.reply_tx.is_closed()
    }

    /// Delivers the outcome to the caller.
    pub(crate) fn settle(self, result: Result<Reply>) {
        if self.reply_tx.send(result).is_err() {
            trace!(req_seq = %self.req_seq, "Caller went away before settlement");
        }
    }
}

// ============================================================================
// PendingReply
// ============================================================================

/// Future resolving to the reply of one request.
///
/// Dropping it cancels the request: a queued request is then discarded
/// instead of sent.
#[derive(Debug)]
#[must_use = "a PendingReply does nothing unless awaited"]
pub struct PendingReply {
    req_seq: Option<ReqSeq>,
    rx: Option<oneshot::Receiver<Result<Reply>>>,
}

impl PendingReply {
    fn new(req_seq: ReqSeq, rx: oneshot::Receiver<Result<Reply>>) -> Self {
        Self {
            req_seq: Some(req_seq),
            rx: Some(rx),
        }
    }

    /// A reply that resolves to [`Error::Abandoned`] immediately.
    ///
    /// Returned for sends skipped because the session was rotated.
    pub(crate) fn abandoned() -> Self {
        Self {
            req_seq: None,
            rx: None,
        }
    }

    /// Returns the sequence number assigned to the request.
    ///
    /// `None` if the request was never created.
    #[inline]
    #[must_use]
    pub fn req_seq(&self) -> Option<ReqSeq> {
        self.req_seq
    }
}

impl Future for PendingReply {
    type Output = Result<Reply>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let Some(rx) = self.rx.as_mut() else {
            return Poll::Ready(Err(Error::Abandoned));
        };

        match Pin::new(rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(Error::Abandoned)),
            Poll::Pending => Poll::Pending,
        }
    }
}

// ============================================================================
// RequestTable
// ============================================================================

/// A transmitted request and its position in transmit order.
#[derive(Debug)]
struct InFlight {
    order: u64,
    request: PendingRequest,
}

/// Outbound queue plus awaiting-reply table.
#[derive(Debug, Default)]
pub(crate) struct RequestTable {
    outbound: VecDeque<PendingRequest>,
    awaiting: FxHashMap<ReqSeq, InFlight>,
    next_order: u64,
}

impl RequestTable {
    pub(crate) fn push_back(&mut self, request: PendingRequest) {
        self.outbound.push_back(request);
    }

    pub(crate) fn pop_front(&mut self) -> Option<PendingRequest> {
        self.outbound.pop_front()
    }

    /// Moves a request into the awaiting-reply table.
    pub(crate) fn mark_sent(&mut self, request: PendingRequest) {
        let order = self.next_order;
        self.next_order += 1;
        self.awaiting
            .insert(request.req_seq, InFlight { order, request });
    }

    /// Removes the awaiting entry for `req_seq`.
    pub(crate) fn take_awaiting(&mut self, req_seq: ReqSeq) -> Option<PendingRequest> {
        self.awaiting.remove(&req_seq).map(|entry| entry.request)
    }

    /// Moves every awaiting request to the front of the outbound queue,
    /// in the order they were transmitted. Returns how many moved.
    pub(crate) fn requeue_awaiting(&mut self) -> usize {
        let mut in_flight: Vec<InFlight> = self.awaiting.drain().map(|(_, entry)| entry).collect();
        in_flight.sort_unstable_by_key(|entry| entry.order);

        let count = in_flight.len();
        for entry in in_flight.into_iter().rev() {
            self.outbound.push_front(entry.request);
        }
        count
    }

    /// Settles every request with `error()`. Returns how many there were.
    pub(crate) fn fail_all(&mut self, error: impl Fn() -> Error) -> usize {
        let queued = self.outbound.drain(..);
        let awaiting = self.awaiting.drain().map(|(_, entry)| entry.request);

        let mut count = 0;
        for request in queued.chain(awaiting) {
            request.settle(Err(error()));
            count += 1;
        }
        count
    }

    #[inline]
    pub(crate) fn outbound_len(&self) -> usize {
        self.outbound.len()
    }

    #[inline]
    pub(crate) fn awaiting_len(&self) -> usize {
        self.awaiting.len()
    }

    #[inline]
    pub(crate) fn has_outbound(&self) -> bool {
        !self.outbound.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
