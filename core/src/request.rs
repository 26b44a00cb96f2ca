//! In-flight request tracker (§4.2). Allocates packet ids, owns the
//! pending/ongoing lists and the outstanding-by-id map.

use std::collections::{HashMap, VecDeque};

use fixedbitset::FixedBitSet;

use crate::error::ErrorCode;
use crate::timer::TimeoutLink;

/// Outcome of a `Request::send` attempt (§4.5).
pub enum SendOutcome {
    Ongoing,
    Complete,
    Error,
}

/// What a Request's completion callback observes. Plain acks (PUBACK,
/// UNSUBACK, local completions, PINGREQ) only need `Success`/`Failed`;
/// SUBACK carries per-filter return codes the caller needs too.
pub enum CompletionResult {
    Success,
    SubAck(Vec<mqttbytes::SubscribeReturnCodes>),
    Failed(ErrorCode),
}

impl CompletionResult {
    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            CompletionResult::Failed(code) => Some(*code),
            _ => None,
        }
    }
}

impl From<ErrorCode> for CompletionResult {
    fn from(code: ErrorCode) -> Self {
        CompletionResult::Failed(code)
    }
}

/// One in-flight protocol operation (§3 `Request`).
pub struct Request {
    pub packet_id: u16,
    pub send: Box<dyn FnMut(u16, bool) -> SendOutcome + Send>,
    pub complete: Option<Box<dyn FnOnce(CompletionResult) + Send>>,
    pub retryable: bool,
    pub first_attempt: bool,
    /// Set once an operation timer is armed for this request. Completing
    /// the request (by ack or by the timer itself) takes this link first
    /// so the loser of the race becomes a no-op (§4.3).
    pub timeout_link: Option<TimeoutLink>,
}

impl Request {
    fn complete_with(&mut self, result: CompletionResult) {
        if let Some(complete) = self.complete.take() {
            complete(result);
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Location {
    Pending,
    Ongoing,
}

/// Packet ids start at 1 (0 means "no packet id"); allocation walks forward
/// from the last-used value and wraps, skipping ids currently in use.
pub struct RequestTable {
    outstanding: HashMap<u16, Request>,
    location: HashMap<u16, Location>,
    pending_order: VecDeque<u16>,
    ongoing_order: VecDeque<u16>,
    used_ids: FixedBitSet,
    last_id: u16,
}

impl Default for RequestTable {
    fn default() -> Self {
        RequestTable {
            outstanding: HashMap::new(),
            location: HashMap::new(),
            pending_order: VecDeque::new(),
            ongoing_order: VecDeque::new(),
            used_ids: FixedBitSet::with_capacity(u16::MAX as usize + 1),
            last_id: 0,
        }
    }
}

impl RequestTable {
    pub fn new() -> RequestTable {
        RequestTable::default()
    }

    /// Picks an unused id starting just after the last one handed out,
    /// skipping 0. Returns `None` (packet_id 0) if every slot is occupied.
    fn allocate_id(&mut self) -> Option<u16> {
        let start = self.last_id;
        let mut candidate = start;

        for _ in 0..u16::MAX {
            candidate = if candidate == u16::MAX { 1 } else { candidate + 1 };
            if !self.used_ids.contains(candidate as usize) {
                self.used_ids.insert(candidate as usize);
                self.last_id = candidate;
                return Some(candidate);
            }
        }

        None
    }

    /// Creates a request, placing it on the pending list (offline, or the
    /// caller hasn't attempted a write yet). Returns 0 if ids are exhausted.
    pub fn create_request(
        &mut self,
        send: Box<dyn FnMut(u16, bool) -> SendOutcome + Send>,
        complete: Box<dyn FnOnce(CompletionResult) + Send>,
        retryable: bool,
    ) -> u16 {
        let packet_id = match self.allocate_id() {
            Some(id) => id,
            None => return 0,
        };

        let request = Request {
            packet_id,
            send,
            complete: Some(complete),
            retryable,
            first_attempt: true,
            timeout_link: None,
        };

        self.outstanding.insert(packet_id, request);
        self.location.insert(packet_id, Location::Pending);
        self.pending_order.push_back(packet_id);

        packet_id
    }

    pub fn get_mut(&mut self, packet_id: u16) -> Option<&mut Request> {
        self.outstanding.get_mut(&packet_id)
    }

    /// Attaches the operation timer's link once one has been armed for
    /// this request (§4.3). A no-op if the request has already completed.
    pub fn set_timeout_link(&mut self, packet_id: u16, link: TimeoutLink) {
        if let Some(request) = self.outstanding.get_mut(&packet_id) {
            request.timeout_link = Some(link);
        }
    }

    /// Moves a request from pending to ongoing once its first write
    /// succeeds.
    pub fn mark_ongoing(&mut self, packet_id: u16) {
        if self.location.get(&packet_id) == Some(&Location::Ongoing) {
            return;
        }
        self.pending_order.retain(|id| *id != packet_id);
        self.location.insert(packet_id, Location::Ongoing);
        self.ongoing_order.push_back(packet_id);
    }

    fn forget(&mut self, packet_id: u16) {
        self.location.remove(&packet_id);
        self.pending_order.retain(|id| *id != packet_id);
        self.ongoing_order.retain(|id| *id != packet_id);
        self.used_ids.set(packet_id as usize, false);
    }

    /// Invokes the completion callback, removes the request from every
    /// list and the map, and returns it to the pool (dropped — Rust's
    /// allocator is the pool here).
    pub fn complete(&mut self, packet_id: u16, result: CompletionResult) {
        self.forget(packet_id);
        if let Some(mut request) = self.outstanding.remove(&packet_id) {
            if let Some(link) = &request.timeout_link {
                link.take();
            }
            request.complete_with(result);
        }
    }

    /// §4.2: called on unexpected disconnect for sessions that must
    /// survive (`clean_session = false`). Ongoing requests go back to
    /// pending so they're retried after reconnect.
    pub fn move_ongoing_to_pending(&mut self) {
        while let Some(id) = self.ongoing_order.pop_front() {
            self.location.insert(id, Location::Pending);
            self.pending_order.push_back(id);
            if let Some(req) = self.outstanding.get_mut(&id) {
                req.first_attempt = false;
                // the old timer no longer applies to the resend that's
                // about to be armed fresh in `retry_pending`; suppress it
                // so it can't fire `Timeout` against the new attempt.
                if let Some(link) = req.timeout_link.take() {
                    link.take();
                }
            }
        }
    }

    /// §4.2: called for `clean_session = true` disconnects and final
    /// teardown. Every tracked request completes with `error_code`.
    pub fn cancel_all(&mut self, error_code: ErrorCode) {
        let ids: Vec<u16> = self.outstanding.keys().copied().collect();
        for id in ids {
            self.complete(id, CompletionResult::Failed(error_code));
        }
    }

    /// Ids currently in `pending`, in submission order — used to re-drive
    /// sends after reconnect.
    pub fn pending_ids(&self) -> Vec<u16> {
        self.pending_order.iter().copied().collect()
    }

    pub fn is_pending(&self, packet_id: u16) -> bool {
        self.location.get(&packet_id) == Some(&Location::Pending)
    }

    pub fn is_ongoing(&self, packet_id: u16) -> bool {
        self.location.get(&packet_id) == Some(&Location::Ongoing)
    }

    pub fn contains(&self, packet_id: u16) -> bool {
        self.outstanding.contains_key(&packet_id)
    }

    pub fn len(&self) -> usize {
        self.outstanding.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outstanding.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn noop_send() -> Box<dyn FnMut(u16, bool) -> SendOutcome + Send> {
        Box::new(|_, _| SendOutcome::Ongoing)
    }

    #[test]
    fn packet_id_zero_is_never_allocated() {
        let mut table = RequestTable::new();
        let id = table.create_request(noop_send(), Box::new(|_| {}), true);
        assert_ne!(id, 0);
    }

    #[test]
    fn wrap_around_skips_zero_and_occupied_ids() {
        let mut table = RequestTable::new();
        // occupy every id
        let mut ids = Vec::new();
        for _ in 0..u16::MAX {
            let id = table.create_request(noop_send(), Box::new(|_| {}), true);
            assert_ne!(id, 0);
            ids.push(id);
        }

        // table is full now
        let id = table.create_request(noop_send(), Box::new(|_| {}), true);
        assert_eq!(id, 0);

        // free one in the middle, next allocation should find it
        let freed = ids[1000];
        table.complete(freed, CompletionResult::Success);
        let reused = table.create_request(noop_send(), Box::new(|_| {}), true);
        assert_ne!(reused, 0);
        assert!(reused != 0);
    }

    #[test]
    fn packet_id_lives_in_exactly_one_list() {
        let mut table = RequestTable::new();
        let id = table.create_request(noop_send(), Box::new(|_| {}), true);
        assert!(table.is_pending(id));
        assert!(!table.is_ongoing(id));

        table.mark_ongoing(id);
        assert!(!table.is_pending(id));
        assert!(table.is_ongoing(id));

        table.complete(id, CompletionResult::Success);
        assert!(!table.is_pending(id));
        assert!(!table.is_ongoing(id));
        assert!(!table.contains(id));
    }

    #[test]
    fn completion_callback_fires_exactly_once() {
        let mut table = RequestTable::new();
        let count = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let count2 = count.clone();
        let id = table.create_request(
            noop_send(),
            Box::new(move |_| {
                count2.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            }),
            true,
        );

        table.complete(id, CompletionResult::Success);
        // a stray second completion on a forgotten id must be a no-op
        table.complete(id, CompletionResult::Failed(ErrorCode::Timeout));

        assert_eq!(count.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn clean_session_cancel_reaches_every_outstanding_request() {
        let mut table = RequestTable::new();
        let results = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        for _ in 0..5 {
            let results = results.clone();
            table.create_request(
                noop_send(),
                Box::new(move |r| results.lock().unwrap().push(r.error_code())),
                true,
            );
        }

        table.cancel_all(ErrorCode::CancelledForCleanSession);

        let results = results.lock().unwrap();
        assert_eq!(results.len(), 5);
        assert!(results
            .iter()
            .all(|r| *r == Some(ErrorCode::CancelledForCleanSession)));
        assert!(table.is_empty());
    }
}
