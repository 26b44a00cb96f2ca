//! Drives each user-level MQTT operation through send/retry/complete
//! (§4.5), integrating `TopicTree`, `RequestTable` and `TimerSet`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use mqttbytes::{Packet, QoS, Publish as WirePublish, Subscribe as WireSubscribe, SubscribeFilter,
    SubscribeReturnCodes, Unsubscribe as WireUnsubscribe};
use tokio::sync::mpsc::UnboundedSender;

use crate::error::ErrorCode;
use crate::request::{CompletionResult, SendOutcome};
use crate::state::Synced;
use crate::timer::TimerSet;
use crate::topic::{OnCleanup, OnPublish, Transaction};

pub type SharedTopicTree = Arc<Mutex<crate::topic::TopicTree>>;
pub type Outgoing = UnboundedSender<Packet>;

/// Everything SUBSCRIBE/UNSUBSCRIBE/PUBLISH/PINGREQ need beyond what
/// `RequestTable` already tracks. Holds the same `Synced` mutex the
/// connection FSM (`state.rs`) guards, so an operation timeout firing on
/// the timer task can complete the request directly.
pub struct OperationEngine {
    synced: Arc<Mutex<Synced>>,
    topics: SharedTopicTree,
    outgoing: Outgoing,
    timers: Arc<TimerSet>,
    operation_timeout: Option<Duration>,
}

impl OperationEngine {
    pub fn new(
        synced: Arc<Mutex<Synced>>,
        topics: SharedTopicTree,
        outgoing: Outgoing,
        timers: Arc<TimerSet>,
        operation_timeout: Option<Duration>,
    ) -> Self {
        OperationEngine { synced, topics, outgoing, timers, operation_timeout }
    }

    pub fn topics(&self) -> &SharedTopicTree {
        &self.topics
    }

    /// Creates the request under the lock and immediately attempts its
    /// first send, applying the ONGOING/COMPLETE/ERROR outcome (§4.5).
    /// Arms the operation timer for requests that go ONGOING, unless
    /// `retryable` is false (PUBLISH QoS 0, local SUBSCRIBE, PINGREQ).
    fn submit(
        &self,
        send: Box<dyn FnMut(u16, bool) -> SendOutcome + Send>,
        complete: Box<dyn FnOnce(CompletionResult) + Send>,
        retryable: bool,
    ) -> u16 {
        let (packet_id, arm) = {
            let mut synced = self.synced.lock().unwrap();
            let packet_id = synced.requests.create_request(send, complete, retryable);
            if packet_id == 0 {
                return 0;
            }

            let arm = Self::attempt_send(&mut synced, packet_id, true, retryable);
            (packet_id, arm)
        };

        // Lock released above: arming talks to the same mutex via the
        // timer's fire callback, so it must not be held here.
        if arm {
            if let Some(timeout) = self.operation_timeout {
                self.arm_operation_timer(packet_id, timeout);
            }
        }

        packet_id
    }

    /// Drives one send attempt, applying its outcome. Returns whether the
    /// caller should arm an operation timer (outcome was ONGOING and the
    /// request is retryable).
    fn attempt_send(synced: &mut Synced, packet_id: u16, first_attempt: bool, retryable: bool) -> bool {
        let outcome = match synced.requests.get_mut(packet_id) {
            Some(request) => (request.send)(packet_id, first_attempt),
            None => return false,
        };

        match outcome {
            SendOutcome::Complete => {
                synced.requests.complete(packet_id, CompletionResult::Success);
                false
            }
            SendOutcome::Ongoing => {
                synced.requests.mark_ongoing(packet_id);
                retryable
            }
            SendOutcome::Error => {
                synced.requests.complete(packet_id, CompletionResult::Failed(ErrorCode::UnexpectedHangup));
                false
            }
        }
    }

    /// Races the request's own completion against `timeout`: whichever
    /// side's `TimeoutLink::take()` wins decides the outcome (§4.3). The
    /// link is stashed on the request itself so an ack arriving through
    /// `eventloop.rs` suppresses this timer without needing to reach back
    /// into `OperationEngine`.
    fn arm_operation_timer(&self, packet_id: u16, timeout: Duration) {
        let synced = self.synced.clone();
        let handle = self.timers.arm(timeout, move || {
            let mut synced = synced.lock().unwrap();
            if synced.requests.contains(packet_id) {
                synced.requests.complete(packet_id, CompletionResult::Failed(ErrorCode::Timeout));
            }
        });

        let mut synced = self.synced.lock().unwrap();
        synced.requests.set_timeout_link(packet_id, handle.link());
        // the request now owns the cancellation path; the tokio task
        // keeps running and is a no-op if it loses the race.
        drop(handle);
    }

    /// PUBLISH (§4.5). QoS 0 completes locally without an ack and is not
    /// retried on reconnect (§9 open question a). QoS>0 uses the
    /// allocated packet id, sets DUP on retry, and arms the operation
    /// timer.
    pub fn publish(
        &self,
        topic: String,
        qos: QoS,
        retain: bool,
        payload: bytes::Bytes,
        on_complete: impl FnOnce(Result<(), ErrorCode>) + Send + 'static,
    ) -> u16 {
        let outgoing = self.outgoing.clone();
        let send: Box<dyn FnMut(u16, bool) -> SendOutcome + Send> = Box::new(move |pkid, first_attempt| {
            let publish = WirePublish {
                dup: qos != QoS::AtMostOnce && !first_attempt,
                qos,
                retain,
                topic: topic.clone(),
                pkid: if qos == QoS::AtMostOnce { 0 } else { pkid },
                payload: payload.clone(),
            };

            match outgoing.send(Packet::Publish(publish)) {
                Ok(()) if qos == QoS::AtMostOnce => SendOutcome::Complete,
                Ok(()) => SendOutcome::Ongoing,
                Err(_) => SendOutcome::Error,
            }
        });

        let complete = Box::new(move |result: CompletionResult| {
            on_complete(match result {
                CompletionResult::Success => Ok(()),
                CompletionResult::Failed(code) => Err(code),
                CompletionResult::SubAck(_) => Ok(()),
            });
        });

        let retryable = qos != QoS::AtMostOnce;
        self.submit(send, complete, retryable)
    }

    /// SUBSCRIBE (§4.5). Stages transactional inserts before the first
    /// send attempt; the send closure commits on handoff success, rolls
    /// back on failure.
    pub fn subscribe(
        &self,
        filters: Vec<(String, QoS, OnPublish, Option<OnCleanup>)>,
        on_suback: impl FnOnce(Result<Vec<SubscribeReturnCodes>, ErrorCode>) + Send + 'static,
    ) -> u16 {
        let wire_filters: Vec<SubscribeFilter> = filters
            .iter()
            .map(|(path, qos, _, _)| SubscribeFilter::new(path.clone(), *qos))
            .collect();

        let mut tx = Transaction::default();
        {
            let mut topics = self.topics.lock().unwrap();
            for (path, qos, on_publish, on_cleanup) in filters {
                topics.transaction_insert(&mut tx, &path, qos, on_publish, on_cleanup, false);
            }
        }

        let topics = self.topics.clone();
        let mut staged = Some(tx);
        let outgoing = self.outgoing.clone();

        let send: Box<dyn FnMut(u16, bool) -> SendOutcome + Send> = Box::new(move |pkid, first_attempt| {
            let packet = WireSubscribe::new(pkid, wire_filters.clone());
            let sent = outgoing.send(Packet::Subscribe(packet)).is_ok();

            if first_attempt {
                let mut topics = topics.lock().unwrap();
                match staged.take() {
                    Some(tx) if sent => topics.transaction_commit(tx),
                    Some(tx) => topics.transaction_roll_back(tx),
                    None => {}
                }
            }

            if sent {
                SendOutcome::Ongoing
            } else {
                SendOutcome::Error
            }
        });

        let complete = Box::new(move |result: CompletionResult| {
            on_suback(match result {
                CompletionResult::SubAck(codes) => Ok(codes),
                CompletionResult::Success => Ok(Vec::new()),
                CompletionResult::Failed(code) => Err(code),
            });
        });

        self.submit(send, complete, true)
    }

    /// Local-only SUBSCRIBE: inserted directly, no transaction, no
    /// packet, completes immediately (§4.5).
    pub fn subscribe_local(
        &self,
        filter: String,
        qos: QoS,
        on_publish: OnPublish,
        on_cleanup: Option<OnCleanup>,
        on_suback: impl FnOnce(Result<Vec<SubscribeReturnCodes>, ErrorCode>) + Send + 'static,
    ) -> u16 {
        {
            let mut topics = self.topics.lock().unwrap();
            topics.insert(&filter, qos, on_publish, on_cleanup, true);
        }

        let send: Box<dyn FnMut(u16, bool) -> SendOutcome + Send> = Box::new(|_, _| SendOutcome::Complete);
        let complete = Box::new(move |result: CompletionResult| {
            on_suback(match result {
                CompletionResult::Failed(code) => Err(code),
                _ => Ok(vec![SubscribeReturnCodes::Success(qos)]),
            });
        });

        self.submit(send, complete, false)
    }

    /// UNSUBSCRIBE (§4.5). If the removed subscription was local-only the
    /// operation completes without any wire activity.
    pub fn unsubscribe(
        &self,
        filter: String,
        on_unsuback: impl FnOnce(Result<(), ErrorCode>) + Send + 'static,
    ) -> u16 {
        let mut tx = Transaction::default();
        let local_only = {
            let mut topics = self.topics.lock().unwrap();
            topics.transaction_remove(&mut tx, &filter)
        };

        let local_only = match local_only {
            None => {
                let complete = Box::new(move |result: CompletionResult| {
                    on_unsuback(match result {
                        CompletionResult::Failed(code) => Err(code),
                        _ => Ok(()),
                    });
                });
                return self.submit(Box::new(|_, _| SendOutcome::Complete), complete, false);
            }
            Some(local_only) => local_only,
        };

        if local_only {
            self.topics.lock().unwrap().transaction_commit(tx);
            let complete = Box::new(move |result: CompletionResult| {
                on_unsuback(match result {
                    CompletionResult::Failed(code) => Err(code),
                    _ => Ok(()),
                });
            });
            return self.submit(Box::new(|_, _| SendOutcome::Complete), complete, false);
        }

        let topics = self.topics.clone();
        let mut staged = Some(tx);
        let outgoing = self.outgoing.clone();
        let filter_for_send = filter.clone();

        let send: Box<dyn FnMut(u16, bool) -> SendOutcome + Send> = Box::new(move |pkid, first_attempt| {
            let packet = WireUnsubscribe::new(pkid, vec![filter_for_send.clone()]);
            let sent = outgoing.send(Packet::Unsubscribe(packet)).is_ok();

            if first_attempt {
                let mut topics = topics.lock().unwrap();
                match staged.take() {
                    Some(tx) if sent => topics.transaction_commit(tx),
                    Some(tx) => topics.transaction_roll_back(tx),
                    None => {}
                }
            }

            if sent {
                SendOutcome::Ongoing
            } else {
                SendOutcome::Error
            }
        });

        let complete = Box::new(move |result: CompletionResult| {
            on_unsuback(match result {
                CompletionResult::Failed(code) => Err(code),
                _ => Ok(()),
            });
        });

        self.submit(send, complete, true)
    }

    /// `resubscribe_existing_topics` (§4.6): a single SUBSCRIBE covering
    /// every currently-held filter. Zero subscriptions completes with
    /// success and sends nothing.
    pub fn resubscribe_existing(
        &self,
        on_suback: impl FnOnce(Result<Vec<SubscribeReturnCodes>, ErrorCode>) + Send + 'static,
    ) -> u16 {
        let existing: Vec<(String, QoS)> = {
            let topics = self.topics.lock().unwrap();
            let mut out = Vec::new();
            topics.iterate(|filter, qos| out.push((filter.to_owned(), qos)));
            out
        };

        if existing.is_empty() {
            let complete = Box::new(move |_: CompletionResult| on_suback(Ok(Vec::new())));
            return self.submit(Box::new(|_, _| SendOutcome::Complete), complete, false);
        }

        let wire_filters: Vec<SubscribeFilter> = existing
            .into_iter()
            .map(|(path, qos)| SubscribeFilter::new(path, qos))
            .collect();

        let outgoing = self.outgoing.clone();
        let send: Box<dyn FnMut(u16, bool) -> SendOutcome + Send> = Box::new(move |pkid, _first_attempt| {
            let packet = WireSubscribe::new(pkid, wire_filters.clone());
            match outgoing.send(Packet::Subscribe(packet)) {
                Ok(()) => SendOutcome::Ongoing,
                Err(_) => SendOutcome::Error,
            }
        });

        let complete = Box::new(move |result: CompletionResult| {
            on_suback(match result {
                CompletionResult::SubAck(codes) => Ok(codes),
                CompletionResult::Success => Ok(Vec::new()),
                CompletionResult::Failed(code) => Err(code),
            });
        });

        self.submit(send, complete, true)
    }

    /// Re-attempts every currently pending request's send closure.
    /// Invoked right after a (re)connect completes to push out anything
    /// that accumulated while offline, or survived a lost connection via
    /// `move_ongoing_to_pending` (§4.2, §4.6). Everything reaching
    /// `Location::Pending` got there already having gone ONGOING once, so
    /// it is retryable by construction.
    pub fn retry_pending(&self) {
        let pending_ids = {
            let synced = self.synced.lock().unwrap();
            synced.requests.pending_ids()
        };

        for packet_id in pending_ids {
            let arm = {
                let mut synced = self.synced.lock().unwrap();
                Self::attempt_send(&mut synced, packet_id, false, true)
            };
            if arm {
                if let Some(timeout) = self.operation_timeout {
                    self.arm_operation_timer(packet_id, timeout);
                }
            }
        }
    }

    /// PINGREQ (§4.5): no Request entry persists; the caller (keep-alive
    /// loop in `eventloop.rs`) tracks `waiting_on_ping_response` itself
    /// and arms the PINGRESP timer directly via `TimerSet`.
    pub fn ping(&self) -> bool {
        self.outgoing.send(Packet::PingReq).is_ok()
    }
}
