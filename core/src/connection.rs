//! Public façade (§3 `Connection`, §4.7): every method here is a thin,
//! state-gated wrapper over `Synced`/`OperationEngine`. Constructing a
//! `Connection` spawns the `EventLoop` task that owns the transport;
//! dropping the last clone tears it down.

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use mqttbytes::{QoS, SubscribeReturnCodes};
use tokio::sync::mpsc;

use crate::callbacks::Callbacks;
use crate::error::{ConnectionError, ErrorCode};
use crate::eventloop::{Connector, EventLoop};
use crate::operation::{OperationEngine, SharedTopicTree};
use crate::options::MqttOptions;
use crate::reconnect::ReconnectState;
use crate::state::{ConnectionState, Synced};
use crate::timer::TimerSet;
use crate::topic::{OnCleanup, OnPublish, TopicTree};

/// Cloning a `Connection` shares the same underlying connection; dropping
/// the last clone closes `disconnect_tx`, which the `EventLoop` reads as
/// "no handle can ever call `connect()` again" (§8 scenario 6).
#[derive(Clone)]
pub struct Connection {
    synced: Arc<Mutex<Synced>>,
    operations: Arc<OperationEngine>,
    callbacks: Arc<Mutex<Callbacks>>,
    disconnect_tx: mpsc::UnboundedSender<()>,
}

impl Connection {
    /// Builds the connection and spawns its `EventLoop` on the current
    /// tokio runtime. The event loop idles until [`Connection::connect`]
    /// moves the state out of `Disconnected`.
    pub fn new(options: MqttOptions, connector: impl Connector) -> Result<Connection, ConnectionError> {
        options.validate()?;

        let synced = Arc::new(Mutex::new(Synced::new(options.clean_session(), ReconnectState::new(options.reconnect))));
        let topics: SharedTopicTree = Arc::new(Mutex::new(TopicTree::new()));
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let (disconnect_tx, disconnect_rx) = mpsc::unbounded_channel();
        let timers = Arc::new(TimerSet::new());
        let callbacks = Arc::new(Mutex::new(Callbacks::default()));

        let operations = Arc::new(OperationEngine::new(
            synced.clone(),
            topics,
            outgoing_tx,
            timers.clone(),
            options.operation_timeout,
        ));

        let event_loop = EventLoop::new(
            options,
            Box::new(connector),
            synced.clone(),
            operations.clone(),
            timers,
            callbacks.clone(),
            outgoing_rx,
            disconnect_rx,
        );
        tokio::spawn(event_loop.run());

        Ok(Connection { synced, operations, callbacks, disconnect_tx })
    }

    /// DISCONNECTED -> CONNECTING (§4.4). Errors if already connected or
    /// mid-connect.
    pub fn connect(&self) -> Result<(), ErrorCode> {
        self.synced.lock().unwrap().begin_connect()
    }

    /// Any non-terminal state -> DISCONNECTING/DISCONNECTED (§4.4). A
    /// second call while already disconnected is a no-op. The event loop
    /// fires `on_disconnect` once the transport actually closes.
    pub fn disconnect(&self) -> Result<(), ErrorCode> {
        let mut synced = self.synced.lock().unwrap();
        if synced.state == ConnectionState::Disconnected {
            return Ok(());
        }
        synced.begin_disconnect();
        drop(synced);
        let _ = self.disconnect_tx.send(());
        Ok(())
    }

    pub fn state(&self) -> ConnectionState {
        self.synced.lock().unwrap().state
    }

    /// Gated by §4.4: only legal while `Disconnected` or `Connected`.
    fn configure(&self, set: impl FnOnce(&mut Callbacks)) -> Result<(), ErrorCode> {
        self.synced.lock().unwrap().configurable()?;
        set(&mut self.callbacks.lock().unwrap());
        Ok(())
    }

    /// Fires once per connect attempt's outcome, success or failure; not
    /// called again on session resumption (see `on_resumed`).
    pub fn configure_on_connection_complete(
        &self,
        callback: impl FnMut(Result<(), ErrorCode>) + Send + 'static,
    ) -> Result<(), ErrorCode> {
        self.configure(|callbacks| callbacks.on_connection_complete = Some(Box::new(callback)))
    }

    /// Fires instead of `on_connection_complete` when a reconnect resumes
    /// a prior session (§4.4, §9 open question b).
    pub fn configure_on_resumed(&self, callback: impl FnMut() + Send + 'static) -> Result<(), ErrorCode> {
        self.configure(|callbacks| callbacks.on_resumed = Some(Box::new(callback)))
    }

    /// Fires when a connected session is lost unexpectedly, before the
    /// reconnect loop schedules the next attempt.
    pub fn configure_on_interrupted(&self, callback: impl FnMut() + Send + 'static) -> Result<(), ErrorCode> {
        self.configure(|callbacks| callbacks.on_interrupted = Some(Box::new(callback)))
    }

    /// Fires once the transport has actually shut down after a user- or
    /// drop-initiated disconnect.
    pub fn configure_on_disconnect(&self, callback: impl FnMut() + Send + 'static) -> Result<(), ErrorCode> {
        self.configure(|callbacks| callbacks.on_disconnect = Some(Box::new(callback)))
    }

    fn require_active(&self) -> Result<(), ErrorCode> {
        if self.synced.lock().unwrap().state == ConnectionState::Disconnected {
            return Err(ErrorCode::NotConnected);
        }
        Ok(())
    }

    /// PUBLISH (§4.5). Returns the allocated packet id (0 for QoS 0, which
    /// never goes on the wire).
    pub fn publish(
        &self,
        topic: impl Into<String>,
        qos: QoS,
        retain: bool,
        payload: impl Into<Bytes>,
        on_complete: impl FnOnce(Result<(), ErrorCode>) + Send + 'static,
    ) -> Result<u16, ErrorCode> {
        self.require_active()?;
        let topic = topic.into();
        if !mqttbytes::valid_filter(&topic) || topic.contains(|c: char| c == '+' || c == '#') {
            return Err(ErrorCode::InvalidTopic);
        }
        Ok(self.operations.publish(topic, qos, retain, payload.into(), on_complete))
    }

    /// SUBSCRIBE over a single filter (§4.5).
    pub fn subscribe(
        &self,
        filter: impl Into<String>,
        qos: QoS,
        on_publish: OnPublish,
        on_cleanup: Option<OnCleanup>,
        on_suback: impl FnOnce(Result<Vec<SubscribeReturnCodes>, ErrorCode>) + Send + 'static,
    ) -> Result<u16, ErrorCode> {
        self.subscribe_multiple(vec![(filter.into(), qos, on_publish, on_cleanup)], on_suback)
    }

    /// SUBSCRIBE over several filters in one packet (§4.5).
    pub fn subscribe_multiple(
        &self,
        filters: Vec<(String, QoS, OnPublish, Option<OnCleanup>)>,
        on_suback: impl FnOnce(Result<Vec<SubscribeReturnCodes>, ErrorCode>) + Send + 'static,
    ) -> Result<u16, ErrorCode> {
        self.require_active()?;
        for (filter, _, _, _) in &filters {
            if !mqttbytes::valid_filter(filter) {
                return Err(ErrorCode::InvalidTopic);
            }
        }
        Ok(self.operations.subscribe(filters, on_suback))
    }

    /// A subscription that never reaches the broker: useful for routing
    /// locally-published (e.g. bridged or looped-back) messages (§4.5).
    pub fn subscribe_local(
        &self,
        filter: impl Into<String>,
        qos: QoS,
        on_publish: OnPublish,
        on_cleanup: Option<OnCleanup>,
        on_suback: impl FnOnce(Result<Vec<SubscribeReturnCodes>, ErrorCode>) + Send + 'static,
    ) -> Result<u16, ErrorCode> {
        let filter = filter.into();
        if !mqttbytes::valid_filter(&filter) {
            return Err(ErrorCode::InvalidTopic);
        }
        Ok(self.operations.subscribe_local(filter, qos, on_publish, on_cleanup, on_suback))
    }

    /// UNSUBSCRIBE (§4.5).
    pub fn unsubscribe(
        &self,
        filter: impl Into<String>,
        on_unsuback: impl FnOnce(Result<(), ErrorCode>) + Send + 'static,
    ) -> Result<u16, ErrorCode> {
        self.require_active()?;
        Ok(self.operations.unsubscribe(filter.into(), on_unsuback))
    }

    /// Re-asserts every currently tracked filter in a single SUBSCRIBE
    /// (§4.6 scenario 5/6). Normally driven automatically by the event
    /// loop on session resumption; exposed for callers that want to force
    /// it (e.g. after a broker-side ACL change).
    pub fn resubscribe_existing_topics(
        &self,
        on_suback: impl FnOnce(Result<Vec<SubscribeReturnCodes>, ErrorCode>) + Send + 'static,
    ) -> Result<u16, ErrorCode> {
        self.require_active()?;
        Ok(self.operations.resubscribe_existing(on_suback))
    }
}
