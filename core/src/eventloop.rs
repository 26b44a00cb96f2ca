//! Drives the connection lifecycle and the read/write loop (§4.4, §4.6).
//! Mirrors the split-stream `select!` shape of the original eventloop, with
//! the protocol driving logic pulled out into `state.rs`/`operation.rs` so
//! this module is just wiring.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::BytesMut;
use mqttbytes::{ConnAck, ConnectReturnCode, Packet};
use tokio::io::{split, AsyncWriteExt, WriteHalf};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::callbacks::Callbacks;
use crate::error::{ConnectionError, ErrorCode};
use crate::network::{self, Network};
use crate::operation::OperationEngine;
use crate::options::MqttOptions;
use crate::reconnect::STABLE_CONNECTION_WINDOW;
use crate::request::CompletionResult;
use crate::state::{ConnectionState, Synced};
use crate::timer::TimerSet;

/// How long CONNECT/CONNACK gets before the attempt is abandoned (§4.3).
/// Distinct from the user-configurable per-operation timeout.
const CONNACK_TIMEOUT: Duration = Duration::from_secs(5);

pub type BoxedNetwork = Box<dyn Network>;
type ConnectFuture = Pin<Box<dyn Future<Output = std::io::Result<BoxedNetwork>> + Send>>;

/// Supplies a freshly connected transport on each (re)connect attempt. TCP
/// dial, TLS handshake, HTTP-proxy CONNECT and WebSocket upgrade all happen
/// inside the implementation (§1 scope) — the core only needs the
/// resulting framed byte stream.
pub trait Connector: Send + 'static {
    fn connect(&self) -> ConnectFuture;
}

impl<F, Fut> Connector for F
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = std::io::Result<BoxedNetwork>> + Send + 'static,
{
    fn connect(&self) -> ConnectFuture {
        Box::pin(self())
    }
}

/// Owns the transport-facing half of a connection: the (re)connect loop,
/// the CONNECT/CONNACK handshake, keep-alive PINGREQ scheduling and
/// inbound-packet dispatch. Lives on its own task; `Connection` (in
/// `connection.rs`) talks to it only through `synced` and `operations`.
pub struct EventLoop {
    options: MqttOptions,
    connector: Box<dyn Connector>,
    synced: Arc<Mutex<Synced>>,
    operations: Arc<OperationEngine>,
    timers: Arc<TimerSet>,
    callbacks: Arc<Mutex<Callbacks>>,
    outgoing_rx: mpsc::UnboundedReceiver<Packet>,
    /// Closes (returning `None` forever) once every [`crate::Connection`]
    /// handle has dropped; a message sent through it is an explicit
    /// `Connection::disconnect()` (§4.4 user-disconnect transitions).
    disconnect_rx: mpsc::UnboundedReceiver<()>,
}

/// What ended one connected session (§4.4). Distinguishes a user- or
/// drop-initiated disconnect, which must not trigger a reconnect, from
/// every other way the transport can go away.
enum DriveExit {
    TransportError(ConnectionError),
    Disconnect,
}

impl EventLoop {
    pub fn new(
        options: MqttOptions,
        connector: Box<dyn Connector>,
        synced: Arc<Mutex<Synced>>,
        operations: Arc<OperationEngine>,
        timers: Arc<TimerSet>,
        callbacks: Arc<Mutex<Callbacks>>,
        outgoing_rx: mpsc::UnboundedReceiver<Packet>,
        disconnect_rx: mpsc::UnboundedReceiver<()>,
    ) -> EventLoop {
        EventLoop { options, connector, synced, operations, timers, callbacks, outgoing_rx, disconnect_rx }
    }

    /// Runs until the connection is torn down for good: the first connect
    /// fails, or a user disconnect settles while not reconnecting. Every
    /// transport-level error past the first connect is absorbed into the
    /// reconnect loop (§4.4) rather than returned.
    pub async fn run(mut self) {
        if self.attempt_connect(false).await.is_err() {
            return;
        }

        loop {
            let state = self.synced.lock().unwrap().state;
            match state {
                ConnectionState::Reconnecting => {
                    let backoff = self.synced.lock().unwrap().reconnect.current_backoff();
                    debug!(?backoff, "reconnecting after backoff");
                    tokio::time::sleep(backoff).await;

                    {
                        let mut synced = self.synced.lock().unwrap();
                        if synced.begin_reconnect().is_err() {
                            continue;
                        }
                    }

                    let _ = self.attempt_connect(true).await;
                }
                ConnectionState::Disconnected | ConnectionState::Disconnecting => break,
                ConnectionState::Connecting | ConnectionState::Connected => {
                    // drive() owns these states to completion; seeing them
                    // here means something else already raced us into the
                    // next attempt, so just loop around.
                }
            }
        }
    }

    async fn attempt_connect(&mut self, is_reconnect: bool) -> Result<(), ConnectionError> {
        let mut network = match self.connector.connect().await {
            Ok(network) => network,
            Err(e) => {
                self.fail_connect(is_reconnect);
                self.callbacks.lock().unwrap().fire_connection_complete(Err(ErrorCode::NotConnected));
                return Err(e.into());
            }
        };

        if let Err(e) = self.handshake(&mut network).await {
            warn!(error = %e, "connect handshake failed");
            self.fail_connect(is_reconnect);
            self.callbacks.lock().unwrap().fire_connection_complete(Err(ErrorCode::NotConnected));
            return Err(e);
        }

        let resumed = self.synced.lock().unwrap().connack_accepted();
        {
            let mut callbacks = self.callbacks.lock().unwrap();
            if resumed {
                callbacks.fire_resumed();
            } else {
                callbacks.fire_connection_complete(Ok(()));
            }
        }
        if resumed {
            info!("session resumed, resubscribing existing filters");
            self.operations.resubscribe_existing(|_| {});
        }
        self.operations.retry_pending();
        self.arm_stability_timer();

        match self.drive(network).await {
            DriveExit::Disconnect => {
                // The channel is only ever fully closed once every
                // `Connection` handle has dropped (§8 scenario 6); an
                // explicit `disconnect()` call leaves it open.
                let finalize =
                    matches!(self.disconnect_rx.try_recv(), Err(mpsc::error::TryRecvError::Disconnected));
                let mut synced = self.synced.lock().unwrap();
                synced.disconnected();
                if finalize {
                    synced.destroy();
                }
                drop(synced);
                self.callbacks.lock().unwrap().fire_disconnect();
            }
            DriveExit::TransportError(e) => {
                debug!(error = %e, "connection ended");
                self.synced.lock().unwrap().connection_lost();
                self.callbacks.lock().unwrap().fire_interrupted();
            }
        }
        Ok(())
    }

    fn fail_connect(&self, is_reconnect: bool) {
        let mut synced = self.synced.lock().unwrap();
        if is_reconnect {
            synced.reconnect_failed();
        } else {
            synced.connect_failed();
        }
    }

    /// Arms the 10s stability window (§4.6): if the connection is still up
    /// when it fires, backoff resets to `min_sec`.
    fn arm_stability_timer(&self) {
        let synced = self.synced.clone();
        self.timers.arm(STABLE_CONNECTION_WINDOW, move || {
            let mut synced = synced.lock().unwrap();
            if synced.state == ConnectionState::Connected {
                synced.reconnect.reset_to_min();
            }
        });
    }

    async fn handshake(&mut self, network: &mut BoxedNetwork) -> Result<(), ConnectionError> {
        self.options.validate()?;

        let connect = self.build_connect();
        tokio::time::timeout(CONNACK_TIMEOUT, network::write_frame(network, &Packet::Connect(connect))).await??;

        let mut buf = BytesMut::new();
        let packet = tokio::time::timeout(
            CONNACK_TIMEOUT,
            network::read_frame(network, &mut buf, self.options.max_packet_size),
        )
        .await??;

        match packet {
            Packet::ConnAck(ConnAck { code: ConnectReturnCode::Accepted, .. }) => Ok(()),
            Packet::ConnAck(connack) => {
                warn!(code = ?connack.code, "broker refused connection");
                Err(ErrorCode::NotConnected.into())
            }
            other => {
                warn!(?other, "expected CONNACK, got something else");
                Err(ErrorCode::NotConnected.into())
            }
        }
    }

    fn build_connect(&self) -> mqttbytes::Connect {
        let mut connect = mqttbytes::Connect::new(self.options.client_id());
        connect.keep_alive = self.options.keep_alive().as_secs() as u16;
        connect.clean_session = self.options.clean_session();
        connect.login = self.options.credentials.as_ref().map(|login| mqttbytes::Login {
            username: login.username.clone(),
            password: login.password.clone(),
        });
        connect.last_will = self.options.last_will.as_ref().map(|will| mqttbytes::LastWill {
            topic: will.topic.clone(),
            message: bytes::Bytes::from(will.message.clone()),
            qos: will.qos,
            retain: will.retain,
        });
        connect
    }

    /// The steady-state read/write loop for one connected session. Returns
    /// when the transport closes, a protocol timeout fires, or a
    /// disconnect is requested; the caller decides what that means for
    /// reconnection.
    async fn drive(&mut self, network: BoxedNetwork) -> DriveExit {
        let (mut read_half, mut write_half) = split(network);
        let mut read_buf = BytesMut::new();
        let max_packet_size = self.options.max_packet_size;

        let (ping_timeout_tx, mut ping_timeout_rx) = mpsc::unbounded_channel::<()>();
        let mut ping_timer: Option<crate::timer::TimerHandle> = None;

        // keep_alive == 0 disables the ping schedule (§4.6); parked at a
        // long interval instead of making the branch conditional, since
        // tokio::select! branches can't be skipped per-iteration otherwise.
        let keep_alive = if self.options.keep_alive().is_zero() {
            Duration::from_secs(60 * 60 * 24)
        } else {
            self.options.keep_alive()
        };
        let mut keep_alive_ticker = tokio::time::interval(keep_alive);
        keep_alive_ticker.tick().await; // first tick fires immediately

        loop {
            tokio::select! {
                frame = network::read_frame(&mut read_half, &mut read_buf, max_packet_size) => {
                    match frame {
                        Ok(packet) => self.handle_incoming(packet, &mut ping_timer),
                        Err(e) => return DriveExit::TransportError(e),
                    }
                }
                outgoing = self.outgoing_rx.recv() => {
                    match outgoing {
                        Some(packet) => {
                            if let Err(e) = network::write_frame(&mut write_half, &packet).await {
                                return DriveExit::TransportError(e);
                            }
                        }
                        None => return Self::shut_down(&mut write_half).await,
                    }
                }
                _ = keep_alive_ticker.tick() => {
                    self.operations.ping();
                    let tx = ping_timeout_tx.clone();
                    let timeout = self.options.ping_timeout;
                    ping_timer = Some(self.timers.arm(timeout, move || {
                        let _ = tx.send(());
                    }));
                }
                Some(()) = ping_timeout_rx.recv() => {
                    return DriveExit::TransportError(ErrorCode::Timeout.into());
                }
                _ = self.disconnect_rx.recv() => {
                    return Self::shut_down(&mut write_half).await;
                }
            }
        }
    }

    /// Sends a DISCONNECT frame and half-closes the transport (§4.4
    /// user/drop-initiated disconnect). Best-effort: a write failure here
    /// still means the transport is gone, which is exactly what the
    /// caller wants to hear.
    async fn shut_down(write_half: &mut WriteHalf<BoxedNetwork>) -> DriveExit {
        let _ = network::write_frame(write_half, &Packet::Disconnect).await;
        let _ = write_half.shutdown().await;
        DriveExit::Disconnect
    }

    fn handle_incoming(&self, packet: Packet, ping_timer: &mut Option<crate::timer::TimerHandle>) {
        match packet {
            Packet::Publish(publish) => {
                self.operations
                    .topics()
                    .lock()
                    .unwrap()
                    .publish(&publish.topic, &publish.payload, publish.dup, publish.qos, publish.retain);
            }
            Packet::PubAck(ack) => {
                self.synced.lock().unwrap().requests.complete(ack.pkid, CompletionResult::Success);
            }
            Packet::SubAck(ack) => {
                self.synced
                    .lock()
                    .unwrap()
                    .requests
                    .complete(ack.pkid, CompletionResult::SubAck(ack.return_codes));
            }
            Packet::UnsubAck(ack) => {
                self.synced.lock().unwrap().requests.complete(ack.pkid, CompletionResult::Success);
            }
            Packet::PingResp => {
                if let Some(handle) = ping_timer.take() {
                    handle.cancel();
                }
            }
            other => warn!(?other, "unexpected inbound packet"),
        }
    }
}
