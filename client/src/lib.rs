//! Synchronous-feeling handle over [`rumqttc_core::Connection`], mirroring
//! the teacher's `rumq_client::Client` + `Connection::start_in_thread`
//! pair: a cloneable client callers can pass across threads without
//! touching `async` themselves.

use std::thread::JoinHandle;

use mqttbytes::QoS;
use rumqttc_core::{Connection, ConnectionError, ConnectionState, Connector, ErrorCode, MqttOptions, OnCleanup, OnPublish, SubscribeReturnCodes};

/// Cloneable handle; every method is non-blocking (it hands off to the
/// background event loop started by [`start_in_thread`] or
/// [`Client::with_connection`]).
#[derive(Clone)]
pub struct Client {
    connection: Connection,
}

impl Client {
    pub fn with_connection(connection: Connection) -> Client {
        Client { connection }
    }

    pub fn connect(&self) -> Result<(), ErrorCode> {
        self.connection.connect()
    }

    pub fn disconnect(&self) -> Result<(), ErrorCode> {
        self.connection.disconnect()
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn publish(
        &self,
        topic: impl Into<String>,
        qos: QoS,
        retain: bool,
        payload: impl Into<bytes::Bytes>,
        on_complete: impl FnOnce(Result<(), ErrorCode>) + Send + 'static,
    ) -> Result<u16, ErrorCode> {
        self.connection.publish(topic, qos, retain, payload, on_complete)
    }

    pub fn subscribe(
        &self,
        filter: impl Into<String>,
        qos: QoS,
        on_publish: OnPublish,
        on_cleanup: Option<OnCleanup>,
        on_suback: impl FnOnce(Result<Vec<SubscribeReturnCodes>, ErrorCode>) + Send + 'static,
    ) -> Result<u16, ErrorCode> {
        self.connection.subscribe(filter, qos, on_publish, on_cleanup, on_suback)
    }

    pub fn subscribe_many(
        &self,
        filters: Vec<(String, QoS, OnPublish, Option<OnCleanup>)>,
        on_suback: impl FnOnce(Result<Vec<SubscribeReturnCodes>, ErrorCode>) + Send + 'static,
    ) -> Result<u16, ErrorCode> {
        self.connection.subscribe_multiple(filters, on_suback)
    }

    pub fn unsubscribe(
        &self,
        filter: impl Into<String>,
        on_unsuback: impl FnOnce(Result<(), ErrorCode>) + Send + 'static,
    ) -> Result<u16, ErrorCode> {
        self.connection.unsubscribe(filter, on_unsuback)
    }
}

/// Starts a dedicated tokio runtime on a background thread, builds the
/// `Connection` on it, and hands back a `Client` plus the thread's
/// `JoinHandle` — mirroring `rumq_client::Connection::start_in_thread`.
/// The runtime lives for as long as the thread does; dropping every
/// `Client` clone (and any other `Connection` handle) lets the background
/// task exit, at which point the thread's future resolves and the handle
/// can be joined.
pub fn start_in_thread(
    options: MqttOptions,
    connector: impl Connector,
) -> Result<(Client, JoinHandle<()>), ConnectionError> {
    let (tx, rx) = std::sync::mpsc::sync_channel(1);

    let join = std::thread::spawn(move || {
        let runtime = match tokio::runtime::Runtime::new() {
            Ok(runtime) => runtime,
            Err(e) => {
                let _ = tx.send(Err(ConnectionError::Io(e)));
                return;
            }
        };

        runtime.block_on(async move {
            match Connection::new(options, connector) {
                Ok(connection) => {
                    let _ = tx.send(Ok(connection));
                    // Keeps the runtime alive for the event loop task;
                    // exits once every `Connection`/`Client` handle drops
                    // and the event loop's own task has nothing left to do.
                    std::future::pending::<()>().await;
                }
                Err(e) => {
                    let _ = tx.send(Err(e));
                }
            }
        });
    });

    let connection = rx.recv().map_err(|_| std::io::Error::from(std::io::ErrorKind::BrokenPipe))??;
    Ok((Client::with_connection(connection), join))
}
