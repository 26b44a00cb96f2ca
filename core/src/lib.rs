//! Connection lifecycle, request tracking and topic routing for an MQTT
//! 3.1.1 client. Transport construction (TCP/TLS/proxy/WebSocket dialing)
//! is left to the caller via [`eventloop::Connector`]; this crate owns
//! everything from the CONNECT handshake onward.

mod callbacks;
mod config;
mod connection;
mod error;
mod eventloop;
mod network;
mod operation;
mod options;
mod reconnect;
mod request;
mod state;
mod timer;
mod topic;

pub use config::{load_from_file, load_from_str, ConfigError};
pub use connection::Connection;
pub use error::{ConnectionError, ErrorCode};
pub use eventloop::{BoxedNetwork, Connector};
pub use network::Network;
pub use options::{LastWill, Login, MqttOptions, ProxyOptions, ReconnectOptions, SocketOptions, TlsOptions, WebSocketOptions};
pub use state::ConnectionState;
pub use topic::{OnCleanup, OnPublish};

pub use mqttbytes::{QoS, SubscribeReturnCodes};
