//! Connection lifecycle state machine (§4.4).

use crate::error::ErrorCode;
use crate::reconnect::ReconnectState;
use crate::request::RequestTable;

/// §3: one of five states, initial `Disconnected`, terminal `Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Disconnecting,
}

/// Everything guarded by the connection's single mutex (§5): `state`, the
/// request table (pending/ongoing/outstanding/pool all live inside it),
/// and reconnect bookkeeping. Callbacks are *invoked* outside the lock —
/// callers of the FSM methods below take ownership of any callback that
/// needs firing and run it after unlocking.
pub struct Synced {
    pub state: ConnectionState,
    pub requests: RequestTable,
    pub reconnect: ReconnectState,
    pub clean_session: bool,
    pub has_connected_before: bool,
    pub suppress_reconnect: bool,
}

impl Synced {
    pub fn new(clean_session: bool, reconnect: ReconnectState) -> Synced {
        Synced {
            state: ConnectionState::Disconnected,
            requests: RequestTable::new(),
            reconnect,
            clean_session,
            has_connected_before: false,
            suppress_reconnect: false,
        }
    }

    /// Gate for configuration setters (§4.4): only legal while
    /// disconnected or fully connected.
    pub fn configurable(&self) -> Result<(), ErrorCode> {
        match self.state {
            ConnectionState::Disconnected | ConnectionState::Connected => Ok(()),
            _ => Err(ErrorCode::InvalidState),
        }
    }

    /// DISCONNECTED --user connect--> CONNECTING.
    pub fn begin_connect(&mut self) -> Result<(), ErrorCode> {
        match self.state {
            ConnectionState::Disconnected => {
                if self.clean_session {
                    self.requests.cancel_all(ErrorCode::CancelledForCleanSession);
                }
                self.state = ConnectionState::Connecting;
                self.suppress_reconnect = false;
                Ok(())
            }
            ConnectionState::Connected | ConnectionState::Connecting => Err(ErrorCode::AlreadyConnected),
            _ => Err(ErrorCode::InvalidState),
        }
    }

    /// CONNECTING --CONNACK ok--> CONNECTED. Returns whether this is a
    /// resumption (prior successful connect) so the caller fires
    /// `on_resumed` instead of `on_connection_complete`.
    pub fn connack_accepted(&mut self) -> bool {
        self.state = ConnectionState::Connected;
        let resumed = self.has_connected_before;
        self.has_connected_before = true;
        self.reconnect.on_connected();
        resumed
    }

    /// CONNECTING --failure/timeout/transport down--> DISCONNECTED.
    pub fn connect_failed(&mut self) {
        self.state = ConnectionState::Disconnected;
    }

    /// CONNECTED --transport shutdown--> RECONNECTING (or DISCONNECTED if
    /// a user disconnect suppressed reconnection). Moves or cancels
    /// in-flight requests per `clean_session`.
    pub fn connection_lost(&mut self) -> ConnectionState {
        if self.clean_session {
            self.requests.cancel_all(ErrorCode::CancelledForCleanSession);
        } else {
            self.requests.move_ongoing_to_pending();
        }

        self.state = if self.suppress_reconnect {
            ConnectionState::Disconnected
        } else {
            ConnectionState::Reconnecting
        };
        self.state
    }

    /// user disconnect, any non-terminal state.
    pub fn begin_disconnect(&mut self) {
        if self.state == ConnectionState::Reconnecting {
            self.suppress_reconnect = true;
            self.state = ConnectionState::Disconnected;
        } else {
            self.state = ConnectionState::Disconnecting;
        }
    }

    /// DISCONNECTING --transport down--> DISCONNECTED.
    pub fn disconnected(&mut self) {
        self.state = ConnectionState::Disconnected;
    }

    /// RECONNECTING --backoff fires--> CONNECTING.
    pub fn begin_reconnect(&mut self) -> Result<(), ()> {
        if self.state != ConnectionState::Reconnecting {
            return Err(());
        }
        self.state = ConnectionState::Connecting;
        Ok(())
    }

    /// RECONNECTING attempt failed: loop back, bumping backoff.
    pub fn reconnect_failed(&mut self) {
        self.state = ConnectionState::Reconnecting;
        self.reconnect.on_failed_attempt();
    }

    /// final teardown: last reference released.
    pub fn destroy(&mut self) {
        self.requests.cancel_all(ErrorCode::ConnectionDestroyed);
        self.state = ConnectionState::Disconnected;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn configuration_setters_are_gated_by_state() {
        let mut synced = Synced::new(true, ReconnectState::default());
        assert!(synced.configurable().is_ok());

        synced.begin_connect().unwrap();
        assert_eq!(synced.configurable(), Err(ErrorCode::InvalidState));

        synced.connack_accepted();
        assert!(synced.configurable().is_ok());
    }

    #[test]
    fn connect_while_already_connecting_is_rejected() {
        let mut synced = Synced::new(true, ReconnectState::default());
        synced.begin_connect().unwrap();
        assert_eq!(synced.begin_connect(), Err(ErrorCode::AlreadyConnected));
    }

    #[test]
    fn first_successful_connect_is_not_a_resumption() {
        let mut synced = Synced::new(false, ReconnectState::default());
        synced.begin_connect().unwrap();
        assert!(!synced.connack_accepted());

        synced.connection_lost();
        synced.begin_reconnect().unwrap();
        assert!(synced.connack_accepted());
    }
}
