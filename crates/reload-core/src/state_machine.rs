use crate::{error::ReloadError, types::ConnectionState};

#[derive(Debug, Clone)]
pub struct ConnectionStateMachine {
    state: ConnectionState,
}

impl Default for ConnectionStateMachine {
    fn default() -> Self {
        Self {
            state: ConnectionState::Disconnected,
        }
    }
}

impl ConnectionStateMachine {
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn begin_connect(&mut self) -> Result<ConnectionState, ReloadError> {
        self.transition_from_state(
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            "run",
        )
    }

    pub fn on_connected(&mut self) -> Result<ConnectionState, ReloadError> {
        self.transition_from_state(
            ConnectionState::Connecting,
            ConnectionState::Connected,
            "on_connected",
        )
    }

    pub fn on_connect_failed(&mut self) -> Result<ConnectionState, ReloadError> {
        self.transition_from_state(
            ConnectionState::Connecting,
            ConnectionState::Disconnected,
            "on_connect_failed",
        )
    }

    /// Single-use close gate.
    ///
    /// Returns `true` only for the call that moves an active connection to
    /// `Closed`; every other call is a no-op returning `false`.
    pub fn close(&mut self) -> bool {
        match self.state {
            ConnectionState::Connecting | ConnectionState::Connected => {
                self.state = ConnectionState::Closed;
                true
            }
            ConnectionState::Disconnected | ConnectionState::Closed => false,
        }
    }

    fn transition_from_state(
        &mut self,
        expected: ConnectionState,
        next: ConnectionState,
        action: &str,
    ) -> Result<ConnectionState, ReloadError> {
        if self.state != expected {
            return Err(ReloadError::invalid_state(self.state, action));
        }
        self.state = next;
        Ok(next)
    }
}
