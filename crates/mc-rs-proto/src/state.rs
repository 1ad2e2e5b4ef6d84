//! Connection states and packet directions.

use std::fmt;

/// Protocol state of a connection. A packet id only has meaning relative
/// to a state and a direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Handshake,
    Status,
    Login,
    Play,
}

impl ConnectionState {
    /// Map the handshake's `next_state` field (1 = Status, 2 = Login).
    pub fn from_next_state(value: i32) -> Option<Self> {
        match value {
            1 => Some(Self::Status),
            2 => Some(Self::Login),
            _ => None,
        }
    }

    /// Whether the machine may move from `self` to `next`.
    ///
    /// Transitions are one-way; Status and Play have no successors.
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Handshake, Self::Status)
                | (Self::Handshake, Self::Login)
                | (Self::Login, Self::Play)
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Handshake => "handshake",
            Self::Status => "status",
            Self::Login => "login",
            Self::Play => "play",
        };
        f.write_str(name)
    }
}

/// Packet direction relative to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Client → Server.
    Inbound,
    /// Server → Client.
    Outbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inbound => f.write_str("inbound"),
            Self::Outbound => f.write_str("outbound"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_state_mapping() {
        assert_eq!(ConnectionState::from_next_state(1), Some(ConnectionState::Status));
        assert_eq!(ConnectionState::from_next_state(2), Some(ConnectionState::Login));
        assert_eq!(ConnectionState::from_next_state(0), None);
        assert_eq!(ConnectionState::from_next_state(3), None);
        assert_eq!(ConnectionState::from_next_state(-1), None);
    }

    #[test]
    fn transitions_are_one_way() {
        use ConnectionState::*;
        assert!(Handshake.can_transition_to(Status));
        assert!(Handshake.can_transition_to(Login));
        assert!(Login.can_transition_to(Play));
        assert!(!Status.can_transition_to(Login));
        assert!(!Status.can_transition_to(Play));
        assert!(!Play.can_transition_to(Login));
        assert!(!Login.can_transition_to(Handshake));
        assert!(!Handshake.can_transition_to(Play));
    }
}
