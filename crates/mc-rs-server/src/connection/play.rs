use mc_rs_proto::packets::{ChatMessage, KeepAliveResponse, PlayerPosition};

use super::*;

/// Coordinates beyond the world border are rejected outright.
const MAX_COORDINATE: f64 = 3.0e7;

impl Connection {
    pub(super) fn handle_keep_alive_response(
        &mut self,
        response: KeepAliveResponse,
    ) -> Result<(), ConnectionError> {
        match self.keep_alive.pending {
            Some((id, sent)) if id == response.keep_alive_id => {
                self.keep_alive.pending = None;
                debug!("{}: keep-alive answered in {:?}", self.addr, sent.elapsed());
                Ok(())
            }
            pending => Err(ConnectionError::KeepAliveMismatch {
                expected: pending.map(|(id, _)| id),
                received: response.keep_alive_id,
            }),
        }
    }

    pub(super) fn handle_chat(&mut self, chat: ChatMessage) -> Result<(), ConnectionError> {
        let player = self.player.ok_or(ConnectionError::Closed)?;
        if !is_allowed_chat(&chat.message) {
            self.disconnect("Illegal characters in chat");
            return Ok(());
        }
        let message = chat.message.trim();
        if message.is_empty() {
            return Ok(());
        }
        self.actions.push(Action::Dispatch(
            player,
            PlayMessage::Chat {
                message: message.to_string(),
            },
        ));
        Ok(())
    }

    pub(super) fn handle_position(&mut self, pos: PlayerPosition) -> Result<(), ConnectionError> {
        let player = self.player.ok_or(ConnectionError::Closed)?;
        let valid = [pos.x, pos.y, pos.z]
            .iter()
            .all(|c| c.is_finite() && c.abs() < MAX_COORDINATE);
        if !valid {
            self.disconnect("Invalid move packet received");
            return Ok(());
        }
        self.actions.push(Action::Dispatch(
            player,
            PlayMessage::Move {
                x: pos.x,
                y: pos.y,
                z: pos.z,
                on_ground: pos.on_ground,
            },
        ));
        Ok(())
    }
}

/// Formatting codes and control characters are not allowed from clients.
fn is_allowed_chat(message: &str) -> bool {
    message
        .chars()
        .all(|c| c != '\u{a7}' && c >= ' ' && c != '\u{7f}')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_characters() {
        assert!(is_allowed_chat("hello world"));
        assert!(is_allowed_chat("caf\u{e9} \u{263a}"));
        assert!(!is_allowed_chat("\u{a7}cred"));
        assert!(!is_allowed_chat("tab\there"));
        assert!(!is_allowed_chat("del\u{7f}"));
    }
}
