use std::time::{SystemTime, UNIX_EPOCH};

use mc_rs_proto::packets::{StatusPing, StatusPong, StatusResponse};

use super::*;

impl Connection {
    pub(super) fn handle_status_request(&mut self) -> Result<(), ConnectionError> {
        if self.status != StatusStep::AwaitingRequest {
            return Err(self.out_of_sequence("StatusRequest"));
        }
        let response = StatusResponse::from_info(&self.ctx.status_info())?;
        self.send(response)?;
        self.status = StatusStep::AwaitingPing;
        Ok(())
    }

    /// Answer with the server clock and end the probe.
    pub(super) fn handle_status_ping(&mut self, ping: StatusPing) -> Result<(), ConnectionError> {
        debug!("{}: status ping {}", self.addr, ping.payload);
        self.send(StatusPong {
            payload: unix_millis(),
        })?;
        self.actions.push(Action::Close);
        Ok(())
    }
}

fn unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}
