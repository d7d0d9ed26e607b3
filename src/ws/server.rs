use actix::{Actor, Addr, Context, Handler, Message};
use chrono::Utc;
use std::collections::HashSet;

use super::session::WsSession;

/// Every open websocket connection, regardless of endpoint. Broadcasts go to all.
pub struct ScanHub {
    sessions: HashSet<Addr<WsSession>>,
}

impl ScanHub {
    pub fn new() -> Self {
        Self { sessions: HashSet::new() }
    }
}

impl Default for ScanHub {
    fn default() -> Self {
        Self::new()
    }
}

impl Actor for ScanHub {
    type Context = Context<Self>;
}

#[derive(Message)]
#[rtype(result="()")]
pub struct Connect { pub addr: Addr<WsSession> }

#[derive(Message)]
#[rtype(result="()")]
pub struct Disconnect { pub addr: Addr<WsSession> }

#[derive(Message)]
#[rtype(result="()")]
pub struct Broadcast { pub payload: String }

#[derive(Message)]
#[rtype(result="usize")]
pub struct ConnectionCount;

impl Handler<Connect> for ScanHub {
    type Result = ();
    fn handle(&mut self, msg: Connect, _: &mut Context<Self>) {
        self.sessions.insert(msg.addr);
        log::debug!("websocket connected, {} open", self.sessions.len());
    }
}

impl Handler<Disconnect> for ScanHub {
    type Result = ();
    fn handle(&mut self, msg: Disconnect, _: &mut Context<Self>) {
        self.sessions.remove(&msg.addr);
        log::info!("client disconnected, {} open", self.sessions.len());
    }
}

impl Handler<Broadcast> for ScanHub {
    type Result = ();
    fn handle(&mut self, msg: Broadcast, _: &mut Context<Self>) {
        self.sessions.retain(|s| s.connected());
        for s in &self.sessions {
            s.do_send(super::session::ServerMsg { payload: msg.payload.clone() });
        }
    }
}

impl Handler<ConnectionCount> for ScanHub {
    type Result = usize;
    fn handle(&mut self, _: ConnectionCount, _: &mut Context<Self>) -> usize {
        self.sessions.len()
    }
}

pub fn spread_update(spread_data: &serde_json::Value) -> String {
    serde_json::json!({
        "type": "spread_update",
        "action": "captured",
        "spread_data": spread_data,
        "timestamp": Utc::now(),
    }).to_string()
}

pub fn session_update(session_data: &serde_json::Value) -> String {
    serde_json::json!({
        "type": "session_update",
        "action": "started",
        "session_data": session_data,
        "timestamp": Utc::now(),
    }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[actix_web::test]
    async fn hub_starts_empty() {
        let hub = ScanHub::new().start();
        assert_eq!(hub.send(ConnectionCount).await.unwrap(), 0);
        hub.do_send(Broadcast { payload: "{}".into() });
        assert_eq!(hub.send(ConnectionCount).await.unwrap(), 0);
    }

    #[test]
    fn update_payloads_carry_type_and_data() {
        let v: serde_json::Value =
            serde_json::from_str(&spread_update(&serde_json::json!({"spread_index": 3}))).unwrap();
        assert_eq!(v["type"], "spread_update");
        assert_eq!(v["action"], "captured");
        assert_eq!(v["spread_data"]["spread_index"], 3);

        let v: serde_json::Value =
            serde_json::from_str(&session_update(&serde_json::json!({"session_id": "x"}))).unwrap();
        assert_eq!(v["type"], "session_update");
        assert_eq!(v["action"], "started");
    }
}
