use actix::{Actor, ActorContext, Addr, AsyncContext, Handler, Message, StreamHandler};
use actix_web::{HttpRequest, HttpResponse, web, Error};
use actix_web_actors::ws;
use chrono::Utc;
use serde::Deserialize;
use crate::models::camera::Side;
use super::server::{self, Broadcast, Connect, Disconnect, ScanHub};

/// Which websocket endpoint a connection came in on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    CameraStream,
    ScannerUpdates,
}

pub async fn camera_stream_route(req: HttpRequest, stream: web::Payload, hub: web::Data<Addr<ScanHub>>) -> Result<HttpResponse, Error> {
    start(Endpoint::CameraStream, req, stream, hub)
}

pub async fn scanner_updates_route(req: HttpRequest, stream: web::Payload, hub: web::Data<Addr<ScanHub>>) -> Result<HttpResponse, Error> {
    start(Endpoint::ScannerUpdates, req, stream, hub)
}

fn start(endpoint: Endpoint, req: HttpRequest, stream: web::Payload, hub: web::Data<Addr<ScanHub>>) -> Result<HttpResponse, Error> {
    let session = WsSession {
        endpoint,
        hub: hub.get_ref().clone(),
    };
    ws::start(session, &req, stream)
}

pub struct WsSession {
    pub endpoint: Endpoint,
    pub hub: Addr<ScanHub>,
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;
    fn started(&mut self, ctx: &mut Self::Context) {
        self.hub.do_send(Connect { addr: ctx.address() });
    }
    fn stopped(&mut self, ctx: &mut Self::Context) {
        self.hub.do_send(Disconnect { addr: ctx.address() });
    }
}

#[derive(Message)]
#[rtype(result="()")]
pub struct ServerMsg { pub payload: String }

impl Handler<ServerMsg> for WsSession {
    type Result = ();
    fn handle(&mut self, msg: ServerMsg, ctx: &mut Self::Context) {
        ctx.text(msg.payload);
    }
}

#[derive(Deserialize, Debug)]
#[serde(tag="type", rename_all="snake_case")]
enum ClientEvent {
    StartStream { #[serde(default)] side: Side },
    StopStream { #[serde(default)] side: Side },
    CaptureFrame { #[serde(default)] side: Side },
    Ping,
    SubscribeUpdates,
    SpreadCaptured { #[serde(default)] spread_data: serde_json::Value },
    SessionStarted { #[serde(default)] session_data: serde_json::Value },
}

#[derive(Debug, PartialEq)]
enum Reply {
    /// Sent back to the originating connection only.
    Direct(String),
    /// Fanned out to every open connection.
    All(String),
}

fn error_reply(message: impl Into<String>) -> Reply {
    Reply::Direct(serde_json::json!({ "type": "error", "message": message.into() }).to_string())
}

fn respond(endpoint: Endpoint, text: &str) -> Reply {
    let ev = match serde_json::from_str::<ClientEvent>(text) {
        Ok(ev) => ev,
        Err(e) => return error_reply(format!("invalid message: {e}")),
    };
    match (endpoint, ev) {
        (_, ClientEvent::Ping) => Reply::Direct(serde_json::json!({
            "type": "pong",
            "timestamp": Utc::now(),
        }).to_string()),
        (Endpoint::CameraStream, ClientEvent::StartStream { side }) => Reply::Direct(serde_json::json!({
            "type": "stream_started",
            "side": side,
            "status": "success",
            "message": format!("{} camera stream started", side.title()),
        }).to_string()),
        (Endpoint::CameraStream, ClientEvent::StopStream { side }) => Reply::Direct(serde_json::json!({
            "type": "stream_stopped",
            "side": side,
            "status": "success",
            "message": format!("{} camera stream stopped", side.title()),
        }).to_string()),
        (Endpoint::CameraStream, ClientEvent::CaptureFrame { side }) => {
            error_reply(format!("Failed to capture frame from {side} camera: no camera backend attached"))
        }
        (Endpoint::ScannerUpdates, ClientEvent::SubscribeUpdates) => Reply::Direct(serde_json::json!({
            "type": "subscription_confirmed",
            "message": "Subscribed to scanner updates",
        }).to_string()),
        (Endpoint::ScannerUpdates, ClientEvent::SpreadCaptured { spread_data }) => {
            Reply::All(server::spread_update(&spread_data))
        }
        (Endpoint::ScannerUpdates, ClientEvent::SessionStarted { session_data }) => {
            Reply::All(server::session_update(&session_data))
        }
        (endpoint, ev) => error_reply(format!("{ev:?} is not handled on the {endpoint:?} endpoint")),
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => match respond(self.endpoint, &text) {
                Reply::Direct(payload) => ctx.text(payload),
                Reply::All(payload) => self.hub.do_send(Broadcast { payload }),
            },
            Ok(ws::Message::Ping(bytes)) => ctx.pong(&bytes),
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            Err(e) => {
                log::warn!("websocket protocol error: {e}");
                ctx.stop();
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn direct(reply: Reply) -> serde_json::Value {
        match reply {
            Reply::Direct(s) => serde_json::from_str(&s).unwrap(),
            other => panic!("expected direct reply, got {other:?}"),
        }
    }

    #[test]
    fn ping_works_on_both_endpoints() {
        for endpoint in [Endpoint::CameraStream, Endpoint::ScannerUpdates] {
            assert_eq!(direct(respond(endpoint, r#"{"type":"ping"}"#))["type"], "pong");
        }
    }

    #[test]
    fn stream_acks_default_to_left() {
        let v = direct(respond(Endpoint::CameraStream, r#"{"type":"start_stream"}"#));
        assert_eq!(v["type"], "stream_started");
        assert_eq!(v["side"], "left");

        let v = direct(respond(Endpoint::CameraStream, r#"{"type":"stop_stream","side":"right"}"#));
        assert_eq!(v["type"], "stream_stopped");
        assert_eq!(v["message"], "Right camera stream stopped");
    }

    #[test]
    fn capture_frame_reports_missing_backend() {
        let v = direct(respond(Endpoint::CameraStream, r#"{"type":"capture_frame","side":"right"}"#));
        assert_eq!(v["type"], "error");
    }

    #[test]
    fn scanner_events_broadcast() {
        let reply = respond(
            Endpoint::ScannerUpdates,
            r#"{"type":"spread_captured","spread_data":{"spread_index":1}}"#,
        );
        match reply {
            Reply::All(s) => {
                let v: serde_json::Value = serde_json::from_str(&s).unwrap();
                assert_eq!(v["type"], "spread_update");
                assert_eq!(v["spread_data"]["spread_index"], 1);
            }
            other => panic!("expected broadcast, got {other:?}"),
        }

        let v = direct(respond(Endpoint::ScannerUpdates, r#"{"type":"subscribe_updates"}"#));
        assert_eq!(v["type"], "subscription_confirmed");
    }

    #[test]
    fn bad_input_gets_error_reply() {
        assert_eq!(direct(respond(Endpoint::ScannerUpdates, "not json"))["type"], "error");
        assert_eq!(direct(respond(Endpoint::CameraStream, r#"{"type":"teleport"}"#))["type"], "error");
        assert_eq!(direct(respond(Endpoint::CameraStream, r#"{"type":"start_stream","side":"up"}"#))["type"], "error");
        // Scanner events are not accepted on the camera endpoint.
        assert_eq!(direct(respond(Endpoint::CameraStream, r#"{"type":"subscribe_updates"}"#))["type"], "error");
    }
}
