use actix::{Actor, ActorContext, AsyncContext, Handler, Message as ActixMessage, StreamHandler};
use actix_web_actors::ws;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};

use super::manager::{ConnectionManager, FrameSender, Room, SubscriberId};
use super::messages::{error_frame, joined_frame, pong_frame, ClientMessage};
use crate::services::NotificationStore;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

/// Frame produced by an async task that must be written on this session
#[derive(ActixMessage)]
#[rtype(result = "()")]
struct TextFrame(String);

/// One realtime client connection
pub struct WsSession {
    subscriber_id: SubscriberId,
    manager: ConnectionManager,
    store: Arc<dyn NotificationStore>,
    sender: FrameSender,
    receiver: Option<mpsc::UnboundedReceiver<String>>,
    rooms: HashSet<Room>,
    hb: Instant,
}

impl WsSession {
    pub fn new(manager: ConnectionManager, store: Arc<dyn NotificationStore>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            subscriber_id: SubscriberId::new(),
            manager,
            store,
            sender,
            receiver: Some(receiver),
            rooms: HashSet::new(),
            hb: Instant::now(),
        }
    }

    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.hb) > CLIENT_TIMEOUT {
                warn!(subscriber = ?act.subscriber_id, "WebSocket heartbeat failed, disconnecting");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    fn send_frame(ctx: &mut ws::WebsocketContext<Self>, frame: Result<String, serde_json::Error>) {
        match frame {
            Ok(text) => ctx.text(text),
            Err(e) => warn!("Failed to encode WebSocket frame: {}", e),
        }
    }

    fn join(&mut self, room: Room, ctx: &mut ws::WebsocketContext<Self>) {
        self.rooms.insert(room);

        let manager = self.manager.clone();
        let store = self.store.clone();
        let sender = self.sender.clone();
        let subscriber_id = self.subscriber_id;
        let addr = ctx.address();

        actix::spawn(async move {
            manager.join(room, subscriber_id, sender).await;

            let unread_count = match room {
                Room::User(user_id) => match store.unread_count(user_id).await {
                    Ok(count) => Some(count),
                    Err(e) => {
                        warn!(user_id = %user_id, error = %e, "Failed to load unread count on join");
                        None
                    }
                },
                Room::AdminGroup => None,
            };

            match joined_frame(&room.to_string(), unread_count) {
                Ok(frame) => addr.do_send(TextFrame(frame)),
                Err(e) => warn!("Failed to encode joined frame: {}", e),
            }
        });

        info!(subscriber = ?self.subscriber_id, room = %room, "Connection joined room");
    }

    fn leave(&mut self, room: Room) {
        if !self.rooms.remove(&room) {
            return;
        }
        let manager = self.manager.clone();
        let subscriber_id = self.subscriber_id;
        actix::spawn(async move {
            manager.leave(room, subscriber_id).await;
        });
    }

    fn handle_client_message(&mut self, text: &str, ctx: &mut ws::WebsocketContext<Self>) {
        match ClientMessage::from_json(text) {
            Ok(ClientMessage::JoinUserRoom { user_id }) => self.join(Room::User(user_id), ctx),
            Ok(ClientMessage::JoinAdminRoom) => self.join(Room::AdminGroup, ctx),
            Ok(ClientMessage::LeaveRoom { room }) => match room.parse::<Room>() {
                Ok(room) => self.leave(room),
                Err(e) => Self::send_frame(ctx, error_frame("UNKNOWN_ROOM", &e)),
            },
            Ok(ClientMessage::Ping) => Self::send_frame(ctx, pong_frame()),
            Err(e) => {
                debug!("Failed to parse WS message: {:?}", e);
                Self::send_frame(ctx, error_frame("INVALID_MESSAGE", "unrecognised message"));
            }
        }
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        debug!(subscriber = ?self.subscriber_id, "WebSocket session started");
        self.hb(ctx);

        if let Some(receiver) = self.receiver.take() {
            ctx.add_stream(UnboundedReceiverStream::new(receiver));
        }
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        debug!(subscriber = ?self.subscriber_id, "WebSocket session stopped");

        let manager = self.manager.clone();
        let subscriber_id = self.subscriber_id;
        actix::spawn(async move {
            manager.leave_all(subscriber_id).await;
        });
    }
}

/// Frames emitted into this connection's rooms
impl StreamHandler<String> for WsSession {
    fn handle(&mut self, frame: String, ctx: &mut Self::Context) {
        ctx.text(frame);
    }

    fn finished(&mut self, _ctx: &mut Self::Context) {}
}

impl Handler<TextFrame> for WsSession {
    type Result = ();

    fn handle(&mut self, msg: TextFrame, ctx: &mut Self::Context) {
        ctx.text(msg.0);
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(text)) => {
                self.hb = Instant::now();
                self.handle_client_message(&text, ctx);
            }
            Ok(ws::Message::Binary(_)) => {
                warn!("Binary WebSocket messages not supported");
            }
            Ok(ws::Message::Close(reason)) => {
                debug!("WebSocket close message received: {:?}", reason);
                ctx.close(reason);
                ctx.stop();
            }
            Ok(_) => {}
            Err(e) => {
                warn!("WebSocket protocol error: {}", e);
                ctx.stop();
            }
        }
    }
}
