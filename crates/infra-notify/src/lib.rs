// Vendormatch Notification Infrastructure
//
// Implements the NotificationGateway port with the two channels the engine
// fans out on: a durable in-app inbox row (read on next app open) and a
// realtime push event over a broadcast bus (consumed by the websocket/API
// layer, which is outside the dispatch core).

mod gateway;
mod hub;

pub use gateway::CompositeGateway;
pub use hub::{NotificationHub, PushEvent};
