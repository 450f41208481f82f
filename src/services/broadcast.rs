use super::{Connect, Disconnect};
use crate::db::transaction::{Decision, InternalTransaction};
use crate::websocket::WsClient;
use actix::prelude::*;
use std::collections::HashSet;
use tracing::{debug, info};

/// A new pending transaction, shown to signed-in admins.
#[derive(Message, Clone, Debug)]
#[rtype(result = "()")]
pub struct BroadcastSubmitted(pub InternalTransaction);

/// A stored decision and the tally it produced, shown to every client.
#[derive(Message, Clone, Debug)]
#[rtype(result = "()")]
pub struct BroadcastDecision(pub Decision);

// Actor
#[derive(Default)]
pub struct BroadcastActor {
    clients: HashSet<Addr<WsClient>>,
}

impl BroadcastActor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Actor for BroadcastActor {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        info!("Broadcast actor started");
    }
}

impl Handler<Connect> for BroadcastActor {
    type Result = ();

    fn handle(&mut self, msg: Connect, _ctx: &mut Context<Self>) -> Self::Result {
        debug!("Adding new client to broadcast");
        self.clients.insert(msg.addr);
    }
}

impl Handler<Disconnect> for BroadcastActor {
    type Result = ();

    fn handle(&mut self, msg: Disconnect, _ctx: &mut Context<Self>) -> Self::Result {
        debug!("Removing client from broadcast");
        self.clients.remove(&msg.addr);
    }
}

macro_rules! broadcast_handler {
    ($message_type:ident) => {
        impl Handler<$message_type> for BroadcastActor {
            type Result = ();

            fn handle(&mut self, msg: $message_type, _ctx: &mut Context<Self>) -> Self::Result {
                debug!(
                    "Broadcasting {message} to clients. Number of clients: {clients}",
                    message = stringify!($message_type),
                    clients = self.clients.len()
                );
                for client in &self.clients {
                    client.do_send(msg.clone());
                }
            }
        }
    };
}

broadcast_handler!(BroadcastSubmitted);
broadcast_handler!(BroadcastDecision);
