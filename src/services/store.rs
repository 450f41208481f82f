use crate::db::{
    store::{Collection, LoadCollection, SaveCollection},
    DbExecutor,
};
use crate::message_handler_with_span;
use crate::span::SpanMessage;
use actix::prelude::*;
use actix_interop::FutureInterop;
use color_eyre::eyre::Report;
use serde_json::Value;
use tracing::{debug, info, Span};

/// Dump and restore of whole collections.
pub struct StoreActor {
    db: Addr<DbExecutor>,
}

impl StoreActor {
    pub fn new(db: Addr<DbExecutor>) -> Self {
        Self { db }
    }
}

impl Actor for StoreActor {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        info!("Store actor started");
    }
}

#[derive(Message, Clone, Debug)]
#[rtype(result = "Result<Vec<Value>, Report>")]
pub struct Export(pub Collection);

message_handler_with_span! {
    impl SpanHandler<Export> for StoreActor {
        type Result = ResponseActFuture<Self, <Export as Message>::Result>;

        fn handle(&mut self, msg: Export, _ctx: &mut Context<Self>, _span: Span) -> Self::Result {
            debug!(collection = msg.0.key(), "Handling export");
            let db = self.db.clone();
            Box::pin(
                async move { db.send(SpanMessage::new(LoadCollection(msg.0))).await? }
                    .interop_actor(&*self),
            )
        }
    }
}

#[derive(Message, Clone, Debug)]
#[rtype(result = "Result<usize, Report>")]
pub struct Import(pub Collection, pub Vec<Value>);

message_handler_with_span! {
    impl SpanHandler<Import> for StoreActor {
        type Result = ResponseActFuture<Self, <Import as Message>::Result>;

        fn handle(&mut self, msg: Import, _ctx: &mut Context<Self>, _span: Span) -> Self::Result {
            let Import(collection, records) = msg;
            debug!(collection = collection.key(), count = records.len(), "Handling import");
            let db = self.db.clone();
            Box::pin(
                async move { db.send(SpanMessage::new(SaveCollection(collection, records))).await? }
                    .interop_actor(&*self),
            )
        }
    }
}
