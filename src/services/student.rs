use crate::db::{
    student::{self, AllStudents, InternalStudent},
    DbExecutor,
};
use crate::message_handler_with_span;
use crate::span::SpanMessage;
use actix::prelude::*;
use actix_interop::FutureInterop;
use color_eyre::eyre::Report;
use tracing::{debug, info, Span};

pub struct StudentActor {
    db: Addr<DbExecutor>,
}

impl StudentActor {
    pub fn new(db: Addr<DbExecutor>) -> Self {
        Self { db }
    }
}

impl Actor for StudentActor {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        info!("Student actor started");
    }
}

/// Every student in the order they were first credited.
#[derive(Message, Clone, Debug)]
#[rtype(result = "Result<Vec<InternalStudent>, Report>")]
pub struct Students;

message_handler_with_span! {
    impl SpanHandler<Students> for StudentActor {
        type Result = ResponseActFuture<Self, <Students as Message>::Result>;

        fn handle(&mut self, _msg: Students, _ctx: &mut Context<Self>, _span: Span) -> Self::Result {
            debug!("Handling students");
            let db = self.db.clone();
            Box::pin(async move { db.send(SpanMessage::new(AllStudents)).await? }.interop_actor(&*self))
        }
    }
}

/// Students by descending vote count, ties in storage order.
#[derive(Message, Clone, Debug)]
#[rtype(result = "Result<Vec<InternalStudent>, Report>")]
pub struct Leaderboard;

message_handler_with_span! {
    impl SpanHandler<Leaderboard> for StudentActor {
        type Result = ResponseActFuture<Self, <Leaderboard as Message>::Result>;

        fn handle(&mut self, _msg: Leaderboard, _ctx: &mut Context<Self>, _span: Span) -> Self::Result {
            debug!("Handling leaderboard");
            let db = self.db.clone();
            Box::pin(
                async move {
                    let students = db.send(SpanMessage::new(AllStudents)).await??;
                    Ok(student::leaderboard(students))
                }
                .interop_actor(&*self),
            )
        }
    }
}
