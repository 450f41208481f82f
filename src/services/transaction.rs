use super::broadcast::{BroadcastActor, BroadcastDecision, BroadcastSubmitted};
use crate::db::{
    account::InternalAccount,
    transaction::{
        Decision, DecideTransaction, InternalTransaction, StatusCounts, SubmitTransaction,
        TransactionId, TransactionKind, TransactionStatus, TransactionsByStatus,
    },
    DbExecutor,
};
use crate::message_handler_with_span;
use crate::receipt::{Receipt, ReceiptUpload};
use crate::span::SpanMessage;
use crate::validation::check_submission_form;
use actix::prelude::*;
use actix_interop::FutureInterop;
use chrono::Utc;
use color_eyre::eyre::Report;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, Span};

/// Fields of a registration or bet as filled in by the submitter.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct SubmissionForm {
    pub kind: TransactionKind,
    pub student_name: String,
    pub program: String,
    pub email: String,
}

pub struct TransactionActor {
    db: Addr<DbExecutor>,
    broadcast: Addr<BroadcastActor>,
}

impl TransactionActor {
    pub fn new(db: Addr<DbExecutor>, broadcast: Addr<BroadcastActor>) -> Self {
        Self { db, broadcast }
    }
}

impl Actor for TransactionActor {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        info!("Transaction actor started");
    }
}

#[derive(Message, Clone, Debug)]
#[rtype(result = "Result<InternalTransaction, Report>")]
pub struct Submit {
    pub submitter: InternalAccount,
    pub form: SubmissionForm,
    pub receipt: Option<ReceiptUpload>,
}

#[instrument(skip(db, broadcast, msg), fields(kind = ?msg.form.kind, student = msg.form.student_name.as_str()))]
async fn submit(
    db: Addr<DbExecutor>,
    broadcast: Addr<BroadcastActor>,
    msg: Submit,
) -> Result<InternalTransaction, Report> {
    let Submit {
        submitter,
        form,
        receipt,
    } = msg;
    check_submission_form(&form)?;
    let receipt = Receipt::from_upload(receipt.as_ref())?;
    let transaction = InternalTransaction {
        id: TransactionId::new(),
        submitter_user_id: submitter.id,
        submitter_name: submitter.name,
        student_name: form.student_name,
        program: form.program,
        contact_email: form.email,
        receipt_file_name: receipt.file_name,
        receipt_content: receipt.encoded,
        status: TransactionStatus::Pending,
        kind: form.kind,
        created_at: Utc::now(),
    };
    let transaction = db
        .send(SpanMessage::new(SubmitTransaction(transaction)))
        .await??;
    broadcast.do_send(BroadcastSubmitted(transaction.clone()));
    Ok(transaction)
}

message_handler_with_span! {
    impl SpanHandler<Submit> for TransactionActor {
        type Result = ResponseActFuture<Self, <Submit as Message>::Result>;

        fn handle(&mut self, msg: Submit, _ctx: &mut Context<Self>, _span: Span) -> Self::Result {
            debug!("Handling submit");
            Box::pin(submit(self.db.clone(), self.broadcast.clone(), msg).interop_actor(&*self))
        }
    }
}

#[derive(Message, Clone, Debug)]
#[rtype(result = "Result<Decision, Report>")]
pub struct Decide {
    pub id: TransactionId,
    pub approve: bool,
}

#[instrument(skip(db, broadcast))]
async fn decide(
    db: Addr<DbExecutor>,
    broadcast: Addr<BroadcastActor>,
    msg: Decide,
) -> Result<Decision, Report> {
    let decision = db
        .send(SpanMessage::new(DecideTransaction {
            id: msg.id,
            approve: msg.approve,
        }))
        .await??;
    if let Some(student) = &decision.student {
        debug!(
            student = student.name.as_str(),
            votes = student.vote_count,
            "Tally updated"
        );
    }
    broadcast.do_send(BroadcastDecision(decision.clone()));
    Ok(decision)
}

message_handler_with_span! {
    impl SpanHandler<Decide> for TransactionActor {
        type Result = ResponseActFuture<Self, <Decide as Message>::Result>;

        fn handle(&mut self, msg: Decide, _ctx: &mut Context<Self>, _span: Span) -> Self::Result {
            debug!("Handling decide");
            Box::pin(decide(self.db.clone(), self.broadcast.clone(), msg).interop_actor(&*self))
        }
    }
}

/// Transactions of one status in storage order, with the per-status counts.
#[derive(Message, Clone, Debug)]
#[rtype(result = "Result<(Vec<InternalTransaction>, StatusCounts), Report>")]
pub struct Review(pub TransactionStatus);

message_handler_with_span! {
    impl SpanHandler<Review> for TransactionActor {
        type Result = ResponseActFuture<Self, <Review as Message>::Result>;

        fn handle(&mut self, msg: Review, _ctx: &mut Context<Self>, _span: Span) -> Self::Result {
            debug!(status = %msg.0, "Handling review");
            let db = self.db.clone();
            Box::pin(
                async move { db.send(SpanMessage::new(TransactionsByStatus(msg.0))).await? }
                    .interop_actor(&*self),
            )
        }
    }
}
