use crate::db::{
    account::{AccountId, Credentials, InternalAccount, Role},
    session::SessionId,
    store::Collection,
    student::{InternalStudent, StudentId},
    transaction::{
        Decision, InternalTransaction, StatusCounts, TransactionId, TransactionKind,
        TransactionStatus,
    },
};
use crate::gate::{self, View};
use crate::receipt::ReceiptUpload;
use crate::rejection::{Rejection, RejectionKind};
use crate::services::{
    account::{Register, Resume, SignIn, SignOut},
    broadcast::{BroadcastDecision, BroadcastSubmitted},
    store::{Export, Import},
    student::{Leaderboard, Students},
    transaction::{Decide, Review, Submit, SubmissionForm},
    Connect, Disconnect, Services,
};
use crate::span::SpanMessage;
use actix::dev::ToEnvelope;
use actix::prelude::*;
use actix_web_actors::ws;
use chrono::{DateTime, Utc};
use color_eyre::eyre::Report;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, debug_span, error, info, warn};

/// Bearer token handed out on sign-in. Not a real credential.
pub const PLACEHOLDER_TOKEN: &str = "eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9...";

const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IncomingCredentials {
    pub identifier: String,
    pub password: String,
    #[serde(default)]
    pub as_admin: bool,
}

impl IncomingCredentials {
    fn role(&self) -> Role {
        if self.as_admin {
            Role::Admin
        } else {
            Role::User
        }
    }

    fn into_credentials(self) -> Credentials {
        Credentials {
            name: self.identifier,
            password: self.password,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IncomingReconnect {
    pub session_id: SessionId,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IncomingSubmission {
    pub kind: TransactionKind,
    pub student_name: String,
    pub program: String,
    pub email: String,
    pub receipt: Option<ReceiptUpload>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IncomingReview {
    pub status: TransactionStatus,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IncomingDecision {
    pub transaction_id: TransactionId,
    pub approve: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IncomingExport {
    pub collection: Collection,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IncomingImport {
    pub collection: Collection,
    pub records: Vec<Value>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IncomingMessage {
    Register(IncomingCredentials),
    Login(IncomingCredentials),
    Reconnect(IncomingReconnect),
    Logout,
    Students,
    Leaderboard,
    Submit(IncomingSubmission),
    Review(IncomingReview),
    Decide(IncomingDecision),
    Export(IncomingExport),
    Import(IncomingImport),
}

impl IncomingMessage {
    fn name(&self) -> &'static str {
        match self {
            IncomingMessage::Register(_) => "register",
            IncomingMessage::Login(_) => "login",
            IncomingMessage::Reconnect(_) => "reconnect",
            IncomingMessage::Logout => "logout",
            IncomingMessage::Students => "students",
            IncomingMessage::Leaderboard => "leaderboard",
            IncomingMessage::Submit(_) => "submit",
            IncomingMessage::Review(_) => "review",
            IncomingMessage::Decide(_) => "decide",
            IncomingMessage::Export(_) => "export",
            IncomingMessage::Import(_) => "import",
        }
    }

    /// View a request belongs to. Account requests need none.
    fn view(&self) -> Option<View> {
        match self {
            IncomingMessage::Register(_)
            | IncomingMessage::Login(_)
            | IncomingMessage::Reconnect(_)
            | IncomingMessage::Logout => None,
            IncomingMessage::Students
            | IncomingMessage::Leaderboard
            | IncomingMessage::Submit(_) => Some(View::Dashboard),
            IncomingMessage::Review(_)
            | IncomingMessage::Decide(_)
            | IncomingMessage::Export(_)
            | IncomingMessage::Import(_) => Some(View::Admin),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingAccount {
    pub id: AccountId,
    pub name: String,
    pub role: Role,
}

impl From<InternalAccount> for OutgoingAccount {
    fn from(account: InternalAccount) -> Self {
        Self {
            id: account.id,
            name: account.name,
            role: account.role,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingSignedIn {
    pub session_id: SessionId,
    pub token: String,
    pub user: OutgoingAccount,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingRedirect {
    pub view: View,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingStudent {
    pub id: StudentId,
    pub name: String,
    pub program: String,
    pub vote_count: u32,
}

impl From<InternalStudent> for OutgoingStudent {
    fn from(student: InternalStudent) -> Self {
        Self {
            id: student.id,
            name: student.name,
            program: student.program,
            vote_count: student.vote_count,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingStudents {
    pub students: Vec<OutgoingStudent>,
}

impl From<Vec<InternalStudent>> for OutgoingStudents {
    fn from(students: Vec<InternalStudent>) -> Self {
        Self {
            students: students.into_iter().map(OutgoingStudent::from).collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingTransaction {
    pub id: TransactionId,
    pub submitter_user_id: AccountId,
    pub submitter_name: String,
    pub student_name: String,
    pub program: String,
    pub contact_email: String,
    pub receipt_file_name: String,
    pub receipt_content: String,
    pub status: TransactionStatus,
    pub kind: TransactionKind,
    pub created_at: DateTime<Utc>,
}

impl From<InternalTransaction> for OutgoingTransaction {
    fn from(transaction: InternalTransaction) -> Self {
        Self {
            id: transaction.id,
            submitter_user_id: transaction.submitter_user_id,
            submitter_name: transaction.submitter_name,
            student_name: transaction.student_name,
            program: transaction.program,
            contact_email: transaction.contact_email,
            receipt_file_name: transaction.receipt_file_name,
            receipt_content: transaction.receipt_content,
            status: transaction.status,
            kind: transaction.kind,
            created_at: transaction.created_at,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingReview {
    pub status: TransactionStatus,
    pub transactions: Vec<OutgoingTransaction>,
    pub counts: StatusCounts,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingDecision {
    pub transaction: OutgoingTransaction,
    pub student: Option<OutgoingStudent>,
}

impl From<Decision> for OutgoingDecision {
    fn from(decision: Decision) -> Self {
        Self {
            transaction: decision.transaction.into(),
            student: decision.student.map(OutgoingStudent::from),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingRecords {
    pub collection: Collection,
    pub records: Vec<Value>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingImported {
    pub collection: Collection,
    pub count: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Authentication,
    Capacity,
    Resource,
    NotFound,
    Conflict,
    Internal,
}

impl From<RejectionKind> for ErrorKind {
    fn from(kind: RejectionKind) -> Self {
        match kind {
            RejectionKind::Validation => ErrorKind::Validation,
            RejectionKind::Authentication => ErrorKind::Authentication,
            RejectionKind::Capacity => ErrorKind::Capacity,
            RejectionKind::Resource => ErrorKind::Resource,
            RejectionKind::NotFound => ErrorKind::NotFound,
            RejectionKind::Conflict => ErrorKind::Conflict,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&Report> for OutgoingError {
    fn from(report: &Report) -> Self {
        match report.downcast_ref::<Rejection>() {
            Some(rejection) => Self {
                kind: rejection.kind().into(),
                message: rejection.to_string(),
            },
            None => Self {
                kind: ErrorKind::Internal,
                message: INTERNAL_ERROR_MESSAGE.to_owned(),
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutgoingMessage {
    Registered(OutgoingAccount),
    SignedIn(OutgoingSignedIn),
    SignedOut,
    Redirect(OutgoingRedirect),
    Students(OutgoingStudents),
    Leaderboard(OutgoingStudents),
    Transaction(OutgoingTransaction),
    Review(OutgoingReview),
    Decided(OutgoingDecision),
    Tally(OutgoingStudent),
    Submitted(OutgoingTransaction),
    Records(OutgoingRecords),
    Imported(OutgoingImported),
    Error(OutgoingError),
}

/// One connected client. Holds the identity of the session signed in on
/// this connection, if any.
pub struct WsClient {
    services: Services,
    session: Option<(SessionId, InternalAccount)>,
}

impl WsClient {
    pub fn new(services: Services) -> WsClient {
        WsClient {
            services,
            session: None,
        }
    }

    fn identity(&self) -> Option<&InternalAccount> {
        self.session.as_ref().map(|(_, account)| account)
    }

    fn is_admin(&self) -> bool {
        self.identity().map_or(false, InternalAccount::is_admin)
    }

    fn send_json<T: Serialize>(&self, ctx: &mut ws::WebsocketContext<Self>, value: &T) {
        match serde_json::to_string(value) {
            Ok(json) => ctx.text(json),
            Err(err) => error!("Failed to convert to JSON {error}", error = err.to_string()),
        }
    }

    fn send_error(&self, ctx: &mut ws::WebsocketContext<Self>, report: &Report) {
        let outgoing = OutgoingError::from(report);
        if outgoing.kind == ErrorKind::Internal {
            error!("Request failed: {:?}", report);
        } else {
            debug!(kind = ?outgoing.kind, "Request rejected: {}", outgoing.message);
        }
        self.send_json(ctx, &OutgoingMessage::Error(outgoing));
    }

    fn signed_in(&mut self, session_id: SessionId, account: InternalAccount) -> OutgoingMessage {
        self.session = Some((session_id.clone(), account.clone()));
        OutgoingMessage::SignedIn(OutgoingSignedIn {
            session_id,
            token: PLACEHOLDER_TOKEN.to_owned(),
            user: account.into(),
        })
    }

    /// Sends `msg` to a service actor and hands a successful result to
    /// `on_success`. Failures are answered with an error reply.
    fn request<A, M, T, F>(
        &self,
        ctx: &mut ws::WebsocketContext<Self>,
        addr: &Addr<A>,
        msg: M,
        on_success: F,
    ) where
        A: Handler<SpanMessage<M>>,
        A::Context: ToEnvelope<A, SpanMessage<M>>,
        M: Message<Result = Result<T, Report>> + Send + 'static,
        T: Send + 'static,
        F: FnOnce(&mut Self, T, &mut ws::WebsocketContext<Self>) + 'static,
    {
        addr.send(SpanMessage::new(msg))
            .into_actor(self)
            .map(move |result, actor, ctx| match result {
                Ok(Ok(value)) => on_success(actor, value, ctx),
                Ok(Err(report)) => actor.send_error(ctx, &report),
                Err(mailbox) => actor.send_error(ctx, &Report::new(mailbox)),
            })
            .spawn(ctx);
    }

    fn handle_incoming(&mut self, message: IncomingMessage, ctx: &mut ws::WebsocketContext<Self>) {
        if let Some(requested) = message.view() {
            let allowed = gate::resolve(self.identity(), requested);
            if allowed != requested {
                debug!(?requested, ?allowed, "Redirecting request");
                self.send_json(
                    ctx,
                    &OutgoingMessage::Redirect(OutgoingRedirect { view: allowed }),
                );
                return;
            }
        }

        let services = self.services.clone();
        match message {
            IncomingMessage::Register(credentials) => {
                let msg = Register {
                    role: credentials.role(),
                    credentials: credentials.into_credentials(),
                };
                self.request(ctx, &services.accounts, msg, |actor, account, ctx| {
                    actor.send_json(ctx, &OutgoingMessage::Registered(account.into()))
                });
            }
            IncomingMessage::Login(credentials) => {
                let msg = SignIn {
                    role: credentials.role(),
                    credentials: credentials.into_credentials(),
                };
                self.request(ctx, &services.accounts, msg, |actor, (session, account), ctx| {
                    let reply = actor.signed_in(session.id, account);
                    actor.send_json(ctx, &reply)
                });
            }
            IncomingMessage::Reconnect(reconnect) => {
                let msg = Resume(reconnect.session_id);
                self.request(ctx, &services.accounts, msg, |actor, (session, account), ctx| {
                    let reply = actor.signed_in(session.id, account);
                    actor.send_json(ctx, &reply)
                });
            }
            IncomingMessage::Logout => {
                let session_id = self.session.take().map(|(session_id, _)| session_id);
                self.request(ctx, &services.accounts, SignOut(session_id), |actor, (), ctx| {
                    actor.send_json(ctx, &OutgoingMessage::SignedOut)
                });
            }
            IncomingMessage::Students => {
                self.request(ctx, &services.students, Students, |actor, students, ctx| {
                    actor.send_json(ctx, &OutgoingMessage::Students(students.into()))
                });
            }
            IncomingMessage::Leaderboard => {
                self.request(ctx, &services.students, Leaderboard, |actor, students, ctx| {
                    actor.send_json(ctx, &OutgoingMessage::Leaderboard(students.into()))
                });
            }
            IncomingMessage::Submit(submission) => {
                let submitter = match self.identity() {
                    Some(account) => account.clone(),
                    None => return,
                };
                let msg = Submit {
                    submitter,
                    form: SubmissionForm {
                        kind: submission.kind,
                        student_name: submission.student_name,
                        program: submission.program,
                        email: submission.email,
                    },
                    receipt: submission.receipt,
                };
                self.request(ctx, &services.transactions, msg, |actor, transaction, ctx| {
                    actor.send_json(ctx, &OutgoingMessage::Submitted(transaction.into()))
                });
            }
            IncomingMessage::Review(review) => {
                let status = review.status;
                self.request(
                    ctx,
                    &services.transactions,
                    Review(status),
                    move |actor, (transactions, counts), ctx| {
                        let review = OutgoingReview {
                            status,
                            transactions: transactions.into_iter().map(Into::into).collect(),
                            counts,
                        };
                        actor.send_json(ctx, &OutgoingMessage::Review(review))
                    },
                );
            }
            IncomingMessage::Decide(decision) => {
                let msg = Decide {
                    id: decision.transaction_id,
                    approve: decision.approve,
                };
                // The outcome reaches this client through the decision broadcast.
                self.request(ctx, &services.transactions, msg, |_, _, _| {});
            }
            IncomingMessage::Export(export) => {
                let collection = export.collection;
                self.request(
                    ctx,
                    &services.store,
                    Export(collection),
                    move |actor, records, ctx| {
                        actor.send_json(
                            ctx,
                            &OutgoingMessage::Records(OutgoingRecords {
                                collection,
                                records,
                            }),
                        )
                    },
                );
            }
            IncomingMessage::Import(import) => {
                let collection = import.collection;
                self.request(
                    ctx,
                    &services.store,
                    Import(collection, import.records),
                    move |actor, count, ctx| {
                        actor.send_json(
                            ctx,
                            &OutgoingMessage::Imported(OutgoingImported { collection, count }),
                        )
                    },
                );
            }
        }
    }
}

impl Actor for WsClient {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!("New ws client");
        let addr = ctx.address();
        self.services.broadcast.do_send(Connect { addr });
    }

    fn stopped(&mut self, ctx: &mut Self::Context) {
        info!("Ws client left");
        let addr = ctx.address();
        self.services.broadcast.do_send(Disconnect { addr });
    }
}

// Incoming messages from ws
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsClient {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => {
                let message: IncomingMessage = match serde_json::from_str(&text) {
                    Ok(message) => message,
                    Err(err) => {
                        warn!("Unable to parse incoming message: {}", err);
                        let outgoing = OutgoingError {
                            kind: ErrorKind::Validation,
                            message: format!("malformed request: {}", err),
                        };
                        self.send_json(ctx, &OutgoingMessage::Error(outgoing));
                        return;
                    }
                };
                let span = debug_span!("incoming", session = tracing::field::Empty);
                if let Some((session_id, _)) = &self.session {
                    span.record("session", session_id.as_string().as_str());
                }
                let _enter = span.enter();
                debug!("Incoming {} message", message.name());
                self.handle_incoming(message, ctx);
            }
            Ok(ws::Message::Ping(bytes)) => ctx.pong(&bytes),
            Ok(ws::Message::Pong(_)) => {}
            Ok(ws::Message::Close(reason)) => {
                debug!("Got close message from WS. Reason: {:#?}", reason);
                ctx.close(reason);
                ctx.stop();
            }
            Ok(message) => {
                warn!("Client sent something else than text: {:#?}", message);
            }
            Err(err) => {
                error!("ProtocolError in StreamHandler {:#?}", err);
                ctx.stop();
            }
        }
    }
}

impl Handler<BroadcastSubmitted> for WsClient {
    type Result = ();

    fn handle(&mut self, msg: BroadcastSubmitted, ctx: &mut Self::Context) {
        if !self.is_admin() {
            return;
        }
        debug!("Forwarding new transaction to admin");
        self.send_json(ctx, &OutgoingMessage::Transaction(msg.0.into()))
    }
}

impl Handler<BroadcastDecision> for WsClient {
    type Result = ();

    /// Admins and the submitter see the decided transaction. Other signed-in
    /// clients only see the credited student, anonymous ones nothing.
    fn handle(&mut self, msg: BroadcastDecision, ctx: &mut Self::Context) {
        let decision = msg.0;
        let sees_transaction = match self.identity() {
            Some(account) => {
                account.is_admin() || account.id == decision.transaction.submitter_user_id
            }
            None => return,
        };
        if sees_transaction {
            self.send_json(ctx, &OutgoingMessage::Decided(decision.into()))
        } else if let Some(student) = decision.student {
            self.send_json(ctx, &OutgoingMessage::Tally(student.into()))
        }
    }
}
