use crate::db::{
    account::{AccountByCredentials, AdminCount, Credentials, InternalAccount, RegisterAccount, Role},
    session::{DeleteSession, InternalSession, SaveSession, SessionById, SessionId},
    DbExecutor,
};
use crate::message_handler_with_span;
use crate::rejection::Rejection;
use crate::span::SpanMessage;
use crate::validation::check_credentials;
use actix::prelude::*;
use actix_interop::FutureInterop;
use color_eyre::eyre::Report;
use tracing::{debug, info, instrument, Span};

pub type SignedIn = (InternalSession, InternalAccount);

pub struct AccountActor {
    db: Addr<DbExecutor>,
}

impl AccountActor {
    pub fn new(db: Addr<DbExecutor>) -> Self {
        Self { db }
    }
}

impl Actor for AccountActor {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        info!("Account actor started");
    }
}

#[derive(Message, Clone, Debug)]
#[rtype(result = "Result<InternalAccount, Report>")]
pub struct Register {
    pub role: Role,
    pub credentials: Credentials,
}

#[instrument(skip(db))]
async fn register(db: Addr<DbExecutor>, msg: Register) -> Result<InternalAccount, Report> {
    let Register { role, credentials } = msg;
    // Capacity is reported ahead of any length problem.
    if role == Role::Admin {
        let admins = db.send(SpanMessage::new(AdminCount)).await??;
        if admins >= 1 {
            return Err(Rejection::AdminCapacityReached.into());
        }
    }
    check_credentials(role, &credentials)?;
    let account = db
        .send(SpanMessage::new(RegisterAccount(role, credentials)))
        .await??;
    info!(role = %account.role, name = account.name.as_str(), "Account registered");
    Ok(account)
}

message_handler_with_span! {
    impl SpanHandler<Register> for AccountActor {
        type Result = ResponseActFuture<Self, <Register as Message>::Result>;

        fn handle(&mut self, msg: Register, _ctx: &mut Context<Self>, _span: Span) -> Self::Result {
            debug!("Handling register");
            Box::pin(register(self.db.clone(), msg).interop_actor(&*self))
        }
    }
}

#[derive(Message, Clone, Debug)]
#[rtype(result = "Result<SignedIn, Report>")]
pub struct SignIn {
    pub role: Role,
    pub credentials: Credentials,
}

#[instrument(skip(db))]
async fn sign_in(db: Addr<DbExecutor>, msg: SignIn) -> Result<SignedIn, Report> {
    let SignIn { role, credentials } = msg;
    check_credentials(role, &credentials)?;
    let account = db
        .send(SpanMessage::new(AccountByCredentials(role, credentials)))
        .await??
        .ok_or(Rejection::InvalidCredentials)?;
    let session = db
        .send(SpanMessage::new(SaveSession(account.clone())))
        .await??;
    info!(
        session_id = session.id.as_string().as_str(),
        role = %account.role,
        "Signed in"
    );
    Ok((session, account))
}

message_handler_with_span! {
    impl SpanHandler<SignIn> for AccountActor {
        type Result = ResponseActFuture<Self, <SignIn as Message>::Result>;

        fn handle(&mut self, msg: SignIn, _ctx: &mut Context<Self>, _span: Span) -> Self::Result {
            debug!("Handling sign in");
            Box::pin(sign_in(self.db.clone(), msg).interop_actor(&*self))
        }
    }
}

#[derive(Message, Clone, Debug)]
#[rtype(result = "Result<SignedIn, Report>")]
pub struct Resume(pub SessionId);

#[instrument(skip(db))]
async fn resume(db: Addr<DbExecutor>, msg: Resume) -> Result<SignedIn, Report> {
    let signed_in = db
        .send(SpanMessage::new(SessionById(msg.0)))
        .await??
        .ok_or(Rejection::UnknownSession)?;
    debug!(name = signed_in.1.name.as_str(), "Session resumed");
    Ok(signed_in)
}

message_handler_with_span! {
    impl SpanHandler<Resume> for AccountActor {
        type Result = ResponseActFuture<Self, <Resume as Message>::Result>;

        fn handle(&mut self, msg: Resume, _ctx: &mut Context<Self>, _span: Span) -> Self::Result {
            debug!("Handling resume");
            Box::pin(resume(self.db.clone(), msg).interop_actor(&*self))
        }
    }
}

/// Signing out always succeeds, with or without a stored session.
#[derive(Message, Clone, Debug)]
#[rtype(result = "Result<(), Report>")]
pub struct SignOut(pub Option<SessionId>);

#[instrument(skip(db))]
async fn sign_out(db: Addr<DbExecutor>, msg: SignOut) -> Result<(), Report> {
    if let Some(session_id) = msg.0 {
        let deleted = db.send(SpanMessage::new(DeleteSession(session_id))).await??;
        debug!(deleted, "Session cleared");
    }
    Ok(())
}

message_handler_with_span! {
    impl SpanHandler<SignOut> for AccountActor {
        type Result = ResponseActFuture<Self, <SignOut as Message>::Result>;

        fn handle(&mut self, msg: SignOut, _ctx: &mut Context<Self>, _span: Span) -> Self::Result {
            debug!("Handling sign out");
            Box::pin(sign_out(self.db.clone(), msg).interop_actor(&*self))
        }
    }
}
