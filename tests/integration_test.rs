use actix_codec::{AsyncRead, AsyncWrite, Framed};
use actix_http::ws::{self, Codec};
use actix_web::App;
use base64::{engine::general_purpose::STANDARD, Engine};
use casinobet_server::{
    db::{
        store::Collection,
        transaction::{self, TransactionId, TransactionKind, TransactionStatus},
    },
    gate::View,
    receipt::{ReceiptUpload, MAX_RECEIPT_BYTES},
    rejection::{Field, Rejection},
    server,
    services::Services,
    websocket::{
        ErrorKind, IncomingCredentials, IncomingDecision, IncomingExport, IncomingImport,
        IncomingMessage, IncomingReconnect, IncomingSubmission, OutgoingError, OutgoingMessage,
        OutgoingSignedIn, PLACEHOLDER_TOKEN,
    },
};
use futures::{SinkExt, StreamExt};
use insta::assert_json_snapshot;
use integration_db::{
    IntegrationTestDb, ADMIN_IDENTIFIER, ADMIN_PASSWORD, USER_NAME, USER_PASSWORD,
};
use serde_json::json;
use std::time::Duration;
use tokio::time::timeout;

mod integration_db;

const READ_TIMEOUT_MS: u64 = 500;

macro_rules! frame_message_type {
    ($framed:expr, $message_type:path) => {
        match read_message($framed)
            .await
            .expect("Unable to read ws frame")
        {
            $message_type(message_type) => message_type,
            other => panic!("Wrong outgoing message type {:?}", other),
        }
    };
}

async fn read_message_within<T>(
    framed: &mut Framed<T, Codec>,
    millis: u64,
) -> Option<OutgoingMessage>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let frame = timeout(Duration::from_millis(millis), framed.next()).await;
    match frame.ok()??.unwrap() {
        ws::Frame::Text(item) => Some(serde_json::from_slice(&item[..]).unwrap()),
        _ => None,
    }
}

async fn read_message<T>(framed: &mut Framed<T, Codec>) -> Option<OutgoingMessage>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    read_message_within(framed, READ_TIMEOUT_MS).await
}

async fn send<T>(framed: &mut Framed<T, Codec>, message: IncomingMessage)
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let message = serde_json::to_string(&message).unwrap();
    framed.send(ws::Message::Text(message.into())).await.unwrap();
}

async fn read_error<T>(framed: &mut Framed<T, Codec>) -> OutgoingError
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    frame_message_type!(framed, OutgoingMessage::Error)
}

fn start_server(db: &IntegrationTestDb) -> actix_test::TestServer {
    let services = Services::start(db.pool());
    actix_test::start(move || {
        let services = services.clone();
        App::new().configure(move |app| server::configure(app, services))
    })
}

fn credentials(identifier: &str, password: &str, as_admin: bool) -> IncomingCredentials {
    IncomingCredentials {
        identifier: identifier.to_owned(),
        password: password.to_owned(),
        as_admin,
    }
}

async fn login<T>(
    framed: &mut Framed<T, Codec>,
    identifier: &str,
    password: &str,
    as_admin: bool,
) -> OutgoingSignedIn
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    send(
        framed,
        IncomingMessage::Login(credentials(identifier, password, as_admin)),
    )
    .await;
    frame_message_type!(framed, OutgoingMessage::SignedIn)
}

fn receipt(bytes: &[u8]) -> ReceiptUpload {
    ReceiptUpload {
        file_name: "pago.png".to_owned(),
        content_type: "image/png".to_owned(),
        data: STANDARD.encode(bytes),
    }
}

fn submission(kind: TransactionKind, student_name: &str) -> IncomingMessage {
    IncomingMessage::Submit(IncomingSubmission {
        kind,
        student_name: student_name.to_owned(),
        program: "Law".to_owned(),
        email: "ana@example.com".to_owned(),
        receipt: Some(receipt(b"fake png")),
    })
}

fn decide(transaction_id: TransactionId, approve: bool) -> IncomingMessage {
    IncomingMessage::Decide(IncomingDecision {
        transaction_id,
        approve,
    })
}

#[actix_rt::test]
async fn test_registration_and_bet_credit_votes() {
    let db = IntegrationTestDb::new().await;
    let mut srv = start_server(&db);
    let mut admin = srv.ws_at("/ws/").await.unwrap();
    let mut user = srv.ws_at("/ws/").await.unwrap();
    login(&mut admin, ADMIN_IDENTIFIER, ADMIN_PASSWORD, true).await;
    login(&mut user, USER_NAME, USER_PASSWORD, false).await;

    // Registration, approved by the admin
    send(&mut user, submission(TransactionKind::Registration, "Ana")).await;
    let submitted = frame_message_type!(&mut user, OutgoingMessage::Submitted);
    assert_eq!(submitted.status, TransactionStatus::Pending);
    assert_eq!(submitted.submitter_name, USER_NAME);
    assert!(submitted.receipt_content.starts_with("data:image/png;base64,"));
    let pending = frame_message_type!(&mut admin, OutgoingMessage::Transaction);
    assert_eq!(pending.id, submitted.id);

    send(&mut admin, decide(submitted.id.clone(), true)).await;
    for framed in [&mut admin, &mut user] {
        let decided = frame_message_type!(framed, OutgoingMessage::Decided);
        assert_eq!(decided.transaction.status, TransactionStatus::Approved);
        assert_eq!(decided.student.expect("student").vote_count, 1);
    }

    // Bet on the registered student
    send(&mut user, submission(TransactionKind::Bet, "Ana")).await;
    let submitted = frame_message_type!(&mut user, OutgoingMessage::Submitted);
    frame_message_type!(&mut admin, OutgoingMessage::Transaction);
    send(&mut admin, decide(submitted.id, true)).await;
    let decided = frame_message_type!(&mut admin, OutgoingMessage::Decided);
    assert_eq!(decided.student.expect("student").vote_count, 2);
    frame_message_type!(&mut user, OutgoingMessage::Decided);

    send(&mut user, IncomingMessage::Leaderboard).await;
    let leaderboard = read_message(&mut user).await.expect("leaderboard");
    assert_json_snapshot!(leaderboard, { ".**.id" => "[uuid]" }, @r###"
    {
      "type": "leaderboard",
      "students": [
        {
          "id": "[uuid]",
          "name": "Ana",
          "program": "Law",
          "vote_count": 2
        }
      ]
    }
    "###);
}

#[actix_rt::test]
async fn test_decisions_reach_signed_in_clients_only() {
    let db = IntegrationTestDb::new().await;
    let mut srv = start_server(&db);
    let mut admin = srv.ws_at("/ws/").await.unwrap();
    let mut submitter = srv.ws_at("/ws/").await.unwrap();
    let mut bystander = srv.ws_at("/ws/").await.unwrap();
    let mut anonymous = srv.ws_at("/ws/").await.unwrap();
    login(&mut admin, ADMIN_IDENTIFIER, ADMIN_PASSWORD, true).await;
    login(&mut submitter, USER_NAME, USER_PASSWORD, false).await;
    send(
        &mut bystander,
        IncomingMessage::Register(credentials("bea1", "secret2", false)),
    )
    .await;
    frame_message_type!(&mut bystander, OutgoingMessage::Registered);
    login(&mut bystander, "bea1", "secret2", false).await;

    send(&mut submitter, submission(TransactionKind::Registration, "Ana")).await;
    let submitted = frame_message_type!(&mut submitter, OutgoingMessage::Submitted);
    frame_message_type!(&mut admin, OutgoingMessage::Transaction);

    send(&mut admin, decide(submitted.id.clone(), true)).await;
    for framed in [&mut admin, &mut submitter] {
        let decided = frame_message_type!(framed, OutgoingMessage::Decided);
        assert_eq!(decided.transaction.id, submitted.id);
    }
    let tally = frame_message_type!(&mut bystander, OutgoingMessage::Tally);
    assert_eq!(tally.name, "Ana");
    assert_eq!(tally.vote_count, 1);
    assert_eq!(read_message(&mut anonymous).await, None);
}

#[actix_rt::test]
async fn test_rejected_submission_leaves_tally() {
    let db = IntegrationTestDb::new().await;
    let mut srv = start_server(&db);
    let mut admin = srv.ws_at("/ws/").await.unwrap();
    let mut user = srv.ws_at("/ws/").await.unwrap();
    login(&mut admin, ADMIN_IDENTIFIER, ADMIN_PASSWORD, true).await;
    login(&mut user, USER_NAME, USER_PASSWORD, false).await;

    send(&mut user, submission(TransactionKind::Registration, "Bea")).await;
    let submitted = frame_message_type!(&mut user, OutgoingMessage::Submitted);
    frame_message_type!(&mut admin, OutgoingMessage::Transaction);

    send(&mut admin, decide(submitted.id.clone(), false)).await;
    let decided = frame_message_type!(&mut admin, OutgoingMessage::Decided);
    assert_eq!(decided.transaction.status, TransactionStatus::Rejected);
    assert_eq!(decided.student, None);

    // A decided transaction stays decided
    send(&mut admin, decide(submitted.id.clone(), true)).await;
    let error = read_error(&mut admin).await;
    assert_eq!(error.kind, ErrorKind::Conflict);

    send(&mut admin, decide(TransactionId::new(), true)).await;
    let error = read_error(&mut admin).await;
    assert_eq!(error.kind, ErrorKind::NotFound);

    send(&mut admin, IncomingMessage::Students).await;
    let students = frame_message_type!(&mut admin, OutgoingMessage::Students);
    assert!(students.students.is_empty());
}

#[actix_rt::test]
async fn test_bet_on_unknown_student() {
    let db = IntegrationTestDb::new().await;
    let mut srv = start_server(&db);
    let mut user = srv.ws_at("/ws/").await.unwrap();
    login(&mut user, USER_NAME, USER_PASSWORD, false).await;

    send(&mut user, submission(TransactionKind::Bet, "Zoe")).await;
    let error = read_error(&mut user).await;
    assert_eq!(
        error,
        OutgoingError {
            kind: ErrorKind::Validation,
            message: Rejection::StudentNotFound("Zoe".to_owned()).to_string(),
        }
    );
    assert!(transaction::list(&db.pool(), None).await.unwrap().is_empty());
}

#[actix_rt::test]
async fn test_oversized_receipt() {
    let db = IntegrationTestDb::new().await;
    let mut srv = start_server(&db);
    let mut user = srv.ws_at("/ws/").await.unwrap();
    login(&mut user, USER_NAME, USER_PASSWORD, false).await;

    let mut message = submission(TransactionKind::Registration, "Ana");
    if let IncomingMessage::Submit(submission) = &mut message {
        submission.receipt = Some(receipt(&vec![0u8; MAX_RECEIPT_BYTES + 1]));
    }
    send(&mut user, message).await;
    let error = read_message_within(&mut user, 5_000)
        .await
        .expect("error reply");
    match error {
        OutgoingMessage::Error(error) => assert_eq!(error.kind, ErrorKind::Resource),
        other => panic!("Wrong outgoing message type {:?}", other),
    }
    assert!(transaction::list(&db.pool(), None).await.unwrap().is_empty());
}

#[actix_rt::test]
async fn test_register() {
    let db = IntegrationTestDb::empty().await;
    let mut srv = start_server(&db);
    let mut framed = srv.ws_at("/ws/").await.unwrap();

    send(
        &mut framed,
        IncomingMessage::Register(credentials("ad", "1234", true)),
    )
    .await;
    let error = read_error(&mut framed).await;
    assert_eq!(
        error,
        OutgoingError {
            kind: ErrorKind::Validation,
            message: Rejection::LengthOutOfRange {
                field: Field::AdminIdentifier,
                min: 3,
                max: 10,
            }
            .to_string(),
        }
    );

    send(
        &mut framed,
        IncomingMessage::Register(credentials("boss", "1234", true)),
    )
    .await;
    let registered = frame_message_type!(&mut framed, OutgoingMessage::Registered);
    assert_eq!(registered.name, "boss");

    // Capacity is reported even for otherwise invalid credentials
    for (identifier, password) in [("other", "5678"), ("ad", "1")] {
        send(
            &mut framed,
            IncomingMessage::Register(credentials(identifier, password, true)),
        )
        .await;
        let error = read_error(&mut framed).await;
        assert_eq!(error.kind, ErrorKind::Capacity);
    }

    send(
        &mut framed,
        IncomingMessage::Register(credentials("ana1", "secret1", false)),
    )
    .await;
    frame_message_type!(&mut framed, OutgoingMessage::Registered);
    send(
        &mut framed,
        IncomingMessage::Register(credentials("ana1", "secret2", false)),
    )
    .await;
    let error = read_error(&mut framed).await;
    assert_eq!(
        error.message,
        Rejection::DuplicateUserName("ana1".to_owned()).to_string()
    );
}

#[actix_rt::test]
async fn test_login_rejections() {
    let db = IntegrationTestDb::new().await;
    let mut srv = start_server(&db);
    let mut framed = srv.ws_at("/ws/").await.unwrap();

    // User credentials are not admin credentials
    send(
        &mut framed,
        IncomingMessage::Login(credentials(USER_NAME, "secret1", true)),
    )
    .await;
    assert_eq!(read_error(&mut framed).await.kind, ErrorKind::Authentication);

    send(
        &mut framed,
        IncomingMessage::Login(credentials(USER_NAME, "wrong12", false)),
    )
    .await;
    assert_eq!(read_error(&mut framed).await.kind, ErrorKind::Authentication);

    send(
        &mut framed,
        IncomingMessage::Login(credentials(USER_NAME, "short", false)),
    )
    .await;
    assert_eq!(read_error(&mut framed).await.kind, ErrorKind::Validation);
}

#[actix_rt::test]
async fn test_gate_redirects() {
    let db = IntegrationTestDb::new().await;
    let mut srv = start_server(&db);
    let mut framed = srv.ws_at("/ws/").await.unwrap();

    send(&mut framed, IncomingMessage::Students).await;
    let redirect = frame_message_type!(&mut framed, OutgoingMessage::Redirect);
    assert_eq!(redirect.view, View::Login);

    login(&mut framed, USER_NAME, USER_PASSWORD, false).await;
    send(&mut framed, decide(TransactionId::new(), true)).await;
    let redirect = frame_message_type!(&mut framed, OutgoingMessage::Redirect);
    assert_eq!(redirect.view, View::Dashboard);

    send(
        &mut framed,
        IncomingMessage::Export(IncomingExport {
            collection: Collection::Users,
        }),
    )
    .await;
    let redirect = frame_message_type!(&mut framed, OutgoingMessage::Redirect);
    assert_eq!(redirect.view, View::Dashboard);

    send(&mut framed, IncomingMessage::Students).await;
    frame_message_type!(&mut framed, OutgoingMessage::Students);
}

#[actix_rt::test]
async fn test_reconnect() {
    let db = IntegrationTestDb::new().await;
    let mut srv = start_server(&db);
    let mut framed = srv.ws_at("/ws/").await.unwrap();
    let signed_in = login(&mut framed, USER_NAME, USER_PASSWORD, false).await;
    assert_eq!(signed_in.token, PLACEHOLDER_TOKEN);

    // Reload
    let mut framed = srv.ws_at("/ws/").await.unwrap();
    send(
        &mut framed,
        IncomingMessage::Reconnect(IncomingReconnect {
            session_id: signed_in.session_id.clone(),
        }),
    )
    .await;
    let message = read_message(&mut framed).await.expect("signed in");
    assert_json_snapshot!(message, {
        ".session_id" => "[uuid]",
        ".user.id" => "[uuid]",
    }, @r###"
    {
      "type": "signed_in",
      "session_id": "[uuid]",
      "token": "eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9...",
      "user": {
        "id": "[uuid]",
        "name": "ana1",
        "role": "user"
      }
    }
    "###);
    match message {
        OutgoingMessage::SignedIn(resumed) => assert_eq!(resumed.session_id, signed_in.session_id),
        other => panic!("Wrong outgoing message type {:?}", other),
    }

    send(&mut framed, IncomingMessage::Logout).await;
    assert_eq!(
        read_message(&mut framed).await,
        Some(OutgoingMessage::SignedOut)
    );
    send(&mut framed, IncomingMessage::Students).await;
    let redirect = frame_message_type!(&mut framed, OutgoingMessage::Redirect);
    assert_eq!(redirect.view, View::Login);

    let mut framed = srv.ws_at("/ws/").await.unwrap();
    send(
        &mut framed,
        IncomingMessage::Reconnect(IncomingReconnect {
            session_id: signed_in.session_id,
        }),
    )
    .await;
    assert_eq!(read_error(&mut framed).await.kind, ErrorKind::Authentication);
}

#[actix_rt::test]
async fn test_import_and_export() {
    let db = IntegrationTestDb::new().await;
    let mut srv = start_server(&db);
    let mut admin = srv.ws_at("/ws/").await.unwrap();
    login(&mut admin, ADMIN_IDENTIFIER, ADMIN_PASSWORD, true).await;

    send(
        &mut admin,
        IncomingMessage::Import(IncomingImport {
            collection: Collection::Students,
            records: vec![
                json!({"name": "Ana", "program": "Law", "vote_count": 3}),
                json!({"name": "Bea", "program": "Art", "vote_count": 5}),
                json!({"name": "Cid", "program": "Law", "vote_count": 3}),
            ],
        }),
    )
    .await;
    let imported = frame_message_type!(&mut admin, OutgoingMessage::Imported);
    assert_eq!(imported.count, 3);

    send(&mut admin, IncomingMessage::Leaderboard).await;
    let leaderboard = frame_message_type!(&mut admin, OutgoingMessage::Leaderboard);
    let names: Vec<&str> = leaderboard
        .students
        .iter()
        .map(|student| student.name.as_str())
        .collect();
    assert_eq!(names, vec!["Bea", "Ana", "Cid"]);

    // Malformed records leave the collection as it was
    send(
        &mut admin,
        IncomingMessage::Import(IncomingImport {
            collection: Collection::Students,
            records: vec![json!({"name": "Dan"})],
        }),
    )
    .await;
    assert_eq!(read_error(&mut admin).await.kind, ErrorKind::Validation);

    send(
        &mut admin,
        IncomingMessage::Export(IncomingExport {
            collection: Collection::Students,
        }),
    )
    .await;
    let records = frame_message_type!(&mut admin, OutgoingMessage::Records);
    assert_eq!(records.collection, Collection::Students);
    assert_eq!(records.records.len(), 3);
    assert_eq!(records.records[0]["name"], "Ana");

    send(
        &mut admin,
        IncomingMessage::Export(IncomingExport {
            collection: Collection::Users,
        }),
    )
    .await;
    let records = frame_message_type!(&mut admin, OutgoingMessage::Records);
    assert_eq!(records.records[0]["identifier"], USER_NAME);
}
