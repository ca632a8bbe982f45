//! End-to-end release engine tests against a scripted IMAP server.

mod common;

use std::sync::Arc;

use chrono::{Duration, Utc};
use mailscreen_core::account::{Account, AccountRepository, CredentialVault, Security};
use mailscreen_core::{
    InterceptState, InterceptedMessage, MessageRepository, ReleaseError, ReleaseRequest,
    release_message,
};

use common::{ScriptedServer, ServerScript};

const KEY: [u8; 32] = [9u8; 32];

fn three_part_raw() -> Vec<u8> {
    b"From: sender@example.com\r\n\
      To: victim@example.com\r\n\
      Subject: INVOICE 42\r\n\
      Message-ID: <orig@example.com>\r\n\
      Content-Type: multipart/mixed; boundary=XYZ\r\n\
      \r\n\
      --XYZ\r\n\
      Content-Type: text/plain; charset=utf-8\r\n\
      \r\n\
      please pay\r\n\
      --XYZ\r\n\
      Content-Type: text/html; charset=utf-8\r\n\
      \r\n\
      <p>please pay</p>\r\n\
      --XYZ\r\n\
      Content-Type: application/pdf; name=invoice.pdf\r\n\
      Content-Disposition: attachment; filename=\"invoice.pdf\"\r\n\
      Content-Transfer-Encoding: base64\r\n\
      \r\n\
      JVBERi0xLjQ=\r\n\
      --XYZ--\r\n"
        .to_vec()
}

struct Fixture {
    server: ScriptedServer,
    accounts: Arc<AccountRepository>,
    messages: Arc<MessageRepository>,
    vault: CredentialVault,
    message_id: mailscreen_core::MessageId,
}

async fn fixture(script: ServerScript) -> Fixture {
    let server = ScriptedServer::spawn(script).await;

    let vault = CredentialVault::from_key(&KEY).expect("vault");
    let accounts = Arc::new(AccountRepository::in_memory().await.expect("accounts"));
    let messages = Arc::new(MessageRepository::in_memory().await.expect("messages"));

    let mut account = Account {
        email: "victim@example.com".to_string(),
        ..Account::default()
    };
    account.imap.host = server.addr.ip().to_string();
    account.imap.port = server.addr.port();
    account.imap.security = Security::None;
    account.imap.username = "victim@example.com".to_string();
    account.encrypted_secret = vault.encrypt("secret").expect("encrypt");
    accounts.save(&mut account).await.expect("save account");

    let captured_at = Utc::now() - Duration::milliseconds(5000);
    let mut msg = InterceptedMessage::captured(
        account.id.expect("account id"),
        42,
        three_part_raw(),
        captured_at,
    );
    msg.subject = "INVOICE 42".to_string();
    msg.sender = "sender@example.com".to_string();
    msg.recipients = vec!["victim@example.com".to_string()];
    let message_id = messages.insert(&mut msg).await.expect("insert");
    messages.mark_held(message_id).await.expect("mark held");

    Fixture {
        server,
        accounts,
        messages,
        vault,
        message_id,
    }
}

#[tokio::test]
async fn release_applies_edits_and_strips_attachments() {
    let fx = fixture(ServerScript::default()).await;

    let request = ReleaseRequest {
        target_folder: "INBOX".to_string(),
        edited_subject: Some("[EDITED] INVOICE 42".to_string()),
        edited_body: Some("do not pay".to_string()),
        strip_attachments: true,
    };

    let outcome = release_message(
        &fx.accounts,
        &fx.messages,
        &fx.vault,
        fx.message_id,
        request,
    )
    .await
    .expect("release");

    assert_eq!(outcome.released_to, "INBOX");
    assert_eq!(outcome.attachments_removed, vec!["invoice.pdf".to_string()]);

    // The appended message reflects the edits, not the original capture.
    let appended = fx.server.appended.lock().expect("appended").clone();
    assert_eq!(appended.len(), 1, "exactly one append");
    let delivered = mailscreen_mime::Message::parse(&appended[0]).expect("parse appended");
    assert_eq!(delivered.subject(), Some("[EDITED] INVOICE 42"));
    let text = delivered.body_text().expect("text body");
    assert!(text.starts_with("do not pay"));
    assert!(text.contains("[Attachments removed: invoice.pdf]"));
    assert_eq!(
        delivered.message_id(),
        Some(outcome.released_message_id.as_str()),
        "re-delivery carries the new message id"
    );

    // APPEND preserved the original internal date.
    let appends = fx.server.commands_containing("APPEND");
    assert_eq!(appends.len(), 1);
    assert!(appends[0].contains('"'), "internal date passed: {}", appends[0]);

    // Row is terminal with derived latency.
    let row = fx.messages.get(fx.message_id).await.expect("get").expect("row");
    assert_eq!(row.state, InterceptState::Released);
    assert_eq!(
        row.released_message_id.as_deref(),
        Some(outcome.released_message_id.as_str())
    );
    let latency = row.latency_ms.expect("latency");
    assert!((latency - 5000).abs() < 1000, "latency ~5000ms, got {latency}");

    // Best-effort quarantine cleanup ran.
    assert!(!fx.server.commands_containing("UID STORE 42").is_empty());
}

#[tokio::test]
async fn second_release_is_a_no_op_with_no_second_delivery() {
    let fx = fixture(ServerScript::default()).await;

    release_message(
        &fx.accounts,
        &fx.messages,
        &fx.vault,
        fx.message_id,
        ReleaseRequest::default(),
    )
    .await
    .expect("first release");

    let err = release_message(
        &fx.accounts,
        &fx.messages,
        &fx.vault,
        fx.message_id,
        ReleaseRequest::default(),
    )
    .await
    .expect_err("second release must conflict");

    assert!(matches!(err, ReleaseError::AlreadyReleased));
    assert_eq!(
        fx.server.appended.lock().expect("appended").len(),
        1,
        "exactly one append to the target folder"
    );
}

#[tokio::test]
async fn failed_append_leaves_row_held_for_retry() {
    let fx = fixture(ServerScript {
        fail_append: true,
        ..ServerScript::default()
    })
    .await;

    let err = release_message(
        &fx.accounts,
        &fx.messages,
        &fx.vault,
        fx.message_id,
        ReleaseRequest::default(),
    )
    .await
    .expect_err("append must fail");
    assert!(matches!(err, ReleaseError::AppendFailed(_)));

    let row = fx.messages.get(fx.message_id).await.expect("get").expect("row");
    assert_eq!(row.state, InterceptState::Held, "row stays held for retry");
    assert!(row.released_message_id.is_none());
}

#[tokio::test]
async fn corrupt_secret_is_a_data_error_not_a_transport_error() {
    let fx = fixture(ServerScript::default()).await;

    // Overwrite the account secret with garbage the vault cannot decrypt.
    let mut account = fx
        .accounts
        .list()
        .await
        .expect("list")
        .pop()
        .expect("account");
    account.encrypted_secret = "corrupted".to_string();
    fx.accounts.save(&mut account).await.expect("save");

    let err = release_message(
        &fx.accounts,
        &fx.messages,
        &fx.vault,
        fx.message_id,
        ReleaseRequest::default(),
    )
    .await
    .expect_err("release must fail");
    assert!(matches!(err, ReleaseError::SecretUnavailable));

    // No connection was opened at all.
    assert!(fx.server.commands.lock().expect("commands").is_empty());
}

#[tokio::test]
async fn release_uses_persisted_edits_when_request_has_none() {
    let fx = fixture(ServerScript::default()).await;

    mailscreen_core::edit_held_message(
        &fx.messages,
        fx.message_id,
        Some("[SCREENED] INVOICE 42"),
        Some("screened body"),
        None,
    )
    .await
    .expect("edit");

    release_message(
        &fx.accounts,
        &fx.messages,
        &fx.vault,
        fx.message_id,
        ReleaseRequest::default(),
    )
    .await
    .expect("release");

    let appended = fx.server.appended.lock().expect("appended").clone();
    let delivered = mailscreen_mime::Message::parse(&appended[0]).expect("parse");
    assert_eq!(delivered.subject(), Some("[SCREENED] INVOICE 42"));
    assert!(delivered.body_text().expect("text").starts_with("screened body"));
}
