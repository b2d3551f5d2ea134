//! End-to-end tests for the notifier: transport selection from a TOML
//! config, callback delivery, and SMTP failures reaching the caller.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::timeout;

use buildmail_notify::{
    format_stdmerged, Email, MailError, MailerConfig, NoDiscovery, Notifier, SendResult,
    SmtpConfig, SmtpSecurity, TransportKind,
};

const TIMEOUT: Duration = Duration::from_secs(15);

fn notifier_from_toml(toml: &str) -> Notifier {
    let config = MailerConfig::from_toml_str(toml).unwrap();
    Notifier::with_discovery(config, &NoDiscovery)
}

#[tokio::test]
async fn stub_config_returns_json_description() {
    let notifier = notifier_from_toml("stubSmtp = true\n");
    assert_eq!(notifier.transport_kind(), TransportKind::Stub);

    let log = "\u{1b}[32m> npm test\u{1b}[0m\n\n12 passing\n";
    let email = Email::new("dev@example.com, lead@example.com", "[PASS] widgets #42")
        .from("ci@example.com")
        .text(format_stdmerged(log, "plaintext"))
        .html(format_stdmerged(log, "html"));

    let response = timeout(TIMEOUT, notifier.send(email))
        .await
        .expect("send timed out")
        .unwrap();

    let json: serde_json::Value = serde_json::from_str(&response.message.unwrap()).unwrap();
    assert_eq!(json["from"], "ci@example.com");
    assert_eq!(json["to"].as_array().unwrap().len(), 2);
    assert_eq!(json["text"], " > npm test\n \n 12 passing\n");
    assert_eq!(json["html"], " > npm test<br>\n <br>\n 12 passing<br>\n");
}

#[tokio::test]
async fn unconfigured_notifier_calls_back_with_success() {
    let notifier = notifier_from_toml("");
    assert_eq!(notifier.transport_kind(), TransportKind::Noop);

    let results: Arc<Mutex<Vec<SendResult>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&results);
    let handle = notifier.send_with(
        Email::new("dev@example.com", "[FAIL] widgets #43").text("boom"),
        move |result| sink.lock().unwrap().push(result),
    )
    .unwrap();
    timeout(TIMEOUT, handle).await.expect("callback timed out").unwrap();

    let results = results.lock().unwrap();
    assert_eq!(results.len(), 1);
    let response = results[0].as_ref().unwrap();
    assert!(response.message.is_none());
}

#[tokio::test]
async fn many_concurrent_sends_all_complete() {
    let notifier = notifier_from_toml("stubSmtp = true\n");

    let handles: Vec<_> = (0..16)
        .map(|i| notifier.send(Email::new("dev@example.com", format!("job #{i}")).from("ci@example.com")))
        .collect();

    for handle in handles {
        let response = timeout(TIMEOUT, handle).await.expect("send timed out").unwrap();
        assert!(response.message_id.is_some());
    }
}

#[tokio::test]
async fn smtp_connection_failure_reaches_the_caller() {
    // Nothing listens on port 1; the connection is refused.
    let mut smtp = SmtpConfig::new("127.0.0.1", 1);
    smtp.security = SmtpSecurity::None;
    smtp.timeout_secs = Some(5);
    smtp.from = Some("ci@example.com".to_string());

    let notifier = Notifier::with_discovery(
        MailerConfig {
            smtp: Some(smtp),
            ..MailerConfig::default()
        },
        &NoDiscovery,
    );
    assert_eq!(notifier.transport_kind(), TransportKind::ConfiguredSmtp);

    let (tx, rx) = tokio::sync::oneshot::channel();
    notifier
        .send_with(
            Email::new("dev@example.com", "[PASS] widgets #44").text("ok"),
            move |result| {
                let _ = tx.send(result);
            },
        )
        .unwrap();

    let result = timeout(TIMEOUT, rx).await.expect("callback timed out").unwrap();
    assert!(matches!(result, Err(MailError::Smtp(_))), "got: {result:?}");
}

#[tokio::test]
async fn smtp_without_sender_fails_before_connecting() {
    let notifier = notifier_from_toml(
        r#"
        [smtp]
        host = "127.0.0.1"
        port = "1"
        security = "none"
        "#,
    );

    let result = notifier
        .deliver(Email::new("dev@example.com", "no sender").text("ok"))
        .await;
    assert!(matches!(result, Err(MailError::Message(_))), "got: {result:?}");
}
