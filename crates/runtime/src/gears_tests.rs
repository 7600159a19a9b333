// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_support::fixture;
use meridian_bus::Handler;
use meridian_core::{FakeClock, JobSource, JobStatus};
use meridian_sandbox::SecretsVault;

#[tokio::test]
async fn subjob_sink_creates_a_child_job() {
    let fx = fixture();
    let sink = SchedulerSubjobSink::new(fx.scheduler.clone());
    let parent = GearId::from_string("gear-files");

    sink.submit(&parent, "dig deeper into the report".to_string(), Map::new()).await;

    let pending = fx.store.jobs().list_by_status(JobStatus::Pending).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].source, JobSource::SubJob);
    assert_eq!(pending[0].user_id, "gear:gear-files");
    assert_eq!(pending[0].content, "dig deeper into the report");
}

#[tokio::test]
async fn command_handler_routes_journal_query() {
    let fx = fixture();

    struct FakeJournal;
    #[async_trait]
    impl Handler for FakeJournal {
        async fn handle(&self, message: Message) -> Result<Message, BusError> {
            let MessageBody::JournalQuery { text, .. } = &message.body else {
                return Err(BusError::handler(ErrorKind::Validation, "unexpected body"));
            };
            assert_eq!(text, "what happened yesterday");
            Ok(Message {
                id: "j-1".to_string(),
                correlation_id: message.correlation_id.clone(),
                timestamp: message.timestamp,
                from: ComponentId::Journal,
                to: message.from.clone(),
                body: MessageBody::JournalResult {
                    entries: vec![serde_json::json!({"fact": "rained"})],
                },
                job_id: None,
                signature: None,
            })
        }
    }
    fx.bus.register(ComponentId::Journal, Arc::new(FakeJournal));

    let handler = BusCommandHandler::new(fx.bus.clone());
    let mut params = Map::new();
    params.insert("text".to_string(), serde_json::json!("what happened yesterday"));
    let result = handler
        .run(&GearId::from_string("gear-x"), "journal.query", params)
        .await
        .unwrap();
    assert_eq!(result[0]["fact"], "rained");
}

#[tokio::test]
async fn command_handler_rejects_unknown_commands() {
    let fx = fixture();
    let handler = BusCommandHandler::new(fx.bus.clone());
    let err = handler
        .run(&GearId::from_string("gear-x"), "filesystem.format", Map::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SandboxError::Command { .. }));
}

#[tokio::test]
async fn gear_bus_handler_rejects_non_invoke_bodies() {
    let fx = fixture();
    let host = fx.driver.host.clone();
    let handler = GearBusHandler::new(host, FakeClock::new());

    let message = Message {
        id: "m".to_string(),
        correlation_id: "c".to_string(),
        timestamp: 1,
        from: ComponentId::Bridge,
        to: ComponentId::Gear(GearId::from_string("gear-x")),
        body: MessageBody::Ack,
        job_id: None,
        signature: None,
    };
    let err = handler.handle(message).await.unwrap_err();
    assert!(matches!(err, BusError::Handler { .. }));
}

#[tokio::test]
async fn verify_reply_rejects_unsigned_and_foreign_messages() {
    let fx = fixture();
    let handler = GearBusHandler::new(fx.driver.host.clone(), FakeClock::new());

    let unsigned = Message {
        id: "m".to_string(),
        correlation_id: "c".to_string(),
        timestamp: 1,
        from: ComponentId::Gear(GearId::from_string("gear-x")),
        to: ComponentId::Bridge,
        body: MessageBody::GearResult { result: serde_json::json!({"ok": true}) },
        job_id: None,
        signature: None,
    };
    assert!(!handler.verify_reply(&unsigned));

    let forged = Message { signature: Some("ab".repeat(32)), ..unsigned };
    assert!(!handler.verify_reply(&forged));
}

#[test]
fn deny_all_vault_denies() {
    let err = DenyAllVault
        .retrieve("API_TOKEN", &GearId::from_string("gear-x"))
        .unwrap_err();
    assert!(matches!(err, SandboxError::SecretDenied { .. }));
}
