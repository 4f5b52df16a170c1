//! End-to-end link lifecycle against the in-memory collaborators.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use memlink_identity::SequentialAssigner;
use memlink_linker::{Linker, LinkerConfig, LinkerError, LinkEvent};
use memlink_provenance::{DisplayProvenance, LedgerConfirmation};
use memlink_registry::{InMemoryMemoryStore, RegistryError};
use memlink_store::{InMemoryMessageStore, MessageStore, StoreError};
use memlink_types::{
    ConversationId, LedgerUrl, MemoryId, MessageDraft, MessageId, PersistedMessage,
    ProvenanceKind, Role,
};
use tokio::sync::broadcast;

struct Fixture {
    linker: Arc<Linker>,
    store: Arc<InMemoryMessageStore>,
}

fn fixture(timeout_secs: u64) -> Fixture {
    let mut config = LinkerConfig::default();
    config.link.timeout_secs = timeout_secs;
    config.link.sweep_interval_ms = 100;

    let memories = Arc::new(InMemoryMemoryStore::with_memories(
        ["mem1", "mem2", "mem3"].into_iter().map(MemoryId::from),
    ));
    let store = Arc::new(InMemoryMessageStore::new());
    let linker = Linker::new(config, memories, store.clone())
        .with_assigner(Arc::new(SequentialAssigner::new("m")));

    Fixture {
        linker: Arc::new(linker),
        store,
    }
}

fn url(s: &str) -> LedgerUrl {
    LedgerUrl::parse(s).unwrap()
}

fn conv() -> ConversationId {
    ConversationId::from("c1")
}

async fn next_for(events: &mut broadcast::Receiver<LinkEvent>, id: &MessageId) -> LinkEvent {
    loop {
        let event = events.recv().await.unwrap();
        if event.message_id() == Some(id) {
            return event;
        }
    }
}

#[tokio::test]
async fn link_then_confirm_reaches_confirmed() {
    let fx = fixture(30);
    let handle = fx.linker.clone().spawn();
    let mut events = fx.linker.subscribe();

    let message = fx
        .linker
        .create_message(&conv(), MessageDraft::new(Role::User, "hi"))
        .await
        .unwrap();
    let id = message.id().clone();
    assert_eq!(id.as_str(), "m1");
    assert_eq!(message.state(), ProvenanceKind::Unlinked);

    fx.linker.request_link(&id, &MemoryId::from("mem1")).await.unwrap();
    assert!(matches!(next_for(&mut events, &id).await, LinkEvent::Requested { .. }));
    assert_eq!(
        fx.linker.get(&id).await.unwrap().state(),
        ProvenanceKind::Pending
    );

    handle
        .confirm(LedgerConfirmation::complete(
            MemoryId::from("mem1"),
            url("e://1"),
            url("t://1"),
        ))
        .await
        .unwrap();
    assert!(matches!(next_for(&mut events, &id).await, LinkEvent::Confirmed { .. }));

    let confirmed = fx.linker.get(&id).await.unwrap();
    assert_eq!(confirmed.state(), ProvenanceKind::Confirmed);
    assert_eq!(
        fx.linker.display(&id).await.unwrap(),
        DisplayProvenance::Ledger {
            entity_url: "e://1".to_string(),
            transaction_url: "t://1".to_string(),
        }
    );

    handle.shutdown().await;
}

#[tokio::test]
async fn relinking_fails_closed() {
    let fx = fixture(30);
    let id = fx
        .linker
        .create_message(&conv(), MessageDraft::user("hi"))
        .await
        .unwrap()
        .id()
        .clone();

    fx.linker.request_link(&id, &MemoryId::from("mem1")).await.unwrap();
    let err = fx
        .linker
        .request_link(&id, &MemoryId::from("mem2"))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        LinkerError::Registry(RegistryError::AlreadyLinked {
            message_id: id.clone(),
            memory_id: MemoryId::from("mem1"),
        })
    );
    assert_eq!(
        fx.linker.get(&id).await.unwrap().memory_id(),
        Some(&MemoryId::from("mem1"))
    );
}

#[tokio::test]
async fn missing_memory_is_distinct_from_already_linked() {
    let fx = fixture(30);
    let id = fx
        .linker
        .create_message(&conv(), MessageDraft::user("hi"))
        .await
        .unwrap()
        .id()
        .clone();

    let err = fx
        .linker
        .request_link(&id, &MemoryId::from("nope"))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        LinkerError::Registry(RegistryError::MemoryNotFound(MemoryId::from("nope")))
    );
    assert_eq!(
        fx.linker.get(&id).await.unwrap().state(),
        ProvenanceKind::Unlinked
    );
}

#[tokio::test(start_paused = true)]
async fn pending_link_times_out_and_late_confirmation_is_stale() {
    let fx = fixture(5);
    let handle = fx.linker.clone().spawn();
    let mut events = fx.linker.subscribe();

    let id = fx
        .linker
        .create_message(&conv(), MessageDraft::assistant("hello"))
        .await
        .unwrap()
        .id()
        .clone();
    fx.linker.request_link(&id, &MemoryId::from("mem1")).await.unwrap();

    assert!(matches!(next_for(&mut events, &id).await, LinkEvent::Requested { .. }));
    assert_eq!(
        next_for(&mut events, &id).await,
        LinkEvent::TimedOut {
            message_id: id.clone(),
            memory_id: MemoryId::from("mem1"),
        }
    );

    let reverted = fx.linker.get(&id).await.unwrap();
    assert_eq!(reverted.state(), ProvenanceKind::Unlinked);
    assert!(reverted.memory_id().is_none());
    assert!(fx.linker.registry().is_empty().unwrap());

    handle
        .confirm(LedgerConfirmation::complete(
            MemoryId::from("mem1"),
            url("e://late"),
            url("t://late"),
        ))
        .await
        .unwrap();
    loop {
        if let LinkEvent::StaleConfirmation { memory_id } = events.recv().await.unwrap() {
            assert_eq!(memory_id, MemoryId::from("mem1"));
            break;
        }
    }
    assert_eq!(
        fx.linker.get(&id).await.unwrap().state(),
        ProvenanceKind::Unlinked
    );

    // Recoverable: the message can be linked again.
    fx.linker.request_link(&id, &MemoryId::from("mem2")).await.unwrap();

    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn link_and_wait_returns_confirmed_message() {
    let fx = fixture(30);
    let handle = fx.linker.clone().spawn();
    let id = fx
        .linker
        .create_message(&conv(), MessageDraft::user("hi"))
        .await
        .unwrap()
        .id()
        .clone();

    let ledger = handle.confirmations();
    let mem1 = MemoryId::from("mem1");
    let (linked, sent) = tokio::join!(
        fx.linker.link_and_wait(&id, &mem1),
        async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            ledger
                .send(LedgerConfirmation::transaction_only(
                    MemoryId::from("mem1"),
                    url("t://1"),
                ))
                .await?;
            ledger
                .send(LedgerConfirmation::entity_only(
                    MemoryId::from("mem1"),
                    url("e://1"),
                ))
                .await
        }
    );

    sent.unwrap();
    let message = linked.unwrap();
    assert_eq!(message.state(), ProvenanceKind::Confirmed);

    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn link_and_wait_times_out_without_background_task() {
    let fx = fixture(2);
    let id = fx
        .linker
        .create_message(&conv(), MessageDraft::user("hi"))
        .await
        .unwrap()
        .id()
        .clone();

    let err = fx
        .linker
        .link_and_wait(&id, &MemoryId::from("mem3"))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        LinkerError::LinkTimeout {
            message_id: id.clone(),
            memory_id: MemoryId::from("mem3"),
        }
    );
    assert_eq!(
        fx.linker.get(&id).await.unwrap().state(),
        ProvenanceKind::Unlinked
    );
    assert_eq!(fx.linker.pending_count().await, 0);
}

fn persisted(value: serde_json::Value) -> PersistedMessage {
    serde_json::from_value(value).unwrap()
}

#[tokio::test]
async fn legacy_import_resolves_and_rejects_backfill() {
    let fx = fixture(30);
    let report = fx
        .linker
        .import(
            &conv(),
            vec![
                persisted(serde_json::json!({
                    "id": "old-1",
                    "content": "legacy",
                    "role": "assistant",
                    "timestamp": "2023-06-01T12:00:00Z",
                    "memoryId": "mem-old",
                    "legacyExplorerUrl": "https://explorer/old-1"
                })),
                persisted(serde_json::json!({
                    "id": "old-2",
                    "content": "migrated",
                    "role": "user",
                    "timestamp": "2023-06-01T12:00:01Z",
                    "memoryId": "mem-new",
                    "legacyExplorerUrl": "https://explorer/old-2",
                    "entityUrl": "e://2",
                    "transactionUrl": "t://2"
                })),
            ],
        )
        .await
        .unwrap();
    assert_eq!(report.imported.len(), 2);
    assert_eq!(report.shadowed_legacy, vec![MessageId::from("old-2")]);

    let legacy = MessageId::from("old-1");
    assert_eq!(
        fx.linker.display(&legacy).await.unwrap(),
        DisplayProvenance::Legacy {
            explorer_url: "https://explorer/old-1".to_string(),
        }
    );
    assert!(matches!(
        fx.store
            .update_provenance(&legacy, url("e://x"), url("t://x"))
            .await,
        Err(StoreError::InvalidState { .. })
    ));
    assert!(matches!(
        fx.linker.unlink(&legacy).await,
        Err(LinkerError::Store(StoreError::InvalidState { .. }))
    ));

    // Entity reference wins over the legacy URL.
    assert!(matches!(
        fx.linker.display(&MessageId::from("old-2")).await.unwrap(),
        DisplayProvenance::Ledger { ref entity_url, .. } if entity_url == "e://2"
    ));

    // Imported links are restored into the registry.
    assert_eq!(
        fx.linker
            .registry()
            .message_for(&MemoryId::from("mem-old"))
            .unwrap(),
        Some(legacy.clone())
    );
    assert!(matches!(
        fx.linker.request_link(&legacy, &MemoryId::from("mem1")).await,
        Err(LinkerError::Registry(RegistryError::AlreadyLinked { .. }))
    ));
}

#[tokio::test]
async fn history_and_export_follow_timestamps() {
    let fx = fixture(30);
    let base = chrono::DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
        .unwrap()
        .with_timezone(&chrono::Utc);

    for (content, offset) in [("third", 3), ("first", 1), ("second", 2)] {
        fx.linker
            .create_message(
                &conv(),
                MessageDraft::user(content).at(base + chrono::Duration::seconds(offset)),
            )
            .await
            .unwrap();
    }

    let history = fx
        .linker
        .history(&conv(), memlink_store::QueryWindow::all())
        .await
        .unwrap();
    let contents: Vec<&str> = history.iter().map(|m| m.content()).collect();
    assert_eq!(contents, vec!["first", "second", "third"]);

    let exported = fx.linker.export(&conv()).await.unwrap();
    assert_eq!(exported.len(), 3);
    assert!(exported.iter().all(|r| r.memory_id.is_none()));
}

#[tokio::test]
async fn created_ids_skip_imported_ones() {
    let fx = fixture(30);
    let report = fx
        .linker
        .import(
            &conv(),
            vec![persisted(serde_json::json!({
                "id": "m1",
                "content": "from an earlier session",
                "role": "user",
                "timestamp": "2024-01-01T00:00:00Z"
            }))],
        )
        .await
        .unwrap();
    assert_eq!(report.imported, vec![MessageId::from("m1")]);

    let created = fx
        .linker
        .create_message(&conv(), MessageDraft::user("new"))
        .await
        .unwrap();
    assert_eq!(created.id().as_str(), "m2");
    assert_eq!(
        fx.linker.get(&MessageId::from("m1")).await.unwrap().content(),
        "from an earlier session"
    );
}

#[tokio::test]
async fn create_reassigns_when_id_is_already_stored() {
    let fx = fixture(30);
    fx.linker
        .create_message(&conv(), MessageDraft::user("first"))
        .await
        .unwrap();

    // Second linker over the same store with its own fresh sequence.
    let other = Linker::new(
        LinkerConfig::default(),
        Arc::new(InMemoryMemoryStore::new()),
        fx.store.clone(),
    )
    .with_assigner(Arc::new(SequentialAssigner::new("m")));

    let created = other
        .create_message(&conv(), MessageDraft::user("second"))
        .await
        .unwrap();
    assert_eq!(created.id().as_str(), "m2");
    assert_eq!(fx.store.len().unwrap(), 2);
    assert_eq!(
        fx.linker.get(&MessageId::from("m1")).await.unwrap().content(),
        "first"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_creates_get_distinct_ids() {
    let fx = fixture(30);
    let mut tasks = Vec::new();
    for i in 0..64 {
        let linker = fx.linker.clone();
        tasks.push(tokio::spawn(async move {
            linker
                .create_message(&conv(), MessageDraft::user(format!("msg {i}")))
                .await
                .unwrap()
                .id()
                .clone()
        }));
    }

    let mut seen = HashSet::new();
    for task in tasks {
        assert!(seen.insert(task.await.unwrap()));
    }
    assert_eq!(fx.store.len().unwrap(), 64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_links_on_one_message_have_one_winner() {
    let fx = fixture(30);
    let id = fx
        .linker
        .create_message(&conv(), MessageDraft::user("contested"))
        .await
        .unwrap()
        .id()
        .clone();

    let mut tasks = Vec::new();
    for memory in ["mem1", "mem2", "mem3"] {
        let linker = fx.linker.clone();
        let id = id.clone();
        tasks.push(tokio::spawn(async move {
            linker.request_link(&id, &MemoryId::from(memory)).await
        }));
    }

    let mut winners = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => winners += 1,
            Err(err) => assert!(matches!(
                err,
                LinkerError::Registry(RegistryError::AlreadyLinked { .. })
            )),
        }
    }
    assert_eq!(winners, 1);
    assert_eq!(fx.linker.pending_count().await, 1);
}

#[tokio::test]
async fn shutdown_closes_the_inbox() {
    let fx = fixture(30);
    let handle = fx.linker.clone().spawn();
    let ledger = handle.confirmations();

    handle.shutdown().await;

    let result = ledger
        .send(LedgerConfirmation::complete(
            MemoryId::from("mem1"),
            url("e://1"),
            url("t://1"),
        ))
        .await;
    assert!(result.is_err());
}
