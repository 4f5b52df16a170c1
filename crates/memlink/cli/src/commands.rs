//! Command implementations

use std::sync::Arc;

use anyhow::Context;
use memlink_linker::{LinkEvent, Linker, LinkerConfig, LinkerError};
use memlink_provenance::{resolve as resolve_display, DisplayProvenance, LedgerConfirmation};
use memlink_registry::InMemoryMemoryStore;
use memlink_store::{ImportReport, InMemoryMessageStore};
use memlink_types::{
    ChatMessage, ConversationId, LedgerUrl, MemoryId, MessageDraft, PersistedMessage,
};
use serde::Serialize;
use tracing::{info, warn};

/// Display provenance of one input record.
#[derive(Debug, Serialize)]
pub struct ResolvedRecord {
    pub id: String,
    pub provenance: DisplayProvenance,
    /// Why the record would be rejected on import, if it would be.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invalid: Option<String>,
}

fn read_records(path: &str) -> anyhow::Result<Vec<PersistedMessage>> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {path} as a record array"))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn in_memory_linker(config: LinkerConfig, memories: InMemoryMemoryStore) -> Arc<Linker> {
    Arc::new(Linker::new(
        config,
        Arc::new(memories),
        Arc::new(InMemoryMessageStore::new()),
    ))
}

/// Resolve display provenance without touching any store.
pub fn resolve_records(records: &[PersistedMessage]) -> Vec<ResolvedRecord> {
    records
        .iter()
        .map(|record| ResolvedRecord {
            id: record.id.clone(),
            provenance: resolve_display(record),
            invalid: ChatMessage::try_from(record.clone())
                .err()
                .map(|e| e.to_string()),
        })
        .collect()
}

pub fn resolve(path: &str) -> anyhow::Result<()> {
    let records = read_records(path)?;
    print_json(&resolve_records(&records))
}

/// Import records into a fresh in-memory linker.
pub async fn import_records(
    config: LinkerConfig,
    conversation: &str,
    records: Vec<PersistedMessage>,
) -> anyhow::Result<ImportReport> {
    let linker = in_memory_linker(config, InMemoryMemoryStore::new());
    let report = linker
        .import(&ConversationId::new(conversation), records)
        .await?;

    info!(
        conversation,
        imported = report.imported.len(),
        rejected = report.rejected.len(),
        shadowed_legacy = report.shadowed_legacy.len(),
        "Import complete"
    );
    Ok(report)
}

pub async fn import(config: LinkerConfig, path: &str, conversation: &str) -> anyhow::Result<()> {
    let records = read_records(path)?;
    let report = import_records(config, conversation, records).await?;
    print_json(&report)
}

/// One confirmed link and one timed-out link against in-memory collaborators.
pub async fn demo(mut config: LinkerConfig, timeout_secs: u64) -> anyhow::Result<()> {
    config.link.timeout_secs = timeout_secs;

    let memories =
        InMemoryMemoryStore::with_memories(["mem-demo-1", "mem-demo-2"].map(MemoryId::from));
    let linker = in_memory_linker(config, memories);
    let mut events = linker.subscribe();
    let handle = linker.clone().spawn();

    let observer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => info!(event = %json, "Link event"),
                Err(e) => warn!(error = %e, "Unserializable link event"),
            }
            if matches!(event, LinkEvent::TimedOut { .. }) {
                break;
            }
        }
    });

    let conversation = ConversationId::new("demo");
    let question = linker
        .create_message(&conversation, MessageDraft::user("What did we decide yesterday?"))
        .await?;
    let answer = linker
        .create_message(&conversation, MessageDraft::assistant("We picked the blue option."))
        .await?;

    let memory = MemoryId::from("mem-demo-1");
    linker.request_link(question.id(), &memory).await?;
    handle
        .confirm(LedgerConfirmation::complete(
            memory,
            LedgerUrl::parse("https://ledger.example/entity/1")?,
            LedgerUrl::parse("https://ledger.example/tx/1")?,
        ))
        .await?;

    // No confirmation is ever sent for the second link.
    match linker
        .link_and_wait(answer.id(), &MemoryId::from("mem-demo-2"))
        .await
    {
        Err(LinkerError::LinkTimeout { message_id, .. }) => {
            info!(message_id = %message_id, "Second link timed out as expected");
        }
        other => warn!(outcome = ?other, "Unexpected outcome for the second link"),
    }

    if let Err(e) = observer.await {
        warn!(error = %e, "Event observer failed");
    }
    handle.shutdown().await;

    print_json(&linker.export(&conversation).await?)
}
