use std::sync::Arc;
use std::time::Instant;

use memlink_identity::{assigner_for, IdentityAssigner};
use memlink_provenance::{
    resolve, Absorbed, DisplayProvenance, LedgerConfirmation, LinkAttempt, PendingTracker,
};
use memlink_registry::{MemoryLinkRegistry, MemoryStore, RegistryError};
use memlink_store::{ImportReport, MessageStore, QueryWindow, StoreError};
use memlink_types::{
    ChatMessage, ConversationId, MemoryId, MessageDraft, MessageId, PersistedMessage,
    ProvenanceKind,
};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::config::LinkerConfig;
use crate::error::{LinkerError, LinkerResult};
use crate::events::LinkEvent;
use crate::locks::KeyedLocks;

/// Reassignments attempted when a freshly assigned id is already stored.
const MAX_ID_RETRIES: usize = 3;

/// Current instant on the tokio clock, so paused-time tests drive deadlines.
pub(crate) fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

/// The message–memory linker.
///
/// Composes identity assignment, the link registry, the message store and
/// the pending tracker. Every operation that touches one message holds that
/// message's lock for its whole duration, so `request_link`, `unlink`,
/// confirmation and expiry of one message never interleave. The tracker
/// mutex is only taken briefly and always inside a message lock, never the
/// other way around.
pub struct Linker {
    config: LinkerConfig,
    assigner: Arc<dyn IdentityAssigner>,
    registry: MemoryLinkRegistry,
    store: Arc<dyn MessageStore>,
    tracker: Mutex<PendingTracker>,
    locks: KeyedLocks<MessageId>,
    events: broadcast::Sender<LinkEvent>,
}

impl Linker {
    pub fn new(
        config: LinkerConfig,
        memory_store: Arc<dyn MemoryStore>,
        store: Arc<dyn MessageStore>,
    ) -> Self {
        let assigner = assigner_for(config.identity.scheme, &config.identity.prefix);
        let (events, _) = broadcast::channel(config.channels.event_capacity.max(1));

        Self {
            config,
            assigner,
            registry: MemoryLinkRegistry::new(memory_store),
            store,
            tracker: Mutex::new(PendingTracker::new()),
            locks: KeyedLocks::new(),
            events,
        }
    }

    /// Replace the configured identity assigner.
    pub fn with_assigner(mut self, assigner: Arc<dyn IdentityAssigner>) -> Self {
        self.assigner = assigner;
        self
    }

    pub fn config(&self) -> &LinkerConfig {
        &self.config
    }

    pub fn registry(&self) -> &MemoryLinkRegistry {
        &self.registry
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LinkEvent> {
        self.events.subscribe()
    }

    /// Assign an id to a finished role turn and store it `Unlinked`.
    pub async fn create_message(
        &self,
        conversation: &ConversationId,
        draft: MessageDraft,
    ) -> LinkerResult<ChatMessage> {
        let mut retries = 0;
        let message = loop {
            let message = draft.clone().into_message(self.assigner.assign()?);
            match self.store.append(conversation, message.clone()).await {
                Ok(_) => break message,
                Err(StoreError::DuplicateId(id)) if retries < MAX_ID_RETRIES => {
                    warn!(message_id = %id, "Assigned id already stored, reassigning");
                    self.assigner.observe(&id);
                    retries += 1;
                }
                Err(error) => return Err(error.into()),
            }
        };

        info!(
            message_id = %message.id(),
            conversation = %conversation,
            role = %message.role(),
            "Created message"
        );
        Ok(message)
    }

    /// Link a message to a memory: `Unlinked → Pending`.
    ///
    /// Returns before the ledger confirms. The link is reverted if no
    /// complete confirmation arrives before the configured timeout.
    pub async fn request_link(
        &self,
        message_id: &MessageId,
        memory_id: &MemoryId,
    ) -> LinkerResult<LinkAttempt> {
        let _guard = self.locks.lock(message_id).await;

        self.store.get(message_id).await?;
        self.registry.link(message_id, memory_id).await?;

        if let Err(error) = self.store.mark_pending(message_id, memory_id.clone()).await {
            self.release(message_id);
            return Err(error.into());
        }

        let attempt = self.tracker.lock().await.track(
            message_id.clone(),
            memory_id.clone(),
            now(),
            self.config.link.timeout(),
        );

        info!(
            message_id = %message_id,
            memory_id = %memory_id,
            attempt = attempt.attempt,
            "Link requested"
        );
        self.emit(LinkEvent::Requested {
            message_id: message_id.clone(),
            memory_id: memory_id.clone(),
            attempt: attempt.attempt,
        });
        Ok(attempt)
    }

    /// Abandon a pending link: `Pending → Unlinked`.
    ///
    /// Confirmed and legacy links are terminal and fail with
    /// `InvalidState`; an unlinked message fails with `NotLinked`.
    pub async fn unlink(&self, message_id: &MessageId) -> LinkerResult<MemoryId> {
        let _guard = self.locks.lock(message_id).await;

        let message = self.store.get(message_id).await?;
        if message.state() == ProvenanceKind::Unlinked {
            return Err(RegistryError::NotLinked(message_id.clone()).into());
        }

        let memory_id = self.store.revert_link(message_id).await?;
        self.tracker.lock().await.cancel(message_id);
        self.release(message_id);

        info!(message_id = %message_id, memory_id = %memory_id, "Link abandoned");
        self.emit(LinkEvent::Unlinked {
            message_id: message_id.clone(),
            memory_id: memory_id.clone(),
        });
        Ok(memory_id)
    }

    /// Apply a ledger confirmation.
    ///
    /// Returns the confirmed message once both URLs are known, `None` for a
    /// partial or stale confirmation.
    pub async fn handle_confirmation(
        &self,
        event: LedgerConfirmation,
    ) -> LinkerResult<Option<ChatMessage>> {
        loop {
            let target = self
                .tracker
                .lock()
                .await
                .message_for(&event.memory_id)
                .cloned();
            let Some(message_id) = target else {
                self.report_stale(event.memory_id);
                return Ok(None);
            };

            let _guard = self.locks.lock(&message_id).await;
            let mut tracker = self.tracker.lock().await;
            if tracker.message_for(&event.memory_id) != Some(&message_id) {
                // Memory moved to another message while we waited.
                continue;
            }
            let absorbed = tracker.absorb(event);
            drop(tracker);

            return match absorbed {
                Absorbed::Complete {
                    attempt,
                    entity_url,
                    transaction_url,
                } => {
                    let message = match self
                        .store
                        .update_provenance(&message_id, entity_url.clone(), transaction_url.clone())
                        .await
                    {
                        Ok(message) => message,
                        Err(error) => {
                            warn!(message_id = %message_id, error = %error, "Provenance backfill failed");
                            // Still pending: a redelivery or the deadline settles it.
                            self.tracker.lock().await.reinstate(attempt);
                            return Err(error.into());
                        }
                    };

                    info!(
                        message_id = %message_id,
                        memory_id = %attempt.memory_id,
                        entity_url = %entity_url,
                        "Link confirmed"
                    );
                    self.emit(LinkEvent::Confirmed {
                        message_id,
                        memory_id: attempt.memory_id,
                        entity_url,
                        transaction_url,
                    });
                    Ok(Some(message))
                }
                Absorbed::Partial { attempt } => {
                    debug!(
                        message_id = %message_id,
                        memory_id = %attempt.memory_id,
                        "Partial confirmation, waiting for the other half"
                    );
                    Ok(None)
                }
                Absorbed::Stale { memory_id } => {
                    self.report_stale(memory_id);
                    Ok(None)
                }
            };
        }
    }

    /// Revert every pending link whose deadline is at or before `now`.
    /// Returns the attempts that were actually reverted.
    pub async fn expire_pending(&self, now: Instant) -> Vec<LinkAttempt> {
        let due = self.tracker.lock().await.expire(now);
        let mut expired = Vec::with_capacity(due.len());

        for attempt in due {
            match self.revert_expired(&attempt).await {
                Ok(true) => expired.push(attempt),
                Ok(false) => {}
                Err(error) => warn!(
                    message_id = %attempt.message_id,
                    error = %error,
                    "Failed to revert expired link"
                ),
            }
        }
        expired
    }

    async fn revert_expired(&self, attempt: &LinkAttempt) -> LinkerResult<bool> {
        let _guard = self.locks.lock(&attempt.message_id).await;

        // A newer attempt for the same message owns the pending state now.
        if self
            .tracker
            .lock()
            .await
            .attempt_for(&attempt.message_id)
            .is_some()
        {
            return Ok(false);
        }

        let message = self.store.get(&attempt.message_id).await?;
        if message.state() != ProvenanceKind::Pending
            || message.memory_id() != Some(&attempt.memory_id)
        {
            debug!(message_id = %attempt.message_id, "Expired link already settled");
            return Ok(false);
        }

        self.store.revert_link(&attempt.message_id).await?;
        self.release(&attempt.message_id);

        warn!(
            message_id = %attempt.message_id,
            memory_id = %attempt.memory_id,
            attempt = attempt.attempt,
            "Link timed out"
        );
        self.emit(LinkEvent::TimedOut {
            message_id: attempt.message_id.clone(),
            memory_id: attempt.memory_id.clone(),
        });
        Ok(true)
    }

    /// Request a link and wait until it is confirmed or times out.
    ///
    /// Works with or without a running [`LinkerHandle`](crate::LinkerHandle):
    /// if the deadline passes first, the expiry is applied here.
    pub async fn link_and_wait(
        &self,
        message_id: &MessageId,
        memory_id: &MemoryId,
    ) -> LinkerResult<ChatMessage> {
        let mut events = self.subscribe();
        let attempt = self.request_link(message_id, memory_id).await?;
        let deadline = attempt.deadline.map(tokio::time::Instant::from_std);

        loop {
            let received = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, events.recv()).await {
                    Ok(received) => received,
                    Err(_) => {
                        self.expire_pending(now()).await;
                        return self.settle(&attempt).await;
                    }
                },
                None => events.recv().await,
            };

            match received {
                Ok(event) if event.message_id() == Some(message_id) => match event {
                    LinkEvent::Confirmed { .. } | LinkEvent::TimedOut { .. } => {
                        return self.settle(&attempt).await;
                    }
                    LinkEvent::Unlinked { .. } => {
                        return Err(RegistryError::NotLinked(message_id.clone()).into());
                    }
                    _ => {}
                },
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(message_id = %message_id, skipped, "Link event receiver lagged");
                    if self.store.get(message_id).await?.state() != ProvenanceKind::Pending {
                        return self.settle(&attempt).await;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => return Err(LinkerError::ChannelClosed),
            }
        }
    }

    async fn settle(&self, attempt: &LinkAttempt) -> LinkerResult<ChatMessage> {
        // The sweep may hold this attempt, already removed from the tracker
        // but not yet reverted. Revert it here before reporting a timeout.
        self.revert_expired(attempt).await?;
        let message = self.store.get(&attempt.message_id).await?;
        match message.state() {
            ProvenanceKind::Confirmed => Ok(message),
            _ => Err(LinkerError::LinkTimeout {
                message_id: attempt.message_id.clone(),
                memory_id: attempt.memory_id.clone(),
            }),
        }
    }

    pub async fn get(&self, message_id: &MessageId) -> LinkerResult<ChatMessage> {
        Ok(self.store.get(message_id).await?)
    }

    /// Display provenance of a stored message.
    pub async fn display(&self, message_id: &MessageId) -> LinkerResult<DisplayProvenance> {
        Ok(resolve(&self.store.get(message_id).await?))
    }

    /// Timestamp-ordered messages of a conversation.
    pub async fn history(
        &self,
        conversation: &ConversationId,
        window: QueryWindow,
    ) -> LinkerResult<Vec<ChatMessage>> {
        Ok(self.store.list_conversation(conversation, window).await?)
    }

    /// Bulk-import historical records and restore their memory links.
    pub async fn import(
        &self,
        conversation: &ConversationId,
        records: Vec<PersistedMessage>,
    ) -> LinkerResult<ImportReport> {
        let report = self.store.import(conversation, records).await?;

        for message_id in &report.imported {
            self.assigner.observe(message_id);
            let message = self.store.get(message_id).await?;
            if let Some(memory_id) = message.memory_id() {
                if let Err(error) = self.registry.restore(message_id, memory_id) {
                    warn!(
                        message_id = %message_id,
                        memory_id = %memory_id,
                        error = %error,
                        "Imported link conflicts with an existing link"
                    );
                }
            }
        }
        Ok(report)
    }

    pub async fn export(&self, conversation: &ConversationId) -> LinkerResult<Vec<PersistedMessage>> {
        Ok(self.store.export(conversation).await?)
    }

    /// Number of links awaiting confirmation.
    pub async fn pending_count(&self) -> usize {
        self.tracker.lock().await.len()
    }

    fn release(&self, message_id: &MessageId) {
        if let Err(error) = self.registry.unlink(message_id) {
            warn!(message_id = %message_id, error = %error, "Failed to release registry link");
        }
    }

    fn report_stale(&self, memory_id: MemoryId) {
        debug!(memory_id = %memory_id, "Stale confirmation ignored");
        self.emit(LinkEvent::StaleConfirmation { memory_id });
    }

    fn emit(&self, event: LinkEvent) {
        // Having no subscribers is fine.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memlink_identity::SequentialAssigner;
    use memlink_registry::InMemoryMemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use memlink_store::{InMemoryMessageStore, StoreError, StoreResult};
    use memlink_types::LedgerUrl;

    /// In-memory store whose first `failures` provenance backfills fail.
    struct FlakyStore {
        inner: InMemoryMessageStore,
        failures: AtomicUsize,
    }

    #[async_trait]
    impl MessageStore for FlakyStore {
        async fn append(
            &self,
            conversation: &ConversationId,
            message: ChatMessage,
        ) -> StoreResult<MessageId> {
            self.inner.append(conversation, message).await
        }

        async fn get(&self, id: &MessageId) -> StoreResult<ChatMessage> {
            self.inner.get(id).await
        }

        async fn mark_pending(&self, id: &MessageId, memory_id: MemoryId) -> StoreResult<ChatMessage> {
            self.inner.mark_pending(id, memory_id).await
        }

        async fn update_provenance(
            &self,
            id: &MessageId,
            entity_url: LedgerUrl,
            transaction_url: LedgerUrl,
        ) -> StoreResult<ChatMessage> {
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(StoreError::Backend("write rejected".to_string()));
            }
            self.inner.update_provenance(id, entity_url, transaction_url).await
        }

        async fn revert_link(&self, id: &MessageId) -> StoreResult<MemoryId> {
            self.inner.revert_link(id).await
        }

        async fn list_conversation(
            &self,
            conversation: &ConversationId,
            window: QueryWindow,
        ) -> StoreResult<Vec<ChatMessage>> {
            self.inner.list_conversation(conversation, window).await
        }

        async fn import(
            &self,
            conversation: &ConversationId,
            records: Vec<PersistedMessage>,
        ) -> StoreResult<ImportReport> {
            self.inner.import(conversation, records).await
        }

        async fn export(&self, conversation: &ConversationId) -> StoreResult<Vec<PersistedMessage>> {
            self.inner.export(conversation).await
        }
    }

    fn flaky_linker(failures: usize) -> Linker {
        let memories = Arc::new(InMemoryMemoryStore::with_memories([MemoryId::from("mem1")]));
        let store = FlakyStore {
            inner: InMemoryMessageStore::new(),
            failures: AtomicUsize::new(failures),
        };
        Linker::new(LinkerConfig::default(), memories, Arc::new(store))
            .with_assigner(Arc::new(SequentialAssigner::new("m")))
    }

    fn url(s: &str) -> LedgerUrl {
        LedgerUrl::parse(s).unwrap()
    }

    fn linker() -> Linker {
        let memories = Arc::new(InMemoryMemoryStore::with_memories([
            MemoryId::from("mem1"),
            MemoryId::from("mem2"),
        ]));
        Linker::new(
            LinkerConfig::default(),
            memories,
            Arc::new(InMemoryMessageStore::new()),
        )
        .with_assigner(Arc::new(SequentialAssigner::new("m")))
    }

    async fn message(linker: &Linker) -> MessageId {
        linker
            .create_message(&ConversationId::from("c1"), MessageDraft::user("hi"))
            .await
            .unwrap()
            .id()
            .clone()
    }

    #[tokio::test]
    async fn create_assigns_sequential_ids() {
        let linker = linker();
        assert_eq!(message(&linker).await.as_str(), "m1");
        assert_eq!(message(&linker).await.as_str(), "m2");
    }

    #[tokio::test]
    async fn link_unknown_message_is_not_found() {
        let linker = linker();
        let err = linker
            .request_link(&MessageId::from("ghost"), &MemoryId::from("mem1"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            LinkerError::Store(StoreError::NotFound(MessageId::from("ghost")))
        );
        assert!(linker.registry().is_empty().unwrap());
    }

    #[tokio::test]
    async fn partial_confirmation_stays_pending() {
        let linker = linker();
        let id = message(&linker).await;
        linker.request_link(&id, &MemoryId::from("mem1")).await.unwrap();

        let first = linker
            .handle_confirmation(LedgerConfirmation::entity_only(
                MemoryId::from("mem1"),
                url("e://1"),
            ))
            .await
            .unwrap();
        assert!(first.is_none());
        assert_eq!(linker.get(&id).await.unwrap().state(), ProvenanceKind::Pending);

        let second = linker
            .handle_confirmation(LedgerConfirmation::transaction_only(
                MemoryId::from("mem1"),
                url("t://1"),
            ))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.state(), ProvenanceKind::Confirmed);
        assert_eq!(linker.pending_count().await, 0);
    }

    #[tokio::test]
    async fn unlink_releases_memory_for_reuse() {
        let linker = linker();
        let a = message(&linker).await;
        let b = message(&linker).await;
        let mem = MemoryId::from("mem1");

        linker.request_link(&a, &mem).await.unwrap();
        assert!(matches!(
            linker.request_link(&b, &mem).await,
            Err(LinkerError::Registry(RegistryError::MemoryInUse { .. }))
        ));

        assert_eq!(linker.unlink(&a).await.unwrap(), mem);
        linker.request_link(&b, &mem).await.unwrap();
        assert_eq!(linker.registry().message_for(&mem).unwrap(), Some(b));
    }

    #[tokio::test]
    async fn unlink_of_unlinked_message_is_not_linked() {
        let linker = linker();
        let id = message(&linker).await;
        assert_eq!(
            linker.unlink(&id).await.unwrap_err(),
            LinkerError::Registry(RegistryError::NotLinked(id))
        );
    }

    #[tokio::test]
    async fn expire_before_deadline_is_a_noop() {
        let linker = linker();
        let id = message(&linker).await;
        let attempt = linker.request_link(&id, &MemoryId::from("mem1")).await.unwrap();

        assert!(linker.expire_pending(attempt.requested_at).await.is_empty());
        assert_eq!(linker.get(&id).await.unwrap().state(), ProvenanceKind::Pending);

        let deadline = attempt.deadline.unwrap();
        let expired = linker.expire_pending(deadline).await;
        assert_eq!(expired.len(), 1);

        let reverted = linker.get(&id).await.unwrap();
        assert_eq!(reverted.state(), ProvenanceKind::Unlinked);
        assert!(reverted.memory_id().is_none());
        assert!(linker.registry().memory_for(&id).unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_backfill_still_times_out() {
        let linker = flaky_linker(1);
        let id = message(&linker).await;
        let attempt = linker.request_link(&id, &MemoryId::from("mem1")).await.unwrap();

        let err = linker
            .handle_confirmation(LedgerConfirmation::complete(
                MemoryId::from("mem1"),
                url("e://1"),
                url("t://1"),
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, LinkerError::Store(StoreError::Backend(_))));
        assert_eq!(linker.get(&id).await.unwrap().state(), ProvenanceKind::Pending);
        assert_eq!(linker.pending_count().await, 1);

        let expired = linker.expire_pending(attempt.deadline.unwrap()).await;
        assert_eq!(expired, vec![attempt]);
        assert_eq!(linker.get(&id).await.unwrap().state(), ProvenanceKind::Unlinked);
        assert_eq!(linker.pending_count().await, 0);
        assert!(linker.registry().memory_for(&id).unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_backfill_can_be_redelivered() {
        let linker = flaky_linker(1);
        let id = message(&linker).await;
        linker.request_link(&id, &MemoryId::from("mem1")).await.unwrap();

        let confirmation = LedgerConfirmation::complete(
            MemoryId::from("mem1"),
            url("e://1"),
            url("t://1"),
        );
        assert!(linker.handle_confirmation(confirmation.clone()).await.is_err());

        let confirmed = linker
            .handle_confirmation(confirmation)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(confirmed.state(), ProvenanceKind::Confirmed);
        assert_eq!(linker.pending_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_reported_only_after_revert() {
        let linker = linker();
        let id = message(&linker).await;
        let mem = MemoryId::from("mem1");
        let timeout = linker.config().link.timeout();

        // Stands in for a sweep that has taken the attempt out of the
        // tracker but not reverted the message yet.
        let sweep = async {
            tokio::time::sleep(timeout / 2).await;
            let mut tracker = linker.tracker.lock().await;
            tracker.expire(now() + timeout * 2).len()
        };

        let (result, taken) = tokio::join!(linker.link_and_wait(&id, &mem), sweep);
        assert_eq!(taken, 1);
        assert_eq!(
            result.unwrap_err(),
            LinkerError::LinkTimeout {
                message_id: id.clone(),
                memory_id: mem.clone(),
            }
        );

        let message = linker.get(&id).await.unwrap();
        assert_eq!(message.state(), ProvenanceKind::Unlinked);
        assert!(linker.registry().memory_for(&id).unwrap().is_none());
    }
}
