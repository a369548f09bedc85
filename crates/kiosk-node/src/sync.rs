//! State Synchronizer: keeps one instance's [`CampaignState`] in step with
//! every other instance sharing the same [`StateStore`].
//!
//! Writes go local state first, then the store (one key per touched field),
//! then a notification on the shared topic. Receivers merge the update with
//! the configured [`MergeStrategy`]. The store is the reconciliation point:
//! a missed notification is repaired by re-hydrating from it.

use crate::error::{Error, Result};
use crate::merge::{MergeByField, MergeStrategy};
use crate::state::{CampaignState, FieldKey, StateUpdate};
use crate::store::{Notification, StateStore, TOPIC_CAPACITY};
use std::sync::Arc;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Fields of local state that changed, and which instance caused it.
#[derive(Debug, Clone, PartialEq)]
pub struct StateChange {
    /// Originating instance, if known
    pub origin: Option<String>,
    /// Fields whose local value changed
    pub fields: Vec<FieldKey>,
}

/// One running instance's view of the shared campaign state.
pub struct StateSynchronizer {
    instance_id: String,
    topic: String,
    buckets: usize,
    store: Arc<dyn StateStore>,
    state: RwLock<CampaignState>,
    /// Feed defaults, re-applied under missing keys after every reload
    defaults: RwLock<StateUpdate>,
    merge: Box<dyn MergeStrategy>,
    changes_tx: broadcast::Sender<StateChange>,
}

impl StateSynchronizer {
    /// Create an instance and hydrate it from the store.
    pub fn new(
        instance_id: impl Into<String>,
        topic: impl Into<String>,
        store: Arc<dyn StateStore>,
        buckets: usize,
    ) -> Result<Self> {
        let instance_id = instance_id.into();
        let state = CampaignState::hydrate(store.as_ref(), buckets)?;
        let (changes_tx, _) = broadcast::channel(TOPIC_CAPACITY);
        debug!("Instance {} hydrated", instance_id);

        Ok(Self {
            instance_id,
            topic: topic.into(),
            buckets,
            store,
            state: RwLock::new(state),
            defaults: RwLock::new(StateUpdate::default()),
            merge: Box::new(MergeByField),
            changes_tx,
        })
    }

    /// Replace the merge policy.
    pub fn with_merge_strategy<M: MergeStrategy + 'static>(mut self, merge: M) -> Self {
        self.merge = Box::new(merge);
        self
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn buckets(&self) -> usize {
        self.buckets
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    /// Copy of the current local state.
    pub async fn snapshot(&self) -> CampaignState {
        self.state.read().await.clone()
    }

    /// Read local state without copying it.
    pub async fn read<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&CampaignState) -> R,
    {
        f(&*self.state.read().await)
    }

    /// Merge `update` locally, persist the fields it carries, and notify
    /// other instances. Returns the fields whose local value changed.
    ///
    /// An update with an unusable field is rejected whole, before anything
    /// is applied.
    pub async fn publish(&self, update: StateUpdate) -> Result<Vec<FieldKey>> {
        let ((), changed) = self.publish_with(|_| Ok(((), update))).await?;
        Ok(changed)
    }

    /// Build an update from the current state and publish it, holding the
    /// state lock throughout so no other local write interleaves.
    pub async fn publish_with<T, F>(&self, build: F) -> Result<(T, Vec<FieldKey>)>
    where
        F: FnOnce(&CampaignState) -> Result<(T, StateUpdate)>,
    {
        let mut state = self.state.write().await;
        let (output, update) = build(&*state)?;

        let (update, rejected) = update.sanitize(self.buckets);
        if let Some((field, reason)) = rejected.into_iter().next() {
            return Err(Error::InvalidInput(format!("{}: {}", field, reason)));
        }
        if update.is_empty() {
            return Ok((output, Vec::new()));
        }

        let changed = self.merge.merge(&mut state, &update);
        self.persist(&state, &update.fields());

        let payload = serde_json::to_string(&update)?;
        self.store.notify(
            &self.topic,
            Notification {
                origin: self.instance_id.clone(),
                payload,
            },
        );
        drop(state);

        debug!("{} published {:?}", self.instance_id, update.fields());
        self.announce(Some(self.instance_id.clone()), &changed);
        Ok((output, changed))
    }

    /// Apply a remote update payload. Malformed payloads are logged and
    /// dropped; individually invalid fields are skipped.
    pub async fn on_remote_update(&self, payload: &str) -> Vec<FieldKey> {
        self.apply_remote(None, payload).await
    }

    /// Apply a notification from the topic, ignoring our own.
    pub async fn handle_notification(&self, notification: &Notification) -> Vec<FieldKey> {
        if notification.origin == self.instance_id {
            return Vec::new();
        }
        self.apply_remote(Some(&notification.origin), &notification.payload)
            .await
    }

    async fn apply_remote(&self, origin: Option<&str>, payload: &str) -> Vec<FieldKey> {
        let update: StateUpdate = match serde_json::from_str(payload) {
            Ok(update) => update,
            Err(e) => {
                warn!(
                    "{} dropping malformed update from {}: {}",
                    self.instance_id,
                    origin.unwrap_or("unknown"),
                    e
                );
                return Vec::new();
            }
        };

        let (update, rejected) = update.sanitize(self.buckets);
        for (field, reason) in rejected {
            warn!("{} ignoring remote {}: {}", self.instance_id, field, reason);
        }

        let changed = {
            let mut state = self.state.write().await;
            self.merge.merge(&mut state, &update)
        };
        self.announce(origin.map(str::to_string), &changed);
        changed
    }

    /// Re-hydrate from the store, discarding local state.
    pub async fn reload(&self) -> Result<Vec<FieldKey>> {
        let mut fresh = CampaignState::hydrate(self.store.as_ref(), self.buckets)?;
        let defaults = self.unpersisted(self.defaults.read().await.clone());
        self.merge.merge(&mut fresh, &defaults);

        let changed = {
            let mut state = self.state.write().await;
            let changed = self.merge.merge(&mut state, &fresh.to_update());
            *state = fresh;
            changed
        };
        info!("{} reloaded from store", self.instance_id);
        self.announce(None, &changed);
        Ok(changed)
    }

    /// Merge installation defaults into fields that have no persisted value.
    /// Defaults are local to this instance; they are neither persisted nor
    /// broadcast, so later persisted values always take precedence.
    pub async fn apply_defaults(&self, defaults: StateUpdate) -> Vec<FieldKey> {
        let (defaults, rejected) = defaults.sanitize(self.buckets);
        for (field, reason) in rejected {
            warn!("Ignoring default for {}: {}", field, reason);
        }
        *self.defaults.write().await = defaults.clone();

        let defaults = self.unpersisted(defaults);
        let changed = {
            let mut state = self.state.write().await;
            self.merge.merge(&mut state, &defaults)
        };
        self.announce(None, &changed);
        changed
    }

    /// Subscribe to the shared topic.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.store.subscribe(&self.topic)
    }

    /// Subscribe to local state changes.
    pub fn subscribe_changes(&self) -> broadcast::Receiver<StateChange> {
        self.changes_tx.subscribe()
    }

    /// Apply every notification already queued on `rx`. A lagged receiver
    /// triggers a reload. Returns how many notifications were applied.
    pub async fn drain(&self, rx: &mut broadcast::Receiver<Notification>) -> Result<usize> {
        let mut applied = 0;
        loop {
            match rx.try_recv() {
                Ok(notification) => {
                    self.handle_notification(&notification).await;
                    applied += 1;
                }
                Err(TryRecvError::Lagged(missed)) => {
                    warn!("{} missed {} notifications", self.instance_id, missed);
                    self.reload().await?;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return Ok(applied),
            }
        }
    }

    /// Subscribe now and apply notifications in a background task.
    pub fn listen(self: &Arc<Self>) -> JoinHandle<()> {
        let mut rx = self.subscribe();
        let sync = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(notification) => {
                        sync.handle_notification(&notification).await;
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!("{} missed {} notifications", sync.instance_id, missed);
                        if let Err(e) = sync.reload().await {
                            warn!("{} reload failed: {}", sync.instance_id, e);
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("{} stopped listening", sync.instance_id);
        })
    }

    /// Write each field's current value under its own key. Failures are
    /// logged; local state stays authoritative for this instance.
    fn persist(&self, state: &CampaignState, fields: &[FieldKey]) {
        for field in fields {
            let key = field.store_key();
            let result = match state.field_value(field) {
                Some(value) => serde_json::to_vec(&value)
                    .map_err(Error::from)
                    .and_then(|bytes| self.store.put(&key, &bytes)),
                None => self.store.delete(&key),
            };
            if let Err(e) = result {
                warn!("{} failed to persist {}: {}", self.instance_id, key, e);
            }
        }
    }

    /// Keep only fields with nothing persisted.
    fn unpersisted(&self, update: StateUpdate) -> StateUpdate {
        update.retain(|field| matches!(self.store.get(&field.store_key()), Ok(None)))
    }

    fn announce(&self, origin: Option<String>, changed: &[FieldKey]) {
        if changed.is_empty() {
            return;
        }
        let _ = self.changes_tx.send(StateChange {
            origin,
            fields: changed.to_vec(),
        });
    }
}

impl std::fmt::Debug for StateSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateSynchronizer")
            .field("instance_id", &self.instance_id)
            .field("topic", &self.topic)
            .field("buckets", &self.buckets)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, CategoryKind, SPECIAL_APPEALS, ZAKAT};
    use crate::state::{DEFAULT_BUCKETS, DEFAULT_BUCKET_CAPACITY};
    use crate::store::MemoryStore;

    const TOPIC: &str = "kiosk-config";

    fn instance(id: &str, store: &Arc<MemoryStore>) -> StateSynchronizer {
        let store: Arc<dyn StateStore> = store.clone();
        StateSynchronizer::new(id, TOPIC, store, DEFAULT_BUCKETS).unwrap()
    }

    #[tokio::test]
    async fn late_instance_sees_published_visibility() {
        let store = Arc::new(MemoryStore::new());
        let a = instance("a", &store);
        a.publish(StateUpdate::visible(vec![ZAKAT.into()])).await.unwrap();

        let b = instance("b", &store);
        let visible = b.read(|s| s.visible_categories.clone()).await;
        assert_eq!(visible, vec![ZAKAT]);
    }

    #[tokio::test]
    async fn live_instance_applies_notification() {
        let store = Arc::new(MemoryStore::new());
        let a = instance("a", &store);
        let b = instance("b", &store);
        let mut rx = b.subscribe();

        a.publish(StateUpdate::target_progress(SPECIAL_APPEALS, 750))
            .await
            .unwrap();
        assert_eq!(b.drain(&mut rx).await.unwrap(), 1);
        assert_eq!(b.read(|s| s.raised(SPECIAL_APPEALS)).await, 750);
    }

    #[tokio::test]
    async fn own_notifications_are_ignored() {
        let store = Arc::new(MemoryStore::new());
        let a = instance("a", &store);
        let mut rx = a.subscribe();
        let mut changes = a.subscribe_changes();

        a.publish(StateUpdate::visible(vec![ZAKAT.into()])).await.unwrap();
        a.drain(&mut rx).await.unwrap();

        assert_eq!(changes.try_recv().unwrap().origin.as_deref(), Some("a"));
        assert!(changes.try_recv().is_err());
    }

    #[tokio::test]
    async fn remote_update_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let b = instance("b", &store);
        let payload = r#"{"bucket_capacity":250,"sponsor_items":["dates"]}"#;

        let first = b.on_remote_update(payload).await;
        let after_once = b.snapshot().await;
        let second = b.on_remote_update(payload).await;

        assert_eq!(first.len(), 2);
        assert!(second.is_empty());
        assert_eq!(b.snapshot().await, after_once);
    }

    #[tokio::test]
    async fn malformed_payloads_are_dropped_whole() {
        let store = Arc::new(MemoryStore::new());
        let b = instance("b", &store);
        let before = b.snapshot().await;

        for payload in ["not json", "[1,2]", r#"{"visible_categories":"zakat"}"#, "null"] {
            assert!(b.on_remote_update(payload).await.is_empty());
        }
        assert_eq!(b.snapshot().await, before);
    }

    #[tokio::test]
    async fn invalid_remote_fields_are_skipped_individually() {
        let store = Arc::new(MemoryStore::new());
        let b = instance("b", &store);

        let changed = b
            .on_remote_update(r#"{"bucket_capacity":0,"sponsor_people":25,"colour":"green"}"#)
            .await;
        assert_eq!(changed, vec![FieldKey::SponsorPeople]);
        assert_eq!(b.read(|s| s.ledger.capacity()).await, DEFAULT_BUCKET_CAPACITY);
    }

    #[tokio::test]
    async fn invalid_local_publish_changes_nothing() {
        let store = Arc::new(MemoryStore::new());
        let a = instance("a", &store);
        let mut update = StateUpdate::visible(vec![ZAKAT.into()]);
        update.bucket_capacity = Some(0);

        assert!(matches!(a.publish(update).await, Err(Error::InvalidInput(_))));
        assert_eq!(a.read(|s| s.visible().len()).await, 5);
        assert!(store.get("visible_categories").unwrap().is_none());
    }

    #[tokio::test]
    async fn empty_presets_are_refused_locally_and_remotely() {
        let store = Arc::new(MemoryStore::new());
        let a = instance("a", &store);
        let b = instance("b", &store);
        let mut zakat = a.read(|s| s.category(ZAKAT).cloned()).await.unwrap();
        zakat.amounts.clear();

        let local = a.publish(StateUpdate::category(zakat.clone())).await;
        assert!(matches!(local, Err(Error::InvalidInput(_))));
        assert!(store.get("category:zakat").unwrap().is_none());

        let mut update = StateUpdate::category(zakat);
        update.sponsor_people = Some(Some(8));
        let changed = b
            .on_remote_update(&serde_json::to_string(&update).unwrap())
            .await;
        assert_eq!(changed, vec![FieldKey::SponsorPeople]);
        assert!(!b.read(|s| s.category(ZAKAT).unwrap().amounts.is_empty()).await);
    }

    #[tokio::test]
    async fn cleared_schedule_fields_stay_cleared() {
        let store = Arc::new(MemoryStore::new());
        let a = instance("a", &store);
        let b = instance("b", &store);
        let start = chrono::NaiveDate::from_ymd_opt(2026, 2, 18);
        let mut set = StateUpdate::default();
        set.campaign_start = Some(start);
        set.sponsor_people = Some(Some(40));
        a.publish(set).await.unwrap();
        b.reload().await.unwrap();

        let changed = b
            .on_remote_update(r#"{"campaign_start":null,"sponsor_people":null}"#)
            .await;
        assert_eq!(changed, vec![FieldKey::CampaignStart, FieldKey::SponsorPeople]);
        assert_eq!(b.read(|s| (s.campaign_start, s.sponsor_people)).await, (None, None));

        let mut clear = StateUpdate::default();
        clear.campaign_start = Some(None);
        a.publish(clear).await.unwrap();
        assert_eq!(store.get("campaign_start").unwrap().as_deref(), Some(&b"null"[..]));

        // A persisted clear outranks feed defaults after a restart.
        let c = instance("c", &store);
        let mut defaults = StateUpdate::default();
        defaults.campaign_start = Some(start);
        c.apply_defaults(defaults).await;
        assert_eq!(c.read(|s| s.campaign_start).await, None);
    }

    #[tokio::test]
    async fn disjoint_writers_converge_after_reload() {
        let store = Arc::new(MemoryStore::new());
        let a = instance("a", &store);
        let b = instance("b", &store);

        a.publish(StateUpdate::visible(vec![ZAKAT.into()])).await.unwrap();
        b.publish(StateUpdate::target_progress(SPECIAL_APPEALS, 120))
            .await
            .unwrap();

        a.reload().await.unwrap();
        b.reload().await.unwrap();
        let merged = a.snapshot().await;
        assert_eq!(merged, b.snapshot().await);
        assert_eq!(merged.visible_categories, vec![ZAKAT]);
        assert_eq!(merged.raised(SPECIAL_APPEALS), 120);
    }

    #[tokio::test]
    async fn corrupt_store_value_falls_back_on_startup() {
        let store = Arc::new(MemoryStore::new());
        store.put("bucket_capacity", b"\"lots\"").unwrap();
        let a = instance("a", &store);
        assert_eq!(a.read(|s| s.ledger.capacity()).await, DEFAULT_BUCKET_CAPACITY);
    }

    #[tokio::test]
    async fn defaults_yield_to_persisted_values() {
        let store = Arc::new(MemoryStore::new());
        store.put("sponsor_people", b"12").unwrap();
        let a = instance("a", &store);

        let mut defaults = StateUpdate::default();
        defaults.sponsor_people = Some(Some(40));
        defaults.bucket_capacity = Some(500);
        let changed = a.apply_defaults(defaults).await;

        assert_eq!(changed, vec![FieldKey::BucketCapacity]);
        assert_eq!(a.read(|s| s.sponsor_people).await, Some(12));
        assert!(store.get("bucket_capacity").unwrap().is_none());

        // Still applied after a reload, until something is persisted.
        a.reload().await.unwrap();
        assert_eq!(a.read(|s| s.ledger.capacity()).await, 500);
    }

    #[tokio::test]
    async fn publish_with_builds_from_current_state() {
        let store = Arc::new(MemoryStore::new());
        let a = instance("a", &store);
        let mut zakat = Category::new(ZAKAT, "Zakat", CategoryKind::Preset);
        zakat.amounts = vec![10];
        a.publish(StateUpdate::category(zakat)).await.unwrap();

        let (label, changed) = a
            .publish_with(|state| {
                let mut zakat = state.category(ZAKAT).cloned().unwrap();
                zakat.amounts.push(20);
                Ok((zakat.label.clone(), StateUpdate::category(zakat)))
            })
            .await
            .unwrap();
        assert_eq!(label, "Zakat");
        assert_eq!(changed, vec![FieldKey::Category(ZAKAT.into())]);
        assert_eq!(a.read(|s| s.category(ZAKAT).unwrap().amounts.clone()).await, vec![10, 20]);
    }

    #[tokio::test]
    async fn listener_applies_in_background() {
        let store = Arc::new(MemoryStore::new());
        let a = instance("a", &store);
        let b = Arc::new(instance("b", &store));
        let mut changes = b.subscribe_changes();
        let handle = b.listen();

        a.publish(StateUpdate::visible(vec![ZAKAT.into()])).await.unwrap();
        let change = changes.recv().await.unwrap();
        assert_eq!(change.origin.as_deref(), Some("a"));
        assert_eq!(change.fields, vec![FieldKey::VisibleCategories]);
        handle.abort();
    }
}
