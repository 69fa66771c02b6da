use std::collections::HashSet;
use std::fmt::Debug;
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::serde::de::DeserializeOwned;
use kube::runtime::reflector::{self, ObjectRef, Store, store::Writer};
use kube::runtime::{WatchStreamExt, watcher};
use kube::{Api, Resource, ResourceExt};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use crate::{Error, EventHandler, ResourceEvent, Result};

#[derive(Clone, Debug, Default)]
pub struct InformerConfig {
    /// Every cached object is re-delivered as an add event on this interval
    /// once the cache has synced. `None` or zero disables resync.
    pub resync: Option<Duration>,
    pub watcher: watcher::Config,
}

/// Watches a single resource kind, keeps a local cache of it and delivers
/// add/update/delete events to a handler.
pub struct Informer<K>
where
    K: Resource<DynamicType = ()> + Clone + Debug + DeserializeOwned + Send + Sync + 'static,
{
    api: Api<K>,
    config: InformerConfig,
    store: Store<K>,
    writer: Writer<K>,
    synced: CancellationToken,
    relisted: HashSet<ObjectRef<K>>,
}

impl<K> Informer<K>
where
    K: Resource<DynamicType = ()> + Clone + Debug + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(api: Api<K>, config: InformerConfig) -> Self {
        let (store, writer) = reflector::store();
        Self {
            api,
            config,
            store,
            writer,
            synced: CancellationToken::new(),
            relisted: HashSet::new(),
        }
    }

    /// Read handle on the cache. Stays valid after [`Informer::run`] consumes
    /// the informer.
    pub fn reader(&self) -> Store<K> {
        self.store.clone()
    }

    /// Cancelled once the initial listing has been delivered.
    pub fn synced(&self) -> CancellationToken {
        self.synced.clone()
    }

    pub fn has_synced(&self) -> bool {
        self.synced.is_cancelled()
    }

    /// Starts the watch and delivers events until `cancel` fires. A handler
    /// that is already running is always allowed to finish.
    pub async fn run<H>(mut self, handler: H, cancel: CancellationToken) -> Result<()>
    where
        H: EventHandler<K>,
    {
        let kind = K::kind(&()).into_owned();
        let stream = watcher(self.api.clone(), self.config.watcher.clone()).default_backoff();
        let mut stream = pin!(stream);
        let mut timer = resync_timer(self.config.resync);
        let synced = self.synced.clone();

        info!("started {} informer", kind);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = next_resync(&mut timer, &synced) => resync(&self.store, &handler).await,
                event = stream.next() => {
                    let Some(event) = event else {
                        return Err(Error::StreamEnded(kind));
                    };
                    match event {
                        Ok(event) => self.process(event, &handler).await,
                        Err(e) => error!(%e, "unexpected error with {} stream", kind),
                    }
                }
            }
        }
        info!("stopped {} informer", kind);
        Ok(())
    }

    async fn process<H>(&mut self, event: watcher::Event<K>, handler: &H)
    where
        H: EventHandler<K>,
    {
        let events = translate(&self.store, &mut self.relisted, &event);
        self.writer.apply_watcher_event(&event);
        if mark_synced(&self.synced, &event) {
            info!("{} cache synced", K::kind(&()));
        }
        for event in events {
            deliver(handler, event).await;
        }
    }
}

/// Waits until every token is cancelled, failing once `timeout` elapses.
pub async fn wait_for_sync(synced: &[CancellationToken], timeout: Duration) -> Result<()> {
    let all = futures::future::join_all(synced.iter().map(|s| s.cancelled()));
    tokio::time::timeout(timeout, all)
        .await
        .map_err(|_| Error::SyncTimeout(timeout))?;
    Ok(())
}

// Must be called before the event is applied to the store, the previous state
// of an object is read from it.
fn translate<K>(
    store: &Store<K>,
    relisted: &mut HashSet<ObjectRef<K>>,
    event: &watcher::Event<K>,
) -> Vec<ResourceEvent<K>>
where
    K: Resource<DynamicType = ()> + Clone + Send + Sync + 'static,
{
    match event {
        watcher::Event::Apply(obj) => vec![changed(store, obj)],
        watcher::Event::Delete(obj) => vec![ResourceEvent::Delete(Arc::new(obj.clone()))],
        watcher::Event::Init => {
            relisted.clear();
            Vec::new()
        }
        watcher::Event::InitApply(obj) => {
            relisted.insert(ObjectRef::from_obj(obj));
            vec![changed(store, obj)]
        }
        // anything cached but absent from the relist was deleted while the
        // watch was down
        watcher::Event::InitDone => {
            let gone = store
                .state()
                .into_iter()
                .filter(|k| !relisted.contains(&ObjectRef::from_obj(k.as_ref())))
                .map(ResourceEvent::Delete)
                .collect();
            relisted.clear();
            gone
        }
    }
}

fn changed<K>(store: &Store<K>, obj: &K) -> ResourceEvent<K>
where
    K: Resource<DynamicType = ()> + Clone + Send + Sync + 'static,
{
    let new = Arc::new(obj.clone());
    match store.get(&ObjectRef::from_obj(obj)) {
        Some(old) => ResourceEvent::Update { old, new },
        None => ResourceEvent::Add(new),
    }
}

async fn deliver<K, H>(handler: &H, event: ResourceEvent<K>)
where
    K: Resource<DynamicType = ()> + Send + Sync,
    H: EventHandler<K>,
{
    let kind = K::kind(&());
    let action = event.action();
    let name = event.resource().name_any();
    let namespace = event.resource().namespace().unwrap_or_default();
    trace!(%kind, action, %namespace, %name, "delivering event");

    if let Err(error) = event.dispatch(handler).await {
        error!(%error, %kind, action, %namespace, %name, "failed to handle event");
    }
}

/// Cancels `synced` on the first `InitDone`. Returns true only for that
/// transition, later relists leave it untouched.
fn mark_synced<K>(synced: &CancellationToken, event: &watcher::Event<K>) -> bool {
    if matches!(event, watcher::Event::InitDone) && !synced.is_cancelled() {
        synced.cancel();
        return true;
    }
    false
}

/// Re-delivers every cached object as an add event.
async fn resync<K, H>(store: &Store<K>, handler: &H)
where
    K: Resource<DynamicType = ()> + Clone + Send + Sync + 'static,
    H: EventHandler<K>,
{
    let objects = store.state();
    debug!("resyncing {} {} objects", objects.len(), K::kind(&()));
    for obj in objects {
        deliver(handler, ResourceEvent::Add(obj)).await;
    }
}

fn resync_timer(period: Option<Duration>) -> Option<Interval> {
    let period = period.filter(|p| !p.is_zero())?;
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    Some(interval)
}

/// Resolves on the next resync tick, never before the cache has synced and
/// never at all without a timer.
async fn next_resync(timer: &mut Option<Interval>, synced: &CancellationToken) {
    let Some(interval) = timer else {
        return std::future::pending().await;
    };
    synced.cancelled().await;
    interval.tick().await;
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use http::Uri;
    use k8s_openapi::api::core::v1::Service;
    use kube::api::ObjectMeta;
    use kube::{Client, config::Config};

    use super::*;

    #[derive(Default)]
    struct RecordingHandler {
        seen: Mutex<Vec<(&'static str, String)>>,
    }

    impl RecordingHandler {
        fn take(&self) -> Vec<(&'static str, String)> {
            std::mem::take(&mut *self.seen.lock().unwrap())
        }

        fn record(&self, action: &'static str, obj: &Service) {
            self.seen.lock().unwrap().push((action, obj.name_any()));
        }
    }

    impl EventHandler<Service> for RecordingHandler {
        type Error = String;

        async fn on_add(&self, obj: Arc<Service>) -> Result<(), String> {
            self.record("add", &obj);
            Ok(())
        }

        async fn on_update(&self, _old: Arc<Service>, new: Arc<Service>) -> Result<(), String> {
            self.record("update", &new);
            Ok(())
        }

        async fn on_delete(&self, obj: Arc<Service>) -> Result<(), String> {
            self.record("delete", &obj);
            Ok(())
        }
    }

    fn test_client() -> Client {
        let config = Config::new(Uri::from_static("http://localhost"));
        Client::try_from(config).expect("test client")
    }

    fn service(name: &str, version: &str) -> Service {
        Service {
            metadata: ObjectMeta {
                name: Some(name.into()),
                namespace: Some("ns1".into()),
                resource_version: Some(version.into()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn names(events: &[ResourceEvent<Service>]) -> Vec<(&'static str, String)> {
        events
            .iter()
            .map(|e| (e.action(), e.resource().name_any()))
            .collect()
    }

    #[test]
    fn test_translate_apply() {
        let (store, mut writer) = reflector::store();
        let mut relisted = HashSet::new();

        let first = watcher::Event::Apply(service("a", "1"));
        let events = translate(&store, &mut relisted, &first);
        assert_eq!(names(&events), vec![("add", "a".to_string())]);
        writer.apply_watcher_event(&first);

        let second = watcher::Event::Apply(service("a", "2"));
        let events = translate(&store, &mut relisted, &second);
        match events.as_slice() {
            [ResourceEvent::Update { old, new }] => {
                assert_eq!(old.resource_version().as_deref(), Some("1"));
                assert_eq!(new.resource_version().as_deref(), Some("2"));
            }
            other => panic!("expected a single update, got {other:?}"),
        }
    }

    #[test]
    fn test_translate_delete() {
        let (store, _writer) = reflector::store();
        let mut relisted = HashSet::new();

        let events = translate(
            &store,
            &mut relisted,
            &watcher::Event::Delete(service("a", "3")),
        );
        assert_eq!(names(&events), vec![("delete", "a".to_string())]);
    }

    #[test]
    fn test_translate_relist_reports_missing_objects() {
        let (store, mut writer) = reflector::store();
        let mut relisted = HashSet::new();
        for event in [
            watcher::Event::Init,
            watcher::Event::InitApply(service("kept", "1")),
            watcher::Event::InitApply(service("dropped", "1")),
            watcher::Event::InitDone,
        ] {
            translate(&store, &mut relisted, &event);
            writer.apply_watcher_event(&event);
        }
        assert_eq!(store.state().len(), 2);

        let mut seen = Vec::new();
        for event in [
            watcher::Event::Init,
            watcher::Event::InitApply(service("kept", "2")),
            watcher::Event::InitApply(service("new", "1")),
            watcher::Event::InitDone,
        ] {
            seen.extend(translate(&store, &mut relisted, &event));
            writer.apply_watcher_event(&event);
        }

        assert_eq!(
            names(&seen),
            vec![
                ("update", "kept".to_string()),
                ("add", "new".to_string()),
                ("delete", "dropped".to_string()),
            ]
        );
        assert!(relisted.is_empty());
    }

    #[tokio::test]
    async fn test_wait_for_sync() {
        let a = CancellationToken::new();
        let b = CancellationToken::new();
        a.cancel();

        let pending = wait_for_sync(&[a.clone(), b.clone()], Duration::from_millis(10)).await;
        assert!(matches!(pending, Err(Error::SyncTimeout(_))));

        b.cancel();
        assert!(wait_for_sync(&[a, b], Duration::from_millis(10)).await.is_ok());
    }

    #[tokio::test]
    async fn test_first_init_done_marks_synced() {
        let mut informer = Informer::new(Api::<Service>::all(test_client()), Default::default());
        let synced = informer.synced();
        let handler = RecordingHandler::default();

        informer.process(watcher::Event::Init, &handler).await;
        informer
            .process(watcher::Event::InitApply(service("a", "1")), &handler)
            .await;
        assert!(!informer.has_synced());
        assert!(!synced.is_cancelled());

        informer.process(watcher::Event::InitDone, &handler).await;
        assert!(informer.has_synced());
        assert!(synced.is_cancelled());
        assert_eq!(handler.take(), vec![("add", "a".to_string())]);
        assert_eq!(informer.reader().state().len(), 1);
    }

    #[test]
    fn test_mark_synced_only_on_first_init_done() {
        let synced = CancellationToken::new();

        assert!(!mark_synced(&synced, &watcher::Event::Apply(service("a", "1"))));
        assert!(!mark_synced::<Service>(&synced, &watcher::Event::Init));
        assert!(!synced.is_cancelled());

        assert!(mark_synced::<Service>(&synced, &watcher::Event::InitDone));
        assert!(synced.is_cancelled());
        // a later relist keeps the cache synced without reporting it again
        assert!(!mark_synced::<Service>(&synced, &watcher::Event::InitDone));
        assert!(synced.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_resync_redelivers_after_sync() {
        let (store, mut writer) = reflector::store();
        for name in ["a", "b"] {
            writer.apply_watcher_event(&watcher::Event::Apply(service(name, "1")));
        }
        let handler = RecordingHandler::default();
        let synced = CancellationToken::new();
        let period = Duration::from_secs(10);
        let mut timer = resync_timer(Some(period));

        // several periods pass without a tick while the cache is unsynced
        let early = tokio::time::timeout(period * 3, next_resync(&mut timer, &synced)).await;
        assert!(early.is_err());

        synced.cancel();
        next_resync(&mut timer, &synced).await;
        resync(&store, &handler).await;
        let mut seen = handler.take();
        seen.sort();
        assert_eq!(seen, vec![("add", "a".to_string()), ("add", "b".to_string())]);

        // then once per period
        let before = tokio::time::timeout(
            period - Duration::from_secs(1),
            next_resync(&mut timer, &synced),
        )
        .await;
        assert!(before.is_err());
        let due =
            tokio::time::timeout(Duration::from_secs(2), next_resync(&mut timer, &synced)).await;
        assert!(due.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_resync_disabled() {
        let synced = CancellationToken::new();
        synced.cancel();

        for period in [None, Some(Duration::ZERO)] {
            let mut timer = resync_timer(period);
            assert!(timer.is_none());
            let tick = tokio::time::timeout(
                Duration::from_secs(3600),
                next_resync(&mut timer, &synced),
            )
            .await;
            assert!(tick.is_err());
        }
    }
}
