use std::borrow::Cow;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

use autoexpose_k8s_utils::EventHandler;
use kube::Resource;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::Histogram;
use prometheus_client::registry::{Registry, Unit};
use tokio::time::Instant;

use crate::{Error, Result};

pub static REGISTRY: LazyLock<RwLock<Registry>> =
    LazyLock::new(|| RwLock::new(Registry::with_prefix("autoexpose")));

#[derive(Clone)]
pub struct ControllerMetrics {
    pub events: Family<EventLabels, Counter>,
    pub failures: Family<ErrorLabels, Counter>,
    pub duration: Histogram,
}

impl ControllerMetrics {
    pub fn new(controller_name: &str) -> Self {
        let mut guard = REGISTRY.write().unwrap_or_else(PoisonError::into_inner);
        let registry = guard.sub_registry_with_label((
            Cow::Borrowed("controller_name"),
            Cow::Owned(controller_name.into()),
        ));
        let events = Family::<EventLabels, Counter>::default();
        let failures = Family::<ErrorLabels, Counter>::default();
        let duration = Histogram::new([0.01, 0.1, 0.25, 0.5, 1.0, 5.0, 15.0, 60.0].into_iter());

        registry.register_with_unit(
            "event_handling_duration",
            "event handling duration",
            Unit::Seconds,
            duration.clone(),
        );
        registry.register(
            "event_failures",
            "Number of events whose handling failed",
            failures.clone(),
        );
        registry.register("events", "Number of handled events", events.clone());
        Self {
            events,
            failures,
            duration,
        }
    }

    pub fn count_failure<K>(&self, e: &Error)
    where
        K: Resource<DynamicType = ()>,
    {
        self.failures
            .get_or_create(&ErrorLabels {
                resource: K::kind(&()).to_lowercase(),
                error: e.metric_label(),
            })
            .inc();
    }

    pub fn count_and_measure<K>(&self, action: &str) -> HandlerMeasurer
    where
        K: Resource<DynamicType = ()>,
    {
        self.events
            .get_or_create(&EventLabels {
                resource: K::kind(&()).to_lowercase(),
                action: action.into(),
            })
            .inc();
        HandlerMeasurer {
            start: Instant::now(),
            metric: self.duration.clone(),
        }
    }
}

pub struct HandlerMeasurer {
    start: Instant,
    metric: Histogram,
}

impl Drop for HandlerMeasurer {
    fn drop(&mut self) {
        #[allow(clippy::cast_precision_loss)]
        let duration = self.start.elapsed().as_millis() as f64 / 1000.0;
        self.metric.observe(duration);
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct EventLabels {
    pub resource: String,
    pub action: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ErrorLabels {
    pub resource: String,
    pub error: String,
}

/// Wraps a handler and records counts, failures and duration of every event
/// it handles.
pub struct Measured<H> {
    inner: H,
    metrics: ControllerMetrics,
}

impl<H> Measured<H> {
    pub fn new(inner: H, metrics: ControllerMetrics) -> Self {
        Self { inner, metrics }
    }

    fn record<K: Resource<DynamicType = ()>>(&self, result: Result<()>) -> Result<()> {
        if let Err(e) = &result {
            self.metrics.count_failure::<K>(e);
        }
        result
    }
}

impl<K, H> EventHandler<K> for Measured<H>
where
    K: Resource<DynamicType = ()> + Send + Sync + 'static,
    H: EventHandler<K, Error = Error>,
{
    type Error = Error;

    async fn on_add(&self, obj: Arc<K>) -> Result<()> {
        let _timer = self.metrics.count_and_measure::<K>("add");
        let result = self.inner.on_add(obj).await;
        self.record::<K>(result)
    }

    async fn on_update(&self, old: Arc<K>, new: Arc<K>) -> Result<()> {
        let _timer = self.metrics.count_and_measure::<K>("update");
        let result = self.inner.on_update(old, new).await;
        self.record::<K>(result)
    }

    async fn on_delete(&self, obj: Arc<K>) -> Result<()> {
        let _timer = self.metrics.count_and_measure::<K>("delete");
        let result = self.inner.on_delete(obj).await;
        self.record::<K>(result)
    }
}
