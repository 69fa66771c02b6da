mod config;
mod context;
mod error;
mod exposed;
mod index;
mod ingress;
pub mod metrics;
mod naming;
mod policy;
mod route;
mod runtime;
mod service;
mod utils;
mod workload;
mod writer;

#[cfg(test)]
mod testing;

pub use config::{
    Config, DEFAULT_EXCLUDED_NAMESPACES, DEFAULT_EXTERNAL_ACCESS_ANNOTATION,
    DEFAULT_MANAGED_BY_ANNOTATION, DEFAULT_ROUTE_PREFIX, DEFAULT_SERVICE_PREFIX,
    DEFAULT_SYNC_TIMEOUT,
};
pub use context::Context;
pub use error::{Error, Result, WriteOp};
pub use index::{ExistingResourceIndex, StoreIndex};
pub use ingress::RouteObserver;
pub use naming::NameScheme;
pub use policy::EligibilityPolicy;
pub use route::{Backend, BackendPatch};
pub use runtime::start_engine;
pub use service::ServiceReconciler;
pub use workload::WorkloadReconciler;
pub use writer::{KubeWriter, ResourceWriter};
