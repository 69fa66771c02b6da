use std::fmt;

use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteOp {
    Create,
    Update,
    Patch,
    Delete,
}

impl fmt::Display for WriteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            WriteOp::Create => "create",
            WriteOp::Update => "update",
            WriteOp::Patch => "patch",
            WriteOp::Delete => "delete",
        };
        f.write_str(op)
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("kube utils error: {0}")]
    KubeUtils(#[from] autoexpose_k8s_utils::Error),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("encountered invalid resource: {0}")]
    InvalidResource(String),

    #[error("{kind} {namespace}/{name} already exists")]
    AlreadyExists {
        kind: &'static str,
        namespace: String,
        name: String,
    },

    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: &'static str,
        namespace: String,
        name: String,
    },

    #[error("failed to {op} {kind} {namespace}/{name}: {source}")]
    Write {
        op: WriteOp,
        kind: &'static str,
        namespace: String,
        name: String,
        #[source]
        source: kube::Error,
    },

    #[error("task failed: {0}")]
    Task(String),
}

impl Error {
    /// Short, low-cardinality label for failure counters.
    pub fn metric_label(&self) -> String {
        match self {
            Error::KubeUtils(_) => "kube_utils".into(),
            Error::InvalidArgument(_) => "invalid_argument".into(),
            Error::InvalidResource(_) => "invalid_resource".into(),
            Error::AlreadyExists { .. } => "already_exists".into(),
            Error::NotFound { .. } => "not_found".into(),
            Error::Write { op, .. } => format!("{op}_failed"),
            Error::Task(_) => "task".into(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
