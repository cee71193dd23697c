mod cluster;
mod error;
pub mod memory;
pub mod pipeline_run;
pub mod repository;
pub mod selector;

pub use cluster::Cluster;
pub use error::{ClusterError, Result};
pub use memory::MemoryCluster;
pub use pipeline_run::{
    ChildStatus, Condition, ConditionStatus, PipelineRun, PipelineRunPatch, PipelineRunStatus,
    SpecStatus, State, split_key,
};
pub use repository::{
    GitProvider, Incoming, Param, Policy, Repository, RepositoryRunStatus, RepositorySettings,
    RepositorySpec, SecretRef,
};
pub use selector::LabelSelector;
