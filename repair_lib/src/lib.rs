pub mod cache;
pub mod config;
pub mod error;
pub mod filter;
pub mod form;
pub mod http;
pub mod memory;
pub mod query;
pub mod retry;
pub mod service;
pub mod session;
pub mod store;

pub use repair_data::{Job, JobDetails, JobId, JobStatus, Principal, UserProfile, UserRole};

pub use crate::{
    cache::{QueryCache, QueryKey},
    config::Config,
    error::{Error, RemoteError, Result},
    filter::{filter_and_sort, FilterCriteria, JobStats, StatusFilter},
    form::{EditorMode, FormError, JobForm},
    http::HttpJobService,
    memory::InMemoryJobService,
    query::{FetchStatus, QueryState},
    retry::RetryPolicy,
    service::JobService,
    session::{Session, SessionHandle, SessionState},
    store::RepairStore,
};

#[cfg(test)]
mod test_support;
