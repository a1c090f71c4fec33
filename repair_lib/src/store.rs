use std::{
    future::Future,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use repair_data::{Job, JobDetails, JobId, JobStatus, Principal, UserProfile, UserRole};
use tracing::{error, info, instrument, warn};

use crate::{
    cache::{QueryCache, QueryKey},
    config::Config,
    error::{Error, RemoteError, Result},
    query::QueryState,
    retry::RetryPolicy,
    service::{JobService, RemoteResult},
    session::{Session, SessionHandle},
};

/// Cache keys a successful mutation makes obsolete.
struct Affected {
    invalidate: Vec<QueryKey>,
    evict: Vec<QueryKey>,
}

impl Affected {
    fn invalidate(keys: Vec<QueryKey>) -> Self {
        Self {
            invalidate: keys,
            evict: Vec::new(),
        }
    }
}

struct PendingMutation(Arc<AtomicUsize>);

impl PendingMutation {
    fn begin(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter.clone())
    }
}

impl Drop for PendingMutation {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Data access for the views: cached reads and cache-consistent writes
/// against the job service of the current session.
///
/// Reads check the session on every call. While no handle exists they report
/// loading rather than an empty result; writes fail with
/// [`Error::SessionUnavailable`] and send nothing.
#[derive(Clone)]
pub struct RepairStore {
    session: Arc<Session>,
    cache: QueryCache,
    query_retry: RetryPolicy,
    pending_mutations: Arc<AtomicUsize>,
}

impl RepairStore {
    pub fn new(session: Arc<Session>, query_retry: RetryPolicy) -> Self {
        Self {
            session,
            cache: QueryCache::new(),
            query_retry,
            pending_mutations: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn from_config(session: Arc<Session>, config: &Config) -> Self {
        Self::new(session, config.query_retry)
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// current handle, after dropping cache entries of any earlier session
    fn handle(&self) -> Option<SessionHandle> {
        let state = self.session.current();
        self.cache.reset(state.generation());
        state.handle().cloned()
    }

    async fn read<T, F, Fut>(&self, key: QueryKey, retry: RetryPolicy, fetch: F) -> QueryState<T>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn(Arc<dyn JobService>) -> Fut,
        Fut: Future<Output = RemoteResult<T>> + Send + 'static,
    {
        let handle = match self.handle() {
            Some(handle) => handle,
            None => {
                info!("{} waits for a session", key);
                return QueryState::waiting_for_session();
            }
        };
        let service = handle.service;
        self.cache
            .fetch_or_serve(key, handle.generation, retry, || fetch(service.clone()))
            .await
    }

    async fn mutate<T, F, Fut>(&self, call: F, affected: Affected) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(Arc<dyn JobService>) -> Fut + Send + 'static,
        Fut: Future<Output = RemoteResult<T>> + Send + 'static,
    {
        let handle = match self.handle() {
            Some(handle) => handle,
            None => {
                warn!("mutation attempted without a session");
                return Err(Error::SessionUnavailable);
            }
        };
        let cache = self.cache.clone();
        let pending = PendingMutation::begin(&self.pending_mutations);
        // runs to completion even if the caller goes away, so the cache
        // never misses the invalidation of a write that reached the service
        let task = tokio::spawn(async move {
            let _pending = pending;
            let result = call(handle.service).await;
            if result.is_ok() && cache.generation() == handle.generation {
                for key in &affected.invalidate {
                    cache.invalidate(key);
                }
                for key in &affected.evict {
                    cache.evict(key);
                }
            }
            result
        });
        match task.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(remote)) => {
                error!("mutation failed: {}", remote);
                Err(remote.into())
            }
            Err(join_error) => {
                error!("mutation task failed: {}", join_error);
                Err(RemoteError::Transport(join_error.to_string()).into())
            }
        }
    }

    /// every job visible to the caller
    #[instrument(skip(self))]
    pub async fn list_jobs(&self) -> QueryState<Vec<Job>> {
        self.read(QueryKey::Jobs, self.query_retry, |service| async move {
            service.list_jobs().await
        })
        .await
    }

    /// one job; data is `Some(None)` once the service says it does not exist.
    /// Stays idle until there is an id to load.
    #[instrument(skip(self))]
    pub async fn get_job(&self, job_id: Option<JobId>) -> QueryState<Option<Job>> {
        if self.session.current().handle().is_none() {
            return QueryState::waiting_for_session();
        }
        let job_id = match job_id {
            Some(job_id) => job_id,
            None => return QueryState::idle(),
        };
        self.read(QueryKey::Job(job_id), self.query_retry, move |service| async move {
            service.get_job(job_id).await
        })
        .await
    }

    #[instrument(skip(self))]
    pub async fn create_job(&self, details: JobDetails) -> Result<JobId> {
        info!("create job for {}", details.customer_name);
        let job_id = self
            .mutate(
                move |service| async move { service.create_job(details).await },
                Affected::invalidate(vec![QueryKey::Jobs]),
            )
            .await?;
        info!("created job {}", job_id);
        Ok(job_id)
    }

    #[instrument(skip(self))]
    pub async fn update_job(
        &self,
        job_id: JobId,
        details: JobDetails,
        status: JobStatus,
    ) -> Result<()> {
        self.mutate(
            move |service| async move { service.update_job(job_id, details, status).await },
            Affected::invalidate(vec![QueryKey::Jobs, QueryKey::Job(job_id)]),
        )
        .await?;
        info!("updated job");
        Ok(())
    }

    /// the detail entry is evicted too, a later `get_job` asks the service again
    #[instrument(skip(self))]
    pub async fn delete_job(&self, job_id: JobId) -> Result<()> {
        self.mutate(
            move |service| async move { service.delete_job(job_id).await },
            Affected {
                invalidate: vec![QueryKey::Jobs],
                evict: vec![QueryKey::Job(job_id)],
            },
        )
        .await?;
        info!("deleted job");
        Ok(())
    }

    /// never retried: a failure must stay visible instead of looking like "no profile yet"
    #[instrument(skip(self))]
    pub async fn get_caller_user_profile(&self) -> QueryState<Option<UserProfile>> {
        self.read(QueryKey::CallerProfile, RetryPolicy::never(), |service| async move {
            service.get_caller_user_profile().await
        })
        .await
    }

    #[instrument(skip(self))]
    pub async fn save_caller_user_profile(&self, profile: UserProfile) -> Result<()> {
        self.mutate(
            move |service| async move { service.save_caller_user_profile(profile).await },
            Affected::invalidate(vec![QueryKey::CallerProfile]),
        )
        .await
    }

    #[instrument(skip(self))]
    pub async fn get_user_profile(&self, user: Principal) -> QueryState<Option<UserProfile>> {
        let key = QueryKey::UserProfile(user.clone());
        self.read(key, self.query_retry, move |service| {
            let user = user.clone();
            async move { service.get_user_profile(user).await }
        })
        .await
    }

    #[instrument(skip(self))]
    pub async fn get_caller_user_role(&self) -> QueryState<UserRole> {
        self.read(QueryKey::CallerRole, self.query_retry, |service| async move {
            service.get_caller_user_role().await
        })
        .await
    }

    #[instrument(skip(self))]
    pub async fn is_caller_admin(&self) -> QueryState<bool> {
        self.read(QueryKey::IsCallerAdmin, self.query_retry, |service| async move {
            service.is_caller_admin().await
        })
        .await
    }

    #[instrument(skip(self))]
    pub async fn assign_caller_user_role(&self, user: Principal, role: UserRole) -> Result<()> {
        self.mutate(
            move |service| async move { service.assign_caller_user_role(user, role).await },
            Affected::invalidate(vec![
                QueryKey::CallerRole,
                QueryKey::IsCallerAdmin,
            ]),
        )
        .await
    }

    /// cached job list without fetching
    pub fn peek_jobs(&self) -> QueryState<Vec<Job>> {
        match self.handle() {
            Some(_) => self.cache.peek(&QueryKey::Jobs),
            None => QueryState::waiting_for_session(),
        }
    }

    /// cached job detail without fetching
    pub fn peek_job(&self, job_id: JobId) -> QueryState<Option<Job>> {
        match self.handle() {
            Some(_) => self.cache.peek(&QueryKey::Job(job_id)),
            None => QueryState::waiting_for_session(),
        }
    }

    /// a create/update/delete/save is still on its way
    pub fn is_mutating(&self) -> bool {
        self.pending_mutations.load(Ordering::SeqCst) > 0
    }
}
