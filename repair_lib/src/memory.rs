use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use repair_data::{Job, JobDetails, JobId, JobStatus, Principal, UserProfile, UserRole};
use tokio::{sync::Mutex, time::sleep};
use tracing::{info, instrument};

use crate::{
    error::RemoteError,
    service::{JobService, RemoteResult},
};

struct Backend {
    // issued from 1, never reused
    next_job_id: AtomicU64,
    jobs: Mutex<HashMap<JobId, Job>>,
    profiles: Mutex<HashMap<Principal, UserProfile>>,
    roles: Mutex<HashMap<Principal, UserRole>>,
    requests: AtomicUsize,
    failures: Mutex<VecDeque<RemoteError>>,
    latency: Mutex<Option<Duration>>,
}

/// Process local job service.
///
/// Handles created with [`InMemoryJobService::as_caller`] share one backend, so
/// several identities can observe each other's writes. Nothing is authorized:
/// every caller may read and write everything.
#[derive(Clone)]
pub struct InMemoryJobService {
    caller: Principal,
    backend: Arc<Backend>,
}

impl InMemoryJobService {
    pub fn new(caller: Principal) -> Self {
        Self {
            caller,
            backend: Arc::new(Backend {
                next_job_id: AtomicU64::new(1),
                jobs: Mutex::new(HashMap::new()),
                profiles: Mutex::new(HashMap::new()),
                roles: Mutex::new(HashMap::new()),
                requests: AtomicUsize::new(0),
                failures: Mutex::new(VecDeque::new()),
                latency: Mutex::new(None),
            }),
        }
    }

    /// another handle on the same backend, authenticated as `caller`
    pub fn as_caller(&self, caller: Principal) -> Self {
        Self {
            caller,
            backend: self.backend.clone(),
        }
    }

    pub fn caller(&self) -> &Principal {
        &self.caller
    }

    /// number of requests received so far, across all handles
    pub fn request_count(&self) -> usize {
        self.backend.requests.load(Ordering::SeqCst)
    }

    /// the next request fails with `error` instead of being served
    pub async fn fail_next(&self, error: RemoteError) {
        self.backend.failures.lock().await.push_back(error);
    }

    /// delay applied to every request before it is served
    pub async fn set_latency(&self, latency: Option<Duration>) {
        *self.backend.latency.lock().await = latency;
    }

    async fn begin_request(&self) -> RemoteResult<()> {
        self.backend.requests.fetch_add(1, Ordering::SeqCst);
        let latency = *self.backend.latency.lock().await;
        if let Some(latency) = latency {
            sleep(latency).await;
        }
        match self.backend.failures.lock().await.pop_front() {
            Some(error) => {
                info!("injected failure: {}", error);
                Err(error)
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl JobService for InMemoryJobService {
    #[instrument(skip(self))]
    async fn list_jobs(&self) -> RemoteResult<Vec<Job>> {
        self.begin_request().await?;
        let jobs = self.backend.jobs.lock().await;
        Ok(jobs.values().cloned().collect())
    }

    #[instrument(skip(self))]
    async fn get_job(&self, job_id: JobId) -> RemoteResult<Option<Job>> {
        self.begin_request().await?;
        Ok(self.backend.jobs.lock().await.get(&job_id).cloned())
    }

    #[instrument(skip(self, details))]
    async fn create_job(&self, details: JobDetails) -> RemoteResult<JobId> {
        self.begin_request().await?;
        let job_id = self.backend.next_job_id.fetch_add(1, Ordering::SeqCst);
        let job = details.into_job(job_id, JobStatus::Pending);
        self.backend.jobs.lock().await.insert(job_id, job);
        info!("created job {}", job_id);
        Ok(job_id)
    }

    #[instrument(skip(self, details))]
    async fn update_job(
        &self,
        job_id: JobId,
        details: JobDetails,
        status: JobStatus,
    ) -> RemoteResult<()> {
        self.begin_request().await?;
        let mut jobs = self.backend.jobs.lock().await;
        match jobs.get_mut(&job_id) {
            Some(job) => {
                *job = details.into_job(job_id, status);
                Ok(())
            }
            None => Err(RemoteError::Rejected {
                status: 404,
                message: format!("job {} not found", job_id),
            }),
        }
    }

    #[instrument(skip(self))]
    async fn delete_job(&self, job_id: JobId) -> RemoteResult<()> {
        self.begin_request().await?;
        match self.backend.jobs.lock().await.remove(&job_id) {
            Some(_) => Ok(()),
            None => Err(RemoteError::Rejected {
                status: 404,
                message: format!("job {} not found", job_id),
            }),
        }
    }

    #[instrument(skip(self))]
    async fn get_caller_user_profile(&self) -> RemoteResult<Option<UserProfile>> {
        self.begin_request().await?;
        Ok(self.backend.profiles.lock().await.get(&self.caller).cloned())
    }

    #[instrument(skip(self))]
    async fn save_caller_user_profile(&self, profile: UserProfile) -> RemoteResult<()> {
        self.begin_request().await?;
        self.backend
            .profiles
            .lock()
            .await
            .insert(self.caller.clone(), profile);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_user_profile(&self, user: Principal) -> RemoteResult<Option<UserProfile>> {
        self.begin_request().await?;
        Ok(self.backend.profiles.lock().await.get(&user).cloned())
    }

    #[instrument(skip(self))]
    async fn get_caller_user_role(&self) -> RemoteResult<UserRole> {
        self.begin_request().await?;
        let roles = self.backend.roles.lock().await;
        Ok(roles.get(&self.caller).copied().unwrap_or(UserRole::Guest))
    }

    #[instrument(skip(self))]
    async fn is_caller_admin(&self) -> RemoteResult<bool> {
        self.begin_request().await?;
        let roles = self.backend.roles.lock().await;
        Ok(roles.get(&self.caller) == Some(&UserRole::Admin))
    }

    #[instrument(skip(self))]
    async fn assign_caller_user_role(&self, user: Principal, role: UserRole) -> RemoteResult<()> {
        self.begin_request().await?;
        self.backend.roles.lock().await.insert(user, role);
        Ok(())
    }
}
