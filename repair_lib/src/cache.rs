use std::{
    any::Any,
    collections::HashMap,
    fmt,
    future::Future,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use repair_data::{JobId, Principal};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    error::{Error, RemoteError},
    query::{FetchStatus, QueryState},
    retry::RetryPolicy,
    service::RemoteResult,
};

/// Identifies one cached read: the operation and its arguments.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum QueryKey {
    Jobs,
    Job(JobId),
    CallerProfile,
    UserProfile(Principal),
    CallerRole,
    IsCallerAdmin,
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryKey::Jobs => write!(f, "jobs"),
            QueryKey::Job(job_id) => write!(f, "job/{}", job_id),
            QueryKey::CallerProfile => write!(f, "currentUserProfile"),
            QueryKey::UserProfile(user) => write!(f, "userProfile/{}", user),
            QueryKey::CallerRole => write!(f, "callerRole"),
            QueryKey::IsCallerAdmin => write!(f, "isCallerAdmin"),
        }
    }
}

type Value = Arc<dyn Any + Send + Sync>;

struct Entry {
    status: FetchStatus,
    value: Option<Value>,
    error: Option<Error>,
    fetched: bool,
    stale: bool,
    // bumped by invalidate/evict, lets an in-flight fetch notice it was overtaken
    version: u64,
    // fetches written back so far, lets a waiter reuse the outcome it waited for
    completed: u64,
    // held for the whole fetch, one fetch per key at a time
    flight: Arc<tokio::sync::Mutex<()>>,
}

impl Entry {
    fn new() -> Self {
        Self {
            status: FetchStatus::Idle,
            value: None,
            error: None,
            fetched: false,
            stale: false,
            version: 0,
            completed: 0,
            flight: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    fn state<T: Clone + 'static>(&self) -> QueryState<T> {
        QueryState {
            status: self.status,
            data: self
                .value
                .as_ref()
                .and_then(|value| value.downcast_ref::<T>())
                .cloned(),
            error: self.error.clone(),
            fetched: self.fetched,
            stale: self.stale,
        }
    }

    fn fresh<T: Clone + 'static>(&self) -> Option<T> {
        if self.status != FetchStatus::Success || self.stale {
            return None;
        }
        self.value
            .as_ref()
            .and_then(|value| value.downcast_ref::<T>())
            .cloned()
    }
}

struct Entries {
    generation: u64,
    by_key: HashMap<QueryKey, Entry>,
}

/// Client side cache of remote reads.
///
/// Entries belong to one session generation; when the generation moves on the
/// whole map is dropped. Concurrent reads of the same key share one fetch.
#[derive(Clone)]
pub struct QueryCache {
    entries: Arc<Mutex<Entries>>,
}

impl QueryCache {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(Entries {
                generation: 0,
                by_key: HashMap::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        // every write is a single assignment, a poisoned map is still consistent
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// drops every entry once a newer generation shows up, older ones are ignored
    pub fn reset(&self, generation: u64) {
        let mut entries = self.lock();
        if generation > entries.generation {
            info!(
                "session generation {} -> {}, dropping {} cache entries",
                entries.generation,
                generation,
                entries.by_key.len()
            );
            entries.generation = generation;
            entries.by_key.clear();
        }
    }

    /// cached state of `key` without fetching
    pub fn peek<T: Clone + 'static>(&self, key: &QueryKey) -> QueryState<T> {
        self.lock()
            .by_key
            .get(key)
            .map(|entry| entry.state())
            .unwrap_or_else(QueryState::idle)
    }

    /// next read of `key` fetches again
    pub fn invalidate(&self, key: &QueryKey) {
        if let Some(entry) = self.lock().by_key.get_mut(key) {
            info!("invalidated {}", key);
            entry.stale = true;
            entry.version += 1;
        }
    }

    /// forgets the value of `key`, the next read starts from idle
    pub fn evict(&self, key: &QueryKey) {
        if let Some(entry) = self.lock().by_key.get_mut(key) {
            info!("evicted {}", key);
            if entry.status != FetchStatus::Loading {
                entry.status = FetchStatus::Idle;
            }
            entry.value = None;
            entry.error = None;
            entry.fetched = false;
            entry.stale = false;
            entry.version += 1;
        }
    }

    /// Serves `key` from the cache if a fresh value exists, otherwise fetches it.
    ///
    /// The remote call runs on its own task: if this future is dropped the call
    /// still completes at the service, but its result is not written back.
    pub async fn fetch_or_serve<T, F, Fut>(
        &self,
        key: QueryKey,
        generation: u64,
        retry: RetryPolicy,
        fetch: F,
    ) -> QueryState<T>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn() -> Fut,
        Fut: Future<Output = RemoteResult<T>> + Send + 'static,
    {
        self.reset(generation);
        let waiting = {
            let mut entries = self.lock();
            if entries.generation != generation {
                None
            } else {
                let entry = entries.by_key.entry(key.clone()).or_insert_with(Entry::new);
                if let Some(value) = entry.fresh::<T>() {
                    info!("serving {} from cache", key);
                    return QueryState::success(value);
                }
                Some((entry.flight.clone(), Seen::of(entry)))
            }
        };
        let (flight, seen) = match waiting {
            Some(waiting) => waiting,
            None => {
                info!("{} read under an older session, bypassing the cache", key);
                let mut state = match fetch_with_retry(&key, retry, &fetch).await {
                    Ok(value) => QueryState::success(value),
                    Err(error) => QueryState::failed(error),
                };
                state.stale = true;
                return state;
            }
        };

        let _flight = flight.lock().await;
        let mut loading = match self.begin_loading::<T>(&key, generation, seen) {
            Ok(loading) => loading,
            Err(state) => return state,
        };

        let result = fetch_with_retry(&key, retry, &fetch).await;
        loading.finish(result)
    }

    fn begin_loading<T: Clone + 'static>(
        &self,
        key: &QueryKey,
        generation: u64,
        seen: Seen,
    ) -> Result<Loading<'_>, QueryState<T>> {
        let mut entries = self.lock();
        let entry = entries.by_key.entry(key.clone()).or_insert_with(Entry::new);
        if let Some(value) = entry.fresh::<T>() {
            return Err(QueryState::success(value));
        }
        // a fetch finished while we waited and nothing invalidated it since,
        // its outcome is ours too, failures included
        if entry.completed > seen.completed && entry.version == seen.version {
            info!("{} shares the outcome of the fetch it waited for", key);
            return Err(entry.state());
        }
        let previous = entry.status;
        entry.status = FetchStatus::Loading;
        Ok(Loading {
            cache: self,
            key: key.clone(),
            generation,
            version: entry.version,
            previous,
            done: false,
        })
    }
}

/// Entry counters observed before waiting for the flight lock.
#[derive(Clone, Copy)]
struct Seen {
    version: u64,
    completed: u64,
}

impl Seen {
    fn of(entry: &Entry) -> Self {
        Self {
            version: entry.version,
            completed: entry.completed,
        }
    }
}

async fn fetch_with_retry<T, F, Fut>(
    key: &QueryKey,
    retry: RetryPolicy,
    fetch: &F,
) -> Result<T, Error>
where
    T: Send + 'static,
    F: Fn() -> Fut,
    Fut: Future<Output = RemoteResult<T>> + Send + 'static,
{
    info!("fetching {}", key);
    let mut retries = 0;
    let result = loop {
        let result = match tokio::spawn(fetch()).await {
            Ok(result) => result,
            Err(join_error) => Err(RemoteError::Transport(format!(
                "fetch task for {} failed: {}",
                key, join_error
            ))),
        };
        match result {
            Err(err) if err.is_retriable() && retry.allows_retry(retries) => {
                retries += 1;
                let delay = retry.delay_for(retries);
                warn!(
                    "fetching {} failed ({}), retry {}/{} in {:?}",
                    key, err, retries, retry.max_retries, delay
                );
                sleep(delay).await;
            }
            other => break other,
        }
    };
    result.map_err(Error::from)
}

/// Marks an entry as loading; puts the previous status back if the fetch is
/// abandoned before it finishes.
struct Loading<'a> {
    cache: &'a QueryCache,
    key: QueryKey,
    generation: u64,
    version: u64,
    previous: FetchStatus,
    done: bool,
}

impl<'a> Loading<'a> {
    fn finish<T: Clone + Send + Sync + 'static>(
        &mut self,
        result: Result<T, Error>,
    ) -> QueryState<T> {
        self.done = true;
        let mut entries = self.cache.lock();
        if entries.generation != self.generation {
            info!("discarding {} fetched under an older session", self.key);
            let mut state = match result {
                Ok(value) => QueryState::success(value),
                Err(error) => QueryState::failed(error),
            };
            state.stale = true;
            return state;
        }
        let entry = entries
            .by_key
            .entry(self.key.clone())
            .or_insert_with(Entry::new);
        // invalidated or evicted while in flight, keep the result but refetch next time
        let overtaken = entry.version != self.version;
        entry.fetched = true;
        entry.stale = overtaken;
        entry.completed += 1;
        match result {
            Ok(value) => {
                info!("fetched {}", self.key);
                entry.status = FetchStatus::Success;
                entry.value = Some(Arc::new(value));
                entry.error = None;
            }
            Err(error) => {
                warn!("fetching {} failed: {}", self.key, error);
                entry.status = FetchStatus::Error;
                entry.error = Some(error);
            }
        }
        entry.state()
    }
}

impl<'a> Drop for Loading<'a> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        let mut entries = self.cache.lock();
        if entries.generation != self.generation {
            return;
        }
        if let Some(entry) = entries.by_key.get_mut(&self.key) {
            info!("fetch of {} abandoned", self.key);
            entry.status = if entry.version == self.version {
                self.previous
            } else if entry.value.is_some() {
                FetchStatus::Success
            } else {
                FetchStatus::Idle
            };
        }
    }
}
