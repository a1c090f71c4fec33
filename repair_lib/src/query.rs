use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    Idle,
    Loading,
    Success,
    Error,
}

/// What a read hands to the view: the data if any, and enough state to tell
/// "still loading" apart from "failed" and from "empty".
#[derive(Debug, Clone, PartialEq)]
pub struct QueryState<T> {
    pub status: FetchStatus,
    pub data: Option<T>,
    pub error: Option<Error>,
    /// a fetch has completed at least once
    pub fetched: bool,
    pub stale: bool,
}

impl<T> QueryState<T> {
    /// disabled because the query cannot run yet (no id to load)
    pub fn idle() -> Self {
        Self {
            status: FetchStatus::Idle,
            data: None,
            error: None,
            fetched: false,
            stale: false,
        }
    }

    /// disabled because the session is absent or still initializing
    pub fn waiting_for_session() -> Self {
        Self {
            status: FetchStatus::Loading,
            ..Self::idle()
        }
    }

    pub fn success(data: T) -> Self {
        Self {
            status: FetchStatus::Success,
            data: Some(data),
            error: None,
            fetched: true,
            stale: false,
        }
    }

    pub fn failed(error: Error) -> Self {
        Self {
            status: FetchStatus::Error,
            data: None,
            error: Some(error),
            fetched: true,
            stale: false,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.status == FetchStatus::Loading
    }

    pub fn is_error(&self) -> bool {
        self.status == FetchStatus::Error
    }

    pub fn is_success(&self) -> bool {
        self.status == FetchStatus::Success
    }

    pub fn is_fetched(&self) -> bool {
        self.fetched
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    pub fn into_result(self) -> Option<Result<T, Error>> {
        match (self.data, self.error) {
            (_, Some(error)) => Some(Err(error)),
            (Some(data), None) => Some(Ok(data)),
            (None, None) => None,
        }
    }

    pub fn map<U, F>(self, f: F) -> QueryState<U>
    where
        F: FnOnce(T) -> U,
    {
        QueryState {
            status: self.status,
            data: self.data.map(f),
            error: self.error,
            fetched: self.fetched,
            stale: self.stale,
        }
    }
}

#[cfg(test)]
mod test {
    use super::{FetchStatus, QueryState};
    use crate::error::Error;

    // unavailable must never look like an empty result
    #[test]
    fn test_waiting_for_session_is_loading() {
        let state: QueryState<Vec<u64>> = QueryState::waiting_for_session();
        assert!(state.is_loading());
        assert!(!state.is_fetched());
        assert_eq!(None, state.data());
        assert_eq!(None, state.into_result());
    }

    #[test]
    fn test_failed_state() {
        let state: QueryState<u64> = QueryState::failed(Error::SessionUnavailable);
        assert!(state.is_error());
        assert!(state.is_fetched());
        assert_eq!(Some(&Error::SessionUnavailable), state.error());
        assert_eq!(Some(Err(Error::SessionUnavailable)), state.into_result());
    }

    #[test]
    fn test_map_keeps_flags() {
        let state = QueryState::success(vec![1_u64, 2]).map(|v| v.len());
        assert_eq!(FetchStatus::Success, state.status);
        assert_eq!(Some(&2), state.data());
        assert_eq!(QueryState::<u64>::idle().status, FetchStatus::Idle);
    }
}
