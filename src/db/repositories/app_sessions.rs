use chrono::{DateTime, Utc};
use log::warn;

use crate::db::{models::AppSession, store::KvStore};

use super::APP_SESSIONS_KEY;

#[derive(Clone)]
pub struct SessionRepository {
    store: KvStore,
}

impl SessionRepository {
    pub fn new(store: KvStore) -> Self {
        Self { store }
    }

    pub async fn list_sessions(&self) -> Vec<AppSession> {
        self.store.get(APP_SESSIONS_KEY, Vec::new()).await
    }

    pub async fn create_session(&self, session: &AppSession) {
        let record = session.clone();
        self.store
            .update(APP_SESSIONS_KEY, move |sessions: &mut Vec<AppSession>| {
                sessions.push(record)
            })
            .await;
    }

    /// Merge the closing fields into the session with `session_id`.
    ///
    /// Returns `false` when no such session exists. Does not check whether the
    /// session was already closed; callers go through `close_app_session`.
    pub async fn close_session(
        &self,
        session_id: &str,
        end_time: DateTime<Utc>,
        duration_ms: i64,
    ) -> bool {
        let id = session_id.to_string();
        let found = self
            .store
            .update(APP_SESSIONS_KEY, move |sessions: &mut Vec<AppSession>| {
                match sessions.iter_mut().find(|session| session.id == id) {
                    Some(session) => {
                        session.end_time = Some(end_time);
                        session.duration_ms = Some(duration_ms);
                        true
                    }
                    None => false,
                }
            })
            .await
            .unwrap_or(false);

        if !found {
            warn!("AppSession {session_id} not found; close ignored");
        }
        found
    }

    pub async fn get_session(&self, session_id: &str) -> Option<AppSession> {
        self.list_sessions()
            .await
            .into_iter()
            .find(|session| session.id == session_id)
    }
}

/// Open a session for the current visit and persist it.
pub async fn open_app_session(repo: &SessionRepository, now: DateTime<Utc>) -> AppSession {
    let session = AppSession::open(now);
    repo.create_session(&session).await;
    session
}

/// Close the visit once. A session that already has an end time is left alone.
pub async fn close_app_session(
    repo: &SessionRepository,
    session_id: &str,
    now: DateTime<Utc>,
) -> Option<AppSession> {
    let session = repo.get_session(session_id).await?;
    if session.is_closed() {
        return Some(session);
    }

    let duration_ms = (now - session.start_time).num_milliseconds().max(0);
    repo.close_session(session_id, now, duration_ms).await;
    repo.get_session(session_id).await
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::db::Database;

    fn repo() -> SessionRepository {
        SessionRepository::new(KvStore::new(Database::open_in_memory().unwrap()))
    }

    #[tokio::test]
    async fn open_then_close_records_duration() {
        let repo = repo();
        let start = Utc::now();
        let session = open_app_session(&repo, start).await;
        assert_eq!(session.id, start.to_rfc3339());

        let closed = close_app_session(&repo, &session.id, start + Duration::seconds(3))
            .await
            .unwrap();
        assert_eq!(closed.end_time, Some(start + Duration::seconds(3)));
        assert_eq!(closed.duration_ms, Some(3000));
    }

    #[tokio::test]
    async fn closing_twice_keeps_first_end_time() {
        let repo = repo();
        let start = Utc::now();
        let session = open_app_session(&repo, start).await;

        let first_end = start + Duration::seconds(1);
        close_app_session(&repo, &session.id, first_end).await;
        let again = close_app_session(&repo, &session.id, start + Duration::seconds(60))
            .await
            .unwrap();

        assert_eq!(again.end_time, Some(first_end));
        assert_eq!(again.duration_ms, Some(1000));
    }

    #[tokio::test]
    async fn close_unknown_session_is_noop() {
        let repo = repo();
        let session = open_app_session(&repo, Utc::now()).await;

        assert!(!repo.close_session("missing", Utc::now(), 5).await);
        let sessions = repo.list_sessions().await;
        assert_eq!(sessions, vec![session]);
    }
}
