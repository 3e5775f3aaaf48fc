//! Correlation of answers with the queries this server sent to peers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use pop_shared::protocol::ChannelIds;
use pop_shared::{Rumor, RumorTimestamp};
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, warn};

/// What was asked, kept so the answer can be acted on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryKind {
    GetMessagesById(ChannelIds),
    Rumor(Rumor),
    RumorState(RumorTimestamp),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryState {
    Pending,
    Answered,
}

#[derive(Debug)]
struct PendingQuery {
    kind: QueryKind,
    state: QueryState,
    /// Socket the query went out on; nobody else may answer it.
    target: String,
    sent_at: Instant,
}

#[derive(Debug, Default)]
pub struct Queries {
    next_id: AtomicI64,
    queries: RwLock<HashMap<i64, PendingQuery>>,
}

impl Queries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    async fn insert(&self, id: i64, target: &str, kind: QueryKind) {
        self.queries.write().await.insert(
            id,
            PendingQuery {
                kind,
                state: QueryState::Pending,
                target: target.to_string(),
                sent_at: Instant::now(),
            },
        );
    }

    pub async fn add_query(&self, id: i64, target: &str, ids: ChannelIds) {
        self.insert(id, target, QueryKind::GetMessagesById(ids)).await;
    }

    pub async fn add_rumor_query(&self, id: i64, target: &str, rumor: Rumor) {
        self.insert(id, target, QueryKind::Rumor(rumor)).await;
    }

    pub async fn add_rumor_state_query(&self, id: i64, target: &str, state: RumorTimestamp) {
        self.insert(id, target, QueryKind::RumorState(state)).await;
    }

    /// Mark `id` answered by the socket `from`.
    ///
    /// Returns `true` only for the first answer coming from the socket the
    /// query was sent on. Unknown ids, repeats and answers from any other
    /// socket return `false` and leave the query untouched.
    pub async fn set_query_received(&self, id: i64, from: &str) -> bool {
        let mut queries = self.queries.write().await;
        let Some(query) = queries.get_mut(&id) else {
            debug!(query_id = id, socket = %from, "Answer to unknown query");
            return false;
        };
        if query.target != from {
            warn!(
                query_id = id,
                expected = %query.target,
                socket = %from,
                "Answer from a socket the query was not sent to"
            );
            return false;
        }
        if query.state == QueryState::Answered {
            debug!(query_id = id, "Query answered more than once");
            return false;
        }
        query.state = QueryState::Answered;
        true
    }

    pub async fn get_rumor_from_past_query(&self, id: i64) -> Option<Rumor> {
        match self.queries.read().await.get(&id) {
            Some(PendingQuery {
                kind: QueryKind::Rumor(rumor),
                ..
            }) => Some(rumor.clone()),
            _ => None,
        }
    }

    pub async fn kind(&self, id: i64) -> Option<QueryKind> {
        self.queries.read().await.get(&id).map(|q| q.kind.clone())
    }

    pub async fn state(&self, id: i64) -> Option<QueryState> {
        self.queries.read().await.get(&id).map(|q| q.state)
    }

    /// Forget a query whose frame never left.
    pub async fn remove(&self, id: i64) -> bool {
        self.queries.write().await.remove(&id).is_some()
    }

    /// Forget every query sent more than `ttl` ago, answered or not.
    /// Returns how many were dropped.
    pub async fn prune(&self, ttl: Duration) -> usize {
        let now = Instant::now();
        let mut queries = self.queries.write().await;
        let before = queries.len();
        queries.retain(|_, query| now.duration_since(query.sent_at) < ttl);
        before - queries.len()
    }

    pub async fn len(&self) -> usize {
        self.queries.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn rumor() -> Rumor {
        Rumor {
            sender_id: "S".into(),
            rumor_id: 0,
            timestamp: RumorTimestamp::new(),
            messages: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_ids_are_monotonic() {
        let queries = Queries::new();
        let a = queries.get_next_id();
        let b = queries.get_next_id();
        assert!(b > a);
    }

    #[tokio::test]
    async fn test_set_received_only_once() {
        let queries = Queries::new();
        queries.add_query(1, "peer", ChannelIds::new()).await;
        assert_eq!(queries.state(1).await, Some(QueryState::Pending));

        assert!(queries.set_query_received(1, "peer").await);
        assert!(!queries.set_query_received(1, "peer").await);
        assert_eq!(queries.state(1).await, Some(QueryState::Answered));

        assert!(!queries.set_query_received(42, "peer").await);
    }

    #[tokio::test]
    async fn test_answer_from_other_socket_is_refused() {
        let queries = Queries::new();
        queries.add_rumor_state_query(0, "peer", RumorTimestamp::new()).await;

        assert!(!queries.set_query_received(0, "intruder").await);
        assert_eq!(queries.state(0).await, Some(QueryState::Pending));
        assert!(queries.set_query_received(0, "peer").await);
    }

    #[tokio::test]
    async fn test_rumor_queries() {
        let queries = Queries::new();
        queries.add_rumor_query(3, "peer", rumor()).await;
        queries.add_query(4, "peer", ChannelIds::new()).await;

        assert_eq!(queries.get_rumor_from_past_query(3).await, Some(rumor()));
        assert_eq!(queries.get_rumor_from_past_query(4).await, None);
        assert_eq!(queries.get_rumor_from_past_query(5).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_prune_drops_old_queries() {
        let queries = Queries::new();
        queries.add_rumor_query(1, "peer", rumor()).await;
        queries.set_query_received(1, "peer").await;
        queries.add_query(2, "peer", ChannelIds::new()).await;

        tokio::time::advance(Duration::from_secs(60)).await;
        queries.add_query(3, "peer", ChannelIds::new()).await;
        assert_eq!(queries.prune(Duration::from_secs(90)).await, 0);

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(queries.prune(Duration::from_secs(90)).await, 2);
        assert_eq!(queries.len().await, 1);
        assert_eq!(queries.kind(1).await, None);
        assert!(queries.kind(3).await.is_some());
    }

    #[tokio::test]
    async fn test_remove_unsent_query() {
        let queries = Queries::new();
        queries.add_query(1, "peer", ChannelIds::new()).await;
        assert!(queries.remove(1).await);
        assert!(!queries.remove(1).await);
        assert_eq!(queries.state(1).await, None);
    }
}
