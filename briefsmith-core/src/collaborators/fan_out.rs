//! Concurrent per-query research.
//!
//! A node's queries are independent reads, so they can be issued together.
//! The combined update is assembled in query order so the merge that follows
//! sees the same input no matter how the calls interleave.

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, warn};

use super::{ResearchProvider, ResearchRequest};
use crate::brief::NodeUpdate;
use crate::config::RefinementConfig;
use crate::error::CollaboratorError;
use crate::refinement::ResearchMode;

/// Researches a single query for a node.
#[async_trait::async_trait]
pub trait QueryResearcher: Send + Sync {
    async fn research_query(
        &self,
        node_title: &str,
        query: &str,
        mode: ResearchMode,
    ) -> Result<NodeUpdate, CollaboratorError>;
}

/// A [`ResearchProvider`] that fans a request's queries out to a
/// [`QueryResearcher`] with bounded concurrency.
pub struct FanOutResearchProvider<Q: QueryResearcher> {
    researcher: Arc<Q>,
    concurrency: usize,
}

impl<Q: QueryResearcher> FanOutResearchProvider<Q> {
    pub fn new(researcher: Arc<Q>, concurrency: usize) -> Self {
        Self {
            researcher,
            concurrency: concurrency.max(1),
        }
    }

    /// Concurrency taken from `fan_out_concurrency`.
    pub fn from_config(researcher: Arc<Q>, config: &RefinementConfig) -> Self {
        Self::new(researcher, config.fan_out_concurrency)
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }
}

#[async_trait::async_trait]
impl<Q: QueryResearcher + 'static> ResearchProvider for FanOutResearchProvider<Q> {
    async fn research(&self, request: &ResearchRequest) -> Result<NodeUpdate, CollaboratorError> {
        debug!(
            node_title = %request.node_title,
            queries = request.queries.len(),
            concurrency = self.concurrency,
            "Fanning out research queries"
        );

        // Owned futures: the stream is held across an await inside a Send future.
        let calls: Vec<_> = request
            .queries
            .iter()
            .map(|query| {
                let researcher = Arc::clone(&self.researcher);
                let title = request.node_title.clone();
                let query = query.clone();
                let mode = request.mode;
                async move { researcher.research_query(&title, &query, mode).await }
            })
            .collect();
        let results: Vec<_> = stream::iter(calls)
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut combined = NodeUpdate::empty(request.node_title.clone());
        let mut last_malformed = None;
        let mut succeeded = 0;
        for (query, result) in request.queries.iter().zip(results) {
            match result {
                Ok(update) => {
                    succeeded += 1;
                    combined.top_sources.extend(update.top_sources);
                    combined.fact_points.extend(update.fact_points);
                    combined.supports.extend(update.supports);
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(query = %query, error = %e, "Query returned an unusable result");
                    last_malformed = Some(e);
                }
            }
        }

        match last_malformed {
            Some(e) if succeeded == 0 => Err(e),
            _ => Ok(combined),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brief::NodeId;
    use crate::brief::fixtures::{fact, source};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Answers each query with one source named after it; later queries answer faster.
    struct EchoResearcher {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl EchoResearcher {
        fn new() -> Self {
            Self {
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl QueryResearcher for EchoResearcher {
        async fn research_query(
            &self,
            node_title: &str,
            query: &str,
            _mode: ResearchMode,
        ) -> Result<NodeUpdate, CollaboratorError> {
            let delay = match query {
                "bad" => return Err(CollaboratorError::malformed("search", "garbage")),
                "down" => return Err(CollaboratorError::unavailable("search", "offline")),
                "q1" => 30,
                "q2" => 10,
                _ => 1,
            };
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            let url = format!("https://{query}.example");
            Ok(NodeUpdate {
                node_title: node_title.to_string(),
                top_sources: vec![source(&url)],
                fact_points: vec![fact(query, &format!("Fact for {query}"), &url)],
                supports: vec![],
            })
        }
    }

    fn request(queries: &[&str]) -> ResearchRequest {
        ResearchRequest {
            node_id: NodeId::new("node-1"),
            node_title: "Origins".into(),
            queries: queries.iter().map(|q| q.to_string()).collect(),
            mode: ResearchMode::Initial,
        }
    }

    #[tokio::test]
    async fn test_results_combined_in_query_order() {
        let researcher = Arc::new(EchoResearcher::new());
        let provider = FanOutResearchProvider::new(researcher.clone(), 3);
        let update = provider.research(&request(&["q1", "q2", "q3"])).await.unwrap();

        let urls: Vec<_> = update.top_sources.iter().map(|s| s.url.as_str()).collect();
        assert_eq!(
            urls,
            vec!["https://q1.example", "https://q2.example", "https://q3.example"]
        );
        assert_eq!(update.node_title, "Origins");
        assert!(researcher.peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let researcher = Arc::new(EchoResearcher::new());
        let provider = FanOutResearchProvider::new(researcher.clone(), 1);
        provider.research(&request(&["q1", "q2", "q3"])).await.unwrap();
        assert_eq!(researcher.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_malformed_query_is_skipped_but_fatal_propagates() {
        let provider = FanOutResearchProvider::new(Arc::new(EchoResearcher::new()), 2);

        let update = provider.research(&request(&["bad", "q3"])).await.unwrap();
        assert_eq!(update.top_sources.len(), 1);

        let err = provider.research(&request(&["bad"])).await.unwrap_err();
        assert!(!err.is_fatal());

        let err = provider.research(&request(&["q3", "down"])).await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_research_runs_on_spawned_task() {
        let provider = Arc::new(FanOutResearchProvider::new(Arc::new(EchoResearcher::new()), 2));
        let handle = tokio::spawn(async move { provider.research(&request(&["q1", "q2"])).await });
        let update = handle.await.unwrap().unwrap();
        assert_eq!(update.top_sources.len(), 2);
    }

    #[tokio::test]
    async fn test_no_queries_yields_empty_update() {
        let provider = FanOutResearchProvider::new(Arc::new(EchoResearcher::new()), 0);
        assert_eq!(provider.concurrency(), 1);
        let configured =
            FanOutResearchProvider::from_config(Arc::new(EchoResearcher::new()), &RefinementConfig::default());
        assert_eq!(configured.concurrency(), 4);
        assert!(provider.research(&request(&[])).await.unwrap().is_empty());
    }
}
