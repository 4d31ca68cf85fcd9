use futures::future::try_join_all;
use tracing::{debug, info, warn};

use super::{PipelineController, NO_ANSWER};
use crate::cache::non_empty;
use crate::graphrag::graph::{Community, CommunityDescription, GraphRecord, KnowledgeGraph};
use crate::graphrag::keys;
use crate::prompts::{answer_content, combine_content, community_content, Prompt};
use crate::store::Collection;
use crate::Result;

impl PipelineController {
    /// Corpus stage: answer `query` from the summaries of every document.
    ///
    /// Checks, in order: query answer, graph, community summaries, community
    /// descriptions. Each level is keyed by the summaries hash, so the same
    /// corpus always resolves to the same cache chain.
    pub async fn answer(&self, query: &str, summaries: &[String]) -> Result<String> {
        let summaries_hash = keys::summaries_hash(summaries);
        let query_hash = keys::query_hash(&summaries_hash, query);

        if let Some(answer) = self
            .cache
            .get::<String>(Collection::QueryAnswer, &query_hash)
            .await?
        {
            crate::metrics::record_cache_lookup(Collection::QueryAnswer.as_str(), true);
            info!(%query_hash, "Using cached answer");
            return Ok(answer);
        }
        crate::metrics::record_cache_lookup(Collection::QueryAnswer.as_str(), false);

        let mut built: Option<KnowledgeGraph> = None;
        let graph = self.resolve_graph(&summaries_hash, summaries, &mut built).await?;
        info!(
            nodes = graph.nodes,
            edges = graph.edges,
            communities = graph.communities.len(),
            "Graph resolved"
        );

        if graph.communities.is_empty() {
            warn!("No communities detected");
            return Ok(NO_ANSWER.to_string());
        }

        let community_summaries = self
            .resolve_community_summaries(&summaries_hash, summaries, &graph.communities, built)
            .await?;

        let intermediate = self.answer_communities(query, &community_summaries).await?;
        let answer = self
            .gateway
            .ask(
                Prompt::CombineAnswers.kind(),
                self.prompts.get(Prompt::CombineAnswers),
                combine_content(&intermediate),
            )
            .await?;

        self.cache
            .put(Collection::QueryAnswer, &query_hash, &answer)
            .await?;
        info!(%query_hash, "Query answer cached");
        Ok(answer)
    }

    async fn resolve_graph(
        &self,
        summaries_hash: &str,
        summaries: &[String],
        built: &mut Option<KnowledgeGraph>,
    ) -> Result<GraphRecord> {
        self.cache
            .checkpoint(Collection::Graph, summaries_hash, move || async move {
                info!("Building new graph");
                let graph = KnowledgeGraph::from_summaries(summaries);
                let communities = graph.detect_communities(&self.graph, self.partitioner.as_ref());
                let record = GraphRecord {
                    nodes: graph.node_count(),
                    edges: graph.edge_count(),
                    communities,
                };
                *built = Some(graph);
                Ok(record)
            })
            .await
    }

    /// Community summaries, via the combined cache level first and the
    /// description level second.
    async fn resolve_community_summaries(
        &self,
        summaries_hash: &str,
        summaries: &[String],
        communities: &[Community],
        built: Option<KnowledgeGraph>,
    ) -> Result<Vec<String>> {
        self.cache
            .checkpoint_if(
                Collection::CommunitySummary,
                summaries_hash,
                non_empty,
                || async move {
                    let descriptions = self
                        .cache
                        .checkpoint_if(
                            Collection::CommunityDescription,
                            summaries_hash,
                            non_empty,
                            || async move {
                                info!(count = communities.len(), "Describing communities");
                                // A cached graph record carries no edges; rebuild from the summaries.
                                let graph = built
                                    .unwrap_or_else(|| KnowledgeGraph::from_summaries(summaries));
                                Ok(communities
                                    .iter()
                                    .map(|c| graph.describe_community(&c.members))
                                    .collect::<Vec<CommunityDescription>>())
                            },
                        )
                        .await?;

                    self.summarize_communities(&descriptions).await
                },
            )
            .await
    }

    /// One summarization call per community, index-aligned with the input.
    async fn summarize_communities(&self, descriptions: &[CommunityDescription]) -> Result<Vec<String>> {
        info!(count = descriptions.len(), "Summarizing communities");
        let system = self.prompts.get(Prompt::SummarizeCommunities);
        try_join_all(descriptions.iter().enumerate().map(|(i, d)| async move {
            debug!(community = i, "Summarizing community");
            self.gateway
                .ask(
                    Prompt::SummarizeCommunities.kind(),
                    system,
                    community_content(&d.entities, &d.relationships),
                )
                .await
        }))
        .await
    }

    /// One intermediate answer per community summary.
    async fn answer_communities(&self, query: &str, summaries: &[String]) -> Result<Vec<String>> {
        info!(count = summaries.len(), "Generating intermediate answers");
        let system = self.prompts.get(Prompt::AnswerQuery);
        try_join_all(summaries.iter().enumerate().map(|(i, summary)| async move {
            debug!(community = i, "Answering against community");
            self.gateway
                .ask(Prompt::AnswerQuery.kind(), system, answer_content(query, summary))
                .await
        }))
        .await
    }
}
