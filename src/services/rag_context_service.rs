//! RAG Context Service (C3) — retrieves schema snippets, metric definitions,
//! and example queries from the vector store and merges them with C1's
//! column whitelist into a single `RagContext` for C5 to consume.

use std::sync::Arc;

use crate::models::query_spec::QuerySpec;
use crate::models::rag::{ExampleQuery, ExampleSource, MetricDefinitionEntry, RagContext, SchemaSnippet};
use crate::services::metric_registry;
use crate::services::vector_store::{PointFilter, VectorStore};

const METRICS_COLLECTION: &str = "metric_definitions";
const SCHEMA_COLLECTION: &str = "schema_snippets";
const LEARNED_EXAMPLES_COLLECTION: &str = "learned_examples";
const STATIC_EXAMPLES_COLLECTION: &str = "static_examples";

pub struct RagContextService {
    vector_store: Arc<dyn VectorStore>,
    embedder: Arc<dyn crate::services::document_service::Embedder>,
}

impl RagContextService {
    pub fn new(
        vector_store: Arc<dyn VectorStore>,
        embedder: Arc<dyn crate::services::document_service::Embedder>,
    ) -> Self {
        Self { vector_store, embedder }
    }

    /// Builds a `RagContext` for a parsed `QuerySpec`. Degrades gracefully:
    /// `available_columns` is always populated from the registry even if the
    /// vector store is unavailable or every collection search fails.
    pub async fn rag_context_for_spec(
        &self,
        spec: &QuerySpec,
        original_query: Option<&str>,
    ) -> RagContext {
        let banks = spec.bank_names.join(", ");
        let metric_query = format!("{} {} banking metric", spec.metric, banks);
        let schema_query = format!("{} monthly_kpis database column", spec.metric);
        let example_query = original_query
            .map(str::to_string)
            .unwrap_or_else(|| reconstruct_query_text(spec));

        let metric_definitions = self
            .search_metric_definitions(&metric_query, 3, 0.7)
            .await
            .unwrap_or_default();

        let schema_snippets = self.search_schema(&schema_query, 5, 0.7).await.unwrap_or_default();

        let learned = self
            .search_examples(LEARNED_EXAMPLES_COLLECTION, &example_query, 2, 0.75)
            .await
            .unwrap_or_default()
            .into_iter()
            .map(|mut e| {
                e.score *= 1.2;
                e.source = Some(ExampleSource::Learned);
                e
            });

        let static_examples = self
            .search_examples(STATIC_EXAMPLES_COLLECTION, &example_query, 3, 0.70)
            .await
            .unwrap_or_default()
            .into_iter()
            .map(|mut e| {
                e.source = Some(ExampleSource::Static);
                e
            });

        let mut example_queries: Vec<ExampleQuery> = learned.chain(static_examples).collect();
        example_queries.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        example_queries.truncate(3);

        RagContext {
            metric_definitions,
            schema_snippets,
            example_queries,
            available_columns: metric_registry::registry().whitelisted_columns(),
        }
    }

    async fn search_metric_definitions(
        &self,
        query: &str,
        top_k: usize,
        threshold: f32,
    ) -> anyhow::Result<Vec<MetricDefinitionEntry>> {
        let vector = self.embedder.embed(query).await?;
        let hits = self
            .vector_store
            .query_points(METRICS_COLLECTION, vector, top_k, threshold, None)
            .await?;
        Ok(hits
            .into_iter()
            .filter_map(|h| serde_json::from_value(h.payload).ok())
            .collect())
    }

    async fn search_schema(
        &self,
        query: &str,
        top_k: usize,
        threshold: f32,
    ) -> anyhow::Result<Vec<SchemaSnippet>> {
        let vector = self.embedder.embed(query).await?;
        let hits =
            self.vector_store.query_points(SCHEMA_COLLECTION, vector, top_k, threshold, None).await?;
        Ok(hits
            .into_iter()
            .filter_map(|h| serde_json::from_value(h.payload).ok())
            .collect())
    }

    async fn search_examples(
        &self,
        collection: &str,
        query: &str,
        top_k: usize,
        threshold: f32,
    ) -> anyhow::Result<Vec<ExampleQuery>> {
        let vector = self.embedder.embed(query).await?;
        let hits: Vec<_> = self
            .vector_store
            .query_points(collection, vector, top_k, threshold, None::<PointFilter>)
            .await?;
        Ok(hits
            .into_iter()
            .filter_map(|h| {
                let mut example: ExampleQuery = serde_json::from_value(h.payload).ok()?;
                example.score = h.score as f64;
                Some(example)
            })
            .collect())
    }
}

fn reconstruct_query_text(spec: &QuerySpec) -> String {
    format!("{} {}", spec.metric, spec.bank_names.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::document_service::HashEmbedder;
    use crate::services::vector_store::{InMemoryVectorStore, VectorPoint};

    #[tokio::test]
    async fn degrades_gracefully_with_empty_store() {
        let store = Arc::new(InMemoryVectorStore::new());
        let embedder = Arc::new(HashEmbedder);
        let service = RagContextService::new(store, embedder);

        let spec = QuerySpec {
            metric: "IMOR".into(),
            bank_names: vec!["INVEX".into()],
            time_range: crate::models::metric::TimeRange::All,
            granularity: Default::default(),
            visualization_type: Default::default(),
            comparison_mode: false,
            ranking_mode: false,
            top_n: None,
            requires_clarification: false,
            missing_fields: vec![],
            confidence_score: 1.0,
        };

        let ctx = service.rag_context_for_spec(&spec, None).await;
        assert!(ctx.metric_definitions.is_empty());
        assert!(!ctx.available_columns.is_empty());
    }

    #[tokio::test]
    async fn merges_and_boosts_learned_examples() {
        let store = Arc::new(InMemoryVectorStore::new());
        let embedder = Arc::new(HashEmbedder);

        let vector = embedder.embed("IMOR INVEX").await.unwrap();
        store
            .upsert(
                LEARNED_EXAMPLES_COLLECTION,
                vec![VectorPoint {
                    id: "ex1".into(),
                    vector: vector.clone(),
                    payload: serde_json::json!({
                        "nl_query": "IMOR de INVEX",
                        "sql_template": "SELECT imor FROM monthly_kpis WHERE banco_norm = 'INVEX'",
                    }),
                }],
            )
            .await
            .unwrap();

        let service = RagContextService::new(store, embedder);
        let spec = QuerySpec {
            metric: "IMOR".into(),
            bank_names: vec!["INVEX".into()],
            time_range: crate::models::metric::TimeRange::All,
            granularity: Default::default(),
            visualization_type: Default::default(),
            comparison_mode: false,
            ranking_mode: false,
            top_n: None,
            requires_clarification: false,
            missing_fields: vec![],
            confidence_score: 1.0,
        };

        let ctx = service.rag_context_for_spec(&spec, Some("IMOR INVEX")).await;
        assert_eq!(ctx.example_queries.len(), 1);
        assert_eq!(ctx.example_queries[0].source, Some(ExampleSource::Learned));
    }
}
