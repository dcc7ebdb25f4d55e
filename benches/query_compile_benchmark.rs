// Query compilation and in-memory search benchmarks
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use lineage_search::config::Config;
use lineage_search::index::InMemoryIndexEngine;
use lineage_search::models::{
    Condition, ConjunctiveCriterion, Criterion as FilterCriterion, EntityRegistry, Filter, LineageDirection,
    LineageRelationship, LineageSearchRequest, SearchFlags, SearchRequest, Urn,
};
use lineage_search::query::QueryCompiler;
use lineage_search::search::{GraphTraversal, LineageQuery, SearchService};
use serde_json::json;
use std::sync::Arc;
use tokio::runtime::Runtime;

const REGISTRY: &str = include_str!("../config/entity-registry.yml");

fn dataset(i: usize) -> Urn {
    Urn::new(format!("urn:li:dataset:(urn:li:dataPlatform:hive,db.table_{},PROD)", i))
}

struct FixedGraph(Vec<LineageRelationship>);

#[async_trait::async_trait]
impl GraphTraversal for FixedGraph {
    async fn get_lineage(
        &self,
        _query: &LineageQuery,
    ) -> lineage_search::Result<lineage_search::models::EntityLineageResult> {
        Ok(lineage_search::models::EntityLineageResult::new(self.0.clone()))
    }
}

fn compile_benchmark(c: &mut Criterion) {
    let registry = EntityRegistry::from_yaml_str(REGISTRY).unwrap();
    let spec = registry.require("dataset").unwrap();
    let compiler = QueryCompiler::new(Config::default().search);

    let mut group = c.benchmark_group("compile");
    for conjuncts in [0usize, 1, 4, 16].iter() {
        let filter = Filter {
            or: (0..*conjuncts)
                .map(|i| {
                    ConjunctiveCriterion::new(vec![
                        FilterCriterion::new("platform", Condition::Equal)
                            .with_value(format!("urn:li:dataPlatform:p{}", i)),
                        FilterCriterion::new("tags", Condition::Equal)
                            .with_values(["urn:li:tag:pii", "urn:li:tag:gold"]),
                    ])
                })
                .collect(),
        };
        let fulltext = SearchRequest::new("orders customer").with_filter(filter.clone());
        let structured = SearchRequest::new("name:orders")
            .with_filter(filter)
            .with_flags(SearchFlags::default().with_fulltext(false));

        group.bench_with_input(BenchmarkId::new("fulltext", conjuncts), &fulltext, |b, request| {
            b.iter(|| compiler.compile(&spec, black_box(request)))
        });
        group.bench_with_input(BenchmarkId::new("structured", conjuncts), &structured, |b, request| {
            b.iter(|| compiler.compile(&spec, black_box(request)))
        });
    }
    group.finish();
}

fn lineage_benchmark(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let registry = Arc::new(EntityRegistry::from_yaml_str(REGISTRY).unwrap());

    let mut group = c.benchmark_group("search_across_lineage");
    for candidates in [10usize, 1000].iter() {
        let relationships = (0..*candidates)
            .map(|i| LineageRelationship::new(dataset(i), (i % 3) as u32 + 1, "DownstreamOf"))
            .collect();
        let service = SearchService::new(
            &Config::default(),
            registry.clone(),
            Arc::new(InMemoryIndexEngine::new()),
            Arc::new(FixedGraph(relationships)),
        );
        rt.block_on(async {
            for i in 0..*candidates {
                service
                    .writer()
                    .upsert("dataset", &dataset(i), json!({ "name": format!("table_{}", i) }))
                    .await
                    .unwrap();
            }
        });

        let request = LineageSearchRequest::new(dataset(usize::MAX), LineageDirection::Downstream)
            .with_flags(SearchFlags::default().with_skip_cache(true));
        group.bench_with_input(BenchmarkId::from_parameter(candidates), &request, |b, request| {
            b.to_async(&rt)
                .iter(|| async { service.search_across_lineage(black_box(request)).await })
        });
    }
    group.finish();
}

criterion_group!(benches, compile_benchmark, lineage_benchmark);
criterion_main!(benches);
