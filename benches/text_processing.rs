use criterion::{black_box, criterion_group, criterion_main, Criterion};
use graphrag_pipeline::graphrag::keys::summaries_hash;
use graphrag_pipeline::graphrag::{parse_summary, Chunker, KnowledgeGraph};

fn chunker_benchmark(c: &mut Criterion) {
    let chunker = Chunker::new(600, 100);
    let text = "Alice founded Acme in Berlin and later hired Bob to lead research. ".repeat(256);

    c.bench_function("chunker_split_long_text", |b| {
        b.iter(|| {
            let chunks = chunker.chunk(black_box(text.as_str()));
            black_box(chunks.len());
        });
    });
}

fn sample_summary(prefix: &str, entities: usize) -> String {
    let mut text = String::from("Entities:\n");
    for i in 0..entities {
        text.push_str(&format!("{}. **{}{}**\n", i + 1, prefix, i));
    }
    text.push_str("\nRelationships:\n");
    for i in 1..entities {
        text.push_str(&format!("- {}{} -> related_to -> {}{}\n", prefix, i - 1, prefix, i));
    }
    text.push_str("{\"id\": \"ignored\"}\n");
    text
}

fn parser_benchmark(c: &mut Criterion) {
    let summary = sample_summary("Entity", 64);

    c.bench_function("parse_summary_mixed_lines", |b| {
        b.iter(|| {
            let parsed = parse_summary(black_box(&summary));
            black_box((parsed.entities.len(), parsed.relationships.len()));
        });
    });
}

fn graph_benchmark(c: &mut Criterion) {
    let summaries: Vec<String> = (0..32)
        .map(|i| sample_summary(&format!("Group{}_", i), 16))
        .collect();

    c.bench_function("knowledge_graph_from_summaries", |b| {
        b.iter(|| {
            let graph = KnowledgeGraph::from_summaries(black_box(summaries.as_slice()));
            black_box(graph.node_count());
        });
    });

    c.bench_function("summaries_hash_corpus", |b| {
        b.iter(|| black_box(summaries_hash(black_box(summaries.as_slice()))));
    });
}

criterion_group!(benches, chunker_benchmark, parser_benchmark, graph_benchmark);
criterion_main!(benches);
