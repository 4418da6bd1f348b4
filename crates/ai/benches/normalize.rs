use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use serde_json::{Value, json};

use insightforge_ai::{OriginType, ResponseArtifact, normalize};

fn team_payload(members: usize) -> Value {
    let team: Vec<Value> = (0..members)
        .map(|i| {
            json!({
                "name": format!("member-{i}"),
                "completion_rate": if i % 7 == 0 { 0.0 } else { 0.8 },
                "performance_score": (i % 10) as f64 / 10.0,
            })
        })
        .collect();

    json!({
        "confidence_score": 0.65,
        "team_metrics": team,
        "recommendations": [
            "Rebalance work, two people show signs of burnout",
            "Pair the new hires with senior engineers",
        ],
        "risk_factors": { "a": "4 unassigned tickets", "b": "missing estimates on epics" },
    })
}

fn bench_normalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalize");

    for members in [5usize, 50, 500] {
        let payload = team_payload(members);
        group.bench_with_input(BenchmarkId::new("project_insights", members), &payload, |b, p| {
            b.iter(|| normalize(black_box(p), black_box(&OriginType::ProjectInsights)))
        });
    }

    group.finish();
}

fn bench_artifact(c: &mut Criterion) {
    let candidate = format!(
        "Analysis follows.\n```json\n{}\n```\n",
        json!({ "type": "team_performance", "confidence_score": 0.7, "team_metrics": team_payload(20)["team_metrics"] })
    );

    c.bench_function("artifact_parse", |b| {
        b.iter(|| ResponseArtifact::parse(black_box(&candidate)).into_analysis_payload())
    });
}

criterion_group!(benches, bench_normalize, bench_artifact);
criterion_main!(benches);
