use criterion::{black_box, criterion_group, criterion_main, Criterion};
use playclip::{
    CalibrationSample, ClipRequestOptions, ClipSearchPipeline, ColumnRegistry, IndexBuilder, PlayRecord,
    PlayTable, QueryExecutor, QueryValidator, StructuredQuery, VideoIdentity,
};

/// A season's worth of synthetic plays: 17 games of ~160 plays.
fn synthetic_table() -> PlayTable {
    let play_types = ["pass", "run", "punt", "kickoff", "field_goal"];
    let passers = ["Brock Purdy", "Kenny Pickett", "Josh Allen"];
    let mut records = Vec::new();

    for game in 0..17 {
        for i in 0..160usize {
            let sequence_index = game * 160 + i;
            let quarter = (i / 40) as u8 + 1;
            records.push(PlayRecord {
                sequence_index,
                game_id: Some(format!("2023_{:02}_SF_OPP", game + 1)),
                drive_id: Some((i / 6) as u32 + 1),
                quarter: Some(quarter),
                game_clock_seconds: Some(900 - (i % 40) as u32 * 22),
                play_type: Some(play_types[i % play_types.len()].to_string()),
                passer_player_name: Some(passers[i % passers.len()].to_string()),
                yards_gained: Some((i * 7 % 45) as i32 - 5),
                complete_pass: Some(i % 3 != 0),
                touchdown: Some(i % 37 == 0),
                wpa: Some(((i * 13 % 100) as f64 - 50.0) / 500.0),
                ..PlayRecord::default()
            });
        }
    }
    PlayTable::new(records)
}

fn synthetic_samples() -> Vec<CalibrationSample> {
    let mut samples = Vec::new();
    for quarter in 1..=4u8 {
        let base = (quarter as f64 - 1.0) * 1400.0;
        for step in 0..180 {
            let clock = 900.0 - step as f64 * 5.0;
            samples.push(CalibrationSample::reading(base + step as f64 * 6.5, quarter, clock, 0.9));
        }
    }
    samples
}

const FILTER_QUERY: &str = r#"{
    "type": "filter",
    "filters": {"logic": "AND", "children": [
        {"column": "passer_player_name", "operator": "eq", "value": "Brock Purdy"},
        {"column": "yards_gained", "operator": "gt", "value": 20},
        {"column": "complete_pass", "operator": "eq", "value": true}
    ]}
}"#;

const SEQUENCE_QUERY: &str = r#"{
    "type": "sequence",
    "steps": [
        {"filters": {"logic": "AND", "children": [{"column": "play_type", "operator": "eq", "value": "run"}]}},
        {"filters": {"logic": "AND", "children": [{"column": "yards_gained", "operator": "gte", "value": 30}]}}
    ],
    "mode": "all"
}"#;

const RANK_QUERY: &str = r#"{
    "type": "rank",
    "column": "wpa",
    "direction": "desc",
    "limit": 3,
    "group_by": ["game_id"]
}"#;

/// Benchmark query validation and execution per shape
fn bench_query_execution(c: &mut Criterion) {
    let table = synthetic_table();
    let registry = ColumnRegistry::standard();
    let validator = QueryValidator::new(&registry);
    let executor = QueryExecutor::new(&table);

    for (name, text) in [
        ("filter_query", FILTER_QUERY),
        ("sequence_query", SEQUENCE_QUERY),
        ("rank_query", RANK_QUERY),
    ] {
        let Ok(query) = StructuredQuery::from_json(text) else {
            continue;
        };
        let Ok(compiled) = validator.validate(&query) else {
            continue;
        };
        c.bench_function(name, |b| b.iter(|| executor.execute(black_box(&compiled)).len()));
    }
}

/// Benchmark building an index from a full game of samples
fn bench_index_build(c: &mut Criterion) {
    let samples = synthetic_samples();
    let builder = IndexBuilder::new(Default::default());

    c.bench_function("index_build", |b| {
        b.iter(|| builder.build(VideoIdentity::named("bench"), Some(6000.0), black_box(&samples)))
    });
}

/// Benchmark the whole search pipeline
fn bench_clip_search(c: &mut Criterion) {
    let table = synthetic_table();
    let (index, _) = IndexBuilder::new(Default::default()).build(
        VideoIdentity::named("bench"),
        Some(6000.0),
        &synthetic_samples(),
    );
    let pipeline = ClipSearchPipeline::default();
    let Ok(query) = StructuredQuery::from_json(FILTER_QUERY) else {
        return;
    };
    let options = ClipRequestOptions::default();

    c.bench_function("clip_search", |b| {
        b.iter(|| pipeline.search(&table, &index, black_box(&query), &options).map(|r| r.clips.len()))
    });
}

criterion_group!(benches, bench_query_execution, bench_index_build, bench_clip_search);
criterion_main!(benches);
