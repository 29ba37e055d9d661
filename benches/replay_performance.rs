//! Performance benchmarks for rating calculations and log replay

use chrono::{Duration, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use snake_arena::rating::{replay_ratings, CompletedEntry, RatingEngine};
use snake_arena::types::{Outcome, SkillEstimate};

/// A synthetic completed-match log: round-robin style pairings over a pool
/// of agents, winner alternating.
fn synthetic_log(agents: usize, matches: usize) -> Vec<CompletedEntry> {
    let start = Utc::now();
    (0..matches)
        .map(|game| {
            let a = game % agents;
            let b = (game + 1 + game / agents) % agents;
            let (winner, loser) = if game % 3 == 0 { (b, a) } else { (a, b) };
            CompletedEntry {
                match_id: format!("bench-{game}"),
                ended_at: start + Duration::seconds(game as i64),
                participants: vec![
                    (format!("agent-{winner}"), Outcome::Won, (game % 10) as u32),
                    (format!("agent-{loser}"), Outcome::Lost, (game % 4) as u32),
                ],
            }
        })
        .collect()
}

fn bench_single_match_rating(c: &mut Criterion) {
    let engine = RatingEngine::new();
    let participants = vec![
        ("winner".to_string(), SkillEstimate::default(), Outcome::Won),
        ("loser".to_string(), SkillEstimate::default(), Outcome::Lost),
    ];

    c.bench_function("rate_single_match", |b| {
        b.iter(|| engine.rate(black_box(&participants)).unwrap())
    });
}

fn bench_chronological_replay(c: &mut Criterion) {
    let engine = RatingEngine::new();

    let mut group = c.benchmark_group("replay");
    for matches in [100, 1_000, 5_000] {
        let log = synthetic_log(20, matches);
        group.bench_function(format!("refold_{matches}_matches"), |b| {
            b.iter(|| replay_ratings(black_box(&engine), black_box(&log)).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_single_match_rating, bench_chronological_replay);
criterion_main!(benches);
