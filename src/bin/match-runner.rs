//! Match Runner CLI Tool
//!
//! Runs a single match between two built-in providers and prints the board
//! frame by frame. Useful for eyeballing simulator behavior and seeds.
//!
//! Usage:
//!   cargo run --bin match-runner -- --left random --right random
//!   cargo run --bin match-runner -- --left fixed:UP --right random --seed 7
//!   cargo run --bin match-runner -- --left "scripted:UP,RIGHT,DOWN" --right random --show-frames

use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::Parser;
use snake_arena::config::AppConfig;
use snake_arena::game::MatchSimulator;
use snake_arena::provider::create_provider;
use snake_arena::types::{Direction, ProviderKind};

#[derive(Parser)]
#[command(name = "match-runner")]
#[command(about = "Run one grid match between two built-in providers")]
struct Cli {
    /// Left provider spec: random, fixed:<DIR>, or scripted:<DIR,DIR,...>
    #[arg(short, long, default_value = "random")]
    left: String,

    /// Right provider spec: random, fixed:<DIR>, or scripted:<DIR,DIR,...>
    #[arg(short, long, default_value = "random")]
    right: String,

    /// Match seed (fixes apple spawns and fallback moves)
    #[arg(short, long, default_value = "0")]
    seed: u64,

    /// Maximum rounds
    #[arg(long)]
    max_rounds: Option<u32>,

    /// Print every frame instead of just the final board
    #[arg(long)]
    show_frames: bool,
}

fn parse_provider_spec(spec: &str) -> Result<ProviderKind> {
    let spec = spec.trim();
    if spec.eq_ignore_ascii_case("random") {
        return Ok(ProviderKind::Random);
    }
    if let Some(direction) = spec.strip_prefix("fixed:") {
        return Ok(ProviderKind::Fixed {
            direction: parse_direction_name(direction)?,
        });
    }
    if let Some(moves) = spec.strip_prefix("scripted:") {
        let moves = moves
            .split(',')
            .map(parse_direction_name)
            .collect::<Result<Vec<_>>>()?;
        if moves.is_empty() {
            return Err(anyhow!("scripted provider needs at least one move"));
        }
        return Ok(ProviderKind::Scripted { moves });
    }
    Err(anyhow!(
        "Unknown provider spec '{}' (expected random, fixed:<DIR>, scripted:<DIR,...>)",
        spec
    ))
}

fn parse_direction_name(name: &str) -> Result<Direction> {
    match name.trim().to_uppercase().as_str() {
        "UP" => Ok(Direction::Up),
        "DOWN" => Ok(Direction::Down),
        "LEFT" => Ok(Direction::Left),
        "RIGHT" => Ok(Direction::Right),
        other => Err(anyhow!("Unknown direction '{}'", other)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let left = parse_provider_spec(&cli.left)?;
    let right = parse_provider_spec(&cli.right)?;

    let config = AppConfig::from_env()?;
    let mut params = config.board_params(cli.seed);
    if let Some(max_rounds) = cli.max_rounds {
        params.max_rounds = max_rounds;
    }

    println!(
        "Match: {} (slot 0) vs {} (slot 1) | {}x{} board, seed {}",
        cli.left, cli.right, params.width, params.height, params.seed
    );

    let providers = vec![
        create_provider(&left, params.seed.wrapping_add(1)),
        create_provider(&right, params.seed.wrapping_add(2)),
    ];
    let simulator = MatchSimulator::new(params, providers, Duration::from_secs(5))?;
    let report = simulator.run().await?;

    if cli.show_frames {
        for frame in &report.frames {
            println!("\n--- Round {} ---", frame.round);
            for (slot, recorded) in &frame.moves {
                println!(
                    "  slot {} -> {}{}",
                    slot,
                    recorded.direction,
                    if recorded.fallback { " (fallback)" } else { "" }
                );
            }
            for death in &frame.deaths {
                println!("  slot {} died: {:?}", death.slot, death.cause);
            }
            println!("{}", frame.board.render());
        }
    } else if let Some(last) = report.frames.last() {
        println!("\nFinal board after {} rounds:", report.rounds);
        println!("{}", last.board.render());
    }

    println!("\nResult:");
    for participant in &report.results {
        let death = match (participant.death_cause, participant.death_round) {
            (Some(cause), Some(round)) => format!("{:?} at round {}", cause, round),
            _ => "survived".to_string(),
        };
        println!(
            "  slot {}: {:?} | score {} | {}",
            participant.slot, participant.outcome, participant.score, death
        );
    }
    Ok(())
}
