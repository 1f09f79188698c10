//! ale-zoo CLI
//!
//! Command-line interface for inspecting and running multi-agent Atari games.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use ale_zoo::env::AgentMap;
use ale_zoo::prelude::*;
use ale_zoo::rom;
use ale_zoo_envs::MockAle;

#[derive(Parser)]
#[command(name = "ale-zoo")]
#[command(version, about = "ale-zoo - Multi-agent Atari environments in Rust", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered games
    List,

    /// Show the modes a ROM offers for a player count
    Modes {
        /// Directory holding the ROM files
        rom_dir: PathBuf,

        /// Registered game or ROM name
        game: String,

        /// Number of players
        #[arg(long, default_value = "2")]
        players: usize,
    },

    /// Demo: Run a game with a random policy
    Demo {
        /// Registered game or ROM name
        #[arg(default_value = "foozpong")]
        game: String,

        /// Directory holding the ROM files
        #[arg(long)]
        rom_dir: Option<PathBuf>,

        /// Number of players (defaults to the game's own)
        #[arg(long)]
        players: Option<usize>,

        /// Number of steps
        #[arg(long, default_value = "100")]
        steps: u64,

        /// Observation kind (ram, rgb_image, grayscale_image)
        #[arg(long, default_value = "rgb_image")]
        obs_type: ObsType,

        /// Seed for the emulator and the random policy
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Draw frames in the terminal
        #[arg(long)]
        render: bool,
    },
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::List => {
            list_games();
        }
        Commands::Modes {
            rom_dir,
            game,
            players,
        } => {
            modes(&rom_dir, &game, players)?;
        }
        Commands::Demo {
            game,
            rom_dir,
            players,
            steps,
            obs_type,
            seed,
            render,
        } => {
            let mut config = game_config(&game, players)?
                .with_obs_type(obs_type)
                .with_seed(seed);
            if let Some(dir) = rom_dir {
                config = config.with_rom_dir(dir);
            }
            if render {
                config = config.with_render_mode(RenderMode::Human);
            }
            demo(config, steps)?;
        }
    }

    Ok(())
}

fn list_games() {
    println!("Registered games:");
    for game in games::all() {
        let modes: Vec<String> = game
            .player_modes
            .iter()
            .map(|(players, mode)| format!("{players}p=mode {mode}"))
            .collect();
        println!(
            "  {:<14} rom={:<8} players={:?} {}",
            game.env_name(),
            game.rom,
            game.supported_players(),
            modes.join(", ")
        );
        println!("  {:<14} {}", "", game.summary);
    }
}

/// Configuration for a registered game, or a custom one for a bare ROM name
fn game_config(game: &str, players: Option<usize>) -> Result<AtariConfig> {
    match games::lookup(game) {
        Ok(entry) => Ok(entry.config(players.unwrap_or(entry.default_players))?),
        Err(_) => {
            tracing::debug!(game, "not a registered game, treating it as a ROM name");
            Ok(AtariConfig::new(game, players.unwrap_or(1)))
        }
    }
}

fn modes(rom_dir: &Path, game: &str, players: usize) -> Result<()> {
    let rom_name = games::lookup(game).map_or(game, |entry| entry.rom);
    let path = rom::locate(Some(rom_dir), rom_name)?;

    let mut ale = MockAle::new();
    ale.load_rom(&path)
        .with_context(|| format!("loading {}", path.display()))?;
    let available = ale.available_modes(players);

    println!("ROM: {}", path.display());
    if available.is_empty() {
        println!("No modes for {players} players");
    } else {
        let listed: Vec<String> = available.iter().map(|m| m.to_string()).collect();
        println!("Modes for {players} players: {}", listed.join(", "));
    }
    Ok(())
}

fn demo(config: AtariConfig, steps: u64) -> Result<()> {
    let seed = config.seed;
    tracing::info!(game = %config.game, players = config.num_players, steps, "Running demo");

    let mut env = games::parallel_env(MockAle::new(), config)?;
    let action_space = Discrete::new(env.action_mapping().len());
    env.reset(seed)?;

    let mut returns: BTreeMap<AgentId, f32> = env
        .possible_agents()
        .iter()
        .map(|agent| (agent.clone(), 0.0))
        .collect();
    let mut episodes = 0;

    for step in 0..steps {
        let actions: AgentMap<usize> = env
            .agents()
            .into_iter()
            .map(|agent| (agent, action_space.sample(env.rng())))
            .collect();
        let result = env.step(&actions)?;

        let mut rewards: Vec<(&AgentId, &f32)> = result.rewards.iter().collect();
        rewards.sort_by(|a, b| a.0.cmp(b.0));
        for (agent, reward) in &rewards {
            if let Some(total) = returns.get_mut(*agent) {
                *total += **reward;
            }
        }
        let summary: Vec<String> = rewards
            .iter()
            .map(|(agent, reward)| format!("{agent}={reward}"))
            .collect();
        println!("step {step}: {}", summary.join(" "));

        if env.is_done() {
            episodes += 1;
            print_returns(episodes, env.frame(), &returns);
            returns.values_mut().for_each(|r| *r = 0.0);
            env.reset(None)?;
        }
    }

    if env.frame() > 0 {
        print_returns(episodes + 1, env.frame(), &returns);
    }
    env.close();
    Ok(())
}

fn print_returns(episode: usize, length: u64, returns: &BTreeMap<AgentId, f32>) {
    let listed: Vec<String> = returns
        .iter()
        .map(|(agent, total)| format!("{agent}={total}"))
        .collect();
    println!("episode {episode} ({length} steps): {}", listed.join(" "));
}
