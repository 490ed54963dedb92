//! Starsync CLI
//!
//! Plays the part of the game UI: shows star progress, records level
//! results, and syncs them through a snapshot folder shared between devices.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use starsync::config::Config;
use starsync::save::{LEVELS_PER_WORLD, WORLD_MAX, WORLD_MIN};
use starsync::storage::{SnapshotMetadata, SnapshotPicker, SnapshotSelection};
use starsync::sync::SnapshotChoice;
use starsync::{FsSnapshotStore, GameSession, LocalSave, Status, SyncCoordinator};

/// Star strings, indexed by star count
const STAR_STRINGS: [&str; 6] = [
    "\u{2606}\u{2606}\u{2606}\u{2606}\u{2606}",
    "\u{2605}\u{2606}\u{2606}\u{2606}\u{2606}",
    "\u{2605}\u{2605}\u{2606}\u{2606}\u{2606}",
    "\u{2605}\u{2605}\u{2605}\u{2606}\u{2606}",
    "\u{2605}\u{2605}\u{2605}\u{2605}\u{2606}",
    "\u{2605}\u{2605}\u{2605}\u{2605}\u{2605}",
];

#[derive(Parser)]
#[command(name = "starsync", version, about = "Collect all the stars, on every device")]
struct Cli {
    /// Snapshot to use instead of the configured one
    #[arg(long, global = true)]
    save: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show star ratings for a world
    Show {
        #[arg(default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..=20))]
        world: u32,
    },
    /// Record a level result and save it
    Play {
        #[arg(value_parser = clap::value_parser!(u32).range(1..=20))]
        world: u32,
        #[arg(value_parser = clap::value_parser!(u32).range(1..=12))]
        level: u32,
        stars: i32,
        /// Image to attach to the snapshot
        #[arg(long)]
        cover: Option<PathBuf>,
    },
    /// Pull the snapshot and merge it into local progress
    Sync,
    /// Push local progress to the snapshot
    Save,
    /// List stored snapshots
    List,
    /// Switch to a stored snapshot, or start a new one
    Select {
        name: Option<String>,
        #[arg(long, conflicts_with = "name")]
        new: bool,
    },
}

/// Picker driven by command line arguments
struct ArgPicker {
    name: Option<String>,
    new: bool,
}

impl SnapshotPicker for ArgPicker {
    fn pick(
        &self,
        title: &str,
        snapshots: &[SnapshotMetadata],
        allow_add: bool,
        _allow_delete: bool,
    ) -> SnapshotSelection {
        println!("{}", title);
        for meta in snapshots {
            println!("  {:<40} {}", meta.name, meta.description);
        }

        match (&self.name, self.new) {
            (_, true) if allow_add => SnapshotSelection::CreateNew,
            (Some(name), _) => SnapshotSelection::Existing(name.clone()),
            _ => SnapshotSelection::Cancelled,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "starsync=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let config = Config::from_env().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config from env: {}, using defaults", e);
        Config::default()
    });

    tracing::debug!("Snapshot folder: {}", config.storage.snapshot_dir.display());
    tracing::debug!("Local saves next to: {}", config.storage.local_save.display());

    tokio::fs::create_dir_all(&config.storage.snapshot_dir)
        .await
        .with_context(|| format!("creating {}", config.storage.snapshot_dir.display()))?;

    let store = Arc::new(FsSnapshotStore::new(&config.storage.snapshot_dir));
    let coordinator = SyncCoordinator::from_config(store, &config.sync);
    let save_name = cli.save.unwrap_or_else(|| config.sync.save_name.clone());

    let mut session = GameSession::open(
        coordinator.clone(),
        LocalSave::new(&config.storage.local_save),
        save_name,
    )
    .await
    .context("reading local save")?;

    match cli.command {
        Command::Show { world } => print_world(&session, world),
        Command::Play {
            world,
            level,
            stars,
            cover,
        } => {
            let cover = match cover {
                Some(path) => Some(
                    tokio::fs::read(&path)
                        .await
                        .with_context(|| format!("reading cover image {}", path.display()))?,
                ),
                None => None,
            };
            let result = session.complete_level(world, level, stars, cover).await;
            report("save", session.save_name(), Status::of(&result));
            print_world(&session, world);
        }
        Command::Sync => {
            let result = session.sync().await;
            report("sync", session.save_name(), Status::of(&result));
            print_world(&session, WORLD_MIN);
        }
        Command::Save => {
            let result = session.save(None).await;
            report("save", session.save_name(), Status::of(&result));
        }
        Command::List => {
            let snapshots = coordinator.store().list(usize::MAX).await?;
            if snapshots.is_empty() {
                println!("No saved games yet");
            }
            for meta in snapshots {
                println!(
                    "{:<40} {:<25} {}",
                    meta.name,
                    meta.last_modified.format("%Y-%m-%d %H:%M:%S"),
                    meta.description
                );
            }
        }
        Command::Select { name, new } => {
            let picker = ArgPicker { name, new };
            let choice = coordinator
                .choose_snapshot(&picker, "Saved games", true, true)
                .await?;
            if choice == SnapshotChoice::Cancelled {
                println!("Nothing selected");
                return Ok(());
            }

            let result = session.switch_to(choice).await;
            report("select", session.save_name(), Status::of(&result));
            if result.is_ok() {
                println!("Pass --save {} to keep using this snapshot", session.save_name());
            }
        }
    }

    Ok(())
}

fn print_world(session: &GameSession, world: u32) {
    let world = world.clamp(WORLD_MIN, WORLD_MAX);
    println!("World {} ({})", world, session.save_name());

    let stars = session.record().world_stars(world);
    for (i, &count) in stars.iter().enumerate() {
        let level = i + 1;
        println!("  {}-{:<3} {}", world, level, STAR_STRINGS[usize::from(count)]);
    }
    println!(
        "Total: {} of {} stars",
        session.record().total_stars(),
        (WORLD_MAX - WORLD_MIN + 1) * LEVELS_PER_WORLD * 5
    );
}

fn report(action: &str, save_name: &str, status: Status) {
    match status {
        Status::Ok => println!("{} '{}': ok", action, save_name),
        Status::NotFound => println!("{} '{}': snapshot not found, local progress kept", action, save_name),
        Status::ContentsUnavailable => println!("{} '{}': snapshot contents unavailable", action, save_name),
        Status::StorageUnavailable => println!("{} '{}': snapshot folder unavailable", action, save_name),
        Status::ConflictUnresolved => println!("{} '{}': could not resolve snapshot conflicts", action, save_name),
        other => println!("{} '{}': failed ({:?})", action, save_name, other),
    }
}
