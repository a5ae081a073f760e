mod scenario;
mod sim;

use std::path::PathBuf;
use std::process::ExitCode;

use aurawatch_core::config::{Config, load_config};
use aurawatch_core::events::{MoveStart, SceneNotice};
use aurawatch_types::{TokenId, UserId};
use chrono::{DateTime, Duration, Utc};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::scenario::{Step, load_scenario};
use crate::sim::Table;

/// Replay a table scenario and print the reminders it produces.
#[derive(Parser)]
#[command(version, about = "aura reminder scenario replay")]
struct Cli {
    /// Scenario TOML file.
    scenario: PathBuf,

    /// Engine config TOML; defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };
    let scenario = load_scenario(&cli.scenario)?;
    let mut table = Table::from_scenario(&scenario, config);

    let mut now = Utc::now();
    for step in &scenario.steps {
        now += Duration::seconds(1);
        replay_step(&mut table, step, now).await;
        for reminder in table.drain_posts() {
            print_reminder(&reminder);
        }
    }

    Ok(())
}

async fn replay_step(table: &mut Table, step: &Step, now: DateTime<Utc>) {
    match step {
        Step::Move { token, user, x, y } => {
            let token: TokenId = token.as_str().into();
            let acting_user: Option<UserId> = user.as_deref().map(UserId::from);
            let start = {
                let world = table.world.borrow();
                world.positions.get(&token).copied()
            };
            if let Some((sx, sy)) = start {
                table
                    .notice_all(
                        SceneNotice::TokenUpdated {
                            token: token.clone(),
                            acting_user: acting_user.clone(),
                            movement: Some(MoveStart { x: sx, y: sy }),
                        },
                        now,
                    )
                    .await;
            }
            table.world.borrow_mut().move_token(&token, *x, *y);
            table
                .notice_all(
                    SceneNotice::TokenUpdated {
                        token,
                        acting_user,
                        movement: None,
                    },
                    now + Duration::milliseconds(100),
                )
                .await;
        }
        Step::Commit {
            token,
            user,
            move_id,
            x,
            y,
        } => {
            let token: TokenId = token.as_str().into();
            table.world.borrow_mut().move_token(&token, *x, *y);
            table
                .notice_all(
                    SceneNotice::PositionCommitted {
                        token,
                        acting_user: user.as_deref().map(UserId::from),
                        move_id: *move_id,
                    },
                    now,
                )
                .await;
        }
        Step::TurnStart { token } => {
            let token: TokenId = token.as_str().into();
            table.world.borrow_mut().set_active_combatant(&token);
            table
                .notice_all(SceneNotice::TurnStarted { token }, now)
                .await;
        }
        Step::ItemChanged { token, slug } => {
            table
                .notice_all(
                    SceneNotice::ItemChanged {
                        token: token.as_str().into(),
                        slug: slug.clone(),
                    },
                    now,
                )
                .await;
            // Let the debounced resync fire before the next step.
            let later = now + Duration::milliseconds(200);
            for client in &mut table.clients {
                client.tick(later);
            }
        }
        Step::DeleteToken { token } => {
            let token: TokenId = token.as_str().into();
            table.world.borrow_mut().delete_token(&token);
            table
                .notice_all(SceneNotice::TokenDeleted { token }, now)
                .await;
        }
    }
}

fn print_reminder(reminder: &sim::PostedReminder) {
    let audience = match &reminder.whisper_to {
        Some(users) => {
            let names: Vec<&str> = users.iter().map(UserId::as_str).collect();
            format!("whisper to {}", names.join(", "))
        }
        None => "public".to_string(),
    };
    println!(
        "[{} | {} | speaker {}] {}",
        reminder.poster, audience, reminder.speaker, reminder.content
    );
}
