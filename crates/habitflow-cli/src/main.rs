mod session;

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use habitflow_core::models::{Frequency, UserProfile};
use habitflow_core::realtime::RealtimeFeed;
use habitflow_core::store::{HabitStore, SupabaseStore};
use habitflow_core::{AuthClient, BackendConfig, HabitLedger, SyncRuntime};

#[derive(Parser)]
#[command(name = "habitflow")]
#[command(about = "Habit tracking against a hosted backend")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and cache the session
    Login {
        email: String,
        password: String,
    },

    /// Create an account (and its profile row), then cache the session
    Signup {
        username: String,
        email: String,
        password: String,
    },

    /// Drop the cached session and revoke the token
    Logout,

    /// List habits, marking the ones already completed today
    List,

    /// Add a new habit
    Add {
        title: String,
        description: String,
        /// daily, weekly or monthly
        #[arg(long, short, default_value = "daily")]
        frequency: Frequency,
    },

    /// Mark a habit completed today
    Done {
        id: i64,
    },

    /// Delete a habit
    Rm {
        id: i64,
    },

    /// Show habits ranked by total completions, with streaks
    Streaks,

    /// Recompute drifted streak caches from the completion history
    Reconcile,

    /// Follow the live change feed and print mirror updates
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    habitflow_core::tracing_setup::init_tracing();
    let cli = Cli::parse();
    let config = BackendConfig::from_env().context("backend configuration missing")?;

    match cli.command {
        Commands::Login { email, password } => {
            let auth = AuthClient::new(config);
            let session = auth.sign_in(&email, &password).await?;
            session::save(&session)?;
            println!("signed in as {}", session.user_id);
        }
        Commands::Signup {
            username,
            email,
            password,
        } => {
            let auth = AuthClient::new(config.clone());
            let session = auth.sign_up(&username, &email, &password).await?;
            let store = SupabaseStore::new(config, &session.access_token);
            store
                .create_profile(UserProfile {
                    user_id: session.user_id.clone(),
                    username,
                })
                .await?;
            session::save(&session)?;
            println!("account created; signed in as {}", session.user_id);
        }
        Commands::Logout => {
            if let Ok(session) = session::load() {
                let auth = AuthClient::new(config);
                if let Err(e) = auth.sign_out(&session.access_token).await {
                    tracing::warn!(error = %e, "token revocation failed");
                }
            }
            session::clear()?;
            println!("signed out");
        }
        Commands::List => {
            let mut ledger = ledger_for(&config)?;
            ledger.load_habits().await;
            ledger.load_todays_completions(Utc::now()).await;
            let done = ledger.completed_today(Utc::now());
            for habit in ledger.habits() {
                let mark = if done.contains(&habit.id) { "x" } else { " " };
                println!(
                    "[{mark}] #{} {} ({}): {}",
                    habit.id,
                    habit.title,
                    habit.frequency.label(),
                    habit.description
                );
            }
        }
        Commands::Add {
            title,
            description,
            frequency,
        } => {
            let mut ledger = ledger_for(&config)?;
            ledger
                .create_habit(&title, &description, Some(frequency), Utc::now())
                .await?;
            println!("habit added");
        }
        Commands::Done { id } => {
            let mut ledger = ledger_for(&config)?;
            ledger.load_habits().await;
            ledger.load_todays_completions(Utc::now()).await;
            ledger.complete_habit(id, Utc::now()).await?;
            println!("habit {id} completed");
        }
        Commands::Rm { id } => {
            let mut ledger = ledger_for(&config)?;
            ledger.load_habits().await;
            ledger.delete_habit(id).await;
            println!("habit {id} deleted");
        }
        Commands::Streaks => {
            let mut ledger = ledger_for(&config)?;
            ledger.load_habits().await;
            ledger.load_completions().await;
            for (place, entry) in ledger.ranked(Utc::now()).iter().enumerate() {
                println!(
                    "{}. {}: current {}, best {}, total {}",
                    place + 1,
                    entry.habit.title,
                    entry.data.streak,
                    entry.data.best_streak,
                    entry.data.total
                );
            }
        }
        Commands::Reconcile => {
            let mut ledger = ledger_for(&config)?;
            ledger.load_habits().await;
            ledger.load_completions().await;
            ledger.reconcile_streak_counts(Utc::now()).await;
            println!("streak caches reconciled");
        }
        Commands::Watch => {
            let session = session::load()?;
            let store = Arc::new(SupabaseStore::new(config.clone(), &session.access_token));
            let feed = RealtimeFeed::new(config);
            let (feed_handle, feed_rx) = feed
                .subscribe(&session.access_token, &session.user_id)
                .await?;

            let runtime = SyncRuntime::new(store, session.user_id.clone(), feed_rx);
            let mut snapshots = runtime.snapshots();
            let handle = runtime.handle();
            let task = tokio::spawn(runtime.run());

            println!("watching; ctrl-c to stop");
            loop {
                tokio::select! {
                    changed = snapshots.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let snapshot = snapshots.borrow().clone();
                        println!(
                            "{} habits, {} completion rows",
                            snapshot.habits.len(),
                            snapshot.completions.len()
                        );
                    }
                    _ = tokio::signal::ctrl_c() => {
                        handle.shutdown();
                        break;
                    }
                }
            }
            feed_handle.shutdown();
            let _ = task.await;
        }
    }

    Ok(())
}

/// Build a ledger for the cached session. One-shot commands drive the ledger
/// directly; only `watch` needs the full runtime and feed.
fn ledger_for(config: &BackendConfig) -> Result<HabitLedger> {
    let session = session::load()?;
    let store = Arc::new(SupabaseStore::new(config.clone(), &session.access_token));
    Ok(HabitLedger::new(store, session.user_id))
}
