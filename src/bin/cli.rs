//! Listing Monitor CLI
//!
//! Local execution entry point: runs the scheduler or a single cycle and
//! manages listings, reminders and settings in the storage directory.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use listing_monitor::{
    Monitor,
    error::{AppError, Result},
    models::{Config, NewReminder, ReminderFilter, ReminderMethod, TransitionKind},
};
use serde::Serialize;

/// Marketplace listing monitor
#[derive(Parser, Debug)]
#[command(
    name = "monitor",
    version,
    about = "Tracks marketplace listings and sends stock and price reminders"
)]
struct Cli {
    /// Path to storage directory containing config.toml and store.json
    #[arg(short, long, default_value = "storage")]
    storage_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the scheduler until Ctrl-C
    Run,

    /// Run a single cycle over every tracked listing
    Check,

    /// Track a listing (or refresh it now)
    Add {
        url: String,

        #[arg(short, long, default_value = "default")]
        user: String,
    },

    /// Scrape item specifics, seller and images of a listing without tracking it
    Details {
        url: String,

        /// Include full-size gallery image URLs
        #[arg(long)]
        images: bool,
    },

    /// Stop tracking a listing
    Remove {
        listing_id: String,

        #[arg(short, long, default_value = "default")]
        user: String,
    },

    /// Show the listings of a user
    List {
        #[arg(short, long, default_value = "default")]
        user: String,
    },

    /// Add a reminder for a listing transition
    Remind {
        listing_id: String,

        /// out_of_stock, back_in_stock, price_drop or price_increase
        transition: TransitionKind,

        /// telegram, sms or email
        #[arg(short, long, default_value = "telegram")]
        method: ReminderMethod,

        /// User whose contact settings receive the reminder
        #[arg(short, long)]
        user: Option<String>,
    },

    /// List reminders, or delete one
    Reminders {
        #[arg(long)]
        listing: Option<String>,

        /// Delete the reminder with this id
        #[arg(long)]
        delete: Option<u64>,
    },

    /// Show or update user settings
    Settings {
        #[arg(short, long, default_value = "default")]
        user: String,

        /// Poll interval in seconds
        #[arg(long)]
        interval: Option<u64>,

        #[arg(long)]
        phone: Option<String>,

        #[arg(long)]
        telegram: Option<String>,

        #[arg(long)]
        email: Option<String>,
    },

    /// Daily price statistics of a listing
    Stats {
        listing_id: String,

        /// First day (YYYY-MM-DD)
        #[arg(long)]
        from: NaiveDate,

        /// Last day (YYYY-MM-DD)
        #[arg(long)]
        to: NaiveDate,
    },

    /// Validate the configuration file
    Validate,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool, level: &str) {
    let level = if verbose { "debug" } else { level };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.storage_dir.join("config.toml");
    let level = Config::load(&config_path)
        .map(|c| c.logging.level)
        .unwrap_or_else(|_| "info".to_string());
    init_logging(cli.verbose, &level);

    let config = Config::load_or_default(&config_path);
    log::info!("Loaded configuration from {}", cli.storage_dir.display());

    if matches!(cli.command, Command::Validate) {
        log::info!("Validating configuration...");
        if let Err(e) = config.validate() {
            log::error!("Config validation failed: {}", e);
            return Err(e);
        }
        if !config.telegram.is_configured() {
            log::warn!("No telegram bot token configured, reminders will only be logged");
        }
        log::info!("✓ Config OK");
        return Ok(());
    }

    config.validate()?;
    let mut monitor = Monitor::open(config, &cli.storage_dir).await?;

    match cli.command {
        Command::Run => {
            let task = monitor.start()?;
            let handle = monitor
                .scheduler()
                .cloned()
                .ok_or_else(|| AppError::config("scheduler did not start"))?;

            tokio::signal::ctrl_c().await?;
            log::info!("Shutting down...");
            handle.shutdown();
            if let Err(e) = task.await {
                log::error!("Scheduler task failed: {}", e);
            }
        }

        Command::Check => {
            let report = monitor.run_cycle().await?;
            print_json(&report)?;
        }

        Command::Add { url, user } => {
            let added = monitor.add_or_refresh_listing(&user, &url).await?;
            log::info!("Listing {} {:?}", added.id, added.action);
            print_json(&added)?;
        }

        Command::Details { url, images } => {
            print_json(&monitor.listing_details(&url, images).await?)?;
        }

        Command::Remove { listing_id, user } => {
            let removal = monitor.delete_listing(&user, &listing_id).await?;
            log::info!("Listing {} removed for {} ({:?})", listing_id, user, removal);
        }

        Command::List { user } => {
            print_json(&monitor.current_listings(&user).await?)?;
        }

        Command::Remind {
            listing_id,
            transition,
            method,
            user,
        } => {
            let mut reminder = NewReminder::new(method, listing_id, transition);
            if let Some(user) = user {
                reminder = reminder.for_user(user);
            }
            match monitor.add_reminder(reminder).await? {
                Some(stored) => print_json(&stored)?,
                None => log::warn!("An identical reminder already exists"),
            }
        }

        Command::Reminders { listing, delete } => {
            if let Some(id) = delete {
                if !monitor.delete_reminder(id).await? {
                    return Err(AppError::not_found(format!("reminder {id}")));
                }
                log::info!("Reminder {} deleted", id);
            } else {
                let filter = ReminderFilter {
                    listing_id: listing,
                    ..ReminderFilter::default()
                };
                print_json(&monitor.reminders(&filter).await?)?;
            }
        }

        Command::Settings {
            user,
            interval,
            phone,
            telegram,
            email,
        } => {
            let mut settings = monitor.settings(&user).await?;
            let changed = interval.is_some() || phone.is_some() || telegram.is_some() || email.is_some();

            if let Some(interval) = interval {
                settings.poll_interval_secs = interval;
            }
            if phone.is_some() {
                settings.phone_number = phone;
            }
            if telegram.is_some() {
                settings.telegram_user_id = telegram;
            }
            if email.is_some() {
                settings.email = email;
            }

            if changed {
                monitor.update_settings(settings.clone()).await?;
                log::info!("Settings of {} saved", user);
            }
            print_json(&settings)?;
        }

        Command::Stats {
            listing_id,
            from,
            to,
        } => {
            print_json(&monitor.price_statistics(&listing_id, from, to).await?)?;
        }

        Command::Validate => {}
    }

    Ok(())
}
