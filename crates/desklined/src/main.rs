//! desklined - The deskline background service
//!
//! With no subcommand it runs the service loop:
//! - Configuration loading
//! - Store initialization
//! - Periodic SLA sweeps and escalation
//! - Notification outbox delivery
//!
//! The remaining subcommands are one-shot maintenance operations against the
//! same database.

mod commands;
mod delivery;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use deskline_config::{load_config, Policy};
use deskline_core::{CoreEvent, HelpDesk};
use deskline_store::{AuditEvent, AuditEventType, SqliteStore, Store};
use deskline_util::{default_config_path, DATABASE_FILENAME};
use delivery::Delivery;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// desklined - Helpdesk SLA and automation service
#[derive(Parser, Debug)]
#[command(name = "desklined")]
#[command(about = "Helpdesk SLA, automation and content maintenance service", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/deskline/config.toml)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Data directory override (or set DESKLINE_DATA_DIR env var)
    #[arg(short, long, env = "DESKLINE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the service loop (default)
    Run,

    /// Validate the configuration and print a summary
    CheckConfig,

    /// Run a single SLA sweep and print what it did
    SlaSweep,

    /// Follow the redirect chain for a path
    Resolve {
        path: String,
    },

    /// Redirect import and export
    #[command(subcommand)]
    Redirects(RedirectCommand),

    /// Menu export and import
    #[command(subcommand)]
    Menu(MenuCommand),

    /// Print ticket statistics as JSON
    Stats,
}

#[derive(Subcommand, Debug)]
enum RedirectCommand {
    /// Import redirects from a CSV or JSON file
    Import {
        file: PathBuf,

        /// csv or json (default: from the file extension)
        #[arg(short, long)]
        format: Option<String>,
    },

    /// Write all redirects to stdout
    Export {
        #[arg(short, long, default_value = "csv")]
        format: String,
    },
}

#[derive(Subcommand, Debug)]
enum MenuCommand {
    /// Write a menu tree as JSON to stdout
    Export {
        menu_id: i64,
    },

    /// Replace a menu's items with a JSON tree
    Import {
        menu_id: i64,
        file: PathBuf,
    },
}

/// Main service state
struct Service {
    desk: HelpDesk,
    delivery: Delivery,
    store: Arc<dyn Store>,
    config_path: PathBuf,
}

impl Service {
    fn new(args: &Args) -> Result<Self> {
        let (policy, store) = open(args)?;

        // Log service start
        store.append_audit(AuditEvent::new(AuditEventType::ServiceStarted))?;

        let delivery = Delivery::new(store.clone(), &policy.service)?;
        let desk = HelpDesk::with_outbox(policy, store.clone());

        Ok(Self {
            desk,
            delivery,
            store,
            config_path: args.config.clone(),
        })
    }

    async fn run(self) -> Result<()> {
        let tick_interval = self.desk.policy().service.tick_interval;
        let desk = Arc::new(Mutex::new(self.desk));
        let delivery = self.delivery;
        let store = self.store;

        // Set up signal handlers
        let mut sigterm = signal(SignalKind::terminate())
            .context("Failed to create SIGTERM handler")?;
        let mut sigint = signal(SignalKind::interrupt())
            .context("Failed to create SIGINT handler")?;
        let mut sighup = signal(SignalKind::hangup())
            .context("Failed to create SIGHUP handler")?;

        let mut tick_timer = tokio::time::interval(tick_interval);

        info!(tick_interval_secs = tick_interval.as_secs(), "Service running");

        loop {
            tokio::select! {
                // Signal: SIGTERM or SIGINT - graceful shutdown
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully");
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully");
                    break;
                }

                // Signal: SIGHUP - reload configuration
                _ = sighup.recv() => {
                    info!(path = %self.config_path.display(), "Received SIGHUP, reloading configuration");
                    match load_config(&self.config_path) {
                        Ok(policy) => {
                            let event = desk.lock().await.reload_policy(policy);
                            Self::handle_core_event(&event);
                        }
                        Err(e) => {
                            error!(error = %e, "Reload failed, keeping current configuration");
                        }
                    }
                }

                // Tick timer - SLA sweep, then deliver what it queued
                _ = tick_timer.tick() => {
                    let now = deskline_util::now();

                    let sweep = {
                        let desk = desk.lock().await;
                        desk.sweep_sla(now)
                    };
                    match sweep {
                        Ok(report) => {
                            debug!(
                                checked = report.checked,
                                breached = report.breached,
                                escalated = report.escalated,
                                "SLA sweep finished"
                            );
                            for event in &report.events {
                                Self::handle_core_event(event);
                            }
                        }
                        Err(e) => error!(error = %e, "SLA sweep failed"),
                    }

                    match delivery.drain().await {
                        Ok(report) if report.delivered + report.failed > 0 => {
                            info!(
                                delivered = report.delivered,
                                failed = report.failed,
                                abandoned = report.abandoned,
                                "Notification outbox drained"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => error!(error = %e, "Notification delivery failed"),
                    }
                }
            }
        }

        // Graceful shutdown
        info!("Shutting down desklined");

        // Flush whatever the last sweep queued
        if let Err(e) = delivery.drain().await {
            warn!(error = %e, "Final notification drain failed");
        }

        // Log shutdown
        if let Err(e) = store.append_audit(AuditEvent::new(AuditEventType::ServiceStopped)) {
            warn!(error = %e, "Failed to log service shutdown");
        }

        info!("Shutdown complete");
        Ok(())
    }

    fn handle_core_event(event: &CoreEvent) {
        match event {
            CoreEvent::SlaBreached { ticket_id, due_at } => {
                warn!(ticket_id = %ticket_id, due_at = %due_at, "SLA breached");
            }
            CoreEvent::TicketEscalated {
                ticket_id,
                level,
                priority,
                assignee,
            } => {
                info!(
                    ticket_id = %ticket_id,
                    level,
                    priority = %priority,
                    assignee = ?assignee,
                    "Ticket escalated"
                );
            }
            CoreEvent::PolicyReloaded {
                rule_count,
                sla_policy_count,
            } => {
                info!(rule_count, sla_policy_count, "Policy reloaded");
            }
        }
    }
}

/// Load the policy and open the database it points at
fn open(args: &Args) -> Result<(Policy, Arc<dyn Store>)> {
    let policy = load_policy(&args.config)?;

    let data_dir = args
        .data_dir
        .clone()
        .unwrap_or_else(|| policy.service.data_dir.clone());

    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

    let store_path = data_dir.join(DATABASE_FILENAME);
    let store: Arc<dyn Store> = Arc::new(
        SqliteStore::open(&store_path)
            .with_context(|| format!("Failed to open store: {}", store_path.display()))?,
    );

    info!(
        store_path = %store_path.display(),
        "Store initialized"
    );

    Ok((policy, store))
}

fn load_policy(path: &Path) -> Result<Policy> {
    let policy = load_config(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;

    info!(
        config_path = %path.display(),
        agents = policy.agents.len(),
        rules = policy.rules.len(),
        "Configuration loaded"
    );

    Ok(policy)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    match &args.command {
        None | Some(Command::Run) => {
            info!(version = env!("CARGO_PKG_VERSION"), "desklined starting");
            let service = Service::new(&args)?;
            service.run().await
        }
        Some(Command::CheckConfig) => commands::check_config(&load_policy(&args.config)?),
        Some(Command::SlaSweep) => {
            let (policy, store) = open(&args)?;
            commands::sla_sweep(policy, store)
        }
        Some(Command::Resolve { path }) => {
            let (policy, store) = open(&args)?;
            commands::resolve(&policy, store, path)
        }
        Some(Command::Redirects(RedirectCommand::Import { file, format })) => {
            let (policy, store) = open(&args)?;
            commands::import_redirects(&policy, store, file, format.as_deref())
        }
        Some(Command::Redirects(RedirectCommand::Export { format })) => {
            let (policy, store) = open(&args)?;
            commands::export_redirects(&policy, store, format)
        }
        Some(Command::Menu(MenuCommand::Export { menu_id })) => {
            let (policy, store) = open(&args)?;
            commands::export_menu(&policy, store, *menu_id)
        }
        Some(Command::Menu(MenuCommand::Import { menu_id, file })) => {
            let (policy, store) = open(&args)?;
            commands::import_menu(&policy, store, *menu_id, file)
        }
        Some(Command::Stats) => {
            let (policy, store) = open(&args)?;
            commands::stats(policy, store)
        }
    }
}
