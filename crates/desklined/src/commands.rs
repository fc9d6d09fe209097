//! One-shot maintenance subcommands
//!
//! Results go to stdout; logs go to stderr.

use anyhow::{Context, Result};
use deskline_config::Policy;
use deskline_core::{ContentService, DataFormat, HelpDesk, RedirectService};
use deskline_store::Store;
use deskline_util::MenuId;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

pub fn check_config(policy: &Policy) -> Result<()> {
    println!("Configuration is valid");
    println!("  Agents: {}", policy.agents.len());
    println!("  Categories: {}", policy.categories.len());
    println!("  SLA policies: {}", policy.sla_policies.len());
    println!("  Rules: {}", policy.rules.len());
    println!("  Escalation levels: {}", policy.escalation.max_level);
    Ok(())
}

pub fn sla_sweep(policy: Policy, store: Arc<dyn Store>) -> Result<()> {
    let desk = HelpDesk::with_outbox(policy, store);
    let report = desk.sweep_sla(deskline_util::now())?;

    println!(
        "checked {} ticket(s): {} breached, {} escalated",
        report.checked, report.breached, report.escalated
    );
    for event in &report.events {
        println!("  {:?}", event);
    }
    Ok(())
}

pub fn resolve(policy: &Policy, store: Arc<dyn Store>, path: &str) -> Result<()> {
    let redirects = RedirectService::new(store, policy.limits.max_redirect_hops);
    let resolution = redirects.resolve(path, deskline_util::now())?;
    println!("{}", serde_json::to_string_pretty(&resolution)?);
    Ok(())
}

pub fn import_redirects(
    policy: &Policy,
    store: Arc<dyn Store>,
    file: &Path,
    format: Option<&str>,
) -> Result<()> {
    let format = match format {
        Some(format) => format.parse::<DataFormat>()?,
        None => format_from_extension(file)?,
    };
    let data = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let redirects = RedirectService::new(store, policy.limits.max_redirect_hops);
    let outcome = redirects.import(&data, format)?;

    info!(
        file = %file.display(),
        processed = outcome.processed,
        skipped = outcome.skipped,
        failed = outcome.failed,
        "Redirect import finished"
    );
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

pub fn export_redirects(policy: &Policy, store: Arc<dyn Store>, format: &str) -> Result<()> {
    let redirects = RedirectService::new(store, policy.limits.max_redirect_hops);
    print!("{}", redirects.export(format.parse::<DataFormat>()?)?);
    Ok(())
}

pub fn export_menu(policy: &Policy, store: Arc<dyn Store>, menu_id: i64) -> Result<()> {
    let cms = ContentService::new(store, policy.limits);
    println!("{}", cms.export_menu_json(MenuId::new(menu_id))?);
    Ok(())
}

pub fn import_menu(policy: &Policy, store: Arc<dyn Store>, menu_id: i64, file: &Path) -> Result<()> {
    let json = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let cms = ContentService::new(store, policy.limits);
    let count = cms.import_menu_json(MenuId::new(menu_id), &json)?;
    println!("imported {} menu item(s)", count);
    Ok(())
}

pub fn stats(policy: Policy, store: Arc<dyn Store>) -> Result<()> {
    let desk = HelpDesk::with_outbox(policy, store);
    let stats = desk.stats(deskline_util::now())?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

fn format_from_extension(file: &Path) -> Result<DataFormat> {
    let extension = file
        .extension()
        .and_then(|e| e.to_str())
        .context("Cannot tell the format from the file name, pass --format")?;
    Ok(extension.parse::<DataFormat>()?)
}
