//! Cache command - manage local compile caches

use crate::cache::{format_bytes, local_dir, CacheEntry, DirBackend};
use crate::cli::args::{CacheAction, CacheArgs, OutputFormat};
use crate::config::{Config, ConfigManager};
use crate::error::KilnResult;
use crate::ui::{self, UiContext};
use console::style;
use tracing::debug;

/// Execute the cache command
pub async fn execute(args: CacheArgs, config: &Config) -> KilnResult<()> {
    let backends = local_backends(config);

    match args.action {
        CacheAction::List { format } => list_entries(&backends, format).await,
        CacheAction::Clear { yes } => clear_entries(&backends, yes).await,
    }
}

/// Every configured local directory, each once; remote mirrors are skipped
fn local_backends(config: &Config) -> Vec<DirBackend> {
    let (read_from, write_to) = ConfigManager::cache_locations(config);
    let mut dirs = Vec::new();
    for location in read_from.iter().chain(write_to.iter()) {
        match local_dir(location) {
            Some(dir) if !dirs.contains(&dir) => dirs.push(dir),
            Some(_) => {}
            None => debug!("Skipping remote cache location {}", location),
        }
    }
    dirs.into_iter().map(DirBackend::new).collect()
}

async fn list_entries(backends: &[DirBackend], format: OutputFormat) -> KilnResult<()> {
    let mut listed: Vec<(String, CacheEntry)> = Vec::new();
    for backend in backends {
        let location = backend.root().display().to_string();
        for entry in backend.list_entries().await? {
            listed.push((location.clone(), entry));
        }
    }

    if listed.is_empty() {
        println!("No cache entries found.");
        return Ok(());
    }

    match format {
        OutputFormat::Table => print_entry_table(&listed),
        OutputFormat::Json => print_entry_json(&listed)?,
        OutputFormat::Plain => {
            for (_, entry) in &listed {
                println!("{}", entry.key);
            }
        }
    }

    Ok(())
}

fn print_entry_table(listed: &[(String, CacheEntry)]) {
    println!(
        "{:<18} {:<10} {:<8} {:<8} {:<18} {}",
        "KEY", "SIZE", "ERRORS", "WARNINGS", "CREATED", "LOCATION"
    );
    println!("{}", "-".repeat(90));

    for (location, entry) in listed {
        let warnings = entry.diagnostic_counts.warning;
        let warnings_display = if warnings > 0 {
            style(warnings.to_string()).yellow().to_string()
        } else {
            warnings.to_string()
        };
        println!(
            "{:<18} {:<10} {:<8} {:<8} {:<18} {}",
            entry.key.as_str().get(..16).unwrap_or(entry.key.as_str()),
            format_bytes(entry.output_bytes()),
            entry.diagnostic_counts.error,
            warnings_display,
            entry.created_at.format("%Y-%m-%d %H:%M"),
            location
        );
    }

    println!();
    println!("Total: {} entr{}", listed.len(), if listed.len() == 1 { "y" } else { "ies" });
}

fn print_entry_json(listed: &[(String, CacheEntry)]) -> KilnResult<()> {
    #[derive(serde::Serialize)]
    struct EntryJson<'a> {
        key: &'a str,
        location: &'a str,
        output_fingerprint: &'a str,
        output_bytes: u64,
        diagnostic_counts: serde_json::Value,
        created_at: String,
    }

    let json: Vec<EntryJson> = listed
        .iter()
        .map(|(location, entry)| EntryJson {
            key: entry.key.as_str(),
            location,
            output_fingerprint: &entry.output_digest.fingerprint,
            output_bytes: entry.output_bytes(),
            diagnostic_counts: entry.diagnostic_counts.to_json(),
            created_at: entry.created_at.to_rfc3339(),
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

async fn clear_entries(backends: &[DirBackend], yes: bool) -> KilnResult<()> {
    let ctx = UiContext::detect().with_auto_yes(yes);

    let mut total = 0;
    for backend in backends {
        total += backend.list_entries().await?.len();
    }
    if total == 0 {
        println!("No cache entries to clear.");
        return Ok(());
    }

    println!("This will remove {} cache entr{} from:", total, if total == 1 { "y" } else { "ies" });
    for backend in backends {
        println!("  {} {}", style("•").red(), backend.root().display());
    }
    println!();

    if !ui::confirm(&ctx, "Clear the compile cache?", false).await? {
        println!("Aborted.");
        return Ok(());
    }

    let mut removed = 0;
    for backend in backends {
        removed += backend.clear().await?;
    }
    ui::step_ok(&ctx, &format!("Cleared {} cache entr{}", removed, if removed == 1 { "y" } else { "ies" }));

    Ok(())
}
