//! Command handlers for tiquetctl.

use anyhow::{bail, Context, Result};
use owo_colors::OwoColorize;
use std::fs;
use std::path::Path;
use tracing::info;

use tiquet_core::catalog::{seed, CatalogKind, SeedEntry};
use tiquet_core::stats::CountBucket;
use tiquet_core::{TicketEngine, TiquetConfig};

/// Create the database, seed the catalog and create the upload root.
/// Writes the config file too when it does not exist yet, so later runs
/// find the same paths.
pub fn init(config: &TiquetConfig, config_path: &Path) -> Result<()> {
    let engine = TicketEngine::from_config(config).context("Failed to initialize storage")?;

    let upload_root = engine.attachments().upload_root().to_path_buf();
    fs::create_dir_all(&upload_root)
        .with_context(|| format!("Failed to create upload root {}", upload_root.display()))?;

    if !config_path.exists() {
        config
            .save(config_path)
            .with_context(|| format!("Failed to write {}", config_path.display()))?;
        println!("Wrote {}", config_path.display());
    }

    println!("{}", "Tiquet storage ready".bright_green());
    print_kv("database", &engine.store().db_path().display().to_string());
    print_kv("upload root", &upload_root.display().to_string());
    for kind in CatalogKind::ALL {
        let entries = engine.catalog().entries(kind);
        print_kv(kind.table(), &format!("{} entries", entries.len()));
    }

    info!("Initialized database at {:?}", engine.store().db_path());
    Ok(())
}

/// Table of id / value / desc for one catalog kind.
pub fn catalog_list(config: &TiquetConfig, kind: CatalogKind) -> Result<()> {
    let engine = TicketEngine::from_config(config).context("Failed to open storage")?;
    let entries = engine.catalog().entries(kind);
    if entries.is_empty() {
        println!("No {} entries", kind);
        return Ok(());
    }

    println!("{}", kind.to_string().bright_cyan().bold());
    let width = entries
        .iter()
        .map(|e| console::measure_text_width(&e.value))
        .max()
        .unwrap_or(0);
    for entry in &entries {
        println!(
            "  {}  {}  {}",
            format!("{:>4}", entry.id).dimmed(),
            console::pad_str(&entry.value, width, console::Alignment::Left, None),
            entry.desc
        );
    }
    Ok(())
}

/// Append one entry to the kind's seed file (created from the built-ins
/// when absent) and re-seed the database from the seed directory.
pub fn catalog_add(
    config: &TiquetConfig,
    kind: CatalogKind,
    value: &str,
    desc: &str,
) -> Result<()> {
    if value.trim().is_empty() || desc.trim().is_empty() {
        bail!("Both --value and --desc must be non-empty");
    }
    let seed_dir = config.catalog.seed_dir.as_ref().context(
        "No catalog.seed_dir configured; set it in tiquet.toml before editing the catalog",
    )?;

    let path = seed_dir.join(kind.file_name());
    let mut entries = if path.exists() {
        seed::parse_file(&path)
            .with_context(|| format!("Seed file {} is not usable", path.display()))?
    } else {
        seed::default_seed().for_kind(kind).to_vec()
    };

    if entries.iter().any(|e| e.value == value) {
        bail!("{} already has an entry with value '{}'", kind, value);
    }
    entries.push(SeedEntry::new(value, desc));
    seed::write_file(&path, &entries)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    // Opening the engine re-seeds from the directory we just extended.
    let engine = TicketEngine::from_config(config).context("Failed to open storage")?;
    let total = engine.catalog().entries(kind).len();

    println!(
        "{} Added '{}' to {} ({} entries)",
        "ok".bright_green(),
        value,
        kind,
        total
    );
    print_kv("seed file", &path.display().to_string());
    Ok(())
}

/// Parse every seed file present in the seed directory.
pub fn catalog_validate(config: &TiquetConfig) -> Result<()> {
    let seed_dir = config
        .catalog
        .seed_dir
        .as_ref()
        .context("No catalog.seed_dir configured")?;
    if !seed_dir.is_dir() {
        bail!("Seed directory {} does not exist", seed_dir.display());
    }

    let mut problems = 0;
    for kind in CatalogKind::ALL {
        let path = seed_dir.join(kind.file_name());
        if !path.exists() {
            println!(
                "  {}  {} (missing, built-ins apply)",
                "-".dimmed(),
                kind.file_name()
            );
            continue;
        }
        match seed::parse_file(&path) {
            Ok(entries) => println!(
                "  {}  {} ({} entries)",
                "ok".bright_green(),
                kind.file_name(),
                entries.len()
            ),
            Err(e) => {
                problems += 1;
                println!("  {}  {}: {}", "fail".bright_red(), kind.file_name(), e);
            }
        }
    }

    if problems > 0 {
        bail!("{} seed file(s) failed validation", problems);
    }
    Ok(())
}

/// Metadata-vs-filesystem sweep over every ticket's attachments.
pub fn check_attachments(config: &TiquetConfig) -> Result<()> {
    let engine = TicketEngine::from_config(config).context("Failed to open storage")?;
    let report = engine
        .attachments()
        .verify()
        .context("Integrity sweep failed")?;

    print_kv("entries checked", &report.entries_checked.to_string());
    if report.missing.is_empty() && report.orphans.is_empty() {
        println!(
            "{}",
            "All attachment metadata matches the filesystem".bright_green()
        );
        return Ok(());
    }

    if !report.missing.is_empty() {
        println!(
            "{}",
            format!("{} entries without a backing file", report.missing.len()).bright_red()
        );
        for m in &report.missing {
            println!("  {}  {}  ({})", m.ticket_id, m.path, m.original_name);
        }
    }
    if !report.orphans.is_empty() {
        println!(
            "{}",
            format!("{} files not referenced by any ticket", report.orphans.len()).yellow()
        );
        for path in &report.orphans {
            println!("  {}", path);
        }
    }
    Ok(())
}

/// Flat `YYYY/MM` layout to `tickets/{id}/attachments/YYYY/MM`.
pub fn migrate_files(config: &TiquetConfig) -> Result<()> {
    let engine = TicketEngine::from_config(config).context("Failed to open storage")?;
    let report = engine
        .attachments()
        .migrate_legacy_layout()
        .context("Migration failed")?;

    println!("{}", "Attachment layout migration".bright_cyan().bold());
    print_kv("moved", &report.moved.to_string());
    print_kv("skipped", &report.skipped.to_string());
    print_kv("failed", &report.failed.to_string());

    info!(
        "Migration finished: {} moved, {} skipped, {} failed",
        report.moved, report.skipped, report.failed
    );
    if report.failed > 0 {
        bail!("{} file(s) could not be moved", report.failed);
    }
    Ok(())
}

/// Dashboard statistics, as aligned text or JSON.
pub fn stats(config: &TiquetConfig, json: bool) -> Result<()> {
    let engine = TicketEngine::from_config(config).context("Failed to open storage")?;
    let stats = engine
        .dashboard_stats()
        .context("Failed to compute statistics")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("{}", "Tiquet statistics".bright_cyan().bold());
    println!(
        "{}",
        format!(
            "generated {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        )
        .dimmed()
    );
    print_kv("total tickets", &stats.total_tickets.to_string());
    print_kv("open tickets", &stats.open_tickets.to_string());
    println!();

    print_buckets("By type", &stats.by_type);
    print_buckets("By status", &stats.by_status);
    print_buckets("By criticality", &stats.by_criticality);
    print_buckets("By center", &stats.by_center);
    print_buckets("Top tools", &stats.by_tool);

    if !stats.trend.is_empty() {
        println!("{}", "Created, last 30 days".bright_cyan().bold());
        for point in &stats.trend {
            println!("  {}  {}", point.date, point.count);
        }
    }
    Ok(())
}

fn print_kv(key: &str, value: &str) {
    println!("  {}  {}", format!("{:<16}", key).dimmed(), value);
}

fn print_buckets(title: &str, buckets: &[CountBucket]) {
    if buckets.is_empty() {
        return;
    }
    println!("{}", title.bright_cyan().bold());
    let width = buckets
        .iter()
        .map(|b| console::measure_text_width(&b.label))
        .max()
        .unwrap_or(0);
    for bucket in buckets {
        println!(
            "  {}  {}",
            console::pad_str(&bucket.label, width, console::Alignment::Left, None),
            bucket.count
        );
    }
    println!();
}
