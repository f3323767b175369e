//! Index command - Build or inspect the embedding store

use std::path::Path;

use anyhow::{bail, Result};
use colored::Colorize;

use chat_archive_search::search::engine::resolve_backend;
use chat_archive_search::search::store::EmbeddingStore;
use chat_archive_search::{EngineOptions, SearchEngine};

/// Run index command
pub fn run(options: &EngineOptions, status_only: bool, rebuild: bool, json: bool) -> Result<()> {
    let store_path = &options.paths.store;

    if status_only {
        return show_status(store_path, json);
    }

    let Some(backend) = resolve_backend(options.backend, &options.paths)? else {
        bail!(
            "No embedding backend configured; add {} or pass --backend harmonic",
            options.paths.secrets.display()
        );
    };

    // Delete existing store if rebuild requested
    if rebuild && store_path.exists() {
        std::fs::remove_file(store_path)?;
        tracing::info!(path = %store_path.display(), "removed existing vector store");
        if !json {
            println!("{} Removed existing index", "→".dimmed());
        }
    }

    if !json {
        println!("{} Building search index...", "→".dimmed());
    }

    let engine = SearchEngine::start_with_backend(options, Some(backend))?;
    let (Some(semantic), Some(report)) = (engine.semantic(), engine.build_report()) else {
        bail!("Embedding backend disappeared during startup");
    };

    if json {
        println!(
            "{}",
            serde_json::json!({
                "model": semantic.model_name(),
                "total_units": report.total_units,
                "existing": report.existing,
                "embedded": report.embedded,
                "batches": report.batches,
                "indexed": semantic.index().len(),
                "dimension": semantic.index().dimension(),
                "duration_ms": report.duration_ms,
            })
        );
    } else {
        println!();
        println!(
            "{} Embedded {} new units in {:.2}s ({} already stored)",
            "✓".green().bold(),
            report.embedded.to_string().cyan(),
            report.duration_ms as f64 / 1000.0,
            report.existing
        );
        println!(
            "  {} {} vectors indexed with {}",
            "→".dimmed(),
            semantic.index().len(),
            semantic.model_name()
        );
        println!("  {} Index saved to: {}", "→".dimmed(), store_path.display());
    }

    Ok(())
}

/// Show index status
fn show_status(store_path: &Path, json: bool) -> Result<()> {
    if !store_path.exists() {
        if json {
            println!(
                "{}",
                serde_json::json!({
                    "exists": false,
                    "error": "Index not found"
                })
            );
        } else {
            println!(
                "{} Index not found. Run {} first.",
                "!".yellow().bold(),
                "chatsearch index".cyan()
            );
        }
        return Ok(());
    }

    let store = EmbeddingStore::open(store_path)?;
    let stats = store.stats()?;

    let file_size = std::fs::metadata(store_path).map(|m| m.len()).unwrap_or(0);

    if json {
        println!(
            "{}",
            serde_json::json!({
                "exists": true,
                "records": stats.records,
                "conversations": stats.conversations,
                "messages": stats.messages,
                "model": stats.model,
                "dimension": stats.dimension,
                "last_build": stats.last_build,
                "file_size_bytes": file_size,
            })
        );
    } else {
        println!("{}", "Index Status".bold());
        println!();
        println!(
            "  {} {} vectors ({} conversations, {} messages)",
            "→".dimmed(),
            stats.records.to_string().cyan(),
            stats.conversations,
            stats.messages
        );
        if let Some(model) = &stats.model {
            let dim = stats
                .dimension
                .map(|d| d.to_string())
                .unwrap_or_else(|| "?".to_string());
            println!("  {} Model: {} ({} dims)", "→".dimmed(), model, dim);
        }
        println!(
            "  {} Size: {:.2} KB",
            "→".dimmed(),
            file_size as f64 / 1024.0
        );
        if let Some(ts) = stats.last_build {
            let dt = chrono::DateTime::from_timestamp(ts, 0)
                .map(|d| chat_archive_search::core::conversation::format_time(&d))
                .unwrap_or_else(|| "Unknown".to_string());
            println!("  {} Last build: {}", "→".dimmed(), dt);
        }
    }

    Ok(())
}
