//! Search command - exact or semantic search over the archive

use anyhow::Result;
use colored::*;

use chat_archive_search::search::router::validate_query;
use chat_archive_search::{EngineOptions, SearchEngine, SearchHit, SearchMode};

use super::preview;

pub fn run(options: &EngineOptions, query: &str, json: bool) -> Result<()> {
    let query = validate_query(query)?;
    let engine = SearchEngine::start(options)?;
    let results = engine.search(query)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&results.hits)?);
        return Ok(());
    }

    let mode = match results.mode {
        SearchMode::Exact => "exact".yellow(),
        SearchMode::Semantic => "semantic".green(),
    };

    if results.hits.is_empty() {
        println!("{} No results found for: {} [{}]", "→".dimmed(), results.query.cyan(), mode);
        return Ok(());
    }

    println!(
        "{} {} results for: {} [{}]",
        "→".dimmed(),
        results.hits.len(),
        results.query.cyan(),
        mode
    );
    println!();

    for (i, hit) in results.hits.iter().enumerate() {
        let p = hit.payload();
        let label = match hit {
            SearchHit::Conversation(_) => "conversation".blue(),
            SearchHit::Message(_) => "message".magenta(),
        };
        let score = p
            .score
            .map(|s| format!(" {:.2}", s).dimmed().to_string())
            .unwrap_or_default();

        println!(
            "{}. [{}]{} {}",
            (i + 1).to_string().bold(),
            label,
            score,
            p.title.cyan()
        );
        println!("   {} {}", format!("{}:", p.role).bold(), preview(&p.text, 100).dimmed());
        println!("   {} | {}", p.created_str, p.id.dimmed());
        println!();
    }

    Ok(())
}
