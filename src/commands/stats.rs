use std::path::Path;

use anyhow::Result;
use colored::*;

use chat_archive_search::core::timeline::statistics;
use chat_archive_search::Archive;

pub fn run(archive_path: &Path, json: bool) -> Result<()> {
    let archive = Archive::load(archive_path)?;
    let stats = statistics(&archive);

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("{}", "Archive Statistics".bold());
    println!("{}", "=".repeat(50));
    println!("   {:<24} {}", "First chat message", stats.first_chat);
    println!("   {:<24} {}", "Last chat message", stats.last_chat);
    println!("   {:<24} {}", "Shortest conversation", stats.shortest);
    println!("   {:<24} {}", "Longest conversation", stats.longest);
    println!("   {:<24} {}", "Average chat length", stats.average);

    if !stats.top_longest.is_empty() {
        println!();
        println!("{}", "Top longest chats".cyan());
        println!("{}", "-".repeat(30));
        for (i, conv) in stats.top_longest.iter().enumerate() {
            println!(
                "   {}. {} ({})",
                i + 1,
                conv.title,
                conv.length.yellow()
            );
            println!("      {}", conv.url.dimmed());
        }
    }

    Ok(())
}
