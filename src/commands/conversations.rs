//! Conversation listing and per-conversation messages

use anyhow::{anyhow, Result};
use chrono::Local;
use colored::*;
use serde::Serialize;

use chat_archive_search::core::timeline::time_group;
use chat_archive_search::{Archive, Conversation};

use super::preview;

#[derive(Serialize)]
pub struct ConversationRow {
    pub group: String,
    pub id: String,
    pub title: String,
    pub created: String,
}

#[derive(Serialize)]
pub struct MessageRow {
    pub text: String,
    pub role: String,
    pub created: String,
}

#[derive(Serialize)]
pub struct ConversationMessages {
    pub conversation_id: String,
    pub messages: Vec<MessageRow>,
}

pub fn list_rows(archive: &Archive) -> Vec<ConversationRow> {
    let now = Local::now();
    archive
        .conversations()
        .iter()
        .map(|conv| ConversationRow {
            group: time_group(&conv.created, &now),
            id: conv.id.clone(),
            title: conv.title_str().to_string(),
            created: conv.created_str(),
        })
        .collect()
}

pub fn messages_of(conv: &Conversation) -> ConversationMessages {
    ConversationMessages {
        conversation_id: conv.id.clone(),
        messages: conv
            .messages
            .iter()
            .map(|m| MessageRow {
                text: m.text.clone(),
                role: m.role.clone(),
                created: m.created_str(),
            })
            .collect(),
    }
}

pub fn run_list(archive_path: &std::path::Path, json: bool) -> Result<()> {
    let archive = Archive::load(archive_path)?;
    let rows = list_rows(&archive);

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    let mut current_group: Option<&str> = None;
    for row in &rows {
        if current_group != Some(row.group.as_str()) {
            if current_group.is_some() {
                println!();
            }
            println!("{}", row.group.bold());
            current_group = Some(row.group.as_str());
        }
        println!("  {} {} {}", row.created.dimmed(), row.title.cyan(), row.id.dimmed());
    }
    println!();
    println!("{} {} conversations", "→".dimmed(), rows.len());

    Ok(())
}

pub fn run_messages(archive_path: &std::path::Path, conv_id: &str, json: bool) -> Result<()> {
    let archive = Archive::load(archive_path)?;
    let conv = archive
        .get(conv_id)
        .ok_or_else(|| anyhow!("Invalid conversation ID: {}", conv_id))?;
    let out = messages_of(conv);

    if json {
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("{} {}", conv.title_str().bold(), conv.id.dimmed());
    println!("{}", "=".repeat(60));
    for msg in &out.messages {
        println!("{} {}", format!("[{}]", msg.role).cyan(), msg.created.dimmed());
        println!("{}", preview(&msg.text, 400));
        println!();
    }

    Ok(())
}
