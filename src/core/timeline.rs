//! Time bucketing, daily activity and conversation length statistics

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Local, NaiveDate, Utc};
use serde::Serialize;

use super::conversation::{Archive, Conversation};

const CHAT_URL: &str = "https://chat.openai.com/c/";
const MIN_COUNTED_SECONDS: i64 = 1;
const TOP_LONGEST: usize = 3;

/// Relative bucket label used to group the conversation list
pub fn time_group(created: &DateTime<Utc>, now: &DateTime<Local>) -> String {
    let day = created.with_timezone(&Local).date_naive();
    let today = now.date_naive();
    let age = (today - day).num_days();

    match age {
        i64::MIN..=0 => "Today".to_string(),
        1 => "Yesterday".to_string(),
        2..=7 => "Previous 7 Days".to_string(),
        8..=30 => "Previous 30 Days".to_string(),
        _ => format!("{} {}", month_name(day.month()), day.year()),
    }
}

fn month_name(month: u32) -> &'static str {
    match month {
        1 => "January",
        2 => "February",
        3 => "March",
        4 => "April",
        5 => "May",
        6 => "June",
        7 => "July",
        8 => "August",
        9 => "September",
        10 => "October",
        11 => "November",
        _ => "December",
    }
}

/// Format a duration in seconds using its two most significant units
pub fn human_readable_duration(seconds: f64) -> String {
    let total = seconds.max(0.0).round() as i64;
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let secs = total % 60;

    if days > 0 {
        format!("{}d {}h", days, hours)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

/// Number of messages per local calendar day, ascending by day
pub fn activity_by_day(archive: &Archive) -> BTreeMap<NaiveDate, usize> {
    let mut activity = BTreeMap::new();
    for conv in archive.conversations() {
        for msg in &conv.messages {
            let day = msg.created.with_timezone(&Local).date_naive();
            *activity.entry(day).or_insert(0) += 1;
        }
    }
    activity
}

#[derive(Debug, Clone, Serialize)]
pub struct LongestConversation {
    pub id: String,
    pub title: String,
    pub length: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArchiveStatistics {
    pub first_chat: String,
    pub last_chat: String,
    pub shortest: String,
    pub longest: String,
    pub average: String,
    pub top_longest: Vec<LongestConversation>,
}

fn conversation_seconds(conv: &Conversation) -> i64 {
    (conv.last_activity() - conv.created).num_seconds()
}

pub fn statistics(archive: &Archive) -> ArchiveStatistics {
    let na = || "N/A".to_string();
    let convs = archive.conversations();

    let mut lengths: Vec<(i64, &Conversation)> =
        convs.iter().map(|c| (conversation_seconds(c), c)).collect();
    // Longest first; ties keep archive order
    lengths.sort_by(|a, b| b.0.cmp(&a.0));

    let first_chat = convs
        .iter()
        .map(|c| c.created)
        .min()
        .map(|t| t.with_timezone(&Local).format("%Y-%m-%d").to_string())
        .unwrap_or_else(na);
    let last_chat = convs
        .iter()
        .map(|c| c.created)
        .max()
        .map(|t| t.with_timezone(&Local).format("%Y-%m-%d").to_string())
        .unwrap_or_else(na);

    if lengths.is_empty() {
        return ArchiveStatistics {
            first_chat,
            last_chat,
            shortest: na(),
            longest: na(),
            average: na(),
            top_longest: Vec::new(),
        };
    }

    let shortest = lengths
        .iter()
        .map(|(secs, _)| *secs)
        .filter(|secs| *secs >= MIN_COUNTED_SECONDS)
        .min()
        .map(|secs| human_readable_duration(secs as f64))
        .unwrap_or_else(na);
    let longest = human_readable_duration(lengths[0].0 as f64);
    let mean = lengths.iter().map(|(secs, _)| *secs as f64).sum::<f64>() / lengths.len() as f64;

    let top_longest = lengths
        .iter()
        .take(TOP_LONGEST)
        .map(|(secs, conv)| LongestConversation {
            id: conv.id.clone(),
            title: conv.title_str().to_string(),
            length: human_readable_duration(*secs as f64),
            url: format!("{}{}", CHAT_URL, conv.id),
        })
        .collect();

    ArchiveStatistics {
        first_chat,
        last_chat,
        shortest,
        longest,
        average: human_readable_duration(mean),
        top_longest,
    }
}
