//! TextGenerator capability and the thin AI endpoints built on it:
//! issue drafting, comment reply/polish, and activity summarization.
//! Model output is never trusted as-is: every endpoint has an output
//! contract it enforces or falls back from.

use anyhow::{Context, bail};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use tessera_types::{IssueDraft, Priority, Status};

use crate::config::SyncConfig;
use crate::timeline::ActivityEntry;

/// External LLM endpoint: prompt in, text out. Implementations own
/// transport, auth and retries; callers own the output contract.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, system_instruction: &str, prompt: &str) -> anyhow::Result<String>;
}

#[derive(Debug, Deserialize)]
struct RawDraft {
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    priority: String,
    #[serde(default)]
    labels: Vec<String>,
    #[serde(default, rename = "dueDate")]
    due_date: String,
}

/// Strips a Markdown code fence (```json ... ```) the model often wraps
/// JSON output in.
fn strip_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

/// Generates a structured issue draft from a free-text request.
/// The returned draft always has status Todo; priority and due date are
/// normalized from whatever representation the model chose.
#[tracing::instrument(skip(model, prompt))]
pub async fn draft_issue<G: TextGenerator + ?Sized>(
    model: &G,
    now: DateTime<Utc>,
    prompt: &str,
) -> anyhow::Result<IssueDraft> {
    if prompt.trim().is_empty() {
        bail!("draft prompt must not be empty");
    }

    let system = format!(
        "You draft issues for a software team's tracker. Today is {today}. \
         Respond with a single JSON object and nothing else: \
         {{\"title\": string, \"description\": string, \"status\": \"Todo\", \
         \"priority\": one of \"Urgent\"|\"High\"|\"Medium\"|\"Low\"|\"No priority\", \
         \"labels\": string[], \"dueDate\": \"YYYY-MM-DD\" or \"\"}}. \
         Do not wrap the JSON in a code fence.",
        today = now.format("%Y-%m-%d"),
    );

    let raw = model
        .generate(&system, prompt)
        .await
        .context("issue draft generation")?;
    let body = strip_fences(&raw);
    let parsed: RawDraft =
        serde_json::from_str(body).context("issue draft was not the expected JSON shape")?;
    if parsed.title.trim().is_empty() {
        bail!("issue draft had an empty title");
    }

    let due_date = match parsed.due_date.trim() {
        "" => None,
        raw => NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok(),
    };

    Ok(IssueDraft {
        title: parsed.title.trim().to_string(),
        description: parsed.description.trim().to_string(),
        status: Status::Todo,
        priority: Priority::normalize_str(&parsed.priority),
        labels: parsed.labels,
        due_date,
    })
}

/// Drafts a reply to the issue's discussion.
#[tracing::instrument(skip(model, title, description))]
pub async fn generate_reply<G: TextGenerator + ?Sized>(
    model: &G,
    title: &str,
    description: &str,
) -> anyhow::Result<String> {
    let system = "You write short, direct comments on issue trackers. \
                  Reply with the comment text only, no preamble, no quotes.";
    let prompt = format!("Issue: {title}\n\nDescription: {description}\n\nWrite a helpful reply.");
    let text = model
        .generate(system, &prompt)
        .await
        .context("reply generation")?;
    Ok(text.trim().to_string())
}

/// Rewrites the user's comment draft: one polished version, no
/// alternatives.
#[tracing::instrument(skip(model, draft))]
pub async fn polish_draft<G: TextGenerator + ?Sized>(
    model: &G,
    draft: &str,
) -> anyhow::Result<String> {
    if draft.trim().is_empty() {
        bail!("nothing to polish");
    }
    let system = "You edit issue-tracker comments for clarity and tone. \
                  Return exactly one rewritten version of the text, nothing else. \
                  Do not offer alternatives.";
    let text = model
        .generate(system, draft)
        .await
        .context("draft polish")?;
    Ok(text.trim().to_string())
}

fn entry_line(entry: &ActivityEntry) -> String {
    match entry {
        ActivityEntry::Comment { author, text, .. } => {
            format!("COMMENT | user={author} | text={text}")
        }
        ActivityEntry::Event {
            actor,
            kind,
            details,
            ..
        } => {
            let field = |key: &str| {
                details
                    .get(key)
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string()
            };
            format!(
                "EVENT | user={actor} | type={kind:?} | from={} | to={}",
                field("from"),
                field("to"),
            )
        }
    }
}

/// Keeps only well-formed bullet lines from model output: markdown
/// decoration stripped, non-bullet prose dropped, capped at
/// `summary_max_lines`.
fn clean_summary(raw: &str, max_lines: usize) -> Vec<String> {
    raw.lines()
        .map(|line| {
            line.trim()
                .replace("**", "")
                .replace(['*', '`', '"'], "")
                .trim()
                .to_string()
        })
        .filter(|line| line.starts_with("- ") && line.len() > 2)
        .take(max_lines)
        .collect()
}

/// Locally synthesized bullets used when the model fails or returns no
/// usable lines.
fn fallback_summary(entries: &[ActivityEntry], max_lines: usize) -> Vec<String> {
    entries
        .iter()
        .rev()
        .take(max_lines)
        .map(|entry| format!("- {}", entry.sentence()))
        .collect()
}

/// Summarizes recent activity as a "- "-prefixed bullet list. Only the
/// trailing `summary_window` entries are sent to the model; a failed or
/// unusable response degrades to a local bullet list, never an error.
#[tracing::instrument(skip(model, entries, cfg), fields(entries = entries.len()))]
pub async fn summarize_activity<G: TextGenerator + ?Sized>(
    model: &G,
    entries: &[ActivityEntry],
    timeframe: &str,
    cfg: &SyncConfig,
) -> Vec<String> {
    if entries.is_empty() {
        return Vec::new();
    }
    let start = entries.len().saturating_sub(cfg.summary_window);
    let window = &entries[start..];
    let log = window.iter().map(entry_line).collect::<Vec<_>>().join("\n");

    let system = format!(
        "You summarize issue-tracker activity logs. Summarize what happened {timeframe}. \
         Respond only with bullet lines, each starting with \"- \", at most {max} lines, \
         no headings and no markdown emphasis.",
        max = cfg.summary_max_lines,
    );

    match model.generate(&system, &log).await {
        Ok(raw) => {
            let bullets = clean_summary(&raw, cfg.summary_max_lines);
            if bullets.is_empty() {
                warn!("summary response had no usable bullet lines, using local fallback");
                fallback_summary(window, cfg.summary_max_lines)
            } else {
                bullets
            }
        }
        Err(err) => {
            warn!(error = %err, "summary generation failed, using local fallback");
            fallback_summary(window, cfg.summary_max_lines)
        }
    }
}
