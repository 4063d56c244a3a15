use serde_json::Value;

use super::Candidate;
use crate::workflows::triage::domain::ChecklistItem;

pub(crate) const NO_MATCH: &str = "NO_MATCH";

/// What the classifier's raw reply resolves to, before the candidate check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Reply {
    Filename(String),
    NoMatch,
    Unreadable,
}

/// Cut an excerpt down to `limit` characters on a char boundary.
pub(crate) fn bound_excerpt(content: &str, limit: usize) -> String {
    let content = content.trim();
    match content.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}...", &content[..cut]),
        None => content.to_string(),
    }
}

pub(crate) fn compose_prompt(item: &ChecklistItem, candidates: &[Candidate]) -> String {
    let mut prompt = String::new();
    prompt.push_str(
        "You review documents submitted for a business registration case.\n\
         Decide which submitted document, if any, satisfies the checklist item below.\n\n",
    );
    prompt.push_str(&format!(
        "Checklist item: {}\nCategory: {}\nMandatory: {}\n\n",
        item.name,
        if item.category.is_empty() {
            "-"
        } else {
            item.category.as_str()
        },
        if item.mandatory { "yes" } else { "no" }
    ));
    prompt.push_str("Submitted documents:\n");
    for (index, candidate) in candidates.iter().enumerate() {
        prompt.push_str(&format!(
            "{}. filename: {}\n   excerpt: {}\n",
            index + 1,
            candidate.filename,
            if candidate.excerpt.is_empty() {
                "(no text extracted)"
            } else {
                candidate.excerpt.as_str()
            }
        ));
    }
    prompt.push_str(&format!(
        "\nAnswer with JSON only: {{\"filename\": \"<exact filename from the list>\"}} \
         or {{\"filename\": null}} when no document satisfies the item. \
         Plain text {NO_MATCH} is also accepted."
    ));
    prompt
}

pub(crate) fn parse_reply(raw: &str) -> Reply {
    let body = strip_code_fence(raw.trim());

    if body.starts_with('{') {
        return match serde_json::from_str::<Value>(body) {
            Ok(value) => match value.get("filename") {
                Some(Value::Null) => Reply::NoMatch,
                Some(Value::String(name)) if name.trim().is_empty() => Reply::NoMatch,
                Some(Value::String(name)) => Reply::Filename(name.trim().to_string()),
                _ => Reply::Unreadable,
            },
            Err(_) => Reply::Unreadable,
        };
    }

    let line = body
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default()
        .trim_matches(|c| c == '"' || c == '\'' || c == '`');

    if line.is_empty() {
        Reply::Unreadable
    } else if line.eq_ignore_ascii_case(NO_MATCH)
        || line.eq_ignore_ascii_case("none")
        || line.eq_ignore_ascii_case("null")
    {
        Reply::NoMatch
    } else {
        Reply::Filename(line.to_string())
    }
}

fn strip_code_fence(raw: &str) -> &str {
    let Some(rest) = raw.strip_prefix("```") else {
        return raw;
    };
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
