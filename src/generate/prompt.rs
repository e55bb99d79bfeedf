// src/generate/prompt.rs
//! Prompt text for the model. This is editorial copy, not a protocol: the
//! stream contract only relies on the model returning JSON snapshots.

use std::fmt::Write as _;

use crate::generate::producer::GenerationInput;

/// Per-article summary cap in the prompt (chars).
const SUMMARY_PROMPT_CHARS: usize = 400;

pub const SYSTEM_PROMPT: &str = "You are an expert newsletter editor. You turn a list of recent articles \
into an engaging, well-structured newsletter. Respond with ONE JSON object only, no markdown fences, \
with these fields: \"suggestedTitles\" (array of 5 strings), \"suggestedSubjectLines\" (array of 5 strings), \
\"body\" (the newsletter body in markdown), \"topAnnouncements\" (array of 5 short strings), \
\"additionalInfo\" (string, optional notes).";

/// User message: date range, numbered articles, then optional instructions.
pub fn build_prompt(input: &GenerationInput) -> String {
    let mut out = String::with_capacity(256 + input.articles.len() * 256);
    let _ = writeln!(
        out,
        "Create a newsletter covering {} to {} from the {} articles below.",
        input.start.format("%Y-%m-%d"),
        input.end.format("%Y-%m-%d"),
        input.articles.len()
    );
    out.push('\n');

    for (i, a) in input.articles.iter().enumerate() {
        let _ = writeln!(out, "{}. {}", i + 1, a.title);
        let _ = writeln!(
            out,
            "   Source: {} | Published: {}",
            a.feed_id,
            a.published_at.format("%Y-%m-%d %H:%M UTC")
        );
        if let Some(link) = &a.link {
            let _ = writeln!(out, "   Link: {link}");
        }
        if !a.summary.is_empty() {
            let summary: String = a.summary.chars().take(SUMMARY_PROMPT_CHARS).collect();
            let _ = writeln!(out, "   Summary: {summary}");
        }
        out.push('\n');
    }

    if let Some(extra) = input
        .user_input
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        let _ = writeln!(out, "Additional instructions from the user:\n{extra}");
    }
    out
}
