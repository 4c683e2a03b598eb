//! Human-readable digests of a captured spin payload.
//!
//! Field extraction is best effort: each logical field accepts several key
//! names, the first present key wins and absent fields are left out.

use chrono::{DateTime, FixedOffset};
use serde_json::Value;

use crate::clock;
use crate::store::StoredArtifact;

/// Locations the spin list may live at, in priority order
const SPIN_LIST_PATHS: &[&[&str]] = &[&["data", "spinHistory"], &["spinHistory"], &["history"]];

/// Label and accepted keys for every summarised field
const FIELDS: &[(&str, &[&str])] = &[
    ("Bet", &["bet", "stake", "wager"]),
    ("Win", &["win", "payout", "winnings"]),
    ("Fish", &["fishCaught", "fish", "catch"]),
    ("Multiplier", &["multiplier", "mult"]),
];

pub const FALLBACK_SUMMARY: &str = "📊 Spin data received (awaiting analysis)";

/// Latest spin entry (the first element of the spin list)
pub fn latest_spin(payload: &Value) -> Option<&Value> {
    SPIN_LIST_PATHS.iter().find_map(|path| {
        let list = path
            .iter()
            .try_fold(payload, |node, key| node.get(*key))?
            .as_array()?;
        list.first()
    })
}

/// Recognised `(label, value)` pairs of a spin entry
pub fn spin_fields(spin: &Value) -> Vec<(&'static str, String)> {
    FIELDS
        .iter()
        .filter_map(|(label, keys)| {
            keys.iter()
                .find_map(|key| spin.get(*key))
                .map(|value| (*label, display_value(value)))
        })
        .collect()
}

/// HTML summary of the latest spin
pub fn summarize(payload: &Value, at: &DateTime<FixedOffset>) -> String {
    let Some(spin) = latest_spin(payload) else {
        return FALLBACK_SUMMARY.to_string();
    };

    let mut summary = String::from("📊 <b>Latest Spin Summary</b>\n");
    let fields = spin_fields(spin);
    if fields.is_empty() {
        summary.push_str("• Data: Full JSON saved\n");
    }
    for (label, value) in fields {
        summary.push_str(&format!("• {label}: {}\n", escape_html(&value)));
    }
    summary.push_str(&format!("• Time: {} IST", clock::time_label(at)));
    summary
}

/// Caption attached to the uploaded artifact
pub fn file_caption(summary: &str, at: &DateTime<FixedOffset>) -> String {
    format!(
        "🎰 <b>Spin History</b>\n━━━━━━━━━━━━━━━━━━━━\n{summary}\n\n📅 Date: {}\n🕐 Time: {} IST",
        clock::date_label(at),
        clock::time_label_12h(at)
    )
}

/// Note for the log channel once the artifact has been delivered
pub fn file_sent_note(artifact: &StoredArtifact, summary: &str) -> String {
    format!(
        "📤 <b>Spin History File Sent</b>\n• File: {}\n• Size: {} bytes\n• Time: {} IST\n\n{summary}",
        escape_html(&artifact.file_name()),
        artifact.size(),
        clock::time_label(&artifact.created_at)
    )
}

pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
