//! Terminal and JSON output for planning sessions

use chrono::{DateTime, Utc};
use colored::Colorize;
use sessionstore::SessionSummary;
use std::fmt::Write;
use tracing::debug;

use crate::domain::{PlanState, PlanStatus, Source};

fn status_label(status: PlanStatus) -> String {
    let label = status.as_str();
    match status {
        PlanStatus::Succeeded => label.green().bold().to_string(),
        PlanStatus::FailedBudgetExhausted => label.yellow().bold().to_string(),
        s if s.is_hard_failure() => label.red().bold().to_string(),
        _ => label.cyan().to_string(),
    }
}

fn timestamp(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ms.to_string())
}

/// Human-readable session summary
pub fn plan_text(state: &PlanState) -> String {
    debug!(session_id = %state.session_id, status = %state.status, "plan_text: called");
    let mut out = String::new();

    let _ = writeln!(out, "Session {}", state.session_id.bold());
    let _ = writeln!(out, "Status:   {}", status_label(state.status));
    let _ = writeln!(out, "Attempts: {}", state.attempt_count);
    if let Some(reason) = &state.terminal_reason {
        let _ = writeln!(out, "Reason:   {}", reason);
    }

    if let Some(trip) = &state.trip_request {
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "Trip: {} from {} to {} ({} days, {} travelers, budget {:.0} {})",
            trip.destination.bold(),
            trip.start_date,
            trip.end_date(),
            trip.duration_days,
            trip.traveler_count,
            trip.budget_total,
            trip.currency
        );
        if let Some(origin) = &trip.origin {
            let _ = writeln!(out, "Departing from {}", origin);
        }
        if !trip.preferences.is_empty() {
            let prefs: Vec<&str> = trip.preferences.iter().map(String::as_str).collect();
            let _ = writeln!(out, "Interests: {}", prefs.join(", "));
        }
    }

    if state.status.is_degraded() {
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "{}",
            "No plan met the quality bar; showing the best attempt.".yellow()
        );
    }

    if let Some(itinerary) = &state.current_itinerary {
        let currency = state.trip_request.as_ref().map(|t| t.currency.as_str()).unwrap_or("USD");
        let _ = writeln!(out);
        let _ = writeln!(out, "{} (attempt {})", itinerary.title().bold(), itinerary.generation_attempt());

        if let Some(critique) = state.current_critique() {
            let scores: Vec<String> = critique
                .scores
                .iter()
                .map(|(d, s)| format!("{} {:.2}", d, s))
                .collect();
            let _ = writeln!(out, "Score {:.2}: {}", critique.overall_score, scores.join(", "));
        }

        if let Some(flight) = itinerary.flights() {
            let _ = writeln!(
                out,
                "Flight: {} -> {} with {}, {:.0} {}",
                flight.origin, flight.destination, flight.carrier, flight.price, currency
            );
        }

        for day in itinerary.days() {
            let weather = itinerary
                .weather()
                .get(&day.date)
                .map(|f| format!(" - {}, {:.0}/{:.0}C", f.summary, f.high_c, f.low_c))
                .unwrap_or_default();
            let _ = writeln!(out, "{}{}", day.date.to_string().underline(), weather);
            for activity in &day.activities {
                let cost = activity
                    .estimated_cost
                    .map(|c| format!("{:.0} {}", c, currency))
                    .unwrap_or_else(|| "cost unknown".to_string());
                let _ = writeln!(
                    out,
                    "  {}-{}  {} ({}) @ {}, {}",
                    activity.window.start.format("%H:%M"),
                    activity.window.end.format("%H:%M"),
                    activity.name,
                    activity.category,
                    activity.location,
                    cost
                );
            }
        }
        let _ = writeln!(out, "Estimated total: {:.0} {}", itinerary.total_estimated_cost(), currency);

        let fallbacks: Vec<_> = itinerary
            .provenance()
            .iter()
            .filter(|p| p.source == Source::Fallback)
            .collect();
        if !fallbacks.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "{}", "Some data is estimated locally:".dimmed());
            for p in fallbacks {
                match &p.detail {
                    Some(detail) => {
                        let _ = writeln!(out, "  {}: {}", p.kind, detail);
                    }
                    None => {
                        let _ = writeln!(out, "  {}", p.kind);
                    }
                }
            }
        }
    }

    if !state.clarification_questions.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", "Questions that would improve this plan:".bold());
        for question in &state.clarification_questions {
            let _ = writeln!(out, "  - {}", question);
        }
    }
    out
}

/// Serialized session
pub fn plan_json(state: &PlanState) -> Result<String, serde_json::Error> {
    debug!(session_id = %state.session_id, "plan_json: called");
    serde_json::to_string_pretty(state)
}

/// Transition log, one line per step
pub fn trace_text(state: &PlanState) -> String {
    debug!(session_id = %state.session_id, entries = state.trace.len(), "trace_text: called");
    let mut out = String::new();
    for entry in &state.trace {
        let _ = writeln!(out, "{}  {:<24} {}", timestamp(entry.at), entry.step.as_str(), entry.message);
    }
    for critique in &state.evaluation_history {
        let verdict = if critique.passed { "passed" } else { "failed" };
        let _ = writeln!(
            out,
            "attempt {}: {:.2} {}",
            critique.attempt, critique.overall_score, verdict
        );
        for issue in &critique.feedback {
            let _ = writeln!(out, "  {}: {}", issue.dimension, issue.description);
        }
    }
    out
}

pub fn sessions_text(sessions: &[SessionSummary]) -> String {
    debug!(count = sessions.len(), "sessions_text: called");
    if sessions.is_empty() {
        return "No sessions.\n".to_string();
    }
    let mut out = String::new();
    let _ = writeln!(out, "{:<40} {:>7}  {:<19}  {}", "SESSION", "VERSION", "UPDATED", "LEASED");
    for s in sessions {
        let _ = writeln!(
            out,
            "{:<40} {:>7}  {:<19}  {}",
            s.session_id,
            s.version,
            timestamp(s.updated_at),
            if s.leased { "yes" } else { "no" }
        );
    }
    out
}

pub fn sessions_json(sessions: &[SessionSummary]) -> serde_json::Value {
    serde_json::Value::Array(
        sessions
            .iter()
            .map(|s| {
                serde_json::json!({
                    "session_id": s.session_id,
                    "version": s.version,
                    "updated_at": s.updated_at,
                    "expires_at": s.expires_at,
                    "leased": s.leased,
                })
            })
            .collect(),
    )
}
