//! LlmParser - model-assisted extraction with rule fallback

use async_trait::async_trait;
use chrono::NaiveDate;
use handlebars::Handlebars;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::rules::{Extraction, RuleParser};
use super::{ParseError, QueryParser};
use crate::domain::TripRequest;
use crate::llm::{CompletionRequest, LlmClient, Message};

const EXTRACTION_PROMPT: &str = r#"You extract structured travel requests.
Today is {{reference_date}}.

Reply with a single JSON object and nothing else, using these keys:
- "destination": city or region being visited, or null
- "origin": departure city, or null
- "start_date": first day as YYYY-MM-DD, or null
- "end_date": last day as YYYY-MM-DD, or null
- "duration_days": number of days, or null
- "budget_total": total budget for the whole party, or null
- "currency": ISO currency code, or null
- "traveler_count": number of travelers, or null
- "preferences": lowercase interest tags from: {{#each categories}}{{this}}{{#unless @last}}, {{/unless}}{{/each}}

Use null for anything the request does not state. Never guess."#;

const CATEGORIES: &[&str] = &[
    "adventure",
    "relaxation",
    "culture",
    "food",
    "nightlife",
    "beach",
    "nature",
    "shopping",
    "sightseeing",
];

/// Fields the model may return; anything absent stays with the rules
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ModelExtraction {
    destination: Option<String>,
    origin: Option<String>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    duration_days: Option<u32>,
    budget_total: Option<f64>,
    currency: Option<String>,
    traveler_count: Option<u32>,
    preferences: Vec<String>,
}

impl ModelExtraction {
    /// Overlay the model's answers on the rule extraction
    fn merge_into(self, mut base: Extraction, max_days: u32) -> Extraction {
        let non_empty = |s: Option<String>| s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        if let Some(destination) = non_empty(self.destination) {
            base.destination = Some(destination);
        }
        if let Some(origin) = non_empty(self.origin) {
            base.origin = Some(origin);
        }
        if self.start_date.is_some() {
            base.start_date = self.start_date;
        }
        if self.end_date.is_some() {
            base.end_date = self.end_date;
        }
        match self.duration_days {
            Some(days) if (1..=max_days).contains(&days) => base.duration_days = Some(days),
            Some(days) => warn!(days, max_days, "ModelExtraction::merge_into: ignoring out-of-range duration"),
            None => {}
        }
        if let Some(total) = self.budget_total.filter(|b| b.is_finite() && *b >= 0.0) {
            base.budget_amount = Some(total);
            base.budget_per_person = false;
            base.budget_per_day = false;
        }
        if let Some(currency) = non_empty(self.currency) {
            base.currency = Some(currency.to_uppercase());
        }
        if self.traveler_count.is_some_and(|n| n > 0) {
            base.traveler_count = self.traveler_count;
        }
        base.preferences
            .extend(self.preferences.into_iter().map(|p| p.trim().to_lowercase()).filter(|p| !p.is_empty()));
        base
    }
}

/// Slice out the first `{` to the last `}` so fenced replies still parse
fn json_object(reply: &str) -> Option<&str> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    (end > start).then(|| &reply[start..=end])
}

/// Parser that asks an LLM and falls back to `RuleParser`
pub struct LlmParser {
    client: Arc<dyn LlmClient>,
    rules: RuleParser,
    max_tokens: u32,
    handlebars: Handlebars<'static>,
}

impl LlmParser {
    pub fn new(client: Arc<dyn LlmClient>, rules: RuleParser, max_tokens: u32) -> Self {
        debug!(max_tokens, "LlmParser::new: called");
        Self {
            client,
            rules,
            max_tokens,
            handlebars: Handlebars::new(),
        }
    }

    fn system_prompt(&self) -> Result<String, String> {
        let ctx = json!({
            "reference_date": self.rules.reference_date().to_string(),
            "categories": CATEGORIES,
        });
        self.handlebars
            .render_template(EXTRACTION_PROMPT, &ctx)
            .map_err(|e| format!("prompt render failed: {}", e))
    }

    /// Model extraction, or a description of why there is none
    async fn ask_model(&self, raw_text: &str) -> Result<ModelExtraction, String> {
        let request = CompletionRequest {
            system_prompt: self.system_prompt()?,
            messages: vec![Message::user(raw_text)],
            max_tokens: self.max_tokens,
        };
        let response = self.client.complete(request).await.map_err(|e| e.to_string())?;
        let content = response.content.ok_or_else(|| "empty reply".to_string())?;
        let object = json_object(&content).ok_or_else(|| "reply has no JSON object".to_string())?;
        serde_json::from_str(object).map_err(|e| format!("reply is not a valid extraction: {}", e))
    }
}

#[async_trait]
impl QueryParser for LlmParser {
    async fn parse(&self, raw_text: &str) -> Result<TripRequest, ParseError> {
        debug!("LlmParser::parse: called");
        let extraction = self.rules.extract(raw_text)?;

        let merged = match self.ask_model(raw_text).await {
            Ok(model) => {
                info!("LlmParser::parse: using model extraction");
                model.merge_into(extraction, self.rules.max_duration_days())
            }
            Err(reason) => {
                warn!(%reason, "LlmParser::parse: model extraction failed, using rules");
                extraction
            }
        };
        self.rules.finish(merged)
    }
}
