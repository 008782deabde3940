//! RuleParser - deterministic keyword and pattern extraction
//!
//! Extraction is split in two: `extract` pulls whatever the text states into
//! an `Extraction` of optional fields, and `finish` checks it for
//! contradictions and fills the gaps with defaults. Every defaulted field
//! lowers confidence and records an ambiguity.

use async_trait::async_trait;
use chrono::{Datelike, Duration, Local, NaiveDate, Weekday};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::LazyLock;
use tracing::debug;

use super::{ParseError, QueryParser};
use crate::domain::{DEFAULT_CURRENCY, MAX_DURATION_DAYS, TripRequest};

/// Trip length assumed when none is stated
pub const DEFAULT_DURATION_DAYS: u32 = 3;

/// Per-traveler, per-day budget assumed when none is stated
pub const DEFAULT_DAILY_BUDGET: f64 = 250.0;

const PENALTY_DATES: f64 = 0.2;
const PENALTY_DURATION: f64 = 0.15;
const PENALTY_BUDGET: f64 = 0.2;
const PENALTY_TRAVELERS: f64 = 0.05;
const PENALTY_PREFERENCES: f64 = 0.1;

const MONTHS: &str =
    "jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?";

const COUNT_WORDS: &str = "one|two|three|four|five|six|seven|eight|nine|ten|eleven|twelve|thirteen|fourteen";

// Patterns are literals; one that fails to compile simply never matches.
fn compile(pattern: &str) -> Option<Regex> {
    Regex::new(pattern).ok()
}

static DESTINATION_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    compile(r"(?i:\b(?:to|visit|visiting|in|explore|exploring|around))\s+([A-Z][\p{L}'-]*(?:\s+[A-Z][\p{L}'-]*){0,3})")
});
static DESTINATION_LOOSE_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    compile(
        r"(?i)\b(?:trip\s+to|travel(?:l?ing)?\s+to|going\s+to|fly(?:ing)?\s+to|visit(?:ing)?|vacation\s+in|holiday\s+in)\s+([a-z][a-z'-]*(?:\s+[a-z][a-z'-]*){0,2}?)(?:\s+(?:for|in|on|from|with|next|this|under|around|during|starting|and|by)\b|[,.!?;]|\s*$)",
    )
});
static ORIGIN_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    compile(r"(?i:\b(?:from|departing|leaving))\s+([A-Z][\p{L}'-]*(?:\s+[A-Z][\p{L}'-]*){0,3})")
});
static ISO_DATE_RE: LazyLock<Option<Regex>> = LazyLock::new(|| compile(r"\b(\d{4})-(\d{1,2})-(\d{1,2})\b"));
static US_DATE_RE: LazyLock<Option<Regex>> = LazyLock::new(|| compile(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b"));
static MONTH_RANGE_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    compile(&format!(
        r"(?i)\b({MONTHS})\.?\s+(\d{{1,2}})(?:st|nd|rd|th)?\s*(?:-|–|to|through|until|till)\s*(\d{{1,2}})(?:st|nd|rd|th)?\b(?:,?\s+(\d{{4}}))?"
    ))
});
static MONTH_DAY_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    compile(&format!(
        r"(?i)\b({MONTHS})\.?\s+(\d{{1,2}})(?:st|nd|rd|th)?\b(?:,?\s+(\d{{4}}))?"
    ))
});
static MONTH_ONLY_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| compile(&format!(r"(?i)\b(?:in|during|this|next)\s+({MONTHS})\b(?:\s+(\d{{4}}))?")));
static RELATIVE_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    compile(
        r"(?i)\b(tomorrow|next\s+week|next\s+month|(?:this|next)\s+weekend|in\s+a\s+week|in\s+a\s+month|in\s+(\d{1,3})\s+(days?|weeks?))\b",
    )
});
static DAYS_RE: LazyLock<Option<Regex>> = LazyLock::new(|| compile(r"(?i)\b(\d{1,3})\s*-?\s*(days?|nights?)\b"));
static WEEKS_RE: LazyLock<Option<Regex>> = LazyLock::new(|| compile(r"(?i)\b(\d{1,2})\s*-?\s*weeks?\b"));
static WORD_DURATION_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| compile(&format!(r"(?i)\b({COUNT_WORDS})\s*-?\s*(days?|nights?|weeks?)\b")));
static A_WEEK_RE: LazyLock<Option<Regex>> = LazyLock::new(|| compile(r"(?i)\b(?:a\s+week|week-?long)\b"));
static FORTNIGHT_RE: LazyLock<Option<Regex>> = LazyLock::new(|| compile(r"(?i)\bfortnight\b"));
static WEEKEND_RE: LazyLock<Option<Regex>> = LazyLock::new(|| compile(r"(?i)\bweekend\b"));
static BUDGET_SYMBOL_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| compile(r"(?i)(?:US\$|\$|€|£)\s*(\d[\d,]*(?:\.\d+)?)\s*(k\b)?"));
static BUDGET_PHRASE_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    compile(r"(?i)\bbudget\s+(?:of\s+|is\s+|around\s+|about\s+)?(?:US\$|\$|€|£)?\s*(\d[\d,]*(?:\.\d+)?)\s*(k\b)?")
});
static BUDGET_WORD_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    compile(r"(?i)\b(\d[\d,]*(?:\.\d+)?)\s*(k)?\s*(?:dollars|usd|euros?|eur|pounds|gbp|bucks)\b")
});
static BUDGET_CAP_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    compile(r"(?i)\b(?:under|below|less\s+than|max(?:imum)?|up\s+to)\s+(?:US\$|\$|€|£)?\s*(\d[\d,]*(?:\.\d+)?)\s*(k\b)?")
});
static PER_PERSON_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| compile(r"(?i)\b(?:per\s+person|each|a\s+head|per\s+head|pp)\b"));
static PER_DAY_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| compile(r"(?i)(?:\bper\s+day\b|\ba\s+day\b|/\s*day\b|\bdaily\b)"));
static TRAVELERS_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    compile(&format!(
        r"(?i)\b(\d{{1,2}}|{COUNT_WORDS})\s+(?:people|persons|travell?ers|adults|friends|guests|of\s+us)\b"
    ))
});
static GROUP_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| compile(&format!(r"(?i)\b(?:group|party|family)\s+of\s+(\d{{1,2}}|{COUNT_WORDS})\b")));
static COUPLE_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    compile(r"(?i)\b(?:couple|honeymoon|my\s+(?:wife|husband|partner|girlfriend|boyfriend|fianc[eé]e?))\b")
});
static WE_RE: LazyLock<Option<Regex>> = LazyLock::new(|| compile(r"(?i)\b(?:we|us|our)\b"));
static SOLO_RE: LazyLock<Option<Regex>> = LazyLock::new(|| compile(r"(?i)\b(?:i|me|my|solo|alone|myself)\b"));

/// Keyword table mapping phrases to preference tags
static PREFERENCE_TABLE: LazyLock<Vec<(&'static str, Option<Regex>)>> = LazyLock::new(|| {
    [
        ("adventure", r"(?i)\b(?:adventure|adventurous|hiking|hike|trek(?:king)?|extreme|outdoors?|kayak(?:ing)?)\b"),
        ("relaxation", r"(?i)\b(?:relax(?:ing|ation)?|chill|peaceful|quiet|spa)\b"),
        ("culture", r"(?i)\b(?:culture|cultural|history|historic(?:al)?|museums?|art|temples?|galler(?:y|ies))\b"),
        ("food", r"(?i)\b(?:food|foodie|culinary|restaurants?|eating|cuisine|dining)\b"),
        ("nightlife", r"(?i)\b(?:nightlife|partying|parties|bars?|clubs?|clubbing)\b"),
        ("beach", r"(?i)\b(?:beach(?:es)?|ocean|coast(?:al)?|snorkel(?:ing)?|swimming)\b"),
        ("nature", r"(?i)\b(?:nature|parks?|forests?|mountains?|wildlife|gardens?)\b"),
        ("shopping", r"(?i)\b(?:shopping|markets?|boutiques?)\b"),
        ("sightseeing", r"(?i)\b(?:sightseeing|landmarks?|tourist)\b"),
    ]
    .into_iter()
    .map(|(tag, pattern)| (tag, compile(pattern)))
    .collect()
});

/// Words that can follow "to"/"in" but never name a place
const NOT_PLACES: &[&str] = &[
    "january", "february", "march", "april", "may", "june", "july", "august", "september", "october", "november",
    "december", "jan", "feb", "mar", "apr", "jun", "jul", "aug", "sep", "sept", "oct", "nov", "dec", "monday",
    "tuesday", "wednesday", "thursday", "friday", "saturday", "sunday", "i", "we", "my", "our", "the", "a", "an",
    "me", "us", "see", "go", "do", "eat", "explore", "visit", "spend", "stay", "be", "have", "get", "find",
];

fn captures<'t>(re: &Option<Regex>, text: &'t str) -> Option<Captures<'t>> {
    re.as_ref()?.captures(text)
}

fn is_match(re: &Option<Regex>, text: &str) -> bool {
    re.as_ref().is_some_and(|re| re.is_match(text))
}

fn month_number(name: &str) -> Option<u32> {
    let lower = name.to_lowercase();
    let month = match lower.get(..3)? {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

fn count_word(word: &str) -> Option<u32> {
    if let Ok(n) = word.parse::<u32>() {
        return Some(n);
    }
    let n = match word.to_lowercase().as_str() {
        "one" => 1,
        "two" => 2,
        "three" => 3,
        "four" => 4,
        "five" => 5,
        "six" => 6,
        "seven" => 7,
        "eight" => 8,
        "nine" => 9,
        "ten" => 10,
        "eleven" => 11,
        "twelve" => 12,
        "thirteen" => 13,
        "fourteen" => 14,
        _ => return None,
    };
    Some(n)
}

fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// True when the word right before byte offset `at` is `word`
fn preceded_by(text: &str, at: usize, word: &str) -> bool {
    text.get(..at)
        .and_then(|before| before.split_whitespace().next_back())
        .is_some_and(|prev| prev.eq_ignore_ascii_case(word))
}

/// Up to `chars` characters following byte offset `at`
fn window_after(text: &str, at: usize, chars: usize) -> &str {
    let Some(rest) = text.get(at..) else {
        return "";
    };
    let end = rest.char_indices().nth(chars).map(|(i, _)| i).unwrap_or(rest.len());
    &rest[..end]
}

/// Keep the leading words of a capitalized phrase that could be a place name
fn place_words(phrase: &str) -> Option<String> {
    let words: Vec<&str> = phrase
        .split_whitespace()
        .take_while(|w| !NOT_PLACES.contains(&w.to_lowercase().as_str()))
        .collect();
    if words.is_empty() {
        None
    } else {
        Some(words.join(" "))
    }
}

/// Next date with the given month/day on or after `reference` unless a year is given
fn resolve_month_day(month: u32, day: u32, year: Option<i32>, reference: NaiveDate) -> Option<NaiveDate> {
    match year {
        Some(year) => NaiveDate::from_ymd_opt(year, month, day),
        None => {
            let this_year = NaiveDate::from_ymd_opt(reference.year(), month, day)?;
            if this_year < reference {
                NaiveDate::from_ymd_opt(reference.year() + 1, month, day)
            } else {
                Some(this_year)
            }
        }
    }
}

fn parse_amount(number: &str, thousands: bool) -> Option<f64> {
    let value: f64 = number.replace(',', "").parse().ok()?;
    Some(if thousands { value * 1000.0 } else { value })
}

/// What the text states, before defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Extraction {
    pub destination: Option<String>,
    pub origin: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub duration_days: Option<u32>,
    /// Amount as stated, before per-person or per-day scaling
    pub budget_amount: Option<f64>,
    pub budget_per_person: bool,
    pub budget_per_day: bool,
    pub currency: Option<String>,
    pub traveler_count: Option<u32>,
    pub preferences: BTreeSet<String>,
}

/// Regex-driven parser with an injectable reference date
#[derive(Debug, Clone)]
pub struct RuleParser {
    reference: Option<NaiveDate>,
    max_duration_days: u32,
}

impl Default for RuleParser {
    fn default() -> Self {
        Self {
            reference: None,
            max_duration_days: MAX_DURATION_DAYS,
        }
    }
}

impl RuleParser {
    /// Parser resolving relative dates against today
    pub fn new() -> Self {
        Self::default()
    }

    /// Parser resolving relative dates against `reference`
    pub fn with_reference_date(reference: NaiveDate) -> Self {
        Self {
            reference: Some(reference),
            ..Self::default()
        }
    }

    /// Reject trips longer than `days` (never above `MAX_DURATION_DAYS`)
    pub fn with_max_duration_days(mut self, days: u32) -> Self {
        self.max_duration_days = days.clamp(1, MAX_DURATION_DAYS);
        self
    }

    pub fn max_duration_days(&self) -> u32 {
        self.max_duration_days
    }

    pub fn reference_date(&self) -> NaiveDate {
        self.reference.unwrap_or_else(|| Local::now().date_naive())
    }

    /// Pull every stated detail out of the text
    pub fn extract(&self, raw_text: &str) -> Result<Extraction, ParseError> {
        debug!(len = raw_text.len(), "extract: called");
        let text = raw_text.trim();
        if text.is_empty() {
            return Err(ParseError::EmptyInput);
        }
        let reference = self.reference_date();

        let mut extraction = Extraction {
            destination: Self::destination(text),
            origin: Self::origin(text),
            ..Extraction::default()
        };
        if let (Some(destination), Some(origin)) = (&extraction.destination, &extraction.origin)
            && destination == origin
        {
            extraction.origin = None;
        }

        let (start, end) = Self::dates(text, reference);
        extraction.start_date = start;
        extraction.end_date = end;
        extraction.duration_days = Self::duration(text);

        if let Some((amount, end_offset)) = Self::budget(text) {
            let after = window_after(text, end_offset, 25);
            extraction.budget_amount = Some(amount);
            extraction.budget_per_person = is_match(&PER_PERSON_RE, after);
            extraction.budget_per_day = is_match(&PER_DAY_RE, after);
        }
        extraction.currency = Self::currency(text);
        extraction.traveler_count = Self::travelers(text);
        extraction.preferences = PREFERENCE_TABLE
            .iter()
            .filter(|(_, re)| is_match(re, text))
            .map(|(tag, _)| tag.to_string())
            .collect();

        debug!(?extraction, "extract: done");
        Ok(extraction)
    }

    fn destination(text: &str) -> Option<String> {
        if let Some(re) = DESTINATION_RE.as_ref() {
            for caps in re.captures_iter(text) {
                if let Some(phrase) = caps.get(1)
                    && !preceded_by(text, phrase.start(), "from")
                    && let Some(place) = place_words(phrase.as_str())
                {
                    return Some(place);
                }
            }
        }
        let re = DESTINATION_LOOSE_RE.as_ref()?;
        re.captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .filter_map(|m| place_words(m.as_str()))
            .map(|place| title_case(&place))
            .next()
    }

    fn origin(text: &str) -> Option<String> {
        let re = ORIGIN_RE.as_ref()?;
        re.captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .find_map(|m| place_words(m.as_str()))
    }

    /// Explicit start and end dates, then relative phrases
    fn dates(text: &str, reference: NaiveDate) -> (Option<NaiveDate>, Option<NaiveDate>) {
        let mut explicit: Vec<NaiveDate> = Vec::new();

        if let Some(re) = ISO_DATE_RE.as_ref() {
            explicit.extend(re.captures_iter(text).filter_map(|c| {
                NaiveDate::from_ymd_opt(c[1].parse().ok()?, c[2].parse().ok()?, c[3].parse().ok()?)
            }));
        }
        if let Some(re) = US_DATE_RE.as_ref() {
            explicit.extend(re.captures_iter(text).filter_map(|c| {
                NaiveDate::from_ymd_opt(c[3].parse().ok()?, c[1].parse().ok()?, c[2].parse().ok()?)
            }));
        }
        if explicit.is_empty()
            && let Some(c) = captures(&MONTH_RANGE_RE, text)
        {
            let year = c.get(4).and_then(|y| y.as_str().parse().ok());
            if let (Some(month), Ok(first), Ok(last)) = (month_number(&c[1]), c[2].parse(), c[3].parse()) {
                let start = resolve_month_day(month, first, year, reference);
                let end = start.and_then(|s| NaiveDate::from_ymd_opt(s.year(), month, last));
                return (start, end);
            }
        }
        if explicit.is_empty()
            && let Some(re) = MONTH_DAY_RE.as_ref()
        {
            explicit.extend(re.captures_iter(text).filter_map(|c| {
                let year = c.get(3).and_then(|y| y.as_str().parse().ok());
                resolve_month_day(month_number(&c[1])?, c[2].parse().ok()?, year, reference)
            }));
        }

        match explicit.as_slice() {
            [start, end, ..] => return (Some(*start), Some(*end)),
            [start] => return (Some(*start), None),
            [] => {}
        }

        if let Some(c) = captures(&MONTH_ONLY_RE, text) {
            let year = c.get(2).and_then(|y| y.as_str().parse().ok());
            if let Some(month) = month_number(&c[1]) {
                return (resolve_month_day(month, 1, year, reference), None);
            }
        }

        let Some(c) = captures(&RELATIVE_RE, text) else {
            return (None, None);
        };
        let phrase = c[1].to_lowercase();
        let offset_days = if phrase == "tomorrow" {
            1
        } else if phrase.starts_with("next") && phrase.ends_with("week") || phrase == "in a week" {
            7
        } else if phrase.ends_with("month") {
            30
        } else if phrase.ends_with("weekend") {
            let mut days = 1;
            while (reference + Duration::days(days)).weekday() != Weekday::Fri {
                days += 1;
            }
            days
        } else {
            let n: i64 = c.get(2).and_then(|n| n.as_str().parse().ok()).unwrap_or(1);
            let unit = c.get(3).map(|u| u.as_str().to_lowercase()).unwrap_or_default();
            if unit.starts_with("week") { n * 7 } else { n }
        };
        (Some(reference + Duration::days(offset_days)), None)
    }

    /// Stated trip length in days; N nights count as N + 1 days
    fn duration(text: &str) -> Option<u32> {
        let not_relative = |m: &regex::Match| !preceded_by(text, m.start(), "in");

        if let Some(re) = DAYS_RE.as_ref() {
            for c in re.captures_iter(text) {
                if let (Some(whole), Ok(n)) = (c.get(0), c[1].parse::<u32>())
                    && not_relative(&whole)
                {
                    let nights = c[2].to_lowercase().starts_with("night");
                    return Some(if nights { n + 1 } else { n });
                }
            }
        }
        if let Some(re) = WEEKS_RE.as_ref() {
            for c in re.captures_iter(text) {
                if let (Some(whole), Ok(n)) = (c.get(0), c[1].parse::<u32>())
                    && not_relative(&whole)
                {
                    return Some(n * 7);
                }
            }
        }
        if let Some(re) = WORD_DURATION_RE.as_ref() {
            for c in re.captures_iter(text) {
                if let (Some(whole), Some(n)) = (c.get(0), count_word(&c[1]))
                    && not_relative(&whole)
                {
                    let unit = c[2].to_lowercase();
                    return Some(if unit.starts_with("week") {
                        n * 7
                    } else if unit.starts_with("night") {
                        n + 1
                    } else {
                        n
                    });
                }
            }
        }
        if let Some(re) = A_WEEK_RE.as_ref()
            && re.find_iter(text).any(|m| !preceded_by(text, m.start(), "in"))
        {
            return Some(7);
        }
        if is_match(&FORTNIGHT_RE, text) {
            return Some(14);
        }
        if is_match(&WEEKEND_RE, text) {
            return Some(3);
        }
        None
    }

    /// Budget amount and the byte offset where its mention ends
    fn budget(text: &str) -> Option<(f64, usize)> {
        [&BUDGET_SYMBOL_RE, &BUDGET_PHRASE_RE, &BUDGET_WORD_RE, &BUDGET_CAP_RE]
            .into_iter()
            .find_map(|re| {
                let c = captures(re, text)?;
                let whole = c.get(0)?;
                let amount = parse_amount(c.get(1)?.as_str(), c.get(2).is_some())?;
                Some((amount, whole.end()))
            })
    }

    fn currency(text: &str) -> Option<String> {
        let lower = text.to_lowercase();
        let has_word = |words: &[&str]| {
            lower
                .split(|c: char| !c.is_alphanumeric())
                .any(|token| words.contains(&token))
        };
        let code = if text.contains('€') || has_word(&["eur", "euro", "euros"]) {
            "EUR"
        } else if text.contains('£') || has_word(&["gbp", "pound", "pounds"]) {
            "GBP"
        } else if text.contains('¥') || has_word(&["jpy", "yen"]) {
            "JPY"
        } else if text.contains('$') || has_word(&["usd", "dollar", "dollars", "bucks"]) {
            "USD"
        } else {
            return None;
        };
        Some(code.to_string())
    }

    fn travelers(text: &str) -> Option<u32> {
        for re in [&TRAVELERS_RE, &GROUP_RE] {
            if let Some(n) = captures(re, text).and_then(|c| count_word(&c[1]))
                && n > 0
            {
                return Some(n);
            }
        }
        if is_match(&COUPLE_RE, text) || is_match(&WE_RE, text) {
            return Some(2);
        }
        if is_match(&SOLO_RE, text) {
            return Some(1);
        }
        None
    }

    /// Validate an extraction and fill its gaps
    pub fn finish(&self, extraction: Extraction) -> Result<TripRequest, ParseError> {
        debug!(destination = ?extraction.destination, "finish: called");
        let destination = extraction
            .destination
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .ok_or(ParseError::NoDestination)?
            .to_string();

        let mut confidence: f64 = 1.0;
        let mut ambiguities = Vec::new();

        if let (Some(start), Some(end)) = (extraction.start_date, extraction.end_date)
            && end < start
        {
            return Err(ParseError::ContradictoryDates(format!(
                "end date {} is before start date {}",
                end, start
            )));
        }
        if extraction.duration_days == Some(0) {
            return Err(ParseError::ContradictoryDates("a trip needs at least one day".to_string()));
        }

        let max = self.max_duration_days;
        let range_days = match (extraction.start_date, extraction.end_date) {
            (Some(start), Some(end)) => {
                let span = (end - start).num_days() + 1;
                if span > i64::from(max) {
                    return Err(ParseError::TripTooLong { days: span, max });
                }
                u32::try_from(span).ok()
            }
            _ => None,
        };
        if let Some(stated) = extraction.duration_days
            && stated > max
        {
            return Err(ParseError::TripTooLong {
                days: i64::from(stated),
                max,
            });
        }
        if let (Some(range), Some(stated)) = (range_days, extraction.duration_days)
            && range != stated
        {
            return Err(ParseError::ContradictoryDates(format!(
                "the dates span {} days but {} days were requested",
                range, stated
            )));
        }

        let duration_days = match extraction.duration_days.or(range_days) {
            Some(days) => days,
            None => {
                confidence -= PENALTY_DURATION;
                ambiguities.push(format!("trip length not stated; assuming {} days", DEFAULT_DURATION_DAYS));
                DEFAULT_DURATION_DAYS
            }
        };

        let start_date = match extraction.start_date {
            Some(start) => start,
            None => {
                let assumed = self.reference_date() + Duration::days(1);
                confidence -= PENALTY_DATES;
                ambiguities.push(format!("start date not stated; assuming {}", assumed));
                assumed
            }
        };

        let traveler_count = match extraction.traveler_count.filter(|n| *n > 0) {
            Some(n) => n,
            None => {
                confidence -= PENALTY_TRAVELERS;
                ambiguities.push("traveler count not stated; assuming 1".to_string());
                1
            }
        };

        let currency = extraction.currency.clone().unwrap_or_else(|| DEFAULT_CURRENCY.to_string());
        let budget_total = match extraction.budget_amount {
            Some(amount) => {
                let mut total = amount;
                if extraction.budget_per_person {
                    total *= f64::from(traveler_count);
                }
                if extraction.budget_per_day {
                    total *= f64::from(duration_days);
                }
                total
            }
            None => {
                let assumed = DEFAULT_DAILY_BUDGET * f64::from(duration_days) * f64::from(traveler_count);
                confidence -= PENALTY_BUDGET;
                ambiguities.push(format!("budget not stated; assuming {:.0} {}", assumed, currency));
                assumed
            }
        };

        if extraction.preferences.is_empty() {
            confidence -= PENALTY_PREFERENCES;
            ambiguities.push("no interests stated; planning general sightseeing".to_string());
        }

        let mut trip = TripRequest::new(destination, start_date, duration_days)
            .with_budget(budget_total)
            .with_travelers(traveler_count)
            .with_preferences(&extraction.preferences)
            .with_confidence(confidence);
        trip.currency = currency;
        trip.ambiguities = ambiguities;
        if let Some(origin) = extraction.origin.filter(|o| !o.trim().is_empty()) {
            trip = trip.with_origin(origin);
        }
        Ok(trip)
    }
}

#[async_trait]
impl QueryParser for RuleParser {
    async fn parse(&self, raw_text: &str) -> Result<TripRequest, ParseError> {
        debug!("RuleParser::parse: called");
        let extraction = self.extract(raw_text)?;
        self.finish(extraction)
    }
}
