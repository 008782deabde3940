//! TripPlanner - critique-driven travel itinerary planning
//!
//! A plain-language travel request is parsed into a `TripRequest`, turned
//! into an itinerary, and scored by a deterministic critic. Failing plans
//! are regenerated with the critic's feedback until one passes or the
//! attempt budget runs out, in which case the best attempt is returned.
//!
//! # Modules
//!
//! - [`parser`] - rule-based and LLM-assisted request parsing
//! - [`generation`] - itinerary assembly with per-provider fallback
//! - [`providers`] - weather, places and flight data sources
//! - [`critique`] - scoring rules, feedback and clarification questions
//! - [`supervisor`] - the bounded retry state machine
//! - [`state`] - actor owning the session store
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface

pub mod cli;
pub mod config;
pub mod critique;
pub mod domain;
pub mod generation;
pub mod llm;
pub mod parser;
pub mod providers;
pub mod render;
pub mod state;
pub mod supervisor;
