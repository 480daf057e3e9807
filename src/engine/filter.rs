//! Filter decision protocol.
//!
//! A delegated hook returns a loosely typed value (`null`, a number, or a
//! string). That value is classified exactly once at the invocation boundary
//! into a tagged outcome; downstream code only ever sees the tagged form.

use serde_json::Value;

/// The three pipeline actions a hook can select.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterAction {
    Continue,
    Skip,
    Stop,
}

impl FilterAction {
    pub const fn code(self) -> i64 {
        match self {
            Self::Continue => 0,
            Self::Skip => 1,
            Self::Stop => 2,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Continue),
            1 => Some(Self::Skip),
            2 => Some(Self::Stop),
            _ => None,
        }
    }

    pub fn from_keyword(keyword: &str) -> Option<Self> {
        if keyword.eq_ignore_ascii_case("continue") {
            Some(Self::Continue)
        } else if keyword.eq_ignore_ascii_case("skip") {
            Some(Self::Skip)
        } else if keyword.eq_ignore_ascii_case("stop") {
            Some(Self::Stop)
        } else {
            None
        }
    }
}

/// A hook's return value after one-time classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookOutcome {
    Code(i64),
    RedirectPath(String),
    Keyword(FilterAction),
    Unrecognized,
}

/// What the pipeline should do with the request.
///
/// `Redirect` carries the internal target; dispatching it and then stopping
/// is the caller's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterDecision {
    Proceed(FilterAction),
    Redirect(String),
}

/// Classify a raw hook value. Applied once, at the invocation boundary.
pub fn classify(value: &Value) -> HookOutcome {
    match value {
        Value::Number(number) => number
            .as_i64()
            .map(HookOutcome::Code)
            .unwrap_or(HookOutcome::Unrecognized),
        Value::String(text) if text.starts_with('/') => HookOutcome::RedirectPath(text.clone()),
        Value::String(text) => FilterAction::from_keyword(text)
            .map(HookOutcome::Keyword)
            .unwrap_or(HookOutcome::Unrecognized),
        _ => HookOutcome::Unrecognized,
    }
}

/// Map a classified outcome to a decision.
///
/// Unknown numeric codes and unrecognized values fall back to the configured
/// default action.
pub fn decide(outcome: HookOutcome, default: FilterAction) -> FilterDecision {
    match outcome {
        HookOutcome::Code(code) => {
            FilterDecision::Proceed(FilterAction::from_code(code).unwrap_or(default))
        }
        HookOutcome::Keyword(action) => FilterDecision::Proceed(action),
        HookOutcome::RedirectPath(target) => FilterDecision::Redirect(target),
        HookOutcome::Unrecognized => FilterDecision::Proceed(default),
    }
}
