//! Condition evaluator (§4.B).
//!
//! Renders `value` in plain mode, optionally lower-cases it, then ANDs the
//! result of every comparator key present in `conditions`. `ignorecase`,
//! `multiple`, `optional`, `linkedto`, and `label` are flags, not
//! predicates, and are skipped. Unknown keys are ignored. An empty
//! condition set evaluates true.

use crate::error::Result;
use crate::template::render_template_string;
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

/// A single filematch/filter condition set as declared in the suite YAML.
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(default)]
pub struct Condition {
    pub equals: Option<String>,
    pub startswith: Option<String>,
    pub endswith: Option<String>,
    pub regex: Option<String>,
    pub greaterthan: Option<String>,
    pub lessthan: Option<String>,
    #[serde(default)]
    pub ignorecase: bool,
}

impl Condition {
    pub fn is_empty(&self) -> bool {
        self.equals.is_none()
            && self.startswith.is_none()
            && self.endswith.is_none()
            && self.regex.is_none()
            && self.greaterthan.is_none()
            && self.lessthan.is_none()
    }
}

type RegexCacheKey = (String, bool);
static REGEX_CACHE: Lazy<Mutex<HashMap<RegexCacheKey, Regex>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

fn cached_regex(pattern: &str, ignorecase: bool) -> Result<Regex> {
    let key = (pattern.to_string(), ignorecase);
    let mut cache = REGEX_CACHE.lock().unwrap();
    if let Some(re) = cache.get(&key) {
        return Ok(re.clone());
    }
    let re = RegexBuilder::new(pattern)
        .case_insensitive(ignorecase)
        .build()
        .map_err(|e| crate::error::ColophonError::TemplateRenderFailure {
            source: pattern.to_string(),
            message: format!("invalid regex: {e}"),
        })?;
    cache.insert(key, re.clone());
    Ok(re)
}

fn prep(raw: &str, context: &Value, ignorecase: bool) -> Result<String> {
    let rendered = render_template_string(raw, context, false)?;
    Ok(if ignorecase {
        rendered.to_lowercase()
    } else {
        rendered
    })
}

fn is_decimal_digits(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

/// Evaluate `value` (a template string) against `conditions`, rendered with
/// `context`. Regex operands are never rendered themselves.
pub fn value_match(value: &str, conditions: &Condition, context: &Value) -> Result<bool> {
    let ignorecase = conditions.ignorecase;
    let vstr = prep(value, context, ignorecase)?;
    let mut matched = true;

    if let Some(operand) = &conditions.equals {
        matched &= vstr == prep(operand, context, ignorecase)?;
    }
    if let Some(operand) = &conditions.startswith {
        matched &= vstr.starts_with(&prep(operand, context, ignorecase)?);
    }
    if let Some(operand) = &conditions.endswith {
        matched &= vstr.ends_with(&prep(operand, context, ignorecase)?);
    }
    if let Some(pattern) = &conditions.regex {
        let re = cached_regex(pattern, ignorecase)?;
        matched &= re.is_match(&vstr);
    }
    if let Some(operand) = &conditions.greaterthan {
        let cstr = prep(operand, context, ignorecase)?;
        matched &= is_decimal_digits(&vstr)
            && is_decimal_digits(&cstr)
            && vstr.parse::<i64>().unwrap() > cstr.parse::<i64>().unwrap();
    }
    if let Some(operand) = &conditions.lessthan {
        let cstr = prep(operand, context, ignorecase)?;
        matched &= is_decimal_digits(&vstr)
            && is_decimal_digits(&cstr)
            && vstr.parse::<i64>().unwrap() < cstr.parse::<i64>().unwrap();
    }

    Ok(matched)
}
