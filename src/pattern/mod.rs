use crate::errors::HearsayError;
use crate::message::{Answer, IncomingMessage};
use indexmap::IndexMap;
use regex::{Regex, RegexBuilder};
use serde_json::Value;
use std::sync::LazyLock;

/// Matches a `{name}` placeholder token. Placeholders are identifier-shaped,
/// so repetition quantifiers like `{1,2}` or `{3}` never qualify and are left
/// untouched in the pattern.
static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder regex"));

/// Parameters extracted from a successful pattern match.
///
/// When the number of capture groups equals the number of named placeholders
/// the captures bind as a name→value map; otherwise they are returned as a
/// positional list (the pattern contained raw regex groups).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Captures {
    Named(IndexMap<String, String>),
    Positional(Vec<String>),
}

impl Captures {
    pub fn empty() -> Self {
        Captures::Positional(Vec::new())
    }

    pub fn len(&self) -> usize {
        match self {
            Captures::Named(map) => map.len(),
            Captures::Positional(list) => list.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        match self {
            Captures::Named(map) => map.get(name).map(String::as_str),
            Captures::Positional(_) => None,
        }
    }

    pub fn at(&self, index: usize) -> Option<&str> {
        match self {
            Captures::Named(map) => map.get_index(index).map(|(_, v)| v.as_str()),
            Captures::Positional(list) => list.get(index).map(String::as_str),
        }
    }

    /// Captured values in placeholder order, for continuation parameter lists.
    pub fn to_values(&self) -> Vec<Value> {
        match self {
            Captures::Named(map) => map.values().map(|v| Value::String(v.clone())).collect(),
            Captures::Positional(list) => {
                list.iter().map(|v| Value::String(v.clone())).collect()
            }
        }
    }
}

impl Default for Captures {
    fn default() -> Self {
        Self::empty()
    }
}

/// A route pattern compiled to an anchored, case-insensitive regex.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    pattern: String,
    regex: Regex,
    param_names: Vec<String>,
}

impl CompiledPattern {
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn param_names(&self) -> &[String] {
        &self.param_names
    }

    /// Evaluate one candidate text. `None` means no match.
    pub fn matches(&self, candidate: &str) -> Option<Captures> {
        let caps = self.regex.captures(candidate)?;
        let group_count = self.regex.captures_len() - 1;

        if group_count == self.param_names.len() {
            let map: IndexMap<String, String> = self
                .param_names
                .iter()
                .map(|name| {
                    let value = caps.name(name).map_or("", |m| m.as_str());
                    (name.clone(), value.to_string())
                })
                .collect();
            Some(Captures::Named(map))
        } else {
            let list = caps
                .iter()
                .skip(1)
                .map(|m| m.map_or_else(String::new, |m| m.as_str().to_string()))
                .collect();
            Some(Captures::Positional(list))
        }
    }

    /// Try candidates in order; the first successful evaluation determines
    /// both the match verdict and the extracted parameters.
    pub fn match_first<'a, I>(&self, candidates: I) -> Option<Captures>
    where
        I: IntoIterator<Item = &'a str>,
    {
        candidates.into_iter().find_map(|c| self.matches(c))
    }
}

/// Compile a route pattern with named placeholders into a matcher.
///
/// Placeholders are written `{name}`; everything else is passed through as
/// regex, so alternations like `(yes|no)` keep working. Path separators are
/// escaped, the result is anchored start-to-end and compiled
/// case-insensitively.
pub fn compile(pattern: &str) -> Result<CompiledPattern, HearsayError> {
    let escaped = pattern.replace('/', r"\/");
    let mut param_names = Vec::new();
    let replaced = PLACEHOLDER.replace_all(&escaped, |caps: &regex::Captures<'_>| {
        let name = caps[1].to_string();
        let group = format!("(?P<{}>.*)", name);
        param_names.push(name);
        group
    });

    let anchored = format!("^{}$", replaced);
    let regex = RegexBuilder::new(&anchored)
        .case_insensitive(true)
        .build()
        .map_err(|e| HearsayError::Pattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;

    Ok(CompiledPattern {
        pattern: pattern.to_string(),
        regex,
        param_names,
    })
}

/// The candidate texts a message is matched against: the message's own text
/// when non-empty, otherwise the platform-derived answer value. Verdict and
/// parameter extraction always come from the same candidate.
pub fn match_candidates(message: &IncomingMessage, answer: &Answer) -> Vec<String> {
    if message.content.is_empty() {
        vec![answer.value_text()]
    } else {
        vec![message.content.clone()]
    }
}
