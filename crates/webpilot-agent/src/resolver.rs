//! Candidate resolver: pick the one element a loose description means.
//!
//! Scoring is a plain weighted sum over named weights. Anything within the
//! ambiguity band of the best score is a tie, and ties are reported, never
//! broken silently.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::OnceLock;
use tracing::debug;

use crate::{ElementDescriptor, Region};

/// Control-type nouns and filler words stripped from a query.
const STOP_WORDS: &[&str] = &[
    // control nouns
    "button", "btn", "dropdown", "drop-down", "icon", "link", "field", "input", "box", "menu",
    "tab", "checkbox", "textbox", "textarea", "option", "element", "item", "control", "toggle",
    // verbs
    "click", "press", "tap", "hit", "select", "choose", "open", "type", "enter", "fill", "find",
    "go", "use",
    // articles and fillers
    "the", "a", "an", "on", "in", "into", "to", "of", "for", "with", "at", "that", "this", "labeled",
    "labelled", "called", "named", "says", "saying",
];

/// Named scoring weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Weights {
    pub exact: i32,
    pub partial: i32,
    pub semantic: i32,
    pub visible: i32,
    pub header: i32,
    pub search_field: i32,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            exact: 100,
            partial: 50,
            semantic: 25,
            visible: 5,
            header: 5,
            search_field: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Candidates scoring strictly less than this below the best are tied with it.
    pub ambiguity_band: i32,
    pub weights: Weights,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            ambiguity_band: 10,
            weights: Weights::default(),
        }
    }
}

/// The normalized form of a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryKey {
    /// Quoted phrase, or the query with control nouns and fillers stripped
    pub phrase: String,
    /// Words of the phrase, at least two characters each
    pub tokens: Vec<String>,
    pub mentions_icon: bool,
    pub mentions_search: bool,
}

impl QueryKey {
    pub fn parse(query: &str) -> Self {
        static QUOTED: OnceLock<Regex> = OnceLock::new();
        let quoted = QUOTED.get_or_init(|| {
            Regex::new(r#""([^"]+)"|“([^”]+)”|(?:^|\s)'([^']+)'(?:\s|$)"#).expect("quote pattern is valid")
        });

        let lowered = normalize(query);
        let words: Vec<&str> = lowered.split(' ').collect();
        let mentions_icon = words.iter().any(|w| *w == "icon" || *w == "icons");
        let mentions_search = lowered.contains("search");

        let phrase = match quoted.captures(query) {
            Some(caps) => caps
                .iter()
                .skip(1)
                .flatten()
                .next()
                .map(|m| normalize(m.as_str()))
                .unwrap_or_default(),
            None => {
                let kept: Vec<&str> = words
                    .iter()
                    .copied()
                    .filter(|w| !w.is_empty() && !STOP_WORDS.contains(w))
                    .collect();
                // "option 2" strips down to "2", which no token can carry
                let too_short = kept.iter().all(|w| w.chars().count() < 2);
                if too_short {
                    lowered.clone()
                } else {
                    kept.join(" ")
                }
            }
        };

        let tokens = phrase
            .split(' ')
            .filter(|t| t.chars().count() >= 2)
            .map(String::from)
            .collect();

        Self {
            phrase,
            tokens,
            mentions_icon,
            mentions_search,
        }
    }
}

/// Lowercase, collapse whitespace, and collapse an echoed repeat
/// (`"Log In Log In"` → `"log in"`).
pub fn normalize(s: &str) -> String {
    let mut words: Vec<String> = s.split_whitespace().map(str::to_lowercase).collect();
    while words.len() >= 2 && words.len() % 2 == 0 {
        let half = words.len() / 2;
        if words[..half] == words[half..] {
            words.truncate(half);
        } else {
            break;
        }
    }
    words.join(" ")
}

fn compact(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect::<String>().to_lowercase()
}

/// Text equals the phrase or one of its tokens, or is an exact match followed
/// by a trailing repeat of the phrase.
fn is_exact(text: &str, key: &QueryKey) -> bool {
    if text.is_empty() || key.phrase.is_empty() {
        return false;
    }
    if text == key.phrase || key.tokens.iter().any(|t| t == text) {
        return true;
    }
    match text.strip_suffix(key.phrase.as_str()) {
        Some(rest) if rest.ends_with(' ') => is_exact(rest.trim_end(), key),
        _ => false,
    }
}

fn is_partial(text: &str, key: &QueryKey) -> bool {
    if text.is_empty() || key.phrase.is_empty() {
        return false;
    }
    let hay = compact(text);
    hay.contains(&compact(&key.phrase))
        || key.tokens.iter().any(|t| t.chars().count() >= 3 && hay.contains(t.as_str()))
}

/// Semantic firewall: does the element mention any query token at all?
pub fn passes_firewall(key: &QueryKey, el: &ElementDescriptor) -> bool {
    if key.tokens.is_empty() {
        return false;
    }
    let fields = [
        Some(el.text.as_str()),
        Some(el.label.as_str()),
        el.placeholder(),
        el.attr("title"),
        Some(el.context.as_str()),
        el.id.as_deref(),
        el.attr("name"),
        el.attr("value"),
        el.attr("aria-label"),
    ];
    let hay: String = fields
        .iter()
        .flatten()
        .map(|f| compact(f))
        .collect::<Vec<_>>()
        .join("\u{1}");
    key.tokens.iter().any(|t| hay.contains(&compact(t)))
}

/// Weighted score of one element for one query.
pub fn score(key: &QueryKey, el: &ElementDescriptor, weights: &Weights) -> i32 {
    let mut total = 0;

    let text = normalize(&el.text);
    let label = normalize(&el.label);
    if is_exact(&text, key) || is_exact(&label, key) {
        total += weights.exact;
    } else if is_partial(&text, key) || is_partial(&label, key) {
        total += weights.partial;
    }

    let hooks = format!(
        "{} {}",
        el.id.as_deref().unwrap_or(""),
        el.classes.join(" ")
    )
    .to_lowercase();
    if (key.mentions_icon && hooks.contains("icon")) || (key.mentions_search && hooks.contains("search")) {
        total += weights.semantic;
    }

    if el.visible {
        total += weights.visible;
    }
    if el.region == Region::Header {
        total += weights.header;
    }
    if key.mentions_search && el.is_search_field() {
        total += weights.search_field;
    }
    total
}

/// A candidate and its score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scored {
    pub element: ElementDescriptor,
    pub score: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Unique(Scored),
    /// Two or more candidates inside the ambiguity band, best first
    Ambiguous(Vec<Scored>),
    None,
}

impl Resolution {
    pub fn unique(&self) -> Option<&ElementDescriptor> {
        match self {
            Resolution::Unique(hit) => Some(&hit.element),
            _ => None,
        }
    }

    pub fn candidates(&self) -> Vec<&Scored> {
        match self {
            Resolution::Unique(hit) => vec![hit],
            Resolution::Ambiguous(all) => all.iter().collect(),
            Resolution::None => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Resolver {
    pub config: ResolverConfig,
}

impl Resolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    pub fn resolve(&self, query: &str, candidates: &[ElementDescriptor]) -> Resolution {
        self.resolve_excluding(query, candidates, &HashSet::new())
    }

    /// Resolve, skipping any candidate whose CSS selector is in `excluded`.
    pub fn resolve_excluding(
        &self,
        query: &str,
        candidates: &[ElementDescriptor],
        excluded: &HashSet<String>,
    ) -> Resolution {
        let key = QueryKey::parse(query);
        let mut scored: Vec<Scored> = candidates
            .iter()
            .filter(|el| !excluded.contains(&el.css))
            .filter(|el| passes_firewall(&key, el))
            .map(|el| Scored {
                score: score(&key, el, &self.config.weights),
                element: el.clone(),
            })
            .collect();

        if scored.is_empty() {
            debug!("resolve {:?}: no candidate passed the firewall", query);
            return Resolution::None;
        }

        scored.sort_by(|a, b| b.score.cmp(&a.score).then(a.element.index.cmp(&b.element.index)));
        let best = scored[0].score;
        let band = self.config.ambiguity_band;
        scored.retain(|s| best - s.score < band);

        debug!(
            "resolve {:?} (phrase {:?}): best {} with {} in band",
            query,
            key.phrase,
            best,
            scored.len()
        );
        if scored.len() == 1 {
            Resolution::Unique(scored.remove(0))
        } else {
            Resolution::Ambiguous(scored)
        }
    }
}
