//! Action targets as the planner and tool callers write them.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Which element an action means.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ActionTarget {
    /// Catalog index from the latest observation
    Index(usize),
    /// A raw CSS selector, used as given
    Selector(String),
    /// A loose description, resolved against the catalog
    Description(String),
}

impl ActionTarget {
    /// Parse a target string. Numbers are indices, `css:` prefixes and
    /// selector-shaped strings are selectors, everything else is a description.
    pub fn parse(s: &str) -> Self {
        let s = s.trim();

        if let Ok(idx) = s.trim_start_matches('[').trim_end_matches(']').parse::<usize>() {
            return ActionTarget::Index(idx);
        }
        if let Some(v) = s.strip_prefix("css:") {
            return ActionTarget::Selector(v.trim().into());
        }
        if let Some(v) = s.strip_prefix("text:") {
            return ActionTarget::Description(v.trim().into());
        }
        if looks_like_selector(s) {
            return ActionTarget::Selector(s.into());
        }
        ActionTarget::Description(s.into())
    }

    pub fn index(&self) -> Option<usize> {
        match self {
            ActionTarget::Index(i) => Some(*i),
            _ => None,
        }
    }
}

/// `#id`, `.class`, `[attr]` and combinator chains; plain words are not.
fn looks_like_selector(s: &str) -> bool {
    let Some(first) = s.chars().next() else {
        return false;
    };
    if matches!(first, '#' | '.' | '[') {
        return (s.len() > 1 && !s.contains(' ')) || s.contains(" > ") || s.ends_with(']');
    }
    s.contains(" > ") && !s.contains(|c: char| c == '"' || c == '\'')
}

impl fmt::Display for ActionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionTarget::Index(i) => write!(f, "{}", i),
            ActionTarget::Selector(s) => write!(f, "css:{}", s),
            ActionTarget::Description(d) => f.write_str(d),
        }
    }
}

impl Serialize for ActionTarget {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ActionTarget::Index(i) => serializer.serialize_u64(*i as u64),
            other => serializer.serialize_str(&other.to_string()),
        }
    }
}

impl<'de> Deserialize<'de> for ActionTarget {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Index(u64),
            Text(String),
        }
        Ok(match Raw::deserialize(deserializer)? {
            Raw::Index(i) => ActionTarget::Index(i as usize),
            Raw::Text(s) => ActionTarget::parse(&s),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_index() {
        assert_eq!(ActionTarget::parse("0"), ActionTarget::Index(0));
        assert_eq!(ActionTarget::parse("15"), ActionTarget::Index(15));
        assert_eq!(ActionTarget::parse("  42  "), ActionTarget::Index(42));
        assert_eq!(ActionTarget::parse("[7]"), ActionTarget::Index(7));
    }

    #[test]
    fn parse_selectors() {
        assert_eq!(ActionTarget::parse("css:form button"), ActionTarget::Selector("form button".into()));
        assert_eq!(ActionTarget::parse("#login"), ActionTarget::Selector("#login".into()));
        assert_eq!(ActionTarget::parse(".btn.primary"), ActionTarget::Selector(".btn.primary".into()));
        assert_eq!(
            ActionTarget::parse("[name=\"q\"]"),
            ActionTarget::Selector("[name=\"q\"]".into())
        );
        assert_eq!(
            ActionTarget::parse("body > div:nth-of-type(2) > a"),
            ActionTarget::Selector("body > div:nth-of-type(2) > a".into())
        );
    }

    #[test]
    fn parse_descriptions() {
        assert_eq!(ActionTarget::parse("Login button"), ActionTarget::Description("Login button".into()));
        assert_eq!(ActionTarget::parse("text:Submit"), ActionTarget::Description("Submit".into()));
        // Hashtag-like prose is not a selector
        assert_eq!(
            ActionTarget::parse("#1 best seller list"),
            ActionTarget::Description("#1 best seller list".into())
        );
    }

    #[test]
    fn serde_roundtrip_preserves_kind() {
        for target in [
            ActionTarget::Index(3),
            ActionTarget::Selector("#go".into()),
            ActionTarget::Description("Sign up".into()),
        ] {
            let json = serde_json::to_string(&target).unwrap();
            let back: ActionTarget = serde_json::from_str(&json).unwrap();
            assert_eq!(back, target);
        }
        let from_str: ActionTarget = serde_json::from_str("\"12\"").unwrap();
        assert_eq!(from_str, ActionTarget::Index(12));
    }
}
