//! Selector synthesis from in-page lineage facts.
//!
//! The page script ([`LINEAGE_FN`]) gathers the ancestor chain of an element
//! together with document match counts for each identifying attribute. The
//! choice of selector happens here so it can be tested without a browser.
//! Selectors are rebuilt on every observation and never cached.

use serde::Deserialize;

/// Attributes conventionally reserved for test hooks, in preference order.
pub const TEST_ATTRS: [&str; 4] = ["data-testid", "data-test", "data-qa", "data-cy"];

/// In-page facts about one element.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Lineage {
    pub tag: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub id_unique: bool,
    #[serde(default)]
    pub test_attr: Option<TestAttr>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub name_unique: bool,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub aria_label: Option<String>,
    #[serde(default)]
    pub aria_unique: bool,
    /// The element first, then each ancestor up to the document element.
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TestAttr {
    pub name: String,
    pub value: String,
    pub unique: bool,
}

/// One level of the ancestor chain.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Step {
    pub tag: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub id_unique: bool,
    /// 1-based position among same-tag siblings
    pub nth_of_type: usize,
    /// Number of same-tag siblings, self included
    pub same_tag: usize,
    /// 1-based position among all element siblings
    pub nth_child: usize,
    /// Not in the HTML namespace (svg, mathml)
    #[serde(default)]
    pub foreign: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selectors {
    pub css: String,
    pub xpath: String,
}

/// Build the CSS and XPath locators for one element.
pub fn synthesize(lineage: &Lineage) -> Selectors {
    Selectors {
        css: css_for(lineage),
        xpath: xpath_for(&lineage.steps),
    }
}

fn css_for(l: &Lineage) -> String {
    let ident_tag = is_css_ident(&l.tag);

    if let Some(id) = l.id.as_deref().filter(|id| !id.is_empty()) {
        if l.id_unique {
            return format!("#{}", css_escape(id));
        }
    }
    if let Some(t) = &l.test_attr {
        if t.unique && TEST_ATTRS.contains(&t.name.as_str()) {
            return format!("[{}={}]", t.name, css_quote(&t.value));
        }
    }
    if let Some(name) = &l.name {
        if l.name_unique && ident_tag {
            return format!("{}[name={}]", l.tag, css_quote(name));
        }
    }
    if let Some(aria) = l.aria_label.as_deref().filter(|a| !a.is_empty()) {
        if l.aria_unique {
            match l.role.as_deref().filter(|r| !r.is_empty()) {
                Some(role) => {
                    return format!("[role={}][aria-label={}]", css_quote(role), css_quote(aria))
                }
                None if ident_tag => return format!("{}[aria-label={}]", l.tag, css_quote(aria)),
                None => {}
            }
        }
    }
    structural_css(&l.steps)
}

/// Child-combinator path from `body`, or from the nearest ancestor whose id
/// is unique in the document.
fn structural_css(steps: &[Step]) -> String {
    let mut parts: Vec<String> = Vec::new();
    for (i, step) in steps.iter().enumerate() {
        if i > 0 && step.id_unique {
            if let Some(id) = step.id.as_deref().filter(|id| !id.is_empty()) {
                parts.push(format!("#{}", css_escape(id)));
                break;
            }
        }
        if step.tag == "body" || step.tag == "html" {
            parts.push(step.tag.clone());
            break;
        }
        // Mixed-case foreign tags do not match a lowercase type selector
        let typed = is_css_ident(&step.tag) && !(step.foreign && step.tag != step.tag.to_lowercase());
        let part = if !typed {
            format!("*:nth-child({})", step.nth_child)
        } else if step.same_tag > 1 {
            format!("{}:nth-of-type({})", step.tag, step.nth_of_type)
        } else {
            step.tag.clone()
        };
        parts.push(part);
    }
    parts.reverse();
    parts.join(" > ")
}

fn xpath_for(steps: &[Step]) -> String {
    let mut out = String::new();
    for step in steps.iter().rev() {
        out.push('/');
        if step.foreign || !is_xml_name(&step.tag) {
            out.push_str(&format!("*[local-name()='{}']", step.tag.replace('\'', "")));
        } else {
            out.push_str(&step.tag);
        }
        if step.same_tag > 1 {
            out.push_str(&format!("[{}]", step.nth_of_type));
        }
    }
    out
}

/// True for names usable as a bare CSS type selector.
pub fn is_css_ident(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn is_xml_name(s: &str) -> bool {
    is_css_ident(s) && !s.contains("--")
}

/// Serialize an identifier the way `CSS.escape` does.
pub fn css_escape(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    let mut out = String::with_capacity(value.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        let code = c as u32;
        if code == 0 {
            out.push('\u{FFFD}');
        } else if (0x01..=0x1f).contains(&code)
            || code == 0x7f
            || (i == 0 && c.is_ascii_digit())
            || (i == 1 && c.is_ascii_digit() && chars[0] == '-')
        {
            out.push_str(&format!("\\{:x} ", code));
        } else if i == 0 && c == '-' && chars.len() == 1 {
            out.push_str("\\-");
        } else if code >= 0x80 || c == '-' || c == '_' || c.is_ascii_alphanumeric() {
            out.push(c);
        } else {
            out.push('\\');
            out.push(c);
        }
    }
    out
}

/// A double-quoted CSS string literal.
pub fn css_quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\a "),
            '\r' => out.push_str("\\d "),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Page-side lineage collector. Defines `wpLineage(el)`; spliced into the
/// catalog and dropdown scripts.
pub const LINEAGE_FN: &str = r#"
function wpLineage(el) {
    const doc = el.ownerDocument;
    const count = sel => { try { return doc.querySelectorAll(sel).length; } catch (e) { return 0; } };
    const q = v => '"' + CSS.escape(v) + '"';
    const tag = el.localName;
    const out = {
        tag, id: el.id || null, id_unique: false, test_attr: null,
        name: null, name_unique: false,
        role: el.getAttribute('role'), aria_label: el.getAttribute('aria-label'), aria_unique: false,
        steps: []
    };
    if (el.id) out.id_unique = count('#' + CSS.escape(el.id)) === 1;
    for (const a of ['data-testid', 'data-test', 'data-qa', 'data-cy']) {
        const v = el.getAttribute(a);
        if (v) { out.test_attr = { name: a, value: v, unique: count('[' + a + '=' + q(v) + ']') === 1 }; break; }
    }
    const name = el.getAttribute('name');
    if (name) { out.name = name; out.name_unique = count(tag + '[name=' + q(name) + ']') === 1; }
    if (out.aria_label) {
        const sel = out.role
            ? '[role=' + q(out.role) + '][aria-label=' + q(out.aria_label) + ']'
            : tag + '[aria-label=' + q(out.aria_label) + ']';
        out.aria_unique = count(sel) === 1;
    }
    for (let n = el; n && n.nodeType === 1; n = n.parentElement) {
        const p = n.parentElement;
        const sibs = p ? Array.from(p.children) : [n];
        const same = sibs.filter(c => c.localName === n.localName);
        out.steps.push({
            tag: n.localName,
            id: n.id || null,
            id_unique: !!n.id && count('#' + CSS.escape(n.id)) === 1,
            nth_of_type: same.indexOf(n) + 1,
            same_tag: same.length,
            nth_child: sibs.indexOf(n) + 1,
            foreign: n.namespaceURI !== 'http://www.w3.org/1999/xhtml'
        });
    }
    return out;
}
"#;
