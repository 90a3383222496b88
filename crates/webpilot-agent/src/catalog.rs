//! Element catalog: every interactive element of the page, frames included.
//!
//! The page script only gathers raw facts. Role hints, region fallback,
//! selector choice and de-duplication happen in Rust.

use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

use crate::driver::{eval_as, Driver};
use crate::selector::{self, Lineage, LINEAGE_FN};
use crate::{ElementDescriptor, Rect, Region, Result, RoleHint};

/// Default cap on catalog size.
pub const DEFAULT_MAX_ELEMENTS: usize = 150;

#[derive(Debug, Deserialize)]
struct RawElement {
    tag: String,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    classes: Vec<String>,
    #[serde(default)]
    text: String,
    #[serde(default)]
    label: String,
    #[serde(default)]
    context: String,
    #[serde(default)]
    landmark: Option<Region>,
    visible: bool,
    x: f64,
    y: f64,
    width: f64,
    height: f64,
    page_y: f64,
    doc_height: f64,
    #[serde(default)]
    attributes: BTreeMap<String, String>,
    lineage: Lineage,
    #[serde(default)]
    frame_path: Vec<usize>,
}

fn catalog_js() -> String {
    format!("(() => {{ /* wp:catalog */\n{}\n{}\n}})()", LINEAGE_FN, CATALOG_BODY)
}

const CATALOG_BODY: &str = r#"
const INTERACTIVE = 'a[href], button, input:not([type="hidden"]), select, textarea, summary, '
    + '[role="button"], [role="link"], [role="option"], [role="menuitem"], [role="listbox"], '
    + '[role="combobox"], [role="tab"], [role="checkbox"], [onclick], '
    + '[tabindex]:not([tabindex="-1"]), [contenteditable="true"]';
const STRONG = 'a[href], button, summary, [role="button"], [role="link"], [role="option"], '
    + '[role="menuitem"], [role="tab"], [role="checkbox"], [role="combobox"]';
const NEVER_BUBBLE = new Set(['input', 'select', 'textarea', 'label']);
const HEADING = 'h1, h2, h3, h4, h5, h6, legend, [role="heading"], th, dt, label';
const SR_ONLY = '.sr-only, .visually-hidden, .screen-reader-text, .a11y-hidden';
const clean = (s, max) => {
    const t = (s || '').replace(/\s+/g, ' ').trim();
    return t.length > max ? t.slice(0, max) : t;
};
const docHeight = Math.max(document.documentElement.scrollHeight, window.innerHeight, 1);
const out = [];

function visibleIn(el, win) {
    const r = el.getBoundingClientRect();
    const s = win.getComputedStyle(el);
    return r.width > 0 && r.height > 0 && s.display !== 'none'
        && s.visibility !== 'hidden' && parseFloat(s.opacity) > 0;
}

function ownText(el) {
    const tag = el.localName;
    if (tag === 'input' || tag === 'textarea') {
        return el.type === 'password' ? '' : clean(el.value, 80);
    }
    if (tag === 'select') {
        const opt = el.options && el.options[el.selectedIndex];
        return opt ? clean(opt.text, 80) : '';
    }
    let text = clean(el.innerText || el.textContent, 80);
    const sr = Array.from(el.querySelectorAll(SR_ONLY)).map(n => clean(n.textContent, 80)).join(' ').trim();
    if (sr.length > text.length) text = clean(sr, 80);
    return text;
}

function labelOf(el, doc) {
    const attr = el.getAttribute('aria-label') || el.getAttribute('placeholder') || el.getAttribute('title');
    if (attr) return clean(attr, 80);
    const by = el.getAttribute('aria-labelledby');
    if (by) {
        const t = by.split(/\s+/).map(id => doc.getElementById(id)).filter(Boolean)
            .map(n => n.textContent).join(' ');
        if (clean(t, 80)) return clean(t, 80);
    }
    if (el.id) {
        try {
            const l = doc.querySelector('label[for="' + CSS.escape(el.id) + '"]');
            if (l) return clean(l.textContent, 80);
        } catch (e) {}
    }
    const wrap = el.closest('label');
    if (wrap && wrap !== el) {
        const c = wrap.cloneNode(true);
        c.querySelectorAll('input, select, textarea').forEach(n => n.remove());
        if (clean(c.textContent, 80)) return clean(c.textContent, 80);
    }
    const prev = el.previousElementSibling;
    if (prev && !prev.matches(INTERACTIVE)) {
        const t = clean(prev.textContent, 80);
        if (t && t.length < 60) return t;
    }
    const parent = el.parentElement;
    if (parent && parent.children.length <= 2) {
        const t = clean(parent.textContent, 80);
        if (t && t.length < 60 && t !== ownText(el)) return t;
    }
    return '';
}

function contextOf(el, doc) {
    if (el.id) {
        try {
            const l = doc.querySelector('label[for="' + CSS.escape(el.id) + '"]');
            if (l) return clean(l.textContent, 80);
        } catch (e) {}
    }
    let n = el;
    for (let depth = 0; n && depth < 7; depth++, n = n.parentElement) {
        for (let s = n.previousElementSibling; s; s = s.previousElementSibling) {
            if (s.matches(HEADING)) return clean(s.textContent, 80);
            const inner = s.querySelectorAll(HEADING);
            if (inner.length) return clean(inner[inner.length - 1].textContent, 80);
        }
    }
    return '';
}

function landmarkOf(el) {
    if (el.closest('header, [role="banner"]')) return 'header';
    if (el.closest('footer, [role="contentinfo"]')) return 'footer';
    if (el.closest('aside, nav, [role="complementary"], [role="navigation"]')) return 'sidebar';
    if (el.closest('main, [role="main"]')) return 'main';
    return null;
}

function attributesOf(el) {
    const attrs = {};
    let n = 0;
    for (const a of el.attributes) {
        if (a.name === 'style' || a.value.length > 200) continue;
        attrs[a.name] = a.value;
        if (++n >= 20) break;
    }
    if (el.localName === 'input' && !attrs.type) attrs.type = 'text';
    return attrs;
}

function collect(doc, win, path, offX, offY) {
    const found = new Set();
    const add = el => {
        const tag = el.localName;
        if (!NEVER_BUBBLE.has(tag) && !el.matches(STRONG)) {
            const strong = el.parentElement && el.parentElement.closest(STRONG);
            if (strong) el = strong;
        }
        found.add(el);
    };
    doc.querySelectorAll(INTERACTIVE).forEach(add);
    for (const el of doc.body ? doc.body.querySelectorAll('*') : []) {
        if (found.has(el)) continue;
        let s;
        try { s = win.getComputedStyle(el); } catch (e) { continue; }
        if (s.cursor !== 'pointer') continue;
        const parent = el.parentElement;
        if (parent && win.getComputedStyle(parent).cursor === 'pointer') continue;
        add(el);
    }

    for (const el of found) {
        try {
            const r = el.getBoundingClientRect();
            out.push({
                tag: el.localName,
                id: el.id || null,
                classes: Array.from(el.classList).slice(0, 8),
                text: ownText(el),
                label: labelOf(el, doc),
                context: contextOf(el, doc),
                landmark: landmarkOf(el),
                visible: visibleIn(el, win),
                x: r.x + offX, y: r.y + offY, width: r.width, height: r.height,
                page_y: r.y + offY + window.scrollY,
                doc_height: docHeight,
                attributes: attributesOf(el),
                lineage: wpLineage(el),
                frame_path: path
            });
        } catch (e) {
            // detached or otherwise unreadable node
        }
    }

    doc.querySelectorAll('iframe, frame').forEach((f, i) => {
        let child = null;
        try { child = f.contentDocument; } catch (e) { child = null; }
        if (!child || !child.documentElement) return;
        const r = f.getBoundingClientRect();
        collect(child, f.contentWindow, path.concat([i]), offX + r.x, offY + r.y);
    });
}

collect(document, window, [], 0, 0);
return JSON.stringify(out);
"#;

/// Catalog the page with the default size cap.
pub async fn extract_all<D: Driver + ?Sized>(driver: &D) -> Result<Vec<ElementDescriptor>> {
    extract(driver, DEFAULT_MAX_ELEMENTS).await
}

/// Catalog the page, keeping at most `max` elements.
///
/// Visible elements are kept first when the cap bites; document order is
/// preserved either way.
pub async fn extract<D: Driver + ?Sized>(driver: &D, max: usize) -> Result<Vec<ElementDescriptor>> {
    let raw: Vec<RawElement> = eval_as(driver, &catalog_js()).await?;
    let total = raw.len();
    let elements = build(raw, max);
    debug!("catalog: {} raw, {} kept", total, elements.len());
    Ok(elements)
}

fn build(raw: Vec<RawElement>, max: usize) -> Vec<ElementDescriptor> {
    let mut seen = HashSet::new();
    let unique: Vec<RawElement> = raw
        .into_iter()
        .filter(|r| seen.insert(dedup_key(r)))
        .collect();

    let visible = unique.iter().filter(|r| r.visible).count();
    let mut hidden_budget = max.saturating_sub(visible);
    let mut kept = Vec::with_capacity(unique.len().min(max));
    for r in unique {
        if kept.len() >= max {
            break;
        }
        if !r.visible {
            if hidden_budget == 0 {
                continue;
            }
            hidden_budget -= 1;
        }
        kept.push(r);
    }

    kept.into_iter()
        .enumerate()
        .map(|(index, r)| descriptor(index, r))
        .collect()
}

fn dedup_key(r: &RawElement) -> String {
    format!(
        "{}|{}|{}|{}|{}|{}|{}|{}|{:?}",
        r.tag,
        r.id.as_deref().unwrap_or(""),
        r.classes.join(" "),
        r.text,
        r.label,
        r.attributes.get("href").map(String::as_str).unwrap_or(""),
        r.x.round() as i64,
        r.y.round() as i64,
        r.frame_path,
    )
}

fn descriptor(index: usize, r: RawElement) -> ElementDescriptor {
    let sel = selector::synthesize(&r.lineage);
    let role = role_hint(
        &r.tag,
        r.attributes.get("role").map(String::as_str),
        r.attributes.get("type").map(String::as_str),
    );
    let region = r.landmark.unwrap_or_else(|| region_from_position(r.page_y, r.doc_height));
    ElementDescriptor {
        index,
        tag: r.tag,
        id: r.id.filter(|s| !s.is_empty()),
        classes: r.classes,
        text: r.text,
        label: r.label,
        context: r.context,
        role,
        region,
        visible: r.visible,
        bbox: Rect {
            x: r.x,
            y: r.y,
            width: r.width,
            height: r.height,
        },
        css: sel.css,
        xpath: sel.xpath,
        frame_path: r.frame_path,
        attributes: r.attributes,
    }
}

/// Coarse role from ARIA role, then tag and input type.
pub fn role_hint(tag: &str, aria_role: Option<&str>, input_type: Option<&str>) -> RoleHint {
    match aria_role.map(str::to_ascii_lowercase).as_deref() {
        Some("button" | "tab" | "checkbox" | "switch" | "radio") => return RoleHint::Button,
        Some("link") => return RoleHint::Link,
        Some("option" | "menuitem" | "menuitemradio" | "menuitemcheckbox") => return RoleHint::Option,
        Some("listbox") => return RoleHint::Listbox,
        Some("combobox" | "textbox" | "searchbox") => return RoleHint::Input,
        _ => {}
    }
    match tag {
        "button" | "summary" => RoleHint::Button,
        "a" => RoleHint::Link,
        "input" => match input_type.unwrap_or("text") {
            "button" | "submit" | "reset" | "image" => RoleHint::Button,
            _ => RoleHint::Input,
        },
        "textarea" => RoleHint::Input,
        "select" => RoleHint::Listbox,
        "option" => RoleHint::Option,
        _ => RoleHint::Other,
    }
}

/// Region for elements outside any landmark: top tenth of the document is
/// the header, bottom tenth the footer.
pub fn region_from_position(page_y: f64, doc_height: f64) -> Region {
    let frac = page_y / doc_height.max(1.0);
    if frac < 0.1 {
        Region::Header
    } else if frac > 0.9 {
        Region::Footer
    } else {
        Region::Main
    }
}
