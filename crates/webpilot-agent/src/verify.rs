//! Page-state fingerprints and the change verifier.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::driver::{eval_as, js_arg, Driver};
use crate::Result;

/// Cheap summary of page state, compared before and after an action.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StateFingerprint {
    pub url: String,
    pub title: String,
    pub element_count: usize,
    /// FNV-1a over visible body text
    pub text_hash: u32,
    pub dialogs: usize,
    pub expanded: usize,
    pub toasts: usize,
    /// Positioned elements with a high z-index
    pub floating: usize,
    /// Key of the focused element; empty when focus is on the body
    #[serde(default)]
    pub focus: String,
    /// Focus sits on the acted-on element or inside it
    #[serde(default)]
    pub focus_on_target: bool,
    /// Elements overlapping the action's target text that carry an
    /// expanded/selected/pressed/active marker, plus prominent headings
    /// containing that text
    #[serde(default)]
    pub target_markers: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeReason {
    UrlChanged,
    ContentChanged,
    StructureChanged,
    OverlayAppeared,
    FocusMoved,
    TargetMarked,
}

impl ChangeReason {
    pub fn describe(&self) -> &'static str {
        match self {
            Self::UrlChanged => "url changed",
            Self::ContentChanged => "content changed",
            Self::StructureChanged => "interactive elements changed",
            Self::OverlayAppeared => "overlay appeared",
            Self::FocusMoved => "focus moved",
            Self::TargetMarked => "target state marker appeared",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// Evidence that an action changed the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Verification {
    pub reason: ChangeReason,
    pub confidence: Confidence,
}

impl fmt::Display for Verification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?} confidence)", self.reason.describe(), self.confidence)
    }
}

/// First matching rule wins. `None` means nothing observable changed.
pub fn compare(before: &StateFingerprint, after: &StateFingerprint) -> Option<Verification> {
    let hit = |reason, confidence| Some(Verification { reason, confidence });

    if before.url != after.url {
        return hit(ChangeReason::UrlChanged, Confidence::High);
    }
    if before.text_hash != after.text_hash {
        return hit(ChangeReason::ContentChanged, Confidence::High);
    }
    let base = before.element_count.max(1) as f64;
    if (after.element_count as f64 - before.element_count as f64).abs() / base > 0.10 {
        return hit(ChangeReason::StructureChanged, Confidence::Medium);
    }
    if after.dialogs > before.dialogs
        || after.expanded > before.expanded
        || after.toasts > before.toasts
        || after.floating > before.floating
    {
        return hit(ChangeReason::OverlayAppeared, Confidence::Medium);
    }
    // a pointer click focuses what it hits; that alone proves nothing
    if !after.focus.is_empty() && after.focus != before.focus && !after.focus_on_target {
        return hit(ChangeReason::FocusMoved, Confidence::Low);
    }
    if after.target_markers > before.target_markers {
        return hit(ChangeReason::TargetMarked, Confidence::Low);
    }
    None
}

const FINGERPRINT_JS: &str = r#"((arg) => { /* wp:fingerprint */
    const target = arg && arg.text;
    const INTERACTIVE = 'a[href], button, input:not([type="hidden"]), select, textarea, [role="button"], [role="link"], [role="option"], [role="menuitem"], [onclick], [tabindex]:not([tabindex="-1"])';
    const shown = el => {
        const r = el.getBoundingClientRect();
        if (r.width === 0 || r.height === 0) return false;
        const s = getComputedStyle(el);
        return s.display !== 'none' && s.visibility !== 'hidden' && parseFloat(s.opacity) > 0;
    };
    const count = sel => Array.from(document.querySelectorAll(sel)).filter(shown).length;

    const text = document.body ? (document.body.innerText || '') : '';
    let h = 0x811c9dc5;
    for (let i = 0; i < text.length; i++) {
        h ^= text.charCodeAt(i);
        h = Math.imul(h, 0x01000193) >>> 0;
    }

    let floating = 0;
    for (const el of document.body ? document.body.querySelectorAll('*') : []) {
        const s = getComputedStyle(el);
        if ((s.position === 'fixed' || s.position === 'absolute') && parseInt(s.zIndex, 10) >= 1000 && shown(el)) floating++;
    }

    const a = document.activeElement;
    let focus = '';
    if (a && a !== document.body && a !== document.documentElement) {
        focus = a.localName + '#' + (a.id || '') + '[' + (a.getAttribute('name') || a.getAttribute('aria-label') || '') + ']';
    }
    let focusOnTarget = false;
    if (focus && arg && arg.framed) {
        focusOnTarget = a.localName === 'iframe' || a.localName === 'frame';
    } else if (focus && arg && arg.css) {
        try { focusOnTarget = a.matches(arg.css) || a.closest(arg.css) !== null; } catch (e) {}
    }

    let markers = 0;
    if (target) {
        const want = target.toLowerCase().replace(/\s+/g, ' ').trim();
        const overlaps = el => (el.innerText || el.getAttribute('aria-label') || '').toLowerCase().includes(want);
        document.querySelectorAll('[aria-expanded="true"], [aria-selected="true"], [aria-pressed="true"], [aria-current], .active, .selected, .is-active')
            .forEach(el => { if (overlaps(el)) markers++; });
        document.querySelectorAll('h1, h2, [role="heading"]').forEach(el => {
            const r = el.getBoundingClientRect();
            if (overlaps(el) && r.top >= 0 && r.top < window.innerHeight / 2 && shown(el)) markers++;
        });
    }

    return JSON.stringify({
        url: location.href,
        title: document.title,
        element_count: count(INTERACTIVE),
        text_hash: h >>> 0,
        dialogs: count('dialog[open], [role="dialog"], [role="alertdialog"], [aria-modal="true"]'),
        expanded: count('[aria-expanded="true"], [role="listbox"], [role="menu"]'),
        toasts: count('[role="alert"], [role="status"], [aria-live="assertive"], .toast'),
        floating,
        focus,
        focus_on_target: focusOnTarget,
        target_markers: markers
    });
})"#;

/// What the fingerprint is taken around.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct FingerprintTarget<'a> {
    /// Semantic target text, for the marker probe
    pub text: Option<&'a str>,
    /// Selector of the acted-on element, so focus landing on it is discounted
    pub css: Option<&'a str>,
    /// The element lives in a frame; focus on a frame element is discounted
    pub framed: bool,
}

/// Capture the current page state.
pub async fn fingerprint<D: Driver + ?Sized>(
    driver: &D,
    target: &FingerprintTarget<'_>,
) -> Result<StateFingerprint> {
    let js = format!("{}({})", FINGERPRINT_JS, js_arg(target));
    eval_as(driver, &js).await
}
