use crate::script::actions::Target;
use crate::script::Action;
use crate::{Error, Result};
use eoka::Page;
use serde::Deserialize;
use tracing::{debug, info};

/// Locate an element (frame path, then css / xpath / text) and either mark it
/// for a native click or operate on it from script.
const REPLAY_JS: &str = r#"((arg) => {
    let doc = document;
    for (const i of arg.frame || []) {
        const frames = doc.querySelectorAll('iframe, frame');
        const f = frames[i];
        if (!f || !f.contentDocument) return { ok: false, error: 'frame ' + i + ' not reachable' };
        doc = f.contentDocument;
    }
    const norm = s => (s || '').replace(/\s+/g, ' ').trim().toLowerCase();
    const visible = el => {
        const r = el.getBoundingClientRect();
        const s = getComputedStyle(el);
        return r.width > 0 && r.height > 0 && s.display !== 'none' && s.visibility !== 'hidden';
    };
    let el = null;
    if (arg.css) {
        try { el = doc.querySelector(arg.css); } catch (e) { return { ok: false, error: 'bad selector: ' + e.message }; }
    } else if (arg.xpath) {
        try {
            el = doc.evaluate(arg.xpath, doc, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue;
        } catch (e) { return { ok: false, error: 'bad xpath: ' + e.message }; }
    } else if (arg.text) {
        const want = norm(arg.text);
        const all = Array.from(doc.querySelectorAll('a, button, input, select, textarea, label, [role], [onclick], [tabindex], li, span, div'))
            .filter(visible);
        const textOf = e => norm(e.innerText || e.value || e.getAttribute('aria-label') || '');
        el = all.find(e => textOf(e) === want) || all.find(e => textOf(e).includes(want)) || null;
    }
    if (!el) return { ok: false, error: 'element not found' };

    if (arg.op === 'locate') {
        el.setAttribute('data-webpilot-replay', arg.token);
        return { ok: true, selector: '[data-webpilot-replay="' + arg.token + '"]' };
    }
    el.scrollIntoView({ block: 'center' });
    if (arg.op === 'click') {
        el.click();
        return { ok: true };
    }
    if (arg.op === 'fill') {
        el.focus();
        const proto = el.tagName === 'TEXTAREA' ? HTMLTextAreaElement.prototype : HTMLInputElement.prototype;
        const setter = Object.getOwnPropertyDescriptor(proto, 'value');
        if (setter && setter.set && (el.tagName === 'INPUT' || el.tagName === 'TEXTAREA')) setter.set.call(el, arg.value);
        else el.textContent = arg.value;
        el.dispatchEvent(new Event('input', { bubbles: true }));
        el.dispatchEvent(new Event('change', { bubbles: true }));
        return { ok: true };
    }
    if (arg.op === 'select') {
        if (el.tagName !== 'SELECT') return { ok: false, error: 'not a <select>' };
        const want = norm(arg.value);
        const opts = Array.from(el.options);
        const opt = opts.find(o => norm(o.text) === want)
            || opts.find(o => norm(o.text).includes(want))
            || opts.find(o => o.value === arg.value);
        if (!opt) return { ok: false, error: 'option not found' };
        el.value = opt.value;
        el.dispatchEvent(new Event('input', { bubbles: true }));
        el.dispatchEvent(new Event('change', { bubbles: true }));
        return { ok: true };
    }
    return { ok: false, error: 'unknown op ' + arg.op };
})"#;

#[derive(Debug, Deserialize)]
struct ReplayOutcome {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    selector: Option<String>,
}

async fn replay_js(page: &Page, op: &str, target: &Target, value: &str) -> Result<ReplayOutcome> {
    let arg = serde_json::json!({
        "op": op,
        "frame": target.frame,
        "css": target.selector,
        "xpath": target.xpath,
        "text": target.text,
        "value": value,
        "token": replay_token(),
    });
    let js = format!("{}({})", REPLAY_JS, arg);
    let outcome: ReplayOutcome = page.evaluate(&js).await?;
    if !outcome.ok {
        return Err(Error::ActionFailed(format!(
            "{} {}: {}",
            op,
            target,
            outcome.error.as_deref().unwrap_or("failed")
        )));
    }
    Ok(outcome)
}

fn replay_token() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos().to_string())
        .unwrap_or_default()
}

/// Resolve a main-frame target to a CSS selector usable by the page.
async fn resolve_selector(page: &Page, target: &Target) -> Result<String> {
    if let Some(ref sel) = target.selector {
        return Ok(sel.clone());
    }
    replay_js(page, "locate", target, "")
        .await?
        .selector
        .ok_or_else(|| Error::ActionFailed(format!("{} did not resolve", target)))
}

/// Execute a single replay action.
pub async fn execute(page: &Page, action: &Action) -> Result<()> {
    match action {
        Action::Goto(a) => {
            info!("goto: {}", a.url);
            page.goto(&a.url).await?;
        }
        Action::Wait(a) => {
            debug!("wait: {}ms", a.ms);
            page.wait(a.ms).await;
        }
        Action::PressKey(a) => {
            debug!("press_key: {}", a.key);
            page.human().press_key(&a.key).await?;
        }
        Action::Click(a) => {
            info!("click: {}", a.target);
            if !a.target.frame.is_empty() {
                replay_js(page, "click", &a.target, "").await?;
                return Ok(());
            }
            let selector = resolve_selector(page, &a.target).await?;
            if let Err(e) = page.click(&selector).await {
                if !a.force {
                    return Err(e.into());
                }
                debug!("click on {} failed ({}), forcing", selector, e);
                let forced = Target {
                    selector: Some(selector),
                    ..Default::default()
                };
                replay_js(page, "click", &forced, "").await?;
            }
        }
        Action::Fill(a) => {
            info!("fill: {} = '{}'", a.target, a.value);
            if a.target.is_empty() {
                page.type_text(&a.value).await?;
            } else if !a.target.frame.is_empty() {
                replay_js(page, "fill", &a.target, &a.value).await?;
            } else {
                let selector = resolve_selector(page, &a.target).await?;
                page.fill(&selector, &a.value).await?;
            }
        }
        Action::Select(a) => {
            info!("select: {} = '{}'", a.target, a.value);
            replay_js(page, "select", &a.target, &a.value).await?;
        }
    }
    Ok(())
}
