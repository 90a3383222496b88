//! Playwright (Python, sync API) output.

use super::{locator_for, CompileOptions, Locator};
use crate::command::{CommandKind, ExecutionCommand};
use std::fmt::Write;

const HEADER: &str = r#"from playwright.sync_api import sync_playwright, TimeoutError as PlaywrightTimeout
"#;

const SAFE_CLICK: &str = r#"
def safe_click(page, target):
    """Click, falling back to a forced click when the element is covered or animating."""
    try:
        target.click(timeout=5000)
    except PlaywrightTimeout:
        target.click(timeout=5000, force=True)
    page.wait_for_timeout(CLICK_DELAY_MS)
"#;

/// Python string literal. JSON escapes are valid Python escapes.
fn py(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".into())
}

fn selector_string(locator: &Locator) -> String {
    match locator {
        Locator::Css(s) => format!("css={}", s),
        Locator::XPath(x) => format!("xpath={}", x),
        Locator::Id(id) => format!("[id={}]", py(id)),
        Locator::Text(t) => format!("text={}", t),
        Locator::Raw(r) => r.clone(),
    }
}

/// `page.locator(...)`, scoped through frame locators when the element lived in an iframe.
fn locator_expr(cmd: &ExecutionCommand) -> String {
    let mut expr = String::from("page");
    if let Some(ref b) = cmd.selectors {
        for idx in &b.frame {
            let _ = write!(expr, ".frame_locator(\"iframe, frame\").nth({})", idx);
        }
    }
    let _ = write!(expr, ".locator({})", py(&selector_string(&locator_for(cmd))));
    expr
}

fn statement(cmd: &ExecutionCommand) -> Option<String> {
    let value = cmd.value.as_deref().unwrap_or("");
    let line = match cmd.kind {
        CommandKind::Navigate => format!(
            "page.goto({}, wait_until=\"domcontentloaded\")",
            py(&cmd.target)
        ),
        CommandKind::Click => format!("safe_click(page, {})", locator_expr(cmd)),
        CommandKind::Type => {
            if cmd.target.is_empty() && cmd.selectors.as_ref().map_or(true, |b| b.is_empty()) {
                format!("page.keyboard.type({})", py(value))
            } else {
                format!("{}.fill({})", locator_expr(cmd), py(value))
            }
        }
        CommandKind::Select => format!("{}.select_option(label={})", locator_expr(cmd), py(value)),
        CommandKind::Press => format!("page.keyboard.press({})", py(&cmd.target)),
        CommandKind::Wait => {
            let ms = cmd.wait_ms();
            if ms == 0 {
                return None;
            }
            format!("page.wait_for_timeout({})", ms)
        }
    };
    Some(line)
}

pub(super) fn render(commands: &[ExecutionCommand], opts: &CompileOptions) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\"\"\"{}\"\"\"", opts.name.replace("\"\"\"", "'''"));
    out.push_str(HEADER);
    let _ = writeln!(out, "\nCLICK_DELAY_MS = {}", opts.click_delay_ms);
    out.push_str(SAFE_CLICK);
    out.push_str("\n\ndef run():\n");
    out.push_str("    with sync_playwright() as p:\n");
    let _ = writeln!(
        out,
        "        browser = p.chromium.launch(headless={})",
        if opts.headless { "True" } else { "False" }
    );
    out.push_str("        page = browser.new_page()\n");
    for cmd in commands {
        if let Some(line) = statement(cmd) {
            if !cmd.description.is_empty() {
                let _ = writeln!(out, "        # {}", cmd.description.replace('\n', " "));
            }
            let _ = writeln!(out, "        {}", line);
        }
    }
    out.push_str("        browser.close()\n");
    out.push_str("\n\nif __name__ == \"__main__\":\n    run()\n");
    out
}
