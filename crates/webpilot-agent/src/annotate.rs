//! Screenshots with catalog indices drawn over the elements they name.

use serde::Serialize;
use tracing::debug;

use crate::driver::{js_arg, Driver};
use crate::{ElementDescriptor, Result, RoleHint};

#[derive(Serialize)]
struct Mark {
    i: usize,
    x: i32,
    y: i32,
    w: i32,
    h: i32,
    color: &'static str,
}

fn color(role: RoleHint) -> &'static str {
    match role {
        RoleHint::Input | RoleHint::Listbox => "37, 99, 235",
        RoleHint::Link => "22, 163, 74",
        RoleHint::Option => "147, 51, 234",
        RoleHint::Button | RoleHint::Other => "220, 38, 38",
    }
}

/// Draws one box and one index label per mark. Labels try four spots
/// around the box and take the first that does not cover an earlier label.
const OVERLAY_JS: &str = r#"((marks) => { /* wp:annotate */
    document.getElementById('__webpilot_overlay')?.remove();
    const root = document.createElement('div');
    root.id = '__webpilot_overlay';
    const vw = window.innerWidth, vh = window.innerHeight;
    const placed = [];
    const free = (x, y, w, h) => !placed.some(p => x < p[0] + p[2] && x + w > p[0] && y < p[1] + p[3] && y + h > p[1]);
    for (const m of marks) {
        const box = document.createElement('div');
        box.style.cssText = 'position:fixed;z-index:2147483646;pointer-events:none;border:1.5px solid rgba(' + m.color + ',0.75);'
            + 'left:' + m.x + 'px;top:' + m.y + 'px;width:' + m.w + 'px;height:' + m.h + 'px';
        root.appendChild(box);

        const w = String(m.i).length * 7 + 8, h = 14;
        const cx = v => Math.max(0, Math.min(v, vw - w));
        const cy = v => Math.max(0, Math.min(v, vh - h));
        const spots = [[cx(m.x), cy(m.y - h - 1)], [cx(m.x + m.w - w), cy(m.y - h - 1)], [cx(m.x), cy(m.y + m.h + 1)], [cx(m.x + 2), cy(m.y + 2)]];
        const [x, y] = spots.find(([x, y]) => free(x, y, w, h)) || spots[0];
        placed.push([x, y, w, h]);

        const label = document.createElement('div');
        label.style.cssText = 'position:fixed;z-index:2147483647;pointer-events:none;white-space:nowrap;'
            + 'font:bold 10px/12px monospace;color:#fff;padding:1px 3px;border-radius:2px;'
            + 'background:rgba(' + m.color + ',0.9);left:' + x + 'px;top:' + y + 'px';
        label.textContent = String(m.i);
        root.appendChild(label);
    }
    document.body.appendChild(root);
    return marks.length;
})"#;

const CLEANUP_JS: &str = "document.getElementById('__webpilot_overlay')?.remove() /* wp:annotate-cleanup */";

/// Screenshot with numbered overlays on every visible element. The overlay is
/// removed again before returning, whether or not the capture worked.
pub async fn annotated_screenshot(driver: &dyn Driver, elements: &[ElementDescriptor]) -> Result<Vec<u8>> {
    let marks: Vec<Mark> = elements
        .iter()
        .filter(|el| el.visible && el.bbox.width > 0.0 && el.bbox.height > 0.0)
        .map(|el| Mark {
            i: el.index,
            x: el.bbox.x.round() as i32,
            y: el.bbox.y.round() as i32,
            w: el.bbox.width.round() as i32,
            h: el.bbox.height.round() as i32,
            color: color(el.role),
        })
        .collect();
    if marks.is_empty() {
        return driver.screenshot().await;
    }

    driver.evaluate(&format!("{}({})", OVERLAY_JS, js_arg(&marks))).await?;
    driver.wait(50).await;
    let png = driver.screenshot().await;
    if let Err(e) = driver.evaluate(CLEANUP_JS).await {
        debug!("overlay cleanup failed: {}", e);
    }
    png
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{element, MockDriver};
    use serde_json::json;

    #[tokio::test]
    async fn test_plain_screenshot_without_visible_elements() {
        let driver = MockDriver::new();
        let mut hidden = element(0, "button", "Go");
        hidden.visible = false;
        let png = annotated_screenshot(&driver, &[hidden]).await.unwrap();
        assert!(png.starts_with(&[0x89, b'P']));
        assert!(driver.calls().is_empty());
    }

    #[tokio::test]
    async fn test_overlay_added_and_removed() {
        let driver = MockDriver::new();
        driver.on("wp:annotate-cleanup", json!(null));
        driver.on("wp:annotate", json!(2));
        let png = annotated_screenshot(&driver, &[element(0, "a", "Home"), element(1, "input", "")])
            .await
            .unwrap();
        assert!(!png.is_empty());
        assert_eq!(driver.evaluated("wp:annotate"), 1);
        assert_eq!(driver.evaluated("wp:annotate-cleanup"), 1);
    }

    #[test]
    fn test_role_colors_differ() {
        assert_ne!(color(RoleHint::Link), color(RoleHint::Button));
        assert_eq!(color(RoleHint::Input), color(RoleHint::Listbox));
    }
}
