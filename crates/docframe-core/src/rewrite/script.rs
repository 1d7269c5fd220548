//! In-document page-select control injected in place of the converter's own
//! navigation script.
//!
//! The converter's script navigates the top-level window, which a sandboxed
//! blob-backed frame cannot do. This replacement scrolls in place for anchor
//! targets and posts a navigation message to the host for everything else.

use crate::bridge::NAVIGATION_MESSAGE_TYPE;

const DEF_PAGE: &str = "__DEF_PAGE__";
const MESSAGE_TYPE: &str = "__MESSAGE_TYPE__";

const TEMPLATE: &str = r#"
var defPage=__DEF_PAGE__;var firstPage=1;var lastPage;var _p;
function CurUrl() {return _p.options[_p.selectedIndex].value;}
function CurPage() {return _p.selectedIndex+firstPage;}
function SetPage(pg) {
    _p.options.selectedIndex=pg-firstPage;
    _p.options[pg-firstPage].selected=true;
}
function FindPage(val) {
    var pg=defPage;
    var i,c;
    c=_p.options.length;
    for (i=0;i<c;i++){
        if (_p.options[i].label==val) {
            pg=i+firstPage;
            break;
        }
    }
    return pg;
}
function Go() {
    var url=CurUrl();
    if (url.startsWith('#')) {
        var factor=Number(document.body.style.getPropertyValue('--factor')) || 1;
        var target=document.getElementById(url.slice(1));
        if (!target) return;
        var el=target.parentElement || target;
        window.scrollTo({ top: el.offsetTop * factor });
    } else {
        window.parent.postMessage({ type: '__MESSAGE_TYPE__', url: url, page: (_p.selectedIndex + 1) }, '*');
    }
}
function GoF() {SetPage(firstPage);Go();}
function GoL() {SetPage(lastPage);Go();}
function GoP() {var pg=CurPage();if (pg<=firstPage) return;pg=pg-1;SetPage(pg);Go();}
function GoN() {var pg=CurPage();if (pg>=lastPage) return;pg=pg+1;SetPage(pg);Go();}
function Init()
{
    _p=document.getElementById("pages");
    if (_p !== null) {
        lastPage=_p.length;
        var pg=FindPage(String(defPage));
        SetPage(pg);
        Go();
    }
}
"#;

/// Names of the functions the control script defines, in declaration order.
pub const CONTROL_FUNCTIONS: [&str; 10] = [
    "CurUrl", "CurPage", "SetPage", "FindPage", "Go", "GoF", "GoL", "GoP", "GoN", "Init",
];

/// Render the control script selecting `page` on initialization.
pub fn control_script(page: u32) -> String {
    TEMPLATE
        .replace(DEF_PAGE, &page.max(1).to_string())
        .replace(MESSAGE_TYPE, NAVIGATION_MESSAGE_TYPE)
}

/// Read back the `defPage` a rendered control script was generated with.
pub fn default_page(script: &str) -> Option<u32> {
    let rest = script.split("var defPage=").nth(1)?;
    let end = rest.find(';')?;
    rest[..end].trim().parse().ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_script_defines_every_control_function() {
        let script = control_script(3);
        for name in CONTROL_FUNCTIONS {
            assert!(
                script.contains(&format!("function {name}(")),
                "missing {name}"
            );
        }
    }

    #[test]
    fn test_script_carries_page_and_protocol_tag() {
        let script = control_script(12);
        assert_eq!(default_page(&script), Some(12));
        assert!(script.contains("type: 'page-navigation'"));
        assert!(!script.contains("__"));
    }

    #[test]
    fn test_page_zero_is_clamped() {
        assert_eq!(default_page(&control_script(0)), Some(1));
    }

    #[test]
    fn test_anchor_navigation_reads_factor() {
        let script = control_script(1);
        assert!(script.contains("getPropertyValue('--factor')) || 1"));
        assert!(script.contains("url.startsWith('#')"));
    }
}
