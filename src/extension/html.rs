//! HTML querying behind the context's `load` function
//!
//! Scripts never see a DOM. `load(html)` keeps the markup on the script side
//! and every `$(selector)` call asks the host to run the CSS query with
//! `scraper`, returning flat snapshots of the matched elements. Nested
//! queries re-enter a snapshot's outer HTML.

use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::core::error::{ReelError, Result};

/// Snapshot of one matched element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HtmlNode {
    pub tag: String,
    /// Concatenated text of the element and its descendants
    pub text: String,
    pub inner_html: String,
    pub outer_html: String,
    pub attrs: HashMap<String, String>,
}

impl HtmlNode {
    fn from_element(element: ElementRef<'_>) -> Self {
        let value = element.value();
        Self {
            tag: value.name().to_string(),
            text: element.text().collect::<String>(),
            inner_html: element.inner_html(),
            outer_html: element.html(),
            attrs: value
                .attrs()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css)
        .map_err(|e| ReelError::Runtime(format!("invalid selector '{}': {:?}", css, e)))
}

/// Run a CSS query over a whole document
pub fn select(markup: &str, css: &str) -> Result<Vec<HtmlNode>> {
    let selector = selector(css)?;
    let document = Html::parse_document(markup);
    Ok(document.select(&selector).map(HtmlNode::from_element).collect())
}

/// Tag name at the start of an element's markup
fn leading_tag(outer_html: &str) -> String {
    outer_html
        .trim_start()
        .trim_start_matches('<')
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect::<String>()
        .to_ascii_lowercase()
}

/// Markup an element with this tag must sit in to survive fragment parsing
fn required_parents(tag: &str) -> (&'static str, &'static str) {
    match tag {
        "tr" => ("<table><tbody>", "</tbody></table>"),
        "td" | "th" => ("<table><tbody><tr>", "</tr></tbody></table>"),
        "tbody" | "thead" | "tfoot" | "caption" | "colgroup" => ("<table>", "</table>"),
        "col" => ("<table><colgroup>", "</colgroup></table>"),
        "option" | "optgroup" => ("<select>", "</select>"),
        _ => ("", ""),
    }
}

/// Parse a snapshot's markup back into a tree the element survives in
fn reparse(outer_html: &str, tag: &str) -> Html {
    match tag {
        "html" | "head" | "body" => Html::parse_document(outer_html),
        _ => {
            let (open, close) = required_parents(tag);
            Html::parse_fragment(&format!("{}{}{}", open, outer_html, close))
        }
    }
}

/// The snapshot element inside a reparsed tree
///
/// Wrapper parents never share the element's tag, so the first element with
/// that tag in document order is the snapshot itself.
fn snapshot_root<'a>(tree: &'a Html, tag: &str) -> Option<ElementRef<'a>> {
    tree.root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == tag)
}

/// Run a CSS query over the descendants of one element
///
/// `outer_html` is the element's own markup, as captured in an earlier
/// snapshot. The element itself never matches, only what is inside it.
pub fn select_within(outer_html: &str, css: &str) -> Result<Vec<HtmlNode>> {
    let selector = selector(css)?;
    let tag = leading_tag(outer_html);
    let tree = reparse(outer_html, &tag);
    let Some(element) = snapshot_root(&tree, &tag) else {
        return Ok(Vec::new());
    };
    Ok(element.select(&selector).map(HtmlNode::from_element).collect())
}

/// Whether the element captured in `outer_html` matches a selector
///
/// Only the element and its own subtree are known, so selectors that depend
/// on outer ancestors do not match.
pub fn matches(outer_html: &str, css: &str) -> Result<bool> {
    let selector = selector(css)?;
    let tag = leading_tag(outer_html);
    let tree = reparse(outer_html, &tag);
    Ok(snapshot_root(&tree, &tag).map_or(false, |el| selector.matches(&el)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
          <div class="film_list">
            <div class="item" data-id="1"><a href="/watch/1" title="Frieren">Frieren</a></div>
            <div class="item" data-id="2"><a href="/watch/2" title="Dandadan">Dandadan</a></div>
          </div>
        </body></html>
    "#;

    #[test]
    fn test_select_snapshots() {
        let nodes = select(PAGE, ".film_list .item").unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].tag, "div");
        assert_eq!(nodes[1].attr("data-id"), Some("2"));
        assert!(nodes[0].outer_html.starts_with("<div"));
        assert!(nodes[0].inner_html.contains("/watch/1"));
    }

    #[test]
    fn test_nested_query_on_fragment() {
        let item = select(PAGE, ".item").unwrap().remove(0);
        let links = select_within(&item.outer_html, "a").unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].attr("href"), Some("/watch/1"));
        assert_eq!(links[0].text, "Frieren");

        // the element itself is not part of its own descendants
        assert!(select_within(&item.outer_html, ".item").unwrap().is_empty());
    }

    #[test]
    fn test_invalid_selector() {
        assert!(matches!(select(PAGE, "div["), Err(ReelError::Runtime(_))));
        assert!(matches!(select_within("<p></p>", "!!"), Err(ReelError::Runtime(_))));
    }

    #[test]
    fn test_table_rows_keep_their_cells() {
        let page = r#"
            <table class="episodes"><tbody>
              <tr class="row"><td class="c">A</td><td class="c">B</td></tr>
              <tr class="row"><th>Header</th><td><select><option value="1">One</option></select></td></tr>
            </tbody></table>
        "#;

        let rows = select(page, "tr.row").unwrap();
        assert_eq!(rows.len(), 2);

        let cells = select_within(&rows[0].outer_html, "td").unwrap();
        assert_eq!(cells.len(), 2);
        assert_eq!(cells[1].text, "B");

        let cell = select_within(&rows[1].outer_html, "td").unwrap().remove(0);
        let options = select_within(&cell.outer_html, "option").unwrap();
        assert_eq!(options[0].attr("value"), Some("1"));

        let table = select(page, "table").unwrap().remove(0);
        assert_eq!(select_within(&table.outer_html, "td.c").unwrap().len(), 2);
        let body = select(page, "tbody").unwrap().remove(0);
        assert_eq!(select_within(&body.outer_html, "tr").unwrap().len(), 2);
    }

    #[test]
    fn test_whole_body_as_scope() {
        let body = select(PAGE, "body").unwrap().remove(0);
        assert_eq!(select_within(&body.outer_html, ".item").unwrap().len(), 2);
    }

    #[test]
    fn test_matches_snapshot() {
        let item = select(PAGE, ".item").unwrap().remove(1);
        assert!(matches(&item.outer_html, "div.item").unwrap());
        assert!(matches(&item.outer_html, "[data-id='2']").unwrap());
        assert!(!matches(&item.outer_html, "a").unwrap());

        let row = r#"<tr class="row"><td>A</td></tr>"#;
        assert!(matches(row, "tr.row").unwrap());
        assert!(matches("<td class=\"c\">A</td>", "td.c").unwrap());
        assert!(matches(&item.outer_html, "!!").is_err());
    }
}
