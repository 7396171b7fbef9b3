//! Streaming parser for `uiautomator`-style hierarchy dumps.
//!
//! Only `node` elements become tree nodes; every other tag (`hierarchy`, vendor
//! extensions) is skipped. Malformed input yields `None` rather than an error so
//! perception can fall back to an empty-screen analysis.

use std::collections::BTreeMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::perception::types::{NodeId, UiTree};

const NODE_TAG: &[u8] = b"node";

/// Replace exotic whitespace with plain spaces and drop zero-width characters.
pub fn normalize_whitespace(raw: &str) -> String {
    raw.chars()
        .filter_map(|c| match c {
            '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}' | '\u{FEFF}' => None,
            '\u{00A0}' | '\u{1680}' | '\u{2000}'..='\u{200A}' | '\u{2028}' | '\u{2029}'
            | '\u{202F}' | '\u{205F}' | '\u{3000}' => Some(' '),
            other => Some(other),
        })
        .collect()
}

/// Parse a raw dump into a [`UiTree`]. Returns `None` for blank, malformed, or
/// node-less input.
pub fn parse_ui_tree(raw: &str) -> Option<UiTree> {
    let normalized = normalize_whitespace(raw);
    if normalized.trim().is_empty() {
        return None;
    }

    let mut reader = Reader::from_str(&normalized);
    reader.config_mut().trim_text(true);

    let mut tree = UiTree::new();
    let mut stack: Vec<NodeId> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.name().as_ref() == NODE_TAG => {
                let id = tree.push(read_attributes(&e), stack.last().copied());
                stack.push(id);
            }
            Ok(Event::Empty(e)) if e.name().as_ref() == NODE_TAG => {
                tree.push(read_attributes(&e), stack.last().copied());
            }
            Ok(Event::End(e)) if e.name().as_ref() == NODE_TAG => {
                if stack.pop().is_none() {
                    tracing::debug!("unbalanced node close tag in UI dump");
                    return None;
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(error = %e, position = reader.buffer_position(), "UI dump parse failed");
                return None;
            }
        }
    }

    if !stack.is_empty() {
        tracing::debug!(open = stack.len(), "UI dump ended with unclosed nodes");
        return None;
    }
    if tree.is_empty() {
        return None;
    }
    Some(tree)
}

fn read_attributes(element: &BytesStart<'_>) -> BTreeMap<String, String> {
    let mut attributes = BTreeMap::new();
    for attr in element.attributes() {
        let attr = match attr {
            Ok(a) => a,
            Err(e) => {
                tracing::debug!(error = %e, "skipping malformed attribute");
                continue;
            }
        };
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = match attr.unescape_value() {
            Ok(v) => v.into_owned(),
            Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
        };
        attributes.insert(key, value);
    }
    attributes
}
