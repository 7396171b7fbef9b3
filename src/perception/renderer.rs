//! Text rendering of a pruned UI tree for the decision model.

use std::collections::HashSet;

use crate::errors::{DroidClawError, DroidClawResult};
use crate::perception::types::{NodeId, ScreenAnalysis, UiNode, UiTree};

/// Prefix for elements that were not on the previous screen.
pub const NEW_ELEMENT_MARKER: &str = "*";

const FLAG_LABELS: &[(&str, &str)] = &[
    ("clickable", "clickable"),
    ("long-clickable", "long-clickable"),
    ("checkable", "checkable"),
    ("checked", "checked"),
    ("scrollable", "scrollable"),
    ("focusable", "focusable"),
    ("focused", "focused"),
    ("password", "password"),
    ("selected", "selected"),
];

#[derive(Debug, Clone, Default)]
pub struct RenderOutput {
    pub listing: String,
    /// `elements[i]` is rendered as `[i + 1]`.
    pub elements: Vec<NodeId>,
    /// Identity keys of every rendered node, to feed into the next render.
    pub seen_keys: HashSet<String>,
}

/// Render `tree` depth-first. Indices restart at 1 on every call.
///
/// `previous_keys` holds the identity keys rendered on the previous screen; when
/// it is empty no node is marked as new.
pub fn render_tree(tree: &UiTree, previous_keys: &HashSet<String>) -> RenderOutput {
    let mut out = RenderOutput::default();
    let mut lines: Vec<String> = Vec::new();
    let mut stack: Vec<(NodeId, usize)> = tree.roots().iter().rev().map(|&id| (id, 0)).collect();

    while let Some((id, depth)) = stack.pop() {
        let Some(node) = tree.node(id) else { continue };
        stack.extend(node.children.iter().rev().map(|&c| (c, depth + 1)));

        let interactive = node.is_interactive();
        let visible_text = node.visible_text();
        if !interactive && visible_text.is_empty() {
            continue;
        }

        let key = node.identity_key();
        let marker = if !previous_keys.is_empty() && !previous_keys.contains(&key) {
            NEW_ELEMENT_MARKER
        } else {
            ""
        };
        out.seen_keys.insert(key);

        let indent = "\t".repeat(depth);
        if interactive {
            out.elements.push(id);
            let index = out.elements.len();
            lines.push(format!("{indent}{marker}{}", describe_element(index, node)));
        } else {
            lines.push(format!("{indent}{marker}{visible_text}"));
        }
    }

    out.listing = lines.join("\n");
    out
}

/// `[idx] text:"..." <resource-id> (<flags>) <class>`, with empty parts omitted.
pub fn describe_element(index: usize, node: &UiNode) -> String {
    let mut parts = vec![format!("[{index}]")];
    let visible = node.visible_text();
    if !visible.is_empty() {
        parts.push(format!("text:\"{visible}\""));
    }
    let resource = node.short_resource_id();
    if !resource.is_empty() {
        parts.push(resource.to_string());
    }
    let flags = extra_info(node);
    if !flags.is_empty() {
        parts.push(format!("({flags})"));
    }
    let class = node.simple_class();
    if !class.is_empty() {
        parts.push(class.to_string());
    }
    parts.join(" ")
}

fn extra_info(node: &UiNode) -> String {
    let mut flags: Vec<&str> = FLAG_LABELS
        .iter()
        .filter(|(attr, _)| node.is_set(attr))
        .map(|(_, label)| *label)
        .collect();
    if node.is_text_input() {
        flags.push("editable");
    }
    flags.join(", ")
}

/// Short human label for memory lines: text, else resource id, else class.
pub fn element_label(node: &UiNode) -> String {
    let text = node.visible_text();
    if !text.is_empty() {
        return format!("'{text}'");
    }
    let resource = node.short_resource_id();
    if !resource.is_empty() {
        return format!("'{resource}'");
    }
    node.simple_class().to_string()
}

/// Midpoint of the element at `index` in this analysis.
pub fn resolve_tap_point(analysis: &ScreenAnalysis, index: u32) -> DroidClawResult<(i32, i32)> {
    let node = analysis
        .element(index)
        .ok_or(DroidClawError::ElementNotFound(index))?;
    let bounds = node.bounds().ok_or(DroidClawError::NoBounds(index))?;
    Ok(bounds.center())
}
