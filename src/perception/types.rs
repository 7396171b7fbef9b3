use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static BOUNDS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[(\d+),(\d+)\]\[(\d+),(\d+)\]").expect("bounds regex"));

/// Index of a node inside its [`UiTree`] arena.
pub type NodeId = usize;

/// Screen rectangle in device pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Bounds {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self { left, top, right, bottom }
    }

    /// Parses the `[l,t][r,b]` form used by UI dumps.
    pub fn parse(raw: &str) -> Option<Self> {
        let caps = BOUNDS_RE.captures(raw)?;
        let mut values = [0i32; 4];
        for (slot, value) in values.iter_mut().enumerate() {
            *value = caps.get(slot + 1)?.as_str().parse().ok()?;
        }
        Some(Self::new(values[0], values[1], values[2], values[3]))
    }

    pub fn center(&self) -> (i32, i32) {
        ((self.left + self.right) / 2, (self.top + self.bottom) / 2)
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    /// True when the two rectangles share at least one pixel.
    pub fn overlaps(&self, other: &Bounds) -> bool {
        self.left < other.right
            && other.left < self.right
            && self.top < other.bottom
            && other.top < self.bottom
    }

    pub fn contains_point(&self, x: i32, y: i32) -> bool {
        x >= self.left && x <= self.right && y >= self.top && y <= self.bottom
    }

    pub fn union(&self, other: &Bounds) -> Bounds {
        Bounds::new(
            self.left.min(other.left),
            self.top.min(other.top),
            self.right.max(other.right),
            self.bottom.max(other.bottom),
        )
    }
}

/// One element of a UI dump.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UiNode {
    pub attributes: BTreeMap<String, String>,
    pub children: Vec<NodeId>,
    /// Lookup link only; the arena owns every node.
    pub parent: Option<NodeId>,
}

impl UiNode {
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// `Some(true/false)` for an explicit boolean attribute, `None` when absent.
    pub fn flag(&self, key: &str) -> Option<bool> {
        match self.attr(key)?.trim() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        }
    }

    pub fn is_set(&self, key: &str) -> bool {
        self.flag(key).unwrap_or(false)
    }

    pub fn text(&self) -> &str {
        self.attr("text").unwrap_or("").trim()
    }

    pub fn content_desc(&self) -> &str {
        self.attr("content-desc").unwrap_or("").trim()
    }

    pub fn resource_id(&self) -> &str {
        self.attr("resource-id").unwrap_or("").trim()
    }

    pub fn class_name(&self) -> &str {
        self.attr("class").unwrap_or("")
    }

    /// Class name without its package, e.g. `Button` for `android.widget.Button`.
    pub fn simple_class(&self) -> &str {
        self.class_name().rsplit('.').next().unwrap_or("")
    }

    /// Resource id without the `package:id/` prefix.
    pub fn short_resource_id(&self) -> &str {
        let id = self.resource_id();
        id.rsplit_once(":id/").map(|(_, name)| name).unwrap_or(id)
    }

    /// Literal text wins over the content description.
    pub fn visible_text(&self) -> &str {
        let text = self.text();
        if text.is_empty() {
            self.content_desc()
        } else {
            text
        }
    }

    pub fn bounds_raw(&self) -> Option<&str> {
        self.attr("bounds")
    }

    pub fn bounds(&self) -> Option<Bounds> {
        self.bounds_raw().and_then(Bounds::parse)
    }

    pub fn is_text_input(&self) -> bool {
        let class = self.simple_class();
        class.contains("EditText") || class.contains("AutoCompleteTextView") || class == "SearchView"
    }

    /// The automation layer may act on this node.
    pub fn is_interactive(&self) -> bool {
        if self.flag("enabled") == Some(false) {
            return false;
        }
        self.is_set("clickable")
            || self.is_set("long-clickable")
            || self.is_set("checkable")
            || self.is_set("scrollable")
            || self.is_text_input()
            || self.is_set("password")
            || self.is_set("focusable")
    }

    /// Stable identity used for the "new since last screen" marker.
    pub fn identity_key(&self) -> String {
        format!("{}|{}|{}", self.text(), self.resource_id(), self.class_name())
    }
}

/// Arena-backed UI tree. Children are ordered; `roots` keeps document order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UiTree {
    nodes: Vec<UiNode>,
    roots: Vec<NodeId>,
}

impl UiTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a node under `parent` (or as a new root) and return its id.
    pub fn push(&mut self, attributes: BTreeMap<String, String>, parent: Option<NodeId>) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(UiNode {
            attributes,
            children: Vec::new(),
            parent,
        });
        match parent {
            Some(p) => self.nodes[p].children.push(id),
            None => self.roots.push(id),
        }
        id
    }

    pub fn node(&self, id: NodeId) -> Option<&UiNode> {
        self.nodes.get(id)
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node ids in pre-order (document order).
    pub fn preorder(&self) -> Vec<NodeId> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<NodeId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            out.push(id);
            if let Some(node) = self.nodes.get(id) {
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }

    /// Union of the root bounds, used when no screen size is configured.
    pub fn root_extent(&self) -> Option<Bounds> {
        self.roots
            .iter()
            .filter_map(|&id| self.nodes.get(id).and_then(UiNode::bounds))
            .reduce(|acc, b| acc.union(&b))
    }
}

/// Immutable result of one perception cycle.
///
/// The index table points into `tree` and is only meaningful for the decide/act
/// cycle that receives this value; a new analysis starts numbering from 1 again.
#[derive(Debug, Clone)]
pub struct ScreenAnalysis {
    pub analysis_id: String,
    pub ui_representation: String,
    pub tree: UiTree,
    /// `elements[i]` is the node rendered as `[i + 1]`.
    pub elements: Vec<NodeId>,
    pub keyboard_visible: bool,
    pub foreground_activity: String,
    pub pixels_above: u32,
    pub pixels_below: u32,
    pub degraded: bool,
}

impl ScreenAnalysis {
    pub fn element(&self, index: u32) -> Option<&UiNode> {
        let slot = (index as usize).checked_sub(1)?;
        let id = *self.elements.get(slot)?;
        self.tree.node(id)
    }

    pub fn element_count(&self) -> usize {
        self.elements.len()
    }
}
