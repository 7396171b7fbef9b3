/// Perception pipeline: reads the device through [`Eyes`], then parses, prunes
/// and renders the hierarchy into a [`ScreenAnalysis`].
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::perception::parser::parse_ui_tree;
use crate::perception::pruner::prune_tree;
use crate::perception::renderer::render_tree;
use crate::perception::traits::Eyes;
use crate::perception::types::{Bounds, ScreenAnalysis, UiTree};

/// Representation used when nothing on screen survives rendering.
pub const EMPTY_SCREEN: &str = "The screen is empty.";
/// Single-node tree shown when the screen reader cannot be reached.
pub const READER_UNAVAILABLE: &str = "Screen reader service is not available";

const START_OF_PAGE: &str = "[Start of page]";
const END_OF_PAGE: &str = "[End of page]";
const FALLBACK_VIEWPORT: Bounds = Bounds {
    left: 0,
    top: 0,
    right: 1080,
    bottom: 2400,
};

pub struct ScreenPerceiver {
    eyes: Arc<dyn Eyes>,
    viewport: Option<Bounds>,
    previous_keys: HashSet<String>,
}

impl ScreenPerceiver {
    /// `screen_size` overrides the viewport otherwise derived from each dump.
    pub fn new(eyes: Arc<dyn Eyes>, screen_size: Option<(i32, i32)>) -> Self {
        Self {
            eyes,
            viewport: screen_size.map(|(w, h)| Bounds::new(0, 0, w, h)),
            previous_keys: HashSet::new(),
        }
    }

    /// Forget which elements were on screen; the next listing carries no markers.
    pub fn reset(&mut self) {
        self.previous_keys.clear();
    }

    /// Run one perception cycle. Never fails: an unreadable screen degrades to
    /// a placeholder, an empty one to [`EMPTY_SCREEN`].
    pub async fn perceive(&mut self) -> ScreenAnalysis {
        let (raw, keyboard_visible, foreground_activity) = tokio::join!(
            self.eyes.raw_tree(),
            self.eyes.keyboard_visible(),
            self.eyes.foreground_activity(),
        );

        let (source, degraded) = match raw {
            Some(raw) => (parse_ui_tree(&raw), false),
            None => {
                tracing::warn!("screen reader unavailable, using placeholder tree");
                let viewport = self.viewport.unwrap_or(FALLBACK_VIEWPORT);
                (Some(placeholder_tree(&viewport)), true)
            }
        };

        let analysis_id = uuid::Uuid::new_v4().to_string();
        let Some(source) = source else {
            tracing::debug!("UI dump empty or malformed");
            self.previous_keys.clear();
            return ScreenAnalysis {
                analysis_id,
                ui_representation: EMPTY_SCREEN.to_string(),
                tree: UiTree::new(),
                elements: Vec::new(),
                keyboard_visible,
                foreground_activity,
                pixels_above: 0,
                pixels_below: 0,
                degraded,
            };
        };

        let viewport = self
            .viewport
            .or_else(|| source.root_extent())
            .unwrap_or(FALLBACK_VIEWPORT);
        let (pixels_above, pixels_below) = scroll_extent(&source, &viewport);

        let tree = prune_tree(&source, &viewport);
        let rendered = render_tree(&tree, &self.previous_keys);
        self.previous_keys = rendered.seen_keys;

        let ui_representation = if rendered.listing.trim().is_empty() {
            EMPTY_SCREEN.to_string()
        } else {
            frame_listing(&rendered.listing, pixels_above, pixels_below)
        };

        tracing::debug!(
            analysis_id = %analysis_id,
            elements = rendered.elements.len(),
            pixels_above,
            pixels_below,
            degraded,
            "screen analysed"
        );

        ScreenAnalysis {
            analysis_id,
            ui_representation,
            tree,
            elements: rendered.elements,
            keyboard_visible,
            foreground_activity,
            pixels_above,
            pixels_below,
            degraded,
        }
    }
}

/// Wrap a listing with the page-position markers.
pub fn frame_listing(listing: &str, pixels_above: u32, pixels_below: u32) -> String {
    let header = if pixels_above > 0 {
        format!("... {pixels_above} pixels above - scroll up to see more ...")
    } else {
        START_OF_PAGE.to_string()
    };
    let footer = if pixels_below > 0 {
        format!("... {pixels_below} pixels below - scroll down to see more ...")
    } else {
        END_OF_PAGE.to_string()
    };
    format!("{header}\n{listing}\n{footer}")
}

/// Content extending past the viewport edges, in pixels.
fn scroll_extent(tree: &UiTree, viewport: &Bounds) -> (u32, u32) {
    let mut min_top = viewport.top;
    let mut max_bottom = viewport.bottom;
    for id in tree.preorder() {
        if let Some(b) = tree.node(id).and_then(|n| n.bounds()) {
            min_top = min_top.min(b.top);
            max_bottom = max_bottom.max(b.bottom);
        }
    }
    let above = (viewport.top - min_top).max(0) as u32;
    let below = (max_bottom - viewport.bottom).max(0) as u32;
    (above, below)
}

fn placeholder_tree(viewport: &Bounds) -> UiTree {
    let mut tree = UiTree::new();
    let attributes: BTreeMap<String, String> = [
        ("class", "android.widget.TextView"),
        ("text", READER_UNAVAILABLE),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .chain(std::iter::once((
        "bounds".to_string(),
        format!(
            "[{},{}][{},{}]",
            viewport.left, viewport.top, viewport.right, viewport.bottom
        ),
    )))
    .collect();
    tree.push(attributes, None);
    tree
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FixedEyes(Option<String>);

    #[async_trait]
    impl Eyes for FixedEyes {
        async fn raw_tree(&self) -> Option<String> {
            self.0.clone()
        }
        async fn keyboard_visible(&self) -> bool {
            true
        }
        async fn foreground_activity(&self) -> String {
            "com.example/.Main".into()
        }
    }

    fn perceiver(raw: Option<&str>) -> ScreenPerceiver {
        ScreenPerceiver::new(Arc::new(FixedEyes(raw.map(str::to_string))), Some((1080, 2400)))
    }

    #[tokio::test]
    async fn test_empty_dump_yields_sentinel() {
        let analysis = perceiver(Some("")).perceive().await;
        assert_eq!(analysis.ui_representation, EMPTY_SCREEN);
        assert_eq!(analysis.element_count(), 0);
        assert!(!analysis.degraded);
    }

    #[tokio::test]
    async fn test_malformed_dump_yields_sentinel() {
        let analysis = perceiver(Some("<hierarchy><node")).perceive().await;
        assert_eq!(analysis.ui_representation, EMPTY_SCREEN);
    }

    #[tokio::test]
    async fn test_unavailable_reader_degrades_to_placeholder() {
        let analysis = perceiver(None).perceive().await;
        assert!(analysis.degraded);
        assert!(analysis.ui_representation.contains(READER_UNAVAILABLE));
        assert!(analysis.keyboard_visible);
        assert_eq!(analysis.foreground_activity, "com.example/.Main");
    }

    #[tokio::test]
    async fn test_framing_reports_scroll_extent() {
        let xml = r#"<hierarchy>
          <node class="Root" bounds="[0,0][1080,2400]">
            <node text="Row" clickable="true" bounds="[0,100][1080,200]"/>
            <node text="below" bounds="[0,2400][1080,3000]"/>
          </node>
        </hierarchy>"#;
        let analysis = perceiver(Some(xml)).perceive().await;
        let lines: Vec<&str> = analysis.ui_representation.lines().collect();
        assert_eq!(lines[0], "[Start of page]");
        assert_eq!(*lines.last().unwrap(), "... 600 pixels below - scroll down to see more ...");
        assert!(!analysis.ui_representation.contains("below\n"));
        assert_eq!(analysis.element_count(), 1);
    }

    #[test]
    fn test_frame_listing_above() {
        let framed = frame_listing("x", 300, 0);
        assert_eq!(framed, "... 300 pixels above - scroll up to see more ...\nx\n[End of page]");
    }

    #[tokio::test]
    async fn test_page_fits_on_screen() {
        let xml = r#"<hierarchy><node text="Only" clickable="true" bounds="[0,0][100,100]"/></hierarchy>"#;
        let analysis = perceiver(Some(xml)).perceive().await;
        assert!(analysis.ui_representation.starts_with("[Start of page]\n"));
        assert!(analysis.ui_representation.ends_with("\n[End of page]"));
    }

    #[tokio::test]
    async fn test_analysis_ids_are_fresh() {
        let mut p = perceiver(Some(""));
        let a = p.perceive().await;
        let b = p.perceive().await;
        assert_ne!(a.analysis_id, b.analysis_id);
    }
}
