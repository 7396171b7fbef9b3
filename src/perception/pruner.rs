//! Structural pruning of raw UI trees.
//!
//! Off-screen nodes are dropped first, then nodes that carry no meaning of
//! their own are flattened away so their surviving children move up to the
//! nearest kept ancestor. Relative order of survivors never changes.

use crate::perception::types::{Bounds, NodeId, UiNode, UiTree};

/// Surviving subtree expressed against the source arena.
struct Kept {
    source: NodeId,
    children: Vec<Kept>,
}

/// Return a new tree holding only visible, meaningful nodes.
pub fn prune_tree(tree: &UiTree, viewport: &Bounds) -> UiTree {
    let kept: Vec<Kept> = tree
        .roots()
        .iter()
        .flat_map(|&root| prune_node(tree, root, viewport))
        .collect();

    let mut pruned = UiTree::new();
    for subtree in &kept {
        materialize(tree, subtree, None, &mut pruned);
    }
    tracing::debug!(before = tree.len(), after = pruned.len(), "UI tree pruned");
    pruned
}

fn prune_node(tree: &UiTree, id: NodeId, viewport: &Bounds) -> Vec<Kept> {
    let Some(node) = tree.node(id) else {
        return Vec::new();
    };

    let children: Vec<Kept> = node
        .children
        .iter()
        .flat_map(|&child| prune_node(tree, child, viewport))
        .collect();

    let visible = node.bounds().is_some_and(|b| b.overlaps(viewport));
    if !visible {
        return children;
    }

    if is_important(node) || !children.is_empty() {
        vec![Kept { source: id, children }]
    } else {
        Vec::new()
    }
}

fn is_important(node: &UiNode) -> bool {
    node.is_interactive()
        || !node.resource_id().is_empty()
        || !node.text().is_empty()
        || !node.content_desc().is_empty()
}

fn materialize(source: &UiTree, kept: &Kept, parent: Option<NodeId>, out: &mut UiTree) {
    let Some(node) = source.node(kept.source) else {
        return;
    };
    let id = out.push(node.attributes.clone(), parent);
    for child in &kept.children {
        materialize(source, child, Some(id), out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perception::parser::parse_ui_tree;

    fn screen() -> Bounds {
        Bounds::new(0, 0, 1080, 2400)
    }

    fn texts(tree: &UiTree) -> Vec<String> {
        tree.preorder()
            .into_iter()
            .map(|id| {
                let n = tree.node(id).unwrap();
                format!("{}{}", n.visible_text(), n.short_resource_id())
            })
            .collect()
    }

    #[test]
    fn test_unimportant_wrappers_are_flattened() {
        let xml = r#"<hierarchy>
          <node class="FrameLayout" bounds="[0,0][1080,2400]">
            <node class="LinearLayout" bounds="[0,0][1080,1200]">
              <node text="Title" class="TextView" bounds="[0,0][1080,100]"/>
              <node class="View" bounds="[0,100][1080,200]"/>
            </node>
          </node>
        </hierarchy>"#;
        let tree = parse_ui_tree(xml).unwrap();
        let pruned = prune_tree(&tree, &screen());

        // Wrappers survive only because they still hold the title; the empty
        // View disappears.
        assert_eq!(pruned.len(), 3);
        assert_eq!(texts(&pruned).last().unwrap(), "Title");
    }

    #[test]
    fn test_invisible_node_dropped_but_children_kept() {
        let xml = r#"<hierarchy>
          <node class="Root" bounds="[0,0][1080,2400]">
            <node text="Offscreen parent" clickable="true" class="Layout" bounds="[2000,0][3000,100]">
              <node text="Visible child" class="TextView" bounds="[0,0][100,100]"/>
            </node>
          </node>
        </hierarchy>"#;
        let tree = parse_ui_tree(xml).unwrap();
        let pruned = prune_tree(&tree, &screen());
        let names = texts(&pruned);
        assert!(!names.iter().any(|t| t == "Offscreen parent"));
        assert!(names.iter().any(|t| t == "Visible child"));

        // The child is re-parented to the root.
        let child = pruned
            .preorder()
            .into_iter()
            .find(|&id| pruned.node(id).unwrap().text() == "Visible child")
            .unwrap();
        let parent = pruned.node(child).unwrap().parent.unwrap();
        assert_eq!(pruned.node(parent).unwrap().class_name(), "Root");
    }

    #[test]
    fn test_node_without_bounds_is_not_visible() {
        let xml = r#"<hierarchy><node text="no bounds" clickable="true"/></hierarchy>"#;
        let tree = parse_ui_tree(xml).unwrap();
        assert!(prune_tree(&tree, &screen()).is_empty());
    }

    #[test]
    fn test_resource_id_keeps_node() {
        let xml = r#"<hierarchy><node resource-id="app:id/toolbar" bounds="[0,0][10,10]"/></hierarchy>"#;
        let tree = parse_ui_tree(xml).unwrap();
        assert_eq!(prune_tree(&tree, &screen()).len(), 1);
    }

    #[test]
    fn test_order_is_subsequence_of_original() {
        let xml = r#"<hierarchy>
          <node class="Root" bounds="[0,0][1080,2400]">
            <node class="Wrap" bounds="[0,0][1080,600]">
              <node text="a" bounds="[0,0][10,10]"/>
              <node class="Noise" bounds="[0,10][10,20]"/>
              <node text="b" bounds="[0,20][10,30]"/>
            </node>
            <node text="c" bounds="[5000,0][6000,10]"/>
            <node class="Wrap" bounds="[0,600][1080,1200]">
              <node text="d" clickable="true" bounds="[0,600][10,610]"/>
            </node>
          </node>
        </hierarchy>"#;
        let tree = parse_ui_tree(xml).unwrap();
        let original: Vec<String> = tree
            .preorder()
            .into_iter()
            .map(|id| tree.node(id).unwrap().identity_key())
            .collect();
        let pruned = prune_tree(&tree, &screen());
        let survivors: Vec<String> = pruned
            .preorder()
            .into_iter()
            .map(|id| pruned.node(id).unwrap().identity_key())
            .collect();

        let mut cursor = original.iter();
        for key in &survivors {
            assert!(cursor.any(|k| k == key), "{key} out of order");
        }
        assert_eq!(
            texts(&pruned).into_iter().filter(|t| !t.is_empty()).collect::<Vec<_>>(),
            vec!["a", "b", "d"]
        );
    }

    #[test]
    fn test_pruning_is_repeatable() {
        let xml = r#"<hierarchy><node text="x" bounds="[0,0][10,10]"/></hierarchy>"#;
        let tree = parse_ui_tree(xml).unwrap();
        let first = prune_tree(&tree, &screen());
        let second = prune_tree(&tree, &screen());
        assert_eq!(first.len(), second.len());
    }
}
