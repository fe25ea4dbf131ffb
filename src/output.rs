//! CLI output formatting and display helpers.

use std::collections::HashSet;
use std::fmt::Write as _;

use catexplorer_core::{CategoryTree, LoadedSet, NodeId, SelectionTracker, VisualState};

/// Returns terminal width from COLUMNS, or 80 if unset/invalid.
pub fn terminal_width() -> usize {
    std::env::var("COLUMNS")
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .filter(|width| *width >= 20)
        .unwrap_or(80)
}

/// Truncates text to at most `width` chars, appending ellipsis if truncated.
pub fn truncate_to_width(text: &str, width: usize) -> String {
    let text_len = text.chars().count();
    if text_len <= width {
        return text.to_string();
    }
    if width == 0 {
        return String::new();
    }
    if width == 1 {
        return "…".to_string();
    }

    let mut output: String = text.chars().take(width - 1).collect();
    output.push('…');
    output
}

/// Checkbox glyph for a visual state.
pub fn checkbox(state: VisualState) -> &'static str {
    match state {
        VisualState::None => "[ ]",
        VisualState::Some => "[~]",
        VisualState::All => "[x]",
        VisualState::Disabled => "[-]",
    }
}

/// Renders the explored category and every known descendant, one node per line.
///
/// Each line shows an expander (`+` unexpanded branch, `v` children known),
/// the checkbox, the label and the node id. Selected nodes with unexplored
/// child branches are marked `(incomplete)`.
pub fn render_tree(
    tree: &CategoryTree,
    selection: &SelectionTracker,
    loaded: &LoadedSet,
    width: usize,
) -> String {
    let mut out = String::new();
    let mut visited = HashSet::new();
    let mut stack = vec![(tree.top(), 0usize)];

    while let Some((id, depth)) = stack.pop() {
        if !visited.insert(id) {
            continue;
        }
        let Some(node) = tree.get(id) else {
            continue;
        };

        let expander = if node.has_children() {
            'v'
        } else if node.is_branch && !loaded.is_expanded(id) {
            '+'
        } else {
            ' '
        };
        let mut line = format!(
            "{}{expander} {} {} #{}",
            "  ".repeat(depth),
            checkbox(selection.visual_state(tree, id)),
            node.name,
            node.id
        );
        if selection.is_incomplete(tree, loaded, id) {
            line.push_str(" (incomplete)");
        }
        let _ = writeln!(out, "{}", truncate_to_width(&line, width));

        let children: Vec<NodeId> = tree.children_of(id).map(|child| child.id).collect();
        stack.extend(children.into_iter().rev().map(|child| (child, depth + 1)));
    }
    out
}
