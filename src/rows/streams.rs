use anyhow::{bail, Result};

use super::OutputRow;
use crate::model::Stream;

/// Flattens a stream forest into one row per node.
///
/// Pre-order: every parent row precedes its descendants, siblings keep their
/// remote order. Traversal uses an explicit stack, and trees deeper than
/// `max_depth` (roots are depth 0) are rejected as malformed rather than
/// partially emitted.
pub fn flatten_streams(
    roots: &[Stream],
    username: Option<&str>,
    max_depth: usize,
) -> Result<Vec<OutputRow>> {
    let mut rows = Vec::new();
    let mut stack: Vec<(&Stream, usize)> = roots.iter().rev().map(|s| (s, 0)).collect();

    while let Some((stream, depth)) = stack.pop() {
        if depth > max_depth {
            bail!(
                "Stream '{}' is nested deeper than {} levels",
                stream.id,
                max_depth
            );
        }

        let mut row = OutputRow::new();
        if let Some(username) = username {
            row.insert("username", username);
        }
        row.insert("id", stream.id.as_str());
        row.insert("parentId", stream.parent_id.clone());
        row.insert("name", stream.name.as_str());
        rows.push(row);

        stack.extend(stream.children.iter().rev().map(|c| (c, depth + 1)));
    }

    Ok(rows)
}
