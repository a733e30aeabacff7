//! Arena-backed forest assembled from flat menu or permission rows.
//!
//! Assembly never fails: a row whose parent is itself, missing, or part of a
//! parent loop is placed as a root. Siblings are ordered `sort, id`.

use std::collections::{HashMap, HashSet};

use crate::types::{Menu, Permission};

/// A row that knows its place in a tree.
pub trait TreeNode {
    fn node_id(&self) -> i64;
    fn parent_node_id(&self) -> Option<i64>;
    fn sort_key(&self) -> i64;
}

impl TreeNode for Menu {
    fn node_id(&self) -> i64 {
        self.id.0
    }

    fn parent_node_id(&self) -> Option<i64> {
        self.parent_id.map(|p| p.0)
    }

    fn sort_key(&self) -> i64 {
        self.sort
    }
}

impl TreeNode for Permission {
    fn node_id(&self) -> i64 {
        self.id.0
    }

    fn parent_node_id(&self) -> Option<i64> {
        self.parent_id.map(|p| p.0)
    }

    fn sort_key(&self) -> i64 {
        self.sort
    }
}

#[derive(Debug, Clone)]
pub struct Forest<T> {
    nodes: Vec<T>,
    index: HashMap<i64, usize>,
    children: Vec<Vec<usize>>,
    roots: Vec<usize>,
}

impl<T: TreeNode> Forest<T> {
    pub fn build(rows: Vec<T>) -> Self {
        let index: HashMap<i64, usize> = rows
            .iter()
            .enumerate()
            .map(|(slot, row)| (row.node_id(), slot))
            .collect();

        let mut children = vec![Vec::new(); rows.len()];
        let mut roots = Vec::new();
        for (slot, row) in rows.iter().enumerate() {
            match row.parent_node_id().and_then(|p| index.get(&p).copied()) {
                Some(parent)
                    if parent != slot && !Self::loops_back(&rows, &index, slot, parent) =>
                {
                    children[parent].push(slot);
                }
                _ => roots.push(slot),
            }
        }

        let order = |a: &usize, b: &usize| {
            let (a, b) = (&rows[*a], &rows[*b]);
            (a.sort_key(), a.node_id()).cmp(&(b.sort_key(), b.node_id()))
        };
        roots.sort_by(order);
        for list in &mut children {
            list.sort_by(order);
        }

        Self {
            nodes: rows,
            index,
            children,
            roots,
        }
    }

    /// Does the stored parent chain above `parent` reach `slot` or repeat?
    fn loops_back(rows: &[T], index: &HashMap<i64, usize>, slot: usize, parent: usize) -> bool {
        let mut seen = HashSet::new();
        let mut cursor = Some(parent);
        while let Some(current) = cursor {
            if current == slot || !seen.insert(current) {
                return true;
            }
            cursor = rows[current]
                .parent_node_id()
                .and_then(|p| index.get(&p).copied());
        }
        false
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: i64) -> Option<&T> {
        self.index.get(&id).map(|&slot| &self.nodes[slot])
    }

    pub fn roots(&self) -> impl Iterator<Item = &T> {
        self.roots.iter().map(|&slot| &self.nodes[slot])
    }

    /// Direct children of `id` in sibling order; empty for unknown ids.
    pub fn children(&self, id: i64) -> impl Iterator<Item = &T> {
        self.index
            .get(&id)
            .map(|&slot| self.children[slot].as_slice())
            .unwrap_or_default()
            .iter()
            .map(|&slot| &self.nodes[slot])
    }

    /// Depth-first pre-order walk with each node's depth (roots are 0).
    pub fn walk(&self) -> Vec<(usize, &T)> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<(usize, usize)> = self.roots.iter().rev().map(|&s| (0, s)).collect();
        while let Some((depth, slot)) = stack.pop() {
            out.push((depth, &self.nodes[slot]));
            stack.extend(self.children[slot].iter().rev().map(|&c| (depth + 1, c)));
        }
        out
    }

    /// Every id in pre-order.
    pub fn collect_ids(&self) -> Vec<i64> {
        self.walk().into_iter().map(|(_, n)| n.node_id()).collect()
    }
}
