use crate::core::config::IndexConfig;
use crate::core::segment::Segment;
use crate::index::geometry::Mbr;
use crate::transform::dft::SpectralLayout;

/// An immutable `(segment, geometry)` pair stored in leaf nodes.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Entry {
    pub segment: Segment,
    pub mbr: Mbr,
}

impl Entry {
    pub fn new(segment: Segment, mbr: Mbr) -> Self {
        Self { segment, mbr }
    }
}

/// A tree node: leaves hold entries, non-leaves hold child nodes. The
/// variant set is closed, so traversal code matches exhaustively.
///
/// Enclosure invariant: a node's geometry is the union of its children's
/// geometries, and therefore encloses every descendant entry. Nodes never
/// change after construction; ownership flows strictly parent to child (no
/// upward pointers).
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Node {
    Leaf {
        id: u32,
        mbr: Mbr,
        entries: Vec<Entry>,
    },
    NonLeaf {
        id: u32,
        mbr: Mbr,
        children: Vec<Node>,
    },
}

impl Node {
    /// Build a leaf; its geometry is the union of the entry geometries.
    ///
    /// # Panics
    /// Panics if `entries` is empty.
    pub fn leaf(id: u32, entries: Vec<Entry>) -> Self {
        assert!(!entries.is_empty(), "Leaf must hold at least one entry");
        let mut mbr = entries[0].mbr.clone();
        for e in &entries[1..] {
            mbr = mbr.union(&e.mbr);
        }
        Self::Leaf { id, mbr, entries }
    }

    /// Build a non-leaf; its geometry is the union of the child geometries.
    ///
    /// # Panics
    /// Panics if `children` is empty.
    pub fn non_leaf(id: u32, children: Vec<Node>) -> Self {
        assert!(!children.is_empty(), "Non-leaf must hold at least one child");
        let mut mbr = children[0].mbr().clone();
        for c in &children[1..] {
            mbr = mbr.union(c.mbr());
        }
        Self::NonLeaf { id, mbr, children }
    }

    pub fn id(&self) -> u32 {
        match self {
            Self::Leaf { id, .. } | Self::NonLeaf { id, .. } => *id,
        }
    }

    pub fn mbr(&self) -> &Mbr {
        match self {
            Self::Leaf { mbr, .. } | Self::NonLeaf { mbr, .. } => mbr,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Self::Leaf { .. })
    }

    /// Number of direct children (entries for a leaf, nodes for a non-leaf).
    pub fn fanout(&self) -> usize {
        match self {
            Self::Leaf { entries, .. } => entries.len(),
            Self::NonLeaf { children, .. } => children.len(),
        }
    }

    /// Entries in this subtree.
    pub fn entry_count(&self) -> usize {
        match self {
            Self::Leaf { entries, .. } => entries.len(),
            Self::NonLeaf { children, .. } => children.iter().map(Self::entry_count).sum(),
        }
    }

    /// Height of this subtree (a leaf has height 1).
    pub fn height(&self) -> usize {
        match self {
            Self::Leaf { .. } => 1,
            Self::NonLeaf { children, .. } => {
                1 + children.iter().map(Self::height).max().unwrap_or(0)
            }
        }
    }

    /// Visit every entry in the subtree, depth-first.
    pub fn for_each_entry<'a>(&'a self, visit: &mut impl FnMut(&'a Entry)) {
        match self {
            Self::Leaf { entries, .. } => {
                for e in entries {
                    visit(e);
                }
            }
            Self::NonLeaf { children, .. } => {
                for c in children {
                    c.for_each_entry(visit);
                }
            }
        }
    }
}

/// A bulk-loaded, read-only index over candidate segments.
///
/// Built once per dataset and queried arbitrarily often; queries only ever
/// hold shared references, which is what makes concurrent searches safe
/// without locks.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Tree {
    pub(crate) root: Option<Node>,
    pub(crate) len: usize,
    pub(crate) node_count: u32,
    pub(crate) config: IndexConfig,
    pub(crate) layout: SpectralLayout,
}

impl Tree {
    pub fn root(&self) -> Option<&Node> {
        self.root.as_ref()
    }

    /// Total number of entries.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Total number of nodes (ids are `0..node_count`).
    pub fn node_count(&self) -> u32 {
        self.node_count
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn layout(&self) -> &SpectralLayout {
        &self.layout
    }

    /// Tree height (0 for an empty tree).
    pub fn height(&self) -> usize {
        self.root.as_ref().map_or(0, Node::height)
    }

    /// Visit every entry, depth-first.
    pub fn for_each_entry<'a>(&'a self, mut visit: impl FnMut(&'a Entry)) {
        if let Some(root) = &self.root {
            root.for_each_entry(&mut visit);
        }
    }
}
