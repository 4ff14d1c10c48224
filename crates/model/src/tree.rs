use std::{collections::VecDeque, fmt};

use time::OffsetDateTime;

use crate::{params::LAST_FOUR, ParticipantId};

/// Pool level, starting from `1`.
pub type PoolLevel = u8;

/// Node id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

/// Tree id: pool level and the sequence number of the tree within that level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TreeId {
    /// Pool level.
    pub level: PoolLevel,
    /// Tree number, starting from `1`.
    pub number: u32,
}

impl fmt::Display for TreeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}/T{}", self.level, self.number)
    }
}

/// Position of a node under its parent.
#[derive(
    Debug,
    Clone,
    Copy,
    num_enum::TryFromPrimitive,
    num_enum::IntoPrimitive,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
)]
#[cfg_attr(
    feature = "strum",
    derive(strum::EnumIter, strum::EnumString, strum::Display)
)]
#[cfg_attr(feature = "strum", strum(serialize_all = "snake_case"))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[repr(u8)]
pub enum Position {
    /// Root of a tree.
    Root,
    /// Left child.
    Left,
    /// Right child.
    Right,
}

/// Descriptor of the next available place in a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Slot {
    /// Pool level.
    pub level: PoolLevel,
    /// Parent node. `None` for a root slot.
    pub parent: Option<NodeId>,
    /// Position under the parent.
    pub position: Position,
}

impl Slot {
    /// The slot of a new tree root.
    pub fn root(level: PoolLevel) -> Self {
        Self {
            level,
            parent: None,
            position: Position::Root,
        }
    }

    /// The two child slots of `parent`, left first.
    pub fn children(level: PoolLevel, parent: NodeId) -> [Self; 2] {
        [Position::Left, Position::Right].map(|position| Self {
            level,
            parent: Some(parent),
            position,
        })
    }

    /// Whether this is a root slot.
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.parent {
            Some(parent) => write!(f, "L{}:{parent}:{:?}", self.level, self.position),
            None => write!(f, "L{}:root", self.level),
        }
    }
}

/// One slot of one binary tree.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PoolNode {
    id: NodeId,
    owner: ParticipantId,
    parent: Option<NodeId>,
    position: Position,
    depth: u32,
    tree: TreeId,
    left: Option<NodeId>,
    right: Option<NodeId>,
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339::option"))]
    completed_at: Option<OffsetDateTime>,
}

impl PoolNode {
    pub(crate) fn new(
        id: NodeId,
        owner: ParticipantId,
        slot: &Slot,
        depth: u32,
        tree: TreeId,
    ) -> Self {
        Self {
            id,
            owner,
            parent: slot.parent,
            position: slot.position,
            depth,
            tree,
            left: None,
            right: None,
            completed_at: None,
        }
    }

    /// Get id.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Get owner.
    pub fn owner(&self) -> ParticipantId {
        self.owner
    }

    /// Get parent.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Get position.
    pub fn position(&self) -> Position {
        self.position
    }

    /// Depth in the tree, the root being `0`.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Pool level.
    pub fn level(&self) -> PoolLevel {
        self.tree.level
    }

    /// Tree.
    pub fn tree(&self) -> TreeId {
        self.tree
    }

    /// Child at the given position.
    pub fn child(&self, position: Position) -> Option<NodeId> {
        match position {
            Position::Left => self.left,
            Position::Right => self.right,
            Position::Root => None,
        }
    }

    /// Number of children.
    pub fn child_count(&self) -> usize {
        [self.left, self.right]
            .iter()
            .filter(|child| child.is_some())
            .count()
    }

    /// Whether both children exist.
    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }

    /// Completion time.
    pub fn completed_at(&self) -> Option<OffsetDateTime> {
        self.completed_at
    }

    /// Attach a child. Returns `true` if this node has just become complete.
    pub(crate) fn attach(
        &mut self,
        position: Position,
        child: NodeId,
        at: OffsetDateTime,
    ) -> crate::Result<bool> {
        let field = match position {
            Position::Left => &mut self.left,
            Position::Right => &mut self.right,
            Position::Root => return Err(crate::Error::InvalidArgument("attach at root position")),
        };
        if field.is_some() {
            return Err(crate::Error::SlotOccupied(Slot {
                level: self.tree.level,
                parent: Some(self.id),
                position,
            }));
        }
        *field = Some(child);
        if self.left.is_some() && self.right.is_some() && self.completed_at.is_none() {
            self.completed_at = Some(at);
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

/// Progress of a tree after a node completion has been recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeProgress {
    /// The counter has been incremented.
    Counted(u32),
    /// The tree has just reached its fixed size.
    Completed,
    /// The tree was complete before, the counter is left untouched.
    AlreadyComplete,
}

/// One binary tree instance at one pool level.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PoolTree {
    id: TreeId,
    root: NodeId,
    completed_nodes: u32,
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339::option"))]
    completed_at: Option<OffsetDateTime>,
    recent: VecDeque<ParticipantId>,
    last_four: Vec<ParticipantId>,
    progressed: Vec<ParticipantId>,
}

impl PoolTree {
    pub(crate) fn new(id: TreeId, root: NodeId) -> Self {
        Self {
            id,
            root,
            completed_nodes: 0,
            completed_at: None,
            recent: VecDeque::with_capacity(LAST_FOUR),
            last_four: Vec::new(),
            progressed: Vec::new(),
        }
    }

    /// Get id.
    pub fn id(&self) -> TreeId {
        self.id
    }

    /// Root node.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of completed nodes.
    pub fn completed_nodes(&self) -> u32 {
        self.completed_nodes
    }

    /// Whether the tree has reached its fixed size.
    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }

    /// Completion time.
    pub fn completed_at(&self) -> Option<OffsetDateTime> {
        self.completed_at
    }

    /// Owners of the last four completed nodes, in completion order.
    ///
    /// Empty until the tree is complete.
    pub fn last_four(&self) -> &[ParticipantId] {
        &self.last_four
    }

    /// Participants of the last four who have been re-entered at the next level.
    pub fn progressed(&self) -> &[ParticipantId] {
        &self.progressed
    }

    /// Whether the layer income of `participant` in this tree is withheld.
    pub fn is_reserving_for(&self, participant: &ParticipantId) -> bool {
        self.is_complete()
            && self.last_four.contains(participant)
            && !self.progressed.contains(participant)
    }

    /// Record the completion of a node owned by `owner`.
    pub(crate) fn record_completion(
        &mut self,
        owner: ParticipantId,
        pool_size: u32,
        at: OffsetDateTime,
    ) -> crate::Result<TreeProgress> {
        if self.is_complete() {
            return Ok(TreeProgress::AlreadyComplete);
        }
        self.completed_nodes = self
            .completed_nodes
            .checked_add(1)
            .ok_or(crate::Error::Overflow)?;
        if self.recent.len() == LAST_FOUR {
            self.recent.pop_front();
        }
        self.recent.push_back(owner);
        if self.completed_nodes >= pool_size {
            self.completed_at = Some(at);
            self.last_four = self.recent.iter().copied().collect();
            Ok(TreeProgress::Completed)
        } else {
            Ok(TreeProgress::Counted(self.completed_nodes))
        }
    }

    pub(crate) fn mark_progressed(&mut self, participant: ParticipantId) {
        if !self.progressed.contains(&participant) {
            self.progressed.push(participant);
        }
    }
}
