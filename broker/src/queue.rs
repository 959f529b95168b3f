use slab::Slab;

use crate::types::{ClientKey, RecordKey, SequenceId};

pub(crate) type NodeIndex = usize;

/// A queue node is either an object record or a client cursor. Cursors are
/// full members of the list; they never leave it until the client is
/// destroyed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum NodeKind {
    Record(RecordKey),
    Cursor(ClientKey),
}

#[derive(Debug)]
pub(crate) struct Node {
    prev: Option<NodeIndex>,
    next: Option<NodeIndex>,
    /// For a record node: the id stamped at its most recent tail insertion.
    /// For a cursor node: the id of the most recently consumed node.
    pub id: SequenceId,
    pub kind: NodeKind,
}

/// One priority level's queue: a doubly-linked list over a slab arena,
/// ordered by sequence id ascending from head to tail. "Ahead of cursor C"
/// means tail-ward of C, equivalently `node.id > C.id`.
pub(crate) struct BrokerQueue {
    nodes: Slab<Node>,
    head: Option<NodeIndex>,
    tail: Option<NodeIndex>,
    top_id: SequenceId,
}

impl BrokerQueue {
    pub fn new() -> Self {
        Self {
            nodes: Slab::new(),
            head: None,
            tail: None,
            top_id: 0,
        }
    }

    /// The id most recently assigned at the tail. A cursor whose id equals
    /// this has nothing left to observe here.
    pub fn top_id(&self) -> SequenceId {
        self.top_id
    }

    pub fn id_of(&self, index: NodeIndex) -> SequenceId {
        self.nodes[index].id
    }

    pub fn set_id(&mut self, index: NodeIndex, id: SequenceId) {
        self.nodes[index].id = id;
    }

    /// Append a new node at the tail, stamping it with the next sequence id.
    pub fn push_tail(&mut self, kind: NodeKind) -> NodeIndex {
        self.top_id += 1;
        let index = self.nodes.insert(Node {
            prev: None,
            next: None,
            id: self.top_id,
            kind,
        });
        self.link_tail(index);
        index
    }

    /// Insert a new node at the head with an explicit id. Used only to
    /// install client cursors, which start "behind everything" and are then
    /// stamped up to the tail id if the queue holds no records.
    pub fn push_head(&mut self, kind: NodeKind, id: SequenceId) -> NodeIndex {
        let index = self.nodes.insert(Node {
            prev: None,
            next: self.head,
            id,
            kind,
        });
        match self.head {
            Some(old) => self.nodes[old].prev = Some(index),
            None => self.tail = Some(index),
        }
        self.head = Some(index);
        index
    }

    fn link_tail(&mut self, index: NodeIndex) {
        self.nodes[index].prev = self.tail;
        self.nodes[index].next = None;
        match self.tail {
            Some(old) => self.nodes[old].next = Some(index),
            None => self.head = Some(index),
        }
        self.tail = Some(index);
    }

    /// Unlink a node from the list without releasing its slot.
    fn detach(&mut self, index: NodeIndex) {
        let (prev, next) = {
            let node = &mut self.nodes[index];
            (node.prev.take(), node.next.take())
        };
        match prev {
            Some(p) => self.nodes[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.nodes[n].prev = prev,
            None => self.tail = prev,
        }
    }

    /// Unlink a node and release its slot.
    pub fn remove(&mut self, index: NodeIndex) -> NodeKind {
        self.detach(index);
        self.nodes.remove(index).kind
    }

    /// Move an existing node to the tail and stamp it with a fresh id.
    /// Every re-tail bumps the counter, including tombstone re-tails; the
    /// deletion gating check relies on that.
    pub fn retail(&mut self, index: NodeIndex) -> SequenceId {
        self.detach(index);
        self.top_id += 1;
        self.nodes[index].id = self.top_id;
        self.link_tail(index);
        self.top_id
    }

    /// Relink `index` immediately tail-ward of `after`. Ids are untouched;
    /// the caller stamps the cursor with the consumed node's id.
    pub fn move_after(&mut self, index: NodeIndex, after: NodeIndex) {
        debug_assert_ne!(index, after);
        self.detach(index);
        let next = self.nodes[after].next;
        self.nodes[index].prev = Some(after);
        self.nodes[index].next = next;
        self.nodes[after].next = Some(index);
        match next {
            Some(n) => self.nodes[n].prev = Some(index),
            None => self.tail = Some(index),
        }
    }

    /// The first record node tail-ward of `from`, skipping cursors.
    pub fn next_record(&self, from: NodeIndex) -> Option<(NodeIndex, RecordKey)> {
        let mut cursor = self.nodes[from].next;
        while let Some(index) = cursor {
            if let NodeKind::Record(key) = self.nodes[index].kind {
                return Some((index, key));
            }
            cursor = self.nodes[index].next;
        }
        None
    }

    /// Walk the queue from tail to head (display order: newest first).
    pub fn iter_newest_first(&self) -> NewestFirst<'_> {
        NewestFirst {
            queue: self,
            cursor: self.tail,
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }
}

pub(crate) struct NewestFirst<'q> {
    queue: &'q BrokerQueue,
    cursor: Option<NodeIndex>,
}

impl<'q> Iterator for NewestFirst<'q> {
    type Item = &'q Node;

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.cursor?;
        let node = &self.queue.nodes[index];
        self.cursor = node.prev;
        Some(node)
    }
}
