//! Arena-backed doubly-linked list used for LRU ordering.
//!
//! Nodes live in a `Vec` and link to each other by index, so handles stay
//! valid across pushes and removals and no `unsafe` is needed. Freed slots are
//! recycled through a free list.

/// Stable handle to a node. Invalidated when that node is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct NodeId(usize);

#[derive(Debug)]
struct Node<K, V> {
    key: K,
    value: V,
    prev: Option<usize>,
    next: Option<usize>,
}

#[derive(Debug)]
pub(crate) struct List<K, V> {
    slots: Vec<Option<Node<K, V>>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

impl<K, V> List<K, V> {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            head: None,
            tail: None,
            len: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Insert at the front (most recently used end).
    pub(crate) fn push_front(&mut self, key: K, value: V) -> NodeId {
        let node = Node {
            key,
            value,
            prev: None,
            next: self.head,
        };
        let index = match self.free.pop() {
            Some(index) => {
                self.slots[index] = Some(node);
                index
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        };

        match self.head {
            Some(old) => self.node_mut(old).prev = Some(index),
            None => self.tail = Some(index),
        }
        self.head = Some(index);
        self.len += 1;
        NodeId(index)
    }

    /// Move an existing node to the front.
    pub(crate) fn move_to_front(&mut self, id: NodeId) {
        if self.head == Some(id.0) {
            return;
        }
        self.unlink(id.0);
        let node = self.node_mut(id.0);
        node.prev = None;
        node.next = None;

        match self.head {
            Some(old) => {
                self.node_mut(old).prev = Some(id.0);
                self.node_mut(id.0).next = Some(old);
            }
            None => self.tail = Some(id.0),
        }
        self.head = Some(id.0);
    }

    /// Remove a node and return its contents.
    pub(crate) fn remove(&mut self, id: NodeId) -> (K, V) {
        self.unlink(id.0);
        let node = match self.slots[id.0].take() {
            Some(node) => node,
            None => unreachable!("removed a vacant list slot"),
        };
        self.free.push(id.0);
        self.len -= 1;
        (node.key, node.value)
    }

    /// Remove the back (least recently used) node.
    pub(crate) fn pop_back(&mut self) -> Option<(K, V)> {
        let tail = self.tail?;
        Some(self.remove(NodeId(tail)))
    }

    pub(crate) fn value(&self, id: NodeId) -> &V {
        &self.node(id.0).value
    }

    pub(crate) fn value_mut(&mut self, id: NodeId) -> &mut V {
        &mut self.node_mut(id.0).value
    }

    /// Keys from front to back.
    pub(crate) fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            list: self,
            cursor: self.head,
        }
    }

    fn unlink(&mut self, index: usize) {
        let (prev, next) = {
            let node = self.node(index);
            (node.prev, node.next)
        };
        match prev {
            Some(p) => self.node_mut(p).next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.node_mut(n).prev = prev,
            None => self.tail = prev,
        }
    }

    fn node(&self, index: usize) -> &Node<K, V> {
        match self.slots.get(index) {
            Some(Some(node)) => node,
            _ => unreachable!("dangling list index {}", index),
        }
    }

    fn node_mut(&mut self, index: usize) -> &mut Node<K, V> {
        match self.slots.get_mut(index) {
            Some(Some(node)) => node,
            _ => unreachable!("dangling list index {}", index),
        }
    }
}

pub(crate) struct Iter<'a, K, V> {
    list: &'a List<K, V>,
    cursor: Option<usize>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.list.node(self.cursor?);
        self.cursor = node.next;
        Some((&node.key, &node.value))
    }
}
