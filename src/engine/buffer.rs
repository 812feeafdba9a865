//! Arena-backed doubly linked token list with generation-checked handles.
//!
//! A [`Handle`] stays valid across splices elsewhere in the list. Once its
//! node is removed the slot's generation moves on, so the stale handle is
//! rejected instead of aliasing whatever reuses the slot.

use crate::calc::Token;

/// Stable reference to one node of a [`TokenBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    index: u32,
    generation: u32,
}

#[derive(Debug, Clone)]
struct Node {
    token: Token,
    prev: Option<u32>,
    next: Option<u32>,
}

#[derive(Debug, Clone)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

#[derive(Debug, Clone, Default)]
pub struct TokenBuffer {
    slots: Vec<Slot>,
    free: Vec<u32>,
    head: Option<u32>,
    tail: Option<u32>,
    len: usize,
}

impl TokenBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn front(&self) -> Option<Handle> {
        self.head.map(|index| self.handle_at(index))
    }

    pub fn push_back(&mut self, token: Token) -> Handle {
        let index = self.allocate(Node {
            token,
            prev: self.tail,
            next: None,
        });
        match self.tail {
            Some(tail) => self.node_mut(tail).next = Some(index),
            None => self.head = Some(index),
        }
        self.tail = Some(index);
        self.len += 1;
        self.handle_at(index)
    }

    pub fn get(&self, handle: Handle) -> Option<&Token> {
        self.node(handle).map(|node| &node.token)
    }

    /// Overwrite the token at `handle`, returning the previous one.
    pub fn replace(&mut self, handle: Handle, token: Token) -> Option<Token> {
        let index = self.live_index(handle)?;
        Some(std::mem::replace(&mut self.node_mut(index).token, token))
    }

    pub fn next(&self, handle: Handle) -> Option<Handle> {
        let next = self.node(handle)?.next?;
        Some(self.handle_at(next))
    }

    /// Unlink the node at `handle`; the handle becomes stale.
    pub fn remove(&mut self, handle: Handle) -> Option<Token> {
        let index = self.live_index(handle)?;
        let slot = &mut self.slots[index as usize];
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(index);

        match node.prev {
            Some(prev) => self.node_mut(prev).next = node.next,
            None => self.head = node.next,
        }
        match node.next {
            Some(next) => self.node_mut(next).prev = node.prev,
            None => self.tail = node.prev,
        }
        self.len -= 1;
        Some(node.token)
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }

    pub fn iter(&self) -> impl Iterator<Item = (Handle, &Token)> + '_ {
        let mut cursor = self.head;
        std::iter::from_fn(move || {
            let index = cursor?;
            let node = self.slots[index as usize].node.as_ref()?;
            cursor = node.next;
            Some((self.handle_at(index), &node.token))
        })
    }

    fn allocate(&mut self, node: Node) -> u32 {
        if let Some(index) = self.free.pop() {
            self.slots[index as usize].node = Some(node);
            index
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                node: Some(node),
            });
            index
        }
    }

    fn handle_at(&self, index: u32) -> Handle {
        Handle {
            index,
            generation: self.slots[index as usize].generation,
        }
    }

    fn live_index(&self, handle: Handle) -> Option<u32> {
        let slot = self.slots.get(handle.index as usize)?;
        (slot.generation == handle.generation && slot.node.is_some()).then_some(handle.index)
    }

    fn node(&self, handle: Handle) -> Option<&Node> {
        let index = self.live_index(handle)?;
        self.slots[index as usize].node.as_ref()
    }

    // Only called with indices reached through live links.
    fn node_mut(&mut self, index: u32) -> &mut Node {
        match self.slots[index as usize].node.as_mut() {
            Some(node) => node,
            None => unreachable!("linked slot {index} is vacant"),
        }
    }
}

impl FromIterator<Token> for TokenBuffer {
    fn from_iter<I: IntoIterator<Item = Token>>(iter: I) -> Self {
        let mut buffer = Self::new();
        for token in iter {
            buffer.push_back(token);
        }
        buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TaskId;

    fn numbers(values: &[f64]) -> TokenBuffer {
        values.iter().map(|v| Token::Number(*v)).collect()
    }

    fn values(buffer: &TokenBuffer) -> Vec<String> {
        buffer.iter().map(|(_, t)| t.to_string()).collect()
    }

    #[test]
    fn push_and_iterate() {
        let buffer = numbers(&[1.0, 2.0, 3.0]);
        assert_eq!(buffer.len(), 3);
        assert_eq!(values(&buffer), ["1", "2", "3"]);
    }

    #[test]
    fn remove_middle_keeps_links() {
        let mut buffer = numbers(&[1.0, 2.0, 3.0]);
        let first = buffer.front().unwrap();
        let second = buffer.next(first).unwrap();
        let third = buffer.next(second).unwrap();

        assert_eq!(buffer.remove(second), Some(Token::Number(2.0)));
        assert_eq!(buffer.next(first), Some(third));
        assert_eq!(values(&buffer), ["1", "3"]);
    }

    #[test]
    fn handles_survive_earlier_splices() {
        let mut buffer = numbers(&[1.0, 2.0, 3.0, 4.0]);
        let first = buffer.front().unwrap();
        let last = buffer.iter().last().unwrap().0;

        buffer.remove(buffer.next(first).unwrap());
        buffer.replace(first, Token::Placeholder(TaskId(7)));

        assert_eq!(buffer.get(last), Some(&Token::Number(4.0)));
        assert_eq!(values(&buffer), ["#7", "3", "4"]);
    }

    #[test]
    fn stale_handle_rejected_after_slot_reuse() {
        let mut buffer = numbers(&[1.0, 2.0]);
        let first = buffer.front().unwrap();
        buffer.remove(first);

        let reused = buffer.push_back(Token::Number(9.0));
        assert_ne!(reused, first);
        assert_eq!(buffer.get(first), None);
        assert_eq!(buffer.replace(first, Token::Number(0.0)), None);
        assert_eq!(buffer.remove(first), None);
        assert_eq!(values(&buffer), ["2", "9"]);
    }

    #[test]
    fn remove_head_and_tail() {
        let mut buffer = numbers(&[1.0, 2.0, 3.0]);
        let head = buffer.front().unwrap();
        let tail = buffer.iter().last().unwrap().0;
        buffer.remove(head);
        buffer.remove(tail);
        assert_eq!(values(&buffer), ["2"]);
        assert_eq!(buffer.len(), 1);

        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.front(), None);
    }
}
