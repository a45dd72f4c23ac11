//! Lazy cursor over the elements selected by an object path.

use std::iter::FusedIterator;

use serde_json::Value;

use crate::error::{ExtractError, Result};

/// A finite, non-restartable sequence of JSON fragments.
///
/// Each element is serialized only when it is pulled. Once the cursor has
/// returned `None` it stays exhausted. An element that fails to serialize is
/// still consumed, so repeated errors cannot stall the caller.
#[derive(Debug)]
pub struct ObjectIter {
    elements: std::vec::IntoIter<Value>,
    exhausted: bool,
}

impl ObjectIter {
    /// Iterate over each element of `elements`, in order.
    pub fn new(elements: Vec<Value>) -> Self {
        Self {
            elements: elements.into_iter(),
            exhausted: false,
        }
    }

    /// Iterate over exactly one element.
    pub fn once(element: Value) -> Self {
        Self::new(vec![element])
    }

    /// Whether the terminal state has been reached.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}

impl Iterator for ObjectIter {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }

        match self.elements.next() {
            Some(element) => Some(serde_json::to_vec(&element).map_err(ExtractError::from)),
            None => {
                self.exhausted = true;
                None
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.exhausted {
            (0, Some(0))
        } else {
            self.elements.size_hint()
        }
    }
}

impl ExactSizeIterator for ObjectIter {}

impl FusedIterator for ObjectIter {}
