//! Re-iterable views over lazily produced sequences.

use std::cell::RefCell;
use std::rc::Rc;

struct Inner<T> {
    items: Vec<T>,
    source: Option<Box<dyn Iterator<Item = T>>>,
}

/// A lazily materialized sequence that can be iterated any number of times.
///
/// Items are pulled from the underlying generator on demand and recorded, so
/// later replays read the recording instead of re-entering the generator.
/// This is what makes the subtree memo sound: a cached search result must be
/// restartable without running the search again.
pub(crate) struct CachedSequence<T> {
    inner: Rc<RefCell<Inner<T>>>,
}

impl<T> Clone for CachedSequence<T> {
    fn clone(&self) -> CachedSequence<T> {
        CachedSequence {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone> CachedSequence<T> {
    pub fn new(source: Box<dyn Iterator<Item = T>>) -> CachedSequence<T> {
        CachedSequence {
            inner: Rc::new(RefCell::new(Inner {
                items: Vec::new(),
                source: Some(source),
            })),
        }
    }

    /// An iterator over the sequence from the beginning.
    pub fn replay(&self) -> Replay<T> {
        Replay {
            inner: Rc::clone(&self.inner),
            index: 0,
        }
    }
}

pub(crate) struct Replay<T> {
    inner: Rc<RefCell<Inner<T>>>,
    index: usize,
}

impl<T: Clone> Iterator for Replay<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        {
            let inner = match self.inner.try_borrow() {
                Ok(inner) => inner,
                Err(_) => return None,
            };
            if self.index < inner.items.len() {
                let item = inner.items[self.index].clone();
                self.index += 1;
                return Some(item);
            }
            if inner.source.is_none() {
                return None;
            }
        }

        // Detach the generator while pulling from it. A re-entrant replay of
        // this sequence (a subtree that reaches itself under identical
        // constraints) then observes only the recorded prefix and terminates
        // instead of recursing without bound.
        let mut source = match self.inner.try_borrow_mut() {
            Ok(mut inner) => match inner.source.take() {
                Some(source) => source,
                None => return None,
            },
            Err(_) => return None,
        };
        let item = source.next();

        let mut inner = self.inner.borrow_mut();
        if item.is_some() {
            inner.source = Some(source);
        }
        match item {
            Some(item) => {
                inner.items.push(item.clone());
                self.index += 1;
                Some(item)
            }
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_replays_share_one_pass_over_the_source() {
        let pulled = Rc::new(Cell::new(0));
        let counter = Rc::clone(&pulled);
        let source = Box::new((0..4).inspect(move |_| counter.set(counter.get() + 1)));

        let sequence = CachedSequence::new(source);
        assert_eq!(sequence.replay().collect::<Vec<_>>(), vec![0, 1, 2, 3]);
        assert_eq!(sequence.replay().collect::<Vec<_>>(), vec![0, 1, 2, 3]);
        assert_eq!(pulled.get(), 4);
    }

    #[test]
    fn test_pulls_are_lazy() {
        let pulled = Rc::new(Cell::new(0));
        let counter = Rc::clone(&pulled);
        let source = Box::new((0..100).inspect(move |_| counter.set(counter.get() + 1)));

        let sequence = CachedSequence::new(source);
        let first_two: Vec<i32> = sequence.replay().take(2).collect();
        assert_eq!(first_two, vec![0, 1]);
        assert_eq!(pulled.get(), 2);
    }

    #[test]
    fn test_interleaved_replays() {
        let sequence = CachedSequence::new(Box::new(0..3));
        let mut a = sequence.replay();
        let mut b = sequence.replay();
        assert_eq!(a.next(), Some(0));
        assert_eq!(b.next(), Some(0));
        assert_eq!(b.next(), Some(1));
        assert_eq!(a.next(), Some(1));
        assert_eq!(a.next(), Some(2));
        assert_eq!(a.next(), None);
        assert_eq!(b.next(), Some(2));
        assert_eq!(b.next(), None);
    }

    #[test]
    fn test_reentrant_replay_sees_cached_prefix() {
        // The generator itself replays the sequence it is feeding; the inner
        // replay must see only what has already been produced.
        let handle: Rc<RefCell<Option<CachedSequence<usize>>>> = Rc::new(RefCell::new(None));
        let inner_handle = Rc::clone(&handle);
        let source = Box::new((0..3).map(move |_| {
            let sequence = inner_handle.borrow().clone().unwrap();
            sequence.replay().count()
        }));

        let sequence = CachedSequence::new(source);
        *handle.borrow_mut() = Some(sequence.clone());

        // Each pull records how many items were cached when it ran.
        assert_eq!(sequence.replay().collect::<Vec<_>>(), vec![0, 1, 2]);
    }
}
