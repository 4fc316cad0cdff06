use std::fmt::{Debug, Error, Formatter};
use std::iter::{DoubleEndedIterator, Enumerate, Extend, FromIterator};
use std::ops::Sub;
use std::slice::Iter;
use std::vec::IntoIter as VecIntoIter;

/// Elements that take up a logical width (eg. inside an [`OffsetVec`])
pub trait Width {
    fn width(&self) -> usize;
}

/// Vector of variable-width elements, addressed by the running sum of the widths of the
/// preceding elements instead of by element count.
///
/// Class files are full of sequences indexed this way, which is why this type shows up all
/// over the crate:
///
///   - operand stacks (`long` and `double` occupy two slots, everything else one)
///   - encoded instructions inside a basic block (each opcode has its own byte size)
///   - the constant pool (8-byte constants burn two pool entries and indexing starts at 1)
///
#[derive(Clone)]
pub struct OffsetVec<T: Sized> {
    /// Entries, each paired with the offset at which it starts
    entries: Vec<(Offset, T)>,

    /// Offset at which the next element would start
    offset_len: Offset,

    /// Offset of the first element (0 everywhere except the constant pool, which starts at 1)
    initial_offset: Offset,
}

/// Offset into an [`OffsetVec`]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct Offset(pub usize);

impl Sub for Offset {
    type Output = isize;

    fn sub(self, other: Offset) -> isize {
        (self.0 as isize) - (other.0 as isize)
    }
}

impl<T: Sized + Width> OffsetVec<T> {
    /// New empty offset vector
    pub fn new() -> OffsetVec<T> {
        OffsetVec {
            entries: vec![],
            offset_len: Offset(0),
            initial_offset: Offset(0),
        }
    }

    /// New empty offset vector whose first element starts at a non-zero offset
    pub fn new_starting_at(initial_offset: Offset) -> OffsetVec<T> {
        OffsetVec {
            entries: vec![],
            offset_len: initial_offset,
            initial_offset,
        }
    }

    /// Number of entries (not the summed width)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Is the vector empty?
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Offset at which the next element would start (aka. the summed width so far)
    pub fn offset_len(&self) -> Offset {
        self.offset_len
    }

    /// Add an entry to the back and return the offset at which it was placed
    pub fn push(&mut self, slot: T) -> Offset {
        let offset = self.offset_len;
        self.offset_len.0 += slot.width();
        self.entries.push((offset, slot));

        offset
    }

    /// Remove the last entry, rolling the length offset back to where that entry started
    pub fn pop(&mut self) -> Option<(Offset, usize, T)> {
        self.entries.pop().map(|(off, elem)| {
            self.offset_len = off;
            (off, self.entries.len(), elem)
        })
    }

    /// Peek at the last entry
    pub fn last(&self) -> Option<(Offset, usize, &T)> {
        self.entries
            .last()
            .map(|(off, elem)| (*off, self.entries.len() - 1, elem))
    }

    /// Empty the vector
    pub fn clear(&mut self) {
        self.entries.clear();
        self.offset_len = self.initial_offset;
    }

    /// Get an entry (and its starting offset) by its position in the vector
    pub fn get_index(&self, index: usize) -> Option<(Offset, &T)> {
        self.entries.get(index).map(|(offset, t)| (*offset, t))
    }

    pub fn iter(&self) -> OffsetVecIter<'_, T> {
        self.into_iter()
    }
}

impl<A: PartialEq> PartialEq for OffsetVec<A> {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl<A: Eq> Eq for OffsetVec<A> {}

impl<A: Width> Default for OffsetVec<A> {
    fn default() -> Self {
        OffsetVec::new()
    }
}

/// Iterator for owned `OffsetVec`
pub struct OffsetVecIntoIter<T>(Enumerate<VecIntoIter<(Offset, T)>>);

impl<T> Iterator for OffsetVecIntoIter<T> {
    type Item = (Offset, usize, T);

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|(idx, (off, elem))| (off, idx, elem))
    }
}

impl<T> DoubleEndedIterator for OffsetVecIntoIter<T> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.0
            .next_back()
            .map(|(idx, (off, elem))| (off, idx, elem))
    }
}

impl<T> IntoIterator for OffsetVec<T> {
    type Item = (Offset, usize, T);
    type IntoIter = OffsetVecIntoIter<T>;

    fn into_iter(self) -> OffsetVecIntoIter<T> {
        OffsetVecIntoIter(self.entries.into_iter().enumerate())
    }
}

/// Iterator for borrowed `OffsetVec`
pub struct OffsetVecIter<'a, T>(Enumerate<Iter<'a, (Offset, T)>>);

impl<'a, T> Iterator for OffsetVecIter<'a, T> {
    type Item = (Offset, usize, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|(idx, (off, elem))| (*off, idx, elem))
    }
}

impl<'a, T> DoubleEndedIterator for OffsetVecIter<'a, T> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.0
            .next_back()
            .map(|(idx, (off, elem))| (*off, idx, elem))
    }
}

impl<'a, T> IntoIterator for &'a OffsetVec<T> {
    type Item = (Offset, usize, &'a T);
    type IntoIter = OffsetVecIter<'a, T>;

    fn into_iter(self) -> OffsetVecIter<'a, T> {
        OffsetVecIter(self.entries.iter().enumerate())
    }
}

impl<T: Width> FromIterator<T> for OffsetVec<T> {
    fn from_iter<A: IntoIterator<Item = T>>(elems: A) -> Self {
        let mut offset_vec = OffsetVec::new();
        for elem in elems {
            offset_vec.push(elem);
        }
        offset_vec
    }
}

impl<T: Width> Extend<T> for OffsetVec<T> {
    fn extend<U: IntoIterator<Item = T>>(&mut self, iter: U) {
        for elem in iter {
            self.push(elem);
        }
    }
}

impl<T: Debug> Debug for OffsetVec<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        let mut list = f.debug_list();
        for (off, elem) in &self.entries {
            list.entry(&format_args!("#{} = {:?}", off.0, elem));
        }
        list.finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Copy, Clone, Eq, PartialEq, Debug)]
    enum Entry {
        Narrow(u8),
        Wide(u8),
    }

    impl Width for Entry {
        fn width(&self) -> usize {
            match self {
                Entry::Narrow(_) => 1,
                Entry::Wide(_) => 2,
            }
        }
    }

    #[test]
    fn offsets_accumulate_widths() {
        let entries: OffsetVec<Entry> = vec![
            Entry::Narrow(1),
            Entry::Wide(2),
            Entry::Narrow(3),
            Entry::Wide(4),
        ]
        .into_iter()
        .collect();

        assert_eq!(entries.len(), 4);
        assert_eq!(entries.offset_len(), Offset(6));
        assert_eq!(
            entries.into_iter().collect::<Vec<_>>(),
            vec![
                (Offset(0), 0, Entry::Narrow(1)),
                (Offset(1), 1, Entry::Wide(2)),
                (Offset(3), 2, Entry::Narrow(3)),
                (Offset(4), 3, Entry::Wide(4)),
            ]
        );
    }

    #[test]
    fn pop_rolls_back_offset() {
        let mut entries: OffsetVec<Entry> = OffsetVec::new();
        entries.push(Entry::Narrow(1));
        let wide_at = entries.push(Entry::Wide(2));

        assert_eq!(wide_at, Offset(1));
        assert_eq!(entries.offset_len(), Offset(3));
        assert_eq!(entries.pop(), Some((Offset(1), 1, Entry::Wide(2))));
        assert_eq!(entries.offset_len(), Offset(1));
        assert_eq!(entries.last(), Some((Offset(0), 0, &Entry::Narrow(1))));
    }

    #[test]
    fn initial_offset_is_respected() {
        let mut entries: OffsetVec<Entry> = OffsetVec::new_starting_at(Offset(1));
        assert_eq!(entries.push(Entry::Wide(9)), Offset(1));
        assert_eq!(entries.push(Entry::Narrow(8)), Offset(3));

        entries.clear();
        assert_eq!(entries.offset_len(), Offset(1));
        assert!(entries.is_empty());
    }
}
