use std::ops::RangeInclusive;

/// Closed interval
pub trait Interval {
    type Endpoint: Ord + Copy + std::fmt::Debug;

    /// Start of the interval (inclusive)
    fn from(&self) -> Self::Endpoint;

    /// End of the interval (inclusive)
    fn until(&self) -> Self::Endpoint;
}

/// Static segment tree, for answering "which intervals cover this point?" queries
///
/// The tree is constructed once from the full set of intervals and never mutated afterwards.
/// Intervals get cloned once per node on which they are stored, so anything bigger than a couple
/// of words is best inserted behind a reference.
#[derive(Debug)]
pub struct SegmentTree<I: Interval + Clone>(Option<SegmentNode<I>>);

impl<I: Interval + Clone> SegmentTree<I> {
    /// Build a segment tree containing all of the specified intervals
    pub fn new(intervals: Vec<I>) -> SegmentTree<I> {
        let mut endpoints: Vec<I::Endpoint> = intervals
            .iter()
            .flat_map(|interval| [interval.from(), interval.until()])
            .collect();
        endpoints.sort_unstable();
        endpoints.dedup();

        if endpoints.is_empty() {
            return SegmentTree(None);
        }

        // Elementary pieces: every endpoint, and the open gap between each consecutive pair.
        // Without the gaps, a query at a point between two endpoints would have no leaf to
        // descend into.
        let mut pieces: Vec<Elementary<I::Endpoint>> =
            Vec::with_capacity(endpoints.len() * 2 - 1);
        for (index, endpoint) in endpoints.iter().enumerate() {
            if index > 0 {
                pieces.push(Elementary::Between(endpoints[index - 1], *endpoint));
            }
            pieces.push(Elementary::At(*endpoint));
        }

        let mut root = SegmentNode::build(&pieces);
        for interval in intervals {
            root.insert(interval);
        }
        SegmentTree(Some(root))
    }

    /// Find all intervals covering the specified point
    pub fn intervals_containing(&self, point: &I::Endpoint) -> Vec<&I> {
        let mut found: Vec<&I> = vec![];
        let mut next = self.0.as_ref().filter(|root| root.contains(point));

        while let Some(node) = next {
            found.extend(node.intervals());
            next = match node {
                SegmentNode::Leaf { .. } => None,
                SegmentNode::Inner {
                    left_child,
                    right_child,
                    ..
                } => {
                    if left_child.contains(point) {
                        Some(left_child)
                    } else if right_child.contains(point) {
                        Some(right_child)
                    } else {
                        None
                    }
                }
            };
        }

        found
    }
}

/// Elementary piece of the number line covered by a leaf
#[derive(Debug, Copy, Clone)]
enum Elementary<E> {
    /// A single endpoint
    At(E),

    /// The open gap between two consecutive endpoints
    Between(E, E),
}

#[derive(Debug)]
enum SegmentNode<I: Interval> {
    Leaf {
        /// Elementary piece represented by this leaf
        piece: Elementary<I::Endpoint>,

        /// Intervals stored on the node
        intervals: Vec<I>,
    },
    Inner {
        /// Start (inclusive) of the segment
        lo: I::Endpoint,

        /// End (inclusive) of the segment
        hi: I::Endpoint,

        left_child: Box<SegmentNode<I>>,
        right_child: Box<SegmentNode<I>>,

        /// Intervals stored on the node
        intervals: Vec<I>,
    },
}

impl<I: Interval + Clone> SegmentNode<I> {
    /// Build an empty tree over an ordered, non-empty slice of elementary pieces
    fn build(pieces: &[Elementary<I::Endpoint>]) -> SegmentNode<I> {
        match pieces.len() {
            0 => unreachable!(),
            1 => SegmentNode::Leaf {
                piece: pieces[0],
                intervals: vec![],
            },
            n => {
                let (left, right) = pieces.split_at(n / 2);
                SegmentNode::Inner {
                    lo: pieces[0].lo(),
                    hi: pieces[n - 1].hi(),
                    left_child: Box::new(SegmentNode::build(left)),
                    right_child: Box::new(SegmentNode::build(right)),
                    intervals: vec![],
                }
            }
        }
    }

    /// Store an interval on the highest nodes whose segments it fully covers
    ///
    /// The interval's endpoints must be drawn from the endpoints the tree was built over; a gap
    /// leaf then contains no interval endpoint, so comparing against the gap's closure is exact.
    fn insert(&mut self, interval: I) {
        if interval.from() <= self.from() && self.until() <= interval.until() {
            match self {
                SegmentNode::Leaf { intervals, .. } => intervals.push(interval),
                SegmentNode::Inner { intervals, .. } => intervals.push(interval),
            }
        } else if let SegmentNode::Inner {
            left_child,
            right_child,
            ..
        } = self
        {
            if interval.from() <= left_child.until() {
                left_child.insert(interval.clone());
            }
            if right_child.from() <= interval.until() {
                right_child.insert(interval);
            }
        }
    }

    /// Is the point inside the segment represented by this node?
    fn contains(&self, point: &I::Endpoint) -> bool {
        match self {
            SegmentNode::Leaf { piece, .. } => match piece {
                Elementary::At(endpoint) => point == endpoint,
                Elementary::Between(lo, hi) => lo < point && point < hi,
            },
            SegmentNode::Inner { lo, hi, .. } => lo <= point && point <= hi,
        }
    }

    fn intervals(&self) -> &[I] {
        match self {
            SegmentNode::Leaf { intervals, .. } => intervals,
            SegmentNode::Inner { intervals, .. } => intervals,
        }
    }
}

impl<E: Copy> Elementary<E> {
    fn lo(&self) -> E {
        match self {
            Elementary::At(endpoint) => *endpoint,
            Elementary::Between(lo, _) => *lo,
        }
    }

    fn hi(&self) -> E {
        match self {
            Elementary::At(endpoint) => *endpoint,
            Elementary::Between(_, hi) => *hi,
        }
    }
}

impl<I: Interval> Interval for SegmentNode<I> {
    type Endpoint = I::Endpoint;

    fn from(&self) -> Self::Endpoint {
        match self {
            SegmentNode::Leaf { piece, .. } => piece.lo(),
            SegmentNode::Inner { lo, .. } => *lo,
        }
    }

    fn until(&self) -> Self::Endpoint {
        match self {
            SegmentNode::Leaf { piece, .. } => piece.hi(),
            SegmentNode::Inner { hi, .. } => *hi,
        }
    }
}

impl<I: Interval> Interval for &I {
    type Endpoint = I::Endpoint;

    fn from(&self) -> Self::Endpoint {
        Interval::from(*self)
    }

    fn until(&self) -> Self::Endpoint {
        Interval::until(*self)
    }
}

impl<Idx: Copy + Ord + std::fmt::Debug> Interval for RangeInclusive<Idx> {
    type Endpoint = Idx;

    fn from(&self) -> Idx {
        *self.start()
    }

    fn until(&self) -> Idx {
        *self.end()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashSet;

    fn covering(tree: &SegmentTree<RangeInclusive<i32>>, point: i32) -> HashSet<RangeInclusive<i32>> {
        tree.intervals_containing(&point).into_iter().cloned().collect()
    }

    #[test]
    fn empty_tree() {
        let tree: SegmentTree<RangeInclusive<i32>> = SegmentTree::new(vec![]);
        assert!(covering(&tree, 0).is_empty());
        assert!(covering(&tree, 42).is_empty());
    }

    #[test]
    fn single_interval() {
        let tree = SegmentTree::new(vec![2..=5]);
        assert!(covering(&tree, 1).is_empty());
        assert_eq!(covering(&tree, 2), HashSet::from([2..=5]));
        assert_eq!(covering(&tree, 4), HashSet::from([2..=5]));
        assert_eq!(covering(&tree, 5), HashSet::from([2..=5]));
        assert!(covering(&tree, 6).is_empty());
    }

    #[test]
    fn point_interval() {
        let tree = SegmentTree::new(vec![3..=3, 1..=4]);
        assert_eq!(covering(&tree, 3), HashSet::from([3..=3, 1..=4]));
        assert_eq!(covering(&tree, 2), HashSet::from([1..=4]));
        assert_eq!(covering(&tree, 4), HashSet::from([1..=4]));
    }

    #[test]
    fn overlapping_intervals() {
        let tree = SegmentTree::new(vec![0..=3, 2..=6, 5..=9, 0..=9]);
        assert_eq!(covering(&tree, 0), HashSet::from([0..=3, 0..=9]));
        assert_eq!(covering(&tree, 2), HashSet::from([0..=3, 2..=6, 0..=9]));
        assert_eq!(covering(&tree, 3), HashSet::from([0..=3, 2..=6, 0..=9]));
        assert_eq!(covering(&tree, 4), HashSet::from([2..=6, 0..=9]));
        assert_eq!(covering(&tree, 5), HashSet::from([2..=6, 5..=9, 0..=9]));
        assert_eq!(covering(&tree, 7), HashSet::from([5..=9, 0..=9]));
        assert_eq!(covering(&tree, 9), HashSet::from([5..=9, 0..=9]));
        assert!(covering(&tree, 10).is_empty());
    }

    #[test]
    fn queries_between_endpoints() {
        // Points that are not endpoints of any interval still land on a leaf
        let tree = SegmentTree::new(vec![0..=10, 4..=8]);
        assert_eq!(covering(&tree, 1), HashSet::from([0..=10]));
        assert_eq!(covering(&tree, 5), HashSet::from([0..=10, 4..=8]));
        assert_eq!(covering(&tree, 9), HashSet::from([0..=10]));
    }

    #[test]
    fn nested_intervals() {
        let tree = SegmentTree::new(vec![1..=8, 2..=7, 3..=6, 4..=5]);
        assert_eq!(covering(&tree, 1), HashSet::from([1..=8]));
        assert_eq!(covering(&tree, 2), HashSet::from([1..=8, 2..=7]));
        assert_eq!(
            covering(&tree, 4),
            HashSet::from([1..=8, 2..=7, 3..=6, 4..=5])
        );
        assert_eq!(covering(&tree, 6), HashSet::from([1..=8, 2..=7, 3..=6]));
        assert_eq!(covering(&tree, 8), HashSet::from([1..=8]));
    }
}
