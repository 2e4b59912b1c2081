//! Call-path keyed aggregation of call counts and elapsed time.

use std::time::Duration;

use foldhash::{HashMap, HashMapExt};

use crate::CodeLocation;

/// The aggregated statistics produced by a profiling run.
///
/// The tree is a forest rooted at the profiler's [`TopFrame`][crate::TopFrame]. Each node
/// describes one [`CodeLocation`] reached through one specific call path, so a function
/// that is called from two different places appears as two different nodes.
///
/// A stat tree obtained from a profiler is a frozen snapshot and never changes.
///
/// # Examples
///
/// ```
/// use callgauge::{Instrumentation, Profiler, TracingProfiler, location};
///
/// let instrumentation = Instrumentation::new();
/// let mut profiler = TracingProfiler::builder(&instrumentation).build();
///
/// profiler
///     .profile(|| {
///         let _frame = instrumentation.enter(location!("work"));
///     })
///     .unwrap();
///
/// let stats = profiler.stats().unwrap();
/// let work = stats.find("work").unwrap();
/// assert_eq!(work.own_count(), 1);
/// assert_eq!(work.deep_count(), 1);
/// ```
#[derive(Clone, Debug, Default)]
pub struct StatTree {
    children: HashMap<CodeLocation, StatNode>,
}

/// Statistics of one code location reached through one call path.
#[derive(Clone, Debug)]
pub struct StatNode {
    location: CodeLocation,
    own_count: u64,
    deep_count: u64,
    own_time: Duration,
    deep_time: Duration,
    children: HashMap<CodeLocation, StatNode>,
}

/// Time attributed to one completed activation of a frame.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct Timing {
    /// Elapsed time between entering and leaving the frame, callees included.
    pub(crate) elapsed: Duration,

    /// The part of `elapsed` that was not spent in callees.
    pub(crate) own: Duration,
}

/// Orders the children of a [`StatNode`] or [`StatTree`].
///
/// Every key except [`Name`][Self::Name] sorts from the largest value to the smallest.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum SortKey {
    /// Inclusive elapsed time.
    DeepTime,

    /// Exclusive elapsed time.
    OwnTime,

    /// Inclusive call or sample count.
    DeepCount,

    /// Exclusive call or sample count.
    OwnCount,

    /// Function name, alphabetically.
    Name,
}

impl StatTree {
    /// Creates an empty stat tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// The nodes directly below the top frame.
    pub fn children(&self) -> impl Iterator<Item = &StatNode> {
        self.children.values()
    }

    /// The node directly below the top frame for `location`, if any.
    #[must_use]
    pub fn child(&self, location: &CodeLocation) -> Option<&StatNode> {
        self.children.get(location)
    }

    /// The nodes directly below the top frame in the order given by `key`.
    #[must_use]
    pub fn sorted_children(&self, key: SortKey) -> Vec<&StatNode> {
        sorted(&self.children, key)
    }

    /// Finds the first node, in depth-first order, whose function name is `name`.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&StatNode> {
        self.iter().find(|node| node.name() == name)
    }

    /// Finds the first node, in depth-first order, for `location`.
    #[must_use]
    pub fn find_location(&self, location: &CodeLocation) -> Option<&StatNode> {
        self.iter().find(|node| node.location() == *location)
    }

    /// Iterates over every node of the tree in depth-first order.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            pending: self.children.values().collect(),
        }
    }

    /// Adds the statistics of `other` to this tree, path by path.
    ///
    /// Use this to combine the results of separate profiling runs.
    pub fn merge(&mut self, other: &Self) {
        merge_into(&mut self.children, &other.children);
    }

    /// Credits one sample to every node of `path` and an exclusive sample to its leaf.
    pub(crate) fn record_sample(&mut self, path: &[CodeLocation]) {
        self.record_hit(path);
    }

    /// Credits one call to the leaf of `path` and to the inclusive count of every node on it.
    pub(crate) fn record_call(&mut self, path: &[CodeLocation]) {
        self.record_hit(path);
    }

    /// Credits the time of one completed activation to the leaf of `path`.
    ///
    /// Ancestors are not touched: they receive their own inclusive time when their own
    /// activations complete, which already covers this activation.
    pub(crate) fn record_return(&mut self, path: &[CodeLocation], timing: Timing) {
        self.walk(path, |node, is_leaf| {
            if is_leaf {
                node.deep_time = node.deep_time.saturating_add(timing.elapsed);
                node.own_time = node.own_time.saturating_add(timing.own);
            }
        });
    }

    fn record_hit(&mut self, path: &[CodeLocation]) {
        self.walk(path, |node, is_leaf| {
            node.deep_count = node.deep_count.saturating_add(1);

            if is_leaf {
                node.own_count = node.own_count.saturating_add(1);
            }
        });
    }

    /// Visits every node along `path` from the top down, creating missing nodes.
    fn walk(&mut self, path: &[CodeLocation], mut visit: impl FnMut(&mut StatNode, bool)) {
        let Some((first, rest)) = path.split_first() else {
            return;
        };

        let mut node = self
            .children
            .entry(*first)
            .or_insert_with(|| StatNode::new(*first));
        visit(&mut *node, rest.is_empty());

        for (position, location) in (1..).zip(rest) {
            node = node
                .children
                .entry(*location)
                .or_insert_with(|| StatNode::new(*location));
            visit(&mut *node, position == rest.len());
        }
    }
}

impl<'a> IntoIterator for &'a StatTree {
    type Item = &'a StatNode;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl StatNode {
    fn new(location: CodeLocation) -> Self {
        Self {
            location,
            own_count: 0,
            deep_count: 0,
            own_time: Duration::ZERO,
            deep_time: Duration::ZERO,
            children: HashMap::new(),
        }
    }

    /// The code location this node describes.
    #[must_use]
    pub fn location(&self) -> CodeLocation {
        self.location
    }

    /// The function name of [`location()`][Self::location].
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.location.function()
    }

    /// Calls (tracing) or samples (sampling) attributed to this frame alone.
    #[must_use]
    pub fn own_count(&self) -> u64 {
        self.own_count
    }

    /// Calls or samples observed on this frame or anywhere below it.
    #[must_use]
    pub fn deep_count(&self) -> u64 {
        self.deep_count
    }

    /// Time spent in this frame, excluding time spent in callees.
    ///
    /// Always zero for sampling profiles.
    #[must_use]
    pub fn own_time(&self) -> Duration {
        self.own_time
    }

    /// Time spent in this frame including every callee.
    ///
    /// Always zero for sampling profiles.
    #[must_use]
    pub fn deep_time(&self) -> Duration {
        self.deep_time
    }

    /// Mean exclusive time per call, or zero if the frame was never called.
    #[must_use]
    pub fn own_time_per_call(&self) -> Duration {
        per_call(self.own_time, self.own_count)
    }

    /// Mean inclusive time per call, or zero if the frame was never called.
    #[must_use]
    pub fn deep_time_per_call(&self) -> Duration {
        per_call(self.deep_time, self.own_count)
    }

    /// The nodes called from this node.
    pub fn children(&self) -> impl Iterator<Item = &Self> {
        self.children.values()
    }

    /// The node called from this node for `location`, if any.
    #[must_use]
    pub fn child(&self, location: &CodeLocation) -> Option<&Self> {
        self.children.get(location)
    }

    /// The nodes called from this node in the order given by `key`.
    #[must_use]
    pub fn sorted_children(&self, key: SortKey) -> Vec<&Self> {
        sorted(&self.children, key)
    }

    /// Finds the first node at or below this one, in depth-first order, whose function
    /// name is `name`.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&Self> {
        if self.name() == name {
            return Some(self);
        }

        Iter {
            pending: self.children.values().collect(),
        }
        .find(|node| node.name() == name)
    }
}

/// Depth-first iterator over the nodes of a [`StatTree`].
#[derive(Debug)]
pub struct Iter<'a> {
    pending: Vec<&'a StatNode>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a StatNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.pending.pop()?;
        self.pending.extend(node.children.values());
        Some(node)
    }
}

fn merge_into(into: &mut HashMap<CodeLocation, StatNode>, from: &HashMap<CodeLocation, StatNode>) {
    for (location, other) in from {
        let node = into
            .entry(*location)
            .or_insert_with(|| StatNode::new(*location));

        node.own_count = node.own_count.saturating_add(other.own_count);
        node.deep_count = node.deep_count.saturating_add(other.deep_count);
        node.own_time = node.own_time.saturating_add(other.own_time);
        node.deep_time = node.deep_time.saturating_add(other.deep_time);

        merge_into(&mut node.children, &other.children);
    }
}

fn sorted(nodes: &HashMap<CodeLocation, StatNode>, key: SortKey) -> Vec<&StatNode> {
    let mut sorted: Vec<_> = nodes.values().collect();

    sorted.sort_by(|a, b| {
        let primary = match key {
            SortKey::DeepTime => b.deep_time.cmp(&a.deep_time),
            SortKey::OwnTime => b.own_time.cmp(&a.own_time),
            SortKey::DeepCount => b.deep_count.cmp(&a.deep_count),
            SortKey::OwnCount => b.own_count.cmp(&a.own_count),
            SortKey::Name => a.name().cmp(b.name()),
        };

        primary.then_with(|| a.location.cmp(&b.location))
    });

    sorted
}

fn per_call(total: Duration, calls: u64) -> Duration {
    if calls == 0 {
        Duration::ZERO
    } else {
        Duration::from_nanos(
            total
                .as_nanos()
                .checked_div(u128::from(calls))
                .expect("guarded by if condition")
                .try_into()
                .unwrap_or(u64::MAX),
        )
    }
}
