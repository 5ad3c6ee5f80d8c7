//! Sequence operators
//!
//! [`SequenceOps`] is implemented for every slice. Selectors and predicates
//! are fallible (`Result<_, E>`) so a failing callback aborts the operator
//! and propagates unchanged; pure Rust callers use [`std::convert::Infallible`].

use indexmap::IndexMap;
use std::cmp::Ordering;
use std::hash::Hash;

/// Elements sharing a key, tagged with that key.
#[derive(Debug, Clone, PartialEq)]
pub struct Grouping<K, T> {
    key: K,
    items: Vec<T>,
}

impl<K, T> Grouping<K, T> {
    pub fn new(key: K, items: Vec<T>) -> Self {
        Self { key, items }
    }

    /// The shared key. Read-only: groups cannot be re-keyed.
    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}

/// Query operators over an ordered sequence
pub trait SequenceOps<T> {
    /// First occurrence per key, encounter order preserved.
    fn distinct_by<K, E, F>(&self, selector: F) -> Result<Vec<T>, E>
    where
        T: Clone,
        K: Hash + Eq,
        F: FnMut(&T) -> Result<K, E>;

    /// Positional pairs, truncated to the shorter side.
    fn zip_pairs<U: Clone>(&self, other: &[U]) -> Vec<(T, U)>
    where
        T: Clone;

    fn zip_with<U, R, E, F>(&self, other: &[U], combiner: F) -> Result<Vec<R>, E>
    where
        F: FnMut(&T, &U) -> Result<R, E>;

    /// Addition fold seeded with 0.
    fn sum_by<E, F>(&self, selector: F) -> Result<f64, E>
    where
        F: FnMut(&T) -> Result<f64, E>;

    /// Elements whose key is absent are skipped; `None` when no element has
    /// a key. Ties keep the earliest element.
    fn min_by_key_fallible<K, E, F>(&self, selector: F) -> Result<Option<&T>, E>
    where
        K: Ord,
        F: FnMut(&T) -> Result<Option<K>, E>;

    /// Elements whose key is absent are skipped; `None` when no element has
    /// a key. Ties keep the earliest element.
    fn max_by_key_fallible<K, E, F>(&self, selector: F) -> Result<Option<&T>, E>
    where
        K: Ord,
        F: FnMut(&T) -> Result<Option<K>, E>;

    /// `None` on empty input instead of a NaN.
    fn average_by<E, F>(&self, selector: F) -> Result<Option<f64>, E>
    where
        F: FnMut(&T) -> Result<f64, E>;

    /// Groups in first-encounter-of-key order; source order within a group.
    fn group_by_key<K, E, F>(&self, key_selector: F) -> Result<Vec<Grouping<K, T>>, E>
    where
        T: Clone,
        K: Hash + Eq,
        F: FnMut(&T) -> Result<K, E>;

    fn first_matching<E, F>(&self, predicate: F) -> Result<Option<&T>, E>
    where
        F: FnMut(&T) -> Result<bool, E>;

    fn last_matching<E, F>(&self, predicate: F) -> Result<Option<&T>, E>
    where
        F: FnMut(&T) -> Result<bool, E>;

    /// Stable ascending sort; absent keys sort before present ones.
    fn sort_by_optional_key<K, E, F>(&self, selector: F) -> Result<Vec<T>, E>
    where
        T: Clone,
        K: Ord,
        F: FnMut(&T) -> Result<Option<K>, E>;

    /// Stable descending sort; absent keys sort after present ones.
    fn sort_by_optional_key_descending<K, E, F>(&self, selector: F) -> Result<Vec<T>, E>
    where
        T: Clone,
        K: Ord,
        F: FnMut(&T) -> Result<Option<K>, E>;
}

fn pick_by_key<'a, T, K, E, F>(
    items: &'a [T],
    mut selector: F,
    better: Ordering,
) -> Result<Option<&'a T>, E>
where
    K: Ord,
    F: FnMut(&T) -> Result<Option<K>, E>,
{
    let mut best: Option<(&T, K)> = None;
    for item in items {
        let Some(key) = selector(item)? else {
            continue;
        };
        let replace = match &best {
            None => true,
            Some((_, current)) => key.cmp(current) == better,
        };
        if replace {
            best = Some((item, key));
        }
    }
    Ok(best.map(|(item, _)| item))
}

fn sort_keyed<T, K, E, F>(items: &[T], mut selector: F, descending: bool) -> Result<Vec<T>, E>
where
    T: Clone,
    K: Ord,
    F: FnMut(&T) -> Result<Option<K>, E>,
{
    let mut keyed = items
        .iter()
        .map(|item| selector(item).map(|key| (key, item)))
        .collect::<Result<Vec<_>, E>>()?;

    keyed.sort_by(|(a, _), (b, _)| match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) if descending => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) if descending => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) if descending => b.cmp(a),
        (Some(a), Some(b)) => a.cmp(b),
    });

    Ok(keyed.into_iter().map(|(_, item)| item.clone()).collect())
}

/// Stable bottom-up merge sort driven by a fallible comparator.
///
/// The comparator need not be consistent: an incoherent ordering yields
/// some permutation of the input rather than a panic. The first comparator
/// error aborts the sort.
pub fn merge_sort_by<T, E, F>(items: &[T], mut compare: F) -> Result<Vec<T>, E>
where
    T: Clone,
    F: FnMut(&T, &T) -> Result<Ordering, E>,
{
    let mut current = items.to_vec();
    let mut width = 1;
    while width < current.len() {
        let mut merged = Vec::with_capacity(current.len());
        for start in (0..current.len()).step_by(2 * width) {
            let mid = (start + width).min(current.len());
            let end = (start + 2 * width).min(current.len());
            let (mut i, mut j) = (start, mid);
            while i < mid && j < end {
                // take from the right run only when strictly smaller
                if compare(&current[j], &current[i])? == Ordering::Less {
                    merged.push(current[j].clone());
                    j += 1;
                } else {
                    merged.push(current[i].clone());
                    i += 1;
                }
            }
            merged.extend_from_slice(&current[i..mid]);
            merged.extend_from_slice(&current[j..end]);
        }
        current = merged;
        width *= 2;
    }
    Ok(current)
}

impl<T> SequenceOps<T> for [T] {
    fn distinct_by<K, E, F>(&self, mut selector: F) -> Result<Vec<T>, E>
    where
        T: Clone,
        K: Hash + Eq,
        F: FnMut(&T) -> Result<K, E>,
    {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for item in self {
            if seen.insert(selector(item)?) {
                out.push(item.clone());
            }
        }
        Ok(out)
    }

    fn zip_pairs<U: Clone>(&self, other: &[U]) -> Vec<(T, U)>
    where
        T: Clone,
    {
        self.iter().cloned().zip(other.iter().cloned()).collect()
    }

    fn zip_with<U, R, E, F>(&self, other: &[U], mut combiner: F) -> Result<Vec<R>, E>
    where
        F: FnMut(&T, &U) -> Result<R, E>,
    {
        self.iter().zip(other).map(|(a, b)| combiner(a, b)).collect()
    }

    fn sum_by<E, F>(&self, mut selector: F) -> Result<f64, E>
    where
        F: FnMut(&T) -> Result<f64, E>,
    {
        self.iter().try_fold(0.0, |acc, item| Ok(acc + selector(item)?))
    }

    fn min_by_key_fallible<K, E, F>(&self, selector: F) -> Result<Option<&T>, E>
    where
        K: Ord,
        F: FnMut(&T) -> Result<Option<K>, E>,
    {
        pick_by_key(self, selector, Ordering::Less)
    }

    fn max_by_key_fallible<K, E, F>(&self, selector: F) -> Result<Option<&T>, E>
    where
        K: Ord,
        F: FnMut(&T) -> Result<Option<K>, E>,
    {
        pick_by_key(self, selector, Ordering::Greater)
    }

    fn average_by<E, F>(&self, selector: F) -> Result<Option<f64>, E>
    where
        F: FnMut(&T) -> Result<f64, E>,
    {
        if self.is_empty() {
            return Ok(None);
        }
        let total = self.sum_by(selector)?;
        Ok(Some(total / self.len() as f64))
    }

    fn group_by_key<K, E, F>(&self, mut key_selector: F) -> Result<Vec<Grouping<K, T>>, E>
    where
        T: Clone,
        K: Hash + Eq,
        F: FnMut(&T) -> Result<K, E>,
    {
        let mut groups: IndexMap<K, Vec<T>> = IndexMap::new();
        for item in self {
            groups
                .entry(key_selector(item)?)
                .or_default()
                .push(item.clone());
        }
        Ok(groups
            .into_iter()
            .map(|(key, items)| Grouping::new(key, items))
            .collect())
    }

    fn first_matching<E, F>(&self, mut predicate: F) -> Result<Option<&T>, E>
    where
        F: FnMut(&T) -> Result<bool, E>,
    {
        for item in self {
            if predicate(item)? {
                return Ok(Some(item));
            }
        }
        Ok(None)
    }

    fn last_matching<E, F>(&self, mut predicate: F) -> Result<Option<&T>, E>
    where
        F: FnMut(&T) -> Result<bool, E>,
    {
        for item in self.iter().rev() {
            if predicate(item)? {
                return Ok(Some(item));
            }
        }
        Ok(None)
    }

    fn sort_by_optional_key<K, E, F>(&self, selector: F) -> Result<Vec<T>, E>
    where
        T: Clone,
        K: Ord,
        F: FnMut(&T) -> Result<Option<K>, E>,
    {
        sort_keyed(self, selector, false)
    }

    fn sort_by_optional_key_descending<K, E, F>(&self, selector: F) -> Result<Vec<T>, E>
    where
        T: Clone,
        K: Ord,
        F: FnMut(&T) -> Result<Option<K>, E>,
    {
        sort_keyed(self, selector, true)
    }
}
