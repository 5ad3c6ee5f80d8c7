//! Operator registry
//!
//! The set of query operators made available to every query. The registry
//! is built once per process and never torn down; building it skips any
//! name the host built-ins already provide for the same receiver, so a host
//! method always wins over an operator.

use indexmap::IndexMap;
use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing::debug;

/// What kind of value an operator is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Receiver {
    /// Arrays and groups
    Sequence,
    /// Strings
    Text,
    /// Any non-string value (objects, arrays, numbers, ...)
    Structured,
}

/// Catalog entry for one operator
#[derive(Debug, Clone, Serialize)]
pub struct OperatorSpec {
    pub name: &'static str,
    pub receiver: Receiver,
    pub signature: &'static str,
    pub description: &'static str,
}

const fn op(
    name: &'static str,
    receiver: Receiver,
    signature: &'static str,
    description: &'static str,
) -> OperatorSpec {
    OperatorSpec {
        name,
        receiver,
        signature,
        description,
    }
}

pub const CATALOG: &[OperatorSpec] = &[
    op(
        "distinct",
        Receiver::Sequence,
        "distinct(selector?) -> seq",
        "Keeps the first occurrence per key, in encounter order.",
    ),
    op(
        "zip",
        Receiver::Sequence,
        "zip(other, combiner?) -> seq",
        "Pairs elements positionally; the result is as long as the shorter input.",
    ),
    op(
        "sum",
        Receiver::Sequence,
        "sum(selector?) -> number",
        "Adds numeric elements (or selector outputs), starting from 0.",
    ),
    op(
        "min",
        Receiver::Sequence,
        "min(selector?) -> element",
        "Smallest element; compares selector outputs when given. undefined on empty input.",
    ),
    op(
        "max",
        Receiver::Sequence,
        "max(selector?) -> element",
        "Largest element; compares selector outputs when given. undefined on empty input.",
    ),
    op(
        "average",
        Receiver::Sequence,
        "average(selector?) -> number",
        "Arithmetic mean; undefined on empty input.",
    ),
    op(
        "groupBy",
        Receiver::Sequence,
        "groupBy(keySelector) -> Group[]",
        "Groups elements by key in first-encounter order. Each group has a read-only key.",
    ),
    op(
        "first",
        Receiver::Sequence,
        "first(predicate?) -> element",
        "First (matching) element; fails when there is none.",
    ),
    op(
        "last",
        Receiver::Sequence,
        "last(predicate?) -> element",
        "Last (matching) element; fails when there is none.",
    ),
    op(
        "firstOrDefault",
        Receiver::Sequence,
        "firstOrDefault(predicate?) -> element | undefined",
        "Like first, but returns undefined instead of failing.",
    ),
    op(
        "lastOrDefault",
        Receiver::Sequence,
        "lastOrDefault(predicate?) -> element | undefined",
        "Like last, but returns undefined instead of failing.",
    ),
    op(
        "sortBy",
        Receiver::Sequence,
        "sortBy(selector) -> seq",
        "Stable ascending sort by key; null and undefined keys come first.",
    ),
    op(
        "sortByDescending",
        Receiver::Sequence,
        "sortByDescending(selector) -> seq",
        "Stable descending sort by key; null and undefined keys come last.",
    ),
    op(
        "json",
        Receiver::Text,
        "json(typeHint?) -> value | null",
        "Parses the text as JSON after turning single quotes into double quotes; null on failure.",
    ),
    op(
        "json",
        Receiver::Structured,
        "json(indent?) -> string",
        "Serialises the value as JSON, indented when a width is given.",
    ),
];

static INSTALLED: OnceCell<OperatorLibrary> = OnceCell::new();

/// Operators available to queries, keyed by receiver and name.
#[derive(Debug, Clone)]
pub struct OperatorLibrary {
    operators: IndexMap<(Receiver, &'static str), &'static OperatorSpec>,
    shadowed: Vec<&'static OperatorSpec>,
}

impl OperatorLibrary {
    /// Build a registry against the given host method table.
    pub fn build(host_provides: impl Fn(Receiver, &str) -> bool) -> Self {
        let mut operators = IndexMap::new();
        let mut shadowed = Vec::new();
        for spec in CATALOG {
            if host_provides(spec.receiver, spec.name) {
                debug!(name = spec.name, receiver = ?spec.receiver, "host already provides operator, skipping");
                shadowed.push(spec);
                continue;
            }
            operators.entry((spec.receiver, spec.name)).or_insert(spec);
        }
        Self {
            operators,
            shadowed,
        }
    }

    /// Process-wide registry. The first call builds it; later calls return
    /// the same instance regardless of their argument.
    pub fn install(host_provides: fn(Receiver, &str) -> bool) -> &'static OperatorLibrary {
        INSTALLED.get_or_init(|| {
            let library = OperatorLibrary::build(host_provides);
            debug!(
                operators = library.operators.len(),
                shadowed = library.shadowed.len(),
                "operator library installed"
            );
            library
        })
    }

    pub fn provides(&self, receiver: Receiver, name: &str) -> bool {
        self.operators.contains_key(&(receiver, name))
    }

    /// Names known to the catalog for any receiver.
    pub fn knows(&self, name: &str) -> bool {
        self.operators.keys().any(|(_, n)| *n == name)
    }

    pub fn catalog(&self) -> impl Iterator<Item = &'static OperatorSpec> + '_ {
        self.operators.values().copied()
    }

    /// Operators skipped because the host already has the name.
    pub fn shadowed(&self) -> &[&'static OperatorSpec] {
        &self.shadowed
    }
}
