use std::collections::HashSet;

/// Outcome of comparing a known identifier set against a freshly scraped one.
///
/// `missing` needs scraping; `extra` is only ever reported — nothing here
/// deletes store records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    /// Present at the source, absent from the store.
    pub missing: HashSet<String>,
    /// Present in the store, absent from the source.
    pub extra: HashSet<String>,
    pub matching_count: usize,
}

impl Reconciliation {
    pub fn in_sync(&self) -> bool {
        self.missing.is_empty() && self.extra.is_empty()
    }
}

/// Pure set difference in both directions. Order-independent; callers sort
/// before display.
pub fn reconcile(known: &HashSet<String>, current: &HashSet<String>) -> Reconciliation {
    let missing: HashSet<String> = current.difference(known).cloned().collect();
    let extra: HashSet<String> = known.difference(current).cloned().collect();
    let matching_count = known.len() - extra.len();
    Reconciliation {
        missing,
        extra,
        matching_count,
    }
}

/// Stable display order for a reconciled set.
pub fn sorted(ids: &HashSet<String>) -> Vec<&str> {
    let mut out: Vec<&str> = ids.iter().map(String::as_str).collect();
    out.sort_unstable();
    out
}

// ── Tests ──
