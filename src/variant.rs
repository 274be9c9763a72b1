use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;

use crate::batch::ItemError;

// Source-side variant markers: "_p1"/"_p2" (official alternate-art prints)
// and "@1"/"@2" (wiki-style reprint tags).
static SOURCE_MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:_p(\d+)|@(\d+))$").unwrap());

static ALT_SUFFIX_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"_ALT(\d*)$").unwrap());

/// A raw card code split into its identifying parts.
///
/// Raw codes look like `UAPR/ST01-001_p1`: a booster prefix, then the
/// printed card uid. Codes without a `/` are their own booster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCode {
    pub raw: String,
    pub booster: String,
    pub card_uid: String,
    /// Card identity with all variant markers stripped.
    pub logical_id: String,
    pub anime_code: String,
}

pub fn parse_raw_code(raw: &str) -> Result<ParsedCode, ItemError> {
    let raw = raw.trim();
    if raw.is_empty() || raw.chars().any(char::is_whitespace) {
        return Err(ItemError::MalformedCode(format!("unusable card code {:?}", raw)));
    }

    let (booster, card_uid) = match raw.split_once('/') {
        Some((b, u)) => (b.to_string(), u.to_string()),
        None => (raw.to_string(), raw.to_string()),
    };
    if card_uid.is_empty() || booster.is_empty() {
        return Err(ItemError::MalformedCode(format!("unusable card code {:?}", raw)));
    }

    let logical_id = derive_logical_id(&card_uid);
    if logical_id.is_empty() {
        return Err(ItemError::MalformedCode(format!(
            "card uid {:?} is nothing but variant markers",
            card_uid
        )));
    }

    let anime_code = logical_id
        .split('-')
        .next()
        .unwrap_or(&logical_id)
        .to_lowercase();

    Ok(ParsedCode {
        raw: raw.to_string(),
        booster,
        card_uid,
        logical_id,
        anime_code,
    })
}

/// Strip variant markers (`_p<n>`, `@<n>`, `_ALT`/`_ALT<n>`) from a card uid.
///
/// Two raw codes that normalize to the same logical id are printings of the
/// same card.
pub fn derive_logical_id(card_uid: &str) -> String {
    let mut id = card_uid.to_string();
    loop {
        let stripped = SOURCE_MARKER_RE.replace(&id, "").to_string();
        let stripped = ALT_SUFFIX_RE.replace(&stripped, "").to_string();
        if stripped == id {
            return id;
        }
        id = stripped;
    }
}

/// Promo printings carry a `-P-` marker and are always unique; they keep
/// their raw uid and never receive an ALT suffix.
pub fn is_promo(card_uid: &str) -> bool {
    card_uid.contains("-P-")
}

/// Per-run allocation memory: highest variant index issued per logical id
/// (0 = the bare base form). Re-derived from the store every run, never
/// persisted.
#[derive(Debug, Default)]
pub struct AllocationState {
    issued: HashMap<String, u32>,
}

impl AllocationState {
    pub fn new() -> Self {
        Self::default()
    }

    fn issued_index(&self, logical_id: &str) -> Option<u32> {
        self.issued.get(logical_id).copied()
    }

    fn record(&mut self, logical_id: &str, index: u32) {
        let entry = self.issued.entry(logical_id.to_string()).or_insert(index);
        if *entry < index {
            *entry = index;
        }
    }
}

/// Assign the stable uid for one raw printing.
///
/// `existing_uids` is the set of uids already stored for this logical id,
/// queried fresh per run. The result depends only on that set, the explicit
/// run state, and the code itself, so a crashed run re-derives the same
/// answer on retry.
pub fn allocate(
    code: &ParsedCode,
    existing_uids: &HashSet<String>,
    state: &mut AllocationState,
) -> String {
    if is_promo(&code.card_uid) {
        return code.card_uid.clone();
    }

    // Explicit source markers map deterministically: _p1 → _ALT, _pN → _ALTN.
    if let Some(index) = source_marker_index(&code.card_uid) {
        state.record(&code.logical_id, index);
        return render_uid(&code.logical_id, index);
    }

    // A uid already suffixed _ALT by its source passes through unchanged.
    if let Some(index) = alt_index_of(&code.card_uid, &code.logical_id) {
        if index > 0 {
            state.record(&code.logical_id, index);
            return code.card_uid.clone();
        }
    }

    let max_existing = max_alt_index(existing_uids, &code.logical_id);
    match state.issued_index(&code.logical_id) {
        // First ever occurrence: nothing stored, nothing issued this run.
        None if existing_uids.is_empty() => {
            state.record(&code.logical_id, 0);
            code.logical_id.clone()
        }
        prior => {
            let next = max_existing.max(prior.unwrap_or(0)) + 1;
            state.record(&code.logical_id, next);
            render_uid(&code.logical_id, next)
        }
    }
}

/// Highest ALT index among stored uids for a logical id. The bare base form
/// and an empty set both count as 0.
pub fn max_alt_index(existing_uids: &HashSet<String>, logical_id: &str) -> u32 {
    existing_uids
        .iter()
        .filter_map(|uid| alt_index_of(uid, logical_id))
        .max()
        .unwrap_or(0)
}

/// Variant index encoded by a uid: the bare logical id is 0, `_ALT` is 1,
/// `_ALT<n>` is n. Uids of other logical ids yield None.
fn alt_index_of(uid: &str, logical_id: &str) -> Option<u32> {
    if uid == logical_id {
        return Some(0);
    }
    let suffix = uid.strip_prefix(logical_id)?;
    let caps = ALT_SUFFIX_RE.captures(suffix)?;
    if caps.get(0)?.start() != 0 {
        return None;
    }
    if caps[1].is_empty() {
        Some(1)
    } else {
        caps[1].parse().ok()
    }
}

fn source_marker_index(card_uid: &str) -> Option<u32> {
    let caps = SOURCE_MARKER_RE.captures(card_uid)?;
    let digits = caps.get(1).or_else(|| caps.get(2))?;
    digits.as_str().parse().ok()
}

fn render_uid(logical_id: &str, index: u32) -> String {
    match index {
        0 => logical_id.to_string(),
        1 => format!("{}_ALT", logical_id),
        n => format!("{}_ALT{}", logical_id, n),
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(raw: &str) -> ParsedCode {
        parse_raw_code(raw).unwrap()
    }

    fn uids(list: &[&str]) -> HashSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parse_splits_booster_and_uid() {
        let code = parsed("UAPR/ST01-001_p1");
        assert_eq!(code.booster, "UAPR");
        assert_eq!(code.card_uid, "ST01-001_p1");
        assert_eq!(code.logical_id, "ST01-001");
        assert_eq!(code.anime_code, "st01");
    }

    #[test]
    fn parse_without_booster_prefix() {
        let code = parsed("ST01-001");
        assert_eq!(code.booster, "ST01-001");
        assert_eq!(code.card_uid, "ST01-001");
        assert_eq!(code.logical_id, "ST01-001");
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!(parse_raw_code("").is_err());
        assert!(parse_raw_code("   ").is_err());
        assert!(parse_raw_code("UAPR/ST01 001").is_err());
        assert!(parse_raw_code("UAPR/").is_err());
    }

    #[test]
    fn logical_id_strips_all_marker_kinds() {
        assert_eq!(derive_logical_id("ST01-001_p2"), "ST01-001");
        assert_eq!(derive_logical_id("ST01-001@3"), "ST01-001");
        assert_eq!(derive_logical_id("ST01-001_ALT2"), "ST01-001");
        assert_eq!(derive_logical_id("ST01-001"), "ST01-001");
    }

    #[test]
    fn first_occurrence_gets_bare_id() {
        let mut state = AllocationState::new();
        let uid = allocate(&parsed("UAPR/ST01-001"), &HashSet::new(), &mut state);
        assert_eq!(uid, "ST01-001");
    }

    #[test]
    fn within_run_collision_gets_alt() {
        // End-to-end scenario: ["UAPR/ST01-001", "UAPR/ST01-001_p1"] with an
        // empty store allocates ["ST01-001", "ST01-001_ALT"].
        let mut state = AllocationState::new();
        let empty = HashSet::new();
        let first = allocate(&parsed("UAPR/ST01-001"), &empty, &mut state);
        let second = allocate(&parsed("UAPR/ST01-001_p1"), &empty, &mut state);
        assert_eq!(first, "ST01-001");
        assert_eq!(second, "ST01-001_ALT");
        assert_ne!(first, second);
    }

    #[test]
    fn marker_maps_against_populated_store() {
        // End-to-end scenario: "_p2" with {base, _ALT} stored yields _ALT2.
        let mut state = AllocationState::new();
        let existing = uids(&["ST01-001", "ST01-001_ALT"]);
        let uid = allocate(&parsed("UAPR/ST01-001_p2"), &existing, &mut state);
        assert_eq!(uid, "ST01-001_ALT2");
    }

    #[test]
    fn allocation_is_monotonic_over_store_state() {
        let mut state = AllocationState::new();
        let existing = uids(&["X", "X_ALT", "X_ALT2"]);
        let uid = allocate(&parsed("UAPR/X"), &existing, &mut state);
        assert_eq!(uid, "X_ALT3");
    }

    #[test]
    fn allocation_is_deterministic() {
        let existing = uids(&["ST01-001", "ST01-001_ALT"]);
        let a = allocate(&parsed("UAPR/ST01-001"), &existing, &mut AllocationState::new());
        let b = allocate(&parsed("UAPR/ST01-001"), &existing, &mut AllocationState::new());
        assert_eq!(a, b);
        assert_eq!(a, "ST01-001_ALT2");
    }

    #[test]
    fn base_only_store_bumps_to_alt() {
        let mut state = AllocationState::new();
        let existing = uids(&["ST01-001"]);
        let uid = allocate(&parsed("UAPR/ST01-001"), &existing, &mut state);
        assert_eq!(uid, "ST01-001_ALT");
    }

    #[test]
    fn promo_codes_are_exempt() {
        let mut state = AllocationState::new();
        let existing = uids(&["UA25NS-P-001"]);
        let code = parsed("UAPR/UA25NS-P-001");
        assert_eq!(allocate(&code, &existing, &mut state), "UA25NS-P-001");
        // Exemption leaves no run-state footprint.
        assert!(state.issued_index("UA25NS-P-001").is_none());
    }

    #[test]
    fn explicit_alt_suffix_passes_through() {
        let mut state = AllocationState::new();
        let code = parsed("UAPR/ST01-001_ALT");
        assert_eq!(allocate(&code, &HashSet::new(), &mut state), "ST01-001_ALT");
    }

    #[test]
    fn marker_passthrough_seeds_run_state() {
        // After _p2 → _ALT2, an unmarked duplicate in the same run must not
        // be handed _ALT2 again.
        let mut state = AllocationState::new();
        let empty = HashSet::new();
        let mapped = allocate(&parsed("UAPR/ST01-001_p2"), &empty, &mut state);
        assert_eq!(mapped, "ST01-001_ALT2");
        let next = allocate(&parsed("UAPR/ST01-001"), &empty, &mut state);
        assert_eq!(next, "ST01-001_ALT3");
    }

    #[test]
    fn at_sign_marker_behaves_like_p_marker() {
        let mut state = AllocationState::new();
        let uid = allocate(&parsed("DM23/BD01-002@1"), &HashSet::new(), &mut state);
        assert_eq!(uid, "BD01-002_ALT");
    }

    #[test]
    fn max_alt_index_ignores_other_logical_ids() {
        let existing = uids(&["ST01-001", "ST01-001_ALT2", "ST01-0012_ALT5"]);
        assert_eq!(max_alt_index(&existing, "ST01-001"), 2);
    }
}
