//! Fixed Japanese→English lookup tables for card attributes. These are
//! game-rule vocabulary, not free text, so they are mapped locally instead
//! of being sent through the translator.

const COLORS: &[(&str, &str)] = &[
    ("黄", "yellow"),
    ("赤", "red"),
    ("青", "blue"),
    ("緑", "green"),
    ("紫", "purple"),
    ("無", "colorless"),
];

const CATEGORIES: &[(&str, &str)] = &[
    ("キャラクター", "character"),
    ("フィールド", "field"),
    ("イベント", "event"),
];

const TRIGGER_STATES: &[(&str, &str)] = &[
    ("カードを1枚引く。", "draw"),
    ("このカードを手札に加える。", "get"),
    (
        "このカードを手札に加えるか、必要エナジーを満たしている場合、レイドさせる。",
        "raid",
    ),
    (
        "自分の場のキャラを1枚選び、アクティブにし、このターン中、BP+3000。",
        "active",
    ),
    ("相手のフロントLのキャラを1枚選び、退場させる。", "special"),
    (
        "自分のライフが無い場合、自分の山札の上から1枚を自分のライフエリアに置く。",
        "final",
    ),
    (
        "相手のフロントLのキャラを1枚選び、レストにする。それは次の1回アクティブにならない。",
        "color_yellow",
    ),
    ("BP2500以下の相手のフロントLのキャラを1枚選び、退場させる。", "color_red"),
    ("BP3500以下の相手のフロントLのキャラを1枚選び、手札に戻す。", "color_blue"),
    (
        "自分の手札から必要エナジーが2以下で消費APが1の緑のキャラカードを1枚自分の場にアクティブで登場させる。",
        "color_green",
    ),
    (
        "自分の場外から必要エナジーが2以下で消費APが1の紫のキャラカードを1枚自分のフロントLにアクティブで登場させる。",
        "color_purple",
    ),
];

const TRIGGER_TEXTS: &[(&str, &str)] = &[
    ("draw", "Draw a card."),
    ("get", "Add this card to your hand."),
    ("raid", "Add this to hand or Raid it if you have the required energy."),
    ("active", "Active 1 of your character and give it +3000BP."),
    (
        "special",
        "Choose one of your opponent's Front Line characters and retire it.",
    ),
    (
        "final",
        "If you have no life, place the top card of your deck into your life area.",
    ),
    (
        "color_yellow",
        "Choose 1 character on your opponent's front line and rest it. The next time it becomes active, it doesn't.",
    ),
    (
        "color_red",
        "Choose one of your opponent's Front Line characters with BP2500 or less and retire it.",
    ),
    (
        "color_blue",
        "Choose one of your opponent's Front Line characters with BP3500 or less, and return it to their hand.",
    ),
    (
        "color_green",
        "Play 1 Green Character Card with required energy of 2 or less and AP 1 from your hand to your area and set it to active.",
    ),
    (
        "color_purple",
        "Play a purple character with 2 Energy cost or less and 1 AP from Outside Area to your Front Line in Active.",
    ),
];

// Effect-text icons rendered as <img> tags on the detail page.
const ICON_TAGS: &[(&str, &str)] = &[
    ("レイド", "[Raid]"),
    ("インパクト（1）", "[Impact 1]"),
    ("インパクト（2）", "[Impact 2]"),
    ("インパクト（3）", "[Impact 3]"),
    ("インパクト（4）", "[Impact 4]"),
    ("インパクト（+1）", "[Impact +1]"),
    ("インパクト", "[Impact]"),
    ("2回ブロック", "[Block x2]"),
    ("2回アタック", "[Attack x2]"),
    ("狙い撃ち", "[Snipe]"),
    ("ステップ", "[Step]"),
    ("ダメージ（2）", "[Damage 2]"),
    ("ダメージ（3）", "[Damage 3]"),
    ("ダメージ（+1）", "[Damage +1]"),
    ("ダメージ", "[Damage]"),
];

fn lookup<'a>(table: &'a [(&str, &str)], key: &str) -> Option<&'a str> {
    table.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
}

pub fn color(jp_char: &str) -> &str {
    lookup(COLORS, jp_char).unwrap_or("")
}

pub fn category(jp: &str) -> &str {
    lookup(CATEGORIES, jp).unwrap_or("-")
}

/// Collapse a Japanese trigger sentence into its state keyword. Color
/// triggers keep their specific keyword here; callers wanting the generic
/// group use [`trigger_group`].
pub fn trigger_state(jp: &str) -> &str {
    lookup(TRIGGER_STATES, jp).unwrap_or("-")
}

/// The stored trigger-state groups every `color_*` state as plain "color".
pub fn trigger_group(state: &str) -> &str {
    if state.starts_with("color") {
        "color"
    } else {
        state
    }
}

pub fn trigger_text(state: &str) -> &str {
    lookup(TRIGGER_TEXTS, state).unwrap_or("-")
}

/// English tag for an effect icon's alt text; unknown icons are wrapped in
/// brackets rather than dropped.
pub fn icon_tag(alt: &str) -> String {
    match lookup(ICON_TAGS, alt) {
        Some(tag) => tag.to_string(),
        None => format!("[{}]", alt),
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colors_map_by_leading_character() {
        assert_eq!(color("赤"), "red");
        assert_eq!(color("無"), "colorless");
        assert_eq!(color("?"), "");
    }

    #[test]
    fn trigger_states_collapse_to_groups() {
        let state = trigger_state("カードを1枚引く。");
        assert_eq!(state, "draw");
        assert_eq!(trigger_group(state), "draw");
        assert_eq!(trigger_group("color_red"), "color");
    }

    #[test]
    fn trigger_text_follows_state() {
        assert_eq!(trigger_text("draw"), "Draw a card.");
        assert_eq!(trigger_text("-"), "-");
    }

    #[test]
    fn unknown_icons_keep_their_alt_text() {
        assert_eq!(icon_tag("インパクト"), "[Impact]");
        assert_eq!(icon_tag("謎のアイコン"), "[謎のアイコン]");
    }
}
