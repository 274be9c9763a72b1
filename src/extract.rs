use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};

use crate::mapping;

static CARD_LINK_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a.modalCardDataOpen").unwrap());
static SERIES_OPTION_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.selectTitleCol option").unwrap());
static NAME_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h2.cardNameCol").unwrap());
static ENERGY_IMG_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("dl.needEnergyData img").unwrap());
static AP_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("dl.apData dd.cardDataContents").unwrap());
static CATEGORY_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("dl.categoryData dd.cardDataContents").unwrap());
static BP_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("dl.bpData dd.cardDataContents").unwrap());
static TRAITS_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("dl.attributeData dd.cardDataContents").unwrap());
static RARITY_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.cardNumCol span.rareData").unwrap());
static EFFECT_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("dl.effectData dd.cardDataContents").unwrap());
static TRIGGER_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("dl.triggerData dd.cardDataContents").unwrap());
static IMAGE_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("dl.cardImgTitleCol dd.cardDataImgCol img").unwrap());
static GEN_ENERGY_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("dl.generatedEnergyData img").unwrap());

static BRACKET_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[([^\]]+)\]").unwrap());
static ANGLE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<([^>]+)>").unwrap());

const PLACEHOLDER_IMAGE: &str = "comingsoon.png";

// ── Cardlist page ──

/// Pull raw card codes out of a cardlist page (the `card_no=` query of each
/// card link).
pub fn extract_card_codes(html: &str) -> Vec<String> {
    let doc = Html::parse_document(html);
    doc.select(&CARD_LINK_SEL)
        .filter_map(|el| el.value().attr("href"))
        .filter_map(|href| href.split_once("card_no=").map(|(_, code)| code.to_string()))
        .filter(|code| !code.is_empty())
        .collect()
}

/// Series codes offered by the cardlist filter dropdown.
pub fn extract_series_options(html: &str) -> Vec<String> {
    let doc = Html::parse_document(html);
    doc.select(&SERIES_OPTION_SEL)
        .filter_map(|el| el.value().attr("value"))
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

/// Drop action-point cards; they are tokens, not collectible printings.
pub fn filter_action_point_cards(codes: Vec<String>) -> Vec<String> {
    codes
        .into_iter()
        .filter(|code| !code.contains("-AP") && !code.contains("_AP"))
        .collect()
}

/// Dedup byte-identical codes, keeping first-seen order so allocation stays
/// deterministic across runs.
pub fn dedup_codes(codes: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    codes.into_iter().filter(|c| seen.insert(c.clone())).collect()
}

// ── Card detail page ──

/// Raw fields from one card detail page. Missing elements come back as "-",
/// matching what the page itself shows for blank stats.
#[derive(Debug, Clone)]
pub struct CardDetail {
    pub card_name: String,
    pub color: String,
    pub energy_cost: String,
    pub energy_gen: String,
    pub ap_cost: String,
    pub bp: String,
    pub category_jp: String,
    pub traits: String,
    pub rarity: String,
    pub effect: String,
    pub trigger_jp: String,
    pub image_url: String,
}

impl CardDetail {
    /// Pages for unreleased cards render with every stat blank.
    pub fn is_empty_card(&self) -> bool {
        self.ap_cost == "-" && self.category_jp == "-" && self.bp == "-"
    }

    pub fn has_placeholder_image(&self) -> bool {
        self.image_url.ends_with(PLACEHOLDER_IMAGE)
    }
}

pub fn extract_card_detail(html: &str, base_url: &str) -> CardDetail {
    let doc = Html::parse_document(html);

    let (color, energy_cost) = match first_attr(&doc, &ENERGY_IMG_SEL, "alt") {
        // alt is e.g. "赤2" or "黄-": a color character followed by the cost.
        Some(alt) => {
            let mut chars = alt.chars();
            let color_char = chars.next().map(String::from).unwrap_or_default();
            (mapping::color(&color_char).to_string(), chars.collect::<String>())
        }
        None => ("-".to_string(), "-".to_string()),
    };

    let energy_gen = match first_attr(&doc, &GEN_ENERGY_SEL, "alt") {
        Some(alt) if !alt.is_empty() => alt.chars().count().to_string(),
        _ => "-".to_string(),
    };

    let effect = doc
        .select(&EFFECT_SEL)
        .next()
        .map(effect_text)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "-".to_string());

    let image_url = first_attr(&doc, &IMAGE_SEL, "src")
        .map(|src| normalize_image_url(&src, base_url))
        .unwrap_or_default();

    CardDetail {
        card_name: sel_text(&doc, &NAME_SEL).unwrap_or_default(),
        color,
        energy_cost,
        energy_gen,
        ap_cost: sel_text_or_dash(&doc, &AP_SEL),
        bp: sel_text_or_dash(&doc, &BP_SEL),
        category_jp: sel_text_or_dash(&doc, &CATEGORY_SEL),
        traits: sel_text_or_dash(&doc, &TRAITS_SEL),
        rarity: sel_text_or_dash(&doc, &RARITY_SEL),
        effect,
        trigger_jp: sel_text_or_dash(&doc, &TRIGGER_SEL),
        image_url,
    }
}

fn sel_text(doc: &Html, sel: &Selector) -> Option<String> {
    doc.select(sel)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn sel_text_or_dash(doc: &Html, sel: &Selector) -> String {
    sel_text(doc, sel).unwrap_or_else(|| "-".to_string())
}

fn first_attr(doc: &Html, sel: &Selector, attr: &str) -> Option<String> {
    doc.select(sel)
        .next()
        .and_then(|el| el.value().attr(attr))
        .map(str::to_string)
}

/// Flatten effect markup: text nodes verbatim, icon images as `[Tag]`,
/// `<br>` as newline. Japanese angle brackets become ASCII ones.
fn effect_text(el: ElementRef) -> String {
    let mut parts: Vec<String> = Vec::new();
    for node in el.children() {
        match node.value() {
            Node::Text(t) => {
                let text = t.trim();
                if !text.is_empty() {
                    parts.push(text.to_string());
                }
            }
            Node::Element(e) => match e.name() {
                "img" => {
                    if let Some(alt) = e.attr("alt") {
                        if !alt.is_empty() {
                            parts.push(mapping::icon_tag(alt));
                        }
                    }
                }
                "br" => parts.push("\n".to_string()),
                _ => {}
            },
            _ => {}
        }
    }
    let joined = parts.concat().replace('〉', ">").replace('〈', "<");
    normalize_raid_lines(&joined)
}

/// Raid lines arrive with the raid target's traits and name interleaved
/// with layout text; keep only the `[..]` and `<..>` tokens after the tag.
fn normalize_raid_lines(effect: &str) -> String {
    effect
        .split('\n')
        .map(|line| match line.strip_prefix("[Raid]") {
            Some(rest) => {
                let mut parts = vec!["[Raid]".to_string()];
                for cap in BRACKET_RE.captures_iter(rest) {
                    parts.push(format!("[{}]", &cap[1]));
                }
                for cap in ANGLE_RE.captures_iter(rest) {
                    parts.push(format!("<{}>", &cap[1]));
                }
                parts.join(" ")
            }
            None => line.to_string(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn normalize_image_url(src: &str, base_url: &str) -> String {
    if src.starts_with("/jp/images/") {
        // Strip the cache-busting "?v7" style query.
        let clean = src.split('?').next().unwrap_or(src);
        format!("{}{}", base_url, clean)
    } else {
        src.to_string()
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://cards.example.test";

    #[test]
    fn card_codes_come_from_link_hrefs() {
        let html = r#"
            <div class="cardlistCol">
              <a class="modalCardDataOpen" href="detail.php?card_no=UAPR/ST01-001">x</a>
              <a class="modalCardDataOpen" href="detail.php?card_no=UAPR/ST01-001_p1">x</a>
              <a class="otherLink" href="detail.php?card_no=UAPR/ST01-099">x</a>
            </div>"#;
        let codes = extract_card_codes(html);
        assert_eq!(codes, vec!["UAPR/ST01-001", "UAPR/ST01-001_p1"]);
    }

    #[test]
    fn series_options_skip_the_empty_placeholder() {
        let html = r#"
            <div class="selectTitleCol">
              <option value="">すべて</option>
              <option value="ハンターハンター">ハンターハンター</option>
              <option value="呪術廻戦">呪術廻戦</option>
            </div>"#;
        let options = extract_series_options(html);
        assert_eq!(options, vec!["ハンターハンター", "呪術廻戦"]);
    }

    #[test]
    fn action_point_cards_are_filtered() {
        let codes = vec![
            "UAPR/ST01-001".to_string(),
            "UAPR/ST01-AP01".to_string(),
            "UAPR/ST01_AP02".to_string(),
        ];
        assert_eq!(filter_action_point_cards(codes), vec!["UAPR/ST01-001"]);
    }

    #[test]
    fn dedup_keeps_first_seen_order() {
        let codes = vec!["b".to_string(), "a".to_string(), "b".to_string()];
        assert_eq!(dedup_codes(codes), vec!["b", "a"]);
    }

    fn detail_html() -> String {
        r#"
        <dl class="cardImgTitleCol">
          <dd class="cardDataImgCol"><img src="/jp/images/cardlist/card/ST01-001.png?v7"></dd>
        </dl>
        <h2 class="cardNameCol">ゴン＝フリークス</h2>
        <div class="cardNumCol"><span class="rareData">SR★</span></div>
        <dl class="needEnergyData"><img alt="緑2"></dl>
        <dl class="generatedEnergyData"><img alt="緑緑"></dl>
        <dl class="apData"><dd class="cardDataContents">2</dd></dl>
        <dl class="categoryData"><dd class="cardDataContents">キャラクター</dd></dl>
        <dl class="bpData"><dd class="cardDataContents">3500</dd></dl>
        <dl class="attributeData"><dd class="cardDataContents">ハンター</dd></dl>
        <dl class="triggerData"><dd class="cardDataContents">カードを1枚引く。</dd></dl>
        <dl class="effectData"><dd class="cardDataContents">登場時<img alt="インパクト">相手を選ぶ。<br>手札を1枚引く。</dd></dl>
        "#
        .to_string()
    }

    #[test]
    fn detail_fields_are_extracted() {
        let d = extract_card_detail(&detail_html(), BASE);
        assert_eq!(d.card_name, "ゴン＝フリークス");
        assert_eq!(d.color, "green");
        assert_eq!(d.energy_cost, "2");
        assert_eq!(d.energy_gen, "2");
        assert_eq!(d.ap_cost, "2");
        assert_eq!(d.bp, "3500");
        assert_eq!(d.category_jp, "キャラクター");
        assert_eq!(d.traits, "ハンター");
        assert_eq!(d.rarity, "SR★");
        assert_eq!(d.trigger_jp, "カードを1枚引く。");
        assert!(!d.is_empty_card());
    }

    #[test]
    fn effect_walks_text_icons_and_breaks() {
        let d = extract_card_detail(&detail_html(), BASE);
        assert_eq!(d.effect, "登場時[Impact]相手を選ぶ。\n手札を1枚引く。");
    }

    #[test]
    fn image_url_is_normalized_against_the_base() {
        let d = extract_card_detail(&detail_html(), BASE);
        assert_eq!(
            d.image_url,
            "https://cards.example.test/jp/images/cardlist/card/ST01-001.png"
        );
        assert!(!d.has_placeholder_image());
    }

    #[test]
    fn placeholder_image_is_detected() {
        let html = r#"
        <dl class="cardImgTitleCol">
          <dd class="cardDataImgCol"><img src="/jp/images/cardlist/card/comingsoon.png"></dd>
        </dl>"#;
        let d = extract_card_detail(html, BASE);
        assert!(d.has_placeholder_image());
        assert!(d.is_empty_card());
    }

    #[test]
    fn raid_lines_keep_only_their_tokens() {
        let line = "[Raid] ［発生条件］ [ハンター] ゴン＝フリークス 〈ST01-001〉";
        let normalized = normalize_raid_lines(&line.replace('〈', "<").replace('〉', ">"));
        assert_eq!(normalized, "[Raid] [ハンター] <ST01-001>");
    }

    #[test]
    fn japanese_angle_brackets_become_ascii() {
        let html = r#"<dl class="effectData"><dd class="cardDataContents">〈ST01-001〉を選ぶ。</dd></dl>"#;
        let d = extract_card_detail(html, BASE);
        assert_eq!(d.effect, "<ST01-001>を選ぶ。");
    }
}
