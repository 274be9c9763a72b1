use std::collections::BTreeMap;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::batch::{BatchMode, BatchTracker, ItemError, RunSummary};
use crate::checkpoint::CheckpointFile;
use crate::db::{self, CardRecord};
use crate::extract;
use crate::fetch::Fetcher;
use crate::mapping;
use crate::reconcile::{reconcile, sorted};
use crate::series::SeriesMap;
use crate::translate::Translator;
use crate::upload::Uploader;
use crate::variant::{self, AllocationState};

const BASE_URL: &str = "https://www.unionarena-tcg.com";
const CHECKPOINT_DIR: &str = "data";
const IMAGE_PREFIX: &str = "UD";

pub struct ScrapeOptions {
    pub limit: Option<usize>,
    pub mode: BatchMode,
}

/// External collaborators, built once per run. Translator and uploader are
/// optional; the pipeline degrades to untranslated text and publisher image
/// URLs when they are not configured.
pub struct Collaborators {
    fetcher: Fetcher,
    translator: Option<Translator>,
    uploader: Option<Uploader>,
}

impl Collaborators {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            fetcher: Fetcher::new()?,
            translator: Translator::from_env()?,
            uploader: Uploader::from_env()?,
        })
    }
}

// ── Series check ──

/// Reconcile the publisher's series dropdown against the local series map.
/// With `update`, new series are translated and merged into the map file.
pub async fn check_series(series_map: &mut SeriesMap, update: bool) -> Result<()> {
    let fetcher = Fetcher::new()?;
    let html = fetcher
        .fetch_page(&format!("{}/jp/cardlist/", BASE_URL))
        .await?;
    let current: std::collections::HashSet<String> =
        extract::extract_series_options(&html).into_iter().collect();
    let known = series_map.known_codes();
    let recon = reconcile(&known, &current);

    println!("Series on site: {}", current.len());
    println!("Series mapped:  {} ({} matching)", known.len(), recon.matching_count);

    if recon.in_sync() {
        println!("Series map is up to date.");
        return Ok(());
    }
    if !recon.missing.is_empty() {
        println!("\nNew series not yet mapped:");
        for code in sorted(&recon.missing) {
            println!("  - {}", code);
        }
    }
    if !recon.extra.is_empty() {
        // Never auto-deleted; a retired listing may come back.
        println!("\nMapped series no longer on the site (left untouched):");
        for code in sorted(&recon.extra) {
            println!("  - {} -> {}", code, series_map.title_for(code));
        }
    }

    if update && !recon.missing.is_empty() {
        let added = recon.missing.len();
        let new_entries = translate_series_titles(&recon).await?;
        series_map.merge(new_entries);
        series_map.save()?;
        println!("\nAdded {} series to the map ({} total).", added, series_map.len());
    }
    Ok(())
}

async fn translate_series_titles(
    recon: &crate::reconcile::Reconciliation,
) -> Result<BTreeMap<String, String>> {
    let codes: Vec<String> = sorted(&recon.missing).iter().map(|s| s.to_string()).collect();
    let mut entries = BTreeMap::new();
    match Translator::from_env()? {
        Some(translator) => {
            let titles = translator
                .translate_batch(&codes, "ja", "en")
                .await
                .context("translating new series titles")?;
            for (code, title) in codes.into_iter().zip(titles) {
                println!("  {} -> {}", code, title);
                entries.insert(code, title);
            }
        }
        None => {
            warn!("No translator configured; mapping new series to themselves");
            for code in codes {
                entries.insert(code.clone(), code);
            }
        }
    }
    Ok(entries)
}

// ── Card scrape ──

/// Scrape one series end to end: discover the cardlist, reconcile against
/// the store, then run the missing cards through the checkpointed loop.
pub async fn scrape_series(
    conn: &Connection,
    series_map: &SeriesMap,
    series_code: &str,
    opts: &ScrapeOptions,
) -> Result<RunSummary> {
    let series_title = series_map.title_for(series_code).to_string();
    if series_title == series_code {
        warn!("Series {:?} has no English mapping yet (run `check --update`)", series_code);
    }
    let collab = Collaborators::from_env()?;

    let list_url = reqwest::Url::parse_with_params(
        &format!("{}/jp/cardlist/", BASE_URL),
        &[("series", series_code)],
    )?;
    let html = collab.fetcher.fetch_page(list_url.as_str()).await?;
    let codes = extract::dedup_codes(extract::filter_action_point_cards(
        extract::extract_card_codes(&html),
    ));
    info!("Cardlist for {} has {} codes", series_code, codes.len());

    // The store is the known side; the freshly scraped list is current.
    let known = db::list_codes_for_series(conn, &series_title)?;
    let current = codes.iter().cloned().collect();
    let recon = reconcile(&known, &current);
    info!(
        "Reconciled {}: {} matching, {} new, {} stored but no longer listed",
        series_code,
        recon.matching_count,
        recon.missing.len(),
        recon.extra.len()
    );
    for code in sorted(&recon.extra) {
        warn!("Stored card {} is no longer on the cardlist", code);
    }

    // Keep cardlist order for the new codes so cursors stay meaningful.
    let mut items: Vec<String> = codes
        .into_iter()
        .filter(|c| recon.missing.contains(c))
        .collect();
    if let Some(limit) = opts.limit {
        items.truncate(limit);
    }
    if items.is_empty() {
        println!("No new cards for {}.", series_code);
    }

    run_items(conn, &collab, series_code, &series_title, &items, opts.mode).await
}

/// Re-attempt the failed items of the most recent run for this series.
pub async fn retry_failed(
    conn: &Connection,
    series_map: &SeriesMap,
    series_code: &str,
) -> Result<Option<RunSummary>> {
    let Some(last) = db::last_run_summary(conn, series_code)? else {
        return Ok(None);
    };
    if last.failures.is_empty() {
        return Ok(None);
    }
    let items: Vec<String> = last.failures.keys().cloned().collect();
    println!("Retrying {} failed items from {}", items.len(), last.finished_at);

    let series_title = series_map.title_for(series_code).to_string();
    let collab = Collaborators::from_env()?;
    let summary = run_items(conn, &collab, series_code, &series_title, &items, BatchMode::Fresh).await?;
    Ok(Some(summary))
}

async fn run_items(
    conn: &Connection,
    collab: &Collaborators,
    series_code: &str,
    series_title: &str,
    items: &[String],
    mode: BatchMode,
) -> Result<RunSummary> {
    let file = CheckpointFile::new(CHECKPOINT_DIR, series_code);
    let mut tracker = BatchTracker::begin(file, mode)?;
    let mut allocation = AllocationState::new();

    let pb = ProgressBar::new(items.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    for (idx, raw) in items.iter().enumerate() {
        if tracker.skip(idx, raw) {
            pb.inc(1);
            continue;
        }
        match process_card(conn, collab, series_code, series_title, &mut allocation, raw).await {
            Ok(uid) => {
                debug!("Stored {} as {}", raw, uid);
                tracker.record_success(idx, raw.clone());
            }
            Err(e) => tracker.record_failure(idx, raw.clone(), &e),
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    let summary = tracker.complete(series_code)?;
    db::save_run_summary(conn, &summary)?;
    Ok(summary)
}

/// The full per-item chain. Every failure is an `ItemError` so one bad card
/// never aborts the batch.
async fn process_card(
    conn: &Connection,
    collab: &Collaborators,
    series_code: &str,
    series_title: &str,
    allocation: &mut AllocationState,
    raw: &str,
) -> Result<String, ItemError> {
    let code = variant::parse_raw_code(raw)?;

    // Exact-duplicate guard: the same raw code must never allocate twice.
    let existing_codes =
        db::find_codes_for_logical_id(conn, &code.logical_id).map_err(store_err)?;
    if existing_codes.contains(&code.raw) {
        debug!("Card code {} already stored, skipping", code.raw);
        return Ok(code.card_uid);
    }

    let existing_uids = db::find_uids_for_logical_id(conn, &code.logical_id).map_err(store_err)?;
    let card_uid = variant::allocate(&code, &existing_uids, allocation);
    if existing_uids.contains(&card_uid) {
        debug!("Uid {} already stored, skipping", card_uid);
        return Ok(card_uid);
    }

    let detail_url = reqwest::Url::parse_with_params(
        &format!("{}/jp/cardlist/detail_iframe.php", BASE_URL),
        &[("card_no", raw)],
    )
    .map_err(|e| ItemError::Fetch(e.to_string()))?;
    let html = collab
        .fetcher
        .fetch_page(detail_url.as_str())
        .await
        .map_err(|e| ItemError::Fetch(e.to_string()))?;

    let detail = extract::extract_card_detail(&html, BASE_URL);
    if detail.has_placeholder_image() {
        return Err(ItemError::Extract("card image is still the placeholder".into()));
    }
    if detail.is_empty_card() {
        return Err(ItemError::Extract("detail page has no card data".into()));
    }

    let (card_name, effect, traits) = match &collab.translator {
        Some(translator) => {
            let texts = vec![detail.card_name.clone(), detail.effect.clone(), detail.traits.clone()];
            let mut out = translator
                .translate_batch(&texts, "ja", "en")
                .await
                .map_err(|e| ItemError::Translate(e.to_string()))?;
            let traits = out.pop().unwrap_or_default();
            let effect = out.pop().unwrap_or_default();
            let name = out.pop().unwrap_or_default();
            (name, effect, traits)
        }
        None => (detail.card_name.clone(), detail.effect.clone(), detail.traits.clone()),
    };

    let url_image = match &collab.uploader {
        Some(uploader) if !detail.image_url.is_empty() => uploader
            .upload_image(&collab.fetcher, &detail.image_url, &card_uid, IMAGE_PREFIX)
            .await
            .map_err(|e| ItemError::Upload(e.to_string()))?,
        _ => detail.image_url.clone(),
    };

    let trigger_state = mapping::trigger_state(&detail.trigger_jp);
    let record = CardRecord {
        card_uid: card_uid.clone(),
        card_id: code.logical_id.clone(),
        card_code: code.raw.clone(),
        booster: code.booster.clone(),
        series: series_title.to_string(),
        series_code: series_code.to_string(),
        anime_code: code.anime_code.clone(),
        card_name,
        rarity: display_rarity(&detail.rarity),
        image: format!("/{}/{}.webp", IMAGE_PREFIX, card_uid),
        url_image,
        fields: serde_json::json!({
            "apcost": parse_stat(&detail.ap_cost),
            "banRatio": 4,
            "basicpower": dash_to_empty(&detail.bp),
            "category": mapping::category(&detail.category_jp),
            "color": detail.color,
            "effect": effect,
            "energycost": parse_stat(&detail.energy_cost),
            "energygen": dash_to_empty(&detail.energy_gen),
            "traits": traits,
            "trigger": mapping::trigger_text(trigger_state),
            "triggerState": mapping::trigger_group(trigger_state),
            "rarityAct": detail.rarity,
        }),
    };

    if !db::insert_card(conn, &record).map_err(store_err)? {
        debug!("Card {} was already present in the store", record.card_uid);
    }
    Ok(card_uid)
}

/// Star rarities are alternate-art printings; they display as "ALT".
fn display_rarity(raw: &str) -> String {
    if raw == "-" {
        String::new()
    } else if raw.contains('★') {
        "ALT".to_string()
    } else {
        raw.to_string()
    }
}

fn parse_stat(raw: &str) -> u32 {
    raw.parse().unwrap_or(0)
}

fn dash_to_empty(raw: &str) -> String {
    if raw == "-" {
        String::new()
    } else {
        raw.to_string()
    }
}

fn store_err(e: anyhow::Error) -> ItemError {
    ItemError::Store(e.to_string())
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_rarities_display_as_alt() {
        assert_eq!(display_rarity("SR★"), "ALT");
        assert_eq!(display_rarity("SR"), "SR");
        assert_eq!(display_rarity("-"), "");
    }

    #[test]
    fn stats_parse_with_dash_fallback() {
        assert_eq!(parse_stat("3"), 3);
        assert_eq!(parse_stat("-"), 0);
        assert_eq!(dash_to_empty("-"), "");
        assert_eq!(dash_to_empty("3500"), "3500");
    }
}
