// src/pipeline.rs

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{info, instrument, warn};

use crate::animate::{Animator, GifPresenter, SvgPresenter};
use crate::config::Config;
use crate::fetch::PageSource;
use crate::harvest::{Harvester, StopReason};
use crate::store::{StoreError, YieldStore};
use crate::table::{merge, YieldTable};

#[derive(Debug)]
pub struct UpdateSummary {
    pub table: YieldTable,
    pub start_index: u64,
    pub harvested: usize,
    pub stop: StopReason,
}

/// Stored table, or an empty one on the very first run.
pub fn load_existing(store: &YieldStore) -> Result<YieldTable> {
    match store.load() {
        Ok(table) => Ok(table),
        Err(StoreError::NotFound(path)) => {
            warn!(path = %path.display(), "no stored yields yet; starting from an empty table");
            Ok(YieldTable::new())
        }
        Err(e) => Err(e).with_context(|| format!("loading {}", store.path().display())),
    }
}

/// Load the stored table, harvest the pages that follow it, merge and save.
#[instrument(level = "info", skip_all, fields(store = %config.store.path.display()))]
pub async fn update<S: PageSource>(config: &Config, harvester: &Harvester<S>) -> Result<UpdateSummary> {
    let store = YieldStore::new(&config.store.path);
    let existing = load_existing(&store)?;
    let start_index = config.harvest.start_for(existing.len());
    info!(
        stored = existing.len(),
        last = ?existing.last_date(),
        start_index,
        end_index = config.harvest.end_index,
        "updating yield table"
    );

    let report = harvester
        .harvest_report(start_index, config.harvest.end_index)
        .await
        .with_context(|| format!("harvesting from index {}", start_index))?;
    let harvested = report.table.len();

    let table = merge(existing, report.table, Some(&store))
        .with_context(|| format!("saving {}", store.path().display()))?;

    Ok(UpdateSummary {
        table,
        start_index,
        harvested,
        stop: report.stop,
    })
}

/// Write the configured GIF, plus per-frame SVGs when `svg_dir` is given.
pub fn render(config: &Config, table: &YieldTable, svg_dir: Option<&Path>) -> Result<usize> {
    let anim = &config.animation;
    let animator = Animator::from_config(table, anim)
        .with_context(|| format!("preparing animation from {}", anim.begin_date))?;
    let size = (anim.width, anim.height);

    let mut gif = GifPresenter::create(&anim.output, size, animator.delay())?;
    let shown = animator
        .render(&mut gif)
        .with_context(|| format!("rendering {}", anim.output.display()))?;

    if let Some(dir) = svg_dir {
        let mut svg = SvgPresenter::create(dir, size)?;
        animator
            .render(&mut svg)
            .with_context(|| format!("rendering frames into {}", dir.display()))?;
    }
    Ok(shown)
}

/// Update then animate.
pub async fn run<S: PageSource>(
    config: &Config,
    harvester: &Harvester<S>,
    svg_dir: Option<&Path>,
) -> Result<UpdateSummary> {
    let summary = update(config, harvester).await?;
    let frames = render(config, &summary.table, svg_dir)?;
    info!(frames, output = %config.animation.output.display(), "animation ready");
    Ok(summary)
}
