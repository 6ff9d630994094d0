use anyhow::{Context, Result};
use chrono::Local;
use cutplan_config::{AppConfig, GridSize};
use cutplan_engine::grid::GridVariant;
use cutplan_engine::job::{JobSettings, PlanJob, PlanRequest};
use cutplan_engine::storage::FsDrawingStore;
use cutplan_preview::{PngPreviewRenderer, PreviewOptions};
use tracing::info;

use crate::ComposeArgs;

pub fn compose(config: &AppConfig, args: ComposeArgs) -> Result<()> {
    let store = FsDrawingStore::new(&config.storage.root);
    let job = PlanJob::new(&store, job_settings(config));

    let grid = args
        .grid
        .unwrap_or_else(|| grid_variant(config.composer.default_grid));
    let mut request = PlanRequest::new(args.names, grid);
    if let Some(name) = args.name {
        request = request.with_base_name(name);
    }

    let renderer = (config.preview.enabled && !args.no_preview).then(|| {
        let options = PreviewOptions {
            width_px: config.preview.width_px,
            margin_px: config.preview.margin_px,
            ..PreviewOptions::default()
        };
        PngPreviewRenderer::from_font_paths(options, &config.preview.font_paths)
    });
    let job = match &renderer {
        Some(renderer) => job.with_preview(renderer),
        None => job,
    };

    let today = Local::now().date_naive();
    let pages = job.run(&request, today).context("生成切割图失败")?;
    info!(pages = pages.len(), "切割图已全部上传");
    for page in pages {
        match page.preview_url {
            Some(preview) => println!("{}\t{}\t{}", page.name, page.url, preview),
            None => println!("{}\t{}", page.name, page.url),
        }
    }
    Ok(())
}

pub fn list(config: &AppConfig) -> Result<()> {
    let store = FsDrawingStore::new(&config.storage.root);
    let job = PlanJob::new(&store, job_settings(config));
    let names = job
        .available_sources()
        .with_context(|| format!("读取源目录 {:?} 失败", config.storage.root))?;
    for name in names {
        println!("{name}");
    }
    Ok(())
}

fn job_settings(config: &AppConfig) -> JobSettings {
    JobSettings {
        source_subfolder: Some(config.storage.source_subfolder.clone()),
        work_dir: config.storage.resolved_work_dir(),
        prefix: config.naming.prefix.clone(),
        date_format: config.naming.date_format.clone(),
    }
}

fn grid_variant(size: GridSize) -> GridVariant {
    match size {
        GridSize::Slots18 => GridVariant::Slots18,
        GridSize::Slots32 => GridVariant::Slots32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_grid_maps_to_engine_grid() {
        assert_eq!(grid_variant(GridSize::Slots18).capacity(), 18);
        assert_eq!(grid_variant(GridSize::Slots32).capacity(), 32);
    }

    #[test]
    fn settings_follow_configuration() {
        let config = AppConfig::default();
        let settings = job_settings(&config);
        assert_eq!(settings.source_subfolder.as_deref(), Some("arquivos padronizados"));
        assert_eq!(settings.prefix, "Plano de corte");
        assert_eq!(settings.date_format, "%d-%m-%Y");
        assert_eq!(settings.work_dir, config.storage.resolved_work_dir());
    }
}
