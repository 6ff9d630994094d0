use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::batch::{self, DEFAULT_DATE_FORMAT, PlanNamer};
use crate::composer::{LabelItem, Placement, PlanComposer};
use crate::errors::EngineError;
use crate::grid::{Grid, GridVariant};
use crate::preview::{PreviewLayout, PreviewRenderer};
use crate::storage::DrawingStore;

/// 一次请求：有序的源图纸名、可选输出基名、机台规格。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanRequest {
    pub names: Vec<String>,
    pub base_name: Option<String>,
    pub grid: GridVariant,
}

impl PlanRequest {
    pub fn new<I, S>(names: I, grid: GridVariant) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            base_name: None,
            grid,
        }
    }

    pub fn with_base_name(mut self, base_name: impl Into<String>) -> Self {
        self.base_name = Some(base_name.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct JobSettings {
    pub source_subfolder: Option<String>,
    /// 上传前本地写出 DXF/PNG 的目录。
    pub work_dir: PathBuf,
    pub prefix: String,
    pub date_format: String,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            source_subfolder: Some("arquivos padronizados".to_string()),
            work_dir: std::env::temp_dir().join("cutplan"),
            prefix: "Plano de corte".to_string(),
            date_format: DEFAULT_DATE_FORMAT.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageResult {
    pub name: String,
    pub url: String,
    pub preview_url: Option<String>,
    pub placements: Vec<Placement>,
}

/// 批量流水线：校验 → 分页 → 命名 → 逐页合成、写出、上传、预览。
pub struct PlanJob<'a> {
    store: &'a dyn DrawingStore,
    preview: Option<&'a dyn PreviewRenderer>,
    settings: JobSettings,
}

impl<'a> PlanJob<'a> {
    pub fn new(store: &'a dyn DrawingStore, settings: JobSettings) -> Self {
        Self {
            store,
            preview: None,
            settings,
        }
    }

    pub fn with_preview(mut self, renderer: &'a dyn PreviewRenderer) -> Self {
        self.preview = Some(renderer);
        self
    }

    #[inline]
    pub fn settings(&self) -> &JobSettings {
        &self.settings
    }

    /// 源目录下可用的图纸名。
    pub fn available_sources(&self) -> Result<Vec<String>, EngineError> {
        let names = self
            .store
            .list_names(self.settings.source_subfolder.as_deref())?;
        Ok(names.into_iter().collect())
    }

    pub fn run(&self, request: &PlanRequest, today: NaiveDate) -> Result<Vec<PageResult>, EngineError> {
        if request.names.is_empty() {
            return Err(EngineError::EmptyRequest);
        }
        self.check_sources(&request.names)?;

        let existing = self.store.list_names(None)?;
        let mut namer = PlanNamer::new(
            existing,
            self.settings.prefix.clone(),
            today,
            &self.settings.date_format,
        );
        let base = namer.base_name(request.base_name.as_deref());

        let grid = Grid::new(request.grid);
        let pages = batch::partition(&request.names, grid.capacity());
        info!(
            labels = request.names.len(),
            pages = pages.len(),
            grid = %request.grid,
            base = %base,
            "开始生成切割图"
        );

        let work_dir = &self.settings.work_dir;
        fs::create_dir_all(work_dir).map_err(|source| EngineError::WorkDir {
            path: work_dir.clone(),
            source,
        })?;

        let composer = PlanComposer::new(self.store, self.settings.source_subfolder.as_deref());
        let mut results: Vec<PageResult> = Vec::with_capacity(pages.len());
        for page in pages {
            let name = namer.page_name(&base, page.index);
            let preview_name = self
                .preview
                .is_some()
                .then(|| namer.companion_name(&name, "png"));
            match self.run_page(&composer, &grid, &page.items, &name, preview_name.as_deref()) {
                Ok(result) => results.push(result),
                Err(source) if results.is_empty() => return Err(source),
                Err(source) => {
                    warn!(
                        name = %name,
                        completed = results.len(),
                        error = %source,
                        "后续页面失败，已上传的页面保留在存储中"
                    );
                    return Err(EngineError::Interrupted {
                        page: name,
                        completed: results,
                        source: Box::new(source),
                    });
                }
            }
        }
        Ok(results)
    }

    fn run_page(
        &self,
        composer: &PlanComposer<'_>,
        grid: &Grid,
        items: &[LabelItem],
        name: &str,
        preview_name: Option<&str>,
    ) -> Result<PageResult, EngineError> {
        let path = self.settings.work_dir.join(name);
        let report = composer.compose_to_path(items, grid, &path)?;
        let url = self
            .store
            .upload(&path, name)
            .map_err(|source| EngineError::Upload {
                name: name.to_string(),
                source,
            })?;
        info!(name = %name, url = %url, placements = report.placements.len(), "已上传切割图");

        let preview_url = preview_name
            .and_then(|png_name| self.render_preview(name, png_name, grid, &report.placements));
        Ok(PageResult {
            name: name.to_string(),
            url,
            preview_url,
            placements: report.placements,
        })
    }

    /// 一次性列出所有缺失的源图纸名（按请求顺序去重）。
    fn check_sources(&self, names: &[String]) -> Result<(), EngineError> {
        let available = self
            .store
            .list_names(self.settings.source_subfolder.as_deref())?;
        let mut seen = HashSet::new();
        let mut missing = Vec::new();
        for name in names {
            if !available.contains(name) && seen.insert(name.as_str()) {
                missing.push(name.clone());
            }
        }
        if missing.is_empty() {
            Ok(())
        } else {
            warn!(missing = ?missing, "请求中包含不存在的图纸");
            Err(EngineError::MissingDrawings(missing))
        }
    }

    /// 预览失败只记录日志，不影响本页结果。
    fn render_preview(
        &self,
        name: &str,
        png_name: &str,
        grid: &Grid,
        placements: &[Placement],
    ) -> Option<String> {
        let renderer = self.preview?;
        let layout = PreviewLayout::from_placements(name, grid, placements);
        let png_path = self.settings.work_dir.join(png_name);
        let rendered = match renderer.render(&layout, &png_path) {
            Ok(path) => path,
            Err(err) => {
                warn!(name = %name, error = %err, "生成预览图失败");
                return None;
            }
        };
        match self.store.upload(&rendered, png_name) {
            Ok(url) => Some(url),
            Err(err) => {
                warn!(name = %png_name, error = %err, "上传预览图失败");
                None
            }
        }
    }
}
