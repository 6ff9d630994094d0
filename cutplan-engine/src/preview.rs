use std::path::{Path, PathBuf};

use cutplan_core::geometry::Point2;

use crate::classify::LabelFinish;
use crate::composer::Placement;
use crate::grid::{Grid, LABEL_HEIGHT, LABEL_WIDTH};

pub type RenderError = Box<dyn std::error::Error + Send + Sync>;

/// 预览渲染器：按布局绘制板面示意图，返回生成的图片路径。
pub trait PreviewRenderer: Send + Sync {
    fn render(&self, layout: &PreviewLayout, output: &Path) -> Result<PathBuf, RenderError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct PreviewCell {
    pub slot: usize,
    pub name: String,
    /// 板面坐标（毫米，y 向上）。
    pub position: Point2,
    pub finish: LabelFinish,
}

/// 交给渲染器的数据：标题、板材与标签尺寸、每个已占用标签位。
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewLayout {
    pub title: String,
    pub sheet_width: f64,
    pub sheet_height: f64,
    pub label_width: f64,
    pub label_height: f64,
    pub cells: Vec<PreviewCell>,
}

impl PreviewLayout {
    pub fn from_placements(title: impl Into<String>, grid: &Grid, placements: &[Placement]) -> Self {
        let (sheet_width, sheet_height) = grid.sheet_size();
        Self {
            title: title.into(),
            sheet_width,
            sheet_height,
            label_width: LABEL_WIDTH,
            label_height: LABEL_HEIGHT,
            cells: placements
                .iter()
                .map(|placement| PreviewCell {
                    slot: placement.slot,
                    name: placement.name.clone(),
                    position: placement.position,
                    finish: LabelFinish::classify(&placement.name),
                })
                .collect(),
        }
    }

    /// 宽度 `width_px` 时的比例（像素/毫米）。
    pub fn scale_for_width(&self, width_px: u32) -> f64 {
        if self.sheet_width > 0.0 {
            f64::from(width_px) / self.sheet_width
        } else {
            1.0
        }
    }

    /// 板面高度对应的像素数（不含标题栏）。
    pub fn sheet_height_px(&self, scale: f64) -> f64 {
        self.sheet_height * scale
    }

    /// 板面坐标转为栅格坐标：y 轴翻转，并下移 `margin_px` 留出标题栏。
    pub fn to_raster(&self, position: Point2, scale: f64, margin_px: f64) -> (f64, f64) {
        let x = position.x() * scale;
        let y = self.sheet_height_px(scale) - position.y() * scale + margin_px;
        (x, y)
    }
}
