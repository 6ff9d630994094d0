use std::fs;
use std::path::{Path, PathBuf};

use cutplan_engine::preview::{PreviewLayout, PreviewRenderer, RenderError};
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::pixelops::interpolate;
use imageproc::rect::Rect;
use rusttype::{Font, Scale, point as rt_point};
use thiserror::Error;
use tracing::{debug, info, warn};

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const INK: Rgb<u8> = Rgb([0, 0, 0]);

#[derive(Debug, Error)]
pub enum PreviewError {
    #[error("failed to write preview {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// 预览图尺寸与字号（像素）。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreviewOptions {
    pub width_px: u32,
    pub margin_px: u32,
    pub title_px: f32,
    pub letter_px: f32,
}

impl Default for PreviewOptions {
    fn default() -> Self {
        Self {
            width_px: 1200,
            margin_px: 100,
            title_px: 48.0,
            letter_px: 72.0,
        }
    }
}

/// 按候选路径顺序加载第一个可用的 TrueType 字体。
pub fn load_first_font(paths: &[PathBuf]) -> Option<Font<'static>> {
    for path in paths {
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(err) => {
                debug!(path = %path.display(), error = %err, "字体文件不可读，尝试下一个");
                continue;
            }
        };
        match Font::try_from_vec(data) {
            Some(font) => {
                info!(path = %path.display(), "已加载预览字体");
                return Some(font);
            }
            None => warn!(path = %path.display(), "字体文件无效，尝试下一个"),
        }
    }
    warn!("未找到可用字体，预览将省略标题并使用内置字形");
    None
}

/// 将布局绘制为 PNG：顶部标题栏，每个标签位一个填色矩形和工艺字母。
pub struct PngPreviewRenderer {
    options: PreviewOptions,
    font: Option<Font<'static>>,
}

impl PngPreviewRenderer {
    pub fn new(options: PreviewOptions, font: Option<Font<'static>>) -> Self {
        Self { options, font }
    }

    pub fn from_font_paths(options: PreviewOptions, font_paths: &[PathBuf]) -> Self {
        Self::new(options, load_first_font(font_paths))
    }

    #[inline]
    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    pub fn draw(&self, layout: &PreviewLayout) -> RgbImage {
        let scale = layout.scale_for_width(self.options.width_px);
        let margin = f64::from(self.options.margin_px);
        let sheet_px = layout.sheet_height_px(scale).round().max(1.0) as u32;
        let width = self.options.width_px.max(1);
        let height = sheet_px + self.options.margin_px;
        let mut image = RgbImage::from_pixel(width, height, BACKGROUND);

        if let Some(font) = &self.font {
            let title_scale = Scale::uniform(self.options.title_px);
            if let Some(extent) = TextExtent::measure(font, title_scale, &layout.title) {
                let left = (f64::from(width) - f64::from(extent.width)) / 2.0;
                let top = (margin - f64::from(extent.height)) / 2.0;
                draw_text(&mut image, font, title_scale, &layout.title, left, top);
            }
        }

        let half_w = layout.label_width / 2.0 * scale;
        let half_h = layout.label_height / 2.0 * scale;
        for cell in &layout.cells {
            let (cx, cy) = layout.to_raster(cell.position, scale, margin);
            fill_rect(
                &mut image,
                cx - half_w,
                cy - half_h,
                half_w * 2.0,
                half_h * 2.0,
                Rgb(cell.finish.rgb()),
            );
            self.draw_letter(&mut image, cell.finish.letter(), cx, cy);
        }
        image
    }

    fn draw_letter(&self, image: &mut RgbImage, letter: char, cx: f64, cy: f64) {
        let mut buffer = [0u8; 4];
        let text: &str = letter.encode_utf8(&mut buffer);
        if let Some(font) = &self.font {
            let scale = Scale::uniform(self.options.letter_px);
            if let Some(extent) = TextExtent::measure(font, scale, text) {
                let left = cx - f64::from(extent.width) / 2.0;
                let top = cy - f64::from(extent.height) / 2.0;
                draw_text(image, font, scale, text, left, top);
                return;
            }
        }
        glyph::draw_block_letter(image, letter, cx, cy, f64::from(self.options.letter_px));
    }
}

impl PreviewRenderer for PngPreviewRenderer {
    fn render(&self, layout: &PreviewLayout, output: &Path) -> Result<PathBuf, RenderError> {
        let image = self.draw(layout);
        image
            .save_with_format(output, image::ImageFormat::Png)
            .map_err(|source| PreviewError::Write {
                path: output.to_path_buf(),
                source,
            })?;
        debug!(path = %output.display(), cells = layout.cells.len(), "已生成预览图");
        Ok(output.to_path_buf())
    }
}

/// 文本像素范围（相对排版原点）。
#[derive(Debug, Clone, Copy)]
struct TextExtent {
    min_x: i32,
    min_y: i32,
    width: i32,
    height: i32,
}

impl TextExtent {
    fn measure(font: &Font<'_>, scale: Scale, text: &str) -> Option<Self> {
        let ascent = font.v_metrics(scale).ascent;
        let mut min_x = i32::MAX;
        let mut min_y = i32::MAX;
        let mut max_x = i32::MIN;
        let mut max_y = i32::MIN;
        for glyph in font.layout(text, scale, rt_point(0.0, ascent)) {
            if let Some(bb) = glyph.pixel_bounding_box() {
                min_x = min_x.min(bb.min.x);
                min_y = min_y.min(bb.min.y);
                max_x = max_x.max(bb.max.x);
                max_y = max_y.max(bb.max.y);
            }
        }
        if min_x > max_x {
            return None;
        }
        Some(Self {
            min_x,
            min_y,
            width: max_x - min_x,
            height: max_y - min_y,
        })
    }
}

/// 以文本墨迹的左上角对齐到 (left, top)。
fn draw_text(image: &mut RgbImage, font: &Font<'_>, scale: Scale, text: &str, left: f64, top: f64) {
    let Some(extent) = TextExtent::measure(font, scale, text) else {
        return;
    };
    let ascent = font.v_metrics(scale).ascent;
    let origin_x = (left.round() as i32 - extent.min_x) as f32;
    let origin_y = (top.round() as i32 - extent.min_y) as f32 + ascent;
    let (width, height) = image.dimensions();

    for glyph in font.layout(text, scale, rt_point(origin_x, origin_y)) {
        let Some(bb) = glyph.pixel_bounding_box() else {
            continue;
        };
        glyph.draw(|gx, gy, coverage| {
            let px = bb.min.x + gx as i32;
            let py = bb.min.y + gy as i32;
            if px < 0 || py < 0 || px as u32 >= width || py as u32 >= height {
                return;
            }
            shade(image.get_pixel_mut(px as u32, py as u32), coverage);
        });
    }
}

/// 按字形覆盖率把墨色叠到已有像素上。
fn shade(pixel: &mut Rgb<u8>, coverage: f32) {
    *pixel = interpolate(INK, *pixel, coverage.clamp(0.0, 1.0));
}

fn fill_rect(image: &mut RgbImage, left: f64, top: f64, width: f64, height: f64, color: Rgb<u8>) {
    let rect = Rect::at(left.round() as i32, top.round() as i32)
        .of_size(width.round().max(1.0) as u32, height.round().max(1.0) as u32);
    draw_filled_rect_mut(image, rect, color);
}

/// 无字体时使用的 5×7 点阵字母。
mod glyph {
    use image::RgbImage;

    use super::{INK, fill_rect};

    const D: [u8; 7] = [0b11110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b11110];
    const R: [u8; 7] = [0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001];
    const P: [u8; 7] = [0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000];
    const QUESTION: [u8; 7] = [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b00000, 0b00100];

    fn rows(letter: char) -> &'static [u8; 7] {
        match letter {
            'D' => &D,
            'R' => &R,
            'P' => &P,
            _ => &QUESTION,
        }
    }

    /// 以 (cx, cy) 为中心绘制高约 `size` 像素的点阵字母。
    pub(super) fn draw_block_letter(image: &mut RgbImage, letter: char, cx: f64, cy: f64, size: f64) {
        let cell = (size / 7.0).max(1.0);
        let left = cx - cell * 2.5;
        let top = cy - cell * 3.5;
        for (row, bits) in rows(letter).iter().enumerate() {
            for column in 0..5 {
                if bits & (0b10000 >> column) != 0 {
                    fill_rect(
                        image,
                        left + cell * column as f64,
                        top + cell * row as f64,
                        cell,
                        cell,
                        INK,
                    );
                }
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn unknown_letters_use_the_question_mark() {
            assert_eq!(rows('X'), &QUESTION);
            assert_eq!(rows('D'), &D);
        }
    }
}

#[cfg(test)]
mod tests {
    use cutplan_core::geometry::Point2;
    use cutplan_engine::classify::LabelFinish;
    use cutplan_engine::composer::Placement;
    use cutplan_engine::grid::{Grid, GridVariant};

    use super::*;

    fn layout_with(names: &[&str], variant: GridVariant) -> PreviewLayout {
        let grid = Grid::new(variant);
        let placements: Vec<Placement> = names
            .iter()
            .enumerate()
            .map(|(index, name)| Placement {
                slot: index + 1,
                name: name.to_string(),
                block_name: format!("BLK_{index}"),
                position: grid.coordinate_for(index + 1),
            })
            .collect();
        PreviewLayout::from_placements("Plano de corte 01 20-05-2024.dxf", &grid, &placements)
    }

    #[test]
    fn image_size_follows_sheet_ratio_plus_title_bar() {
        let renderer = PngPreviewRenderer::new(PreviewOptions::default(), None);
        let image = renderer.draw(&layout_with(&[], GridVariant::Slots18));
        // 780 × 1200 / 970 ≈ 964.9
        assert_eq!(image.dimensions(), (1200, 965 + 100));

        let image = renderer.draw(&layout_with(&[], GridVariant::Slots32));
        // 900 × 1200 / 1300 ≈ 830.8
        assert_eq!(image.dimensions(), (1200, 831 + 100));
    }

    #[test]
    fn occupied_slots_are_filled_with_the_finish_color() {
        let renderer = PngPreviewRenderer::new(PreviewOptions::default(), None);
        let layout = layout_with(&["ANEL-DOU.dxf", "ANEL-ROS.dxf", "BRINCO.dxf"], GridVariant::Slots18);
        let image = renderer.draw(&layout);

        let scale = layout.scale_for_width(1200);
        let corner_of = |slot: usize| {
            let (cx, cy) = layout.to_raster(layout.cells[slot].position, scale, 100.0);
            let x = (cx - layout.label_width / 2.0 * scale + 3.0) as u32;
            let y = (cy - layout.label_height / 2.0 * scale + 3.0) as u32;
            *image.get_pixel(x, y)
        };
        assert_eq!(corner_of(0), Rgb(LabelFinish::Dourado.rgb()));
        assert_eq!(corner_of(1), Rgb(LabelFinish::Rose.rgb()));
        assert_eq!(corner_of(2), Rgb(LabelFinish::Unknown.rgb()));

        // 点阵 D 的左竖笔画经过矩形中心高度
        let (cx, cy) = layout.to_raster(layout.cells[0].position, scale, 100.0);
        assert_eq!(*image.get_pixel((cx - 20.0) as u32, cy as u32), INK);

        // 没有字体时标题栏保持空白
        assert!((0..1200).all(|x| *image.get_pixel(x, 50) == BACKGROUND));
    }

    #[test]
    fn slot_one_is_drawn_in_the_lower_left() {
        let renderer = PngPreviewRenderer::new(PreviewOptions::default(), None);
        let layout = layout_with(&["A-PRA.dxf"], GridVariant::Slots18);
        let image = renderer.draw(&layout);
        let (width, height) = image.dimensions();
        let (cx, cy) = layout.to_raster(Point2::new(99.5, 113.9), layout.scale_for_width(1200), 100.0);
        assert!(cx < f64::from(width) / 2.0);
        assert!(cy > f64::from(height) / 2.0);
    }

    #[test]
    fn render_writes_a_png_file() {
        let dir = tempfile::tempdir().expect("创建临时目录失败");
        let output = dir.path().join("plano.png");
        let renderer = PngPreviewRenderer::new(PreviewOptions::default(), None);

        let written = renderer
            .render(&layout_with(&["ANEL-DOU.dxf"], GridVariant::Slots32), &output)
            .expect("写出预览失败");
        assert_eq!(written, output);
        let bytes = fs::read(&output).expect("读取预览失败");
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn unwritable_path_is_an_error() {
        let dir = tempfile::tempdir().expect("创建临时目录失败");
        let output = dir.path().join("nao_existe").join("plano.png");
        let renderer = PngPreviewRenderer::new(PreviewOptions::default(), None);
        let err = renderer
            .render(&layout_with(&[], GridVariant::Slots18), &output)
            .unwrap_err();
        assert!(err.downcast_ref::<PreviewError>().is_some());
    }

    #[test]
    fn missing_or_invalid_fonts_fall_back() {
        let dir = tempfile::tempdir().expect("创建临时目录失败");
        let bogus = dir.path().join("bogus.ttf");
        fs::write(&bogus, b"not a font").expect("写入失败");
        let paths = vec![dir.path().join("missing.ttf"), bogus];
        assert!(load_first_font(&paths).is_none());

        let renderer = PngPreviewRenderer::from_font_paths(PreviewOptions::default(), &paths);
        assert!(!renderer.has_font());
    }

    #[test]
    fn shading_mixes_ink_by_coverage() {
        let mut blank = BACKGROUND;
        shade(&mut blank, 0.0);
        assert_eq!(blank, BACKGROUND);

        let mut solid = BACKGROUND;
        shade(&mut solid, 1.5);
        assert_eq!(solid, INK);

        let mut half = BACKGROUND;
        shade(&mut half, 0.5);
        assert!((126..=129).contains(&half[0]));
        assert_eq!(half[0], half[1]);
        assert_eq!(half[1], half[2]);
    }
}
