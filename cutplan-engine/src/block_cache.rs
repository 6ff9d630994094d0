use std::collections::HashMap;

use cutplan_core::document::{BlockDefinition, Document};
use cutplan_core::geometry::{Point2, Vector2};
use cutplan_io::DxfFacade;
use tracing::debug;

use crate::bounds;
use crate::errors::EngineError;
use crate::storage::DrawingStore;
use crate::transplant::{self, TransplantSummary};

/// 已建好的块：输出文档中的块名与源图纸的包围盒中心。
#[derive(Debug, Clone, PartialEq)]
pub struct BlockHandle {
    pub block_name: String,
    pub source_center: Point2,
    pub summary: TransplantSummary,
}

/// 块名规则：`BLK_` 前缀，`.` 及 DXF 块名中不允许的字符替换为 `_`。
pub fn block_name_for(source_name: &str) -> String {
    let sanitized: String = source_name
        .chars()
        .map(|ch| match ch {
            '.' | '<' | '>' | '/' | '\\' | '"' | ':' | ';' | '?' | '*' | '|' | '=' | '`' => '_',
            other => other,
        })
        .collect();
    format!("BLK_{sanitized}")
}

/// 单次合成内的块缓存：每个源图纸名只读取、复制一次。
pub struct BlockCache<'s> {
    store: &'s dyn DrawingStore,
    subfolder: Option<String>,
    loader: DxfFacade,
    blocks: HashMap<String, BlockHandle>,
}

impl<'s> BlockCache<'s> {
    pub fn new(store: &'s dyn DrawingStore, subfolder: Option<&str>) -> Self {
        Self {
            store,
            subfolder: subfolder.map(str::to_string),
            loader: DxfFacade::new(),
            blocks: HashMap::new(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    #[inline]
    pub fn contains(&self, source_name: &str) -> bool {
        self.blocks.contains_key(source_name)
    }

    /// 返回缓存的块；首次请求时读取源图纸，按中心平移到原点后写入 `document` 的块表。
    pub fn get_or_build(
        &mut self,
        source_name: &str,
        document: &mut Document,
    ) -> Result<BlockHandle, EngineError> {
        if let Some(handle) = self.blocks.get(source_name) {
            return Ok(handle.clone());
        }

        let bytes = self
            .store
            .fetch(source_name, self.subfolder.as_deref())?;
        let source = self
            .loader
            .parse_bytes(&bytes)
            .map_err(|source| EngineError::Parse {
                name: source_name.to_string(),
                source,
            })?;

        let center = bounds::center_of(source.entities().map(|(_, entity)| entity));
        let offset = Vector2::from_points(center, Point2::ORIGIN);

        let block_name = unique_block_name(document, block_name_for(source_name));
        let mut definition = BlockDefinition::new(block_name.clone());
        let summary = transplant::transplant_all(
            source.entities().map(|(_, entity)| entity),
            offset,
            &mut definition.entities,
        );
        document.add_block_definition(definition);

        debug!(
            source = source_name,
            block = %block_name,
            center_x = center.x(),
            center_y = center.y(),
            copied = summary.copied,
            dropped = summary.dropped,
            "已创建块定义"
        );

        let handle = BlockHandle {
            block_name,
            source_center: center,
            summary,
        };
        self.blocks.insert(source_name.to_string(), handle.clone());
        Ok(handle)
    }
}

/// 不同源名清洗后可能同名（如 `A.B` 与 `A_B`），追加序号区分。
fn unique_block_name(document: &Document, candidate: String) -> String {
    if !document.has_block(&candidate) {
        return candidate;
    }
    let mut n = 2;
    loop {
        let name = format!("{candidate}_{n}");
        if !document.has_block(&name) {
            return name;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use cutplan_core::document::Entity;

    use super::*;
    use crate::storage::MemoryDrawingStore;

    const SQUARE: &str = "  0\nSECTION\n  2\nENTITIES\n  0\nLWPOLYLINE\n  8\nCORTE\n 90\n4\n 70\n1\n 10\n10.0\n 20\n20.0\n 10\n30.0\n 20\n20.0\n 10\n30.0\n 20\n60.0\n 10\n10.0\n 20\n60.0\n  0\nENDSEC\n  0\nEOF\n";

    #[test]
    fn block_names_replace_dots_and_reserved_characters() {
        assert_eq!(block_name_for("ANEL-DOU.dxf"), "BLK_ANEL-DOU_dxf");
        assert_eq!(block_name_for("a:b*c.DXF"), "BLK_a_b_c_DXF");
    }

    #[test]
    fn block_geometry_is_centered_on_the_origin() {
        let store = MemoryDrawingStore::new();
        store.insert(Some("src"), "QUADRADO.dxf", SQUARE);
        let mut cache = BlockCache::new(&store, Some("src"));
        let mut document = Document::new();

        let handle = cache
            .get_or_build("QUADRADO.dxf", &mut document)
            .expect("创建块失败");
        assert_eq!(handle.block_name, "BLK_QUADRADO_dxf");
        assert!((handle.source_center.x() - 20.0).abs() < 1e-9);
        assert!((handle.source_center.y() - 40.0).abs() < 1e-9);
        assert_eq!(handle.summary.copied, 1);

        let block = document.block("BLK_QUADRADO_dxf").expect("块未写入文档");
        assert_eq!(block.base_point, Point2::ORIGIN);
        let Entity::Polyline(outline) = &block.entities[0] else {
            panic!("块内实体应为多段线");
        };
        assert!((outline.vertices[0].position.x() + 10.0).abs() < 1e-9);
        assert!((outline.vertices[0].position.y() + 20.0).abs() < 1e-9);
        assert!((outline.vertices[2].position.x() - 10.0).abs() < 1e-9);
        assert!((outline.vertices[2].position.y() - 20.0).abs() < 1e-9);
        // 模型空间不受影响
        assert_eq!(document.entity_count(), 0);
    }

    #[test]
    fn repeated_requests_reuse_the_block_without_refetching() {
        let store = MemoryDrawingStore::new();
        store.insert(None, "QUADRADO.dxf", SQUARE);
        let mut cache = BlockCache::new(&store, None);
        let mut document = Document::new();

        let first = cache
            .get_or_build("QUADRADO.dxf", &mut document)
            .expect("首次创建失败");
        let second = cache
            .get_or_build("QUADRADO.dxf", &mut document)
            .expect("再次获取失败");

        assert_eq!(first, second);
        assert_eq!(store.fetch_count("QUADRADO.dxf"), 1);
        assert_eq!(document.blocks().count(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains("QUADRADO.dxf"));
    }

    #[test]
    fn colliding_sanitized_names_get_distinct_blocks() {
        let store = MemoryDrawingStore::new();
        store.insert(None, "A.B", SQUARE);
        store.insert(None, "A_B", SQUARE);
        let mut cache = BlockCache::new(&store, None);
        let mut document = Document::new();

        let dotted = cache.get_or_build("A.B", &mut document).expect("A.B");
        let underscored = cache.get_or_build("A_B", &mut document).expect("A_B");
        assert_eq!(dotted.block_name, "BLK_A_B");
        assert_eq!(underscored.block_name, "BLK_A_B_2");
        assert_eq!(document.blocks().count(), 2);
    }

    #[test]
    fn drawing_without_extent_is_placed_relative_to_origin() {
        let text_only = "  0\nSECTION\n  2\nENTITIES\n  0\nTEXT\n  8\n0\n 10\n5.0\n 20\n5.0\n 40\n2.5\n  1\nROS\n  0\nENDSEC\n  0\nEOF\n";
        let store = MemoryDrawingStore::new();
        store.insert(None, "SO_TEXTO.dxf", text_only);
        let mut cache = BlockCache::new(&store, None);
        let mut document = Document::new();

        let handle = cache
            .get_or_build("SO_TEXTO.dxf", &mut document)
            .expect("创建块失败");
        assert_eq!(handle.source_center, Point2::ORIGIN);
        let block = document.block(&handle.block_name).expect("块未写入文档");
        let Entity::Text(text) = &block.entities[0] else {
            panic!("块内实体应为文字");
        };
        assert!((text.insert.x() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn missing_and_corrupt_sources_are_errors() {
        let store = MemoryDrawingStore::new();
        store.insert(None, "RUIM.dxf", "  0\nSECTION\n  2");
        let mut cache = BlockCache::new(&store, None);
        let mut document = Document::new();

        let err = cache.get_or_build("NADA.dxf", &mut document).unwrap_err();
        assert!(matches!(err, EngineError::Store(_)));

        let err = cache.get_or_build("RUIM.dxf", &mut document).unwrap_err();
        assert!(matches!(err, EngineError::Parse { ref name, .. } if name == "RUIM.dxf"));
        assert!(cache.is_empty());
        assert_eq!(document.blocks().count(), 0);
    }
}
