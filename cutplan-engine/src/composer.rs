use std::collections::HashSet;
use std::path::Path;

use cutplan_core::document::Document;
use cutplan_core::geometry::Point2;
use cutplan_io::{DocumentSaver, DxfFacade};
use tracing::{debug, info, warn};

use crate::block_cache::BlockCache;
use crate::errors::EngineError;
use crate::grid::Grid;
use crate::storage::DrawingStore;

/// DXF `$INSUNITS` 毫米。
pub const INSUNITS_MILLIMETERS: i16 = 4;

/// 一次放置请求：源图纸名 + 1 起始的标签位。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LabelItem {
    pub name: String,
    pub slot: usize,
}

impl LabelItem {
    pub fn new(name: impl Into<String>, slot: usize) -> Self {
        Self {
            name: name.into(),
            slot,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    pub slot: usize,
    pub name: String,
    pub block_name: String,
    pub position: Point2,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComposeReport {
    pub placements: Vec<Placement>,
    /// 标签位超出网格范围而未放置的请求。
    pub skipped: Vec<LabelItem>,
    pub blocks_built: usize,
    pub dropped_entities: usize,
}

#[derive(Debug, Clone)]
pub struct ComposedPlan {
    pub document: Document,
    pub report: ComposeReport,
}

/// 将多张标签图纸按网格拼到一张板上。
pub struct PlanComposer<'s> {
    store: &'s dyn DrawingStore,
    source_subfolder: Option<String>,
}

impl<'s> PlanComposer<'s> {
    pub fn new(store: &'s dyn DrawingStore, source_subfolder: Option<&str>) -> Self {
        Self {
            store,
            source_subfolder: source_subfolder.map(str::to_string),
        }
    }

    /// 在内存中构建输出文档：定位标记、每个源名一个块、每个请求一个块参照。
    pub fn compose(&self, items: &[LabelItem], grid: &Grid) -> Result<ComposedPlan, EngineError> {
        let mut document = Document::new();
        document.set_insertion_units(Some(INSUNITS_MILLIMETERS));
        grid.draw_registration_marks(&mut document);

        let mut report = ComposeReport::default();
        let mut accepted: Vec<&LabelItem> = Vec::with_capacity(items.len());
        for item in items {
            if grid.contains_slot(item.slot) {
                accepted.push(item);
            } else {
                warn!(
                    name = %item.name,
                    slot = item.slot,
                    capacity = grid.capacity(),
                    "标签位超出网格范围，已跳过"
                );
                report.skipped.push(item.clone());
            }
        }

        let mut cache = BlockCache::new(self.store, self.source_subfolder.as_deref());
        for item in &accepted {
            if !cache.contains(&item.name) {
                let handle = cache.get_or_build(&item.name, &mut document)?;
                report.blocks_built += 1;
                report.dropped_entities += handle.summary.dropped;
            }
        }

        let mut occupied: HashSet<usize> = HashSet::with_capacity(accepted.len());
        for item in accepted {
            if !occupied.insert(item.slot) {
                warn!(name = %item.name, slot = item.slot, "标签位重复，将叠放在同一位置");
            }
            let handle = cache.get_or_build(&item.name, &mut document)?;
            let position = grid.coordinate_for(item.slot);
            document.add_block_reference(handle.block_name.clone(), position, "0");
            debug!(
                name = %item.name,
                slot = item.slot,
                x = position.x(),
                y = position.y(),
                "已放置块参照"
            );
            report.placements.push(Placement {
                slot: item.slot,
                name: item.name.clone(),
                block_name: handle.block_name,
                position,
            });
        }

        Ok(ComposedPlan { document, report })
    }

    /// 合成并写入 `path`。
    pub fn compose_to_path(
        &self,
        items: &[LabelItem],
        grid: &Grid,
        path: &Path,
    ) -> Result<ComposeReport, EngineError> {
        let plan = self.compose(items, grid)?;
        persist(&plan.document, path)?;
        Ok(plan.report)
    }
}

/// 以 DXF 写出输出文档。
pub fn persist(document: &Document, path: &Path) -> Result<(), EngineError> {
    DxfFacade::new()
        .save(document, path)
        .map_err(|source| EngineError::Persist {
            name: path.display().to_string(),
            source,
        })?;
    info!(path = %path.display(), entities = document.entity_count(), "已写出切割图");
    Ok(())
}

#[cfg(test)]
mod tests {
    use cutplan_core::document::Entity;

    use super::*;
    use crate::grid::GridVariant;
    use crate::storage::MemoryDrawingStore;

    const LABEL: &str = "  0\nSECTION\n  2\nENTITIES\n  0\nCIRCLE\n  8\nCORTE\n 10\n5.0\n 20\n5.0\n 40\n5.0\n  0\nENDSEC\n  0\nEOF\n";

    fn store_with(names: &[&str]) -> MemoryDrawingStore {
        let store = MemoryDrawingStore::new();
        for name in names {
            store.insert(Some("src"), *name, LABEL);
        }
        store
    }

    fn references(document: &Document) -> Vec<(String, Point2)> {
        document
            .entities()
            .filter_map(|(_, entity)| match entity {
                Entity::BlockReference(reference) => {
                    Some((reference.name.clone(), reference.insert))
                }
                _ => None,
            })
            .collect()
    }

    #[test]
    fn empty_request_produces_only_registration_marks() {
        let store = MemoryDrawingStore::new();
        let composer = PlanComposer::new(&store, Some("src"));
        let plan = composer
            .compose(&[], &Grid::new(GridVariant::Slots18))
            .expect("空请求也应生成文档");

        assert_eq!(plan.document.entity_count(), 4);
        assert_eq!(plan.document.blocks().count(), 0);
        assert_eq!(plan.document.insertion_units(), Some(INSUNITS_MILLIMETERS));
        assert!(plan.report.placements.is_empty());
    }

    #[test]
    fn repeated_names_share_one_block() {
        let store = store_with(&["A.dxf", "B.dxf"]);
        let composer = PlanComposer::new(&store, Some("src"));
        let items = vec![
            LabelItem::new("A.dxf", 1),
            LabelItem::new("B.dxf", 2),
            LabelItem::new("A.dxf", 3),
            LabelItem::new("A.dxf", 4),
        ];
        let plan = composer
            .compose(&items, &Grid::new(GridVariant::Slots18))
            .expect("合成失败");

        assert_eq!(plan.document.blocks().count(), 2);
        assert_eq!(plan.report.blocks_built, 2);
        assert_eq!(store.fetch_count("A.dxf"), 1);
        assert_eq!(store.fetch_count("B.dxf"), 1);

        let refs = references(&plan.document);
        assert_eq!(refs.len(), 4);
        assert_eq!(refs[0].0, "BLK_A_dxf");
        assert_eq!(refs[1].0, "BLK_B_dxf");
        assert_eq!(refs[3].0, "BLK_A_dxf");
        assert_eq!(refs[2].1, Point2::new(406.5, 113.9));
    }

    #[test]
    fn out_of_range_slots_are_reported_not_placed_at_origin() {
        let store = store_with(&["A.dxf", "FORA.dxf"]);
        let composer = PlanComposer::new(&store, Some("src"));
        let items = vec![
            LabelItem::new("A.dxf", 1),
            LabelItem::new("FORA.dxf", 0),
            LabelItem::new("FORA.dxf", 19),
        ];
        let plan = composer
            .compose(&items, &Grid::new(GridVariant::Slots18))
            .expect("合成失败");

        assert_eq!(plan.report.placements.len(), 1);
        assert_eq!(plan.report.skipped.len(), 2);
        // 仅被跳过的源名不会被读取
        assert_eq!(store.fetch_count("FORA.dxf"), 0);
        assert!(references(&plan.document)
            .iter()
            .all(|(_, insert)| *insert != Point2::ORIGIN));
    }

    #[test]
    fn duplicate_slots_keep_both_references() {
        let store = store_with(&["A.dxf", "B.dxf"]);
        let composer = PlanComposer::new(&store, Some("src"));
        let items = vec![LabelItem::new("A.dxf", 5), LabelItem::new("B.dxf", 5)];
        let plan = composer
            .compose(&items, &Grid::new(GridVariant::Slots32))
            .expect("合成失败");

        let refs = references(&plan.document);
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].1, refs[1].1);
        assert_eq!(refs[0].1, Point2::new(726.75, 241.95));
    }

    #[test]
    fn missing_source_aborts_the_page() {
        let store = store_with(&["A.dxf"]);
        let composer = PlanComposer::new(&store, Some("src"));
        let items = vec![LabelItem::new("A.dxf", 1), LabelItem::new("NADA.dxf", 2)];
        let err = composer
            .compose(&items, &Grid::new(GridVariant::Slots18))
            .unwrap_err();
        assert!(matches!(err, EngineError::Store(_)));
    }

    #[test]
    fn compose_to_path_writes_a_readable_drawing() {
        let dir = tempfile::tempdir().expect("创建临时目录失败");
        let path = dir.path().join("plano.dxf");
        let store = store_with(&["A.dxf"]);
        let composer = PlanComposer::new(&store, Some("src"));

        let report = composer
            .compose_to_path(
                &[LabelItem::new("A.dxf", 1)],
                &Grid::new(GridVariant::Slots18),
                &path,
            )
            .expect("写出失败");
        assert_eq!(report.placements.len(), 1);

        let text = std::fs::read_to_string(&path).expect("读取输出失败");
        assert!(text.contains("BLK_A_dxf"));
        assert!(text.contains("$INSUNITS"));
    }

    #[test]
    fn persist_into_missing_directory_fails() {
        let dir = tempfile::tempdir().expect("创建临时目录失败");
        let path = dir.path().join("nao_existe").join("plano.dxf");
        let err = persist(&Document::new(), &path).unwrap_err();
        assert!(matches!(err, EngineError::Persist { .. }));
    }
}
