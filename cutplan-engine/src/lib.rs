pub mod batch;
pub mod block_cache;
pub mod classify;
pub mod composer;
pub mod grid;
pub mod job;
pub mod preview;
pub mod storage;

pub mod errors {
    use std::path::PathBuf;

    use cutplan_io::IoError;
    use thiserror::Error;

    use crate::job::PageResult;
    use crate::storage::StoreError;

    #[derive(Debug, Error)]
    pub enum EngineError {
        #[error("request contains no drawings")]
        EmptyRequest,
        #[error("drawings not found: {}", .0.join(", "))]
        MissingDrawings(Vec<String>),
        #[error(transparent)]
        Store(#[from] StoreError),
        #[error("failed to parse drawing {name}: {source}")]
        Parse {
            name: String,
            #[source]
            source: IoError,
        },
        #[error("failed to persist {name}: {source}")]
        Persist {
            name: String,
            #[source]
            source: IoError,
        },
        #[error("failed to upload {name}: {source}")]
        Upload {
            name: String,
            #[source]
            source: StoreError,
        },
        #[error("failed to prepare work directory {path:?}: {source}")]
        WorkDir {
            path: PathBuf,
            #[source]
            source: std::io::Error,
        },
        /// 前面的页面已上传，`completed` 记录它们的结果。
        #[error("page {page} failed after {} uploaded page(s): {source}", .completed.len())]
        Interrupted {
            page: String,
            completed: Vec<PageResult>,
            #[source]
            source: Box<EngineError>,
        },
    }

    impl EngineError {
        /// 失败前已经上传的页面。
        pub fn completed_pages(&self) -> &[PageResult] {
            match self {
                EngineError::Interrupted { completed, .. } => completed,
                _ => &[],
            }
        }
    }
}

pub mod bounds {
    use cutplan_core::document::Entity;
    use cutplan_core::geometry::{Bounds2D, Point2};

    /// 累积所有可计算范围的实体；没有可用范围时返回 `None`。
    pub fn bounds_of<'a, I>(entities: I) -> Option<Bounds2D>
    where
        I: IntoIterator<Item = &'a Entity>,
    {
        let mut bounds = Bounds2D::empty();
        let mut has = false;
        for entity in entities {
            if let Some(entity_bounds) = entity.bounds() {
                bounds.include_bounds(&entity_bounds);
                has = true;
            }
        }
        if has { Some(bounds) } else { None }
    }

    /// 包围盒中心，空集合返回原点。
    pub fn center_of<'a, I>(entities: I) -> Point2
    where
        I: IntoIterator<Item = &'a Entity>,
    {
        bounds_of(entities)
            .map(|bounds| bounds.center())
            .unwrap_or(Point2::ORIGIN)
    }

    #[cfg(test)]
    mod tests {
        use cutplan_core::document::{Color, Entity, Line, PointEntity, Text, UnknownEntity};
        use cutplan_core::geometry::Point2;
        use proptest::prelude::*;

        use super::*;

        fn line(x0: f64, y0: f64, x1: f64, y1: f64) -> Entity {
            Entity::Line(Line {
                start: Point2::new(x0, y0),
                end: Point2::new(x1, y1),
                layer: "0".to_string(),
                color: Color::BY_LAYER,
            })
        }

        #[test]
        fn center_is_midpoint_of_extents() {
            let entities = vec![line(0.0, 0.0, 10.0, 4.0), line(-6.0, 2.0, 2.0, 20.0)];
            let bounds = bounds_of(&entities).expect("应有包围盒");
            assert!((bounds.min().x() + 6.0).abs() < 1e-9);
            assert!((bounds.max().y() - 20.0).abs() < 1e-9);

            let center = center_of(&entities);
            assert!((center.x() - 2.0).abs() < 1e-9);
            assert!((center.y() - 10.0).abs() < 1e-9);
        }

        #[test]
        fn entities_without_extent_fall_back_to_origin() {
            let entities = vec![
                Entity::Point(PointEntity {
                    position: Point2::new(50.0, 50.0),
                    layer: "0".to_string(),
                    color: Color::BY_LAYER,
                }),
                Entity::Text(Text {
                    insert: Point2::new(3.0, 4.0),
                    content: "ROS".to_string(),
                    height: 2.5,
                    rotation: 0.0,
                    layer: "0".to_string(),
                    color: Color::BY_LAYER,
                }),
                Entity::Unknown(UnknownEntity {
                    kind: "HATCH".to_string(),
                    layer: "0".to_string(),
                    color: Color::BY_LAYER,
                }),
                line(1.0, 1.0, 1.0, 1.0),
                line(f64::NAN, 0.0, 1.0, 1.0),
            ];
            assert!(bounds_of(&entities).is_none());
            assert_eq!(center_of(&entities), Point2::ORIGIN);
            assert_eq!(center_of(std::iter::empty()), Point2::ORIGIN);
        }

        #[test]
        fn malformed_entities_do_not_abort_the_scan() {
            let entities = vec![
                line(f64::INFINITY, 0.0, 1.0, 1.0),
                line(0.0, 0.0, 4.0, 2.0),
            ];
            let center = center_of(&entities);
            assert!((center.x() - 2.0).abs() < 1e-9);
            assert!((center.y() - 1.0).abs() < 1e-9);
        }

        proptest! {
            #[test]
            fn bounds_do_not_depend_on_entity_order(
                coords in prop::collection::vec(
                    (-1.0e4f64..1.0e4, -1.0e4f64..1.0e4, -1.0e4f64..1.0e4, -1.0e4f64..1.0e4),
                    1..24,
                ),
                rotate_by in 0usize..24,
            ) {
                let forward: Vec<Entity> = coords
                    .iter()
                    .map(|&(x0, y0, x1, y1)| line(x0, y0, x1, y1))
                    .collect();
                let mut reversed = forward.clone();
                reversed.reverse();
                let mut rotated = forward.clone();
                let shift = rotate_by % rotated.len();
                rotated.rotate_left(shift);

                let expected = bounds_of(&forward);
                prop_assert_eq!(bounds_of(&reversed), expected);
                prop_assert_eq!(bounds_of(&rotated), expected);
            }
        }
    }
}

pub mod transplant {
    use cutplan_core::document::{Document, Entity, TransformError};
    use cutplan_core::geometry::Vector2;
    use tracing::warn;

    /// 接收平移后实体的目标：输出文档的模型空间或块定义的实体列表。
    pub trait EntitySink {
        fn accept(&mut self, entity: Entity);
    }

    impl EntitySink for Vec<Entity> {
        fn accept(&mut self, entity: Entity) {
            self.push(entity);
        }
    }

    impl EntitySink for Document {
        fn accept(&mut self, entity: Entity) {
            self.add_entity(entity);
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    pub enum DropReason {
        Transform(TransformError),
        /// 源图纸内的块参照，其块定义不随实体复制。
        NestedBlockReference(String),
    }

    #[derive(Debug, Clone, PartialEq)]
    pub enum TransplantOutcome {
        Copied,
        Dropped { kind: String, reason: DropReason },
    }

    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct TransplantSummary {
        pub copied: usize,
        pub dropped: usize,
    }

    /// 复制单个实体并平移 `offset`，失败时丢弃该实体，不影响源实体。
    pub fn transplant<S>(entity: &Entity, offset: Vector2, sink: &mut S) -> TransplantOutcome
    where
        S: EntitySink + ?Sized,
    {
        if let Entity::BlockReference(reference) = entity {
            return TransplantOutcome::Dropped {
                kind: entity.kind().to_string(),
                reason: DropReason::NestedBlockReference(reference.name.clone()),
            };
        }
        match entity.translated(offset) {
            Ok(moved) => {
                sink.accept(moved);
                TransplantOutcome::Copied
            }
            Err(err) => TransplantOutcome::Dropped {
                kind: entity.kind().to_string(),
                reason: DropReason::Transform(err),
            },
        }
    }

    pub fn transplant_all<'a, I, S>(entities: I, offset: Vector2, sink: &mut S) -> TransplantSummary
    where
        I: IntoIterator<Item = &'a Entity>,
        S: EntitySink + ?Sized,
    {
        entities
            .into_iter()
            .fold(TransplantSummary::default(), |mut summary, entity| {
                match transplant(entity, offset, sink) {
                    TransplantOutcome::Copied => summary.copied += 1,
                    TransplantOutcome::Dropped { kind, reason } => {
                        warn!(kind = %kind, reason = ?reason, "实体复制失败，已跳过");
                        summary.dropped += 1;
                    }
                }
                summary
            })
    }

}
