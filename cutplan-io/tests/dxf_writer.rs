use cutplan_core::{
    document::{BlockDefinition, Color, Document, Entity, PolylineVertex, Polyline},
    geometry::Point2,
};
use cutplan_io::{DocumentLoader, DocumentSaver, DxfFacade};
use glam::DVec2;

fn sample_document() -> Document {
    let mut doc = Document::new();
    doc.set_insertion_units(Some(4));

    let mut block = BlockDefinition::new("BLK_ANEL-DOU_dxf");
    block.entities.push(Entity::Polyline(Polyline {
        vertices: vec![
            PolylineVertex::new(Point2::new(-65.0, -95.0)),
            PolylineVertex::with_bulge(Point2::new(65.0, -95.0), 0.25),
            PolylineVertex::new(Point2::new(65.0, 95.0)),
            PolylineVertex::new(Point2::new(-65.0, 95.0)),
        ],
        is_closed: true,
        layer: "CORTE".to_string(),
        color: Color::BY_LAYER,
    }));
    doc.add_block_definition(block);

    doc.add_block_reference("BLK_ANEL-DOU_dxf", Point2::new(99.5, 113.9), "0");
    doc.add_polyline(
        [
            Point2::new(0.0, 0.0),
            Point2::new(17.0, 0.0),
            Point2::new(17.0, 17.0),
            Point2::new(0.0, 17.0),
        ],
        true,
        "REGISTRO",
        Color::YELLOW,
    );
    doc
}

#[test]
fn written_text_declares_version_units_and_sections() {
    let text = DxfFacade::new().to_dxf_string(&sample_document());

    assert!(text.contains("$ACADVER\n  1\nAC1015"));
    assert!(text.contains("$INSUNITS\n 70\n4"));
    for section in ["HEADER", "TABLES", "BLOCKS", "ENTITIES"] {
        assert!(
            text.contains(&format!("SECTION\n  2\n{section}\n")),
            "缺少 {section} 段"
        );
    }
    assert!(text.trim_end().ends_with("EOF"));
    // 匿名块只写定义，不回读
    assert!(text.contains("*Model_Space"));
}

#[test]
fn write_then_read_preserves_blocks_and_placements() {
    let dir = tempfile::tempdir().expect("创建临时目录失败");
    let path = dir.path().join("plano.dxf");

    let facade = DxfFacade::new();
    facade
        .save(&sample_document(), &path)
        .expect("写入 DXF 失败");
    let doc = facade.load(&path).expect("回读 DXF 失败");

    assert_eq!(doc.insertion_units(), Some(4));
    assert_eq!(doc.blocks().count(), 1);
    let block = doc.block("BLK_ANEL-DOU_dxf").expect("块定义丢失");
    assert_eq!(block.entities.len(), 1);
    let Entity::Polyline(outline) = &block.entities[0] else {
        panic!("块内实体应为多段线");
    };
    assert!(outline.is_closed);
    assert!((outline.vertices[1].bulge - 0.25).abs() < 1e-9);

    let reference = doc
        .entities()
        .find_map(|(_, entity)| match entity {
            Entity::BlockReference(reference) => Some(reference),
            _ => None,
        })
        .expect("块参照丢失");
    let expected = DVec2::new(99.5, 113.9);
    assert!((reference.insert.as_vec2() - expected).length() < 1e-9);

    let mark = doc
        .entities()
        .find_map(|(_, entity)| match entity {
            Entity::Polyline(polyline) => Some(polyline),
            _ => None,
        })
        .expect("定位标记丢失");
    assert_eq!(mark.layer, "REGISTRO");
    assert_eq!(mark.color, Color::YELLOW);
    assert_eq!(mark.vertices.len(), 4);
}

#[test]
fn by_layer_color_is_not_written() {
    let mut doc = Document::new();
    doc.add_line(Point2::new(0.0, 0.0), Point2::new(1.0, 0.0), "0");
    let text = DxfFacade::new().to_dxf_string(&doc);
    assert!(!text.contains("\n 62\n256"));
}

#[test]
fn handseed_exceeds_every_written_handle() {
    let text = DxfFacade::new().to_dxf_string(&sample_document());
    let lines: Vec<&str> = text.lines().collect();

    let seed_at = lines
        .iter()
        .position(|line| *line == "$HANDSEED")
        .expect("缺少 $HANDSEED");
    assert_eq!(lines[seed_at + 1].trim(), "5");
    let seed = u64::from_str_radix(lines[seed_at + 2], 16).expect("句柄种子应为十六进制");

    let handles: Vec<u64> = lines
        .chunks(2)
        .filter(|pair| pair.len() == 2 && pair[0].trim() == "5")
        .filter_map(|pair| u64::from_str_radix(pair[1], 16).ok())
        .collect();
    // 种子本身也以组码 5 写出
    assert!(handles.len() > 5);
    let max_used = handles.iter().copied().filter(|handle| *handle != seed).max();
    assert!(max_used.is_some_and(|handle| handle < seed));
}

#[test]
fn objects_section_holds_the_root_dictionary() {
    let text = DxfFacade::new().to_dxf_string(&sample_document());
    let objects = text
        .find("SECTION\n  2\nOBJECTS\n")
        .expect("缺少 OBJECTS 段");
    let entities = text
        .find("SECTION\n  2\nENTITIES\n")
        .expect("缺少 ENTITIES 段");
    assert!(entities < objects);
    assert!(text[objects..].contains("DICTIONARY\n  5\n"));
    assert!(text[objects..].contains("  3\nACAD_GROUP\n"));
    assert!(text.contains("  2\nLTYPE\n"));

    // 读取端跳过 OBJECTS 与 TABLES
    let doc = DxfFacade::new().parse_str(&text).expect("回读失败");
    assert_eq!(doc.entity_count(), 2);
}
