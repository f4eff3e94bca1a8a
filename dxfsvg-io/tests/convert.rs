use std::fs;
use std::path::PathBuf;

use serde_json::json;
use dxfsvg_core::{ConversionContext, SvgElement};
use dxfsvg_core::collection::Collection;
use dxfsvg_io::{DrawingLoader, DxfError, DxfFacade, IoError, SvgDocument, convert_file};

fn fixture(name: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests/data");
    path.push(name);
    path
}

#[test]
fn basic_entities_are_grouped_by_layer() {
    let drawing = DxfFacade::default()
        .load(&fixture("basic_entities.dxf"))
        .expect("读取 DXF 失败");

    let summary = serde_json::to_value(drawing.summary()).expect("摘要序列化失败");
    assert_eq!(
        summary,
        json!({
            "entities": 6,
            "skipped": 2,
            "layers": 3,
            "blocks": 0,
            "patterns": 0,
        })
    );

    let names: Vec<_> = drawing.layers().iter().map(|layer| layer.name()).collect();
    assert_eq!(names, vec!["0", "WALLS", "NOTES"]);

    let walls = drawing.layer("WALLS").expect("缺少 WALLS 图层");
    assert_eq!(walls.len(), 3);
    assert!(matches!(walls.children()[0], SvgElement::Line(_)));
    assert!(matches!(walls.children()[2], SvgElement::Polyline(_)));

    let notes = drawing.layer("NOTES").expect("缺少 NOTES 图层");
    match &notes.children()[0] {
        SvgElement::Text(text) => {
            assert_eq!(text.content, "Room \u{2300}12 & <hall>");
            assert_eq!(text.font_family.as_deref(), Some("romans"));
        }
        other => panic!("期望文字实体，实际为 {other:?}"),
    }
    // 未在图层表中的图层以默认样式补充
    assert!(drawing.context.layers.get("NOTES").is_some());
}

#[test]
fn basic_entities_render_to_svg() {
    let drawing = DxfFacade::default()
        .load(&fixture("basic_entities.dxf"))
        .expect("读取 DXF 失败");
    let svg = SvgDocument::new(&drawing).render();

    assert!(svg.contains("width=\"100\" height=\"50\" viewBox=\"0 0 100 50\""));
    assert!(svg.contains("<line x1=\"0\" y1=\"50\" x2=\"100\" y2=\"0\""));
    assert!(svg.contains("<circle cx=\"50\" cy=\"25\" r=\"10\""));
    assert!(svg.contains(".layer-WALLS{stroke:"));
    assert!(svg.contains("stroke-dasharray:"));
    assert!(svg.contains("Room \u{2300}12 &amp; &lt;hall&gt;"));
    assert!(svg.contains("font-family:romans"));
    // 隐藏图层没有实体，不输出分组
    assert!(!svg.contains("<g id=\"layer-HIDDEN\""));

    let walls = svg.find("id=\"layer-WALLS\"").expect("缺少 WALLS 分组");
    let notes = svg.find("id=\"layer-NOTES\"").expect("缺少 NOTES 分组");
    assert!(walls < notes);
}

#[test]
fn hatch_fills_register_patterns() {
    let drawing = DxfFacade::default()
        .load(&fixture("hatch_fills.dxf"))
        .expect("读取填充 DXF 失败");
    let summary = drawing.summary();
    assert_eq!(summary.entities, 2);
    assert_eq!(summary.skipped, 0);
    assert_eq!(summary.patterns, 1);

    let fill = drawing.layer("FILL").expect("缺少 FILL 图层");
    match &fill.children()[0] {
        SvgElement::Hatch(hatch) => {
            assert!(hatch.solid);
            assert_eq!(hatch.boundary.loops().len(), 1);
        }
        other => panic!("期望填充实体，实际为 {other:?}"),
    }

    let svg = SvgDocument::new(&drawing).render();
    assert!(svg.contains("<defs>"));
    assert!(svg.contains("<pattern id=\"hatch-ANSI31\""));
    assert!(svg.contains("url(#hatch-ANSI31)"));
    assert!(svg.contains("fill-rule=\"evenodd\""));
}

#[test]
fn blocks_become_definitions_and_uses() {
    let drawing = DxfFacade::default()
        .load(&fixture("blocks_insert.dxf"))
        .expect("读取块 DXF 失败");

    assert_eq!(drawing.declarations().len(), 1);
    let door = &drawing.declarations()[0];
    assert_eq!(door.name(), "DOOR");
    assert_eq!(door.len(), 1);
    // 引用未定义的块仍然输出
    assert_eq!(drawing.entity_count(), 2);

    let svg = SvgDocument::new(&drawing).render();
    assert!(svg.contains("<g id=\"block-DOOR\">"));
    assert!(svg.contains("<g class=\"layer-DOORS\">"));
    // 块内坐标以基点为原点
    assert!(svg.contains("<circle cx=\"0\" cy=\"0\" r=\"2\""));
    assert!(svg.contains("xlink:href=\"#block-DOOR\""));
    assert!(svg.contains("rotate(-90) scale(2 2)"));
    assert!(svg.contains("xlink:href=\"#block-WINDOW\""));
    assert!(!svg.contains("Model_Space"));
}

#[test]
fn truncated_pairing_aborts_conversion() {
    let err = DxfFacade::default()
        .load(&fixture("truncated.dxf"))
        .expect_err("组码配对损坏应当报错");
    match err {
        IoError::Dxf(DxfError::Syntax { line, .. }) => assert_eq!(line, 7),
        other => panic!("期望组码配对错误，实际为 {other:?}"),
    }
}

#[test]
fn missing_input_reports_path() {
    let err = DxfFacade::default()
        .load(&fixture("does_not_exist.dxf"))
        .expect_err("缺失文件应当报错");
    assert!(matches!(err, IoError::Read { .. }));
}

#[test]
fn header_limits_are_used_without_extents() {
    let source = "0\nSECTION\n2\nHEADER\n9\n$EXTMIN\n10\n1e20\n20\n1e20\n9\n$EXTMAX\n10\n-1e20\n20\n-1e20\n\
                  9\n$LIMMIN\n10\n0\n20\n0\n9\n$LIMMAX\n10\n60\n20\n40\n0\nENDSEC\n0\nEOF\n";
    let drawing = DxfFacade::default().parse_str(source).expect("解析失败");
    assert_eq!(drawing.context.space.canvas_size(), (60.0, 40.0));
    assert_eq!(drawing.entity_count(), 0);
}

#[test]
fn convert_file_writes_svg() {
    let dir = tempfile::tempdir().expect("创建临时目录失败");
    let output = dir.path().join("basic.svg");
    let summary = convert_file(
        &fixture("basic_entities.dxf"),
        &output,
        ConversionContext::default(),
    )
    .expect("转换失败");
    assert_eq!(summary.entities, 6);

    let svg = fs::read_to_string(&output).expect("读取输出失败");
    assert!(svg.starts_with("<?xml"));
    assert!(svg.trim_end().ends_with("</svg>"));
}

#[test]
fn unwritable_output_is_reported() {
    let dir = tempfile::tempdir().expect("创建临时目录失败");
    let output = dir.path().join("missing").join("out.svg");
    let err = convert_file(
        &fixture("basic_entities.dxf"),
        &output,
        ConversionContext::default(),
    )
    .expect_err("目录不存在时应当报错");
    assert!(matches!(err, IoError::Write { .. }));
}
