//! C# backend through the public driver

use polylower::middle::ir::builder::*;
use polylower::middle::ir::{BuiltinOperator, TopLevel, Type};
use polylower::{translate_module, EmitConfig, FileKind, LowerError, Target};

use crate::common::{file_text, int_ref, translate};

fn shapes() -> polylower::Module {
    module(
        &["geo", "shapes"],
        vec![
            module_var("count", Type::int(), Some(int(0))),
            TopLevel::Function(exported(function(
                "area",
                vec![param("w", Type::int()), param("h", Type::int())],
                Type::int(),
                vec![ret(op(
                    BuiltinOperator::TimesIntInt,
                    vec![int_ref("w"), int_ref("h")],
                    Type::int(),
                ))],
            ))),
        ],
    )
}

#[test]
fn test_module_becomes_static_class() {
    let files = translate(&shapes(), Target::CSharp);
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].path, "Geo/Shapes/ShapesGlobal.cs");
    assert_eq!(files[0].mime, "text/x-csharp");

    let text = file_text(&files, FileKind::Source);
    assert!(text.contains("namespace Temper.Geo.Shapes"));
    assert!(text.contains("public static class ShapesGlobal {"));
    assert!(text.contains("public static int Area(int w, int h) {"));
    assert!(text.contains("return w * h;"));
    assert!(text.contains("count = 0;"));
}

#[test]
fn test_library_and_root_namespace_come_from_config() {
    let config = EmitConfig::from_toml_str(
        r#"
library = "cartography"
entry_file = true

[csharp]
root_namespace = "Acme"
"#,
    )
    .unwrap();
    let files = translate_module(&shapes(), Target::CSharp, &config).unwrap();
    assert_eq!(files.len(), 2);
    assert_eq!(files[0].path, "Cartography/Shapes/ShapesGlobal.cs");
    assert!(files[0].text.contains("namespace Acme.Cartography.Shapes"));

    let entry = &files[1];
    assert_eq!(entry.kind, FileKind::Metadata);
    assert_eq!(entry.mime, "application/json");
    let parsed: serde_json::Value = serde_json::from_str(&entry.text).unwrap();
    assert_eq!(parsed["target"], "csharp");
    assert_eq!(parsed["exports"][0], "Area");
}

#[test]
fn test_fatal_error_names_the_module() {
    let broken = module(
        &["geo", "broken"],
        vec![TopLevel::Function(function("f", vec![], Type::void(), vec![break_(None)]))],
    );
    let err = translate_module(&broken, Target::CSharp, &EmitConfig::default()).unwrap_err();
    assert!(err.to_string().contains("geo/broken"));
    assert!(matches!(
        err.downcast_ref::<LowerError>(),
        Some(LowerError::JumpOutsideLoop { .. })
    ));
}
