//! C++ backend through the public driver

use polylower::middle::ir::builder::*;
use polylower::middle::ir::{BuiltinOperator, TopLevel, Type};
use polylower::{translate_all, EmitConfig, FileKind, Target};

use crate::common::{file_text, translate};

fn unresolved() -> polylower::Module {
    module(
        &["demo", "cmp"],
        vec![TopLevel::Function(exported(function(
            "order",
            vec![],
            Type::int(),
            vec![ret(op(
                BuiltinOperator::CmpGeneric,
                vec![string("a"), string("b")],
                Type::int(),
            ))],
        )))],
    )
}

#[test]
fn test_header_and_source_pair() {
    let files = translate(&unresolved(), Target::Cpp);
    assert_eq!(files.len(), 2);

    let header = files.iter().find(|f| f.kind == FileKind::Header).unwrap();
    assert_eq!(header.path, "demo/cmp/cmp.hpp");
    assert_eq!(header.mime, "text/x-c++hdr");
    assert!(header.text.starts_with("#ifndef TEMPER_DEMO_CMP_HPP"));
    assert!(header.text.contains("int32_t order();"));
    assert!(header.text.contains("void init_module();"));

    let source = files.iter().find(|f| f.kind == FileKind::Source).unwrap();
    assert_eq!(source.path, "demo/cmp/cmp.cpp");
    assert!(source.text.starts_with("#include \"demo/cmp/cmp.hpp\"\n"));
    assert!(source.text.contains("namespace temper {"));
}

#[test]
fn test_missing_support_code_is_a_marker_not_an_error() {
    let files = translate(&unresolved(), Target::Cpp);
    let source = file_text(&files, FileKind::Source);
    assert!(source.contains("return /* TODO(polylower): no cpp rendering for `CmpGeneric` */;"));

    let source = files.iter().find(|f| f.kind == FileKind::Source).unwrap();
    assert_eq!(source.diagnostics.len(), 1);
    let header = files.iter().find(|f| f.kind == FileKind::Header).unwrap();
    assert!(header.diagnostics.is_empty());
}

#[test]
fn test_translate_all_covers_both_targets() {
    let all = translate_all(&unresolved(), &EmitConfig::default()).unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].0, Target::CSharp);
    assert_eq!(all[1].0, Target::Cpp);

    // C# has a rendering for the generic comparison
    let cs = &all[0].1[0];
    assert!(cs.text.contains("return Core.GenericCmp(\"a\", \"b\");"));
    assert!(cs.diagnostics.is_empty());
}
