//! End-to-end lowering scenarios on both targets

use polylower::middle::ir::builder::*;
use polylower::middle::ir::{BuiltinOperator, Type};
use polylower::{FileKind, Target};

use crate::common::{file_text, has_line, int_ref, plus, single, translate};

fn equals_one(param_type: Type) -> polylower::Module {
    single(function(
        "t",
        vec![param("x", param_type.clone())],
        Type::boolean(),
        vec![ret(op(
            BuiltinOperator::EqIntInt,
            vec![reference("x", param_type), int(1)],
            Type::boolean(),
        ))],
    ))
}

#[test]
fn test_plain_int_equality_is_direct() {
    let cs = file_text(&translate(&equals_one(Type::int()), Target::CSharp), FileKind::Source);
    assert!(cs.contains("public static bool T(int x) {"));
    assert!(cs.contains("return x == 1;"));
    assert!(!cs.contains("GenericEq"));

    let cpp = file_text(&translate(&equals_one(Type::int()), Target::Cpp), FileKind::Source);
    assert!(cpp.contains("bool t(int32_t x) {"));
    assert!(cpp.contains("return x == 1;"));
    assert!(!cpp.contains("generic_eq"));
}

#[test]
fn test_nullable_int_equality_is_null_safe() {
    let module = equals_one(Type::nullable(Type::int()));
    let cs = file_text(&translate(&module, Target::CSharp), FileKind::Source);
    assert!(cs.contains("public static bool T(int? x) {"));
    assert!(cs.contains("return Core.GenericEq(x, 1);"));
    assert!(cs.contains("using Temper.Core;"));

    let files = translate(&module, Target::Cpp);
    let source = file_text(&files, FileKind::Source);
    assert!(source.contains("return temper::core::generic_eq(x, 1);"));
    let header = file_text(&files, FileKind::Header);
    assert!(header.contains("#include \"temper-core/core.hpp\""));
}

fn mutated_by_nested() -> polylower::Module {
    single(function(
        "main",
        vec![],
        Type::void(),
        vec![
            var("total", Type::int(), Some(int(1))),
            local_function(function(
                "add",
                vec![],
                Type::void(),
                vec![assign("total", plus(int_ref("total"), int(41)))],
            )),
            expr(call("add", vec![], Type::void())),
            print(int_ref("total")),
        ],
    ))
}

#[test]
fn test_mutated_local_is_hoisted_into_container() {
    let cs = file_text(&translate(&mutated_by_nested(), Target::CSharp), FileKind::Source);
    assert!(cs.contains("private sealed class MainScope_0 {"));
    assert!(cs.contains("public int total;"));
    assert!(cs.contains("scope_1.total = 1;"));
    assert!(cs.contains("scope_1.total = scope_1.total + 41;"));
    assert!(cs.contains("Console.WriteLine(scope_1.total);"));
    assert!(!cs.contains("int total = 1;"));

    let files = translate(&mutated_by_nested(), Target::Cpp);
    let header = file_text(&files, FileKind::Header);
    assert!(header.contains("struct MainScope_0 : std::enable_shared_from_this<MainScope_0> {"));
    let source = file_text(&files, FileKind::Source);
    assert!(source.contains("scope_1->total = scope_1->total + 41;"));
    assert!(source.contains("temper::core::print(scope_1->total);"));
}

fn log_yield_log() -> polylower::Module {
    single(generator(
        "steps",
        vec![],
        Type::string(),
        vec![
            print(string("first")),
            yield_(Some(string("paused"))),
            print(string("second")),
        ],
    ))
}

#[test]
fn test_generator_lowers_to_two_cases() {
    let cs = file_text(&translate(&log_yield_log(), Target::CSharp), FileKind::Source);
    assert!(cs.contains("public static Generator<string> Steps() {"));
    assert!(cs.contains("return Generator.Wrap("));
    assert!(has_line(&cs, "case 0: {"));
    assert!(has_line(&cs, "case 1: {"));
    // terminal case
    assert!(has_line(&cs, "case 2: {"));
    assert!(!has_line(&cs, "case 3: {"));
    assert_eq!(cs.matches("Console.WriteLine(\"first\");").count(), 1);
    assert_eq!(cs.matches("Console.WriteLine(\"second\");").count(), 1);
    assert!(cs.contains("return Generator.ValueResult(\"paused\");"));
    assert!(cs.contains("return Generator.DoneResult();"));

    // first log precedes the suspension, second log precedes completion
    let first = cs.find("\"first\"").unwrap();
    let paused = cs.find("\"paused\"").unwrap();
    let second = cs.find("\"second\"").unwrap();
    let done = cs.find("Generator.DoneResult()").unwrap();
    assert!(first < paused && paused < second && second < done);

    let cpp = file_text(&translate(&log_yield_log(), Target::Cpp), FileKind::Source);
    assert!(cpp.contains("return temper::core::make_generator("));
    assert!(cpp.contains("return temper::core::value_result(std::string(\"paused\"));"));
}

fn break_outer_across_try() -> polylower::Module {
    single(function(
        "scan",
        vec![],
        Type::void(),
        vec![
            labeled(
                "outer",
                while_(
                    boolean(true),
                    vec![while_(
                        boolean(true),
                        vec![try_(
                            vec![print(string("inner")), break_(Some("outer"))],
                            vec![print(string("recovered"))],
                        )],
                    )],
                ),
            ),
            print(string("after")),
        ],
    ))
}

#[test]
fn test_break_outer_across_barrier_uses_escape_code() {
    let cpp = file_text(&translate(&break_outer_across_try(), Target::Cpp), FileKind::Source);
    assert!(cpp.contains("int32_t escape_0 = 0;"));
    assert!(cpp.contains("temper::core::recover([&]() -> bool {"));

    // the code is set inside the region, before the region returns
    let set = cpp.find("escape_0 = 1;").unwrap();
    let dispatch = cpp.find("switch (escape_0) {").unwrap();
    assert!(set < dispatch);

    let case = &cpp[dispatch..];
    assert!(case.contains("case 1: {"));
    assert!(case.contains("goto outer_break;"));
    assert!(has_line(&cpp, "outer_break: ;"));
}

#[test]
fn test_break_outer_without_barrier_stays_native() {
    let cs = file_text(&translate(&break_outer_across_try(), Target::CSharp), FileKind::Source);
    assert!(cs.contains("try {"));
    assert!(cs.contains("goto outer_break;"));
    assert!(!cs.contains("escape"));
    assert!(!cs.contains("switch ("));
}
