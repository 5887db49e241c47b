//! Emission walk tests

use super::*;
use crate::backends::cpp::CppDialect;
use crate::backends::csharp::CSharpDialect;
use crate::middle::ir::builder::*;
use crate::middle::ir::{BuiltinOperator, Expr, Stmt};

fn csharp(module: &Module) -> Result<EmittedModule> {
    let dialect = CSharpDialect::new("TestGlobal");
    ModuleEmitter::new(&dialect, module, &EmitConfig::default()).emit(module)
}

fn cpp(module: &Module) -> Result<EmittedModule> {
    let dialect = CppDialect;
    ModuleEmitter::new(&dialect, module, &EmitConfig::default()).emit(module)
}

fn single(function: Function) -> Module {
    module(&["test"], vec![TopLevel::Function(function)])
}

fn text(function: &EmittedFunction) -> String {
    cst::Printer::print(&cst::Unit {
        items: vec![cst::Item::Function {
            modifiers: String::new(),
            ret: function.ret.clone(),
            name: function.name.clone(),
            params: function.params.clone(),
            body: Some(function.body.clone()),
        }],
    })
}

fn int_ref(text: &str) -> Expr {
    reference(text, Type::int())
}

fn plus(
    a: Expr,
    b: Expr,
) -> Expr {
    op(BuiltinOperator::PlusIntInt, vec![a, b], Type::int())
}

fn minus(
    a: Expr,
    b: Expr,
) -> Expr {
    op(BuiltinOperator::MinusIntInt, vec![a, b], Type::int())
}

fn gt(
    a: Expr,
    b: Expr,
) -> Expr {
    op(BuiltinOperator::GtIntInt, vec![a, b], Type::boolean())
}

fn void_call(name: &str) -> Stmt {
    expr(call(name, vec![], Type::void()))
}

fn counter() -> Function {
    function(
        "main",
        vec![],
        Type::void(),
        vec![
            var("i", Type::int(), Some(int(0))),
            local_function(function(
                "bump",
                vec![],
                Type::void(),
                vec![assign("i", plus(int_ref("i"), int(1)))],
            )),
            void_call("bump"),
            void_call("bump"),
            print(int_ref("i")),
        ],
    )
}

/// Lines whose trimmed text is exactly `line`
fn has_line(
    text: &str,
    line: &str,
) -> bool {
    text.lines().any(|l| l.trim() == line)
}

#[test]
fn test_csharp_counter_shares_container() {
    let emitted = csharp(&single(counter())).unwrap();
    assert_eq!(emitted.containers.len(), 1);
    let container = &emitted.containers[0];
    assert_eq!(container.type_name, "MainScope_0");
    assert_eq!(container.fields, vec![("int".to_string(), "i".to_string())]);
    assert!(container.methods.is_empty());

    let main = text(&emitted.functions[0]);
    assert!(main.contains("MainScope_0 scope_1 = new MainScope_0();"));
    assert!(main.contains("scope_1.i = 0;"));
    assert!(main.contains("void bump() {"));
    assert!(main.contains("scope_1.i = scope_1.i + 1;"));
    assert!(main.contains("Console.WriteLine(scope_1.i);"));
    assert!(emitted.requirements.contains(&Requirement::Using("System")));
}

#[test]
fn test_cpp_counter_shares_container() {
    let emitted = cpp(&single(counter())).unwrap();
    let main = text(&emitted.functions[0]);
    assert!(main.contains("std::shared_ptr<MainScope_0> scope_1 = std::make_shared<MainScope_0>();"));
    assert!(main.contains("auto bump = [=]() -> void {"));
    assert!(main.contains("scope_1->i = scope_1->i + 1;"));
    assert!(main.contains("temper::core::print(scope_1->i);"));
}

#[test]
fn test_recursive_local_function_becomes_method() {
    let program = function(
        "main",
        vec![],
        Type::void(),
        vec![
            var("n", Type::int(), Some(int(3))),
            local_function(function(
                "tick",
                vec![],
                Type::void(),
                vec![if_(
                    gt(int_ref("n"), int(0)),
                    vec![assign("n", minus(int_ref("n"), int(1))), void_call("tick")],
                    vec![],
                )],
            )),
            void_call("tick"),
        ],
    );
    let emitted = csharp(&single(program)).unwrap();
    let container = &emitted.containers[0];
    assert_eq!(container.methods.len(), 1);
    assert_eq!(container.methods[0].name, "Tick");

    let main = text(&emitted.functions[0]);
    assert!(main.contains("scope_1.Tick();"));
    assert!(!main.contains("void tick()"));

    let tick = text(&container.methods[0]);
    assert!(tick.contains("if (this.n > 0) {"));
    assert!(tick.contains("this.n = this.n - 1;"));
    assert!(tick.contains("this.Tick();"));
}

#[test]
fn test_method_reaches_outer_container_through_parent() {
    let program = function(
        "main",
        vec![],
        Type::void(),
        vec![
            var("x", Type::int(), Some(int(0))),
            local_function(function(
                "rec1",
                vec![],
                Type::void(),
                vec![
                    local_function(function(
                        "rec2",
                        vec![param("n", Type::int())],
                        Type::void(),
                        vec![if_(
                            gt(int_ref("n"), int(0)),
                            vec![
                                assign("x", plus(int_ref("x"), int(1))),
                                expr(call("rec2", vec![minus(int_ref("n"), int(1))], Type::void())),
                            ],
                            vec![],
                        )],
                    )),
                    expr(call("rec2", vec![int(3)], Type::void())),
                ],
            )),
            void_call("rec1"),
            print(int_ref("x")),
        ],
    );
    let emitted = csharp(&single(program)).unwrap();
    assert_eq!(emitted.containers.len(), 2);
    assert_eq!(
        emitted.containers[1].fields[0],
        ("MainScope_0".to_string(), PARENT_MEMBER.to_string())
    );

    let main = text(&emitted.functions[0]);
    assert!(main.contains("scope_3.parent_ = scope_1;"));
    assert!(main.contains("scope_3.Rec2(3);"));

    let rec2 = text(&emitted.containers[1].methods[0]);
    assert!(rec2.contains("this.parent_.x = this.parent_.x + 1;"));
    assert!(rec2.contains("this.Rec2(n - 1);"));
}

#[test]
fn test_labeled_continue_across_loops_uses_goto() {
    let program = function(
        "f",
        vec![],
        Type::void(),
        vec![labeled(
            "outer",
            while_(
                boolean(true),
                vec![while_(
                    boolean(true),
                    vec![
                        if_(boolean(false), vec![continue_(Some("outer"))], vec![]),
                        if_(boolean(false), vec![break_(Some("outer"))], vec![]),
                        break_(None),
                    ],
                )],
            ),
        )],
    );
    let emitted = csharp(&single(program)).unwrap();
    let f = text(&emitted.functions[0]);
    assert!(f.contains("goto outer_continue;"));
    assert!(f.contains("goto outer_break;"));
    assert!(has_line(&f, "outer_continue: ;"));
    assert!(has_line(&f, "outer_break: ;"));
    assert!(has_line(&f, "break;"));
}

#[test]
fn test_labeled_break_of_innermost_loop_is_native() {
    let program = function(
        "f",
        vec![],
        Type::void(),
        vec![labeled(
            "outer",
            while_(boolean(true), vec![break_(Some("outer"))]),
        )],
    );
    let emitted = csharp(&single(program)).unwrap();
    let f = text(&emitted.functions[0]);
    assert!(has_line(&f, "break;"));
    assert!(!f.contains("goto"));
}

#[test]
fn test_break_outside_loop_is_fatal() {
    let program = function("f", vec![], Type::void(), vec![break_(None)]);
    let err = csharp(&single(program)).unwrap_err();
    assert!(matches!(err, LowerError::JumpOutsideLoop { kind: "break", .. }));
}

#[test]
fn test_continue_to_unknown_label_is_fatal() {
    let program = function(
        "f",
        vec![],
        Type::void(),
        vec![while_(boolean(true), vec![continue_(Some("nowhere"))])],
    );
    let err = cpp(&single(program)).unwrap_err();
    assert!(matches!(err, LowerError::UnboundLabel { kind: "continue", .. }));
}

#[test]
fn test_csharp_try_is_native() {
    let program = function(
        "f",
        vec![],
        Type::void(),
        vec![try_(vec![print(string("a"))], vec![print(string("b"))])],
    );
    let emitted = csharp(&single(program)).unwrap();
    let f = text(&emitted.functions[0]);
    assert!(f.contains("try {"));
    assert!(f.contains("} catch (Bubble) {"));
    assert!(f.contains("Console.WriteLine(\"a\");"));
}

#[test]
fn test_cpp_try_runs_in_lambdas() {
    let program = function(
        "f",
        vec![],
        Type::void(),
        vec![try_(vec![print(string("a"))], vec![print(string("b"))])],
    );
    let emitted = cpp(&single(program)).unwrap();
    let f = text(&emitted.functions[0]);
    assert!(f.contains("temper::core::recover([&]() -> bool {"));
    assert!(f.contains("temper::core::print(std::string(\"a\"));"));
    assert!(has_line(&f, "return false;"));
    assert!(!f.contains("if (temper::core::recover"));
}

#[test]
fn test_cpp_break_out_of_try_goes_through_escape_code() {
    let program = function(
        "f",
        vec![],
        Type::void(),
        vec![while_(
            boolean(true),
            vec![try_(vec![break_(None)], vec![print(string("recovered"))])],
        )],
    );
    let emitted = cpp(&single(program)).unwrap();
    let f = text(&emitted.functions[0]);
    assert!(f.contains("int32_t escape_0 = 0;"));
    assert!(f.contains("escape_0 = 1;"));
    assert!(f.contains("switch (escape_0) {"));
    assert!(f.contains("case 1: {"));
    assert!(f.contains("_break;"));
    assert!(!has_line(&f, "break;"));
}

#[test]
fn test_failure_return_inside_cpp_recover_reports_failure() {
    let program = function(
        "f",
        vec![],
        Type::failable(Type::void()),
        vec![try_(vec![print(string("a"))], vec![ret(bubble(Type::void()))])],
    );
    let emitted = cpp(&single(program)).unwrap();
    let f = text(&emitted.functions[0]);
    assert!(f.contains("if (temper::core::recover([&]() -> bool {"));
    assert!(has_line(&f, "return true;"));
    assert!(has_line(&f, "return temper::core::bubble();"));
}

fn guarded() -> Function {
    function(
        "f",
        vec![],
        Type::failable(Type::int()),
        vec![
            var("x", Type::int(), None),
            handler_assign("x", "fail", call("g", vec![], Type::failable(Type::int()))),
            check("fail", vec![ret(bubble(Type::int()))], vec![]),
            ret(int_ref("x")),
        ],
    )
}

#[test]
fn test_csharp_failure_travels_as_exception() {
    let emitted = csharp(&single(guarded())).unwrap();
    let f = text(&emitted.functions[0]);
    assert_eq!(emitted.functions[0].ret, "int");
    assert!(f.contains("int x = default;"));
    assert!(f.contains("Attempt<int> result_0 = Failure.Attempt(() => g());"));
    assert!(f.contains("if (result_0.IsFailure) {"));
    assert!(f.contains("throw result_0.Failure;"));
    assert!(f.contains("x = result_0.Value;"));
}

#[test]
fn test_cpp_failure_travels_as_return_value() {
    let emitted = cpp(&single(guarded())).unwrap();
    let f = text(&emitted.functions[0]);
    assert_eq!(emitted.functions[0].ret, "temper::core::Bubble<int32_t>");
    assert!(f.contains("temper::core::Bubble<int32_t> result_0 = g();"));
    assert!(f.contains("if (temper::core::is_failure(result_0)) {"));
    assert!(f.contains("return temper::core::bubble(result_0);"));
    assert!(f.contains("x = temper::core::unwrap(result_0);"));
}

#[test]
fn test_unresolved_operator_becomes_placeholder() {
    let program = function(
        "f",
        vec![],
        Type::void(),
        vec![expr(op(BuiltinOperator::CmpGeneric, vec![int(1), int(2)], Type::int()))],
    );
    let emitted = cpp(&single(program)).unwrap();
    let f = text(&emitted.functions[0]);
    assert!(f.contains("/* TODO(polylower): no cpp rendering for `CmpGeneric` */;"));
    assert_eq!(emitted.diagnostics.len(), 1);
    assert_eq!(emitted.diagnostics[0].code, "L0002");
}

#[test]
fn test_generator_becomes_state_machine() {
    let program = generator(
        "count",
        vec![],
        Type::int(),
        vec![yield_(Some(int(1))), yield_(Some(int(2)))],
    );
    let emitted = csharp(&single(program)).unwrap();
    assert_eq!(emitted.functions[0].ret, "Generator<int>");
    let f = text(&emitted.functions[0]);
    assert!(f.contains("return Generator.Wrap("));

    assert_eq!(emitted.containers.len(), 1);
    let step = &emitted.containers[0].methods[0];
    assert_eq!(step.ret, "GeneratorResult<int>");
    let step = text(step);
    assert!(step.contains("while (true) {"));
    assert!(step.contains("switch ("));
    assert!(step.contains("return Generator.ValueResult(1);"));
    assert!(step.contains("return Generator.ValueResult(2);"));
    assert!(step.contains("return Generator.DoneResult();"));
    assert!(emitted.requirements.contains(&Requirement::Core));
}

#[test]
fn test_stray_yield_is_fatal() {
    let program = function("f", vec![], Type::void(), vec![yield_(None)]);
    let err = csharp(&single(program)).unwrap_err();
    assert!(matches!(err, LowerError::StraySuspension { .. }));
}

#[test]
fn test_shadowed_locals_get_distinct_idents() {
    let shadow = Name::shadowed("x", 1);
    let program = function(
        "f",
        vec![],
        Type::void(),
        vec![
            var("x", Type::int(), Some(int(1))),
            Stmt::LocalDecl {
                name: shadow.clone(),
                ty: Type::int(),
                init: Some(int(2)),
                assign_once: true,
                span: Span::dummy(),
            },
            print(reference_to(shadow, Type::int())),
        ],
    );
    let emitted = csharp(&single(program)).unwrap();
    let f = text(&emitted.functions[0]);
    assert!(f.contains("int x = 1;"));
    assert!(f.contains("int x_2 = 2;"));
    assert!(f.contains("Console.WriteLine(x_2);"));
}

#[test]
fn test_module_init_keeps_source_order() {
    let m = module(
        &["test"],
        vec![
            module_var("a", Type::int(), Some(int(1))),
            init_block(vec![print(int_ref("a"))]),
            module_var("b", Type::int(), Some(int(2))),
        ],
    );
    let emitted = csharp(&m).unwrap();
    assert_eq!(emitted.globals.len(), 2);
    assert_eq!(emitted.init.len(), 3);
    assert!(matches!(&emitted.init[0], cst::Stmt::Assign { target: cst::Expr::Ident(a), .. } if a == "a"));
    assert!(matches!(&emitted.init[1], cst::Stmt::Block(_)));
    assert!(matches!(&emitted.init[2], cst::Stmt::Assign { target: cst::Expr::Ident(b), .. } if b == "b"));
}

#[test]
fn test_operator_requirements_are_collected() {
    let program = function(
        "f",
        vec![param("x", Type::float64())],
        Type::float64(),
        vec![ret(op(
            BuiltinOperator::PowFltFlt,
            vec![reference("x", Type::float64()), float(2.0)],
            Type::float64(),
        ))],
    );
    let emitted = cpp(&single(program.clone())).unwrap();
    assert!(emitted.requirements.contains(&Requirement::Include("<cmath>")));
    assert!(text(&emitted.functions[0]).contains("return std::pow(x, 2.0);"));

    let emitted = csharp(&single(program)).unwrap();
    assert!(text(&emitted.functions[0]).contains("return Math.Pow(x, 2.0);"));
}

#[test]
fn test_hoisted_locals_that_style_alike_get_distinct_fields() {
    let program = function(
        "main",
        vec![],
        Type::void(),
        vec![
            var("a_b", Type::int(), Some(int(1))),
            var("aB", Type::int(), Some(int(2))),
            local_function(function(
                "bump",
                vec![],
                Type::void(),
                vec![
                    assign("a_b", plus(int_ref("a_b"), int(10))),
                    assign("aB", plus(int_ref("aB"), int(20))),
                ],
            )),
            void_call("bump"),
            print(int_ref("a_b")),
            print(int_ref("aB")),
        ],
    );
    let emitted = csharp(&single(program)).unwrap();
    let container = &emitted.containers[0];
    assert_eq!(
        container.fields,
        vec![
            ("int".to_string(), "aB".to_string()),
            ("int".to_string(), "aB_2".to_string()),
        ]
    );

    let main = text(&emitted.functions[0]);
    assert!(main.contains("scope_1.aB = 1;"));
    assert!(main.contains("scope_1.aB_2 = 2;"));
    assert!(main.contains("scope_1.aB = scope_1.aB + 10;"));
    assert!(main.contains("scope_1.aB_2 = scope_1.aB_2 + 20;"));
    assert!(main.contains("Console.WriteLine(scope_1.aB);"));
    assert!(main.contains("Console.WriteLine(scope_1.aB_2);"));
}

#[test]
fn test_init_failure_in_recover_rethrows_caught_failure() {
    let m = module(
        &["test"],
        vec![init_block(vec![
            var("q", Type::int(), None),
            handler_assign(
                "q",
                "fail",
                op(
                    BuiltinOperator::DivIntIntSafe,
                    vec![int(1), int(0)],
                    Type::failable(Type::int()),
                ),
            ),
            check("fail", vec![init_failed()], vec![]),
        ])],
    );
    let emitted = csharp(&m).unwrap();
    let init = text(&EmittedFunction {
        name: "Init".to_string(),
        ret: "void".to_string(),
        params: Vec::new(),
        body: emitted.init.clone(),
        exported: false,
    });
    assert!(init.lines().any(|l| {
        let l = l.trim();
        l.starts_with("throw result_") && l.ends_with(".Failure;")
    }));
    assert!(!init.contains("new Bubble()"));
}

#[test]
fn test_generator_failure_return_throws() {
    let program = generator(
        "count",
        vec![],
        Type::int(),
        vec![yield_(Some(int(1))), ret(bubble(Type::int()))],
    );
    let emitted = csharp(&single(program)).unwrap();
    let step = text(&emitted.containers[0].methods[0]);
    assert!(step.contains("throw new Bubble();"));
    assert!(!step.contains("DoneResult(new Bubble())"));
}
