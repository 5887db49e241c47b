//! 协程降级测试

use super::*;
use crate::middle::ir::builder::*;
use crate::middle::testing::plain_session;

fn log(text: &str) -> Stmt {
    print(string(text))
}

/// step 方法中的分派 switch
fn dispatch_switch<'a>(
    session: &'a Session,
    resumable: &Resumable,
) -> (&'a [SwitchCase], &'a [Stmt]) {
    let step = session
        .arena
        .method(resumable.activation, &resumable.step)
        .unwrap();
    let Stmt::Labeled { body, .. } = &step.body[0] else {
        panic!("step must start with the labeled dispatch loop");
    };
    let Stmt::While { body, .. } = body.as_ref() else {
        panic!("dispatch must be a loop");
    };
    let Some(Stmt::Switch { cases, default, .. }) = body.last() else {
        panic!("dispatch loop must end with the case switch");
    };
    (cases, default)
}

fn count_connected(
    stmts: &[Stmt],
    key: &str,
) -> usize {
    struct Count<'k>(&'k str, usize);
    impl visit::Visitor for Count<'_> {
        fn visit_expr(
            &mut self,
            expr: &Expr,
        ) {
            if matches!(expr, Expr::Connected { key, .. } if key == self.0) {
                self.1 += 1;
            }
            visit::walk_expr(self, expr);
        }
    }
    let mut count = Count(key, 0);
    visit::walk_stmts(&mut count, stmts);
    count.1
}

#[test]
fn test_log_yield_log() {
    // 场景 D
    let mut session = plain_session();
    let mut g = generator(
        "g",
        vec![],
        Type::void(),
        vec![log("before"), yield_(None), log("after")],
    );
    let resumable = lower(&mut g, None, &mut session).unwrap();
    assert_eq!(resumable.suspensions, 1);
    assert_eq!(resumable.case_count, 3);

    let (cases, default) = dispatch_switch(&session, &resumable);
    assert_eq!(cases.len(), 3);

    // case 0 打印一次并请求挂起
    assert_eq!(cases[0].body[0], log("before"));
    assert_eq!(count_connected(&cases[0].body, VALUE_RESULT), 1);
    assert!(matches!(
        &cases[0].body[1],
        Stmt::StoreField { value: Expr::Value { value: Literal::Int(1), .. }, .. }
    ));

    // case 1 再打印一次并转到终止 case
    assert_eq!(cases[1].body[0], log("after"));
    assert_eq!(count_connected(&cases[1].body, VALUE_RESULT), 0);

    // 终止 case 与 default 相同
    assert_eq!(count_connected(&cases[2].body, DONE_RESULT), 1);
    assert_eq!(cases[2].body.as_slice(), default);
}

#[test]
fn test_outer_function_wraps_step() {
    let mut session = plain_session();
    let mut g = generator("g", vec![], Type::int(), vec![yield_(Some(int(1)))]);
    lower(&mut g, None, &mut session).unwrap();
    assert_eq!(g.kind, FunctionKind::Plain);
    assert_eq!(g.return_type, Type::generic("Generator", vec![Type::int()]));
    assert!(matches!(
        g.body.last(),
        Some(Stmt::Return { value: Some(Expr::Connected { key, args, .. }), .. })
            if key == GENERATOR_WRAP && matches!(args[0], Expr::MethodValue { .. })
    ));
}

#[test]
fn test_case_count_is_suspensions_plus_two() {
    for n in 0..6 {
        let mut body = vec![log("start")];
        for i in 0..n {
            body.push(yield_(Some(int(i))));
            body.push(log("step"));
        }
        let mut session = plain_session();
        let mut g = generator("g", vec![], Type::int(), body);
        let resumable = lower(&mut g, None, &mut session).unwrap();
        assert_eq!(resumable.suspensions, n as usize);
        assert_eq!(resumable.case_count, n as usize + 2);
    }
}

#[test]
fn test_case_index_field_starts_at_zero() {
    let mut session = plain_session();
    let mut g = generator("g", vec![], Type::void(), vec![yield_(None)]);
    let resumable = lower(&mut g, None, &mut session).unwrap();
    let field = session
        .arena
        .field(resumable.activation, &resumable.case_field)
        .unwrap();
    assert_eq!(field.init, FieldInit::Zero);
    assert_eq!(field.ty, Type::int());
}

#[test]
fn test_params_move_into_container() {
    let mut session = plain_session();
    let mut g = generator(
        "count_to",
        vec![param("limit", Type::int())],
        Type::int(),
        vec![yield_(Some(reference("limit", Type::int())))],
    );
    let resumable = lower(&mut g, None, &mut session).unwrap();
    let field = session
        .arena
        .field(resumable.activation, &name("limit"))
        .unwrap();
    assert_eq!(field.init, FieldInit::Param);
    // 入口拷入参数
    assert!(matches!(&g.body[0], Stmt::StoreField { .. }));
    // step 中读字段
    let (cases, _) = dispatch_switch(&session, &resumable);
    assert!(matches!(
        &cases[0].body[1],
        Stmt::Return { value: Some(Expr::Connected { args, .. }), .. }
            if matches!(args[0], Expr::Field { .. })
    ));
}

#[test]
fn test_cross_case_local_is_hoisted() {
    let mut session = plain_session();
    let mut g = generator(
        "g",
        vec![],
        Type::void(),
        vec![
            let_("kept", Type::int(), int(7)),
            let_("local", Type::int(), int(1)),
            print(reference("local", Type::int())),
            yield_(None),
            print(reference("kept", Type::int())),
        ],
    );
    let resumable = lower(&mut g, None, &mut session).unwrap();
    let activation = session.arena.get(resumable.activation).unwrap();
    assert!(activation.fields.contains_key(&name("kept")));
    assert!(!activation.fields.contains_key(&name("local")));
}

#[test]
fn test_loop_with_yield_is_flattened() {
    let mut session = plain_session();
    let mut g = generator(
        "g",
        vec![],
        Type::int(),
        vec![
            var("i", Type::int(), Some(int(0))),
            while_(
                op(
                    BuiltinOperator::LtIntInt,
                    vec![reference("i", Type::int()), int(3)],
                    Type::boolean(),
                ),
                vec![
                    yield_(Some(reference("i", Type::int()))),
                    assign(
                        "i",
                        op(
                            BuiltinOperator::PlusIntInt,
                            vec![reference("i", Type::int()), int(1)],
                            Type::int(),
                        ),
                    ),
                ],
            ),
        ],
    );
    let resumable = lower(&mut g, None, &mut session).unwrap();
    assert_eq!(resumable.suspensions, 1);
    // 入口、循环头、循环后、挂起后、终止
    assert_eq!(resumable.case_count, 5);
    let activation = session.arena.get(resumable.activation).unwrap();
    assert!(activation.fields.contains_key(&name("i")));
}

#[test]
fn test_break_inside_intact_statement_jumps_to_case() {
    let mut session = plain_session();
    let mut g = generator(
        "g",
        vec![],
        Type::void(),
        vec![while_(
            boolean(true),
            vec![
                yield_(None),
                if_(reference("stop", Type::boolean()), vec![break_(None)], vec![]),
            ],
        )],
    );
    let resumable = lower(&mut g, None, &mut session).unwrap();
    let (cases, _) = dispatch_switch(&session, &resumable);
    // 没有残留的原生 break
    let breaks = cases
        .iter()
        .flat_map(|case| case.body.iter())
        .filter(|stmt| {
            matches!(stmt, Stmt::If { then, .. }
                if then.iter().any(|s| matches!(s, Stmt::Break { .. })))
        })
        .count();
    assert_eq!(breaks, 0);
}

#[test]
fn test_await_registers_and_unwraps_next_case() {
    let mut session = plain_session();
    let promise_ty = Type::generic("Promise", vec![Type::int()]);
    let mut f = async_fn(
        "fetch",
        vec![],
        Type::int(),
        vec![
            let_(
                "value",
                Type::int(),
                await_(call("request", vec![], promise_ty), Type::int()),
            ),
            ret(reference("value", Type::int())),
        ],
    );
    let resumable = lower(&mut f, None, &mut session).unwrap();
    assert_eq!(resumable.suspensions, 1);
    assert!(matches!(
        f.body.last(),
        Some(Stmt::Return { value: Some(Expr::Connected { key, .. }), .. }) if key == ASYNC_LAUNCH
    ));
    let (cases, _) = dispatch_switch(&session, &resumable);
    assert_eq!(count_connected(&cases[0].body, AWAKE_UPON), 1);
    assert_eq!(count_connected(&cases[0].body, VALUE_RESULT), 1);
    assert_eq!(count_connected(&cases[1].body, PROMISE_RESULT), 1);
    assert_eq!(count_connected(&cases[1].body, DONE_RESULT), 1);
    // 承诺跨 case，进入容器
    let activation = session.arena.get(resumable.activation).unwrap();
    assert!(activation.fields.keys().any(|n| n.text() == "promise"));
}

#[test]
fn test_failed_await_branches_to_recovered_case() {
    let mut session = plain_session();
    let promise_ty = Type::generic("Promise", vec![Type::int()]);
    let holder = Name::temporary("result", 900);
    let holder_ref = reference_to(holder.clone(), Type::failable(Type::int()));
    let body = vec![
        Stmt::LocalDecl {
            name: holder.clone(),
            ty: Type::failable(Type::int()),
            init: Some(Expr::Attempt {
                call: Box::new(await_(call("request", vec![], promise_ty), Type::int())),
                ty: Type::int(),
            }),
            assign_once: true,
            span: Span::dummy(),
        },
        Stmt::If {
            cond: Expr::IsFailure {
                holder: Box::new(holder_ref.clone()),
            },
            then: vec![log("recovered")],
            otherwise: vec![
                expr(Expr::Unwrap {
                    holder: Box::new(holder_ref),
                    ty: Type::int(),
                }),
                log("fine"),
            ],
            span: Span::dummy(),
        },
    ];
    let mut f = async_fn("fetch", vec![], Type::void(), body);
    let resumable = lower(&mut f, None, &mut session).unwrap();
    // 入口、结果、恢复、落空、之后、终止
    assert_eq!(resumable.case_count, 6);
    let (cases, _) = dispatch_switch(&session, &resumable);
    assert!(cases[2].body.contains(&log("recovered")));
    assert!(cases[3].body.contains(&log("fine")));
    // 落空分支里解包，持有者跨 case
    let activation = session.arena.get(resumable.activation).unwrap();
    assert!(activation.fields.contains_key(&holder));
}

#[test]
fn test_suspension_inside_try_is_placeholder() {
    let mut session = plain_session();
    let mut g = generator(
        "g",
        vec![],
        Type::void(),
        vec![try_(vec![yield_(None)], vec![])],
    );
    lower(&mut g, None, &mut session).unwrap();
    assert_eq!(session.diagnostics().len(), 1);
}

#[test]
fn test_yield_in_plain_function_is_fatal() {
    let f = function("f", vec![], Type::void(), vec![yield_(None)]);
    assert!(matches!(
        check_plain(&f),
        Err(LowerError::StraySuspension { .. })
    ));
    let g = generator("g", vec![], Type::void(), vec![yield_(None)]);
    assert!(check_plain(&g).is_ok());
}

#[test]
fn test_failure_return_is_not_wrapped_as_done() {
    let mut session = plain_session();
    let mut g = generator(
        "g",
        vec![],
        Type::int(),
        vec![yield_(Some(int(1))), ret(bubble(Type::int()))],
    );
    let resumable = lower(&mut g, None, &mut session).unwrap();
    let (cases, _) = dispatch_switch(&session, &resumable);
    assert!(matches!(
        cases[1].body.last(),
        Some(Stmt::Return { value: Some(Expr::FailureSentinel { .. }), .. })
    ));
    assert_eq!(count_connected(&cases[1].body, DONE_RESULT), 0);
}

#[test]
fn test_case_ending_in_return_gets_no_trailing_jump() {
    let mut session = plain_session();
    let mut g = generator(
        "g",
        vec![],
        Type::int(),
        vec![
            yield_(Some(int(1))),
            if_(
                reference("stop", Type::boolean()),
                vec![ret_void()],
                vec![ret_void()],
            ),
        ],
    );
    let resumable = lower(&mut g, None, &mut session).unwrap();
    let (cases, _) = dispatch_switch(&session, &resumable);
    // 两个分支都已返回，不再补跳到终止 case
    assert_eq!(cases[1].body.len(), 1);
    assert!(matches!(&cases[1].body[0], Stmt::If { .. }));

    let mut session = plain_session();
    let mut g = generator("g", vec![], Type::int(), vec![yield_(Some(int(1))), ret_void()]);
    let resumable = lower(&mut g, None, &mut session).unwrap();
    let (cases, _) = dispatch_switch(&session, &resumable);
    assert_eq!(cases[1].body.len(), 1);
    assert!(matches!(&cases[1].body[0], Stmt::Return { .. }));
}
