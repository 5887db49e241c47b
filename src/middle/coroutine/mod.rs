//! 协程降级
//!
//! 含挂起点（`yield` / `await`）的函数被改写为：
//!
//! - 外层函数：把参数拷入状态容器，返回包装了 step 方法的生成器/承诺；
//! - step 方法：重试循环包着按 case 下标分派的 switch，每个挂起点结束一个
//!   case（推进下标并返回“已产出”结果），末尾的终止 case 返回“完成”结果，
//!   default 与终止 case 相同。
//!
//! 不含挂起点的语句原样留在所在 case 中；含挂起点的 `while`、`if`、带标签
//! 语句被拆成多个 case，case 之间的跳转是“写下标 + continue 重试循环”。
//! 跨 case 使用的局部变量提升为容器字段。

#[cfg(test)]
mod tests;

use indexmap::{IndexMap, IndexSet};
use tracing::debug;

use crate::middle::capture::{self, ContainerField, FieldInit};
use crate::middle::escape;
use crate::middle::ir::visit::{self, Visitor};
use crate::middle::ir::*;
use crate::middle::session::Session;
use crate::util::diagnostic::{LowerError, Result};
use crate::util::span::Span;

/// 生成器包装
pub const GENERATOR_WRAP: &str = "Generator::wrap";
/// 异步函数启动
pub const ASYNC_LAUNCH: &str = "Async::launch";
/// “已产出、未完成”结果
pub const VALUE_RESULT: &str = "Generator::valueResult";
/// “完成”结果
pub const DONE_RESULT: &str = "Generator::doneResult";
/// 注册承诺完成后的回调
pub const AWAKE_UPON: &str = "Promise::awakeUpon";
/// 取出已完成承诺的结果
pub const PROMISE_RESULT: &str = "Promise::result";

/// 降级结果
#[derive(Debug, Clone, PartialEq)]
pub struct Resumable {
    /// 状态容器
    pub activation: ActivationId,
    /// step 方法名（容器方法）
    pub step: Name,
    /// case 下标字段
    pub case_field: Name,
    /// case 数，含终止 case
    pub case_count: usize,
    /// 挂起点个数
    pub suspensions: usize,
}

/// 普通函数里不允许出现挂起点
pub fn check_plain(function: &Function) -> Result<()> {
    if function.is_resumable() {
        return Ok(());
    }
    match function.body.iter().find(|stmt| visit::stmt_suspends(stmt)) {
        Some(stmt) => Err(LowerError::StraySuspension {
            function: function.name.to_string(),
            span: stmt.span(),
        }),
        None => Ok(()),
    }
}

/// 把生成器/异步函数降级为状态机
///
/// `activation` 为捕获分析已建立的容器；没有时新建一个。函数体被替换为
/// 入口语句，函数变为普通函数，返回类型变为包装类型。
pub fn lower(
    function: &mut Function,
    activation: Option<ActivationId>,
    session: &mut Session,
) -> Result<Resumable> {
    let kind = function.kind;
    let id = match activation {
        Some(id) => id,
        None => {
            let type_name = session.temporary(format!("{}State", function.name.text()));
            let instance = session.temporary("state");
            let parent = session.current_activation();
            session
                .arena
                .alloc(function.name.clone(), type_name, instance, parent)
        }
    };

    let mut body = std::mem::take(&mut function.body);
    let mut entry = take_copy_ins(&mut body, &function.params);

    // 参数在 step 方法里不可见，全部进入容器
    let mut params = IndexSet::new();
    for param in &function.params {
        let hoisted = session.arena.get(id)?.fields.contains_key(&param.name);
        if !hoisted {
            session.arena.add_field(
                id,
                ContainerField {
                    name: param.name.clone(),
                    ty: param.ty.clone(),
                    init: FieldInit::Param,
                },
            )?;
            entry.push(Stmt::StoreField {
                field: FieldRef {
                    activation: id,
                    name: param.name.clone(),
                },
                value: Expr::Reference {
                    name: param.name.clone(),
                    ty: param.ty.clone(),
                },
            });
            params.insert(param.name.clone());
        }
    }
    capture::rewrite_into_fields(id, &params, &mut body);

    let case_field = session.temporary("caseIndex");
    session.arena.add_field(
        id,
        ContainerField {
            name: case_field.clone(),
            ty: Type::int(),
            init: FieldInit::Zero,
        },
    )?;

    let step = session.temporary("step");
    let dispatch = session.temporary("dispatch");
    let item_ty = if function.return_type.is_void() {
        Type::void()
    } else {
        function.return_type.clone()
    };
    let result_ty = Type::generic("GeneratorResult", vec![item_ty.clone()]);
    let step_value = Expr::MethodValue {
        activation: id,
        name: step.clone(),
        ty: Type::generic("Step", vec![item_ty.clone()]),
    };

    let mut machine = Machine {
        session: &mut *session,
        case_field: FieldRef {
            activation: id,
            name: case_field.clone(),
        },
        dispatch: dispatch.clone(),
        result_ty: result_ty.clone(),
        step_value: step_value.clone(),
        cases: vec![Vec::new()],
        current: 0,
        frames: Vec::new(),
        forced: None,
        suspensions: 0,
    };
    machine.flatten_block(body)?;
    let done = machine.new_case();
    machine.goto(done);
    let done_body = vec![Stmt::Return {
        value: Some(machine.done_result(None)),
        span: Span::dummy(),
    }];
    machine.cases[done] = done_body.clone();
    let Machine {
        mut cases,
        suspensions,
        ..
    } = machine;

    hoist_cross_case(id, &mut cases, session)?;

    let case_local = session.temporary("case");
    let step_body = vec![Stmt::Labeled {
        label: dispatch,
        body: Box::new(Stmt::While {
            cond: Expr::Value {
                value: Literal::Bool(true),
                ty: Type::boolean(),
            },
            body: vec![
                Stmt::LocalDecl {
                    name: case_local.clone(),
                    ty: Type::int(),
                    init: Some(Expr::Field {
                        field: FieldRef {
                            activation: id,
                            name: case_field.clone(),
                        },
                        ty: Type::int(),
                    }),
                    assign_once: true,
                    span: Span::dummy(),
                },
                Stmt::StoreField {
                    field: FieldRef {
                        activation: id,
                        name: case_field.clone(),
                    },
                    value: Expr::Value {
                        value: Literal::Int(-1),
                        ty: Type::int(),
                    },
                },
                Stmt::Switch {
                    subject: Expr::Reference {
                        name: case_local,
                        ty: Type::int(),
                    },
                    cases: cases
                        .into_iter()
                        .enumerate()
                        .map(|(i, body)| SwitchCase {
                            value: i as i64,
                            body,
                        })
                        .collect(),
                    default: done_body,
                },
            ],
            span: function.span,
        }),
    }];

    let case_count = done + 1;
    debug!(
        "coroutine: {} has {} suspension(s) and {} case(s)",
        function.name, suspensions, case_count
    );
    session.arena.get_mut(id)?.methods.insert(
        step.clone(),
        Function {
            name: step.clone(),
            params: Vec::new(),
            return_type: result_ty,
            body: step_body,
            kind: FunctionKind::Plain,
            exported: false,
            span: function.span,
        },
    );

    let (wrap, wrapper_ty) = match kind {
        FunctionKind::Async => (ASYNC_LAUNCH, Type::generic("Promise", vec![item_ty])),
        _ => (GENERATOR_WRAP, Type::generic("Generator", vec![item_ty])),
    };
    entry.push(Stmt::Return {
        value: Some(Expr::Connected {
            key: wrap.to_string(),
            args: vec![step_value],
            ty: wrapper_ty.clone(),
        }),
        span: function.span,
    });
    function.body = entry;
    function.return_type = wrapper_ty;
    function.kind = FunctionKind::Plain;

    Ok(Resumable {
        activation: id,
        step,
        case_field,
        case_count,
        suspensions,
    })
}

/// 取出函数体开头的参数拷入语句（捕获分析生成），它们要在外层函数执行
fn take_copy_ins(
    body: &mut Vec<Stmt>,
    params: &[Param],
) -> Vec<Stmt> {
    let mut sources: IndexSet<Name> = params.iter().map(|p| p.name.clone()).collect();
    let mut count = 0;
    for stmt in body.iter() {
        match stmt {
            Stmt::StoreField {
                value: Expr::Reference { name, .. },
                ..
            } if sources.contains(name) => {}
            Stmt::LocalDecl {
                name,
                init: Some(Expr::Reference { name: source, .. }),
                ..
            } if name.is_temporary() && sources.contains(source) => {
                sources.insert(name.clone());
            }
            _ => break,
        }
        count += 1;
    }
    body.drain(..count).collect()
}

/// 被拆分的控制结构
#[derive(Debug)]
enum Frame {
    Loop {
        label: Option<Label>,
        break_case: usize,
        continue_case: usize,
    },
    Block {
        label: Label,
        break_case: usize,
    },
}

struct Machine<'a> {
    session: &'a mut Session,
    case_field: FieldRef,
    dispatch: Label,
    result_ty: Type,
    step_value: Expr,
    cases: Vec<Vec<Stmt>>,
    current: usize,
    frames: Vec<Frame>,
    /// 紧随 await 结果的失败检查必须拆分
    forced: Option<Name>,
    suspensions: usize,
}

fn is_await(expr: &Expr) -> bool {
    match expr {
        Expr::Await { .. } => true,
        Expr::Attempt { call, .. } => matches!(call.as_ref(), Expr::Await { .. }),
        _ => false,
    }
}

impl Machine<'_> {
    fn new_case(&mut self) -> usize {
        self.cases.push(Vec::new());
        self.cases.len() - 1
    }

    fn emit(
        &mut self,
        stmt: Stmt,
    ) {
        self.cases[self.current].push(stmt);
    }

    fn set_case(
        &self,
        case: usize,
    ) -> Stmt {
        Stmt::StoreField {
            field: self.case_field.clone(),
            value: Expr::Value {
                value: Literal::Int(case as i64),
                ty: Type::int(),
            },
        }
    }

    /// 跳到另一个 case 并立即继续分派
    fn jump(
        &self,
        case: usize,
    ) -> Stmt {
        Stmt::Block(vec![
            self.set_case(case),
            Stmt::Continue {
                label: Some(self.dispatch.clone()),
                span: Span::dummy(),
            },
        ])
    }

    /// 当前 case 尚可落空时才补跳转
    fn goto(
        &mut self,
        case: usize,
    ) {
        if ends_in_jump(&self.cases[self.current]) {
            return;
        }
        let jump = self.jump(case);
        self.emit(jump);
    }

    fn value_result(
        &self,
        value: Option<Expr>,
    ) -> Stmt {
        Stmt::Return {
            value: Some(Expr::Connected {
                key: VALUE_RESULT.to_string(),
                args: value.into_iter().collect(),
                ty: self.result_ty.clone(),
            }),
            span: Span::dummy(),
        }
    }

    fn done_result(
        &self,
        value: Option<Expr>,
    ) -> Expr {
        Expr::Connected {
            key: DONE_RESULT.to_string(),
            args: value.into_iter().collect(),
            ty: self.result_ty.clone(),
        }
    }

    /// 结束当前 case：推进下标并返回“已产出”结果
    fn suspend(
        &mut self,
        value: Option<Expr>,
    ) {
        let next = self.new_case();
        let set = self.set_case(next);
        self.emit(set);
        let result = self.value_result(value);
        self.emit(result);
        self.current = next;
        self.suspensions += 1;
    }

    /// 注册回调并挂起；返回下一个 case 中表示 await 结果的表达式
    fn suspend_await(
        &mut self,
        expr: Expr,
    ) -> Expr {
        let (promise, ty, attempt_ty) = match expr {
            Expr::Await { promise, ty } => (*promise, ty, None),
            Expr::Attempt { call, ty: attempt_ty } => match *call {
                Expr::Await { promise, ty } => (*promise, ty, Some(attempt_ty)),
                other => {
                    return Expr::Attempt {
                        call: Box::new(other),
                        ty: attempt_ty,
                    }
                }
            },
            other => return other,
        };
        let temp = self.session.temporary("promise");
        let promise_ty = promise.ty();
        self.emit(Stmt::LocalDecl {
            name: temp.clone(),
            ty: promise_ty.clone(),
            init: Some(promise),
            assign_once: true,
            span: Span::dummy(),
        });
        let promise_ref = Expr::Reference {
            name: temp,
            ty: promise_ty,
        };
        self.emit(Stmt::Expr(Expr::Connected {
            key: AWAKE_UPON.to_string(),
            args: vec![promise_ref.clone(), self.step_value.clone()],
            ty: Type::void(),
        }));
        self.suspend(None);

        let result = Expr::Connected {
            key: PROMISE_RESULT.to_string(),
            args: vec![promise_ref],
            ty,
        };
        match attempt_ty {
            Some(attempt_ty) => Expr::Attempt {
                call: Box::new(result),
                ty: attempt_ty,
            },
            None => result,
        }
    }

    fn placeholder(
        &mut self,
        what: String,
        span: Span,
    ) {
        self.session.unimplemented(what.clone(), span);
        self.emit(Stmt::Unimplemented { what, span });
    }

    fn flatten_block(
        &mut self,
        stmts: Vec<Stmt>,
    ) -> Result<()> {
        for stmt in stmts {
            let forced = self.forced.take();
            match stmt {
                Stmt::If {
                    cond,
                    then,
                    otherwise,
                    span,
                } if forced.as_ref().is_some_and(|holder| is_failure_of(&cond, holder)) => {
                    self.flatten_if(cond, then, otherwise, span)?
                }
                other => self.flatten(other)?,
            }
        }
        Ok(())
    }

    fn flatten(
        &mut self,
        stmt: Stmt,
    ) -> Result<()> {
        if !visit::stmt_suspends(&stmt) {
            let stmt = self.rewrite_exits(stmt, 0)?;
            self.emit(stmt);
            return Ok(());
        }
        match stmt {
            Stmt::Yield { value, .. } => self.suspend(value),
            Stmt::Expr(expr) if is_await(&expr) => {
                let resumed = self.suspend_await(expr);
                self.emit(Stmt::Expr(resumed));
            }
            Stmt::Assign {
                target,
                value,
                span,
            } if is_await(&value) => {
                let value = self.suspend_await(value);
                self.emit(Stmt::Assign {
                    target,
                    value,
                    span,
                });
            }
            Stmt::LocalDecl {
                name,
                ty,
                init: Some(init),
                assign_once,
                span,
            } if is_await(&init) => {
                let attempted = matches!(init, Expr::Attempt { .. });
                let init = self.suspend_await(init);
                if attempted {
                    self.forced = Some(name.clone());
                }
                self.emit(Stmt::LocalDecl {
                    name,
                    ty,
                    init: Some(init),
                    assign_once,
                    span,
                });
            }
            Stmt::Return {
                value: Some(value),
                span,
            } if is_await(&value) => {
                let value = self.suspend_await(value);
                let done = self.done_result(Some(value));
                self.emit(Stmt::Return {
                    value: Some(done),
                    span,
                });
            }
            Stmt::Block(inner) => self.flatten_block(inner)?,
            Stmt::Labeled { label, body } => match *body {
                Stmt::While { cond, body, span } => self.flatten_loop(Some(label), cond, body, span)?,
                other => self.flatten_labeled(label, other)?,
            },
            Stmt::While { cond, body, span } => self.flatten_loop(None, cond, body, span)?,
            Stmt::If {
                cond,
                then,
                otherwise,
                span,
            } => self.flatten_if(cond, then, otherwise, span)?,
            Stmt::Try { span, .. } => {
                self.placeholder("suspension inside try/recover".to_string(), span);
            }
            other => {
                let span = other.span();
                self.placeholder("suspension nested inside an expression".to_string(), span);
            }
        }
        Ok(())
    }

    fn flatten_loop(
        &mut self,
        label: Option<Label>,
        cond: Expr,
        body: Vec<Stmt>,
        span: Span,
    ) -> Result<()> {
        let head = self.new_case();
        let after = self.new_case();
        self.goto(head);
        self.current = head;
        let exit = self.jump(after);
        self.emit(Stmt::If {
            cond: Expr::Support {
                op: BuiltinOperator::BooleanNegation,
                args: vec![cond],
                ty: Type::boolean(),
            },
            then: vec![exit],
            otherwise: Vec::new(),
            span,
        });
        self.frames.push(Frame::Loop {
            label,
            break_case: after,
            continue_case: head,
        });
        let flattened = self.flatten_block(body);
        self.frames.pop();
        flattened?;
        self.goto(head);
        self.current = after;
        Ok(())
    }

    fn flatten_labeled(
        &mut self,
        label: Label,
        body: Stmt,
    ) -> Result<()> {
        let after = self.new_case();
        self.frames.push(Frame::Block {
            label,
            break_case: after,
        });
        let flattened = self.flatten(body);
        self.frames.pop();
        flattened?;
        self.goto(after);
        self.current = after;
        Ok(())
    }

    fn flatten_if(
        &mut self,
        cond: Expr,
        then: Vec<Stmt>,
        otherwise: Vec<Stmt>,
        span: Span,
    ) -> Result<()> {
        let then_case = self.new_case();
        let else_case = if otherwise.is_empty() {
            None
        } else {
            Some(self.new_case())
        };
        let after = self.new_case();
        let to_then = self.jump(then_case);
        let to_else = self.jump(else_case.unwrap_or(after));
        self.emit(Stmt::If {
            cond,
            then: vec![to_then],
            otherwise: vec![to_else],
            span,
        });

        self.current = then_case;
        self.flatten_block(then)?;
        self.goto(after);
        if let Some(else_case) = else_case {
            self.current = else_case;
            self.flatten_block(otherwise)?;
            self.goto(after);
        }
        self.current = after;
        Ok(())
    }

    fn break_target(
        &self,
        label: Option<&Label>,
        depth: usize,
    ) -> Option<usize> {
        match label {
            None if depth > 0 => None,
            None => self.frames.iter().rev().find_map(|frame| match frame {
                Frame::Loop { break_case, .. } => Some(*break_case),
                Frame::Block { .. } => None,
            }),
            Some(label) => self.frames.iter().rev().find_map(|frame| match frame {
                Frame::Loop {
                    label: Some(l),
                    break_case,
                    ..
                }
                | Frame::Block {
                    label: l,
                    break_case,
                } if l == label => Some(*break_case),
                _ => None,
            }),
        }
    }

    fn continue_target(
        &self,
        label: Option<&Label>,
        depth: usize,
    ) -> Option<usize> {
        match label {
            None if depth > 0 => None,
            None => self.frames.iter().rev().find_map(|frame| match frame {
                Frame::Loop { continue_case, .. } => Some(*continue_case),
                Frame::Block { .. } => None,
            }),
            Some(label) => self.frames.iter().rev().find_map(|frame| match frame {
                Frame::Loop {
                    label: Some(l),
                    continue_case,
                    ..
                } if l == label => Some(*continue_case),
                _ => None,
            }),
        }
    }

    /// 改写完整保留的语句中指向被拆分结构的出口
    fn rewrite_exits(
        &self,
        stmt: Stmt,
        depth: usize,
    ) -> Result<Stmt> {
        let rewrite_all = |stmts: Vec<Stmt>, depth: usize| -> Result<Vec<Stmt>> {
            stmts
                .into_iter()
                .map(|stmt| self.rewrite_exits(stmt, depth))
                .collect()
        };
        Ok(match stmt {
            Stmt::Break { label, span } => match self.break_target(label.as_ref(), depth) {
                Some(case) => self.jump(case),
                None if label.is_none() && depth == 0 => {
                    return Err(LowerError::JumpOutsideLoop { kind: "break", span })
                }
                None => Stmt::Break { label, span },
            },
            Stmt::Continue { label, span } => match self.continue_target(label.as_ref(), depth) {
                Some(case) => self.jump(case),
                None if label.is_none() && depth == 0 => {
                    return Err(LowerError::JumpOutsideLoop {
                        kind: "continue",
                        span,
                    })
                }
                None => Stmt::Continue { label, span },
            },
            Stmt::Return {
                value: Some(value),
                span,
            } if escape::is_failure(&value) => Stmt::Return {
                value: Some(value),
                span,
            },
            Stmt::Return { value, span } => Stmt::Return {
                value: Some(self.done_result(value)),
                span,
            },
            Stmt::Block(inner) => Stmt::Block(rewrite_all(inner, depth)?),
            Stmt::Labeled { label, body } => Stmt::Labeled {
                label,
                body: Box::new(self.rewrite_exits(*body, depth)?),
            },
            Stmt::While { cond, body, span } => Stmt::While {
                cond,
                body: rewrite_all(body, depth + 1)?,
                span,
            },
            Stmt::If {
                cond,
                then,
                otherwise,
                span,
            } => Stmt::If {
                cond,
                then: rewrite_all(then, depth)?,
                otherwise: rewrite_all(otherwise, depth)?,
                span,
            },
            Stmt::Try {
                body,
                recover,
                span,
            } => Stmt::Try {
                body: rewrite_all(body, depth)?,
                recover: rewrite_all(recover, depth)?,
                span,
            },
            other => other,
        })
    }
}

/// 控制流是否不会从 `stmts` 末尾落出
fn ends_in_jump(stmts: &[Stmt]) -> bool {
    stmts.last().is_some_and(|stmt| match stmt {
        Stmt::Return { .. } | Stmt::Break { .. } | Stmt::Continue { .. } | Stmt::InitFailed { .. } => true,
        Stmt::Block(inner) => ends_in_jump(inner),
        Stmt::If {
            then, otherwise, ..
        } => ends_in_jump(then) && ends_in_jump(otherwise),
        _ => false,
    })
}

fn is_failure_of(
    cond: &Expr,
    holder: &Name,
) -> bool {
    matches!(cond, Expr::IsFailure { holder: h } if h.is_reference_to(holder))
}

/// 一个 case 中声明与使用的名字
#[derive(Default)]
struct CaseNames {
    declared: IndexMap<Name, Type>,
    used: IndexSet<Name>,
    depth: usize,
}

impl Visitor for CaseNames {
    fn visit_stmt(
        &mut self,
        stmt: &Stmt,
    ) {
        match stmt {
            Stmt::LocalDecl { name, ty, .. } if self.depth == 0 => {
                self.declared.insert(name.clone(), ty.clone());
            }
            Stmt::Assign { target, .. } => {
                self.used.insert(target.clone());
            }
            _ => {}
        }
        visit::walk_stmt(self, stmt);
    }

    fn visit_expr(
        &mut self,
        expr: &Expr,
    ) {
        if let Expr::Reference { name, .. } = expr {
            self.used.insert(name.clone());
        }
        visit::walk_expr(self, expr);
    }

    fn visit_function(
        &mut self,
        function: &Function,
    ) {
        self.depth += 1;
        visit::walk_stmts(self, &function.body);
        self.depth -= 1;
    }
}

/// 跨 case 使用的局部变量提升为容器字段
fn hoist_cross_case(
    id: ActivationId,
    cases: &mut [Vec<Stmt>],
    session: &mut Session,
) -> Result<()> {
    let scans: Vec<CaseNames> = cases
        .iter()
        .map(|body| {
            let mut scan = CaseNames::default();
            visit::walk_stmts(&mut scan, body);
            scan
        })
        .collect();

    let mut hoisted = IndexSet::new();
    for (i, scan) in scans.iter().enumerate() {
        for (name, ty) in &scan.declared {
            let elsewhere = scans
                .iter()
                .enumerate()
                .any(|(j, other)| j != i && (other.used.contains(name) || other.declared.contains_key(name)));
            if elsewhere && hoisted.insert(name.clone()) {
                session.arena.add_field(
                    id,
                    ContainerField {
                        name: name.clone(),
                        ty: ty.clone(),
                        init: FieldInit::Zero,
                    },
                )?;
            }
        }
    }
    if !hoisted.is_empty() {
        debug!("coroutine: {} local(s) live across cases", hoisted.len());
        for body in cases.iter_mut() {
            capture::rewrite_into_fields(id, &hoisted, body);
        }
    }
    Ok(())
}
