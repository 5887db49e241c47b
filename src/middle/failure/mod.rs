//! 失败通道降级
//!
//! 上游把“可能失败的调用 + 检查与恢复”写成两条相邻语句：
//!
//! ```text
//! x = hs(fail#1, f())
//! if (fail#1) { recover... } else { ... }
//! ```
//!
//! 这里把它们原子地改写为：
//!
//! ```text
//! let result#2: T | Bubble = attempt(f())
//! if (is_failure(result#2)) { recover... } else { x = unwrap(result#2); ... }
//! ```
//!
//! 恢复块内的裸传播（`return bubble()`）改为传播最近一层持有的失败值，
//! 所以会话中维护一个失败值栈。缺少配对检查语句是 IR 契约违规。

use tracing::trace;

use crate::middle::ir::*;
use crate::middle::session::Session;
use crate::util::diagnostic::{LowerError, Result};
use crate::util::span::Span;


/// 检查语句是否恰好检查 `flag`
fn is_check_of(
    stmt: &Stmt,
    flag: &Name,
) -> bool {
    matches!(stmt, Stmt::If { cond, .. } if cond.is_reference_to(flag))
}

/// 校验一个语句列表（不含嵌套列表）中的配对约束
pub fn check_pairing(stmts: &[Stmt]) -> Result<()> {
    for (i, stmt) in stmts.iter().enumerate() {
        if let Stmt::Assign {
            target,
            value: Expr::HandlerScope { failed, .. },
            span,
        } = stmt
        {
            let paired = stmts.get(i + 1).is_some_and(|next| is_check_of(next, failed));
            if !paired {
                return Err(LowerError::UnpairedHandlerScope {
                    target: target.to_string(),
                    flag: failed.to_string(),
                    span: *span,
                });
            }
        }
    }
    Ok(())
}

/// 降级一个函数体；不进入局部函数（它们在被发射时各自降级）
pub fn lower_body(
    stmts: Vec<Stmt>,
    session: &mut Session,
) -> Result<Vec<Stmt>> {
    lower_block(stmts, session)
}

fn lower_block(
    stmts: Vec<Stmt>,
    session: &mut Session,
) -> Result<Vec<Stmt>> {
    check_pairing(&stmts)?;
    let mut out = Vec::with_capacity(stmts.len());
    let mut iter = stmts.into_iter();
    while let Some(stmt) = iter.next() {
        match stmt {
            Stmt::Assign {
                target,
                value: Expr::HandlerScope {
                    failed,
                    handled,
                    ty,
                },
                span,
            } => {
                let Some(Stmt::If {
                    then, otherwise, ..
                }) = iter.next()
                else {
                    return Err(LowerError::UnpairedHandlerScope {
                        target: target.to_string(),
                        flag: failed.to_string(),
                        span,
                    });
                };
                let guarded = Guarded {
                    target,
                    call: *handled,
                    ty,
                    recover: then,
                    otherwise,
                    span,
                };
                out.extend(lower_pair(guarded, session)?);
            }
            other => out.push(lower_stmt(other, session)?),
        }
    }
    Ok(out)
}

/// 一对守卫赋值与检查
struct Guarded {
    target: Name,
    call: Expr,
    ty: Type,
    recover: Vec<Stmt>,
    otherwise: Vec<Stmt>,
    span: Span,
}

fn lower_pair(
    guarded: Guarded,
    session: &mut Session,
) -> Result<Vec<Stmt>> {
    let Guarded {
        target,
        call,
        ty,
        recover,
        otherwise,
        span,
    } = guarded;
    let holder = session.temporary("result");
    let holder_ty = Type::failable(ty.clone());
    let holder_ref = Expr::Reference {
        name: holder.clone(),
        ty: holder_ty.clone(),
    };
    trace!("failure: {} guarded by {}", target, holder);

    session.push_failure(holder_ref.clone());
    let recover = lower_block(recover, session);
    session.pop_failure();
    let recover = recover?;

    let mut on_success = vec![Stmt::Assign {
        target,
        value: Expr::Unwrap {
            holder: Box::new(holder_ref.clone()),
            ty: ty.clone(),
        },
        span,
    }];
    on_success.extend(lower_block(otherwise, session)?);

    Ok(vec![
        Stmt::LocalDecl {
            name: holder,
            ty: holder_ty,
            init: Some(Expr::Attempt {
                call: Box::new(call),
                ty,
            }),
            assign_once: true,
            span,
        },
        Stmt::If {
            cond: Expr::IsFailure {
                holder: Box::new(holder_ref),
            },
            then: recover,
            otherwise: on_success,
            span,
        },
    ])
}

/// 恢复块内的失败哨兵改为传播当前失败值
fn bind_propagate(
    value: Expr,
    session: &Session,
) -> Expr {
    match (value, session.current_failure()) {
        (Expr::FailureSentinel { ty }, Some(holder)) => Expr::Propagate {
            holder: Box::new(holder.clone()),
            ty,
        },
        (value, _) => value,
    }
}

fn lower_stmt(
    stmt: Stmt,
    session: &mut Session,
) -> Result<Stmt> {
    Ok(match stmt {
        Stmt::Return {
            value: Some(value),
            span,
        } => Stmt::Return {
            value: Some(bind_propagate(value, session)),
            span,
        },
        // 恢复块内的初始化失败同样传播被捕获的失败值
        Stmt::InitFailed { span } => match session.current_failure() {
            Some(holder) => Stmt::Return {
                value: Some(Expr::Propagate {
                    holder: Box::new(holder.clone()),
                    ty: Type::void(),
                }),
                span,
            },
            None => Stmt::InitFailed { span },
        },
        Stmt::Expr(Expr::HandlerScope { failed, .. }) => {
            let what = format!("handler scope guarded by `{}` used as a bare statement", failed);
            session.unimplemented(what.clone(), Span::dummy());
            Stmt::Unimplemented {
                what,
                span: Span::dummy(),
            }
        }
        Stmt::Block(stmts) => Stmt::Block(lower_block(stmts, session)?),
        Stmt::Labeled { label, body } => Stmt::Labeled {
            label,
            body: Box::new(lower_stmt(*body, session)?),
        },
        Stmt::While { cond, body, span } => Stmt::While {
            cond,
            body: lower_block(body, session)?,
            span,
        },
        Stmt::If {
            cond,
            then,
            otherwise,
            span,
        } => Stmt::If {
            cond,
            then: lower_block(then, session)?,
            otherwise: lower_block(otherwise, session)?,
            span,
        },
        Stmt::Try {
            body,
            recover,
            span,
        } => Stmt::Try {
            body: lower_block(body, session)?,
            recover: lower_block(recover, session)?,
            span,
        },
        Stmt::Switch {
            subject,
            cases,
            default,
        } => {
            let mut lowered = Vec::with_capacity(cases.len());
            for case in cases {
                lowered.push(SwitchCase {
                    value: case.value,
                    body: lower_block(case.body, session)?,
                });
            }
            Stmt::Switch {
                subject,
                cases: lowered,
                default: lower_block(default, session)?,
            }
        }
        other => other,
    })
}
