//! IR 构造辅助函数
//!
//! 上游桥接代码、测试与基准都用这些函数拼装 IR，省去逐字段填写 `Span`。

use super::*;

pub fn name(text: &str) -> Name {
    Name::stable(text)
}

pub fn int(value: i64) -> Expr {
    Expr::Value {
        value: Literal::Int(value),
        ty: Type::int(),
    }
}

pub fn float(value: f64) -> Expr {
    Expr::Value {
        value: Literal::Float(value),
        ty: Type::float64(),
    }
}

pub fn boolean(value: bool) -> Expr {
    Expr::Value {
        value: Literal::Bool(value),
        ty: Type::boolean(),
    }
}

pub fn string(value: &str) -> Expr {
    Expr::Value {
        value: Literal::String(value.to_string()),
        ty: Type::string(),
    }
}

pub fn null(ty: Type) -> Expr {
    Expr::Value {
        value: Literal::Null,
        ty,
    }
}

pub fn reference(
    text: &str,
    ty: Type,
) -> Expr {
    Expr::Reference {
        name: Name::stable(text),
        ty,
    }
}

pub fn reference_to(
    name: Name,
    ty: Type,
) -> Expr {
    Expr::Reference { name, ty }
}

pub fn call(
    function: &str,
    args: Vec<Expr>,
    ty: Type,
) -> Expr {
    Expr::Call {
        callee: Callable::Function(Name::stable(function)),
        args,
        ty,
    }
}

pub fn method_call(
    subject: Expr,
    method: &str,
    args: Vec<Expr>,
    ty: Type,
) -> Expr {
    Expr::Call {
        callee: Callable::Method {
            subject: Box::new(subject),
            method: method.to_string(),
        },
        args,
        ty,
    }
}

pub fn op(
    op: BuiltinOperator,
    args: Vec<Expr>,
    ty: Type,
) -> Expr {
    Expr::Support { op, args, ty }
}

pub fn connected(
    key: &str,
    args: Vec<Expr>,
    ty: Type,
) -> Expr {
    Expr::Connected {
        key: key.to_string(),
        args,
        ty,
    }
}

pub fn bubble(ty: Type) -> Expr {
    Expr::FailureSentinel { ty }
}

pub fn await_(
    promise: Expr,
    ty: Type,
) -> Expr {
    Expr::Await {
        promise: Box::new(promise),
        ty,
    }
}

/// `print(value)` 语句
pub fn print(value: Expr) -> Stmt {
    Stmt::Expr(op(BuiltinOperator::Print, vec![value], Type::void()))
}

pub fn expr(value: Expr) -> Stmt {
    Stmt::Expr(value)
}

pub fn assign(
    target: &str,
    value: Expr,
) -> Stmt {
    Stmt::Assign {
        target: Name::stable(target),
        value,
        span: Span::dummy(),
    }
}

/// `var name: ty = init`
pub fn var(
    text: &str,
    ty: Type,
    init: Option<Expr>,
) -> Stmt {
    Stmt::LocalDecl {
        name: Name::stable(text),
        ty,
        init,
        assign_once: false,
        span: Span::dummy(),
    }
}

/// `let name: ty = init`
pub fn let_(
    text: &str,
    ty: Type,
    init: Expr,
) -> Stmt {
    Stmt::LocalDecl {
        name: Name::stable(text),
        ty,
        init: Some(init),
        assign_once: true,
        span: Span::dummy(),
    }
}

pub fn ret(value: Expr) -> Stmt {
    Stmt::Return {
        value: Some(value),
        span: Span::dummy(),
    }
}

pub fn ret_void() -> Stmt {
    Stmt::Return {
        value: None,
        span: Span::dummy(),
    }
}

pub fn while_(
    cond: Expr,
    body: Vec<Stmt>,
) -> Stmt {
    Stmt::While {
        cond,
        body,
        span: Span::dummy(),
    }
}

pub fn if_(
    cond: Expr,
    then: Vec<Stmt>,
    otherwise: Vec<Stmt>,
) -> Stmt {
    Stmt::If {
        cond,
        then,
        otherwise,
        span: Span::dummy(),
    }
}

pub fn labeled(
    label: &str,
    body: Stmt,
) -> Stmt {
    Stmt::Labeled {
        label: Name::stable(label),
        body: Box::new(body),
    }
}

pub fn break_(label: Option<&str>) -> Stmt {
    Stmt::Break {
        label: label.map(Name::stable),
        span: Span::dummy(),
    }
}

pub fn continue_(label: Option<&str>) -> Stmt {
    Stmt::Continue {
        label: label.map(Name::stable),
        span: Span::dummy(),
    }
}

pub fn try_(
    body: Vec<Stmt>,
    recover: Vec<Stmt>,
) -> Stmt {
    Stmt::Try {
        body,
        recover,
        span: Span::dummy(),
    }
}

pub fn yield_(value: Option<Expr>) -> Stmt {
    Stmt::Yield {
        value,
        span: Span::dummy(),
    }
}

pub fn init_failed() -> Stmt {
    Stmt::InitFailed { span: Span::dummy() }
}

/// `target = hs(failed, handled)`，失败标志为布尔临时量
pub fn handler_assign(
    target: &str,
    failed: &str,
    handled: Expr,
) -> Stmt {
    let ty = handled.ty().without_failure();
    Stmt::Assign {
        target: Name::stable(target),
        value: Expr::HandlerScope {
            failed: Name::stable(failed),
            handled: Box::new(handled),
            ty,
        },
        span: Span::dummy(),
    }
}

/// 紧随失败守卫的检查语句 `if (failed) { recover } else { otherwise }`
pub fn check(
    failed: &str,
    recover: Vec<Stmt>,
    otherwise: Vec<Stmt>,
) -> Stmt {
    if_(reference(failed, Type::boolean()), recover, otherwise)
}

pub fn param(
    text: &str,
    ty: Type,
) -> Param {
    Param {
        name: Name::stable(text),
        ty,
    }
}

pub fn function(
    text: &str,
    params: Vec<Param>,
    return_type: Type,
    body: Vec<Stmt>,
) -> Function {
    Function {
        name: Name::stable(text),
        params,
        return_type,
        body,
        kind: FunctionKind::Plain,
        exported: false,
        span: Span::dummy(),
    }
}

pub fn generator(
    text: &str,
    params: Vec<Param>,
    yields: Type,
    body: Vec<Stmt>,
) -> Function {
    Function {
        kind: FunctionKind::Generator,
        ..function(text, params, yields, body)
    }
}

pub fn async_fn(
    text: &str,
    params: Vec<Param>,
    result: Type,
    body: Vec<Stmt>,
) -> Function {
    Function {
        kind: FunctionKind::Async,
        ..function(text, params, result, body)
    }
}

pub fn exported(function: Function) -> Function {
    Function {
        exported: true,
        ..function
    }
}

pub fn local_function(function: Function) -> Stmt {
    Stmt::LocalFunction(Box::new(function))
}

pub fn module(
    path: &[&str],
    top_levels: Vec<TopLevel>,
) -> Module {
    Module {
        path: path.iter().map(|s| s.to_string()).collect(),
        top_levels,
        span: Span::dummy(),
    }
}

pub fn module_var(
    text: &str,
    ty: Type,
    init: Option<Expr>,
) -> TopLevel {
    TopLevel::Declaration(ModuleDecl {
        name: Name::stable(text),
        ty,
        init,
        assign_once: false,
        exported: false,
        span: Span::dummy(),
    })
}

pub fn init_block(body: Vec<Stmt>) -> TopLevel {
    TopLevel::Init(InitBlock {
        body,
        span: Span::dummy(),
    })
}
