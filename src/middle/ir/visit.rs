//! IR 遍历
//!
//! `Visitor` 只读，`MutVisitor` 原地改写。默认实现递归进入所有子节点，
//! 覆盖某个方法后调用对应的 `walk_*` 即可继续下降。

use super::*;

/// 只读访问者
pub trait Visitor {
    fn visit_stmt(
        &mut self,
        stmt: &Stmt,
    ) {
        walk_stmt(self, stmt);
    }

    fn visit_expr(
        &mut self,
        expr: &Expr,
    ) {
        walk_expr(self, expr);
    }

    fn visit_function(
        &mut self,
        function: &Function,
    ) {
        walk_stmts(self, &function.body);
    }
}

pub fn walk_stmts<V: Visitor + ?Sized>(
    visitor: &mut V,
    stmts: &[Stmt],
) {
    for stmt in stmts {
        visitor.visit_stmt(stmt);
    }
}

pub fn walk_stmt<V: Visitor + ?Sized>(
    visitor: &mut V,
    stmt: &Stmt,
) {
    match stmt {
        Stmt::Assign { value, .. } => visitor.visit_expr(value),
        Stmt::Block(stmts) => walk_stmts(visitor, stmts),
        Stmt::Expr(expr) => visitor.visit_expr(expr),
        Stmt::Labeled { body, .. } => visitor.visit_stmt(body),
        Stmt::LocalDecl { init, .. } => {
            if let Some(init) = init {
                visitor.visit_expr(init);
            }
        }
        Stmt::LocalFunction(function) => visitor.visit_function(function),
        Stmt::Return { value, .. } | Stmt::Yield { value, .. } => {
            if let Some(value) = value {
                visitor.visit_expr(value);
            }
        }
        Stmt::While { cond, body, .. } => {
            visitor.visit_expr(cond);
            walk_stmts(visitor, body);
        }
        Stmt::If {
            cond,
            then,
            otherwise,
            ..
        } => {
            visitor.visit_expr(cond);
            walk_stmts(visitor, then);
            walk_stmts(visitor, otherwise);
        }
        Stmt::Try { body, recover, .. } => {
            walk_stmts(visitor, body);
            walk_stmts(visitor, recover);
        }
        Stmt::StoreField { value, .. } => visitor.visit_expr(value),
        Stmt::Switch {
            subject,
            cases,
            default,
        } => {
            visitor.visit_expr(subject);
            for case in cases {
                walk_stmts(visitor, &case.body);
            }
            walk_stmts(visitor, default);
        }
        Stmt::Break { .. }
        | Stmt::Continue { .. }
        | Stmt::InitFailed { .. }
        | Stmt::ExitRegion { .. }
        | Stmt::Unimplemented { .. } => {}
    }
}

pub fn walk_expr<V: Visitor + ?Sized>(
    visitor: &mut V,
    expr: &Expr,
) {
    match expr {
        Expr::Call { callee, args, .. } => {
            if let Callable::Method { subject, .. } = callee {
                visitor.visit_expr(subject);
            }
            for arg in args {
                visitor.visit_expr(arg);
            }
        }
        Expr::Support { args, .. } | Expr::Connected { args, .. } => {
            for arg in args {
                visitor.visit_expr(arg);
            }
        }
        Expr::HandlerScope { handled, .. } => visitor.visit_expr(handled),
        Expr::Await { promise, .. } => visitor.visit_expr(promise),
        Expr::Attempt { call, .. } => visitor.visit_expr(call),
        Expr::IsFailure { holder }
        | Expr::Unwrap { holder, .. }
        | Expr::Propagate { holder, .. } => visitor.visit_expr(holder),
        Expr::Reference { .. }
        | Expr::Value { .. }
        | Expr::FailureSentinel { .. }
        | Expr::Field { .. }
        | Expr::MethodValue { .. }
        | Expr::Unimplemented { .. } => {}
    }
}

/// 原地改写的访问者
pub trait MutVisitor {
    fn visit_stmt_mut(
        &mut self,
        stmt: &mut Stmt,
    ) {
        walk_stmt_mut(self, stmt);
    }

    fn visit_expr_mut(
        &mut self,
        expr: &mut Expr,
    ) {
        walk_expr_mut(self, expr);
    }

    fn visit_function_mut(
        &mut self,
        function: &mut Function,
    ) {
        walk_stmts_mut(self, &mut function.body);
    }
}

pub fn walk_stmts_mut<V: MutVisitor + ?Sized>(
    visitor: &mut V,
    stmts: &mut [Stmt],
) {
    for stmt in stmts {
        visitor.visit_stmt_mut(stmt);
    }
}

pub fn walk_stmt_mut<V: MutVisitor + ?Sized>(
    visitor: &mut V,
    stmt: &mut Stmt,
) {
    match stmt {
        Stmt::Assign { value, .. } => visitor.visit_expr_mut(value),
        Stmt::Block(stmts) => walk_stmts_mut(visitor, stmts),
        Stmt::Expr(expr) => visitor.visit_expr_mut(expr),
        Stmt::Labeled { body, .. } => visitor.visit_stmt_mut(body),
        Stmt::LocalDecl { init, .. } => {
            if let Some(init) = init {
                visitor.visit_expr_mut(init);
            }
        }
        Stmt::LocalFunction(function) => visitor.visit_function_mut(function),
        Stmt::Return { value, .. } | Stmt::Yield { value, .. } => {
            if let Some(value) = value {
                visitor.visit_expr_mut(value);
            }
        }
        Stmt::While { cond, body, .. } => {
            visitor.visit_expr_mut(cond);
            walk_stmts_mut(visitor, body);
        }
        Stmt::If {
            cond,
            then,
            otherwise,
            ..
        } => {
            visitor.visit_expr_mut(cond);
            walk_stmts_mut(visitor, then);
            walk_stmts_mut(visitor, otherwise);
        }
        Stmt::Try { body, recover, .. } => {
            walk_stmts_mut(visitor, body);
            walk_stmts_mut(visitor, recover);
        }
        Stmt::StoreField { value, .. } => visitor.visit_expr_mut(value),
        Stmt::Switch {
            subject,
            cases,
            default,
        } => {
            visitor.visit_expr_mut(subject);
            for case in cases {
                walk_stmts_mut(visitor, &mut case.body);
            }
            walk_stmts_mut(visitor, default);
        }
        Stmt::Break { .. }
        | Stmt::Continue { .. }
        | Stmt::InitFailed { .. }
        | Stmt::ExitRegion { .. }
        | Stmt::Unimplemented { .. } => {}
    }
}

pub fn walk_expr_mut<V: MutVisitor + ?Sized>(
    visitor: &mut V,
    expr: &mut Expr,
) {
    match expr {
        Expr::Call { callee, args, .. } => {
            if let Callable::Method { subject, .. } = callee {
                visitor.visit_expr_mut(subject);
            }
            for arg in args {
                visitor.visit_expr_mut(arg);
            }
        }
        Expr::Support { args, .. } | Expr::Connected { args, .. } => {
            for arg in args {
                visitor.visit_expr_mut(arg);
            }
        }
        Expr::HandlerScope { handled, .. } => visitor.visit_expr_mut(handled),
        Expr::Await { promise, .. } => visitor.visit_expr_mut(promise),
        Expr::Attempt { call, .. } => visitor.visit_expr_mut(call),
        Expr::IsFailure { holder }
        | Expr::Unwrap { holder, .. }
        | Expr::Propagate { holder, .. } => visitor.visit_expr_mut(holder),
        Expr::Reference { .. }
        | Expr::Value { .. }
        | Expr::FailureSentinel { .. }
        | Expr::Field { .. }
        | Expr::MethodValue { .. }
        | Expr::Unimplemented { .. } => {}
    }
}

/// 是否含有挂起点（不进入局部函数）
struct SuspensionFinder {
    found: bool,
}

impl Visitor for SuspensionFinder {
    fn visit_stmt(
        &mut self,
        stmt: &Stmt,
    ) {
        if self.found {
            return;
        }
        if matches!(stmt, Stmt::Yield { .. }) {
            self.found = true;
            return;
        }
        walk_stmt(self, stmt);
    }

    fn visit_expr(
        &mut self,
        expr: &Expr,
    ) {
        if matches!(expr, Expr::Await { .. }) {
            self.found = true;
            return;
        }
        walk_expr(self, expr);
    }

    fn visit_function(
        &mut self,
        _function: &Function,
    ) {
    }
}

pub fn stmt_suspends(stmt: &Stmt) -> bool {
    let mut finder = SuspensionFinder { found: false };
    finder.visit_stmt(stmt);
    finder.found
}

pub fn stmts_suspend(stmts: &[Stmt]) -> bool {
    stmts.iter().any(stmt_suspends)
}

pub fn expr_suspends(expr: &Expr) -> bool {
    let mut finder = SuspensionFinder { found: false };
    finder.visit_expr(expr);
    finder.found
}

/// 模块中出现的最大临时名 uid，会话据此避开上游临时名
pub fn max_temporary_uid(module: &Module) -> Option<u32> {
    struct MaxUid(Option<u32>);

    impl MaxUid {
        fn note(
            &mut self,
            name: &Name,
        ) {
            if let Name::Temporary { uid, .. } = name {
                self.0 = Some(self.0.map_or(*uid, |max| max.max(*uid)));
            }
        }
    }

    impl Visitor for MaxUid {
        fn visit_stmt(
            &mut self,
            stmt: &Stmt,
        ) {
            match stmt {
                Stmt::Assign { target, .. } => self.note(target),
                Stmt::LocalDecl { name, .. } => self.note(name),
                Stmt::Labeled { label, .. } => self.note(label),
                Stmt::Break { label: Some(label), .. } | Stmt::Continue { label: Some(label), .. } => {
                    self.note(label)
                }
                _ => {}
            }
            walk_stmt(self, stmt);
        }

        fn visit_expr(
            &mut self,
            expr: &Expr,
        ) {
            match expr {
                Expr::Reference { name, .. } => self.note(name),
                Expr::HandlerScope { failed, .. } => self.note(failed),
                _ => {}
            }
            walk_expr(self, expr);
        }

        fn visit_function(
            &mut self,
            function: &Function,
        ) {
            self.note(&function.name);
            for param in &function.params {
                self.note(&param.name);
            }
            walk_stmts(self, &function.body);
        }
    }

    let mut max = MaxUid(None);
    for top in &module.top_levels {
        match top {
            TopLevel::Function(function) => max.visit_function(function),
            TopLevel::Init(init) => walk_stmts(&mut max, &init.body),
            TopLevel::Declaration(decl) => {
                max.note(&decl.name);
                if let Some(init) = &decl.init {
                    max.visit_expr(init);
                }
            }
        }
    }
    max.0
}
