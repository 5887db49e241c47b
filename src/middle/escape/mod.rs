//! 逃逸计划
//!
//! 有些目标语言把 try/recover 区域实现为无法跳出的边界（例如 C++ 后端把
//! 区域体放进 lambda）。区域内指向区域外的 break/continue/return 必须改写：
//!
//! 1. 区域前声明逃逸码变量，初值 0（表示正常落空）；
//! 2. 每个越界出口改为“设置逃逸码 + 离开区域”；
//! 3. 区域后紧跟一个 switch，按逃逸码重放原始出口，default 为空。
//!
//! 不同目的地按首次出现顺序分配从 1 开始的不同编码。嵌套区域先于外层降级，
//! 内层 switch 中重放的出口对外层而言只是普通出口，因此每个边界各有一套编码。
//! 目的地位于区域内部的出口不受影响；携带失败的 return 也不是出口，
//! 它由区域本身处理。

use indexmap::{IndexMap, IndexSet};
use tracing::debug;

use crate::middle::ir::*;
use crate::middle::session::Session;
use crate::util::span::Span;


/// 出口种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitKind {
    Break,
    Continue,
    Return,
}

/// 出口目的地；无标签的 break/continue 指区域外最内层循环
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Destination {
    pub kind: ExitKind,
    pub label: Option<Label>,
}

impl Destination {
    fn replay(
        &self,
        return_slot: Option<&(Name, Type)>,
    ) -> Stmt {
        let span = Span::dummy();
        match self.kind {
            ExitKind::Break => Stmt::Break {
                label: self.label.clone(),
                span,
            },
            ExitKind::Continue => Stmt::Continue {
                label: self.label.clone(),
                span,
            },
            ExitKind::Return => Stmt::Return {
                value: return_slot.map(|(name, ty)| Expr::Reference {
                    name: name.clone(),
                    ty: ty.clone(),
                }),
                span,
            },
        }
    }
}

/// 一个区域的逃逸计划
#[derive(Debug, Clone, PartialEq)]
pub struct EscapePlan {
    /// 逃逸码变量
    pub code_var: Name,
    /// 区域标签，`ExitRegion` 指向它
    pub region: Label,
    /// 目的地 → 编码（首次出现顺序，从 1 开始）
    pub codes: IndexMap<Destination, i64>,
    /// 带值 return 先把值存到这里
    pub return_slot: Option<(Name, Type)>,
}

/// 计划摘要
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EscapeStats {
    pub codes: usize,
    pub breaks: usize,
    pub continues: usize,
    pub returns: usize,
}

impl EscapePlan {
    pub fn stats(&self) -> EscapeStats {
        self.codes.keys().fold(
            EscapeStats {
                codes: self.codes.len(),
                ..EscapeStats::default()
            },
            |mut stats, destination| {
                match destination.kind {
                    ExitKind::Break => stats.breaks += 1,
                    ExitKind::Continue => stats.continues += 1,
                    ExitKind::Return => stats.returns += 1,
                }
                stats
            },
        )
    }

    pub fn code(
        &self,
        destination: &Destination,
    ) -> Option<i64> {
        self.codes.get(destination).copied()
    }

    /// 区域之前的声明
    pub fn declarations(&self) -> Vec<Stmt> {
        let mut decls = vec![Stmt::LocalDecl {
            name: self.code_var.clone(),
            ty: Type::int(),
            init: Some(Expr::Value {
                value: Literal::Int(0),
                ty: Type::int(),
            }),
            assign_once: false,
            span: Span::dummy(),
        }];
        if let Some((name, ty)) = &self.return_slot {
            decls.push(Stmt::LocalDecl {
                name: name.clone(),
                ty: ty.clone(),
                init: None,
                assign_once: false,
                span: Span::dummy(),
            });
        }
        decls
    }

    /// 区域之后的分派：每个编码一个 case，default 什么都不做
    pub fn dispatch(&self) -> Stmt {
        Stmt::Switch {
            subject: Expr::Reference {
                name: self.code_var.clone(),
                ty: Type::int(),
            },
            cases: self
                .codes
                .iter()
                .map(|(destination, code)| SwitchCase {
                    value: *code,
                    body: vec![destination.replay(self.return_slot.as_ref())],
                })
                .collect(),
            default: Vec::new(),
        }
    }

    /// 越界出口的替代语句
    fn leave(
        &self,
        code: i64,
        value: Option<Expr>,
    ) -> Stmt {
        let mut stmts = Vec::with_capacity(3);
        if let (Some(value), Some((slot, _))) = (value, &self.return_slot) {
            stmts.push(Stmt::Assign {
                target: slot.clone(),
                value,
                span: Span::dummy(),
            });
        }
        stmts.push(Stmt::Assign {
            target: self.code_var.clone(),
            value: Expr::Value {
                value: Literal::Int(code),
                ty: Type::int(),
            },
            span: Span::dummy(),
        });
        stmts.push(Stmt::ExitRegion {
            region: self.region.clone(),
        });
        Stmt::Block(stmts)
    }
}

/// 区域内定义的标签
fn contained_labels(stmts: &[Stmt]) -> IndexSet<Label> {
    struct Labels(IndexSet<Label>);

    impl visit::Visitor for Labels {
        fn visit_stmt(
            &mut self,
            stmt: &Stmt,
        ) {
            if let Stmt::Labeled { label, .. } = stmt {
                self.0.insert(label.clone());
            }
            visit::walk_stmt(self, stmt);
        }

        fn visit_function(
            &mut self,
            _function: &Function,
        ) {
        }
    }

    let mut labels = Labels(IndexSet::new());
    visit::walk_stmts(&mut labels, stmts);
    labels.0
}

/// 区域遍历的上下文
struct RegionScan<'a> {
    contained: &'a IndexSet<Label>,
    loop_depth: usize,
}

impl RegionScan<'_> {
    /// 出口是否越过区域边界
    fn destination(
        &self,
        stmt: &Stmt,
    ) -> Option<(Destination, Option<Expr>)> {
        let jump = |kind: ExitKind, label: &Option<Label>| match label {
            None if self.loop_depth == 0 => Some(Destination { kind, label: None }),
            Some(label) if !self.contained.contains(label) => Some(Destination {
                kind,
                label: Some(label.clone()),
            }),
            _ => None,
        };
        match stmt {
            Stmt::Break { label, .. } => jump(ExitKind::Break, label).map(|d| (d, None)),
            Stmt::Continue { label, .. } => jump(ExitKind::Continue, label).map(|d| (d, None)),
            // 失败不是出口：区域自己把它交给 recover 或继续向外传播
            Stmt::Return {
                value: Some(value), ..
            } if is_failure(value) => None,
            Stmt::Return { value, .. } => Some((
                Destination {
                    kind: ExitKind::Return,
                    label: None,
                },
                value.clone(),
            )),
            _ => None,
        }
    }
}

/// 向调用者传播失败的返回值
pub fn is_failure(value: &Expr) -> bool {
    matches!(value, Expr::FailureSentinel { .. } | Expr::Propagate { .. })
}

/// 按首次出现顺序收集越界出口
pub fn collect_exits(
    body: &[Stmt],
    recover: &[Stmt],
) -> IndexSet<Destination> {
    let mut contained = contained_labels(body);
    contained.extend(contained_labels(recover));
    let mut scan = RegionScan {
        contained: &contained,
        loop_depth: 0,
    };
    let mut found = IndexSet::new();
    collect_in(&mut scan, body, &mut found);
    collect_in(&mut scan, recover, &mut found);
    found
}

fn collect_in(
    scan: &mut RegionScan<'_>,
    stmts: &[Stmt],
    found: &mut IndexSet<Destination>,
) {
    for stmt in stmts {
        if let Some((destination, _)) = scan.destination(stmt) {
            found.insert(destination);
            continue;
        }
        match stmt {
            Stmt::Block(inner) => collect_in(scan, inner, found),
            Stmt::Labeled { body, .. } => collect_in(scan, std::slice::from_ref(body.as_ref()), found),
            Stmt::While { body, .. } => {
                scan.loop_depth += 1;
                collect_in(scan, body, found);
                scan.loop_depth -= 1;
            }
            Stmt::If {
                then, otherwise, ..
            } => {
                collect_in(scan, then, found);
                collect_in(scan, otherwise, found);
            }
            Stmt::Try { body, recover, .. } => {
                collect_in(scan, body, found);
                collect_in(scan, recover, found);
            }
            Stmt::Switch { cases, default, .. } => {
                for case in cases {
                    collect_in(scan, &case.body, found);
                }
                collect_in(scan, default, found);
            }
            _ => {}
        }
    }
}

/// 为区域建立计划；没有越界出口时返回 `None`
pub fn plan(
    body: &[Stmt],
    recover: &[Stmt],
    return_type: &Type,
    session: &mut Session,
) -> Option<EscapePlan> {
    let exits = collect_exits(body, recover);
    if exits.is_empty() {
        return None;
    }
    let needs_slot = returns_value(body) || returns_value(recover);
    let code_var = session.temporary("escape");
    let region = session.temporary("region");
    let return_slot = needs_slot.then(|| (session.temporary("returned"), return_type.clone()));
    let codes = exits
        .into_iter()
        .enumerate()
        .map(|(i, destination)| (destination, i as i64 + 1))
        .collect();
    Some(EscapePlan {
        code_var,
        region,
        codes,
        return_slot,
    })
}

fn returns_value(stmts: &[Stmt]) -> bool {
    struct Finder(bool);

    impl visit::Visitor for Finder {
        fn visit_stmt(
            &mut self,
            stmt: &Stmt,
        ) {
            if matches!(stmt, Stmt::Return { value: Some(value), .. } if !is_failure(value)) {
                self.0 = true;
            }
            visit::walk_stmt(self, stmt);
        }

        fn visit_function(
            &mut self,
            _function: &Function,
        ) {
        }
    }

    let mut finder = Finder(false);
    visit::walk_stmts(&mut finder, stmts);
    finder.0
}

/// 按计划改写区域内的越界出口
fn rewrite_in(
    plan: &EscapePlan,
    scan: &mut RegionScan<'_>,
    stmts: Vec<Stmt>,
) -> Vec<Stmt> {
    stmts
        .into_iter()
        .map(|stmt| rewrite_stmt(plan, scan, stmt))
        .collect()
}

fn rewrite_stmt(
    plan: &EscapePlan,
    scan: &mut RegionScan<'_>,
    stmt: Stmt,
) -> Stmt {
    if let Some((destination, value)) = scan.destination(&stmt) {
        if let Some(code) = plan.code(&destination) {
            return plan.leave(code, value);
        }
    }
    match stmt {
        Stmt::Block(inner) => Stmt::Block(rewrite_in(plan, scan, inner)),
        Stmt::Labeled { label, body } => Stmt::Labeled {
            label,
            body: Box::new(rewrite_stmt(plan, scan, *body)),
        },
        Stmt::While { cond, body, span } => {
            scan.loop_depth += 1;
            let body = rewrite_in(plan, scan, body);
            scan.loop_depth -= 1;
            Stmt::While { cond, body, span }
        }
        Stmt::If {
            cond,
            then,
            otherwise,
            span,
        } => Stmt::If {
            cond,
            then: rewrite_in(plan, scan, then),
            otherwise: rewrite_in(plan, scan, otherwise),
            span,
        },
        Stmt::Try {
            body,
            recover,
            span,
        } => Stmt::Try {
            body: rewrite_in(plan, scan, body),
            recover: rewrite_in(plan, scan, recover),
            span,
        },
        Stmt::Switch {
            subject,
            cases,
            default,
        } => Stmt::Switch {
            subject,
            cases: cases
                .into_iter()
                .map(|case| SwitchCase {
                    value: case.value,
                    body: rewrite_in(plan, scan, case.body),
                })
                .collect(),
            default: rewrite_in(plan, scan, default),
        },
        other => other,
    }
}

/// 先降级嵌套区域
fn lower_nested(
    stmts: Vec<Stmt>,
    return_type: &Type,
    session: &mut Session,
) -> Vec<Stmt> {
    stmts
        .into_iter()
        .map(|stmt| match stmt {
            Stmt::Try {
                body,
                recover,
                span,
            } => Stmt::Block(lower_region(body, recover, span, return_type, session)),
            Stmt::Block(inner) => Stmt::Block(lower_nested(inner, return_type, session)),
            Stmt::Labeled { label, body } => {
                let mut lowered = lower_nested(vec![*body], return_type, session);
                let body = lowered.pop().unwrap_or(Stmt::Block(Vec::new()));
                Stmt::Labeled {
                    label,
                    body: Box::new(body),
                }
            }
            Stmt::While { cond, body, span } => Stmt::While {
                cond,
                body: lower_nested(body, return_type, session),
                span,
            },
            Stmt::If {
                cond,
                then,
                otherwise,
                span,
            } => Stmt::If {
                cond,
                then: lower_nested(then, return_type, session),
                otherwise: lower_nested(otherwise, return_type, session),
                span,
            },
            other => other,
        })
        .collect()
}

/// 降级一个 try/recover 区域（含其中嵌套的区域）
///
/// 没有越界出口时结果就是原来的 `Try`；否则为
/// `[声明..., region: Try{...}, switch]`。
pub fn lower_region(
    body: Vec<Stmt>,
    recover: Vec<Stmt>,
    span: Span,
    return_type: &Type,
    session: &mut Session,
) -> Vec<Stmt> {
    let body = lower_nested(body, return_type, session);
    let recover = lower_nested(recover, return_type, session);

    let Some(plan) = plan(&body, &recover, return_type, session) else {
        return vec![Stmt::Try {
            body,
            recover,
            span,
        }];
    };
    let stats = plan.stats();
    debug!(
        "escape: region {} routes {} exit(s) through {} ({} break, {} continue, {} return)",
        plan.region, stats.codes, plan.code_var, stats.breaks, stats.continues, stats.returns
    );

    let mut contained = contained_labels(&body);
    contained.extend(contained_labels(&recover));
    let mut scan = RegionScan {
        contained: &contained,
        loop_depth: 0,
    };
    let body = rewrite_in(&plan, &mut scan, body);
    let recover = rewrite_in(&plan, &mut scan, recover);

    let mut out = plan.declarations();
    out.push(Stmt::Labeled {
        label: plan.region.clone(),
        body: Box::new(Stmt::Try {
            body,
            recover,
            span,
        }),
    });
    out.push(plan.dispatch());
    out
}
