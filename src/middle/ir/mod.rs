//! 中间表示 (IR)
//!
//! 上游去糖、类型检查阶段产出的树，本核心只读不写。所有节点都是封闭的
//! 和类型：新增节点只能扩展枚举，迫使每个消费者都处理它。
//!
//! 标注为“降级后”的变体只由 `middle` 下的各个 pass 产出，上游不会构造。

pub mod builder;
pub mod visit;

use std::fmt;

use crate::util::span::Span;

/// IR 名字
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Name {
    /// 源码可见的名字，遮蔽时由 `disambiguator` 区分
    Stable { text: String, disambiguator: u32 },
    /// 编译器生成的临时名，`uid` 在模块内唯一
    Temporary { hint: String, uid: u32 },
}

impl Name {
    /// 创建稳定名
    pub fn stable(text: impl Into<String>) -> Self {
        Name::Stable {
            text: text.into(),
            disambiguator: 0,
        }
    }

    /// 创建遮蔽外层同名变量的稳定名
    pub fn shadowed(
        text: impl Into<String>,
        disambiguator: u32,
    ) -> Self {
        Name::Stable {
            text: text.into(),
            disambiguator,
        }
    }

    /// 创建临时名
    pub fn temporary(
        hint: impl Into<String>,
        uid: u32,
    ) -> Self {
        Name::Temporary {
            hint: hint.into(),
            uid,
        }
    }

    /// 名字的文本部分（稳定名的原文或临时名的提示）
    pub fn text(&self) -> &str {
        match self {
            Name::Stable { text, .. } => text,
            Name::Temporary { hint, .. } => hint,
        }
    }

    pub fn is_temporary(&self) -> bool {
        matches!(self, Name::Temporary { .. })
    }
}

impl fmt::Display for Name {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Name::Stable {
                text,
                disambiguator: 0,
            } => write!(f, "{}", text),
            Name::Stable {
                text,
                disambiguator,
            } => write!(f, "{}@{}", text, disambiguator),
            Name::Temporary { hint, uid } => write!(f, "{}#{}", hint, uid),
        }
    }
}

/// 标签与名字共用同一命名空间
pub type Label = Name;

/// 捕获容器在模块活动记录池中的下标
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActivationId(pub usize);

impl fmt::Display for ActivationId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "activation#{}", self.0)
    }
}

/// 类型
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    /// 名义类型，如 `Int`、`List<String>`
    Nominal { name: String, args: Vec<Type> },
    /// 联合类型
    Union(Vec<Type>),
    /// 联合中的“失败”分支
    Failure,
}

impl Type {
    pub fn nominal(name: impl Into<String>) -> Self {
        Type::Nominal {
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn generic(
        name: impl Into<String>,
        args: Vec<Type>,
    ) -> Self {
        Type::Nominal {
            name: name.into(),
            args,
        }
    }

    pub fn int() -> Self {
        Type::nominal("Int")
    }

    pub fn float64() -> Self {
        Type::nominal("Float64")
    }

    pub fn boolean() -> Self {
        Type::nominal("Boolean")
    }

    pub fn string() -> Self {
        Type::nominal("String")
    }

    pub fn void() -> Self {
        Type::nominal("Void")
    }

    pub fn null() -> Self {
        Type::nominal("Null")
    }

    /// `T?`
    pub fn nullable(inner: Type) -> Self {
        Type::Union(vec![inner, Type::null()])
    }

    /// `T | Bubble`
    pub fn failable(inner: Type) -> Self {
        Type::Union(vec![inner, Type::Failure])
    }

    /// 名义类型的名字
    pub fn nominal_name(&self) -> Option<&str> {
        match self {
            Type::Nominal { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn is_void(&self) -> bool {
        self.nominal_name() == Some("Void")
    }

    pub fn is_nullable(&self) -> bool {
        match self {
            Type::Nominal { name, .. } => name == "Null",
            Type::Union(arms) => arms.iter().any(Type::is_nullable),
            Type::Failure => false,
        }
    }

    pub fn is_failable(&self) -> bool {
        match self {
            Type::Failure => true,
            Type::Union(arms) => arms.iter().any(Type::is_failable),
            Type::Nominal { .. } => false,
        }
    }

    /// 去掉失败分支后的类型；只剩一个分支时展开
    pub fn without_failure(&self) -> Type {
        self.without(|arm| matches!(arm, Type::Failure))
    }

    /// 去掉 `Null` 分支后的类型
    pub fn without_null(&self) -> Type {
        self.without(|arm| arm.nominal_name() == Some("Null"))
    }

    fn without(
        &self,
        drop: impl Fn(&Type) -> bool,
    ) -> Type {
        match self {
            Type::Union(arms) => {
                let mut kept: Vec<Type> = arms.iter().filter(|arm| !drop(arm)).cloned().collect();
                match kept.len() {
                    0 => Type::void(),
                    1 => kept.remove(0),
                    _ => Type::Union(kept),
                }
            }
            other => other.clone(),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Type::Nominal { name, args } if args.is_empty() => write!(f, "{}", name),
            Type::Nominal { name, args } => {
                write!(f, "{}<", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ">")
            }
            Type::Union(arms) => {
                for (i, arm) in arms.iter().enumerate() {
                    if i > 0 {
                        write!(f, " | ")?;
                    }
                    write!(f, "{}", arm)?;
                }
                Ok(())
            }
            Type::Failure => write!(f, "Bubble"),
        }
    }
}

/// 字面量
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Bool(bool),
    String(String),
    Null,
    Void,
}

/// 内建运算符
///
/// 命名沿用 `<运算><左操作数><右操作数>` 的约定，`Safe` 后缀表示可能失败、
/// 参与失败通道的检查形式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BuiltinOperator {
    BooleanNegation,
    BitwiseAnd,
    BitwiseOr,
    IsNull,
    NotNull,
    DivFltFlt,
    DivIntInt,
    DivIntIntSafe,
    ModFltFlt,
    ModIntInt,
    ModIntIntSafe,
    MinusFlt,
    MinusFltFlt,
    MinusInt,
    MinusIntInt,
    PlusFltFlt,
    PlusIntInt,
    TimesFltFlt,
    TimesIntInt,
    PowFltFlt,
    LtFltFlt,
    LtIntInt,
    LtStrStr,
    LtGeneric,
    LeFltFlt,
    LeIntInt,
    LeStrStr,
    LeGeneric,
    GtFltFlt,
    GtIntInt,
    GtStrStr,
    GtGeneric,
    GeFltFlt,
    GeIntInt,
    GeStrStr,
    GeGeneric,
    EqFltFlt,
    EqIntInt,
    EqStrStr,
    EqGeneric,
    NeFltFlt,
    NeIntInt,
    NeStrStr,
    NeGeneric,
    CmpFltFlt,
    CmpIntInt,
    CmpStrStr,
    CmpGeneric,
    StrCat,
    Listify,
    Print,
    Panic,
}

impl BuiltinOperator {
    /// 所有运算符，便于表驱动测试
    pub const ALL: &'static [BuiltinOperator] = &[
        BuiltinOperator::BooleanNegation,
        BuiltinOperator::BitwiseAnd,
        BuiltinOperator::BitwiseOr,
        BuiltinOperator::IsNull,
        BuiltinOperator::NotNull,
        BuiltinOperator::DivFltFlt,
        BuiltinOperator::DivIntInt,
        BuiltinOperator::DivIntIntSafe,
        BuiltinOperator::ModFltFlt,
        BuiltinOperator::ModIntInt,
        BuiltinOperator::ModIntIntSafe,
        BuiltinOperator::MinusFlt,
        BuiltinOperator::MinusFltFlt,
        BuiltinOperator::MinusInt,
        BuiltinOperator::MinusIntInt,
        BuiltinOperator::PlusFltFlt,
        BuiltinOperator::PlusIntInt,
        BuiltinOperator::TimesFltFlt,
        BuiltinOperator::TimesIntInt,
        BuiltinOperator::PowFltFlt,
        BuiltinOperator::LtFltFlt,
        BuiltinOperator::LtIntInt,
        BuiltinOperator::LtStrStr,
        BuiltinOperator::LtGeneric,
        BuiltinOperator::LeFltFlt,
        BuiltinOperator::LeIntInt,
        BuiltinOperator::LeStrStr,
        BuiltinOperator::LeGeneric,
        BuiltinOperator::GtFltFlt,
        BuiltinOperator::GtIntInt,
        BuiltinOperator::GtStrStr,
        BuiltinOperator::GtGeneric,
        BuiltinOperator::GeFltFlt,
        BuiltinOperator::GeIntInt,
        BuiltinOperator::GeStrStr,
        BuiltinOperator::GeGeneric,
        BuiltinOperator::EqFltFlt,
        BuiltinOperator::EqIntInt,
        BuiltinOperator::EqStrStr,
        BuiltinOperator::EqGeneric,
        BuiltinOperator::NeFltFlt,
        BuiltinOperator::NeIntInt,
        BuiltinOperator::NeStrStr,
        BuiltinOperator::NeGeneric,
        BuiltinOperator::CmpFltFlt,
        BuiltinOperator::CmpIntInt,
        BuiltinOperator::CmpStrStr,
        BuiltinOperator::CmpGeneric,
        BuiltinOperator::StrCat,
        BuiltinOperator::Listify,
        BuiltinOperator::Print,
        BuiltinOperator::Panic,
    ];

    /// 可能失败的检查形式
    pub fn is_safe_form(self) -> bool {
        matches!(self, BuiltinOperator::DivIntIntSafe | BuiltinOperator::ModIntIntSafe)
    }

    /// 检查形式对应的不检查形式
    pub fn unsafe_form(self) -> BuiltinOperator {
        match self {
            BuiltinOperator::DivIntIntSafe => BuiltinOperator::DivIntInt,
            BuiltinOperator::ModIntIntSafe => BuiltinOperator::ModIntInt,
            other => other,
        }
    }
}

impl fmt::Display for BuiltinOperator {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// 模块
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    /// 模块路径，如 `["geometry", "shapes"]`
    pub path: Vec<String>,
    /// 按源码顺序排列的顶层声明
    pub top_levels: Vec<TopLevel>,
    pub span: Span,
}

/// 顶层声明
#[derive(Debug, Clone, PartialEq)]
pub enum TopLevel {
    Function(Function),
    Init(InitBlock),
    Declaration(ModuleDecl),
}

/// 模块初始化块
#[derive(Debug, Clone, PartialEq)]
pub struct InitBlock {
    pub body: Vec<Stmt>,
    pub span: Span,
}

/// 模块级变量声明
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleDecl {
    pub name: Name,
    pub ty: Type,
    pub init: Option<Expr>,
    pub assign_once: bool,
    pub exported: bool,
    pub span: Span,
}

/// 函数种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionKind {
    Plain,
    /// 包含 `yield`，降级为状态机
    Generator,
    /// 包含 `await`，降级为状态机
    Async,
}

/// 函数（顶层或局部）
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: Name,
    pub params: Vec<Param>,
    /// 声明的返回类型；生成器为产出值类型，异步函数为结果类型
    pub return_type: Type,
    pub body: Vec<Stmt>,
    pub kind: FunctionKind,
    pub exported: bool,
    pub span: Span,
}

impl Function {
    pub fn is_resumable(&self) -> bool {
        self.kind != FunctionKind::Plain
    }
}

/// 函数参数
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: Name,
    pub ty: Type,
}

/// 语句
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Assign {
        target: Name,
        value: Expr,
        span: Span,
    },
    Block(Vec<Stmt>),
    Break {
        label: Option<Label>,
        span: Span,
    },
    Continue {
        label: Option<Label>,
        span: Span,
    },
    Expr(Expr),
    Labeled {
        label: Label,
        body: Box<Stmt>,
    },
    LocalDecl {
        name: Name,
        ty: Type,
        init: Option<Expr>,
        assign_once: bool,
        span: Span,
    },
    LocalFunction(Box<Function>),
    /// 模块初始化失败
    InitFailed {
        span: Span,
    },
    Return {
        value: Option<Expr>,
        span: Span,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
        span: Span,
    },
    If {
        cond: Expr,
        then: Vec<Stmt>,
        otherwise: Vec<Stmt>,
        span: Span,
    },
    /// `body` 中的失败转入 `recover`
    Try {
        body: Vec<Stmt>,
        recover: Vec<Stmt>,
        span: Span,
    },
    /// 挂起点
    Yield {
        value: Option<Expr>,
        span: Span,
    },

    // ---- 降级后 ----
    /// 写捕获容器字段
    StoreField {
        field: FieldRef,
        value: Expr,
    },
    /// 整数 switch；`default` 为空表示直接落空
    Switch {
        subject: Expr,
        cases: Vec<SwitchCase>,
        default: Vec<Stmt>,
    },
    /// 离开不可跨越的边界（逃逸码已设置）
    ExitRegion {
        region: Label,
    },
    /// 目标语言尚无对应渲染的构造
    Unimplemented {
        what: String,
        span: Span,
    },
}

/// switch 分支
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    pub value: i64,
    pub body: Vec<Stmt>,
}

/// 捕获容器字段引用
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldRef {
    pub activation: ActivationId,
    pub name: Name,
}

/// 可调用对象
#[derive(Debug, Clone, PartialEq)]
pub enum Callable {
    Function(Name),
    Method {
        subject: Box<Expr>,
        method: String,
    },
    /// 降级后：捕获容器上的方法
    ContainerMethod {
        activation: ActivationId,
        name: Name,
    },
}

/// 表达式
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Call {
        callee: Callable,
        args: Vec<Expr>,
        ty: Type,
    },
    Reference {
        name: Name,
        ty: Type,
    },
    Value {
        value: Literal,
        ty: Type,
    },
    /// 失败哨兵：在恢复块外创建新的失败，在恢复块内表示重新抛出
    FailureSentinel {
        ty: Type,
    },
    /// 内联支持代码调用
    Support {
        op: BuiltinOperator,
        args: Vec<Expr>,
        ty: Type,
    },
    /// 标准库“连接”引用调用
    Connected {
        key: String,
        args: Vec<Expr>,
        ty: Type,
    },
    /// 失败守卫：`handled` 失败时置位 `failed`
    HandlerScope {
        failed: Name,
        handled: Box<Expr>,
        ty: Type,
    },
    /// 挂起点
    Await {
        promise: Box<Expr>,
        ty: Type,
    },

    // ---- 降级后 ----
    /// 读捕获容器字段
    Field {
        field: FieldRef,
        ty: Type,
    },
    /// 容器方法作为值（状态机的 step 函数）
    MethodValue {
        activation: ActivationId,
        name: Name,
        ty: Type,
    },
    /// 求值到“成功或失败”容器
    Attempt {
        call: Box<Expr>,
        ty: Type,
    },
    /// `holder` 是持有“成功或失败”值的表达式（通常是对临时量的引用）
    IsFailure {
        holder: Box<Expr>,
    },
    Unwrap {
        holder: Box<Expr>,
        ty: Type,
    },
    /// 把 `holder` 中的失败向调用者传播
    Propagate {
        holder: Box<Expr>,
        ty: Type,
    },
    Unimplemented {
        what: String,
        ty: Type,
    },
}

impl Expr {
    /// 表达式的静态类型
    pub fn ty(&self) -> Type {
        match self {
            Expr::Call { ty, .. }
            | Expr::Reference { ty, .. }
            | Expr::Value { ty, .. }
            | Expr::FailureSentinel { ty }
            | Expr::Support { ty, .. }
            | Expr::Connected { ty, .. }
            | Expr::HandlerScope { ty, .. }
            | Expr::Await { ty, .. }
            | Expr::Field { ty, .. }
            | Expr::MethodValue { ty, .. }
            | Expr::Attempt { ty, .. }
            | Expr::Unwrap { ty, .. }
            | Expr::Propagate { ty, .. }
            | Expr::Unimplemented { ty, .. } => ty.clone(),
            Expr::IsFailure { .. } => Type::boolean(),
        }
    }

    /// 是否是对 `name` 的直接引用
    pub fn is_reference_to(
        &self,
        name: &Name,
    ) -> bool {
        matches!(self, Expr::Reference { name: n, .. } if n == name)
    }
}

impl Stmt {
    /// 语句位置；块与降级节点没有独立位置
    pub fn span(&self) -> Span {
        match self {
            Stmt::Assign { span, .. }
            | Stmt::Break { span, .. }
            | Stmt::Continue { span, .. }
            | Stmt::LocalDecl { span, .. }
            | Stmt::InitFailed { span }
            | Stmt::Return { span, .. }
            | Stmt::While { span, .. }
            | Stmt::If { span, .. }
            | Stmt::Try { span, .. }
            | Stmt::Yield { span, .. }
            | Stmt::Unimplemented { span, .. } => *span,
            Stmt::LocalFunction(function) => function.span,
            Stmt::Labeled { body, .. } => body.span(),
            Stmt::Block(stmts) => stmts
                .iter()
                .fold(Span::dummy(), |acc, stmt| acc.merge(stmt.span())),
            Stmt::Expr(_)
            | Stmt::StoreField { .. }
            | Stmt::Switch { .. }
            | Stmt::ExitRegion { .. } => Span::dummy(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nullable_and_failable() {
        let t = Type::failable(Type::nullable(Type::int()));
        assert!(t.is_failable());
        assert!(t.is_nullable());
        assert!(!Type::int().is_nullable());
        assert_eq!(Type::failable(Type::int()).without_failure(), Type::int());
        assert_eq!(Type::nullable(Type::int()).without_null(), Type::int());
    }

    #[test]
    fn test_name_display() {
        assert_eq!(Name::stable("x").to_string(), "x");
        assert_eq!(Name::shadowed("x", 2).to_string(), "x@2");
        assert_eq!(Name::temporary("t", 7).to_string(), "t#7");
    }

    #[test]
    fn test_safe_forms() {
        assert!(BuiltinOperator::DivIntIntSafe.is_safe_form());
        assert_eq!(BuiltinOperator::ModIntIntSafe.unsafe_form(), BuiltinOperator::ModIntInt);
        assert_eq!(BuiltinOperator::PlusIntInt.unsafe_form(), BuiltinOperator::PlusIntInt);
    }

    #[test]
    fn test_type_display() {
        let t = Type::failable(Type::generic("List", vec![Type::string()]));
        assert_eq!(t.to_string(), "List<String> | Bubble");
    }
}
