//! 捕获分析
//!
//! 逐个作用域判断哪些局部变量必须提升到共享的捕获容器中：
//!
//! - 被修改、且被嵌套在其声明作用域之下的函数引用的局部变量；
//! - 被（直接或通过兄弟局部函数间接）递归的局部函数引用的局部变量。
//!
//! 递归的局部函数一律降级为容器方法，而不是裸闭包，这样它们互相引用时
//! 没有前向声明顺序的问题。容器放在模块级活动记录池里，闭包只持有下标。
//!
//! 分析本身不会失败，只决定“要容器”还是“不要容器”；按下标查找一个从未
//! 提升过的成员才是 IR 契约违规。

use indexmap::{IndexMap, IndexSet};
use tracing::debug;

use crate::middle::ir::visit::{self, MutVisitor, Visitor};
use crate::middle::ir::*;
use crate::middle::names::MemberTable;
use crate::middle::session::Session;
use crate::util::config::ParamCapture;
use crate::util::diagnostic::{LowerError, Result};


/// 容器字段的初始值来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldInit {
    /// 类型零值，声明处再写入
    Zero,
    /// 函数入口处拷入同名参数
    Param,
}

/// 容器字段
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerField {
    pub name: Name,
    pub ty: Type,
    pub init: FieldInit,
}

/// 捕获容器（一次活动记录）
#[derive(Debug, Clone, PartialEq)]
pub struct Activation {
    pub id: ActivationId,
    /// 创建容器的函数
    pub owner: Name,
    /// 容器类型名
    pub type_name: Name,
    /// 持有容器实例的局部变量
    pub instance: Name,
    /// 外层活动记录；容器方法经由它访问外层字段
    pub parent: Option<ActivationId>,
    pub fields: IndexMap<Name, ContainerField>,
    pub methods: IndexMap<Name, Function>,
    /// 字段与方法的目标标识符，由发射器按目标风格分配
    pub members: MemberTable,
}

/// 模块级活动记录池
#[derive(Debug, Default)]
pub struct ActivationArena {
    activations: Vec<Activation>,
}

impl ActivationArena {
    pub fn alloc(
        &mut self,
        owner: Name,
        type_name: Name,
        instance: Name,
        parent: Option<ActivationId>,
    ) -> ActivationId {
        let id = ActivationId(self.activations.len());
        self.activations.push(Activation {
            id,
            owner,
            type_name,
            instance,
            parent,
            fields: IndexMap::new(),
            methods: IndexMap::new(),
            members: MemberTable::default(),
        });
        id
    }

    pub fn get(
        &self,
        id: ActivationId,
    ) -> Result<&Activation> {
        self.activations
            .get(id.0)
            .ok_or(LowerError::UnknownActivation(id.0))
    }

    pub fn get_mut(
        &mut self,
        id: ActivationId,
    ) -> Result<&mut Activation> {
        self.activations
            .get_mut(id.0)
            .ok_or(LowerError::UnknownActivation(id.0))
    }

    /// 查找字段；未提升的成员是契约违规
    pub fn field(
        &self,
        id: ActivationId,
        name: &Name,
    ) -> Result<&ContainerField> {
        self.get(id)?
            .fields
            .get(name)
            .ok_or_else(|| LowerError::UnhoistedField {
                activation: id.0,
                member: name.to_string(),
            })
    }

    pub fn method(
        &self,
        id: ActivationId,
        name: &Name,
    ) -> Result<&Function> {
        self.get(id)?
            .methods
            .get(name)
            .ok_or_else(|| LowerError::UnhoistedField {
                activation: id.0,
                member: name.to_string(),
            })
    }

    pub fn add_field(
        &mut self,
        id: ActivationId,
        field: ContainerField,
    ) -> Result<()> {
        self.get_mut(id)?.fields.insert(field.name.clone(), field);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.activations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.activations.is_empty()
    }
}

/// 一个作用域的分析结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CapturePlan {
    /// 需要容器时为其下标
    pub activation: Option<ActivationId>,
    /// 提升为字段的局部变量（声明顺序）
    pub hoisted: IndexSet<Name>,
    /// 降级为容器方法的局部函数
    pub methods: IndexSet<Name>,
}

impl CapturePlan {
    pub fn needs_container(&self) -> bool {
        self.activation.is_some()
    }
}

/// 分析函数并原地改写其函数体
pub fn analyze(
    function: &mut Function,
    session: &mut Session,
) -> CapturePlan {
    analyze_scope(&function.name, &function.params, &mut function.body, session)
}

/// 分析一个作用域（函数体或模块初始化块）
pub fn analyze_scope(
    owner: &Name,
    params: &[Param],
    body: &mut Vec<Stmt>,
    session: &mut Session,
) -> CapturePlan {
    let mut scan = ScopeScan::default();
    for param in params {
        scan.locals.insert(
            param.name.clone(),
            LocalInfo {
                ty: param.ty.clone(),
                writes: 1,
                is_param: true,
            },
        );
    }
    visit::walk_stmts(&mut scan, body);
    scan.count_nested_writes();

    let methods = scan.method_functions();
    let hoisted: IndexSet<Name> = scan
        .locals
        .iter()
        .filter(|(name, info)| {
            let mutated_and_captured =
                info.writes > 1 && scan.functions.values().any(|uses| uses.refs.contains(*name));
            let used_by_method = methods
                .iter()
                .any(|m| scan.functions.get(m).is_some_and(|uses| uses.refs.contains(*name)));
            mutated_and_captured || used_by_method
        })
        .map(|(name, _)| name.clone())
        .collect();

    if hoisted.is_empty() && methods.is_empty() {
        return CapturePlan::default();
    }

    let type_name = session.temporary(format!("{}Scope", owner.text()));
    let instance = session.temporary("scope");
    let parent = session.current_activation();
    let id = session.arena.alloc(owner.clone(), type_name, instance, parent);
    debug!(
        "capture: {} hoists {} local(s) and {} method(s) into {}",
        owner,
        hoisted.len(),
        methods.len(),
        id
    );

    let mut rewriter = FieldRewriter {
        activation: id,
        hoisted: &hoisted,
        methods: &methods,
        moved: Vec::new(),
    };
    visit::walk_stmts_mut(&mut rewriter, body);
    let moved = rewriter.moved;

    let mut entry = Vec::new();
    for name in &hoisted {
        let Some(info) = scan.locals.get(name) else {
            continue;
        };
        let field = ContainerField {
            name: name.clone(),
            ty: info.ty.clone(),
            init: if info.is_param {
                FieldInit::Param
            } else {
                FieldInit::Zero
            },
        };
        if info.is_param {
            entry.extend(param_copy_in(id, name, &info.ty, session));
        }
        // 刚分配的下标必然存在
        if let Ok(activation) = session.arena.get_mut(id) {
            activation.fields.insert(name.clone(), field);
        }
    }
    if let Ok(activation) = session.arena.get_mut(id) {
        for function in moved {
            activation.methods.insert(function.name.clone(), function);
        }
    }
    if !entry.is_empty() {
        let rest = std::mem::take(body);
        body.extend(entry);
        body.extend(rest);
    }

    CapturePlan {
        activation: Some(id),
        hoisted,
        methods,
    }
}

/// 被捕获参数进入容器的入口语句
fn param_copy_in(
    id: ActivationId,
    name: &Name,
    ty: &Type,
    session: &mut Session,
) -> Vec<Stmt> {
    let field = FieldRef {
        activation: id,
        name: name.clone(),
    };
    let param = Expr::Reference {
        name: name.clone(),
        ty: ty.clone(),
    };
    match session.options.capture.param_capture {
        ParamCapture::CopyIn => vec![Stmt::StoreField { field, value: param }],
        ParamCapture::SnapshotLocal => {
            let snapshot = session.temporary(format!("{}_capture", name.text()));
            vec![
                Stmt::LocalDecl {
                    name: snapshot.clone(),
                    ty: ty.clone(),
                    init: Some(param),
                    assign_once: true,
                    span: crate::util::span::Span::dummy(),
                },
                Stmt::StoreField {
                    field,
                    value: Expr::Reference {
                        name: snapshot,
                        ty: ty.clone(),
                    },
                },
            ]
        }
    }
}

#[derive(Debug)]
struct LocalInfo {
    ty: Type,
    /// 写入次数：初始化或参数绑定算 1，赋值算 1，循环内赋值算 2
    writes: u32,
    is_param: bool,
}

/// 局部函数（含其内部嵌套函数）引用到的名字
#[derive(Debug, Default)]
struct UseSet {
    refs: IndexSet<Name>,
    writes: IndexSet<Name>,
}

impl Visitor for UseSet {
    fn visit_stmt(
        &mut self,
        stmt: &Stmt,
    ) {
        if let Stmt::Assign { target, .. } = stmt {
            self.refs.insert(target.clone());
            self.writes.insert(target.clone());
        }
        visit::walk_stmt(self, stmt);
    }

    fn visit_expr(
        &mut self,
        expr: &Expr,
    ) {
        match expr {
            Expr::Reference { name, .. } => {
                self.refs.insert(name.clone());
            }
            Expr::Call {
                callee: Callable::Function(name),
                ..
            } => {
                self.refs.insert(name.clone());
            }
            _ => {}
        }
        visit::walk_expr(self, expr);
    }
}

/// 扫描一个作用域的声明、写入与直接嵌套的局部函数
#[derive(Debug, Default)]
struct ScopeScan {
    locals: IndexMap<Name, LocalInfo>,
    functions: IndexMap<Name, UseSet>,
    loop_depth: u32,
}

impl Visitor for ScopeScan {
    fn visit_stmt(
        &mut self,
        stmt: &Stmt,
    ) {
        match stmt {
            Stmt::LocalDecl { name, ty, init, .. } => {
                self.locals.insert(
                    name.clone(),
                    LocalInfo {
                        ty: ty.clone(),
                        writes: u32::from(init.is_some()),
                        is_param: false,
                    },
                );
            }
            Stmt::Assign { target, .. } => {
                let weight = if self.loop_depth > 0 { 2 } else { 1 };
                if let Some(info) = self.locals.get_mut(target) {
                    info.writes += weight;
                }
            }
            Stmt::While { .. } => {
                self.loop_depth += 1;
                visit::walk_stmt(self, stmt);
                self.loop_depth -= 1;
                return;
            }
            _ => {}
        }
        visit::walk_stmt(self, stmt);
    }

    fn visit_function(
        &mut self,
        function: &Function,
    ) {
        let mut uses = UseSet::default();
        visit::walk_stmts(&mut uses, &function.body);
        self.functions.insert(function.name.clone(), uses);
    }
}

impl ScopeScan {
    /// 嵌套函数可能被多次调用，其中的写入按 2 计
    fn count_nested_writes(&mut self) {
        for uses in self.functions.values() {
            for name in &uses.writes {
                if let Some(info) = self.locals.get_mut(name) {
                    info.writes += 2;
                }
            }
        }
    }

    fn callees(
        &self,
        function: &Name,
    ) -> Vec<&Name> {
        match self.functions.get(function) {
            Some(uses) => self
                .functions
                .keys()
                .filter(|candidate| uses.refs.contains(*candidate))
                .collect(),
            None => Vec::new(),
        }
    }

    fn is_recursive(
        &self,
        function: &Name,
    ) -> bool {
        let mut seen: IndexSet<&Name> = IndexSet::new();
        let mut stack = self.callees(function);
        while let Some(next) = stack.pop() {
            if next == function {
                return true;
            }
            if seen.insert(next) {
                stack.extend(self.callees(next));
            }
        }
        false
    }

    /// 递归函数，以及被它们引用的兄弟局部函数（方法里看不到局部闭包）
    fn method_functions(&self) -> IndexSet<Name> {
        let mut methods: IndexSet<Name> = self
            .functions
            .keys()
            .filter(|name| self.is_recursive(name))
            .cloned()
            .collect();
        loop {
            let extra: Vec<Name> = methods
                .iter()
                .flat_map(|m| self.callees(m))
                .filter(|callee| !methods.contains(*callee))
                .cloned()
                .collect();
            if extra.is_empty() {
                break;
            }
            methods.extend(extra);
        }
        // 保持声明顺序
        self.functions
            .keys()
            .filter(|name| methods.contains(*name))
            .cloned()
            .collect()
    }
}

/// 把对提升变量的读写改为容器字段访问，把方法函数移出函数体
struct FieldRewriter<'a> {
    activation: ActivationId,
    hoisted: &'a IndexSet<Name>,
    methods: &'a IndexSet<Name>,
    moved: Vec<Function>,
}

impl FieldRewriter<'_> {
    fn field(
        &self,
        name: &Name,
    ) -> FieldRef {
        FieldRef {
            activation: self.activation,
            name: name.clone(),
        }
    }
}

fn take_expr(expr: &mut Expr) -> Expr {
    std::mem::replace(
        expr,
        Expr::Value {
            value: Literal::Void,
            ty: Type::void(),
        },
    )
}

impl MutVisitor for FieldRewriter<'_> {
    fn visit_stmt_mut(
        &mut self,
        stmt: &mut Stmt,
    ) {
        match stmt {
            Stmt::Assign { target, value, .. } if self.hoisted.contains(&*target) => {
                self.visit_expr_mut(value);
                let field = self.field(target);
                let value = take_expr(value);
                *stmt = Stmt::StoreField { field, value };
            }
            Stmt::LocalDecl { name, init, .. } if self.hoisted.contains(&*name) => {
                let field = self.field(name);
                *stmt = match init.take() {
                    Some(mut value) => {
                        self.visit_expr_mut(&mut value);
                        Stmt::StoreField { field, value }
                    }
                    None => Stmt::Block(Vec::new()),
                };
            }
            Stmt::LocalFunction(function) if self.methods.contains(&function.name) => {
                let taken = std::mem::replace(stmt, Stmt::Block(Vec::new()));
                if let Stmt::LocalFunction(mut function) = taken {
                    self.visit_function_mut(&mut function);
                    self.moved.push(*function);
                }
            }
            _ => visit::walk_stmt_mut(self, stmt),
        }
    }

    fn visit_expr_mut(
        &mut self,
        expr: &mut Expr,
    ) {
        match expr {
            Expr::Reference { name, ty } if self.hoisted.contains(&*name) => {
                let replacement = Expr::Field {
                    field: self.field(name),
                    ty: ty.clone(),
                };
                *expr = replacement;
            }
            Expr::Reference { name, ty } if self.methods.contains(&*name) => {
                let replacement = Expr::MethodValue {
                    activation: self.activation,
                    name: name.clone(),
                    ty: ty.clone(),
                };
                *expr = replacement;
            }
            Expr::Call { callee, .. } => {
                if let Callable::Function(name) = callee {
                    if self.methods.contains(&*name) {
                        *callee = Callable::ContainerMethod {
                            activation: self.activation,
                            name: name.clone(),
                        };
                    }
                }
                visit::walk_expr_mut(self, expr);
            }
            _ => visit::walk_expr_mut(self, expr),
        }
    }
}

/// 把 `names` 的读写改为容器 `activation` 上的字段访问（协程跨状态变量复用）
pub(crate) fn rewrite_into_fields(
    activation: ActivationId,
    names: &IndexSet<Name>,
    stmts: &mut [Stmt],
) {
    let no_methods = IndexSet::new();
    let mut rewriter = FieldRewriter {
        activation,
        hoisted: names,
        methods: &no_methods,
        moved: Vec::new(),
    };
    visit::walk_stmts_mut(&mut rewriter, stmts);
}
