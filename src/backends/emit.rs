//! Shared emission walk
//!
//! [`ModuleEmitter`] walks a module top-down exactly once. When it reaches a
//! function it runs the middle passes on that function only: capture
//! analysis, failure lowering, then coroutine lowering for resumable
//! functions. Escape planning happens later still, at each try/recover the
//! walk meets, and only on targets where try/recover is a barrier.
//!
//! The result is an [`EmittedModule`]: target-independent pieces (functions,
//! globals, containers, imports) rendered as [`cst`] fragments, which the
//! per-target backends assemble into files.

use indexmap::IndexSet;
use tracing::{debug, trace};

use crate::backends::cst::{self, Case, Param};
use crate::backends::support::{self, Rendering, Requirement, Resolution, SupportCode};
use crate::backends::{Target, TargetProfile};
use crate::middle::capture;
use crate::middle::coroutine;
use crate::middle::escape;
use crate::middle::failure;
use crate::middle::ir::{self, visit, ActivationId, Callable, FieldRef, Function, Label, Literal, Module, Name, TopLevel, Type};
use crate::middle::names::{MemberKind, NameAllocator};
use crate::middle::session::{LowerOptions, Session};
use crate::util::config::EmitConfig;
use crate::util::diagnostic::{Diagnostic, LowerError, Result};
use crate::util::span::Span;

/// Container member pointing at the enclosing activation
pub const PARENT_MEMBER: &str = "parent_";

/// Target-specific renderings the shared walk delegates to
pub trait Dialect {
    fn target(&self) -> Target;

    fn profile(&self) -> TargetProfile {
        self.target().profile()
    }

    /// Target identifiers the generated code must not shadow
    fn reserved(&self) -> Vec<&str>;

    /// Type of a local, field or parameter
    fn type_name(
        &self,
        ty: &Type,
    ) -> String;

    /// Declared result type of a function
    fn return_type(
        &self,
        ty: &Type,
    ) -> String;

    fn literal(
        &self,
        value: &Literal,
    ) -> String;

    /// Initializer of a declaration the IR leaves uninitialized
    fn zero_value(&self) -> cst::Expr;

    /// Type of a variable holding a container
    fn container_type(
        &self,
        type_name: &str,
    ) -> String;

    fn new_container(
        &self,
        type_name: &str,
    ) -> cst::Expr;

    /// Member of the container `object` refers to
    fn container_member(
        &self,
        object: cst::Expr,
        member: &str,
    ) -> cst::Expr;

    /// Member of `this` inside a container method
    fn this_member(
        &self,
        member: &str,
    ) -> cst::Expr;

    /// `this` as a value that can be stored or captured
    fn this_handle(&self) -> cst::Expr;

    /// Method bound to a container, as a first-class value
    fn method_value(
        &self,
        object: cst::Expr,
        method: &str,
    ) -> cst::Expr;

    /// Method called on a user object
    fn object_member(
        &self,
        object: cst::Expr,
        member: &str,
    ) -> cst::Expr;

    /// Member access used by support renderings
    fn support_member(
        &self,
        object: cst::Expr,
        member: &str,
    ) -> cst::Expr {
        cst::Expr::member(object, member, false)
    }

    /// A non-recursive local function
    fn local_function(
        &self,
        ret: String,
        name: String,
        params: Vec<Param>,
        body: Vec<cst::Stmt>,
    ) -> cst::Stmt;

    /// Leave the function with `failure`
    fn propagate(
        &self,
        failure: cst::Expr,
    ) -> cst::Stmt;

    /// Type caught by a native try/recover
    fn catch_type(&self) -> String;
}

/// A lowered function, ready to place in a file
#[derive(Debug, Clone, PartialEq)]
pub struct EmittedFunction {
    pub name: String,
    pub ret: String,
    pub params: Vec<Param>,
    pub body: Vec<cst::Stmt>,
    pub exported: bool,
}

/// A module-level variable
#[derive(Debug, Clone, PartialEq)]
pub struct EmittedGlobal {
    pub name: String,
    pub ty: String,
    pub exported: bool,
}

/// A capture container type
#[derive(Debug, Clone, PartialEq)]
pub struct EmittedContainer {
    pub type_name: String,
    /// `(type, name)` in declaration order; the parent link comes first when present
    pub fields: Vec<(String, String)>,
    pub methods: Vec<EmittedFunction>,
}

/// Everything a backend needs to lay out one module
#[derive(Debug, Clone, PartialEq)]
pub struct EmittedModule {
    pub path: Vec<String>,
    pub globals: Vec<EmittedGlobal>,
    /// Global initializers and init blocks, in source order
    pub init: Vec<cst::Stmt>,
    pub functions: Vec<EmittedFunction>,
    pub containers: Vec<EmittedContainer>,
    pub requirements: IndexSet<Requirement>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Where an activation is reachable from
#[derive(Debug, Clone, Copy)]
enum Frame {
    /// A function body; `owned` is the container it creates
    Function { owned: Option<ActivationId> },
    /// A container method; `this` is the activation
    Method { activation: ActivationId },
}

#[derive(Debug, Clone, PartialEq)]
enum Reach {
    Local(String),
    /// `this`, then `hops` parent links
    This { hops: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JumpKind {
    Loop,
    Switch,
    Block,
}

/// A construct break/continue can target
#[derive(Debug)]
struct JumpFrame {
    kind: JumpKind,
    label: Option<Label>,
    /// Base of the synthetic goto labels, allocated on first use
    ident: Option<String>,
    break_used: bool,
    continue_used: bool,
}

impl JumpFrame {
    fn new(
        kind: JumpKind,
        label: Option<Label>,
    ) -> Self {
        Self {
            kind,
            label,
            ident: None,
            break_used: false,
            continue_used: false,
        }
    }
}

/// Per-function walk state, saved and restored around nested functions
#[derive(Debug, Default)]
struct FunctionState {
    jumps: Vec<JumpFrame>,
    /// Barrier lambdas the walk is currently inside
    regions: usize,
    return_type: Option<Type>,
}

pub struct ModuleEmitter<'d, D: Dialect> {
    dialect: &'d D,
    profile: TargetProfile,
    session: Session,
    frames: Vec<Frame>,
    state: FunctionState,
    requirements: IndexSet<Requirement>,
}

impl<'d, D: Dialect> ModuleEmitter<'d, D> {
    pub fn new(
        dialect: &'d D,
        module: &Module,
        config: &EmitConfig,
    ) -> Self {
        let profile = dialect.profile();
        let mut names = NameAllocator::new(profile.keywords, profile.local_style);
        for reserved in dialect.reserved() {
            names.reserve(reserved);
        }
        let options = LowerOptions {
            try_is_barrier: profile.try_is_barrier,
            capture: config.capture.clone(),
        };
        Self {
            dialect,
            profile,
            session: Session::new(module, names, options),
            frames: Vec::new(),
            state: FunctionState::default(),
            requirements: IndexSet::new(),
        }
    }

    /// Emit the whole module
    pub fn emit(
        mut self,
        module: &Module,
    ) -> Result<EmittedModule> {
        debug!(
            "emit: {} for {}, {} top-level(s)",
            module.path.join("."),
            self.dialect.target(),
            module.top_levels.len()
        );
        self.declare_top_levels(module);

        let mut globals = Vec::new();
        let mut init = Vec::new();
        let mut functions = Vec::new();
        for top in &module.top_levels {
            match top {
                TopLevel::Function(function) => {
                    let name = self.session.names.ident(&function.name);
                    functions.push(self.function(function.clone(), name, None)?);
                }
                TopLevel::Declaration(decl) => {
                    let name = self.session.names.ident(&decl.name);
                    globals.push(EmittedGlobal {
                        name: name.clone(),
                        ty: self.dialect.type_name(&decl.ty),
                        exported: decl.exported,
                    });
                    if let Some(value) = &decl.init {
                        let value = self.expr(value)?;
                        init.push(cst::Stmt::Assign {
                            target: cst::Expr::Ident(name),
                            value,
                        });
                    }
                }
                TopLevel::Init(block) => {
                    let body = self.init_block(block.body.clone())?;
                    if !body.is_empty() {
                        init.push(cst::Stmt::Block(body));
                    }
                }
            }
        }

        let containers = self.containers()?;
        Ok(EmittedModule {
            path: module.path.clone(),
            globals,
            init,
            functions,
            containers,
            requirements: self.requirements,
            diagnostics: self.session.take_diagnostics(),
        })
    }

    /// Module-level names are visible everywhere, so they claim identifiers first
    fn declare_top_levels(
        &mut self,
        module: &Module,
    ) {
        for top in &module.top_levels {
            match top {
                TopLevel::Function(function) => {
                    self.session
                        .names
                        .declare_styled(&function.name, self.profile.function_style);
                }
                TopLevel::Declaration(decl) => {
                    self.session.names.declare(&decl.name);
                }
                TopLevel::Init(_) => {}
            }
        }
    }

    fn init_block(
        &mut self,
        mut body: Vec<ir::Stmt>,
    ) -> Result<Vec<cst::Stmt>> {
        let owner = self.session.temporary("init");
        let plan = capture::analyze_scope(&owner, &[], &mut body, &mut self.session);
        let body = failure::lower_body(body, &mut self.session)?;
        let saved = std::mem::take(&mut self.state);
        self.state.return_type = Some(Type::void());
        self.session.names.push_scope();
        let out = self.scoped_body(plan.activation, body);
        self.session.names.pop_scope();
        self.state = saved;
        out
    }

    /// Lower and emit one function; `method_of` is set for container methods
    fn function(
        &mut self,
        mut function: Function,
        name: String,
        method_of: Option<ActivationId>,
    ) -> Result<EmittedFunction> {
        trace!("emit: function {}", function.name);
        coroutine::check_plain(&function)?;
        if let Some(id) = method_of {
            self.frames.push(Frame::Method { activation: id });
            self.session.enter_activation(id);
        }

        self.session.names.push_scope();
        let params = function
            .params
            .iter()
            .map(|param| Param {
                ty: self.dialect.type_name(&param.ty),
                name: self.session.names.declare(&param.name),
            })
            .collect();

        let plan = capture::analyze(&mut function, &mut self.session);
        function.body = failure::lower_body(std::mem::take(&mut function.body), &mut self.session)?;
        let owned = if function.is_resumable() {
            let resumable = coroutine::lower(&mut function, plan.activation, &mut self.session)?;
            debug!(
                "emit: {} became a {}-case state machine",
                function.name, resumable.case_count
            );
            Some(resumable.activation)
        } else {
            plan.activation
        };

        let saved = std::mem::take(&mut self.state);
        self.state.return_type = Some(function.return_type.clone());
        let body = self.scoped_body(owned, function.body);
        self.state = saved;
        self.session.names.pop_scope();

        if method_of.is_some() {
            self.session.exit_activation();
            self.frames.pop();
        }
        Ok(EmittedFunction {
            name,
            ret: self.dialect.return_type(&function.return_type),
            params,
            body: body?,
            exported: function.exported,
        })
    }

    /// Body of a function or init block that may own a container
    fn scoped_body(
        &mut self,
        owned: Option<ActivationId>,
        body: Vec<ir::Stmt>,
    ) -> Result<Vec<cst::Stmt>> {
        let mut out = Vec::new();
        if let Some(id) = owned {
            out.extend(self.create_container(id)?);
            self.session.enter_activation(id);
        }
        self.frames.push(Frame::Function { owned });
        let result = self.stmts(&body, &mut out);
        self.frames.pop();
        if owned.is_some() {
            self.session.exit_activation();
        }
        result.map(|()| out)
    }

    fn create_container(
        &mut self,
        id: ActivationId,
    ) -> Result<Vec<cst::Stmt>> {
        let activation = self.session.arena.get(id)?;
        let (instance, type_name, parent) = (
            activation.instance.clone(),
            activation.type_name.clone(),
            activation.parent,
        );
        let type_ident = self.type_ident(&type_name);
        let instance = self.session.names.declare(&instance);
        let mut out = vec![cst::Stmt::Decl {
            ty: self.dialect.container_type(&type_ident),
            name: instance.clone(),
            init: Some(self.dialect.new_container(&type_ident)),
        }];
        if let Some(parent) = parent {
            let value = self.activation_handle(parent)?;
            out.push(cst::Stmt::Assign {
                target: self
                    .dialect
                    .container_member(cst::Expr::Ident(instance), PARENT_MEMBER),
                value,
            });
        }
        Ok(out)
    }

    /// Emit container types, lowering their methods; the pool may grow meanwhile
    fn containers(&mut self) -> Result<Vec<EmittedContainer>> {
        let mut methods: Vec<Vec<EmittedFunction>> = Vec::new();
        let mut index = 0;
        while index < self.session.arena.len() {
            let id = ActivationId(index);
            let pending: Vec<Function> = self.session.arena.get(id)?.methods.values().cloned().collect();
            let mut emitted = Vec::with_capacity(pending.len());
            for method in pending {
                let name = self.method_ident(id, &method.name)?;
                let saved = std::mem::take(&mut self.frames);
                let result = self.function(method, name, Some(id));
                self.frames = saved;
                emitted.push(result?);
            }
            methods.push(emitted);
            index += 1;
        }

        let mut containers = Vec::with_capacity(methods.len());
        for (index, methods) in methods.into_iter().enumerate() {
            let id = ActivationId(index);
            let activation = self.session.arena.get(id)?;
            let type_name = self.type_ident(&activation.type_name);
            let parent = activation.parent;
            let declared: Vec<(Name, Type)> = activation
                .fields
                .values()
                .map(|field| (field.name.clone(), field.ty.clone()))
                .collect();

            let mut fields = Vec::new();
            if let Some(parent) = parent {
                let parent_type = self.session.arena.get(parent)?.type_name.clone();
                fields.push((
                    self.dialect.container_type(&self.type_ident(&parent_type)),
                    PARENT_MEMBER.to_string(),
                ));
            }
            for (name, ty) in declared {
                fields.push((self.dialect.type_name(&ty), self.field_ident(id, &name)?));
            }
            containers.push(EmittedContainer {
                type_name,
                fields,
                methods,
            });
        }
        Ok(containers)
    }

    // ---- identifiers ----

    fn type_ident(
        &self,
        name: &Name,
    ) -> String {
        self.session.names.member(name, self.profile.type_style)
    }

    fn field_ident(
        &mut self,
        id: ActivationId,
        name: &Name,
    ) -> Result<String> {
        self.member_ident(id, MemberKind::Field, name)
    }

    fn method_ident(
        &mut self,
        id: ActivationId,
        name: &Name,
    ) -> Result<String> {
        self.member_ident(id, MemberKind::Method, name)
    }

    /// The stored identifier of a container member; unknown members are contract violations
    fn member_ident(
        &mut self,
        id: ActivationId,
        kind: MemberKind,
        name: &Name,
    ) -> Result<String> {
        self.allocate_members(id)?;
        self.session
            .arena
            .get(id)?
            .members
            .lookup(kind, name)
            .map(str::to_string)
            .ok_or_else(|| LowerError::UnhoistedField {
                activation: id.0,
                member: name.to_string(),
            })
    }

    /// Give every field and method of a container its identifier, in declaration order
    fn allocate_members(
        &mut self,
        id: ActivationId,
    ) -> Result<()> {
        let (field_style, method_style) = (self.profile.member_style, self.profile.function_style);
        let Session { names, arena, .. } = &mut self.session;
        let activation = arena.get_mut(id)?;
        let members = &mut activation.members;
        members.reserve(PARENT_MEMBER);
        for name in activation.fields.keys() {
            names.allocate_member(members, MemberKind::Field, name, field_style);
        }
        for name in activation.methods.keys() {
            names.allocate_member(members, MemberKind::Method, name, method_style);
        }
        Ok(())
    }

    // ---- activations ----

    fn reach(
        &self,
        id: ActivationId,
    ) -> Result<Reach> {
        for frame in self.frames.iter().rev() {
            match *frame {
                Frame::Function { owned: Some(owned) } if owned == id => {
                    let instance = &self.session.arena.get(id)?.instance;
                    let ident = self
                        .session
                        .names
                        .lookup(instance)
                        .ok_or(LowerError::UnknownActivation(id.0))?;
                    return Ok(Reach::Local(ident.to_string()));
                }
                Frame::Function { .. } => {}
                Frame::Method { activation } => {
                    let mut current = Some(activation);
                    let mut hops = 0;
                    while let Some(candidate) = current {
                        if candidate == id {
                            return Ok(Reach::This { hops });
                        }
                        current = self.session.arena.get(candidate)?.parent;
                        hops += 1;
                    }
                    return Err(LowerError::UnknownActivation(id.0));
                }
            }
        }
        Err(LowerError::UnknownActivation(id.0))
    }

    /// `this` followed by `hops` parent links
    fn parent_chain(
        &self,
        hops: usize,
    ) -> cst::Expr {
        let mut object = self.dialect.this_member(PARENT_MEMBER);
        for _ in 1..hops {
            object = self.dialect.container_member(object, PARENT_MEMBER);
        }
        object
    }

    fn activation_member(
        &self,
        id: ActivationId,
        member: &str,
    ) -> Result<cst::Expr> {
        Ok(match self.reach(id)? {
            Reach::Local(ident) => self
                .dialect
                .container_member(cst::Expr::Ident(ident), member),
            Reach::This { hops: 0 } => self.dialect.this_member(member),
            Reach::This { hops } => self.dialect.container_member(self.parent_chain(hops), member),
        })
    }

    fn activation_handle(
        &self,
        id: ActivationId,
    ) -> Result<cst::Expr> {
        Ok(match self.reach(id)? {
            Reach::Local(ident) => cst::Expr::Ident(ident),
            Reach::This { hops: 0 } => self.dialect.this_handle(),
            Reach::This { hops } => self.parent_chain(hops),
        })
    }

    fn field(
        &mut self,
        field: &FieldRef,
    ) -> Result<cst::Expr> {
        let ident = self.field_ident(field.activation, &field.name)?;
        self.activation_member(field.activation, &ident)
    }

    // ---- statements ----

    fn stmts(
        &mut self,
        stmts: &[ir::Stmt],
        out: &mut Vec<cst::Stmt>,
    ) -> Result<()> {
        for stmt in stmts {
            self.stmt(stmt, out)?;
        }
        Ok(())
    }

    fn block(
        &mut self,
        stmts: &[ir::Stmt],
    ) -> Result<Vec<cst::Stmt>> {
        let mut out = Vec::new();
        self.stmts(stmts, &mut out)?;
        Ok(out)
    }

    fn stmt(
        &mut self,
        stmt: &ir::Stmt,
        out: &mut Vec<cst::Stmt>,
    ) -> Result<()> {
        use ir::Stmt as S;
        match stmt {
            S::Assign { target, value, .. } => {
                let value = self.expr(value)?;
                out.push(cst::Stmt::Assign {
                    target: cst::Expr::Ident(self.session.names.ident(target)),
                    value,
                });
            }
            S::Block(inner) if inner.is_empty() => {}
            S::Block(inner) => {
                let declares = inner
                    .iter()
                    .any(|s| matches!(s, S::LocalDecl { .. } | S::LocalFunction(_)));
                let body = self.block(inner)?;
                if declares {
                    out.push(cst::Stmt::Block(body));
                } else {
                    out.extend(body);
                }
            }
            S::Break { label, span } => out.push(self.jump(JumpKind::Block, label.as_ref(), *span)?),
            S::Continue { label, span } => out.push(self.jump(JumpKind::Loop, label.as_ref(), *span)?),
            S::Expr(expr) if escape::is_failure(expr) => out.push(self.propagate(expr)?),
            S::Expr(expr) => out.push(cst::Stmt::Expr(self.expr(expr)?)),
            S::Labeled { label, body } => self.labeled(label, body, out)?,
            S::LocalDecl { name, ty, init, .. } => {
                let init = match init {
                    Some(value) => self.expr(value)?,
                    None => self.dialect.zero_value(),
                };
                out.push(cst::Stmt::Decl {
                    ty: self.dialect.type_name(ty),
                    name: self.session.names.declare(name),
                    init: Some(init),
                });
            }
            S::LocalFunction(function) => out.push(self.local_function(function)?),
            S::InitFailed { span } => {
                out.push(self.propagate(&ir::Expr::FailureSentinel { ty: Type::void() })?);
                trace!("emit: init failure at {}", span);
            }
            S::Return { value: None, .. } => out.push(cst::Stmt::Return(None)),
            S::Return {
                value: Some(value), ..
            } if escape::is_failure(value) => out.push(self.propagate(value)?),
            S::Return {
                value: Some(value), ..
            } => out.push(cst::Stmt::Return(Some(self.expr(value)?))),
            S::While { cond, body, .. } => self.while_loop(None, cond, body, out)?,
            S::If {
                cond,
                then,
                otherwise,
                ..
            } => {
                let cond = self.expr(cond)?;
                let then = self.block(then)?;
                let otherwise = self.block(otherwise)?;
                out.push(cst::Stmt::If {
                    cond,
                    then,
                    otherwise,
                });
            }
            S::Try {
                body,
                recover,
                span,
            } => {
                if self.profile.try_is_barrier {
                    let return_type = self.state.return_type.clone().unwrap_or_else(Type::void);
                    let lowered = escape::lower_region(
                        body.clone(),
                        recover.clone(),
                        *span,
                        &return_type,
                        &mut self.session,
                    );
                    for stmt in &lowered {
                        match stmt {
                            S::Try { body, recover, .. } => out.push(self.try_recover(body, recover)?),
                            other => self.stmt(other, out)?,
                        }
                    }
                } else {
                    out.push(self.try_recover(body, recover)?);
                }
            }
            S::Yield { span, .. } => {
                self.session.unimplemented("yield outside a state machine", *span);
                out.push(cst::Stmt::Placeholder("yield".to_string()));
            }
            S::StoreField { field, value } => {
                let value = self.expr(value)?;
                out.push(cst::Stmt::Assign {
                    target: self.field(field)?,
                    value,
                });
            }
            S::Switch {
                subject,
                cases,
                default,
            } => {
                let subject = self.expr(subject)?;
                self.state.jumps.push(JumpFrame::new(JumpKind::Switch, None));
                let mut emitted = Vec::with_capacity(cases.len());
                for case in cases {
                    emitted.push(Case {
                        value: case.value,
                        body: self.block(&case.body)?,
                    });
                }
                let default = self.block(default)?;
                self.state.jumps.pop();
                out.push(cst::Stmt::Switch {
                    subject,
                    cases: emitted,
                    default,
                });
            }
            S::ExitRegion { region } => {
                if self.state.regions > 0 {
                    out.push(cst::Stmt::Return(Some(cst::Expr::Literal("false".to_string()))));
                } else {
                    out.push(self.jump(JumpKind::Block, Some(region), Span::dummy())?);
                }
            }
            S::Unimplemented { what, .. } => out.push(cst::Stmt::Placeholder(what.clone())),
        }
        Ok(())
    }

    fn labeled(
        &mut self,
        label: &Label,
        body: &ir::Stmt,
        out: &mut Vec<cst::Stmt>,
    ) -> Result<()> {
        match body {
            ir::Stmt::While { cond, body, .. } => self.while_loop(Some(label), cond, body, out),
            other => {
                self.state
                    .jumps
                    .push(JumpFrame::new(JumpKind::Block, Some(label.clone())));
                let result = match other {
                    // escape planning already ran on this region
                    ir::Stmt::Try { body, recover, .. } => {
                        self.try_recover(body, recover).map(|stmt| out.push(stmt))
                    }
                    other => self.stmt(other, out),
                };
                let frame = self.state.jumps.pop();
                result?;
                if let Some(frame) = frame.filter(|f| f.break_used) {
                    out.push(cst::Stmt::Label(break_label(&frame)));
                }
                Ok(())
            }
        }
    }

    fn while_loop(
        &mut self,
        label: Option<&Label>,
        cond: &ir::Expr,
        body: &[ir::Stmt],
        out: &mut Vec<cst::Stmt>,
    ) -> Result<()> {
        let cond = self.expr(cond)?;
        self.state
            .jumps
            .push(JumpFrame::new(JumpKind::Loop, label.cloned()));
        let result = self.block(body);
        let frame = self.state.jumps.pop();
        let mut body = result?;
        let Some(frame) = frame else {
            return Ok(());
        };
        if frame.continue_used {
            // body declarations must be out of scope at the continue label
            body = vec![
                cst::Stmt::Block(body),
                cst::Stmt::Label(continue_label(&frame)),
            ];
        }
        out.push(cst::Stmt::While { cond, body });
        if frame.break_used {
            out.push(cst::Stmt::Label(break_label(&frame)));
        }
        Ok(())
    }

    /// Render break (`kind == Block`) or continue (`kind == Loop`)
    fn jump(
        &mut self,
        kind: JumpKind,
        label: Option<&Label>,
        span: Span,
    ) -> Result<cst::Stmt> {
        let is_break = kind == JumpKind::Block;
        let what = if is_break { "break" } else { "continue" };
        let target = match label {
            None => self
                .state
                .jumps
                .iter()
                .rposition(|f| f.kind == JumpKind::Loop)
                .ok_or(LowerError::JumpOutsideLoop { kind: what, span })?,
            Some(label) => self
                .state
                .jumps
                .iter()
                .rposition(|f| f.label.as_ref() == Some(label))
                .ok_or_else(|| LowerError::UnboundLabel {
                    kind: what,
                    label: label.to_string(),
                    span,
                })?,
        };
        let between = &self.state.jumps[target + 1..];
        let frame = &self.state.jumps[target];
        let native = if is_break {
            frame.kind == JumpKind::Loop && between.is_empty()
        } else {
            if frame.kind != JumpKind::Loop {
                return Err(LowerError::UnboundLabel {
                    kind: what,
                    label: label.map(ToString::to_string).unwrap_or_default(),
                    span,
                });
            }
            between.iter().all(|f| f.kind != JumpKind::Loop)
        };
        if native {
            return Ok(if is_break {
                cst::Stmt::Break
            } else {
                cst::Stmt::Continue
            });
        }

        if self.state.jumps[target].ident.is_none() {
            let base = match &self.state.jumps[target].label {
                Some(label) => self.session.names.ident(label),
                None => {
                    let synthetic = self.session.temporary("loop");
                    self.session.names.declare(&synthetic)
                }
            };
            self.state.jumps[target].ident = Some(base);
        }
        let frame = &mut self.state.jumps[target];
        if is_break {
            frame.break_used = true;
            Ok(cst::Stmt::Goto(break_label(frame)))
        } else {
            frame.continue_used = true;
            Ok(cst::Stmt::Goto(continue_label(frame)))
        }
    }

    fn try_recover(
        &mut self,
        body: &[ir::Stmt],
        recover: &[ir::Stmt],
    ) -> Result<cst::Stmt> {
        if !self.profile.try_is_barrier {
            let body = self.block(body)?;
            let handler = self.block(recover)?;
            return Ok(cst::Stmt::TryCatch {
                body,
                catch: self.dialect.catch_type(),
                handler,
            });
        }

        // region bodies run in callbacks that return true on failure
        self.state.regions += 1;
        let lambdas = self
            .region_lambda(body)
            .and_then(|body| Ok((body, self.region_lambda(recover)?)));
        self.state.regions -= 1;
        let (body, handler) = lambdas?;
        let call = self.connected(support::FAILURE_RECOVER, vec![body, handler]);
        if may_fail(recover) {
            Ok(cst::Stmt::If {
                cond: call,
                then: vec![self.propagate(&ir::Expr::FailureSentinel { ty: Type::void() })?],
                otherwise: Vec::new(),
            })
        } else {
            Ok(cst::Stmt::Expr(call))
        }
    }

    fn region_lambda(
        &mut self,
        stmts: &[ir::Stmt],
    ) -> Result<cst::Expr> {
        let mut body = self.block(stmts)?;
        if !cst::ends_in_jump(&body) {
            body.push(cst::Stmt::Return(Some(cst::Expr::Literal("false".to_string()))));
        }
        Ok(cst::Expr::Lambda {
            captures: Some("&".to_string()),
            params: Vec::new(),
            ret: Some("bool".to_string()),
            body,
        })
    }

    /// Leave with the failure `value` describes
    fn propagate(
        &mut self,
        value: &ir::Expr,
    ) -> Result<cst::Stmt> {
        if self.state.regions > 0 {
            return Ok(cst::Stmt::Return(Some(cst::Expr::Literal("true".to_string()))));
        }
        let failure = self.expr(value)?;
        Ok(self.dialect.propagate(failure))
    }

    fn local_function(
        &mut self,
        function: &Function,
    ) -> Result<cst::Stmt> {
        let name = self.session.names.declare(&function.name);
        let saved = std::mem::take(&mut self.state);
        let result = self.function(function.clone(), name, None);
        self.state = saved;
        let emitted = result?;
        Ok(self
            .dialect
            .local_function(emitted.ret, emitted.name, emitted.params, emitted.body))
    }

    // ---- expressions ----

    fn exprs(
        &mut self,
        exprs: &[ir::Expr],
    ) -> Result<Vec<cst::Expr>> {
        exprs.iter().map(|e| self.expr(e)).collect()
    }

    fn expr(
        &mut self,
        expr: &ir::Expr,
    ) -> Result<cst::Expr> {
        use ir::Expr as E;
        Ok(match expr {
            E::Call { callee, args, .. } => {
                let args = self.exprs(args)?;
                let callee = match callee {
                    Callable::Function(name) => cst::Expr::Ident(self.session.names.ident(name)),
                    Callable::Method { subject, method } => {
                        let subject = self.expr(subject)?;
                        let method = self.profile.function_style.convert(method);
                        self.dialect.object_member(subject, &method)
                    }
                    Callable::ContainerMethod { activation, name } => {
                        let ident = self.method_ident(*activation, name)?;
                        self.activation_member(*activation, &ident)?
                    }
                };
                cst::Expr::call(callee, args)
            }
            E::Reference { name, .. } => cst::Expr::Ident(self.session.names.ident(name)),
            E::Value { value, .. } => cst::Expr::Literal(self.dialect.literal(value)),
            E::FailureSentinel { .. } => self.connected(support::FAILURE_NEW, Vec::new()),
            E::Support { op, args, .. } => {
                let types: Vec<Type> = args.iter().map(ir::Expr::ty).collect();
                let rendered = self.exprs(args)?;
                match support::resolve_operator(self.dialect.target(), *op, &types) {
                    Resolution::Found(rendering) => self.apply(rendering, rendered),
                    Resolution::NotFound => self.unresolved(&op.to_string()),
                }
            }
            E::Connected { key, args, .. } => {
                let args = self.exprs(args)?;
                self.connected(key, args)
            }
            E::HandlerScope { .. } => {
                self.session
                    .unimplemented("failure guard outside an assignment", Span::dummy());
                cst::Expr::Placeholder("failure guard".to_string())
            }
            E::Await { .. } => {
                self.session
                    .unimplemented("await outside a state machine", Span::dummy());
                cst::Expr::Placeholder("await".to_string())
            }
            E::Field { field, .. } => self.field(field)?,
            E::MethodValue { activation, name, .. } => {
                let ident = self.method_ident(*activation, name)?;
                let object = self.activation_handle(*activation)?;
                self.dialect.method_value(object, &ident)
            }
            E::Attempt { call, .. } => {
                let call = self.expr(call)?;
                self.connected(support::FAILURE_ATTEMPT, vec![call])
            }
            E::IsFailure { holder } => {
                let holder = self.expr(holder)?;
                self.connected(support::FAILURE_IS_FAILURE, vec![holder])
            }
            E::Unwrap { holder, .. } => {
                let holder = self.expr(holder)?;
                self.connected(support::FAILURE_UNWRAP, vec![holder])
            }
            E::Propagate { holder, .. } => {
                let holder = self.expr(holder)?;
                self.connected(support::FAILURE_PROPAGATE, vec![holder])
            }
            E::Unimplemented { what, .. } => cst::Expr::Placeholder(what.clone()),
        })
    }

    fn connected(
        &mut self,
        key: &str,
        args: Vec<cst::Expr>,
    ) -> cst::Expr {
        match support::resolve_connected(self.dialect.target(), key) {
            Resolution::Found(rendering) => self.apply(rendering, args),
            Resolution::NotFound => self.unresolved(key),
        }
    }

    fn unresolved(
        &mut self,
        what: &str,
    ) -> cst::Expr {
        let message = format!("no {} rendering for `{}`", self.dialect.target(), what);
        self.session
            .note(Diagnostic::unresolved_support(message.clone(), None));
        cst::Expr::Placeholder(message)
    }

    fn apply(
        &mut self,
        rendering: Rendering,
        args: Vec<cst::Expr>,
    ) -> cst::Expr {
        if let Some(requirement) = rendering.requires {
            self.requirements.insert(requirement);
        }
        let mut args = args.into_iter();
        match rendering.code {
            SupportCode::Infix(op) => {
                let left = operand(&mut args);
                args.fold(left, |left, right| cst::Expr::Infix {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                })
            }
            SupportCode::Prefix(op) => cst::Expr::Prefix {
                op,
                operand: Box::new(operand(&mut args)),
            },
            SupportCode::Call(path) => cst::Expr::call(cst::Expr::ident(path), args.collect()),
            SupportCode::Member(name) => {
                let object = operand(&mut args);
                self.dialect.support_member(object, name)
            }
            SupportCode::MethodCall(name) => {
                let object = operand(&mut args);
                let callee = self.dialect.support_member(object, name);
                cst::Expr::call(callee, args.collect())
            }
            SupportCode::Template(pattern) => cst::Expr::Template {
                pattern: pattern.to_string(),
                args: args.collect(),
            },
        }
    }
}

fn operand(args: &mut impl Iterator<Item = cst::Expr>) -> cst::Expr {
    args.next()
        .unwrap_or_else(|| cst::Expr::Placeholder("missing operand".to_string()))
}

fn break_label(frame: &JumpFrame) -> String {
    format!("{}_break", frame.ident.as_deref().unwrap_or("block"))
}

fn continue_label(frame: &JumpFrame) -> String {
    format!("{}_continue", frame.ident.as_deref().unwrap_or("loop"))
}

/// Whether a recover block can itself fail outward
fn may_fail(stmts: &[ir::Stmt]) -> bool {
    struct Finder(bool);

    impl visit::Visitor for Finder {
        fn visit_stmt(
            &mut self,
            stmt: &ir::Stmt,
        ) {
            match stmt {
                ir::Stmt::Return {
                    value: Some(value), ..
                }
                | ir::Stmt::Expr(value)
                    if escape::is_failure(value) =>
                {
                    self.0 = true
                }
                ir::Stmt::InitFailed { .. } => self.0 = true,
                // a nested body's failures land in its own recover block
                ir::Stmt::Try { recover, .. } => visit::walk_stmts(self, recover),
                _ => visit::walk_stmt(self, stmt),
            }
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

#[cfg(test)]
mod tests;
