//! 测试辅助
//!
//! 会话构造，以及一个只覆盖测试所需子集的参考解释器。解释器有两种模式：
//!
//! - 源语义：闭包按引用共享外层变量；
//! - 降级语义：闭包按值拷贝外层变量，只有捕获容器是共享的。
//!
//! 捕获分析正确，当且仅当同一程序在源语义下和降级后在降级语义下打印相同序列。

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::middle::capture::{self, ActivationArena};
use crate::middle::ir::builder::module;
use crate::middle::ir::*;
use crate::middle::names::{keywords, IdentStyle, NameAllocator};
use crate::middle::session::{LowerOptions, Session};

/// try/recover 为边界的会话（C++ 语义）
pub(crate) fn barrier_session() -> Session {
    Session::new(
        &module(&["test"], vec![]),
        NameAllocator::new(&keywords::CPP, IdentStyle::Snake),
        LowerOptions {
            try_is_barrier: true,
            ..LowerOptions::default()
        },
    )
}

/// 普通会话（C# 语义）
pub(crate) fn plain_session() -> Session {
    Session::new(
        &module(&["test"], vec![]),
        NameAllocator::new(&keywords::CSHARP, IdentStyle::Camel),
        LowerOptions::default(),
    )
}

/// 递归地对函数、其局部函数与生成的容器方法做捕获降级
pub(crate) fn lower_captures(
    function: &mut Function,
    session: &mut Session,
    owners: &mut HashMap<Name, ActivationId>,
) {
    let plan = capture::analyze(function, session);
    if let Some(id) = plan.activation {
        owners.insert(function.name.clone(), id);
        session.enter_activation(id);
    }
    lower_local_functions(&mut function.body, session, owners);
    if let Some(id) = plan.activation {
        for name in &plan.methods {
            let mut method = session.arena.method(id, name).unwrap().clone();
            lower_captures(&mut method, session, owners);
            session.arena.get_mut(id).unwrap().methods.insert(name.clone(), method);
        }
        session.exit_activation();
    }
}

fn lower_local_functions(
    stmts: &mut [Stmt],
    session: &mut Session,
    owners: &mut HashMap<Name, ActivationId>,
) {
    for stmt in stmts {
        match stmt {
            Stmt::LocalFunction(function) => lower_captures(function, session, owners),
            Stmt::Block(inner) => lower_local_functions(inner, session, owners),
            Stmt::Labeled { body, .. } => {
                lower_local_functions(std::slice::from_mut(body.as_mut()), session, owners)
            }
            Stmt::While { body, .. } => lower_local_functions(body, session, owners),
            Stmt::If {
                then, otherwise, ..
            } => {
                lower_local_functions(then, session, owners);
                lower_local_functions(otherwise, session, owners);
            }
            Stmt::Try { body, recover, .. } => {
                lower_local_functions(body, session, owners);
                lower_local_functions(recover, session, owners);
            }
            _ => {}
        }
    }
}

type Cell = Rc<RefCell<Value>>;
type Container = Rc<RefCell<HashMap<Name, Value>>>;

#[derive(Debug, Clone)]
pub(crate) enum Value {
    Int(i64),
    Bool(bool),
    Str(String),
    Void,
    Null,
    Closure(Rc<Closure>),
}

impl Value {
    fn int(&self) -> i64 {
        match self {
            Value::Int(v) => *v,
            other => panic!("expected int, got {:?}", other),
        }
    }

    fn truthy(&self) -> bool {
        match self {
            Value::Bool(v) => *v,
            other => panic!("expected bool, got {:?}", other),
        }
    }

    fn show(&self) -> String {
        match self {
            Value::Int(v) => v.to_string(),
            Value::Bool(v) => v.to_string(),
            Value::Str(v) => v.clone(),
            Value::Void => "void".to_string(),
            Value::Null => "null".to_string(),
            Value::Closure(_) => "<fn>".to_string(),
        }
    }
}

#[derive(Debug)]
pub(crate) struct Closure {
    function: Function,
    captured: Scope,
}

#[derive(Debug, Clone, Default)]
struct Scope {
    vars: HashMap<Name, Cell>,
    containers: HashMap<ActivationId, Container>,
}

impl Scope {
    /// 按值拷贝变量；容器仍共享
    fn snapshot(&self) -> Scope {
        Scope {
            vars: self
                .vars
                .iter()
                .map(|(name, cell)| (name.clone(), Rc::new(RefCell::new(cell.borrow().clone()))))
                .collect(),
            containers: self.containers.clone(),
        }
    }
}

enum Flow {
    Normal,
    Break(Option<Label>),
    Continue(Option<Label>),
    Return(Value),
}

pub(crate) struct Interpreter<'a> {
    globals: HashMap<Name, Function>,
    arena: Option<&'a ActivationArena>,
    owners: HashMap<Name, ActivationId>,
    pub(crate) output: Vec<String>,
}

impl<'a> Interpreter<'a> {
    /// 源语义
    pub(crate) fn source(functions: &[Function]) -> Self {
        Self {
            globals: functions.iter().map(|f| (f.name.clone(), f.clone())).collect(),
            arena: None,
            owners: HashMap::new(),
            output: Vec::new(),
        }
    }

    /// 降级语义
    pub(crate) fn lowered(
        functions: &[Function],
        arena: &'a ActivationArena,
        owners: HashMap<Name, ActivationId>,
    ) -> Self {
        Self {
            arena: Some(arena),
            owners,
            ..Self::source(functions)
        }
    }

    fn copies_captures(&self) -> bool {
        self.arena.is_some()
    }

    pub(crate) fn run(
        mut self,
        entry: &str,
    ) -> Vec<String> {
        let function = self.globals[&Name::stable(entry)].clone();
        self.call(&function, Scope::default(), Vec::new());
        self.output
    }

    fn call(
        &mut self,
        function: &Function,
        captured: Scope,
        args: Vec<Value>,
    ) -> Value {
        let mut scope = captured;
        for (param, arg) in function.params.iter().zip(args) {
            scope.vars.insert(param.name.clone(), Rc::new(RefCell::new(arg)));
        }
        if let Some(id) = self.owners.get(&function.name) {
            scope.containers.insert(*id, Rc::default());
        }
        match self.exec_block(&function.body, &mut scope) {
            Flow::Return(value) => value,
            _ => Value::Void,
        }
    }

    fn exec_block(
        &mut self,
        stmts: &[Stmt],
        scope: &mut Scope,
    ) -> Flow {
        for stmt in stmts {
            match self.exec(stmt, scope) {
                Flow::Normal => {}
                other => return other,
            }
        }
        Flow::Normal
    }

    fn exec_loop(
        &mut self,
        label: Option<&Label>,
        cond: &Expr,
        body: &[Stmt],
        scope: &mut Scope,
    ) -> Flow {
        while self.eval(cond, scope).truthy() {
            match self.exec_block(body, scope) {
                Flow::Normal | Flow::Continue(None) => {}
                Flow::Break(None) => break,
                Flow::Continue(Some(l)) if Some(&l) == label => {}
                Flow::Break(Some(l)) if Some(&l) == label => break,
                other => return other,
            }
        }
        Flow::Normal
    }

    fn exec(
        &mut self,
        stmt: &Stmt,
        scope: &mut Scope,
    ) -> Flow {
        match stmt {
            Stmt::Assign { target, value, .. } => {
                let value = self.eval(value, scope);
                *scope.vars[target].borrow_mut() = value;
            }
            Stmt::Block(stmts) => return self.exec_block(stmts, scope),
            Stmt::Break { label, .. } => return Flow::Break(label.clone()),
            Stmt::Continue { label, .. } => return Flow::Continue(label.clone()),
            Stmt::Expr(expr) => {
                self.eval(expr, scope);
            }
            Stmt::Labeled { label, body } => {
                if let Stmt::While { cond, body, .. } = body.as_ref() {
                    return self.exec_loop(Some(label), cond, body, scope);
                }
                return match self.exec(body, scope) {
                    Flow::Break(Some(l)) if &l == label => Flow::Normal,
                    other => other,
                };
            }
            Stmt::LocalDecl { name, init, .. } => {
                let value = match init {
                    Some(init) => self.eval(init, scope),
                    None => Value::Void,
                };
                scope.vars.insert(name.clone(), Rc::new(RefCell::new(value)));
            }
            Stmt::LocalFunction(function) => {
                let cell: Cell = Rc::new(RefCell::new(Value::Void));
                scope.vars.insert(function.name.clone(), cell.clone());
                let captured = if self.copies_captures() {
                    scope.snapshot()
                } else {
                    scope.clone()
                };
                *cell.borrow_mut() = Value::Closure(Rc::new(Closure {
                    function: (**function).clone(),
                    captured,
                }));
            }
            Stmt::Return { value, .. } => {
                let value = match value {
                    Some(value) => self.eval(value, scope),
                    None => Value::Void,
                };
                return Flow::Return(value);
            }
            Stmt::While { cond, body, .. } => return self.exec_loop(None, cond, body, scope),
            Stmt::If {
                cond,
                then,
                otherwise,
                ..
            } => {
                return if self.eval(cond, scope).truthy() {
                    self.exec_block(then, scope)
                } else {
                    self.exec_block(otherwise, scope)
                };
            }
            Stmt::StoreField { field, value } => {
                let value = self.eval(value, scope);
                scope.containers[&field.activation]
                    .borrow_mut()
                    .insert(field.name.clone(), value);
            }
            other => panic!("interpreter does not support {:?}", other),
        }
        Flow::Normal
    }

    fn method_scope(scope: &Scope) -> Scope {
        Scope {
            vars: HashMap::new(),
            containers: scope.containers.clone(),
        }
    }

    fn callee(
        &mut self,
        callee: &Callable,
        scope: &Scope,
    ) -> Rc<Closure> {
        match callee {
            Callable::Function(name) => {
                if let Some(cell) = scope.vars.get(name) {
                    if let Value::Closure(closure) = &*cell.borrow() {
                        return closure.clone();
                    }
                }
                Rc::new(Closure {
                    function: self.globals[name].clone(),
                    captured: Scope::default(),
                })
            }
            Callable::ContainerMethod { activation, name } => self.method(*activation, name, scope),
            Callable::Method { .. } => panic!("interpreter does not support method calls"),
        }
    }

    fn method(
        &self,
        activation: ActivationId,
        name: &Name,
        scope: &Scope,
    ) -> Rc<Closure> {
        let arena = self.arena.expect("container methods need an arena");
        Rc::new(Closure {
            function: arena.method(activation, name).unwrap().clone(),
            captured: Self::method_scope(scope),
        })
    }

    fn eval(
        &mut self,
        expr: &Expr,
        scope: &Scope,
    ) -> Value {
        match expr {
            Expr::Call { callee, args, .. } => {
                let closure = self.callee(callee, scope);
                let args = args.iter().map(|arg| self.eval(arg, scope)).collect();
                self.call(&closure.function, closure.captured.clone(), args)
            }
            Expr::Reference { name, .. } => match scope.vars.get(name) {
                Some(cell) => cell.borrow().clone(),
                None => Value::Closure(Rc::new(Closure {
                    function: self.globals[name].clone(),
                    captured: Scope::default(),
                })),
            },
            Expr::Value { value, .. } => match value {
                Literal::Int(v) => Value::Int(*v),
                Literal::Bool(v) => Value::Bool(*v),
                Literal::String(v) => Value::Str(v.clone()),
                Literal::Null => Value::Null,
                Literal::Void => Value::Void,
                Literal::Float(_) => panic!("interpreter does not support floats"),
            },
            Expr::Field { field, .. } => scope.containers[&field.activation]
                .borrow()
                .get(&field.name)
                .cloned()
                .unwrap_or(Value::Void),
            Expr::MethodValue { activation, name, .. } => {
                Value::Closure(self.method(*activation, name, scope))
            }
            Expr::Support { op, args, .. } => {
                let args: Vec<Value> = args.iter().map(|arg| self.eval(arg, scope)).collect();
                self.builtin(*op, args)
            }
            other => panic!("interpreter does not support {:?}", other),
        }
    }

    fn builtin(
        &mut self,
        op: BuiltinOperator,
        args: Vec<Value>,
    ) -> Value {
        use BuiltinOperator::*;
        let int = |i: usize| args[i].int();
        match op {
            Print => {
                self.output.push(args[0].show());
                Value::Void
            }
            PlusIntInt => Value::Int(int(0) + int(1)),
            MinusIntInt => Value::Int(int(0) - int(1)),
            TimesIntInt => Value::Int(int(0) * int(1)),
            LtIntInt => Value::Bool(int(0) < int(1)),
            LeIntInt => Value::Bool(int(0) <= int(1)),
            GtIntInt => Value::Bool(int(0) > int(1)),
            EqIntInt => Value::Bool(int(0) == int(1)),
            NeIntInt => Value::Bool(int(0) != int(1)),
            BooleanNegation => Value::Bool(!args[0].truthy()),
            StrCat => Value::Str(args.iter().map(Value::show).collect()),
            other => panic!("interpreter does not support {}", other),
        }
    }
}
