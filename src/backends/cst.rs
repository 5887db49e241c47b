//! Concrete syntax tree shared by the C-family targets
//!
//! Emitters build a [`Unit`] per output file; [`Printer`] renders it. The tree
//! is deliberately shallow: identifiers and type names are already final
//! target text by the time they land here, and expressions carry just enough
//! structure to parenthesize operands and lay out lambda bodies.

use std::fmt::Write as _;

/// A parameter as `type name`
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub ty: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Ident(String),
    Literal(String),
    Member {
        object: Box<Expr>,
        name: String,
        /// `->` instead of `.`
        arrow: bool,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Infix {
        op: &'static str,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Prefix {
        op: &'static str,
        operand: Box<Expr>,
    },
    /// Text with `{0}`, `{1}`... holes
    Template {
        pattern: String,
        args: Vec<Expr>,
    },
    /// `captures` set selects the C++ form `[captures](params) -> ret { ... }`;
    /// otherwise the C# form `(params) => { ... }`
    Lambda {
        captures: Option<String>,
        params: Vec<Param>,
        ret: Option<String>,
        body: Vec<Stmt>,
    },
    /// `new T(args)`
    New {
        ty: String,
        args: Vec<Expr>,
    },
    Placeholder(String),
}

impl Expr {
    pub fn ident(text: impl Into<String>) -> Self {
        Expr::Ident(text.into())
    }

    pub fn call(
        callee: Expr,
        args: Vec<Expr>,
    ) -> Self {
        Expr::Call {
            callee: Box::new(callee),
            args,
        }
    }

    pub fn member(
        object: Expr,
        name: impl Into<String>,
        arrow: bool,
    ) -> Self {
        Expr::Member {
            object: Box::new(object),
            name: name.into(),
            arrow,
        }
    }

    /// Operands that must be parenthesized next to an operator
    fn is_compound(&self) -> bool {
        matches!(
            self,
            Expr::Infix { .. } | Expr::Prefix { .. } | Expr::Template { .. } | Expr::Lambda { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Case {
    pub value: i64,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Expr(Expr),
    Decl {
        ty: String,
        name: String,
        init: Option<Expr>,
    },
    Assign {
        target: Expr,
        value: Expr,
    },
    Return(Option<Expr>),
    Throw(Expr),
    If {
        cond: Expr,
        then: Vec<Stmt>,
        otherwise: Vec<Stmt>,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
    },
    Switch {
        subject: Expr,
        cases: Vec<Case>,
        default: Vec<Stmt>,
    },
    Break,
    Continue,
    Goto(String),
    /// `label: ;`
    Label(String),
    Block(Vec<Stmt>),
    TryCatch {
        body: Vec<Stmt>,
        /// Caught type, e.g. `Bubble`
        catch: String,
        handler: Vec<Stmt>,
    },
    /// C# local function
    LocalFunction {
        ret: String,
        name: String,
        params: Vec<Param>,
        body: Vec<Stmt>,
    },
    Comment(String),
    Placeholder(String),
}

impl Stmt {
    fn is_jump(&self) -> bool {
        match self {
            Stmt::Return(_) | Stmt::Throw(_) | Stmt::Break | Stmt::Continue | Stmt::Goto(_) => true,
            Stmt::Block(stmts) => ends_in_jump(stmts),
            Stmt::If {
                then, otherwise, ..
            } => ends_in_jump(then) && ends_in_jump(otherwise),
            _ => false,
        }
    }
}

/// Whether control can never fall off the end of `stmts`
pub fn ends_in_jump(stmts: &[Stmt]) -> bool {
    stmts.last().is_some_and(Stmt::is_jump)
}

#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    /// `using X;`
    Using(String),
    /// `#include X`; `X` carries its own quotes or angle brackets
    Include(String),
    /// A line printed verbatim
    Raw(String),
    Namespace {
        name: String,
        items: Vec<Item>,
        /// Indent the namespace body (C#) or keep it flush (C++)
        indent: bool,
    },
    Class {
        header: String,
        members: Vec<Item>,
        /// C++ class definitions end with `};`
        semicolon: bool,
    },
    Field {
        modifiers: String,
        ty: String,
        name: String,
        init: Option<Expr>,
    },
    /// `body: None` prints a prototype
    Function {
        modifiers: String,
        ret: String,
        name: String,
        params: Vec<Param>,
        body: Option<Vec<Stmt>>,
    },
    Comment(String),
    Blank,
}

/// One output file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Unit {
    pub items: Vec<Item>,
}

/// Renders a [`Unit`] with four-space indentation
#[derive(Debug, Default)]
pub struct Printer {
    output: String,
    indent_level: usize,
}

impl Printer {
    pub fn print(unit: &Unit) -> String {
        let mut printer = Printer::default();
        for item in &unit.items {
            printer.item(item);
        }
        printer.output
    }

    fn nested(indent_level: usize) -> Self {
        Self {
            output: String::new(),
            indent_level,
        }
    }

    fn write_line(
        &mut self,
        text: &str,
    ) {
        if !text.is_empty() {
            self.write_indent();
            self.output.push_str(text);
        }
        self.output.push('\n');
    }

    fn write_indent(&mut self) {
        for _ in 0..self.indent_level {
            self.output.push_str("    ");
        }
    }

    fn increase_indent(&mut self) {
        self.indent_level += 1;
    }

    fn decrease_indent(&mut self) {
        if self.indent_level > 0 {
            self.indent_level -= 1;
        }
    }

    fn item(
        &mut self,
        item: &Item,
    ) {
        match item {
            Item::Using(name) => self.write_line(&format!("using {};", name)),
            Item::Include(header) => self.write_line(&format!("#include {}", header)),
            Item::Raw(text) => self.write_line(text),
            Item::Comment(text) => self.write_line(&format!("// {}", text)),
            Item::Blank => self.write_line(""),
            Item::Namespace {
                name,
                items,
                indent,
            } => {
                self.write_line(&format!("namespace {} {{", name));
                if *indent {
                    self.increase_indent();
                }
                for item in items {
                    self.item(item);
                }
                if *indent {
                    self.decrease_indent();
                }
                self.write_line("}");
            }
            Item::Class {
                header,
                members,
                semicolon,
            } => {
                self.write_line(&format!("{} {{", header));
                self.increase_indent();
                for member in members {
                    self.item(member);
                }
                self.decrease_indent();
                self.write_line(if *semicolon { "};" } else { "}" });
            }
            Item::Field {
                modifiers,
                ty,
                name,
                init,
            } => {
                let mut line = join_words(&[modifiers, ty, name]);
                if let Some(init) = init {
                    let _ = write!(line, " = {}", self.expr(init));
                }
                line.push(';');
                self.write_line(&line);
            }
            Item::Function {
                modifiers,
                ret,
                name,
                params,
                body,
            } => {
                let signature = format!(
                    "{}({})",
                    join_words(&[modifiers, ret, name]),
                    params_text(params)
                );
                match body {
                    None => self.write_line(&format!("{};", signature)),
                    Some(body) => {
                        self.write_line(&format!("{} {{", signature));
                        self.body(body);
                        self.write_line("}");
                    }
                }
            }
        }
    }

    fn body(
        &mut self,
        stmts: &[Stmt],
    ) {
        self.increase_indent();
        for stmt in stmts {
            self.stmt(stmt);
        }
        self.decrease_indent();
    }

    fn stmt(
        &mut self,
        stmt: &Stmt,
    ) {
        match stmt {
            Stmt::Expr(expr) => {
                let text = format!("{};", self.expr(expr));
                self.write_line(&text);
            }
            Stmt::Decl { ty, name, init } => {
                let text = match init {
                    Some(init) => format!("{} {} = {};", ty, name, self.expr(init)),
                    None => format!("{} {};", ty, name),
                };
                self.write_line(&text);
            }
            Stmt::Assign { target, value } => {
                let text = format!("{} = {};", self.expr(target), self.expr(value));
                self.write_line(&text);
            }
            Stmt::Return(None) => self.write_line("return;"),
            Stmt::Return(Some(value)) => {
                let text = format!("return {};", self.expr(value));
                self.write_line(&text);
            }
            Stmt::Throw(value) => {
                let text = format!("throw {};", self.expr(value));
                self.write_line(&text);
            }
            Stmt::If {
                cond,
                then,
                otherwise,
            } => {
                let text = format!("if ({}) {{", self.expr(cond));
                self.write_line(&text);
                self.body(then);
                if otherwise.is_empty() {
                    self.write_line("}");
                } else {
                    self.write_line("} else {");
                    self.body(otherwise);
                    self.write_line("}");
                }
            }
            Stmt::While { cond, body } => {
                let text = format!("while ({}) {{", self.expr(cond));
                self.write_line(&text);
                self.body(body);
                self.write_line("}");
            }
            Stmt::Switch {
                subject,
                cases,
                default,
            } => {
                let text = format!("switch ({}) {{", self.expr(subject));
                self.write_line(&text);
                self.increase_indent();
                for case in cases {
                    self.write_line(&format!("case {}: {{", case.value));
                    self.case_body(&case.body);
                    self.write_line("}");
                }
                if !default.is_empty() {
                    self.write_line("default: {");
                    self.case_body(default);
                    self.write_line("}");
                }
                self.decrease_indent();
                self.write_line("}");
            }
            Stmt::Break => self.write_line("break;"),
            Stmt::Continue => self.write_line("continue;"),
            Stmt::Goto(label) => self.write_line(&format!("goto {};", label)),
            Stmt::Label(label) => {
                // a label must be followed by a statement
                self.decrease_indent();
                self.write_line(&format!("{}: ;", label));
                self.increase_indent();
            }
            Stmt::Block(stmts) => {
                self.write_line("{");
                self.body(stmts);
                self.write_line("}");
            }
            Stmt::TryCatch {
                body,
                catch,
                handler,
            } => {
                self.write_line("try {");
                self.body(body);
                self.write_line(&format!("}} catch ({}) {{", catch));
                self.body(handler);
                self.write_line("}");
            }
            Stmt::LocalFunction {
                ret,
                name,
                params,
                body,
            } => {
                self.write_line(&format!("{} {}({}) {{", ret, name, params_text(params)));
                self.body(body);
                self.write_line("}");
            }
            Stmt::Comment(text) => self.write_line(&format!("// {}", text)),
            Stmt::Placeholder(what) => self.write_line(&placeholder(what)),
        }
    }

    /// Case bodies never fall through
    fn case_body(
        &mut self,
        stmts: &[Stmt],
    ) {
        self.body(stmts);
        if !ends_in_jump(stmts) {
            self.increase_indent();
            self.write_line("break;");
            self.decrease_indent();
        }
    }

    fn expr(
        &self,
        expr: &Expr,
    ) -> String {
        match expr {
            Expr::Ident(text) | Expr::Literal(text) => text.clone(),
            Expr::Member {
                object,
                name,
                arrow,
            } => format!(
                "{}{}{}",
                self.operand(object),
                if *arrow { "->" } else { "." },
                name
            ),
            Expr::Call { callee, args } => {
                format!("{}({})", self.operand(callee), self.args(args))
            }
            Expr::Infix { op, left, right } => {
                format!("{} {} {}", self.operand(left), op, self.operand(right))
            }
            Expr::Prefix { op, operand } => format!("{}{}", op, self.operand(operand)),
            Expr::Template { pattern, args } => {
                let args: Vec<String> = args.iter().map(|arg| self.operand(arg)).collect();
                fill_template(pattern, &args)
            }
            Expr::Lambda {
                captures,
                params,
                ret,
                body,
            } => {
                let head = match captures {
                    Some(captures) => {
                        let ret = ret.as_ref().map(|r| format!(" -> {}", r)).unwrap_or_default();
                        format!("[{}]({}){} {{", captures, params_text(params), ret)
                    }
                    None => format!("({}) => {{", params_text(params)),
                };
                let mut inner = Printer::nested(self.indent_level);
                inner.body(body);
                inner.write_indent();
                format!("{}\n{}}}", head, inner.output)
            }
            Expr::New { ty, args } => format!("new {}({})", ty, self.args(args)),
            Expr::Placeholder(what) => placeholder(what),
        }
    }

    fn operand(
        &self,
        expr: &Expr,
    ) -> String {
        if expr.is_compound() {
            format!("({})", self.expr(expr))
        } else {
            self.expr(expr)
        }
    }

    fn args(
        &self,
        args: &[Expr],
    ) -> String {
        args.iter()
            .map(|arg| self.expr(arg))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Replace `{N}` holes in one pass; unknown holes are kept verbatim
fn fill_template(
    pattern: &str,
    args: &[String],
) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut rest = pattern;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let hole = after
            .find('}')
            .and_then(|close| after[..close].parse::<usize>().ok().map(|index| (close, index)));
        match hole.and_then(|(close, index)| args.get(index).map(|arg| (close, arg))) {
            Some((close, arg)) => {
                out.push_str(arg);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn params_text(params: &[Param]) -> String {
    params
        .iter()
        .map(|p| format!("{} {}", p.ty, p.name))
        .collect::<Vec<_>>()
        .join(", ")
}

fn join_words(words: &[&String]) -> String {
    words
        .iter()
        .filter(|w| !w.is_empty())
        .map(|w| w.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

fn placeholder(what: &str) -> String {
    format!("/* TODO(polylower): {} */", what.replace("*/", "* /"))
}
