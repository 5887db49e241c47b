//! C# backend
//!
//! One `.cs` file per module: a namespace holding a static class. Module
//! variables are static fields, init blocks run in the static constructor,
//! functions become static methods and capture containers nested classes.
//! Failures travel as `Bubble` exceptions.

use tracing::debug;

use crate::backends::cst::{self, Item, Param};
use crate::backends::emit::{Dialect, EmittedContainer, EmittedFunction, EmittedModule, ModuleEmitter};
use crate::backends::entry;
use crate::backends::support::Requirement;
use crate::backends::{module_segments, Backend, FileKind, Target, TargetUnit};
use crate::middle::ir::{Literal, Module, Type};
use crate::util::config::EmitConfig;
use crate::util::diagnostic::Result;

/// Runtime names generated code refers to unqualified
const RUNTIME_NAMES: &[&str] = &[
    "Attempt",
    "Async",
    "Bubble",
    "Console",
    "Core",
    "Failure",
    "Generator",
    "GeneratorResult",
    "Math",
    "Promise",
    "System",
];

pub struct CSharpDialect {
    /// The module's static class; members may not share its name
    class_name: String,
}

impl CSharpDialect {
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
        }
    }

    fn type_text(
        &self,
        ty: &Type,
        as_argument: bool,
    ) -> String {
        match ty {
            Type::Failure => "Bubble".to_string(),
            Type::Union(_) if ty.is_failable() => {
                format!("Attempt<{}>", self.type_text(&ty.without_failure(), true))
            }
            Type::Union(_) if ty.is_nullable() => match ty.without_null() {
                Type::Union(_) => "object".to_string(),
                inner => format!("{}?", self.type_text(&inner, true)),
            },
            Type::Union(_) => "object".to_string(),
            Type::Nominal { name, args } => match (name.as_str(), args.as_slice()) {
                ("Int", _) => "int".to_string(),
                ("Float64", _) => "double".to_string(),
                ("Boolean", _) => "bool".to_string(),
                ("String", _) => "string".to_string(),
                ("Void", _) if as_argument => "object".to_string(),
                ("Void", _) => "void".to_string(),
                ("Null", _) => "object".to_string(),
                ("Step", [item]) => format!("Func<GeneratorResult<{}>>", self.type_text(item, true)),
                (_, []) => name.clone(),
                (_, args) => {
                    let args: Vec<String> = args.iter().map(|arg| self.type_text(arg, true)).collect();
                    format!("{}<{}>", name, args.join(", "))
                }
            },
        }
    }
}

impl Dialect for CSharpDialect {
    fn target(&self) -> Target {
        Target::CSharp
    }

    fn reserved(&self) -> Vec<&str> {
        let mut names: Vec<&str> = RUNTIME_NAMES.to_vec();
        names.push(self.class_name.as_str());
        names
    }

    fn type_name(
        &self,
        ty: &Type,
    ) -> String {
        self.type_text(ty, false)
    }

    /// Failures are thrown, so the declared result drops the failure arm
    fn return_type(
        &self,
        ty: &Type,
    ) -> String {
        self.type_text(&ty.without_failure(), false)
    }

    fn literal(
        &self,
        value: &Literal,
    ) -> String {
        match value {
            Literal::Int(n) if i32::try_from(*n).is_ok() => n.to_string(),
            Literal::Int(n) => format!("{}L", n),
            Literal::Float(f) if f.is_nan() => "double.NaN".to_string(),
            Literal::Float(f) if f.is_infinite() && *f > 0.0 => "double.PositiveInfinity".to_string(),
            Literal::Float(f) if f.is_infinite() => "double.NegativeInfinity".to_string(),
            Literal::Float(f) => format!("{:?}", f),
            Literal::Bool(b) => b.to_string(),
            Literal::String(text) => quote(text),
            Literal::Null | Literal::Void => "null".to_string(),
        }
    }

    fn zero_value(&self) -> cst::Expr {
        cst::Expr::Literal("default".to_string())
    }

    fn container_type(
        &self,
        type_name: &str,
    ) -> String {
        type_name.to_string()
    }

    fn new_container(
        &self,
        type_name: &str,
    ) -> cst::Expr {
        cst::Expr::New {
            ty: type_name.to_string(),
            args: Vec::new(),
        }
    }

    fn container_member(
        &self,
        object: cst::Expr,
        member: &str,
    ) -> cst::Expr {
        cst::Expr::member(object, member, false)
    }

    fn this_member(
        &self,
        member: &str,
    ) -> cst::Expr {
        cst::Expr::member(cst::Expr::ident("this"), member, false)
    }

    fn this_handle(&self) -> cst::Expr {
        cst::Expr::ident("this")
    }

    fn method_value(
        &self,
        object: cst::Expr,
        method: &str,
    ) -> cst::Expr {
        cst::Expr::member(object, method, false)
    }

    fn object_member(
        &self,
        object: cst::Expr,
        member: &str,
    ) -> cst::Expr {
        cst::Expr::member(object, member, false)
    }

    fn local_function(
        &self,
        ret: String,
        name: String,
        params: Vec<Param>,
        body: Vec<cst::Stmt>,
    ) -> cst::Stmt {
        cst::Stmt::LocalFunction {
            ret,
            name,
            params,
            body,
        }
    }

    fn propagate(
        &self,
        failure: cst::Expr,
    ) -> cst::Stmt {
        cst::Stmt::Throw(failure)
    }

    fn catch_type(&self) -> String {
        "Bubble".to_string()
    }
}

/// C# string literal
fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\0' => out.push_str("\\0"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

pub struct CSharpBackend {
    config: EmitConfig,
}

impl CSharpBackend {
    pub fn new(config: EmitConfig) -> Self {
        Self { config }
    }

    fn layout(
        &self,
        emitted: EmittedModule,
        class_name: &str,
        namespace: String,
    ) -> cst::Unit {
        let mut items = vec![Item::Using("System".to_string())];
        let mut usings = vec!["System".to_string(), self.config.csharp.core_namespace.clone()];
        items.push(Item::Using(self.config.csharp.core_namespace.clone()));
        for requirement in &emitted.requirements {
            if let Requirement::Using(name) = requirement {
                if !usings.iter().any(|u| u.as_str() == *name) {
                    usings.push(name.to_string());
                    items.push(Item::Using(name.to_string()));
                }
            }
        }
        items.push(Item::Blank);

        let mut members = Vec::new();
        for global in &emitted.globals {
            members.push(Item::Field {
                modifiers: visibility(global.exported, "static"),
                ty: global.ty.clone(),
                name: global.name.clone(),
                init: None,
            });
        }
        if !emitted.init.is_empty() {
            blank_between(&mut members);
            members.push(Item::Function {
                modifiers: "static".to_string(),
                ret: String::new(),
                name: class_name.to_string(),
                params: Vec::new(),
                body: Some(emitted.init),
            });
        }
        for function in emitted.functions {
            blank_between(&mut members);
            members.push(static_method(function));
        }
        for container in emitted.containers {
            blank_between(&mut members);
            members.push(container_class(container));
        }

        items.push(Item::Namespace {
            name: namespace,
            items: vec![Item::Class {
                header: format!("public static class {}", class_name),
                members,
                semicolon: false,
            }],
            indent: true,
        });
        cst::Unit { items }
    }
}

fn visibility(
    exported: bool,
    rest: &str,
) -> String {
    let access = if exported { "public" } else { "private" };
    if rest.is_empty() {
        access.to_string()
    } else {
        format!("{} {}", access, rest)
    }
}

fn blank_between(members: &mut Vec<Item>) {
    if !members.is_empty() {
        members.push(Item::Blank);
    }
}

fn static_method(function: EmittedFunction) -> Item {
    Item::Function {
        modifiers: visibility(function.exported, "static"),
        ret: function.ret,
        name: function.name,
        params: function.params,
        body: Some(function.body),
    }
}

fn container_class(container: EmittedContainer) -> Item {
    let mut members: Vec<Item> = container
        .fields
        .into_iter()
        .map(|(ty, name)| Item::Field {
            modifiers: "public".to_string(),
            ty,
            name,
            init: None,
        })
        .collect();
    for method in container.methods {
        blank_between(&mut members);
        members.push(Item::Function {
            modifiers: "public".to_string(),
            ret: method.ret,
            name: method.name,
            params: method.params,
            body: Some(method.body),
        });
    }
    Item::Class {
        header: format!("private sealed class {}", container.type_name),
        members,
        semicolon: false,
    }
}

impl Backend for CSharpBackend {
    fn target(&self) -> Target {
        Target::CSharp
    }

    fn lower(
        &self,
        module: &Module,
    ) -> Result<Vec<TargetUnit>> {
        let profile = Target::CSharp.profile();
        let segments = module_segments(
            &module.path,
            self.config.library.as_deref(),
            &profile,
            profile.namespace_style,
        );
        let last = segments.last().cloned().unwrap_or_default();
        let class_name = format!("{}Global", last);
        let namespace = std::iter::once(self.config.csharp.root_namespace.as_str())
            .chain(segments.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(".");
        let path = format!("{}/{}.cs", segments.join("/"), class_name);
        debug!("csharp: {} -> {}", module.path.join("."), path);

        let dialect = CSharpDialect::new(class_name.clone());
        let emitted = ModuleEmitter::new(&dialect, module, &self.config).emit(module)?;
        let exports: Vec<String> = emitted
            .functions
            .iter()
            .filter(|f| f.exported)
            .map(|f| f.name.clone())
            .chain(emitted.globals.iter().filter(|g| g.exported).map(|g| g.name.clone()))
            .collect();
        let diagnostics = emitted.diagnostics.clone();

        let mut units = vec![TargetUnit {
            path,
            kind: FileKind::Source,
            tree: self.layout(emitted, &class_name, namespace),
            diagnostics,
        }];
        if self.config.entry_file {
            let entry = entry::entry_unit(Target::CSharp, &module.path, &units, &exports);
            units.push(entry);
        }
        Ok(units)
    }
}
