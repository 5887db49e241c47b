//! C++ backend
//!
//! Each module becomes a header and a source file inside nested namespaces.
//! Failures are `temper::core::Bubble<T>` return values, so a try/recover is a
//! pair of lambdas handed to `temper::core::recover`. Lambdas cannot be left
//! with a jump, which is why this target runs escape planning. Capture
//! containers are structs held through `std::shared_ptr`.

use tracing::debug;

use crate::backends::cst::{self, Item, Param};
use crate::backends::emit::{Dialect, EmittedContainer, EmittedModule, ModuleEmitter};
use crate::backends::entry;
use crate::backends::support::Requirement;
use crate::backends::{module_segments, Backend, FileKind, Target, TargetUnit};
use crate::middle::ir::{Literal, Module, Type};
use crate::middle::names::IdentStyle;
use crate::util::config::EmitConfig;
use crate::util::diagnostic::Result;

/// Module initializer; runs global initializers and init blocks in order
pub const INIT_FUNCTION: &str = "init_module";

/// Runtime names that are generic over a type argument
const RUNTIME_GENERICS: &[&str] = &[
    "Generator",
    "GeneratorResult",
    "List",
    "ListBuilder",
    "Map",
    "Promise",
];

#[derive(Debug, Default)]
pub struct CppDialect;

impl CppDialect {
    fn type_text(
        &self,
        ty: &Type,
        as_argument: bool,
    ) -> String {
        match ty {
            Type::Failure => "temper::core::Bubble<temper::core::Void>".to_string(),
            Type::Union(_) if ty.is_failable() => format!(
                "temper::core::Bubble<{}>",
                self.type_text(&ty.without_failure(), true)
            ),
            Type::Union(_) if ty.is_nullable() => match ty.without_null() {
                Type::Union(_) => "temper::core::Any".to_string(),
                inner => format!("temper::core::Nullable<{}>", self.type_text(&inner, true)),
            },
            Type::Union(_) => "temper::core::Any".to_string(),
            Type::Nominal { name, args } => match (name.as_str(), args.as_slice()) {
                ("Int", _) => "int32_t".to_string(),
                ("Float64", _) => "double".to_string(),
                ("Boolean", _) => "bool".to_string(),
                ("String", _) => "std::string".to_string(),
                ("Void", _) if as_argument => "temper::core::Void".to_string(),
                ("Void", _) => "void".to_string(),
                ("Null", _) => "std::nullptr_t".to_string(),
                ("Step", [item]) => format!(
                    "std::function<temper::core::GeneratorResult<{}>()>",
                    self.type_text(item, true)
                ),
                (runtime, args) if RUNTIME_GENERICS.contains(&runtime) => {
                    format!("temper::core::{}{}", runtime, self.type_args(args))
                }
                (_, args) => format!("temper::core::Object<{}{}>", name, self.type_args(args)),
            },
        }
    }

    fn type_args(
        &self,
        args: &[Type],
    ) -> String {
        if args.is_empty() {
            return String::new();
        }
        let args: Vec<String> = args.iter().map(|arg| self.type_text(arg, true)).collect();
        format!("<{}>", args.join(", "))
    }
}

impl Dialect for CppDialect {
    fn target(&self) -> Target {
        Target::Cpp
    }

    fn reserved(&self) -> Vec<&str> {
        vec!["temper", "std", INIT_FUNCTION, "self", "args"]
    }

    fn type_name(
        &self,
        ty: &Type,
    ) -> String {
        self.type_text(ty, false)
    }

    fn return_type(
        &self,
        ty: &Type,
    ) -> String {
        self.type_text(ty, false)
    }

    fn literal(
        &self,
        value: &Literal,
    ) -> String {
        match value {
            Literal::Int(n) if i32::try_from(*n).is_ok() => n.to_string(),
            Literal::Int(n) => format!("int64_t{{{}}}", n),
            Literal::Float(f) if f.is_nan() => "std::numeric_limits<double>::quiet_NaN()".to_string(),
            Literal::Float(f) if f.is_infinite() && *f > 0.0 => {
                "std::numeric_limits<double>::infinity()".to_string()
            }
            Literal::Float(f) if f.is_infinite() => "-std::numeric_limits<double>::infinity()".to_string(),
            Literal::Float(f) => format!("{:?}", f),
            Literal::Bool(b) => b.to_string(),
            Literal::String(text) => format!("std::string({})", quote(text)),
            Literal::Null => "nullptr".to_string(),
            Literal::Void => "temper::core::Void{}".to_string(),
        }
    }

    fn zero_value(&self) -> cst::Expr {
        cst::Expr::Literal("{}".to_string())
    }

    fn container_type(
        &self,
        type_name: &str,
    ) -> String {
        format!("std::shared_ptr<{}>", type_name)
    }

    fn new_container(
        &self,
        type_name: &str,
    ) -> cst::Expr {
        cst::Expr::call(
            cst::Expr::ident(format!("std::make_shared<{}>", type_name)),
            Vec::new(),
        )
    }

    fn container_member(
        &self,
        object: cst::Expr,
        member: &str,
    ) -> cst::Expr {
        cst::Expr::member(object, member, true)
    }

    fn this_member(
        &self,
        member: &str,
    ) -> cst::Expr {
        cst::Expr::member(cst::Expr::ident("this"), member, true)
    }

    fn this_handle(&self) -> cst::Expr {
        cst::Expr::call(cst::Expr::ident("shared_from_this"), Vec::new())
    }

    /// A lambda keeping the container alive for as long as the value lives
    fn method_value(
        &self,
        object: cst::Expr,
        method: &str,
    ) -> cst::Expr {
        cst::Expr::Template {
            pattern: format!(
                "[self = {{0}}](auto&&... args) {{ return self->{}(std::forward<decltype(args)>(args)...); }}",
                method
            ),
            args: vec![object],
        }
    }

    fn object_member(
        &self,
        object: cst::Expr,
        member: &str,
    ) -> cst::Expr {
        cst::Expr::member(object, member, true)
    }

    fn local_function(
        &self,
        ret: String,
        name: String,
        params: Vec<Param>,
        body: Vec<cst::Stmt>,
    ) -> cst::Stmt {
        cst::Stmt::Decl {
            ty: "auto".to_string(),
            name,
            init: Some(cst::Expr::Lambda {
                captures: Some("=".to_string()),
                params,
                ret: Some(ret),
                body,
            }),
        }
    }

    fn propagate(
        &self,
        failure: cst::Expr,
    ) -> cst::Stmt {
        cst::Stmt::Return(Some(failure))
    }

    /// Never caught natively; try/recover goes through `temper::core::recover`
    fn catch_type(&self) -> String {
        "...".to_string()
    }
}

/// C++ string literal; control characters use three-digit octal escapes
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
            c if (c as u32) < 0x20 || c == '\u{7f}' => out.push_str(&format!("\\{:03o}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

pub struct CppBackend {
    config: EmitConfig,
}

/// Where a module's files go and what they are called
struct Placement {
    namespaces: Vec<String>,
    header_path: String,
    source_path: String,
    guard: String,
}

impl CppBackend {
    pub fn new(config: EmitConfig) -> Self {
        Self { config }
    }

    fn placement(
        &self,
        module: &Module,
    ) -> Placement {
        let profile = Target::Cpp.profile();
        let segments = module_segments(
            &module.path,
            self.config.library.as_deref(),
            &profile,
            profile.namespace_style,
        );
        let stem = segments.join("/");
        let last = segments.last().cloned().unwrap_or_default();
        let mut namespaces = vec![self.config.cpp.root_namespace.clone()];
        namespaces.extend(segments.iter().cloned());
        let guard = std::iter::once(self.config.cpp.root_namespace.as_str())
            .chain(segments.iter().map(String::as_str))
            .chain(std::iter::once("hpp"))
            .map(|part| IdentStyle::LoudSnake.convert(part))
            .collect::<Vec<_>>()
            .join("_");
        Placement {
            namespaces,
            header_path: format!("{}/{}.hpp", stem, last),
            source_path: format!("{}/{}.cpp", stem, last),
            guard,
        }
    }

    fn header(
        &self,
        emitted: &EmittedModule,
        placement: &Placement,
    ) -> cst::Unit {
        let mut items = vec![
            Item::Raw(format!("#ifndef {}", placement.guard)),
            Item::Raw(format!("#define {}", placement.guard)),
            Item::Blank,
            Item::Include(format!("\"{}\"", self.config.cpp.core_header)),
        ];
        for requirement in &emitted.requirements {
            if let Requirement::Include(header) = requirement {
                items.push(Item::Include(header.to_string()));
            }
        }
        items.push(Item::Blank);

        let mut body = Vec::new();
        for container in &emitted.containers {
            body.push(Item::Raw(format!("struct {};", container.type_name)));
        }
        for container in &emitted.containers {
            body.push(Item::Blank);
            body.push(container_struct(container));
        }
        let exported_globals: Vec<_> = emitted.globals.iter().filter(|g| g.exported).collect();
        if !exported_globals.is_empty() {
            body.push(Item::Blank);
        }
        for global in exported_globals {
            body.push(Item::Raw(format!("extern {} {};", global.ty, global.name)));
        }
        body.push(Item::Blank);
        for function in emitted.functions.iter().filter(|f| f.exported) {
            body.push(prototype("", &function.ret, &function.name, &function.params));
        }
        body.push(prototype("", "void", INIT_FUNCTION, &[]));
        body.push(Item::Blank);

        items.extend(namespaces(&placement.namespaces, body));
        items.push(Item::Blank);
        items.push(Item::Raw(format!("#endif // {}", placement.guard)));
        cst::Unit { items }
    }

    fn source(
        &self,
        emitted: EmittedModule,
        placement: &Placement,
    ) -> cst::Unit {
        let mut items = vec![Item::Include(format!("\"{}\"", placement.header_path)), Item::Blank];

        let mut body = Vec::new();
        let internal: Vec<_> = emitted.functions.iter().filter(|f| !f.exported).collect();
        for function in &internal {
            body.push(prototype("static", &function.ret, &function.name, &function.params));
        }
        if !internal.is_empty() {
            body.push(Item::Blank);
        }
        for global in &emitted.globals {
            body.push(Item::Field {
                modifiers: if global.exported { String::new() } else { "static".to_string() },
                ty: global.ty.clone(),
                name: global.name.clone(),
                init: Some(cst::Expr::Literal("{}".to_string())),
            });
        }
        if !emitted.globals.is_empty() {
            body.push(Item::Blank);
        }
        for function in emitted.functions {
            body.push(Item::Function {
                modifiers: if function.exported { String::new() } else { "static".to_string() },
                ret: function.ret,
                name: function.name,
                params: function.params,
                body: Some(function.body),
            });
            body.push(Item::Blank);
        }
        for container in emitted.containers {
            for method in container.methods {
                body.push(Item::Function {
                    modifiers: String::new(),
                    ret: method.ret,
                    name: format!("{}::{}", container.type_name, method.name),
                    params: method.params,
                    body: Some(method.body),
                });
                body.push(Item::Blank);
            }
        }
        body.push(Item::Function {
            modifiers: String::new(),
            ret: "void".to_string(),
            name: INIT_FUNCTION.to_string(),
            params: Vec::new(),
            body: Some(emitted.init),
        });
        body.push(Item::Blank);

        items.extend(namespaces(&placement.namespaces, body));
        cst::Unit { items }
    }
}

fn prototype(
    modifiers: &str,
    ret: &str,
    name: &str,
    params: &[Param],
) -> Item {
    Item::Function {
        modifiers: modifiers.to_string(),
        ret: ret.to_string(),
        name: name.to_string(),
        params: params.to_vec(),
        body: None,
    }
}

/// Nest `items` in flush `namespace a { namespace b { ... } }` blocks
fn namespaces(
    names: &[String],
    items: Vec<Item>,
) -> Vec<Item> {
    names.iter().rev().fold(items, |nested, name| {
        vec![Item::Namespace {
            name: name.clone(),
            items: nested,
            indent: false,
        }]
    })
}

fn container_struct(container: &EmittedContainer) -> Item {
    let mut members: Vec<Item> = container
        .fields
        .iter()
        .map(|(ty, name)| Item::Field {
            modifiers: String::new(),
            ty: ty.clone(),
            name: name.clone(),
            init: Some(cst::Expr::Literal("{}".to_string())),
        })
        .collect();
    if !members.is_empty() && !container.methods.is_empty() {
        members.push(Item::Blank);
    }
    for method in &container.methods {
        members.push(prototype("", &method.ret, &method.name, &method.params));
    }
    Item::Class {
        header: format!(
            "struct {} : std::enable_shared_from_this<{}>",
            container.type_name, container.type_name
        ),
        members,
        semicolon: true,
    }
}

impl Backend for CppBackend {
    fn target(&self) -> Target {
        Target::Cpp
    }

    fn lower(
        &self,
        module: &Module,
    ) -> Result<Vec<TargetUnit>> {
        let placement = self.placement(module);
        debug!(
            "cpp: {} -> {}, {}",
            module.path.join("."),
            placement.header_path,
            placement.source_path
        );

        let dialect = CppDialect;
        let emitted = ModuleEmitter::new(&dialect, module, &self.config).emit(module)?;
        let exports: Vec<String> = emitted
            .functions
            .iter()
            .filter(|f| f.exported)
            .map(|f| f.name.clone())
            .chain(emitted.globals.iter().filter(|g| g.exported).map(|g| g.name.clone()))
            .collect();
        let diagnostics = emitted.diagnostics.clone();

        let header = self.header(&emitted, &placement);
        let mut units = vec![
            TargetUnit {
                path: placement.header_path.clone(),
                kind: FileKind::Header,
                tree: header,
                diagnostics: Vec::new(),
            },
            TargetUnit {
                path: placement.source_path.clone(),
                kind: FileKind::Source,
                tree: self.source(emitted, &placement),
                diagnostics,
            },
        ];
        if self.config.entry_file {
            let entry = entry::entry_unit(Target::Cpp, &module.path, &units, &exports);
            units.push(entry);
        }
        Ok(units)
    }
}
