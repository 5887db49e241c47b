//! Target backends
//!
//! Each backend turns one lowered [`Module`] into the source files of a
//! C-family target. The heavy lifting is shared: [`emit`] walks the IR once,
//! invoking the middle passes lazily per function, and builds a [`cst::Unit`]
//! per file; a [`emit::Dialect`] supplies the target-specific renderings.
//!
//! # Architecture
//!
//! ```text
//!        Module (IR)
//!            |
//!            v
//!   emit::ModuleEmitter  --- capture / failure / coroutine / escape
//!            |
//!     +------+------+
//!     |             |
//!  CSharp          Cpp        (emit::Dialect)
//!     |             |
//!     +------+------+
//!            |
//!            v
//!   TargetUnit (cst::Unit) --- cst::Printer ---> OutputFile
//! ```

pub mod cpp;
pub mod cst;
pub mod csharp;
pub mod emit;
pub mod entry;
pub mod support;

use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::middle::ir::Module;
use crate::middle::names::{keywords, IdentStyle, KeywordTable};
use crate::util::config::EmitConfig;
use crate::util::diagnostic::{Diagnostic, Result};

/// Supported targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    CSharp,
    Cpp,
}

impl Target {
    pub const ALL: [Target; 2] = [Target::CSharp, Target::Cpp];

    pub fn profile(self) -> TargetProfile {
        match self {
            Target::CSharp => TargetProfile {
                try_is_barrier: false,
                keywords: &keywords::CSHARP,
                local_style: IdentStyle::Camel,
                type_style: IdentStyle::Pascal,
                member_style: IdentStyle::Camel,
                function_style: IdentStyle::Pascal,
                namespace_style: IdentStyle::Pascal,
            },
            Target::Cpp => TargetProfile {
                try_is_barrier: true,
                keywords: &keywords::CPP,
                local_style: IdentStyle::Snake,
                type_style: IdentStyle::Pascal,
                member_style: IdentStyle::Snake,
                function_style: IdentStyle::Snake,
                namespace_style: IdentStyle::Snake,
            },
        }
    }
}

impl fmt::Display for Target {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Target::CSharp => write!(f, "csharp"),
            Target::Cpp => write!(f, "cpp"),
        }
    }
}

/// Fixed per-target lowering and naming choices
#[derive(Debug, Clone, Copy)]
pub struct TargetProfile {
    /// try/recover bodies run inside a callback, so jumps cannot cross them
    pub try_is_barrier: bool,
    pub keywords: &'static KeywordTable,
    pub local_style: IdentStyle,
    pub type_style: IdentStyle,
    pub member_style: IdentStyle,
    pub function_style: IdentStyle,
    pub namespace_style: IdentStyle,
}

/// Role of an output file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Source,
    Header,
    Metadata,
}

/// A file before printing
#[derive(Debug, Clone, PartialEq)]
pub struct TargetUnit {
    /// Path relative to the output root, `/`-separated
    pub path: String,
    pub kind: FileKind,
    pub tree: cst::Unit,
    pub diagnostics: Vec<Diagnostic>,
}

/// A printed file
#[derive(Debug, Clone, PartialEq)]
pub struct OutputFile {
    pub path: String,
    pub kind: FileKind,
    /// MIME type of `text`
    pub mime: &'static str,
    pub text: String,
    pub diagnostics: Vec<Diagnostic>,
}

impl OutputFile {
    /// Print a unit
    pub fn from_unit(
        target: Target,
        unit: TargetUnit,
    ) -> Self {
        let mime = mime_type(target, unit.kind);
        Self {
            text: cst::Printer::print(&unit.tree),
            path: unit.path,
            kind: unit.kind,
            mime,
            diagnostics: unit.diagnostics,
        }
    }
}

pub fn mime_type(
    target: Target,
    kind: FileKind,
) -> &'static str {
    match (target, kind) {
        (_, FileKind::Metadata) => "application/json",
        (Target::CSharp, _) => "text/x-csharp",
        (Target::Cpp, FileKind::Header) => "text/x-c++hdr",
        (Target::Cpp, FileKind::Source) => "text/x-c++src",
    }
}

/// Namespace segments of a module: the library name, then the rest of the path
///
/// The first path segment names the library unless `library` overrides it.
/// Each segment goes through `style` and the target's keyword escaping.
pub fn module_segments(
    module_path: &[String],
    library: Option<&str>,
    profile: &TargetProfile,
    style: IdentStyle,
) -> SmallVec<[String; 4]> {
    let (first, rest) = match module_path.split_first() {
        Some((first, rest)) => (first.as_str(), rest),
        None => ("module", &[][..]),
    };
    let library = library.unwrap_or(first);
    std::iter::once(library)
        .chain(rest.iter().map(String::as_str))
        .map(|segment| {
            let converted = style.convert(segment);
            let converted = if converted.is_empty() {
                style.convert("module")
            } else {
                converted
            };
            profile.keywords.escape(&converted)
        })
        .collect()
}

/// One target backend
pub trait Backend {
    fn target(&self) -> Target;

    /// Lower a module to unprinted files
    fn lower(
        &self,
        module: &Module,
    ) -> Result<Vec<TargetUnit>>;

    /// Lower and print a module
    fn translate(
        &self,
        module: &Module,
    ) -> Result<Vec<OutputFile>> {
        let target = self.target();
        Ok(self
            .lower(module)?
            .into_iter()
            .map(|unit| OutputFile::from_unit(target, unit))
            .collect())
    }
}

/// The backend for `target`
pub fn backend_for(
    target: Target,
    config: &EmitConfig,
) -> Box<dyn Backend> {
    match target {
        Target::CSharp => Box::new(csharp::CSharpBackend::new(config.clone())),
        Target::Cpp => Box::new(cpp::CppBackend::new(config.clone())),
    }
}
