//! polylower
//!
//! Shared lowering core of a multi-target source-to-source compiler, with
//! C# and C++ emitters. A frontend hands over one typed, fully resolved
//! [`Module`] at a time; the crate rewrites closures into capture
//! containers, lowers failure handling, turns generators and async
//! functions into state machines, and prints the target files.
//!
//! # Example
//!
//! ```
//! use polylower::middle::ir::builder::*;
//! use polylower::middle::ir::{TopLevel, Type};
//! use polylower::{translate_module, EmitConfig, Target};
//!
//! let module = module(
//!     &["hello"],
//!     vec![TopLevel::Function(exported(function(
//!         "greet",
//!         vec![],
//!         Type::void(),
//!         vec![print(string("hi"))],
//!     )))],
//! );
//! let files = translate_module(&module, Target::CSharp, &EmitConfig::default()).unwrap();
//! assert_eq!(files[0].path, "Hello/HelloGlobal.cs");
//! ```

#![warn(rust_2018_idioms)]

pub mod backends;
pub mod middle;
pub mod util;

// Re-exports
pub use anyhow::{Context, Result};
pub use backends::{backend_for, Backend, FileKind, OutputFile, Target};
pub use middle::ir::Module;
pub use util::config::EmitConfig;
pub use util::diagnostic::{Diagnostic, LowerError};

use tracing::debug;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Translate one module for one target
///
/// Fatal lowering errors come back with the module path attached.
pub fn translate_module(
    module: &Module,
    target: Target,
    config: &EmitConfig,
) -> Result<Vec<OutputFile>> {
    let path = module.path.join("/");
    debug!("translating `{}` for {}", path, target);
    let files = backend_for(target, config)
        .translate(module)
        .with_context(|| format!("failed to translate module `{}` for {}", path, target))?;
    debug!("`{}` produced {} file(s)", path, files.len());
    Ok(files)
}

/// Translate one module for every supported target
pub fn translate_all(
    module: &Module,
    config: &EmitConfig,
) -> Result<Vec<(Target, Vec<OutputFile>)>> {
    Target::ALL
        .iter()
        .map(|&target| Ok((target, translate_module(module, target, config)?)))
        .collect()
}
