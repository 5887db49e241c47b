//! Shared helpers for the integration tests

use polylower::middle::ir::builder::*;
use polylower::middle::ir::{BuiltinOperator, Expr, Function, Module, TopLevel, Type};
use polylower::{translate_module, EmitConfig, FileKind, OutputFile, Target};

pub fn translate(
    module: &Module,
    target: Target,
) -> Vec<OutputFile> {
    translate_module(module, target, &EmitConfig::default()).unwrap()
}

/// Text of the first file of `kind`
pub fn file_text(
    files: &[OutputFile],
    kind: FileKind,
) -> String {
    files
        .iter()
        .find(|f| f.kind == kind)
        .map(|f| f.text.clone())
        .unwrap_or_else(|| panic!("no {:?} file", kind))
}

pub fn single(function: Function) -> Module {
    module(&["demo", "app"], vec![TopLevel::Function(exported(function))])
}

pub fn int_ref(text: &str) -> Expr {
    reference(text, Type::int())
}

pub fn plus(
    a: Expr,
    b: Expr,
) -> Expr {
    op(BuiltinOperator::PlusIntInt, vec![a, b], Type::int())
}

/// Whether some line of `text` trims to exactly `line`
pub fn has_line(
    text: &str,
    line: &str,
) -> bool {
    text.lines().any(|l| l.trim() == line)
}
