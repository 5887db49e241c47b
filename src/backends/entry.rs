//! Entry metadata file
//!
//! When [`EmitConfig::entry_file`](crate::util::config::EmitConfig) is set,
//! each backend appends `polylower-entry.json`, which lists the files it
//! produced for the module and the names the module exports.

use serde_json::json;

use crate::backends::{cst, FileKind, Target, TargetUnit};

pub const ENTRY_FILE: &str = "polylower-entry.json";

/// Build the metadata unit for `units`
pub fn entry_unit(
    target: Target,
    module_path: &[String],
    units: &[TargetUnit],
    exports: &[String],
) -> TargetUnit {
    let files: Vec<_> = units
        .iter()
        .map(|unit| json!({ "path": unit.path, "kind": unit.kind }))
        .collect();
    let value = json!({
        "module": module_path.join("/"),
        "target": target,
        "files": files,
        "exports": exports,
    });
    let text = format!("{:#}", value);
    TargetUnit {
        path: ENTRY_FILE.to_string(),
        kind: FileKind::Metadata,
        tree: cst::Unit {
            items: text.lines().map(|line| cst::Item::Raw(line.to_string())).collect(),
        },
        diagnostics: Vec::new(),
    }
}
