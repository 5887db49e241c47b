//! Per-target reserved word tables

use once_cell::sync::Lazy;
use std::collections::HashSet;

/// How a reserved word is made usable as an identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escape {
    /// Prepend a marker, e.g. C# verbatim identifiers `@class`
    Prefix(&'static str),
    /// Append a marker, e.g. `class_`
    Suffix(&'static str),
}

/// Reserved words of one target plus its escaping rule
#[derive(Debug)]
pub struct KeywordTable {
    pub target: &'static str,
    words: HashSet<&'static str>,
    escape: Escape,
}

impl KeywordTable {
    fn new(
        target: &'static str,
        words: &[&'static str],
        escape: Escape,
    ) -> Self {
        Self {
            target,
            words: words.iter().copied().collect(),
            escape,
        }
    }

    pub fn is_reserved(
        &self,
        ident: &str,
    ) -> bool {
        self.words.contains(ident)
    }

    /// Escape `ident` if it is reserved, otherwise return it unchanged
    pub fn escape(
        &self,
        ident: &str,
    ) -> String {
        if !self.is_reserved(ident) {
            return ident.to_string();
        }
        match self.escape {
            Escape::Prefix(mark) => format!("{}{}", mark, ident),
            Escape::Suffix(mark) => format!("{}{}", ident, mark),
        }
    }
}

pub static CSHARP: Lazy<KeywordTable> = Lazy::new(|| {
    KeywordTable::new(
        "csharp",
        &[
            "abstract", "as", "base", "bool", "break", "byte", "case", "catch", "char", "checked",
            "class", "const", "continue", "decimal", "default", "delegate", "do", "double", "else",
            "enum", "event", "explicit", "extern", "false", "finally", "fixed", "float", "for",
            "foreach", "goto", "if", "implicit", "in", "int", "interface", "internal", "is", "lock",
            "long", "namespace", "new", "null", "object", "operator", "out", "override", "params",
            "private", "protected", "public", "readonly", "ref", "return", "sbyte", "sealed",
            "short", "sizeof", "stackalloc", "static", "string", "struct", "switch", "this",
            "throw", "true", "try", "typeof", "uint", "ulong", "unchecked", "unsafe", "ushort",
            "using", "virtual", "void", "volatile", "while",
        ],
        Escape::Prefix("@"),
    )
});

pub static CPP: Lazy<KeywordTable> = Lazy::new(|| {
    KeywordTable::new(
        "cpp",
        &[
            "alignas", "alignof", "and", "and_eq", "asm", "auto", "bitand", "bitor", "bool",
            "break", "case", "catch", "char", "char8_t", "char16_t", "char32_t", "class", "compl",
            "concept", "const", "consteval", "constexpr", "constinit", "const_cast", "continue",
            "co_await", "co_return", "co_yield", "decltype", "default", "delete", "do", "double",
            "dynamic_cast", "else", "enum", "explicit", "export", "extern", "false", "float", "for",
            "friend", "goto", "if", "inline", "int", "long", "mutable", "namespace", "new",
            "noexcept", "not", "not_eq", "nullptr", "operator", "or", "or_eq", "private",
            "protected", "public", "register", "reinterpret_cast", "requires", "return", "short",
            "signed", "sizeof", "static", "static_assert", "static_cast", "struct", "switch",
            "template", "this", "thread_local", "throw", "true", "try", "typedef", "typeid",
            "typename", "union", "unsigned", "using", "virtual", "void", "volatile", "wchar_t",
            "while", "xor", "xor_eq",
            // runtime namespace roots
            "std", "temper",
        ],
        Escape::Suffix("_"),
    )
});
