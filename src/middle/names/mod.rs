//! 名字分配器
//!
//! 把 IR 名字映射为目标语言标识符：先做风格转换，再做关键字转义，最后在
//! 整条作用域链上检查冲突并追加数字后缀。同一 IR 名字在其作用域内只分配一次。

pub mod keywords;
pub mod style;

use std::collections::{HashMap, HashSet};

use tracing::trace;
use unicode_ident::{is_xid_continue, is_xid_start};

use crate::middle::ir::Name;
pub use keywords::KeywordTable;
pub use style::IdentStyle;

/// 一层词法作用域
#[derive(Debug, Default)]
struct NameScope {
    /// 已占用的目标标识符
    taken: HashSet<String>,
    /// 本层分配过的 IR 名字
    assigned: HashMap<Name, String>,
}

/// 容器成员种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKind {
    Field,
    Method,
}

/// 一个捕获容器的成员名空间；字段与方法共用
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemberTable {
    taken: HashSet<String>,
    assigned: HashMap<(MemberKind, Name), String>,
}

impl MemberTable {
    /// 预先占用一个标识符（如父链接成员）
    pub fn reserve(
        &mut self,
        ident: &str,
    ) {
        self.taken.insert(ident.to_string());
    }

    pub fn lookup(
        &self,
        kind: MemberKind,
        name: &Name,
    ) -> Option<&str> {
        self.assigned.get(&(kind, name.clone())).map(String::as_str)
    }
}

/// 名字分配器
#[derive(Debug)]
pub struct NameAllocator {
    keywords: &'static KeywordTable,
    local_style: IdentStyle,
    scopes: Vec<NameScope>,
}

impl NameAllocator {
    pub fn new(
        keywords: &'static KeywordTable,
        local_style: IdentStyle,
    ) -> Self {
        Self {
            keywords,
            local_style,
            scopes: vec![NameScope::default()],
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(NameScope::default());
    }

    /// 弹出作用域；根作用域永不弹出
    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// 把目标标识符标记为已占用（运行时名字、命名空间根等）
    pub fn reserve(
        &mut self,
        ident: &str,
    ) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.taken.insert(ident.to_string());
        }
    }

    /// 已分配的标识符
    pub fn lookup(
        &self,
        name: &Name,
    ) -> Option<&str> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.assigned.get(name).map(String::as_str))
    }

    /// 取得 `name` 的标识符；未分配时在当前作用域分配
    pub fn ident(
        &mut self,
        name: &Name,
    ) -> String {
        match self.lookup(name) {
            Some(ident) => ident.to_string(),
            None => self.declare(name),
        }
    }

    /// 在当前作用域以局部风格分配
    pub fn declare(
        &mut self,
        name: &Name,
    ) -> String {
        self.declare_styled(name, self.local_style)
    }

    /// 在当前作用域以指定风格分配；同一作用域重复声明返回原标识符
    pub fn declare_styled(
        &mut self,
        name: &Name,
        style: IdentStyle,
    ) -> String {
        if let Some(existing) = self.scopes.last().and_then(|scope| scope.assigned.get(name)) {
            return existing.clone();
        }
        let base = self.keywords.escape(&base_ident(name, style));
        let mut candidate = base.clone();
        let mut suffix = 2;
        while self.is_taken(&candidate) {
            candidate = format!("{}_{}", base, suffix);
            suffix += 1;
        }
        trace!("name {} -> {}", name, candidate);
        if let Some(scope) = self.scopes.last_mut() {
            scope.taken.insert(candidate.clone());
            scope.assigned.insert(name.clone(), candidate.clone());
        }
        candidate
    }

    fn is_taken(
        &self,
        ident: &str,
    ) -> bool {
        self.scopes.iter().any(|scope| scope.taken.contains(ident))
    }

    /// 成员标识符（容器字段、方法），不进入作用域链；遮蔽序号并入后缀
    pub fn member(
        &self,
        name: &Name,
        style: IdentStyle,
    ) -> String {
        let base = base_ident(name, style);
        let base = match name {
            Name::Stable { disambiguator, .. } if *disambiguator > 0 => {
                format!("{}_{}", base, disambiguator)
            }
            _ => base,
        };
        self.keywords.escape(&base)
    }
}

impl NameAllocator {
    /// 在容器成员名空间中分配；与已有成员冲突时追加数字后缀
    pub fn allocate_member(
        &self,
        table: &mut MemberTable,
        kind: MemberKind,
        name: &Name,
        style: IdentStyle,
    ) -> String {
        if let Some(existing) = table.lookup(kind, name) {
            return existing.to_string();
        }
        let base = self.member(name, style);
        let mut candidate = base.clone();
        let mut suffix = 2;
        while table.taken.contains(&candidate) {
            candidate = format!("{}_{}", base, suffix);
            suffix += 1;
        }
        trace!("member {} -> {}", name, candidate);
        table.taken.insert(candidate.clone());
        table.assigned.insert((kind, name.clone()), candidate.clone());
        candidate
    }
}

/// 风格转换并修正为合法标识符
fn base_ident(
    name: &Name,
    style: IdentStyle,
) -> String {
    let mut text = style.convert(name.text());
    if text.is_empty() {
        text.push('v');
    }
    let mut ident: String = text
        .chars()
        .map(|c| if is_xid_continue(c) { c } else { '_' })
        .collect();
    if let Some(first) = ident.chars().next() {
        if !is_xid_start(first) && first != '_' {
            ident.insert(0, '_');
        }
    }
    match name {
        Name::Temporary { uid, .. } => format!("{}_{}", ident, uid),
        Name::Stable { .. } => ident,
    }
}
