//! 模块翻译会话
//!
//! 一个模块一次翻译的全部可变状态都在这里：名字表、活动记录池、
//! 当前失败值栈、循环栈、临时名计数器与非致命诊断。会话只属于一个模块，
//! 不同模块之间不共享。

use tracing::warn;

use crate::middle::capture::ActivationArena;
use crate::middle::ir::{visit, ActivationId, Expr, Label, Module, Name};
use crate::middle::names::NameAllocator;
use crate::util::config::CaptureConfig;
use crate::util::diagnostic::Diagnostic;
use crate::util::span::Span;

/// 目标相关的降级选项
#[derive(Debug, Clone, Default)]
pub struct LowerOptions {
    /// try/recover 是否是无法跳出的边界（需要逃逸计划）
    pub try_is_barrier: bool,
    pub capture: CaptureConfig,
}

/// 循环栈帧
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopFrame {
    /// 循环标签；源码无标签时为合成临时名
    pub label: Label,
    /// 标签是否来自源码
    pub explicit: bool,
}

/// 模块翻译会话
#[derive(Debug)]
pub struct Session {
    pub module_path: Vec<String>,
    pub names: NameAllocator,
    pub arena: ActivationArena,
    pub options: LowerOptions,
    /// 当前可见的活动记录（由外到内）
    activations: Vec<ActivationId>,
    /// 当前失败值持有者（由外到内）
    failures: Vec<Expr>,
    loops: Vec<LoopFrame>,
    next_uid: u32,
    diagnostics: Vec<Diagnostic>,
}

impl Session {
    pub fn new(
        module: &Module,
        names: NameAllocator,
        options: LowerOptions,
    ) -> Self {
        let next_uid = visit::max_temporary_uid(module).map_or(0, |max| max + 1);
        Self {
            module_path: module.path.clone(),
            names,
            arena: ActivationArena::default(),
            options,
            activations: Vec::new(),
            failures: Vec::new(),
            loops: Vec::new(),
            next_uid,
            diagnostics: Vec::new(),
        }
    }

    /// 新的临时名，模块内唯一
    pub fn temporary(
        &mut self,
        hint: impl Into<String>,
    ) -> Name {
        let uid = self.next_uid;
        self.next_uid += 1;
        Name::temporary(hint, uid)
    }

    // ---- 失败值栈 ----

    pub fn push_failure(
        &mut self,
        holder: Expr,
    ) {
        self.failures.push(holder);
    }

    pub fn pop_failure(&mut self) -> Option<Expr> {
        self.failures.pop()
    }

    /// 最近的失败值
    pub fn current_failure(&self) -> Option<&Expr> {
        self.failures.last()
    }

    // ---- 循环栈 ----

    /// 进入循环，返回其标签
    pub fn enter_loop(
        &mut self,
        label: Option<&Label>,
    ) -> Label {
        let frame = match label {
            Some(label) => LoopFrame {
                label: label.clone(),
                explicit: true,
            },
            None => LoopFrame {
                label: self.temporary("loop"),
                explicit: false,
            },
        };
        let label = frame.label.clone();
        self.loops.push(frame);
        label
    }

    pub fn exit_loop(&mut self) {
        self.loops.pop();
    }

    pub fn innermost_loop(&self) -> Option<&LoopFrame> {
        self.loops.last()
    }

    pub fn loop_depth(&self) -> usize {
        self.loops.len()
    }

    /// 函数边界：局部函数体内看不到外层循环
    pub fn take_loops(&mut self) -> Vec<LoopFrame> {
        std::mem::take(&mut self.loops)
    }

    pub fn restore_loops(
        &mut self,
        loops: Vec<LoopFrame>,
    ) {
        self.loops = loops;
    }

    // ---- 活动记录 ----

    pub fn enter_activation(
        &mut self,
        id: ActivationId,
    ) {
        self.activations.push(id);
    }

    pub fn exit_activation(&mut self) {
        self.activations.pop();
    }

    pub fn current_activation(&self) -> Option<ActivationId> {
        self.activations.last().copied()
    }

    // ---- 诊断 ----

    /// 记录占位节点
    pub fn unimplemented(
        &mut self,
        what: impl Into<String>,
        span: Span,
    ) {
        let what = what.into();
        warn!("unimplemented in {}: {}", self.module_path.join("."), what);
        let span = if span.is_dummy() { None } else { Some(span) };
        self.diagnostics.push(Diagnostic::unimplemented(what, span));
    }

    pub fn note(
        &mut self,
        diagnostic: Diagnostic,
    ) {
        warn!("{}", diagnostic);
        self.diagnostics.push(diagnostic);
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }
}
