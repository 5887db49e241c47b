//! 诊断数据结构
//!
//! 两类问题：
//!
//! - 目标语言尚未支持的构造：插入占位节点并记录一条 [`Diagnostic`]，翻译继续
//! - IR 契约违规：返回 [`LowerError`]，终止当前模块的翻译

use crate::util::span::Span;

/// 诊断严重级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Error,
    Warning,
    Info,
    Hint,
}

impl Severity {
    /// 检查是否为错误级别
    pub fn is_error(&self) -> bool {
        matches!(self, Severity::Error)
    }
}

impl std::fmt::Display for Severity {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Info => write!(f, "info"),
            Severity::Hint => write!(f, "hint"),
        }
    }
}

/// 附着在输出文件上的非致命诊断
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// 严重级别
    pub severity: Severity,
    /// 诊断码
    pub code: &'static str,
    /// 已渲染的消息
    pub message: String,
    /// 位置信息
    pub span: Option<Span>,
}

impl Diagnostic {
    /// 占位节点对应的诊断
    pub fn unimplemented(
        message: impl Into<String>,
        span: Option<Span>,
    ) -> Self {
        Self {
            severity: Severity::Warning,
            code: "L0001",
            message: message.into(),
            span,
        }
    }

    /// 无法解析的运算符或标准库引用
    pub fn unresolved_support(
        message: impl Into<String>,
        span: Option<Span>,
    ) -> Self {
        Self {
            severity: Severity::Warning,
            code: "L0002",
            message: message.into(),
            span,
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "{}[{}]: {}", self.severity, self.code, self.message)?;
        if let Some(span) = self.span {
            write!(f, " at {}", span)?;
        }
        Ok(())
    }
}

/// IR 契约违规（上游阶段的缺陷，不可恢复）
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LowerError {
    #[error("handler scope assigning `{target}` at {span} is not immediately followed by a check of `{flag}`")]
    UnpairedHandlerScope {
        target: String,
        flag: String,
        span: Span,
    },

    #[error("capture container #{activation} has no hoisted member `{member}`")]
    UnhoistedField { activation: usize, member: String },

    #[error("capture container #{0} was never allocated")]
    UnknownActivation(usize),

    #[error("{kind} at {span} targets label `{label}`, which encloses nothing here")]
    UnboundLabel {
        kind: &'static str,
        label: String,
        span: Span,
    },

    #[error("unlabeled {kind} at {span} is not inside a loop")]
    JumpOutsideLoop { kind: &'static str, span: Span },

    #[error("suspension point at {span} in `{function}`, which is neither a generator nor async")]
    StraySuspension { function: String, span: Span },
}

impl LowerError {
    /// 出错节点的位置（如有）
    pub fn span(&self) -> Option<Span> {
        match self {
            LowerError::UnpairedHandlerScope { span, .. }
            | LowerError::UnboundLabel { span, .. }
            | LowerError::JumpOutsideLoop { span, .. }
            | LowerError::StraySuspension { span, .. } => Some(*span),
            LowerError::UnhoistedField { .. } | LowerError::UnknownActivation(_) => None,
        }
    }
}
