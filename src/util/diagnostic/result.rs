//! 统一 Result 类型
//!
//! 降级核心的所有步骤都返回这个类型

use super::error::LowerError;

/// 统一结果类型
pub type Result<T, E = LowerError> = std::result::Result<T, E>;
