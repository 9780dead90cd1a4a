//! 错误定义模块

use thiserror::Error;

/// LIS系统统一错误类型
#[derive(Error, Debug)]
pub enum LisError {
    #[error("配置错误: {0}")]
    Config(#[from] config::ConfigError),

    #[error("验证错误: {0}")]
    Validation(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("版本冲突: 期望版本 {expected}, 当前版本 {actual}")]
    Conflict { expected: u64, actual: u64 },

    #[error("无效状态转换: 从 {from} 到 {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("报警已被确认: {0}")]
    AlreadyAcknowledged(String),

    #[error("通知发送失败: {0}")]
    Delivery(String),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("系统内部错误: {0}")]
    Internal(String),
}

/// LIS系统统一结果类型
pub type Result<T> = std::result::Result<T, LisError>;
