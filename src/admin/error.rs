//! 错误类型定义
//!
//! 核心层只产生 `ServiceError`（远端拒绝或传输失败）；
//! `ValidationError` 由表现层在调用变更之前自行检查。

use thiserror::Error;

/// 远端转换服务返回的错误（HTTP 非 2xx 或传输失败）
///
/// `status` 为 `None` 表示请求根本没有拿到 HTTP 响应（连接失败、超时、响应体读取失败等）。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ServiceError {
    /// HTTP 状态码
    pub status: Option<u16>,
    /// 面向操作人员的错误信息（优先取服务器 JSON 中的 message）
    pub message: String,
}

impl ServiceError {
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// 传输层失败（没有 HTTP 状态码）
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(None, message)
    }

    /// 服务器未给出 message 时使用的通用错误
    pub fn generic(status: u16) -> Self {
        Self::new(Some(status), format!("请求失败，HTTP状态: {}", status))
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        Self {
            status: err.status().map(|s| s.as_u16()),
            message: format!("请求失败: {}", err),
        }
    }
}

/// 调用方输入不合法
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// SDK 对外暴露的统一错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdminError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// 调用方放弃了等待；服务端调用仍会执行完毕并触发缓存失效
    #[error("调用方已取消等待")]
    Cancelled,

    #[error("配置错误: {0}")]
    Config(String),
}

impl AdminError {
    /// 取出服务错误（若是）
    pub fn as_service(&self) -> Option<&ServiceError> {
        match self {
            AdminError::Service(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T, E = AdminError> = std::result::Result<T, E>;
