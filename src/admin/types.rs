use crate::admin::error::ServiceError;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

/// 服务器通用消息体：`{"message": "..."}`
///
/// 成功和失败响应都可能只带这一个字段。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerMessage {
    #[serde(default)]
    pub message: Option<String>,
}

/// 从失败响应体中提取错误信息，取不到时退化为通用错误
pub fn service_error_from_body(status: u16, body: &[u8]) -> ServiceError {
    match serde_json::from_slice::<ServerMessage>(body) {
        Ok(ServerMessage {
            message: Some(message),
        }) if !message.trim().is_empty() => ServiceError::new(Some(status), message),
        _ => ServiceError::generic(status),
    }
}

/// 通用 HTTP 响应处理：校验状态码，失败时转换为 `ServiceError`，成功时返回原始 body
///
/// 所有 API 都共用此方法，body 只能读取一次。
pub async fn handle_http_response(
    response: reqwest::Response,
    operation_name: &str,
) -> Result<Vec<u8>, ServiceError> {
    let status = response.status();

    let body_bytes = response.bytes().await.map_err(|e| {
        error!("[HTTP] {}读取响应 body 失败: {}", operation_name, e);
        ServiceError::new(Some(status.as_u16()), format!("读取响应失败: {}", e))
    })?;
    let body_str = String::from_utf8_lossy(&body_bytes);
    debug!("[HTTP] {}响应 Body: {}", operation_name, body_str);

    if !status.is_success() {
        error!(
            "[HTTP] {}请求失败，HTTP状态: {}, 响应: {}",
            operation_name, status, body_str
        );
        return Err(service_error_from_body(status.as_u16(), &body_bytes));
    }
    info!("[HTTP] {}请求成功，HTTP状态: {}", operation_name, status);

    Ok(body_bytes.to_vec())
}

/// 把成功响应体反序列化为目标类型
pub fn decode_body<T: serde::de::DeserializeOwned>(
    body: &[u8],
    operation_name: &str,
) -> Result<T, ServiceError> {
    serde_json::from_slice(body).map_err(|e| {
        error!(
            "[HTTP] {}反序列化失败: {:?}\n原始响应: {}",
            operation_name,
            e,
            String::from_utf8_lossy(body)
        );
        ServiceError::transport(format!("解析响应失败: {}", e))
    })
}
