//! 转换服务 HTTP API 客户端
//!
//! 负责所有转换任务相关的 HTTP 请求，不保留任何本地状态

use crate::admin::conversion::models::{
    ConversionList, ConversionRecord, CreateResponse, NewConversion, RunResult,
    CONVERSION_LIST_KEY,
};
use crate::admin::error::ServiceError;
use crate::admin::types::{decode_body, handle_http_response};
use async_trait::async_trait;
use tracing::{debug, info};

/// 远端转换服务接口
///
/// 缓存和变更协调器只依赖这个 trait，便于注入其他实现。
#[async_trait]
pub trait ConversionService: Send + Sync {
    /// 获取全部转换任务
    async fn list_conversions(&self) -> Result<ConversionList, ServiceError>;

    /// 新建转换任务（不做本地校验）
    async fn create_conversion(
        &self,
        input: &NewConversion,
        operation_id: &str,
    ) -> Result<CreateResponse, ServiceError>;

    /// 删除转换任务
    async fn delete_conversion(&self, id: i64, operation_id: &str) -> Result<(), ServiceError>;

    /// 触发执行转换任务；非幂等，重复调用会重复执行
    async fn run_conversion(&self, id: i64, operation_id: &str)
        -> Result<RunResult, ServiceError>;
}

/// 基于 reqwest 的转换服务客户端
pub struct ConversionApi {
    client: reqwest::Client,
    api_base_url: String,
}

impl ConversionApi {
    /// 创建新的转换 API 客户端
    ///
    /// `client` 应该已经在外部配置好超时等参数
    pub fn new(client: reqwest::Client, api_base_url: impl Into<String>) -> Self {
        let api_base_url = api_base_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            api_base_url,
        }
    }

    pub fn api_base_url(&self) -> &str {
        &self.api_base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base_url, path)
    }
}

#[async_trait]
impl ConversionService for ConversionApi {
    async fn list_conversions(&self) -> Result<ConversionList, ServiceError> {
        let url = self.url(CONVERSION_LIST_KEY);
        info!("[ConvAPI] 📡 请求转换任务列表");
        debug!("[ConvAPI]   请求URL: {}", url);

        let response = self.client.get(&url).send().await?;
        let body = handle_http_response(response, "转换任务列表").await?;
        let list: Vec<ConversionRecord> = decode_body(&body, "转换任务列表")?;

        info!("[ConvAPI] ✅ 转换任务列表响应，任务数: {}", list.len());
        debug!(
            "[ConvAPI]   任务ID: {:?}",
            list.iter().map(|c| c.id).collect::<Vec<_>>()
        );
        Ok(list)
    }

    async fn create_conversion(
        &self,
        input: &NewConversion,
        operation_id: &str,
    ) -> Result<CreateResponse, ServiceError> {
        let url = self.url("conversion");
        info!(
            "[ConvAPI] 📡 新建转换任务: {} -> {} ({})",
            input.db_path, input.schema_path, input.code_type
        );
        debug!("[ConvAPI]   请求URL: {}, 操作ID: {}", url, operation_id);

        let response = self
            .client
            .post(&url)
            .header("operationID", operation_id)
            .json(input)
            .send()
            .await?;
        let body = handle_http_response(response, "新建转换任务").await?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(CreateResponse::Acknowledged { message: None });
        }
        decode_body(&body, "新建转换任务")
    }

    async fn delete_conversion(&self, id: i64, operation_id: &str) -> Result<(), ServiceError> {
        let url = self.url(&format!("conversion/{}", id));
        info!("[ConvAPI] 📡 删除转换任务: id={}", id);
        debug!("[ConvAPI]   请求URL: {}, 操作ID: {}", url, operation_id);

        let response = self
            .client
            .delete(&url)
            .header("operationID", operation_id)
            .send()
            .await?;
        // 成功响应体内容不影响结果
        handle_http_response(response, "删除转换任务").await?;
        Ok(())
    }

    async fn run_conversion(
        &self,
        id: i64,
        operation_id: &str,
    ) -> Result<RunResult, ServiceError> {
        let url = self.url(&format!("run_conversion/{}", id));
        info!("[ConvAPI] 📡 执行转换任务: id={}", id);
        debug!("[ConvAPI]   请求URL: {}, 操作ID: {}", url, operation_id);

        let response = self
            .client
            .post(&url)
            .header("operationID", operation_id)
            .send()
            .await?;
        let body = handle_http_response(response, "执行转换任务").await?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(RunResult::default());
        }
        decode_body(&body, "执行转换任务")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admin::conversion::models::CodeType;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_test_api(base_url: &str) -> ConversionApi {
        let client = reqwest::Client::builder()
            .no_proxy()
            .build()
            .expect("Failed to create HTTP client");
        ConversionApi::new(client, format!("{}/", base_url))
    }

    #[tokio::test]
    async fn test_list_conversions_success() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/conversion_list"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": 1, "db_path": "a.db", "schema_path": "out", "code_type": "ts", "memo": "first"},
                {"id": 2, "db_path": "b.db", "schema_path": "gen", "code_type": "rs"}
            ])))
            .expect(1)
            .mount(&mock_server)
            .await;

        let api = create_test_api(&mock_server.uri());
        let list = api.list_conversions().await.unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].memo.as_deref(), Some("first"));
        assert_eq!(list[1].code_type, CodeType::Rs);
    }

    #[tokio::test]
    async fn test_list_conversions_error_message() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/conversion_list"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({"message": "db locked"})))
            .mount(&mock_server)
            .await;

        let api = create_test_api(&mock_server.uri());
        let err = api.list_conversions().await.unwrap_err();
        assert_eq!(err.status, Some(500));
        assert_eq!(err.message, "db locked");
    }

    #[tokio::test]
    async fn test_create_conversion_posts_json() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/conversion"))
            .and(body_json(json!({
                "db_path": "a.db",
                "schema_path": "out",
                "code_type": "ts",
                "memo": "nightly"
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"message": "Schema created successfully!"})),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let api = create_test_api(&mock_server.uri());
        let input = NewConversion::new("a.db", "out", CodeType::Ts, Some("nightly".into()));
        let resp = api.create_conversion(&input, "op-1").await.unwrap();
        assert_eq!(
            resp,
            CreateResponse::Acknowledged {
                message: Some("Schema created successfully!".into())
            }
        );
    }

    #[tokio::test]
    async fn test_create_conversion_empty_body() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/conversion"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&mock_server)
            .await;

        let api = create_test_api(&mock_server.uri());
        assert_eq!(api.api_base_url(), mock_server.uri());
        let input = NewConversion::new("a.db", "out", CodeType::Rs, None);
        let resp = api.create_conversion(&input, "op-6").await.unwrap();
        assert_eq!(resp, CreateResponse::Acknowledged { message: None });
    }

    #[tokio::test]
    async fn test_create_conversion_failure() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/conversion"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(json!({"message": "Destination schema folder not found!"})),
            )
            .mount(&mock_server)
            .await;

        let api = create_test_api(&mock_server.uri());
        let input = NewConversion::new("a.db", "missing", CodeType::Rs, None);
        let err = api.create_conversion(&input, "op-2").await.unwrap_err();
        assert_eq!(err.status, Some(400));
        assert_eq!(err.message, "Destination schema folder not found!");
    }

    #[tokio::test]
    async fn test_delete_conversion() {
        let mock_server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/conversion/4"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "ok"})))
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/conversion/9"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let api = create_test_api(&mock_server.uri());
        api.delete_conversion(4, "op-3").await.unwrap();

        let err = api.delete_conversion(9, "op-4").await.unwrap_err();
        assert_eq!(err, ServiceError::generic(404));
    }

    #[tokio::test]
    async fn test_run_conversion() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/run_conversion/3"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"message": "Conversion completed!", "files": 4})),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let api = create_test_api(&mock_server.uri());
        let result = api.run_conversion(3, "op-5").await.unwrap();
        assert_eq!(result.message.as_deref(), Some("Conversion completed!"));
        assert_eq!(result.extra.get("files"), Some(&json!(4)));
    }

    #[tokio::test]
    async fn test_transport_failure_has_no_status() {
        // 1 号端口无人监听，连接会被拒绝
        let api = create_test_api("http://127.0.0.1:1");
        let err = api.list_conversions().await.unwrap_err();
        assert_eq!(err.status, None);
    }
}
