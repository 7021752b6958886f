//! 转换管理客户端
//!
//! 组装 HTTP 客户端、列表缓存和变更协调器，是表现层唯一需要持有的对象。

use crate::admin::conversion::api::{ConversionApi, ConversionService};
use crate::admin::conversion::cache::{CacheStatus, ConversionCache};
use crate::admin::conversion::listener::MutationListener;
use crate::admin::conversion::models::{
    ConversionList, CreateResponse, NewConversion, RunResult,
};
use crate::admin::conversion::service::{MutationCoordinator, MutationHandle, MutationKind};
use crate::admin::error::{AdminError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

/// 转换服务默认地址
pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:5000";
/// 覆盖服务地址的环境变量
pub const ENV_API_URL: &str = "CONVERSION_ADMIN_API_URL";
/// 覆盖请求超时（秒）的环境变量
pub const ENV_TIMEOUT_SECS: &str = "CONVERSION_ADMIN_TIMEOUT_SECS";

/// 客户端配置
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    /// 转换服务基础地址（末尾的 `/` 会被去掉）
    pub api_base_url: String,
    /// 单个 HTTP 请求超时
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl ClientConfig {
    /// 创建默认配置
    pub fn new(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into().trim_end_matches('/').to_string(),
            request_timeout: Duration::from_secs(30),
            user_agent: format!("conversion-admin-sdk/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// 从环境变量读取配置，未设置的项使用默认值
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let base = lookup(ENV_API_URL)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
        let mut config = Self::new(base.trim());
        if let Some(raw) = lookup(ENV_TIMEOUT_SECS) {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                AdminError::Config(format!("{} 不是有效的秒数: {}", ENV_TIMEOUT_SECS, raw))
            })?;
            config.request_timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_API_BASE_URL)
    }
}

/// 转换管理客户端
///
/// 缓存和协调器都是显式构造的依赖，克隆客户端共享同一份缓存。
#[derive(Clone)]
pub struct AdminClient {
    config: ClientConfig,
    cache: ConversionCache,
    coordinator: MutationCoordinator,
}

impl AdminClient {
    /// 使用 reqwest 连接远端转换服务
    pub fn new(config: ClientConfig) -> Result<Self> {
        if reqwest::Url::parse(&config.api_base_url).is_err() {
            return Err(AdminError::Config(format!(
                "无效的服务地址: {}",
                config.api_base_url
            )));
        }
        let http_client = reqwest::ClientBuilder::new()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| AdminError::Config(format!("创建 HTTP 客户端失败: {}", e)))?;
        let api = ConversionApi::new(http_client, config.api_base_url.clone());
        Ok(Self::with_service(config, Arc::new(api)))
    }

    /// 注入自定义的服务实现
    pub fn with_service(config: ClientConfig, service: Arc<dyn ConversionService>) -> Self {
        info!(
            "[Client] 创建转换管理客户端，服务地址: {}",
            config.api_base_url
        );
        let cache = ConversionCache::new(service.clone());
        let coordinator = MutationCoordinator::new(cache.clone(), service);
        Self {
            config,
            cache,
            coordinator,
        }
    }

    /// 注册变更监听器
    pub fn set_mutation_listener(&mut self, listener: Arc<dyn MutationListener>) {
        self.coordinator.set_listener(listener);
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn cache(&self) -> &ConversionCache {
        &self.cache
    }

    pub fn coordinator(&self) -> &MutationCoordinator {
        &self.coordinator
    }

    /// 读取转换任务列表（读穿透）
    pub async fn read_conversions(&self) -> Result<Arc<ConversionList>> {
        Ok(self.cache.read().await?)
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<ConversionList>>> {
        self.cache.subscribe()
    }

    pub fn cache_status(&self) -> CacheStatus {
        self.cache.status()
    }

    pub fn is_pending(&self, kind: MutationKind) -> bool {
        self.coordinator.is_pending(kind)
    }

    pub fn spawn_add_conversion(&self, input: NewConversion) -> MutationHandle<CreateResponse> {
        self.coordinator.spawn_create(input)
    }

    pub fn spawn_delete_conversion(&self, id: i64) -> MutationHandle<()> {
        self.coordinator.spawn_delete(id)
    }

    pub fn spawn_run_conversion(&self, id: i64) -> MutationHandle<RunResult> {
        self.coordinator.spawn_run(id)
    }

    pub async fn add_conversion(&self, input: NewConversion) -> Result<CreateResponse> {
        self.coordinator.create(input).await
    }

    pub async fn delete_conversion(&self, id: i64) -> Result<()> {
        self.coordinator.delete(id).await
    }

    pub async fn run_conversion(&self, id: i64) -> Result<RunResult> {
        self.coordinator.run(id).await
    }

    /// 会话结束，丢弃缓存快照
    pub fn end_session(&self) {
        self.cache.reset();
    }
}
