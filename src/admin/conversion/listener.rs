//! 变更生命周期监听器回调接口

use crate::admin::conversion::service::MutationKind;
use crate::admin::error::ServiceError;
use async_trait::async_trait;

/// 变更监听器（表现层可据此禁用按钮、弹出错误提示）
#[async_trait]
pub trait MutationListener: Send + Sync {
    /// 变更开始（回滚点已记录，乐观更新已写入）
    async fn on_mutation_start(&self, kind: MutationKind, operation_id: &str);

    /// 服务器确认成功
    async fn on_mutation_committed(&self, kind: MutationKind, operation_id: &str);

    /// 服务器失败，乐观状态已回滚
    async fn on_mutation_rolled_back(
        &self,
        kind: MutationKind,
        operation_id: &str,
        error: &ServiceError,
    );

    /// 结算完成，列表缓存已标记过期
    async fn on_mutation_settled(&self, kind: MutationKind, operation_id: &str);
}

/// 空实现（默认监听器）
pub struct EmptyMutationListener;

#[async_trait]
impl MutationListener for EmptyMutationListener {
    async fn on_mutation_start(&self, _kind: MutationKind, _operation_id: &str) {}
    async fn on_mutation_committed(&self, _kind: MutationKind, _operation_id: &str) {}
    async fn on_mutation_rolled_back(
        &self,
        _kind: MutationKind,
        _operation_id: &str,
        _error: &ServiceError,
    ) {
    }
    async fn on_mutation_settled(&self, _kind: MutationKind, _operation_id: &str) {}
}
