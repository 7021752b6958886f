//! 转换任务变更协调层
//!
//! 每次变更都走同一个状态机：
//! `Idle -> Applying -> AwaitingServer -> {Committed | RolledBack} -> Settled`
//!
//! 1. 在缓存的同一把锁内记录回滚点 `previous` 并按变更类型乐观改写
//!    （新建追加占位记录，删除过滤掉目标，执行不改缓存），没有快照则跳过
//! 2. 并发的乐观更新依次叠加，不会互相覆盖
//! 3. 调用服务器
//! 4. 失败时写回 `previous`，错误原样返回给调用方
//! 5. 无论成败都 `invalidate()`，下一次读取以服务器为准
//!
//! 变更在独立的 tokio 任务中执行，调用方取消等待不会中断服务器调用，
//! 结算仍会发生。同类变更之间不做串行化，以最后完成的服务器往返为准。

use crate::admin::conversion::api::ConversionService;
use crate::admin::conversion::cache::ConversionCache;
use crate::admin::conversion::listener::{EmptyMutationListener, MutationListener};
use crate::admin::conversion::models::{
    ConversionList, ConversionRecord, CreateResponse, NewConversion, RunResult,
};
use crate::admin::error::{AdminError, ServiceError};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// 变更类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    Create,
    Delete,
    Run,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MutationKind::Create => "create",
            MutationKind::Delete => "delete",
            MutationKind::Run => "run",
        })
    }
}

/// 单次变更的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationState {
    Idle,
    Applying,
    AwaitingServer,
    Committed,
    RolledBack,
    Settled,
}

/// 服务器往返的结论
#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome<T> {
    Committed(T),
    RolledBack(ServiceError),
}

impl<T> MutationOutcome<T> {
    pub fn is_committed(&self) -> bool {
        matches!(self, MutationOutcome::Committed(_))
    }

    pub fn into_result(self) -> Result<T, ServiceError> {
        match self {
            MutationOutcome::Committed(value) => Ok(value),
            MutationOutcome::RolledBack(err) => Err(err),
        }
    }
}

/// 一次变更走完状态机后的完整记录
#[derive(Debug, Clone)]
pub struct MutationReport<T> {
    pub kind: MutationKind,
    pub operation_id: String,
    pub outcome: MutationOutcome<T>,
    /// 依次经历的状态
    pub transitions: Vec<MutationState>,
}

/// 在途变更的句柄
///
/// 丢弃句柄或调用 `cancel()` 只会放弃结果，服务器调用和结算照常进行。
pub struct MutationHandle<T> {
    kind: MutationKind,
    operation_id: String,
    join: JoinHandle<MutationReport<T>>,
    token: CancellationToken,
}

impl<T> MutationHandle<T> {
    pub fn kind(&self) -> MutationKind {
        self.kind
    }

    pub fn operation_id(&self) -> &str {
        &self.operation_id
    }

    /// 放弃等待结果（例如界面组件已卸载）
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// 等待完整的状态机记录
    pub async fn report(self) -> Result<MutationReport<T>, AdminError> {
        let MutationHandle { join, token, .. } = self;
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(AdminError::Cancelled),
            joined = join => joined.map_err(|e| {
                AdminError::Service(ServiceError::transport(format!("变更任务异常终止: {}", e)))
            }),
        }
    }

    /// 等待结果；服务器错误原样返回
    pub async fn wait(self) -> Result<T, AdminError> {
        let report = self.report().await?;
        Ok(report.outcome.into_result()?)
    }
}

type PendingCounts = Arc<Mutex<HashMap<MutationKind, usize>>>;

/// 在途计数，任务结束时自动减一
struct PendingGuard {
    pending: PendingCounts,
    kind: MutationKind,
}

impl PendingGuard {
    fn enter(pending: &PendingCounts, kind: MutationKind) -> Self {
        let mut counts = pending.lock().unwrap_or_else(|e| e.into_inner());
        *counts.entry(kind).or_default() += 1;
        Self {
            pending: pending.clone(),
            kind,
        }
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        let mut counts = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(count) = counts.get_mut(&self.kind) {
            *count = count.saturating_sub(1);
        }
    }
}

type Apply = Box<dyn FnOnce(&ConversionList) -> ConversionList + Send>;

/// 变更协调器
#[derive(Clone)]
pub struct MutationCoordinator {
    cache: ConversionCache,
    service: Arc<dyn ConversionService>,
    listener: Arc<dyn MutationListener>,
    pending: PendingCounts,
}

impl MutationCoordinator {
    /// 创建协调器（使用默认空监听器）
    pub fn new(cache: ConversionCache, service: Arc<dyn ConversionService>) -> Self {
        Self::with_listener(cache, service, Arc::new(EmptyMutationListener))
    }

    pub fn with_listener(
        cache: ConversionCache,
        service: Arc<dyn ConversionService>,
        listener: Arc<dyn MutationListener>,
    ) -> Self {
        Self {
            cache,
            service,
            listener,
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn set_listener(&mut self, listener: Arc<dyn MutationListener>) {
        self.listener = listener;
    }

    pub fn cache(&self) -> &ConversionCache {
        &self.cache
    }

    /// 某类变更当前在途数量
    pub fn pending(&self, kind: MutationKind) -> usize {
        let counts = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        counts.get(&kind).copied().unwrap_or(0)
    }

    pub fn is_pending(&self, kind: MutationKind) -> bool {
        self.pending(kind) > 0
    }

    /// 新建转换任务
    ///
    /// 乐观追加一条占位记录，占位 ID 取当前列表长度；并发新建时占位 ID 可能重复，
    /// 结算后的重新拉取会以服务器分配的 ID 为准。
    pub fn spawn_create(&self, input: NewConversion) -> MutationHandle<CreateResponse> {
        let operation_id = Uuid::new_v4().to_string();
        let service = self.service.clone();
        let op_id = operation_id.clone();
        let tentative = input.clone();
        let apply: Apply = Box::new(move |previous: &ConversionList| {
            let mut next = previous.clone();
            next.push(ConversionRecord::tentative(
                &tentative,
                previous.len() as i64,
            ));
            next
        });
        let call = async move { service.create_conversion(&input, &op_id).await };
        self.spawn(MutationKind::Create, operation_id, Some(apply), call)
    }

    /// 删除转换任务，乐观地从列表中移除
    pub fn spawn_delete(&self, id: i64) -> MutationHandle<()> {
        let operation_id = Uuid::new_v4().to_string();
        let service = self.service.clone();
        let op_id = operation_id.clone();
        let apply: Apply = Box::new(move |previous: &ConversionList| {
            previous.iter().filter(|c| c.id != id).cloned().collect()
        });
        let call = async move { service.delete_conversion(id, &op_id).await };
        self.spawn(MutationKind::Delete, operation_id, Some(apply), call)
    }

    /// 执行转换任务；列表不变，不做本地存在性检查
    pub fn spawn_run(&self, id: i64) -> MutationHandle<RunResult> {
        let operation_id = Uuid::new_v4().to_string();
        let service = self.service.clone();
        let op_id = operation_id.clone();
        let call = async move { service.run_conversion(id, &op_id).await };
        self.spawn(MutationKind::Run, operation_id, None, call)
    }

    pub async fn create(&self, input: NewConversion) -> Result<CreateResponse, AdminError> {
        self.spawn_create(input).wait().await
    }

    pub async fn delete(&self, id: i64) -> Result<(), AdminError> {
        self.spawn_delete(id).wait().await
    }

    pub async fn run(&self, id: i64) -> Result<RunResult, AdminError> {
        self.spawn_run(id).wait().await
    }

    fn spawn<T, Fut>(
        &self,
        kind: MutationKind,
        operation_id: String,
        apply: Option<Apply>,
        call: Fut,
    ) -> MutationHandle<T>
    where
        T: Send + 'static,
        Fut: Future<Output = Result<T, ServiceError>> + Send + 'static,
    {
        let token = CancellationToken::new();
        let guard = PendingGuard::enter(&self.pending, kind);
        let join = tokio::spawn(self.clone().execute(
            kind,
            operation_id.clone(),
            token.clone(),
            apply,
            call,
            guard,
        ));
        MutationHandle {
            kind,
            operation_id,
            join,
            token,
        }
    }

    async fn execute<T, Fut>(
        self,
        kind: MutationKind,
        operation_id: String,
        token: CancellationToken,
        apply: Option<Apply>,
        call: Fut,
        _guard: PendingGuard,
    ) -> MutationReport<T>
    where
        Fut: Future<Output = Result<T, ServiceError>> + Send,
    {
        let mut transitions = vec![MutationState::Idle];
        let mut enter = |state: MutationState| {
            debug!("[ConvMutation] {} {} -> {:?}", kind, operation_id, state);
            transitions.push(state);
        };

        info!("[ConvMutation] 🚀 变更开始: kind={}, op={}", kind, operation_id);
        enter(MutationState::Applying);
        // 回滚点和乐观改写在缓存的同一把锁内完成
        let previous = match apply {
            Some(apply) => {
                let previous = self.cache.apply(apply);
                match &previous {
                    Some(previous) => debug!(
                        "[ConvMutation] 乐观更新已写入，回滚点: {} 条",
                        previous.len()
                    ),
                    None => debug!("[ConvMutation] 缓存中无列表，跳过乐观更新"),
                }
                previous
            }
            None => None,
        };
        self.listener.on_mutation_start(kind, &operation_id).await;

        enter(MutationState::AwaitingServer);
        let outcome = match call.await {
            Ok(value) => {
                enter(MutationState::Committed);
                info!("[ConvMutation] ✅ 服务器确认: kind={}, op={}", kind, operation_id);
                self.listener.on_mutation_committed(kind, &operation_id).await;
                MutationOutcome::Committed(value)
            }
            Err(err) => {
                enter(MutationState::RolledBack);
                warn!(
                    "[ConvMutation] 服务器失败，回滚: kind={}, op={}, 错误: {}",
                    kind, operation_id, err
                );
                if let Some(previous) = &previous {
                    self.cache.write(previous.clone());
                }
                self.listener
                    .on_mutation_rolled_back(kind, &operation_id, &err)
                    .await;
                MutationOutcome::RolledBack(err)
            }
        };

        self.cache.invalidate();
        enter(MutationState::Settled);
        self.listener.on_mutation_settled(kind, &operation_id).await;

        if token.is_cancelled() {
            info!(
                "[ConvMutation] 调用方已放弃等待，结果丢弃: kind={}, op={}",
                kind, operation_id
            );
        }

        MutationReport {
            kind,
            operation_id,
            outcome,
            transitions,
        }
    }
}
