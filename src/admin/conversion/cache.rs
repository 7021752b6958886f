//! 转换任务列表缓存
//!
//! 进程内唯一的列表快照槽位，按 `CONVERSION_LIST_KEY` 寻址：
//! - `read()` 读穿透：快照存在且未过期时直接返回，否则拉取服务器数据
//! - `write()` 整体替换快照（乐观更新和回滚都走这里）
//! - `invalidate()` 只标记过期，不清空当前值，避免界面闪成空列表
//! - `get_snapshot()` 不等待的窥视，用于变更前记录回滚点
//!
//! 同一时刻最多一个拉取任务在途，并发的读取共享同一个结果。
//! 拉取在独立的 tokio 任务里执行，读取方放弃等待不会中断网络请求。

use crate::admin::conversion::api::ConversionService;
use crate::admin::conversion::models::{ConversionList, CONVERSION_LIST_KEY};
use crate::admin::error::ServiceError;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{debug, info, warn};

type SharedFetch = Shared<BoxFuture<'static, FetchOutcome>>;

/// 一次拉取的结果
#[derive(Clone)]
enum FetchOutcome {
    /// 拉取成功并已写入缓存
    Installed(Arc<ConversionList>),
    /// 拉取期间发生了 write/invalidate/reset，结果作废
    Superseded,
    /// 拉取失败，缓存保持不变
    Failed(ServiceError),
}

/// 缓存状态（供表现层显示加载中/骨架屏）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// 尚未读取过
    Empty,
    /// 持有最新快照
    Fresh,
    /// 快照已过期，下一次读取会重新拉取
    Stale,
    /// 有拉取在途
    Fetching,
}

struct CacheState {
    snapshot: Option<Arc<ConversionList>>,
    stale: bool,
    /// 每次 write/invalidate/reset 自增，拉取完成时据此判断结果是否作废
    epoch: u64,
    fetch_seq: u64,
    inflight: Option<(u64, SharedFetch)>,
}

struct CacheInner {
    key: &'static str,
    service: Arc<dyn ConversionService>,
    state: Mutex<CacheState>,
    publisher: watch::Sender<Option<Arc<ConversionList>>>,
}

impl CacheInner {
    fn lock_state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn fetch(self: Arc<Self>, fetch_id: u64, epoch: u64) -> FetchOutcome {
        info!("[ConvCache] 🔄 拉取列表开始: key={}, fetch={}", self.key, fetch_id);
        let result = self.service.list_conversions().await;

        let mut state = self.lock_state();
        if state.inflight.as_ref().map(|(id, _)| *id) == Some(fetch_id) {
            state.inflight = None;
        }

        match result {
            Ok(list) => {
                if state.epoch != epoch {
                    info!(
                        "[ConvCache] 拉取结果已作废（期间缓存被改写）: key={}, fetch={}",
                        self.key, fetch_id
                    );
                    return FetchOutcome::Superseded;
                }
                let list = Arc::new(list);
                state.snapshot = Some(list.clone());
                state.stale = false;
                self.publisher.send_replace(Some(list.clone()));
                info!(
                    "[ConvCache] ✅ 拉取列表完成: key={}, fetch={}, 任务数: {}",
                    self.key,
                    fetch_id,
                    list.len()
                );
                FetchOutcome::Installed(list)
            }
            Err(e) => {
                warn!(
                    "[ConvCache] 拉取列表失败，缓存保持不变: key={}, fetch={}, 错误: {}",
                    self.key, fetch_id, e
                );
                FetchOutcome::Failed(e)
            }
        }
    }
}

/// 转换任务列表缓存
///
/// 克隆得到的是同一个缓存的句柄。
#[derive(Clone)]
pub struct ConversionCache {
    inner: Arc<CacheInner>,
}

impl ConversionCache {
    pub fn new(service: Arc<dyn ConversionService>) -> Self {
        let (publisher, _) = watch::channel(None);
        Self {
            inner: Arc::new(CacheInner {
                key: CONVERSION_LIST_KEY,
                service,
                state: Mutex::new(CacheState {
                    snapshot: None,
                    stale: false,
                    epoch: 0,
                    fetch_seq: 0,
                    inflight: None,
                }),
                publisher,
            }),
        }
    }

    pub fn key(&self) -> &'static str {
        self.inner.key
    }

    /// 读取列表：命中未过期快照直接返回，否则等待拉取
    ///
    /// 拉取失败时缓存不变，错误原样返回，不会自动重试。
    pub async fn read(&self) -> Result<Arc<ConversionList>, ServiceError> {
        loop {
            let fetch = {
                let mut state = self.inner.lock_state();
                if let Some(snapshot) = state.snapshot.as_ref().filter(|_| !state.stale) {
                    debug!("[ConvCache] 命中缓存: key={}", self.inner.key);
                    return Ok(snapshot.clone());
                }
                let inflight = state.inflight.as_ref().map(|(id, f)| (*id, f.clone()));
                match inflight {
                    Some((id, fetch)) => {
                        debug!("[ConvCache] 复用在途拉取: key={}, fetch={}", self.inner.key, id);
                        fetch
                    }
                    None => self.start_fetch(&mut state),
                }
            };

            match fetch.await {
                FetchOutcome::Installed(list) => return Ok(list),
                FetchOutcome::Failed(e) => return Err(e),
                FetchOutcome::Superseded => continue,
            }
        }
    }

    fn start_fetch(&self, state: &mut CacheState) -> SharedFetch {
        state.fetch_seq += 1;
        let fetch_id = state.fetch_seq;
        let handle = tokio::spawn(self.inner.clone().fetch(fetch_id, state.epoch));
        let fetch = async move {
            match handle.await {
                Ok(outcome) => outcome,
                Err(e) => FetchOutcome::Failed(ServiceError::transport(format!(
                    "拉取任务异常终止: {}",
                    e
                ))),
            }
        }
        .boxed()
        .shared();
        state.inflight = Some((fetch_id, fetch.clone()));
        fetch
    }

    /// 整体替换快照（最后写入者胜出，没有合并逻辑）
    pub fn write(&self, list: impl Into<Arc<ConversionList>>) {
        let list = list.into();
        let mut state = self.inner.lock_state();
        debug!(
            "[ConvCache] 写入快照: key={}, 任务数: {}",
            self.inner.key,
            list.len()
        );
        self.install(&mut state, list);
    }

    /// 在同一把锁内取当前快照、派生新列表并写入，返回被替换的快照
    ///
    /// 没有快照时不调用 `derive`，返回 `None`。多线程运行时下并发的乐观更新
    /// 依次叠加在彼此的结果上。
    pub fn apply(
        &self,
        derive: impl FnOnce(&ConversionList) -> ConversionList,
    ) -> Option<Arc<ConversionList>> {
        let mut state = self.inner.lock_state();
        let previous = state.snapshot.clone()?;
        let next = Arc::new(derive(&previous));
        debug!(
            "[ConvCache] 派生快照: key={}, {} -> {} 条",
            self.inner.key,
            previous.len(),
            next.len()
        );
        self.install(&mut state, next);
        Some(previous)
    }

    fn install(&self, state: &mut CacheState, list: Arc<ConversionList>) {
        state.snapshot = Some(list.clone());
        state.stale = false;
        state.epoch += 1;
        state.inflight = None;
        self.inner.publisher.send_replace(Some(list));
    }

    /// 标记快照过期；当前值保留，订阅方不会收到通知
    pub fn invalidate(&self) {
        let mut state = self.inner.lock_state();
        debug!("[ConvCache] 标记过期: key={}", self.inner.key);
        state.stale = true;
        state.epoch += 1;
        state.inflight = None;
    }

    /// 不等待地取当前快照（可能已过期）
    pub fn get_snapshot(&self) -> Option<Arc<ConversionList>> {
        self.inner.lock_state().snapshot.clone()
    }

    /// 会话结束时丢弃快照
    pub fn reset(&self) {
        let mut state = self.inner.lock_state();
        info!("[ConvCache] 重置缓存: key={}", self.inner.key);
        state.snapshot = None;
        state.stale = false;
        state.epoch += 1;
        state.inflight = None;
        self.inner.publisher.send_replace(None);
    }

    pub fn status(&self) -> CacheStatus {
        let state = self.inner.lock_state();
        if state.inflight.is_some() {
            CacheStatus::Fetching
        } else if state.snapshot.is_none() {
            CacheStatus::Empty
        } else if state.stale {
            CacheStatus::Stale
        } else {
            CacheStatus::Fresh
        }
    }

    /// 订阅快照变化（write、拉取成功、reset 时推送；invalidate 不推送）
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<ConversionList>>> {
        self.inner.publisher.subscribe()
    }
}
