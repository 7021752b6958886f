//! 测试用的内存版转换服务

use crate::admin::conversion::api::ConversionService;
use crate::admin::conversion::models::{
    ConversionList, ConversionRecord, CreateResponse, NewConversion, RunResult,
};
use crate::admin::error::ServiceError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use tokio::sync::Notify;

pub(crate) const LIST: &str = "list";
pub(crate) const CREATE: &str = "create";
pub(crate) const DELETE: &str = "delete";
pub(crate) const RUN: &str = "run";

static INIT_LOGGER: Once = Once::new();

pub(crate) fn init_test_logger() {
    INIT_LOGGER.call_once(|| {
        use tracing_subscriber::prelude::*;
        use tracing_subscriber::EnvFilter;

        let filter_layer = EnvFilter::new("info,conversion_admin_sdk=debug");

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_file(true)
            .with_line_number(true)
            .with_target(false)
            .with_test_writer();

        let _ = tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt_layer)
            .try_init();
    });
}

/// 服务端真相保存在内存里；可按操作注入一次性失败或闸门
#[derive(Default)]
pub(crate) struct FakeConversionService {
    records: Mutex<ConversionList>,
    next_id: AtomicI64,
    pub list_calls: AtomicUsize,
    pub create_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
    pub run_calls: AtomicUsize,
    failures: Mutex<HashMap<&'static str, ServiceError>>,
    gates: Mutex<HashMap<&'static str, Arc<Notify>>>,
    latency: Mutex<HashMap<&'static str, Duration>>,
    /// 每个操作各自的进入通知，互不串扰
    started: Mutex<HashMap<&'static str, Arc<Notify>>>,
}

impl FakeConversionService {
    pub fn with_records(records: ConversionList) -> Self {
        let next_id = records.iter().map(|r| r.id).max().map_or(1, |id| id + 1);
        Self {
            records: Mutex::new(records),
            next_id: AtomicI64::new(next_id),
            ..Default::default()
        }
    }

    pub fn records(&self) -> ConversionList {
        self.records.lock().unwrap().clone()
    }

    /// 下一次 `op` 调用返回该错误
    pub fn fail_next(&self, op: &'static str, err: ServiceError) {
        self.failures.lock().unwrap().insert(op, err);
    }

    /// 让 `op` 的下一次调用停在闸门处，直到返回的 Notify 被通知
    pub fn gate(&self, op: &'static str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates.lock().unwrap().insert(op, gate.clone());
        gate
    }

    /// `op` 的每次调用都先等待 `delay` 再处理
    pub fn set_latency(&self, op: &'static str, delay: Duration) {
        self.latency.lock().unwrap().insert(op, delay);
    }

    /// `op` 每次被调用时通知一次（未被等待时保留一个许可）
    pub fn started(&self, op: &'static str) -> Arc<Notify> {
        self.started
            .lock()
            .unwrap()
            .entry(op)
            .or_insert_with(|| Arc::new(Notify::new()))
            .clone()
    }

    async fn enter(&self, op: &'static str, counter: &AtomicUsize) -> Result<(), ServiceError> {
        counter.fetch_add(1, Ordering::SeqCst);
        self.started(op).notify_one();
        let gate = self.gates.lock().unwrap().remove(op);
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let delay = self.latency.lock().unwrap().get(op).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.failures.lock().unwrap().remove(op) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ConversionService for FakeConversionService {
    async fn list_conversions(&self) -> Result<ConversionList, ServiceError> {
        self.enter(LIST, &self.list_calls).await?;
        Ok(self.records())
    }

    async fn create_conversion(
        &self,
        input: &NewConversion,
        _operation_id: &str,
    ) -> Result<CreateResponse, ServiceError> {
        self.enter(CREATE, &self.create_calls).await?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let record = ConversionRecord::tentative(input, id);
        self.records.lock().unwrap().push(record.clone());
        Ok(CreateResponse::Record(record))
    }

    async fn delete_conversion(&self, id: i64, _operation_id: &str) -> Result<(), ServiceError> {
        self.enter(DELETE, &self.delete_calls).await?;
        let mut records = self.records.lock().unwrap();
        let before = records.len();
        records.retain(|r| r.id != id);
        if records.len() == before {
            return Err(ServiceError::new(Some(404), "Conversion not found!"));
        }
        Ok(())
    }

    async fn run_conversion(
        &self,
        id: i64,
        _operation_id: &str,
    ) -> Result<RunResult, ServiceError> {
        self.enter(RUN, &self.run_calls).await?;
        if !self.records.lock().unwrap().iter().any(|r| r.id == id) {
            return Err(ServiceError::new(Some(500), "'NoneType' object is not subscriptable"));
        }
        Ok(RunResult {
            message: Some("Conversion completed!".into()),
            ..Default::default()
        })
    }
}
