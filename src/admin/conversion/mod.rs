//! 转换任务模块
//!
//! 实现转换任务列表的读穿透缓存与乐观变更

pub mod api;
pub mod cache;
pub mod listener;
pub mod models;
pub mod service;

#[cfg(test)]
pub(crate) mod testing;

// 重新导出主要类型
pub use api::{ConversionApi, ConversionService};
pub use cache::{CacheStatus, ConversionCache};
pub use listener::{EmptyMutationListener, MutationListener};
pub use models::{
    CodeType, ConversionList, ConversionRecord, CreateResponse, NewConversion, RunResult,
    CONVERSION_LIST_KEY,
};
pub use service::{
    MutationCoordinator, MutationHandle, MutationKind, MutationOutcome, MutationReport,
    MutationState,
};
