pub mod admin;

// 重新导出常用类型，方便外部使用
pub use admin::{
    client::{AdminClient, ClientConfig},
    conversion::{
        CacheStatus, CodeType, ConversionCache, ConversionRecord, ConversionService,
        MutationCoordinator, MutationHandle, MutationKind, MutationListener, NewConversion,
    },
    AdminError, ServiceError, ValidationError,
};
