//! 转换任务数据模型

use crate::admin::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 列表缓存使用的唯一 key（所有读取、回滚都按这个 key 进行）
pub const CONVERSION_LIST_KEY: &str = "conversion_list";

/// 目标代码类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodeType {
    /// TypeScript
    Ts,
    /// Rust
    Rs,
}

impl CodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodeType::Ts => "ts",
            CodeType::Rs => "rs",
        }
    }
}

impl fmt::Display for CodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CodeType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "ts" => Ok(CodeType::Ts),
            "rs" => Ok(CodeType::Rs),
            "" => Err(ValidationError::new("code_type", "请选择代码类型")),
            other => Err(ValidationError::new(
                "code_type",
                format!("不支持的代码类型: {}（只能是 ts 或 rs）", other),
            )),
        }
    }
}

/// 一条转换任务记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionRecord {
    /// 服务器分配的 ID；乐观插入的记录在结算前使用占位 ID
    pub id: i64,
    /// 源 SQLite 数据库路径
    pub db_path: String,
    /// 目标 schema 目录
    pub schema_path: String,
    pub code_type: CodeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
}

impl ConversionRecord {
    /// 用新建输入和占位 ID 构造一条待确认的记录
    pub fn tentative(input: &NewConversion, placeholder_id: i64) -> Self {
        Self {
            id: placeholder_id,
            db_path: input.db_path.clone(),
            schema_path: input.schema_path.clone(),
            code_type: input.code_type,
            memo: input.memo.clone(),
        }
    }

    /// 记录内容是否与新建输入一致（忽略 ID）
    pub fn matches_input(&self, input: &NewConversion) -> bool {
        self.db_path == input.db_path
            && self.schema_path == input.schema_path
            && self.code_type == input.code_type
            && self.memo == input.memo
    }
}

impl fmt::Display for ConversionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {}/*.{}",
            self.db_path, self.schema_path, self.code_type
        )
    }
}

/// 缓存的列表快照，顺序只影响展示
pub type ConversionList = Vec<ConversionRecord>;

/// 新建转换任务的输入
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewConversion {
    pub db_path: String,
    pub schema_path: String,
    pub code_type: CodeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
}

impl NewConversion {
    /// 构造输入，空白 memo 视为未填写
    pub fn new(
        db_path: impl Into<String>,
        schema_path: impl Into<String>,
        code_type: CodeType,
        memo: Option<String>,
    ) -> Self {
        Self {
            db_path: db_path.into(),
            schema_path: schema_path.into(),
            code_type,
            memo: memo.filter(|m| !m.trim().is_empty()),
        }
    }

    /// 表现层在提交前调用；核心层不会替调用方校验
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.db_path.trim().is_empty() {
            return Err(ValidationError::new("db_path", "请输入有效的数据库路径"));
        }
        if self.schema_path.trim().is_empty() {
            return Err(ValidationError::new("schema_path", "请输入有效的 schema 目录"));
        }
        Ok(())
    }
}

/// 新建接口的成功响应
///
/// 服务器可能返回完整记录，也可能只返回 `{"message": ...}` 确认。
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum CreateResponse {
    Record(ConversionRecord),
    Acknowledged {
        #[serde(default)]
        message: Option<String>,
    },
}

impl CreateResponse {
    pub fn record(&self) -> Option<&ConversionRecord> {
        match self {
            CreateResponse::Record(r) => Some(r),
            CreateResponse::Acknowledged { .. } => None,
        }
    }
}

/// 执行转换接口的成功响应
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RunResult {
    #[serde(default)]
    pub message: Option<String>,
    /// 服务器返回的其他字段原样保留
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_type_parses_only_ts_and_rs() {
        assert_eq!("ts".parse::<CodeType>().unwrap(), CodeType::Ts);
        assert_eq!(" rs ".parse::<CodeType>().unwrap(), CodeType::Rs);
        assert_eq!("go".parse::<CodeType>().unwrap_err().field, "code_type");
        assert!("".parse::<CodeType>().is_err());
    }

    #[test]
    fn record_wire_format() {
        let json = r#"{"id":7,"db_path":"a.db","schema_path":"out","code_type":"rs","memo":null}"#;
        let record: ConversionRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.id, 7);
        assert_eq!(record.code_type, CodeType::Rs);
        assert_eq!(record.memo, None);
        assert_eq!(record.to_string(), "a.db -> out/*.rs");

        let input = NewConversion::new("a.db", "out", CodeType::Ts, None);
        let body = serde_json::to_value(&input).unwrap();
        assert_eq!(
            body,
            serde_json::json!({"db_path": "a.db", "schema_path": "out", "code_type": "ts"})
        );
    }

    #[test]
    fn validate_rejects_blank_paths() {
        let input = NewConversion::new("  ", "out", CodeType::Ts, None);
        assert_eq!(input.validate().unwrap_err().field, "db_path");

        let input = NewConversion::new("a.db", "", CodeType::Ts, Some("   ".into()));
        assert_eq!(input.validate().unwrap_err().field, "schema_path");
        assert_eq!(input.memo, None);

        let input = NewConversion::new("a.db", "out", CodeType::Rs, Some("nightly".into()));
        assert!(input.validate().is_ok());
    }

    #[test]
    fn create_response_accepts_record_or_ack() {
        let ack: CreateResponse =
            serde_json::from_str(r#"{"message":"Schema created successfully!"}"#).unwrap();
        assert!(ack.record().is_none());

        let rec: CreateResponse = serde_json::from_str(
            r#"{"id":1,"db_path":"a.db","schema_path":"out","code_type":"ts"}"#,
        )
        .unwrap();
        assert_eq!(rec.record().map(|r| r.id), Some(1));
    }
}
