//! 转换管理 CLI
//!
//! 对远端转换服务做列表、新建、删除、执行操作。
//! 每次变更结算后重新读取列表并打印，展示服务器的最终状态。

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use conversion_admin_sdk::admin::client::{
    ClientConfig, DEFAULT_API_BASE_URL, ENV_API_URL, ENV_TIMEOUT_SECS,
};
use conversion_admin_sdk::admin::conversion::{
    CodeType, ConversionList, CreateResponse, MutationKind, MutationListener, NewConversion,
};
use conversion_admin_sdk::{AdminClient, ServiceError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// 转换管理 CLI
#[derive(Parser, Debug)]
#[command(name = "conversion-admin")]
#[command(about = "转换任务管理 CLI - 管理 SQLite 到 schema 代码的转换任务", long_about = None)]
struct Args {
    /// 转换服务地址
    #[arg(long, env = ENV_API_URL, default_value = DEFAULT_API_BASE_URL)]
    api_url: String,

    /// 请求超时（秒）
    #[arg(long, env = ENV_TIMEOUT_SECS, default_value = "30")]
    timeout_secs: u64,

    /// 日志级别（默认: warn,conversion_admin_sdk=info）
    #[arg(long, default_value = "warn,conversion_admin_sdk=info")]
    log_level: String,

    /// 额外把日志写入该文件（追加模式）
    #[arg(long)]
    log_file: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 列出所有转换任务
    List,
    /// 新建转换任务
    Add {
        /// 源 SQLite 数据库路径
        #[arg(long)]
        db_path: String,
        /// 目标 schema 目录
        #[arg(long)]
        schema_path: String,
        /// 目标代码类型：ts 或 rs
        #[arg(long)]
        code_type: String,
        /// 备注
        #[arg(long)]
        memo: Option<String>,
    },
    /// 删除转换任务
    Delete { id: i64 },
    /// 执行转换任务
    Run { id: i64 },
}

/// 初始化日志（输出到 stderr，可选同时写文件）
fn init_logger(log_level: &str, log_file: Option<&str>) -> Result<()> {
    use std::fs::OpenOptions;
    use std::io;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    // 优先使用环境变量 RUST_LOG（如果设置了），否则使用命令行参数
    let filter_layer =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .with_ansi(true);

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("无法创建日志文件 {}", path))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(file)
                    .with_file(true)
                    .with_line_number(true)
                    .with_target(false)
                    .with_ansi(false),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(console_layer)
        .with(file_layer)
        .init();
    Ok(())
}

/// 把变更生命周期打到日志里
struct CliMutationListener;

#[async_trait]
impl MutationListener for CliMutationListener {
    async fn on_mutation_start(&self, kind: MutationKind, operation_id: &str) {
        info!("[CLI] 🚀 {} 开始: op={}", kind, operation_id);
    }

    async fn on_mutation_committed(&self, kind: MutationKind, operation_id: &str) {
        info!("[CLI] ✅ {} 成功: op={}", kind, operation_id);
    }

    async fn on_mutation_rolled_back(
        &self,
        kind: MutationKind,
        operation_id: &str,
        error: &ServiceError,
    ) {
        warn!("[CLI] ↩️ {} 失败已回滚: op={}, 错误: {}", kind, operation_id, error);
    }

    async fn on_mutation_settled(&self, kind: MutationKind, operation_id: &str) {
        info!("[CLI] 🏁 {} 结算: op={}", kind, operation_id);
    }
}

fn print_list(list: &ConversionList) {
    if list.is_empty() {
        println!("（没有已保存的转换任务）");
        return;
    }
    println!("已保存的转换任务（共 {} 个）:", list.len());
    for conversion in list.iter() {
        match &conversion.memo {
            Some(memo) => println!("  [{}] {}  # {}", conversion.id, conversion, memo),
            None => println!("  [{}] {}", conversion.id, conversion),
        }
    }
}

async fn print_current_list(client: &AdminClient) -> Result<()> {
    let list = client
        .read_conversions()
        .await
        .context("读取转换任务列表失败")?;
    print_list(&list);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logger(&args.log_level, args.log_file.as_deref())?;

    let config = ClientConfig::new(args.api_url.as_str())
        .with_timeout(Duration::from_secs(args.timeout_secs));
    let mut client = AdminClient::new(config).context("创建客户端失败")?;
    client.set_mutation_listener(Arc::new(CliMutationListener));

    match args.command {
        Command::List => print_current_list(&client).await?,
        Command::Add {
            db_path,
            schema_path,
            code_type,
            memo,
        } => {
            // 表现层负责拦截明显无效的输入
            let code_type: CodeType = code_type.parse().context("输入校验失败")?;
            let input = NewConversion::new(db_path, schema_path, code_type, memo);
            input.validate().context("输入校验失败")?;

            // 先读一次，让乐观更新有回滚点
            client.read_conversions().await.ok();
            match client.add_conversion(input).await {
                Ok(CreateResponse::Record(record)) => println!("已保存: [{}] {}", record.id, record),
                Ok(CreateResponse::Acknowledged { message }) => {
                    println!("{}", message.as_deref().unwrap_or("已保存"))
                }
                Err(e) => {
                    error!("[CLI] 保存失败: {}", e);
                    return Err(e).context("保存转换任务失败");
                }
            }
            print_current_list(&client).await?;
        }
        Command::Delete { id } => {
            client.read_conversions().await.ok();
            client
                .delete_conversion(id)
                .await
                .with_context(|| format!("删除转换任务 {} 失败", id))?;
            println!("已删除转换任务 {}", id);
            print_current_list(&client).await?;
        }
        Command::Run { id } => {
            let result = client
                .run_conversion(id)
                .await
                .with_context(|| format!("执行转换任务 {} 失败", id))?;
            println!("{}", result.message.as_deref().unwrap_or("转换已完成"));
            print_current_list(&client).await?;
        }
    }

    client.end_session();
    Ok(())
}
