use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use payment_ledger::{
    db, logging, LedgerService, LedgerSettings, PaymentFilter, PaymentMethod, PaymentStatus, RefundRequest,
};
use rust_decimal::Decimal;
use serde::Serialize;
use std::process::exit;
use tracing::error;

#[derive(Parser, Debug)]
#[command(name = "payment-ledger")]
#[command(about = "多租户支付与退款台账", long_about = None)]
struct Cli {
    /// 配置文件路径（也可用 LEDGER_CONFIG 指定）
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 创建数据表
    InitDb,

    /// 按组织查询支付记录
    Payments {
        /// 组织 ID
        #[arg(short, long)]
        organisation: String,

        /// 支付状态，逗号分隔
        #[arg(long, value_delimiter = ',')]
        status: Vec<PaymentStatus>,

        /// 收款方式，逗号分隔
        #[arg(long, value_delimiter = ',')]
        method: Vec<PaymentMethod>,

        /// 支付类型，逗号分隔
        #[arg(long, value_delimiter = ',')]
        payment_type: Vec<String>,

        /// 结算起始日期（含），YYYY-MM-DD
        #[arg(long)]
        from: Option<NaiveDate>,

        /// 结算截止日期（含），YYYY-MM-DD
        #[arg(long)]
        to: Option<NaiveDate>,

        /// 按付款人姓名、邮箱或渠道交易号搜索
        #[arg(short, long)]
        search: Option<String>,
    },

    /// 查询单笔支付
    Payment {
        /// 支付 ID
        #[arg(long)]
        id: String,
    },

    /// 发起退款
    Refund {
        #[arg(short, long)]
        organisation: String,

        /// 支付 ID
        #[arg(short, long)]
        payment: String,

        /// 退款金额，最多两位小数
        #[arg(short, long)]
        amount: Decimal,

        /// 退款原因
        #[arg(short, long)]
        reason: Option<String>,

        /// 操作人
        #[arg(long)]
        requested_by: String,
    },

    /// 查询支付的退款记录
    Refunds {
        #[arg(short, long)]
        organisation: String,

        #[arg(short, long)]
        payment: String,
    },

    /// 查询剩余可退金额
    Balance {
        #[arg(short, long)]
        organisation: String,

        #[arg(short, long)]
        payment: String,
    },

    /// 按日、方式、币种汇总入账
    Lodgements {
        #[arg(short, long)]
        organisation: String,

        #[arg(long)]
        from: Option<NaiveDate>,

        #[arg(long)]
        to: Option<NaiveDate>,
    },
}

/// **支付台账命令行**
///
/// ***usage：***
/// ```shell
/// # 建表
/// cargo run -p payment-ledger -- init-db
///
/// # 查询已支付的刷卡记录
/// cargo run -p payment-ledger -- payments --organisation org_1 --status paid --method card
///
/// # 退款
/// cargo run -p payment-ledger -- refund --organisation org_1 --payment pay_1 --amount 40.00 --requested-by admin_1
///
/// # 四月入账汇总
/// cargo run -p payment-ledger -- lodgements --organisation org_1 --from 2024-04-01 --to 2024-04-30
/// ```
#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let settings = match LedgerSettings::load(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("加载配置失败: {}", e);
            exit(1);
        }
    };

    let _guard = match logging::init_logging(&settings.logging, &settings.service_name) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("初始化日志失败: {}", e);
            exit(1);
        }
    };

    if let Err(e) = run(cli.command, &settings).await {
        error!("操作失败: {:#}", e);
        exit(1);
    }
}

async fn run(command: Commands, settings: &LedgerSettings) -> anyhow::Result<()> {
    let pool = db::create_pool(
        &settings.database.url,
        settings.database.max_connections,
        settings.database.acquire_timeout_secs,
    )
    .await
    .context("连接数据库失败")?;

    if let Commands::InitDb = command {
        db::init_db(&pool).await.context("建表失败")?;
        println!("database initialised");
        return Ok(());
    }

    let service = LedgerService::mysql(pool);

    match command {
        Commands::InitDb => Ok(()),
        Commands::Payments {
            organisation,
            status,
            method,
            payment_type,
            from,
            to,
            search,
        } => {
            let mut filter = PaymentFilter::new().with_date_range(from, to);
            if !status.is_empty() {
                filter = filter.with_status(status);
            }
            if !method.is_empty() {
                filter = filter.with_method(method);
            }
            if !payment_type.is_empty() {
                filter = filter.with_type(payment_type);
            }
            if let Some(search) = search {
                filter = filter.with_search(search);
            }

            print_json(&service.get_payments_by_organisation(&organisation, Some(&filter)).await?)
        }
        Commands::Payment { id } => match service.get_payment_by_id(&id).await? {
            Some(payment) => print_json(&payment),
            None => {
                println!("not found");
                Ok(())
            }
        },
        Commands::Refund {
            organisation,
            payment,
            amount,
            reason,
            requested_by,
        } => {
            let request = RefundRequest {
                payment_id: payment,
                organisation_id: organisation,
                refund_amount: amount,
                refund_reason: reason,
                requested_by,
                metadata: None,
            };
            print_json(&service.request_refund(request).await?)
        }
        Commands::Refunds { organisation, payment } => {
            print_json(&service.get_refunds_for_payment(&organisation, &payment).await?)
        }
        Commands::Balance { organisation, payment } => {
            println!("{}", service.get_refundable_balance(&organisation, &payment).await?);
            Ok(())
        }
        Commands::Lodgements { organisation, from, to } => {
            print_json(&service.get_lodgements_by_organisation(&organisation, from, to).await?)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
