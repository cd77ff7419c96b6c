use sqlx::{mysql::MySqlPoolOptions, MySqlPool};
use std::time::Duration;

pub async fn create_pool(
    database_url: &str,
    max_connections: u32,
    acquire_timeout_secs: u64,
) -> anyhow::Result<MySqlPool> {
    let pool = MySqlPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(acquire_timeout_secs))
        .connect(database_url)
        .await?;

    Ok(pool)
}

// 初始化数据库表
pub async fn init_db(pool: &MySqlPool) -> anyhow::Result<()> {
    // 付款人投影，仅用于列表展示
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id VARCHAR(64) PRIMARY KEY,
            display_name VARCHAR(255),
            email VARCHAR(255)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // 支付记录
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS payments (
            id VARCHAR(64) PRIMARY KEY,
            organisation_id VARCHAR(64) NOT NULL,
            payer_id VARCHAR(64) NOT NULL,
            payment_type VARCHAR(64) NOT NULL,
            context_id VARCHAR(64),
            amount DECIMAL(12, 2) NOT NULL,
            currency CHAR(3) NOT NULL,
            method VARCHAR(32) NOT NULL,
            status VARCHAR(20) NOT NULL,
            provider VARCHAR(64),
            provider_transaction_id VARCHAR(255),
            settlement_date DATETIME(6),
            metadata TEXT,
            created_at DATETIME(6) NOT NULL,
            updated_at DATETIME(6) NOT NULL,
            INDEX idx_org_settlement (organisation_id, settlement_date),
            INDEX idx_org_status (organisation_id, status),
            INDEX idx_provider_txn (provider_transaction_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // 退款记录
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS refunds (
            id VARCHAR(64) PRIMARY KEY,
            payment_id VARCHAR(64) NOT NULL,
            organisation_id VARCHAR(64) NOT NULL,
            refund_amount DECIMAL(12, 2) NOT NULL,
            refund_reason TEXT,
            refund_status VARCHAR(20) NOT NULL,
            requested_by VARCHAR(64) NOT NULL,
            requested_at DATETIME(6) NOT NULL,
            metadata TEXT,
            INDEX idx_payment_status (payment_id, refund_status),
            FOREIGN KEY (payment_id) REFERENCES payments(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
