use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::mysql::MySqlRow;
use sqlx::{Executor, MySql, MySqlPool, Row, Transaction};
use std::str::FromStr;

use super::payment_repository::fetch_payment;
use crate::error::LedgerError;
use crate::models::enums::RefundStatus;
use crate::models::payment::{Payment, Refund};

/// 退款台账
#[async_trait]
pub trait RefundRepository: Send + Sync {
    /// Persists a refund as-is; callers check the balance first.
    async fn create(&self, refund: &Refund) -> Result<(), LedgerError>;
    /// Sum of `pending` and `completed` refunds, zero when there are none.
    async fn sum_outstanding(&self, payment_id: &str) -> Result<Decimal, LedgerError>;
    /// Oldest first.
    async fn find_by_payment(&self, payment_id: &str) -> Result<Vec<Refund>, LedgerError>;
    /// Opens the unit of work that covers one refund evaluation.
    async fn begin(&self) -> Result<Box<dyn RefundTransaction>, LedgerError>;
}

/// Isolated read-check-write unit for a single refund.
///
/// `lock_payment` must block concurrent transactions on the same payment
/// until this one commits or is dropped. Dropping without `commit` discards
/// every staged write.
#[async_trait]
pub trait RefundTransaction: Send {
    async fn lock_payment(&mut self, payment_id: &str) -> Result<Option<Payment>, LedgerError>;
    async fn sum_outstanding(&mut self, payment_id: &str) -> Result<Decimal, LedgerError>;
    async fn create(&mut self, refund: &Refund) -> Result<(), LedgerError>;
    async fn commit(self: Box<Self>) -> Result<(), LedgerError>;
}

const REFUND_SELECT: &str = r#"
    SELECT id, payment_id, organisation_id, refund_amount, refund_reason, refund_status,
           requested_by, requested_at, metadata
    FROM refunds
"#;

fn refund_from_row(row: &MySqlRow) -> Result<Refund, sqlx::Error> {
    let status: String = row.try_get("refund_status")?;

    Ok(Refund {
        id: row.try_get("id")?,
        payment_id: row.try_get("payment_id")?,
        organisation_id: row.try_get("organisation_id")?,
        refund_amount: row.try_get("refund_amount")?,
        refund_reason: row.try_get("refund_reason")?,
        refund_status: RefundStatus::from_str(&status).map_err(|_| sqlx::Error::ColumnDecode {
            index: "refund_status".to_string(),
            source: format!("unknown refund status: {}", status).into(),
        })?,
        requested_by: row.try_get("requested_by")?,
        requested_at: row.try_get("requested_at")?,
        metadata: row.try_get("metadata")?,
    })
}

async fn insert_refund<'e, E>(executor: E, refund: &Refund) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = MySql>,
{
    sqlx::query(
        r#"
        INSERT INTO refunds
        (id, payment_id, organisation_id, refund_amount, refund_reason, refund_status, requested_by, requested_at, metadata)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&refund.id)
    .bind(&refund.payment_id)
    .bind(&refund.organisation_id)
    .bind(refund.refund_amount)
    .bind(&refund.refund_reason)
    .bind(refund.refund_status.as_str())
    .bind(&refund.requested_by)
    .bind(refund.requested_at)
    .bind(&refund.metadata)
    .execute(executor)
    .await?;

    Ok(())
}

async fn select_outstanding<'e, E>(executor: E, payment_id: &str) -> Result<Decimal, sqlx::Error>
where
    E: Executor<'e, Database = MySql>,
{
    let [pending, completed] = RefundStatus::outstanding();
    let total: Option<Decimal> = sqlx::query_scalar(
        r#"
        SELECT SUM(refund_amount) FROM refunds
        WHERE payment_id = ? AND refund_status IN (?, ?)
        "#,
    )
    .bind(payment_id)
    .bind(pending.as_str())
    .bind(completed.as_str())
    .fetch_one(executor)
    .await?;

    Ok(total.unwrap_or(Decimal::ZERO))
}

pub struct MySqlRefundRepository {
    pool: MySqlPool,
}

impl MySqlRefundRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RefundRepository for MySqlRefundRepository {
    async fn create(&self, refund: &Refund) -> Result<(), LedgerError> {
        insert_refund(&self.pool, refund).await?;
        Ok(())
    }

    async fn sum_outstanding(&self, payment_id: &str) -> Result<Decimal, LedgerError> {
        Ok(select_outstanding(&self.pool, payment_id).await?)
    }

    async fn find_by_payment(&self, payment_id: &str) -> Result<Vec<Refund>, LedgerError> {
        let sql = format!("{} WHERE payment_id = ? ORDER BY requested_at ASC, id ASC", REFUND_SELECT);
        let rows = sqlx::query(&sql)
            .bind(payment_id)
            .fetch_all(&self.pool)
            .await?;

        let refunds = rows
            .iter()
            .map(refund_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(refunds)
    }

    async fn begin(&self) -> Result<Box<dyn RefundTransaction>, LedgerError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(MySqlRefundTransaction { tx }))
    }
}

/// Row lock on `payments` (`SELECT ... FOR UPDATE`) held until commit or rollback.
pub struct MySqlRefundTransaction {
    tx: Transaction<'static, MySql>,
}

#[async_trait]
impl RefundTransaction for MySqlRefundTransaction {
    async fn lock_payment(&mut self, payment_id: &str) -> Result<Option<Payment>, LedgerError> {
        Ok(fetch_payment(&mut *self.tx, payment_id, true).await?)
    }

    async fn sum_outstanding(&mut self, payment_id: &str) -> Result<Decimal, LedgerError> {
        Ok(select_outstanding(&mut *self.tx, payment_id).await?)
    }

    async fn create(&mut self, refund: &Refund) -> Result<(), LedgerError> {
        insert_refund(&mut *self.tx, refund).await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), LedgerError> {
        self.tx.commit().await?;
        Ok(())
    }
}
