use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::mysql::MySqlRow;
use sqlx::{Executor, MySql, MySqlPool, QueryBuilder, Row};
use std::str::FromStr;

use crate::domain::money::Currency;
use crate::error::LedgerError;
use crate::models::enums::{PaymentMethod, PaymentStatus};
use crate::models::payment::Payment;
use crate::query::payment_filter::{push_settlement_range, PaymentFilter};

/// 支付记录存储
#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn save(&self, payment: &Payment) -> Result<(), LedgerError>;
    async fn find_by_id(&self, payment_id: &str) -> Result<Option<Payment>, LedgerError>;
    /// Most recent settlement first, then most recent creation first.
    async fn find_by_organisation(
        &self,
        organisation_id: &str,
        filter: &PaymentFilter,
    ) -> Result<Vec<Payment>, LedgerError>;
    /// `paid` payments with a settlement date inside the inclusive day range.
    async fn find_settled_paid(
        &self,
        organisation_id: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<Payment>, LedgerError>;
}

pub(crate) const PAYMENT_SELECT: &str = r#"
    SELECT p.id, p.organisation_id, p.payer_id, u.display_name AS payer_name, u.email AS payer_email,
           p.payment_type, p.context_id, p.amount, p.currency, p.method, p.status,
           p.provider, p.provider_transaction_id, p.settlement_date, p.metadata,
           p.created_at, p.updated_at
    FROM payments p
    LEFT JOIN users u ON u.id = p.payer_id
"#;

const PAYMENT_ORDER_BY: &str = " ORDER BY p.settlement_date DESC, p.created_at DESC";

fn decode_error(column: &str, message: String) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: message.into(),
    }
}

pub(crate) fn payment_from_row(row: &MySqlRow) -> Result<Payment, sqlx::Error> {
    let currency: String = row.try_get("currency")?;
    let method: String = row.try_get("method")?;
    let status: String = row.try_get("status")?;

    Ok(Payment {
        id: row.try_get("id")?,
        organisation_id: row.try_get("organisation_id")?,
        payer_id: row.try_get("payer_id")?,
        payer_name: row.try_get("payer_name")?,
        payer_email: row.try_get("payer_email")?,
        payment_type: row.try_get("payment_type")?,
        context_id: row.try_get("context_id")?,
        amount: row.try_get("amount")?,
        currency: Currency::new(&currency).map_err(|e| decode_error("currency", e))?,
        method: PaymentMethod::from_str(&method)
            .map_err(|_| decode_error("method", format!("unknown payment method: {}", method)))?,
        status: PaymentStatus::from_str(&status)
            .map_err(|_| decode_error("status", format!("unknown payment status: {}", status)))?,
        provider: row.try_get("provider")?,
        provider_transaction_id: row.try_get("provider_transaction_id")?,
        settlement_date: row.try_get("settlement_date")?,
        metadata: row.try_get("metadata")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Loads one payment, optionally taking a row lock (`FOR UPDATE`) on it.
pub(crate) async fn fetch_payment<'e, E>(
    executor: E,
    payment_id: &str,
    for_update: bool,
) -> Result<Option<Payment>, sqlx::Error>
where
    E: Executor<'e, Database = MySql>,
{
    let mut builder = QueryBuilder::<MySql>::new(PAYMENT_SELECT);
    builder.push(" WHERE p.id = ").push_bind(payment_id.to_string());
    if for_update {
        builder.push(" FOR UPDATE OF p");
    }

    let row = builder.build().fetch_optional(executor).await?;
    row.as_ref().map(payment_from_row).transpose()
}

pub struct MySqlPaymentRepository {
    pool: MySqlPool,
}

impl MySqlPaymentRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaymentRepository for MySqlPaymentRepository {
    async fn save(&self, payment: &Payment) -> Result<(), LedgerError> {
        sqlx::query(
            r#"
            INSERT INTO payments
            (id, organisation_id, payer_id, payment_type, context_id, amount, currency, method,
             status, provider, provider_transaction_id, settlement_date, metadata, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&payment.id)
        .bind(&payment.organisation_id)
        .bind(&payment.payer_id)
        .bind(&payment.payment_type)
        .bind(&payment.context_id)
        .bind(payment.amount)
        .bind(payment.currency.as_str())
        .bind(payment.method.as_str())
        .bind(payment.status.as_str())
        .bind(&payment.provider)
        .bind(&payment.provider_transaction_id)
        .bind(payment.settlement_date)
        .bind(&payment.metadata)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                LedgerError::invalid_argument("payment already recorded")
            }
            other => LedgerError::from(other),
        })?;

        Ok(())
    }

    async fn find_by_id(&self, payment_id: &str) -> Result<Option<Payment>, LedgerError> {
        Ok(fetch_payment(&self.pool, payment_id, false).await?)
    }

    async fn find_by_organisation(
        &self,
        organisation_id: &str,
        filter: &PaymentFilter,
    ) -> Result<Vec<Payment>, LedgerError> {
        let mut builder = QueryBuilder::<MySql>::new(PAYMENT_SELECT);
        filter.push_where(&mut builder, organisation_id);
        builder.push(PAYMENT_ORDER_BY);

        let rows = builder.build().fetch_all(&self.pool).await?;
        let payments = rows
            .iter()
            .map(payment_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(payments)
    }

    async fn find_settled_paid(
        &self,
        organisation_id: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<Payment>, LedgerError> {
        let mut builder = QueryBuilder::<MySql>::new(PAYMENT_SELECT);
        builder
            .push(" WHERE p.organisation_id = ")
            .push_bind(organisation_id.to_string())
            .push(" AND p.status = ")
            .push_bind(PaymentStatus::Paid.as_str())
            .push(" AND p.settlement_date IS NOT NULL");
        push_settlement_range(&mut builder, start_date, end_date);
        builder.push(PAYMENT_ORDER_BY);

        let rows = builder.build().fetch_all(&self.pool).await?;
        let payments = rows
            .iter()
            .map(payment_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(payments)
    }
}
