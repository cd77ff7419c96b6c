use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::MySqlPool;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use crate::domain::money::{has_currency_scale, Money, MAX_AMOUNT};
use crate::error::LedgerError;
use crate::models::payment::{LodgementSummary, Payment, Refund, RefundRequest};
use crate::query::payment_filter::PaymentFilter;
use crate::repository::memory::InMemoryLedgerStore;
use crate::repository::payment_repository::{MySqlPaymentRepository, PaymentRepository};
use crate::repository::refund_repository::{MySqlRefundRepository, RefundRepository};
use crate::services::{lodgement, refund_validator};

/// 支付与退款台账服务，启动时构造一次后共享
pub struct LedgerService {
    payments: Arc<dyn PaymentRepository>,
    refunds: Arc<dyn RefundRepository>,
}

impl LedgerService {
    pub fn new(payments: Arc<dyn PaymentRepository>, refunds: Arc<dyn RefundRepository>) -> Self {
        Self { payments, refunds }
    }

    pub fn mysql(pool: MySqlPool) -> Self {
        Self::new(
            Arc::new(MySqlPaymentRepository::new(pool.clone())),
            Arc::new(MySqlRefundRepository::new(pool)),
        )
    }

    /// Both stores backed by one in-process table set.
    pub fn in_memory(store: InMemoryLedgerStore) -> Self {
        Self::new(Arc::new(store.clone()), Arc::new(store))
    }

    #[instrument(skip(self, filter))]
    pub async fn get_payments_by_organisation(
        &self,
        organisation_id: &str,
        filter: Option<&PaymentFilter>,
    ) -> Result<Vec<Payment>, LedgerError> {
        let default_filter = PaymentFilter::default();
        let filter = filter.unwrap_or(&default_filter);

        self.payments
            .find_by_organisation(organisation_id, filter)
            .await
            .inspect_err(|e| log_store_error("get_payments_by_organisation", e))
    }

    #[instrument(skip(self))]
    pub async fn get_payment_by_id(&self, payment_id: &str) -> Result<Option<Payment>, LedgerError> {
        self.payments
            .find_by_id(payment_id)
            .await
            .inspect_err(|e| log_store_error("get_payment_by_id", e))
    }

    /// Records a payment whose funds were confirmed upstream.
    #[instrument(skip(self, payment), fields(payment_id = %payment.id, organisation_id = %payment.organisation_id))]
    pub async fn record_payment(&self, payment: Payment) -> Result<Payment, LedgerError> {
        if payment.id.trim().is_empty()
            || payment.organisation_id.trim().is_empty()
            || payment.payer_id.trim().is_empty()
        {
            return Err(LedgerError::invalid_argument(
                "payment id, organisation id and payer id are required",
            ));
        }
        if payment.amount < Decimal::ZERO {
            return Err(LedgerError::invalid_argument("negative payment amount"));
        }
        if !has_currency_scale(payment.amount) {
            return Err(LedgerError::invalid_argument(
                "payment amount has more than two decimal places",
            ));
        }
        if payment.amount > MAX_AMOUNT {
            return Err(LedgerError::invalid_argument("payment amount exceeds the ledger maximum"));
        }

        // 已记录的支付不可覆盖
        let existing = self
            .payments
            .find_by_id(&payment.id)
            .await
            .inspect_err(|e| log_store_error("record_payment", e))?;
        if existing.is_some() {
            return Err(LedgerError::invalid_argument("payment already recorded"));
        }

        self.payments
            .save(&payment)
            .await
            .inspect_err(|e| log_store_error("record_payment", e))?;

        info!(amount = %payment.total(), status = %payment.status, "payment recorded");
        Ok(payment)
    }

    /// 校验并记录退款。整个过程在锁住支付行的同一事务内完成
    #[instrument(
        skip(self, request),
        fields(
            payment_id = %request.payment_id,
            organisation_id = %request.organisation_id,
            refund_amount = %request.refund_amount,
            requested_by = %request.requested_by,
        )
    )]
    pub async fn request_refund(&self, request: RefundRequest) -> Result<Refund, LedgerError> {
        let result = self.evaluate_and_record(&request).await;

        match &result {
            Ok(refund) => info!(refund_id = %refund.id, "refund recorded"),
            Err(LedgerError::Forbidden(reason)) => warn!(
                %reason,
                "refund rejected: potential tenant-isolation violation"
            ),
            Err(e @ LedgerError::Store(_)) => log_store_error("request_refund", e),
            Err(e) => info!(error = %e, kind = %e.kind(), "refund rejected"),
        }

        result
    }

    async fn evaluate_and_record(&self, request: &RefundRequest) -> Result<Refund, LedgerError> {
        let mut tx = self.refunds.begin().await?;

        // 1-5. 加锁读取支付并校验
        let locked = tx.lock_payment(&request.payment_id).await?;
        let payment = refund_validator::check_request(locked.as_ref(), request)?;

        // 6-7. 计算剩余可退金额
        let outstanding = tx.sum_outstanding(&payment.id).await?;
        let remaining = refund_validator::check_remaining(payment, request, outstanding)?;

        // 8. 写入退款记录
        let refund = refund_validator::build_refund(payment, request, Utc::now());
        tx.create(&refund).await?;
        tx.commit().await?;

        info!(
            remaining_before = %remaining,
            outstanding_after = %(outstanding + refund.refund_amount),
            "refund balance updated"
        );
        Ok(refund)
    }

    /// Refund history for a payment, oldest first.
    #[instrument(skip(self))]
    pub async fn get_refunds_for_payment(
        &self,
        organisation_id: &str,
        payment_id: &str,
    ) -> Result<Vec<Refund>, LedgerError> {
        self.scoped_payment(organisation_id, payment_id).await?;

        self.refunds
            .find_by_payment(payment_id)
            .await
            .inspect_err(|e| log_store_error("get_refunds_for_payment", e))
    }

    /// `amount - outstanding` as of now. Not locked; use for display only.
    #[instrument(skip(self))]
    pub async fn get_refundable_balance(
        &self,
        organisation_id: &str,
        payment_id: &str,
    ) -> Result<Money, LedgerError> {
        let payment = self.scoped_payment(organisation_id, payment_id).await?;
        let outstanding = self
            .refunds
            .sum_outstanding(payment_id)
            .await
            .inspect_err(|e| log_store_error("get_refundable_balance", e))?;

        Ok(refund_validator::refundable_balance(&payment, outstanding))
    }

    #[instrument(skip(self))]
    pub async fn get_lodgements_by_organisation(
        &self,
        organisation_id: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<LodgementSummary>, LedgerError> {
        let payments = self
            .payments
            .find_settled_paid(organisation_id, start_date, end_date)
            .await
            .inspect_err(|e| log_store_error("get_lodgements_by_organisation", e))?;

        lodgement::summarize(&payments)
    }

    async fn scoped_payment(&self, organisation_id: &str, payment_id: &str) -> Result<Payment, LedgerError> {
        let payment = self
            .payments
            .find_by_id(payment_id)
            .await
            .inspect_err(|e| log_store_error("find_by_id", e))?
            .ok_or_else(|| LedgerError::not_found("payment"))?;

        if payment.organisation_id != organisation_id {
            warn!(
                payment_id,
                organisation_id,
                "cross-tenant read rejected: potential tenant-isolation violation"
            );
            return Err(LedgerError::forbidden("payment belongs to another organisation"));
        }

        Ok(payment)
    }
}

fn log_store_error(operation: &'static str, err: &LedgerError) {
    if let LedgerError::Store(source) = err {
        error!(operation, error = %source, "ledger store failure");
    }
}
