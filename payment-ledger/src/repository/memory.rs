use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::payment_repository::PaymentRepository;
use super::refund_repository::{RefundRepository, RefundTransaction};
use crate::error::LedgerError;
use crate::models::enums::PaymentStatus;
use crate::models::payment::{Payment, Refund};
use crate::query::payment_filter::{within_settlement_range, PaymentFilter};

#[derive(Debug, Default)]
struct LedgerTables {
    payments: HashMap<String, Payment>,
    refunds: Vec<Refund>,
}

impl LedgerTables {
    fn outstanding(&self, payment_id: &str) -> Decimal {
        self.refunds
            .iter()
            .filter(|r| r.payment_id == payment_id && r.refund_status.counts_against_balance())
            .map(|r| r.refund_amount)
            .sum()
    }
}

/// 进程内台账存储，退款事务持有锁直到提交或丢弃
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedgerStore {
    tables: Arc<Mutex<LedgerTables>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn sort_for_listing(payments: &mut [Payment]) {
    // None 排在最后，与 MySQL DESC 的 NULL 顺序一致
    payments.sort_by(|a, b| {
        b.settlement_date
            .cmp(&a.settlement_date)
            .then_with(|| b.created_at.cmp(&a.created_at))
    });
}

#[async_trait]
impl PaymentRepository for InMemoryLedgerStore {
    async fn save(&self, payment: &Payment) -> Result<(), LedgerError> {
        let mut tables = self.tables.lock().await;
        // 与主键约束一致，不覆盖已有记录
        match tables.payments.entry(payment.id.clone()) {
            Entry::Occupied(_) => Err(LedgerError::invalid_argument("payment already recorded")),
            Entry::Vacant(slot) => {
                slot.insert(payment.clone());
                Ok(())
            }
        }
    }

    async fn find_by_id(&self, payment_id: &str) -> Result<Option<Payment>, LedgerError> {
        let tables = self.tables.lock().await;
        Ok(tables.payments.get(payment_id).cloned())
    }

    async fn find_by_organisation(
        &self,
        organisation_id: &str,
        filter: &PaymentFilter,
    ) -> Result<Vec<Payment>, LedgerError> {
        let tables = self.tables.lock().await;
        let mut payments: Vec<Payment> = tables
            .payments
            .values()
            .filter(|p| p.organisation_id == organisation_id)
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();

        sort_for_listing(&mut payments);
        Ok(payments)
    }

    async fn find_settled_paid(
        &self,
        organisation_id: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<Payment>, LedgerError> {
        let tables = self.tables.lock().await;
        let mut payments: Vec<Payment> = tables
            .payments
            .values()
            .filter(|p| p.organisation_id == organisation_id)
            .filter(|p| p.status == PaymentStatus::Paid && p.settlement_date.is_some())
            .filter(|p| within_settlement_range(p.settlement_date, start_date, end_date))
            .cloned()
            .collect();

        sort_for_listing(&mut payments);
        Ok(payments)
    }
}

#[async_trait]
impl RefundRepository for InMemoryLedgerStore {
    async fn create(&self, refund: &Refund) -> Result<(), LedgerError> {
        let mut tables = self.tables.lock().await;
        if !tables.payments.contains_key(&refund.payment_id) {
            return Err(LedgerError::not_found("payment"));
        }
        tables.refunds.push(refund.clone());
        Ok(())
    }

    async fn sum_outstanding(&self, payment_id: &str) -> Result<Decimal, LedgerError> {
        let tables = self.tables.lock().await;
        Ok(tables.outstanding(payment_id))
    }

    async fn find_by_payment(&self, payment_id: &str) -> Result<Vec<Refund>, LedgerError> {
        let tables = self.tables.lock().await;
        let mut refunds: Vec<Refund> = tables
            .refunds
            .iter()
            .filter(|r| r.payment_id == payment_id)
            .cloned()
            .collect();
        refunds.sort_by(|a, b| a.requested_at.cmp(&b.requested_at).then_with(|| a.id.cmp(&b.id)));
        Ok(refunds)
    }

    async fn begin(&self) -> Result<Box<dyn RefundTransaction>, LedgerError> {
        let guard = self.tables.clone().lock_owned().await;
        Ok(Box::new(InMemoryRefundTransaction {
            guard,
            staged: Vec::new(),
        }))
    }
}

pub struct InMemoryRefundTransaction {
    guard: OwnedMutexGuard<LedgerTables>,
    staged: Vec<Refund>,
}

#[async_trait]
impl RefundTransaction for InMemoryRefundTransaction {
    async fn lock_payment(&mut self, payment_id: &str) -> Result<Option<Payment>, LedgerError> {
        Ok(self.guard.payments.get(payment_id).cloned())
    }

    async fn sum_outstanding(&mut self, payment_id: &str) -> Result<Decimal, LedgerError> {
        let staged: Decimal = self
            .staged
            .iter()
            .filter(|r| r.payment_id == payment_id && r.refund_status.counts_against_balance())
            .map(|r| r.refund_amount)
            .sum();
        Ok(self.guard.outstanding(payment_id) + staged)
    }

    async fn create(&mut self, refund: &Refund) -> Result<(), LedgerError> {
        if !self.guard.payments.contains_key(&refund.payment_id) {
            return Err(LedgerError::not_found("payment"));
        }
        self.staged.push(refund.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), LedgerError> {
        let InMemoryRefundTransaction { mut guard, staged } = *self;
        guard.refunds.extend(staged);
        Ok(())
    }
}
