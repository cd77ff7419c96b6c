use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::enums::{PaymentMethod, PaymentStatus, RefundStatus};
use crate::domain::money::{Currency, Money};

/// 已确认收款的支付记录
///
/// `metadata` is an opaque blob owned by the upstream capture flow and is
/// stored and returned verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: String,
    pub organisation_id: String,
    pub payer_id: String,
    /// 付款人显示名和邮箱来自用户表，写入时忽略
    pub payer_name: Option<String>,
    pub payer_email: Option<String>,
    pub payment_type: String,
    pub context_id: Option<String>,
    pub amount: Decimal,
    pub currency: Currency,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub provider: Option<String>,
    pub provider_transaction_id: Option<String>,
    pub settlement_date: Option<DateTime<Utc>>,
    pub metadata: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn total(&self) -> Money {
        Money::new(self.amount, self.currency.clone())
    }

    pub fn settlement_day(&self) -> Option<NaiveDate> {
        self.settlement_date.map(|d| d.date_naive())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Refund {
    pub id: String,
    pub payment_id: String,
    pub organisation_id: String,
    pub refund_amount: Decimal,
    pub refund_reason: Option<String>,
    pub refund_status: RefundStatus,
    pub requested_by: String,
    pub requested_at: DateTime<Utc>,
    pub metadata: Option<String>,
}

/// 退款申请
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundRequest {
    pub payment_id: String,
    pub organisation_id: String,
    pub refund_amount: Decimal,
    pub refund_reason: Option<String>,
    pub requested_by: String,
    /// 原样写入退款记录
    #[serde(default)]
    pub metadata: Option<String>,
}

/// 按结算日、收款方式、币种汇总的对账行
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LodgementSummary {
    pub date: NaiveDate,
    pub payment_method: PaymentMethod,
    pub currency: Currency,
    pub total_amount: Decimal,
    pub transaction_count: u64,
}
