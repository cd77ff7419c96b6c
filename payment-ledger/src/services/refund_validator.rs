// 退款校验规则，按顺序执行，第一个失败即返回。纯函数，未结退款额由调用方在同一事务内提供

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::money::{has_currency_scale, Money};
use crate::error::LedgerError;
use crate::models::enums::{PaymentStatus, RefundStatus};
use crate::models::payment::{Payment, Refund, RefundRequest};

/// Checks 1 through 5. Returns the payment so later checks can use it.
pub fn check_request<'a>(
    payment: Option<&'a Payment>,
    request: &RefundRequest,
) -> Result<&'a Payment, LedgerError> {
    let payment = payment.ok_or_else(|| LedgerError::not_found("payment"))?;

    if payment.organisation_id != request.organisation_id {
        return Err(LedgerError::forbidden("cross-tenant refund"));
    }

    if payment.status != PaymentStatus::Paid {
        return Err(LedgerError::invalid_state("payment not paid", payment.status));
    }

    if request.refund_amount <= Decimal::ZERO {
        return Err(LedgerError::invalid_argument("non-positive refund amount"));
    }

    if !has_currency_scale(request.refund_amount) {
        return Err(LedgerError::invalid_argument(
            "refund amount has more than two decimal places",
        ));
    }

    if request.refund_amount > payment.amount {
        return Err(LedgerError::invalid_argument("refund exceeds payment amount"));
    }

    Ok(payment)
}

/// Checks 6 and 7. Returns the balance that remains refundable before this request.
pub fn check_remaining(
    payment: &Payment,
    request: &RefundRequest,
    outstanding: Decimal,
) -> Result<Money, LedgerError> {
    let remaining = refundable_balance(payment, outstanding);

    if request.refund_amount > remaining.amount {
        return Err(LedgerError::invalid_argument(format!(
            "refund exceeds remaining refundable amount: {} remaining",
            remaining
        )));
    }

    Ok(remaining)
}

/// `amount - outstanding`, floored at zero for display when historic data
/// already overcommits.
pub fn refundable_balance(payment: &Payment, outstanding: Decimal) -> Money {
    payment.total().remaining_after(outstanding)
}

/// Step 8: the pending refund to persist.
pub fn build_refund(payment: &Payment, request: &RefundRequest, now: DateTime<Utc>) -> Refund {
    Refund {
        id: Uuid::new_v4().to_string(),
        payment_id: payment.id.clone(),
        organisation_id: payment.organisation_id.clone(),
        refund_amount: request.refund_amount,
        refund_reason: request.refund_reason.clone(),
        refund_status: RefundStatus::Pending,
        requested_by: request.requested_by.clone(),
        requested_at: now,
        metadata: request.metadata.clone(),
    }
}
