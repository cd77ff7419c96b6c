use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::cmp::Reverse;
use std::collections::BTreeMap;

use crate::domain::money::Currency;
use crate::error::LedgerError;
use crate::models::enums::{PaymentMethod, PaymentStatus};
use crate::models::payment::{LodgementSummary, Payment};

/// 按（结算日, 收款方式, 币种）汇总已支付且已结算的记录
///
/// 日期降序，方式名升序，再按币种。合计超出 `Decimal` 范围时返回 `InvalidArgument`。
pub fn summarize(payments: &[Payment]) -> Result<Vec<LodgementSummary>, LedgerError> {
    let mut groups: BTreeMap<(Reverse<NaiveDate>, &'static str, Currency), (PaymentMethod, Decimal, u64)> =
        BTreeMap::new();

    for payment in payments {
        if payment.status != PaymentStatus::Paid {
            continue;
        }
        let Some(day) = payment.settlement_day() else {
            continue;
        };

        let key = (Reverse(day), payment.method.as_str(), payment.currency.clone());
        let entry = groups
            .entry(key)
            .or_insert((payment.method, Decimal::ZERO, 0));
        entry.1 = entry
            .1
            .checked_add(payment.amount)
            .ok_or_else(|| LedgerError::invalid_argument("lodgement total out of range"))?;
        entry.2 += 1;
    }

    Ok(groups
        .into_iter()
        .map(|((Reverse(date), _, currency), (payment_method, total_amount, transaction_count))| {
            LodgementSummary {
                date,
                payment_method,
                currency,
                total_amount,
                transaction_count,
            }
        })
        .collect())
}
