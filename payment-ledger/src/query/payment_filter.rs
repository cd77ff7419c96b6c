// 支付列表过滤条件：维度之间 AND，同一维度多值 OR。SQL 与内存两种实现语义一致

use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{MySql, QueryBuilder};

use crate::models::enums::{PaymentMethod, PaymentStatus};
use crate::models::payment::Payment;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentFilter {
    pub payment_status: Option<Vec<PaymentStatus>>,
    pub payment_method: Option<Vec<PaymentMethod>>,
    pub payment_type: Option<Vec<String>>,
    /// 结算日期下界（含）
    pub start_date: Option<NaiveDate>,
    /// 结算日期上界（含）
    pub end_date: Option<NaiveDate>,
    pub search_term: Option<String>,
}

impl PaymentFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, statuses: impl IntoIterator<Item = PaymentStatus>) -> Self {
        self.payment_status = Some(statuses.into_iter().collect());
        self
    }

    pub fn with_method(mut self, methods: impl IntoIterator<Item = PaymentMethod>) -> Self {
        self.payment_method = Some(methods.into_iter().collect());
        self
    }

    pub fn with_type<S: Into<String>>(mut self, types: impl IntoIterator<Item = S>) -> Self {
        self.payment_type = Some(types.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_date_range(mut self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        self.start_date = start;
        self.end_date = end;
        self
    }

    pub fn with_search(mut self, term: impl Into<String>) -> Self {
        self.search_term = Some(term.into());
        self
    }

    /// 去除空白后的搜索词，空串视为未设置
    fn normalized_search(&self) -> Option<String> {
        self.search_term
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
    }

    /// In-process rendering, used by the memory store.
    pub fn matches(&self, payment: &Payment) -> bool {
        if let Some(statuses) = non_empty(&self.payment_status) {
            if !statuses.contains(&payment.status) {
                return false;
            }
        }

        if let Some(methods) = non_empty(&self.payment_method) {
            if !methods.contains(&payment.method) {
                return false;
            }
        }

        if let Some(types) = non_empty(&self.payment_type) {
            if !types.iter().any(|t| t == &payment.payment_type) {
                return false;
            }
        }

        if !within_settlement_range(payment.settlement_date, self.start_date, self.end_date) {
            return false;
        }

        if let Some(term) = self.normalized_search() {
            let hit = [
                payment.payer_name.as_deref(),
                payment.payer_email.as_deref(),
                payment.provider_transaction_id.as_deref(),
            ]
            .into_iter()
            .flatten()
            .any(|field| field.to_lowercase().contains(&term));

            if !hit {
                return false;
            }
        }

        true
    }

    /// Appends ` WHERE p.organisation_id = ? AND ...` to `builder`.
    ///
    /// Expects the payments table aliased as `p` and the payer projection as `u`.
    pub fn push_where(&self, builder: &mut QueryBuilder<'_, MySql>, organisation_id: &str) {
        builder
            .push(" WHERE p.organisation_id = ")
            .push_bind(organisation_id.to_string());

        if let Some(statuses) = non_empty(&self.payment_status) {
            builder.push(" AND p.status IN (");
            let mut separated = builder.separated(", ");
            for status in statuses {
                separated.push_bind(status.as_str());
            }
            separated.push_unseparated(")");
        }

        if let Some(methods) = non_empty(&self.payment_method) {
            builder.push(" AND p.method IN (");
            let mut separated = builder.separated(", ");
            for method in methods {
                separated.push_bind(method.as_str());
            }
            separated.push_unseparated(")");
        }

        if let Some(types) = non_empty(&self.payment_type) {
            builder.push(" AND p.payment_type IN (");
            let mut separated = builder.separated(", ");
            for payment_type in types {
                separated.push_bind(payment_type.clone());
            }
            separated.push_unseparated(")");
        }

        push_settlement_range(builder, self.start_date, self.end_date);

        if let Some(term) = self.normalized_search() {
            let pattern = format!("%{}%", escape_like(&term));
            builder
                .push(" AND (LOWER(u.display_name) LIKE ")
                .push_bind(pattern.clone())
                .push(" OR LOWER(u.email) LIKE ")
                .push_bind(pattern.clone())
                .push(" OR LOWER(p.provider_transaction_id) LIKE ")
                .push_bind(pattern)
                .push(")");
        }
    }
}

fn non_empty<T>(values: &Option<Vec<T>>) -> Option<&[T]> {
    values.as_deref().filter(|v| !v.is_empty())
}

/// 日期下界对应当天 00:00:00 UTC
pub fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// 日期上界（含）换算成次日 00:00:00 的开区间
pub fn day_end_exclusive(date: NaiveDate) -> DateTime<Utc> {
    let next = date.checked_add_days(Days::new(1)).unwrap_or(NaiveDate::MAX);
    day_start(next)
}

/// Inclusive calendar-day range check. A payment without a settlement date
/// never satisfies a bounded range.
pub fn within_settlement_range(
    settlement: Option<DateTime<Utc>>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> bool {
    if start.is_none() && end.is_none() {
        return true;
    }

    let Some(settled) = settlement else {
        return false;
    };

    if let Some(start) = start {
        if settled < day_start(start) {
            return false;
        }
    }

    if let Some(end) = end {
        if settled >= day_end_exclusive(end) {
            return false;
        }
    }

    true
}

pub fn push_settlement_range(
    builder: &mut QueryBuilder<'_, MySql>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) {
    if let Some(start) = start {
        builder
            .push(" AND p.settlement_date >= ")
            .push_bind(day_start(start));
    }

    if let Some(end) = end {
        builder
            .push(" AND p.settlement_date < ")
            .push_bind(day_end_exclusive(end));
    }
}

/// 转义 LIKE 通配符，MySQL 默认转义符为反斜杠
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
