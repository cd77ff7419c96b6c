use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};

/// 支付状态，只有 `Paid` 可以退款
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Refunded,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RefundStatus {
    Pending,
    Completed,
    Rejected,
}

impl RefundStatus {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    /// 计入已占用退款额度的状态
    pub fn counts_against_balance(&self) -> bool {
        matches!(self, Self::Pending | Self::Completed)
    }

    pub fn outstanding() -> [RefundStatus; 2] {
        [Self::Pending, Self::Completed]
    }
}

/// 收款方式
///
/// Lodgement summaries order methods by their storage name, so `as_str`
/// is the sort key rather than declaration order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter, IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentMethod {
    Card,
    Cash,
    Cheque,
    BankTransfer,
    Offline,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}
