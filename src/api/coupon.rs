use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub type RowId = i64;
pub type QuestionId = RowId;
pub type CouponId = RowId;
pub type UserId = String;
pub type Credits = Decimal;
pub type Odds = Decimal;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Yes,
    No,
}
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum QuestionState {
    Open,
    Closed,
}
