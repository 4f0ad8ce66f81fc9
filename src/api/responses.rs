use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::*;

#[derive(PartialEq, Debug, Serialize, Deserialize, Clone)]
pub struct CouponReceipt {
    pub coupon_id: CouponId,
    pub stake_amount: Credits,
    pub total_odds: Odds,
    pub potential_payout: Credits,
    pub created_at: DateTime<Utc>,
}
#[derive(PartialEq, Debug, Serialize, Deserialize, Clone)]
pub struct CouponSummary {
    #[serde(flatten)]
    pub receipt: CouponReceipt,
    pub selections: Vec<SelectionRecord>,
}
#[derive(PartialEq, Debug, Serialize, Deserialize, Clone)]
pub struct QuestionResponse {
    pub id: QuestionId,
    pub question: String,
    pub yes_odds: Odds,
    pub no_odds: Odds,
    pub state: QuestionState,
}
impl QuestionResponse {
    pub fn odds_for(&self, side: Side) -> Odds {
        match side {
            Side::Yes => self.yes_odds,
            Side::No => self.no_odds,
        }
    }
}
