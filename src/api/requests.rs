use serde::{Deserialize, Serialize};

use super::*;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AccessRequest {
    pub user: UserId,
    pub token: String,
}
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PostRequest<T> {
    pub access: AccessRequest,
    pub data: T,
}
/// One pick as it travels to the settlement service.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SelectionRecord {
    pub question_id: QuestionId,
    pub vote: Side,
    pub odds: Odds,
    pub is_boosted: bool,
}
/// Value snapshot of a slip at submit time. Holds no references into the slip
/// it was built from.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SubmitCouponRequest {
    pub selections: Vec<SelectionRecord>,
    pub stake_amount: Credits,
}
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct NewQuestionRequest {
    pub question: String,
    pub yes_odds: Odds,
    pub no_odds: Odds,
}
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct QuestionRequest {
    pub question: QuestionId,
}
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AdjustBalanceRequest {
    pub user: UserId,
    pub amount: Credits,
}
