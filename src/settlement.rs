use crate::api::*;
use crate::db::{NewCoupon, DB};
use anyhow::Context;
use chrono::{SubsecRound, Utc};
use log::debug;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("Access Denied: {0}")]
    AccessDenied(String),
    #[error("User {0} doesn't exist")]
    UnknownUser(UserId),
    #[error("Question {0} doesn't exist")]
    UnknownQuestion(QuestionId),
    #[error("Question {0} is no longer open for voting")]
    QuestionClosed(QuestionId),
    #[error("Question {0} appears more than once on the coupon")]
    DuplicateQuestion(QuestionId),
    #[error("A coupon needs at least one selection")]
    EmptyCoupon,
    #[error("Stake has to be positive, got {0}")]
    InvalidStake(Credits),
    #[error("Odds have to be positive, got {odds} on question {question}")]
    InvalidOdds { question: QuestionId, odds: Odds },
    #[error("Odds of a new question have to be positive, got {0}")]
    InvalidQuestionOdds(Odds),
    #[error("Insufficient balance: {balance} available but the stake is {stake}")]
    InsufficientBalance { balance: Credits, stake: Credits },
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}
impl SettlementError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::AccessDenied(_) => StatusCode::UNAUTHORIZED,
            Self::UnknownUser(_) | Self::UnknownQuestion(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}
type Result<T> = std::result::Result<T, SettlementError>;

/// Remote side of the coupon flow: balances, open questions and accepted
/// coupons.
pub struct Settlement {
    db: Arc<Box<dyn DB + Send + Sync>>,
    admins: Vec<UserId>,
    starting_balance: Credits,
    test: bool,
}
impl Settlement {
    pub fn new(
        db: Box<dyn DB + Send + Sync>,
        admins: Vec<UserId>,
        starting_balance: Credits,
        test: bool,
    ) -> Self {
        Self {
            db: Arc::new(db),
            admins,
            starting_balance,
            test,
        }
    }
    /// Creates the user with the starting balance on first contact. Later
    /// calls have to present the same token.
    pub async fn register(&self, access: AccessRequest) -> Result<Credits> {
        match self.db.get_user_token(&access.user).await? {
            Some(_) => {
                self.check_access(&access).await?;
            }
            None => {
                self.db
                    .create_user(&access.user, &access.token, self.starting_balance)
                    .await?;
                debug!(
                    "Created user {} with {} credits",
                    access.user, self.starting_balance
                );
            }
        }
        self.get_balance(access).await
    }
    pub async fn submit_coupon(
        &self,
        access: AccessRequest,
        request: SubmitCouponRequest,
    ) -> Result<CouponReceipt> {
        self.check_access(&access).await?;
        if request.selections.is_empty() {
            return Err(SettlementError::EmptyCoupon);
        }
        if request.stake_amount <= Decimal::ZERO {
            return Err(SettlementError::InvalidStake(request.stake_amount));
        }
        let mut seen = HashSet::new();
        for selection in &request.selections {
            if !seen.insert(selection.question_id) {
                return Err(SettlementError::DuplicateQuestion(selection.question_id));
            }
            if selection.odds <= Decimal::ZERO {
                return Err(SettlementError::InvalidOdds {
                    question: selection.question_id,
                    odds: selection.odds,
                });
            }
            match self.db.get_question_state(selection.question_id).await? {
                Some(QuestionState::Open) => {}
                Some(QuestionState::Closed) => {
                    return Err(SettlementError::QuestionClosed(selection.question_id))
                }
                None => return Err(SettlementError::UnknownQuestion(selection.question_id)),
            }
        }
        let balance = self
            .db
            .get_balance(&access.user)
            .await?
            .ok_or_else(|| SettlementError::UnknownUser(access.user.clone()))?;
        if balance < request.stake_amount {
            return Err(SettlementError::InsufficientBalance {
                balance,
                stake: request.stake_amount,
            });
        }
        let total_odds = Self::total_odds(&request.selections)?;
        let potential_payout = total_odds
            .checked_mul(request.stake_amount)
            .context("potential payout overflowed")?;
        let coupon = NewCoupon {
            user: access.user,
            request,
            total_odds,
            potential_payout,
            created_at: Utc::now().trunc_subsecs(0),
        };
        let coupon_id = self
            .db
            .create_coupon(&coupon, balance - coupon.request.stake_amount)
            .await?;
        debug!(
            "Accepted coupon {} for user {}: stake {}, odds {}",
            coupon_id, coupon.user, coupon.request.stake_amount, total_odds
        );
        Ok(CouponReceipt {
            coupon_id,
            stake_amount: coupon.request.stake_amount,
            total_odds,
            potential_payout,
            created_at: coupon.created_at,
        })
    }
    pub fn total_odds(selections: &[SelectionRecord]) -> Result<Odds> {
        let mut total = Decimal::ONE;
        for selection in selections {
            total = total
                .checked_mul(selection.odds)
                .context("total odds overflowed")?;
        }
        Ok(total)
    }
    pub async fn get_balance(&self, access: AccessRequest) -> Result<Credits> {
        self.check_access(&access).await?;
        self.db
            .get_balance(&access.user)
            .await?
            .ok_or(SettlementError::UnknownUser(access.user))
    }
    pub async fn get_coupons(&self, access: AccessRequest) -> Result<Vec<CouponSummary>> {
        self.check_access(&access).await?;
        Ok(self.db.get_coupons(&access.user).await?)
    }
    pub async fn get_questions(&self) -> Result<Vec<QuestionResponse>> {
        Ok(self.db.get_questions().await?)
    }
    pub async fn new_question(
        &self,
        question: String,
        yes_odds: Odds,
        no_odds: Odds,
        access: AccessRequest,
    ) -> Result<QuestionId> {
        self.check_admin(&access).await?;
        for odds in [yes_odds, no_odds] {
            if odds <= Decimal::ZERO {
                return Err(SettlementError::InvalidQuestionOdds(odds));
            }
        }
        Ok(self.db.add_question(&question, yes_odds, no_odds).await?)
    }
    pub async fn close_question(&self, question: QuestionId, access: AccessRequest) -> Result<()> {
        self.check_admin(&access).await?;
        if self.db.get_question_state(question).await?.is_none() {
            return Err(SettlementError::UnknownQuestion(question));
        }
        Ok(self
            .db
            .set_question_state(question, QuestionState::Closed)
            .await?)
    }
    pub async fn adjust_balance(
        &self,
        user: UserId,
        amount: Credits,
        access: AccessRequest,
    ) -> Result<Credits> {
        self.check_admin(&access).await?;
        let balance = self
            .db
            .get_balance(&user)
            .await?
            .ok_or_else(|| SettlementError::UnknownUser(user.clone()))?;
        let balance = (balance + amount).max(Decimal::ZERO);
        self.db.set_balance(&user, balance).await?;
        Ok(balance)
    }
    pub async fn check_access(&self, access: &AccessRequest) -> Result<()> {
        if self.test {
            return Ok(());
        }
        match self.db.get_user_token(&access.user).await? {
            Some(token) if token == access.token => Ok(()),
            Some(_) => {
                debug!(
                    "User {} tried to access with invalid access token",
                    access.user
                );
                Err(SettlementError::AccessDenied(format!(
                    "Access token for user {} is invalid",
                    access.user
                )))
            }
            None => Err(SettlementError::UnknownUser(access.user.clone())),
        }
    }
    async fn check_admin(&self, access: &AccessRequest) -> Result<()> {
        if self.test {
            return Ok(());
        }
        if !self.admins.contains(&access.user) {
            return Err(SettlementError::AccessDenied("Admin only API".into()));
        }
        self.check_access(access).await
    }
}
