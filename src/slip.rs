use std::str::FromStr;

use log::trace;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

use crate::api::*;
use crate::error::SlipError;

pub const DEFAULT_STAKE: Credits = dec!(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SelectionId(u64);

#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub id: SelectionId,
    pub question_id: QuestionId,
    pub side: Side,
    pub odds: Odds,
    pub boosted: bool,
}
impl Selection {
    fn record(&self) -> SelectionRecord {
        SelectionRecord {
            question_id: self.question_id,
            vote: self.side,
            odds: self.odds,
            is_boosted: self.boosted,
        }
    }
}

/// The working coupon. At most one selection per question, kept in insertion
/// order.
#[derive(Debug, Clone)]
pub struct Slip {
    selections: Vec<Selection>,
    stake: Credits,
    default_stake: Credits,
    next_id: u64,
}
impl Default for Slip {
    fn default() -> Self {
        Self::new(DEFAULT_STAKE)
    }
}
impl Slip {
    /// A non-positive `default_stake` falls back to [`DEFAULT_STAKE`].
    pub fn new(default_stake: Credits) -> Self {
        let default_stake = if default_stake > Decimal::ZERO {
            default_stake
        } else {
            DEFAULT_STAKE
        };
        Self {
            selections: vec![],
            stake: default_stake,
            default_stake,
            next_id: 0,
        }
    }
    pub fn upsert_selection(
        &mut self,
        question_id: QuestionId,
        side: Side,
        odds: Odds,
        boosted: bool,
    ) -> SelectionId {
        if let Some(selection) = self
            .selections
            .iter_mut()
            .find(|selection| selection.question_id == question_id)
        {
            trace!(
                "Replacing {} @ {} with {} @ {} on question {}",
                selection.side,
                selection.odds,
                side,
                odds,
                question_id
            );
            selection.side = side;
            selection.odds = odds;
            selection.boosted = boosted;
            return selection.id;
        }
        let id = SelectionId(self.next_id);
        self.next_id += 1;
        trace!("Adding {} @ {} on question {}", side, odds, question_id);
        self.selections.push(Selection {
            id,
            question_id,
            side,
            odds,
            boosted,
        });
        id
    }
    pub fn remove_selection(&mut self, id: SelectionId) -> bool {
        let before = self.selections.len();
        self.selections.retain(|selection| selection.id != id);
        before != self.selections.len()
    }
    pub fn remove_question(&mut self, question_id: QuestionId) -> bool {
        let before = self.selections.len();
        self.selections
            .retain(|selection| selection.question_id != question_id);
        before != self.selections.len()
    }
    /// Drops every selection. The stake is left as is.
    pub fn clear(&mut self) {
        self.selections.clear();
    }
    pub fn set_stake(&mut self, amount: Credits) -> Result<(), SlipError> {
        if amount <= Decimal::ZERO {
            return Err(SlipError::InvalidStake(amount.to_string()));
        }
        self.stake = amount;
        Ok(())
    }
    pub fn reset_stake(&mut self) {
        self.stake = self.default_stake;
    }
    pub fn stake(&self) -> Credits {
        self.stake
    }
    pub fn default_stake(&self) -> Credits {
        self.default_stake
    }
    pub fn selections(&self) -> &[Selection] {
        &self.selections
    }
    pub fn selection_for(&self, question_id: QuestionId) -> Option<&Selection> {
        self.selections
            .iter()
            .find(|selection| selection.question_id == question_id)
    }
    pub fn len(&self) -> usize {
        self.selections.len()
    }
    pub fn is_empty(&self) -> bool {
        self.selections.is_empty()
    }
    /// Product of all odds, `1` for an empty slip. Saturates at `Decimal::MAX`
    /// instead of overflowing.
    pub fn aggregate_odds(&self) -> Odds {
        self.selections
            .iter()
            .fold(Decimal::ONE, |total, selection| {
                total.checked_mul(selection.odds).unwrap_or(Decimal::MAX)
            })
    }
    pub fn potential_payout(&self) -> Credits {
        self.aggregate_odds()
            .checked_mul(self.stake)
            .unwrap_or(Decimal::MAX)
    }
    /// Potential payout rounded to whole credits, for display only.
    pub fn display_payout(&self) -> Credits {
        self.potential_payout()
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
    }
    pub fn snapshot(&self) -> SubmitCouponRequest {
        SubmitCouponRequest {
            selections: self.selections.iter().map(Selection::record).collect(),
            stake_amount: self.stake,
        }
    }
    /// Removes what a settled coupon contained. Picks added or changed after
    /// the snapshot was taken stay, and so does a stake edited in the meantime.
    pub fn discard_submitted(&mut self, submitted: &SubmitCouponRequest) {
        self.selections
            .retain(|selection| !submitted.selections.contains(&selection.record()));
        if self.stake == submitted.stake_amount {
            self.reset_stake();
        }
    }
}

/// Validates raw stake input before it reaches [`Slip::set_stake`].
pub fn parse_stake(input: &str) -> Result<Credits, SlipError> {
    let trimmed = input.trim();
    match Decimal::from_str(trimmed) {
        Ok(amount) if amount > Decimal::ZERO => Ok(amount),
        _ => Err(SlipError::InvalidStake(trimmed.to_string())),
    }
}
