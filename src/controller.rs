use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use log::{debug, warn};

use crate::api::*;
use crate::error::{SlipError, SubmitError};
use crate::slip::{SelectionId, Slip};

#[async_trait]
pub trait SettlementService {
    async fn submit_coupon(
        &self,
        access: &AccessRequest,
        request: &SubmitCouponRequest,
    ) -> Result<CouponReceipt, SubmitError>;
}

/// Signals the controller sends to whoever renders the rest of the app.
pub trait SlipEvents {
    fn refresh_balance(&self);
    fn invalidate_coupons(&self);
    fn submission_failed(&self, message: &str);
}

/// Read-only view of the logged in user, injected at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub access: AccessRequest,
    pub balance: Option<Credits>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionState {
    Idle,
    Submitting,
}
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    EmptySlip,
    InFlight,
}
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Skipped(SkipReason),
    Settled(CouponReceipt),
    Failed(SubmitError),
}

struct Inner {
    slip: Slip,
    state: SubmissionState,
}

pub struct SlipController {
    inner: Mutex<Inner>,
    session: Session,
    settlement: Box<dyn SettlementService + Send + Sync>,
    events: Box<dyn SlipEvents + Send + Sync>,
}
impl SlipController {
    pub fn new(
        slip: Slip,
        session: Session,
        settlement: Box<dyn SettlementService + Send + Sync>,
        events: Box<dyn SlipEvents + Send + Sync>,
    ) -> Self {
        Self {
            inner: Mutex::new(Inner {
                slip,
                state: SubmissionState::Idle,
            }),
            session,
            settlement,
            events,
        }
    }
    // Never held across an await.
    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
    pub fn session(&self) -> &Session {
        &self.session
    }
    pub fn state(&self) -> SubmissionState {
        self.inner().state
    }
    /// Copy of the current slip for rendering.
    pub fn slip(&self) -> Slip {
        self.inner().slip.clone()
    }
    pub fn upsert_selection(
        &self,
        question_id: QuestionId,
        side: Side,
        odds: Odds,
        boosted: bool,
    ) -> SelectionId {
        self.inner()
            .slip
            .upsert_selection(question_id, side, odds, boosted)
    }
    pub fn remove_selection(&self, id: SelectionId) -> bool {
        self.inner().slip.remove_selection(id)
    }
    pub fn remove_question(&self, question_id: QuestionId) -> bool {
        self.inner().slip.remove_question(question_id)
    }
    pub fn clear(&self) {
        self.inner().slip.clear()
    }
    pub fn set_stake(&self, amount: Credits) -> Result<(), SlipError> {
        self.inner().slip.set_stake(amount)
    }
    pub fn aggregate_odds(&self) -> Odds {
        self.inner().slip.aggregate_odds()
    }
    pub fn potential_payout(&self) -> Credits {
        self.inner().slip.potential_payout()
    }
    /// Compares the stake with the balance the session was created with. The
    /// settlement service does the authoritative check.
    pub fn stake_exceeds_balance(&self) -> bool {
        match self.session.balance {
            Some(balance) => self.inner().slip.stake() > balance,
            None => false,
        }
    }
    /// Sends the current slip for settlement. Empty slips and calls made while
    /// another submission is pending are skipped without contacting the
    /// service. Nothing is retried.
    pub async fn submit(&self) -> SubmitOutcome {
        let request = {
            let mut inner = self.inner();
            if inner.state == SubmissionState::Submitting {
                debug!("Skipping submit, another one is still in flight");
                return SubmitOutcome::Skipped(SkipReason::InFlight);
            }
            if inner.slip.is_empty() {
                debug!("Skipping submit of an empty slip");
                return SubmitOutcome::Skipped(SkipReason::EmptySlip);
            }
            inner.state = SubmissionState::Submitting;
            inner.slip.snapshot()
        };
        debug!(
            "Submitting coupon with {} selections and stake {} for user {}",
            request.selections.len(),
            request.stake_amount,
            self.session.access.user
        );
        let guard = SubmitGuard {
            controller: self,
            armed: true,
        };
        let result = self
            .settlement
            .submit_coupon(&self.session.access, &request)
            .await;
        guard.finish(result.is_ok().then_some(&request));
        match result {
            Ok(receipt) => {
                debug!(
                    "Coupon {} settled, potential payout {}",
                    receipt.coupon_id, receipt.potential_payout
                );
                self.events.refresh_balance();
                self.events.invalidate_coupons();
                SubmitOutcome::Settled(receipt)
            }
            Err(e) => {
                warn!("Coupon submission failed: {}", e);
                self.events.submission_failed(&e.user_message());
                SubmitOutcome::Failed(e)
            }
        }
    }
}

/// Puts the controller back to `Idle` even when the pending `submit()` future
/// is dropped.
struct SubmitGuard<'a> {
    controller: &'a SlipController,
    armed: bool,
}
impl SubmitGuard<'_> {
    fn finish(mut self, settled: Option<&SubmitCouponRequest>) {
        let mut inner = self.controller.inner();
        inner.state = SubmissionState::Idle;
        if let Some(request) = settled {
            inner.slip.discard_submitted(request);
        }
        self.armed = false;
    }
}
impl Drop for SubmitGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            debug!("Submission dropped before the service answered");
            self.controller.inner().state = SubmissionState::Idle;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Notify;

    #[derive(Debug, Clone, PartialEq)]
    pub enum Event {
        RefreshBalance,
        InvalidateCoupons,
        Failed(String),
    }

    #[derive(Default, Clone)]
    pub struct RecordingEvents {
        pub events: Arc<Mutex<Vec<Event>>>,
    }
    impl RecordingEvents {
        pub fn take(&self) -> Vec<Event> {
            std::mem::take(&mut *self.events.lock().unwrap())
        }
    }
    impl SlipEvents for RecordingEvents {
        fn refresh_balance(&self) {
            self.events.lock().unwrap().push(Event::RefreshBalance);
        }
        fn invalidate_coupons(&self) {
            self.events.lock().unwrap().push(Event::InvalidateCoupons);
        }
        fn submission_failed(&self, message: &str) {
            self.events
                .lock()
                .unwrap()
                .push(Event::Failed(message.to_string()));
        }
    }

    /// Captures every request. Answers with `response`, optionally only after
    /// `gate` is notified.
    #[derive(Clone)]
    struct FakeSettlement {
        requests: Arc<Mutex<Vec<SubmitCouponRequest>>>,
        response: Result<(), SubmitError>,
        gate: Option<Arc<Notify>>,
    }
    impl FakeSettlement {
        fn accepting() -> Self {
            Self {
                requests: Default::default(),
                response: Ok(()),
                gate: None,
            }
        }
        fn failing(e: SubmitError) -> Self {
            Self {
                response: Err(e),
                ..Self::accepting()
            }
        }
        fn gated(gate: Arc<Notify>) -> Self {
            Self {
                gate: Some(gate),
                ..Self::accepting()
            }
        }
        fn requests(&self) -> Vec<SubmitCouponRequest> {
            self.requests.lock().unwrap().clone()
        }
    }
    #[async_trait]
    impl SettlementService for FakeSettlement {
        async fn submit_coupon(
            &self,
            _access: &AccessRequest,
            request: &SubmitCouponRequest,
        ) -> Result<CouponReceipt, SubmitError> {
            self.requests.lock().unwrap().push(request.clone());
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.response.clone()?;
            let total_odds = request
                .selections
                .iter()
                .fold(dec!(1), |total, selection| total * selection.odds);
            Ok(CouponReceipt {
                coupon_id: 1,
                stake_amount: request.stake_amount,
                total_odds,
                potential_payout: total_odds * request.stake_amount,
                created_at: Utc::now(),
            })
        }
    }

    pub fn test_session() -> Session {
        Session {
            access: AccessRequest {
                user: "alice".into(),
                token: "secret".into(),
            },
            balance: Some(dec!(1000)),
        }
    }

    fn controller(settlement: &FakeSettlement, events: &RecordingEvents) -> SlipController {
        SlipController::new(
            Slip::default(),
            test_session(),
            Box::new(settlement.clone()),
            Box::new(events.clone()),
        )
    }

    #[tokio::test]
    async fn end_to_end_vote_stake_submit() {
        let settlement = FakeSettlement::accepting();
        let events = RecordingEvents::default();
        let controller = controller(&settlement, &events);

        controller.upsert_selection(1, Side::Yes, dec!(2.4), false);
        assert_eq!(controller.slip().len(), 1);
        assert_eq!(controller.aggregate_odds(), dec!(2.4));

        controller.upsert_selection(1, Side::No, dec!(1.6), false);
        let slip = controller.slip();
        assert_eq!(slip.len(), 1);
        assert_eq!(slip.selections()[0].side, Side::No);
        assert_eq!(controller.aggregate_odds(), dec!(1.6));

        controller.set_stake(dec!(500)).unwrap();
        assert_eq!(controller.potential_payout(), dec!(800));

        let outcome = controller.submit().await;
        let SubmitOutcome::Settled(receipt) = outcome else {
            panic!("expected settlement, got {:?}", outcome);
        };
        assert_eq!(receipt.potential_payout, dec!(800));
        let slip = controller.slip();
        assert!(slip.is_empty());
        assert_eq!(slip.stake(), dec!(10));
        assert_eq!(controller.state(), SubmissionState::Idle);
        assert_eq!(
            events.take(),
            vec![Event::RefreshBalance, Event::InvalidateCoupons]
        );
        assert_eq!(
            settlement.requests(),
            vec![SubmitCouponRequest {
                selections: vec![SelectionRecord {
                    question_id: 1,
                    vote: Side::No,
                    odds: dec!(1.6),
                    is_boosted: false,
                }],
                stake_amount: dec!(500),
            }]
        );
    }

    #[tokio::test]
    async fn empty_slip_is_not_submitted() {
        let settlement = FakeSettlement::accepting();
        let events = RecordingEvents::default();
        let controller = controller(&settlement, &events);

        assert_eq!(
            controller.submit().await,
            SubmitOutcome::Skipped(SkipReason::EmptySlip)
        );
        assert!(settlement.requests().is_empty());
        assert!(events.take().is_empty());
    }

    #[tokio::test]
    async fn second_submit_while_pending_is_skipped() {
        let gate = Arc::new(Notify::new());
        let settlement = FakeSettlement::gated(gate.clone());
        let events = RecordingEvents::default();
        let controller = controller(&settlement, &events);
        controller.upsert_selection(1, Side::Yes, dec!(2), false);

        let (first, second, _) = tokio::join!(controller.submit(), controller.submit(), async {
            gate.notify_one();
        });

        assert!(matches!(first, SubmitOutcome::Settled(_)));
        assert_eq!(second, SubmitOutcome::Skipped(SkipReason::InFlight));
        assert_eq!(settlement.requests().len(), 1);
    }

    #[tokio::test]
    async fn mutations_during_flight_do_not_touch_the_request() {
        let gate = Arc::new(Notify::new());
        let settlement = FakeSettlement::gated(gate.clone());
        let events = RecordingEvents::default();
        let controller = controller(&settlement, &events);
        controller.upsert_selection(1, Side::Yes, dec!(2), false);

        let (outcome, _) = tokio::join!(controller.submit(), async {
            assert_eq!(controller.state(), SubmissionState::Submitting);
            controller.upsert_selection(2, Side::No, dec!(3), true);
            controller.upsert_selection(1, Side::No, dec!(1.5), false);
            gate.notify_one();
        });

        assert!(matches!(outcome, SubmitOutcome::Settled(_)));
        let sent = settlement.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0].selections,
            vec![SelectionRecord {
                question_id: 1,
                vote: Side::Yes,
                odds: dec!(2),
                is_boosted: false,
            }]
        );
        let slip = controller.slip();
        assert_eq!(slip.len(), 2);
        assert_eq!(slip.aggregate_odds(), dec!(4.5));

        gate.notify_one();
        controller.submit().await;
        assert_eq!(settlement.requests()[1].selections.len(), 2);
        assert!(controller.slip().is_empty());
    }

    #[tokio::test]
    async fn failure_preserves_slip() {
        for error in [
            SubmitError::Validation("Insufficient balance".into()),
            SubmitError::Transport("connection refused".into()),
            SubmitError::Unknown("500 Internal Server Error".into()),
        ] {
            let settlement = FakeSettlement::failing(error.clone());
            let events = RecordingEvents::default();
            let controller = controller(&settlement, &events);
            controller.upsert_selection(1, Side::Yes, dec!(2), true);
            controller.upsert_selection(2, Side::No, dec!(1.25), false);
            controller.set_stake(dec!(300)).unwrap();
            let before = controller.slip();

            assert_eq!(controller.submit().await, SubmitOutcome::Failed(error.clone()));

            let after = controller.slip();
            assert_eq!(after.selections(), before.selections());
            assert_eq!(after.stake(), dec!(300));
            assert_eq!(controller.state(), SubmissionState::Idle);
            assert_eq!(events.take(), vec![Event::Failed(error.user_message())]);
        }
    }

    #[tokio::test]
    async fn dropped_submit_returns_to_idle() {
        let gate = Arc::new(Notify::new());
        let settlement = FakeSettlement::gated(gate.clone());
        let events = RecordingEvents::default();
        let controller = controller(&settlement, &events);
        controller.upsert_selection(1, Side::Yes, dec!(2), false);

        tokio::time::timeout(Duration::from_millis(20), controller.submit())
            .await
            .unwrap_err();
        assert_eq!(controller.state(), SubmissionState::Idle);
        assert_eq!(controller.slip().len(), 1);
        assert!(events.take().is_empty());

        gate.notify_one();
        let outcome = controller.submit().await;
        assert!(matches!(outcome, SubmitOutcome::Settled(_)), "{:?}", outcome);
        assert_eq!(settlement.requests().len(), 2);
        assert!(controller.slip().is_empty());
    }

    #[tokio::test]
    async fn retry_after_failure_is_a_fresh_submit() {
        let settlement = FakeSettlement::failing(SubmitError::Transport("timeout".into()));
        let events = RecordingEvents::default();
        let controller = controller(&settlement, &events);
        controller.upsert_selection(1, Side::Yes, dec!(2), false);

        controller.submit().await;
        assert_eq!(settlement.requests().len(), 1);
        controller.submit().await;
        assert_eq!(settlement.requests().len(), 2);
    }

    #[test]
    fn stake_above_session_balance_is_flagged() {
        let controller = controller(&FakeSettlement::accepting(), &RecordingEvents::default());
        assert!(!controller.stake_exceeds_balance());
        controller.set_stake(dec!(1000.01)).unwrap();
        assert!(controller.stake_exceeds_balance());
        controller.set_stake(dec!(0)).unwrap_err();
        assert_eq!(controller.slip().stake(), dec!(1000.01));
    }
}
