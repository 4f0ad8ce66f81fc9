use crate::api::*;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{query, Executor, Row, SqlitePool};
use std::str::FromStr;

/// Everything needed to persist an accepted coupon.
#[derive(Debug, Clone)]
pub struct NewCoupon {
    pub user: UserId,
    pub request: SubmitCouponRequest,
    pub total_odds: Odds,
    pub potential_payout: Credits,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait DB {
    async fn create_user(&self, user: &UserId, token: &str, balance: Credits) -> Result<()>;
    async fn get_user_token(&self, user: &UserId) -> Result<Option<String>>;
    async fn get_balance(&self, user: &UserId) -> Result<Option<Credits>>;
    async fn set_balance(&self, user: &UserId, balance: Credits) -> Result<()>;
    async fn add_question(&self, question: &str, yes_odds: Odds, no_odds: Odds)
        -> Result<QuestionId>;
    async fn get_question_state(&self, question: QuestionId) -> Result<Option<QuestionState>>;
    async fn set_question_state(&self, question: QuestionId, state: QuestionState) -> Result<()>;
    async fn get_questions(&self) -> Result<Vec<QuestionResponse>>;
    /// Stores the coupon and sets the user's balance to `balance_after` in one
    /// transaction.
    async fn create_coupon(&self, coupon: &NewCoupon, balance_after: Credits) -> Result<CouponId>;
    async fn get_coupons(&self, user: &UserId) -> Result<Vec<CouponSummary>>;
}
pub struct SQLite {
    connection: SqlitePool,
}
impl SQLite {
    /// Opens `db_conn`, or a private in-memory database when `None`.
    pub async fn new(db_conn: Option<String>) -> Result<Self> {
        let connection = match db_conn {
            Some(url) => SqlitePool::connect(&url)
                .await
                .with_context(|| format!("couldn't open database {}", url))?,
            // A single connection that never expires, so every query sees the
            // same in-memory database.
            None => SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect("sqlite::memory:")
                .await
                .context("couldn't open in-memory database")?,
        };
        connection
            .execute(
                "CREATE TABLE IF NOT EXISTS users (\
                user PRIMARY KEY,\
                token NOT NULL,\
                balance NOT NULL\
                )",
            )
            .await?;
        connection
            .execute(
                "CREATE TABLE IF NOT EXISTS questions (\
                id INTEGER PRIMARY KEY,\
                question NOT NULL,\
                yes_odds NOT NULL,\
                no_odds NOT NULL,\
                state NOT NULL\
                )",
            )
            .await?;
        connection
            .execute(
                "CREATE TABLE IF NOT EXISTS coupons (\
                id INTEGER PRIMARY KEY,\
                user NOT NULL,\
                stake NOT NULL,\
                total_odds NOT NULL,\
                potential_payout NOT NULL,\
                created_at NOT NULL\
                )",
            )
            .await?;
        connection
            .execute(
                "CREATE TABLE IF NOT EXISTS coupon_selections (\
                coupon NOT NULL,\
                position NOT NULL,\
                question NOT NULL,\
                vote NOT NULL,\
                odds NOT NULL,\
                boosted NOT NULL,\
                PRIMARY KEY (coupon,position)\
                )",
            )
            .await?;
        Ok(Self { connection })
    }
}
fn decimal(row: &SqliteRow, column: &str) -> Result<Decimal> {
    let value: String = row.try_get(column)?;
    Decimal::from_str(&value).with_context(|| format!("invalid decimal in {}: {}", column, value))
}
#[async_trait]
impl DB for SQLite {
    async fn create_user(&self, user: &UserId, token: &str, balance: Credits) -> Result<()> {
        self.connection
            .execute(
                query("INSERT INTO users (user, token, balance) VALUES (?,?,?)")
                    .bind(user)
                    .bind(token)
                    .bind(balance.to_string()),
            )
            .await
            .with_context(|| format!("couldn't create user {}", user))?;
        Ok(())
    }
    async fn get_user_token(&self, user: &UserId) -> Result<Option<String>> {
        let row = self
            .connection
            .fetch_optional(query("SELECT token FROM users WHERE user = ?").bind(user))
            .await?;
        Ok(row.map(|row| row.get("token")))
    }
    async fn get_balance(&self, user: &UserId) -> Result<Option<Credits>> {
        let row = self
            .connection
            .fetch_optional(query("SELECT balance FROM users WHERE user = ?").bind(user))
            .await
            .with_context(|| format!("couldn't get balance for user {}", user))?;
        row.map(|row| decimal(&row, "balance")).transpose()
    }
    async fn set_balance(&self, user: &UserId, balance: Credits) -> Result<()> {
        self.connection
            .execute(
                query("UPDATE users SET balance = ? WHERE user = ?")
                    .bind(balance.to_string())
                    .bind(user),
            )
            .await?;
        Ok(())
    }
    async fn add_question(
        &self,
        question: &str,
        yes_odds: Odds,
        no_odds: Odds,
    ) -> Result<QuestionId> {
        let id = self
            .connection
            .execute(
                query(
                    "INSERT INTO questions (\
                question,\
                yes_odds,\
                no_odds,\
                state)\
                VALUES (?,?,?,?)",
                )
                .bind(question)
                .bind(yes_odds.to_string())
                .bind(no_odds.to_string())
                .bind(QuestionState::Open.to_string()),
            )
            .await?
            .last_insert_rowid();
        Ok(id)
    }
    async fn get_question_state(&self, question: QuestionId) -> Result<Option<QuestionState>> {
        let row = self
            .connection
            .fetch_optional(query("SELECT state FROM questions WHERE id = ?").bind(question))
            .await
            .with_context(|| format!("couldn't get state for question {}", question))?;
        row.map(|row| QuestionState::from_str(row.get("state")))
            .transpose()
    }
    async fn set_question_state(&self, question: QuestionId, state: QuestionState) -> Result<()> {
        self.connection
            .execute(
                query(
                    "UPDATE questions \
                SET state = ? \
                WHERE id = ?",
                )
                .bind(state.to_string())
                .bind(question),
            )
            .await?;
        Ok(())
    }
    async fn get_questions(&self) -> Result<Vec<QuestionResponse>> {
        let rows = self
            .connection
            .fetch_all(query("SELECT * FROM questions ORDER BY id"))
            .await?;
        let mut questions = vec![];
        for row in rows {
            questions.push(QuestionResponse {
                id: row.get("id"),
                question: row.get("question"),
                yes_odds: decimal(&row, "yes_odds")?,
                no_odds: decimal(&row, "no_odds")?,
                state: QuestionState::from_str(row.get("state"))?,
            });
        }
        Ok(questions)
    }
    async fn create_coupon(&self, coupon: &NewCoupon, balance_after: Credits) -> Result<CouponId> {
        let mut tx = self.connection.begin().await?;
        query("UPDATE users SET balance = ? WHERE user = ?")
            .bind(balance_after.to_string())
            .bind(&coupon.user)
            .execute(&mut *tx)
            .await?;
        let id = query(
            "INSERT INTO coupons (\
            user,\
            stake,\
            total_odds,\
            potential_payout,\
            created_at)\
            VALUES (?,?,?,?,?)",
        )
        .bind(&coupon.user)
        .bind(coupon.request.stake_amount.to_string())
        .bind(coupon.total_odds.to_string())
        .bind(coupon.potential_payout.to_string())
        .bind(coupon.created_at.timestamp())
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();
        for (position, selection) in coupon.request.selections.iter().enumerate() {
            query(
                "INSERT INTO coupon_selections (\
                coupon,\
                position,\
                question,\
                vote,\
                odds,\
                boosted)\
                VALUES (?,?,?,?,?,?)",
            )
            .bind(id)
            .bind(position as i64)
            .bind(selection.question_id)
            .bind(selection.vote.to_string())
            .bind(selection.odds.to_string())
            .bind(selection.is_boosted)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await.context("couldn't commit coupon")?;
        Ok(id)
    }
    async fn get_coupons(&self, user: &UserId) -> Result<Vec<CouponSummary>> {
        let rows = self
            .connection
            .fetch_all(query("SELECT * FROM coupons WHERE user = ? ORDER BY id DESC").bind(user))
            .await?;
        let mut coupons = vec![];
        for row in rows {
            let coupon_id: CouponId = row.get("id");
            let created_at: i64 = row.get("created_at");
            let selections = self
                .connection
                .fetch_all(
                    query("SELECT * FROM coupon_selections WHERE coupon = ? ORDER BY position")
                        .bind(coupon_id),
                )
                .await?
                .iter()
                .map(|selection| -> Result<SelectionRecord> {
                    Ok(SelectionRecord {
                        question_id: selection.get("question"),
                        vote: Side::from_str(selection.get("vote"))?,
                        odds: decimal(selection, "odds")?,
                        is_boosted: selection.get("boosted"),
                    })
                })
                .collect::<Result<Vec<SelectionRecord>>>()?;
            coupons.push(CouponSummary {
                receipt: CouponReceipt {
                    coupon_id,
                    stake_amount: decimal(&row, "stake")?,
                    total_odds: decimal(&row, "total_odds")?,
                    potential_payout: decimal(&row, "potential_payout")?,
                    created_at: Utc
                        .timestamp_opt(created_at, 0)
                        .single()
                        .context("invalid coupon timestamp")?,
                },
                selections,
            });
        }
        Ok(coupons)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn coupon_round_trip_debits_balance() {
        let db = SQLite::new(None).await.unwrap();
        let user: UserId = "alice".into();
        db.create_user(&user, "secret", dec!(100)).await.unwrap();
        let q = db.add_question("Will it rain?", dec!(1.8), dec!(2.1)).await.unwrap();
        let created_at = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let coupon = NewCoupon {
            user: user.clone(),
            request: SubmitCouponRequest {
                selections: vec![SelectionRecord {
                    question_id: q,
                    vote: Side::No,
                    odds: dec!(2.1),
                    is_boosted: true,
                }],
                stake_amount: dec!(40),
            },
            total_odds: dec!(2.1),
            potential_payout: dec!(84),
            created_at,
        };
        let id = db.create_coupon(&coupon, dec!(60)).await.unwrap();

        assert_eq!(db.get_balance(&user).await.unwrap(), Some(dec!(60)));
        let coupons = db.get_coupons(&user).await.unwrap();
        assert_eq!(coupons.len(), 1);
        assert_eq!(coupons[0].receipt.coupon_id, id);
        assert_eq!(coupons[0].receipt.created_at, created_at);
        assert_eq!(coupons[0].receipt.potential_payout, dec!(84));
        assert_eq!(coupons[0].selections, coupon.request.selections);
        assert!(db.get_coupons(&"bob".to_string()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn question_state_updates() {
        let db = SQLite::new(None).await.unwrap();
        let q = db.add_question("Will it rain?", dec!(1.8), dec!(2.1)).await.unwrap();
        assert_eq!(db.get_question_state(q).await.unwrap(), Some(QuestionState::Open));
        db.set_question_state(q, QuestionState::Closed).await.unwrap();
        assert_eq!(db.get_question_state(q).await.unwrap(), Some(QuestionState::Closed));
        assert_eq!(db.get_question_state(q + 1).await.unwrap(), None);
        let questions = db.get_questions().await.unwrap();
        assert_eq!(questions[0].odds_for(Side::No), dec!(2.1));
    }

    #[tokio::test]
    async fn unknown_user_has_no_balance() {
        let db = SQLite::new(None).await.unwrap();
        assert_eq!(db.get_balance(&"nobody".to_string()).await.unwrap(), None);
        assert_eq!(db.get_user_token(&"nobody".to_string()).await.unwrap(), None);
    }
}
