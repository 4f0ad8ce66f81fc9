use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use log::debug;
use reqwest::{Response, StatusCode};
use serde::Serialize;

use crate::api::*;
use crate::controller::SettlementService;
use crate::error::SubmitError;
use crate::retry::{self, RetrySettings};

#[derive(Debug, Clone)]
pub struct Client {
    url: String,
    client: reqwest::Client,
}
impl Client {
    pub fn new(url: String) -> Self {
        let client = reqwest::Client::new();
        Self { url, client }
    }
    pub fn with_timeout(url: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { url, client })
    }
    async fn post(
        &self,
        path: &'static str,
        request: impl Serialize,
        expexted_code: StatusCode,
    ) -> Result<Response> {
        let response = self
            .client
            .post(self.url.clone() + path)
            .json(&request)
            .send()
            .await?;
        bail_if_err(response, expexted_code).await
    }
    async fn get(&self, path: &'static str, expexted_code: StatusCode) -> Result<Response> {
        let response = self.client.get(self.url.clone() + path).send().await?;
        bail_if_err(response, expexted_code).await
    }
    /// Creates the user on first use and returns the current balance.
    pub async fn register(&self, access: AccessRequest) -> Result<Credits> {
        let response = self.post("/register", access, StatusCode::OK).await?;
        Ok(response.json::<Credits>().await?)
    }
    pub async fn get_balance(&self, access: AccessRequest) -> Result<Credits> {
        let response = self.post("/get_balance", access, StatusCode::OK).await?;
        Ok(response.json::<Credits>().await?)
    }
    /// Balance read right after [`Client::register`] may not see the new
    /// profile yet, so it is retried with a fixed delay.
    pub async fn get_balance_with_retry(
        &self,
        access: AccessRequest,
        settings: RetrySettings,
    ) -> Result<Credits> {
        retry::with_fixed_delay(settings, move || self.get_balance(access.clone())).await
    }
    pub async fn get_coupons(&self, access: AccessRequest) -> Result<Vec<CouponSummary>> {
        let response = self.post("/get_coupons", access, StatusCode::OK).await?;
        Ok(response.json::<Vec<CouponSummary>>().await?)
    }
    pub async fn get_questions(&self) -> Result<Vec<QuestionResponse>> {
        let response = self.get("/get_questions", StatusCode::OK).await?;
        Ok(response.json::<Vec<QuestionResponse>>().await?)
    }
    pub async fn new_question(
        &self,
        request: NewQuestionRequest,
        access: AccessRequest,
    ) -> Result<QuestionId> {
        let response = self
            .post(
                "/new_question",
                PostRequest {
                    data: request,
                    access,
                },
                StatusCode::CREATED,
            )
            .await?;
        Ok(response.json::<QuestionId>().await?)
    }
    pub async fn close_question(&self, question: QuestionId, access: AccessRequest) -> Result<()> {
        self.post(
            "/close_question",
            PostRequest {
                data: QuestionRequest { question },
                access,
            },
            StatusCode::OK,
        )
        .await?;
        Ok(())
    }
    pub async fn adjust_balance(
        &self,
        request: AdjustBalanceRequest,
        access: AccessRequest,
    ) -> Result<Credits> {
        let response = self
            .post(
                "/adjust_balance",
                PostRequest {
                    data: request,
                    access,
                },
                StatusCode::OK,
            )
            .await?;
        Ok(response.json::<Credits>().await?)
    }
}
#[async_trait]
impl SettlementService for Client {
    async fn submit_coupon(
        &self,
        access: &AccessRequest,
        request: &SubmitCouponRequest,
    ) -> Result<CouponReceipt, SubmitError> {
        let response = self
            .client
            .post(self.url.clone() + "/submit_coupon")
            .json(&PostRequest {
                access: access.clone(),
                data: request,
            })
            .send()
            .await
            .map_err(|e| SubmitError::Transport(e.to_string()))?;
        let status = response.status();
        debug!("Settlement service answered {}", status);
        if status == StatusCode::CREATED {
            return response.json::<CouponReceipt>().await.map_err(|e| {
                if e.is_timeout() {
                    SubmitError::Transport(e.to_string())
                } else {
                    SubmitError::Unknown(format!("malformed receipt: {}", e))
                }
            });
        }
        let body = response
            .text()
            .await
            .map_err(|e| SubmitError::Transport(e.to_string()))?;
        if status.is_client_error() {
            Err(SubmitError::Validation(body))
        } else {
            Err(SubmitError::Unknown(format!("{}: {}", status, body)))
        }
    }
}

async fn bail_if_err(response: Response, expexted_code: StatusCode) -> Result<Response> {
    if response.status() != expexted_code {
        bail!("{}: {}", response.status(), response.text().await?)
    } else {
        Ok(response)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rust_decimal_macros::dec;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn access() -> AccessRequest {
        AccessRequest {
            user: "alice".into(),
            token: "secret".into(),
        }
    }

    #[tokio::test]
    async fn unreachable_server_is_a_transport_failure() {
        let client = Client::with_timeout("http://127.0.0.1:1".into(), Duration::from_secs(2))
            .unwrap();
        let request = SubmitCouponRequest {
            selections: vec![SelectionRecord {
                question_id: 1,
                vote: Side::Yes,
                odds: dec!(2),
                is_boosted: false,
            }],
            stake_amount: dec!(10),
        };
        let e = client.submit_coupon(&access(), &request).await.unwrap_err();
        assert!(matches!(e, SubmitError::Transport(_)), "{:?}", e);
    }

    /// Answers any request with a 201 header and a truncated body, then stalls.
    async fn stalled_receipt_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0; 8192];
            let _ = socket.read(&mut buf).await.unwrap();
            socket
                .write_all(
                    b"HTTP/1.1 201 Created\r\n\
                      content-type: application/json\r\n\
                      content-length: 512\r\n\r\n\
                      {\"coupon_id\":",
                )
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });
        url
    }

    #[tokio::test]
    async fn timeout_reading_the_receipt_is_a_transport_failure() {
        let url = stalled_receipt_server().await;
        let client = Client::with_timeout(url, Duration::from_millis(300)).unwrap();
        let request = SubmitCouponRequest {
            selections: vec![SelectionRecord {
                question_id: 1,
                vote: Side::Yes,
                odds: dec!(2),
                is_boosted: false,
            }],
            stake_amount: dec!(10),
        };
        let e = client.submit_coupon(&access(), &request).await.unwrap_err();
        assert!(matches!(e, SubmitError::Transport(_)), "{:?}", e);
    }

    #[test]
    fn wire_body_matches_settlement_contract() {
        let request = SubmitCouponRequest {
            selections: vec![SelectionRecord {
                question_id: 7,
                vote: Side::No,
                odds: dec!(1.6),
                is_boosted: true,
            }],
            stake_amount: dec!(500),
        };
        let body = serde_json::to_value(PostRequest {
            access: access(),
            data: &request,
        })
        .unwrap();
        let data = &body["data"];
        assert_eq!(data["stake_amount"], "500");
        let selection = &data["selections"][0];
        assert_eq!(selection["question_id"], 7);
        assert_eq!(selection["vote"], "no");
        assert_eq!(selection["odds"], "1.6");
        assert_eq!(selection["is_boosted"], true);
        assert_eq!(body["access"]["user"], "alice");
    }
}
