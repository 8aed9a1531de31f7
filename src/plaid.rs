//! Plaid aggregator client.
//!
//! The scheduler depends on the [`TransactionSource`] trait only; how the
//! access token was obtained (the account-linking web flow) is outside this
//! daemon.

use crate::calculator::Transaction;
use crate::config::PlaidConfig;
use crate::error::{DaemonError, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;

/// Source of bank transactions for a date range.
#[async_trait]
pub trait TransactionSource: Send + Sync {
    /// Transactions posted within `[start, end]` inclusive.
    async fn transactions(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<Transaction>>;
}

/// A linked bank account, exposed for wiring checks only.
#[derive(Debug, Clone, Deserialize)]
pub struct PlaidAccount {
    /// Plaid account identifier.
    pub account_id: String,
    /// Account display name.
    pub name: String,
}

/// Plaid REST API client.
#[derive(Clone)]
pub struct PlaidClient {
    client: reqwest::Client,
    config: PlaidConfig,
}

#[derive(Debug, Deserialize)]
struct TransactionsResponse {
    transactions: Vec<WireTransaction>,
}

#[derive(Debug, Deserialize)]
struct WireTransaction {
    date: NaiveDate,
    amount: f64,
}

#[derive(Debug, Deserialize)]
struct AccountsResponse {
    accounts: Vec<PlaidAccount>,
}

impl PlaidClient {
    pub fn new(config: &PlaidConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config: config.clone(),
        }
    }

    fn require_credentials(&self) -> Result<()> {
        if self.config.client_id.trim().is_empty()
            || self.config.secret.trim().is_empty()
            || self.config.access_token.trim().is_empty()
        {
            return Err(DaemonError::Config(
                "missing Plaid configuration: PLAID_CLIENT_ID, PLAID_SECRET and \
                 PLAID_ACCESS_TOKEN must be set"
                    .to_owned(),
            ));
        }
        Ok(())
    }

    async fn post(&self, route: &str, body: serde_json::Value) -> Result<reqwest::Response> {
        let url = format!("{}{route}", self.config.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| DaemonError::Fetch(format!("plaid request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DaemonError::Fetch(format!(
                "plaid request failed ({status}): {body}"
            )));
        }
        Ok(response)
    }

    /// Linked accounts for the configured access token.
    pub async fn accounts(&self) -> Result<Vec<PlaidAccount>> {
        self.require_credentials()?;
        let response = self
            .post(
                "/accounts/get",
                serde_json::json!({
                    "client_id": self.config.client_id,
                    "secret": self.config.secret,
                    "access_token": self.config.access_token,
                }),
            )
            .await?;

        let parsed: AccountsResponse = response
            .json()
            .await
            .map_err(|e| DaemonError::Calculation(format!("cannot parse plaid accounts: {e}")))?;
        Ok(parsed.accounts)
    }
}

#[async_trait]
impl TransactionSource for PlaidClient {
    async fn transactions(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<Transaction>> {
        self.require_credentials()?;
        let response = self
            .post(
                "/transactions/get",
                serde_json::json!({
                    "client_id": self.config.client_id,
                    "secret": self.config.secret,
                    "access_token": self.config.access_token,
                    "start_date": start.format("%Y-%m-%d").to_string(),
                    "end_date": end.format("%Y-%m-%d").to_string(),
                    "options": { "count": 500 },
                }),
            )
            .await?;

        // A malformed date or amount in the body is a calculation problem,
        // not a transport one.
        let parsed: TransactionsResponse = response.json().await.map_err(|e| {
            DaemonError::Calculation(format!("cannot parse plaid transactions: {e}"))
        })?;

        Ok(parsed
            .transactions
            .into_iter()
            .map(|tx| Transaction {
                date: tx.date,
                amount: tx.amount,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> PlaidClient {
        PlaidClient::new(&PlaidConfig {
            base_url: server.uri(),
            client_id: "client".to_owned(),
            secret: "secret".to_owned(),
            access_token: "access-token".to_owned(),
        })
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[tokio::test]
    async fn transactions_parses_dates_and_amounts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/transactions/get"))
            .and(body_partial_json(serde_json::json!({
                "access_token": "access-token",
                "start_date": "2024-03-01",
                "end_date": "2024-04-20",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "transactions": [
                    { "date": "2024-03-01", "amount": 50.0, "name": "Groceries" },
                    { "date": "2024-04-02", "amount": -20.0, "name": "Refund" }
                ]
            })))
            .mount(&server)
            .await;

        let txs = client_for(&server)
            .transactions(d(2024, 3, 1), d(2024, 4, 20))
            .await
            .expect("fetch succeeds");
        assert_eq!(txs.len(), 2);
        assert_eq!(txs[0].date, d(2024, 3, 1));
        assert!((txs[1].amount + 20.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn upstream_failure_is_a_fetch_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/transactions/get"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .transactions(d(2024, 3, 1), d(2024, 4, 20))
            .await
            .expect_err("fetch fails");
        assert!(matches!(err, DaemonError::Fetch(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn malformed_transaction_data_is_a_calculation_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/transactions/get"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "transactions": [ { "date": "not-a-date", "amount": 1.0 } ]
            })))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .transactions(d(2024, 3, 1), d(2024, 4, 20))
            .await
            .expect_err("parse fails");
        assert!(matches!(err, DaemonError::Calculation(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn missing_credentials_fail_before_any_request() {
        let client = PlaidClient::new(&PlaidConfig::default());
        let err = client
            .transactions(d(2024, 3, 1), d(2024, 4, 20))
            .await
            .expect_err("must fail");
        assert!(matches!(err, DaemonError::Config(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn accounts_parses_account_list() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/accounts/get"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "accounts": [
                    { "account_id": "acc-1", "name": "Checking", "type": "depository" }
                ]
            })))
            .mount(&server)
            .await;

        let accounts = client_for(&server).accounts().await.expect("accounts");
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].name, "Checking");
    }
}
