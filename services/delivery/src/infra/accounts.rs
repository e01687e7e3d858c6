use anyhow::{Context as _, bail};
use reqwest::{StatusCode, Url};

use crate::domain::repository::AccountDirectory;
use crate::domain::types::{Account, CreateAccountOutcome, NewAccount};

/// Identity provider admin API over HTTP.
#[derive(Clone)]
pub struct HttpAccountDirectory {
    pub client: reqwest::Client,
    pub base_url: String,
    pub token: String,
}

impl HttpAccountDirectory {
    fn url(&self, path: &str) -> anyhow::Result<Url> {
        let base = self.base_url.trim_end_matches('/');
        Url::parse(&format!("{base}/{path}")).context("invalid account directory url")
    }
}

impl AccountDirectory for HttpAccountDirectory {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<Account>> {
        let mut url = self.url("accounts")?;
        url.query_pairs_mut().append_pair("email", email);

        let resp = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await
            .context("account lookup request")?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let accounts: Vec<Account> = resp
            .error_for_status()
            .context("account lookup")?
            .json()
            .await
            .context("decode account lookup response")?;
        Ok(accounts
            .into_iter()
            .find(|a| a.email.eq_ignore_ascii_case(email)))
    }

    async fn create(&self, account: &NewAccount) -> anyhow::Result<CreateAccountOutcome> {
        let url = self.url("accounts")?;
        let resp = self
            .client
            .post(url)
            .bearer_auth(&self.token)
            .json(account)
            .send()
            .await
            .context("account create request")?;

        match resp.status() {
            status if status.is_success() => Ok(CreateAccountOutcome::Created),
            StatusCode::CONFLICT => Ok(CreateAccountOutcome::AlreadyExists),
            status => bail!("account directory answered {status} to account create"),
        }
    }
}
