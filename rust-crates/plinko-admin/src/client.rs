use crate::backend::AdminBackend;
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use plinko::{
    Points,
    records::Account,
    settings::GameSettings,
    stats::{
        StatsOptions,
        StatsSummary,
    },
};
use plinko_server::app::actix_query_api::{
    ADMIN_TOKEN_HEADER,
    ErrorDto,
    PointsRequestDto,
    RegisterRequestDto,
    SettingUpdateDto,
    StatsParamsDto,
};
use serde::de::DeserializeOwned;

/// Talks to the admin routes of a running `plinko-server`, which owns the
/// database lock while it is up.
#[derive(Clone)]
pub struct AdminClient {
    base_url: String,
    admin_token: Option<String>,
    http: reqwest::Client,
}

impl AdminClient {
    pub fn new(base_url: impl Into<String>, admin_token: Option<String>) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let http = reqwest::Client::builder()
            .build()
            .wrap_err("failed to build HTTP client for plinko server")?;
        Ok(Self {
            base_url,
            admin_token,
            http,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/plinko/admin{}", self.base_url, path);
        let builder = self.http.request(method, url);
        match &self.admin_token {
            Some(token) => builder.header(ADMIN_TOKEN_HEADER, token),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T> {
        let res = request.send().await.wrap_err("plinko server request failed")?;
        let status = res.status();
        if !status.is_success() {
            let body = res
                .json::<ErrorDto>()
                .await
                .map(|error| error.message)
                .unwrap_or_else(|_| "<unavailable body>".to_string());
            return Err(eyre!("plinko server responded with {status}: {body}"));
        }
        res.json().await.wrap_err("invalid plinko server payload")
    }
}

impl AdminBackend for AdminClient {
    async fn summary(&self, options: &StatsOptions) -> Result<StatsSummary> {
        let params = StatsParamsDto {
            top: Some(options.top_players),
            recent: Some(options.recent_games),
        };
        let request = self.request(reqwest::Method::GET, "/stats").query(&params);
        self.send(request).await
    }

    async fn settings(&self) -> Result<GameSettings> {
        self.send(self.request(reqwest::Method::GET, "/settings"))
            .await
    }

    async fn update_setting(&self, key: &str, value: &str) -> Result<GameSettings> {
        let request = self
            .request(reqwest::Method::PUT, &format!("/settings/{key}"))
            .json(&SettingUpdateDto {
                value: value.to_string(),
            });
        self.send(request).await
    }

    async fn adjust_points(&self, username: &str, amount: Points) -> Result<Account> {
        let request = self
            .request(reqwest::Method::POST, "/points")
            .json(&PointsRequestDto {
                username: username.to_string(),
                amount,
            });
        self.send(request).await
    }

    async fn register(&self, username: &str, balance: Points) -> Result<Account> {
        let request = self
            .request(reqwest::Method::POST, "/accounts")
            .json(&RegisterRequestDto {
                username: username.to_string(),
                balance,
            });
        self.send(request).await
    }
}

#[allow(non_snake_case)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands;
    use plinko::{
        ledger::LedgerService,
        storage::sled_storage::SledStorage,
    };
    use plinko_server::app::{
        App,
        RunState,
        actix_query_api::ActixQueryApi,
    };
    use std::future::pending;

    async fn sled_server(
        path: &std::path::Path,
        admin_token: Option<&str>,
    ) -> (App<ActixQueryApi, SledStorage>, String) {
        let storage = SledStorage::open(path).unwrap();
        let api = ActixQueryApi::with_admin_token(None, admin_token.map(str::to_string))
            .await
            .unwrap();
        let base_url = api.base_url().to_string();
        (App::new(api, LedgerService::new(storage)), base_url)
    }

    fn text(out: Vec<u8>) -> String {
        String::from_utf8(out).unwrap()
    }

    #[tokio::test]
    async fn admin_client__manages_a_ledger_the_server_holds_open() {
        // given
        let temp_dir = tempdir::TempDir::new("plinko_admin_remote").unwrap();
        let (mut app, base_url) = sled_server(temp_dir.path(), Some("op")).await;
        let client = AdminClient::new(base_url, Some("op".to_string())).unwrap();
        let serve = async {
            while app.run(pending::<()>()).await.unwrap() == RunState::Continue {}
        };
        let session = async {
            let mut out = Vec::new();
            commands::register(&client, "gina", 20, &mut out).await.unwrap();
            commands::points(&client, "gina", 30, &mut out).await.unwrap();
            commands::config(&client, Some("daily_limit"), Some("3"), &mut out)
                .await
                .unwrap();
            commands::config(&client, Some("daily_limit"), None, &mut out)
                .await
                .unwrap();
            commands::stats(&client, &StatsOptions::default(), &mut out)
                .await
                .unwrap();
            text(out)
        };

        // when
        let output = tokio::select! {
            _ = serve => panic!("app loop exited"),
            output = session => output,
        };

        // then
        assert!(output.starts_with("Registered gina as user "));
        assert!(output.contains("Added 30 points to gina. New balance: 50\n"));
        assert!(output.contains("Updated daily_limit to 3\ndaily_limit = 3\n"));
        assert!(output.contains("Total Games: 0\n"));
    }

    #[tokio::test]
    async fn admin_client__reports_the_server_error_message() {
        // given
        let temp_dir = tempdir::TempDir::new("plinko_admin_remote").unwrap();
        let (mut app, base_url) = sled_server(temp_dir.path(), Some("op")).await;
        let wrong_token = AdminClient::new(base_url.as_str(), Some("guess".to_string())).unwrap();
        let client = AdminClient::new(base_url, Some("op".to_string())).unwrap();
        let serve = async {
            while app.run(pending::<()>()).await.unwrap() == RunState::Continue {}
        };
        let session = async {
            let forbidden = wrong_token.settings().await.unwrap_err();
            let missing = client.adjust_points("nobody", 5).await.unwrap_err();
            (forbidden.to_string(), missing.to_string())
        };

        // when
        let (forbidden, missing) = tokio::select! {
            _ = serve => panic!("app loop exited"),
            errors = session => errors,
        };

        // then
        assert!(forbidden.contains("403"));
        assert!(forbidden.contains("x-plinko-admin-token"));
        assert!(missing.contains("404"));
        assert!(missing.contains("user not found: nobody"));
    }
}
