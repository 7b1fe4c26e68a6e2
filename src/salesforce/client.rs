use anyhow::{anyhow, Context, Result};

#[cfg(test)]
use mockall::automock;
use reqwest::{
    header::{HeaderMap, ACCEPT, AUTHORIZATION, USER_AGENT},
    Client, ClientBuilder, Response,
};

use super::{ApiError, QueryResponse};

pub const DEFAULT_API_VERSION: &str = "56.0";

/// Anything able to run a SOQL query against the Tooling API.
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait ToolingConnection: Send + Sync {
    async fn query(&self, soql: &str) -> Result<QueryResponse>;
}

pub struct ToolingClient {
    client: Client,
    query_url: String,
}

impl ToolingClient {
    pub fn new(
        instance_url: impl AsRef<str>,
        access_token: impl AsRef<str>,
        api_version: impl AsRef<str>,
    ) -> Result<Self> {
        let user_agent = format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        log::debug!("{}: {}", USER_AGENT.as_str(), user_agent);

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, "application/json".try_into()?);
        headers.insert(
            AUTHORIZATION,
            format!("Bearer {}", access_token.as_ref()).try_into()?,
        );
        headers.insert(USER_AGENT, user_agent.try_into()?);

        let client = ClientBuilder::new().default_headers(headers).build()?;
        Ok(Self {
            client,
            query_url: query_url(instance_url.as_ref(), api_version.as_ref()),
        })
    }
}

#[async_trait::async_trait]
impl ToolingConnection for ToolingClient {
    async fn query(&self, soql: &str) -> Result<QueryResponse> {
        log::debug!("GET {}", self.query_url);
        let response = self
            .client
            .get(&self.query_url)
            .query(&[("q", soql)])
            .send()
            .await
            .context("Failed to send request")?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        response
            .json()
            .await
            .context("Failed to parse reply as json")
    }
}

fn query_url(instance_url: &str, api_version: &str) -> String {
    format!(
        "{}/services/data/v{}/tooling/query",
        instance_url.trim_end_matches('/'),
        api_version.trim_start_matches('v'),
    )
}

async fn error_from_response(response: Response) -> anyhow::Error {
    let status = response.status();
    let body = match response.text().await {
        Ok(body) => body,
        Err(_) => return anyhow!("Server returned status {}", status),
    };
    describe_error(status, &body)
}

fn describe_error(status: reqwest::StatusCode, body: &str) -> anyhow::Error {
    match serde_json::from_str::<Vec<ApiError>>(body) {
        Ok(errors) if !errors.is_empty() => {
            let details = errors
                .iter()
                .map(|error| format!("{}: {}", error.error_code, error.message))
                .collect::<Vec<_>>()
                .join("; ");
            anyhow!("Server returned status {} ({})", status, details)
        }
        _ => anyhow!("Server returned status {}", status),
    }
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;

    use super::*;

    #[test]
    fn test_query_url() {
        assert_eq!(
            query_url("https://acme.my.salesforce.com", "56.0"),
            "https://acme.my.salesforce.com/services/data/v56.0/tooling/query"
        );
        assert_eq!(
            query_url("https://acme.my.salesforce.com/", "v57.0"),
            "https://acme.my.salesforce.com/services/data/v57.0/tooling/query"
        );
    }

    #[test]
    fn test_describe_error() {
        let body = r#"[{"message":"unexpected token: 'WHERE'","errorCode":"MALFORMED_QUERY"}]"#;
        let error = describe_error(StatusCode::BAD_REQUEST, body);
        assert_eq!(
            error.to_string(),
            "Server returned status 400 Bad Request (MALFORMED_QUERY: unexpected token: 'WHERE')"
        );

        let error = describe_error(StatusCode::BAD_GATEWAY, "<html>oops</html>");
        assert_eq!(error.to_string(), "Server returned status 502 Bad Gateway");

        let error = describe_error(StatusCode::UNAUTHORIZED, "[]");
        assert_eq!(error.to_string(), "Server returned status 401 Unauthorized");
    }

    #[test]
    fn test_new_rejects_bad_token() {
        let client = ToolingClient::new("https://acme.my.salesforce.com", "bad\ntoken", "56.0");
        assert!(client.is_err());
    }
}
