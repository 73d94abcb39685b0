// src/utils/http.rs

//! HTTP client utilities.

use std::time::Duration;

use crate::error::{AppError, Result};
use crate::models::CrawlerConfig;

/// Create a configured asynchronous HTTP client.
pub fn create_async_client(config: &CrawlerConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;
    Ok(client)
}

/// Fetch a catalog page body, treating non-success statuses as errors.
pub async fn fetch_text(client: &reqwest::Client, url: &str, page: u32) -> Result<String> {
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(AppError::HttpStatus {
            page,
            status: status.as_u16(),
        });
    }
    Ok(response.text().await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_fetch_text_returns_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/shop"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<ul></ul>"))
            .mount(&server)
            .await;
        let client = create_async_client(&CrawlerConfig::default()).unwrap();

        let body = fetch_text(&client, &format!("{}/shop?page=1", server.uri()), 1)
            .await
            .unwrap();

        assert_eq!(body, "<ul></ul>");
    }

    #[tokio::test]
    async fn test_error_status_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/shop"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        let client = create_async_client(&CrawlerConfig::default()).unwrap();

        let err = fetch_text(&client, &format!("{}/shop?page=2", server.uri()), 2)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::HttpStatus { page: 2, status: 503 }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_page_source_requests_numbered_page() {
        use crate::services::{HttpPageSource, PageSource};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/shop"))
            .and(query_param("page", "3"))
            .respond_with(ResponseTemplate::new(200).set_body_string("third"))
            .mount(&server)
            .await;
        let config = CrawlerConfig {
            base_url: format!("{}/shop", server.uri()),
            page_param: "page".into(),
            ..CrawlerConfig::default()
        };
        let source = HttpPageSource::new(&config).unwrap();

        assert_eq!(source.load(3).await.unwrap(), "third");
        assert!(source.load(4).await.is_err());
    }
}
