use crate::error::Result;
use crate::result::ProbeResult;
use reqwest::header::{CONTENT_TYPE, LOCATION};
use reqwest::{Client, redirect};
use std::time::Duration;
use tracing::debug;
use url::Url;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Redirect budget for probes that follow redirects.
pub const MAX_FOLLOWED_REDIRECTS: usize = 10;

pub fn default_user_agent() -> String {
    format!(
        "SiteSweep/{} (+technical SEO audit)",
        env!("CARGO_PKG_VERSION")
    )
}

#[derive(Debug, Clone)]
pub struct ProberConfig {
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for ProberConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            user_agent: default_user_agent(),
        }
    }
}

/// Per-call probe settings.
#[derive(Debug, Clone, Copy)]
pub struct ProbeOptions {
    pub follow_redirects: bool,
    /// Overrides the prober's default timeout for this call.
    pub timeout: Option<Duration>,
}

impl ProbeOptions {
    pub fn follow() -> Self {
        Self {
            follow_redirects: true,
            timeout: None,
        }
    }

    pub fn no_follow() -> Self {
        Self {
            follow_redirects: false,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A probe plus the parts of the response the validators read.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub probe: ProbeResult,
    pub content_type: Option<String>,
    pub x_robots_tag: Option<String>,
    /// Present only for 200 responses whose body could be read.
    pub body: Option<String>,
}

impl FetchedPage {
    fn unreachable(url: &str) -> Self {
        Self {
            probe: ProbeResult::unreachable(url.to_string()),
            content_type: None,
            x_robots_tag: None,
            body: None,
        }
    }

    /// HTML, or no content type at all (treated as HTML).
    pub fn is_html(&self) -> bool {
        self.content_type
            .as_ref()
            .map(|ct| ct.contains("html"))
            .unwrap_or(true)
    }

    pub fn html_body(&self) -> Option<&str> {
        if self.is_html() {
            self.body.as_deref()
        } else {
            None
        }
    }
}

/// Single-URL GET prober. Never returns transport errors: anything that
/// prevents an HTTP status from arriving yields `status_code = 0`.
#[derive(Debug, Clone)]
pub struct Prober {
    follow_client: Client,
    manual_client: Client,
}

impl Prober {
    pub fn new(config: &ProberConfig) -> Result<Self> {
        Ok(Self {
            follow_client: Self::build_client(
                config,
                redirect::Policy::limited(MAX_FOLLOWED_REDIRECTS),
            )?,
            manual_client: Self::build_client(config, redirect::Policy::none())?,
        })
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        Self::new(&ProberConfig {
            timeout,
            ..ProberConfig::default()
        })
    }

    fn build_client(config: &ProberConfig, policy: redirect::Policy) -> Result<Client> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.timeout)
            .connect_timeout(config.timeout)
            .pool_max_idle_per_host(50)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .redirect(policy)
            .build()?;
        Ok(client)
    }

    /// Status-only probe; the body is not read.
    pub async fn probe(&self, url: &str, options: ProbeOptions) -> ProbeResult {
        self.request(url, options, false).await.probe
    }

    /// Probe and keep headers and body for HTML inspection.
    pub async fn fetch(&self, url: &str, options: ProbeOptions) -> FetchedPage {
        self.request(url, options, true).await
    }

    /// Body of a 200 response after following redirects, if any.
    pub async fn fetch_text(&self, url: &str) -> Option<String> {
        let page = self.fetch(url, ProbeOptions::follow()).await;
        if page.probe.is_ok() { page.body } else { None }
    }

    async fn request(&self, url: &str, options: ProbeOptions, read_body: bool) -> FetchedPage {
        if Url::parse(url).is_err() {
            debug!("Not probing unparseable URL {}", url);
            return FetchedPage::unreachable(url);
        }

        let client = if options.follow_redirects {
            &self.follow_client
        } else {
            &self.manual_client
        };

        let mut request = client.get(url);
        if let Some(timeout) = options.timeout {
            request = request.timeout(timeout);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                debug!("Probe of {} failed: {}", url, e);
                return FetchedPage::unreachable(url);
            }
        };

        let status_code = response.status().as_u16();
        let headers = response.headers();

        let redirect_location = if (300..400).contains(&status_code) {
            headers
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string())
        } else {
            None
        };

        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let robots_values: Vec<&str> = headers
            .get_all("x-robots-tag")
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        let x_robots_tag = if robots_values.is_empty() {
            None
        } else {
            Some(robots_values.join(", "))
        };

        let probe = ProbeResult {
            url: url.to_string(),
            status_code,
            final_url: response.url().to_string(),
            redirect_location,
        };

        let body = if read_body && status_code == 200 {
            match response.text().await {
                Ok(text) => Some(text),
                Err(e) => {
                    debug!("Reading body of {} failed: {}", url, e);
                    None
                }
            }
        } else {
            None
        };

        FetchedPage {
            probe,
            content_type,
            x_robots_tag,
            body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{header_regex, method, path},
    };

    fn prober() -> Prober {
        Prober::with_timeout(Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_no_follow_captures_location() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/old"))
            .respond_with(ResponseTemplate::new(301).insert_header("location", "/new"))
            .mount(&mock_server)
            .await;

        let url = format!("{}/old", mock_server.uri());
        let result = prober().probe(&url, ProbeOptions::no_follow()).await;

        assert_eq!(result.status_code, 301);
        assert_eq!(result.redirect_location.as_deref(), Some("/new"));
        assert_eq!(result.final_url, url);
        assert!(result.is_redirect());
    }

    #[tokio::test]
    async fn test_follow_reports_final_url() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/old"))
            .respond_with(ResponseTemplate::new(302).insert_header("location", "/new"))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/new"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("<html></html>", "text/html"))
            .mount(&mock_server)
            .await;

        let url = format!("{}/old", mock_server.uri());
        let page = prober().fetch(&url, ProbeOptions::follow()).await;

        assert_eq!(page.probe.status_code, 200);
        assert_eq!(page.probe.final_url, format!("{}/new", mock_server.uri()));
        assert_eq!(page.body.as_deref(), Some("<html></html>"));
        assert!(page.is_html());
    }

    #[tokio::test]
    async fn test_timeout_yields_status_zero() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&mock_server)
            .await;

        let prober = Prober::with_timeout(Duration::from_millis(200)).unwrap();
        let result = prober
            .probe(
                &format!("{}/slow", mock_server.uri()),
                ProbeOptions::no_follow(),
            )
            .await;

        assert_eq!(result.status_code, 0);
        assert!(result.is_broken());
    }

    #[tokio::test]
    async fn test_connection_refused_yields_status_zero() {
        let result = prober()
            .probe("http://127.0.0.1:1/nothing", ProbeOptions::follow())
            .await;
        assert!(result.is_unreachable());
    }

    #[tokio::test]
    async fn test_unparseable_url_yields_status_zero() {
        let result = prober().probe("not a url", ProbeOptions::follow()).await;
        assert_eq!(result.status_code, 0);
    }

    #[tokio::test]
    async fn test_sends_identifying_user_agent() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/"))
            .and(header_regex("user-agent", "^SiteSweep/"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&mock_server)
            .await;

        let result = prober()
            .probe(&format!("{}/", mock_server.uri()), ProbeOptions::no_follow())
            .await;
        assert_eq!(result.status_code, 204);
    }

    #[tokio::test]
    async fn test_collects_x_robots_tag() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/hidden"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-robots-tag", "noindex, nofollow")
                    .set_body_raw("<html></html>", "text/html"),
            )
            .mount(&mock_server)
            .await;

        let page = prober()
            .fetch(
                &format!("{}/hidden", mock_server.uri()),
                ProbeOptions::no_follow(),
            )
            .await;
        assert_eq!(page.x_robots_tag.as_deref(), Some("noindex, nofollow"));
    }
}
