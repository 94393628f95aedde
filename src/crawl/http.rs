use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoffBuilder;
use reqwest::Client;
use texting_robots::Robot;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use url::Url;

use crate::config::{CrawlConfig, HttpConfig};
use crate::error::{AppError, Result};

/// Retrieves one HTML document. The crawl fetcher only talks to pages through this.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_page(&self, url: &str) -> Result<String>;
}

/// Earliest next request time per host.
#[derive(Debug, Default)]
pub struct HostSchedule {
    next_free: HashMap<String, Instant>,
}

impl HostSchedule {
    /// Reserve the next slot for `host` and return how long to wait for it.
    pub fn reserve(&mut self, host: &str, now: Instant, gap: Duration) -> Duration {
        let slot = match self.next_free.get(host) {
            Some(&free) if free > now => free,
            _ => now,
        };
        self.next_free.insert(host.to_string(), slot + gap);
        slot - now
    }
}

const MAX_CRAWL_DELAY_SECS: f32 = 60.0;

/// `Crawl-delay` as a duration. Values that are not a positive finite number count as none.
fn robots_delay(secs: Option<f32>) -> Duration {
    secs.filter(|s| s.is_finite() && *s > 0.0)
        .map(|s| Duration::from_secs_f32(s.min(MAX_CRAWL_DELAY_SECS)))
        .unwrap_or_default()
}

/// reqwest-backed fetcher with per-host spacing, robots.txt checks and retries.
pub struct HttpPageFetcher {
    client: Client,
    robots_agent: String,
    request_delay: Duration,
    max_retries: u32,
    config: CrawlConfig,
    schedule: Mutex<HostSchedule>,
    robots: Mutex<HashMap<String, Option<Arc<Robot>>>>,
}

impl HttpPageFetcher {
    pub fn new(http: &HttpConfig, crawl: &CrawlConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(http.timeout())
            .connect_timeout(http.connect_timeout())
            .user_agent(&http.user_agent)
            .cookie_store(true)
            .build()?;

        let robots_agent = http
            .user_agent
            .split(['/', ' '])
            .next()
            .unwrap_or("*")
            .to_string();

        Ok(Self {
            client,
            robots_agent,
            request_delay: crawl.request_delay(),
            max_retries: crawl.max_retries,
            config: crawl.clone(),
            schedule: Mutex::new(HostSchedule::default()),
            robots: Mutex::new(HashMap::new()),
        })
    }

    async fn robots_for(&self, url: &Url) -> Option<Arc<Robot>> {
        let host = url.host_str()?.to_string();
        if let Some(cached) = self.robots.lock().await.get(&host) {
            return cached.clone();
        }

        let robots_url = format!("{}://{}/robots.txt", url.scheme(), url.authority());
        let robot = match self.client.get(&robots_url).send().await {
            Ok(response) if response.status().is_success() => match response.bytes().await {
                Ok(body) => match Robot::new(&self.robots_agent, &body) {
                    Ok(robot) => Some(Arc::new(robot)),
                    Err(e) => {
                        debug!(url = %robots_url, error = %e, "Unparseable robots.txt, allowing all");
                        None
                    }
                },
                Err(_) => None,
            },
            Ok(response) => {
                debug!(url = %robots_url, status = %response.status(), "No robots.txt, allowing all");
                None
            }
            Err(e) => {
                debug!(url = %robots_url, error = %e, "robots.txt unreachable, allowing all");
                None
            }
        };

        self.robots.lock().await.insert(host, robot.clone());
        robot
    }

    async fn wait_turn(&self, host: &str, robot: Option<&Robot>) {
        let crawl_delay = robots_delay(robot.and_then(|r| r.delay));
        let gap = self.request_delay.max(crawl_delay);

        let wait = self.schedule.lock().await.reserve(host, Instant::now(), gap);
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }

    async fn attempt(
        &self,
        url: &str,
        host: &str,
        robot: Option<&Robot>,
        attempt: u32,
    ) -> std::result::Result<String, backoff::Error<AppError>> {
        self.wait_turn(host, robot).await;
        let retries_left = attempt <= self.max_retries;

        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) if retries_left && (e.is_timeout() || e.is_connect()) => {
                debug!(url, attempt, error = %e, "Transient transport error, retrying");
                return Err(backoff::Error::transient(e.into()));
            }
            Err(e) => return Err(backoff::Error::permanent(e.into())),
        };

        let status = response.status();
        if status.is_success() {
            return response
                .text()
                .await
                .map_err(|e| backoff::Error::permanent(e.into()));
        }

        let err = AppError::HttpStatus {
            status: status.as_u16(),
            url: url.to_string(),
        };
        if retries_left && self.config.is_retryable(status.as_u16()) {
            debug!(url, attempt, status = status.as_u16(), "Retryable status");
            Err(backoff::Error::transient(err))
        } else {
            Err(backoff::Error::permanent(err))
        }
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch_page(&self, url: &str) -> Result<String> {
        let parsed = Url::parse(url)?;
        let host = parsed.host_str().unwrap_or_default().to_string();

        let robot = if self.config.respect_robots {
            self.robots_for(&parsed).await
        } else {
            None
        };
        if robot.as_ref().is_some_and(|r| !r.allowed(url)) {
            return Err(AppError::RobotsDisallowed(url.to_string()));
        }

        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(self.request_delay.max(Duration::from_millis(250)))
            .with_max_interval(Duration::from_secs(30))
            .with_max_elapsed_time(None)
            .build();

        let counter = AtomicU32::new(0);
        let attempts = &counter;
        let host = host.as_str();
        let robot = robot.as_deref();

        let result = retry(policy, move || {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            async move { self.attempt(url, host, robot, attempt).await }
        })
        .await;

        if let Err(e) = &result {
            warn!(
                url,
                attempts = counter.load(Ordering::SeqCst),
                error = %e,
                "Giving up on page"
            );
        }
        result
    }
}
