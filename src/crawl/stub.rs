use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{AppError, Result};

use super::http::PageFetcher;

/// Serves canned pages and records every request.
pub(crate) struct StubPages {
    pages: HashMap<String, String>,
    requested: Mutex<Vec<String>>,
}

impl StubPages {
    pub(crate) fn new(pages: &[(&str, &str)]) -> Arc<Self> {
        Arc::new(Self {
            pages: pages
                .iter()
                .map(|(url, html)| (url.to_string(), html.to_string()))
                .collect(),
            requested: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn requests(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageFetcher for StubPages {
    async fn fetch_page(&self, url: &str) -> Result<String> {
        self.requested.lock().unwrap().push(url.to_string());
        self.pages.get(url).cloned().ok_or_else(|| AppError::HttpStatus {
            status: 404,
            url: url.to_string(),
        })
    }
}
