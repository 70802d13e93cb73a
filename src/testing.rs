// src/testing.rs

//! Test doubles shared by unit tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{FetchError, Result};
use crate::services::{Document, Notification, NotificationChannel, SourceClient};

/// Listing page in the marketplace markup understood by the default selectors.
pub fn listing_page(title: &str, price: Option<&str>, quantity: Option<u32>) -> String {
    let price_html = price
        .map(|p| {
            format!(
                r#"<div class="x-bin-price__content"><div class="x-price-primary"><span class="ux-textspans">{p}</span></div></div>"#
            )
        })
        .unwrap_or_default();
    let availability = match quantity {
        Some(0) | None => "<span>Out of Stock</span>".to_string(),
        Some(n) => {
            format!(r#"<span class="ux-textspans ux-textspans--SECONDARY">{n} available</span>"#)
        }
    };
    format!(
        r#"<html><body>
        <h1 class="x-item-title__mainTitle"><span>{title}</span></h1>
        {price_html}
        <div class="x-quantity__availability">{availability}</div>
        </body></html>"#
    )
}

/// Source client answering from a mutable script of pages and failures.
#[derive(Default)]
pub struct ScriptedSource {
    pages: Mutex<HashMap<String, std::result::Result<String, FetchError>>>,
}

impl ScriptedSource {
    pub fn page(&self, url: &str, body: String) {
        self.pages.lock().unwrap().insert(url.to_string(), Ok(body));
    }

    pub fn fail(&self, url: &str, error: FetchError) {
        self.pages.lock().unwrap().insert(url.to_string(), Err(error));
    }
}

#[async_trait]
impl SourceClient for ScriptedSource {
    async fn fetch(&self, url: &str) -> std::result::Result<Document, FetchError> {
        let scripted = self.pages.lock().unwrap().get(url).cloned();
        match scripted {
            Some(Ok(body)) => Ok(Document::new(url, body)),
            Some(Err(e)) => Err(e),
            None => Err(FetchError::NotFound {
                url: url.to_string(),
            }),
        }
    }
}

/// Channel that keeps every notification it was asked to send.
#[derive(Default)]
pub struct RecordingChannel {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingChannel {
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn send(&self, notification: &Notification) -> Result<()> {
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}
