use std::path::Path;
use std::sync::Arc;

use url::Url;

use crate::account::Credentials;
use crate::catalog::parse_catalog;
use crate::catalog::Event;
use crate::catalog::Round;
use crate::config::Config;
use crate::errors::AihlError;
use crate::media::descriptor_url;
use crate::media::extract_media_id;
use crate::media::parse_stream_source;
use crate::media::StreamSource;
use crate::session::SessionCache;
use crate::session::SessionManager;
use crate::transport::Method;
use crate::transport::Transport;

const BASE_URL: &str = "https://aihl.tv/";
const LOGIN_URL: &str = "https://aihl.tv/auth/login/";

/// High-level site client: one authenticated session plus the catalog and
/// stream-resolution scrapers. Construct it explicitly and pass it to
/// whatever renders the catalog; there is no shared global instance.
pub struct AihlSession {
    session: SessionManager,
    credentials: Credentials,
    ttl_seconds: i64,
    base: Url,
}

impl AihlSession {
    pub fn new(config: &Config, transport: Arc<dyn Transport>) -> Result<Self, AihlError> {
        let base = Url::parse(BASE_URL)?;
        let host = base.host_str().unwrap_or("aihl.tv").to_string();
        let cache = SessionCache::new(Path::new(&config.cache_dir), &host);
        Ok(Self {
            session: SessionManager::new(transport, cache, LOGIN_URL, BASE_URL),
            credentials: config.credentials(),
            ttl_seconds: config.session_ttl,
            base,
        })
    }

    /// Make sure a usable session exists, logging in again if the cached
    /// one went stale. Every scraping call runs through this first.
    pub async fn connect(&mut self, force_relogin: bool) -> Result<(), AihlError> {
        self.session
            .ensure_authenticated(&self.credentials, self.ttl_seconds, force_relogin)
            .await
    }

    /// Scrape the homepage into rounds of events, in page order.
    pub async fn get_catalog(&mut self) -> Result<Vec<Round>, AihlError> {
        self.connect(false).await?;
        let response = self.session.fetch(BASE_URL, Method::Get, None).await?;
        parse_catalog(&response.body, &self.base)
    }

    pub async fn get_rounds(&mut self) -> Result<Vec<String>, AihlError> {
        Ok(self
            .get_catalog()
            .await?
            .into_iter()
            .map(|round| round.label)
            .collect())
    }

    pub async fn get_events_for_round(&mut self, label: &str) -> Result<Vec<Event>, AihlError> {
        self.get_catalog()
            .await?
            .into_iter()
            .find(|round| round.label == label)
            .map(|round| round.events)
            .ok_or_else(|| AihlError::Parse {
                reason: format!("unknown round label: {label}"),
            })
    }

    /// Resolve an event page to its playable stream: fetch the page, pull
    /// the embedded media id, then ask the media API for the descriptor.
    /// One attempt per stage, nothing cached.
    pub async fn resolve_stream(
        &mut self,
        event_page_url: &str,
    ) -> Result<StreamSource, AihlError> {
        self.connect(false).await?;
        let page = self.session.fetch(event_page_url, Method::Get, None).await?;
        let media_id = extract_media_id(&page.body)?;
        log::debug!("resolved media id {media_id} for {event_page_url}");
        let descriptor = self
            .session
            .fetch(&descriptor_url(&media_id), Method::Get, None)
            .await?;
        parse_stream_source(&descriptor.body)
    }
}
