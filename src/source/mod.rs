//! Availability source: the collaborator contract plus the HTTP adapter used
//! in production. The poller only ever sees the `AvailabilitySource` trait;
//! wire-format details stay inside this module.

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::fmt;
use thiserror::Error;
use tracing::warn;

use crate::config;
use crate::model::{Criteria, ResourceRef, Slot};
use crate::source::model::{AvailabilityResp, Location, LocationsResp, Restaurant, RestaurantsResp};

pub mod model;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("availability source unavailable: {0}")]
    Unavailable(String),
    #[error("availability source timed out")]
    Timeout,
    #[error("malformed availability response: {0}")]
    Malformed(String),
}

/// Answers "what slots are open right now" for a watched resource.
#[async_trait]
pub trait AvailabilitySource: Send + Sync {
    async fn check_availability(
        &self,
        resource: &ResourceRef,
        criteria: &Criteria,
    ) -> Result<Vec<Slot>, SourceError>;
}

#[derive(Clone)]
pub struct HttpAvailabilitySource {
    http: Client,
    base_url: Url,
    auth_token: Option<String>,
}

impl fmt::Debug for HttpAvailabilitySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpAvailabilitySource")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HttpAvailabilitySource {
    pub fn from_config(cfg: &config::Source) -> anyhow::Result<Self> {
        let base_url = Url::parse(&cfg.base_url)
            .map_err(|err| anyhow::anyhow!("invalid source.base_url: {err}"))?;
        Ok(Self::with_base_url(base_url, cfg.auth_token.clone()))
    }

    pub fn with_base_url(base_url: Url, auth_token: Option<String>) -> Self {
        let http = Client::builder()
            .user_agent("dinewatch/0.1")
            .no_proxy()
            .build()
            .expect("reqwest client");
        Self {
            http,
            base_url,
            auth_token,
        }
    }

    fn get(&self, path: &str) -> Result<reqwest::RequestBuilder, SourceError> {
        let url = self
            .base_url
            .join(path)
            .map_err(|err| SourceError::Malformed(format!("bad endpoint path: {err}")))?;
        let mut req = self.http.get(url);
        if let Some(token) = &self.auth_token {
            req = req.header("Authorization", format!("Bearer {token}"));
        }
        Ok(req)
    }

    async fn fetch_json<T: DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
    ) -> Result<T, SourceError> {
        let res = req.send().await.map_err(|err| {
            if err.is_timeout() {
                SourceError::Timeout
            } else {
                SourceError::Unavailable(err.to_string())
            }
        })?;

        if res.status() == StatusCode::TOO_MANY_REQUESTS {
            let body = res.text().await.unwrap_or_default();
            warn!("rate limited by availability source: {}", body);
            return Err(SourceError::Unavailable("received 429".into()));
        }
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(SourceError::Unavailable(format!("status {status}: {body}")));
        }

        res.json::<T>()
            .await
            .map_err(|err| SourceError::Malformed(err.to_string()))
    }

    /// Dining locations (parks, resorts) known to the source.
    pub async fn list_locations(&self) -> Result<Vec<Location>, SourceError> {
        let resp: LocationsResp = self.fetch_json(self.get("v1/dining/locations")?).await?;
        Ok(resp.locations)
    }

    /// Restaurants at one location that take reservations at all.
    pub async fn list_restaurants(&self, location_id: &str) -> Result<Vec<Restaurant>, SourceError> {
        let req = self
            .get("v1/dining/restaurants")?
            .query(&[("location", location_id)]);
        let resp: RestaurantsResp = self.fetch_json(req).await?;
        Ok(resp
            .restaurants
            .into_iter()
            .filter(|r| r.accepts_reservations)
            .collect())
    }
}

#[async_trait]
impl AvailabilitySource for HttpAvailabilitySource {
    async fn check_availability(
        &self,
        resource: &ResourceRef,
        criteria: &Criteria,
    ) -> Result<Vec<Slot>, SourceError> {
        let req = self.get("v1/dining/availability")?.query(&[
            ("venue", resource.venue_id.as_str()),
            ("location", resource.location_id.as_str()),
            ("partySize", &criteria.party_size.to_string()),
            ("date", &criteria.date.to_string()),
            ("mealPeriod", criteria.meal_period.as_str()),
        ]);
        let resp: AvailabilityResp = self.fetch_json(req).await?;
        Ok(resp
            .available_times
            .into_iter()
            .map(|t| Slot {
                time: t.time,
                external_ref: t.offer_id,
            })
            .collect())
    }
}
