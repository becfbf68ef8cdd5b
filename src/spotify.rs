//! Spotify Web API catalog over blocking HTTP.

use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::catalog::Catalog;
use crate::config::CatalogSettings;
use crate::error::CatalogError;
use crate::models::CandidateRecord;

/// Page size accepted by `/search`.
const MAX_SEARCH_LIMIT: usize = 50;

/// Spotify catalog authenticated with a user access token.
pub struct SpotifyCatalog {
    http_client: ureq::Agent,
    api_base: String,
    token: String,
}

impl SpotifyCatalog {
    pub fn new(api_base: &str, token: &str) -> Self {
        let http_client = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5))
            .timeout_read(Duration::from_secs(15))
            .timeout_write(Duration::from_secs(15))
            .build();
        Self {
            http_client,
            api_base: api_base.trim().trim_end_matches('/').to_string(),
            token: token.trim().to_string(),
        }
    }

    /// Fails with `Auth` when the settings carry no token.
    pub fn from_settings(settings: &CatalogSettings) -> Result<Self, CatalogError> {
        match settings.access_token.as_deref().filter(|t| !t.trim().is_empty()) {
            Some(token) => Ok(Self::new(&settings.api_base, token)),
            None => Err(CatalogError::Auth(
                "no access token (set SPOTIFY_ACCESS_TOKEN or catalog.access_token)".into(),
            )),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path.trim_start_matches('/'))
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }

    fn get_json(&self, request: ureq::Request) -> Result<Value, CatalogError> {
        let response = request.set("Authorization", &self.bearer()).call()?;
        response
            .into_json()
            .map_err(|err| CatalogError::Parse(format!("response parse failed: {err}")))
    }

    /// Display name of the token's user. Used as an auth check before a run.
    pub fn current_user(&self) -> Result<String, CatalogError> {
        let parsed = self.get_json(self.http_client.get(&self.url("me")))?;
        let name = parsed
            .get("display_name")
            .and_then(Value::as_str)
            .or_else(|| parsed.get("id").and_then(Value::as_str))
            .unwrap_or("unknown user");
        Ok(name.to_string())
    }

    /// Whether the track is already in the user's saved tracks.
    fn is_saved(&self, id: &str) -> Result<bool, CatalogError> {
        let request = self.http_client.get(&self.url("me/tracks/contains")).query("ids", id);
        let parsed = self.get_json(request)?;
        Ok(parsed
            .as_array()
            .and_then(|items| items.first())
            .and_then(Value::as_bool)
            .unwrap_or(false))
    }

    fn parse_track(track: &Value) -> Option<CandidateRecord> {
        let id = track.get("id")?.as_str()?;
        let title = track.get("name").and_then(Value::as_str).unwrap_or_default();
        let artists: Vec<&str> = track
            .get("artists")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|a| a.get("name").and_then(Value::as_str))
                    .collect()
            })
            .unwrap_or_default();
        let album = track
            .get("album")
            .and_then(|a| a.get("name"))
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty());
        let popularity = track
            .get("popularity")
            .and_then(Value::as_u64)
            .unwrap_or(0)
            .min(100) as u8;

        let mut record = CandidateRecord::new(id, title, &artists, album, popularity);
        if record.artist.is_empty() {
            record.artist = "Unknown".to_string();
        }
        record.duration_ms = track.get("duration_ms").and_then(Value::as_u64).unwrap_or(0);
        record.preview_url = track
            .get("preview_url")
            .and_then(Value::as_str)
            .map(str::to_string);
        record.external_url = track
            .get("external_urls")
            .and_then(|u| u.get("spotify"))
            .and_then(Value::as_str)
            .map(str::to_string);
        Some(record)
    }

    fn parse_search(parsed: &Value) -> Vec<CandidateRecord> {
        parsed
            .get("tracks")
            .and_then(|t| t.get("items"))
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Self::parse_track).collect())
            .unwrap_or_default()
    }
}

impl Catalog for SpotifyCatalog {
    fn search(&self, query: &str, limit: usize) -> Result<Vec<CandidateRecord>, CatalogError> {
        let limit = limit.clamp(1, MAX_SEARCH_LIMIT);
        let request = self
            .http_client
            .get(&self.url("search"))
            .query("q", query.trim())
            .query("type", "track")
            .query("limit", &limit.to_string());
        let parsed = self.get_json(request)?;
        let records = Self::parse_search(&parsed);
        debug!(query, hits = records.len(), "spotify search");
        Ok(records)
    }

    fn mark_favorite(&self, id: &str) -> Result<bool, CatalogError> {
        if self.is_saved(id)? {
            debug!(id, "track already saved");
            return Ok(false);
        }
        self.http_client
            .put(&self.url("me/tracks"))
            .query("ids", id)
            .set("Authorization", &self.bearer())
            .call()?;
        debug!(id, "saved track");
        Ok(true)
    }
}
