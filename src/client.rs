use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::EventError;
use crate::models::{CalendarEvent, EventUpdateRequest, NewEventRequest};

/// The listing endpoints exposed by the Events API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventQuery {
    All,
    Range { start: NaiveDate, end: NaiveDate },
    Today,
    Upcoming,
    Class(String),
    Teacher,
    Pending,
}

impl EventQuery {
    fn segments(&self) -> Vec<&str> {
        match self {
            EventQuery::All | EventQuery::Range { .. } => vec!["events"],
            EventQuery::Today => vec!["events", "today"],
            EventQuery::Upcoming => vec!["events", "upcoming"],
            EventQuery::Class(id) => vec!["events", "class", id.as_str()],
            EventQuery::Teacher => vec!["events", "teacher"],
            EventQuery::Pending => vec!["events", "pending"],
        }
    }

    fn params(&self) -> Vec<(&'static str, String)> {
        match self {
            EventQuery::Range { start, end } => vec![
                ("start_date", start.format("%Y-%m-%d").to_string()),
                ("end_date", end.format("%Y-%m-%d").to_string()),
            ],
            _ => Vec::new(),
        }
    }
}

/// The remote store of calendar events.
#[async_trait]
pub trait EventsApi: Send + Sync {
    /// Creates one event, or one per class when the request carries several.
    async fn create(&self, request: &NewEventRequest) -> Result<Vec<CalendarEvent>, EventError>;
    async fn get(&self, id: &str) -> Result<CalendarEvent, EventError>;
    async fn update(
        &self,
        id: &str,
        request: &EventUpdateRequest,
    ) -> Result<CalendarEvent, EventError>;
    async fn approve(&self, id: &str) -> Result<CalendarEvent, EventError>;
    async fn reject(&self, id: &str, reason: Option<&str>) -> Result<CalendarEvent, EventError>;
    async fn delete(&self, id: &str) -> Result<(), EventError>;
    async fn list(&self, query: &EventQuery) -> Result<Vec<CalendarEvent>, EventError>;
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum EnvelopeStatus {
    Success,
    Error,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    status: EnvelopeStatus,
    #[serde(default)]
    data: Option<EventPayload>,
    #[serde(default)]
    message: Option<String>,
}

/// The `data` member of a successful response.
#[derive(Debug, Default, Deserialize)]
pub struct EventPayload {
    #[serde(default)]
    event: Option<CalendarEvent>,
    #[serde(default)]
    events: Option<Vec<CalendarEvent>>,
}

impl EventPayload {
    pub fn into_events(self) -> Vec<CalendarEvent> {
        match (self.events, self.event) {
            (Some(events), _) => events,
            (None, Some(event)) => vec![event],
            (None, None) => Vec::new(),
        }
    }

    pub fn into_event(self) -> Result<CalendarEvent, EventError> {
        match (self.event, self.events) {
            (Some(event), _) => Ok(event),
            (None, Some(mut events)) if events.len() == 1 => Ok(events.remove(0)),
            _ => Err(EventError::Decode("response carried no event".into())),
        }
    }
}

/// Turns a raw response into either the payload or a classified error.
/// Nothing past this point inspects response shapes.
pub fn decode_response(status: StatusCode, body: &[u8]) -> Result<EventPayload, EventError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return if status.is_success() {
            Ok(EventPayload::default())
        } else {
            Err(EventError::Network(format!("HTTP {status}")))
        };
    }

    match serde_json::from_slice::<Envelope>(body) {
        Ok(envelope) if envelope.status == EnvelopeStatus::Error || !status.is_success() => {
            Err(EventError::Api {
                status: Some(status.as_u16()),
                message: envelope
                    .message
                    .unwrap_or_else(|| format!("request failed with HTTP {status}")),
            })
        }
        Ok(envelope) => Ok(envelope.data.unwrap_or_default()),
        Err(_) if !status.is_success() => Err(EventError::Network(format!("HTTP {status}"))),
        Err(err) => Err(EventError::Decode(err.to_string())),
    }
}

#[derive(Serialize)]
struct RejectBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    rejection_reason: Option<&'a str>,
}

#[derive(Clone)]
pub struct HttpEventsApi {
    client: reqwest::Client,
    base_url: Arc<Url>,
    token: Option<Arc<str>>,
}

impl HttpEventsApi {
    pub fn new(base_url: Url, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: Arc::new(base_url),
            token: token.map(Arc::from),
        }
    }

    fn endpoint(&self, segments: &[&str], params: &[(&str, String)]) -> Result<Url, EventError> {
        let mut url = (*self.base_url).clone();
        url.path_segments_mut()
            .map_err(|_| EventError::Network(format!("{} cannot be a base URL", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        if !params.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())));
        }
        Ok(url)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<EventPayload, EventError> {
        let request = match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        let response = request.send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        debug!(%status, bytes = body.len(), "events API responded");
        decode_response(status, &body)
    }
}

#[async_trait]
impl EventsApi for HttpEventsApi {
    async fn create(&self, request: &NewEventRequest) -> Result<Vec<CalendarEvent>, EventError> {
        let url = self.endpoint(&["events"], &[])?;
        let payload = self.send(self.client.post(url).json(request)).await?;
        Ok(payload.into_events())
    }

    async fn get(&self, id: &str) -> Result<CalendarEvent, EventError> {
        let url = self.endpoint(&["events", id], &[])?;
        match self.send(self.client.get(url)).await {
            Err(EventError::Api {
                status: Some(404), ..
            }) => Err(EventError::NotFound(id.to_string())),
            other => other?.into_event(),
        }
    }

    async fn update(
        &self,
        id: &str,
        request: &EventUpdateRequest,
    ) -> Result<CalendarEvent, EventError> {
        let url = self.endpoint(&["events", id], &[])?;
        self.send(self.client.patch(url).json(request))
            .await?
            .into_event()
    }

    async fn approve(&self, id: &str) -> Result<CalendarEvent, EventError> {
        let url = self.endpoint(&["events", id, "approve"], &[])?;
        self.send(self.client.post(url).json(&serde_json::json!({})))
            .await?
            .into_event()
    }

    async fn reject(&self, id: &str, reason: Option<&str>) -> Result<CalendarEvent, EventError> {
        let url = self.endpoint(&["events", id, "reject"], &[])?;
        let body = RejectBody {
            rejection_reason: reason,
        };
        self.send(self.client.post(url).json(&body))
            .await?
            .into_event()
    }

    async fn delete(&self, id: &str) -> Result<(), EventError> {
        let url = self.endpoint(&["events", id], &[])?;
        self.send(self.client.delete(url)).await.map(|_| ())
    }

    async fn list(&self, query: &EventQuery) -> Result<Vec<CalendarEvent>, EventError> {
        let url = self.endpoint(&query.segments(), &query.params())?;
        Ok(self.send(self.client.get(url)).await?.into_events())
    }
}
