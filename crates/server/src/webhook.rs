//! Inbound message webhook.
//!
//! Endpoints:
//! - `POST /api/webhook` — one chat message in, one structured result out.
//!   The caller always receives a 200 with a `deal.action` field once the
//!   payload itself is valid; remote CRM trouble shows up as
//!   `deal.action = "failed"` plus an error string, never as a 5xx.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::post, Json, Router};
use chrono::Utc;
use dealbridge_core::{Intent, UserIdentity};
use dealbridge_crm::{ContactId, ContactResolver};
use dealbridge_engine::{ReconcileOutcome, ReconcileRequest, ReconciliationEngine};
use dealbridge_extract::{lead_score, LeadQuality, MessageParser};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ReconciliationEngine>,
    pub contacts: Arc<dyn ContactResolver>,
    pub parser: MessageParser,
}

#[derive(Debug, Deserialize)]
pub struct WebhookRequest {
    pub message: Option<String>,
    pub psid: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub success: bool,
    pub timestamp: String,
    pub extracted: ExtractedView,
    pub contact: Option<ContactView>,
    pub deal: Option<DealView>,
    pub metadata: Metadata,
}

#[derive(Debug, Serialize)]
pub struct ExtractedView {
    pub category: Option<&'static str>,
    pub subject: Option<String>,
    pub phone: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub lead_score: u32,
    pub lead_quality: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ContactView {
    pub id: String,
}

#[derive(Debug, Serialize)]
pub struct DealView {
    pub id: Option<String>,
    pub display_name: Option<String>,
    pub stage: &'static str,
    pub action: &'static str,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Metadata {
    pub correlation_id: String,
    pub processing_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct WebhookError {
    pub error: String,
}

pub fn router(state: AppState) -> Router {
    Router::new().route("/api/webhook", post(webhook)).with_state(state)
}

async fn webhook(
    State(state): State<AppState>,
    Json(request): Json<WebhookRequest>,
) -> axum::response::Response {
    let started = std::time::Instant::now();
    let correlation_id = Uuid::new_v4().to_string();

    let Some(message) = request.message.as_deref().map(str::trim).filter(|m| !m.is_empty())
    else {
        return (
            StatusCode::BAD_REQUEST,
            Json(WebhookError { error: "message is required".to_string() }),
        )
            .into_response();
    };

    let intent = state.parser.parse(message);
    let score = lead_score(&intent);
    let quality = LeadQuality::for_score(score);
    info!(
        event_name = "webhook.message.parsed",
        correlation_id = %correlation_id,
        category = intent.category.map(|c| c.as_str()).unwrap_or("none"),
        subject = intent.subject.as_deref().unwrap_or("none"),
        lead_score = score,
        "inbound message parsed"
    );

    let identity = request
        .psid
        .as_deref()
        .map(str::trim)
        .filter(|psid| !psid.is_empty())
        .map(UserIdentity::new);

    let (contact, deal) = match &identity {
        Some(identity) => {
            let contact_id =
                resolve_contact(&state, identity, request.name.as_deref(), &intent, &correlation_id)
                    .await;
            let outcome =
                reconcile(&state, identity, &intent, contact_id.as_ref(), score, quality).await;
            (contact_id.map(|id| ContactView { id: id.0 }), Some(deal_view(outcome)))
        }
        None => {
            info!(
                event_name = "webhook.message.anonymous",
                correlation_id = %correlation_id,
                "no sender identity, extraction only"
            );
            (None, None)
        }
    };

    let response = WebhookResponse {
        success: true,
        timestamp: Utc::now().to_rfc3339(),
        extracted: ExtractedView {
            category: intent.category.map(|c| c.as_str()),
            subject: intent.subject.clone(),
            phone: intent.contact_phone.clone(),
            date: intent.scheduled_date.clone(),
            time: intent.scheduled_time.clone(),
            lead_score: score,
            lead_quality: quality.as_str(),
        },
        contact,
        deal,
        metadata: Metadata {
            correlation_id,
            processing_ms: started.elapsed().as_millis() as u64,
        },
    };
    (StatusCode::OK, Json(response)).into_response()
}

async fn resolve_contact(
    state: &AppState,
    identity: &UserIdentity,
    name: Option<&str>,
    intent: &Intent,
    correlation_id: &str,
) -> Option<ContactId> {
    match state.contacts.resolve(identity, name, intent).await {
        Ok(contact_id) => Some(contact_id),
        Err(error) => {
            warn!(
                event_name = "webhook.contact.resolve_failed",
                correlation_id = %correlation_id,
                identity = %identity,
                error = %error,
                "contact upsert failed"
            );
            None
        }
    }
}

async fn reconcile(
    state: &AppState,
    identity: &UserIdentity,
    intent: &Intent,
    contact_id: Option<&ContactId>,
    score: u32,
    quality: LeadQuality,
) -> ReconcileOutcome {
    let amount = state.parser.treatment(&intent.raw_message).map(|t| t.typical_amount());
    state
        .engine
        .reconcile(ReconcileRequest {
            identity,
            intent,
            contact_id,
            amount,
            description: build_description(intent, score, quality),
        })
        .await
}

fn build_description(intent: &Intent, score: u32, quality: LeadQuality) -> String {
    let mut description = intent.raw_message.clone();
    description.push_str(&format!("\n\nLead score: {score} ({})", quality.as_str()));
    if let Some(phone) = &intent.contact_phone {
        description.push_str(&format!("\nTeléfono: {phone}"));
    }
    if let Some(date) = &intent.scheduled_date {
        description.push_str(&format!("\nFecha: {date}"));
    }
    if let Some(time) = &intent.scheduled_time {
        description.push_str(&format!("\nHora: {time}"));
    }
    description
}

fn deal_view(outcome: ReconcileOutcome) -> DealView {
    DealView {
        id: outcome.record_id.map(|id| id.0),
        display_name: outcome.display_name,
        stage: outcome.stage.as_str(),
        action: outcome.action.as_str(),
        error: outcome.error,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{self, Request, StatusCode};
    use dealbridge_core::config::CacheConfig;
    use dealbridge_core::{Intent, UserIdentity};
    use dealbridge_crm::{ContactId, ContactResolver, MemoryStore, StoreError};
    use dealbridge_engine::ReconciliationEngine;
    use dealbridge_extract::MessageParser;
    use tower::ServiceExt;

    use super::{router, AppState};

    struct FixedContacts;

    #[async_trait]
    impl ContactResolver for FixedContacts {
        async fn resolve(
            &self,
            _identity: &UserIdentity,
            _display_name: Option<&str>,
            _intent: &Intent,
        ) -> Result<ContactId, StoreError> {
            Ok(ContactId("contact-77".to_string()))
        }
    }

    struct BrokenContacts;

    #[async_trait]
    impl ContactResolver for BrokenContacts {
        async fn resolve(
            &self,
            _identity: &UserIdentity,
            _display_name: Option<&str>,
            _intent: &Intent,
        ) -> Result<ContactId, StoreError> {
            Err(StoreError::Transient("contact search timed out".to_string()))
        }
    }

    fn state_with(store: Arc<MemoryStore>, contacts: Arc<dyn ContactResolver>) -> AppState {
        let engine =
            ReconciliationEngine::new(store, &CacheConfig { ttl_secs: 300, capacity: 100 });
        AppState { engine: Arc::new(engine), contacts, parser: MessageParser::new() }
    }

    async fn post_webhook(state: AppState, payload: serde_json::Value) -> (StatusCode, serde_json::Value) {
        let response = router(state)
            .oneshot(
                Request::builder()
                    .method(http::Method::POST)
                    .uri("/api/webhook")
                    .header(http::header::CONTENT_TYPE, "application/json")
                    .body(Body::from(payload.to_string()))
                    .expect("request"),
            )
            .await
            .expect("response");

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let json = serde_json::from_slice(&bytes).expect("json body");
        (status, json)
    }

    #[tokio::test]
    async fn missing_message_is_a_bad_request() {
        let store = Arc::new(MemoryStore::new());
        let state = state_with(store, Arc::new(FixedContacts));

        let (status, body) = post_webhook(state, serde_json::json!({ "psid": "psid-1" })).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "message is required");
    }

    #[tokio::test]
    async fn schedule_message_creates_a_deal_linked_to_the_contact() {
        let store = Arc::new(MemoryStore::new());
        let state = state_with(store.clone(), Arc::new(FixedContacts));

        let (status, body) = post_webhook(
            state,
            serde_json::json!({
                "message": "Hola, quiero agendar una cita para botox mañana a las 10am",
                "psid": "psid-wh1",
                "name": "Ana"
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["extracted"]["category"], "schedule");
        assert_eq!(body["extracted"]["subject"], "Botox");
        assert_eq!(body["contact"]["id"], "contact-77");
        assert_eq!(body["deal"]["action"], "created");
        assert_eq!(body["deal"]["stage"], "scheduled");
        assert_eq!(store.open_deals_for(&UserIdentity::new("psid-wh1")).len(), 1);
    }

    #[tokio::test]
    async fn anonymous_message_returns_extraction_only() {
        let store = Arc::new(MemoryStore::new());
        let state = state_with(store.clone(), Arc::new(FixedContacts));

        let (status, body) = post_webhook(
            state,
            serde_json::json!({ "message": "cuánto cuesta el botox?" }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["extracted"]["category"], "inquire");
        assert!(body["contact"].is_null());
        assert!(body["deal"].is_null());
        assert_eq!(store.total_deals(), 0);
    }

    #[tokio::test]
    async fn store_outage_still_answers_200_with_a_failed_action() {
        let store = Arc::new(MemoryStore::new());
        store.set_fail_creates(true);
        store.set_fail_searches(true);
        let state = state_with(store, Arc::new(FixedContacts));

        let (status, body) = post_webhook(
            state,
            serde_json::json!({ "message": "quiero agendar botox", "psid": "psid-down" }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["deal"]["action"], "failed");
        assert!(body["deal"]["error"].is_string());
    }

    #[tokio::test]
    async fn contact_failure_reports_the_no_contact_precondition() {
        let store = Arc::new(MemoryStore::new());
        let state = state_with(store.clone(), Arc::new(BrokenContacts));

        let (status, body) = post_webhook(
            state,
            serde_json::json!({ "message": "quiero agendar botox", "psid": "psid-nc" }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert!(body["contact"].is_null());
        assert_eq!(body["deal"]["action"], "failed");
        assert_eq!(body["deal"]["error"], "no linked contact");
        assert_eq!(store.total_deals(), 0);
    }
}
