//! HubSpot-shaped deal adapter. All wire field names and stage codes come
//! from configuration; the rest of the system only sees domain types.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dealbridge_core::config::{CrmConfig, StageCodes};
use dealbridge_core::{OpportunityFields, OpportunityId, OpportunityRecord, UserIdentity};
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::contacts::ContactId;
use crate::errors::StoreError;
use crate::store::EntityStore;

const SUBJECT_PROPERTY: &str = "treatment_type";
const SEARCH_LIMIT: u32 = 10;

pub struct HubSpotStore {
    client: reqwest::Client,
    base_url: String,
    access_token: SecretString,
    identity_property: String,
    pipeline: String,
    stage_codes: StageCodes,
}

impl HubSpotStore {
    pub fn new(config: &CrmConfig) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|error| StoreError::Fatal(format!("http client construction: {error}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            access_token: config.access_token.clone(),
            identity_property: config.identity_property.clone(),
            pipeline: config.pipeline.clone(),
            stage_codes: config.stage_codes.clone(),
        })
    }

    fn write_properties(&self, fields: &OpportunityFields) -> HashMap<String, String> {
        let mut properties = HashMap::new();
        properties.insert(self.identity_property.clone(), fields.identity.0.clone());
        properties.insert("dealname".to_string(), fields.display_name.clone());
        properties.insert("dealstage".to_string(), self.stage_codes.code(fields.stage).to_string());
        properties.insert("pipeline".to_string(), self.pipeline.clone());
        properties.insert("description".to_string(), fields.description.clone());
        if let Some(subject) = &fields.subject {
            properties.insert(SUBJECT_PROPERTY.to_string(), subject.clone());
        }
        if let Some(amount) = fields.amount {
            properties.insert("amount".to_string(), amount.to_string());
        }
        properties
    }

    fn read_properties(&self) -> Vec<String> {
        vec![
            self.identity_property.clone(),
            "dealname".to_string(),
            "dealstage".to_string(),
            "description".to_string(),
            SUBJECT_PROPERTY.to_string(),
            "hs_lastmodifieddate".to_string(),
        ]
    }

    fn record_from_remote(&self, deal: RemoteDeal) -> Option<OpportunityRecord> {
        let stage_code = deal.properties.get("dealstage").and_then(|value| value.clone());
        let stage = match stage_code.as_deref().and_then(|code| self.stage_codes.stage_for(code)) {
            Some(stage) => stage,
            None => {
                warn!(
                    event_name = "crm.search.unknown_stage",
                    deal_id = %deal.id,
                    stage_code = stage_code.as_deref().unwrap_or("<missing>"),
                    "skipping deal with unmapped stage code"
                );
                return None;
            }
        };

        let property = |name: &str| deal.properties.get(name).and_then(|value| value.clone());
        let last_modified = property("hs_lastmodifieddate")
            .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
            .map(|parsed| parsed.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        Some(OpportunityRecord {
            id: OpportunityId(deal.id),
            display_name: property("dealname").unwrap_or_default(),
            stage,
            subject: property(SUBJECT_PROPERTY),
            description: property("description"),
            last_modified,
        })
    }

    async fn search(&self, filters: Vec<Filter>) -> Result<Vec<OpportunityRecord>, StoreError> {
        let request = SearchRequest {
            filter_groups: vec![FilterGroup { filters }],
            properties: self.read_properties(),
            limit: SEARCH_LIMIT,
        };

        let url = format!("{}/crm/v3/objects/deals/search", self.base_url);
        let response: SearchResponse = self
            .send_json(
                self.client
                    .post(&url)
                    .bearer_auth(self.access_token.expose_secret())
                    .json(&request),
            )
            .await?;

        Ok(response
            .results
            .into_iter()
            .filter_map(|deal| self.record_from_remote(deal))
            .collect())
    }

    fn exclude_terminal_filter(&self) -> Filter {
        Filter {
            property_name: "dealstage".to_string(),
            operator: "NOT_IN",
            value: None,
            values: Some(
                self.stage_codes.terminal_codes().iter().map(|code| code.to_string()).collect(),
            ),
        }
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, StoreError> {
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }
        response
            .json::<T>()
            .await
            .map_err(|error| StoreError::Fatal(format!("malformed response body: {error}")))
    }

    async fn send_expect_ok(&self, request: reqwest::RequestBuilder) -> Result<(), StoreError> {
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }
        Ok(())
    }
}

#[async_trait]
impl EntityStore for HubSpotStore {
    async fn create(&self, fields: &OpportunityFields) -> Result<OpportunityId, StoreError> {
        let url = format!("{}/crm/v3/objects/deals", self.base_url);
        let body = ObjectWrite { properties: self.write_properties(fields) };
        let response: CreateResponse = self
            .send_json(
                self.client.post(&url).bearer_auth(self.access_token.expose_secret()).json(&body),
            )
            .await?;
        Ok(OpportunityId(response.id))
    }

    async fn update(
        &self,
        id: &OpportunityId,
        fields: &OpportunityFields,
    ) -> Result<(), StoreError> {
        let url = format!("{}/crm/v3/objects/deals/{}", self.base_url, id.0);
        let body = ObjectWrite { properties: self.write_properties(fields) };
        self.send_expect_ok(
            self.client.patch(&url).bearer_auth(self.access_token.expose_secret()).json(&body),
        )
        .await
    }

    async fn search_by_identity(
        &self,
        identity: &UserIdentity,
    ) -> Result<Vec<OpportunityRecord>, StoreError> {
        self.search(vec![
            Filter {
                property_name: self.identity_property.clone(),
                operator: "EQ",
                value: Some(identity.0.clone()),
                values: None,
            },
            self.exclude_terminal_filter(),
        ])
        .await
    }

    async fn search_by_display_name(
        &self,
        display_name: &str,
    ) -> Result<Vec<OpportunityRecord>, StoreError> {
        self.search(vec![
            Filter {
                property_name: "dealname".to_string(),
                operator: "EQ",
                value: Some(display_name.to_string()),
                values: None,
            },
            self.exclude_terminal_filter(),
        ])
        .await
    }

    async fn associate(
        &self,
        id: &OpportunityId,
        contact_id: &ContactId,
    ) -> Result<(), StoreError> {
        let url = format!(
            "{}/crm/v4/objects/deals/{}/associations/default/contacts/{}",
            self.base_url, id.0, contact_id.0
        );
        self.send_expect_ok(self.client.put(&url).bearer_auth(self.access_token.expose_secret()))
            .await
    }
}

pub(crate) fn transport_error(error: reqwest::Error) -> StoreError {
    if error.is_timeout() || error.is_connect() {
        StoreError::Transient(format!("request transport failure: {error}"))
    } else {
        StoreError::Fatal(format!("request failure: {error}"))
    }
}

pub(crate) fn classify_status(status: StatusCode, body: &str) -> StoreError {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        StoreError::Transient(format!("remote store returned {status}"))
    } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        StoreError::Fatal(format!("remote store rejected credentials ({status})"))
    } else {
        StoreError::Fatal(format!("remote store returned {status}: {body}"))
    }
}

#[derive(Debug, Serialize)]
struct ObjectWrite {
    properties: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest {
    filter_groups: Vec<FilterGroup>,
    properties: Vec<String>,
    limit: u32,
}

#[derive(Debug, Serialize)]
struct FilterGroup {
    filters: Vec<Filter>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Filter {
    property_name: String,
    operator: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    values: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<RemoteDeal>,
}

#[derive(Debug, Deserialize)]
struct RemoteDeal {
    id: String,
    #[serde(default)]
    properties: HashMap<String, Option<String>>,
}

#[derive(Debug, Deserialize)]
struct CreateResponse {
    id: String,
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use dealbridge_core::config::{CrmConfig, StageCodes};
    use dealbridge_core::DealStage;
    use reqwest::StatusCode;
    use serde_json::json;

    use super::{classify_status, Filter, FilterGroup, HubSpotStore, RemoteDeal, SearchRequest};
    use crate::errors::StoreError;

    fn test_config() -> CrmConfig {
        CrmConfig {
            base_url: "https://crm.test".to_string(),
            access_token: "pat-na1-test".to_string().into(),
            request_timeout_secs: 5,
            identity_property: "manychat_psid".to_string(),
            pipeline: "default".to_string(),
            contact_email_domain: "dealbridge.chat".to_string(),
            stage_codes: StageCodes::default(),
        }
    }

    #[test]
    fn search_request_serializes_with_camel_case_wire_names() {
        let request = SearchRequest {
            filter_groups: vec![FilterGroup {
                filters: vec![Filter {
                    property_name: "manychat_psid".to_string(),
                    operator: "EQ",
                    value: Some("U1".to_string()),
                    values: None,
                }],
            }],
            properties: vec!["dealname".to_string()],
            limit: 10,
        };

        let encoded = serde_json::to_value(&request).expect("serialize");
        assert_eq!(
            encoded,
            json!({
                "filterGroups": [
                    { "filters": [{ "propertyName": "manychat_psid", "operator": "EQ", "value": "U1" }] }
                ],
                "properties": ["dealname"],
                "limit": 10,
            })
        );
    }

    #[test]
    fn rate_limit_and_server_errors_classify_as_transient() {
        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS, "").is_transient());
        assert!(classify_status(StatusCode::BAD_GATEWAY, "").is_transient());
        assert!(classify_status(StatusCode::INTERNAL_SERVER_ERROR, "").is_transient());
    }

    #[test]
    fn auth_failures_classify_as_fatal() {
        assert!(matches!(classify_status(StatusCode::UNAUTHORIZED, ""), StoreError::Fatal(_)));
        assert!(matches!(classify_status(StatusCode::FORBIDDEN, ""), StoreError::Fatal(_)));
        assert!(matches!(classify_status(StatusCode::BAD_REQUEST, "oops"), StoreError::Fatal(_)));
    }

    #[test]
    fn remote_deal_maps_to_a_record_through_configured_stage_codes() {
        let store = HubSpotStore::new(&test_config()).expect("store");

        let mut properties: HashMap<String, Option<String>> = HashMap::new();
        properties.insert("dealname".to_string(), Some("Botox [U1]".to_string()));
        properties.insert("dealstage".to_string(), Some("appointmentscheduled".to_string()));
        properties.insert("treatment_type".to_string(), Some("Botox".to_string()));

        let record = store
            .record_from_remote(RemoteDeal { id: "101".to_string(), properties })
            .expect("record");

        assert_eq!(record.id.0, "101");
        assert_eq!(record.stage, DealStage::Scheduled);
        assert_eq!(record.subject.as_deref(), Some("Botox"));
    }

    #[test]
    fn unknown_stage_codes_are_dropped_from_search_results() {
        let store = HubSpotStore::new(&test_config()).expect("store");

        let mut properties: HashMap<String, Option<String>> = HashMap::new();
        properties.insert("dealstage".to_string(), Some("someone_elses_stage".to_string()));

        assert!(store
            .record_from_remote(RemoteDeal { id: "102".to_string(), properties })
            .is_none());
    }
}
