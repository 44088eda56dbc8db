//! Contact (lead) resolution. Runs before reconciliation; the resulting
//! contact id is a precondition for touching any deal record.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use dealbridge_core::config::CrmConfig;
use dealbridge_core::{Intent, IntentCategory, UserIdentity};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::StoreError;
use crate::hubspot::{classify_status, transport_error};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContactId(pub String);

impl std::fmt::Display for ContactId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Upserts the sender as a CRM contact and returns its id.
#[async_trait]
pub trait ContactResolver: Send + Sync {
    async fn resolve(
        &self,
        identity: &UserIdentity,
        display_name: Option<&str>,
        intent: &Intent,
    ) -> Result<ContactId, StoreError>;
}

/// Lead status label recorded on the contact for each intent category.
pub fn lead_status(category: Option<IntentCategory>) -> &'static str {
    match category {
        Some(IntentCategory::Schedule) => "espera cita",
        Some(IntentCategory::Inquire) => "informado",
        Some(IntentCategory::Pay) => "listo para pagar",
        Some(IntentCategory::Cancel) => "cancelacion",
        Some(IntentCategory::Urgent) => "urgente",
        None => "nuevo lead",
    }
}

pub struct HubSpotContacts {
    client: reqwest::Client,
    base_url: String,
    access_token: SecretString,
    email_domain: String,
}

impl HubSpotContacts {
    pub fn new(config: &CrmConfig) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|error| StoreError::Fatal(format!("http client construction: {error}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            access_token: config.access_token.clone(),
            email_domain: config.contact_email_domain.clone(),
        })
    }

    /// Deterministic per-identity email; the stable lookup key for the
    /// contact, independent of the search index's identity property.
    fn email_for(&self, identity: &UserIdentity) -> String {
        format!("{}@{}", identity.0, self.email_domain)
    }

    fn contact_properties(
        &self,
        intent: &Intent,
        display_name: Option<&str>,
        new_contact: bool,
    ) -> HashMap<String, String> {
        let mut properties = HashMap::new();
        properties.insert("hs_lead_status".to_string(), lead_status(intent.category).to_string());

        if let Some(phone) = intent.contact_phone.as_deref().filter(|phone| phone.len() >= 10) {
            properties.insert("phone".to_string(), phone.to_string());
        }
        if let Some(subject) = &intent.subject {
            properties.insert("treatment_interest".to_string(), subject.clone());
        }
        if new_contact {
            properties.insert(
                "firstname".to_string(),
                display_name.unwrap_or("Messenger user").to_string(),
            );
            properties.insert("lifecyclestage".to_string(), "lead".to_string());
        }

        properties
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<ContactId>, StoreError> {
        let request = ContactSearchRequest {
            filter_groups: vec![ContactFilterGroup {
                filters: vec![ContactFilter {
                    property_name: "email",
                    operator: "EQ",
                    value: email.to_string(),
                }],
            }],
            properties: vec!["email", "firstname", "phone", "hs_lead_status"],
            limit: 1,
        };

        let url = format!("{}/crm/v3/objects/contacts/search", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(self.access_token.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let parsed: ContactSearchResponse = response
            .json()
            .await
            .map_err(|error| StoreError::Fatal(format!("malformed response body: {error}")))?;
        Ok(parsed.results.into_iter().next().map(|contact| ContactId(contact.id)))
    }

    async fn write_contact(
        &self,
        existing: Option<&ContactId>,
        properties: HashMap<String, String>,
    ) -> Result<ContactId, StoreError> {
        let request = match existing {
            Some(id) => {
                let url = format!("{}/crm/v3/objects/contacts/{}", self.base_url, id.0);
                self.client.patch(&url)
            }
            None => {
                let url = format!("{}/crm/v3/objects/contacts", self.base_url);
                self.client.post(&url)
            }
        };

        let response = request
            .bearer_auth(self.access_token.expose_secret())
            .json(&ContactWrite { properties })
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        match existing {
            Some(id) => Ok(id.clone()),
            None => {
                let created: ContactCreateResponse = response.json().await.map_err(|error| {
                    StoreError::Fatal(format!("malformed response body: {error}"))
                })?;
                Ok(ContactId(created.id))
            }
        }
    }
}

#[async_trait]
impl ContactResolver for HubSpotContacts {
    async fn resolve(
        &self,
        identity: &UserIdentity,
        display_name: Option<&str>,
        intent: &Intent,
    ) -> Result<ContactId, StoreError> {
        let email = self.email_for(identity);
        let existing = self.find_by_email(&email).await?;
        let new_contact = existing.is_none();

        let mut properties = self.contact_properties(intent, display_name, new_contact);
        if new_contact {
            properties.insert("email".to_string(), email.clone());
        }

        let contact_id = self.write_contact(existing.as_ref(), properties).await?;
        info!(
            event_name = "crm.contact.resolved",
            identity = %identity,
            contact_id = %contact_id,
            created = new_contact,
            "contact upsert completed"
        );
        Ok(contact_id)
    }
}

#[derive(Debug, Serialize)]
struct ContactWrite {
    properties: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ContactSearchRequest {
    filter_groups: Vec<ContactFilterGroup>,
    properties: Vec<&'static str>,
    limit: u32,
}

#[derive(Debug, Serialize)]
struct ContactFilterGroup {
    filters: Vec<ContactFilter>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ContactFilter {
    property_name: &'static str,
    operator: &'static str,
    value: String,
}

#[derive(Debug, Deserialize)]
struct ContactSearchResponse {
    #[serde(default)]
    results: Vec<RemoteContact>,
}

#[derive(Debug, Deserialize)]
struct RemoteContact {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ContactCreateResponse {
    id: String,
}

#[cfg(test)]
mod tests {
    use dealbridge_core::config::{CrmConfig, StageCodes};
    use dealbridge_core::{Intent, IntentCategory, UserIdentity};

    use super::{lead_status, HubSpotContacts};

    fn test_config() -> CrmConfig {
        CrmConfig {
            base_url: "https://crm.test/".to_string(),
            access_token: "pat-na1-test".to_string().into(),
            request_timeout_secs: 5,
            identity_property: "manychat_psid".to_string(),
            pipeline: "default".to_string(),
            contact_email_domain: "dealbridge.chat".to_string(),
            stage_codes: StageCodes::default(),
        }
    }

    fn intent(category: Option<IntentCategory>) -> Intent {
        Intent {
            category,
            subject: Some("Botox".to_string()),
            contact_phone: Some("5551234567".to_string()),
            scheduled_date: None,
            scheduled_time: None,
            raw_message: "quiero una cita para botox".to_string(),
        }
    }

    #[test]
    fn lead_status_covers_every_category() {
        assert_eq!(lead_status(Some(IntentCategory::Schedule)), "espera cita");
        assert_eq!(lead_status(Some(IntentCategory::Pay)), "listo para pagar");
        assert_eq!(lead_status(Some(IntentCategory::Cancel)), "cancelacion");
        assert_eq!(lead_status(Some(IntentCategory::Urgent)), "urgente");
        assert_eq!(lead_status(Some(IntentCategory::Inquire)), "informado");
        assert_eq!(lead_status(None), "nuevo lead");
    }

    #[test]
    fn contact_email_is_deterministic_per_identity() {
        let contacts = HubSpotContacts::new(&test_config()).expect("contacts");
        let email = contacts.email_for(&UserIdentity::new("psid-123"));
        assert_eq!(email, "psid-123@dealbridge.chat");
    }

    #[test]
    fn new_contacts_carry_lifecycle_and_name_fields() {
        let contacts = HubSpotContacts::new(&test_config()).expect("contacts");
        let properties = contacts.contact_properties(
            &intent(Some(IntentCategory::Schedule)),
            Some("Ana López"),
            true,
        );

        assert_eq!(properties.get("firstname").map(String::as_str), Some("Ana López"));
        assert_eq!(properties.get("lifecyclestage").map(String::as_str), Some("lead"));
        assert_eq!(properties.get("hs_lead_status").map(String::as_str), Some("espera cita"));
        assert_eq!(properties.get("phone").map(String::as_str), Some("5551234567"));
        assert_eq!(properties.get("treatment_interest").map(String::as_str), Some("Botox"));
    }

    #[test]
    fn updates_never_overwrite_name_or_lifecycle() {
        let contacts = HubSpotContacts::new(&test_config()).expect("contacts");
        let properties =
            contacts.contact_properties(&intent(Some(IntentCategory::Pay)), Some("Ana"), false);

        assert!(!properties.contains_key("firstname"));
        assert!(!properties.contains_key("lifecyclestage"));
        assert_eq!(properties.get("hs_lead_status").map(String::as_str), Some("listo para pagar"));
    }

    #[test]
    fn short_phone_numbers_are_not_written() {
        let contacts = HubSpotContacts::new(&test_config()).expect("contacts");
        let mut short_phone = intent(None);
        short_phone.contact_phone = Some("12345".to_string());

        let properties = contacts.contact_properties(&short_phone, None, false);
        assert!(!properties.contains_key("phone"));
    }
}
