//! Lead quality scoring over an extracted intent. Feeds the contact's lead
//! status note and the deal description; never feeds reconciliation logic.

use dealbridge_core::{Intent, IntentCategory};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadQuality {
    High,
    Medium,
    Low,
}

impl LeadQuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    pub fn for_score(score: u32) -> Self {
        match score {
            50.. => Self::High,
            25.. => Self::Medium,
            _ => Self::Low,
        }
    }
}

/// Additive factors; a cancellation pulls the score down hard. Floored at 0.
pub fn lead_score(intent: &Intent) -> u32 {
    let mut score: i32 = 0;

    if intent.contact_phone.is_some() {
        score += 20;
    }
    if intent.subject.is_some() {
        score += 15;
    }
    if intent.scheduled_date.is_some() {
        score += 10;
    }
    if intent.scheduled_time.is_some() {
        score += 5;
    }
    match intent.category {
        Some(IntentCategory::Urgent) => score += 25,
        Some(IntentCategory::Schedule) => score += 20,
        Some(IntentCategory::Cancel) => score -= 50,
        _ => {}
    }

    score.max(0) as u32
}

#[cfg(test)]
mod tests {
    use dealbridge_core::{Intent, IntentCategory};

    use super::{lead_score, LeadQuality};

    fn intent(category: Option<IntentCategory>) -> Intent {
        Intent {
            category,
            subject: None,
            contact_phone: None,
            scheduled_date: None,
            scheduled_time: None,
            raw_message: String::new(),
        }
    }

    #[test]
    fn complete_appointment_request_scores_high() {
        let mut complete = intent(Some(IntentCategory::Schedule));
        complete.subject = Some("Botox".to_string());
        complete.contact_phone = Some("5551234567".to_string());
        complete.scheduled_date = Some("mañana".to_string());
        complete.scheduled_time = Some("10:00".to_string());

        let score = lead_score(&complete);
        assert_eq!(score, 70);
        assert_eq!(LeadQuality::for_score(score), LeadQuality::High);
    }

    #[test]
    fn cancellation_is_floored_at_zero() {
        let score = lead_score(&intent(Some(IntentCategory::Cancel)));
        assert_eq!(score, 0);
        assert_eq!(LeadQuality::for_score(score), LeadQuality::Low);
    }

    #[test]
    fn bare_inquiry_scores_low() {
        let mut inquiry = intent(Some(IntentCategory::Inquire));
        inquiry.subject = Some("Lifting".to_string());

        let score = lead_score(&inquiry);
        assert_eq!(score, 15);
        assert_eq!(LeadQuality::for_score(score), LeadQuality::Low);
    }

    #[test]
    fn urgent_with_phone_is_medium() {
        let mut urgent = intent(Some(IntentCategory::Urgent));
        urgent.contact_phone = Some("5551234567".to_string());

        let score = lead_score(&urgent);
        assert_eq!(score, 45);
        assert_eq!(LeadQuality::for_score(score), LeadQuality::Medium);
    }
}
