use serde::{Deserialize, Serialize};

/// Fixed set of intent categories the extractor can emit. A message that
/// matches none of them produces an `Intent` with `category: None`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentCategory {
    Schedule,
    Inquire,
    Pay,
    Cancel,
    Urgent,
}

impl IntentCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Schedule => "schedule",
            Self::Inquire => "inquire",
            Self::Pay => "pay",
            Self::Cancel => "cancel",
            Self::Urgent => "urgent",
        }
    }
}

impl std::fmt::Display for IntentCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured view of one inbound message. Produced by the extractor,
/// immutable once received.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    pub category: Option<IntentCategory>,
    /// Free-form topic label (the treatment the user is asking about).
    pub subject: Option<String>,
    pub contact_phone: Option<String>,
    pub scheduled_date: Option<String>,
    pub scheduled_time: Option<String>,
    pub raw_message: String,
}

impl Intent {
    pub fn is_cancel(&self) -> bool {
        self.category == Some(IntentCategory::Cancel)
    }
}
