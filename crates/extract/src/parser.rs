use dealbridge_core::{Intent, IntentCategory};

use crate::lexicon::{treatment_for_message, Treatment};

/// Turns a raw chat message into a structured `Intent`. Stateless and
/// deterministic: the same message always parses the same way.
#[derive(Clone, Debug, Default)]
pub struct MessageParser;

impl MessageParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, raw_message: &str) -> Intent {
        let normalized_text = normalize_text(raw_message);
        if normalized_text.trim().is_empty() {
            return Intent {
                category: None,
                subject: None,
                contact_phone: None,
                scheduled_date: None,
                scheduled_time: None,
                raw_message: raw_message.to_string(),
            };
        }

        let tokens = tokenize(&normalized_text);

        Intent {
            category: detect_category(&normalized_text),
            subject: treatment_for_message(&normalized_text)
                .map(|treatment| treatment.display.to_string()),
            contact_phone: extract_phone(raw_message),
            scheduled_date: extract_date(&normalized_text, &tokens),
            scheduled_time: extract_time(&tokens),
            raw_message: raw_message.to_string(),
        }
    }

    /// Catalog entry behind the parsed subject, for price hints.
    pub fn treatment(&self, raw_message: &str) -> Option<&'static Treatment> {
        treatment_for_message(&normalize_text(raw_message))
    }
}

struct CategoryKeywords {
    category: IntentCategory,
    weight: u32,
    keywords: &'static [&'static str],
}

/// Entries are ordered by priority; on a score tie the earlier entry wins,
/// which is the one documented tie-break rule.
const CATEGORY_KEYWORDS: &[CategoryKeywords] = &[
    CategoryKeywords {
        category: IntentCategory::Urgent,
        weight: 8,
        keywords: &[
            "urgente",
            "urgent",
            "emergencia",
            "emergency",
            "dolor",
            "inflamacion",
            "inflamación",
            "complicacion",
            "complicación",
            "reaccion",
            "reacción",
        ],
    },
    CategoryKeywords {
        category: IntentCategory::Cancel,
        weight: 6,
        keywords: &[
            "cancelar",
            "cancel",
            "anular",
            "no puedo ir",
            "no voy",
            "cambiar fecha",
            "posponer",
            "reagendar",
            "ya no quiero",
            "me arrepenti",
            "me arrepentí",
        ],
    },
    CategoryKeywords {
        category: IntentCategory::Pay,
        weight: 5,
        keywords: &[
            "pagar",
            "pago",
            "deposito",
            "depósito",
            "anticipo",
            "transferencia",
            "tarjeta",
            "mensualidades",
            "financiamiento",
            "apartar con",
        ],
    },
    CategoryKeywords {
        category: IntentCategory::Schedule,
        weight: 4,
        keywords: &[
            "cita",
            "agendar",
            "apartar",
            "reservar",
            "programar",
            "consulta",
            "valoracion",
            "valoración",
            "disponibilidad",
            "horario",
            "appointment",
            "schedule",
        ],
    },
    CategoryKeywords {
        category: IntentCategory::Inquire,
        weight: 2,
        keywords: &[
            "precio",
            "costo",
            "cuanto",
            "cuánto",
            "informacion",
            "información",
            "info",
            "detalles",
            "me interesa",
            "quisiera saber",
            "quiero saber",
            "que incluye",
            "qué incluye",
            "en que consiste",
            "en qué consiste",
            "price",
            "cost",
        ],
    },
];

/// Weighted keyword scoring: each matched keyword adds its category weight;
/// the highest total wins.
fn detect_category(normalized_text: &str) -> Option<IntentCategory> {
    let mut best: Option<(IntentCategory, u32)> = None;

    for entry in CATEGORY_KEYWORDS {
        let matched = entry
            .keywords
            .iter()
            .filter(|keyword| normalized_text.contains(*keyword))
            .count() as u32;
        let score = matched * entry.weight;
        if score == 0 {
            continue;
        }
        if best.map(|(_, best_score)| score > best_score).unwrap_or(true) {
            best = Some((entry.category, score));
        }
    }

    best.map(|(category, _)| category)
}

fn normalize_text(text: &str) -> String {
    text.to_lowercase()
}

fn tokenize(normalized_text: &str) -> Vec<String> {
    normalized_text
        .split_whitespace()
        .map(|token| {
            token
                .trim_matches(|ch: char| matches!(ch, ',' | '!' | '?' | ';' | '¿' | '¡'))
                .to_string()
        })
        .filter(|token| !token.is_empty())
        .collect()
}

/// Collects digit runs (separators allowed inside a run) and keeps the first
/// plausible phone number. A Mexican country prefix is stripped down to the
/// 10-digit national number.
fn extract_phone(raw_message: &str) -> Option<String> {
    let mut runs: Vec<String> = Vec::new();
    let mut current = String::new();

    for ch in raw_message.chars() {
        if ch.is_ascii_digit() {
            current.push(ch);
        } else if matches!(ch, ' ' | '-' | '(' | ')' | '.') {
            // separator inside a number run; the run ends on any other char
        } else if !current.is_empty() {
            runs.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        runs.push(current);
    }

    runs.into_iter().find(|digits| (10..=15).contains(&digits.len())).map(|digits| {
        if digits.len() == 12 && digits.starts_with("52") {
            digits[2..].to_string()
        } else {
            digits
        }
    })
}

const WEEKDAYS: &[&str] =
    &["lunes", "martes", "miércoles", "miercoles", "jueves", "viernes", "sábado", "sabado", "domingo"];

const MONTHS: &[&str] = &[
    "enero",
    "febrero",
    "marzo",
    "abril",
    "mayo",
    "junio",
    "julio",
    "agosto",
    "septiembre",
    "octubre",
    "noviembre",
    "diciembre",
];

fn extract_date(normalized_text: &str, tokens: &[String]) -> Option<String> {
    // Relative phrases first; "pasado mañana" must win over plain "mañana".
    for phrase in ["pasado mañana", "hoy", "mañana"] {
        if normalized_text.contains(phrase) {
            return Some(phrase.to_string());
        }
    }

    if let Some(weekday) = WEEKDAYS.iter().find(|day| normalized_text.contains(*day)) {
        return Some((*weekday).to_string());
    }

    // "12 de mayo" style.
    for window in tokens.windows(3) {
        if let [day, connector, month] = window {
            let day_number = day.parse::<u32>().ok().filter(|value| (1..=31).contains(value));
            let is_connector = connector == "de" || connector == "del";
            if day_number.is_some() && is_connector && MONTHS.contains(&month.as_str()) {
                return Some(format!("{day} de {month}"));
            }
        }
    }

    // Numeric d/m or d-m (optionally with a year).
    tokens
        .iter()
        .find(|token| {
            let separator = if token.contains('/') { '/' } else { '-' };
            let parts: Vec<&str> = token.split(separator).collect();
            if !(2..=3).contains(&parts.len()) {
                return false;
            }
            let day = parts[0].parse::<u32>().ok();
            let month = parts[1].parse::<u32>().ok();
            matches!((day, month), (Some(d), Some(m)) if (1..=31).contains(&d) && (1..=12).contains(&m))
        })
        .cloned()
}

fn is_meridiem(token: &str) -> bool {
    matches!(token.trim_end_matches('.'), "am" | "pm" | "a.m" | "p.m")
}

fn extract_time(tokens: &[String]) -> Option<String> {
    for (index, token) in tokens.iter().enumerate() {
        if let Some((hours, minutes)) = token.split_once(':') {
            let hour_ok = hours.parse::<u32>().map(|h| h <= 23).unwrap_or(false);
            let minute_ok = minutes.parse::<u32>().map(|m| m <= 59).unwrap_or(false);
            if hour_ok && minute_ok {
                let suffix = tokens.get(index + 1).filter(|next| is_meridiem(next));
                return Some(match suffix {
                    Some(suffix) => format!("{token} {}", suffix.trim_end_matches('.')),
                    None => token.clone(),
                });
            }
        }

        // "10am" glued together.
        if token.len() > 2 && token.is_char_boundary(token.len() - 2) {
            let (head, tail) = token.split_at(token.len() - 2);
            if is_meridiem(tail) && head.parse::<u32>().map(|h| (1..=12).contains(&h)).unwrap_or(false)
            {
                return Some(format!("{head} {tail}"));
            }
        }

        // "10 am" as separate tokens.
        if token.parse::<u32>().map(|h| (1..=12).contains(&h)).unwrap_or(false) {
            if let Some(next) = tokens.get(index + 1) {
                if is_meridiem(next) {
                    return Some(format!("{token} {}", next.trim_end_matches('.')));
                }
            }
        }
    }

    for special in ["mediodía", "mediodia", "medianoche"] {
        if tokens.iter().any(|token| token == special) {
            return Some(special.to_string());
        }
    }

    None
}
