//! Treatment catalog: the subjects a deal can be opened for, with the
//! spelling variations patients actually type (Spanish and English mixed).

use rust_decimal::Decimal;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Treatment {
    pub key: &'static str,
    pub display: &'static str,
    pub variations: &'static [&'static str],
    /// Midpoint of the typical price band, in MXN. Seeds the deal amount.
    pub typical_amount_mxn: i64,
}

impl Treatment {
    pub fn typical_amount(&self) -> Decimal {
        Decimal::from(self.typical_amount_mxn)
    }
}

/// Catalog scan order is the deterministic tie-break when a message mentions
/// several treatments: the first catalog entry with a matching variation wins.
pub const TREATMENTS: &[Treatment] = &[
    Treatment {
        key: "botox",
        display: "Botox",
        variations: &["botox", "bótox", "toxina botulinica", "toxina botulínica", "botulinum"],
        typical_amount_mxn: 5500,
    },
    Treatment {
        key: "rellenos",
        display: "Rellenos",
        variations: &[
            "relleno",
            "rellenos",
            "acido hialuronico",
            "ácido hialurónico",
            "filler",
            "fillers",
        ],
        typical_amount_mxn: 8000,
    },
    Treatment {
        key: "rinoplastia",
        display: "Rinoplastia",
        variations: &["rinoplastia", "nose job", "cirugia de nariz", "cirugía de nariz", "nariz"],
        typical_amount_mxn: 115_000,
    },
    Treatment {
        key: "liposuccion",
        display: "Liposucción",
        variations: &["liposucción", "liposuccion", "lipoescultura", "lipo"],
        typical_amount_mxn: 90_000,
    },
    Treatment {
        key: "aumento_senos",
        display: "Aumento de senos",
        variations: &[
            "aumento de senos",
            "aumento de busto",
            "aumento mamario",
            "implantes mamarios",
            "implantes",
            "mamoplastia",
            "breast augmentation",
        ],
        typical_amount_mxn: 115_000,
    },
    Treatment {
        key: "depilacion_laser",
        display: "Depilación láser",
        variations: &[
            "depilación láser",
            "depilacion laser",
            "laser hair removal",
            "quitar vello",
            "eliminar vello",
            "láser",
            "laser",
        ],
        typical_amount_mxn: 8500,
    },
    Treatment {
        key: "lifting",
        display: "Lifting",
        variations: &["lifting", "facelift", "estiramiento facial", "rejuvenecimiento facial"],
        typical_amount_mxn: 185_000,
    },
    Treatment {
        key: "tratamiento_facial",
        display: "Tratamiento facial",
        variations: &[
            "limpieza facial",
            "peeling",
            "hidrafacial",
            "microdermoabrasion",
            "microdermoabrasión",
            "radiofrecuencia",
            "facial",
        ],
        typical_amount_mxn: 1900,
    },
];

/// First catalog entry with a variation contained in the normalized message.
pub fn treatment_for_message(normalized_text: &str) -> Option<&'static Treatment> {
    TREATMENTS.iter().find(|treatment| {
        treatment.variations.iter().any(|variation| normalized_text.contains(variation))
    })
}

#[cfg(test)]
mod tests {
    use super::treatment_for_message;

    #[test]
    fn finds_a_treatment_by_any_variation() {
        let hit = treatment_for_message("quiero informacion de toxina botulinica").expect("hit");
        assert_eq!(hit.key, "botox");

        let hit = treatment_for_message("me interesa la lipo").expect("hit");
        assert_eq!(hit.key, "liposuccion");
    }

    #[test]
    fn catalog_order_breaks_multi_treatment_ties() {
        // Both botox and laser appear; botox is earlier in the catalog.
        let hit = treatment_for_message("precio de botox y laser").expect("hit");
        assert_eq!(hit.key, "botox");
    }

    #[test]
    fn unknown_topics_match_nothing() {
        assert!(treatment_for_message("hola, buenos dias").is_none());
    }
}
