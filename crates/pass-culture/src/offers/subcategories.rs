//! Static catalogue of offer subcategories.

use serde::Serialize;

pub type SubcategoryId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Subcategory {
    pub id: &'static str,
    pub label: &'static str,
    pub is_event: bool,
    /// Free stocks are allowed only for some subcategories.
    pub can_be_free: bool,
}

pub const ALL_SUBCATEGORIES: &[Subcategory] = &[
    Subcategory {
        id: "LIVRE_PAPIER",
        label: "Livre papier",
        is_event: false,
        can_be_free: false,
    },
    Subcategory {
        id: "LIVRE_NUMERIQUE",
        label: "Livre numérique, e-book",
        is_event: false,
        can_be_free: false,
    },
    Subcategory {
        id: "SUPPORT_PHYSIQUE_MUSIQUE_CD",
        label: "CD",
        is_event: false,
        can_be_free: false,
    },
    Subcategory {
        id: "ABO_PLATEFORME_MUSIQUE",
        label: "Abonnement plateforme musicale",
        is_event: false,
        can_be_free: false,
    },
    Subcategory {
        id: "SEANCE_CINE",
        label: "Séance de cinéma",
        is_event: true,
        can_be_free: false,
    },
    Subcategory {
        id: "CARTE_CINE_ILLIMITE",
        label: "Carte cinéma illimité",
        is_event: false,
        can_be_free: false,
    },
    Subcategory {
        id: "CONCERT",
        label: "Concert",
        is_event: true,
        can_be_free: true,
    },
    Subcategory {
        id: "FESTIVAL_MUSIQUE",
        label: "Festival de musique",
        is_event: true,
        can_be_free: true,
    },
    Subcategory {
        id: "SPECTACLE_REPRESENTATION",
        label: "Spectacle, représentation",
        is_event: true,
        can_be_free: true,
    },
    Subcategory {
        id: "VISITE",
        label: "Visite",
        is_event: false,
        can_be_free: true,
    },
    Subcategory {
        id: "VISITE_GUIDEE",
        label: "Visite guidée",
        is_event: true,
        can_be_free: true,
    },
    Subcategory {
        id: "ATELIER_PRATIQUE_ART",
        label: "Atelier, stage de pratique artistique",
        is_event: true,
        can_be_free: true,
    },
    Subcategory {
        id: "CONFERENCE",
        label: "Conférence",
        is_event: true,
        can_be_free: true,
    },
    Subcategory {
        id: "INSTRUMENT",
        label: "Instrument de musique",
        is_event: false,
        can_be_free: false,
    },
    Subcategory {
        id: "ACTIVATION_THING",
        label: "Activation d'un bien",
        is_event: false,
        can_be_free: true,
    },
];

pub fn find_subcategory(id: &str) -> Option<&'static Subcategory> {
    ALL_SUBCATEGORIES.iter().find(|subcategory| subcategory.id == id)
}

pub fn is_known_subcategory(id: &str) -> bool {
    find_subcategory(id).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        for (index, subcategory) in ALL_SUBCATEGORIES.iter().enumerate() {
            assert!(ALL_SUBCATEGORIES[index + 1..]
                .iter()
                .all(|other| other.id != subcategory.id));
        }
    }

    #[test]
    fn lookup_by_id() {
        assert!(find_subcategory("SEANCE_CINE").map(|s| s.is_event).unwrap_or(false));
        assert!(!is_known_subcategory("UNKNOWN"));
    }
}
