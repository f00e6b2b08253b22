//! Localized assist messages. Hebrew when the resolved UI language is
//! Hebrew, English otherwise. No stack traces, ever.

use platefinder_common::types::UiLanguage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    StopNonFood,
    AskClarify,
    AskLocation,
    AskCity,
    QueryTooShort,
    Recover,
}

pub fn assist_message(kind: MessageKind, language: UiLanguage) -> &'static str {
    match (kind, language) {
        (MessageKind::StopNonFood, UiLanguage::En) => {
            "I can only help with finding restaurants and food. Try asking about a place to eat."
        }
        (MessageKind::StopNonFood, UiLanguage::He) => {
            "אני יכול לעזור רק בחיפוש מסעדות ואוכל. נסו לשאול על מקום לאכול בו."
        }
        (MessageKind::AskClarify, UiLanguage::En) => {
            "I need one more detail to search properly."
        }
        (MessageKind::AskClarify, UiLanguage::He) => "אני צריך עוד פרט אחד כדי לחפש כמו שצריך.",
        (MessageKind::AskLocation, UiLanguage::En) => {
            "To find places near you I need your location."
        }
        (MessageKind::AskLocation, UiLanguage::He) => {
            "כדי למצוא מקומות קרובים אליך אני צריך את המיקום שלך."
        }
        (MessageKind::AskCity, UiLanguage::En) => {
            "Which city should I search in?"
        }
        (MessageKind::AskCity, UiLanguage::He) => "באיזו עיר לחפש?",
        (MessageKind::QueryTooShort, UiLanguage::En) => {
            "Could you say a bit more about what you're looking for?"
        }
        (MessageKind::QueryTooShort, UiLanguage::He) => {
            "אפשר לפרט קצת יותר מה אתם מחפשים?"
        }
        (MessageKind::Recover, UiLanguage::En) => {
            "Something went wrong while searching. Please try again in a moment."
        }
        (MessageKind::Recover, UiLanguage::He) => {
            "משהו השתבש בזמן החיפוש. נסו שוב עוד רגע."
        }
    }
}

/// The follow-up question attached to clarify responses.
pub fn clarify_question(kind: MessageKind, language: UiLanguage) -> &'static str {
    match (kind, language) {
        (MessageKind::AskLocation, UiLanguage::En) => {
            "Can you share your location, or name a city instead?"
        }
        (MessageKind::AskLocation, UiLanguage::He) => "אפשר לשתף מיקום, או לציין שם של עיר?",
        (MessageKind::AskCity, UiLanguage::En) => "Which city should I search in?",
        (MessageKind::AskCity, UiLanguage::He) => "באיזו עיר לחפש?",
        (_, UiLanguage::En) => "What exactly are you looking for?",
        (_, UiLanguage::He) => "מה בדיוק אתם מחפשים?",
    }
}

/// Short disambiguation choices for the AskCity clarify, localized and
/// region-aware. Only the home market gets a curated list.
pub fn city_choices(region: &str, language: UiLanguage) -> Vec<String> {
    let cities: &[&str] = match (region, language) {
        ("IL", UiLanguage::He) => &["תל אביב", "ירושלים", "חיפה", "באר שבע"],
        ("IL", UiLanguage::En) => &["Tel Aviv", "Jerusalem", "Haifa", "Beer Sheva"],
        _ => &[],
    };
    cities.iter().map(|c| c.to_string()).collect()
}
