//! Majority-script language detection.
//!
//! Counts code points per script and picks the script whose share of all
//! script-classified characters is at least 60%. Ties break in declaration
//! order he > ru > ar > en. Anything else is `unknown`. This runs before any
//! classifier and its value overrides later stage hints for prompt-language
//! selection only.

use crate::types::QueryLanguage;

const MAJORITY_SHARE: f64 = 0.60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Script {
    Hebrew,
    Cyrillic,
    Arabic,
    Latin,
}

fn classify(c: char) -> Option<Script> {
    match c as u32 {
        0x0590..=0x05FF => Some(Script::Hebrew),
        0x0400..=0x04FF | 0x0500..=0x052F => Some(Script::Cyrillic),
        0x0600..=0x06FF | 0x0750..=0x077F => Some(Script::Arabic),
        _ if c.is_ascii_alphabetic() => Some(Script::Latin),
        0x00C0..=0x024F => Some(Script::Latin),
        _ => None,
    }
}

pub fn detect_language(query: &str) -> QueryLanguage {
    let lowered = query.to_lowercase();

    let mut hebrew = 0usize;
    let mut cyrillic = 0usize;
    let mut arabic = 0usize;
    let mut latin = 0usize;

    for c in lowered.chars() {
        match classify(c) {
            Some(Script::Hebrew) => hebrew += 1,
            Some(Script::Cyrillic) => cyrillic += 1,
            Some(Script::Arabic) => arabic += 1,
            Some(Script::Latin) => latin += 1,
            None => {}
        }
    }

    let total = hebrew + cyrillic + arabic + latin;
    if total == 0 {
        return QueryLanguage::Unknown;
    }

    // Declaration order is the tie-break: he > ru > ar > en.
    let candidates = [
        (hebrew, QueryLanguage::He),
        (cyrillic, QueryLanguage::Ru),
        (arabic, QueryLanguage::Ar),
        (latin, QueryLanguage::En),
    ];

    for (count, language) in candidates {
        if count as f64 / total as f64 >= MAJORITY_SHARE {
            return language;
        }
    }

    QueryLanguage::Unknown
}
