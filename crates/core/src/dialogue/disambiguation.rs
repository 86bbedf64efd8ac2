//! Menu reference disambiguation
//!
//! Narrows an underspecified reference ("something spicy") down to a single
//! catalog item over one or more turns. Everything here is a pure function of
//! the menu, the current candidate list and the caller's selection; the
//! attempt budget is enforced by the dialogue engine.

use crate::dialogue::extractor::CandidateSelection;
use crate::domain::menu::MenuItem;

/// Words that never narrow a search.
const FILLER_WORDS: &[&str] = &[
    "a", "an", "the", "one", "ones", "some", "something", "anything", "dish", "please", "i",
    "i'd", "id", "like", "want", "would", "could", "get", "have", "me", "with", "and", "of",
    "that", "this", "is", "it", "thing", "kind", "sort", "maybe", "um", "uh",
];

/// Result of applying a caller's selection to the candidate list.
#[derive(Clone, Debug, PartialEq)]
pub enum Resolution {
    /// Exactly one item remains.
    Resolved(MenuItem),
    /// The list shrank but still holds more than one item.
    Narrowed(Vec<MenuItem>),
    /// Nothing on the menu matches the description.
    NoMatch,
    /// The selection did not shrink the list.
    NoProgress,
}

/// Lowercased descriptor tokens with filler words removed.
pub fn descriptor_tokens(text: &str) -> Vec<String> {
    text.split(|ch: char| !ch.is_alphanumeric() && ch != '-' && ch != '\'')
        .map(|token| token.trim_matches(|ch: char| ch == '-' || ch == '\'').to_ascii_lowercase())
        .filter(|token| !token.is_empty() && !FILLER_WORDS.contains(&token.as_str()))
        .collect()
}

fn token_matches(token: &str, fields: &[String]) -> bool {
    let singular = token.strip_suffix('s').filter(|stem| stem.len() >= 3);
    fields.iter().any(|field| {
        field.contains(token) || singular.map(|stem| field.contains(stem)).unwrap_or(false)
    })
}

/// Whether every descriptor token matches some searchable field of `item`.
pub fn matches_descriptor(item: &MenuItem, tokens: &[String]) -> bool {
    if tokens.is_empty() {
        return false;
    }
    let fields = item.search_fields();
    tokens.iter().all(|token| token_matches(token, &fields))
}

fn matches_name(item: &MenuItem, tokens: &[String]) -> bool {
    if tokens.is_empty() {
        return false;
    }
    let name = item.name.to_ascii_lowercase();
    tokens.iter().all(|token| name.contains(token.as_str()))
}

/// Available menu items matching `descriptor`, in catalog order.
pub fn search(menu: &[MenuItem], descriptor: &str) -> Vec<MenuItem> {
    let tokens = descriptor_tokens(descriptor);
    menu.iter()
        .filter(|item| item.available && matches_descriptor(item, &tokens))
        .cloned()
        .collect()
}

/// Initial resolution of a descriptor against the whole menu.
pub fn resolve_descriptor(menu: &[MenuItem], descriptor: &str) -> Resolution {
    let mut matches = search(menu, descriptor);
    match matches.len() {
        0 => Resolution::NoMatch,
        1 => Resolution::Resolved(matches.remove(0)),
        _ => Resolution::Narrowed(matches),
    }
}

/// Applies a selection to the presented candidates.
///
/// Ordinals are one-based. A fragment is first matched against item names
/// ("the chicken one") and otherwise treated as a narrowing descriptor.
pub fn resolve_selection(candidates: &[MenuItem], selection: &CandidateSelection) -> Resolution {
    let remaining = match selection {
        CandidateSelection::Ordinal(position) => {
            return match position.checked_sub(1).and_then(|index| candidates.get(index)) {
                Some(item) => Resolution::Resolved(item.clone()),
                None => Resolution::NoProgress,
            };
        }
        CandidateSelection::Fragment(text) => {
            let tokens = descriptor_tokens(text);
            let by_name = candidates
                .iter()
                .filter(|item| matches_name(item, &tokens))
                .cloned()
                .collect::<Vec<_>>();
            if by_name.is_empty() {
                candidates
                    .iter()
                    .filter(|item| matches_descriptor(item, &tokens))
                    .cloned()
                    .collect::<Vec<_>>()
            } else {
                by_name
            }
        }
    };

    narrow(candidates.len(), remaining)
}

fn narrow(before: usize, mut remaining: Vec<MenuItem>) -> Resolution {
    match remaining.len() {
        1 => Resolution::Resolved(remaining.remove(0)),
        count if count == 0 || count >= before => Resolution::NoProgress,
        _ => Resolution::Narrowed(remaining),
    }
}
