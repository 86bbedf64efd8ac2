use std::collections::BTreeSet;

use async_trait::async_trait;
use tablebell_core::dialogue::disambiguation::descriptor_tokens;
use tablebell_core::dialogue::extractor::{
    CandidateSelection, Extraction, ExtractionContext, ExtractorError, IntentGuess, ItemReference,
    SlotExtractor, SlotProposal,
};
use tablebell_core::dialogue::slots::{parse_clock_time, parse_count, ProposedValue, SlotName};
use tablebell_core::dialogue::states::{DialogueState, Intent};
use tablebell_core::domain::menu::MenuItem;

const CUED: f32 = 0.9;
const EXPECTED: f32 = 0.8;
const UNPROMPTED: f32 = 0.6;

const BOOKING_CUES: &[&str] = &["book", "booking", "table", "reservation", "reserve", "reserved"];
const ORDER_CUES: &[&str] = &[
    "order", "pickup", "takeaway", "takeout", "delivery", "deliver", "collect", "collection",
];
const ORDER_PHRASES: &[&str] =
    &["pick up", "i'd like", "i want", "can i get", "can i have", "get me", "i'll have"];
const RECOMMENDATION_CUES: &[&str] =
    &["recommend", "recommendation", "suggest", "suggestion", "popular", "specials", "menu"];
const RECOMMENDATION_PHRASES: &[&str] =
    &["what's good", "whats good", "do you have", "what do you have", "what is good"];
const CANCEL_PHRASES: &[&str] =
    &["cancel", "never mind", "nevermind", "forget it", "forget about it", "start over"];
const CORRECTION_CUES: &[&str] =
    &["actually", "instead", "change", "rather", "correction", "sorry", "oops"];
const CORRECTION_PHRASES: &[&str] = &["make it", "make that", "switch to", "not"];
const EXTRA_MARKERS: &[&str] = &["extra", "no", "without", "less", "more", "add"];
const NAME_STOPS: &[&str] = &[
    "and", "for", "at", "please", "thanks", "thank", "to", "with", "by", "on", "tonight", "today",
    "tomorrow", "i", "i'd", "i'll", "i'm",
];
const NOT_NAMES: &[&str] = &[
    "yes", "yeah", "yep", "yup", "no", "nope", "nah", "ok", "okay", "sure", "correct", "right",
    "wrong", "perfect", "great", "absolutely", "confirm", "confirmed", "cash", "card", "credit",
    "debit", "wallet", "pickup", "delivery", "takeaway", "takeout", "collect", "collection",
    "asap", "now", "hello", "hi", "hey", "bye", "goodbye", "hmm", "um", "uh", "er", "maybe",
    "sorry", "pardon", "what", "first", "second", "third", "last", "none",
];
const NON_MENU_WORDS: &[&str] = &[
    "pickup", "delivery", "order", "table", "book", "time", "tonight", "today", "tomorrow",
    "name", "card", "cash", "people", "party", "thanks", "thank", "actually", "instead",
    "change", "long", "free",
];

/// Deterministic English-phrasing extractor that knows the restaurant's menu.
#[derive(Clone, Copy, Debug, Default)]
pub struct RuleBasedExtractor;

impl RuleBasedExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn extract_utterance(&self, text: &str, context: &ExtractionContext) -> Extraction {
        let utterance = Utterance::parse(text);
        if utterance.tokens.is_empty() {
            return Extraction::default();
        }

        if CANCEL_PHRASES.iter().any(|phrase| utterance.find_phrase(phrase).is_some()) {
            return Extraction {
                intent: Some(IntentGuess::Cancel),
                confidence: 0.95,
                ..Extraction::default()
            };
        }

        let vocabulary = menu_vocabulary(&context.menu);
        let mut consumed = vec![false; utterance.tokens.len()];
        let disambiguating = context.state == DialogueState::Disambiguating;

        let mut item_references = extract_catalog_items(&utterance, &context.menu, &mut consumed);
        let has_catalog_items = !item_references.is_empty();
        claim_answer_spans(&utterance, context, &mut consumed);

        let selection = if disambiguating {
            extract_ordinal(&utterance, context.candidates.len())
                .map(CandidateSelection::Ordinal)
                .or_else(|| {
                    let fragment = vocabulary_tokens(&utterance, &vocabulary, &consumed);
                    (!fragment.is_empty()).then(|| CandidateSelection::Fragment(fragment.join(" ")))
                })
        } else if context.intent == Some(Intent::Booking) {
            extract_ordinal(&utterance, 0).map(CandidateSelection::Ordinal)
        } else {
            None
        };

        if !disambiguating {
            let items_filled = context.intent == Some(Intent::Order)
                && !context.unfilled.contains(&SlotName::Items);
            let cued = has_order_cue(&utterance);
            if let Some(reference) = extract_descriptor(&utterance, &vocabulary, &mut consumed) {
                if cued || !items_filled || !is_bare_category(&reference, &context.menu) {
                    item_references.push(reference);
                }
            }
        }

        let intent = classify_intent(&utterance, has_catalog_items, !item_references.is_empty());
        let working_intent = intent.and_then(|guess| guess.concrete()).or(context.intent);
        let corrective = has_correction_cue(&utterance);
        let proposals = extract_proposals(
            &utterance,
            context,
            working_intent,
            &vocabulary,
            &mut consumed,
            corrective,
        );
        let affirmation = extract_affirmation(&utterance);

        let confidence = confidence_score(
            intent.is_some(),
            !item_references.is_empty(),
            proposals.len(),
            selection.is_some(),
            affirmation.is_some(),
        );

        Extraction { intent, proposals, item_references, selection, affirmation, confidence }
    }
}

#[async_trait]
impl SlotExtractor for RuleBasedExtractor {
    fn name(&self) -> &'static str {
        "rule_based"
    }

    async fn extract(
        &self,
        utterance: &str,
        context: &ExtractionContext,
    ) -> Result<Extraction, ExtractorError> {
        Ok(self.extract_utterance(utterance, context))
    }
}

/// Lowercased tokens kept index-aligned with the caller's original words, so
/// names and addresses keep their casing.
struct Utterance {
    words: Vec<String>,
    tokens: Vec<String>,
}

impl Utterance {
    fn parse(text: &str) -> Self {
        let words = tokenize(text);
        let mut merged: Vec<String> = Vec::with_capacity(words.len());
        let mut index = 0;
        while index < words.len() {
            let word = &words[index];
            let lower = word.to_ascii_lowercase();
            let follows_digit = merged
                .last()
                .map(|previous| previous.starts_with(|ch: char| ch.is_ascii_digit()))
                .unwrap_or(false);
            // "7 p.m." arrives as "7", "p", "m".
            let next_is_m =
                words.get(index + 1).map(|next| next.eq_ignore_ascii_case("m")).unwrap_or(false);
            if follows_digit && next_is_m && (lower == "p" || lower == "a") {
                merged.push(format!("{lower}m"));
                index += 2;
                continue;
            }
            merged.push(word.clone());
            index += 1;
        }

        let tokens = merged.iter().map(|word| normalize_text(word)).collect();
        Self { words: merged, tokens }
    }

    fn find_phrase(&self, phrase: &str) -> Option<usize> {
        let parts = phrase.split_whitespace().collect::<Vec<_>>();
        if parts.is_empty() || parts.len() > self.tokens.len() {
            return None;
        }
        self.tokens
            .windows(parts.len())
            .position(|window| window.iter().zip(&parts).all(|(token, part)| token == part))
            .map(|start| start + parts.len())
    }

    fn has_token(&self, candidates: &[&str]) -> bool {
        self.tokens.iter().any(|token| candidates.contains(&token.as_str()))
    }

    fn original(&self, start: usize, end: usize) -> String {
        self.words[start..end.min(self.words.len())].join(" ")
    }
}

fn normalize_text(text: &str) -> String {
    text.to_ascii_lowercase().replace('\u{2019}', "'")
}

fn tokenize(text: &str) -> Vec<String> {
    let mut sanitized = String::with_capacity(text.len());
    for character in text.chars() {
        if character.is_alphanumeric() || matches!(character, ':' | '\'' | '-' | '\u{2019}') {
            sanitized.push(character);
        } else {
            sanitized.push(' ');
        }
    }
    sanitized
        .split_whitespace()
        .map(|token| token.trim_matches(|ch: char| matches!(ch, '\'' | '-' | '\u{2019}')))
        .filter(|token| !token.is_empty())
        .map(|token| token.to_string())
        .collect()
}

/// Words that can describe something on this menu.
fn menu_vocabulary(menu: &[MenuItem]) -> BTreeSet<String> {
    let mut vocabulary = BTreeSet::new();
    for item in menu {
        let mut words = tokenize(&item.name);
        words.push(item.category.clone());
        for tag in &item.dietary_tags {
            words.push(tag.clone());
            words.extend(tag.split('-').map(str::to_string));
        }
        words.extend(tokenize(&item.description).into_iter().filter(|word| word.len() >= 4));

        for word in words {
            let word = normalize_text(&word);
            if word.len() >= 3
                && !descriptor_tokens(&word).is_empty()
                && !NON_MENU_WORDS.contains(&word.as_str())
            {
                vocabulary.insert(word);
            }
        }
    }
    vocabulary
}

fn in_vocabulary(token: &str, vocabulary: &BTreeSet<String>) -> bool {
    if token.len() < 3 {
        return false;
    }
    vocabulary.contains(token)
        || token.strip_suffix('s').map(|stem| vocabulary.contains(stem)).unwrap_or(false)
        || vocabulary.contains(&format!("{token}s"))
}

fn token_names(token: &str, name_part: &str, last: bool) -> bool {
    token == name_part
        || (last && (token == format!("{name_part}s") || token == format!("{name_part}es")))
}

fn extract_catalog_items(
    utterance: &Utterance,
    menu: &[MenuItem],
    consumed: &mut [bool],
) -> Vec<ItemReference> {
    let mut by_length = menu
        .iter()
        .map(|item| (item, tokenize(&normalize_text(&item.name))))
        .filter(|(_, name)| !name.is_empty())
        .collect::<Vec<_>>();
    by_length.sort_by(|left, right| right.1.len().cmp(&left.1.len()));

    let tokens = &utterance.tokens;
    let mut found = Vec::new();
    for (item, name) in by_length {
        if name.len() > tokens.len() {
            continue;
        }
        for start in 0..=(tokens.len() - name.len()) {
            let end = start + name.len();
            let matched = (start..end).all(|index| {
                !consumed[index]
                    && token_names(&tokens[index], &name[index - start], index + 1 == end)
            });
            if !matched {
                continue;
            }
            consumed[start..end].iter_mut().for_each(|flag| *flag = true);
            let quantity = take_quantity(tokens, start, consumed);
            let extras = take_extras(utterance, end, consumed);
            found.push((start, ItemReference::Catalog {
                item_id: item.id.clone(),
                quantity,
                extras,
            }));
        }
    }

    found.sort_by_key(|(start, _)| *start);
    found.into_iter().map(|(_, reference)| reference).collect()
}

/// Count immediately before an item mention: "two", "2 x", "a".
fn take_quantity(tokens: &[String], start: usize, consumed: &mut [bool]) -> u32 {
    let mut index = match start.checked_sub(1) {
        Some(index) => index,
        None => return 1,
    };
    if tokens[index] == "x" {
        match index.checked_sub(1) {
            Some(previous) => index = previous,
            None => return 1,
        }
    }
    let after_at = index > 0 && matches!(tokens[index - 1].as_str(), "at" | "around" | "by");
    if consumed[index] || after_at {
        return 1;
    }
    match parse_count(&tokens[index]) {
        Some(quantity) if quantity > 0 => {
            consumed[index] = true;
            quantity
        }
        _ => 1,
    }
}

/// "with extra sauce and no onions" following an item mention.
fn take_extras(utterance: &Utterance, from: usize, consumed: &mut [bool]) -> Vec<String> {
    let tokens = &utterance.tokens;
    let mut extras = Vec::new();
    let mut index = from;
    if tokens.get(index).map(|token| token == "with").unwrap_or(false) {
        index += 1;
    }
    while index + 1 < tokens.len()
        && EXTRA_MARKERS.contains(&tokens[index].as_str())
        && !consumed[index + 1]
    {
        extras.push(format!("{} {}", tokens[index], tokens[index + 1]));
        consumed[index] = true;
        consumed[index + 1] = true;
        index += 2;
        if tokens.get(index).map(|token| token == "and").unwrap_or(false) {
            index += 1;
        }
    }
    extras
}

fn vocabulary_tokens(
    utterance: &Utterance,
    vocabulary: &BTreeSet<String>,
    consumed: &[bool],
) -> Vec<String> {
    utterance
        .tokens
        .iter()
        .enumerate()
        .filter(|(index, token)| !consumed[*index] && in_vocabulary(token, vocabulary))
        .map(|(_, token)| token.clone())
        .collect()
}

fn extract_descriptor(
    utterance: &Utterance,
    vocabulary: &BTreeSet<String>,
    consumed: &mut [bool],
) -> Option<ItemReference> {
    let positions = utterance
        .tokens
        .iter()
        .enumerate()
        .filter(|(index, token)| !consumed[*index] && in_vocabulary(token, vocabulary))
        .map(|(index, _)| index)
        .collect::<Vec<_>>();
    let first = *positions.first()?;
    let last = *positions.last()?;

    let text =
        positions.iter().map(|index| utterance.tokens[*index].as_str()).collect::<Vec<_>>();
    let text = text.join(" ");
    positions.iter().for_each(|index| consumed[*index] = true);

    let quantity = take_quantity(&utterance.tokens, first, consumed);
    let extras = take_extras(utterance, last + 1, consumed);
    Some(ItemReference::Descriptor { text, quantity, extras })
}

/// Marks the address, clock time and cued name so menu words inside them
/// ("12 Main Street") never read as dish descriptions.
fn claim_answer_spans(utterance: &Utterance, context: &ExtractionContext, consumed: &mut [bool]) {
    let expected = context.expected_slot();
    if context.intent != Some(Intent::Booking) {
        if let Some((start, end, _)) = address_span(utterance, expected) {
            consumed[start..end].iter_mut().for_each(|flag| *flag = true);
        }
    }
    if let Some(index) = find_clock_time(&utterance.tokens) {
        consumed[index] = true;
    }
    let asked = expected == Some(SlotName::CustomerName);
    if let Some(start) = name_cue(utterance, asked) {
        if let Some(end) = name_end(utterance, start) {
            consumed[start..end].iter_mut().for_each(|flag| *flag = true);
        }
    }
}

fn has_order_cue(utterance: &Utterance) -> bool {
    utterance.has_token(ORDER_CUES)
        || utterance.has_token(&["add", "also", "another", "plus"])
        || ORDER_PHRASES.iter().any(|phrase| utterance.find_phrase(phrase).is_some())
}

/// "main" or "desserts": a descriptor that only names a menu category.
fn is_bare_category(reference: &ItemReference, menu: &[MenuItem]) -> bool {
    let ItemReference::Descriptor { text, .. } = reference else {
        return false;
    };
    text.split_whitespace().all(|token| {
        menu.iter().any(|item| {
            let category = normalize_text(&item.category);
            token == category
                || format!("{token}s") == category
                || token.strip_suffix('s') == Some(category.as_str())
        })
    })
}

fn extract_ordinal(utterance: &Utterance, candidate_count: usize) -> Option<usize> {
    for (index, token) in utterance.tokens.iter().enumerate() {
        let position = match token.as_str() {
            "first" | "1st" => Some(1),
            "second" | "2nd" => Some(2),
            "third" | "3rd" => Some(3),
            "fourth" | "4th" => Some(4),
            "fifth" | "5th" => Some(5),
            "last" if candidate_count > 0 => Some(candidate_count),
            "number" | "option" => utterance
                .tokens
                .get(index + 1)
                .and_then(|next| parse_count(next))
                .map(|value| value as usize),
            _ => None,
        };
        if position.is_some() {
            return position;
        }
    }

    if candidate_count > 0 && utterance.tokens.len() == 1 {
        return parse_count(&utterance.tokens[0])
            .filter(|value| *value > 0)
            .map(|value| value as usize);
    }
    None
}

fn classify_intent(
    utterance: &Utterance,
    has_catalog_items: bool,
    has_items: bool,
) -> Option<IntentGuess> {
    let booking = utterance.has_token(BOOKING_CUES);
    let order = utterance.has_token(ORDER_CUES)
        || ORDER_PHRASES.iter().any(|phrase| utterance.find_phrase(phrase).is_some());
    let recommendation = utterance.has_token(RECOMMENDATION_CUES)
        || RECOMMENDATION_PHRASES.iter().any(|phrase| utterance.find_phrase(phrase).is_some());

    if booking {
        Some(IntentGuess::Booking)
    } else if recommendation && !order && !has_catalog_items {
        Some(IntentGuess::Recommendation)
    } else if order || has_items {
        Some(IntentGuess::Order)
    } else {
        None
    }
}

fn has_correction_cue(utterance: &Utterance) -> bool {
    utterance.has_token(CORRECTION_CUES)
        || CORRECTION_PHRASES.iter().any(|phrase| utterance.find_phrase(phrase).is_some())
        || utterance.tokens.first().map(|token| token == "no").unwrap_or(false)
}

fn extract_affirmation(utterance: &Utterance) -> Option<bool> {
    let first = utterance.tokens.first()?.as_str();
    let negative_phrases = ["not quite", "not right", "not correct", "that's wrong", "that's not"];
    if negative_phrases.iter().any(|phrase| utterance.find_phrase(phrase).is_some())
        || matches!(first, "no" | "nope" | "nah" | "wrong" | "incorrect" | "wait")
    {
        return Some(false);
    }

    let positive_phrases = ["that's right", "sounds good", "go ahead", "looks good", "please do"];
    if positive_phrases.iter().any(|phrase| utterance.find_phrase(phrase).is_some())
        || utterance.has_token(&["yes", "yeah", "yep", "yup", "correct", "confirm", "confirmed"])
        || matches!(first, "sure" | "ok" | "okay" | "perfect" | "great" | "right" | "absolutely")
    {
        return Some(true);
    }
    None
}

fn extract_proposals(
    utterance: &Utterance,
    context: &ExtractionContext,
    intent: Option<Intent>,
    vocabulary: &BTreeSet<String>,
    consumed: &mut [bool],
    corrective: bool,
) -> Vec<SlotProposal> {
    let expected = context.expected_slot();
    let mut proposals = Vec::new();
    let mut propose = |slot: SlotName, raw: ProposedValue, confidence: f32| {
        proposals.push(SlotProposal { slot, raw, confidence, corrective });
    };

    if intent != Some(Intent::Booking) {
        if let Some(kind) = extract_fulfillment_type(utterance) {
            propose(SlotName::FulfillmentType, ProposedValue::text(kind), CUED);
        }
        if let Some(method) = extract_payment(utterance) {
            propose(SlotName::PaymentMethod, ProposedValue::text(method), CUED);
        }
        if let Some((start, end, confidence)) = address_span(utterance, expected) {
            let address = ProposedValue::text(utterance.original(start, end));
            propose(SlotName::DeliveryAddress, address, confidence);
        }
    }

    let time_slot = match intent {
        Some(Intent::Booking) => Some(SlotName::Time),
        Some(Intent::Order) => Some(SlotName::FulfillmentTime),
        None => None,
    };
    if let Some(slot) = time_slot {
        let asap = slot == SlotName::FulfillmentTime
            && (utterance.has_token(&["asap"])
                || ["as soon as possible", "right away"]
                    .iter()
                    .any(|phrase| utterance.find_phrase(phrase).is_some())
                || (expected == Some(slot) && utterance.has_token(&["now"])));
        if asap {
            propose(slot, ProposedValue::text("asap"), CUED);
        } else if let Some(index) = find_clock_time(&utterance.tokens) {
            consumed[index] = true;
            propose(slot, ProposedValue::text(clock_text(&utterance.tokens, index)), CUED);
        } else if expected == Some(slot) {
            if let Some(index) = bare_number(&utterance.tokens, consumed) {
                consumed[index] = true;
                propose(slot, ProposedValue::text(utterance.tokens[index].clone()), EXPECTED);
            }
        }
    }

    if intent == Some(Intent::Booking) {
        if let Some(date) = extract_date(utterance) {
            propose(SlotName::Date, ProposedValue::text(date), CUED);
        }
        if let Some(size) = extract_party_size(&utterance.tokens, consumed) {
            propose(SlotName::PartySize, ProposedValue::Integer(i64::from(size)), CUED);
        } else if expected == Some(SlotName::PartySize) {
            if let Some(index) = bare_number(&utterance.tokens, consumed) {
                if let Some(size) = parse_count(&utterance.tokens[index]) {
                    let raw = ProposedValue::Integer(i64::from(size));
                    propose(SlotName::PartySize, raw, EXPECTED);
                }
            }
        }
    }

    let nothing_else = proposals.is_empty();
    if let Some((name, confidence)) =
        extract_name(utterance, expected, nothing_else, consumed, vocabulary)
    {
        proposals.push(SlotProposal {
            slot: SlotName::CustomerName,
            raw: ProposedValue::text(name),
            confidence,
            corrective,
        });
    }
    proposals
}

fn extract_fulfillment_type(utterance: &Utterance) -> Option<&'static str> {
    if utterance.has_token(&["delivery", "deliver", "delivered"]) {
        Some("delivery")
    } else if utterance.has_token(&["pickup", "takeaway", "takeout", "collect", "collection"])
        || utterance.find_phrase("pick up").is_some()
    {
        Some("pickup")
    } else {
        None
    }
}

fn extract_payment(utterance: &Utterance) -> Option<&'static str> {
    if ["apple pay", "google pay", "mobile wallet"]
        .iter()
        .any(|phrase| utterance.find_phrase(phrase).is_some())
        || utterance.has_token(&["wallet"])
    {
        Some("mobile_wallet")
    } else if utterance.has_token(&["card", "credit", "debit", "visa", "mastercard", "amex"]) {
        Some("card")
    } else if utterance.has_token(&["cash"]) {
        Some("cash")
    } else {
        None
    }
}

/// Index of the first token that reads as a clock time.
fn find_clock_time(tokens: &[String]) -> Option<usize> {
    for (index, token) in tokens.iter().enumerate() {
        if matches!(token.as_str(), "noon" | "midday" | "midnight") {
            return Some(index);
        }
        let numeric = token.starts_with(|ch: char| ch.is_ascii_digit());
        if !numeric {
            continue;
        }
        let meridiem_next =
            tokens.get(index + 1).map(|next| next == "pm" || next == "am").unwrap_or(false);
        let explicit = token.ends_with("pm") || token.ends_with("am") || token.contains(':');
        let after_at = index > 0
            && matches!(tokens[index - 1].as_str(), "at" | "around" | "about" | "by");
        let readable = parse_clock_time(&clock_text(tokens, index)).is_some();
        if (meridiem_next || explicit || after_at) && readable {
            return Some(index);
        }
    }
    None
}

fn clock_text(tokens: &[String], index: usize) -> String {
    match tokens.get(index + 1) {
        Some(next) if next == "pm" || next == "am" => format!("{}{next}", tokens[index]),
        _ => tokens[index].clone(),
    }
}

fn bare_number(tokens: &[String], consumed: &[bool]) -> Option<usize> {
    tokens.iter().enumerate().position(|(index, token)| {
        !consumed[index]
            && !matches!(token.as_str(), "a" | "an" | "single")
            && parse_count(token).map(|value| value > 0).unwrap_or(false)
    })
}

fn extract_date(utterance: &Utterance) -> Option<String> {
    const WEEKDAYS: [&str; 7] =
        ["monday", "tuesday", "wednesday", "thursday", "friday", "saturday", "sunday"];
    if utterance.find_phrase("this evening").is_some() {
        return Some("today".to_string());
    }
    utterance.tokens.iter().find_map(|token| {
        let iso = token.len() == 10
            && token.chars().filter(|ch| *ch == '-').count() == 2
            && token.chars().all(|ch| ch.is_ascii_digit() || ch == '-');
        let named = matches!(token.as_str(), "today" | "tonight" | "tomorrow")
            || WEEKDAYS.contains(&token.as_str());
        (iso || named).then(|| token.clone())
    })
}

fn extract_party_size(tokens: &[String], consumed: &mut [bool]) -> Option<u32> {
    const UNITS: &[&str] = &["people", "persons", "guests", "adults", "pax", "diners"];
    for (index, token) in tokens.iter().enumerate() {
        if consumed[index] {
            continue;
        }
        let Some(count) = parse_count(token).filter(|value| *value > 0) else {
            continue;
        };
        if matches!(token.as_str(), "a" | "an" | "single") {
            continue;
        }
        let next = tokens.get(index + 1).map(String::as_str);
        let previous = index.checked_sub(1).map(|previous| tokens[previous].as_str());
        let before_previous = index.checked_sub(2).map(|previous| tokens[previous].as_str());

        let unit_follows = next.map(|next| UNITS.contains(&next)).unwrap_or(false)
            || (next == Some("of")
                && tokens.get(index + 2).map(|word| word == "us").unwrap_or(false));
        let cue_precedes = matches!(previous, Some("for" | "of" | "are" | "we're"))
            && !matches!(next, Some("pm" | "am"))
            && !(previous == Some("of") && before_previous != Some("party"));

        if unit_follows || cue_precedes {
            consumed[index] = true;
            return Some(count);
        }
    }
    None
}

/// Token span `[start, end)` of a delivery address, with its confidence.
fn address_span(
    utterance: &Utterance,
    expected: Option<SlotName>,
) -> Option<(usize, usize, f32)> {
    const CUES: &[&str] =
        &["deliver to", "delivered to", "delivery to", "send it to", "address is"];
    const STOPS: &[&str] = &["at", "by", "please", "thanks", "for"];

    let cued = CUES.iter().find_map(|cue| utterance.find_phrase(cue));
    let (start, confidence) = match cued {
        Some(start) => (start, CUED),
        None if expected == Some(SlotName::DeliveryAddress) => {
            let leading = ["my address is", "the address is", "it's", "its", "it is", "to"];
            let start = leading
                .iter()
                .find_map(|cue| utterance.find_phrase(cue).filter(|end| *end <= 3))
                .unwrap_or(0);
            (start, EXPECTED)
        }
        None => return None,
    };

    let end = (start..utterance.tokens.len())
        .find(|index| STOPS.contains(&utterance.tokens[*index].as_str()))
        .unwrap_or(utterance.tokens.len());
    (end > start).then_some((start, end, confidence))
}

fn extract_name(
    utterance: &Utterance,
    expected: Option<SlotName>,
    nothing_else: bool,
    consumed: &[bool],
    vocabulary: &BTreeSet<String>,
) -> Option<(String, f32)> {
    let asked = expected == Some(SlotName::CustomerName);
    let (start, confidence) = match name_cue(utterance, asked) {
        Some(start) => (start, CUED),
        None if !nothing_else => return None,
        None if asked && utterance.tokens.len() <= 4 => (0, EXPECTED),
        None if is_bare_name(utterance, consumed, vocabulary) => (0, UNPROMPTED),
        None => return None,
    };
    let end = name_end(utterance, start)?;
    Some((utterance.original(start, end), confidence))
}

fn name_cue(utterance: &Utterance, asked: bool) -> Option<usize> {
    let mut cues = vec!["my name is", "name is", "name's", "under the name", "call me"];
    if asked {
        cues.extend(["this is", "it's", "its", "it is", "i'm", "im", "under"]);
    }
    cues.iter().find_map(|cue| utterance.find_phrase(cue))
}

/// End of a name of at most three words starting at `start`.
fn name_end(utterance: &Utterance, start: usize) -> Option<usize> {
    (start..utterance.tokens.len())
        .take(3)
        .take_while(|index| {
            let token = utterance.tokens[*index].as_str();
            !NAME_STOPS.contains(&token)
                && !NOT_NAMES.contains(&token)
                && token.chars().all(|ch| ch.is_alphabetic() || ch == '-' || ch == '\'')
        })
        .last()
        .map(|index| index + 1)
}

/// A short capitalised answer that nothing else claimed, like "Priya" said
/// while the time was being asked for.
fn is_bare_name(utterance: &Utterance, consumed: &[bool], vocabulary: &BTreeSet<String>) -> bool {
    let capitalised = utterance
        .words
        .first()
        .and_then(|word| word.chars().next())
        .map(char::is_uppercase)
        .unwrap_or(false);
    let cued = utterance.has_token(BOOKING_CUES)
        || utterance.has_token(ORDER_CUES)
        || utterance.has_token(RECOMMENDATION_CUES)
        || has_correction_cue(utterance)
        || extract_affirmation(utterance).is_some()
        || extract_date(utterance).is_some();

    capitalised
        && !cued
        && utterance.tokens.len() <= 3
        && consumed.iter().all(|claimed| !claimed)
        && utterance.tokens.iter().all(|token| {
            !in_vocabulary(token, vocabulary)
                && !NAME_STOPS.contains(&token.as_str())
                && !NOT_NAMES.contains(&token.as_str())
                && parse_count(token).is_none()
        })
}

fn confidence_score(
    has_intent: bool,
    has_items: bool,
    proposal_count: usize,
    has_selection: bool,
    has_affirmation: bool,
) -> f32 {
    let mut score = 20u32;
    if has_intent {
        score += 30;
    }
    if has_items {
        score += 25;
    }
    score += 10 * proposal_count.min(3) as u32;
    if has_selection {
        score += 25;
    }
    if has_affirmation {
        score += 30;
    }
    score.min(95) as f32 / 100.0
}
