//! Response extractor
//!
//! Pulls a trade direction and an explicit success rate out of free-form
//! assessment text. Rate strategies run in a fixed order and the first one
//! that finds a number in [0, 100] wins. Numbers that belong to a range
//! ("20-34%", "20 to 34%", "от 20 до 34%") are never taken as a rate.

use regex::{Match, Regex};
use std::ops::Range;
use tracing::debug;

use crate::types::{
    ExternalAssessment, ExtractedDecision, RateSource, SentimentTally, TradeAction,
};

/// Trailing segment scanned for bare percentages
const TRAILING_CHARS: usize = 400;

const NUMBER: &str = r"(\d{1,3}(?:[.,]\d+)?)";

/// Tags capture every digit so an over-long value fails validation
const TAG_NUMBER: &str = r"(\d+(?:[.,]\d+)?)";

/// Bare percentage not glued to a digit, sign or decimal separator
const BARE_PERCENT: &str = r"(?:^|[^\d.,+\-])(\d{1,3}(?:[.,]\d+)?)\s*%";

/// Optional filler between a phrase and its number
const FILLER: &str = r"(?:about|around|approximately|roughly|около|примерно|alrededor\s+de|aproximadamente|~)?";

/// Phrase patterns, tried in order. `{n}` is the number, `{f}` the filler.
const PHRASE_PATTERNS: &[&str] = &[
    r"success\s+(?:rate|probability|chance)\s*(?:is|of|:|=|-|–)?\s*{f}\s*{n}\s*%",
    r"probability\s+of\s+success\s*(?:is|:|=|-|–)?\s*{f}\s*{n}\s*%",
    r"confidence(?:\s+level)?\s*(?:is|:|=|-|–)?\s*{f}\s*{n}\s*%",
    r"вероятность\s+успеха\s*(?:составляет|:|=|-|–)?\s*{f}\s*{n}\s*%",
    r"шансы?\s+(?:на\s+)?успех[аи]?\s*(?::|=|-|–)?\s*{f}\s*{n}\s*%",
    r"probabilidad\s+de\s+éxito\s*(?:es\s+de|es|:|=|-|–)?\s*{f}\s*{n}\s*%",
];

/// Keyword stems end with `*`; everything else must match a whole word
const POSITIVE_WORDS: &[&str] = &[
    "bullish", "strong*", "uptrend", "breakout", "favorable", "favourable", "confirm*",
    "momentum", "growth", "rally", "upside", "бычий", "бычь*", "рост*", "сильн*",
    "подтвержд*", "импульс*", "alcista", "support", "поддержк*", "soporte",
];

const NEGATIVE_WORDS: &[&str] = &[
    "bearish", "weak*", "downtrend", "risk*", "reversal", "unfavorable", "caution*",
    "decline*", "downside", "fakeout", "медвеж*", "слаб*", "падени*", "риск*", "осторожн*",
    "разворот*", "bajista",
];

const ACTION_WORDS: &[(TradeAction, &[&str])] = &[
    (TradeAction::Buy, &["buy", "buying", "long", "покуп*", "лонг", "comprar"]),
    (TradeAction::Sell, &["sell", "selling", "short", "продав*", "продаж*", "шорт", "vender"]),
    (TradeAction::Hold, &["hold", "wait", "neutral", "удерж*", "ждать", "подожд*", "esperar"]),
];

type RateStrategy = fn(&ResponseExtractor, &str) -> Option<f64>;

/// Ordered rate strategies
const RATE_STRATEGIES: &[(RateSource, RateStrategy)] = &[
    (RateSource::Tagged, ResponseExtractor::tagged_rate),
    (RateSource::Phrase, ResponseExtractor::phrase_rate),
    (RateSource::TrailingPercent, ResponseExtractor::trailing_rate),
];

pub struct ResponseExtractor {
    rate_tag: Regex,
    action_tag: Regex,
    phrases: Vec<Regex>,
    percent: Regex,
    range: Regex,
}

impl ResponseExtractor {
    pub fn new() -> Self {
        let phrases = PHRASE_PATTERNS
            .iter()
            .map(|p| {
                let pattern = format!("(?i){}", p.replace("{f}", FILLER).replace("{n}", NUMBER));
                Regex::new(&pattern).expect("phrase pattern must compile")
            })
            .collect();

        Self {
            rate_tag: Regex::new(&format!(r"(?i)\[?success_rate\]?\s*[:=]\s*{}", TAG_NUMBER))
                .expect("rate tag pattern must compile"),
            action_tag: Regex::new(r"(?i)\[?action\]?\s*[:=]\s*(buy|sell|hold)\b")
                .expect("action tag pattern must compile"),
            phrases,
            percent: Regex::new(BARE_PERCENT).expect("percent pattern must compile"),
            range: Regex::new(
                r"(?i)\b\d{1,3}(?:[.,]\d+)?\s*%?\s*(?:-|–|—|\bto\b|\bдо\b)\s*\d{1,3}(?:[.,]\d+)?\s*%?",
            )
            .expect("range pattern must compile"),
        }
    }

    /// Extract decision fields; absent or unusable text yields defaults
    pub fn extract(&self, assessment: &ExternalAssessment) -> ExtractedDecision {
        let Some(text) = assessment.text() else {
            return ExtractedDecision::default();
        };

        let (explicit_rate, rate_source) = RATE_STRATEGIES
            .iter()
            .find_map(|(source, strategy)| strategy(self, text).map(|rate| (rate, *source)))
            .map_or((None, None), |(rate, source)| (Some(rate), Some(source)));

        let decision = ExtractedDecision {
            action: self.action(text),
            explicit_rate,
            rate_source,
            sentiment: sentiment(text),
        };

        debug!(
            action = decision.action.as_str(),
            rate = ?decision.explicit_rate,
            source = ?decision.rate_source,
            "Extracted decision"
        );

        decision
    }

    /// `[success_rate]=N`; the last valid tag wins
    fn tagged_rate(&self, text: &str) -> Option<f64> {
        self.rate_tag
            .captures_iter(text)
            .filter_map(|c| c.get(1).and_then(|m| parse_rate(m.as_str())))
            .last()
    }

    fn phrase_rate(&self, text: &str) -> Option<f64> {
        let ranges = self.range_spans(text);
        self.phrases.iter().find_map(|phrase| {
            phrase
                .captures_iter(text)
                .filter_map(|c| c.get(1))
                .filter(|m| !overlaps(&ranges, m, 0))
                .find_map(|m| parse_rate(m.as_str()))
        })
    }

    /// Bare `N%` in the closing part of the text, scanned from the end
    fn trailing_rate(&self, text: &str) -> Option<f64> {
        let ranges = self.range_spans(text);
        let offset = tail_start(text, TRAILING_CHARS);
        let tail = &text[offset..];

        let numbers: Vec<Match> = self
            .percent
            .captures_iter(tail)
            .filter_map(|c| c.get(1))
            .collect();

        numbers
            .iter()
            .rev()
            .filter(|m| !overlaps(&ranges, m, offset))
            .find_map(|m| parse_rate(m.as_str()))
    }

    fn action(&self, text: &str) -> TradeAction {
        if let Some(tag) = self.action_tag.captures_iter(text).last() {
            match tag[1].to_lowercase().as_str() {
                "buy" => return TradeAction::Buy,
                "sell" => return TradeAction::Sell,
                "hold" => return TradeAction::Hold,
                _ => {}
            }
        }

        let words = action_tokens(text);
        let counts: Vec<(TradeAction, usize)> = ACTION_WORDS
            .iter()
            .map(|(action, keywords)| (*action, count_matches(&words, keywords)))
            .collect();

        let best = counts.iter().map(|(_, n)| *n).max().unwrap_or(0);
        if best == 0 {
            return TradeAction::Unknown;
        }

        let mut leaders = counts.iter().filter(|(_, n)| *n == best);
        match (leaders.next(), leaders.next()) {
            (Some((action, _)), None) => *action,
            // Conflicting directions are ambiguous
            _ => TradeAction::Unknown,
        }
    }

    fn range_spans(&self, text: &str) -> Vec<Range<usize>> {
        self.range.find_iter(text).map(|m| m.range()).collect()
    }
}

impl Default for ResponseExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Keyword polarity counts
pub fn sentiment(text: &str) -> SentimentTally {
    let words = tokens(text);
    SentimentTally {
        positive: count_matches(&words, POSITIVE_WORDS) as u32,
        negative: count_matches(&words, NEGATIVE_WORDS) as u32,
    }
}

fn parse_rate(raw: &str) -> Option<f64> {
    raw.replace(',', ".")
        .parse::<f64>()
        .ok()
        .filter(|v| (0.0..=100.0).contains(v))
}

fn overlaps(ranges: &[Range<usize>], m: &Match, offset: usize) -> bool {
    let (start, end) = (m.start() + offset, m.end() + offset);
    ranges.iter().any(|r| start < r.end && r.start < end)
}

/// Byte index where the last `chars` characters begin
fn tail_start(text: &str, chars: usize) -> usize {
    let total = text.chars().count();
    if total <= chars {
        return 0;
    }
    text.char_indices()
        .nth(total - chars)
        .map(|(i, _)| i)
        .unwrap_or(0)
}

fn tokens(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// Tokens for action voting; "long term" and "short term" are horizons, not directions
fn action_tokens(text: &str) -> Vec<String> {
    let words = tokens(text);
    words
        .iter()
        .enumerate()
        .filter(|(i, word)| {
            let horizon = matches!(word.as_str(), "long" | "short")
                && words.get(i + 1).map(String::as_str) == Some("term");
            !horizon
        })
        .map(|(_, word)| word.clone())
        .collect()
}

fn count_matches(words: &[String], keywords: &[&str]) -> usize {
    words
        .iter()
        .filter(|word| {
            keywords.iter().any(|kw| match kw.strip_suffix('*') {
                Some(stem) => word.starts_with(stem),
                None => word.as_str() == *kw,
            })
        })
        .count()
}
