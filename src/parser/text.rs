use std::fmt::Display;
use std::str::FromStr;

use regex::Regex;
use tracing::{error, warn};

/// A captured field plus whatever text is left once the match is cut out.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction<T> {
    pub value: Option<T>,
    pub rest: String,
}

/// Trim and drop line breaks. Inner spacing is left as is.
pub fn clean(raw: &str) -> String {
    raw.trim().replace(['\n', '\r'], "")
}

/// Capture group 1 of the first match of `re` in the cleaned `raw`, and the
/// cleaned text with every match removed. No match leaves `rest` equal to the
/// cleaned text.
pub fn extract(raw: &str, re: &Regex) -> Extraction<String> {
    let text = clean(raw);

    let value = re
        .captures(&text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string());

    match value {
        Some(value) => Extraction {
            value: Some(value),
            rest: re.replace_all(&text, "").trim().to_string(),
        },
        None => {
            warn!(pattern = re.as_str(), text = %text, "no data to extract");
            Extraction {
                value: None,
                rest: text,
            }
        }
    }
}

/// Like [`extract`], converting the capture. A failed conversion drops the
/// value but keeps the residual.
pub fn extract_as<T>(raw: &str, re: &Regex) -> Extraction<T>
where
    T: FromStr,
    T::Err: Display,
{
    let Extraction { value, rest } = extract(raw, re);
    Extraction {
        value: value.and_then(|v| convert(&v)),
        rest,
    }
}

pub fn convert<T>(value: &str) -> Option<T>
where
    T: FromStr,
    T::Err: Display,
{
    match value.parse::<T>() {
        Ok(v) => Some(v),
        Err(e) => {
            error!(value, "error during conversion: {}", e);
            None
        }
    }
}

/// Split into words `0..=word_index` and the remaining words, each joined by a
/// single space. Too few words gives `(None, cleaned text)`.
pub fn split_at_word(raw: &str, word_index: usize) -> (Option<String>, String) {
    let text = clean(raw);
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() < word_index + 1 {
        return (None, text);
    }
    let head = words[..=word_index].join(" ");
    let tail = words[word_index + 1..].join(" ");
    (Some(head), tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn re(p: &str) -> Regex {
        Regex::new(p).unwrap()
    }

    #[test]
    fn clean_strips_line_breaks() {
        assert_eq!(clean("\r\n  № 42\n "), "№ 42");
        assert_eq!(clean("Свободно\n      Type2"), "Свободно      Type2");
    }

    #[test]
    fn city_and_rest_of_address() {
        let e = extract("г. Москва, ул. Ленина 5,", &re(r"г\. ([\w\s-]+),"));
        assert_eq!(e.value.as_deref(), Some("Москва"));
        assert_eq!(e.rest, "ул. Ленина 5,");
        assert!(!e.rest.contains("г. Москва"));
    }

    #[test]
    fn hyphenated_city() {
        let e = extract("\n  г. Санкт-Петербург, Невский пр. 1\n", &re(r"г\. ([\w\s-]+),"));
        assert_eq!(e.value.as_deref(), Some("Санкт-Петербург"));
        assert_eq!(e.rest, "Невский пр. 1");
    }

    #[test]
    fn power_and_name() {
        let e: Extraction<f64> = extract_as("СуперЗаряд, 150.5 kWh", &re(r", (\d+(\.\d+)?) kWh"));
        assert_eq!(e.value, Some(150.5));
        assert_eq!(e.rest, "СуперЗаряд");
    }

    #[test]
    fn integer_power() {
        let e: Extraction<f64> = extract_as("Заряд 1, 22 kWh", &re(r", (\d+(\.\d+)?) kWh"));
        assert_eq!(e.value, Some(22.0));
        assert_eq!(e.rest, "Заряд 1");
    }

    #[test]
    fn every_match_leaves_the_residual() {
        let e: Extraction<f64> =
            extract_as("Заряд, 22 kWh, резерв, 7 kWh", &re(r", (\d+(\.\d+)?) kWh"));
        assert_eq!(e.value, Some(22.0));
        assert_eq!(e.rest, "Заряд, резерв");
    }

    #[test]
    fn no_match_keeps_cleaned_text() {
        let e = extract("  без города\n", &re(r"г\. ([\w\s-]+),"));
        assert_eq!(e.value, None);
        assert_eq!(e.rest, "без города");
    }

    #[test]
    fn failed_conversion_is_absent_value() {
        let e: Extraction<i32> = extract_as("№ 99999999999", &re(r"№ (\d+)"));
        assert_eq!(e.value, None);
        assert_eq!(e.rest, "");
    }

    #[test]
    fn station_number() {
        let e: Extraction<i64> = extract_as("\n № 365 \n", &re(r"№ (\d+)"));
        assert_eq!(e.value, Some(365));
    }

    #[test]
    fn split_status_from_socket_label() {
        assert_eq!(
            split_at_word("Свободно Type 2", 0),
            (Some("Свободно".to_string()), "Type 2".to_string())
        );
        assert_eq!(
            split_at_word("Занято\n   CCS", 0),
            (Some("Занято".to_string()), "CCS".to_string())
        );
        assert_eq!(
            split_at_word("Офлайн", 0),
            (Some("Офлайн".to_string()), String::new())
        );
    }

    #[test]
    fn split_with_too_few_words() {
        assert_eq!(split_at_word("   ", 0), (None, String::new()));
        assert_eq!(split_at_word("one two", 2), (None, "one two".to_string()));
    }
}
