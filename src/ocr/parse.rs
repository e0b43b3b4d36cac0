use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

/// A leading level digit (1-5) wrapped in or prefixed by a bracket-like glyph.
/// The trailing capture keeps the first name character so multi-digit levels
/// such as `[35` are left alone.
const BRACKETED_LEVEL_PATTERN: &str =
    r"^[\W_]*(?:[\[\(\{|lI]\s*([1-5])\s*[\]\)\}|]?|([1-5])\s*[\]\)\}|])\s*([^\d\s])";

/// Level digits, 1-3 separating spaces, then the start of the name.
const ROW_PATTERN: &str = r"(\d+)\s{1,3}(\S.*)";

static BRACKETED_LEVEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(BRACKETED_LEVEL_PATTERN).expect("regex"));
static ROW: LazyLock<Regex> = LazyLock::new(|| Regex::new(ROW_PATTERN).expect("regex"));

/// A pure text-to-text repair step.
pub type RepairRule = (&'static str, fn(&str) -> String);

/// Applied to the raw band text before the level/name split, in order.
pub const TEXT_RULES: [RepairRule; 3] = [
    ("bracketed_level", bracketed_level),
    ("strip_table_rules", strip_table_rules),
    ("join_lines", join_lines),
];

/// Applied to the name part after the split, in order.
pub const NAME_RULES: [RepairRule; 3] = [
    ("strip_decorations", strip_decorations),
    ("underscore_spaces", underscore_spaces),
    ("strip_repeated_level", strip_repeated_level),
];

/// `"[3]Nova"` -> `"3 Nova"`, `"l4 Vega"` -> `"4 Vega"`.
pub fn bracketed_level(text: &str) -> String {
    BRACKETED_LEVEL.replace(text, "$1$2 $3").into_owned()
}

/// Drops `|` table borders the OCR picks up around the level column.
pub fn strip_table_rules(text: &str) -> String {
    text.replace('|', "")
}

pub fn join_lines(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Icons in front of a name come out as punctuation; drop up to the first
/// alphanumeric character.
pub fn strip_decorations(name: &str) -> String {
    name.trim_start_matches(|c: char| !c.is_alphanumeric())
        .to_string()
}

pub fn underscore_spaces(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join("_")
}

/// The level is sometimes read twice (`"30 30 Nova"`), leaving `"30_Nova"`.
pub fn strip_repeated_level(name: &str) -> String {
    let digits = name.chars().take_while(char::is_ascii_digit).count();
    match name[digits..].strip_prefix('_') {
        Some(rest) if digits > 0 => rest.to_string(),
        _ => name.to_string(),
    }
}

fn apply_rules(rules: &[RepairRule], text: &str) -> String {
    rules.iter().fold(text.to_string(), |acc, (name, rule)| {
        let next = rule(&acc);
        if next != acc {
            tracing::trace!("{}: {:?} -> {:?}", name, acc, next);
        }
        next
    })
}

/// Level and name read from one roster band.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedRow {
    /// Level digits as read
    pub level: String,
    pub name: String,
}

impl ParsedRow {
    pub fn level_value(&self) -> Option<u32> {
        self.level.parse().ok()
    }
}

/// Why a band did not produce a row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ParseFailure {
    /// Nothing matching `level name` in the text
    NoMatch { text: String },
    /// The name was empty once decorations were removed
    EmptyName { text: String },
}

impl std::fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseFailure::NoMatch { text } => {
                write!(f, "did not discover data in the expected format: {text:?}")
            }
            ParseFailure::EmptyName { text } => write!(f, "no player name in {text:?}"),
        }
    }
}

/// Splits one band of OCR text into level and name.
pub fn parse_row(raw: &str) -> Result<ParsedRow, ParseFailure> {
    let text = apply_rules(&TEXT_RULES, raw);

    let Some(caps) = ROW.captures(&text) else {
        return Err(ParseFailure::NoMatch { text });
    };
    let level = caps[1].to_string();
    let name = apply_rules(&NAME_RULES, &caps[2]);

    if name.is_empty() {
        return Err(ParseFailure::EmptyName { text });
    }

    Ok(ParsedRow { level, name })
}

/// Power column text, one value per non-empty line, digits and commas only.
pub fn power_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| {
            line.chars()
                .filter(|c| c.is_ascii_digit() || *c == ',')
                .collect::<String>()
        })
        .filter(|line| !line.is_empty())
        .collect()
}

pub fn parse_power(text: &str) -> Option<u64> {
    let digits: String = text.chars().filter(|c| *c != ',').collect();
    digits.parse().ok()
}
