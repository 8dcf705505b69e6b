//! English inflection helpers used for controller naming and template variables.
//!
//! Route names always use [`underscore`] of the controller type name. The
//! plural and singular forms only feed template variable names
//! (`widgets` / `widget`) and scaffold titles.

use once_cell::sync::Lazy;
use regex::Regex;

const UNCOUNTABLE: &[&str] = &[
    "equipment",
    "information",
    "rice",
    "money",
    "species",
    "series",
    "fish",
    "sheep",
    "news",
    "data",
    "metadata",
];

const IRREGULAR: &[(&str, &str)] = &[
    ("person", "people"),
    ("man", "men"),
    ("woman", "women"),
    ("child", "children"),
    ("sex", "sexes"),
    ("move", "moves"),
    ("cow", "kine"),
    ("mouse", "mice"),
    ("goose", "geese"),
];

/// `(pattern, replacement)`, checked in order; the first match wins.
static PLURAL_RULES: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    compile(&[
        (r"(?i)(quiz)$", "${1}zes"),
        (r"(?i)^(ox)$", "${1}en"),
        (r"(?i)([ml])ouse$", "${1}ice"),
        (r"(?i)(matr|vert|ind)(?:ix|ex)$", "${1}ices"),
        (r"(?i)(x|ch|ss|sh)$", "${1}es"),
        (r"(?i)([^aeiouy]|qu)y$", "${1}ies"),
        (r"(?i)(hive)$", "${1}s"),
        (r"(?i)(?:([^f])fe|([lr])f)$", "${1}${2}ves"),
        (r"(?i)sis$", "ses"),
        (r"(?i)([ti])um$", "${1}a"),
        (r"(?i)(buffal|tomat)o$", "${1}oes"),
        (r"(?i)(bu)s$", "${1}ses"),
        (r"(?i)(alias|status)$", "${1}es"),
        (r"(?i)(octop|vir)us$", "${1}i"),
        (r"(?i)(ax|test)is$", "${1}es"),
        (r"(?i)s$", "s"),
        (r"$", "s"),
    ])
});

static SINGULAR_RULES: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    compile(&[
        (r"(?i)(quiz)zes$", "${1}"),
        (r"(?i)(matr)ices$", "${1}ix"),
        (r"(?i)(vert|ind)ices$", "${1}ex"),
        (r"(?i)^(ox)en", "${1}"),
        (r"(?i)(alias|status)es$", "${1}"),
        (r"(?i)(octop|vir)i$", "${1}us"),
        (r"(?i)(cris|ax|test)es$", "${1}is"),
        (r"(?i)(shoe)s$", "${1}"),
        (r"(?i)(o)es$", "${1}"),
        (r"(?i)(bus)es$", "${1}"),
        (r"(?i)([ml])ice$", "${1}ouse"),
        (r"(?i)(x|ch|ss|sh)es$", "${1}"),
        (r"(?i)(m)ovies$", "${1}ovie"),
        (r"(?i)(s)eries$", "${1}eries"),
        (r"(?i)([^aeiouy]|qu)ies$", "${1}y"),
        (r"(?i)([lr])ves$", "${1}f"),
        (r"(?i)(tive)s$", "${1}"),
        (r"(?i)(hive)s$", "${1}"),
        (r"(?i)([^f])ves$", "${1}fe"),
        (r"(?i)(^analy)ses$", "${1}sis"),
        (r"(?i)([ti])a$", "${1}um"),
        (r"(?i)(n)ews$", "${1}ews"),
        (r"(?i)(ss)$", "${1}"),
        (r"(?i)s$", ""),
    ])
});

fn compile(rules: &[(&str, &'static str)]) -> Vec<(Regex, &'static str)> {
    rules
        .iter()
        .filter_map(|(pattern, replacement)| {
            Regex::new(pattern).ok().map(|re| (re, *replacement))
        })
        .collect()
}

fn apply(word: &str, rules: &[(Regex, &'static str)], irregular: impl Fn(&str) -> Option<&'static str>) -> String {
    if word.is_empty() {
        return String::new();
    }
    // Only the last `_` separated part is inflected: `widget_item` -> `widget_items`.
    let (head, last) = match word.rfind('_') {
        Some(idx) => word.split_at(idx + 1),
        None => ("", word),
    };
    let lower = last.to_lowercase();
    if UNCOUNTABLE.contains(&lower.as_str()) {
        return word.to_string();
    }
    if let Some(form) = irregular(&lower) {
        return format!("{head}{form}");
    }
    for (re, replacement) in rules {
        if re.is_match(last) {
            return format!("{head}{}", re.replace(last, *replacement));
        }
    }
    word.to_string()
}

/// Plural form of an English word: `widget` -> `widgets`, `category` -> `categories`.
pub fn pluralize(word: &str) -> String {
    apply(word, &PLURAL_RULES, |w| {
        IRREGULAR
            .iter()
            .find(|(singular, plural)| *singular == w || *plural == w)
            .map(|(_, plural)| *plural)
    })
}

/// Singular form of an English word: `widgets` -> `widget`, `people` -> `person`.
pub fn singularize(word: &str) -> String {
    apply(word, &SINGULAR_RULES, |w| {
        IRREGULAR
            .iter()
            .find(|(singular, plural)| *plural == w || *singular == w)
            .map(|(singular, _)| *singular)
    })
}

/// `CamelCase` to `snake_case`. Runs of capitals are kept together:
/// `HTTPThing` -> `http_thing`, `WidgetsHandler` -> `widgets_handler`.
pub fn underscore(word: &str) -> String {
    let chars: Vec<char> = word.chars().collect();
    let mut result = String::with_capacity(word.len() + 4);

    for (i, &ch) in chars.iter().enumerate() {
        if ch.is_uppercase() {
            let prev = i.checked_sub(1).map(|p| chars[p]);
            let next = chars.get(i + 1).copied();
            let boundary = match prev {
                Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_uppercase() => next.is_some_and(|n| n.is_lowercase()),
                _ => false,
            };
            if boundary && !result.ends_with('_') {
                result.push('_');
            }
            result.extend(ch.to_lowercase());
        } else if ch == '-' || ch == ' ' || ch == '.' {
            if !result.is_empty() && !result.ends_with('_') {
                result.push('_');
            }
        } else {
            result.push(ch);
        }
    }

    result
}

/// `snake_case` to `CamelCase`.
pub fn camelize(word: &str) -> String {
    word.split(['_', '-', ' '])
        .filter(|part| !part.is_empty())
        .map(capitalize)
        .collect()
}

/// `widget_item` -> `Widget Item`.
pub fn titleize(word: &str) -> String {
    underscore(word)
        .split('_')
        .filter(|part| !part.is_empty())
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalize(part: &str) -> String {
    let mut chars = part.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Last path segment of a Rust type name, with generic arguments removed:
/// `my_app::controllers::Widgets<T>` -> `Widgets`.
pub fn short_type_name(full: &str) -> &str {
    let without_generics = full.split('<').next().unwrap_or(full);
    without_generics
        .rsplit("::")
        .next()
        .unwrap_or(without_generics)
}
