//! Namespace of named generator functions addressed by dotted paths.

use super::GenerationError;
use chrono::{Duration, Utc};
use fake::faker::address::en::{CityName, CountryName, PostCode, StateAbbr, StreetName};
use fake::faker::company::en::{Buzzword, CompanyName};
use fake::faker::job::en::Title as JobTitle;
use fake::faker::internet::en::{DomainSuffix, IPv4, Password, SafeEmail, Username};
use fake::faker::lorem::en::{Paragraph, Sentence, Word, Words};
use fake::faker::name::en::{FirstName, LastName, Name, Title};
use fake::faker::phone_number::en::PhoneNumber;
use fake::Fake;
use rand::Rng;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

pub type GeneratorFn = Arc<dyn Fn(Option<&Value>) -> Value + Send + Sync>;

pub enum GeneratorNode {
    Namespace(BTreeMap<String, GeneratorNode>),
    Function(GeneratorFn),
}

/// Tree of generator functions.
///
/// Paths may start with an optional `faker.` segment, so `faker.person.firstName`
/// and `person.firstName` resolve to the same function.
pub struct GeneratorLibrary {
    root: BTreeMap<String, GeneratorNode>,
}

impl GeneratorLibrary {
    pub fn empty() -> Self {
        Self {
            root: BTreeMap::new(),
        }
    }

    /// Register a function, creating intermediate namespaces as needed.
    ///
    /// Registering below an existing function replaces it with a namespace.
    pub fn register<F>(&mut self, path: &str, f: F)
    where
        F: Fn(Option<&Value>) -> Value + Send + Sync + 'static,
    {
        let segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
        let Some((last, parents)) = segments.split_last() else {
            return;
        };

        let mut current = &mut self.root;
        for segment in parents {
            let node = current
                .entry(segment.to_string())
                .or_insert_with(|| GeneratorNode::Namespace(BTreeMap::new()));
            if let GeneratorNode::Function(_) = node {
                *node = GeneratorNode::Namespace(BTreeMap::new());
            }
            current = match node {
                GeneratorNode::Namespace(children) => children,
                GeneratorNode::Function(_) => unreachable!("replaced with a namespace above"),
            };
        }
        current.insert(last.to_string(), GeneratorNode::Function(Arc::new(f)));
    }

    /// Walk `path` through the namespace tree.
    pub fn resolve(&self, path: &str) -> Result<&GeneratorFn, GenerationError> {
        let mut segments: Vec<&str> = path.split('.').collect();
        if segments.first() == Some(&"faker") && !self.root.contains_key("faker") {
            segments.remove(0);
        }

        let unresolved = |segment: &str| GenerationError::UnresolvedPath {
            path: path.to_string(),
            segment: segment.to_string(),
        };

        let mut namespace = &self.root;
        let mut resolved: Option<&GeneratorNode> = None;
        for segment in segments {
            if resolved.is_some() || segment.is_empty() {
                return Err(unresolved(segment));
            }
            match namespace.get(segment) {
                Some(GeneratorNode::Namespace(children)) => namespace = children,
                Some(node @ GeneratorNode::Function(_)) => resolved = Some(node),
                None => return Err(unresolved(segment)),
            }
        }

        match resolved {
            Some(GeneratorNode::Function(f)) => Ok(f),
            _ => Err(GenerationError::NotCallable {
                path: path.to_string(),
            }),
        }
    }

    /// Every registered function path, sorted.
    pub fn paths(&self) -> Vec<String> {
        fn walk(prefix: &str, nodes: &BTreeMap<String, GeneratorNode>, out: &mut Vec<String>) {
            for (name, node) in nodes {
                let path = if prefix.is_empty() {
                    name.clone()
                } else {
                    format!("{}.{}", prefix, name)
                };
                match node {
                    GeneratorNode::Namespace(children) => walk(&path, children, out),
                    GeneratorNode::Function(_) => out.push(path),
                }
            }
        }

        let mut out = Vec::new();
        walk("", &self.root, &mut out);
        out
    }

    /// The default library backed by the `fake` crate.
    pub fn standard() -> Self {
        let mut lib = Self::empty();

        // Person
        lib.register("person.firstName", |_| json!(FirstName().fake::<String>()));
        lib.register("person.lastName", |_| json!(LastName().fake::<String>()));
        lib.register("person.fullName", |_| json!(Name().fake::<String>()));
        lib.register("person.title", |_| json!(Title().fake::<String>()));
        lib.register("person.jobTitle", |_| json!(JobTitle().fake::<String>()));

        // Internet
        lib.register("internet.email", |_| json!(SafeEmail().fake::<String>()));
        lib.register("internet.userName", |_| json!(Username().fake::<String>()));
        lib.register("internet.ipv4", |_| json!(IPv4().fake::<String>()));
        lib.register("internet.domainSuffix", |_| json!(DomainSuffix().fake::<String>()));
        lib.register("internet.password", |args| {
            let len = arg_length(args, 12).max(1);
            json!(Password(len..len + 1).fake::<String>())
        });

        // Location
        lib.register("location.city", |_| json!(CityName().fake::<String>()));
        lib.register("location.country", |_| json!(CountryName().fake::<String>()));
        lib.register("location.street", |_| json!(StreetName().fake::<String>()));
        lib.register("location.zipCode", |_| json!(PostCode().fake::<String>()));
        lib.register("location.state", |_| json!(StateAbbr().fake::<String>()));

        // Text
        lib.register("lorem.word", |_| json!(Word().fake::<String>()));
        lib.register("lorem.words", |args| {
            let count = arg_length(args, 3).max(1);
            json!(Words(count..count + 1).fake::<Vec<String>>().join(" "))
        });
        lib.register("lorem.sentence", |args| {
            let words = arg_length(args, 6).max(1);
            json!(Sentence(words..words + 1).fake::<String>())
        });
        lib.register("lorem.paragraph", |args| {
            let sentences = arg_length(args, 3).max(1);
            json!(Paragraph(sentences..sentences + 1).fake::<String>())
        });

        lib.register("phone.number", |_| json!(PhoneNumber().fake::<String>()));
        lib.register("company.name", |_| json!(CompanyName().fake::<String>()));
        lib.register("company.buzzword", |_| json!(Buzzword().fake::<String>()));

        // Numbers
        lib.register("number.int", |args| {
            let (min, max) = arg_range(args, 0.0, 1000.0);
            let (min, max) = (min.ceil() as i64, max.floor() as i64);
            if min >= max {
                return json!(min);
            }
            json!(rand::thread_rng().gen_range(min..=max))
        });
        lib.register("number.float", |args| {
            let (min, max) = arg_range(args, 0.0, 1.0);
            let precision = arg_field(args, "precision").unwrap_or(2.0).clamp(0.0, 10.0) as i32;
            let value = if min >= max {
                min
            } else {
                // Interpolate so spans wider than f64::MAX stay finite.
                let t: f64 = rand::thread_rng().gen();
                min * (1.0 - t) + max * t
            };
            let factor = 10f64.powi(precision);
            let rounded = (value * factor).round() / factor;
            json!(if rounded.is_finite() { rounded } else { value })
        });
        lib.register("datatype.boolean", |args| {
            let probability = arg_field(args, "probability").unwrap_or(0.5).clamp(0.0, 1.0);
            json!(rand::thread_rng().gen_bool(probability))
        });

        // Strings
        lib.register("string.uuid", |_| json!(uuid::Uuid::new_v4().to_string()));
        lib.register("string.alpha", |args| {
            json!(random_chars(arg_length(args, 8), ALPHA))
        });
        lib.register("string.numeric", |args| {
            json!(random_chars(arg_length(args, 6), DIGITS))
        });
        lib.register("string.alphanumeric", |args| {
            json!(random_chars(arg_length(args, 10), ALPHANUMERIC))
        });

        // Dates, RFC 3339
        lib.register("date.past", |args| {
            let days = arg_days(args, 365.0);
            json!(offset_now(-random_seconds(days)))
        });
        lib.register("date.future", |args| {
            let days = arg_days(args, 365.0);
            json!(offset_now(random_seconds(days)))
        });
        lib.register("date.recent", |args| {
            let days = arg_days(args, 1.0);
            json!(offset_now(-random_seconds(days)))
        });

        // Helpers
        lib.register("helpers.arrayElement", |args| match args {
            Some(Value::Array(items)) if !items.is_empty() => {
                items[rand::thread_rng().gen_range(0..items.len())].clone()
            }
            _ => Value::Null,
        });
        lib.register("helpers.fromPattern", |args| match args {
            Some(Value::String(pattern)) => json!(from_pattern(pattern)),
            _ => json!(""),
        });

        lib
    }
}

impl Default for GeneratorLibrary {
    fn default() -> Self {
        Self::standard()
    }
}

const ALPHA: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &[u8] = b"0123456789";
const ALPHANUMERIC: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

fn random_chars(len: usize, alphabet: &[u8]) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| alphabet[rng.gen_range(0..alphabet.len())] as char)
        .collect()
}

/// Longest span accepted by the date generators.
const MAX_DAYS: f64 = 365_000.0;

/// Longest string or word list the text generators produce.
const MAX_LENGTH: usize = 10_000;

fn arg_days(args: Option<&Value>, default: f64) -> f64 {
    arg_field(args, "days").unwrap_or(default).max(1.0).min(MAX_DAYS)
}

fn random_seconds(days: f64) -> i64 {
    let max = (days * 86_400.0) as i64;
    rand::thread_rng().gen_range(1..=max.max(1))
}

fn offset_now(seconds: i64) -> String {
    let now = Utc::now();
    now.checked_add_signed(Duration::seconds(seconds))
        .unwrap_or(now)
        .to_rfc3339()
}

/// `#` becomes a digit, `?` a lowercase letter, `*` either.
fn from_pattern(pattern: &str) -> String {
    let mut rng = rand::thread_rng();
    pattern
        .chars()
        .map(|c| match c {
            '#' => char::from(b'0' + rng.gen_range(0..10u8)),
            '?' => char::from(rng.gen_range(b'a'..=b'z')),
            '*' if rng.gen_bool(0.5) => char::from(b'0' + rng.gen_range(0..10u8)),
            '*' => char::from(rng.gen_range(b'a'..=b'z')),
            other => other,
        })
        .collect()
}

fn arg_field(args: Option<&Value>, key: &str) -> Option<f64> {
    args?.get(key)?.as_f64()
}

/// Accepts `{ min, max }`, `[min, max]` or a bare number (the maximum).
fn arg_range(args: Option<&Value>, default_min: f64, default_max: f64) -> (f64, f64) {
    match args {
        Some(Value::Number(n)) => (default_min, n.as_f64().unwrap_or(default_max)),
        Some(Value::Array(items)) => (
            items.first().and_then(Value::as_f64).unwrap_or(default_min),
            items.get(1).and_then(Value::as_f64).unwrap_or(default_max),
        ),
        Some(Value::Object(_)) => (
            arg_field(args, "min").unwrap_or(default_min),
            arg_field(args, "max").unwrap_or(default_max),
        ),
        _ => (default_min, default_max),
    }
}

/// Accepts a bare number or `{ length }` / `{ count }`.
fn arg_length(args: Option<&Value>, default: usize) -> usize {
    let value = match args {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::Object(_)) => arg_field(args, "length").or_else(|| arg_field(args, "count")),
        _ => None,
    };
    value
        .map(|v| v.max(0.0) as usize)
        .unwrap_or(default)
        .min(MAX_LENGTH)
}
