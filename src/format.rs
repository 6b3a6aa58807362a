//! Rendering of evaluation results
//!
//! Primitives are printed the way Node's `util.inspect` prints them. Objects
//! get a one-line summary: class name plus the first few properties, getters
//! before own properties, with nested objects collapsed to `[object Class]`.

use crate::protocol::{ObjectProperties, RemoteValue};
use crossterm::style::{Color, Stylize};

/// Properties shown in an object summary
pub const PROP_SHOW_COUNT: usize = 5;

/// Terminal styling, or none when colour is off
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    color: bool,
}

impl Palette {
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    pub fn plain() -> Self {
        Self::new(false)
    }

    pub fn paint(self, text: &str, color: Color) -> String {
        if self.color {
            text.with(color).to_string()
        } else {
            text.to_string()
        }
    }

    pub fn bold(self, text: &str) -> String {
        if self.color {
            text.bold().to_string()
        } else {
            text.to_string()
        }
    }
}

/// A fully resolved evaluation result, ready to print
#[derive(Debug, Clone, PartialEq)]
pub enum Inspected {
    Exception(String),
    Value(RemoteValue),
    Object {
        class_name: String,
        properties: ObjectProperties,
    },
}

pub fn format(result: &Inspected, palette: Palette) -> String {
    match result {
        Inspected::Exception(message) => message.clone(),
        Inspected::Value(value) => inspect(value, palette),
        Inspected::Object {
            class_name,
            properties,
        } => summarize(class_name, properties, palette),
    }
}

/// Render a single value without expanding objects
pub fn inspect(value: &RemoteValue, palette: Palette) -> String {
    match value {
        RemoteValue::Undefined => palette.paint("undefined", Color::DarkGrey),
        RemoteValue::Null => palette.bold("null"),
        RemoteValue::Bool(b) => palette.paint(&b.to_string(), Color::Yellow),
        RemoteValue::Number(n) => palette.paint(&js_number(n), Color::Yellow),
        RemoteValue::Unserializable(raw) => palette.paint(raw, Color::Yellow),
        RemoteValue::String(s) => palette.paint(&quote(s), Color::Green),
        RemoteValue::Symbol(desc) => palette.paint(desc, Color::Green),
        RemoteValue::Accessor => palette.paint("[Getter]", Color::Cyan),
        RemoteValue::Object { class_name, .. } => {
            palette.paint(&format!("[object {class_name}]"), Color::Cyan)
        }
    }
}

fn summarize(class_name: &str, properties: &ObjectProperties, palette: Palette) -> String {
    let shown: Vec<String> = properties
        .getters
        .iter()
        .chain(&properties.own)
        .take(PROP_SHOW_COUNT)
        .map(|(name, value)| {
            let name = palette.paint(name, Color::Magenta);
            format!("{name}: {}", inspect(value, palette))
        })
        .collect();

    let mut out = format!("{} {{", palette.paint(class_name, Color::Yellow));
    if shown.is_empty() {
        out.push('}');
        return out;
    }

    out.push(' ');
    out.push_str(&shown.join(", "));

    let total = properties.getters.len() + properties.own.len();
    if total > PROP_SHOW_COUNT {
        let more = format!("{} more", total - PROP_SHOW_COUNT);
        out.push_str(", ...");
        out.push_str(&palette.paint(&more, Color::DarkGrey));
    }
    out.push_str(" }");
    out
}

/// Number text as JavaScript's `Number.prototype.toString` writes it:
/// plain digits for exponents in `[-7, 21)`, else `1e+21` / `1.5e-7` style.
fn js_number(n: &serde_json::Number) -> String {
    let Some(f) = n.as_f64().filter(|_| n.is_f64()) else {
        return n.to_string();
    };
    if f == 0.0 {
        return "0".to_string();
    }

    // Shortest round-trip digits, e.g. "-1.2345e-7"
    let sci = format!("{:e}", f.abs());
    let Some((mantissa, exp)) = sci.split_once('e') else {
        return n.to_string();
    };
    let Ok(exp) = exp.parse::<i32>() else {
        return n.to_string();
    };
    let digits: String = mantissa.chars().filter(char::is_ascii_digit).collect();
    let k = i32::try_from(digits.len()).unwrap_or(i32::MAX);
    let point = exp + 1;

    let body = if k <= point && point <= 21 {
        let zeros = usize::try_from(point - k).unwrap_or(0);
        format!("{digits}{}", "0".repeat(zeros))
    } else if 0 < point && point <= 21 {
        let (int, frac) = digits.split_at(usize::try_from(point).unwrap_or(0));
        format!("{int}.{frac}")
    } else if -6 < point && point <= 0 {
        let zeros = usize::try_from(-point).unwrap_or(0);
        format!("0.{}{digits}", "0".repeat(zeros))
    } else {
        let (lead, rest) = digits.split_at(1);
        let sign = if exp < 0 { '-' } else { '+' };
        let rest = if rest.is_empty() {
            String::new()
        } else {
            format!(".{rest}")
        };
        format!("{lead}{rest}e{sign}{}", exp.abs())
    };

    if f < 0.0 {
        format!("-{body}")
    } else {
        body
    }
}

/// Quote a string the way `util.inspect` does: single quotes unless the
/// text contains one and no double quote.
fn quote(s: &str) -> String {
    let delim = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };

    let mut out = String::with_capacity(s.len() + 2);
    out.push(delim);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == delim => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(delim);
    out
}
