//! Part-type definitions loaded from text.
//!
//! ```text
//! (library
//!   (part_type Regulator
//!     (prefix U) (value "3.3V") (package SOT23-5)
//!     (pin OUT) (pin GND)
//!     (pin VIN (numbers 3) (type power_input))
//!     (pin EN (well VIN))))
//! ```
//!
//! Bare atoms of a `pin` form are its aliases; `(names ...)` adds more.
//! `(match_net_names)` picks pins by net name when a whole part is connected;
//! `(match_net_names DUT_)` does so after stripping `DUT_` from the net name.

use std::fmt::Display;
use std::sync::Arc;

use tracing::debug;

use crate::error::{ParseError, Result};
use crate::part::PartType;
use crate::pin::{PinSpec, PinSpecBuilder, PinType};

mod lexer;
mod parser;

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum SExpr<'a> {
    List(&'a str, Box<[SExpr<'a>]>),
    Atom(&'a str),
}

impl<'a> Display for SExpr<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SExpr::List(head, children) => {
                write!(f, "({}", head)?;
                for child in children.iter() {
                    write!(f, " {}", child)?;
                }
                write!(f, ")")
            }
            SExpr::Atom(s) => write!(f, "\"{}\"", s),
        }
    }
}

impl<'a> SExpr<'a> {
    pub fn head(&self) -> Option<&'a str> {
        match self {
            SExpr::List(head, _) => Some(*head),
            SExpr::Atom(_) => None,
        }
    }

    /// Atom children, in order
    pub fn atoms<'b>(&'b self) -> impl Iterator<Item = &'a str> + 'b {
        let children: &'b [SExpr<'a>] = match self {
            SExpr::List(_, children) => children,
            SExpr::Atom(_) => &[],
        };
        children.iter().filter_map(|child| match child {
            SExpr::Atom(s) => Some(*s),
            SExpr::List(_, _) => None,
        })
    }

    pub fn children<'b, 'c>(&'b self, label: &'c str) -> LabeledChildIterator<'a, 'b, 'c> {
        let iter = match self {
            SExpr::Atom(_) => None,
            SExpr::List(_, children) => Some(children.iter()),
        };
        LabeledChildIterator { iter, label }
    }

    pub fn child(&self, label: &str) -> Result<&SExpr<'a>, ParseError> {
        self.children(label)
            .next()
            .ok_or(ParseError::MissingChild(label.to_owned()))
    }

    pub fn has(&self, label: &str) -> bool {
        self.children(label).next().is_some()
    }

    /// First atom of the `(label ...)` child
    pub fn value(&self, label: &str) -> Result<&'a str, ParseError> {
        self.child(label)?
            .atoms()
            .next()
            .ok_or(ParseError::MissingValue(label.to_owned()))
    }

    /// Like [`value`](Self::value), but an absent child is `None`.
    pub fn optional_value(&self, label: &str) -> Result<Option<&'a str>, ParseError> {
        if self.has(label) {
            self.value(label).map(Some)
        } else {
            Ok(None)
        }
    }
}

#[derive(Debug)]
pub struct LabeledChildIterator<'a, 'b, 'c> {
    iter: Option<std::slice::Iter<'b, SExpr<'a>>>,
    label: &'c str,
}

impl<'a, 'b, 'c> Iterator for LabeledChildIterator<'a, 'b, 'c> {
    type Item = &'b SExpr<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let label = self.label;
        self.iter
            .as_mut()?
            .find(|child| matches!(child, SExpr::List(head, _) if *head == label))
    }
}

impl TryFrom<&str> for PinType {
    type Error = ParseError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.to_ascii_lowercase().as_str() {
            "unknown" => Ok(Self::Unknown),
            "primary" => Ok(Self::Primary),
            "secondary" => Ok(Self::Secondary),
            "power_input" | "power_in" => Ok(Self::PowerInput),
            "power_output" | "power_out" => Ok(Self::PowerOutput),
            "ground" => Ok(Self::Ground),
            "input" => Ok(Self::Input),
            "output" => Ok(Self::Output),
            _ => Err(ParseError::UnknownPinType(value.to_owned())),
        }
    }
}

fn pin_spec(pin: &SExpr) -> Result<PinSpecBuilder, ParseError> {
    let mut aliases: Vec<&str> = pin.atoms().collect();
    for names in pin.children("names") {
        aliases.extend(names.atoms());
    }
    let mut builder = PinSpec::builder(aliases);
    if pin.has("numbers") {
        builder = builder.numbers(pin.child("numbers")?.atoms());
    }
    if let Some(pin_type) = pin.optional_value("type")? {
        builder = builder.pin_type(pin_type.try_into()?);
    }
    if let Some(well) = pin.optional_value("well")? {
        builder = builder.well(well);
    }
    Ok(builder)
}

fn expect_form(sexpr: &SExpr, expected: &str) -> Result<(), ParseError> {
    match sexpr.head() {
        Some(head) if head == expected => Ok(()),
        found => Err(ParseError::UnexpectedForm {
            expected: expected.to_owned(),
            found: found.unwrap_or_default().to_owned(),
        }),
    }
}

/// Build the part type described by a `(part_type NAME ...)` form.
pub fn part_type(sexpr: &SExpr) -> Result<Arc<PartType>> {
    expect_form(sexpr, "part_type")?;
    let name = sexpr
        .atoms()
        .next()
        .ok_or(ParseError::MissingValue("part_type".to_owned()))?;

    let mut builder = PartType::builder(name);
    if let Ok(matching) = sexpr.child("match_net_names") {
        builder = match matching.atoms().next() {
            Some(prefix) => builder.match_net_names_prefix(prefix),
            None => builder.match_net_names(true),
        };
    }
    if let Some(prefix) = sexpr.optional_value("prefix")? {
        builder = builder.prefix(prefix);
    }
    if let Some(value) = sexpr.optional_value("value")? {
        builder = builder.value(value);
    }
    if let Some(package) = sexpr.optional_value("package")? {
        builder = builder.package(package);
    }
    if let Some(part_number) = sexpr.optional_value("part_number")? {
        builder = builder.part_number(part_number);
    }
    for pin in sexpr.children("pin") {
        builder = builder.pin(pin_spec(pin)?);
    }
    builder.build()
}

/// Load every part type of a `(library ...)` document, or the single type of
/// a bare `(part_type ...)` document.
pub fn load(input: &str) -> Result<Vec<Arc<PartType>>> {
    let root = SExpr::try_from(input)?;
    let types = if root.head() == Some("part_type") {
        vec![part_type(&root)?]
    } else {
        expect_form(&root, "library")?;
        root.children("part_type")
            .map(part_type)
            .collect::<Result<Vec<_>>>()?
    };
    debug!(count = types.len(), "loaded part library");
    Ok(types)
}
