use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::pin::BoundPin;

/// Ordered pins of one part, indexed by primary name.
///
/// Lookups by name are case-insensitive and fall back to scanning every
/// pin's full alias list, so any alias resolves to the same pin.
#[derive(Debug, Default)]
pub struct PinList {
    pins: Vec<BoundPin>,
    by_name: HashMap<String, usize>,
}

/// Ways of naming a pin in a [`PinList`]
pub trait PinKey {
    fn find(&self, pins: &PinList) -> Option<BoundPin>;

    fn describe(&self) -> String;
}

impl PinKey for usize {
    fn find(&self, pins: &PinList) -> Option<BoundPin> {
        pins.pins.get(*self).cloned()
    }

    fn describe(&self) -> String {
        format!("#{self}")
    }
}

/// Negative positions count from the last pin, so `-1` is the last one.
impl PinKey for isize {
    fn find(&self, pins: &PinList) -> Option<BoundPin> {
        let index = if *self < 0 {
            pins.len().checked_sub(self.unsigned_abs())?
        } else {
            self.unsigned_abs()
        };
        pins.pins.get(index).cloned()
    }

    fn describe(&self) -> String {
        format!("#{self}")
    }
}

impl PinKey for &str {
    fn find(&self, pins: &PinList) -> Option<BoundPin> {
        pins.by_alias(self)
    }

    fn describe(&self) -> String {
        self.to_uppercase()
    }
}

impl PinKey for String {
    fn find(&self, pins: &PinList) -> Option<BoundPin> {
        pins.by_alias(self)
    }

    fn describe(&self) -> String {
        self.to_uppercase()
    }
}

impl PinList {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            pins: Vec::with_capacity(capacity),
            by_name: HashMap::with_capacity(capacity),
        }
    }

    pub(crate) fn push(&mut self, pin: BoundPin) {
        self.by_name.insert(pin.name().to_owned(), self.pins.len());
        self.pins.push(pin);
    }

    pub fn get<K: PinKey>(&self, key: K) -> Option<BoundPin> {
        key.find(self)
    }

    /// Like [`get`](Self::get) but a miss is an [`Error::UnknownPin`].
    pub fn lookup<K: PinKey>(&self, key: K) -> Result<BoundPin> {
        key.find(self).ok_or_else(|| Error::UnknownPin {
            part: self
                .pins
                .first()
                .and_then(BoundPin::part)
                .map(|part| part.refdes())
                .unwrap_or_else(|| "?".to_owned()),
            pin: key.describe(),
        })
    }

    fn by_alias(&self, alias: &str) -> Option<BoundPin> {
        let alias = alias.to_uppercase();
        if let Some(&i) = self.by_name.get(&alias) {
            return Some(self.pins[i].clone());
        }
        self.pins
            .iter()
            .find(|pin| pin.aliases().contains(&alias))
            .cloned()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, BoundPin> {
        self.pins.iter()
    }

    pub fn len(&self) -> usize {
        self.pins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }
}

impl<'a> IntoIterator for &'a PinList {
    type Item = &'a BoundPin;
    type IntoIter = std::slice::Iter<'a, BoundPin>;

    fn into_iter(self) -> Self::IntoIter {
        self.pins.iter()
    }
}
