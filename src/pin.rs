use std::fmt::{self, Display};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock, Weak};

use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::net::{Net, Target};
use crate::part::{Part, PartInner};
use crate::plugin::{self, Extensions};

/// Electrical role of a pin
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PinType {
    #[default]
    Unknown,
    Primary,
    Secondary,
    PowerInput,
    PowerOutput,
    Ground,
    Input,
    Output,
}

impl PinType {
    pub fn as_str(self) -> &'static str {
        match self {
            PinType::Unknown => "UNKNOWN",
            PinType::Primary => "PRIMARY",
            PinType::Secondary => "SECONDARY",
            PinType::PowerInput => "POWER_INPUT",
            PinType::PowerOutput => "POWER_OUTPUT",
            PinType::Ground => "GROUND",
            PinType::Input => "INPUT",
            PinType::Output => "OUTPUT",
        }
    }

    /// Whether a pin of this type can serve as a voltage well.
    pub fn is_power(self) -> bool {
        matches!(self, PinType::PowerInput | PinType::PowerOutput)
    }
}

impl Display for PinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Anything usable as a pin's alias list. The first alias is the primary name.
pub trait Aliases {
    fn into_aliases(self) -> Vec<String>;
}

impl Aliases for &str {
    fn into_aliases(self) -> Vec<String> {
        vec![self.to_owned()]
    }
}

impl Aliases for String {
    fn into_aliases(self) -> Vec<String> {
        vec![self]
    }
}

impl Aliases for &[&str] {
    fn into_aliases(self) -> Vec<String> {
        self.iter().map(|s| (*s).to_owned()).collect()
    }
}

impl<const N: usize> Aliases for [&str; N] {
    fn into_aliases(self) -> Vec<String> {
        self.iter().map(|s| (*s).to_owned()).collect()
    }
}

impl Aliases for Vec<&str> {
    fn into_aliases(self) -> Vec<String> {
        self.into_iter().map(str::to_owned).collect()
    }
}

impl Aliases for Vec<String> {
    fn into_aliases(self) -> Vec<String> {
        self
    }
}

impl Aliases for (&str, &str) {
    fn into_aliases(self) -> Vec<String> {
        vec![self.0.to_owned(), self.1.to_owned()]
    }
}

impl Aliases for (&str, &str, &str) {
    fn into_aliases(self) -> Vec<String> {
        vec![self.0.to_owned(), self.1.to_owned(), self.2.to_owned()]
    }
}

/// Template of one pin position on a part type, shared by all its parts.
#[derive(Debug)]
pub struct PinSpec {
    aliases: Box<[String]>,
    numbers: Option<Box<[String]>>,
    pin_type: PinType,
    well_name: Option<String>,
    extensions: Extensions,
}

impl PinSpec {
    pub fn builder(aliases: impl Aliases) -> PinSpecBuilder {
        PinSpecBuilder {
            aliases: aliases.into_aliases(),
            ..Default::default()
        }
    }

    /// Primary (display) name
    pub fn name(&self) -> &str {
        &self.aliases[0]
    }

    /// All aliases, upper-cased, primary first
    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    pub fn has_alias(&self, alias: &str) -> bool {
        let alias = alias.to_uppercase();
        self.aliases.iter().any(|a| *a == alias)
    }

    /// Explicit pin numbers, `None` when numbering is left to position
    pub fn numbers(&self) -> Option<&[String]> {
        self.numbers.as_deref()
    }

    pub fn number(&self) -> Option<&str> {
        self.numbers().and_then(|n| n.first()).map(String::as_str)
    }

    pub fn pin_type(&self) -> PinType {
        self.pin_type
    }

    pub fn well_name(&self) -> Option<&str> {
        self.well_name.as_deref()
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }
}

impl Display for PinSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pin {}", self.name())
    }
}

/// A pin declaration that has not been frozen into a part type yet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PinSpecBuilder {
    aliases: Vec<String>,
    numbers: Option<Vec<String>>,
    pin_type: PinType,
    well: Option<String>,
}

impl PinSpecBuilder {
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn numbers<I, S>(mut self, numbers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let numbers: Vec<String> = numbers.into_iter().map(Into::into).collect();
        self.numbers = (!numbers.is_empty()).then_some(numbers);
        self
    }

    pub fn number(self, number: impl Into<String>) -> Self {
        self.numbers([number.into()])
    }

    pub fn pin_type(mut self, pin_type: PinType) -> Self {
        self.pin_type = pin_type;
        self
    }

    pub fn well(mut self, well: impl Into<String>) -> Self {
        self.set_well(well);
        self
    }

    /// In-place variant of [`well`](Self::well) for loops over a pin list.
    pub fn set_well(&mut self, well: impl Into<String>) {
        self.well = Some(well.into());
    }

    /// Make `alias` the primary name, keeping the others in order.
    pub fn promote_alias(&mut self, alias: &str) {
        let alias = alias.to_uppercase();
        if let Some(i) = self.aliases.iter().position(|a| a.to_uppercase() == alias) {
            let name = self.aliases.remove(i);
            self.aliases.insert(0, name);
        }
    }

    /// Primary name as declared (not yet upper-cased)
    pub fn name(&self) -> Option<&str> {
        self.aliases.first().map(String::as_str)
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    /// Freeze the declaration. `position` only labels the error.
    pub(crate) fn build(self, position: usize) -> Result<PinSpec> {
        let aliases: Box<[String]> = self
            .aliases
            .iter()
            .map(|a| a.trim().to_uppercase())
            .filter(|a| !a.is_empty())
            .collect();
        if aliases.is_empty() {
            return Err(Error::EmptyPinAliases { position });
        }
        let spec = PinSpec {
            aliases,
            numbers: self.numbers.map(Vec::into_boxed_slice),
            pin_type: self.pin_type,
            well_name: self.well.map(|w| w.to_uppercase()),
            extensions: Extensions::default(),
        };
        plugin::pin_spec_created(&spec);
        Ok(spec)
    }
}

impl<A: Aliases> From<A> for PinSpecBuilder {
    fn from(aliases: A) -> Self {
        PinSpec::builder(aliases)
    }
}

/// One pin of one part instance.
///
/// Cloning gives another handle to the same pin; equality is identity.
#[derive(Clone)]
pub struct BoundPin(pub(crate) Arc<BoundPinInner>);

pub(crate) struct BoundPinInner {
    part: Weak<PartInner>,
    spec: Arc<PinSpec>,
    position: usize,
    numbers: Box<[String]>,
    well: Option<BoundPin>,
    net: OnceLock<Net>,
    extensions: Extensions,
}

impl BoundPin {
    pub(crate) fn new(
        part: Weak<PartInner>,
        spec: Arc<PinSpec>,
        position: usize,
        well: Option<BoundPin>,
    ) -> Self {
        let numbers = match spec.numbers() {
            Some(numbers) => numbers.into(),
            None => Box::new([position.to_string()]) as Box<[String]>,
        };
        BoundPin(Arc::new(BoundPinInner {
            part,
            spec,
            position,
            numbers,
            well,
            net: OnceLock::new(),
            extensions: Extensions::default(),
        }))
    }

    pub(crate) fn downgrade(&self) -> Weak<BoundPinInner> {
        Arc::downgrade(&self.0)
    }

    pub(crate) fn upgrade(weak: &Weak<BoundPinInner>) -> Option<BoundPin> {
        weak.upgrade().map(BoundPin)
    }

    /// The owning part, `None` once every handle to it is gone
    pub fn part(&self) -> Option<Part> {
        self.0.part.upgrade().map(Part)
    }

    pub fn spec(&self) -> &PinSpec {
        &self.0.spec
    }

    pub fn name(&self) -> &str {
        self.0.spec.name()
    }

    pub fn aliases(&self) -> &[String] {
        self.0.spec.aliases()
    }

    pub fn pin_type(&self) -> PinType {
        self.0.spec.pin_type()
    }

    /// Zero-based declaration position on the part
    pub fn position(&self) -> usize {
        self.0.position
    }

    /// Resolved pin numbers, never empty
    pub fn numbers(&self) -> &[String] {
        &self.0.numbers
    }

    pub fn number(&self) -> &str {
        &self.0.numbers[0]
    }

    /// Power pin this pin's voltage level is referenced to
    pub fn well(&self) -> Option<&BoundPin> {
        self.0.well.as_ref()
    }

    pub fn net(&self) -> Option<Net> {
        self.0.net.get().cloned()
    }

    pub fn is_connected(&self) -> bool {
        self.0.net.get().is_some()
    }

    /// The pin's net, joining a fresh anonymous net with an unknown
    /// direction if the pin has none yet.
    pub fn net_or_anonymous(&self) -> Result<Net> {
        match self.net() {
            Some(net) => Ok(net),
            None => Net::anonymous().connect(self, crate::Direction::Unknown, PinType::Primary),
        }
    }

    /// Connect `targets` as inputs of this pin's net.
    ///
    /// An unattached pin first becomes the output of a fresh anonymous net.
    pub fn connect_input(&self, targets: impl Into<Target>) -> Result<Net> {
        let net = match self.net() {
            Some(net) => net,
            None => {
                debug!(pin = %self, "pin drives a new anonymous net");
                Net::anonymous().connect_output(self)?
            }
        };
        net.connect_input(targets)
    }

    /// Connect `targets` as outputs of this pin's net.
    ///
    /// An unattached pin first becomes the input of a fresh anonymous net.
    pub fn connect_output(&self, targets: impl Into<Target>) -> Result<Net> {
        let net = match self.net() {
            Some(net) => net,
            None => {
                debug!(pin = %self, "pin is driven by a new anonymous net");
                Net::anonymous().connect_input(self)?
            }
        };
        net.connect_output(targets)
    }

    pub fn extensions(&self) -> &Extensions {
        &self.0.extensions
    }

    /// One-shot net assignment. Fails even when `net` is the current net.
    pub(crate) fn attach(&self, net: &Net) -> Result<()> {
        self.0
            .net
            .set(net.clone())
            .map_err(|rejected| Error::PinAlreadyConnected {
                pin: self.to_string(),
                net: self
                    .net()
                    .map(|n| n.to_string())
                    .unwrap_or_default(),
                new_net: rejected.to_string(),
            })
    }
}

impl PartialEq for BoundPin {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for BoundPin {}

impl Hash for BoundPin {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.0).hash(state)
    }
}

impl Display for BoundPin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.part() {
            Some(part) => write!(f, "{}.{}", part.refdes(), self.name()),
            None => write!(f, "?.{}", self.name()),
        }
    }
}

impl fmt::Debug for BoundPin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundPin")
            .field("pin", &self.to_string())
            .field("numbers", &self.numbers())
            .field("type", &self.pin_type())
            .field("net", &self.net().map(|n| n.to_string()))
            .finish()
    }
}
