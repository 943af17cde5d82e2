use std::collections::HashSet;
use std::fmt::{self, Display};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::error::{Error, Result};
use crate::net::Net;
use crate::pin::{BoundPin, PinSpec, PinSpecBuilder, PinType};
use crate::pin_list::{PinKey, PinList};
use crate::plugin::{self, Extensions};

/// A reusable component definition: refdes prefix, pin layout and defaults.
#[derive(Debug)]
pub struct PartType {
    name: String,
    refdes_prefix: String,
    value: String,
    package: Option<String>,
    part_number: Option<String>,
    pin_names_match_nets: bool,
    pin_names_match_nets_prefix: Option<String>,
    pins: Box<[Arc<PinSpec>]>,
}

impl PartType {
    pub const DEFAULT_PREFIX: &'static str = "UNK";

    pub fn builder(name: impl Into<String>) -> PartTypeBuilder {
        PartTypeBuilder {
            name: name.into(),
            refdes_prefix: Self::DEFAULT_PREFIX.to_owned(),
            value: String::new(),
            package: None,
            part_number: None,
            pin_names_match_nets: false,
            pin_names_match_nets_prefix: None,
            pins: vec![],
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn refdes_prefix(&self) -> &str {
        &self.refdes_prefix
    }

    /// Value given to parts that don't set their own
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn package(&self) -> Option<&str> {
        self.package.as_deref()
    }

    pub fn part_number(&self) -> Option<&str> {
        self.part_number.as_deref()
    }

    /// Whether connecting a whole part to a named net picks the pin of the
    /// same name.
    pub fn pin_names_match_nets(&self) -> bool {
        self.pin_names_match_nets
    }

    /// Net-name prefix ignored when matching pin names, e.g. `DUT_` so that
    /// net `DUT_JTAG_TCK` picks pin `JTAG_TCK`.
    pub fn pin_names_match_nets_prefix(&self) -> Option<&str> {
        self.pin_names_match_nets_prefix.as_deref()
    }

    pub fn pins(&self) -> &[Arc<PinSpec>] {
        &self.pins
    }

    /// A part of this type with all defaults.
    pub fn instantiate(self: &Arc<Self>) -> Result<Part> {
        self.part().build()
    }

    pub fn part(self: &Arc<Self>) -> PartBuilder {
        Part::builder(self)
    }
}

/// Assembles a [`PartType`]; pins are frozen and checked by [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct PartTypeBuilder {
    name: String,
    refdes_prefix: String,
    value: String,
    package: Option<String>,
    part_number: Option<String>,
    pin_names_match_nets: bool,
    pin_names_match_nets_prefix: Option<String>,
    pins: Vec<PinSpecBuilder>,
}

impl PartTypeBuilder {
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.refdes_prefix = prefix.into();
        self
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }

    pub fn package(mut self, package: impl Into<String>) -> Self {
        self.package = Some(package.into());
        self
    }

    pub fn part_number(mut self, part_number: impl Into<String>) -> Self {
        self.part_number = Some(part_number.into());
        self
    }

    pub fn match_net_names(mut self, yes: bool) -> Self {
        self.pin_names_match_nets = yes;
        self
    }

    /// Match pin names against net names with `prefix` stripped. Implies
    /// [`match_net_names`](Self::match_net_names).
    pub fn match_net_names_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.pin_names_match_nets = true;
        self.pin_names_match_nets_prefix = Some(prefix.into().to_uppercase());
        self
    }

    /// Append one pin: a name, a tuple or array of aliases, or a
    /// [`PinSpec::builder`] with numbers, type and well.
    pub fn pin(mut self, pin: impl Into<PinSpecBuilder>) -> Self {
        self.pins.push(pin.into());
        self
    }

    pub fn pins<I, P>(mut self, pins: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PinSpecBuilder>,
    {
        self.pins.extend(pins.into_iter().map(Into::into));
        self
    }

    /// Edit the declared pins in place, e.g. to assign wells by name pattern.
    pub fn for_each_pin(mut self, f: impl FnMut(&mut PinSpecBuilder)) -> Self {
        self.pins.iter_mut().for_each(f);
        self
    }

    pub fn build(self) -> Result<Arc<PartType>> {
        let mut seen = HashSet::new();
        let mut pins = Vec::with_capacity(self.pins.len());
        for (position, pin) in self.pins.into_iter().enumerate() {
            let spec = pin.build(position)?;
            for alias in spec.aliases() {
                if !seen.insert(alias.clone()) {
                    return Err(Error::DuplicateAlias {
                        part_type: self.name,
                        alias: alias.clone(),
                    });
                }
            }
            pins.push(Arc::new(spec));
        }
        debug!(part_type = %self.name, pins = pins.len(), "defined part type");
        Ok(Arc::new(PartType {
            name: self.name,
            refdes_prefix: self.refdes_prefix,
            value: self.value,
            package: self.package,
            part_number: self.part_number,
            pin_names_match_nets: self.pin_names_match_nets,
            pin_names_match_nets_prefix: self.pin_names_match_nets_prefix,
            pins: pins.into(),
        }))
    }
}

static NEXT_PART_ID: AtomicU64 = AtomicU64::new(1);

/// One instantiated component.
///
/// Cloning gives another handle to the same part; equality is identity.
#[derive(Clone)]
pub struct Part(pub(crate) Arc<PartInner>);

pub(crate) struct PartInner {
    id: u64,
    part_type: Arc<PartType>,
    value: String,
    package: Option<String>,
    populated: bool,
    refdes: RwLock<Option<String>>,
    pins: PinList,
    extensions: Extensions,
}

impl Part {
    pub fn new(part_type: &Arc<PartType>) -> Result<Part> {
        Self::builder(part_type).build()
    }

    pub fn builder(part_type: &Arc<PartType>) -> PartBuilder {
        PartBuilder {
            part_type: part_type.clone(),
            value: None,
            refdes: None,
            package: None,
            populated: true,
        }
    }

    /// Process-unique instance id
    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn part_type(&self) -> &Arc<PartType> {
        &self.0.part_type
    }

    pub fn value(&self) -> &str {
        &self.0.value
    }

    pub fn package(&self) -> Option<&str> {
        self.0.package.as_deref()
    }

    pub fn part_number(&self) -> Option<&str> {
        self.0.part_type.part_number()
    }

    pub fn populated(&self) -> bool {
        self.0.populated
    }

    /// The assigned reference designator, or a placeholder unique to this
    /// instance like `U?0002a`, growing past five digits as ids do.
    pub fn refdes(&self) -> String {
        match &*self.0.refdes.read().unwrap_or_else(PoisonError::into_inner) {
            Some(refdes) => refdes.clone(),
            None => placeholder_refdes(self.0.part_type.refdes_prefix(), self.0.id),
        }
    }

    pub fn has_explicit_refdes(&self) -> bool {
        self.0
            .refdes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn set_refdes(&self, refdes: impl Into<String>) {
        let refdes = refdes.into().to_uppercase();
        *self.0.refdes.write().unwrap_or_else(PoisonError::into_inner) = Some(refdes);
    }

    pub fn pins(&self) -> &PinList {
        &self.0.pins
    }

    pub fn pin<K: PinKey>(&self, key: K) -> Result<BoundPin> {
        self.0.pins.lookup(key)
    }

    /// The pin used when this whole part is connected to `net`.
    ///
    /// A part type with matching pin names picks the pin named like the net.
    /// Otherwise plugins may offer a pin, and failing that the part must have
    /// exactly one pin of `pin_type`.
    pub fn pin_to_connect(&self, pin_type: PinType, net: &Net) -> Result<BoundPin> {
        let ty = &self.0.part_type;
        if ty.pin_names_match_nets() {
            let name = net.name().map(|name| match ty.pin_names_match_nets_prefix() {
                Some(prefix) => name.strip_prefix(prefix).unwrap_or(name),
                None => name,
            });
            if let Some(pin) = name.and_then(|name| self.0.pins.get(name)) {
                return Ok(pin);
            }
        }
        if let Some(pin) = plugin::select_pin(self, net, pin_type) {
            return Ok(pin);
        }

        let mut candidates = self.0.pins.iter().filter(|p| p.pin_type() == pin_type);
        match (candidates.next(), candidates.count()) {
            (Some(pin), 0) => Ok(pin.clone()),
            (Some(_), more) => Err(Error::AmbiguousPinSelection {
                part: self.refdes(),
                pin_type,
                count: more + 1,
            }),
            (None, _) => Err(Error::NoSuchPinType {
                part: self.refdes(),
                pin_type,
            }),
        }
    }

    pub fn extensions(&self) -> &Extensions {
        &self.0.extensions
    }
}

impl PartialEq for Part {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Part {}

impl Display for Part {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.refdes(), self.value())?;
        if !self.populated() {
            write!(f, " DNS")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Part {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Part")
            .field("refdes", &self.refdes())
            .field("type", &self.0.part_type.name())
            .field("value", &self.value())
            .field("package", &self.package())
            .field("populated", &self.populated())
            .field("pins", &self.0.pins)
            .finish()
    }
}

/// Per-instance overrides of a part type's defaults
#[derive(Debug, Clone)]
pub struct PartBuilder {
    part_type: Arc<PartType>,
    value: Option<String>,
    refdes: Option<String>,
    package: Option<String>,
    populated: bool,
}

impl PartBuilder {
    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn refdes(mut self, refdes: impl Into<String>) -> Self {
        self.refdes = Some(refdes.into().to_uppercase());
        self
    }

    pub fn package(mut self, package: impl Into<String>) -> Self {
        self.package = Some(package.into());
        self
    }

    /// Mark the part as do-not-stuff when `false`.
    pub fn populated(mut self, populated: bool) -> Self {
        self.populated = populated;
        self
    }

    /// Create the part, binding every pin and resolving voltage wells.
    pub fn build(self) -> Result<Part> {
        let ty = self.part_type;
        let id = NEXT_PART_ID.fetch_add(1, Ordering::Relaxed);
        let wells = resolve_wells(&ty, || match &self.refdes {
            Some(refdes) => refdes.clone(),
            None => placeholder_refdes(ty.refdes_prefix(), id),
        })?;

        let inner = Arc::new_cyclic(|weak| {
            let mut pins = PinList::with_capacity(ty.pins().len());
            let mut bound: Vec<BoundPin> = Vec::with_capacity(ty.pins().len());
            for (position, (spec, well)) in ty.pins().iter().zip(wells).enumerate() {
                let well = well.map(|i| bound[i].clone());
                let pin = BoundPin::new(weak.clone(), spec.clone(), position, well);
                bound.push(pin.clone());
                pins.push(pin);
            }
            PartInner {
                id,
                value: self.value.unwrap_or_else(|| ty.value().to_owned()),
                package: self.package.or_else(|| ty.package().map(str::to_owned)),
                part_type: ty.clone(),
                populated: self.populated,
                refdes: RwLock::new(self.refdes),
                pins,
                extensions: Extensions::default(),
            }
        });
        let part = Part(inner);
        debug!(part = %part, part_type = ty.name(), "instantiated part");

        for pin in part.pins() {
            plugin::pin_bound(pin);
        }
        plugin::part_created(&part);
        Ok(part)
    }
}

fn placeholder_refdes(prefix: &str, id: u64) -> String {
    format!("{prefix}?{id:05x}")
}

/// Position of each pin's well among the pins declared before it.
fn resolve_wells(ty: &PartType, part: impl Fn() -> String) -> Result<Vec<Option<usize>>> {
    let specs = ty.pins();
    specs
        .iter()
        .enumerate()
        .map(|(position, spec)| {
            let Some(well) = spec.well_name() else {
                return Ok(None);
            };
            let earlier = &specs[..position];
            let found = earlier
                .iter()
                .position(|s| s.name() == well)
                .or_else(|| earlier.iter().position(|s| s.has_alias(well)))
                .ok_or_else(|| Error::UnknownWellPin {
                    part: part(),
                    pin: spec.name().to_owned(),
                    well: well.to_owned(),
                })?;
            let found_type = specs[found].pin_type();
            if !found_type.is_power() {
                return Err(Error::InvalidWellPinType {
                    part: part(),
                    pin: spec.name().to_owned(),
                    well: specs[found].name().to_owned(),
                    found: found_type,
                });
            }
            Ok(Some(found))
        })
        .collect()
}
