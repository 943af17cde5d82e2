use std::any::Any;
use std::fmt::{self, Display};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::part::Part;
use crate::pin::{BoundPin, BoundPinInner, PinType};
use crate::plugin::{self, Extensions};

/// Direction a pin was connected with, seen from the net
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    #[default]
    Unknown,
    In,
    Out,
}

/// Anything a net can be connected to.
#[derive(Clone)]
pub enum Target {
    Net(Net),
    Part(Part),
    Pin(BoundPin),
    /// Connected element by element, in order
    Group(Vec<Target>),
    /// A value from a dynamic host; must hold a `Net`, `Part`, `BoundPin`
    /// or `Vec<Target>`
    Dynamic(Arc<dyn Any + Send + Sync>),
}

impl Target {
    fn from_dynamic(value: Arc<dyn Any + Send + Sync>) -> Result<Target> {
        if let Some(net) = value.downcast_ref::<Net>() {
            return Ok(Target::Net(net.clone()));
        }
        if let Some(part) = value.downcast_ref::<Part>() {
            return Ok(Target::Part(part.clone()));
        }
        if let Some(pin) = value.downcast_ref::<BoundPin>() {
            return Ok(Target::Pin(pin.clone()));
        }
        match Arc::downcast::<Vec<Target>>(value) {
            Ok(group) => Ok(Target::Group((*group).clone())),
            Err(other) => Err(Error::UnsupportedConnectTarget(format!(
                "value of type {:?}",
                (*other).type_id()
            ))),
        }
    }
}

impl From<Net> for Target {
    fn from(net: Net) -> Self {
        Target::Net(net)
    }
}

impl From<&Net> for Target {
    fn from(net: &Net) -> Self {
        Target::Net(net.clone())
    }
}

impl From<Part> for Target {
    fn from(part: Part) -> Self {
        Target::Part(part)
    }
}

impl From<&Part> for Target {
    fn from(part: &Part) -> Self {
        Target::Part(part.clone())
    }
}

impl From<BoundPin> for Target {
    fn from(pin: BoundPin) -> Self {
        Target::Pin(pin)
    }
}

impl From<&BoundPin> for Target {
    fn from(pin: &BoundPin) -> Self {
        Target::Pin(pin.clone())
    }
}

impl<T: Into<Target>> From<Vec<T>> for Target {
    fn from(items: Vec<T>) -> Self {
        Target::Group(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Target>, const N: usize> From<[T; N]> for Target {
    fn from(items: [T; N]) -> Self {
        Target::Group(items.into_iter().map(Into::into).collect())
    }
}

impl<A: Into<Target>, B: Into<Target>> From<(A, B)> for Target {
    fn from((a, b): (A, B)) -> Self {
        Target::Group(vec![a.into(), b.into()])
    }
}

impl<A: Into<Target>, B: Into<Target>, C: Into<Target>> From<(A, B, C)> for Target {
    fn from((a, b, c): (A, B, C)) -> Self {
        Target::Group(vec![a.into(), b.into(), c.into()])
    }
}

impl From<Arc<dyn Any + Send + Sync>> for Target {
    fn from(value: Arc<dyn Any + Send + Sync>) -> Self {
        Target::Dynamic(value)
    }
}

/// A set of electrically joined pins, each tagged with a direction.
///
/// Cloning gives another handle to the same net; equality is identity.
#[derive(Clone)]
pub struct Net(Arc<NetInner>);

struct NetInner {
    name: Option<String>,
    members: RwLock<Vec<Member>>,
    extensions: Extensions,
}

// Pins are owned by their parts; a net only refers to them.
struct Member {
    pin: Weak<BoundPinInner>,
    direction: Direction,
}

impl Net {
    /// Nets with at least this many members describe themselves by count.
    pub const MAX_DISPLAY_CONNECTIONS: usize = 10;

    pub fn new(name: impl Into<String>) -> Net {
        Self::create(Some(name.into().to_uppercase()))
    }

    pub fn anonymous() -> Net {
        Self::create(None)
    }

    fn create(name: Option<String>) -> Net {
        let net = Net(Arc::new(NetInner {
            name,
            members: RwLock::new(vec![]),
            extensions: Extensions::default(),
        }));
        plugin::net_created(&net);
        net
    }

    pub fn name(&self) -> Option<&str> {
        self.0.name.as_deref()
    }

    pub fn is_anonymous(&self) -> bool {
        self.0.name.is_none()
    }

    /// Join `targets` to this net with `direction`.
    ///
    /// Whole parts contribute the pin picked by [`Part::pin_to_connect`] for
    /// `pin_type`. Every pin can join a net once only, and nets are never
    /// merged. On error the pins connected before the failing target stay
    /// connected. Returns this net for chaining.
    ///
    /// A net only refers to its members: parts must outlive the net, or be
    /// built inside a [`Session`](crate::Session) that keeps them alive.
    /// Otherwise a part created inline in the call drops out of
    /// [`members`](Self::members) once it goes out of scope.
    pub fn connect(
        &self,
        targets: impl Into<Target>,
        direction: Direction,
        pin_type: PinType,
    ) -> Result<Net> {
        self.connect_target(targets.into(), direction, pin_type)?;
        Ok(self.clone())
    }

    /// Connect primary pins of `targets` as inputs.
    pub fn connect_input(&self, targets: impl Into<Target>) -> Result<Net> {
        self.connect(targets, Direction::In, PinType::Primary)
    }

    /// Connect primary pins of `targets` as outputs.
    pub fn connect_output(&self, targets: impl Into<Target>) -> Result<Net> {
        self.connect(targets, Direction::Out, PinType::Primary)
    }

    fn connect_target(&self, target: Target, direction: Direction, pin_type: PinType) -> Result<()> {
        let pin = match target {
            Target::Group(items) => {
                return items
                    .into_iter()
                    .try_for_each(|item| self.connect_target(item, direction, pin_type));
            }
            Target::Dynamic(value) => {
                return self.connect_target(Target::from_dynamic(value)?, direction, pin_type);
            }
            Target::Net(other) => {
                return Err(Error::NetToNetConnectionUnsupported {
                    net: self.to_string(),
                    other: other.to_string(),
                });
            }
            Target::Part(part) => part.pin_to_connect(pin_type, self)?,
            Target::Pin(pin) => pin,
        };

        pin.attach(self)?;
        self.0
            .members
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Member {
                pin: pin.downgrade(),
                direction,
            });
        debug!(net = %self, %pin, ?direction, "connected");
        Ok(())
    }

    /// Member pins with their directions, in connection order
    pub fn members(&self) -> Vec<(BoundPin, Direction)> {
        self.0
            .members
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter_map(|m| BoundPin::upgrade(&m.pin).map(|pin| (pin, m.direction)))
            .collect()
    }

    /// Member pins in connection order
    pub fn connections(&self) -> Vec<BoundPin> {
        self.members().into_iter().map(|(pin, _)| pin).collect()
    }

    pub fn direction_of(&self, pin: &BoundPin) -> Option<Direction> {
        self.members()
            .into_iter()
            .find(|(member, _)| member == pin)
            .map(|(_, direction)| direction)
    }

    pub fn len(&self) -> usize {
        self.members().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `NAME(connected to R1.A, R2.B)`, `NAME(unconnected)` or
    /// `NAME(12 connections)`.
    pub fn describe(&self) -> String {
        let connected = self.connections();
        let inside = match connected.len() {
            0 => "unconnected".to_owned(),
            n if n >= Self::MAX_DISPLAY_CONNECTIONS => format!("{n} connections"),
            _ => {
                let pins: Vec<String> = connected.iter().map(ToString::to_string).collect();
                format!("connected to {}", pins.join(", "))
            }
        };
        format!("{self}({inside})")
    }

    pub fn extensions(&self) -> &Extensions {
        &self.0.extensions
    }
}

impl PartialEq for Net {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Net {}

impl Display for Net {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name().unwrap_or("AnonymousNet"))
    }
}

impl fmt::Debug for Net {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

#[cfg(test)]
mod tests {
    use rstest::*;

    use super::*;
    use crate::{PartType, PinSpec};

    #[fixture]
    fn resistor() -> Arc<PartType> {
        PartType::builder("Resistor")
            .prefix("R")
            .pins(["A", "B"])
            .build()
            .unwrap()
    }

    #[rstest]
    fn resistor_between_two_rails(resistor: Arc<PartType>) {
        let r = resistor.instantiate().unwrap();
        Net::new("VCC").connect_input(r.pin("A").unwrap()).unwrap();
        Net::new("GND").connect_input(r.pin("B").unwrap()).unwrap();

        let a = r.pin("A").unwrap();
        let b = r.pin("B").unwrap();
        let vcc = a.net().unwrap();
        let gnd = b.net().unwrap();
        assert_eq!(vcc.name(), Some("VCC"));
        assert_eq!(gnd.name(), Some("GND"));
        assert_eq!(vcc.direction_of(&a), Some(Direction::In));
        assert_eq!(gnd.direction_of(&b), Some(Direction::In));
    }

    #[test]
    fn names_are_upper_cased() {
        assert_eq!(Net::new("pp3300").name(), Some("PP3300"));
        assert_eq!(Net::new("pp3300").to_string(), "PP3300");
        assert_eq!(Net::anonymous().to_string(), "AnonymousNet");
        assert_ne!(Net::new("X"), Net::new("X"));
    }

    #[rstest]
    fn pins_join_a_net_at_most_once(resistor: Arc<PartType>) {
        let p = resistor.instantiate().unwrap();
        let a = p.pin("A").unwrap();
        let n1 = Net::new("N1").connect_input(&a).unwrap();
        let n2 = Net::new("N2");

        let err = n2.connect_input(&a).unwrap_err();
        assert!(matches!(err, Error::PinAlreadyConnected { ref net, .. } if net == "N1"));
        assert_eq!(a.net(), Some(n1.clone()));
        assert!(n2.is_empty());

        let err = n1.connect_output(&a).unwrap_err();
        assert!(matches!(err, Error::PinAlreadyConnected { .. }));
        assert_eq!(n1.members(), vec![(a, Direction::In)]);
    }

    #[rstest]
    fn groups_keep_order_and_direction(resistor: Arc<PartType>) {
        let r1 = resistor.instantiate().unwrap();
        let r2 = resistor.instantiate().unwrap();
        let r3 = resistor.instantiate().unwrap();
        let pins = vec![
            r1.pin("B").unwrap(),
            r2.pin("A").unwrap(),
            r3.pin("B").unwrap(),
        ];

        let net = Net::new("BUS").connect_output(pins.clone()).unwrap();
        let expected: Vec<_> = pins.into_iter().map(|p| (p, Direction::Out)).collect();
        assert_eq!(net.members(), expected);
    }

    #[rstest]
    fn chained_connects_accumulate(resistor: Arc<PartType>) {
        let r1 = resistor.instantiate().unwrap();
        let r2 = resistor.instantiate().unwrap();

        let net = Net::new("CHAIN")
            .connect_input(r1.pin("A").unwrap())
            .unwrap()
            .connect_output((r1.pin("B").unwrap(), r2.pin("A").unwrap()))
            .unwrap()
            .connect_input([r2.pin("B").unwrap()])
            .unwrap();

        let directions: Vec<_> = net
            .members()
            .into_iter()
            .map(|(pin, dir)| (pin.to_string(), dir))
            .collect();
        assert_eq!(
            directions,
            vec![
                (format!("{}.A", r1.refdes()), Direction::In),
                (format!("{}.B", r1.refdes()), Direction::Out),
                (format!("{}.A", r2.refdes()), Direction::Out),
                (format!("{}.B", r2.refdes()), Direction::In),
            ]
        );
    }

    #[rstest]
    fn failing_group_keeps_the_prefix(resistor: Arc<PartType>) {
        let r = resistor.instantiate().unwrap();
        let a = r.pin("A").unwrap();
        let b = r.pin("B").unwrap();
        Net::new("TAKEN").connect_input(&b).unwrap();

        let net = Net::new("PARTIAL");
        let err = net.connect_input(vec![a.clone(), b.clone()]).unwrap_err();
        assert!(matches!(err, Error::PinAlreadyConnected { .. }));
        assert_eq!(net.connections(), vec![a]);
        assert_eq!(b.net().unwrap().name(), Some("TAKEN"));
    }

    #[test]
    fn nets_are_never_merged() {
        let a = Net::new("A");
        let b = Net::new("B");
        let err = a.connect_input(&b).unwrap_err();
        assert!(matches!(
            err,
            Error::NetToNetConnectionUnsupported { ref net, ref other } if net == "A" && other == "B"
        ));
        assert!(matches!(
            a.connect_input(&a).unwrap_err(),
            Error::NetToNetConnectionUnsupported { .. }
        ));
    }

    fn transistor() -> Arc<PartType> {
        PartType::builder("Fet")
            .prefix("Q")
            .pin(PinSpec::builder("G").pin_type(PinType::Primary))
            .pin(PinSpec::builder("D").pin_type(PinType::Secondary))
            .pin(PinSpec::builder("S").pin_type(PinType::Secondary))
            .build()
            .unwrap()
    }

    #[test]
    fn whole_part_connects_its_unique_primary_pin() {
        let q = transistor().instantiate().unwrap();
        let net = Net::new("GATE").connect_input(&q).unwrap();
        assert_eq!(net.connections(), vec![q.pin("G").unwrap()]);
    }

    #[test]
    fn whole_part_needs_exactly_one_pin_of_the_type() {
        let q = transistor().instantiate().unwrap();
        let err = Net::new("X")
            .connect(&q, Direction::In, PinType::Secondary)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::AmbiguousPinSelection { pin_type: PinType::Secondary, count: 2, .. }
        ));

        let err = Net::new("Y")
            .connect(&q, Direction::In, PinType::Ground)
            .unwrap_err();
        assert!(matches!(err, Error::NoSuchPinType { pin_type: PinType::Ground, .. }));
        assert!(q.pins().iter().all(|p| !p.is_connected()));
    }

    #[test]
    fn whole_part_matches_pin_named_like_the_net() {
        let ec = PartType::builder("Ec")
            .prefix("U")
            .match_net_names(true)
            .pin(("PA9", "EC_UART_TX"))
            .pin(("PA10", "EC_UART_RX"))
            .build()
            .unwrap()
            .instantiate()
            .unwrap();

        let tx = Net::new("ec_uart_tx").connect_input(&ec).unwrap();
        let rx = Net::new("EC_UART_RX").connect_output(&ec).unwrap();
        assert_eq!(tx.connections(), vec![ec.pin("PA9").unwrap()]);
        assert_eq!(rx.direction_of(&ec.pin("PA10").unwrap()), Some(Direction::Out));

        // no pin of that name and no primary pin to fall back on
        assert!(matches!(
            Net::new("OTHER").connect_input(&ec).unwrap_err(),
            Error::NoSuchPinType { .. }
        ));
    }

    #[rstest]
    fn inline_parts_stay_members_inside_a_session(resistor: Arc<PartType>) {
        let kept = resistor.instantiate().unwrap();
        let net = Net::new("INLINE");
        {
            let _session = crate::Session::begin();
            net.connect_input(kept.pin("A").unwrap()).unwrap();
            net.connect_input(resistor.instantiate().unwrap().pin("B").unwrap())
                .unwrap();
            assert_eq!(net.len(), 2);
        }
        // the session held the inline part; once closed only `kept` remains
        assert_eq!(net.connections(), vec![kept.pin("A").unwrap()]);
    }

    #[test]
    fn whole_part_matches_net_names_after_a_prefix() {
        let connector = PartType::builder("ServoConnector")
            .prefix("J")
            .match_net_names_prefix("dut_")
            .pins(["JTAG_TCK", "JTAG_TMS"])
            .pin(PinSpec::builder("GND").pin_type(PinType::Primary))
            .build()
            .unwrap()
            .instantiate()
            .unwrap();
        assert!(connector.part_type().pin_names_match_nets());

        let tck = Net::new("DUT_JTAG_TCK").connect_input(&connector).unwrap();
        assert_eq!(tck.connections(), vec![connector.pin("JTAG_TCK").unwrap()]);

        // unprefixed names still match directly
        let tms = Net::new("JTAG_TMS").connect_input(&connector).unwrap();
        assert_eq!(tms.connections(), vec![connector.pin("JTAG_TMS").unwrap()]);

        // a prefixed name with no such pin falls back to the primary pin
        let other = Net::new("DUT_RESET").connect_input(&connector).unwrap();
        assert_eq!(other.connections(), vec![connector.pin("GND").unwrap()]);
    }

    #[rstest]
    fn pin_side_connect_creates_anonymous_net(resistor: Arc<PartType>) {
        let r1 = resistor.instantiate().unwrap();
        let r2 = resistor.instantiate().unwrap();
        let a = r1.pin("A").unwrap();

        let net = a.connect_input(r2.pin("A").unwrap()).unwrap();
        assert!(net.is_anonymous());
        assert_eq!(a.net(), Some(net.clone()));
        assert_eq!(net.direction_of(&a), Some(Direction::Out));
        assert_eq!(net.direction_of(&r2.pin("A").unwrap()), Some(Direction::In));

        // attached pins reuse their net
        let again = a.connect_output(r2.pin("B").unwrap()).unwrap();
        assert_eq!(again, net);
        assert_eq!(net.len(), 3);
    }

    #[rstest]
    fn pin_side_output_seeds_pin_as_input(resistor: Arc<PartType>) {
        let r = resistor.instantiate().unwrap();
        let a = r.pin("A").unwrap();
        let net = a.connect_output(r.pin("B").unwrap()).unwrap();
        assert_eq!(
            net.members(),
            vec![(a, Direction::In), (r.pin("B").unwrap(), Direction::Out)]
        );
    }

    #[rstest]
    fn dynamic_targets_are_downcast(resistor: Arc<PartType>) {
        let r = resistor.instantiate().unwrap();
        let pin: Arc<dyn Any + Send + Sync> = Arc::new(r.pin("A").unwrap());
        let net = Net::new("DYN").connect_input(pin).unwrap();
        assert_eq!(net.connections(), vec![r.pin("A").unwrap()]);

        let junk: Arc<dyn Any + Send + Sync> = Arc::new(42u8);
        assert!(matches!(
            net.connect_input(junk).unwrap_err(),
            Error::UnsupportedConnectTarget(_)
        ));

        let group: Arc<dyn Any + Send + Sync> = Arc::new(vec![Target::from(r.pin("B").unwrap())]);
        net.connect_input(group).unwrap();
        assert_eq!(net.len(), 2);
    }

    #[rstest]
    fn describe_lists_or_counts_members(resistor: Arc<PartType>) {
        let net = Net::new("SENSE");
        assert_eq!(net.describe(), "SENSE(unconnected)");

        let r = resistor.part().refdes("R5").build().unwrap();
        net.connect_input(r.pin("A").unwrap()).unwrap();
        net.connect_input(r.pin("B").unwrap()).unwrap();
        assert_eq!(net.describe(), "SENSE(connected to R5.A, R5.B)");

        let parts: Vec<_> = (0..4).map(|_| resistor.instantiate().unwrap()).collect();
        let pins: Vec<_> = parts
            .iter()
            .flat_map(|p| p.pins().iter().cloned().collect::<Vec<_>>())
            .collect();
        net.connect_input(pins).unwrap();
        assert_eq!(net.describe(), "SENSE(10 connections)");
    }
}
