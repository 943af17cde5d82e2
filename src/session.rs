//! Recording of the objects a build creates, and the read-only snapshot
//! handed to netlist/BOM exporters.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::{Arc, Once};

use serde::Serialize;
use tracing::debug;

use crate::net::{Direction, Net};
use crate::part::Part;
use crate::plugin::{self, NetPlugin, PartPlugin};

thread_local! {
    static ACTIVE: RefCell<Vec<Rc<Recording>>> = const { RefCell::new(Vec::new()) };
}

static INSTALL: Once = Once::new();

#[derive(Default)]
struct Recording {
    parts: RefCell<Vec<Part>>,
    nets: RefCell<Vec<Net>>,
}

/// Routes new parts and nets to the innermost session of the creating thread.
struct Recorder;

impl Recorder {
    fn with_active(f: impl FnOnce(&Recording)) {
        ACTIVE.with(|active| {
            if let Some(recording) = active.borrow().last() {
                f(recording);
            }
        });
    }
}

impl PartPlugin for Recorder {
    fn name(&self) -> &str {
        "session-recorder"
    }

    fn on_create(&self, part: &Part) {
        Self::with_active(|rec| rec.parts.borrow_mut().push(part.clone()));
    }
}

impl NetPlugin for Recorder {
    fn name(&self) -> &str {
        "session-recorder"
    }

    fn on_create(&self, net: &Net) {
        Self::with_active(|rec| rec.nets.borrow_mut().push(net.clone()));
    }
}

/// Every part and net created on this thread while the session is open.
///
/// Sessions keep what they record alive until dropped. Nested sessions
/// record into the innermost one only.
pub struct Session {
    recording: Rc<Recording>,
}

impl Session {
    pub fn begin() -> Session {
        INSTALL.call_once(|| {
            let recorder = Arc::new(Recorder);
            plugin::register_part_plugin(recorder.clone());
            plugin::register_net_plugin(recorder);
        });
        let recording = Rc::new(Recording::default());
        ACTIVE.with(|active| active.borrow_mut().push(recording.clone()));
        debug!("session opened");
        Session { recording }
    }

    /// Parts in creation order
    pub fn parts(&self) -> Vec<Part> {
        self.recording.parts.borrow().clone()
    }

    /// Nets in creation order, anonymous ones included
    pub fn nets(&self) -> Vec<Net> {
        self.recording.nets.borrow().clone()
    }

    pub fn netlist(&self) -> Netlist {
        Netlist::collect(&self.parts(), &self.nets())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        ACTIVE.with(|active| {
            active
                .borrow_mut()
                .retain(|rec| !Rc::ptr_eq(rec, &self.recording))
        });
        debug!(
            parts = self.recording.parts.borrow().len(),
            nets = self.recording.nets.borrow().len(),
            "session closed"
        );
    }
}

/// Read-only view of a finished graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Netlist {
    pub parts: Vec<PartRecord>,
    pub nets: Vec<NetRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartRecord {
    pub refdes: String,
    pub value: String,
    pub package: Option<String>,
    pub part_number: Option<String>,
    pub populated: bool,
    pub pins: Vec<PinRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PinRecord {
    pub name: String,
    pub aliases: Vec<String>,
    pub numbers: Vec<String>,
    /// Index into [`Netlist::nets`]
    pub net: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetRecord {
    /// `None` for anonymous nets
    pub name: Option<String>,
    pub members: Vec<MemberRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberRecord {
    pub refdes: String,
    pub pin: String,
    pub numbers: Vec<String>,
    pub direction: Direction,
}

impl Netlist {
    /// Snapshot `parts` and `nets`. Nets reached only through a part's pins
    /// are appended after `nets`; empty nets are skipped.
    pub fn collect(parts: &[Part], nets: &[Net]) -> Netlist {
        let mut order: Vec<Net> = vec![];
        let reached = parts
            .iter()
            .flat_map(|part| part.pins().iter().filter_map(|pin| pin.net()));
        for net in nets.iter().cloned().chain(reached) {
            if !net.is_empty() && !order.contains(&net) {
                order.push(net);
            }
        }

        let parts = parts
            .iter()
            .map(|part| PartRecord {
                refdes: part.refdes(),
                value: part.value().to_owned(),
                package: part.package().map(str::to_owned),
                part_number: part.part_number().map(str::to_owned),
                populated: part.populated(),
                pins: part
                    .pins()
                    .iter()
                    .map(|pin| PinRecord {
                        name: pin.name().to_owned(),
                        aliases: pin.aliases().to_vec(),
                        numbers: pin.numbers().to_vec(),
                        net: pin.net().and_then(|net| order.iter().position(|n| *n == net)),
                    })
                    .collect(),
            })
            .collect();

        let nets = order
            .iter()
            .map(|net| NetRecord {
                name: net.name().map(str::to_owned),
                members: net
                    .members()
                    .into_iter()
                    .map(|(pin, direction)| MemberRecord {
                        refdes: pin.part().map(|p| p.refdes()).unwrap_or_default(),
                        pin: pin.name().to_owned(),
                        numbers: pin.numbers().to_vec(),
                        direction,
                    })
                    .collect(),
            })
            .collect();

        Netlist { parts, nets }
    }
}
