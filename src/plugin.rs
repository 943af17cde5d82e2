//! Process-wide extension points.
//!
//! Every [`Net`], [`PinSpec`], [`BoundPin`] and [`Part`] runs the hooks of the
//! plugins registered for its kind once, right after its own fields are set.
//! Plugins keep their own per-instance state in the [`Extensions`] slot the
//! core types carry, so the core never depends on them. Registration is
//! permanent for the life of the process.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::trace;

use crate::{BoundPin, Net, Part, PinSpec, PinType};

pub trait NetPlugin: Send + Sync {
    fn name(&self) -> &str;

    fn on_create(&self, _net: &Net) {}
}

pub trait PinPlugin: Send + Sync {
    fn name(&self) -> &str;

    /// Runs when a pin template is frozen into a part type.
    fn on_create(&self, _spec: &PinSpec) {}

    /// Runs for each pin of a freshly instantiated part, before the part's
    /// own hooks.
    fn on_bind(&self, _pin: &BoundPin) {}
}

pub trait PartPlugin: Send + Sync {
    fn name(&self) -> &str;

    fn on_create(&self, _part: &Part) {}

    /// Offer a pin when a whole part is connected to `net`. The first plugin
    /// returning `Some` pin of `part` wins; `None`, or a pin of another part,
    /// defers to the next plugin and finally to the unique-pin-of-type rule.
    fn select_pin(&self, _part: &Part, _net: &Net, _pin_type: PinType) -> Option<BoundPin> {
        None
    }
}

struct Registry<P: ?Sized> {
    entries: RwLock<Vec<Arc<P>>>,
}

impl<P: ?Sized> Registry<P> {
    const fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    fn push(&self, plugin: Arc<P>) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(plugin);
    }

    // Hooks run on a copy so a hook may itself create objects or register plugins.
    fn snapshot(&self) -> Vec<Arc<P>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

static NET_PLUGINS: Registry<dyn NetPlugin> = Registry::new();
static PIN_PLUGINS: Registry<dyn PinPlugin> = Registry::new();
static PART_PLUGINS: Registry<dyn PartPlugin> = Registry::new();

pub fn register_net_plugin(plugin: Arc<dyn NetPlugin>) {
    trace!(plugin = plugin.name(), "register net plugin");
    NET_PLUGINS.push(plugin);
}

pub fn register_pin_plugin(plugin: Arc<dyn PinPlugin>) {
    trace!(plugin = plugin.name(), "register pin plugin");
    PIN_PLUGINS.push(plugin);
}

pub fn register_part_plugin(plugin: Arc<dyn PartPlugin>) {
    trace!(plugin = plugin.name(), "register part plugin");
    PART_PLUGINS.push(plugin);
}

/// `(kind, name)` of every registered plugin, in registration order per kind.
pub fn registered_names() -> Vec<(&'static str, String)> {
    let nets = NET_PLUGINS
        .snapshot()
        .into_iter()
        .map(|p| ("net", p.name().to_owned()));
    let pins = PIN_PLUGINS
        .snapshot()
        .into_iter()
        .map(|p| ("pin", p.name().to_owned()));
    let parts = PART_PLUGINS
        .snapshot()
        .into_iter()
        .map(|p| ("part", p.name().to_owned()));
    nets.chain(pins).chain(parts).collect()
}

pub(crate) fn net_created(net: &Net) {
    for plugin in NET_PLUGINS.snapshot() {
        trace!(plugin = plugin.name(), %net, "net hook");
        plugin.on_create(net);
    }
}

pub(crate) fn pin_spec_created(spec: &PinSpec) {
    for plugin in PIN_PLUGINS.snapshot() {
        trace!(plugin = plugin.name(), %spec, "pin hook");
        plugin.on_create(spec);
    }
}

pub(crate) fn pin_bound(pin: &BoundPin) {
    for plugin in PIN_PLUGINS.snapshot() {
        trace!(plugin = plugin.name(), %pin, "bound pin hook");
        plugin.on_bind(pin);
    }
}

pub(crate) fn part_created(part: &Part) {
    for plugin in PART_PLUGINS.snapshot() {
        trace!(plugin = plugin.name(), %part, "part hook");
        plugin.on_create(part);
    }
}

// Pins of other parts are never accepted.
pub(crate) fn select_pin(part: &Part, net: &Net, pin_type: PinType) -> Option<BoundPin> {
    PART_PLUGINS.snapshot().iter().find_map(|plugin| {
        let pin = plugin.select_pin(part, net, pin_type)?;
        if pin.part().as_ref() == Some(part) {
            Some(pin)
        } else {
            trace!(plugin = plugin.name(), %pin, %part, "ignored pin of another part");
            None
        }
    })
}

/// Type-keyed state attached to a core object by plugins.
#[derive(Default)]
pub struct Extensions {
    map: RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl Extensions {
    /// Attach `value`, replacing any earlier value of the same type.
    pub fn insert<T: Any + Send + Sync>(&self, value: T) {
        self.map
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(TypeId::of::<T>(), Arc::new(value));
    }

    pub fn get<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        let entry = self
            .map
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&TypeId::of::<T>())
            .cloned()?;
        entry.downcast::<T>().ok()
    }

    pub fn contains<T: Any + Send + Sync>(&self) -> bool {
        self.map
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.map.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for Extensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extensions")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::PartType;

    #[derive(Debug, PartialEq)]
    struct Tag(&'static str);

    #[test]
    fn extensions_are_keyed_by_type() {
        let ext = Extensions::default();
        assert!(ext.is_empty());

        ext.insert(Tag("a"));
        ext.insert(7u32);
        ext.insert(Tag("b"));

        assert_eq!(ext.len(), 2);
        assert_eq!(*ext.get::<Tag>().unwrap(), Tag("b"));
        assert_eq!(*ext.get::<u32>().unwrap(), 7);
        assert!(ext.get::<String>().is_none());
        assert!(!ext.contains::<String>());
    }

    /// Counts instances of one part type and tags each with its ordinal.
    struct Ordinal {
        part_type: &'static str,
        seen: AtomicUsize,
    }

    struct Seq(usize);

    impl PartPlugin for Ordinal {
        fn name(&self) -> &str {
            "ordinal"
        }

        fn on_create(&self, part: &Part) {
            if part.part_type().name() == self.part_type {
                let n = self.seen.fetch_add(1, Ordering::SeqCst);
                part.extensions().insert(Seq(n));
            }
        }
    }

    #[test]
    fn part_hooks_see_every_new_instance() {
        let plugin = Arc::new(Ordinal {
            part_type: "PluginOrdinalProbe",
            seen: AtomicUsize::new(0),
        });
        register_part_plugin(plugin.clone());

        let ty = PartType::builder("PluginOrdinalProbe")
            .pins(["A", "B"])
            .build()
            .unwrap();
        let first = ty.instantiate().unwrap();
        let second = ty.instantiate().unwrap();

        assert_eq!(plugin.seen.load(Ordering::SeqCst), 2);
        assert_eq!(first.extensions().get::<Seq>().unwrap().0, 0);
        assert_eq!(second.extensions().get::<Seq>().unwrap().0, 1);
        assert!(registered_names().contains(&("part", "ordinal".to_owned())));
    }

    struct OrderLog {
        label: &'static str,
        part_type: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl PartPlugin for OrderLog {
        fn name(&self) -> &str {
            self.label
        }

        fn on_create(&self, part: &Part) {
            if part.part_type().name() == self.part_type {
                self.log.lock().unwrap().push(self.label);
            }
        }
    }

    #[test]
    fn part_hooks_run_in_registration_order() {
        let log = Arc::new(Mutex::new(vec![]));
        for label in ["order-first", "order-second", "order-third"] {
            register_part_plugin(Arc::new(OrderLog {
                label,
                part_type: "PluginOrderProbe",
                log: log.clone(),
            }));
        }

        let ty = PartType::builder("PluginOrderProbe").pins(["A"]).build().unwrap();
        ty.instantiate().unwrap();
        ty.instantiate().unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "order-first",
                "order-second",
                "order-third",
                "order-first",
                "order-second",
                "order-third",
            ]
        );
    }

    /// Picks pin `B` for nets named `PICK_B` and a pin of an unrelated part for
    /// nets named `FOREIGN`.
    struct Chooser {
        part_type: &'static str,
        foreign: Mutex<Option<BoundPin>>,
    }

    impl PartPlugin for Chooser {
        fn name(&self) -> &str {
            "chooser"
        }

        fn select_pin(&self, part: &Part, net: &Net, _pin_type: PinType) -> Option<BoundPin> {
            if part.part_type().name() != self.part_type {
                return None;
            }
            match net.name() {
                Some("PICK_B") => part.pin("B").ok(),
                Some("FOREIGN") => self.foreign.lock().unwrap().clone(),
                _ => None,
            }
        }
    }

    #[test]
    fn pin_selectors_override_the_unique_pin_rule() {
        let ty = PartType::builder("PinChoiceProbe")
            .pin(PinSpec::builder("A").pin_type(PinType::Primary))
            .pin(PinSpec::builder("B").pin_type(PinType::Secondary))
            .build()
            .unwrap();
        let other = PartType::builder("PinChoiceOther").pins(["X"]).build().unwrap();
        let stranger = other.instantiate().unwrap();
        register_part_plugin(Arc::new(Chooser {
            part_type: "PinChoiceProbe",
            foreign: Mutex::new(Some(stranger.pin("X").unwrap())),
        }));

        let picked = ty.instantiate().unwrap();
        let net = Net::new("pick_b").connect_input(&picked).unwrap();
        assert_eq!(net.connections(), vec![picked.pin("B").unwrap()]);

        let fallback = ty.instantiate().unwrap();
        let net = Net::new("ANYTHING").connect_input(&fallback).unwrap();
        assert_eq!(net.connections(), vec![fallback.pin("A").unwrap()]);

        let guarded = ty.instantiate().unwrap();
        let net = Net::new("FOREIGN").connect_input(&guarded).unwrap();
        assert_eq!(net.connections(), vec![guarded.pin("A").unwrap()]);
        assert!(!stranger.pin("X").unwrap().is_connected());
    }

    struct BindLog {
        prefix: &'static str,
        log: Mutex<Vec<String>>,
    }

    impl PinPlugin for BindLog {
        fn name(&self) -> &str {
            "bind-log"
        }

        fn on_create(&self, spec: &PinSpec) {
            if spec.name().starts_with(self.prefix) {
                self.log.lock().unwrap().push(format!("spec {}", spec.name()));
            }
        }

        fn on_bind(&self, pin: &BoundPin) {
            if pin.name().starts_with(self.prefix) {
                self.log.lock().unwrap().push(format!("bind {}", pin.name()));
            }
        }
    }

    #[test]
    fn pin_hooks_fire_for_templates_then_instances() {
        let plugin = Arc::new(BindLog {
            prefix: "HOOKPROBE",
            log: Mutex::new(vec![]),
        });
        register_pin_plugin(plugin.clone());

        let ty = PartType::builder("HookProbe")
            .pins(["HOOKPROBE_1", "HOOKPROBE_2"])
            .build()
            .unwrap();
        ty.instantiate().unwrap();

        assert_eq!(
            *plugin.log.lock().unwrap(),
            vec![
                "spec HOOKPROBE_1",
                "spec HOOKPROBE_2",
                "bind HOOKPROBE_1",
                "bind HOOKPROBE_2",
            ]
        );
    }

    struct NetCounter {
        prefix: &'static str,
        count: AtomicUsize,
    }

    impl NetPlugin for NetCounter {
        fn name(&self) -> &str {
            "net-counter"
        }

        fn on_create(&self, net: &Net) {
            if net.name().is_some_and(|n| n.starts_with(self.prefix)) {
                self.count.fetch_add(1, Ordering::SeqCst);
                net.extensions().insert(Tag("counted"));
            }
        }
    }

    #[test]
    fn net_hooks_see_named_nets() {
        let plugin = Arc::new(NetCounter {
            prefix: "NETHOOKPROBE",
            count: AtomicUsize::new(0),
        });
        register_net_plugin(plugin.clone());

        let net = Net::new("nethookprobe_a");
        Net::new("NETHOOKPROBE_B");
        Net::new("unrelated");

        assert_eq!(plugin.count.load(Ordering::SeqCst), 2);
        assert_eq!(*net.extensions().get::<Tag>().unwrap(), Tag("counted"));
    }
}
