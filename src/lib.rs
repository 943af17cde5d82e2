//! Schematic capture as a graph of parts, pins and nets.
//!
//! Part types declare their pins once; every [`Part`] binds its own pins, and
//! connect statements join those pins into [`Net`]s in statement order.
//!
//! ```
//! use schematic_graph::{Net, PartType};
//!
//! let resistor = PartType::builder("Resistor").prefix("R").pins(["A", "B"]).build()?;
//! let r = resistor.instantiate()?;
//! Net::new("VCC").connect_input(r.pin("A")?)?;
//! Net::new("GND").connect_input(r.pin("B")?)?;
//! assert_eq!(r.pin("A")?.net().unwrap().name(), Some("VCC"));
//! # Ok::<(), schematic_graph::Error>(())
//! ```

pub mod error;
pub mod library;
mod net;
mod part;
mod pin;
mod pin_list;
pub mod plugin;
pub mod session;

pub use error::{Error, ParseError, Result};
pub use net::{Direction, Net, Target};
pub use part::{Part, PartBuilder, PartType, PartTypeBuilder};
pub use pin::{Aliases, BoundPin, PinSpec, PinSpecBuilder, PinType};
pub use pin_list::{PinKey, PinList};
pub use plugin::Extensions;
pub use session::{Netlist, Session};
