//! # olx-core: Network Model Access Layer
//!
//! Typed, key-addressable access to the records of a protection network
//! model held by an external engine.
//!
//! ## Design Philosophy
//!
//! The engine owns the data. This crate never caches a record: every read and
//! write goes through the [`Engine`] primitives, addressed by opaque
//! [`Handle`]s. What the layer adds on top is
//!
//! - **Resolution**: any accepted key shape (GUID, display string, constructor
//!   string, natural-key tuple, bus number or name) becomes a handle through
//!   [`KeyResolver`].
//! - **A uniform entity**: [`GenericEntity`] reads and writes fields by name
//!   for every [`EntityKind`], checked against the [`SchemaRegistry`].
//! - **Session safety**: entities carry a [`SessionToken`]; using one after the
//!   network was closed or replaced fails instead of touching the wrong record.
//! - **Orientation**: a mutual coupling addressed from its second line reads
//!   and writes in the caller's frame ([`OrientationCase`]). Other branches
//!   report their stored orientation.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use olx_core::{EntityKind, Key, OlxConfig, Session};
//!
//! let mut session = Session::new(engine, OlxConfig::default());
//! session.open("sample.olr", false)?;
//!
//! let mut line = session.resolve(
//!     EntityKind::Line,
//!     &Key::parse("LINE(BUS('NEVADA', 132), BUS('OHIO', 132), '1')"),
//! )?;
//! println!("{}", line.get(&session, "R")?);
//!
//! line.change_data(&mut session, "R", 0.011)?;
//! line.post_data(&mut session)?;
//! ```
//!
//! ## Modules
//!
//! - [`engine`] - Collaborator contract and its request/response buffers
//! - [`session`] - Open network, token epochs and the fault result book
//! - [`resolve`] / [`key`] - Key shapes and their resolution
//! - [`entity`] - Field reads, staged writes, settings, deletion
//! - [`navigate`] - Relationship traversal (terminals, groups, devices)
//! - [`schema`] - Per-kind field tables and user-defined fields
//! - [`mutual`] - Orientation transforms for mutual couplings
//! - [`testing`] - In-memory engine (feature `testing`)

pub mod config;
pub mod engine;
pub mod entity;
pub mod error;
pub mod handle;
pub mod key;
pub mod keystr;
pub mod kind;
pub mod logging;
pub mod mutual;
pub mod navigate;
pub mod report;
pub mod resolve;
pub mod schema;
pub mod session;
pub mod units;
pub mod validate;
pub mod value;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::{FaultConfig, LoggingConfig, OlxConfig, SessionConfig};
pub use engine::{
    AddendumRequest, Annotation, ClassicalFaultRequest, ClassicalRequest, Engine, EngineFailure,
    FieldBuffer, OutageRequest, Primitive, ReadStyle, SimultaneousFaultRequest,
    SimultaneousRequest, StepBuffer, SteppedEventRequest, VoltageUnit,
};
pub use entity::{EntityRef, FieldQuery, GenericEntity};
pub use error::{OlxError, OlxResult};
pub use handle::Handle;
pub use key::Key;
pub use kind::{EntityKind, KeyShape, SplitPart};
pub use mutual::{CouplingGeometry, OrientationCase};
pub use navigate::RelationshipNavigator;
pub use report::{ValidationIssue, ValidationReport};
pub use resolve::{KeyResolver, Resolved};
pub use schema::{FieldSchema, SchemaRegistry, ValueKind};
pub use session::{ResultBook, Session, SessionToken};
pub use units::{Kilovolts, MegavoltAmperes, PerUnit, Percent, Seconds};
pub use value::Value;
