//! Provisio: a provisioning task engine.
//!
//! Definitions are ordered `<action>_<type>` tasks whose params may read an
//! accumulating field store through `${name}` and `$f:name` placeholders.
//! Each task dispatches through a [`core::registry::Registry`] to a typed,
//! validated resource and its executor; results merge back into the store.

pub mod cli;
pub mod core;
pub mod resources;
pub mod transport;
