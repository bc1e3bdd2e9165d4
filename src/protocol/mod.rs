//! protocol — acquisition protocol tables, problems, and errors.
//!
//! Purpose
//! -------
//! Represent the acquisition side of a diffusion-MRI fit: the per-
//! measurement settings table ([`Protocol`]), the advisory mismatch
//! reports produced when a model's demands are checked against a table
//! ([`ProtocolProblem`]), and the structural construction errors
//! ([`ProtocolError`]).
//!
//! Key behaviors
//! -------------
//! - [`ProtocolBuilder`] validates columns on insertion; a built table is
//!   immutable.
//! - Shell counting is rounding-aware ([`SHELL_RESOLUTION`]) and skips
//!   unweighted rows.
//! - Problems are advisory values, not errors; the composite model
//!   collects them all instead of short-circuiting.
//!
//! Conventions
//! -----------
//! - SI units throughout: b-values in s/m², gradient amplitude `G` in T/m,
//!   pulse timings `Delta`/`delta` in seconds.
//! - No I/O and no logging; acquisition files are parsed by callers.
//!
//! Downstream usage
//! ----------------
//! - The fitting layer stores a `Protocol` in its problem data and runs
//!   `CompositeModel::get_protocol_problems` before optimization.
//!
//! Testing notes
//! -------------
//! - Unit tests cover builder validation, shell rounding, and problem
//!   message formatting; the integration suite checks model-level problem
//!   collection order.

pub mod errors;
pub mod problems;
pub mod table;

// ---- Re-exports (primary public surface) ----------------------------------

pub use self::errors::{ProtocolError, ProtocolResult};
pub use self::problems::ProtocolProblem;
pub use self::table::{Protocol, ProtocolBuilder, SHELL_RESOLUTION};

// ---- Optional convenience prelude for downstream crates -------------------

pub mod prelude {
    pub use super::errors::{ProtocolError, ProtocolResult};
    pub use super::problems::ProtocolProblem;
    pub use super::table::{Protocol, ProtocolBuilder, SHELL_RESOLUTION};
}
