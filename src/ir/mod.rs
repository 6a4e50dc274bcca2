//! The intermediate representation: a plain virtual-register machine,
//! not an SSA form.
//!
//! There are no `Value`s and no block
//! arguments: a [`function::Fun`] is a flat collection of named virtual
//! [`reg::Reg`]s assigned to by ordinary store-like instructions inside
//! [`bbl::Bbl`]s, addressed by position within their block. This is a
//! deliberate register-transfer model rather than an SSA one.

pub mod bbl;
pub mod cfg;
pub mod cpu_reg;
pub mod dk;
pub mod entities;
pub mod flags;
pub mod function;
pub mod instruction;
pub mod reg;
pub mod rewrite;

pub use bbl::Bbl;
pub use cpu_reg::CpuReg;
pub use dk::DK;
pub use entities::{Bbl as BblRef, FunRef, InstPos, Reg as RegRef};
pub use function::Fun;
pub use instruction::{Instruction, Opcode, Operand};
pub use reg::Reg;
