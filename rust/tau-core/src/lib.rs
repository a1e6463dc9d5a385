//! Core data structures of the tau runtime: the object model, the GC
//! header carried by heap objects, the instruction set, and the compiled
//! unit container with its binary codec.

pub mod bytecode;
pub mod codec;
pub mod gc;
pub mod object;
pub mod opcode;

pub use bytecode::Bytecode;
pub use codec::{decode, encode, CodecError};
pub use object::{Object, ObjectType};
pub use opcode::Opcode;
