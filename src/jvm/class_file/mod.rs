//! Low-level structures going into a serialized classfile
//!
//! This module covers the constant pool along with the raw attributes that a compiled method
//! body carries. Everything here serializes byte-for-byte into the [classfile format][0].
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se16/html/jvms-4.html

mod attribute;
mod constants;

pub use attribute::*;
pub use constants::*;
