//! Prompt construction.
//!
//! Two pure stages turn stored state into the exact sequence sent to the
//! language model:
//!
//! | Stage | Input | Output |
//! |-------|-------|--------|
//! | Assembler | Recent messages, preferences | Bounded history + preference directive |
//! | Compiler | Persona, assembled context, new message | Ordered prompt turns |

pub mod assembler;
pub mod prompt;

pub use assembler::{AssembledContext, ContextAssembler};
pub use prompt::{PERSONA, compile_prompt};
