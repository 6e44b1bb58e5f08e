//! Prompt construction modules.

pub mod assembler;
pub mod transcript;

pub use assembler::{PromptAssembler, Turn, build_prompt};
pub use transcript::{render_dialogue_only, split_system};
