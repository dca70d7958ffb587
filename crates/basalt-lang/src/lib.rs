//! # basalt-lang
//!
//! The material declaration language: splits `.mtr` text into named
//! declaration blocks, parses table and material declarations into
//! structured models, evaluates shader expressions and regenerates
//! declaration text that round-trips through the parser.

pub mod blocks;
pub mod expr;
pub mod keywords;
pub mod material;
pub mod parser;
pub mod table;
pub mod tokens;
pub mod writer;

pub use blocks::{pipe_until_insertion_point, Block, BlockTokeniser};
pub use expr::{EvalContext, Expression};
pub use material::{Material, MaterialDef, Stage};
pub use table::TableDefinition;
pub use tokens::Tokeniser;
