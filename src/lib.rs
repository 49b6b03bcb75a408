//! A sandboxed text-substitution template engine implementing the Liquid
//! template language: a lexer, an expression sub-language, a tag parser,
//! a render engine with scoping/partials/inheritance, and a static analyzer.
//!
//! The module layout mirrors the pipeline: [`lex`] and [`expr`] cover
//! parsing the two sub-languages, [`ast`] is the shared tree they build,
//! [`parser`] assembles template-level nodes out of both, [`env`] and
//! [`context`] hold configuration and render-time state, [`render`] and
//! [`inheritance`] do the actual evaluation, and [`analysis`] inspects a
//! parsed tree without fully evaluating it.

pub mod analysis;
pub mod ast;
pub mod context;
pub mod env;
pub mod error;
pub mod expr;
pub mod filters;
pub mod inheritance;
pub mod lex;
pub mod loader;
pub mod parser;
pub mod render;
pub mod span;
pub mod tags;
pub mod template;
pub mod translations;
pub mod value;

pub use env::{Environment, EnvironmentBuilder};
pub use error::{Error, Result, Tolerance};
pub use loader::Loader;
pub use template::Template;
pub use translations::Translations;
pub use value::Value;
