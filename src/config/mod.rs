//! Recipe configuration.
//!
//! Raw options are loaded from a file ([`loader`]), registered and validated
//! one by one ([`registry`], [`validation`]) and assembled into a typed
//! [`TransformationConfig`] ([`recipe`]).

pub mod frequency;
pub mod loader;
pub mod params;
pub mod recipe;
pub mod registry;
pub mod validation;

pub use frequency::Frequency;
pub use loader::{RecipeFormat, load_recipe, load_recipe_from_str};
pub use params::{RawConfig, extract_param};
pub use recipe::{DecompositionMethod, Model, TransformationConfig};
pub use registry::{ParamRegistry, ParamSpec};
pub use validation::{Check, CheckKind, ValueType};
