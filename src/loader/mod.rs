mod factory;
#[cfg(test)]
pub(crate) mod fake;
mod lifecycle;

pub use factory::{ComponentFactory, StandardFactory};
pub use lifecycle::{LoadOutcome, LoadedModels, LoaderState, ModelLoader, READY_MESSAGE, TOTAL_STEPS};
