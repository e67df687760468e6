pub mod generation;
pub mod notifier;
pub mod object_store;
