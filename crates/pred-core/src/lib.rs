pub mod api;
pub mod cache;
pub mod neural;
pub mod oracle;
pub mod search;
pub mod settings;
pub mod substitution;
pub mod tags;
#[cfg(test)]
pub(crate) mod testutil;
pub mod variants;

pub use substitution::SubstitutionError;
