//! Shops and their products. Every operation is scoped to the
//! authenticated owner.

pub mod products;
#[allow(clippy::module_inception)]
pub mod shops;
mod storage;
pub mod types;
