#[macro_use]
pub mod optim;
