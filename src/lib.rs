mod common;
mod hessian;
mod linesearch;
mod math;
mod qp;
mod sqp;
#[cfg(test)]
mod tests;
mod traits;

pub use common::*;
pub use qp::{Ipm, QpOptions};
pub use sqp::nlp;
pub use traits::*;
