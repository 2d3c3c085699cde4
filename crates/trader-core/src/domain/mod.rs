//! 트레이딩 운영을 위한 도메인 모델.

mod market;
mod order;
mod plan;
mod position;
mod tick_size;

pub use market::*;
pub use order::*;
pub use plan::*;
pub use position::*;
pub use tick_size::*;
