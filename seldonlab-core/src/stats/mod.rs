//! Statistics layer: special functions, dual numbers, interval arithmetic,
//! and Student-t confidence bounds.

pub mod bounds;
pub mod dual;
pub mod interval;
pub mod special;

pub use bounds::{ttest_bound, BoundMode, MeanBound, Sides};
pub use dual::Dual;
pub use interval::{DualInterval, Interval};
pub use special::{student_t_cdf, student_t_quantile};
