//! Numerical integration for continuous blocks
//!
//! Provides explicit Runge-Kutta methods in Butcher form and a step-wise
//! [`Integrator`] that advances one accepted substep at a time:
//! - Classic RK4 (fixed step)
//! - Bogacki-Shampine 3(2), selected as `RK23`
//! - Dormand-Prince 5(4), selected as `RK45`

mod base;
mod integrator;
mod rk4;
mod rkbs32;
mod rkdp54;

pub use base::*;
pub use integrator::Integrator;
pub use rk4::RK4;
pub use rkbs32::RKBS32;
pub use rkdp54::RKDP54;
