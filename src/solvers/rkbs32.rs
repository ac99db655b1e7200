//! Bogacki-Shampine 3(2) adaptive method

use super::Tableau;

/// Bogacki-Shampine 3(2) pair, selected by the solver name `RK23`
///
/// Four stages with First-Same-As-Last: the fourth slope is evaluated at
/// the accepted point and only feeds the error estimate. Good when
/// moderate accuracy suffices and per-step cost matters more than step size.
///
/// # References
/// - Bogacki, P., & Shampine, L. F. (1989). "A 3(2) pair of
///   Runge-Kutta formulas". Applied Mathematics Letters, 2(4), 321-325.
#[rustfmt::skip]
pub const RKBS32: Tableau = Tableau {
    name: "RKBS32",
    c: &[0.0, 1.0 / 2.0, 3.0 / 4.0, 1.0],
    a: &[
        &[1.0 / 2.0],
        &[0.0, 3.0 / 4.0],
        &[2.0 / 9.0, 1.0 / 3.0, 4.0 / 9.0],
    ],
    b: &[2.0 / 9.0, 1.0 / 3.0, 4.0 / 9.0, 0.0],
    e: Some(&[5.0 / 72.0, -1.0 / 12.0, -1.0 / 9.0, 1.0 / 8.0]),
    order: 3,
    error_order: 2,
};

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::DVector;

    #[test]
    fn test_rkbs32_exponential_decay() {
        let mut x = DVector::from_vec(vec![1.0]);
        let mut f = |x: &DVector<f64>, _t: f64| -x;

        let dt = 0.01;
        for n in 0..100 {
            x = RKBS32.attempt(&mut f, n as f64 * dt, &x, dt, (1e-8, 1e-6)).unwrap().state;
        }

        assert_relative_eq!(x[0], (-1.0f64).exp(), epsilon = 1e-6);
    }

    #[test]
    fn test_rkbs32_error_shrinks_with_step() {
        let x = DVector::from_vec(vec![1.0]);
        let mut f = |x: &DVector<f64>, _t: f64| -x;

        let coarse = RKBS32.attempt(&mut f, 0.0, &x, 0.2, (1e-8, 1e-6)).unwrap().error_norm.unwrap();
        let fine = RKBS32.attempt(&mut f, 0.0, &x, 0.02, (1e-8, 1e-6)).unwrap().error_norm.unwrap();
        assert!(fine < coarse);
    }
}
