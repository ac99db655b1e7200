//! Dormand-Prince 5(4) adaptive method

use super::Tableau;

/// Dormand-Prince 5(4) pair (DOPRI5), selected by the solver name `RK45`
///
/// Seven stages, 5th order propagation with an embedded 4th order error
/// estimate. The seventh slope is taken at the accepted point (FSAL).
/// Recommended default for non-stiff block diagrams.
///
/// # References
/// - Dormand, J. R., & Prince, P. J. (1980). "A family of embedded
///   Runge-Kutta formulae". Journal of Computational and Applied
///   Mathematics, 6(1), 19-26.
/// - Shampine, L. F., & Reichelt, M. W. (1997). "The MATLAB ODE Suite".
///   SIAM Journal on Scientific Computing, 18(1), 1-22.
#[rustfmt::skip]
pub const RKDP54: Tableau = Tableau {
    name: "RKDP54",
    c: &[0.0, 1.0 / 5.0, 3.0 / 10.0, 4.0 / 5.0, 8.0 / 9.0, 1.0, 1.0],
    a: &[
        &[1.0 / 5.0],
        &[3.0 / 40.0, 9.0 / 40.0],
        &[44.0 / 45.0, -56.0 / 15.0, 32.0 / 9.0],
        &[19372.0 / 6561.0, -25360.0 / 2187.0, 64448.0 / 6561.0, -212.0 / 729.0],
        &[9017.0 / 3168.0, -355.0 / 33.0, 46732.0 / 5247.0, 49.0 / 176.0, -5103.0 / 18656.0],
        &[35.0 / 384.0, 0.0, 500.0 / 1113.0, 125.0 / 192.0, -2187.0 / 6784.0, 11.0 / 84.0],
    ],
    b: &[35.0 / 384.0, 0.0, 500.0 / 1113.0, 125.0 / 192.0, -2187.0 / 6784.0, 11.0 / 84.0, 0.0],
    e: Some(&[
        71.0 / 57600.0,
        0.0,
        -71.0 / 16695.0,
        71.0 / 1920.0,
        -17253.0 / 339200.0,
        22.0 / 525.0,
        -1.0 / 40.0,
    ]),
    order: 5,
    error_order: 4,
};

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::DVector;

    #[test]
    fn test_rkdp54_exponential_decay() {
        // dx/dt = -x, x(0) = 1
        let mut x = DVector::from_vec(vec![1.0]);
        let mut f = |x: &DVector<f64>, _t: f64| -x;

        let dt = 0.1;
        for n in 0..10 {
            x = RKDP54.attempt(&mut f, n as f64 * dt, &x, dt, (1e-8, 1e-4)).unwrap().state;
        }

        assert_relative_eq!(x[0], (-1.0f64).exp(), epsilon = 1e-8);
    }

    #[test]
    fn test_rkdp54_harmonic_oscillator() {
        let mut x = DVector::from_vec(vec![1.0, 0.0]);
        let mut f = |x: &DVector<f64>, _t: f64| DVector::from_vec(vec![x[1], -x[0]]);

        let steps = 126;
        let dt = 2.0 * std::f64::consts::PI / steps as f64;
        for n in 0..steps {
            x = RKDP54.attempt(&mut f, n as f64 * dt, &x, dt, (1e-8, 1e-4)).unwrap().state;
        }

        assert_relative_eq!(x[0], 1.0, epsilon = 1e-5);
        assert_relative_eq!(x[1], 0.0, epsilon = 1e-5);
    }
}
