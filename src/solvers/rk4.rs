//! Classic 4th-order Runge-Kutta method

use super::Tableau;

/// Classic 4th-order Runge-Kutta
///
/// Four stages, no error estimate. Driven by the integrator with a fixed
/// substep (`Settings::first_step`) or one substep per tick.
///
/// # References
/// - Kutta, W. (1901). "Beitrag zur näherungsweisen Integration totaler
///   Differentialgleichungen". Zeitschrift für Mathematik und Physik, 46, 435-453.
#[rustfmt::skip]
pub const RK4: Tableau = Tableau {
    name: "RK4",
    c: &[0.0, 1.0 / 2.0, 1.0 / 2.0, 1.0],
    a: &[
        &[1.0 / 2.0],
        &[0.0, 1.0 / 2.0],
        &[0.0, 0.0, 1.0],
    ],
    b: &[1.0 / 6.0, 1.0 / 3.0, 1.0 / 3.0, 1.0 / 6.0],
    e: None,
    order: 4,
    error_order: 4,
};

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::DVector;

    #[test]
    fn test_rk4_exponential_decay() {
        // dx/dt = -k*x, x(0) = 1
        let k = 0.5;
        let mut x = DVector::from_vec(vec![1.0]);
        let mut f = |x: &DVector<f64>, _t: f64| -k * x;

        let dt = 0.01;
        let steps = 500;
        for n in 0..steps {
            x = RK4.attempt(&mut f, n as f64 * dt, &x, dt, (0.0, 0.0)).unwrap().state;
        }

        assert_relative_eq!(x[0], (-k * 5.0f64).exp(), epsilon = 1e-8);
    }

    #[test]
    fn test_rk4_harmonic_oscillator() {
        // [x, v]' = [v, -x]
        let mut x = DVector::from_vec(vec![1.0, 0.0]);
        let mut f = |x: &DVector<f64>, _t: f64| DVector::from_vec(vec![x[1], -x[0]]);

        let steps = 1000;
        let dt = 2.0 * std::f64::consts::PI / steps as f64;
        for n in 0..steps {
            x = RK4.attempt(&mut f, n as f64 * dt, &x, dt, (0.0, 0.0)).unwrap().state;
        }

        assert_relative_eq!(x[0], 1.0, epsilon = 1e-6);
        assert_relative_eq!(x[1], 0.0, epsilon = 1e-6);
    }
}
