use itertools::izip;
use multiversion::multiversion;

/// `out = current + step_size * jump`, but only where `active` is set.
///
/// Inactive coordinates are copied unchanged.
#[multiversion(targets("x86_64+avx+avx2+fma", "arm+neon"))]
pub(crate) fn masked_jump(
    current: &[f64],
    jump: &[f64],
    active: &[bool],
    step_size: f64,
    out: &mut [f64],
) {
    let n = current.len();
    assert!(jump.len() == n);
    assert!(active.len() == n);
    assert!(out.len() == n);

    izip!(current, jump, active, out.iter_mut()).for_each(|(&x, &dx, &active, out)| {
        *out = if active { x + step_size * dx } else { x };
    });
}

/// Smooth lower floor: `x` when `x >= delta`, otherwise `delta / (2 - x / delta)`.
///
/// The result is strictly positive for any finite `x` and continuous at `delta`.
pub(crate) fn smooth_floor(x: f64, delta: f64) -> f64 {
    if x >= delta {
        x
    } else {
        delta / (2. - x / delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn fixed_slots_are_copied() {
        let mut out = [0.; 3];
        masked_jump(&[1., 2., 3.], &[1., 1., 1.], &[true, false, true], 0.5, &mut out);
        assert_eq!(out, [1.5, 2., 3.5]);
    }

    #[test]
    fn floor_is_continuous() {
        assert_eq!(smooth_floor(0.3, 1e-10), 0.3);
        assert_relative_eq!(smooth_floor(1e-10, 1e-10), 1e-10);
        assert_relative_eq!(smooth_floor(0., 1e-10), 0.5e-10);
    }

    proptest! {
        #[test]
        fn floor_stays_positive(x in -1e3f64..1e3) {
            let y = smooth_floor(x, 1e-10);
            prop_assert!(y > 0.);
            prop_assert!(y <= x.max(1e-10));
        }
    }
}
