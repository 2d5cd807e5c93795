use super::model::{FixedVector, LightCurve};
use crate::error::CurveError;

/// Interpolates curves onto `points` uniformly spaced positions in `[0, 1]`.
///
/// The source axis is the point index mapped linearly onto `[0, 1]`, not the
/// time column, so gaps in time are closed up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurveResampler {
    pub points: usize,
}

impl Default for CurveResampler {
    fn default() -> Self {
        CurveResampler { points: 300 }
    }
}

impl CurveResampler {
    pub fn new(points: usize) -> Self {
        CurveResampler { points }
    }

    pub fn resample(&self, curve: &LightCurve) -> Result<FixedVector, CurveError> {
        let src = &curve.brightness;
        if src.len() < 2 {
            return Err(CurveError::InsufficientPoints { found: src.len() });
        }
        let last = (src.len() - 1) as f64;
        let values = linspace(self.points)
            .map(|t| {
                let pos = t * last;
                let i = (pos.floor() as usize).min(src.len() - 2);
                let frac = pos - i as f64;
                src[i] + (src[i + 1] - src[i]) * frac
            })
            .collect();
        Ok(FixedVector {
            name: curve.name.clone(),
            values,
        })
    }
}

/// `n` evenly spaced values from 0 to 1 inclusive.
fn linspace(n: usize) -> impl Iterator<Item = f64> {
    let step = if n > 1 { 1.0 / (n - 1) as f64 } else { 0.0 };
    (0..n).map(move |i| if i + 1 == n && n > 1 { 1.0 } else { i as f64 * step })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn curve(values: Vec<f64>) -> LightCurve {
        let time = (0..values.len()).map(|i| i as f64 * 0.5).collect();
        LightCurve::new("S", time, values)
    }

    #[test]
    fn always_produces_target_length() {
        let r = CurveResampler::default();
        for len in [2, 3, 50, 299, 300, 1000] {
            let c = curve((0..len).map(|i| (i as f64).sin()).collect());
            assert_eq!(r.resample(&c).unwrap().values.len(), 300);
        }
    }

    #[test]
    fn same_length_is_near_identity() {
        let src: Vec<f64> = (0..300).map(|i| (i as f64 * 0.1).cos()).collect();
        let out = CurveResampler::new(300).resample(&curve(src.clone())).unwrap();
        for (a, b) in src.iter().zip(&out.values) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn two_points_interpolate_linearly() {
        let out = CurveResampler::new(5).resample(&curve(vec![0.0, 4.0])).unwrap();
        assert_eq!(out.values, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn keeps_identity() {
        let out = CurveResampler::new(3).resample(&curve(vec![1.0, 2.0])).unwrap();
        assert_eq!(out.name, "S");
    }

    #[test]
    fn rejects_single_point() {
        let err = CurveResampler::new(10).resample(&curve(vec![1.0]));
        assert!(matches!(err, Err(CurveError::InsufficientPoints { found: 1 })));
    }
}
