use super::model::{FilteredCurve, LightCurve};

// ---------------------------------------------------------------------------
// Rolling-window outlier suppression
// ---------------------------------------------------------------------------

/// Parameters for the rolling-window outlier filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutlierFilter {
    pub window: usize,
    pub sigma: f64,
}

impl Default for OutlierFilter {
    fn default() -> Self {
        OutlierFilter {
            window: 10,
            sigma: 2.0,
        }
    }
}

impl OutlierFilter {
    pub fn new(window: usize, sigma: f64) -> Self {
        OutlierFilter { window, sigma }
    }

    /// Centered rolling mean and sample standard deviation per point.
    ///
    /// The window covering point `i` spans `[i - w/2, i + (w-1)/2]`, so an even
    /// window leans one point towards the past. Points whose window runs past
    /// either end get `NaN` for both statistics.
    pub fn rolling_stats(&self, values: &[f64]) -> Vec<(f64, f64)> {
        let n = values.len();
        let w = self.window;
        let offset = w.saturating_sub(1) / 2;
        let mut out = vec![(f64::NAN, f64::NAN); n];
        if w == 0 || w > n {
            return out;
        }
        for (i, slot) in out.iter_mut().enumerate() {
            let end = i + 1 + offset;
            if end < w || end > n {
                continue;
            }
            let win = &values[end - w..end];
            let mean = win.iter().sum::<f64>() / w as f64;
            let std = if w > 1 {
                let ss: f64 = win.iter().map(|v| (v - mean).powi(2)).sum();
                (ss / (w - 1) as f64).sqrt()
            } else {
                f64::NAN
            };
            *slot = (mean, std);
        }
        out
    }

    /// Drop every point lying strictly outside `mean ± sigma·std` of its
    /// rolling window. Points with undefined bounds are always kept.
    pub fn apply(&self, curve: &LightCurve) -> FilteredCurve {
        let stats = self.rolling_stats(&curve.brightness);
        let mut time = Vec::with_capacity(curve.len());
        let mut brightness = Vec::with_capacity(curve.len());
        let mut removed = Vec::new();

        for (i, (&b, &(mean, std))) in curve.brightness.iter().zip(&stats).enumerate() {
            let upper = mean + self.sigma * std;
            let lower = mean - self.sigma * std;
            // NaN comparisons are false, so edge points fall through as kept.
            if b > upper || b < lower {
                removed.push(i);
            } else {
                time.push(curve.time[i]);
                brightness.push(b);
            }
        }

        log::info!("{}: removed {} outliers", curve.name, removed.len());

        FilteredCurve {
            curve: LightCurve::new(curve.name.clone(), time, brightness),
            removed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_with_jitter(name: &str, n: usize, level: f64) -> LightCurve {
        let brightness = (0..n)
            .map(|i| level + if i % 2 == 0 { 0.001 } else { -0.001 })
            .collect();
        LightCurve::new(name, (0..n).map(|i| i as f64).collect(), brightness)
    }

    #[test]
    fn rolling_window_alignment() {
        let f = OutlierFilter::new(4, 2.0);
        let values: Vec<f64> = (0..8).map(|i| i as f64).collect();
        let stats = f.rolling_stats(&values);
        // offset = 1: point i uses [i-2, i+1]
        assert!(stats[0].0.is_nan());
        assert!(stats[1].0.is_nan());
        assert!((stats[2].0 - 1.5).abs() < 1e-12);
        assert!((stats[6].0 - 5.5).abs() < 1e-12);
        assert!(stats[7].0.is_nan());
    }

    #[test]
    fn clean_curve_is_unchanged() {
        let curve = flat_with_jitter("A", 50, 1.0);
        let filtered = OutlierFilter::default().apply(&curve);
        assert_eq!(filtered.curve, curve);
        assert_eq!(filtered.removed_count(), 0);
    }

    #[test]
    fn removes_isolated_spike_only() {
        let mut curve = flat_with_jitter("A", 50, 1.0);
        curve.brightness[25] = 1.01;
        let filtered = OutlierFilter::default().apply(&curve);
        assert_eq!(filtered.removed, vec![25]);
        assert_eq!(filtered.curve.len(), 49);
        assert!(!filtered.curve.time.contains(&25.0));
    }

    #[test]
    fn edge_points_are_never_flagged() {
        let mut curve = flat_with_jitter("A", 30, 1.0);
        curve.brightness[0] = 50.0;
        curve.brightness[29] = -50.0;
        let filtered = OutlierFilter::default().apply(&curve);
        assert!(!filtered.removed.contains(&0));
        assert!(!filtered.removed.contains(&29));
    }

    #[test]
    fn short_curve_passes_through() {
        let curve = flat_with_jitter("A", 5, 1.0);
        let filtered = OutlierFilter::default().apply(&curve);
        assert_eq!(filtered.curve, curve);
    }
}
