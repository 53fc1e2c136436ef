//! Local maximum search with a height floor and minimum peak distance.

/// Constraints applied by [`find_peaks`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakOptions {
    /// Peaks must be at least this high.
    pub height: Option<f32>,
    /// Minimum index distance between kept peaks (at least 1).
    pub distance: usize,
}

impl Default for PeakOptions {
    fn default() -> Self {
        Self {
            height: None,
            distance: 1,
        }
    }
}

/// Indices of strict local maxima, midpoints of flat tops.
///
/// The first and last samples are never peaks. A plateau counts when both of
/// its neighbours are lower; its index is the left-middle sample.
fn local_maxima(x: &[f32]) -> Vec<usize> {
    let mut peaks = Vec::new();
    if x.len() < 3 {
        return peaks;
    }

    let last = x.len() - 1;
    let mut i = 1;
    while i < last {
        if x[i - 1] < x[i] {
            let mut ahead = i + 1;
            while ahead < last && x[ahead] == x[i] {
                ahead += 1;
            }
            if x[ahead] < x[i] {
                peaks.push((i + ahead - 1) / 2);
                i = ahead;
            }
        }
        i += 1;
    }
    peaks
}

/// Find peaks in `x`, returned in ascending index order.
///
/// Candidates below `height` are dropped first. Distance suppression then
/// visits the remaining peaks from highest to lowest (equal heights in index
/// order) and removes every neighbour closer than `distance`.
pub fn find_peaks(x: &[f32], options: &PeakOptions) -> Vec<usize> {
    let mut peaks = local_maxima(x);

    if let Some(height) = options.height {
        peaks.retain(|&p| x[p] >= height);
    }

    let distance = options.distance.max(1);
    if distance == 1 || peaks.len() < 2 {
        return peaks;
    }

    let mut priority: Vec<usize> = (0..peaks.len()).collect();
    priority.sort_by(|&a, &b| x[peaks[b]].total_cmp(&x[peaks[a]]));

    let mut keep = vec![true; peaks.len()];
    for &j in &priority {
        if !keep[j] {
            continue;
        }
        for k in (0..j).rev() {
            if peaks[j] - peaks[k] >= distance {
                break;
            }
            keep[k] = false;
        }
        for k in j + 1..peaks.len() {
            if peaks[k] - peaks[j] >= distance {
                break;
            }
            keep[k] = false;
        }
    }

    peaks
        .into_iter()
        .zip(keep)
        .filter_map(|(p, kept)| kept.then_some(p))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_maxima() {
        let x = [0.0, 1.0, 0.0, 2.0, 2.0, 2.0, 0.0, 3.0];
        assert_eq!(find_peaks(&x, &PeakOptions::default()), vec![1, 4]);
    }

    #[test]
    fn test_endpoints_and_open_plateaus_are_not_peaks() {
        assert!(find_peaks(&[5.0, 1.0, 5.0], &PeakOptions::default()).is_empty());
        assert!(find_peaks(&[0.0, 1.0, 1.0], &PeakOptions::default()).is_empty());
        assert!(find_peaks(&[1.0, 1.0, 1.0, 1.0], &PeakOptions::default()).is_empty());
        assert!(find_peaks(&[], &PeakOptions::default()).is_empty());
    }

    #[test]
    fn test_height_is_inclusive() {
        let x = [0.0, 0.5, 0.0, 0.4, 0.0];
        let options = PeakOptions {
            height: Some(0.5),
            distance: 1,
        };
        assert_eq!(find_peaks(&x, &options), vec![1]);
    }

    #[test]
    fn test_distance_keeps_highest() {
        let x = [0.0, 1.0, 0.0, 3.0, 0.0, 2.0, 0.0, 0.0, 0.0, 1.0, 0.0];
        let options = PeakOptions {
            height: None,
            distance: 3,
        };
        // 3 beats 1 and 5; 9 is far enough away.
        assert_eq!(find_peaks(&x, &options), vec![3, 9]);
    }

    #[test]
    fn test_distance_ties_prefer_earlier() {
        let x = [0.0, 1.0, 0.0, 1.0, 0.0];
        let options = PeakOptions {
            height: None,
            distance: 5,
        };
        assert_eq!(find_peaks(&x, &options), vec![1]);
    }

    #[test]
    fn test_exact_distance_is_allowed() {
        let x = [0.0, 1.0, 0.0, 0.0, 1.0, 0.0];
        let options = PeakOptions {
            height: None,
            distance: 3,
        };
        assert_eq!(find_peaks(&x, &options), vec![1, 4]);
    }
}
