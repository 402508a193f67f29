//! Assignment of markers to manifest intervals.

use std::cmp::Ordering;

use spliceforge_common::AdMarker;

use super::PlacementWarning;

/// A half-open time span `[start, start + duration)` in stream seconds.
pub(crate) trait Interval {
    fn start(&self) -> f64;
    fn duration(&self) -> f64;

    fn contains(&self, t: f64) -> bool {
        self.start() <= t && t < self.start() + self.duration()
    }
}

/// A marker placed inside one interval.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Placement<'a> {
    pub marker: &'a AdMarker,
    /// Seconds from the interval start.
    pub offset: f64,
}

/// Placements per interval (same indexing as `intervals`) plus warnings.
pub(crate) struct Layout<'a> {
    pub slots: Vec<Vec<Placement<'a>>>,
    pub warnings: Vec<PlacementWarning>,
}

/// Place every marker into the interval containing its start time. Markers
/// outside all intervals are clamped to the nearest interval boundary, with
/// ties going to the earlier boundary.
pub(crate) fn layout<'a, I: Interval>(intervals: &[I], markers: &'a [AdMarker]) -> Layout<'a> {
    let mut ordered: Vec<&AdMarker> = markers.iter().collect();
    ordered.sort_by(|a, b| a.timeline_cmp(b));

    let mut slots = vec![Vec::new(); intervals.len()];
    let mut warnings = Vec::new();

    for marker in ordered {
        let t = marker.start_time;

        if !t.is_finite() {
            warnings.push(PlacementWarning::new(marker, "start time is not a finite number"));
            continue;
        }

        if let Some(index) = intervals.iter().position(|i| i.contains(t)) {
            slots[index].push(Placement {
                marker,
                offset: t - intervals[index].start(),
            });
            continue;
        }

        match nearest_boundary(intervals, t) {
            Some((index, offset)) => {
                let interval = &intervals[index];
                warnings.push(PlacementWarning::new(
                    marker,
                    format!(
                        "start {:.3}s lies outside every interval, clamped to {:.3}s",
                        t,
                        interval.start() + offset
                    ),
                ));
                slots[index].push(Placement { marker, offset });
            }
            None => warnings.push(PlacementWarning::new(
                marker,
                "no intervals to place the marker in",
            )),
        }
    }

    Layout { slots, warnings }
}

/// Closest interval edge to `t` as `(interval index, offset within it)`.
fn nearest_boundary<I: Interval>(intervals: &[I], t: f64) -> Option<(usize, f64)> {
    let mut best: Option<(f64, usize, f64)> = None;

    for (index, interval) in intervals.iter().enumerate() {
        let candidates = [
            (interval.start(), 0.0),
            (interval.start() + interval.duration(), interval.duration()),
        ];
        for (edge, offset) in candidates {
            let distance = (edge - t).abs();
            let closer = match best {
                None => true,
                Some((d, _, _)) => distance.total_cmp(&d) == Ordering::Less,
            };
            if closer {
                best = Some((distance, index, offset));
            }
        }
    }

    best.map(|(_, index, offset)| (index, offset))
}

#[cfg(test)]
mod tests {
    use super::*;
    use spliceforge_common::AdType;

    struct Span(f64, f64);

    impl Interval for Span {
        fn start(&self) -> f64 {
            self.0
        }
        fn duration(&self) -> f64 {
            self.1
        }
    }

    fn at(cue: &str, t: f64) -> AdMarker {
        AdMarker::new(cue, cue, t, 10.0, AdType::ProviderAd)
    }

    fn placed(layout: &Layout<'_>) -> Vec<Vec<(String, f64)>> {
        layout
            .slots
            .iter()
            .map(|s| s.iter().map(|p| (p.marker.cue_id.clone(), p.offset)).collect())
            .collect()
    }

    #[test]
    fn boundary_belongs_to_following_interval() {
        let spans = [Span(0.0, 5.0), Span(5.0, 10.0)];
        let markers = [at("a", 5.0), at("b", 4.999)];
        let layout = layout(&spans, &markers);

        assert_eq!(
            placed(&layout),
            vec![vec![("b".into(), 4.999)], vec![("a".into(), 0.0)]]
        );
        assert!(layout.warnings.is_empty());
    }

    #[test]
    fn same_start_orders_by_cue_id() {
        let spans = [Span(0.0, 20.0)];
        let markers = [at("cue-2", 10.0), at("cue-1", 10.0)];
        let layout = layout(&spans, &markers);
        let cues: Vec<_> = layout.slots[0].iter().map(|p| p.marker.cue_id.as_str()).collect();
        assert_eq!(cues, vec!["cue-1", "cue-2"]);
    }

    #[test]
    fn outside_markers_are_clamped_with_warning() {
        let spans = [Span(10.0, 5.0), Span(20.0, 5.0)];
        let markers = [at("early", 2.0), at("gap", 16.0), at("late", 40.0)];
        let layout = layout(&spans, &markers);

        assert_eq!(
            placed(&layout),
            vec![
                vec![("early".into(), 0.0), ("gap".into(), 5.0)],
                vec![("late".into(), 5.0)],
            ]
        );
        assert_eq!(layout.warnings.len(), 3);
        assert_eq!(layout.warnings[0].marker.cue_id, "early");
    }

    #[test]
    fn gap_tie_goes_to_earlier_boundary() {
        let spans = [Span(0.0, 10.0), Span(20.0, 10.0)];
        let markers = [at("mid", 15.0)];
        let layout = layout(&spans, &markers);
        assert_eq!(layout.slots[0].len(), 1);
        assert_eq!(layout.slots[0][0].offset, 10.0);
    }

    #[test]
    fn no_intervals_only_warns() {
        let spans: [Span; 0] = [];
        let markers = [at("a", 1.0)];
        let layout = layout(&spans, &markers);
        assert!(layout.slots.is_empty());
        assert_eq!(layout.warnings.len(), 1);
    }
}
