use crate::classify::Classification;
use crate::geometry::Point;

/// Sample points filed by classification.
///
/// Every container is append-only except [`Classification::Unknown`], which is drained by
/// [`SampleSet::take_unknown`] once per round. The same point may be filed more than once.
#[derive(Debug, Clone, Default)]
pub struct SampleSet {
    buckets: [Vec<Point>; 5],
}

fn slot(class: Classification) -> usize {
    match class {
        Classification::Counterexample => 0,
        Classification::Positive => 1,
        Classification::Negative => 2,
        Classification::Undetermined => 3,
        Classification::Unknown => 4,
    }
}

impl SampleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, class: Classification) -> &[Point] {
        &self.buckets[slot(class)]
    }

    pub fn add(&mut self, class: Classification, point: Point) {
        self.buckets[slot(class)].push(point);
    }

    pub fn extend(&mut self, class: Classification, points: impl IntoIterator<Item = Point>) {
        self.buckets[slot(class)].extend(points);
    }

    /// Removes and returns all points awaiting classification.
    pub fn take_unknown(&mut self) -> Vec<Point> {
        std::mem::take(&mut self.buckets[slot(Classification::Unknown)])
    }

    pub fn positives(&self) -> &[Point] {
        self.get(Classification::Positive)
    }

    pub fn negatives(&self) -> &[Point] {
        self.get(Classification::Negative)
    }

    pub fn counterexamples(&self) -> &[Point] {
        self.get(Classification::Counterexample)
    }

    /// Total number of filed points, unknown ones included.
    pub fn len(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buckets_are_disjoint() {
        let mut samples = SampleSet::new();
        samples.add(Classification::Positive, Point::from([1, 2]));
        samples.extend(
            Classification::Negative,
            [Point::from([20, 0]), Point::from([20, 0])],
        );
        samples.add(Classification::Unknown, Point::from([0, 0]));

        assert_eq!(samples.positives(), &[Point::from([1, 2])]);
        assert_eq!(samples.negatives().len(), 2);
        assert!(samples.counterexamples().is_empty());
        assert!(samples.get(Classification::Undetermined).is_empty());
        assert_eq!(samples.len(), 4);
        for class in Classification::ALL {
            println!("{}: {}", class, samples.get(class).len());
        }
    }

    #[test]
    fn test_take_unknown_drains() {
        let mut samples = SampleSet::new();
        samples.extend(Classification::Unknown, [Point::from([1]), Point::from([2])]);
        assert_eq!(samples.take_unknown().len(), 2);
        assert!(samples.take_unknown().is_empty());
        assert!(samples.is_empty());
    }
}
