use std::collections::BTreeMap;
use uuid::Uuid;

/// Allowed values of one configured axis, in axis order.
#[derive(Debug, Clone)]
pub struct AxisValues {
    pub axis_id: Uuid,
    pub values: Vec<String>,
}

/// Size of the full matrix: the product of all value-set sizes.
/// Zero when no axes are configured or any axis has no values.
pub fn combination_count(axes: &[AxisValues]) -> usize {
    if axes.is_empty() || axes.iter().any(|a| a.values.is_empty()) {
        return 0;
    }
    axes.iter()
        .fold(1usize, |acc, a| acc.saturating_mul(a.values.len()))
}

/// Lazily enumerate the Cartesian product of all axes' value sets.
/// Pure computation over the given slices; callers check the
/// combination-count ceiling before materializing the sequence.
pub fn combinations(axes: &[AxisValues]) -> MatrixIter<'_> {
    let exhausted = axes.is_empty() || axes.iter().any(|a| a.values.is_empty());
    MatrixIter {
        axes,
        indices: vec![0; axes.len()],
        exhausted,
    }
}

/// Odometer over the value indices: the last axis turns fastest.
pub struct MatrixIter<'a> {
    axes: &'a [AxisValues],
    indices: Vec<usize>,
    exhausted: bool,
}

impl Iterator for MatrixIter<'_> {
    type Item = BTreeMap<Uuid, String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }

        let current: BTreeMap<Uuid, String> = self
            .axes
            .iter()
            .zip(&self.indices)
            .map(|(axis, &i)| (axis.axis_id, axis.values[i].clone()))
            .collect();

        // Advance, carrying from the rightmost axis.
        for pos in (0..self.axes.len()).rev() {
            self.indices[pos] += 1;
            if self.indices[pos] < self.axes[pos].values.len() {
                return Some(current);
            }
            self.indices[pos] = 0;
        }
        self.exhausted = true;
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn axis(values: &[&str]) -> AxisValues {
        AxisValues {
            axis_id: Uuid::new_v4(),
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }

    #[test]
    fn count_is_product_of_value_set_sizes() {
        let axes = [axis(&["Red", "Blue", "Green"]), axis(&["S", "M"])];
        assert_eq!(combination_count(&axes), 6);
        assert_eq!(combination_count(&[]), 0);
        assert_eq!(combination_count(&[axis(&[])]), 0);
    }

    #[test]
    fn enumerates_every_distinct_full_assignment() {
        let axes = [axis(&["Red", "Blue", "Green"]), axis(&["S", "M"])];
        let all: Vec<_> = combinations(&axes).collect();
        assert_eq!(all.len(), 6);

        let distinct: HashSet<String> = all
            .iter()
            .map(|c| {
                c.values().cloned().collect::<Vec<_>>().join("/")
            })
            .collect();
        assert_eq!(distinct.len(), 6);

        for combination in &all {
            assert_eq!(combination.len(), 2);
        }
    }

    #[test]
    fn single_axis_matrix_is_its_value_list() {
        let a = axis(&["A", "B"]);
        let all: Vec<_> = combinations(std::slice::from_ref(&a)).collect();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0][&a.axis_id], "A");
        assert_eq!(all[1][&a.axis_id], "B");
    }

    #[test]
    fn iteration_is_lazy() {
        // 100^4 combinations; taking three must not materialize the rest.
        let big: Vec<String> = (0..100).map(|i| format!("v{}", i)).collect();
        let axes: Vec<AxisValues> = (0..4)
            .map(|_| AxisValues {
                axis_id: Uuid::new_v4(),
                values: big.clone(),
            })
            .collect();

        let first_three: Vec<_> = combinations(&axes).take(3).collect();
        assert_eq!(first_three.len(), 3);
        assert_eq!(combination_count(&axes), 100_000_000);
    }
}
