use crate::contractionpath::paths::{finish, OptimizePath};
use crate::contractionpath::PathInputs;
use crate::types::ContrTriple;

/// The trivial strategy: contract the inputs left to right in ascending
/// vertex-id order. Useful as a baseline and for tiny networks where
/// planning effort does not pay off.
pub struct Sequential<'a> {
    inputs: &'a PathInputs,
    best_path: Vec<ContrTriple>,
    best_flops: f64,
    best_size: f64,
}

impl<'a> Sequential<'a> {
    pub fn new(inputs: &'a PathInputs) -> Self {
        Self {
            inputs,
            best_path: Vec::new(),
            best_flops: f64::MAX,
            best_size: f64::MAX,
        }
    }
}

impl OptimizePath for Sequential<'_> {
    fn optimize_path(&mut self) {
        let ids = &self.inputs.ids;
        let mut next_id = self.inputs.first_intermediate_id();
        let mut path = Vec::with_capacity(ids.len().saturating_sub(1));
        let mut acc = ids[0];
        for (i, &id) in ids.iter().enumerate().skip(1) {
            let result_id = if i + 1 == ids.len() { 0 } else { next_id };
            path.push(ContrTriple {
                result_id,
                left_id: acc,
                right_id: id,
            });
            acc = result_id;
            next_id += 1;
        }
        (self.best_path, self.best_flops, self.best_size) = finish(self.inputs, path);
    }

    fn best_path(&self) -> &[ContrTriple] {
        &self.best_path
    }

    fn best_flops(&self) -> f64 {
        self.best_flops
    }

    fn best_size(&self) -> f64 {
        self.best_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::contr;
    use crate::contractionpath::EdgeTensor;

    #[test]
    fn test_left_to_right_order() {
        let inputs = PathInputs {
            ids: vec![1, 2, 3],
            tensors: vec![
                EdgeTensor::new(vec![0, 1]),
                EdgeTensor::new(vec![1, 2]),
                EdgeTensor::new(vec![2, 3]),
            ],
            output: EdgeTensor::new(vec![0, 3]),
            bond_dims: [(0, 10), (1, 20), (2, 5), (3, 30)].into_iter().collect(),
        };
        let mut opt = Sequential::new(&inputs);
        opt.optimize_path();
        assert_eq!(opt.best_path(), contr![(4, 1, 2), (0, 4, 3)]);
        assert_eq!(opt.best_flops(), 1000.0 + 1500.0);
    }
}
