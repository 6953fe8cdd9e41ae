//! Adaptive online clustering of direction samples.
//!
//! Every observed point becomes a weighted center. When more than `capacity`
//! centers exist, the two closest ones are merged into their weighted mean.
//! The `nb_clusters` heaviest centers are exposed as the direction prototypes.
//!
//! The accumulator is maintained by the training loop; the network only reads
//! [`OnlineCluster::centers`].

use crate::clusters::snapshot::DirectionArray;
use crate::error::{OptionCriticError, Result};

#[derive(Debug, Clone)]
struct WeightedCenter {
    center: Vec<f32>,
    weight: f32,
}

/// Online clustering accumulator.
#[derive(Debug, Clone)]
pub struct OnlineCluster {
    capacity: usize,
    nb_clusters: usize,
    dim: usize,
    centers: Vec<WeightedCenter>,
    observed: usize,
}

impl OnlineCluster {
    /// Create an empty accumulator.
    ///
    /// # Arguments
    /// * `capacity` - Maximum number of buffered centers
    /// * `nb_clusters` - Number of exposed prototypes (K)
    /// * `dim` - Point dimension (D)
    pub fn new(capacity: usize, nb_clusters: usize, dim: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            nb_clusters,
            dim,
            centers: Vec::new(),
            observed: 0,
        }
    }

    /// Add a point.
    pub fn observe(&mut self, point: &[f32]) -> Result<()> {
        if point.len() != self.dim {
            return Err(OptionCriticError::ShapeMismatch {
                what: "clustered point",
                expected: vec![self.dim],
                got: vec![point.len()],
            });
        }

        self.centers.push(WeightedCenter {
            center: point.to_vec(),
            weight: 1.0,
        });
        self.observed += 1;

        while self.centers.len() > self.capacity {
            self.merge_closest();
        }
        Ok(())
    }

    /// Add every row of an array.
    pub fn observe_rows(&mut self, points: &DirectionArray) -> Result<()> {
        for i in 0..points.rows() {
            self.observe(points.row(i))?;
        }
        Ok(())
    }

    fn merge_closest(&mut self) {
        let mut best = (0, 1, f32::INFINITY);
        for i in 0..self.centers.len() {
            for j in (i + 1)..self.centers.len() {
                let d = squared_distance(&self.centers[i].center, &self.centers[j].center);
                if d < best.2 {
                    best = (i, j, d);
                }
            }
        }

        let (i, j, _) = best;
        let absorbed = self.centers.swap_remove(j);
        let target = &mut self.centers[i];
        let total = target.weight + absorbed.weight;
        for (c, a) in target.center.iter_mut().zip(&absorbed.center) {
            *c = (*c * target.weight + a * absorbed.weight) / total;
        }
        target.weight = total;
    }

    /// The `nb_clusters` heaviest centers as a (K, D) array.
    ///
    /// Rows beyond the number of existing centers are zero.
    pub fn centers(&self) -> DirectionArray {
        let mut order: Vec<usize> = (0..self.centers.len()).collect();
        order.sort_by(|&a, &b| {
            self.centers[b]
                .weight
                .partial_cmp(&self.centers[a].weight)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut data = vec![0.0; self.nb_clusters * self.dim];
        for (row, &idx) in order.iter().take(self.nb_clusters).enumerate() {
            data[row * self.dim..(row + 1) * self.dim].copy_from_slice(&self.centers[idx].center);
        }

        // Length is nb_clusters * dim by construction
        DirectionArray::new(self.nb_clusters, self.dim, data)
            .unwrap_or_else(|_| DirectionArray::zeros(self.nb_clusters, self.dim))
    }

    /// Whether at least `nb_clusters` centers exist.
    pub fn is_ready(&self) -> bool {
        self.centers.len() >= self.nb_clusters
    }

    /// Number of buffered centers.
    pub fn len(&self) -> usize {
        self.centers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.centers.is_empty()
    }

    /// Total points observed.
    pub fn observed(&self) -> usize {
        self.observed
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn nb_clusters(&self) -> usize {
        self.nb_clusters
    }

    pub fn dim(&self) -> usize {
        self.dim
    }
}

fn squared_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}
