//! Cell buffer over the objective space and its sparse approximation.
//!
//! Points are filed by direction from a moving origin placed just below the
//! best value seen for every objective. In two dimensions a cell is an
//! angular sector of the positive quadrant; in three it is the region
//! closest to one unit direction of a near-uniform tiling of the positive
//! octant. Each cell keeps its closest points, sorted by distance, up to a
//! fixed capacity.

use core::f64::consts::FRAC_PI_2;

use super::graph::{LabelOptimizer, chain_edges, mesh_edges};
use crate::decomposition::{auto_divisions, das_dennis};
use crate::error::{Error, Result, check_dim};

/// Unary costs are capped at this normalized excess distance.
const UNARY_CAP: f64 = 1.0;
/// Integer scale applied to normalized costs.
const COST_SCALE: f64 = 1000.0;

/// One point retained by the buffer.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BufferEntry {
    /// Raw continuous design.
    pub x: Vec<f64>,
    /// Raw objective values.
    pub y: Vec<f64>,
    /// Euclidean distance from the origin at the time of insertion.
    pub distance: f64,
    /// Family label.
    pub family: usize,
}

/// One representative point per non-empty cell.
#[derive(Clone, Debug, Default)]
pub struct SparseApproximation {
    /// Cell index of each representative.
    pub cells: Vec<usize>,
    /// Family chosen for each cell.
    pub families: Vec<usize>,
    /// Raw continuous designs.
    pub x: Vec<Vec<f64>>,
    /// Raw objective values.
    pub y: Vec<Vec<f64>>,
}

/// Pareto-front buffer for two or three objectives.
///
/// Not synchronized: concurrent inserts must be serialized by the caller.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ParetoBuffer {
    n_obj: usize,
    cell_num: usize,
    capacity: usize,
    margin: f64,
    smoothness: i64,
    label_cost: i64,
    /// Unit cell directions (three objectives only).
    directions: Vec<Vec<f64>>,
    origin: Option<Vec<f64>>,
    cells: Vec<Vec<BufferEntry>>,
}

/// Builder for [`ParetoBuffer`].
#[derive(Clone, Debug)]
pub struct ParetoBufferBuilder {
    n_obj: usize,
    cell_num: Option<usize>,
    capacity: Option<usize>,
    margin: Option<f64>,
    smoothness: Option<i64>,
    label_cost: Option<i64>,
}

impl ParetoBufferBuilder {
    /// Creates a builder for `n_obj` objectives.
    #[must_use]
    pub fn new(n_obj: usize) -> Self {
        Self {
            n_obj,
            cell_num: None,
            capacity: None,
            margin: None,
            smoothness: None,
            label_cost: None,
        }
    }

    /// Number of cells. Default: 100 for two objectives, 1000 for three.
    ///
    /// With three objectives the count is rounded up to the size of the
    /// nearest direction lattice.
    #[must_use]
    pub fn cell_num(mut self, n: usize) -> Self {
        self.cell_num = Some(n);
        self
    }

    /// Points kept per cell. Default: 10.
    #[must_use]
    pub fn cell_capacity(mut self, n: usize) -> Self {
        self.capacity = Some(n);
        self
    }

    /// Gap between the origin and the best value of each objective.
    /// Default: 1e-2.
    #[must_use]
    pub fn origin_margin(mut self, margin: f64) -> Self {
        self.margin = Some(margin);
        self
    }

    /// Pairwise cost of adjacent cells holding different families.
    /// Default: 200.
    #[must_use]
    pub fn smoothness(mut self, cost: i64) -> Self {
        self.smoothness = Some(cost);
        self
    }

    /// Cost per distinct family in the approximation. Default: 50.
    #[must_use]
    pub fn label_cost(mut self, cost: i64) -> Self {
        self.label_cost = Some(cost);
        self
    }

    /// Build the buffer.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnsupportedConfiguration` unless there are two or
    /// three objectives, and `Error::InvalidConfig` for a zero cell count,
    /// zero capacity, or non-positive margin.
    pub fn build(self) -> Result<ParetoBuffer> {
        let default_cells = match self.n_obj {
            2 => 100,
            3 => 1000,
            n => {
                return Err(Error::UnsupportedConfiguration(format!(
                    "pareto buffer supports 2 or 3 objectives, got {n}"
                )));
            }
        };
        let cell_num = self.cell_num.unwrap_or(default_cells);
        let capacity = self.capacity.unwrap_or(10);
        let margin = self.margin.unwrap_or(1e-2);
        if cell_num == 0 || capacity == 0 {
            return Err(Error::InvalidConfig("buffer cell count and capacity must be positive".into()));
        }
        if margin.is_nan() || margin <= 0.0 {
            return Err(Error::InvalidConfig(format!("buffer origin margin must be positive, got {margin}")));
        }

        let directions = if self.n_obj == 3 {
            das_dennis(3, auto_divisions(3, cell_num))
                .into_iter()
                .map(|d| {
                    let norm = d.iter().map(|v| v * v).sum::<f64>().sqrt();
                    d.into_iter().map(|v| v / norm).collect()
                })
                .collect()
        } else {
            Vec::new()
        };
        let cell_num = if directions.is_empty() { cell_num } else { directions.len() };

        Ok(ParetoBuffer {
            n_obj: self.n_obj,
            cell_num,
            capacity,
            margin,
            smoothness: self.smoothness.unwrap_or(200),
            label_cost: self.label_cost.unwrap_or(50),
            directions,
            origin: None,
            cells: vec![Vec::new(); cell_num],
        })
    }
}

impl ParetoBuffer {
    /// Returns a builder for `n_obj` objectives.
    #[must_use]
    pub fn builder(n_obj: usize) -> ParetoBufferBuilder {
        ParetoBufferBuilder::new(n_obj)
    }

    /// Number of objectives.
    #[must_use]
    pub fn n_obj(&self) -> usize {
        self.n_obj
    }

    /// Number of cells.
    #[must_use]
    pub fn cell_num(&self) -> usize {
        self.cell_num
    }

    /// Current origin, once anything has been inserted.
    #[must_use]
    pub fn origin(&self) -> Option<&[f64]> {
        self.origin.as_deref()
    }

    /// Entries of cell `i`, closest first.
    #[must_use]
    pub fn cell(&self, i: usize) -> &[BufferEntry] {
        self.cells.get(i).map_or(&[], Vec::as_slice)
    }

    /// Total number of retained points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.iter().map(Vec::len).sum()
    }

    /// Whether the buffer holds no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(Vec::is_empty)
    }

    /// Every retained point, cell by cell.
    pub fn entries(&self) -> impl Iterator<Item = &BufferEntry> {
        self.cells.iter().flatten()
    }

    /// Drops every point and the origin.
    pub fn clear(&mut self) {
        self.origin = None;
        self.cells.iter_mut().for_each(Vec::clear);
    }

    /// Cell that `y` falls into relative to the current origin.
    #[must_use]
    pub fn cell_of(&self, y: &[f64]) -> Option<usize> {
        let origin = self.origin.as_ref()?;
        let v: Vec<f64> = y.iter().zip(origin).map(|(a, o)| a - o).collect();
        Some(self.locate(&v))
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    fn locate(&self, v: &[f64]) -> usize {
        if self.n_obj == 2 {
            let angle = v[1].atan2(v[0]).clamp(0.0, FRAC_PI_2);
            ((angle / FRAC_PI_2 * self.cell_num as f64) as usize).min(self.cell_num - 1)
        } else {
            let norm = v.iter().map(|a| a * a).sum::<f64>().sqrt().max(f64::MIN_POSITIVE);
            self.directions
                .iter()
                .enumerate()
                .map(|(i, d)| (i, d.iter().zip(v).map(|(a, b)| a * b / norm).sum::<f64>()))
                .max_by(|a, b| a.1.total_cmp(&b.1))
                .map_or(0, |(i, _)| i)
        }
    }

    fn place(&mut self, x: Vec<f64>, y: Vec<f64>, family: usize) {
        let Some(origin) = self.origin.as_ref() else {
            return;
        };
        let v: Vec<f64> = y.iter().zip(origin).map(|(a, o)| a - o).collect();
        let distance = v.iter().map(|a| a * a).sum::<f64>().sqrt();
        let cell = self.locate(&v);
        let entries = &mut self.cells[cell];
        let at = entries.partition_point(|e| e.distance <= distance);
        if at < self.capacity {
            entries.insert(at, BufferEntry { x, y, distance, family });
            entries.truncate(self.capacity);
        }
    }

    /// Insert a batch of points.
    ///
    /// When the batch improves on the best value of any objective, the
    /// origin moves and every retained point is filed again against it.
    ///
    /// # Errors
    ///
    /// Returns `Error::DimensionMismatch` if the slices differ in length or
    /// a row of `y` does not have `n_obj` values.
    pub fn insert(&mut self, x: &[Vec<f64>], y: &[Vec<f64>], families: &[usize]) -> Result<()> {
        check_dim("buffer designs", y.len(), x.len())?;
        check_dim("buffer families", y.len(), families.len())?;
        for row in y {
            check_dim("buffer objectives", self.n_obj, row.len())?;
        }
        if y.is_empty() {
            return Ok(());
        }

        let batch_min: Vec<f64> = (0..self.n_obj)
            .map(|j| y.iter().map(|r| r[j]).fold(f64::INFINITY, f64::min))
            .collect();
        let recenter = match &self.origin {
            None => true,
            Some(origin) => batch_min.iter().zip(origin).any(|(m, o)| *m < o + self.margin),
        };

        if recenter {
            let best: Vec<f64> = match &self.origin {
                None => batch_min,
                Some(origin) => batch_min.iter().zip(origin).map(|(m, o)| m.min(o + self.margin)).collect(),
            };
            self.origin = Some(best.iter().map(|b| b - self.margin).collect());
            let snapshot: Vec<BufferEntry> = self.cells.iter_mut().flat_map(core::mem::take).collect();
            trace_debug!(retained = snapshot.len(), "pareto buffer re-centered");
            for e in snapshot {
                self.place(e.x, e.y, e.family);
            }
        }

        for ((xi, yi), &family) in x.iter().zip(y).zip(families) {
            self.place(xi.clone(), yi.clone(), family);
        }
        Ok(())
    }

    /// Choose one family per non-empty cell and return the closest member
    /// of that family in each cell.
    ///
    /// # Errors
    ///
    /// Returns `Error::EmptyDataset` if the buffer is empty.
    pub fn sparse_approximation(&self, optimizer: &dyn LabelOptimizer) -> Result<SparseApproximation> {
        let occupied: Vec<usize> = (0..self.cell_num).filter(|&i| !self.cells[i].is_empty()).collect();
        if occupied.is_empty() {
            return Err(Error::EmptyDataset);
        }

        let mut labels: Vec<usize> = self.entries().map(|e| e.family).collect();
        labels.sort_unstable();
        labels.dedup();

        let unary: Vec<Vec<i64>> = occupied.iter().map(|&c| self.unary_costs(c, &labels)).collect();
        let pairwise: Vec<Vec<i64>> = (0..labels.len())
            .map(|a| (0..labels.len()).map(|b| if a == b { 0 } else { self.smoothness }).collect())
            .collect();
        let edges = if self.n_obj == 2 {
            chain_edges(occupied.len())
        } else {
            let points: Vec<[f64; 2]> = occupied.iter().map(|&c| simplex_projection(&self.directions[c])).collect();
            mesh_edges(&points)
        };

        let assignment = optimizer.optimize(&unary, &pairwise, &edges, self.label_cost);

        let mut approx = SparseApproximation::default();
        for (node, &c) in occupied.iter().enumerate() {
            let cell = &self.cells[c];
            let wanted = assignment.get(node).and_then(|&l| labels.get(l)).copied();
            let entry = wanted
                .and_then(|f| cell.iter().find(|e| e.family == f))
                .unwrap_or(&cell[0]);
            approx.cells.push(c);
            approx.families.push(entry.family);
            approx.x.push(entry.x.clone());
            approx.y.push(entry.y.clone());
        }
        trace_debug!(cells = approx.cells.len(), "sparse approximation built");
        Ok(approx)
    }

    /// Per-label cost of a cell: capped relative excess distance of the
    /// family's closest member over the cell's closest point.
    #[allow(clippy::cast_possible_truncation)]
    fn unary_costs(&self, cell: usize, labels: &[usize]) -> Vec<i64> {
        let entries = &self.cells[cell];
        let d_min = entries[0].distance.max(f64::MIN_POSITIVE);
        labels
            .iter()
            .map(|&family| {
                let excess = entries
                    .iter()
                    .find(|e| e.family == family)
                    .map_or(UNARY_CAP, |e| ((e.distance - d_min) / d_min).min(UNARY_CAP));
                (excess * COST_SCALE).round() as i64
            })
            .collect()
    }
}

/// Planar coordinates of a positive direction on the 2-simplex.
fn simplex_projection(d: &[f64]) -> [f64; 2] {
    let sum: f64 = d.iter().sum();
    let u: Vec<f64> = d.iter().map(|v| v / sum).collect();
    [u[1] + 0.5 * u[2], u[2] * 3.0_f64.sqrt() / 2.0]
}
