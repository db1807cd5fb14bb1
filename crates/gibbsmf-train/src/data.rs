//! Training-data abstraction and its two implementations.
//!
//! The Gibbs sweep talks to the data through [`TrainData`]: per-row
//! precision-and-mean accumulation (`get_pnm`), cached per-mode precomputation
//! (`update_pnm`), residual statistics, and the noise hook. Sparse-observed
//! ("scarce") data walks the per-mode compressed orientations built by
//! `gibbsmf-core`; dense data uses cached Gram matrices of the opposing
//! factor, so a row's precision accumulation is a single rank-K lookup.

use scirs2_core::ndarray_ext::{Array1, Array2, Axis};
use scirs2_core::parallel_ops::*;
use scirs2_core::random::rngs::StdRng;

use gibbsmf_core::{partition_offsets, SparseMode, SparseTensor};
use gibbsmf_kernels::sample_standard_normal;

use crate::config::{CenterMode, NoiseConfig};
use crate::error::{TrainError, TrainResult};
use crate::model::Model;
use crate::noise::NoiseModel;

/// Rows with more observed entries than this accumulate their pnm sums in
/// parallel chunks.
const PNM_PARALLEL_NNZ: usize = 10_000;

/// Parallel partial sums are always combined in chunk order. Float addition
/// is not associative, and a scheduling-dependent combine order would break
/// seed reproducibility.
fn ordered_sum(parts: Vec<f64>) -> f64 {
    parts.into_iter().sum()
}

/// What the samplers need from the training data.
pub trait TrainData: Send + Sync {
    fn nmodes(&self) -> usize;
    fn dims(&self) -> &[usize];
    /// Observed-entry count (all cells for dense data).
    fn nnz(&self) -> usize;
    fn global_mean(&self) -> f64;
    fn noise(&self) -> &NoiseModel;
    fn noise_mut(&mut self) -> &mut NoiseModel;

    /// The compressed orientation of one mode; `None` for dense data.
    fn sparse_mode(&self, mode: usize) -> Option<&SparseMode>;

    /// Center the stored values and bind the noise model to the data
    /// variance. Called exactly once, before the first sweep.
    fn init(&mut self, center: CenterMode) -> TrainResult<()>;

    /// Accumulate row `row` of `mode`'s precision `Q` and linear term `r`
    /// from the observed entries, weighted by the noise precision. `rng` is
    /// consumed only by the probit auxiliary draws.
    fn get_pnm(
        &self,
        model: &Model,
        mode: usize,
        row: usize,
        r: &mut Array1<f64>,
        q: &mut Array2<f64>,
        rng: &mut StdRng,
    );

    /// Refresh per-mode cached sums after `mode`'s factor changed.
    fn update_pnm(&mut self, model: &Model, mode: usize);

    /// RMSE of the current model against the uncentered values.
    fn train_rmse(&self, model: &Model) -> f64;

    /// Sum of squared residuals against the uncentered values.
    fn sumsq(&self, model: &Model) -> f64;

    /// Per-sweep noise update (resamples the adaptive precision).
    fn update(&mut self, model: &Model, rng: &mut StdRng) -> TrainResult<()>;

    /// Centering offset to add back to a model prediction at `coord`.
    fn offset(&self, coord: &[u32]) -> f64;

    fn status(&self) -> String;
}

/// Elementwise product of the other modes' latent rows for one entry.
pub(crate) fn entry_product(model: &Model, sm: &SparseMode, entry: usize, out: &mut [f64]) {
    out.fill(1.0);
    for (j, &om) in sm.other_modes().iter().enumerate() {
        let idx = sm.others(entry)[j] as usize;
        let f = model.factor(om);
        for (d, o) in out.iter_mut().enumerate() {
            *o *= f[[idx, d]];
        }
    }
}

fn accumulate_entry(
    alpha: f64,
    y: f64,
    v: &[f64],
    r: &mut Array1<f64>,
    q: &mut Array2<f64>,
) {
    let k = v.len();
    for d in 0..k {
        r[d] += alpha * y * v[d];
        for d2 in 0..k {
            q[[d, d2]] += alpha * v[d] * v[d2];
        }
    }
}

/// Sparse-observed matrix or tensor data.
pub struct ScarceTensorData {
    tensor: SparseTensor,
    modes: Vec<SparseMode>,
    global_mean: f64,
    noise: NoiseModel,
    initialized: bool,
}

impl ScarceTensorData {
    pub fn new(tensor: SparseTensor, noise: NoiseConfig) -> TrainResult<Self> {
        let modes = (0..tensor.nmodes())
            .map(|m| SparseMode::new(&tensor, m))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| TrainError::InvalidConfig(e.to_string()))?;
        Ok(Self {
            tensor,
            modes,
            global_mean: 0.0,
            noise: NoiseModel::from_config(noise),
            initialized: false,
        })
    }

    fn residual_sumsq(&self, model: &Model) -> f64 {
        let gm = self.global_mean;
        ordered_sum(
            (0..self.tensor.nnz())
                .into_par_iter()
                .map(|e| {
                    let pred = model.dot(self.tensor.coord(e)) + gm;
                    let d = pred - self.tensor.value(e);
                    d * d
                })
                .collect(),
        )
    }

    fn get_pnm_sequential(
        &self,
        model: &Model,
        mode: usize,
        row: usize,
        alpha: f64,
        r: &mut Array1<f64>,
        q: &mut Array2<f64>,
    ) {
        let sm = &self.modes[mode];
        let mut v = vec![1.0f64; model.num_latent()];
        for e in sm.row_range(row) {
            entry_product(model, sm, e, &mut v);
            accumulate_entry(alpha, sm.value(e), &v, r, q);
        }
    }

    fn get_pnm_parallel(
        &self,
        model: &Model,
        mode: usize,
        row: usize,
        alpha: f64,
        r: &mut Array1<f64>,
        q: &mut Array2<f64>,
    ) {
        let sm = &self.modes[mode];
        let k = model.num_latent();
        let range = sm.row_range(row);
        let num_chunks = range.len().min(100);
        let offsets = partition_offsets(range.len(), num_chunks);
        let partials: Vec<(Array2<f64>, Array1<f64>)> = (0..num_chunks)
            .into_par_iter()
            .map(|c| {
                let mut ql = Array2::<f64>::zeros((k, k));
                let mut rl = Array1::<f64>::zeros(k);
                let mut v = vec![1.0f64; k];
                for e in range.start + offsets[c]..range.start + offsets[c + 1] {
                    entry_product(model, sm, e, &mut v);
                    accumulate_entry(alpha, sm.value(e), &v, &mut rl, &mut ql);
                }
                (ql, rl)
            })
            .collect();
        for (ql, rl) in partials {
            *q += &ql;
            *r += &rl;
        }
    }

    /// Binary observations: each entry contributes a truncated-normal
    /// auxiliary value `z = (2y-1)·|vᵀu + ε|` with unit weight.
    fn get_pnm_probit(
        &self,
        model: &Model,
        mode: usize,
        row: usize,
        r: &mut Array1<f64>,
        q: &mut Array2<f64>,
        rng: &mut StdRng,
    ) {
        let sm = &self.modes[mode];
        let k = model.num_latent();
        let u = model.factor(mode);
        let mut v = vec![1.0f64; k];
        for e in sm.row_range(row) {
            entry_product(model, sm, e, &mut v);
            let linear: f64 = (0..k).map(|d| v[d] * u[[row, d]]).sum();
            let sign = 2.0 * sm.value(e) - 1.0;
            let z = sign * (linear + sample_standard_normal(rng)).abs();
            accumulate_entry(1.0, z, &v, r, q);
        }
    }
}

impl TrainData for ScarceTensorData {
    fn nmodes(&self) -> usize {
        self.tensor.nmodes()
    }

    fn dims(&self) -> &[usize] {
        self.tensor.dims()
    }

    fn nnz(&self) -> usize {
        self.tensor.nnz()
    }

    fn global_mean(&self) -> f64 {
        self.global_mean
    }

    fn noise(&self) -> &NoiseModel {
        &self.noise
    }

    fn noise_mut(&mut self) -> &mut NoiseModel {
        &mut self.noise
    }

    fn sparse_mode(&self, mode: usize) -> Option<&SparseMode> {
        self.modes.get(mode)
    }

    fn init(&mut self, center: CenterMode) -> TrainResult<()> {
        if self.initialized {
            return Err(TrainError::InvalidConfig(
                "data initialized twice".into(),
            ));
        }
        self.global_mean = match center {
            CenterMode::None => 0.0,
            CenterMode::Global | CenterMode::View => self.tensor.mean(),
            CenterMode::Mode(_) => {
                return Err(TrainError::InvalidConfig(
                    "per-mode centering requires dense data".into(),
                ))
            }
        };
        if self.global_mean != 0.0 {
            for sm in &mut self.modes {
                for v in sm.values_mut() {
                    *v -= self.global_mean;
                }
            }
        }
        let nnz = self.tensor.nnz();
        let var = if nnz == 0 {
            0.0
        } else {
            self.modes[0].values().iter().map(|v| v * v).sum::<f64>() / nnz as f64
        };
        self.noise.init(var);
        self.initialized = true;
        Ok(())
    }

    fn get_pnm(
        &self,
        model: &Model,
        mode: usize,
        row: usize,
        r: &mut Array1<f64>,
        q: &mut Array2<f64>,
        rng: &mut StdRng,
    ) {
        if self.noise.is_probit() {
            self.get_pnm_probit(model, mode, row, r, q, rng);
            return;
        }
        let alpha = self.noise.precision();
        let local = self.modes[mode].nnz_of(row);
        if local > PNM_PARALLEL_NNZ || local * 100 > self.tensor.nnz() {
            self.get_pnm_parallel(model, mode, row, alpha, r, q);
        } else {
            self.get_pnm_sequential(model, mode, row, alpha, r, q);
        }
    }

    fn update_pnm(&mut self, _model: &Model, _mode: usize) {}

    fn train_rmse(&self, model: &Model) -> f64 {
        let nnz = self.tensor.nnz();
        if nnz == 0 {
            return f64::NAN;
        }
        (self.residual_sumsq(model) / nnz as f64).sqrt()
    }

    fn sumsq(&self, model: &Model) -> f64 {
        self.residual_sumsq(model)
    }

    fn update(&mut self, model: &Model, rng: &mut StdRng) -> TrainResult<()> {
        if matches!(self.noise, NoiseModel::Adaptive { .. }) {
            let ss = self.residual_sumsq(model);
            let nnz = self.tensor.nnz();
            self.noise
                .update(rng, ss, nnz)
                .map_err(|source| TrainError::HyperUpdate { mode: 0, source })?;
        }
        Ok(())
    }

    fn offset(&self, _coord: &[u32]) -> f64 {
        self.global_mean
    }

    fn status(&self) -> String {
        format!(
            "scarce {:?}, {} observed, {}",
            self.tensor.dims(),
            self.tensor.nnz(),
            self.noise.status()
        )
    }
}

/// Fully observed matrix data with cached per-mode Gram matrices.
pub struct DenseMatrixData {
    y: Array2<f64>,
    yc: Array2<f64>,
    global_mean: f64,
    /// `(mode, per-slice means)` when per-mode centering is active.
    mode_means: Option<(usize, Array1<f64>)>,
    /// Gram matrix of the *other* mode's factor, per mode.
    vv: Vec<Array2<f64>>,
    dims: Vec<usize>,
    noise: NoiseModel,
    initialized: bool,
}

impl DenseMatrixData {
    pub fn new(y: Array2<f64>, noise: NoiseConfig) -> TrainResult<Self> {
        if y.nrows() == 0 || y.ncols() == 0 {
            return Err(TrainError::InvalidConfig(
                "dense training matrix must be non-empty".into(),
            ));
        }
        let dims = vec![y.nrows(), y.ncols()];
        Ok(Self {
            yc: y.clone(),
            y,
            global_mean: 0.0,
            mode_means: None,
            vv: vec![Array2::zeros((0, 0)), Array2::zeros((0, 0))],
            dims,
            noise: NoiseModel::from_config(noise),
            initialized: false,
        })
    }

    fn ncells(&self) -> usize {
        self.dims[0] * self.dims[1]
    }

    fn residual_sumsq(&self, model: &Model) -> f64 {
        ordered_sum(
            (0..self.dims[0])
                .into_par_iter()
                .map(|i| {
                    let mut se = 0.0;
                    for j in 0..self.dims[1] {
                        let coord = [i as u32, j as u32];
                        let pred = model.dot(&coord) + self.offset(&coord);
                        let d = pred - self.y[[i, j]];
                        se += d * d;
                    }
                    se
                })
                .collect(),
        )
    }
}

impl TrainData for DenseMatrixData {
    fn nmodes(&self) -> usize {
        2
    }

    fn dims(&self) -> &[usize] {
        &self.dims
    }

    fn nnz(&self) -> usize {
        self.ncells()
    }

    fn global_mean(&self) -> f64 {
        self.global_mean
    }

    fn noise(&self) -> &NoiseModel {
        &self.noise
    }

    fn noise_mut(&mut self) -> &mut NoiseModel {
        &mut self.noise
    }

    fn sparse_mode(&self, _mode: usize) -> Option<&SparseMode> {
        None
    }

    fn init(&mut self, center: CenterMode) -> TrainResult<()> {
        if self.initialized {
            return Err(TrainError::InvalidConfig(
                "data initialized twice".into(),
            ));
        }
        match center {
            CenterMode::None => {}
            CenterMode::Global | CenterMode::View => {
                self.global_mean = self.y.mean().unwrap_or(0.0);
                self.yc = &self.y - self.global_mean;
            }
            CenterMode::Mode(mode) => {
                // average over the other axis, one mean per slice of `mode`
                let axis = Axis(1 - mode);
                let means = self.y.mean_axis(axis).ok_or_else(|| {
                    TrainError::InvalidConfig("cannot center an empty matrix".into())
                })?;
                self.yc = self.y.clone();
                match mode {
                    0 => {
                        for (i, mut row) in self.yc.rows_mut().into_iter().enumerate() {
                            row -= means[i];
                        }
                    }
                    _ => {
                        for (j, mut col) in self.yc.columns_mut().into_iter().enumerate() {
                            col -= means[j];
                        }
                    }
                }
                self.mode_means = Some((mode, means));
            }
        }
        let var = self.yc.iter().map(|v| v * v).sum::<f64>() / self.ncells() as f64;
        self.noise.init(var);
        self.initialized = true;
        Ok(())
    }

    fn get_pnm(
        &self,
        model: &Model,
        mode: usize,
        row: usize,
        r: &mut Array1<f64>,
        q: &mut Array2<f64>,
        _rng: &mut StdRng,
    ) {
        let alpha = self.noise.precision();
        let other = 1 - mode;
        let v = model.factor(other);
        let yvec = if mode == 0 {
            self.yc.row(row).to_owned()
        } else {
            self.yc.column(row).to_owned()
        };
        let vt_y = v.t().dot(&yvec);
        r.scaled_add(alpha, &vt_y);
        q.scaled_add(alpha, &self.vv[mode]);
    }

    fn update_pnm(&mut self, model: &Model, mode: usize) {
        // `mode`'s factor changed, so the *other* mode's cached Gram is stale
        let other = 1 - mode;
        let f = model.factor(mode);
        let k = f.ncols();
        let n = f.nrows();
        let num_chunks = n.div_ceil(256).max(1);
        let offsets = partition_offsets(n, num_chunks);
        let partials: Vec<Array2<f64>> = (0..num_chunks)
            .into_par_iter()
            .map(|c| {
                let mut acc = Array2::<f64>::zeros((k, k));
                for i in offsets[c]..offsets[c + 1] {
                    let row = f.row(i);
                    for a in 0..k {
                        for b in 0..k {
                            acc[[a, b]] += row[a] * row[b];
                        }
                    }
                }
                acc
            })
            .collect();
        let mut gram = Array2::<f64>::zeros((k, k));
        for p in partials {
            gram += &p;
        }
        self.vv[other] = gram;
    }

    fn train_rmse(&self, model: &Model) -> f64 {
        (self.residual_sumsq(model) / self.ncells() as f64).sqrt()
    }

    fn sumsq(&self, model: &Model) -> f64 {
        self.residual_sumsq(model)
    }

    fn update(&mut self, model: &Model, rng: &mut StdRng) -> TrainResult<()> {
        if matches!(self.noise, NoiseModel::Adaptive { .. }) {
            let ss = self.residual_sumsq(model);
            let n = self.ncells();
            self.noise
                .update(rng, ss, n)
                .map_err(|source| TrainError::HyperUpdate { mode: 0, source })?;
        }
        Ok(())
    }

    fn offset(&self, coord: &[u32]) -> f64 {
        match &self.mode_means {
            Some((mode, means)) => means[coord[*mode] as usize],
            None => self.global_mean,
        }
    }

    fn status(&self) -> String {
        format!(
            "dense {}x{}, {}",
            self.dims[0],
            self.dims[1],
            self.noise.status()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelInit;
    use scirs2_core::ndarray_ext::array;
    use scirs2_core::random::{Rng, SeedableRng};

    fn random_model(dims: &[usize], k: usize, seed: u64) -> Model {
        let mut rng = StdRng::seed_from_u64(seed);
        Model::init(k, dims, ModelInit::Random, &mut rng)
    }

    fn scarce_fixture(noise: NoiseConfig) -> ScarceTensorData {
        let t = SparseTensor::from_triplets(
            4,
            3,
            &[0, 0, 1, 2, 3, 3],
            &[0, 2, 1, 2, 0, 1],
            &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
        )
        .unwrap();
        ScarceTensorData::new(t, noise).unwrap()
    }

    #[test]
    fn scarce_centering_shifts_values_and_keeps_the_mean() {
        let mut data = scarce_fixture(NoiseConfig::Fixed { precision: 1.0 });
        data.init(CenterMode::Global).unwrap();
        assert!((data.global_mean() - 3.5).abs() < 1e-12);
        let sum: f64 = data.sparse_mode(0).unwrap().values().iter().sum();
        assert!(sum.abs() < 1e-12);
        // a second init is a usage error
        assert!(data.init(CenterMode::Global).is_err());
    }

    #[test]
    fn scarce_pnm_matches_brute_force() {
        let mut data = scarce_fixture(NoiseConfig::Fixed { precision: 2.0 });
        data.init(CenterMode::Global).unwrap();
        let model = random_model(&[4, 3], 3, 11);
        let mut rng = StdRng::seed_from_u64(0);

        let mut r = Array1::<f64>::zeros(3);
        let mut q = Array2::<f64>::zeros((3, 3));
        data.get_pnm(&model, 0, 0, &mut r, &mut q, &mut rng);

        // row 0 observes columns 0 and 2
        let v0 = model.factor(1).row(0).to_owned();
        let v2 = model.factor(1).row(2).to_owned();
        let gm = data.global_mean();
        let r_expect = &v0 * (2.0 * (1.0 - gm)) + &v2 * (2.0 * (2.0 - gm));
        for d in 0..3 {
            assert!((r[d] - r_expect[d]).abs() < 1e-12);
            for d2 in 0..3 {
                let q_expect = 2.0 * (v0[d] * v0[d2] + v2[d] * v2[d2]);
                assert!((q[[d, d2]] - q_expect).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn scarce_train_rmse_is_on_uncentered_values() {
        let mut data = scarce_fixture(NoiseConfig::Fixed { precision: 1.0 });
        data.init(CenterMode::Global).unwrap();
        // zero model predicts the global mean everywhere
        let mut rng = StdRng::seed_from_u64(0);
        let model = Model::init(2, &[4, 3], ModelInit::Zeros, &mut rng);
        let values = [1.0f64, 2.0, 3.0, 4.0, 5.0, 6.0];
        let expect = (values.iter().map(|v| (v - 3.5) * (v - 3.5)).sum::<f64>()
            / values.len() as f64)
            .sqrt();
        assert!((data.train_rmse(&model) - expect).abs() < 1e-12);
    }

    #[test]
    fn dense_pnm_uses_the_cached_gram() {
        let y = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0], [1.0, 0.0, 2.0]];
        let mut data = DenseMatrixData::new(y, NoiseConfig::Fixed { precision: 1.5 }).unwrap();
        data.init(CenterMode::Global).unwrap();
        let model = random_model(&[4, 3], 2, 21);
        data.update_pnm(&model, 1); // refresh mode 0's cache from factor 1

        let mut r = Array1::<f64>::zeros(2);
        let mut q = Array2::<f64>::zeros((2, 2));
        let mut rng = StdRng::seed_from_u64(0);
        data.get_pnm(&model, 0, 1, &mut r, &mut q, &mut rng);

        let v = model.factor(1);
        let gram = v.t().dot(v);
        for a in 0..2 {
            for b in 0..2 {
                assert!((q[[a, b]] - 1.5 * gram[[a, b]]).abs() < 1e-10);
            }
        }
        let yc_row1 = array![4.0, 5.0, 6.0] - data.global_mean();
        let expect = v.t().dot(&yc_row1) * 1.5;
        for d in 0..2 {
            assert!((r[d] - expect[d]).abs() < 1e-10);
        }
    }

    #[test]
    fn dense_mode_centering_reproduces_offsets() {
        let y = array![[1.0, 3.0], [10.0, 20.0]];
        let mut data = DenseMatrixData::new(y, NoiseConfig::Fixed { precision: 1.0 }).unwrap();
        data.init(CenterMode::Mode(0)).unwrap();
        assert!((data.offset(&[0, 1]) - 2.0).abs() < 1e-12);
        assert!((data.offset(&[1, 0]) - 15.0).abs() < 1e-12);
        // centered rows sum to zero
        let mut rng = StdRng::seed_from_u64(0);
        let model = Model::init(2, &[2, 2], ModelInit::Zeros, &mut rng);
        // zero model + offsets reproduce per-row means exactly
        let expect = ((1.0f64 - 2.0).powi(2)
            + (3.0f64 - 2.0).powi(2)
            + (10.0f64 - 15.0).powi(2)
            + (20.0f64 - 15.0).powi(2))
            / 4.0;
        assert!((data.train_rmse(&model) - expect.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn probit_pnm_has_unit_weight_and_sign_structure() {
        let t = SparseTensor::from_triplets(2, 2, &[0, 0], &[0, 1], &[1.0, 0.0]).unwrap();
        let mut data = ScarceTensorData::new(t, NoiseConfig::Probit).unwrap();
        data.init(CenterMode::None).unwrap();
        let model = random_model(&[2, 2], 2, 3);
        let mut rng = StdRng::seed_from_u64(5);

        let mut r = Array1::<f64>::zeros(2);
        let mut q = Array2::<f64>::zeros((2, 2));
        data.get_pnm(&model, 0, 0, &mut r, &mut q, &mut rng);

        // Q is the raw scatter of the two column vectors, no noise scaling
        let v0 = model.factor(1).row(0);
        let v1 = model.factor(1).row(1);
        for a in 0..2 {
            for b in 0..2 {
                let expect = v0[a] * v0[b] + v1[a] * v1[b];
                assert!((q[[a, b]] - expect).abs() < 1e-12);
            }
        }
        // draws were consumed
        let before: f64 = rng.random();
        let mut fresh = StdRng::seed_from_u64(5);
        let first: f64 = fresh.random();
        assert_ne!(before, first);
    }
}
