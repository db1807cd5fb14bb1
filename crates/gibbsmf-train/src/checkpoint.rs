//! Crash-safe persistence of training state.
//!
//! A run directory holds one subdirectory per saved step: `checkpoint-NNNNNN`
//! for crash-recovery checkpoints (keyed by absolute iteration + 1) and
//! `sample-NNNNNN` for posterior samples (keyed by sample number). A step is
//! staged under a `.tmp` suffix and atomically renamed on commit, so a crash
//! can never leave a half-written step behind; old checkpoints are removed
//! only after the new one is committed. Tensors go into bincode blobs, small
//! metadata into JSON.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use scirs2_core::ndarray_ext::{Array1, Array2};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

const META_NAME: &str = "meta.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StepMeta {
    isample: i64,
    checkpoint: bool,
}

#[derive(Serialize, Deserialize)]
struct MatrixBlob {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    bincode::serde::encode_to_vec(value, bincode::config::standard())
        .context("bincode encoding failed")
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let (value, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .context("bincode decoding failed")?;
    Ok(value)
}

/// A step directory being staged. Nothing is visible to readers until
/// [`StepWriter::commit`] renames the staging directory into place.
pub struct StepWriter {
    staging: PathBuf,
    target: PathBuf,
    meta: StepMeta,
}

impl StepWriter {
    fn create(target: PathBuf, meta: StepMeta) -> Result<Self> {
        let staging = target.with_extension("tmp");
        if staging.exists() {
            // leftover from a crashed run
            fs::remove_dir_all(&staging)
                .with_context(|| format!("removing stale staging dir {}", staging.display()))?;
        }
        fs::create_dir_all(&staging)
            .with_context(|| format!("creating staging dir {}", staging.display()))?;
        Ok(Self {
            staging,
            target,
            meta,
        })
    }

    pub fn write_matrix(&mut self, name: &str, m: &Array2<f64>) -> Result<()> {
        let blob = MatrixBlob {
            rows: m.nrows(),
            cols: m.ncols(),
            data: m.iter().copied().collect(),
        };
        self.write_raw(name, &encode(&blob)?)
    }

    pub fn write_vector(&mut self, name: &str, v: &Array1<f64>) -> Result<()> {
        self.write_raw(name, &encode(&v.to_vec())?)
    }

    /// Serialize any value into a bincode blob.
    pub fn write_bin<T: Serialize>(&mut self, name: &str, value: &T) -> Result<()> {
        self.write_raw(name, &encode(value)?)
    }

    pub fn write_json<T: Serialize>(&mut self, name: &str, value: &T) -> Result<()> {
        let path = self.staging.join(format!("{name}.json"));
        let text = serde_json::to_string_pretty(value)?;
        fs::write(&path, text).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    fn write_raw(&mut self, name: &str, bytes: &[u8]) -> Result<()> {
        let path = self.staging.join(format!("{name}.bin"));
        fs::write(&path, bytes).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    /// Finalize the step: write metadata, then rename into place.
    pub fn commit(self) -> Result<PathBuf> {
        let meta_path = self.staging.join(META_NAME);
        fs::write(&meta_path, serde_json::to_string_pretty(&self.meta)?)
            .with_context(|| format!("writing {}", meta_path.display()))?;
        if self.target.exists() {
            fs::remove_dir_all(&self.target)
                .with_context(|| format!("replacing {}", self.target.display()))?;
        }
        fs::rename(&self.staging, &self.target).with_context(|| {
            format!(
                "committing {} -> {}",
                self.staging.display(),
                self.target.display()
            )
        })?;
        Ok(self.target)
    }
}

/// A committed step directory.
pub struct StepReader {
    dir: PathBuf,
    meta: StepMeta,
}

impl StepReader {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let meta_path = dir.join(META_NAME);
        let text = fs::read_to_string(&meta_path)
            .with_context(|| format!("reading {}", meta_path.display()))?;
        let meta: StepMeta = serde_json::from_str(&text)
            .with_context(|| format!("parsing {}", meta_path.display()))?;
        Ok(Self { dir, meta })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn isample(&self) -> i64 {
        self.meta.isample
    }

    pub fn is_checkpoint(&self) -> bool {
        self.meta.checkpoint
    }

    pub fn read_matrix(&self, name: &str) -> Result<Array2<f64>> {
        let blob: MatrixBlob = decode(&self.read_raw(name)?)?;
        if blob.data.len() != blob.rows * blob.cols {
            bail!(
                "matrix blob '{name}' claims {}x{} but holds {} values",
                blob.rows,
                blob.cols,
                blob.data.len()
            );
        }
        Array2::from_shape_vec((blob.rows, blob.cols), blob.data)
            .with_context(|| format!("reshaping matrix blob '{name}'"))
    }

    pub fn read_vector(&self, name: &str) -> Result<Array1<f64>> {
        let data: Vec<f64> = decode(&self.read_raw(name)?)?;
        Ok(Array1::from_vec(data))
    }

    pub fn read_bin<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        decode(&self.read_raw(name)?)
    }

    pub fn read_json<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let path = self.dir.join(format!("{name}.json"));
        let text =
            fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    fn read_raw(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.dir.join(format!("{name}.bin"));
        fs::read(&path).with_context(|| format!("reading {}", path.display()))
    }
}

/// The run directory: creates steps, finds the latest checkpoint, lists
/// posterior samples, prunes superseded checkpoints.
pub struct CheckpointStore {
    root: PathBuf,
}

impl CheckpointStore {
    pub fn create(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("creating run directory {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn step_dir(&self, isample: i64, checkpoint: bool) -> PathBuf {
        let prefix = if checkpoint { "checkpoint" } else { "sample" };
        self.root.join(format!("{prefix}-{isample:06}"))
    }

    pub fn create_step(&self, isample: i64, checkpoint: bool) -> Result<StepWriter> {
        StepWriter::create(
            self.step_dir(isample, checkpoint),
            StepMeta {
                isample,
                checkpoint,
            },
        )
    }

    fn scan(&self, prefix: &str) -> Result<Vec<(i64, PathBuf)>> {
        let mut found = Vec::new();
        for entry in fs::read_dir(&self.root)
            .with_context(|| format!("listing {}", self.root.display()))?
        {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(num) = name.strip_prefix(prefix).and_then(|s| s.strip_prefix('-')) else {
                continue;
            };
            if name.ends_with(".tmp") {
                continue;
            }
            if let Ok(isample) = num.parse::<i64>() {
                found.push((isample, entry.path()));
            }
        }
        found.sort_by_key(|(isample, _)| *isample);
        Ok(found)
    }

    /// Most recent committed checkpoint, if any.
    pub fn latest_checkpoint(&self) -> Result<Option<StepReader>> {
        match self.scan("checkpoint")?.into_iter().next_back() {
            Some((_, dir)) => Ok(Some(StepReader::open(dir)?)),
            None => Ok(None),
        }
    }

    /// All committed posterior samples, ascending by sample number.
    pub fn sample_steps(&self) -> Result<Vec<StepReader>> {
        self.scan("sample")?
            .into_iter()
            .map(|(_, dir)| StepReader::open(dir))
            .collect()
    }

    /// Remove every checkpoint except `keep`. Called after the new checkpoint
    /// committed, so at least one valid checkpoint exists at all times.
    pub fn remove_old_checkpoints(&self, keep: i64) -> Result<()> {
        for (isample, dir) in self.scan("checkpoint")? {
            if isample != keep {
                fs::remove_dir_all(&dir)
                    .with_context(|| format!("removing {}", dir.display()))?;
            }
        }
        Ok(())
    }
}
