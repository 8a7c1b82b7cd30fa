use anyhow::{Context, Result};
use log::{debug, warn};
use ndarray::prelude::*;
use ndarray_npy::{read_npy, write_npy};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

static SCRATCH_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Location of the fitting tensor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageKind {
    Core,
    Disk,
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StorageKind::Core => write!(f, "Core"),
            StorageKind::Disk => write!(f, "Disk"),
        }
    }
}

/// Row blocked storage of a matrix with `nrows` auxiliary rows and `ncols` = nbf^2 columns.
/// The blocks are visited in ascending row order, the callback receives the index of the
/// first row of the block.
pub trait FittingStorage: Send + Sync {
    fn kind(&self) -> StorageKind;

    fn nrows(&self) -> usize;

    fn ncols(&self) -> usize;

    fn for_each_block(
        &self,
        f: &mut dyn FnMut(usize, ArrayView2<f64>) -> Result<()>,
    ) -> Result<()>;

    /// Modified blocks are written back.
    fn for_each_block_mut(
        &mut self,
        f: &mut dyn FnMut(usize, ArrayViewMut2<f64>) -> Result<()>,
    ) -> Result<()>;

    /// Frees the memory or removes the scratch files. The storage is empty afterwards.
    fn release(&mut self) -> Result<()>;
}

/// The whole tensor in one array.
pub struct CoreStorage {
    data: Array2<f64>,
}

impl CoreStorage {
    pub fn zeros(nrows: usize, ncols: usize) -> Self {
        Self {
            data: Array2::zeros([nrows, ncols]),
        }
    }
}

impl FittingStorage for CoreStorage {
    fn kind(&self) -> StorageKind {
        StorageKind::Core
    }

    fn nrows(&self) -> usize {
        self.data.nrows()
    }

    fn ncols(&self) -> usize {
        self.data.ncols()
    }

    fn for_each_block(
        &self,
        f: &mut dyn FnMut(usize, ArrayView2<f64>) -> Result<()>,
    ) -> Result<()> {
        if self.data.nrows() > 0 {
            f(0, self.data.view())?;
        }
        Ok(())
    }

    fn for_each_block_mut(
        &mut self,
        f: &mut dyn FnMut(usize, ArrayViewMut2<f64>) -> Result<()>,
    ) -> Result<()> {
        if self.data.nrows() > 0 {
            f(0, self.data.view_mut())?;
        }
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        self.data = Array2::zeros([0, 0]);
        Ok(())
    }
}

/// One block of rows of a [DiskStorage].
struct DiskBlock {
    start: usize,
    path: PathBuf,
}

/// The tensor as `.npy` files in a scratch directory, every file holds at most
/// `block_rows` rows.
pub struct DiskStorage {
    blocks: Vec<DiskBlock>,
    nrows: usize,
    ncols: usize,
}

impl DiskStorage {
    /// Creates the scratch files filled with zeros.
    pub fn zeros(
        directory: &Path,
        prefix: &str,
        nrows: usize,
        ncols: usize,
        block_rows: usize,
    ) -> Result<Self> {
        let block_rows: usize = block_rows.max(1);
        let id: usize = SCRATCH_COUNTER.fetch_add(1, Ordering::SeqCst);
        let mut storage = Self {
            blocks: Vec::new(),
            nrows,
            ncols,
        };
        for (idx, start) in (0..nrows).step_by(block_rows).enumerate() {
            let rows: usize = block_rows.min(nrows - start);
            let path: PathBuf = directory.join(format!(
                "{}_{}_{}_{}.npy",
                prefix,
                std::process::id(),
                id,
                idx
            ));
            let block: Array2<f64> = Array2::zeros([rows, ncols]);
            // the block is registered first, so that it is removed again if writing fails
            storage.blocks.push(DiskBlock {
                start,
                path: path.clone(),
            });
            write_npy(&path, &block)
                .with_context(|| format!("Could not write scratch file {}", path.display()))?;
        }
        debug!(
            "{: <25} {} files in {}",
            "fitting tensor on disk:",
            storage.blocks.len(),
            directory.display()
        );
        Ok(storage)
    }

    pub fn paths(&self) -> Vec<&Path> {
        self.blocks.iter().map(|block| block.path.as_path()).collect()
    }

    fn read_block(path: &Path) -> Result<Array2<f64>> {
        read_npy(path).with_context(|| format!("Could not read scratch file {}", path.display()))
    }
}

impl FittingStorage for DiskStorage {
    fn kind(&self) -> StorageKind {
        StorageKind::Disk
    }

    fn nrows(&self) -> usize {
        self.nrows
    }

    fn ncols(&self) -> usize {
        self.ncols
    }

    fn for_each_block(
        &self,
        f: &mut dyn FnMut(usize, ArrayView2<f64>) -> Result<()>,
    ) -> Result<()> {
        for block in self.blocks.iter() {
            let data: Array2<f64> = Self::read_block(&block.path)?;
            f(block.start, data.view())?;
        }
        Ok(())
    }

    fn for_each_block_mut(
        &mut self,
        f: &mut dyn FnMut(usize, ArrayViewMut2<f64>) -> Result<()>,
    ) -> Result<()> {
        for block in self.blocks.iter() {
            let mut data: Array2<f64> = Self::read_block(&block.path)?;
            f(block.start, data.view_mut())?;
            write_npy(&block.path, &data).with_context(|| {
                format!("Could not write scratch file {}", block.path.display())
            })?;
        }
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        for block in self.blocks.drain(..) {
            if block.path.exists() {
                fs::remove_file(&block.path).with_context(|| {
                    format!("Could not remove scratch file {}", block.path.display())
                })?;
            }
        }
        self.nrows = 0;
        Ok(())
    }
}

impl Drop for DiskStorage {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            warn!("{:?}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::SCRATCH_FILE_PREFIX;
    use approx::AbsDiffEq;

    fn fill(storage: &mut dyn FittingStorage) {
        storage
            .for_each_block_mut(&mut |start, mut block| {
                for ((row, col), value) in block.indexed_iter_mut() {
                    *value = ((start + row) * 10 + col) as f64;
                }
                Ok(())
            })
            .unwrap();
    }

    fn collect(storage: &dyn FittingStorage) -> Array2<f64> {
        let mut full: Array2<f64> = Array2::zeros([storage.nrows(), storage.ncols()]);
        storage
            .for_each_block(&mut |start, block| {
                full.slice_mut(s![start..start + block.nrows(), ..])
                    .assign(&block);
                Ok(())
            })
            .unwrap();
        full
    }

    #[test]
    fn disk_and_core_hold_the_same_data() {
        let mut core = CoreStorage::zeros(7, 4);
        let mut disk =
            DiskStorage::zeros(&std::env::temp_dir(), SCRATCH_FILE_PREFIX, 7, 4, 3).unwrap();
        assert_eq!(disk.paths().len(), 3);
        fill(&mut core);
        fill(&mut disk);
        let a = collect(&core);
        let b = collect(&disk);
        assert!(a.abs_diff_eq(&b, 1e-15));
        assert_eq!(a[[6, 3]], 63.0);
        assert_eq!(core.kind(), StorageKind::Core);
        assert_eq!(disk.kind(), StorageKind::Disk);
    }

    #[test]
    fn release_removes_scratch_files() {
        let mut disk =
            DiskStorage::zeros(&std::env::temp_dir(), SCRATCH_FILE_PREFIX, 5, 2, 2).unwrap();
        let paths: Vec<PathBuf> = disk.paths().iter().map(|p| p.to_path_buf()).collect();
        assert!(paths.iter().all(|p| p.exists()));
        disk.release().unwrap();
        assert!(paths.iter().all(|p| !p.exists()));
        assert_eq!(disk.nrows(), 0);
    }

    #[test]
    fn unwritable_directory() {
        let missing: PathBuf = std::env::temp_dir().join("dialect_jk_df_missing_dir/nested");
        assert!(DiskStorage::zeros(&missing, SCRATCH_FILE_PREFIX, 2, 2, 1).is_err());
    }
}
