use crate::defaults::*;
use crate::jk::JKError;
use anyhow::{Context, Result};
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

fn default_doubles() -> usize {
    DOUBLES
}
fn default_compute_j() -> bool {
    COMPUTE_J
}
fn default_compute_k() -> bool {
    COMPUTE_K
}
fn default_a() -> f64 {
    EXCHANGE_SCALE_FULL
}
fn default_b() -> f64 {
    EXCHANGE_SCALE_LONG_RANGE
}
fn default_w() -> f64 {
    RANGE_SEPARATION_OMEGA
}
fn default_product_cutoff() -> f64 {
    PRODUCT_CUTOFF
}
fn default_metric_condition() -> f64 {
    METRIC_CONDITION
}
fn default_force_disk() -> bool {
    FORCE_DISK
}
fn default_scratch_dir() -> PathBuf {
    std::env::temp_dir()
}
fn default_verbose() -> i8 {
    0
}
fn default_scf_max_cycles() -> usize {
    MAX_ITER
}
fn default_scf_energy_conv() -> f64 {
    SCF_ENERGY_CONV
}

/// Settings shared by all JK builds.
///
/// The exchange matrix is K = a K(1/r) + b K(erf(w r)/r).
#[derive(Serialize, Deserialize, Builder, Clone, Debug, PartialEq)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct JKConfig {
    /// Memory budget in number of f64 elements.
    #[serde(default = "default_doubles")]
    #[builder(default = "DOUBLES")]
    pub doubles: usize,
    #[serde(default = "default_compute_j")]
    #[builder(default = "COMPUTE_J")]
    pub compute_j: bool,
    #[serde(default = "default_compute_k")]
    #[builder(default = "COMPUTE_K")]
    pub compute_k: bool,
    #[serde(default = "default_a")]
    #[builder(default = "EXCHANGE_SCALE_FULL")]
    pub a: f64,
    #[serde(default = "default_b")]
    #[builder(default = "EXCHANGE_SCALE_LONG_RANGE")]
    pub b: f64,
    #[serde(default = "default_w")]
    #[builder(default = "RANGE_SEPARATION_OMEGA")]
    pub w: f64,
    /// Shell quartets with bound(P,Q) * bound(R,S) below this value are neglected.
    #[serde(default = "default_product_cutoff")]
    #[builder(default = "PRODUCT_CUTOFF")]
    pub product_cutoff: f64,
}

impl JKConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(doubles) = self.doubles {
            check_doubles(doubles).map_err(|err| err.to_string())?;
        }
        if let Some(cutoff) = self.product_cutoff {
            check_product_cutoff(cutoff).map_err(|err| err.to_string())?;
        }
        if let Some(w) = self.w {
            check_omega(w).map_err(|err| err.to_string())?;
        }
        Ok(())
    }
}

pub(crate) fn check_doubles(doubles: usize) -> Result<(), JKError> {
    if doubles == 0 {
        return Err(JKError::Config(String::from(
            "the memory budget (doubles) has to be positive",
        )));
    }
    Ok(())
}

pub(crate) fn check_product_cutoff(cutoff: f64) -> Result<(), JKError> {
    if !(cutoff >= 0.0) {
        return Err(JKError::Config(format!(
            "the product cutoff has to be non-negative, got {}",
            cutoff
        )));
    }
    Ok(())
}

pub(crate) fn check_omega(w: f64) -> Result<(), JKError> {
    if !(w >= 0.0) {
        return Err(JKError::Config(format!(
            "the range separation parameter has to be non-negative, got {}",
            w
        )));
    }
    Ok(())
}

pub(crate) fn check_metric_condition(condition: f64) -> Result<(), JKError> {
    if !(0.0..1.0).contains(&condition) {
        return Err(JKError::Config(format!(
            "the metric condition has to be in [0, 1), got {}",
            condition
        )));
    }
    Ok(())
}

impl JKConfig {
    /// Checks all settings that have a restricted range.
    pub fn validate(&self) -> Result<(), JKError> {
        check_doubles(self.doubles)?;
        check_product_cutoff(self.product_cutoff)?;
        check_omega(self.w)
    }

    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config: Self = toml::from_str(input).context("Could not parse the JK settings")?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for JKConfig {
    fn default() -> Self {
        Self {
            doubles: DOUBLES,
            compute_j: COMPUTE_J,
            compute_k: COMPUTE_K,
            a: EXCHANGE_SCALE_FULL,
            b: EXCHANGE_SCALE_LONG_RANGE,
            w: RANGE_SEPARATION_OMEGA,
            product_cutoff: PRODUCT_CUTOFF,
        }
    }
}

/// Settings specific to the density fitted JK build.
#[derive(Serialize, Deserialize, Builder, Clone, Debug, PartialEq)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct DFConfig {
    /// Eigenvalues of the auxiliary metric below `metric_condition` times the largest
    /// eigenvalue are discarded.
    #[serde(default = "default_metric_condition")]
    #[builder(default = "METRIC_CONDITION")]
    pub metric_condition: f64,
    /// Store the fitting tensor on disk even if it fits into the memory budget.
    #[serde(default = "default_force_disk")]
    #[builder(default = "FORCE_DISK")]
    pub force_disk: bool,
    /// Directory of the scratch files of a disk based fitting tensor.
    #[serde(default = "default_scratch_dir")]
    #[builder(default = "std::env::temp_dir()")]
    pub scratch_dir: PathBuf,
}

impl DFConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(condition) = self.metric_condition {
            check_metric_condition(condition).map_err(|err| err.to_string())?;
        }
        Ok(())
    }
}

impl DFConfig {
    pub fn validate(&self) -> Result<(), JKError> {
        check_metric_condition(self.metric_condition)
    }
}

impl Default for DFConfig {
    fn default() -> Self {
        Self {
            metric_condition: METRIC_CONDITION,
            force_disk: FORCE_DISK,
            scratch_dir: default_scratch_dir(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct ScfConfig {
    #[serde(default = "default_scf_max_cycles")]
    pub scf_max_cycles: usize,
    #[serde(default = "default_scf_energy_conv")]
    pub scf_energy_conv: f64,
}

impl Default for ScfConfig {
    fn default() -> Self {
        Self {
            scf_max_cycles: MAX_ITER,
            scf_energy_conv: SCF_ENERGY_CONV,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Configuration {
    #[serde(default = "default_verbose")]
    pub verbose: i8,
    #[serde(default)]
    pub jk: JKConfig,
    #[serde(default)]
    pub df: DFConfig,
    #[serde(default)]
    pub scf: ScfConfig,
}

impl Configuration {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config: Self = toml::from_str(input).context("Could not parse the configuration")?;
        config.jk.validate()?;
        config.df.validate()?;
        Ok(config)
    }
}

/// Reads the configuration file at `path`. If the file does not exist, the default settings
/// are used and written to `path`, so that all the used options can be seen.
pub fn read_config(path: &Path) -> Result<Configuration> {
    if path.exists() {
        let config_string: String = fs::read_to_string(path)
            .with_context(|| format!("Unable to read config file {}", path.display()))?;
        Configuration::from_toml_str(&config_string)
    } else {
        let config: Configuration = Configuration::default();
        let config_string: String =
            toml::to_string(&config).context("Could not serialize the configuration")?;
        fs::write(path, config_string)
            .with_context(|| format!("Unable to write config file {}", path.display()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_gives_defaults() {
        let config = Configuration::from_toml_str("").unwrap();
        assert_eq!(config.jk, JKConfig::default());
        assert_eq!(config.jk.doubles, 256_000_000);
        assert!(config.jk.compute_j && config.jk.compute_k);
        assert_eq!(config.jk.a, 1.0);
        assert_eq!(config.jk.b, 0.0);
        assert_eq!(config.df.metric_condition, 1.0e-12);
        assert!(!config.df.force_disk);
        assert_eq!(config.df.scratch_dir, std::env::temp_dir());
    }

    #[test]
    fn partial_input() {
        let input: &str = "verbose = 1\n[jk]\nb = 0.5\nw = 0.3\nproduct_cutoff = 1e-12\n\n[df]\nforce_disk = true\n";
        let config = Configuration::from_toml_str(input).unwrap();
        assert_eq!(config.verbose, 1);
        assert_eq!(config.jk.b, 0.5);
        assert_eq!(config.jk.w, 0.3);
        assert_eq!(config.jk.product_cutoff, 1.0e-12);
        assert_eq!(config.jk.a, 1.0);
        assert!(config.df.force_disk);
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let err = JKConfig::from_toml_str("doubles = 0").unwrap_err();
        assert!(matches!(err.downcast_ref::<JKError>(), Some(JKError::Config(_))));
        assert!(JKConfig::from_toml_str("product_cutoff = -1.0").is_err());
        assert!(JKConfigBuilder::default().w(-0.1).build().is_err());
        assert!(DFConfigBuilder::default().metric_condition(1.5).build().is_err());
        assert!(Configuration::from_toml_str("[df]\nmetric_condition = -1e-10").is_err());
        let config = JKConfigBuilder::default()
            .compute_k(false)
            .doubles(1000)
            .build()
            .unwrap();
        assert_eq!(config.doubles, 1000);
        assert!(!config.compute_k);
        assert_eq!(config.product_cutoff, 0.0);
    }

    #[test]
    fn config_file_is_written_and_read() {
        let path: PathBuf = std::env::temp_dir().join(format!(
            "{}_{}_{}",
            SCRATCH_FILE_PREFIX,
            std::process::id(),
            CONFIG_FILE_NAME
        ));
        let _ = fs::remove_file(&path);
        let written = read_config(&path).unwrap();
        assert!(path.exists());
        let read = read_config(&path).unwrap();
        assert_eq!(written, read);
        fs::remove_file(&path).unwrap();
    }
}
