// config.rs — Generation parameters
//
// Every knob that shapes a generated program. The binary fills this from the
// command line; tests and benchmarks construct it directly.
//
// Preconditions: none.
// Postconditions: `validate()` returns a config safe to hand to `pipeline::generate`.
// Failure modes: zero functions or zero block size → `ConfigError`.
// Side effects: `validate()` logs a warning when the block count is clamped.

use serde::Serialize;

use crate::diag::ConfigError;

/// Hard ceiling on growth steps (and therefore blocks) per function.
pub const MAX_CF_BLOCKS: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenConfig {
    pub seed: u64,
    /// Output identifier; artifacts are named `<strid>.ir`, `<strid>.cfg.dot`, ...
    pub strid: String,
    pub n_funcs: usize,
    /// Maximum number of call sites per function.
    pub max_calls: usize,
    /// Growth steps applied to each function's topology.
    pub cfg_size: usize,
    /// Target node count per block; drives the size-adaptive strategy weights.
    pub cfb_size: usize,
    pub stats: bool,
    pub func_cycles: bool,
    pub func_calls: bool,
    pub loops: bool,
    pub memory: bool,
}

impl Default for GenConfig {
    fn default() -> Self {
        GenConfig {
            seed: 0,
            strid: "main".to_string(),
            n_funcs: 1,
            max_calls: 2,
            cfg_size: 5,
            cfb_size: 10,
            stats: false,
            func_cycles: true,
            func_calls: true,
            loops: true,
            memory: true,
        }
    }
}

impl GenConfig {
    pub fn with_seed(seed: u64) -> Self {
        GenConfig {
            seed,
            ..GenConfig::default()
        }
    }

    /// Check numeric arguments and clamp the block count to `MAX_CF_BLOCKS`.
    pub fn validate(mut self) -> Result<GenConfig, ConfigError> {
        if self.n_funcs == 0 {
            return Err(ConfigError::NoFunctions);
        }
        if self.cfb_size == 0 {
            return Err(ConfigError::ZeroBlockSize);
        }
        if self.strid.is_empty() || self.strid.contains(|c| c == '/' || c == '\\') {
            return Err(ConfigError::BadStrid(self.strid));
        }
        if self.cfg_size > MAX_CF_BLOCKS {
            tracing::warn!(
                requested = self.cfg_size,
                limit = MAX_CF_BLOCKS,
                "cfg size exceeds block ceiling, clamping"
            );
            self.cfg_size = MAX_CF_BLOCKS;
        }
        Ok(self)
    }
}

/// Rewrite GCC-style feature toggles into long flags.
///
/// `-fstats` becomes `--stats` and `-fno-loops` becomes `--no-loops`; every
/// other argument passes through untouched.
pub fn normalize_feature_flags<I>(args: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    args.into_iter()
        .map(|arg| match arg.strip_prefix("-f") {
            Some(rest) if !rest.is_empty() && !rest.starts_with('-') => format!("--{rest}"),
            _ => arg,
        })
        .collect()
}
