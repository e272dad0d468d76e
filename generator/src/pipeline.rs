// pipeline.rs — Program generation driver and artifact output
//
// Runs the phases in order on one random stream:
//   type universe and signatures → per function: grow → materialize →
//   resolve → link memory → mature end block → whole-program checks
// and writes the requested artifacts.
//
// Preconditions: none; the configuration is validated here.
// Postconditions: on success every graph verifies, every topology is well
// formed, and with cycles disabled the call graph is acyclic.
// Failure modes: bad configuration → `GenError::Config`; generator defects →
// `GenError::Invariant` / `GenError::Verify`; output files → `GenError::Io`.
// Side effects: `write_artifacts` creates files; phases emit `tracing` events.

use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;

use crate::config::GenConfig;
use crate::diag::{codes, GenError};
use crate::id::FuncId;
use crate::materialize::materialize;
use crate::memory::link_memory;
use crate::prog::Prog;
use crate::reader::ReadProgram;
use crate::resolve::{resolve_function, Decision, ResolveCtx};
use crate::rng::GenRng;
use crate::stats::{OpStats, ProgStats};

// ── Generated program ─────────────────────────────────────────────────────

/// A finished program plus everything observed while generating it.
#[derive(Debug, Clone)]
pub struct Generated {
    pub config: GenConfig,
    pub prog: Prog,
    pub stats: ProgStats,
    /// Every reuse and seed-store choice, with the dominance answer it relied on.
    pub decisions: Vec<Decision>,
    /// The serialized `.ir` text.
    pub ir: String,
}

/// Generate one program.
pub fn generate(config: &GenConfig) -> Result<Generated, GenError> {
    let config = config.clone().validate()?;
    let t = Instant::now();
    let mut rng = GenRng::new(config.seed);
    let mut prog = Prog::new(config.seed, config.n_funcs, &mut rng);
    let mut ops = OpStats::default();
    let mut decisions = Vec::new();

    for i in 0..prog.funcs.len() {
        let id = FuncId::from_index(i);
        let f = &mut prog.funcs[i];
        f.cfg.grow(config.cfg_size, &mut rng, config.loops);
        materialize(&mut f.cfg, &mut f.graph, &prog.signatures[i]);

        let mut ctx = ResolveCtx::new(&mut prog, id, &mut rng, &config, &mut ops, &mut decisions);
        resolve_function(&mut ctx)?;

        let f = &mut prog.funcs[i];
        link_memory(&mut f.cfg, &mut f.graph)?;
        let end = f.graph.end_block();
        f.graph.mature(end);
        tracing::debug!(
            func = %prog.signatures[i].name,
            blocks = f.cfg.len(),
            nodes = f.graph.len(),
            "function generated"
        );
    }

    check_program(&prog, &config)?;

    let stats = ProgStats::collect(&prog, ops);
    let ir = crate::emit::emit_program(&prog);
    tracing::info!(
        seed = config.seed,
        functions = prog.funcs.len(),
        call_edges = prog.calls.edge_count(),
        elapsed_us = t.elapsed().as_micros() as u64,
        "program generated"
    );
    Ok(Generated {
        config,
        prog,
        stats,
        decisions,
        ir,
    })
}

/// Whole-program checks run after every function is finished.
fn check_program(prog: &Prog, config: &GenConfig) -> Result<(), GenError> {
    for f in &prog.funcs {
        let name = prog.name(f.id);
        f.cfg.check_well_formed().map_err(|msg| {
            GenError::invariant(codes::I0005, format!("topology of '{name}': {msg}"))
        })?;
        f.graph
            .verify(&prog.signatures, f.id)
            .map_err(|source| GenError::Verify {
                function: name.to_string(),
                source,
            })?;
    }
    if !config.func_cycles && prog.calls.has_cycle() {
        return Err(GenError::invariant(
            codes::I0004,
            "call graph has a cycle although cycles are disabled",
        ));
    }
    Ok(())
}

// ── Provenance ────────────────────────────────────────────────────────────

/// Build metadata for `--emit build-info`.
///
/// `ir_hash`: SHA-256 of the serialized `.ir` text.
/// `generator_version`: crate version from `Cargo.toml`.
#[derive(Debug, Clone)]
pub struct Provenance {
    pub config: GenConfig,
    pub ir_hash: [u8; 32],
    pub generator_version: &'static str,
}

#[derive(Serialize)]
struct BuildInfo<'a> {
    generator_version: &'a str,
    format_version: u32,
    ir_sha256: String,
    config: &'a GenConfig,
}

impl Provenance {
    /// Hex string of the IR hash (64 characters).
    pub fn ir_hash_hex(&self) -> String {
        bytes_to_hex(&self.ir_hash)
    }

    pub fn to_json(&self) -> String {
        let info = BuildInfo {
            generator_version: self.generator_version,
            format_version: crate::emit::FORMAT_VERSION,
            ir_sha256: self.ir_hash_hex(),
            config: &self.config,
        };
        serde_json::to_string_pretty(&info).unwrap_or_default() + "\n"
    }
}

fn bytes_to_hex(bytes: &[u8; 32]) -> String {
    let mut s = String::with_capacity(64);
    for b in bytes {
        use std::fmt::Write;
        let _ = write!(s, "{:02x}", b);
    }
    s
}

pub fn compute_provenance(generated: &Generated) -> Provenance {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(generated.ir.as_bytes());
    let result = hasher.finalize();
    let mut ir_hash = [0u8; 32];
    ir_hash.copy_from_slice(&result);

    Provenance {
        config: generated.config.clone(),
        ir_hash,
        generator_version: env!("CARGO_PKG_VERSION"),
    }
}

// ── Artifacts ─────────────────────────────────────────────────────────────

/// Artifacts selectable with `--emit`. The `.ir` file is always written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Artifact {
    Ir,
    CfgDot,
    IrDot,
    BuildInfo,
    Stats,
}

impl Artifact {
    fn extension(self) -> &'static str {
        match self {
            Artifact::Ir => "ir",
            Artifact::CfgDot => "cfg.dot",
            Artifact::IrDot => "ir.dot",
            Artifact::BuildInfo => "build-info.json",
            Artifact::Stats => "stats.json",
        }
    }

    fn render(self, generated: &Generated) -> String {
        match self {
            Artifact::Ir => generated.ir.clone(),
            Artifact::CfgDot => crate::dot::emit_cfg_dot(&generated.prog),
            Artifact::IrDot => crate::dot::emit_ir_dot(&generated.prog),
            Artifact::BuildInfo => compute_provenance(generated).to_json(),
            Artifact::Stats => generated.stats.to_json(),
        }
    }
}

/// Write `<strid>.ir` plus every requested artifact into `out_dir`.
///
/// Returns the written paths in the order written.
pub fn write_artifacts(
    generated: &Generated,
    emits: &[Artifact],
    out_dir: &Path,
) -> Result<Vec<PathBuf>, GenError> {
    std::fs::create_dir_all(out_dir).map_err(|source| GenError::Io {
        path: out_dir.to_path_buf(),
        source,
    })?;

    let mut kinds = vec![Artifact::Ir];
    for &e in emits {
        if !kinds.contains(&e) {
            kinds.push(e);
        }
    }

    let mut written = Vec::with_capacity(kinds.len());
    for kind in kinds {
        let path = out_dir.join(format!("{}.{}", generated.config.strid, kind.extension()));
        std::fs::write(&path, kind.render(generated)).map_err(|source| GenError::Io {
            path: path.clone(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "artifact written");
        written.push(path);
    }
    Ok(written)
}

/// Read an `.ir` file back and verify every function in it.
pub fn check_file(path: &Path) -> Result<ReadProgram, GenError> {
    let source = std::fs::read_to_string(path).map_err(|source| GenError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    crate::reader::check_source(&path.display().to_string(), &source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::ConfigError;
    use crate::ir::Op;

    fn config(seed: u64) -> GenConfig {
        GenConfig {
            n_funcs: 3,
            cfg_size: 6,
            ..GenConfig::with_seed(seed)
        }
    }

    #[test]
    fn generated_program_has_no_placeholders() {
        let g = generate(&config(11)).unwrap();
        for f in &g.prog.funcs {
            assert_eq!(f.graph.count_op(|op| *op == Op::Dummy), 0);
            assert!(f.graph.is_mature(f.graph.end_block()));
        }
    }

    #[test]
    fn same_seed_same_text() {
        let a = generate(&config(5)).unwrap();
        let b = generate(&config(5)).unwrap();
        assert_eq!(a.ir, b.ir);
        assert_eq!(a.stats, b.stats);
    }

    #[test]
    fn different_seeds_differ() {
        let a = generate(&config(5)).unwrap();
        let b = generate(&config(6)).unwrap();
        assert_ne!(a.ir, b.ir);
    }

    #[test]
    fn invalid_config_rejected() {
        let bad = GenConfig {
            n_funcs: 0,
            ..GenConfig::default()
        };
        let err = generate(&bad).unwrap_err();
        assert!(matches!(err, GenError::Config(ConfigError::NoFunctions)));
    }

    #[test]
    fn emitted_text_reads_back() {
        let g = generate(&config(21)).unwrap();
        let read = crate::reader::check_source("gen.ir", &g.ir).unwrap();
        assert_eq!(read.seed, 21);
        assert_eq!(read.graphs.len(), 3);
        assert_eq!(read.signatures, g.prog.signatures);
        for (r, f) in read.graphs.iter().zip(&g.prog.funcs) {
            assert_eq!(r.len(), f.graph.live_nodes().count());
        }
    }

    #[test]
    fn provenance_hash_is_stable() {
        let g = generate(&config(2)).unwrap();
        let p1 = compute_provenance(&g);
        let p2 = compute_provenance(&g);
        assert_eq!(p1.ir_hash, p2.ir_hash);
        assert_eq!(p1.ir_hash_hex().len(), 64);
        let json = p1.to_json();
        assert!(json.contains("\"ir_sha256\""));
        assert!(json.contains("\"seed\": 2"));
        assert!(json.contains(&format!("\"generator_version\": \"{}\"", env!("CARGO_PKG_VERSION"))));
    }

    #[test]
    fn artifacts_written_once_each() {
        let dir = std::env::temp_dir().join(format!("irsmith-artifacts-{}", std::process::id()));
        let g = generate(&GenConfig {
            strid: "unit".into(),
            ..config(8)
        })
        .unwrap();
        let written = write_artifacts(
            &g,
            &[Artifact::Stats, Artifact::Ir, Artifact::CfgDot, Artifact::Stats],
            &dir,
        )
        .unwrap();
        let names: Vec<String> = written
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["unit.ir", "unit.stats.json", "unit.cfg.dot"]);
        assert_eq!(std::fs::read_to_string(&written[0]).unwrap(), g.ir);
        check_file(&written[0]).unwrap();
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn check_missing_file_is_io_error() {
        let err = check_file(Path::new("/nonexistent/irsmith/x.ir")).unwrap_err();
        assert!(matches!(err, GenError::Io { .. }));
    }
}
