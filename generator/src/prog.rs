// prog.rs — Generated program: functions, their topologies and graphs
//
// `Prog::new` draws the type universe and every function signature from the
// random stream; the per-function phases then fill in each `Func`.

use crate::callgraph::CallGraph;
use crate::cfg::Cfg;
use crate::id::FuncId;
use crate::ir::{Graph, Signature};
use crate::rng::GenRng;
use crate::types::{Mode, TypeUniverse};

pub const ENTRY_NAME: &str = "_main";
const MAX_PARAMS: usize = 2;

#[derive(Debug, Clone)]
pub struct Func {
    pub id: FuncId,
    pub cfg: Cfg,
    pub graph: Graph,
    /// Call sites created in this function so far.
    pub n_calls: usize,
}

#[derive(Debug, Clone)]
pub struct Prog {
    pub seed: u64,
    pub types: TypeUniverse,
    pub signatures: Vec<Signature>,
    pub funcs: Vec<Func>,
    pub calls: CallGraph,
}

impl Prog {
    /// Types first, then signatures, in that order on the stream.
    pub fn new(seed: u64, n_funcs: usize, rng: &mut GenRng) -> Self {
        let types = TypeUniverse::generate(rng);
        let mut signatures = Vec::with_capacity(n_funcs);
        signatures.push(Signature {
            name: ENTRY_NAME.to_string(),
            params: vec![Mode::Is],
            results: vec![Mode::Is],
        });
        for i in 1..n_funcs {
            let n_params = rng.between(0, MAX_PARAMS);
            let params = (0..n_params).map(|_| types.random_primitive(rng)).collect();
            let results = vec![types.random_primitive(rng)];
            signatures.push(Signature {
                name: format!("r_func_{i}"),
                params,
                results,
            });
        }

        let funcs = signatures
            .iter()
            .enumerate()
            .map(|(i, sig)| Func {
                id: FuncId::from_index(i),
                cfg: Cfg::new(),
                graph: Graph::new(&sig.params),
                n_calls: 0,
            })
            .collect();

        Prog {
            seed,
            types,
            signatures,
            funcs,
            calls: CallGraph::new(n_funcs),
        }
    }

    pub fn entry(&self) -> &Func {
        &self.funcs[0]
    }

    pub fn name(&self, f: FuncId) -> &str {
        &self.signatures[f.index()].name
    }
}
