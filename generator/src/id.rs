// id.rs — Arena identifiers for generator data structures
//
// Control-flow blocks, temporaries, IR nodes, functions, types and entities
// all live in index-addressed arenas. Each arena gets its own newtype so an
// index into one can never be used to address another. Indices are handed
// out in creation order, which keeps generation deterministic.

macro_rules! arena_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }

            pub fn from_index(index: usize) -> Self {
                $name(index as u32)
            }
        }
    };
}

arena_id!(
    /// A control-flow block in a function's topology graph.
    BlockId
);

arena_id!(
    /// A placeholder value slot awaiting resolution.
    TempId
);

arena_id!(
    /// A node in a function's IR operation graph.
    NodeId
);

arena_id!(
    /// A function of the generated program. `FuncId(0)` is the entry.
    FuncId
);

arena_id!(
    /// A type of the program-wide type universe.
    TypeId
);

arena_id!(
    /// A compound member (field) of the type universe.
    EntityId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_roundtrip() {
        assert_eq!(NodeId::from_index(17).index(), 17);
        assert_eq!(BlockId::from_index(0), BlockId(0));
    }

    #[test]
    fn ids_order_by_creation_index() {
        let mut ids = vec![TypeId(3), TypeId(1), TypeId(2)];
        ids.sort();
        assert_eq!(ids, vec![TypeId(1), TypeId(2), TypeId(3)]);
    }
}
