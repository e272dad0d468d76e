// types.rs — Program-wide type universe
//
// One primitive type per integer mode, a fixed catalogue of randomly shaped
// structs and unions, and pointer types interned on demand. Temporaries are
// typed by `ValueType`, which refers back into this universe for pointees.
//
// Preconditions: `TypeUniverse::generate` is the first consumer of the
// program's random stream.
// Postconditions: every compound has 3–7 members with consistent offsets
// and sizes; pointer types are unique per pointee.
// Failure modes: none.
// Side effects: none.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::id::{EntityId, TypeId};
use crate::rng::GenRng;

pub const N_COMPOUNDS: usize = 10;
const MIN_MEMBERS: usize = 3;
const MAX_MEMBERS: usize = 7;
pub const POINTER_SIZE: u32 = 8;

// ── Modes ────────────────────────────────────────────────────────────────

/// Machine mode of an IR value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Mode {
    Bs,
    Bu,
    Hs,
    Hu,
    Is,
    Iu,
    Ls,
    Lu,
    /// Boolean (comparison result). Not storable.
    B,
    /// Pointer.
    P,
    /// Memory state.
    M,
    /// Control flow.
    X,
    /// Tuple of results.
    T,
}

impl Mode {
    pub const INTEGERS: [Mode; 8] = [
        Mode::Bs,
        Mode::Bu,
        Mode::Hs,
        Mode::Hu,
        Mode::Is,
        Mode::Iu,
        Mode::Ls,
        Mode::Lu,
    ];

    pub fn is_int(self) -> bool {
        Mode::INTEGERS.contains(&self)
    }

    pub fn is_signed(self) -> bool {
        matches!(self, Mode::Bs | Mode::Hs | Mode::Is | Mode::Ls)
    }

    /// Width in bits of an integer mode, 64 for pointers.
    pub fn bits(self) -> u32 {
        match self {
            Mode::Bs | Mode::Bu => 8,
            Mode::Hs | Mode::Hu => 16,
            Mode::Is | Mode::Iu => 32,
            Mode::Ls | Mode::Lu | Mode::P => 64,
            Mode::B => 1,
            Mode::M | Mode::X | Mode::T => 0,
        }
    }

    /// Values of this mode can be written to memory.
    pub fn is_storable(self) -> bool {
        self.is_int() || self == Mode::P
    }

    /// Keep only the low `bits()` bits of a raw value.
    pub fn truncate(self, raw: u64) -> u64 {
        match self.bits() {
            64 => raw,
            0 => 0,
            n => raw & ((1u64 << n) - 1),
        }
    }

    /// Numeric value of a truncated bit pattern, sign-extended for signed modes.
    pub fn interpret(self, bits: u64) -> i128 {
        let width = self.bits();
        if self.is_signed() && width < 64 {
            let shift = 64 - width;
            (((bits << shift) as i64) >> shift) as i128
        } else if self.is_signed() {
            bits as i64 as i128
        } else {
            bits as i128
        }
    }

    /// Inverse of `interpret`: the bit pattern of a literal in this mode.
    pub fn encode(self, value: i128) -> u64 {
        self.truncate(value as u64)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Mode::Bs => "Bs",
            Mode::Bu => "Bu",
            Mode::Hs => "Hs",
            Mode::Hu => "Hu",
            Mode::Is => "Is",
            Mode::Iu => "Iu",
            Mode::Ls => "Ls",
            Mode::Lu => "Lu",
            Mode::B => "b",
            Mode::P => "P",
            Mode::M => "M",
            Mode::X => "X",
            Mode::T => "T",
        };
        f.write_str(s)
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "Bs" => Mode::Bs,
            "Bu" => Mode::Bu,
            "Hs" => Mode::Hs,
            "Hu" => Mode::Hu,
            "Is" => Mode::Is,
            "Iu" => Mode::Iu,
            "Ls" => Mode::Ls,
            "Lu" => Mode::Lu,
            "b" => Mode::B,
            "P" => Mode::P,
            "M" => Mode::M,
            "X" => Mode::X,
            "T" => Mode::T,
            other => return Err(format!("unknown mode '{other}'")),
        })
    }
}

// ── Value types ──────────────────────────────────────────────────────────

/// Semantic type of a temporary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// Branch condition.
    Bool,
    Prim(Mode),
    /// Pointer to the given type.
    Ptr(TypeId),
}

impl ValueType {
    pub fn mode(self) -> Mode {
        match self {
            ValueType::Bool => Mode::B,
            ValueType::Prim(m) => m,
            ValueType::Ptr(_) => Mode::P,
        }
    }

    pub fn is_pointer(self) -> bool {
        matches!(self, ValueType::Ptr(_))
    }

    pub fn is_storable(self) -> bool {
        !matches!(self, ValueType::Bool)
    }
}

// ── Type catalogue ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeKind {
    Primitive(Mode),
    Struct { name: String, members: Vec<EntityId> },
    Union { name: String, members: Vec<EntityId> },
    Pointer(TypeId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDef {
    pub kind: TypeKind,
    pub size: u32,
}

/// A member of a struct or union.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    pub name: String,
    pub owner: TypeId,
    pub ty: TypeId,
    pub offset: u32,
}

#[derive(Debug, Clone, Default)]
pub struct TypeUniverse {
    types: Vec<TypeDef>,
    entities: Vec<Entity>,
    pointers: HashMap<TypeId, TypeId>,
}

impl TypeUniverse {
    /// Build the primitive types and the random compound catalogue.
    pub fn generate(rng: &mut GenRng) -> Self {
        let mut universe = TypeUniverse::default();
        for mode in Mode::INTEGERS {
            universe.types.push(TypeDef {
                kind: TypeKind::Primitive(mode),
                size: mode.bits() / 8,
            });
        }

        let mut compounds: Vec<TypeId> = Vec::with_capacity(N_COMPOUNDS);
        for i in 0..N_COMPOUNDS {
            let id = TypeId::from_index(universe.types.len());
            let is_union = rng.coin();
            let n_members = rng.between(MIN_MEMBERS, MAX_MEMBERS);

            let mut members = Vec::with_capacity(n_members);
            let mut offset = 0u32;
            let mut size = 0u32;
            for m in 0..n_members {
                let ty = if !compounds.is_empty() && rng.chance(4) {
                    compounds[rng.below(compounds.len())]
                } else {
                    universe.primitive(universe.random_primitive(rng))
                };
                let member_size = universe.size_of(ty);
                let entity = EntityId::from_index(universe.entities.len());
                universe.entities.push(Entity {
                    name: format!("m{m}"),
                    owner: id,
                    ty,
                    offset: if is_union { 0 } else { offset },
                });
                members.push(entity);
                if is_union {
                    size = size.max(member_size);
                } else {
                    offset += member_size;
                    size = offset;
                }
            }

            let kind = if is_union {
                TypeKind::Union {
                    name: format!("union_{i}"),
                    members,
                }
            } else {
                TypeKind::Struct {
                    name: format!("struct_{i}"),
                    members,
                }
            };
            universe.types.push(TypeDef { kind, size });
            compounds.push(id);
        }
        universe
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn get(&self, id: TypeId) -> &TypeDef {
        &self.types[id.index()]
    }

    pub fn types(&self) -> impl Iterator<Item = (TypeId, &TypeDef)> {
        self.types
            .iter()
            .enumerate()
            .map(|(i, t)| (TypeId::from_index(i), t))
    }

    pub fn entity(&self, id: EntityId) -> &Entity {
        &self.entities[id.index()]
    }

    pub fn n_entities(&self) -> usize {
        self.entities.len()
    }

    pub fn random_primitive(&self, rng: &mut GenRng) -> Mode {
        Mode::INTEGERS[rng.below(Mode::INTEGERS.len())]
    }

    /// A random integer mode different from `mode`.
    pub fn random_primitive_except(&self, rng: &mut GenRng, mode: Mode) -> Mode {
        let others: Vec<Mode> = Mode::INTEGERS
            .iter()
            .copied()
            .filter(|&m| m != mode)
            .collect();
        others[rng.below(others.len())]
    }

    /// The primitive type of an integer mode.
    pub fn primitive(&self, mode: Mode) -> TypeId {
        let index = Mode::INTEGERS
            .iter()
            .position(|&m| m == mode)
            .unwrap_or_else(|| panic!("no primitive type for mode {mode}"));
        TypeId::from_index(index)
    }

    pub fn size_of(&self, ty: TypeId) -> u32 {
        self.get(ty).size
    }

    /// The pointer type to `ty`, created on first request.
    pub fn pointer_to(&mut self, ty: TypeId) -> TypeId {
        if let Some(&p) = self.pointers.get(&ty) {
            return p;
        }
        let p = TypeId::from_index(self.types.len());
        self.types.push(TypeDef {
            kind: TypeKind::Pointer(ty),
            size: POINTER_SIZE,
        });
        self.pointers.insert(ty, p);
        p
    }

    /// First member of any compound whose type is `ty`.
    pub fn associated_entity(&self, ty: TypeId) -> Option<EntityId> {
        self.entities
            .iter()
            .position(|e| e.ty == ty)
            .map(EntityId::from_index)
    }

    /// Pointee type used when a value of `ty` is written to memory.
    pub fn storage_pointee(&mut self, ty: ValueType) -> Option<TypeId> {
        match ty {
            ValueType::Bool => None,
            ValueType::Prim(m) => Some(self.primitive(m)),
            ValueType::Ptr(p) => Some(self.pointer_to(p)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn universe(seed: u64) -> TypeUniverse {
        TypeUniverse::generate(&mut GenRng::new(seed))
    }

    #[test]
    fn primitives_come_first() {
        let u = universe(1);
        for (i, mode) in Mode::INTEGERS.iter().enumerate() {
            assert_eq!(u.get(TypeId(i as u32)).kind, TypeKind::Primitive(*mode));
            assert_eq!(u.primitive(*mode), TypeId(i as u32));
        }
        assert_eq!(u.size_of(u.primitive(Mode::Hs)), 2);
        assert_eq!(u.size_of(u.primitive(Mode::Lu)), 8);
    }

    #[test]
    fn compound_catalogue_shape() {
        let u = universe(7);
        assert_eq!(u.len(), Mode::INTEGERS.len() + N_COMPOUNDS);
        for (id, def) in u.types().skip(Mode::INTEGERS.len()) {
            let (members, is_union) = match &def.kind {
                TypeKind::Struct { members, .. } => (members, false),
                TypeKind::Union { members, .. } => (members, true),
                other => panic!("unexpected kind {other:?}"),
            };
            assert!((MIN_MEMBERS..=MAX_MEMBERS).contains(&members.len()));
            let sizes: Vec<u32> = members
                .iter()
                .map(|&e| u.size_of(u.entity(e).ty))
                .collect();
            for &e in members {
                assert_eq!(u.entity(e).owner, id);
                assert_ne!(u.entity(e).ty, id, "compound contains itself");
            }
            if is_union {
                assert_eq!(def.size, *sizes.iter().max().unwrap());
                assert!(members.iter().all(|&e| u.entity(e).offset == 0));
            } else {
                assert_eq!(def.size, sizes.iter().sum::<u32>());
            }
        }
    }

    #[test]
    fn pointers_are_interned() {
        let mut u = universe(3);
        let is = u.primitive(Mode::Is);
        let p1 = u.pointer_to(is);
        let p2 = u.pointer_to(is);
        assert_eq!(p1, p2);
        assert_eq!(u.get(p1).kind, TypeKind::Pointer(is));
        assert_eq!(u.size_of(p1), POINTER_SIZE);
        let pp = u.pointer_to(p1);
        assert_ne!(pp, p1);
    }

    #[test]
    fn random_primitive_except_differs() {
        let u = universe(5);
        let mut rng = GenRng::new(5);
        for _ in 0..100 {
            assert_ne!(u.random_primitive_except(&mut rng, Mode::Is), Mode::Is);
        }
    }

    #[test]
    fn associated_entity_matches_type() {
        let u = universe(11);
        for i in 0..u.n_entities() {
            let e = u.entity(EntityId(i as u32));
            let found = u.associated_entity(e.ty).unwrap();
            assert_eq!(u.entity(found).ty, e.ty);
            assert!(found.index() <= i);
        }
    }

    #[test]
    fn mode_literals() {
        assert_eq!(Mode::Bs.truncate(0x1ff), 0xff);
        assert_eq!(Mode::Bs.interpret(0xff), -1);
        assert_eq!(Mode::Bu.interpret(0xff), 255);
        assert_eq!(Mode::Is.encode(-2), 0xffff_fffe);
        assert_eq!(Mode::Ls.interpret(u64::MAX), -1);
        assert_eq!("Hu".parse::<Mode>(), Ok(Mode::Hu));
        assert_eq!(Mode::B.to_string(), "b");
        assert!("Q".parse::<Mode>().is_err());
    }
}
