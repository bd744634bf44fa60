//! Type registry: interned, immutable type descriptions.
//!
//! Every `Type` is interned once per registry; two structurally equal
//! descriptions yield the same `TypeId`, so type identity is handle
//! equality. A changed shape (an atomic-wrapped variant, a forked struct)
//! is always a new interned type; nothing is mutated after interning.

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::fmt;
use std::ops::Index;

use serde::{Deserialize, Serialize};

/// Handle to an interned type. Only meaningful for the registry that issued it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(u32);

impl TypeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

// ─── Type descriptions ────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressSpace {
    Function,
    Private,
    Workgroup,
    Uniform,
    Storage,
    Handle,
}

impl AddressSpace {
    pub fn name(self) -> &'static str {
        match self {
            AddressSpace::Function => "function",
            AddressSpace::Private => "private",
            AddressSpace::Workgroup => "workgroup",
            AddressSpace::Uniform => "uniform",
            AddressSpace::Storage => "storage",
            AddressSpace::Handle => "handle",
        }
    }

    /// The access mode a variable in this space gets when none is written.
    pub fn default_access(self) -> Access {
        match self {
            AddressSpace::Uniform | AddressSpace::Handle | AddressSpace::Storage => Access::Read,
            _ => Access::ReadWrite,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Access {
    Read,
    Write,
    ReadWrite,
}

impl Access {
    pub fn name(self) -> &'static str {
        match self {
            Access::Read => "read",
            Access::Write => "write",
            Access::ReadWrite => "read_write",
        }
    }

    pub fn can_read(self) -> bool {
        matches!(self, Access::Read | Access::ReadWrite)
    }

    pub fn can_write(self) -> bool {
        matches!(self, Access::Write | Access::ReadWrite)
    }
}

/// Element count of an array type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ArrayCount {
    /// Count known at shader-creation time.
    Constant(u32),
    /// Count given by a pipeline-overridable constant; unknown until pipeline creation.
    Override(String),
    /// Runtime-sized array (last member of a storage buffer).
    Runtime,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StructMember {
    pub name: String,
    pub ty: TypeId,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StructType {
    pub name: String,
    pub members: Vec<StructMember>,
}

impl StructType {
    pub fn member_index(&self, name: &str) -> Option<usize> {
        self.members.iter().position(|m| m.name == name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    Void,
    Bool,
    I32,
    U32,
    F32,
    F16,
    Vector {
        elem: TypeId,
        width: u32,
    },
    Matrix {
        columns: u32,
        rows: u32,
        elem: TypeId,
    },
    Pointer {
        space: AddressSpace,
        access: Access,
        store: TypeId,
    },
    Atomic {
        inner: TypeId,
    },
    Array {
        elem: TypeId,
        count: ArrayCount,
    },
    Struct(StructType),
}

// ─── Registry ─────────────────────────────────────────────────────

/// Interning table of types. Grows for the lifetime of its owner; no removal.
#[derive(Clone, Debug, Default)]
pub struct TypeRegistry {
    types: Vec<Type>,
    lookup: HashMap<Type, TypeId>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `ty`, returning the existing handle if an equal type exists.
    pub fn get(&mut self, ty: Type) -> TypeId {
        if let Some(id) = self.lookup.get(&ty) {
            return *id;
        }
        let id = TypeId(self.types.len() as u32);
        self.types.push(ty.clone());
        self.lookup.insert(ty, id);
        id
    }

    /// Find an already-interned type without interning it.
    pub fn find(&self, ty: &Type) -> Option<TypeId> {
        self.lookup.get(ty).copied()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// All interned types in interning order. Members are always interned
    /// before the aggregates that contain them.
    pub fn iter(&self) -> impl Iterator<Item = (TypeId, &Type)> {
        self.types
            .iter()
            .enumerate()
            .map(|(i, t)| (TypeId(i as u32), t))
    }

    // ── Constructors ──

    pub fn void(&mut self) -> TypeId {
        self.get(Type::Void)
    }

    pub fn bool(&mut self) -> TypeId {
        self.get(Type::Bool)
    }

    pub fn i32(&mut self) -> TypeId {
        self.get(Type::I32)
    }

    pub fn u32(&mut self) -> TypeId {
        self.get(Type::U32)
    }

    pub fn f32(&mut self) -> TypeId {
        self.get(Type::F32)
    }

    pub fn f16(&mut self) -> TypeId {
        self.get(Type::F16)
    }

    pub fn vec(&mut self, elem: TypeId, width: u32) -> TypeId {
        self.get(Type::Vector { elem, width })
    }

    pub fn mat(&mut self, columns: u32, rows: u32, elem: TypeId) -> TypeId {
        self.get(Type::Matrix {
            columns,
            rows,
            elem,
        })
    }

    pub fn pointer(&mut self, space: AddressSpace, store: TypeId, access: Access) -> TypeId {
        self.get(Type::Pointer {
            space,
            access,
            store,
        })
    }

    pub fn atomic(&mut self, inner: TypeId) -> TypeId {
        self.get(Type::Atomic { inner })
    }

    pub fn array(&mut self, elem: TypeId, count: ArrayCount) -> TypeId {
        self.get(Type::Array { elem, count })
    }

    pub fn structure(&mut self, name: impl Into<String>, members: Vec<(String, TypeId)>) -> TypeId {
        let members = members
            .into_iter()
            .map(|(name, ty)| StructMember { name, ty })
            .collect();
        self.get(Type::Struct(StructType {
            name: name.into(),
            members,
        }))
    }

    /// Same shape as `ty` but with boolean elements: the result type of a comparison.
    pub fn bool_like(&mut self, ty: TypeId) -> TypeId {
        match self[ty] {
            Type::Vector { width, .. } => {
                let b = self.bool();
                self.vec(b, width)
            }
            _ => self.bool(),
        }
    }

    // ── Queries ──

    pub fn as_struct(&self, ty: TypeId) -> Option<&StructType> {
        match &self[ty] {
            Type::Struct(s) => Some(s),
            _ => None,
        }
    }

    /// Scalar element of a scalar or vector; `None` for anything else.
    pub fn scalar_of(&self, ty: TypeId) -> Option<TypeId> {
        match self[ty] {
            Type::Bool | Type::I32 | Type::U32 | Type::F32 | Type::F16 => Some(ty),
            Type::Vector { elem, .. } => Some(elem),
            _ => None,
        }
    }

    pub fn is_integer_scalar(&self, ty: TypeId) -> bool {
        matches!(self[ty], Type::I32 | Type::U32)
    }

    pub fn is_integer_scalar_or_vector(&self, ty: TypeId) -> bool {
        self.scalar_of(ty)
            .is_some_and(|s| self.is_integer_scalar(s))
    }

    pub fn is_float_scalar_or_vector(&self, ty: TypeId) -> bool {
        self.scalar_of(ty)
            .is_some_and(|s| matches!(self[s], Type::F32 | Type::F16))
    }

    pub fn is_bool_scalar_or_vector(&self, ty: TypeId) -> bool {
        self.scalar_of(ty).is_some_and(|s| self[s] == Type::Bool)
    }

    /// Scalars, vectors and matrices of numbers support arithmetic.
    pub fn is_numeric(&self, ty: TypeId) -> bool {
        match self[ty] {
            Type::Matrix { .. } => true,
            _ => self.is_integer_scalar_or_vector(ty) || self.is_float_scalar_or_vector(ty),
        }
    }

    /// Types that support `<`, `>`, `<=` and `>=`.
    pub fn is_ordered(&self, ty: TypeId) -> bool {
        self.is_integer_scalar_or_vector(ty) || self.is_float_scalar_or_vector(ty)
    }

    /// Types that support `==` and `!=`.
    pub fn is_equality_comparable(&self, ty: TypeId) -> bool {
        self.scalar_of(ty).is_some()
    }

    /// The type a pointer points at.
    pub fn store_type(&self, ty: TypeId) -> Option<TypeId> {
        match self[ty] {
            Type::Pointer { store, .. } => Some(store),
            _ => None,
        }
    }

    /// The element produced by indexing into `ty`.
    pub fn element_of(&mut self, ty: TypeId) -> Option<TypeId> {
        match self[ty] {
            Type::Vector { elem, .. } => Some(elem),
            Type::Array { elem, .. } => Some(elem),
            Type::Matrix { rows, elem, .. } => Some(self.vec(elem, rows)),
            _ => None,
        }
    }

    /// Unwrap an atomic to its value type.
    pub fn unwrap_atomic(&self, ty: TypeId) -> TypeId {
        match self[ty] {
            Type::Atomic { inner } => inner,
            _ => ty,
        }
    }

    pub fn bit_width(&self, ty: TypeId) -> Option<u32> {
        match self[self.scalar_of(ty)?] {
            Type::I32 | Type::U32 | Type::F32 => Some(32),
            Type::F16 => Some(16),
            _ => None,
        }
    }

    /// WGSL spelling of a type, used by the WGSL writers and in diagnostics.
    pub fn friendly_name(&self, ty: TypeId) -> String {
        FriendlyName { types: self, ty }.to_string()
    }
}

impl Index<TypeId> for TypeRegistry {
    type Output = Type;

    fn index(&self, id: TypeId) -> &Type {
        &self.types[id.index()]
    }
}

struct FriendlyName<'a> {
    types: &'a TypeRegistry,
    ty: TypeId,
}

impl fmt::Display for FriendlyName<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = |ty| FriendlyName {
            types: self.types,
            ty,
        };
        match &self.types[self.ty] {
            Type::Void => f.write_str("void"),
            Type::Bool => f.write_str("bool"),
            Type::I32 => f.write_str("i32"),
            Type::U32 => f.write_str("u32"),
            Type::F32 => f.write_str("f32"),
            Type::F16 => f.write_str("f16"),
            Type::Vector { elem, width } => write!(f, "vec{}<{}>", width, name(*elem)),
            Type::Matrix {
                columns,
                rows,
                elem,
            } => write!(f, "mat{}x{}<{}>", columns, rows, name(*elem)),
            Type::Pointer {
                space,
                access,
                store,
            } => write!(f, "ptr<{}, {}, {}>", space.name(), name(*store), access.name()),
            Type::Atomic { inner } => write!(f, "atomic<{}>", name(*inner)),
            Type::Array { elem, count } => match count {
                ArrayCount::Constant(n) => write!(f, "array<{}, {}>", name(*elem), n),
                ArrayCount::Override(o) => write!(f, "array<{}, {}>", name(*elem), o),
                ArrayCount::Runtime => write!(f, "array<{}>", name(*elem)),
            },
            Type::Struct(s) => f.write_str(&s.name),
        }
    }
}
