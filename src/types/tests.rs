use super::*;

#[test]
fn test_interning_is_structural() {
    let mut types = TypeRegistry::new();
    let a = types.i32();
    let b = types.get(Type::I32);
    assert_eq!(a, b);

    let v1 = types.vec(a, 4);
    let v2 = types.vec(b, 4);
    assert_eq!(v1, v2);
    assert_ne!(v1, types.vec(a, 3));
}

#[test]
fn test_atomic_wrap_is_new_type() {
    let mut types = TypeRegistry::new();
    let i = types.i32();
    let atomic = types.atomic(i);
    assert_ne!(i, atomic);
    assert_eq!(types.atomic(i), atomic);
    assert_eq!(types.unwrap_atomic(atomic), i);
    assert_eq!(types.unwrap_atomic(i), i);
}

#[test]
fn test_struct_identity_includes_members() {
    let mut types = TypeRegistry::new();
    let i = types.i32();
    let u = types.u32();
    let s1 = types.structure("S", vec![("a".into(), i), ("b".into(), u)]);
    let s2 = types.structure("S", vec![("a".into(), i), ("b".into(), u)]);
    assert_eq!(s1, s2);

    let atomic_i = types.atomic(i);
    let fork = types.structure("S_atomic", vec![("a".into(), atomic_i), ("b".into(), u)]);
    assert_ne!(s1, fork);
    // The original is untouched by creating the fork.
    let original = types.as_struct(s1).unwrap();
    assert_eq!(original.members[0].ty, i);
    assert_eq!(original.member_index("b"), Some(1));
}

#[test]
fn test_registry_only_grows() {
    let mut types = TypeRegistry::new();
    assert!(types.is_empty());
    let i = types.i32();
    types.i32();
    assert_eq!(types.len(), 1);
    types.vec(i, 2);
    assert_eq!(types.len(), 2);
    assert_eq!(types.find(&Type::I32), Some(i));
    assert_eq!(types.find(&Type::F16), None);
}

#[test]
fn test_predicates() {
    let mut types = TypeRegistry::new();
    let i = types.i32();
    let f = types.f32();
    let b = types.bool();
    let vf = types.vec(f, 3);
    let vb = types.vec(b, 2);
    let m = types.mat(4, 4, f);

    assert!(types.is_integer_scalar_or_vector(i));
    assert!(!types.is_integer_scalar_or_vector(vf));
    assert!(types.is_float_scalar_or_vector(vf));
    assert!(types.is_bool_scalar_or_vector(vb));
    assert!(types.is_numeric(m));
    assert!(!types.is_ordered(m));
    assert!(!types.is_ordered(b));
    assert!(types.is_equality_comparable(b));
    assert_eq!(types.bit_width(i), Some(32));
}

#[test]
fn test_bool_like_and_element_of() {
    let mut types = TypeRegistry::new();
    let f = types.f32();
    let v = types.vec(f, 4);
    let bv = types.bool_like(v);
    let b = types.bool();
    assert_eq!(types[bv], Type::Vector { elem: b, width: 4 });
    assert_eq!(types.bool_like(f), b);

    let m = types.mat(2, 3, f);
    let col = types.element_of(m).unwrap();
    assert_eq!(col, types.vec(f, 3));
    let arr = types.array(f, ArrayCount::Runtime);
    assert_eq!(types.element_of(arr), Some(f));
    assert_eq!(types.element_of(f), None);
}

#[test]
fn test_friendly_names() {
    let mut types = TypeRegistry::new();
    let i = types.i32();
    let u = types.u32();
    let atomic = types.atomic(u);
    let arr = types.array(atomic, ArrayCount::Constant(4));
    let rt = types.array(i, ArrayCount::Runtime);
    let ov = types.array(i, ArrayCount::Override("N".into()));
    let ptr = types.pointer(AddressSpace::Storage, rt, Access::ReadWrite);
    let s = types.structure("Buf", vec![("data".into(), rt)]);

    assert_eq!(types.friendly_name(arr), "array<atomic<u32>, 4>");
    assert_eq!(types.friendly_name(ov), "array<i32, N>");
    assert_eq!(types.friendly_name(ptr), "ptr<storage, array<i32>, read_write>");
    assert_eq!(types.friendly_name(s), "Buf");
}

#[test]
fn test_default_access() {
    assert_eq!(AddressSpace::Uniform.default_access(), Access::Read);
    assert_eq!(AddressSpace::Private.default_access(), Access::ReadWrite);
    assert!(Access::ReadWrite.can_write());
    assert!(!Access::Read.can_write());
}
