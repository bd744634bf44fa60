use serde::de::value::{Error as ValueError, StrDeserializer};
use serde::de::IntoDeserializer;
use serde::Deserialize;

use super::*;

fn from_config(text: &str) -> Result<Target, ValueError> {
    let de: StrDeserializer<ValueError> = text.into_deserializer();
    Target::deserialize(de)
}

#[test]
fn test_builtin_constructors() {
    let es = Target::glsl_es(3, 1);
    assert_eq!(es.dialect, Dialect::GlslEs);
    assert_eq!(es.version, Version::new(3, 1));
    assert_eq!(Target::hlsl().version, Version::new(6, 0));
    assert_eq!(Target::wgsl().to_string(), "wgsl@1.0");
}

#[test]
fn test_resolve_every_dialect() {
    for dialect in Dialect::ALL {
        let target = Target::resolve(dialect.name()).unwrap();
        assert_eq!(target.dialect, dialect);
    }
}

#[test]
fn test_resolve_with_version() {
    let target = Target::resolve("glsl-es@3.0").unwrap();
    assert_eq!(target, Target::glsl_es(3, 0));
    let err = Target::resolve("glsl@four").unwrap_err();
    assert!(err.message.contains("invalid version 'four'"));
}

#[test]
fn test_resolve_unknown() {
    let err = Target::resolve("spirv").unwrap_err();
    assert_eq!(err.message, "unknown target 'spirv'");
    assert!(err.help.unwrap().contains("glsl-es"));
}

#[test]
fn test_shift_mask_dialects() {
    assert!(Dialect::Hlsl.needs_shift_mask());
    assert!(Dialect::GlslEs.needs_shift_mask());
    assert!(!Dialect::Wgsl.needs_shift_mask());
}

#[test]
fn test_version_order() {
    assert!(Version::new(3, 1) > Version::new(3, 0));
    assert!(Version::new(4, 0) > Version::new(3, 2));
}

#[test]
fn test_target_loads_from_its_name() {
    assert_eq!(from_config("glsl-es@3.0").unwrap(), Target::glsl_es(3, 0));
    assert_eq!(from_config("msl").unwrap(), Target::msl());
    for target in [Target::wgsl(), Target::glsl(4, 3), Target::hlsl()] {
        assert_eq!(from_config(&String::from(target)).unwrap(), target);
    }
    let err = from_config("spirv").unwrap_err();
    assert!(err.to_string().contains("unknown target 'spirv'"), "{}", err);

    let de: StrDeserializer<ValueError> = "glsl-es".into_deserializer();
    assert_eq!(Dialect::deserialize(de).unwrap(), Dialect::GlslEs);
}
