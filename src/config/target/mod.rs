//! Backend target descriptors.
//!
//! A `Target` names the output dialect and its version. The printer only
//! consults it while emitting the preamble; the compile driver also uses
//! it to decide which IR transforms a dialect needs.

#[cfg(test)]
mod tests;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::diagnostic::{Diagnostic, System};

/// Output shading language.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Dialect {
    Glsl,
    GlslEs,
    Hlsl,
    Msl,
    Wgsl,
}

impl Dialect {
    pub const ALL: [Dialect; 5] = [
        Dialect::Glsl,
        Dialect::GlslEs,
        Dialect::Hlsl,
        Dialect::Msl,
        Dialect::Wgsl,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Dialect::Glsl => "glsl",
            Dialect::GlslEs => "glsl-es",
            Dialect::Hlsl => "hlsl",
            Dialect::Msl => "msl",
            Dialect::Wgsl => "wgsl",
        }
    }

    /// Dialects where shifting by the bit width or more is undefined.
    pub fn needs_shift_mask(self) -> bool {
        !matches!(self, Dialect::Wgsl)
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Dialect version or profile, e.g. GLSL ES 3.1 or Shader Model 6.0.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
}

impl Version {
    pub fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// What to emit: a dialect at a version.
///
/// Serialized as its `dialect@major.minor` name, the form `resolve` reads.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Target {
    pub dialect: Dialect,
    pub version: Version,
}

impl Target {
    pub fn new(dialect: Dialect, version: Version) -> Self {
        Self { dialect, version }
    }

    /// Desktop GLSL, e.g. `glsl(4, 5)` for `#version 450`.
    pub fn glsl(major: u32, minor: u32) -> Self {
        Self::new(Dialect::Glsl, Version::new(major, minor))
    }

    /// GLSL ES, e.g. `glsl_es(3, 1)` for `#version 310 es`.
    pub fn glsl_es(major: u32, minor: u32) -> Self {
        Self::new(Dialect::GlslEs, Version::new(major, minor))
    }

    /// HLSL for Shader Model 6.0.
    pub fn hlsl() -> Self {
        Self::new(Dialect::Hlsl, Version::new(6, 0))
    }

    /// Metal Shading Language 2.1.
    pub fn msl() -> Self {
        Self::new(Dialect::Msl, Version::new(2, 1))
    }

    pub fn wgsl() -> Self {
        Self::new(Dialect::Wgsl, Version::new(1, 0))
    }

    /// Resolve a built-in target by name: a dialect name, optionally
    /// followed by `@major.minor` (`glsl-es@3.0`).
    pub fn resolve(name: &str) -> Result<Self, Diagnostic> {
        let (dialect_name, version) = match name.split_once('@') {
            Some((d, v)) => (d, Some(v)),
            None => (name, None),
        };
        let mut target = match dialect_name {
            "glsl" => Self::glsl(4, 5),
            "glsl-es" => Self::glsl_es(3, 1),
            "hlsl" => Self::hlsl(),
            "msl" => Self::msl(),
            "wgsl" => Self::wgsl(),
            _ => {
                let available: Vec<&str> = Dialect::ALL.iter().map(|d| d.name()).collect();
                return Err(
                    Diagnostic::error(System::Writer, format!("unknown target '{}'", name))
                        .with_help(format!("available targets: {}", available.join(", "))),
                );
            }
        };
        if let Some(v) = version {
            target.version = parse_version(v).ok_or_else(|| {
                Diagnostic::error(
                    System::Writer,
                    format!("invalid version '{}' in target '{}'", v, name),
                )
                .with_help("write the version as major.minor, e.g. glsl-es@3.0")
            })?;
        }
        Ok(target)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.dialect, self.version)
    }
}

impl TryFrom<String> for Target {
    type Error = String;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        Target::resolve(&name).map_err(|d| d.message)
    }
}

impl From<Target> for String {
    fn from(target: Target) -> String {
        target.to_string()
    }
}

fn parse_version(text: &str) -> Option<Version> {
    let (major, minor) = text.split_once('.')?;
    Some(Version::new(major.parse().ok()?, minor.parse().ok()?))
}
